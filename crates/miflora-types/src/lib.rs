//! Platform-agnostic types for Xiaomi Mi Flora soil sensors.
//!
//! This crate holds the parts of the Mi Flora protocol that do not depend on
//! a Bluetooth stack: GATT UUIDs, payload decoding and the parameter names
//! the probe client exposes.
//!
//! # Example
//!
//! ```
//! use miflora_types::{Parameter, SensorData};
//!
//! let payload = [
//!     0xD7, 0x00, 0x00, 0xB0, 0x04, 0x00, 0x00, 30, 0x5E, 0x01, 0x02, 0x3C, 0x00, 0xFB, 0x34,
//!     0x9B,
//! ];
//! let data = SensorData::from_bytes(&payload).unwrap();
//! assert_eq!(data.value(Parameter::Moisture), 30.0);
//! ```

pub mod error;
pub mod types;
pub mod uuid;

pub use error::ParseError;
pub use types::{FirmwareInfo, Parameter, SensorData, needs_mode_change};
pub use uuid as uuids;
