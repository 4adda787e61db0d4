//! Core BLE client for Xiaomi Mi Flora soil sensors.
//!
//! This crate talks to Mi Flora ("Flower care") probes over Bluetooth Low
//! Energy and exposes their readings through the [`FloraProbe`] trait.
//!
//! # Features
//!
//! - **Device discovery**: Scan for nearby probes via BLE
//! - **Sensor readings**: Temperature, light, soil moisture and conductivity
//! - **Device info**: Firmware version and battery level
//! - **Read caching**: Sensor data is cached for ten minutes, firmware and
//!   battery for a day, so polling all parameters costs one connection
//! - **Mock probe**: [`MockProbe`] for testing pollers without hardware
//!
//! # Platform Differences
//!
//! On Linux and Windows probes are identified by their Bluetooth MAC address
//! (e.g. `C4:7C:8D:6A:3E:01`). CoreBluetooth on macOS hides addresses, so a
//! discovered probe's [`DiscoveredProbe::identifier`] is the peripheral UUID
//! there instead.
//!
//! # Quick Start
//!
//! ```no_run
//! use miflora_core::{Device, FloraProbe, Parameter, scan};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let probes = scan::scan_for_probes().await?;
//!     println!("Found {} probes", probes.len());
//!
//!     let device = Device::open("C4:7C:8D:6A:3E:01").await?;
//!     println!("Firmware: {}", device.firmware_version().await?);
//!     println!("Moisture: {}%", device.parameter_value(Parameter::Moisture).await?);
//!
//!     Ok(())
//! }
//! ```

pub mod device;
pub mod error;
pub mod mock;
pub mod scan;
pub mod traits;
pub mod util;

pub use device::{ConnectionConfig, Device};
pub use error::{DeviceNotFoundReason, Error, Result};
pub use mock::{MockOperation, MockProbe, MockProbeBuilder};
pub use scan::{DiscoveredProbe, ScanOptions};
pub use traits::FloraProbe;

pub use miflora_types::{FirmwareInfo, Parameter, ParseError, SensorData};
