//! Prometheus exporter for nearby Xiaomi Mi Flora soil sensors.
//!
//! The exporter:
//! - Loads a registry mapping probe addresses to plant names
//! - Polls every probe on a fixed interval (ten minutes by default)
//! - Publishes battery, conductivity, light, moisture and temperature as
//!   Prometheus gauges, labelled by plant
//! - Counts failed reads per probe in `miflora_errors`
//! - Optionally scans for probes that are not registered yet
//!
//! # Endpoints
//!
//! - `GET /metrics` - Prometheus text format
//! - `GET /` - same as `/metrics`
//! - `GET /health` - liveness check
//!
//! # Registry
//!
//! ```json
//! {
//!     "C4:7C:8D:6A:3E:01": "basil",
//!     "C4:7C:8D:6A:3E:02": "monstera"
//! }
//! ```

pub mod api;
pub mod collector;
pub mod config;
pub mod discovery;
pub mod metrics;

pub use collector::{Collector, ProbeHandle, ProbeReadError};
pub use config::{ConfigError, PlantEntry, PlantRegistry};
pub use discovery::DiscoveryError;
pub use metrics::{Metrics, MetricsError};
