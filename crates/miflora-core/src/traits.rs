//! Trait abstractions for probe operations.
//!
//! [`FloraProbe`] is implemented by the BLE-backed [`crate::Device`] and by
//! [`crate::MockProbe`], so polling code can be exercised without hardware.

use async_trait::async_trait;

use miflora_types::Parameter;

use crate::error::Result;

/// Operations a poller needs from a single Mi Flora probe.
///
/// All methods block the caller until the probe answers or the transport
/// gives up. Implementations do not retry.
///
/// # Example
///
/// ```ignore
/// use miflora_core::{FloraProbe, Parameter, Result};
///
/// async fn print_moisture<P: FloraProbe>(probe: &P) -> Result<()> {
///     let moisture = probe.parameter_value(Parameter::Moisture).await?;
///     println!("{}: {}%", probe.address(), moisture);
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait FloraProbe: Send + Sync {
    /// The probe's hardware address.
    fn address(&self) -> &str;

    /// Read the firmware version string.
    async fn firmware_version(&self) -> Result<String>;

    /// Read the battery level (0-100).
    async fn battery_level(&self) -> Result<u8>;

    /// Read a single sensor parameter.
    async fn parameter_value(&self, parameter: Parameter) -> Result<f64>;
}
