//! Mock probe implementation for testing.
//!
//! [`MockProbe`] implements [`FloraProbe`] without BLE hardware. Values are
//! set through [`MockProbeBuilder`] or the async setters, and individual
//! operations can be made to fail to exercise error handling in pollers.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use miflora_types::{Parameter, SensorData};

use crate::error::{Error, Result};
use crate::traits::FloraProbe;

/// An operation of the probe API, used to target failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOperation {
    /// [`FloraProbe::firmware_version`].
    Firmware,
    /// [`FloraProbe::battery_level`].
    Battery,
    /// [`FloraProbe::parameter_value`] for one parameter.
    Parameter(Parameter),
}

/// A mock Mi Flora probe for testing.
///
/// # Example
///
/// ```
/// use miflora_core::{FloraProbe, MockProbeBuilder, Parameter};
///
/// #[tokio::main]
/// async fn main() {
///     let probe = MockProbeBuilder::new().moisture(42).build();
///     assert_eq!(probe.parameter_value(Parameter::Moisture).await.unwrap(), 42.0);
/// }
/// ```
pub struct MockProbe {
    address: String,
    firmware: RwLock<String>,
    battery: RwLock<u8>,
    data: RwLock<SensorData>,
    failing: RwLock<HashSet<MockOperation>>,
    fail_all: RwLock<bool>,
    fail_message: RwLock<String>,
    read_latency: RwLock<Duration>,
    read_count: AtomicU32,
}

impl std::fmt::Debug for MockProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockProbe")
            .field("address", &self.address)
            .field("read_count", &self.read_count.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl MockProbe {
    /// Create a mock probe with default values.
    pub fn new(address: &str) -> Self {
        Self {
            address: address.to_string(),
            firmware: RwLock::new("3.2.1".to_string()),
            battery: RwLock::new(100),
            data: RwLock::new(Self::default_data()),
            failing: RwLock::new(HashSet::new()),
            fail_all: RwLock::new(false),
            fail_message: RwLock::new("Mock failure".to_string()),
            read_latency: RwLock::new(Duration::ZERO),
            read_count: AtomicU32::new(0),
        }
    }

    fn default_data() -> SensorData {
        SensorData {
            temperature: 20.0,
            light: 1000,
            moisture: 40,
            conductivity: 300,
            captured_at: None,
        }
    }

    fn random_address() -> String {
        let bytes: [u8; 3] = rand::random();
        format!(
            "C4:7C:8D:{:02X}:{:02X}:{:02X}",
            bytes[0], bytes[1], bytes[2]
        )
    }

    // --- Test control methods ---

    /// Set the firmware version.
    pub async fn set_firmware(&self, version: &str) {
        *self.firmware.write().await = version.to_string();
    }

    /// Set the battery level.
    pub async fn set_battery(&self, level: u8) {
        *self.battery.write().await = level;
    }

    /// Replace all sensor values.
    pub async fn set_data(&self, data: SensorData) {
        *self.data.write().await = data;
    }

    /// Make one operation fail (or succeed again).
    pub async fn set_failing(&self, operation: MockOperation, fail: bool) {
        let mut failing = self.failing.write().await;
        if fail {
            failing.insert(operation);
        } else {
            failing.remove(&operation);
        }
    }

    /// Make every operation fail, with an optional error message.
    pub async fn set_should_fail(&self, fail: bool, message: Option<&str>) {
        *self.fail_all.write().await = fail;
        if let Some(msg) = message {
            *self.fail_message.write().await = msg.to_string();
        }
    }

    /// Delay every read by `latency`.
    pub async fn set_read_latency(&self, latency: Duration) {
        *self.read_latency.write().await = latency;
    }

    /// Number of read operations attempted, including failed ones.
    pub fn read_count(&self) -> u32 {
        self.read_count.load(Ordering::Relaxed)
    }

    async fn begin_read(&self, operation: MockOperation) -> Result<()> {
        self.read_count.fetch_add(1, Ordering::Relaxed);

        let latency = *self.read_latency.read().await;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        if *self.fail_all.read().await || self.failing.read().await.contains(&operation) {
            return Err(Error::InvalidData(self.fail_message.read().await.clone()));
        }
        Ok(())
    }
}

#[async_trait]
impl FloraProbe for MockProbe {
    fn address(&self) -> &str {
        &self.address
    }

    async fn firmware_version(&self) -> Result<String> {
        self.begin_read(MockOperation::Firmware).await?;
        Ok(self.firmware.read().await.clone())
    }

    async fn battery_level(&self) -> Result<u8> {
        self.begin_read(MockOperation::Battery).await?;
        Ok(*self.battery.read().await)
    }

    async fn parameter_value(&self, parameter: Parameter) -> Result<f64> {
        self.begin_read(MockOperation::Parameter(parameter)).await?;
        Ok(self.data.read().await.value(parameter))
    }
}

/// Builder for creating mock probes with custom settings.
#[derive(Debug)]
pub struct MockProbeBuilder {
    address: Option<String>,
    firmware: String,
    battery: u8,
    data: SensorData,
    failing: HashSet<MockOperation>,
}

impl Default for MockProbeBuilder {
    fn default() -> Self {
        Self {
            address: None,
            firmware: "3.2.1".to_string(),
            battery: 100,
            data: MockProbe::default_data(),
            failing: HashSet::new(),
        }
    }
}

impl MockProbeBuilder {
    /// Create a new builder with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the probe address (a random Xiaomi address otherwise).
    pub fn address(mut self, address: &str) -> Self {
        self.address = Some(address.to_string());
        self
    }

    /// Set the firmware version.
    pub fn firmware(mut self, version: &str) -> Self {
        self.firmware = version.to_string();
        self
    }

    /// Set the battery level.
    pub fn battery(mut self, level: u8) -> Self {
        self.battery = level;
        self
    }

    /// Set the conductivity in µS/cm.
    pub fn conductivity(mut self, conductivity: u16) -> Self {
        self.data.conductivity = conductivity;
        self
    }

    /// Set the light level in lux.
    pub fn light(mut self, light: u32) -> Self {
        self.data.light = light;
        self
    }

    /// Set the moisture percentage.
    pub fn moisture(mut self, moisture: u8) -> Self {
        self.data.moisture = moisture;
        self
    }

    /// Set the temperature in degrees Celsius.
    pub fn temperature(mut self, temperature: f64) -> Self {
        self.data.temperature = temperature;
        self
    }

    /// Make an operation fail from the start.
    pub fn failing(mut self, operation: MockOperation) -> Self {
        self.failing.insert(operation);
        self
    }

    /// Build the mock probe.
    pub fn build(self) -> MockProbe {
        let address = self.address.unwrap_or_else(MockProbe::random_address);
        let probe = MockProbe::new(&address);
        MockProbe {
            firmware: RwLock::new(self.firmware),
            battery: RwLock::new(self.battery),
            data: RwLock::new(self.data),
            failing: RwLock::new(self.failing),
            ..probe
        }
    }
}
