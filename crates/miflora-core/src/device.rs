//! Mi Flora probe client.
//!
//! A [`Device`] represents one probe by address. It does not hold a BLE
//! connection open: every fetch connects, reads and disconnects again, which
//! keeps the probe's battery usage low and lets a single adapter serve many
//! probes in turn. Results are cached so the four parameter reads of one
//! polling cycle cost a single sensor-data read.

use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{Characteristic, Peripheral as _, WriteType};
use btleplug::platform::{Adapter, Peripheral};
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tokio::time::{Instant, timeout};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::scan::{self, find_peripheral};
use crate::traits::FloraProbe;
use crate::util::normalize_address;
use miflora_types::uuid::{FIRMWARE_BATTERY, MODE_CHANGE, MODE_CHANGE_COMMAND, SENSOR_DATA};
use miflora_types::{FirmwareInfo, Parameter, SensorData, needs_mode_change};

/// Default timeout for BLE characteristic read operations.
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Default timeout for BLE characteristic write operations.
const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default timeout for BLE connection operations.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Default timeout for service discovery.
const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Default scan duration when the adapter has not seen the probe yet.
const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_secs(10);

/// Default lifetime of cached sensor data.
const DEFAULT_CACHE_TIMEOUT: Duration = Duration::from_secs(600);

/// Default lifetime of the cached firmware version and battery level.
const DEFAULT_FIRMWARE_CACHE_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// Configuration for BLE timeouts and read caching.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use miflora_core::device::ConnectionConfig;
///
/// let config = ConnectionConfig::default()
///     .connection_timeout(Duration::from_secs(20))
///     .cache_timeout(Duration::from_secs(300));
/// ```
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Timeout for establishing a BLE connection.
    pub connection_timeout: Duration,
    /// Timeout for BLE read operations.
    pub read_timeout: Duration,
    /// Timeout for BLE write operations.
    pub write_timeout: Duration,
    /// Timeout for service discovery after connection.
    pub discovery_timeout: Duration,
    /// How long to scan for a probe the adapter has not seen yet.
    pub scan_timeout: Duration,
    /// How long sensor data is served from cache.
    pub cache_timeout: Duration,
    /// How long firmware version and battery level are served from cache.
    pub firmware_cache_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connection_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            discovery_timeout: DEFAULT_DISCOVERY_TIMEOUT,
            scan_timeout: DEFAULT_SCAN_TIMEOUT,
            cache_timeout: DEFAULT_CACHE_TIMEOUT,
            firmware_cache_timeout: DEFAULT_FIRMWARE_CACHE_TIMEOUT,
        }
    }
}

impl ConnectionConfig {
    /// Create a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the connection timeout.
    #[must_use]
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Set the read timeout.
    #[must_use]
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Set the write timeout.
    #[must_use]
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Set the scan duration used to locate an unseen probe.
    #[must_use]
    pub fn scan_timeout(mut self, timeout: Duration) -> Self {
        self.scan_timeout = timeout;
        self
    }

    /// Set the sensor data cache lifetime.
    #[must_use]
    pub fn cache_timeout(mut self, timeout: Duration) -> Self {
        self.cache_timeout = timeout;
        self
    }

    /// Set the firmware/battery cache lifetime.
    #[must_use]
    pub fn firmware_cache_timeout(mut self, timeout: Duration) -> Self {
        self.firmware_cache_timeout = timeout;
        self
    }
}

/// A value read from a probe together with the time it was read.
#[derive(Debug, Clone)]
struct Cached<T> {
    value: T,
    read_at: Instant,
}

impl<T> Cached<T> {
    fn new(value: T) -> Self {
        Self {
            value,
            read_at: Instant::now(),
        }
    }

    fn fresh(&self, ttl: Duration) -> Option<&T> {
        (self.read_at.elapsed() < ttl).then_some(&self.value)
    }
}

/// A Mi Flora probe, addressed by its Bluetooth address.
pub struct Device {
    /// The adapter used to reach the probe, looked up on first use.
    adapter: Mutex<Option<Adapter>>,
    /// Normalized Bluetooth address (or peripheral UUID on macOS).
    address: String,
    config: ConnectionConfig,
    firmware: Mutex<Option<Cached<FirmwareInfo>>>,
    sensor: Mutex<Option<Cached<SensorData>>>,
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("address", &self.address)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Device {
    /// Create a probe client on the first available adapter.
    ///
    /// Fails if no adapter is available. No connection is made until the
    /// first read.
    pub async fn open(address: &str) -> Result<Self> {
        let adapter = scan::get_adapter().await?;
        Ok(Self::with_adapter(adapter, address, ConnectionConfig::default()))
    }

    /// Create a probe client without touching the Bluetooth stack.
    ///
    /// The adapter is looked up on the first read and again after every
    /// failed lookup, so a missing adapter surfaces as a read error.
    pub fn new(address: &str, config: ConnectionConfig) -> Self {
        Self::build(None, address, config)
    }

    /// Create a probe client on a specific adapter.
    pub fn with_adapter(adapter: Adapter, address: &str, config: ConnectionConfig) -> Self {
        Self::build(Some(adapter), address, config)
    }

    fn build(adapter: Option<Adapter>, address: &str, config: ConnectionConfig) -> Self {
        Self {
            adapter: Mutex::new(adapter),
            address: normalize_address(address),
            config,
            firmware: Mutex::new(None),
            sensor: Mutex::new(None),
        }
    }

    /// Get the probe address.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Get the connection configuration.
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Read battery level and firmware version, from cache when fresh.
    pub async fn firmware_info(&self) -> Result<FirmwareInfo> {
        let mut cache = self.firmware.lock().await;
        if let Some(info) = cache
            .as_ref()
            .and_then(|c| c.fresh(self.config.firmware_cache_timeout))
        {
            debug!("Using cached firmware info for {}", self.address);
            return Ok(info.clone());
        }

        let info = self.fetch_firmware_info().await?;
        *cache = Some(Cached::new(info.clone()));
        Ok(info)
    }

    /// Read the live sensor data, from cache when fresh.
    pub async fn sensor_data(&self) -> Result<SensorData> {
        let mut cache = self.sensor.lock().await;
        if let Some(data) = cache.as_ref().and_then(|c| c.fresh(self.config.cache_timeout)) {
            debug!("Using cached sensor data for {}", self.address);
            return Ok(*data);
        }

        let firmware = self.firmware_info().await?;
        let data = self.fetch_sensor_data(&firmware.version).await?;
        *cache = Some(Cached::new(data));
        Ok(data)
    }

    #[tracing::instrument(level = "debug", skip(self), fields(address = %self.address))]
    async fn fetch_firmware_info(&self) -> Result<FirmwareInfo> {
        let peripheral = self.connect().await?;
        let result = self.read_characteristic(&peripheral, FIRMWARE_BATTERY).await;
        self.disconnect(&peripheral).await;

        let info = FirmwareInfo::from_bytes(&result?)?;
        debug!("Firmware {} battery {}%", info.version, info.battery);
        Ok(info)
    }

    #[tracing::instrument(level = "debug", skip(self), fields(address = %self.address))]
    async fn fetch_sensor_data(&self, firmware: &str) -> Result<SensorData> {
        let peripheral = self.connect().await?;
        let result = self.read_sensor_payload(&peripheral, firmware).await;
        self.disconnect(&peripheral).await;

        let data = SensorData::from_bytes_for_firmware(&result?, firmware)?;
        Ok(data.captured_at(OffsetDateTime::now_utc()))
    }

    async fn read_sensor_payload(&self, peripheral: &Peripheral, firmware: &str) -> Result<Vec<u8>> {
        if needs_mode_change(firmware) {
            self.write_characteristic(peripheral, MODE_CHANGE, &MODE_CHANGE_COMMAND)
                .await?;
        }
        self.read_characteristic(peripheral, SENSOR_DATA).await
    }

    async fn adapter(&self) -> Result<Adapter> {
        let mut adapter = self.adapter.lock().await;
        if let Some(adapter) = adapter.as_ref() {
            return Ok(adapter.clone());
        }
        let found = scan::get_adapter().await?;
        *adapter = Some(found.clone());
        Ok(found)
    }

    /// Locate the probe, connect and discover its services.
    async fn connect(&self) -> Result<Peripheral> {
        let adapter = self.adapter().await?;
        let peripheral = find_peripheral(&adapter, &self.address, self.config.scan_timeout).await?;

        debug!("Connecting to {}", self.address);
        timeout(self.config.connection_timeout, peripheral.connect())
            .await
            .map_err(|_| Error::timeout("connect to probe", self.config.connection_timeout))??;

        let discovered = timeout(self.config.discovery_timeout, peripheral.discover_services())
            .await
            .map_err(|_| Error::timeout("discover services", self.config.discovery_timeout));
        match discovered {
            Ok(Ok(())) => Ok(peripheral),
            Ok(Err(e)) => {
                self.disconnect(&peripheral).await;
                Err(e.into())
            }
            Err(e) => {
                self.disconnect(&peripheral).await;
                Err(e)
            }
        }
    }

    async fn disconnect(&self, peripheral: &Peripheral) {
        if let Err(e) = peripheral.disconnect().await {
            warn!("Failed to disconnect from {}: {}", self.address, e);
        }
    }

    fn find_characteristic(&self, peripheral: &Peripheral, uuid: Uuid) -> Result<Characteristic> {
        peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == uuid)
            .ok_or_else(|| {
                Error::characteristic_not_found(uuid.to_string(), peripheral.services().len())
            })
    }

    async fn read_characteristic(&self, peripheral: &Peripheral, uuid: Uuid) -> Result<Vec<u8>> {
        let characteristic = self.find_characteristic(peripheral, uuid)?;
        let data = timeout(self.config.read_timeout, peripheral.read(&characteristic))
            .await
            .map_err(|_| {
                Error::timeout(format!("read characteristic {}", uuid), self.config.read_timeout)
            })??;
        Ok(data)
    }

    async fn write_characteristic(
        &self,
        peripheral: &Peripheral,
        uuid: Uuid,
        data: &[u8],
    ) -> Result<()> {
        let characteristic = self.find_characteristic(peripheral, uuid)?;
        timeout(
            self.config.write_timeout,
            peripheral.write(&characteristic, data, WriteType::WithResponse),
        )
        .await
        .map_err(|_| {
            Error::timeout(format!("write characteristic {}", uuid), self.config.write_timeout)
        })??;
        Ok(())
    }
}

#[async_trait]
impl FloraProbe for Device {
    fn address(&self) -> &str {
        Device::address(self)
    }

    async fn firmware_version(&self) -> Result<String> {
        Ok(self.firmware_info().await?.version)
    }

    async fn battery_level(&self) -> Result<u8> {
        Ok(self.firmware_info().await?.battery)
    }

    async fn parameter_value(&self, parameter: Parameter) -> Result<f64> {
        Ok(self.sensor_data().await?.value(parameter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_config_default() {
        let config = ConnectionConfig::default();
        assert_eq!(config.connection_timeout, Duration::from_secs(15));
        assert_eq!(config.read_timeout, Duration::from_secs(10));
        assert_eq!(config.cache_timeout, Duration::from_secs(600));
        assert_eq!(config.firmware_cache_timeout, Duration::from_secs(86_400));
    }

    #[test]
    fn test_connection_config_builder() {
        let config = ConnectionConfig::new()
            .connection_timeout(Duration::from_secs(20))
            .read_timeout(Duration::from_secs(5))
            .write_timeout(Duration::from_secs(6))
            .scan_timeout(Duration::from_secs(3))
            .cache_timeout(Duration::from_secs(60))
            .firmware_cache_timeout(Duration::from_secs(3600));
        assert_eq!(config.connection_timeout, Duration::from_secs(20));
        assert_eq!(config.read_timeout, Duration::from_secs(5));
        assert_eq!(config.write_timeout, Duration::from_secs(6));
        assert_eq!(config.scan_timeout, Duration::from_secs(3));
        assert_eq!(config.cache_timeout, Duration::from_secs(60));
        assert_eq!(config.firmware_cache_timeout, Duration::from_secs(3600));
    }

    #[tokio::test]
    async fn test_new_device_defers_adapter_lookup() {
        let config = ConnectionConfig::default().cache_timeout(Duration::from_secs(60));
        let device = Device::new(" c4:7c:8d:6a:3e:01 ", config);

        assert_eq!(device.address(), "C4:7C:8D:6A:3E:01");
        assert_eq!(device.config().cache_timeout, Duration::from_secs(60));
        assert!(device.adapter.lock().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_cache_timeout_expires_between_cycles() {
        let ttl = Duration::from_secs(60);
        let cached = Cached::new(21.5f64);
        assert_eq!(cached.fresh(ttl), Some(&21.5));

        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(cached.fresh(ttl), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cached_value_expires() {
        let cached = Cached::new(42u8);
        assert_eq!(cached.fresh(Duration::from_secs(600)), Some(&42));

        tokio::time::advance(Duration::from_secs(599)).await;
        assert_eq!(cached.fresh(Duration::from_secs(600)), Some(&42));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(cached.fresh(Duration::from_secs(600)), None);
    }
}
