//! Probe discovery and scanning.
//!
//! This module finds Mi Flora probes in range using Bluetooth Low Energy.
//! A scan is a single stateless pass: it reports every probe currently
//! advertising, whether or not the caller already knows about it.

use std::time::Duration;

use btleplug::api::{Central, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::error::{DeviceNotFoundReason, Error, Result};
use crate::util::{addresses_match, create_identifier, format_peripheral_id, normalize_address};
use miflora_types::uuid::{ADDRESS_PREFIX, DEVICE_NAMES};

/// Information about a discovered probe.
#[derive(Debug, Clone)]
pub struct DiscoveredProbe {
    /// The advertised local name (e.g. "Flower care").
    pub name: Option<String>,
    /// The peripheral ID for connecting.
    pub id: PeripheralId,
    /// The BLE address, upper case (may be zeros on macOS, use `identifier` instead).
    pub address: String,
    /// A connection identifier (peripheral ID on macOS, address on other platforms).
    pub identifier: String,
    /// RSSI signal strength.
    pub rssi: Option<i16>,
}

/// Options for scanning.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// How long to scan for probes.
    pub duration: Duration,
    /// Only return peripherals that look like Mi Flora probes.
    pub filter_miflora_only: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            duration: Duration::from_secs(10),
            filter_miflora_only: true,
        }
    }
}

impl ScanOptions {
    /// Create new scan options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the scan duration.
    pub fn duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Set scan duration in seconds.
    pub fn duration_secs(mut self, secs: u64) -> Self {
        self.duration = Duration::from_secs(secs);
        self
    }

    /// Set whether to filter for Mi Flora probes only.
    pub fn filter_miflora_only(mut self, filter: bool) -> Self {
        self.filter_miflora_only = filter;
        self
    }
}

/// Get the first available Bluetooth adapter.
pub async fn get_adapter() -> Result<Adapter> {
    let manager = Manager::new().await?;
    let adapters = manager.adapters().await?;

    adapters
        .into_iter()
        .next()
        .ok_or(Error::DeviceNotFound(DeviceNotFoundReason::NoAdapter))
}

/// Scan for Mi Flora probes in range with default options.
///
/// An empty list means no probes were found, not an error.
///
/// # Errors
///
/// Returns an error if no Bluetooth adapter is available or the scan could
/// not be started or stopped.
pub async fn scan_for_probes() -> Result<Vec<DiscoveredProbe>> {
    scan_with_options(ScanOptions::default()).await
}

/// Scan for probes with custom options.
pub async fn scan_with_options(options: ScanOptions) -> Result<Vec<DiscoveredProbe>> {
    let adapter = get_adapter().await?;
    scan_with_adapter(&adapter, options).await
}

/// Scan for probes using a specific adapter.
pub async fn scan_with_adapter(
    adapter: &Adapter,
    options: ScanOptions,
) -> Result<Vec<DiscoveredProbe>> {
    info!(
        "Starting BLE scan for {} seconds...",
        options.duration.as_secs()
    );

    adapter.start_scan(ScanFilter::default()).await?;
    sleep(options.duration).await;
    adapter.stop_scan().await?;

    let peripherals = adapter.peripherals().await?;
    let mut discovered = Vec::new();

    for peripheral in peripherals {
        match process_peripheral(&peripheral, options.filter_miflora_only).await {
            Ok(Some(probe)) => {
                debug!("Found probe {} ({:?})", probe.identifier, probe.name);
                discovered.push(probe);
            }
            Ok(None) => {}
            Err(e) => {
                debug!("Error processing peripheral: {}", e);
            }
        }
    }

    info!("Scan complete. Found {} probe(s)", discovered.len());
    Ok(discovered)
}

async fn process_peripheral(
    peripheral: &Peripheral,
    filter_miflora_only: bool,
) -> Result<Option<DiscoveredProbe>> {
    let Some(properties) = peripheral.properties().await? else {
        return Ok(None);
    };

    let id = peripheral.id();
    let address = normalize_address(&properties.address.to_string());
    let name = properties.local_name.clone();

    if filter_miflora_only && !is_miflora(name.as_deref(), &address) {
        return Ok(None);
    }

    let identifier = create_identifier(&address, &id);

    Ok(Some(DiscoveredProbe {
        name,
        id,
        address,
        identifier,
        rssi: properties.rssi,
    }))
}

/// Whether an advertisement belongs to a Mi Flora probe.
///
/// Matches on the advertised name ("Flower care" / "Flower mate") or on the
/// Xiaomi address prefix.
pub fn is_miflora(name: Option<&str>, address: &str) -> bool {
    if let Some(name) = name
        && DEVICE_NAMES.contains(&name.trim().to_lowercase().as_str())
    {
        return true;
    }
    address.to_uppercase().starts_with(ADDRESS_PREFIX)
}

/// Find the peripheral for a probe address.
///
/// Peripherals already known to the adapter are used directly; otherwise a
/// single scan of `scan_duration` is run.
pub async fn find_peripheral(
    adapter: &Adapter,
    identifier: &str,
    scan_duration: Duration,
) -> Result<Peripheral> {
    if let Some(peripheral) = find_known_peripheral(adapter, identifier).await? {
        debug!("Found {} without scanning", identifier);
        return Ok(peripheral);
    }

    debug!(
        "Scanning {}s for {}",
        scan_duration.as_secs(),
        identifier
    );
    adapter.start_scan(ScanFilter::default()).await?;
    sleep(scan_duration).await;
    adapter.stop_scan().await?;

    match find_known_peripheral(adapter, identifier).await? {
        Some(peripheral) => Ok(peripheral),
        None => {
            warn!("Probe {} not found", identifier);
            Err(Error::device_not_found(identifier))
        }
    }
}

async fn find_known_peripheral(adapter: &Adapter, identifier: &str) -> Result<Option<Peripheral>> {
    let peripherals = adapter.peripherals().await?;

    for peripheral in peripherals {
        if let Ok(Some(props)) = peripheral.properties().await {
            if addresses_match(&props.address.to_string(), identifier) {
                return Ok(Some(peripheral));
            }
            // macOS hides addresses; match on the peripheral UUID instead
            if format_peripheral_id(&peripheral.id()).eq_ignore_ascii_case(identifier) {
                return Ok(Some(peripheral));
            }
        }
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_options_default() {
        let options = ScanOptions::default();
        assert_eq!(options.duration, Duration::from_secs(10));
        assert!(options.filter_miflora_only);
    }

    #[test]
    fn test_scan_options_builder() {
        let options = ScanOptions::new()
            .duration_secs(30)
            .filter_miflora_only(false);
        assert_eq!(options.duration, Duration::from_secs(30));
        assert!(!options.filter_miflora_only);
    }

    #[test]
    fn test_is_miflora_by_name() {
        assert!(is_miflora(Some("Flower care"), "11:22:33:44:55:66"));
        assert!(is_miflora(Some("Flower mate"), "11:22:33:44:55:66"));
        assert!(is_miflora(Some("FLOWER CARE"), "11:22:33:44:55:66"));
        assert!(!is_miflora(Some("LYWSD03MMC"), "11:22:33:44:55:66"));
    }

    #[test]
    fn test_is_miflora_by_address_prefix() {
        assert!(is_miflora(None, "C4:7C:8D:6A:3E:01"));
        assert!(is_miflora(None, "c4:7c:8d:6a:3e:01"));
        assert!(!is_miflora(None, "11:22:33:44:55:66"));
    }
}
