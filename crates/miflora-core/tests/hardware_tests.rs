//! Hardware integration tests for miflora-core
//!
//! These tests require a Mi Flora probe in range and should be run with:
//! ```
//! cargo test --package miflora-core --test hardware_tests -- --ignored --nocapture
//! ```
//!
//! Set `MIFLORA_DEVICE` to the probe's Bluetooth address (or its peripheral
//! UUID on macOS):
//! ```
//! MIFLORA_DEVICE="C4:7C:8D:6A:3E:01" cargo test --package miflora-core --test hardware_tests -- --ignored --nocapture
//! ```

use std::env;
use std::time::Duration;

use miflora_core::scan::{ScanOptions, scan_with_options};
use miflora_core::{Device, FloraProbe, Parameter};
use tokio::time::timeout;

/// Default timeout for BLE operations
const BLE_TIMEOUT: Duration = Duration::from_secs(60);

fn get_device() -> Option<String> {
    env::var("MIFLORA_DEVICE").ok().filter(|s| !s.is_empty())
}

// =============================================================================
// Scan Tests
// =============================================================================

#[tokio::test]
#[ignore = "requires BLE hardware"]
async fn test_scan_discovers_probes() {
    let options = ScanOptions::default().duration_secs(10);

    match timeout(Duration::from_secs(30), scan_with_options(options)).await {
        Ok(Ok(probes)) => {
            println!("Scan discovered {} probes:", probes.len());
            for probe in &probes {
                println!(
                    "  - {} ({}) rssi {:?}",
                    probe.name.as_deref().unwrap_or("Unknown"),
                    probe.identifier,
                    probe.rssi
                );
            }
        }
        Ok(Err(e)) => panic!("Scan failed: {}", e),
        Err(_) => panic!("Scan timed out after 30 seconds"),
    }
}

// =============================================================================
// Read Tests
// =============================================================================

#[tokio::test]
#[ignore = "requires BLE hardware"]
async fn test_read_firmware_and_battery() {
    let Some(address) = get_device() else {
        println!("SKIP: No device configured (set MIFLORA_DEVICE env var)");
        return;
    };

    let device = Device::open(&address).await.expect("No Bluetooth adapter");

    let firmware = timeout(BLE_TIMEOUT, device.firmware_version())
        .await
        .expect("Firmware read timed out")
        .expect("Firmware read failed");
    let battery = device.battery_level().await.expect("Battery read failed");

    println!("Firmware {}, battery {}%", firmware, battery);
    assert!(!firmware.is_empty());
    assert!(battery <= 100);
}

#[tokio::test]
#[ignore = "requires BLE hardware"]
async fn test_read_all_parameters() {
    let Some(address) = get_device() else {
        println!("SKIP: No device configured (set MIFLORA_DEVICE env var)");
        return;
    };

    let device = Device::open(&address).await.expect("No Bluetooth adapter");

    for parameter in Parameter::ALL {
        let value = timeout(BLE_TIMEOUT, device.parameter_value(parameter))
            .await
            .expect("Read timed out")
            .expect("Read failed");
        println!("{}: {}", parameter, value);
    }

    let moisture = device.parameter_value(Parameter::Moisture).await.unwrap();
    assert!((0.0..=100.0).contains(&moisture));
}

#[tokio::test]
#[ignore = "requires BLE hardware"]
async fn test_sensor_data_is_cached() {
    let Some(address) = get_device() else {
        println!("SKIP: No device configured (set MIFLORA_DEVICE env var)");
        return;
    };

    let device = Device::open(&address).await.expect("No Bluetooth adapter");

    let first = timeout(BLE_TIMEOUT, device.sensor_data())
        .await
        .expect("Read timed out")
        .expect("Read failed");
    let second = device.sensor_data().await.expect("Cached read failed");

    assert_eq!(first.captured_at, second.captured_at);
}
