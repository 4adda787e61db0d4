//! Bluetooth UUIDs and command bytes for Mi Flora probes.

use uuid::{Uuid, uuid};

// --- Services ---

/// Service holding the live sensor data, mode change and firmware characteristics.
pub const DATA_SERVICE: Uuid = uuid!("00001204-0000-1000-8000-00805f9b34fb");

// --- Characteristics ---

/// Mode change characteristic. Writing [`MODE_CHANGE_COMMAND`] switches the
/// probe into live-data mode.
pub const MODE_CHANGE: Uuid = uuid!("00001a00-0000-1000-8000-00805f9b34fb");

/// Live sensor data characteristic (16 bytes).
pub const SENSOR_DATA: Uuid = uuid!("00001a01-0000-1000-8000-00805f9b34fb");

/// Battery level and firmware version characteristic (7 bytes).
pub const FIRMWARE_BATTERY: Uuid = uuid!("00001a02-0000-1000-8000-00805f9b34fb");

/// Bytes written to [`MODE_CHANGE`] before reading [`SENSOR_DATA`].
pub const MODE_CHANGE_COMMAND: [u8; 2] = [0xA0, 0x1F];

// --- Advertisement ---

/// Xiaomi OUI used by Mi Flora probes.
pub const ADDRESS_PREFIX: &str = "C4:7C:8D:";

/// Local names advertised by Mi Flora probes (lower case).
pub const DEVICE_NAMES: [&str; 2] = ["flower care", "flower mate"];
