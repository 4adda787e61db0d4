//! Core types for Mi Flora sensor data.

use core::fmt;
use core::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// Number of bytes in a sensor data payload.
pub const SENSOR_DATA_BYTES: usize = 16;

/// Number of bytes in a firmware/battery payload.
pub const FIRMWARE_BATTERY_BYTES: usize = 7;

/// Prefix a probe sends instead of measurements when it has none.
pub const NO_DATA_MARKER: [u8; 10] = [0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF, 0x99, 0x88, 0x77, 0x66];

/// First firmware that needs the mode change command before sensor data can be read.
pub const MODE_CHANGE_FIRMWARE: &str = "2.6.6";

/// A measurement a probe can report through its sensor data characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Parameter {
    /// Soil conductivity in µS/cm.
    Conductivity,
    /// Ambient light in lux.
    Light,
    /// Soil moisture in percent.
    Moisture,
    /// Ambient temperature in degrees Celsius.
    Temperature,
}

impl Parameter {
    /// All parameters, in the order they are polled.
    pub const ALL: [Parameter; 4] = [
        Parameter::Conductivity,
        Parameter::Light,
        Parameter::Moisture,
        Parameter::Temperature,
    ];

    /// The parameter name as used by the probe client API.
    pub fn as_str(&self) -> &'static str {
        match self {
            Parameter::Conductivity => "conductivity",
            Parameter::Light => "light",
            Parameter::Moisture => "moisture",
            Parameter::Temperature => "temperature",
        }
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Parameter {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "conductivity" => Ok(Parameter::Conductivity),
            "light" => Ok(Parameter::Light),
            "moisture" => Ok(Parameter::Moisture),
            "temperature" => Ok(Parameter::Temperature),
            other => Err(ParseError::InvalidValue(format!(
                "unknown parameter '{}'",
                other
            ))),
        }
    }
}

/// Live measurements decoded from the sensor data characteristic.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SensorData {
    /// Temperature in degrees Celsius.
    pub temperature: f64,
    /// Ambient light in lux.
    pub light: u32,
    /// Soil moisture in percent (0-100).
    pub moisture: u8,
    /// Soil conductivity in µS/cm.
    pub conductivity: u16,
    /// When the payload was read from the probe, if known.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    #[cfg_attr(feature = "serde", serde(default, with = "time::serde::rfc3339::option"))]
    pub captured_at: Option<time::OffsetDateTime>,
}

impl SensorData {
    /// Parse sensor data from the 16-byte payload.
    ///
    /// The byte format is:
    /// - bytes 0-1: Temperature (i16 LE, tenths of a degree Celsius)
    /// - byte 2: unused
    /// - bytes 3-6: Light (u32 LE, lux)
    /// - byte 7: Moisture (u8, percent)
    /// - bytes 8-9: Conductivity (u16 LE, µS/cm)
    /// - bytes 10-15: reserved
    ///
    /// # Errors
    ///
    /// - [`ParseError::InsufficientBytes`] if fewer than 16 bytes are given
    /// - [`ParseError::NoData`] if the probe sent its no-data marker
    /// - [`ParseError::InvalidValue`] for an all-zero payload or moisture above 100%
    #[must_use = "parsing returns a Result that should be handled"]
    pub fn from_bytes(data: &[u8]) -> Result<Self, ParseError> {
        use bytes::Buf;

        if data.len() < SENSOR_DATA_BYTES {
            return Err(ParseError::InsufficientBytes {
                expected: SENSOR_DATA_BYTES,
                actual: data.len(),
            });
        }
        if data.starts_with(&NO_DATA_MARKER) {
            return Err(ParseError::NoData);
        }
        if data.iter().all(|b| *b == 0) {
            return Err(ParseError::InvalidValue("all-zero sensor payload".to_string()));
        }

        let mut buf = data;
        let temp_raw = buf.get_i16_le();
        buf.advance(1);
        let light = buf.get_u32_le();
        let moisture = buf.get_u8();
        let conductivity = buf.get_u16_le();

        if moisture > 100 {
            return Err(ParseError::InvalidValue(format!(
                "moisture {}% is out of range",
                moisture
            )));
        }

        Ok(SensorData {
            temperature: f64::from(temp_raw) / 10.0,
            light,
            moisture,
            conductivity,
            captured_at: None,
        })
    }

    /// Parse sensor data, applying the extra checks newer firmware needs.
    ///
    /// Probes on firmware [`MODE_CHANGE_FIRMWARE`] or newer fill the reserved
    /// bytes; a payload with those bytes zeroed was read before the mode
    /// change took effect and is rejected.
    pub fn from_bytes_for_firmware(data: &[u8], firmware: &str) -> Result<Self, ParseError> {
        let reading = Self::from_bytes(data)?;
        if needs_mode_change(firmware) && data[10..SENSOR_DATA_BYTES].iter().all(|b| *b == 0) {
            return Err(ParseError::InvalidValue(
                "reserved bytes are empty, sensor was not in live mode".to_string(),
            ));
        }
        Ok(reading)
    }

    /// Set the capture timestamp.
    #[must_use]
    pub fn captured_at(mut self, at: time::OffsetDateTime) -> Self {
        self.captured_at = Some(at);
        self
    }

    /// Value of a single parameter as a float.
    pub fn value(&self, parameter: Parameter) -> f64 {
        match parameter {
            Parameter::Conductivity => f64::from(self.conductivity),
            Parameter::Light => f64::from(self.light),
            Parameter::Moisture => f64::from(self.moisture),
            Parameter::Temperature => self.temperature,
        }
    }
}

/// Battery level and firmware version, read from one characteristic.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FirmwareInfo {
    /// Battery level percentage (0-100).
    pub battery: u8,
    /// Firmware version string, e.g. `3.2.1`.
    pub version: String,
}

impl FirmwareInfo {
    /// Parse the 7-byte firmware/battery payload.
    ///
    /// Byte 0 is the battery level, byte 1 is unused, bytes 2-6 hold the
    /// ASCII version string (NUL padded).
    pub fn from_bytes(data: &[u8]) -> Result<Self, ParseError> {
        if data.len() < FIRMWARE_BATTERY_BYTES {
            return Err(ParseError::InsufficientBytes {
                expected: FIRMWARE_BATTERY_BYTES,
                actual: data.len(),
            });
        }

        let version = String::from_utf8_lossy(&data[2..])
            .trim_end_matches('\0')
            .trim()
            .to_string();
        if version.is_empty() {
            return Err(ParseError::InvalidValue("empty firmware version".to_string()));
        }

        Ok(FirmwareInfo {
            battery: data[0],
            version,
        })
    }
}

/// Whether a probe on `firmware` needs the mode change command before its
/// sensor data can be read.
///
/// Versions are compared numerically segment by segment; versions that do
/// not parse fall back to a plain string comparison.
pub fn needs_mode_change(firmware: &str) -> bool {
    match (parse_version(firmware), parse_version(MODE_CHANGE_FIRMWARE)) {
        (Some(version), Some(threshold)) => version >= threshold,
        _ => firmware >= MODE_CHANGE_FIRMWARE,
    }
}

fn parse_version(version: &str) -> Option<Vec<u32>> {
    version
        .split('.')
        .map(|segment| segment.parse::<u32>().ok())
        .collect()
}
