//! Plant registry loading.
//!
//! The registry is a JSON object mapping each probe's Bluetooth address to
//! the name of the plant it sits in:
//!
//! ```json
//! {
//!     "C4:7C:8D:6A:3E:01": "basil",
//!     "C4:7C:8D:6A:3E:02": "monstera"
//! }
//! ```
//!
//! It is read once at startup and never changes afterwards.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde_json::Value;

/// One probe/plant pair from the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlantEntry {
    /// Bluetooth address of the probe, as written in the file.
    pub address: String,
    /// Human readable plant name.
    pub plant: String,
}

/// The probes to poll, in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlantRegistry {
    entries: Vec<PlantEntry>,
}

impl PlantRegistry {
    /// Load the registry from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::parse(&content, path)
    }

    /// Parse a registry from a JSON string.
    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        Self::parse(content, Path::new("<string>"))
    }

    fn parse(content: &str, path: &Path) -> Result<Self, ConfigError> {
        let value: Value = serde_json::from_str(content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;

        let Value::Object(map) = value else {
            return Err(ConfigError::NotAnObject {
                path: path.to_path_buf(),
                found: json_type(&value),
            });
        };

        let entries = map
            .into_iter()
            .map(|(address, plant)| PlantEntry {
                address,
                plant: match plant {
                    Value::String(name) => name,
                    other => other.to_string(),
                },
            })
            .collect();

        Ok(Self { entries })
    }

    /// All entries in file order.
    pub fn entries(&self) -> &[PlantEntry] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &PlantEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up the plant for an address, ignoring case.
    pub fn plant_for(&self, address: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.address.eq_ignore_ascii_case(address))
            .map(|e| e.plant.as_str())
    }

    /// Registered addresses, upper case.
    pub fn known_addresses(&self) -> BTreeSet<String> {
        self.entries
            .iter()
            .map(|e| e.address.trim().to_uppercase())
            .collect()
    }
}

impl<'a> IntoIterator for &'a PlantRegistry {
    type Item = &'a PlantEntry;
    type IntoIter = std::slice::Iter<'a, PlantEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Registry loading errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read registry file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse registry file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Registry file {path} must contain a JSON object, found {found}")]
    NotAnObject { path: PathBuf, found: &'static str },
}
