//! Utility functions for miflora-core.

use btleplug::platform::PeripheralId;

/// Format a peripheral ID as a string.
///
/// On macOS, peripheral IDs are UUIDs. On other platforms they wrap the
/// Bluetooth address.
pub fn format_peripheral_id(id: &PeripheralId) -> String {
    format!("{:?}", id)
        .trim_start_matches("PeripheralId(")
        .trim_end_matches(')')
        .to_string()
}

/// Create an identifier string from an address and peripheral ID.
///
/// On macOS where addresses are 00:00:00:00:00:00, uses the peripheral ID.
/// On other platforms, uses the normalized Bluetooth address.
pub fn create_identifier(address: &str, peripheral_id: &PeripheralId) -> String {
    if is_null_address(address) {
        format_peripheral_id(peripheral_id)
    } else {
        normalize_address(address)
    }
}

/// Normalize a Bluetooth address for comparison: trimmed and upper case.
pub fn normalize_address(address: &str) -> String {
    address.trim().to_uppercase()
}

/// Whether two addresses refer to the same probe.
///
/// Comparison ignores case and separators, so `c4:7c:8d:6a:3e:01` matches
/// `C47C8D6A3E01`.
pub fn addresses_match(a: &str, b: &str) -> bool {
    let strip = |s: &str| {
        s.chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_uppercase())
            .collect::<String>()
    };
    let (a, b) = (strip(a), strip(b));
    !a.is_empty() && a == b
}

fn is_null_address(address: &str) -> bool {
    address == "00:00:00:00:00:00"
}
