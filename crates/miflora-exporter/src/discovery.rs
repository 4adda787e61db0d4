//! Discovery mode: list nearby probes that are not in the registry yet.

use std::collections::BTreeSet;
use std::io::{self, Write};

use tracing::info;

use miflora_core::ScanOptions;
use miflora_core::scan::scan_with_options;

use crate::config::PlantRegistry;

/// Discovery mode errors.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("BLE scan failed: {0}")]
    Scan(#[from] miflora_core::Error),
    #[error("Failed to write scan results: {0}")]
    Output(#[from] io::Error),
}

/// Identifiers seen nearby that are not known, compared ignoring case.
///
/// The result holds the upper case form of each new identifier.
pub fn new_devices<K, N>(known: K, nearby: N) -> BTreeSet<String>
where
    K: IntoIterator,
    K::Item: AsRef<str>,
    N: IntoIterator,
    N::Item: AsRef<str>,
{
    let known: BTreeSet<String> = known.into_iter().map(|a| normalize(a.as_ref())).collect();
    nearby
        .into_iter()
        .map(|a| normalize(a.as_ref()))
        .filter(|a| !known.contains(a))
        .collect()
}

fn normalize(address: &str) -> String {
    address.trim().to_uppercase()
}

/// Print one line per new identifier, or a notice when there are none.
pub fn report<W: Write>(new: &BTreeSet<String>, out: &mut W) -> io::Result<()> {
    if new.is_empty() {
        writeln!(out, "no new devices detected")?;
    }
    for address in new {
        writeln!(out, "new device: {}", address)?;
    }
    Ok(())
}

/// Scan once and print the probes missing from the registry.
pub async fn run(
    registry: &PlantRegistry,
    options: ScanOptions,
) -> Result<BTreeSet<String>, DiscoveryError> {
    let probes = scan_with_options(options).await?;
    info!("Scan found {} probe(s) in range", probes.len());

    let new = new_devices(
        registry.known_addresses(),
        probes.iter().map(|p| p.identifier.as_str()),
    );
    report(&new, &mut io::stdout().lock())?;
    Ok(new)
}
