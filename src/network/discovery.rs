use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::protocol::{variant_for, ProtocolVariant};
use crate::util::normalize_mac;

/// Scan duration used when the caller has no preference
pub const DEFAULT_SCAN_DURATION: Duration = Duration::from_secs(3);

/// Scan failures callers need to tell apart
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScanError {
    /// Scanning needs privileges the process lacks; retrying will not help
    #[error("Permission denied while scanning: {0}")]
    PermissionDenied(String),

    #[error("Scan tool not available: {0}")]
    ToolMissing(String),

    #[error("Scan failed: {0}")]
    Failed(String),
}

/// A device seen during a scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredDevice {
    pub address: String,
    /// Advertised name, `None` when the device did not send one
    pub name: Option<String>,
}

/// A local Bluetooth adapter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BleAdapter {
    pub name: String,
    pub address: String,
}

/// Discovery boundary implemented by the host's BLE stack
#[async_trait]
pub trait Scanner: Send + Sync {
    /// Lists the local adapters
    async fn adapters(&self) -> Result<Vec<BleAdapter>, ScanError>;

    /// Scans for advertising devices for `duration`
    async fn scan(
        &self,
        adapter: Option<&str>,
        duration: Duration,
    ) -> Result<Vec<DiscoveredDevice>, ScanError>;
}

/// Parses the listing printed by an `hcitool lescan`-style scanner.
///
/// Each line is `<mac> <name>`. Lines without a valid MAC are skipped,
/// underscores in names become spaces and `(unknown)` means no name.
/// A device listed twice keeps its first entry, picking up a name from a
/// later line if the first had none.
pub fn parse_scan_listing(stdout: &str) -> Vec<DiscoveredDevice> {
    let mut devices: Vec<DiscoveredDevice> = Vec::new();

    for line in stdout.lines() {
        let mut cols = line.split_whitespace();
        let (Some(mac), Some(name)) = (cols.next(), cols.next()) else {
            continue;
        };
        let Ok(address) = normalize_mac(mac) else {
            continue;
        };
        let name = match name {
            "(unknown)" => None,
            name => Some(name.replace('_', " ")),
        };

        match devices.iter_mut().find(|d| d.address == address) {
            Some(seen) => {
                if seen.name.is_none() {
                    seen.name = name;
                }
            }
            None => devices.push(DiscoveredDevice { address, name }),
        }
    }

    devices
}

/// Maps a scanner's error output to a [`ScanError`]
pub fn classify_scan_failure(stderr: &str) -> ScanError {
    let message = stderr.trim().to_string();
    if message.contains("Operation not permitted") {
        ScanError::PermissionDenied(message)
    } else if message.contains("command not found") || message.contains("No such file or directory") {
        ScanError::ToolMissing(message)
    } else {
        ScanError::Failed(message)
    }
}

/// Keeps devices whose advertised name is a supported kettle model
pub fn kettle_candidates(devices: Vec<DiscoveredDevice>) -> Vec<(DiscoveredDevice, ProtocolVariant)> {
    devices
        .into_iter()
        .filter_map(|device| {
            let variant = variant_for(device.name.as_deref()?).ok()?;
            Some((device, variant))
        })
        .collect()
}

/// Scans and returns only the kettles
pub async fn discover_kettles(
    scanner: &dyn Scanner,
    adapter: Option<&str>,
    duration: Duration,
) -> Result<Vec<(DiscoveredDevice, ProtocolVariant)>, ScanError> {
    let devices = scanner.scan(adapter, duration).await?;
    debug!(found = devices.len(), "scan finished");
    Ok(kettle_candidates(devices))
}
