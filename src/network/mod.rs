//! Transport boundary and kettle link management
//!
//! The driver does not talk to a BLE stack directly. Callers plug one in by
//! implementing [`Transport`] and [`Link`]; this module owns everything on top
//! of those four primitives.

pub mod connection;
pub mod discovery;

#[cfg(test)]
pub(crate) mod mock;

pub use self::connection::KettleConnection;
pub use self::discovery::{
    classify_scan_failure, discover_kettles, kettle_candidates, parse_scan_listing, BleAdapter,
    DiscoveredDevice, ScanError, Scanner, DEFAULT_SCAN_DURATION,
};

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::core::Result;

/// GATT service exposed by the kettles
pub const SERVICE_UUID: &str = "6e400001-b5a3-f393-e0a9-e50e24dcca9e";

/// Characteristic commands are written to
pub const TX_CHARACTERISTIC: &str = "6e400002-b5a3-f393-e0a9-e50e24dcca9e";

/// Characteristic responses are notified on
pub const RX_CHARACTERISTIC: &str = "6e400003-b5a3-f393-e0a9-e50e24dcca9e";

/// Opens sessions to devices by address
#[async_trait]
pub trait Transport: Send + Sync {
    /// Connects to `address`, optionally through a specific adapter.
    ///
    /// Implementations should give up after `timeout`; the caller also bounds
    /// the call with the same deadline.
    async fn connect(
        &self,
        address: &str,
        adapter: Option<&str>,
        timeout: Duration,
    ) -> Result<Box<dyn Link>>;
}

/// An open session to one device
#[async_trait]
pub trait Link: Send + Sync {
    /// Writes raw bytes to a characteristic
    async fn write(&mut self, characteristic: &str, data: &[u8]) -> Result<()>;

    /// Forwards every notification of `characteristic` to `sink`
    async fn subscribe(
        &mut self,
        characteristic: &str,
        sink: mpsc::UnboundedSender<Bytes>,
    ) -> Result<()>;

    /// Whether the underlying link is still alive
    fn is_connected(&self) -> bool;

    /// Unsubscribes and closes the session
    async fn disconnect(&mut self) -> Result<()>;
}
