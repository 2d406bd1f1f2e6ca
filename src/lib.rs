//! SkyKettle: driver for Redmond SkyKettle BLE kettles
//!
//! The library speaks the kettles' framed command protocol over a pluggable
//! BLE transport and keeps each device in the state its owner asked for.
//! Start with [`Kettle`], which wraps a [`KettleConfig`] and a [`Transport`]
//! implementation.

pub mod core;
pub mod network;
pub mod protocol;
pub mod reconcile;
pub mod util;

// Re-export commonly used items
pub use crate::core::{Error, KettleConfig, Mode, Result, Status, Timing};
pub use crate::network::{Link, Transport};
pub use crate::protocol::ProtocolVariant;
pub use crate::reconcile::{Kettle, Telemetry, UpdateOutcome};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
