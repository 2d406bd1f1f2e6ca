//! Core types for the kettle driver
//!
//! This module contains the data model, configuration and error types shared
//! by the protocol, network and reconciliation layers.

pub mod error;
pub mod serde;
pub mod types;

pub use self::error::{Error, Result};
pub use self::types::{
    ColorLevel,
    ColorPoint,
    ColorsSet,
    DeviceClock,
    FirmwareVersion,
    FreshWaterInfo,
    KettleConfig,
    LightType,
    Mode,
    Stats,
    Status,
    Timing,
};

/// Lowest settable heating temperature in °C
pub const MIN_TEMP: u8 = 35;

/// Highest settable heating temperature in °C
pub const MAX_TEMP: u8 = 90;

/// Temperature reported as target while the kettle is off
pub const ROOM_TEMP: u8 = 25;

/// Temperature reported as target while boiling
pub const BOIL_TEMP: u8 = 100;

/// Temperature used for the lamp and light modes
pub const LAMP_TEMP: u8 = 85;

/// Maximum pairing key length in bytes
pub const MAX_KEY_LEN: usize = 16;
