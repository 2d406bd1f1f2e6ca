use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Error, Result};

/// Main operating mode of the kettle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Mode {
    Boil = 0x00,
    Heat = 0x01,
    BoilHeat = 0x02,
    Lamp = 0x03,
    /// Interactive light mode driven by color impulses
    Game = 0x04,
}

impl Mode {
    pub const ALL: [Mode; 5] = [Mode::Boil, Mode::Heat, Mode::BoilHeat, Mode::Lamp, Mode::Game];

    /// Human readable mode name
    pub fn name(&self) -> &'static str {
        match self {
            Mode::Boil => "Boil",
            Mode::Heat => "Heat",
            Mode::BoilHeat => "Boil+Heat",
            Mode::Lamp => "Lamp",
            Mode::Game => "Light",
        }
    }

    /// Looks a mode up by its human readable name
    pub fn from_name(name: &str) -> Option<Self> {
        Mode::ALL.into_iter().find(|m| m.name() == name)
    }

    /// Whether the mode keeps water at a target temperature
    pub fn is_heating(&self) -> bool {
        matches!(self, Mode::Heat | Mode::BoilHeat)
    }
}

impl TryFrom<u8> for Mode {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        Mode::ALL
            .into_iter()
            .find(|m| *m as u8 == value)
            .ok_or_else(|| Error::protocol(format!("unknown mode byte {value:#04x}")))
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Light channel selector used by color and light switch commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum LightType {
    Boil = 0x00,
    Lamp = 0x01,
    /// Backlight synchronisation with the remote app
    Sync = 0xC8,
}

impl LightType {
    pub fn name(&self) -> &'static str {
        match self {
            LightType::Boil => "boiling_light",
            LightType::Lamp => "lamp_light",
            LightType::Sync => "sync_light",
        }
    }
}

impl TryFrom<u8> for LightType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x00 => Ok(LightType::Boil),
            0x01 => Ok(LightType::Lamp),
            0xC8 => Ok(LightType::Sync),
            other => Err(Error::protocol(format!("unknown light type {other:#04x}"))),
        }
    }
}

/// Snapshot of the kettle state as reported by the status command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub mode: Mode,
    /// Target temperature in °C, 0 when the mode has none
    pub target_temp: u8,
    pub current_temp: u8,
    pub is_on: bool,
    pub sound_enabled: Option<bool>,
    /// Lamp color change interval in seconds
    pub color_interval: Option<u8>,
    /// Signed boil time offset
    pub boil_time: Option<i8>,
    pub parental_control: bool,
    pub error_code: Option<u8>,
    /// Set when the response layout for this variant is not confirmed
    pub unverified: bool,
}

impl Status {
    /// Returns a copy with a new lamp color interval
    pub fn with_color_interval(self, secs: u8) -> Self {
        Status {
            color_interval: Some(secs),
            ..self
        }
    }
}

/// Usage counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub ontime: Duration,
    pub energy_wh: u32,
    pub heater_on_count: u32,
    pub user_on_count: u32,
    pub unverified: bool,
}

/// Selects one of the three points of a color gradient
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColorLevel {
    Low,
    Mid,
    High,
}

/// Color at a given water temperature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ColorPoint {
    pub temperature: u8,
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl ColorPoint {
    pub fn rgb(&self) -> (u8, u8, u8) {
        (self.r, self.g, self.b)
    }
}

/// Three-point color gradient of one light channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorsSet {
    pub light_type: LightType,
    pub brightness: u8,
    /// Two bytes the device keeps equal to `brightness`
    pub aux: [u8; 2],
    pub low: ColorPoint,
    pub mid: ColorPoint,
    pub high: ColorPoint,
    pub unverified: bool,
}

impl ColorsSet {
    pub fn point(&self, level: ColorLevel) -> &ColorPoint {
        match level {
            ColorLevel::Low => &self.low,
            ColorLevel::Mid => &self.mid,
            ColorLevel::High => &self.high,
        }
    }

    fn with_point(self, level: ColorLevel, f: impl FnOnce(ColorPoint) -> ColorPoint) -> Self {
        let mut next = self;
        match level {
            ColorLevel::Low => next.low = f(self.low),
            ColorLevel::Mid => next.mid = f(self.mid),
            ColorLevel::High => next.high = f(self.high),
        }
        next
    }

    /// Returns a copy with a new color at `level`
    pub fn with_color(self, level: ColorLevel, (r, g, b): (u8, u8, u8)) -> Self {
        self.with_point(level, |p| ColorPoint { r, g, b, ..p })
    }

    /// Returns a copy with a new temperature threshold at `level`
    pub fn with_temperature(self, level: ColorLevel, temperature: u8) -> Self {
        self.with_point(level, |p| ColorPoint { temperature, ..p })
    }

    /// Returns a copy with a new brightness, mirrored into the aux bytes
    pub fn with_brightness(self, brightness: u8) -> Self {
        ColorsSet {
            brightness,
            aux: [brightness; 2],
            ..self
        }
    }
}

/// Fresh water reminder settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreshWaterInfo {
    pub is_on: bool,
    /// Opaque word echoed back when the setting is written
    pub reserved: u16,
    pub freshness_hours: u16,
    pub unverified: bool,
}

/// Firmware version reported after authentication
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirmwareVersion {
    pub major: u8,
    pub minor: u8,
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Device clock as read back from the kettle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceClock {
    pub timestamp: DateTime<Utc>,
    pub utc_offset_secs: i32,
}

/// Timing knobs of the connection and reconciliation loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timing {
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub connect_timeout: Duration,
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub receive_timeout: Duration,
    /// Attempts per `update()` call, the first one included
    pub max_tries: u32,
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub retry_interval: Duration,
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub stats_interval: Duration,
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub target_ttl: Duration,
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub settle_delay: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Timing {
            connect_timeout: Duration::from_secs(10),
            receive_timeout: Duration::from_millis(1500),
            max_tries: 3,
            retry_interval: Duration::from_millis(500),
            stats_interval: Duration::from_secs(15),
            target_ttl: Duration::from_secs(30),
            settle_delay: Duration::from_millis(200),
        }
    }
}

/// Configuration of one kettle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KettleConfig {
    /// BLE address, `AA:BB:CC:DD:EE:FF`
    pub address: String,
    /// Pairing key sent with the auth command
    pub key: Vec<u8>,
    /// Advertised model name, e.g. `RK-G211S`
    pub model: String,
    /// Keep the link open between updates
    #[serde(default = "default_persistent")]
    pub persistent: bool,
    /// Adapter to connect through, `None` lets the transport choose
    #[serde(default)]
    pub adapter: Option<String>,
    #[serde(default)]
    pub timing: Timing,
}

fn default_persistent() -> bool {
    true
}

impl KettleConfig {
    /// Creates a config with default timing, normalizing the address
    pub fn new(address: &str, key: Vec<u8>, model: impl Into<String>) -> Result<Self> {
        let config = KettleConfig {
            address: crate::util::normalize_mac(address)?,
            key,
            model: model.into(),
            persistent: default_persistent(),
            adapter: None,
            timing: Timing::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Validates the config and rewrites the address to `AA:BB:CC:DD:EE:FF`
    pub fn normalized(mut self) -> Result<Self> {
        self.validate()?;
        self.address = crate::util::normalize_mac(&self.address)?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        crate::util::normalize_mac(&self.address)?;
        if self.key.is_empty() || self.key.len() > super::MAX_KEY_LEN {
            return Err(Error::config(format!(
                "pairing key must be 1..={} bytes, got {}",
                super::MAX_KEY_LEN,
                self.key.len()
            )));
        }
        if self.model.trim().is_empty() {
            return Err(Error::config("model must not be empty"));
        }
        if self.timing.max_tries == 0 {
            return Err(Error::config("max_tries must be > 0"));
        }
        if self.timing.receive_timeout.is_zero() {
            return Err(Error::config("receive_timeout must be > 0"));
        }
        Ok(())
    }
}
