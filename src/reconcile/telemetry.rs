use std::time::Duration;

use crate::core::{
    ColorLevel, ColorsSet, FirmwareVersion, FreshWaterInfo, LightType, Mode, Stats, Status,
};
use super::target::{self, TargetState};

/// Snapshot of everything known about a kettle.
///
/// Fields stay `None` until the first successful fetch and whenever the
/// variant lacks the capability.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Telemetry {
    pub status: Option<Status>,
    pub stats: Option<Stats>,
    pub light_switch_boil: Option<bool>,
    pub light_switch_sync: Option<bool>,
    pub lamp_auto_off_hours: Option<u16>,
    pub fresh_water: Option<FreshWaterInfo>,
    pub colors_boil: Option<ColorsSet>,
    pub colors_lamp: Option<ColorsSet>,
    /// Target still waiting to be reconciled
    pub target: Option<TargetState>,
    pub firmware: Option<FirmwareVersion>,
    pub available: bool,
    pub connected: bool,
    pub auth_ok: bool,
    pub success_rate: u8,
    pub disposed: bool,
}

impl Telemetry {
    pub fn current_temp(&self) -> Option<u8> {
        self.status.map(|s| s.current_temp)
    }

    /// Running mode, `None` while the kettle is off
    pub fn current_mode(&self) -> Option<Mode> {
        self.status.filter(|s| s.is_on).map(|s| s.mode)
    }

    pub fn target_temp(&self) -> Option<u8> {
        target::effective_temp(self.target.as_ref(), self.status.as_ref())
    }

    pub fn target_mode(&self) -> Option<Mode> {
        target::effective_mode(self.target.as_ref(), self.status.as_ref())
    }

    pub fn target_mode_name(&self) -> &'static str {
        target::mode_name(self.target_mode())
    }

    pub fn sound_enabled(&self) -> Option<bool> {
        self.status.and_then(|s| s.sound_enabled)
    }

    pub fn color_interval(&self) -> Option<u8> {
        self.status.and_then(|s| s.color_interval)
    }

    pub fn boil_time(&self) -> Option<i8> {
        self.status.and_then(|s| s.boil_time)
    }

    pub fn parental_control(&self) -> Option<bool> {
        self.status.map(|s| s.parental_control)
    }

    pub fn error_code(&self) -> Option<u8> {
        self.status.and_then(|s| s.error_code)
    }

    pub fn water_freshness_hours(&self) -> Option<u16> {
        self.fresh_water.map(|f| f.freshness_hours)
    }

    pub fn ontime(&self) -> Option<Duration> {
        self.stats.map(|s| s.ontime)
    }

    pub fn energy_wh(&self) -> Option<u32> {
        self.stats.map(|s| s.energy_wh)
    }

    pub fn light_switch(&self, light: LightType) -> Option<bool> {
        match light {
            LightType::Boil => self.light_switch_boil,
            LightType::Sync => self.light_switch_sync,
            LightType::Lamp => None,
        }
    }

    /// Gradient of a light channel; only boil and lamp lights have one
    pub fn colors(&self, light: LightType) -> Option<&ColorsSet> {
        match light {
            LightType::Boil => self.colors_boil.as_ref(),
            LightType::Lamp => self.colors_lamp.as_ref(),
            LightType::Sync => None,
        }
    }

    pub(crate) fn colors_mut(&mut self, light: LightType) -> Option<&mut Option<ColorsSet>> {
        match light {
            LightType::Boil => Some(&mut self.colors_boil),
            LightType::Lamp => Some(&mut self.colors_lamp),
            LightType::Sync => None,
        }
    }

    pub fn color(&self, light: LightType, level: ColorLevel) -> Option<(u8, u8, u8)> {
        self.colors(light).map(|c| c.point(level).rgb())
    }

    pub fn brightness(&self, light: LightType) -> Option<u8> {
        self.colors(light).map(|c| c.brightness)
    }

    pub fn color_temperature(&self, light: LightType, level: ColorLevel) -> Option<u8> {
        self.colors(light).map(|c| c.point(level).temperature)
    }
}
