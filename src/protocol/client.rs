use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Local, Utc};
use tracing::debug;

use crate::core::{
    ColorsSet, DeviceClock, Error, FirmwareVersion, FreshWaterInfo, LightType, Mode, Result, Stats,
    Status,
};
use super::message::{self, Ack, Opcode};
use super::variant::{Capability, ProtocolVariant};

/// Single in-flight request/response exchange with a kettle.
///
/// Implementations send one command and return the payload of the matching
/// response, stripped of the frame envelope.
#[async_trait]
pub trait CommandChannel: Send {
    async fn command(&mut self, opcode: Opcode, payload: &[u8]) -> Result<Bytes>;
}

/// One-shot device call that does not fit the target state model
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceAction {
    ImpulseColor { r: u8, g: u8, b: u8, brightness: u8 },
    SetSound(bool),
    SetLightSwitch { light: LightType, on: bool },
    SetColors(ColorsSet),
    SetColorInterval(u16),
    SetLampAutoOffHours(u16),
    SetFreshWater(bool),
}

/// Typed kettle operations for one protocol variant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KettleProtocol {
    variant: ProtocolVariant,
}

impl KettleProtocol {
    pub fn new(variant: ProtocolVariant) -> Self {
        KettleProtocol { variant }
    }

    pub fn variant(&self) -> ProtocolVariant {
        self.variant
    }

    /// Checks a capability, logging the skipped operation when it is missing
    fn supported(&self, capability: Capability, operation: &'static str) -> bool {
        if self.variant.supports(capability) {
            return true;
        }
        let unsupported = Error::Unsupported {
            operation,
            variant: self.variant,
        };
        debug!("{unsupported}");
        false
    }

    /// Sends the pairing key; `Ok(false)` means the kettle is not in pairing mode
    pub async fn auth<C>(&self, channel: &mut C, key: &[u8]) -> Result<bool>
    where
        C: CommandChannel + ?Sized,
    {
        let r = channel.command(Opcode::Auth, key).await?;
        let status = *r
            .first()
            .ok_or_else(|| Error::protocol("empty auth response"))?;
        let ok = self.variant.auth_accepted(status);
        debug!(ok, "auth");
        Ok(ok)
    }

    pub async fn get_version<C>(&self, channel: &mut C) -> Result<FirmwareVersion>
    where
        C: CommandChannel + ?Sized,
    {
        let r = channel.command(Opcode::GetVersion, &[]).await?;
        let version = message::parse_version(&r)?;
        debug!(%version, "version");
        Ok(version)
    }

    pub async fn get_status<C>(&self, channel: &mut C) -> Result<Status>
    where
        C: CommandChannel + ?Sized,
    {
        let r = channel.command(Opcode::GetStatus, &[]).await?;
        let status = message::parse_status(self.variant, &r)?;
        debug!(
            mode = %status.mode,
            is_on = status.is_on,
            target_temp = status.target_temp,
            current_temp = status.current_temp,
            sound_enabled = ?status.sound_enabled,
            color_interval = ?status.color_interval,
            boil_time = ?status.boil_time,
            "status"
        );
        Ok(status)
    }

    pub async fn turn_on<C>(&self, channel: &mut C) -> Result<()>
    where
        C: CommandChannel + ?Sized,
    {
        if !self.supported(Capability::TurnOn, "turn_on") {
            return Ok(());
        }
        let r = channel.command(Opcode::TurnOn, &[]).await?;
        message::expect_ack(&r, Ack::One, "turn on")?;
        debug!("turned on");
        Ok(())
    }

    pub async fn turn_off<C>(&self, channel: &mut C) -> Result<()>
    where
        C: CommandChannel + ?Sized,
    {
        let r = channel.command(Opcode::TurnOff, &[]).await?;
        message::expect_ack(&r, Ack::One, "turn off")?;
        debug!("turned off");
        Ok(())
    }

    pub async fn set_main_mode<C>(
        &self,
        channel: &mut C,
        mode: Mode,
        target_temp: u8,
        boil_time: i8,
    ) -> Result<()>
    where
        C: CommandChannel + ?Sized,
    {
        let data = message::set_main_mode_payload(self.variant, mode, target_temp, boil_time);
        let r = channel.command(Opcode::SetMainMode, &data).await?;
        message::expect_ack(&r, Ack::One, "set mode")?;
        debug!(%mode, target_temp, boil_time, "mode set");
        Ok(())
    }

    /// Writes the host clock and its current UTC offset to the kettle
    pub async fn sync_time<C>(&self, channel: &mut C) -> Result<()>
    where
        C: CommandChannel + ?Sized,
    {
        let now = Local::now();
        let offset = now.offset().local_minus_utc();
        self.sync_time_at(channel, now.with_timezone(&Utc), offset).await
    }

    pub async fn sync_time_at<C>(
        &self,
        channel: &mut C,
        now: DateTime<Utc>,
        utc_offset_secs: i32,
    ) -> Result<()>
    where
        C: CommandChannel + ?Sized,
    {
        if !self.supported(Capability::Clock, "sync_time") {
            return Ok(());
        }
        let data = message::sync_time_payload(now, utc_offset_secs);
        let r = channel.command(Opcode::SyncTime, &data).await?;
        message::expect_ack(&r, Ack::Zero, "sync time")?;
        debug!(time = %now, utc_offset_secs, "clock synced");
        Ok(())
    }

    pub async fn get_time<C>(&self, channel: &mut C) -> Result<Option<DeviceClock>>
    where
        C: CommandChannel + ?Sized,
    {
        if !self.supported(Capability::Clock, "get_time") {
            return Ok(None);
        }
        let r = channel.command(Opcode::GetTime, &[]).await?;
        let clock = message::parse_clock(&r)?;
        debug!(time = %clock.timestamp, utc_offset_secs = clock.utc_offset_secs, "device clock");
        Ok(Some(clock))
    }

    pub async fn get_lamp_auto_off_hours<C>(&self, channel: &mut C) -> Result<Option<u16>>
    where
        C: CommandChannel + ?Sized,
    {
        if !self.supported(Capability::LampAutoOff, "get_lamp_auto_off_hours") {
            return Ok(None);
        }
        let r = channel.command(Opcode::GetAutoOffHours, &[]).await?;
        let hours = message::parse_u16(&r, "lamp auto off hours")?;
        debug!(hours, "lamp auto off hours");
        Ok(Some(hours))
    }

    pub async fn set_lamp_auto_off_hours<C>(&self, channel: &mut C, hours: u16) -> Result<()>
    where
        C: CommandChannel + ?Sized,
    {
        if !self.supported(Capability::LampAutoOff, "set_lamp_auto_off_hours") {
            return Ok(());
        }
        let r = channel
            .command(Opcode::SetAutoOffHours, &message::u16_payload(hours))
            .await?;
        message::expect_ack(&r, Ack::Zero, "set lamp auto off hours")?;
        debug!(hours, "lamp auto off hours updated");
        Ok(())
    }

    pub async fn get_colors<C>(&self, channel: &mut C, light: LightType) -> Result<Option<ColorsSet>>
    where
        C: CommandChannel + ?Sized,
    {
        if !self.supported(Capability::Colors, "get_colors") {
            return Ok(None);
        }
        let r = channel.command(Opcode::GetColors, &[light as u8]).await?;
        let colors = message::parse_colors(self.variant, &r)?;
        debug!(?colors, "colors");
        Ok(Some(colors))
    }

    pub async fn set_colors<C>(&self, channel: &mut C, colors: &ColorsSet) -> Result<()>
    where
        C: CommandChannel + ?Sized,
    {
        if !self.supported(Capability::Colors, "set_colors") {
            return Ok(());
        }
        let r = channel
            .command(Opcode::SetColors, &message::colors_payload(colors))
            .await?;
        message::expect_ack(&r, Ack::Zero, "set colors")?;
        debug!(?colors, "colors updated");
        Ok(())
    }

    /// Persists settings changed since the last commit
    pub async fn commit<C>(&self, channel: &mut C) -> Result<()>
    where
        C: CommandChannel + ?Sized,
    {
        if !self.supported(Capability::CommitSettings, "commit") {
            return Ok(());
        }
        let r = channel.command(Opcode::CommitSettings, &[]).await?;
        message::expect_ack(&r, Ack::One, "commit settings")?;
        debug!("settings committed");
        Ok(())
    }

    pub async fn set_lamp_color_interval<C>(&self, channel: &mut C, secs: u16) -> Result<()>
    where
        C: CommandChannel + ?Sized,
    {
        if !self.supported(Capability::ColorInterval, "set_lamp_color_interval") {
            return Ok(());
        }
        let r = channel
            .command(Opcode::SetColorInterval, &message::u16_payload(secs))
            .await?;
        message::expect_ack(&r, Ack::Zero, "set lamp color interval")?;
        debug!(secs, "lamp color interval updated");
        Ok(())
    }

    /// Flashes a color once
    pub async fn impulse_color<C>(
        &self,
        channel: &mut C,
        (r, g, b): (u8, u8, u8),
        brightness: u8,
    ) -> Result<()>
    where
        C: CommandChannel + ?Sized,
    {
        if !self.supported(Capability::ImpulseColor, "impulse_color") {
            return Ok(());
        }
        let data = message::impulse_payload(r, g, b, brightness, 0);
        let resp = channel.command(Opcode::ImpulseColor, &data).await?;
        message::expect_ack(&resp, Ack::One, "fire color impulse")?;
        debug!(r, g, b, brightness, "impulse");
        Ok(())
    }

    pub async fn set_light_switch<C>(&self, channel: &mut C, light: LightType, on: bool) -> Result<()>
    where
        C: CommandChannel + ?Sized,
    {
        if !self.supported(Capability::LightSwitch, "set_light_switch") {
            return Ok(());
        }
        let data = message::set_light_switch_payload(light, on);
        let r = channel.command(Opcode::SetLightSwitch, &data).await?;
        message::expect_ack(&r, Ack::Zero, "switch light")?;
        debug!(light = light.name(), on, "light switched");
        Ok(())
    }

    pub async fn get_light_switch<C>(&self, channel: &mut C, light: LightType) -> Result<Option<bool>>
    where
        C: CommandChannel + ?Sized,
    {
        if !self.supported(Capability::LightSwitch, "get_light_switch") {
            return Ok(None);
        }
        let r = channel.command(Opcode::GetLightSwitch, &[light as u8]).await?;
        let on = message::parse_light_switch(&r)?;
        debug!(light = light.name(), on, "light switch");
        Ok(Some(on))
    }

    pub async fn set_sound<C>(&self, channel: &mut C, on: bool) -> Result<()>
    where
        C: CommandChannel + ?Sized,
    {
        if !self.supported(Capability::Sound, "set_sound") {
            return Ok(());
        }
        let r = channel.command(Opcode::SetSound, &[u8::from(on)]).await?;
        message::expect_ack(&r, Ack::One, "switch sound")?;
        debug!(on, "sound switched");
        Ok(())
    }

    pub async fn set_fresh_water<C>(&self, channel: &mut C, on: bool, reserved: u16) -> Result<()>
    where
        C: CommandChannel + ?Sized,
    {
        if !self.supported(Capability::FreshWater, "set_fresh_water") {
            return Ok(());
        }
        let data = message::fresh_water_payload(on, reserved);
        // The kettle's answer carries no status byte worth checking
        channel.command(Opcode::SetFreshWater, &data).await?;
        debug!(on, "fresh water reminder switched");
        Ok(())
    }

    pub async fn get_fresh_water<C>(&self, channel: &mut C) -> Result<Option<FreshWaterInfo>>
    where
        C: CommandChannel + ?Sized,
    {
        if !self.supported(Capability::FreshWater, "get_fresh_water") {
            return Ok(None);
        }
        let r = channel.command(Opcode::GetFreshWater, &[0x00]).await?;
        let info = message::parse_fresh_water(self.variant, &r)?;
        debug!(is_on = info.is_on, hours = info.freshness_hours, "fresh water");
        Ok(Some(info))
    }

    pub async fn get_stats<C>(&self, channel: &mut C) -> Result<Option<Stats>>
    where
        C: CommandChannel + ?Sized,
    {
        if !self.supported(Capability::Stats, "get_stats") {
            return Ok(None);
        }
        let first = channel.command(Opcode::GetStats1, &[0x00]).await?;
        let second = channel.command(Opcode::GetStats2, &[0x00]).await?;
        let stats = message::parse_stats(self.variant, &first, &second)?;
        debug!(
            ontime = ?stats.ontime,
            energy_wh = stats.energy_wh,
            heater_on_count = stats.heater_on_count,
            user_on_count = stats.user_on_count,
            "stats"
        );
        Ok(Some(stats))
    }

    /// Runs a one-shot action
    pub async fn apply<C>(&self, channel: &mut C, action: &DeviceAction) -> Result<()>
    where
        C: CommandChannel + ?Sized,
    {
        match action {
            DeviceAction::ImpulseColor { r, g, b, brightness } => {
                self.impulse_color(channel, (*r, *g, *b), *brightness).await
            }
            DeviceAction::SetSound(on) => self.set_sound(channel, *on).await,
            DeviceAction::SetLightSwitch { light, on } => {
                self.set_light_switch(channel, *light, *on).await
            }
            DeviceAction::SetColors(colors) => self.set_colors(channel, colors).await,
            DeviceAction::SetColorInterval(secs) => self.set_lamp_color_interval(channel, *secs).await,
            DeviceAction::SetLampAutoOffHours(hours) => {
                self.set_lamp_auto_off_hours(channel, *hours).await
            }
            DeviceAction::SetFreshWater(on) => {
                self.set_fresh_water(channel, *on, message::FRESH_WATER_RESERVED).await
            }
        }
    }
}
