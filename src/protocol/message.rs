//! Opcodes and payload layouts of the kettle command set.
//!
//! Everything here is pure: builders turn typed values into request payloads
//! and parsers turn response payloads back into typed values, both keyed on
//! the [`ProtocolVariant`]. Multi-byte fields are little-endian.

use std::time::Duration;

use bytes::Buf;
use chrono::{DateTime, Utc};

use crate::core::{
    ColorPoint, ColorsSet, DeviceClock, Error, FirmwareVersion, FreshWaterInfo, LightType, Mode,
    Result, Stats, Status,
};
use super::variant::{Layout, ProtocolVariant};

/// Command opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    GetVersion = 0x01,
    TurnOn = 0x03,
    TurnOff = 0x04,
    SetMainMode = 0x05,
    GetStatus = 0x06,
    GetAutoOffHours = 0x30,
    SetColors = 0x32,
    GetColors = 0x33,
    SetColorInterval = 0x34,
    GetLightSwitch = 0x35,
    CommitSettings = 0x36,
    SetLightSwitch = 0x37,
    ImpulseColor = 0x38,
    SetAutoOffHours = 0x39,
    SetSound = 0x3C,
    GetStats1 = 0x47,
    GetStats2 = 0x50,
    SetFreshWater = 0x51,
    GetFreshWater = 0x52,
    SyncTime = 0x6E,
    GetTime = 0x6F,
    Auth = 0xFF,
}

impl Opcode {
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Expected first response byte of a setter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    /// Success is signalled by 0x01
    One,
    /// Success is signalled by 0x00
    Zero,
}

/// Offset added to the boil time so it fits an unsigned byte
pub const BOIL_TIME_BIAS: u8 = 0x80;

/// Length of the fixed-size status, colors, fresh water and stats payloads
pub const BLOCK_LEN: usize = 16;

/// Default value of the opaque fresh water word
pub const FRESH_WATER_RESERVED: u16 = 48;

// Upper bounds (exclusive) of levels 1..=4; everything above is level 5
const LEVEL_BOUNDS: [u8; 4] = [50, 65, 80, 90];
// Temperatures reported back for levels 1..=5
const LEVEL_TEMPS: [u8; 5] = [40, 55, 70, 85, 90];

pub fn encode_boil_time(offset: i8) -> u8 {
    BOIL_TIME_BIAS.wrapping_add(offset as u8)
}

pub fn decode_boil_time(raw: u8) -> i8 {
    raw.wrapping_sub(BOIL_TIME_BIAS) as i8
}

/// Maps a temperature to the 1..=5 level of the oldest variant, 0 stays 0
pub fn temp_to_level(temp: u8) -> u8 {
    if temp == 0 {
        return 0;
    }
    LEVEL_BOUNDS
        .iter()
        .position(|bound| temp < *bound)
        .map_or(5, |i| i as u8 + 1)
}

/// Inverse of [`temp_to_level`]; unknown levels read as 0
pub fn level_to_temp(level: u8) -> u8 {
    match level {
        1..=5 => LEVEL_TEMPS[level as usize - 1],
        _ => 0,
    }
}

fn expect_len(payload: &[u8], len: usize, what: &str) -> Result<()> {
    if payload.len() != len {
        return Err(Error::protocol(format!(
            "{what} payload must be {len} bytes, got {}",
            payload.len()
        )));
    }
    Ok(())
}

/// Checks the status byte that setters answer with
pub fn expect_ack(payload: &[u8], ack: Ack, what: &'static str) -> Result<()> {
    let status = *payload
        .first()
        .ok_or_else(|| Error::protocol(format!("empty response to {what}")))?;
    let ok = match ack {
        Ack::One => status == 1,
        Ack::Zero => status == 0,
    };
    if ok {
        Ok(())
    } else {
        Err(Error::Rejected(what))
    }
}

pub fn parse_version(payload: &[u8]) -> Result<FirmwareVersion> {
    expect_len(payload, 2, "version")?;
    Ok(FirmwareVersion {
        major: payload[0],
        minor: payload[1],
    })
}

/// Normalizes mode and temperature for the variant, returning what goes on the wire
pub fn main_mode_values(variant: ProtocolVariant, mode: Mode, target_temp: u8) -> (Mode, u8) {
    let mode = match (variant, mode) {
        (ProtocolVariant::Variant1 | ProtocolVariant::Variant2, Mode::BoilHeat) => Mode::Boil,
        _ => mode,
    };

    let (min, max) = variant.temp_range();
    let target_temp = match mode {
        Mode::Boil
            if matches!(variant, ProtocolVariant::Variant1 | ProtocolVariant::Variant2) =>
        {
            0
        }
        m if m.is_heating() => target_temp.clamp(min, max),
        _ => target_temp,
    };

    match variant {
        ProtocolVariant::Variant1 => (mode, temp_to_level(target_temp)),
        _ => (mode, target_temp),
    }
}

pub fn set_main_mode_payload(
    variant: ProtocolVariant,
    mode: Mode,
    target_temp: u8,
    boil_time: i8,
) -> Vec<u8> {
    let (mode, temp) = main_mode_values(variant, mode, target_temp);
    match variant {
        ProtocolVariant::Variant1 => vec![mode as u8, temp, 0, 0],
        ProtocolVariant::Variant2 | ProtocolVariant::Variant3 => vec![mode as u8, 0, temp, 0],
        ProtocolVariant::Variant4 => {
            let mut data = vec![0u8; BLOCK_LEN];
            data[0] = mode as u8;
            data[2] = temp;
            data[13] = encode_boil_time(boil_time);
            data
        }
    }
}

pub fn parse_status(variant: ProtocolVariant, payload: &[u8]) -> Result<Status> {
    expect_len(payload, BLOCK_LEN, "status")?;
    let unverified = !variant.layout_verified(Layout::Status);

    match variant {
        ProtocolVariant::Variant1 | ProtocolVariant::Variant2 | ProtocolVariant::Variant3 => {
            let mut mode = Mode::try_from(payload[0])?;
            let mut target_temp = payload[2];
            match variant {
                ProtocolVariant::Variant1 => target_temp = level_to_temp(target_temp),
                _ if mode == Mode::Boil && target_temp > 0 => mode = Mode::BoilHeat,
                _ => {}
            }
            Ok(Status {
                mode,
                target_temp,
                current_temp: payload[10],
                is_on: payload[8] != 0,
                sound_enabled: None,
                color_interval: None,
                boil_time: None,
                parental_control: false,
                error_code: None,
                unverified,
            })
        }
        ProtocolVariant::Variant4 => Ok(Status {
            mode: Mode::try_from(payload[0])?,
            target_temp: payload[2],
            sound_enabled: Some(payload[4] != 0),
            current_temp: payload[5],
            color_interval: Some(payload[6]),
            parental_control: payload[7] != 0,
            is_on: payload[8] != 0,
            error_code: (payload[9] != 0).then_some(payload[9]),
            boil_time: Some(decode_boil_time(payload[13])),
            unverified,
        }),
    }
}

/// Clock payload: unix time and UTC offset, both `i32`
pub fn sync_time_payload(now: DateTime<Utc>, utc_offset_secs: i32) -> Vec<u8> {
    let mut data = Vec::with_capacity(8);
    data.extend_from_slice(&(now.timestamp() as i32).to_le_bytes());
    data.extend_from_slice(&utc_offset_secs.to_le_bytes());
    data
}

pub fn parse_clock(payload: &[u8]) -> Result<DeviceClock> {
    expect_len(payload, 8, "time")?;
    let mut buf = payload;
    let secs = buf.get_i32_le();
    let utc_offset_secs = buf.get_i32_le();
    let timestamp = DateTime::<Utc>::from_timestamp(i64::from(secs), 0)
        .ok_or_else(|| Error::protocol(format!("time {secs} out of range")))?;
    Ok(DeviceClock {
        timestamp,
        utc_offset_secs,
    })
}

pub fn u16_payload(value: u16) -> Vec<u8> {
    value.to_le_bytes().to_vec()
}

pub fn parse_u16(payload: &[u8], what: &str) -> Result<u16> {
    expect_len(payload, 2, what)?;
    Ok(u16::from_le_bytes([payload[0], payload[1]]))
}

pub fn colors_payload(colors: &ColorsSet) -> Vec<u8> {
    let ColorsSet { light_type, brightness, aux, low, mid, high, .. } = colors;
    vec![
        *light_type as u8,
        low.temperature,
        *brightness,
        low.r,
        low.g,
        low.b,
        mid.temperature,
        aux[0],
        mid.r,
        mid.g,
        mid.b,
        high.temperature,
        aux[1],
        high.r,
        high.g,
        high.b,
    ]
}

pub fn parse_colors(variant: ProtocolVariant, payload: &[u8]) -> Result<ColorsSet> {
    expect_len(payload, BLOCK_LEN, "colors")?;
    let point = |at: usize| ColorPoint {
        temperature: payload[at],
        r: payload[at + 2],
        g: payload[at + 3],
        b: payload[at + 4],
    };
    Ok(ColorsSet {
        light_type: LightType::try_from(payload[0])?,
        brightness: payload[2],
        aux: [payload[7], payload[12]],
        low: point(1),
        mid: point(6),
        high: point(11),
        unverified: !variant.layout_verified(Layout::Colors),
    })
}

pub fn impulse_payload(r: u8, g: u8, b: u8, brightness: u8, interval: u16) -> Vec<u8> {
    let mut data = vec![r, g, b, brightness];
    data.extend_from_slice(&interval.to_le_bytes());
    data
}

pub fn set_light_switch_payload(light: LightType, on: bool) -> Vec<u8> {
    vec![light as u8, light as u8, u8::from(on)]
}

pub fn parse_light_switch(payload: &[u8]) -> Result<bool> {
    expect_len(payload, 5, "light switch")?;
    Ok(payload[2] != 0)
}

pub fn fresh_water_payload(on: bool, reserved: u16) -> Vec<u8> {
    let mut data = vec![0u8; BLOCK_LEN];
    data[1] = u8::from(on);
    data[2..4].copy_from_slice(&reserved.to_le_bytes());
    data
}

pub fn parse_fresh_water(variant: ProtocolVariant, payload: &[u8]) -> Result<FreshWaterInfo> {
    expect_len(payload, BLOCK_LEN, "fresh water")?;
    let mut buf = &payload[2..];
    let reserved = buf.get_u16_le();
    let freshness_hours = buf.get_u16_le();
    Ok(FreshWaterInfo {
        is_on: payload[1] != 0,
        reserved,
        freshness_hours,
        unverified: !variant.layout_verified(Layout::FreshWater),
    })
}

/// Combines the two stats responses
pub fn parse_stats(variant: ProtocolVariant, first: &[u8], second: &[u8]) -> Result<Stats> {
    expect_len(first, BLOCK_LEN, "stats")?;
    expect_len(second, BLOCK_LEN, "stats")?;

    let mut buf = &first[2..];
    let ontime = Duration::from_secs(u64::from(buf.get_u32_le()));
    let energy_wh = buf.get_u32_le();
    let heater_on_count = buf.get_u32_le();

    let mut buf = &second[3..];
    let user_on_count = buf.get_u32_le();

    Ok(Stats {
        ontime,
        energy_wh,
        heater_on_count,
        user_on_count,
        unverified: !variant.layout_verified(Layout::Stats),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v4_status(mode: u8, target: u8, is_on: bool, error: u8, boil: u8) -> Vec<u8> {
        let mut data = vec![0u8; BLOCK_LEN];
        data[0] = mode;
        data[2] = target;
        data[4] = 1;
        data[5] = 23;
        data[6] = 30;
        data[8] = u8::from(is_on);
        data[9] = error;
        data[13] = boil;
        data
    }

    #[test]
    fn test_boil_time_inverse() {
        for x in -5i8..=5 {
            assert_eq!(decode_boil_time(encode_boil_time(x)), x);
        }
        assert_eq!(encode_boil_time(0), 0x80);
        assert_eq!(encode_boil_time(-5), 0x7B);
        assert_eq!(encode_boil_time(5), 0x85);
    }

    #[test]
    fn test_level_table() {
        assert_eq!(temp_to_level(0), 0);
        assert_eq!(temp_to_level(35), 1);
        assert_eq!(temp_to_level(49), 1);
        assert_eq!(temp_to_level(50), 2);
        assert_eq!(temp_to_level(65), 3);
        assert_eq!(temp_to_level(80), 4);
        assert_eq!(temp_to_level(89), 4);
        assert_eq!(temp_to_level(90), 5);
        assert_eq!(temp_to_level(100), 5);
        assert_eq!(level_to_temp(3), 70);
        assert_eq!(level_to_temp(5), 90);
        assert_eq!(level_to_temp(9), 0);
    }

    #[test]
    fn test_main_mode_v4_layout() {
        let data = set_main_mode_payload(ProtocolVariant::Variant4, Mode::Heat, 60, -2);
        assert_eq!(data.len(), BLOCK_LEN);
        assert_eq!(data[0], Mode::Heat as u8);
        assert_eq!(data[2], 60);
        assert_eq!(data[13], 0x7E);
    }

    #[test]
    fn test_main_mode_clamps_heating_temperature() {
        let data = set_main_mode_payload(ProtocolVariant::Variant4, Mode::Heat, 99, 0);
        assert_eq!(data[2], 90);
        let data = set_main_mode_payload(ProtocolVariant::Variant3, Mode::BoilHeat, 10, 0);
        assert_eq!(data, vec![Mode::BoilHeat as u8, 0, 35, 0]);
    }

    #[test]
    fn test_main_mode_old_variants_downgrade_boil_heat() {
        let data = set_main_mode_payload(ProtocolVariant::Variant2, Mode::BoilHeat, 70, 3);
        assert_eq!(data, vec![Mode::Boil as u8, 0, 0, 0]);

        let data = set_main_mode_payload(ProtocolVariant::Variant1, Mode::Heat, 70, 0);
        assert_eq!(data, vec![Mode::Heat as u8, 3, 0, 0]);
    }

    #[test]
    fn test_parse_status_v4() {
        let status = parse_status(ProtocolVariant::Variant4, &v4_status(1, 60, true, 0, 0x82)).unwrap();
        assert_eq!(status.mode, Mode::Heat);
        assert_eq!(status.target_temp, 60);
        assert_eq!(status.current_temp, 23);
        assert!(status.is_on);
        assert_eq!(status.sound_enabled, Some(true));
        assert_eq!(status.color_interval, Some(30));
        assert_eq!(status.boil_time, Some(2));
        assert_eq!(status.error_code, None);
        assert!(!status.unverified);

        let status = parse_status(ProtocolVariant::Variant4, &v4_status(0, 0, false, 7, 0x80)).unwrap();
        assert_eq!(status.error_code, Some(7));
    }

    #[test]
    fn test_parse_status_v3_reports_boil_heat() {
        let mut data = vec![0u8; BLOCK_LEN];
        data[0] = Mode::Boil as u8;
        data[2] = 70;
        data[8] = 1;
        data[10] = 42;
        let status = parse_status(ProtocolVariant::Variant3, &data).unwrap();
        assert_eq!(status.mode, Mode::BoilHeat);
        assert_eq!(status.current_temp, 42);
        assert_eq!(status.boil_time, None);
        assert_eq!(status.sound_enabled, None);
    }

    #[test]
    fn test_parse_status_v1_levels_are_unverified() {
        let mut data = vec![0u8; BLOCK_LEN];
        data[0] = Mode::Heat as u8;
        data[2] = 4;
        let status = parse_status(ProtocolVariant::Variant1, &data).unwrap();
        assert_eq!(status.target_temp, 85);
        assert!(status.unverified);
    }

    #[test]
    fn test_parse_status_rejects_bad_payload() {
        assert!(parse_status(ProtocolVariant::Variant4, &[0u8; 15]).is_err());
        assert!(parse_status(ProtocolVariant::Variant4, &v4_status(9, 0, false, 0, 0x80)).is_err());
    }

    #[test]
    fn test_ack() {
        assert!(expect_ack(&[1], Ack::One, "turn on").is_ok());
        assert!(matches!(expect_ack(&[0], Ack::One, "turn on"), Err(Error::Rejected("turn on"))));
        assert!(expect_ack(&[0], Ack::Zero, "set colors").is_ok());
        assert!(matches!(expect_ack(&[], Ack::Zero, "set colors"), Err(Error::Protocol(_))));
    }

    #[test]
    fn test_colors_layout() {
        let wire: Vec<u8> = vec![
            0x01, 40, 200, 0, 0, 255, 65, 200, 0, 255, 0, 100, 200, 255, 0, 0,
        ];
        let colors = parse_colors(ProtocolVariant::Variant4, &wire).unwrap();
        assert_eq!(colors.light_type, LightType::Lamp);
        assert_eq!(colors.brightness, 200);
        assert_eq!(colors.low, ColorPoint { temperature: 40, r: 0, g: 0, b: 255 });
        assert_eq!(colors.high.rgb(), (255, 0, 0));
        assert!(colors.unverified);
        assert_eq!(colors_payload(&colors), wire);
    }

    #[test]
    fn test_stats_layout() {
        let mut first = vec![0u8; BLOCK_LEN];
        first[2..6].copy_from_slice(&3600u32.to_le_bytes());
        first[6..10].copy_from_slice(&1234u32.to_le_bytes());
        first[10..14].copy_from_slice(&56u32.to_le_bytes());
        let mut second = vec![0u8; BLOCK_LEN];
        second[3..7].copy_from_slice(&78u32.to_le_bytes());

        let stats = parse_stats(ProtocolVariant::Variant4, &first, &second).unwrap();
        assert_eq!(stats.ontime, Duration::from_secs(3600));
        assert_eq!(stats.energy_wh, 1234);
        assert_eq!(stats.heater_on_count, 56);
        assert_eq!(stats.user_on_count, 78);
        assert!(stats.unverified);
    }

    #[test]
    fn test_fresh_water_layout() {
        let data = fresh_water_payload(true, FRESH_WATER_RESERVED);
        assert_eq!(&data[..4], &[0, 1, 48, 0]);
        assert_eq!(data.len(), BLOCK_LEN);

        let mut reply = data.clone();
        reply[4..6].copy_from_slice(&12u16.to_le_bytes());
        let info = parse_fresh_water(ProtocolVariant::Variant4, &reply).unwrap();
        assert!(info.is_on);
        assert_eq!(info.reserved, 48);
        assert_eq!(info.freshness_hours, 12);
    }

    #[test]
    fn test_clock_layout() {
        let now = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap();
        let data = sync_time_payload(now, 3 * 3600);
        let clock = parse_clock(&data).unwrap();
        assert_eq!(clock.timestamp, now);
        assert_eq!(clock.utc_offset_secs, 10800);
    }

    #[test]
    fn test_small_payloads() {
        assert_eq!(impulse_payload(1, 2, 3, 255, 0x0102), vec![1, 2, 3, 255, 0x02, 0x01]);
        assert_eq!(set_light_switch_payload(LightType::Sync, true), vec![0xC8, 0xC8, 1]);
        assert!(parse_light_switch(&[0, 0, 1, 0, 0]).unwrap());
        assert_eq!(parse_u16(&u16_payload(600), "hours").unwrap(), 600);
        assert_eq!(parse_version(&[2, 7]).unwrap().to_string(), "2.7");
    }
}
