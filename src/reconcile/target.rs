use std::time::Duration;

use tokio::time::Instant;

use crate::core::{Mode, Status, BOIL_TEMP, LAMP_TEMP, MAX_TEMP, MIN_TEMP, ROOM_TEMP};

/// Name reported for the "no mode" state
pub const OFF: &str = "off";

/// State the caller wants the kettle in; `mode == None` means off
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetState {
    pub mode: Option<Mode>,
    pub temp: u8,
}

impl TargetState {
    pub fn new(mode: Option<Mode>, temp: u8) -> Self {
        TargetState { mode, temp }
    }

    /// Target to return to: the current mode if running, off otherwise
    pub fn restore(status: &Status) -> Self {
        TargetState {
            mode: status.is_on.then_some(status.mode),
            temp: status.target_temp,
        }
    }

    /// Temperature shown for this target
    pub fn display_temp(&self) -> Option<u8> {
        match self.mode {
            Some(mode) if mode.is_heating() => Some(self.temp),
            Some(Mode::Boil) => Some(BOIL_TEMP),
            None => Some(ROOM_TEMP),
            Some(_) => None,
        }
    }
}

/// A target together with the time it was requested
#[derive(Debug, Clone, Copy)]
pub struct PendingTarget {
    pub target: TargetState,
    pub set_at: Instant,
}

impl PendingTarget {
    pub fn new(target: TargetState) -> Self {
        PendingTarget {
            target,
            set_at: Instant::now(),
        }
    }

    /// Whether the target has been pending for longer than `ttl`
    pub fn expired(&self, ttl: Duration) -> bool {
        self.set_at.elapsed() > ttl
    }
}

/// Commands needed to move from the observed status to a target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Already there
    Keep,
    TurnOff,
    /// Set the mode, then turn on
    TurnOn(Mode),
    /// Turn off, set the mode, turn back on
    Restart(Mode),
}

pub fn plan(target: &TargetState, status: &Status) -> Transition {
    match target.mode {
        None if status.is_on => Transition::TurnOff,
        None => Transition::Keep,
        Some(mode) if !status.is_on => Transition::TurnOn(mode),
        Some(mode) if mode != status.mode => Transition::Restart(mode),
        Some(mode) if mode.is_heating() && target.temp != status.target_temp => {
            Transition::Restart(mode)
        }
        Some(_) => Transition::Keep,
    }
}

/// Display name of an optional mode
pub fn mode_name(mode: Option<Mode>) -> &'static str {
    mode.map_or(OFF, |m| m.name())
}

/// Effective target temperature: the pending target first, then the status
pub fn effective_temp(pending: Option<&TargetState>, status: Option<&Status>) -> Option<u8> {
    if let Some(target) = pending {
        return target.display_temp();
    }
    let status = status?;
    match status.mode {
        _ if !status.is_on => Some(ROOM_TEMP),
        mode if mode.is_heating() => Some(status.target_temp),
        Mode::Boil => Some(BOIL_TEMP),
        _ => None,
    }
}

/// Effective target mode: the pending target first, then the running mode
pub fn effective_mode(pending: Option<&TargetState>, status: Option<&Status>) -> Option<Mode> {
    match pending {
        Some(target) => target.mode,
        None => status.filter(|s| s.is_on).map(|s| s.mode),
    }
}

/// Target for a requested temperature.
///
/// Below the heating range means off, above it means boil. Otherwise the
/// mode is kept, except that off and plain boil switch to heating.
pub fn for_temperature(temp: u8, mode: Option<Mode>) -> TargetState {
    let mode = if temp < MIN_TEMP {
        None
    } else if temp > MAX_TEMP {
        Some(Mode::Boil)
    } else {
        match mode {
            None | Some(Mode::Boil) => Some(Mode::Heat),
            other => other,
        }
    };
    TargetState::new(mode, temp)
}

/// Target for a requested mode, given the current effective target temperature
pub fn for_mode(mode: Option<Mode>, current_temp: Option<u8>) -> TargetState {
    let temp = match (mode, current_temp) {
        (Some(Mode::Boil), _) => 0,
        (Some(Mode::Lamp | Mode::Game), _) => LAMP_TEMP,
        (_, None) => MAX_TEMP,
        (_, Some(t)) => t.clamp(MIN_TEMP, MAX_TEMP),
    };
    TargetState::new(mode, temp)
}
