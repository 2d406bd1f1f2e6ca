use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::core::{Error, Result};

/// Lifecycle of the link to one kettle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// No transport session
    Disconnected,

    /// Transport session being opened
    Connecting,

    /// Session open and notifications subscribed, not yet authenticated
    Connected,

    /// Auth accepted and post-auth sequence done; commands may flow
    Authenticated,

    /// Terminal; the session never comes back
    Disposed,
}

/// Inputs driving [`LinkState`] transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    /// Start opening the transport session
    Connect,
    /// Session opened and subscribed
    Established,
    /// Auth and post-auth sequence succeeded
    Authenticated,
    /// Link closed, lost or failed to open
    Disconnect,
    /// Session disposed by its owner
    Dispose,
}

impl LinkState {
    /// Returns the state after `event`, or an error for illegal transitions
    pub fn on(self, event: LinkEvent) -> Result<LinkState> {
        use LinkEvent as E;
        use LinkState as S;

        match (self, event) {
            (S::Disposed, E::Dispose) => Ok(S::Disposed),
            (S::Disposed, _) => Err(Error::Disposed),
            (_, E::Dispose) => Ok(S::Disposed),
            (_, E::Disconnect) => Ok(S::Disconnected),
            (S::Disconnected, E::Connect) => Ok(S::Connecting),
            (S::Connecting, E::Established) => Ok(S::Connected),
            (S::Connected, E::Authenticated) => Ok(S::Authenticated),
            (state, event) => Err(Error::invalid_state(format!(
                "{event:?} is not valid while {state:?}"
            ))),
        }
    }

    /// Whether a transport session is open
    pub fn is_linked(&self) -> bool {
        matches!(self, LinkState::Connected | LinkState::Authenticated)
    }

    pub fn name(&self) -> &'static str {
        match self {
            LinkState::Disconnected => "Disconnected",
            LinkState::Connecting => "Connecting",
            LinkState::Connected => "Connected",
            LinkState::Authenticated => "Authenticated",
            LinkState::Disposed => "Disposed",
        }
    }
}

/// Information about the current link state
#[derive(Debug, Clone)]
pub struct StateInfo {
    /// Current state type
    pub state_type: &'static str,
    /// Time in current state
    pub time_in_state: Duration,
}

/// Link state with the time it was entered
#[derive(Debug)]
pub struct LinkStateMachine {
    state: LinkState,
    entered: Instant,
}

impl Default for LinkStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkStateMachine {
    pub fn new() -> Self {
        LinkStateMachine {
            state: LinkState::Disconnected,
            entered: Instant::now(),
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Applies `event`, leaving the state untouched on error
    pub fn apply(&mut self, event: LinkEvent) -> Result<LinkState> {
        let next = self.state.on(event)?;
        if next != self.state {
            debug!(from = self.state.name(), to = next.name(), "link state");
            self.state = next;
            self.entered = Instant::now();
        }
        Ok(next)
    }

    /// Gets information about the current state
    pub fn get_state_info(&self) -> StateInfo {
        StateInfo {
            state_type: self.state.name(),
            time_in_state: self.entered.elapsed(),
        }
    }
}
