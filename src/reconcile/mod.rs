//! Reconciliation module
//!
//! This module drives a kettle toward the state callers ask for: it keeps the
//! pending target, runs the update cycle with its retry policy and publishes
//! telemetry snapshots to observers.

pub mod engine;
pub mod history;
pub mod target;
pub mod telemetry;

pub use self::engine::{Kettle, UpdateOutcome, UpdateRequest};
pub use self::history::SuccessHistory;
pub use self::target::TargetState;
pub use self::telemetry::Telemetry;
