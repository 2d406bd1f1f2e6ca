//! Protocol implementation module
//!
//! This module defines the kettle frame format, the per-variant command
//! payloads, the typed command layer and the link state machine.

pub mod client;
pub mod codec;
pub mod message;
pub mod state;
pub mod variant;

pub use self::client::{CommandChannel, DeviceAction, KettleProtocol};
pub use self::codec::{Frame, FrameCodec};
pub use self::message::Opcode;
pub use self::state::{LinkEvent, LinkState, LinkStateMachine, StateInfo};
pub use self::variant::{is_known_model, variant_for, Capability, ProtocolVariant};

// Constants
/// First byte of every frame
pub const FRAME_START: u8 = 0x55;

/// Last byte of every frame
pub const FRAME_END: u8 = 0xAA;

/// Largest payload a single GATT write carries
pub const MAX_PAYLOAD_LEN: usize = 16;
