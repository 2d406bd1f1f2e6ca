use std::io;
use std::time::Duration;
use thiserror::Error;

use crate::protocol::ProtocolVariant;

/// Custom error types for the kettle driver
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Connect error: {0}")]
    Connect(String),

    #[error("Auth failed. You need to enable pairing mode on the kettle")]
    Auth,

    #[error("Invalid frame magic")]
    InvalidMagic,

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Device rejected command: {0}")]
    Rejected(&'static str),

    #[error("No response to command {command:#04x} within {timeout:?}")]
    ReceiveTimeout { command: u8, timeout: Duration },

    #[error("{operation} is not supported by {variant}")]
    Unsupported {
        operation: &'static str,
        variant: ProtocolVariant,
    },

    #[error("Kettle session is disposed")]
    Disposed,

    #[error("Unknown kettle model: {0}")]
    UnknownModel(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Creates a new connect error
    pub fn connect(msg: impl Into<String>) -> Self {
        Error::Connect(msg.into())
    }

    /// Creates a new protocol error
    pub fn protocol(msg: impl Into<String>) -> Self {
        Error::Protocol(msg.into())
    }

    /// Creates a new transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Error::Transport(msg.into())
    }

    /// Creates a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Creates a new invalid state error
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Error::InvalidState(msg.into())
    }

    /// Whether another reconciliation attempt can reasonably succeed.
    ///
    /// Auth rejections need the user to put the kettle into pairing mode and a
    /// disposed session never comes back, so neither is retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Auth
            | Error::Disposed
            | Error::UnknownModel(_)
            | Error::Config(_)
            | Error::Unsupported { .. } => false,
            Error::Io(_)
            | Error::Connect(_)
            | Error::InvalidMagic
            | Error::Protocol(_)
            | Error::Rejected(_)
            | Error::ReceiveTimeout { .. }
            | Error::Transport(_)
            | Error::InvalidState(_) => true,
        }
    }
}
