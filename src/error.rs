//! # Error Types
//!
//! This module defines the error type used throughout the scalelink library.
//!
//! ## Taxonomy
//!
//! | Variant | Meaning | Link state afterwards |
//! |---------|---------|-----------------------|
//! | `LengthMismatch` | A payload was not its declared fixed size | usable |
//! | `DeviceError` | The scale answered `0xEE` to a recognised command | usable |
//! | `ProtocolDesync` | A byte arrived where a marker was expected | needs resync |
//! | `Unresponsive` | A read or write timed out | needs resync |
//! | `TransportClosed` | The channel was torn down mid-operation | terminal |
//! | `HandlerFault` | A device-side handler failed internally | never on the wire |
//!
//! Codec failures only abort the current operation. Recovery of the link after
//! `ProtocolDesync` or `Unresponsive` is the caller's job (see
//! [`ScaleClient::resync`](crate::client::ScaleClient::resync)).

use thiserror::Error;

/// Main error type for scalelink operations
#[derive(Debug, Error)]
pub enum ScaleError {
    /// A fixed-size field or record received the wrong number of bytes.
    #[error("length mismatch in {what}: expected {expected} bytes, got {actual}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    /// The device recognised the command and rejected it with the error marker.
    #[error("device rejected command 0x{command:02X}")]
    DeviceError { command: u8 },

    /// A byte was read where the ready or error marker was expected.
    #[error("protocol desync after command 0x{command:02X}: unexpected byte 0x{byte:02X}")]
    ProtocolDesync { command: u8, byte: u8 },

    /// The device did not answer within the configured timeout.
    #[error("device unresponsive (timeout)")]
    Unresponsive,

    /// The transport was closed while an operation was pending.
    #[error("transport closed")]
    TransportClosed,

    /// A device-side handler failed internally.
    ///
    /// Converted to the error marker at the dispatch boundary; it never
    /// reaches the wire as anything else.
    #[error("handler fault: {0}")]
    HandlerFault(String),

    /// A device-side handler refused a well-formed request (unknown id, key
    /// out of range, ...).
    #[error("rejected: {0}")]
    Rejected(String),

    /// A record field is outside its documented range.
    #[error("invalid value: {0}")]
    InvalidValue(String),

    /// Transport-level errors (opening, configuring a channel)
    #[error("transport error: {0}")]
    Transport(String),

    /// Configuration file or flag errors
    #[error("config error: {0}")]
    Config(String),

    /// I/O error wrapper
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (store, config, CLI input) errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A convenience `Result` alias using [`ScaleError`] as the error type.
pub type Result<T> = std::result::Result<T, ScaleError>;

impl ScaleError {
    /// Whether the device answered at all.
    ///
    /// `DeviceError` means the scale is reachable but refused the command;
    /// `Unresponsive` and `TransportClosed` mean it could not be reached.
    pub fn is_device_reachable(&self) -> bool {
        !matches!(self, ScaleError::Unresponsive | ScaleError::TransportClosed)
    }

    /// Whether the link must be resynchronised before the next command.
    pub fn needs_resync(&self) -> bool {
        matches!(
            self,
            ScaleError::ProtocolDesync { .. } | ScaleError::Unresponsive
        )
    }

    pub(crate) fn length(what: &'static str, expected: usize, actual: usize) -> Self {
        ScaleError::LengthMismatch {
            what,
            expected,
            actual,
        }
    }
}
