//! # Command Table
//!
//! Every exchange starts with one command byte followed by a payload whose
//! length is fixed per command. The response length is fixed too, so both
//! sides frame purely by table lookup; there are no length prefixes or
//! checksums on the wire.
//!
//! ## Frame Shape
//!
//! ```text
//! controller -> device:  [command][request payload]
//! device -> controller:  [response payload] ... 200 ms ... [0x80]
//!                    or: [0xEE] ... 200 ms ... [0x80]
//! ```
//!
//! ## Table
//!
//! | Code | Operation | Request | Response |
//! |------|-----------|---------|----------|
//! | 0x80 | ready announce | 0 | 0 |
//! | 0x81 | read PLU | 4 | 100 |
//! | 0x82 | write PLU | 83 | 0 |
//! | 0x83 | read message | 2 | 400 |
//! | 0x84 | write message | 402 | 0 |
//! | 0x85 | read sales totals | 0 | 40 |
//! | 0x86 | reset sales totals | 0 | 0 |
//! | 0x87 | set PLU update borders | 8 | 0 |
//! | 0x88 | clear PLU update borders | 0 | 0 |
//! | 0x89 | read live status | 0 | 15 |
//! | 0x8A | write user settings | 9 | 0 |
//! | 0x8B | bind price key | 5 | 0 |
//! | 0x8C | write primary logo | 516 | 0 |
//! | 0x8D | delete PLU | 4 | 0 |
//! | 0x8E | delete message | 2 | 0 |
//! | 0x92 | reset PLU totals | 4 | 0 |
//! | 0x93 | write secondary logo | 384 | 0 |
//! | 0x95 | read user settings | 0 | 9 |
//! | 0x96 | read price-key binding | 1 | 4 |
//! | 0x97 | read primary logo | 0 | 512 |
//! | 0x99 | set date | 6 | 0 |
//! | 0x9A | set time | 6 | 0 |
//! | 0x9B | read factory settings | 0 | 13 |

use std::fmt;

use crate::error::{Result, ScaleError};

/// Ready marker. Sent by the device on start-up and after every command.
pub const READY: u8 = 0x80;

/// Error marker. Sent instead of a response when a command is rejected.
pub const ERROR: u8 = 0xEE;

/// Every command the scale understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    ReadyAnnounce = 0x80,
    ReadPlu = 0x81,
    WritePlu = 0x82,
    ReadMessage = 0x83,
    WriteMessage = 0x84,
    ReadSalesTotals = 0x85,
    ResetSalesTotals = 0x86,
    SetUpdateBorders = 0x87,
    ClearUpdateBorders = 0x88,
    ReadStatus = 0x89,
    WriteUserSettings = 0x8A,
    BindPriceKey = 0x8B,
    WritePrimaryLogo = 0x8C,
    DeletePlu = 0x8D,
    DeleteMessage = 0x8E,
    ResetPluTotals = 0x92,
    WriteSecondaryLogo = 0x93,
    ReadUserSettings = 0x95,
    ReadPriceKey = 0x96,
    ReadPrimaryLogo = 0x97,
    SetDate = 0x99,
    SetTime = 0x9A,
    ReadFactorySettings = 0x9B,
}

impl Command {
    /// All commands in code order.
    pub const ALL: [Command; 23] = [
        Command::ReadyAnnounce,
        Command::ReadPlu,
        Command::WritePlu,
        Command::ReadMessage,
        Command::WriteMessage,
        Command::ReadSalesTotals,
        Command::ResetSalesTotals,
        Command::SetUpdateBorders,
        Command::ClearUpdateBorders,
        Command::ReadStatus,
        Command::WriteUserSettings,
        Command::BindPriceKey,
        Command::WritePrimaryLogo,
        Command::DeletePlu,
        Command::DeleteMessage,
        Command::ResetPluTotals,
        Command::WriteSecondaryLogo,
        Command::ReadUserSettings,
        Command::ReadPriceKey,
        Command::ReadPrimaryLogo,
        Command::SetDate,
        Command::SetTime,
        Command::ReadFactorySettings,
    ];

    #[inline]
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Exact-match lookup. Unknown codes return `None`.
    pub fn from_code(code: u8) -> Option<Command> {
        Self::ALL.iter().copied().find(|c| c.code() == code)
    }

    /// Request payload length, command byte excluded.
    pub fn request_len(self) -> usize {
        match self {
            Command::ReadyAnnounce => 0,
            Command::ReadPlu => 4,
            Command::WritePlu => 83,
            Command::ReadMessage => 2,
            Command::WriteMessage => 402,
            Command::ReadSalesTotals => 0,
            Command::ResetSalesTotals => 0,
            Command::SetUpdateBorders => 8,
            Command::ClearUpdateBorders => 0,
            Command::ReadStatus => 0,
            Command::WriteUserSettings => 9,
            Command::BindPriceKey => 5,
            Command::WritePrimaryLogo => 516,
            Command::DeletePlu => 4,
            Command::DeleteMessage => 2,
            Command::ResetPluTotals => 4,
            Command::WriteSecondaryLogo => 384,
            Command::ReadUserSettings => 0,
            Command::ReadPriceKey => 1,
            Command::ReadPrimaryLogo => 0,
            Command::SetDate => 6,
            Command::SetTime => 6,
            Command::ReadFactorySettings => 0,
        }
    }

    /// Response payload length, ready marker excluded.
    pub fn response_len(self) -> usize {
        match self {
            Command::ReadPlu => 100,
            Command::ReadMessage => 400,
            Command::ReadSalesTotals => 40,
            Command::ReadStatus => 15,
            Command::ReadUserSettings => 9,
            Command::ReadPriceKey => 4,
            Command::ReadPrimaryLogo => 512,
            Command::ReadFactorySettings => 13,
            _ => 0,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Command::ReadyAnnounce => "ready announce",
            Command::ReadPlu => "read PLU",
            Command::WritePlu => "write PLU",
            Command::ReadMessage => "read message",
            Command::WriteMessage => "write message",
            Command::ReadSalesTotals => "read sales totals",
            Command::ResetSalesTotals => "reset sales totals",
            Command::SetUpdateBorders => "set PLU update borders",
            Command::ClearUpdateBorders => "clear PLU update borders",
            Command::ReadStatus => "read live status",
            Command::WriteUserSettings => "write user settings",
            Command::BindPriceKey => "bind price key",
            Command::WritePrimaryLogo => "write primary logo",
            Command::DeletePlu => "delete PLU",
            Command::DeleteMessage => "delete message",
            Command::ResetPluTotals => "reset PLU totals",
            Command::WriteSecondaryLogo => "write secondary logo",
            Command::ReadUserSettings => "read user settings",
            Command::ReadPriceKey => "read price-key binding",
            Command::ReadPrimaryLogo => "read primary logo",
            Command::SetDate => "set date",
            Command::SetTime => "set time",
            Command::ReadFactorySettings => "read factory settings",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:02X})", self.name(), self.code())
    }
}

/// Build a request frame: command byte followed by its payload.
///
/// The payload must be exactly [`Command::request_len`] bytes.
pub fn frame(command: Command, payload: &[u8]) -> Result<Vec<u8>> {
    if payload.len() != command.request_len() {
        return Err(ScaleError::length(
            command.name(),
            command.request_len(),
            payload.len(),
        ));
    }
    let mut out = Vec::with_capacity(1 + payload.len());
    out.push(command.code());
    out.extend_from_slice(payload);
    Ok(out)
}

// ============================================================================
// TESTS
// ============================================================================
