//! # Scale Wire Protocol
//!
//! Byte-exact codecs for everything that crosses the link, plus the command
//! table both engines frame by.
//!
//! ## Module Structure
//!
//! - [`commands`]: command codes, payload lengths, ready/error markers
//! - [`fields`]: integers, CP1251 text, digit codes, BCD, expiry
//! - [`cp1251`]: the legacy 8-bit code page
//! - [`plu`]: PLU records and update borders
//! - [`message`]: 400-byte label messages
//! - [`logo`]: primary and secondary logo blocks
//! - [`settings`]: user and factory settings
//! - [`totals`]: sales totals
//! - [`status`]: live weighing status
//! - [`keys`]: price-key bindings
//! - [`clock`]: device date and time
//!
//! ## Usage Example
//!
//! ```
//! use scalelink::protocol::{WireRecord, commands::{self, Command}};
//! use scalelink::protocol::settings::UserSettings;
//!
//! let payload = UserSettings::default().encode().unwrap();
//! let frame = commands::frame(Command::WriteUserSettings, &payload).unwrap();
//! assert_eq!(frame.len(), 1 + 9);
//! assert_eq!(frame[0], 0x8A);
//! ```
//!
//! All multi-byte integers are little-endian.

pub mod clock;
pub mod commands;
pub mod cp1251;
pub mod fields;
pub mod keys;
pub mod logo;
pub mod message;
pub mod plu;
pub mod settings;
pub mod status;
pub mod totals;

pub use commands::{Command, ERROR, READY};

use crate::error::Result;

/// A record with one fixed-length wire form, used unchanged in both
/// directions.
///
/// PLUs and messages are not `WireRecord`s: their read and write forms differ
/// in length.
pub trait WireRecord: Sized {
    /// Name used in length-mismatch errors.
    const WHAT: &'static str;
    /// Exact encoded length.
    const LEN: usize;

    fn encode(&self) -> Result<Vec<u8>>;

    fn decode(bytes: &[u8]) -> Result<Self>;
}
