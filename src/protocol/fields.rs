//! # Field Codecs
//!
//! Fixed-width primitives every record layout is built from.
//!
//! | Codec | Width | Notes |
//! |-------|-------|-------|
//! | Unsigned integer | 1–4 bytes | little-endian |
//! | Text | N bytes | CP1251, zero-padded, silently truncated |
//! | [`DigitCode`] | 6 bytes | one decimal digit (0–9) per byte |
//! | BCD | 1, 3 or 6 bytes | tens in the high nibble |
//! | [`Expiry`] | 3 bytes | date or day count, selected by byte 0 |
//!
//! Any decoder handed the wrong number of bytes fails with
//! [`ScaleError::LengthMismatch`]: that is a framing problem, not a bad value.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

use super::cp1251;
use crate::error::{Result, ScaleError};

// ============================================================================
// LENGTH CHECKS
// ============================================================================

/// Fail with `LengthMismatch` unless `bytes` is exactly `expected` long.
#[inline]
pub fn check_len(what: &'static str, bytes: &[u8], expected: usize) -> Result<()> {
    if bytes.len() != expected {
        return Err(ScaleError::length(what, expected, bytes.len()));
    }
    Ok(())
}

// ============================================================================
// LITTLE-ENDIAN INTEGERS
// ============================================================================

/// Encode a u16 value as little-endian bytes [low, high]
#[inline]
pub const fn u16_le(value: u16) -> [u8; 2] {
    value.to_le_bytes()
}

/// Encode a u32 value as little-endian bytes
#[inline]
pub const fn u32_le(value: u32) -> [u8; 4] {
    value.to_le_bytes()
}

/// Encode the low three bytes of a value (counters on the wire are 24-bit).
pub fn u24_le(what: &'static str, value: u32) -> Result<[u8; 3]> {
    if value > 0xFF_FFFF {
        return Err(ScaleError::InvalidValue(format!(
            "{} {} does not fit in 3 bytes",
            what, value
        )));
    }
    let b = value.to_le_bytes();
    Ok([b[0], b[1], b[2]])
}

/// Decode a 1–4 byte little-endian unsigned integer.
pub fn read_uint(what: &'static str, bytes: &[u8], width: usize) -> Result<u32> {
    check_len(what, bytes, width)?;
    if !(1..=4).contains(&width) {
        return Err(ScaleError::length(what, 4, width));
    }
    Ok(bytes
        .iter()
        .rev()
        .fold(0u32, |acc, &b| (acc << 8) | b as u32))
}

#[inline]
pub fn read_u16(what: &'static str, bytes: &[u8]) -> Result<u16> {
    read_uint(what, bytes, 2).map(|v| v as u16)
}

#[inline]
pub fn read_u32(what: &'static str, bytes: &[u8]) -> Result<u32> {
    read_uint(what, bytes, 4)
}

// ============================================================================
// TEXT
// ============================================================================

/// Encode text into a fixed-width field.
///
/// The string is converted to CP1251, truncated to `width` bytes and
/// right-padded with zero bytes.
pub fn encode_text(s: &str, width: usize) -> Vec<u8> {
    let mut bytes = cp1251::encode(s);
    bytes.truncate(width);
    bytes.resize(width, 0);
    bytes
}

/// Decode a zero-padded text field.
///
/// Reading stops at the first zero byte; undecodable bytes are skipped.
pub fn decode_text(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    cp1251::decode(&bytes[..end])
}

// ============================================================================
// DIGIT-PER-BYTE CODE
// ============================================================================

/// Width of a digit-per-byte code on the wire.
pub const DIGIT_CODE_LEN: usize = 6;

/// # Six-Digit Code
///
/// Item and group codes travel as six bytes, each holding one decimal digit
/// (0–9), most significant first. `"123"` is sent as `[0, 0, 0, 1, 2, 3]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DigitCode([u8; DIGIT_CODE_LEN]);

impl DigitCode {
    /// Build from a numeric value (0–999999).
    pub fn from_value(value: u32) -> Result<Self> {
        if value > 999_999 {
            return Err(ScaleError::InvalidValue(format!(
                "code {} has more than 6 digits",
                value
            )));
        }
        let mut digits = [0u8; DIGIT_CODE_LEN];
        let mut v = value;
        for slot in digits.iter_mut().rev() {
            *slot = (v % 10) as u8;
            v /= 10;
        }
        Ok(Self(digits))
    }

    /// Numeric value of the code.
    pub fn value(&self) -> u32 {
        self.0.iter().fold(0, |acc, &d| acc * 10 + d as u32)
    }

    /// Wire form: six bytes valued 0–9.
    pub fn to_wire(&self) -> [u8; DIGIT_CODE_LEN] {
        self.0
    }

    /// Parse the wire form. Bytes above 9 are rejected.
    pub fn from_wire(bytes: &[u8]) -> Result<Self> {
        check_len("digit code", bytes, DIGIT_CODE_LEN)?;
        let mut digits = [0u8; DIGIT_CODE_LEN];
        for (slot, &b) in digits.iter_mut().zip(bytes) {
            if b > 9 {
                return Err(ScaleError::InvalidValue(format!(
                    "digit code byte 0x{:02X} is not a decimal digit",
                    b
                )));
            }
            *slot = b;
        }
        Ok(Self(digits))
    }
}

impl FromStr for DigitCode {
    type Err = ScaleError;

    /// Parse up to six ASCII digits, left-zero-filled.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.len() > DIGIT_CODE_LEN || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ScaleError::InvalidValue(format!(
                "'{}' is not a code of up to 6 digits",
                s
            )));
        }
        let mut digits = [0u8; DIGIT_CODE_LEN];
        let offset = DIGIT_CODE_LEN - s.len();
        for (i, b) in s.bytes().enumerate() {
            digits[offset + i] = b - b'0';
        }
        Ok(Self(digits))
    }
}

impl fmt::Display for DigitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for d in self.0 {
            write!(f, "{}", d)?;
        }
        Ok(())
    }
}

impl TryFrom<String> for DigitCode {
    type Error = ScaleError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<DigitCode> for String {
    fn from(code: DigitCode) -> Self {
        code.to_string()
    }
}

// ============================================================================
// BCD
// ============================================================================

/// Pack 0–99 into one BCD byte (tens in the high nibble).
pub fn bcd_encode_byte(value: u8) -> Result<u8> {
    if value > 99 {
        return Err(ScaleError::InvalidValue(format!(
            "{} does not fit in one BCD byte",
            value
        )));
    }
    Ok(((value / 10) << 4) | (value % 10))
}

/// Unpack one BCD byte. Nibbles are taken at face value.
#[inline]
pub fn bcd_decode_byte(byte: u8) -> u8 {
    (byte >> 4) * 10 + (byte & 0x0F)
}

/// Encode a value as `width` BCD bytes, most significant byte first.
pub fn bcd_encode(value: u32, width: usize) -> Result<Vec<u8>> {
    let mut out = vec![0u8; width];
    let mut v = value;
    for slot in out.iter_mut().rev() {
        *slot = bcd_encode_byte((v % 100) as u8)?;
        v /= 100;
    }
    if v != 0 {
        return Err(ScaleError::InvalidValue(format!(
            "{} does not fit in {} BCD bytes",
            value, width
        )));
    }
    Ok(out)
}

/// Decode BCD bytes: `value = value * 100 + high * 10 + low` per byte.
pub fn bcd_decode(bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .fold(0u32, |acc, &b| acc * 100 + bcd_decode_byte(b) as u32)
}

// ============================================================================
// BCD TIMESTAMP
// ============================================================================

/// Width of a BCD timestamp: second, minute, hour, day, month, year.
pub const BCD_TIMESTAMP_LEN: usize = 6;

/// Encode a timestamp as six BCD bytes. `None` is six zero bytes.
pub fn encode_bcd_timestamp(ts: Option<NaiveDateTime>) -> Result<[u8; BCD_TIMESTAMP_LEN]> {
    let Some(ts) = ts else {
        return Ok([0; BCD_TIMESTAMP_LEN]);
    };
    if !(2000..=2099).contains(&ts.year()) {
        return Err(ScaleError::InvalidValue(format!(
            "timestamp year {} outside 2000-2099",
            ts.year()
        )));
    }
    Ok([
        bcd_encode_byte(ts.second() as u8)?,
        bcd_encode_byte(ts.minute() as u8)?,
        bcd_encode_byte(ts.hour() as u8)?,
        bcd_encode_byte(ts.day() as u8)?,
        bcd_encode_byte(ts.month() as u8)?,
        bcd_encode_byte((ts.year() - 2000) as u8)?,
    ])
}

/// Decode six BCD bytes. Anything that is not a valid date (including all
/// zeros, "never reset") decodes to `None`.
pub fn decode_bcd_timestamp(bytes: &[u8]) -> Result<Option<NaiveDateTime>> {
    check_len("BCD timestamp", bytes, BCD_TIMESTAMP_LEN)?;
    let v: Vec<u32> = bytes.iter().map(|&b| bcd_decode_byte(b) as u32).collect();
    Ok(
        NaiveDate::from_ymd_opt(2000 + v[5] as i32, v[4], v[3])
            .and_then(|d| d.and_hms_opt(v[2], v[1], v[0])),
    )
}

// ============================================================================
// EXPIRY
// ============================================================================

/// Width of the expiry field.
pub const EXPIRY_LEN: usize = 3;

/// Largest day count the expiry field can carry.
pub const MAX_EXPIRY_DAYS: u16 = 999;

/// # Shelf-Life Field
///
/// Three bytes whose first byte selects the meaning:
///
/// | Byte 0 | Meaning | Layout |
/// |--------|---------|--------|
/// | `0x00` | day count | bytes 1–2 BCD, `[0x01, 0x25]` = 125 days |
/// | other  | calendar date | day, month, 2-digit year, each BCD |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Expiry {
    /// Fixed expiry date. `year` is two digits (24 = 2024).
    Date { day: u8, month: u8, year: u8 },
    /// Days from packing.
    Days { days: u16 },
}

impl Default for Expiry {
    fn default() -> Self {
        Expiry::Days { days: 0 }
    }
}

impl Expiry {
    /// A calendar date, validated.
    pub fn date(day: u8, month: u8, year: u8) -> Result<Self> {
        let e = Expiry::Date { day, month, year };
        e.validate()?;
        Ok(e)
    }

    /// A day count, validated.
    pub fn days(days: u16) -> Result<Self> {
        let e = Expiry::Days { days };
        e.validate()?;
        Ok(e)
    }

    pub fn validate(&self) -> Result<()> {
        match *self {
            Expiry::Date { day, month, year } => {
                if !(1..=31).contains(&day) || !(1..=12).contains(&month) || year > 99 {
                    return Err(ScaleError::InvalidValue(format!(
                        "expiry date {:02}.{:02}.{:02} out of range",
                        day, month, year
                    )));
                }
            }
            Expiry::Days { days } => {
                if days > MAX_EXPIRY_DAYS {
                    return Err(ScaleError::InvalidValue(format!(
                        "expiry of {} days exceeds {}",
                        days, MAX_EXPIRY_DAYS
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn encode(&self) -> Result<[u8; EXPIRY_LEN]> {
        self.validate()?;
        Ok(match *self {
            Expiry::Date { day, month, year } => [
                bcd_encode_byte(day)?,
                bcd_encode_byte(month)?,
                bcd_encode_byte(year)?,
            ],
            Expiry::Days { days } => [
                0x00,
                bcd_encode_byte((days / 100) as u8)?,
                bcd_encode_byte((days % 100) as u8)?,
            ],
        })
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        check_len("expiry", bytes, EXPIRY_LEN)?;
        let expiry = if bytes[0] == 0 {
            Expiry::Days {
                days: bcd_decode(&bytes[1..3]) as u16,
            }
        } else {
            Expiry::Date {
                day: bcd_decode_byte(bytes[0]),
                month: bcd_decode_byte(bytes[1]),
                year: bcd_decode_byte(bytes[2]),
            }
        };
        expiry.validate()?;
        Ok(expiry)
    }
}

impl fmt::Display for Expiry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Expiry::Date { day, month, year } => write!(f, "{:02}.{:02}.{:02}", day, month, year),
            Expiry::Days { days } => write!(f, "{}", days),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
