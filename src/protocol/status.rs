//! # Live Status (15 bytes, 0x89)
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0 | 1 | status bits |
//! | 1 | 2 | absolute weight, grams |
//! | 3 | 4 | unit price |
//! | 7 | 4 | sum |
//! | 11 | 4 | selected PLU |
//!
//! Weight is sign-magnitude: the sign lives in bit 7 of the status byte.

use serde::{Deserialize, Serialize};

use super::WireRecord;
use super::fields::{check_len, read_u16, read_u32, u16_le, u32_le};
use crate::error::{Result, ScaleError};

pub const STATUS_OVERLOAD: u8 = 1 << 0;
pub const STATUS_TARE: u8 = 1 << 2;
pub const STATUS_ZERO: u8 = 1 << 3;
pub const STATUS_DUAL_RANGE: u8 = 1 << 5;
pub const STATUS_STABLE: u8 = 1 << 6;
pub const STATUS_NEGATIVE: u8 = 1 << 7;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveStatus {
    pub overload: bool,
    pub tare: bool,
    pub zero: bool,
    pub dual_range: bool,
    pub stable: bool,
    /// Signed grams.
    pub weight: i32,
    pub price: u32,
    pub sum: u32,
    pub plu: u32,
}

impl LiveStatus {
    pub fn status_byte(&self) -> u8 {
        let mut b = 0;
        for (set, bit) in [
            (self.overload, STATUS_OVERLOAD),
            (self.tare, STATUS_TARE),
            (self.zero, STATUS_ZERO),
            (self.dual_range, STATUS_DUAL_RANGE),
            (self.stable, STATUS_STABLE),
            (self.weight < 0, STATUS_NEGATIVE),
        ] {
            if set {
                b |= bit;
            }
        }
        b
    }
}

impl WireRecord for LiveStatus {
    const WHAT: &'static str = "live status";
    const LEN: usize = 15;

    fn encode(&self) -> Result<Vec<u8>> {
        let magnitude = u16::try_from(self.weight.unsigned_abs()).map_err(|_| {
            ScaleError::InvalidValue(format!("weight {} does not fit in 2 bytes", self.weight))
        })?;
        let mut out = Vec::with_capacity(Self::LEN);
        out.push(self.status_byte());
        out.extend(u16_le(magnitude));
        out.extend(u32_le(self.price));
        out.extend(u32_le(self.sum));
        out.extend(u32_le(self.plu));
        Ok(out)
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        check_len(Self::WHAT, bytes, Self::LEN)?;
        let status = bytes[0];
        let magnitude = read_u16("weight", &bytes[1..3])? as i32;
        Ok(Self {
            overload: status & STATUS_OVERLOAD != 0,
            tare: status & STATUS_TARE != 0,
            zero: status & STATUS_ZERO != 0,
            dual_range: status & STATUS_DUAL_RANGE != 0,
            stable: status & STATUS_STABLE != 0,
            weight: if status & STATUS_NEGATIVE != 0 {
                -magnitude
            } else {
                magnitude
            },
            price: read_u32("price", &bytes[3..7])?,
            sum: read_u32("sum", &bytes[7..11])?,
            plu: read_u32("PLU", &bytes[11..15])?,
        })
    }
}
