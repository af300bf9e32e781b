//! # Settings Blocks
//!
//! ## User Settings (9 bytes, 0x95 read / 0x8A write)
//!
//! | Offset | Size | Field | Range |
//! |--------|------|-------|-------|
//! | 0 | 3 | department number, BCD | 0–999 |
//! | 3 | 1 | label format | 1–99 |
//! | 4 | 1 | barcode format | 0–8 |
//! | 5 | 1 | print offset | 1–99 |
//! | 6 | 1 | print feature mask | |
//! | 7 | 2 | auto-print weight delta, LE | 0–65535 |
//!
//! ## Factory Settings (13 bytes, 0x9B read only)
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0 | 2 | maximum weight, LE |
//! | 2 | 1 | decimal point, weight |
//! | 3 | 1 | decimal point, price |
//! | 4 | 1 | decimal point, sum |
//! | 5 | 1 | dual-range flag |
//! | 6 | 1 | weight step, upper range |
//! | 7 | 1 | weight step, lower range |
//! | 8 | 2 | price-determination weight, LE |
//! | 10 | 1 | sum rounding unit |
//! | 11 | 2 | tare limit, LE |

use serde::{Deserialize, Serialize};

use super::WireRecord;
use super::fields::{bcd_decode, bcd_encode, check_len, read_u16, u16_le};
use crate::error::{Result, ScaleError};

pub const MAX_DEPARTMENT: u16 = 999;
pub const MAX_BARCODE_FORMAT: u8 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserSettings {
    pub department: u16,
    pub label_format: u8,
    pub barcode_format: u8,
    pub print_offset: u8,
    pub print_features: u8,
    /// Grams.
    pub auto_print_delta: u16,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            department: 0,
            label_format: 1,
            barcode_format: 0,
            print_offset: 1,
            print_features: 0,
            auto_print_delta: 0,
        }
    }
}

impl UserSettings {
    pub fn validate(&self) -> Result<()> {
        let bad = |field: &str, value: u32, range: &str| {
            Err(ScaleError::InvalidValue(format!(
                "{} {} outside {}",
                field, value, range
            )))
        };
        if self.department > MAX_DEPARTMENT {
            return bad("department", self.department as u32, "0-999");
        }
        if !(1..=99).contains(&self.label_format) {
            return bad("label format", self.label_format as u32, "1-99");
        }
        if self.barcode_format > MAX_BARCODE_FORMAT {
            return bad("barcode format", self.barcode_format as u32, "0-8");
        }
        if !(1..=99).contains(&self.print_offset) {
            return bad("print offset", self.print_offset as u32, "1-99");
        }
        Ok(())
    }
}

impl WireRecord for UserSettings {
    const WHAT: &'static str = "user settings";
    const LEN: usize = 9;

    fn encode(&self) -> Result<Vec<u8>> {
        self.validate()?;
        let mut out = bcd_encode(self.department as u32, 3)?;
        out.push(self.label_format);
        out.push(self.barcode_format);
        out.push(self.print_offset);
        out.push(self.print_features);
        out.extend(u16_le(self.auto_print_delta));
        Ok(out)
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        check_len(Self::WHAT, bytes, Self::LEN)?;
        let department = bcd_decode(&bytes[0..3]);
        let settings = Self {
            department: u16::try_from(department).map_err(|_| {
                ScaleError::InvalidValue(format!("department {} out of range", department))
            })?,
            label_format: bytes[3],
            barcode_format: bytes[4],
            print_offset: bytes[5],
            print_features: bytes[6],
            auto_print_delta: read_u16("auto-print delta", &bytes[7..9])?,
        };
        settings.validate()?;
        Ok(settings)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FactorySettings {
    pub max_weight: u16,
    pub dp_weight: u8,
    pub dp_price: u8,
    pub dp_sum: u8,
    pub dual_range: u8,
    pub step_upper: u8,
    pub step_lower: u8,
    pub price_weight: u16,
    pub rounding: u8,
    pub tare_limit: u16,
}

impl Default for FactorySettings {
    fn default() -> Self {
        Self {
            max_weight: 100,
            dp_weight: 0,
            dp_price: 0,
            dp_sum: 0,
            dual_range: 0,
            step_upper: 1,
            step_lower: 1,
            price_weight: 0,
            rounding: 0,
            tare_limit: 0,
        }
    }
}

impl WireRecord for FactorySettings {
    const WHAT: &'static str = "factory settings";
    const LEN: usize = 13;

    fn encode(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(Self::LEN);
        out.extend(u16_le(self.max_weight));
        out.extend([
            self.dp_weight,
            self.dp_price,
            self.dp_sum,
            self.dual_range,
            self.step_upper,
            self.step_lower,
        ]);
        out.extend(u16_le(self.price_weight));
        out.push(self.rounding);
        out.extend(u16_le(self.tare_limit));
        Ok(out)
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        check_len(Self::WHAT, bytes, Self::LEN)?;
        Ok(Self {
            max_weight: read_u16("max weight", &bytes[0..2])?,
            dp_weight: bytes[2],
            dp_price: bytes[3],
            dp_sum: bytes[4],
            dual_range: bytes[5],
            step_upper: bytes[6],
            step_lower: bytes[7],
            price_weight: read_u16("price weight", &bytes[8..10])?,
            rounding: bytes[10],
            tare_limit: read_u16("tare limit", &bytes[11..13])?,
        })
    }
}
