//! # Price Keys
//!
//! The keyboard has 54 price keys, each bindable to one PLU.
//!
//! - Bind (0x8B): PLU number (u32 LE) followed by the key number.
//! - Lookup (0x96): key number in, PLU number (u32 LE) out; 0 means unbound.

use serde::{Deserialize, Serialize};

use super::WireRecord;
use super::fields::{check_len, read_u32, u32_le};
use super::plu::MAX_PLU_ID;
use crate::error::{Result, ScaleError};

pub const MIN_KEY: u8 = 1;
pub const MAX_KEY: u8 = 54;

/// Lookup response length.
pub const KEY_LOOKUP_LEN: usize = 4;

#[inline]
pub fn check_key(key: u8) -> Result<()> {
    if !(MIN_KEY..=MAX_KEY).contains(&key) {
        return Err(ScaleError::InvalidValue(format!(
            "price key {} outside {}-{}",
            key, MIN_KEY, MAX_KEY
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyBinding {
    pub key: u8,
    pub plu: u32,
}

impl KeyBinding {
    pub fn new(key: u8, plu: u32) -> Result<Self> {
        let b = Self { key, plu };
        b.validate()?;
        Ok(b)
    }

    fn validate(&self) -> Result<()> {
        check_key(self.key)?;
        if self.plu > MAX_PLU_ID {
            return Err(ScaleError::InvalidValue(format!(
                "PLU number {} exceeds {}",
                self.plu, MAX_PLU_ID
            )));
        }
        Ok(())
    }
}

impl WireRecord for KeyBinding {
    const WHAT: &'static str = "price key binding";
    const LEN: usize = 5;

    fn encode(&self) -> Result<Vec<u8>> {
        self.validate()?;
        let mut out = u32_le(self.plu).to_vec();
        out.push(self.key);
        Ok(out)
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        check_len(Self::WHAT, bytes, Self::LEN)?;
        Self::new(bytes[4], read_u32("PLU number", &bytes[0..4])?)
    }
}

/// Decode a lookup response. `None` when the key is unbound.
pub fn decode_lookup(bytes: &[u8]) -> Result<Option<u32>> {
    let plu = read_u32("price key lookup", bytes)?;
    Ok((plu != 0).then_some(plu))
}

pub fn encode_lookup(plu: Option<u32>) -> [u8; KEY_LOOKUP_LEN] {
    u32_le(plu.unwrap_or(0))
}
