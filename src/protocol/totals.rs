//! # Sales Totals (40 bytes, 0x85 read / 0x86 reset)
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0 | 4 | mileage |
//! | 4 | 4 | labels printed |
//! | 8 | 4 | total sum |
//! | 12 | 3 | sales count |
//! | 15 | 4 | total weight |
//! | 19 | 4 | PLU sum |
//! | 23 | 3 | PLU sales count |
//! | 26 | 4 | PLU weight |
//! | 30 | 6 | last reset, BCD timestamp |
//! | 36 | 2 | free PLU slots |
//! | 38 | 2 | free message slots |

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::WireRecord;
use super::fields::{
    check_len, decode_bcd_timestamp, encode_bcd_timestamp, read_u16, read_u32, read_uint, u16_le,
    u24_le, u32_le,
};
use super::message::MAX_MESSAGE_ID;
use super::plu::{MAX_PLU_ID, Plu};
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SalesTotals {
    pub mileage: u32,
    pub labels: u32,
    pub sum: u32,
    pub count: u32,
    pub weight: u32,
    pub plu_sum: u32,
    pub plu_count: u32,
    pub plu_weight: u32,
    pub last_reset: Option<NaiveDateTime>,
    pub free_plu: u16,
    pub free_messages: u16,
}

impl Default for SalesTotals {
    fn default() -> Self {
        Self {
            mileage: 0,
            labels: 0,
            sum: 0,
            count: 0,
            weight: 0,
            plu_sum: 0,
            plu_count: 0,
            plu_weight: 0,
            last_reset: None,
            free_plu: MAX_PLU_ID as u16,
            free_messages: MAX_MESSAGE_ID,
        }
    }
}

impl SalesTotals {
    /// Recompute the PLU counters and free-slot counts from stored records.
    ///
    /// Overall counters, mileage and the reset stamp are kept.
    pub fn recompute<'a>(&mut self, plus: impl IntoIterator<Item = &'a Plu>, messages: usize) {
        let (mut sum, mut count, mut weight, mut used) = (0u32, 0u32, 0u32, 0u32);
        for plu in plus {
            if plu.is_unused() {
                continue;
            }
            used += 1;
            sum = sum.saturating_add(plu.totals.sum);
            count = count.saturating_add(plu.totals.count);
            weight = weight.saturating_add(plu.totals.weight);
        }
        self.plu_sum = sum;
        self.plu_count = count.min(0xFF_FFFF);
        self.plu_weight = weight;
        self.set_free(used as usize, messages);
    }

    /// Derive the free-slot counters from occupancy.
    pub fn set_free(&mut self, used_plus: usize, messages: usize) {
        self.free_plu = (MAX_PLU_ID as usize).saturating_sub(used_plus) as u16;
        self.free_messages = (MAX_MESSAGE_ID as usize).saturating_sub(messages) as u16;
    }

    /// Zero every counter and stamp the reset time. Free-slot counts survive.
    pub fn reset(&mut self, now: NaiveDateTime) {
        *self = Self {
            last_reset: Some(now),
            free_plu: self.free_plu,
            free_messages: self.free_messages,
            ..Self::default()
        };
    }
}

impl WireRecord for SalesTotals {
    const WHAT: &'static str = "sales totals";
    const LEN: usize = 40;

    fn encode(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(Self::LEN);
        out.extend(u32_le(self.mileage));
        out.extend(u32_le(self.labels));
        out.extend(u32_le(self.sum));
        out.extend(u24_le("sales count", self.count)?);
        out.extend(u32_le(self.weight));
        out.extend(u32_le(self.plu_sum));
        out.extend(u24_le("PLU sales count", self.plu_count)?);
        out.extend(u32_le(self.plu_weight));
        out.extend(encode_bcd_timestamp(self.last_reset)?);
        out.extend(u16_le(self.free_plu));
        out.extend(u16_le(self.free_messages));
        Ok(out)
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        check_len(Self::WHAT, bytes, Self::LEN)?;
        Ok(Self {
            mileage: read_u32("mileage", &bytes[0..4])?,
            labels: read_u32("labels", &bytes[4..8])?,
            sum: read_u32("sum", &bytes[8..12])?,
            count: read_uint("count", &bytes[12..15], 3)?,
            weight: read_u32("weight", &bytes[15..19])?,
            plu_sum: read_u32("PLU sum", &bytes[19..23])?,
            plu_count: read_uint("PLU count", &bytes[23..26], 3)?,
            plu_weight: read_u32("PLU weight", &bytes[26..30])?,
            last_reset: decode_bcd_timestamp(&bytes[30..36])?,
            free_plu: read_u16("free PLU", &bytes[36..38])?,
            free_messages: read_u16("free messages", &bytes[38..40])?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::plu::PluTotals;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    fn stamp() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 12, 31)
            .unwrap()
            .and_hms_opt(23, 59, 0)
            .unwrap()
    }

    #[test]
    fn test_layout_and_roundtrip() {
        let t = SalesTotals {
            mileage: 1,
            labels: 2,
            sum: 3,
            count: 4,
            weight: 5,
            plu_sum: 6,
            plu_count: 7,
            plu_weight: 8,
            last_reset: Some(stamp()),
            free_plu: 3990,
            free_messages: 995,
        };
        let bytes = t.encode().unwrap();
        assert_eq!(bytes.len(), 40);
        assert_eq!(&bytes[12..15], &[4, 0, 0]);
        assert_eq!(&bytes[30..36], &[0x00, 0x59, 0x23, 0x31, 0x12, 0x24]);
        assert_eq!(&bytes[36..38], &3990u16.to_le_bytes());
        assert_eq!(SalesTotals::decode(&bytes).unwrap(), t);
    }

    #[test]
    fn test_defaults() {
        let t = SalesTotals::default();
        assert_eq!(t.free_plu, 4000);
        assert_eq!(t.free_messages, 1000);
    }

    #[test]
    fn test_recompute_from_plus() {
        let mut a = Plu::new(1).unwrap();
        a.name1 = "A".to_string();
        a.totals = PluTotals {
            sum: 100,
            weight: 10,
            count: 1,
            ..Default::default()
        };
        let mut b = Plu::new(2).unwrap();
        b.price = 5;
        b.totals = PluTotals {
            sum: 50,
            weight: 5,
            count: 2,
            ..Default::default()
        };
        let empty = Plu::unused(3);

        let mut t = SalesTotals::default();
        t.recompute([&a, &b, &empty], 4);
        assert_eq!(t.plu_sum, 150);
        assert_eq!(t.plu_weight, 15);
        assert_eq!(t.plu_count, 3);
        assert_eq!(t.free_plu, 3998);
        assert_eq!(t.free_messages, 996);
    }

    #[test]
    fn test_reset_keeps_free_counts() {
        let mut t = SalesTotals {
            sum: 77,
            free_plu: 12,
            ..Default::default()
        };
        t.reset(stamp());
        assert_eq!(t.sum, 0);
        assert_eq!(t.free_plu, 12);
        assert_eq!(t.last_reset, Some(stamp()));
    }
}
