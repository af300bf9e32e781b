//! # PLU Records
//!
//! A PLU (price look-up) is one priced product slot in the scale's memory.
//!
//! ## Main Zone (83 bytes, read/write)
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0x00 | 4 | PLU number, LE (0–4000) |
//! | 0x04 | 6 | item code, digit per byte |
//! | 0x0A | 28 | name line 1, CP1251 |
//! | 0x26 | 28 | name line 2, CP1251 |
//! | 0x42 | 4 | price in minor units, LE (0–999999) |
//! | 0x46 | 3 | expiry (see [`Expiry`]) |
//! | 0x49 | 2 | tare in grams, LE |
//! | 0x4B | 6 | group code, digit per byte |
//! | 0x51 | 2 | message number, LE (0–1000) |
//!
//! ## Read-Only Trailer (17 bytes, read responses only)
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0x53 | 6 | last totals reset, BCD timestamp |
//! | 0x59 | 4 | cumulative sum, LE |
//! | 0x5D | 4 | cumulative weight, LE |
//! | 0x61 | 3 | cumulative sales count, LE |
//!
//! ## Logo Marker
//!
//! When a label logo is attached, the last four bytes of *both* name lines
//! carry `{0x00, logo type, cert char, cert char}` and the names shrink to
//! 24 bytes. Line `L` (0 or 1) carries certification characters
//! `code[3 - L]` and `code[1 + L]`. That mapping never transmits `code[0]`
//! and sends `code[2]` twice; it is kept exactly as the hardware layout
//! documents it. Reading the code back interleaves the lines as
//! `[line1[26], line0[26], line1[27], line0[27]]`, so a code does not
//! survive the round trip unchanged.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::fields::{
    self, DigitCode, Expiry, check_len, decode_bcd_timestamp, decode_text,
    encode_bcd_timestamp, encode_text, read_u16, read_u32, read_uint, u16_le, u24_le, u32_le,
};
use super::WireRecord;
use crate::error::{Result, ScaleError};

/// Main-zone length (write payload).
pub const PLU_RECORD_LEN: usize = 83;

/// Read-only trailer length.
pub const PLU_TRAILER_LEN: usize = 17;

/// Full read response length.
pub const PLU_RESPONSE_LEN: usize = PLU_RECORD_LEN + PLU_TRAILER_LEN;

/// Highest PLU number.
pub const MAX_PLU_ID: u32 = 4000;

/// Highest price in minor currency units.
pub const MAX_PRICE: u32 = 999_999;

/// Highest message reference.
pub const MAX_MESSAGE_REF: u16 = 1000;

/// Name field width without a logo marker.
pub const NAME_LEN: usize = 28;

/// Name field width when the logo marker occupies the last four bytes.
pub const NAME_LEN_WITH_LOGO: usize = 24;

// ============================================================================
// LOGO MARKER
// ============================================================================

/// Logo marker carried in the tail of both name lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluLogo {
    /// Logo type (non-zero).
    pub kind: u8,
    /// Certification characters as transmitted: `marks[line] = [byte 26, byte 27]`.
    pub marks: [[u8; 2]; 2],
}

impl PluLogo {
    /// Attach logo `kind` with a certification code of up to four ASCII
    /// characters (shorter codes are zero-padded).
    pub fn new(kind: u8, cert_code: &str) -> Result<Self> {
        if kind == 0 {
            return Err(ScaleError::InvalidValue(
                "logo type 0 means no logo".to_string(),
            ));
        }
        if cert_code.len() > 4 || !cert_code.is_ascii() {
            return Err(ScaleError::InvalidValue(format!(
                "certification code '{}' must be at most 4 ASCII characters",
                cert_code
            )));
        }
        let mut code = [0u8; 4];
        code[..cert_code.len()].copy_from_slice(cert_code.as_bytes());

        let mut marks = [[0u8; 2]; 2];
        for (line, mark) in marks.iter_mut().enumerate() {
            *mark = [code[3 - line], code[1 + line]];
        }
        Ok(Self { kind, marks })
    }

    /// Certification code as read back from both lines.
    pub fn cert_code(&self) -> [u8; 4] {
        let [first, second] = self.marks;
        [second[0], first[0], second[1], first[1]]
    }

    fn tail(&self, line: usize) -> [u8; 4] {
        [0x00, self.kind, self.marks[line][0], self.marks[line][1]]
    }
}

/// A name field carries a logo marker when byte 24 is zero and the logo
/// type after it is not. A short name is zero-padded past byte 24 too, so
/// the type byte is what tells the two apart.
fn has_logo_marker(name: &[u8]) -> bool {
    name[NAME_LEN_WITH_LOGO] == 0 && name[NAME_LEN_WITH_LOGO + 1] != 0
}

// ============================================================================
// RECORD
// ============================================================================

/// Cumulative sales counters kept by the scale for one PLU.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluTotals {
    pub last_reset: Option<NaiveDateTime>,
    pub sum: u32,
    pub weight: u32,
    /// 24-bit on the wire.
    pub count: u32,
}

/// # PLU Record
///
/// ```
/// use scalelink::protocol::plu::{Plu, PLU_RECORD_LEN};
///
/// let mut plu = Plu::new(7).unwrap();
/// plu.name1 = "Apples".to_string();
/// plu.price = 12_990;
/// assert_eq!(plu.encode().unwrap().len(), PLU_RECORD_LEN);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Plu {
    pub id: u32,
    pub item_code: DigitCode,
    pub name1: String,
    pub name2: String,
    pub logo: Option<PluLogo>,
    /// Minor currency units.
    pub price: u32,
    pub expiry: Expiry,
    /// Grams.
    pub tare: u16,
    pub group_code: DigitCode,
    /// Message number, 0 for none.
    pub message: u16,
    /// Read-only on the wire; ignored by [`Plu::encode`].
    pub totals: PluTotals,
}

impl Plu {
    /// An empty record for slot `id`.
    pub fn new(id: u32) -> Result<Self> {
        let plu = Self {
            id,
            ..Default::default()
        };
        plu.validate()?;
        Ok(plu)
    }

    /// The shape of a cleared slot: everything except the id is zero.
    pub fn unused(id: u32) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    /// True when nothing but the id is set in the main zone.
    pub fn is_unused(&self) -> bool {
        let Plu { id, totals, .. } = self;
        *self
            == Plu {
                id: *id,
                totals: *totals,
                ..Default::default()
            }
    }

    pub fn validate(&self) -> Result<()> {
        if self.id > MAX_PLU_ID {
            return Err(ScaleError::InvalidValue(format!(
                "PLU number {} exceeds {}",
                self.id, MAX_PLU_ID
            )));
        }
        if self.price > MAX_PRICE {
            return Err(ScaleError::InvalidValue(format!(
                "price {} exceeds {}",
                self.price, MAX_PRICE
            )));
        }
        if self.message > MAX_MESSAGE_REF {
            return Err(ScaleError::InvalidValue(format!(
                "message number {} exceeds {}",
                self.message, MAX_MESSAGE_REF
            )));
        }
        if self.totals.count > 0xFF_FFFF {
            return Err(ScaleError::InvalidValue(format!(
                "sales count {} does not fit in 3 bytes",
                self.totals.count
            )));
        }
        self.expiry.validate()
    }

    fn encode_name(&self, text: &str, line: usize) -> Vec<u8> {
        match &self.logo {
            Some(logo) => {
                let mut out = encode_text(text, NAME_LEN_WITH_LOGO);
                out.extend(logo.tail(line));
                out
            }
            None => encode_text(text, NAME_LEN),
        }
    }

    /// Encode the 83-byte main zone (write payload).
    pub fn encode(&self) -> Result<Vec<u8>> {
        self.validate()?;
        let mut out = Vec::with_capacity(PLU_RECORD_LEN);
        out.extend(u32_le(self.id));
        out.extend(self.item_code.to_wire());
        out.extend(self.encode_name(&self.name1, 0));
        out.extend(self.encode_name(&self.name2, 1));
        out.extend(u32_le(self.price));
        out.extend(self.expiry.encode()?);
        out.extend(u16_le(self.tare));
        out.extend(self.group_code.to_wire());
        out.extend(u16_le(self.message));
        debug_assert_eq!(out.len(), PLU_RECORD_LEN);
        Ok(out)
    }

    /// Encode the 100-byte read response.
    ///
    /// An unused slot is the id followed by 96 zero bytes, whatever its
    /// counters say.
    pub fn encode_response(&self) -> Result<Vec<u8>> {
        if self.is_unused() {
            let mut out = vec![0u8; PLU_RESPONSE_LEN];
            out[..4].copy_from_slice(&u32_le(self.id));
            return Ok(out);
        }
        let mut out = self.encode()?;
        out.extend(encode_bcd_timestamp(self.totals.last_reset)?);
        out.extend(u32_le(self.totals.sum));
        out.extend(u32_le(self.totals.weight));
        out.extend(u24_le("sales count", self.totals.count)?);
        debug_assert_eq!(out.len(), PLU_RESPONSE_LEN);
        Ok(out)
    }

    /// Decode an 83-byte main zone (write payload). Totals are left at zero.
    pub fn decode_record(bytes: &[u8]) -> Result<Self> {
        check_len("PLU record", bytes, PLU_RECORD_LEN)?;

        let line1 = &bytes[10..38];
        let line2 = &bytes[38..66];
        let (logo, name_len) = if has_logo_marker(line1) {
            let logo = PluLogo {
                kind: line1[25],
                marks: [[line1[26], line1[27]], [line2[26], line2[27]]],
            };
            (Some(logo), NAME_LEN_WITH_LOGO)
        } else {
            (None, NAME_LEN)
        };

        Ok(Self {
            id: read_u32("PLU number", &bytes[0..4])?,
            item_code: DigitCode::from_wire(&bytes[4..10])?,
            name1: decode_text(&line1[..name_len]),
            name2: decode_text(&line2[..name_len]),
            logo,
            price: read_u32("price", &bytes[66..70])?,
            expiry: Expiry::decode(&bytes[70..73])?,
            tare: read_u16("tare", &bytes[73..75])?,
            group_code: DigitCode::from_wire(&bytes[75..81])?,
            message: read_u16("message number", &bytes[81..83])?,
            totals: PluTotals::default(),
        })
    }

    /// Decode a 100-byte read response.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        check_len("PLU response", bytes, PLU_RESPONSE_LEN)?;
        let mut plu = Self::decode_record(&bytes[..PLU_RECORD_LEN])?;
        let trailer = &bytes[PLU_RECORD_LEN..];
        plu.totals = PluTotals {
            last_reset: decode_bcd_timestamp(&trailer[0..6])?,
            sum: read_u32("cumulative sum", &trailer[6..10])?,
            weight: read_u32("cumulative weight", &trailer[10..14])?,
            count: read_uint("cumulative count", &trailer[14..17], 3)?,
        };
        Ok(plu)
    }
}

// ============================================================================
// UPDATE BORDERS
// ============================================================================

/// Range of PLU numbers the scale accepts updates for (command 0x87).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateBorders {
    pub start: u32,
    pub end: u32,
}

impl UpdateBorders {
    pub fn new(start: u32, end: u32) -> Result<Self> {
        let b = Self { start, end };
        b.validate()?;
        Ok(b)
    }

    pub fn validate(&self) -> Result<()> {
        if self.start > self.end || self.end > MAX_PLU_ID {
            return Err(ScaleError::InvalidValue(format!(
                "update borders {}..={} must satisfy 0 <= start <= end <= {}",
                self.start, self.end, MAX_PLU_ID
            )));
        }
        Ok(())
    }

    pub fn contains(&self, id: u32) -> bool {
        (self.start..=self.end).contains(&id)
    }
}

impl WireRecord for UpdateBorders {
    const WHAT: &'static str = "update borders";
    const LEN: usize = 8;

    fn encode(&self) -> Result<Vec<u8>> {
        self.validate()?;
        let mut out = Vec::with_capacity(Self::LEN);
        out.extend(u32_le(self.start));
        out.extend(u32_le(self.end));
        Ok(out)
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        check_len(Self::WHAT, bytes, Self::LEN)?;
        Self::new(
            fields::read_u32("border start", &bytes[0..4])?,
            fields::read_u32("border end", &bytes[4..8])?,
        )
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    fn sample() -> Plu {
        Plu {
            id: 42,
            item_code: "123456".parse().unwrap(),
            name1: "Сыр Российский".to_string(),
            name2: "весовой".to_string(),
            logo: None,
            price: 45_990,
            expiry: Expiry::days(30).unwrap(),
            tare: 15,
            group_code: "7".parse().unwrap(),
            message: 3,
            totals: PluTotals::default(),
        }
    }

    #[test]
    fn test_main_zone_is_83_bytes() {
        assert_eq!(sample().encode().unwrap().len(), PLU_RECORD_LEN);
    }

    #[test]
    fn test_main_zone_offsets() {
        let bytes = sample().encode().unwrap();
        assert_eq!(&bytes[0..4], &[42, 0, 0, 0]);
        assert_eq!(&bytes[4..10], &[1, 2, 3, 4, 5, 6]);
        assert_eq!(bytes[10], 0xD1); // С
        assert_eq!(&bytes[66..70], &45_990u32.to_le_bytes());
        assert_eq!(&bytes[70..73], &[0x00, 0x00, 0x30]);
        assert_eq!(&bytes[73..75], &[15, 0]);
        assert_eq!(&bytes[75..81], &[0, 0, 0, 0, 0, 7]);
        assert_eq!(&bytes[81..83], &[3, 0]);
    }

    #[test]
    fn test_record_roundtrip() {
        let plu = sample();
        assert_eq!(Plu::decode_record(&plu.encode().unwrap()).unwrap(), plu);
    }

    #[test]
    fn test_response_roundtrip_with_totals() {
        let mut plu = sample();
        plu.totals = PluTotals {
            last_reset: NaiveDate::from_ymd_opt(2025, 1, 31)
                .unwrap()
                .and_hms_opt(8, 0, 59),
            sum: 1_234_567,
            weight: 89_000,
            count: 0x00AB_CDEF,
        };
        let bytes = plu.encode_response().unwrap();
        assert_eq!(bytes.len(), PLU_RESPONSE_LEN);
        assert_eq!(Plu::decode(&bytes).unwrap(), plu);
    }

    #[test]
    fn test_encoding_is_idempotent() {
        let plu = sample();
        assert_eq!(plu.encode().unwrap(), plu.encode().unwrap());
    }

    #[test]
    fn test_unused_slot_echoes_id_and_zeros() {
        let bytes = Plu::unused(17).encode_response().unwrap();
        assert_eq!(bytes.len(), PLU_RESPONSE_LEN);
        assert_eq!(&bytes[..4], &[17, 0, 0, 0]);
        assert!(bytes[4..].iter().all(|&b| b == 0));
        assert!(Plu::decode(&bytes).unwrap().is_unused());
    }

    #[test]
    fn test_unused_slot_hides_counters() {
        let mut plu = Plu::unused(5);
        plu.totals.sum = 999;
        let bytes = plu.encode_response().unwrap();
        assert!(bytes[4..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_full_length_name_without_logo() {
        let mut plu = sample();
        plu.name1 = "ABCDEFGHIJKLMNOPQRSTUVWXYZ12".to_string();
        let decoded = Plu::decode_record(&plu.encode().unwrap()).unwrap();
        assert_eq!(decoded.name1, "ABCDEFGHIJKLMNOPQRSTUVWXYZ12");
        assert_eq!(decoded.logo, None);
    }

    #[test]
    fn test_name_truncated_with_logo() {
        let mut plu = sample();
        plu.name1 = "ABCDEFGHIJKLMNOPQRSTUVWXYZ12".to_string();
        plu.logo = Some(PluLogo::new(1, "ABCD").unwrap());
        let bytes = plu.encode().unwrap();
        assert_eq!(&bytes[10 + 24..10 + 28], &[0, 1, b'D', b'B']);
        assert_eq!(&bytes[38 + 24..38 + 28], &[0, 1, b'C', b'C']);

        let decoded = Plu::decode_record(&bytes).unwrap();
        assert_eq!(decoded.name1, "ABCDEFGHIJKLMNOPQRSTUVWX");
        let logo = decoded.logo.unwrap();
        assert_eq!(logo.kind, 1);
        assert_eq!(&logo.cert_code(), b"CDCB");
    }

    #[test]
    fn test_cert_code_reads_lines_interleaved() {
        let logo = PluLogo {
            kind: 2,
            marks: [[b'1', b'2'], [b'3', b'4']],
        };
        assert_eq!(&logo.cert_code(), b"3142");
    }

    #[test]
    fn test_short_name_is_not_a_logo() {
        let mut plu = sample();
        plu.name1 = "Milk".to_string();
        let decoded = Plu::decode_record(&plu.encode().unwrap()).unwrap();
        assert_eq!(decoded.logo, None);
        assert_eq!(decoded.name1, "Milk");
    }

    #[test]
    fn test_logo_roundtrip() {
        let mut plu = sample();
        plu.logo = Some(PluLogo::new(2, "RST").unwrap());
        assert_eq!(Plu::decode_record(&plu.encode().unwrap()).unwrap(), plu);
    }

    #[test]
    fn test_logo_validation() {
        assert!(PluLogo::new(0, "ABCD").is_err());
        assert!(PluLogo::new(1, "ABCDE").is_err());
    }

    #[test]
    fn test_validation() {
        assert!(Plu::new(4000).is_ok());
        assert!(Plu::new(4001).is_err());
        let mut plu = sample();
        plu.price = 1_000_000;
        assert!(plu.encode().is_err());
        let mut plu = sample();
        plu.message = 1001;
        assert!(plu.encode().is_err());
    }

    #[test]
    fn test_wrong_lengths() {
        assert!(matches!(
            Plu::decode(&[0u8; 83]),
            Err(ScaleError::LengthMismatch { expected: 100, actual: 83, .. })
        ));
        assert!(matches!(
            Plu::decode_record(&[0u8; 100]),
            Err(ScaleError::LengthMismatch { expected: 83, actual: 100, .. })
        ));
    }

    #[test]
    fn test_update_borders() {
        let b = UpdateBorders::new(10, 20).unwrap();
        let bytes = b.encode().unwrap();
        assert_eq!(bytes, vec![10, 0, 0, 0, 20, 0, 0, 0]);
        assert_eq!(UpdateBorders::decode(&bytes).unwrap(), b);
        assert!(b.contains(15));
        assert!(!b.contains(21));
        assert!(UpdateBorders::new(20, 10).is_err());
        assert!(UpdateBorders::new(0, 4001).is_err());
    }
}
