//! # Logo Blocks
//!
//! | Block | Bitmap | Extra | Read | Write |
//! |-------|--------|-------|------|-------|
//! | Primary | 512 bytes | 4 ASCII cert chars | 0x97 (bitmap only) | 0x8C |
//! | Secondary | 384 bytes | none | - | 0x93 |
//!
//! The scale treats bitmaps as opaque; no pixel layout is interpreted here.

use serde::{Deserialize, Serialize};

use super::WireRecord;
use super::fields::check_len;
use crate::error::{Result, ScaleError};

pub const PRIMARY_BITMAP_LEN: usize = 512;
pub const CERT_CODE_LEN: usize = 4;
pub const SECONDARY_BITMAP_LEN: usize = 384;

/// Primary logo with its certification code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimaryLogo {
    pub bitmap: Vec<u8>,
    pub cert_code: [u8; CERT_CODE_LEN],
}

impl PrimaryLogo {
    pub fn new(bitmap: Vec<u8>, cert_code: &str) -> Result<Self> {
        if cert_code.len() != CERT_CODE_LEN || !cert_code.is_ascii() {
            return Err(ScaleError::InvalidValue(format!(
                "certification code '{}' must be exactly 4 ASCII characters",
                cert_code
            )));
        }
        let mut code = [0u8; CERT_CODE_LEN];
        code.copy_from_slice(cert_code.as_bytes());
        let logo = Self {
            bitmap,
            cert_code: code,
        };
        logo.validate()?;
        Ok(logo)
    }

    /// A blank logo: what the scale returns when none is stored.
    pub fn blank() -> Self {
        Self {
            bitmap: vec![0; PRIMARY_BITMAP_LEN],
            cert_code: [b'0'; CERT_CODE_LEN],
        }
    }

    fn validate(&self) -> Result<()> {
        check_len("primary logo bitmap", &self.bitmap, PRIMARY_BITMAP_LEN)
    }

    /// Decode the 512-byte read response. The code is not sent back.
    pub fn decode_bitmap(bytes: &[u8]) -> Result<Vec<u8>> {
        check_len("primary logo bitmap", bytes, PRIMARY_BITMAP_LEN)?;
        Ok(bytes.to_vec())
    }
}

impl WireRecord for PrimaryLogo {
    const WHAT: &'static str = "primary logo";
    const LEN: usize = PRIMARY_BITMAP_LEN + CERT_CODE_LEN;

    fn encode(&self) -> Result<Vec<u8>> {
        self.validate()?;
        let mut out = Vec::with_capacity(Self::LEN);
        out.extend_from_slice(&self.bitmap);
        out.extend_from_slice(&self.cert_code);
        Ok(out)
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        check_len(Self::WHAT, bytes, Self::LEN)?;
        let mut cert_code = [0u8; CERT_CODE_LEN];
        cert_code.copy_from_slice(&bytes[PRIMARY_BITMAP_LEN..]);
        Ok(Self {
            bitmap: bytes[..PRIMARY_BITMAP_LEN].to_vec(),
            cert_code,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecondaryLogo {
    pub bitmap: Vec<u8>,
}

impl SecondaryLogo {
    pub fn new(bitmap: Vec<u8>) -> Result<Self> {
        check_len("secondary logo", &bitmap, SECONDARY_BITMAP_LEN)?;
        Ok(Self { bitmap })
    }
}

impl WireRecord for SecondaryLogo {
    const WHAT: &'static str = "secondary logo";
    const LEN: usize = SECONDARY_BITMAP_LEN;

    fn encode(&self) -> Result<Vec<u8>> {
        check_len(Self::WHAT, &self.bitmap, Self::LEN)?;
        Ok(self.bitmap.clone())
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        Self::new(bytes.to_vec())
    }
}
