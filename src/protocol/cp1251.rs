//! # Code Page 1251 Encoding
//!
//! Converts between Unicode strings and the single-byte Windows-1251 code
//! page the scale uses for every human-readable wire field (PLU names,
//! messages).
//!
//! - ASCII (U+0000–U+007F) passes through unchanged.
//! - 0xC0–0xFF is the contiguous Cyrillic block А..я (U+0410–U+044F).
//! - 0x80–0xBF is the irregular block in [`HIGH`]; 0x98 is unassigned.
//!
//! Encoding replaces unmappable characters with `?` (logged at `warn`).
//! Decoding silently drops bytes that have no assigned character.

use tracing::warn;

/// Byte values 0x80–0xBF. `None` marks an unassigned code point.
const HIGH: [Option<char>; 64] = [
    // 0x80–0x8F
    Some('\u{0402}'), // Ђ
    Some('\u{0403}'), // Ѓ
    Some('\u{201A}'), // ‚
    Some('\u{0453}'), // ѓ
    Some('\u{201E}'), // „
    Some('\u{2026}'), // …
    Some('\u{2020}'), // †
    Some('\u{2021}'), // ‡
    Some('\u{20AC}'), // €
    Some('\u{2030}'), // ‰
    Some('\u{0409}'), // Љ
    Some('\u{2039}'), // ‹
    Some('\u{040A}'), // Њ
    Some('\u{040C}'), // Ќ
    Some('\u{040B}'), // Ћ
    Some('\u{040F}'), // Џ
    // 0x90–0x9F
    Some('\u{0452}'), // ђ
    Some('\u{2018}'), // ‘
    Some('\u{2019}'), // ’
    Some('\u{201C}'), // “
    Some('\u{201D}'), // ”
    Some('\u{2022}'), // •
    Some('\u{2013}'), // –
    Some('\u{2014}'), // —
    None,             // 0x98 unassigned
    Some('\u{2122}'), // ™
    Some('\u{0459}'), // љ
    Some('\u{203A}'), // ›
    Some('\u{045A}'), // њ
    Some('\u{045C}'), // ќ
    Some('\u{045B}'), // ћ
    Some('\u{045F}'), // џ
    // 0xA0–0xAF
    Some('\u{00A0}'), // no-break space
    Some('\u{040E}'), // Ў
    Some('\u{045E}'), // ў
    Some('\u{0408}'), // Ј
    Some('\u{00A4}'), // ¤
    Some('\u{0490}'), // Ґ
    Some('\u{00A6}'), // ¦
    Some('\u{00A7}'), // §
    Some('\u{0401}'), // Ё
    Some('\u{00A9}'), // ©
    Some('\u{0404}'), // Є
    Some('\u{00AB}'), // «
    Some('\u{00AC}'), // ¬
    Some('\u{00AD}'), // soft hyphen
    Some('\u{00AE}'), // ®
    Some('\u{0407}'), // Ї
    // 0xB0–0xBF
    Some('\u{00B0}'), // °
    Some('\u{00B1}'), // ±
    Some('\u{0406}'), // І
    Some('\u{0456}'), // і
    Some('\u{0491}'), // ґ
    Some('\u{00B5}'), // µ
    Some('\u{00B6}'), // ¶
    Some('\u{00B7}'), // ·
    Some('\u{0451}'), // ё
    Some('\u{2116}'), // №
    Some('\u{0454}'), // є
    Some('\u{00BB}'), // »
    Some('\u{0458}'), // ј
    Some('\u{0405}'), // Ѕ
    Some('\u{0455}'), // ѕ
    Some('\u{0457}'), // ї
];

/// Encode a Unicode string as CP1251 bytes.
///
/// Unmapped characters are replaced with `?`.
pub fn encode(s: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(s.len());
    for ch in s.chars() {
        match unicode_to_cp1251(ch) {
            Some(byte) => out.push(byte),
            None => {
                warn!(
                    "cp1251: unmapped character '{}' (U+{:04X}), replacing with '?'",
                    ch, ch as u32
                );
                out.push(b'?');
            }
        }
    }
    out
}

/// Decode CP1251 bytes into a Unicode string, skipping unassigned bytes.
pub fn decode(bytes: &[u8]) -> String {
    bytes.iter().filter_map(|&b| cp1251_to_unicode(b)).collect()
}

/// Map one byte to its character, `None` for the unassigned 0x98.
pub fn cp1251_to_unicode(byte: u8) -> Option<char> {
    match byte {
        0x00..=0x7F => Some(byte as char),
        0x80..=0xBF => HIGH[(byte - 0x80) as usize],
        // А (U+0410) .. я (U+044F)
        0xC0..=0xFF => char::from_u32(0x0410 + (byte - 0xC0) as u32),
    }
}

/// Map a character to its CP1251 byte.
fn unicode_to_cp1251(ch: char) -> Option<u8> {
    let cp = ch as u32;
    if cp < 0x80 {
        return Some(cp as u8);
    }
    if (0x0410..=0x044F).contains(&cp) {
        return Some((cp - 0x0410) as u8 + 0xC0);
    }
    HIGH.iter()
        .position(|&c| c == Some(ch))
        .map(|idx| 0x80 + idx as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_passthrough() {
        assert_eq!(encode("Hello, world!"), b"Hello, world!");
        assert_eq!(decode(b"Hello, world!"), "Hello, world!");
    }

    #[test]
    fn test_empty_string() {
        assert_eq!(encode(""), b"");
        assert_eq!(decode(b""), "");
    }

    #[test]
    fn test_cyrillic_block() {
        assert_eq!(encode("А"), vec![0xC0]);
        assert_eq!(encode("я"), vec![0xFF]);
        assert_eq!(encode("Хлеб"), vec![0xD5, 0xEB, 0xE5, 0xE1]);
        assert_eq!(decode(&[0xD5, 0xEB, 0xE5, 0xE1]), "Хлеб");
    }

    #[test]
    fn test_irregular_block() {
        assert_eq!(encode("Ё"), vec![0xA8]);
        assert_eq!(encode("ё"), vec![0xB8]);
        assert_eq!(encode("№"), vec![0xB9]);
        assert_eq!(encode("€"), vec![0x88]);
        assert_eq!(decode(&[0xA8, 0xB8, 0xB9]), "Ёё№");
    }

    #[test]
    fn test_unmapped_char_becomes_question_mark() {
        assert_eq!(encode("★"), vec![b'?']);
        assert_eq!(encode("ñ"), vec![b'?']);
    }

    #[test]
    fn test_unassigned_byte_is_dropped() {
        assert_eq!(decode(&[b'a', 0x98, b'b']), "ab");
    }

    #[test]
    fn test_every_assigned_byte_roundtrips() {
        for byte in 0u8..=255 {
            if let Some(ch) = cp1251_to_unicode(byte) {
                assert_eq!(encode(&ch.to_string()), vec![byte], "byte 0x{:02X}", byte);
            }
        }
    }
}
