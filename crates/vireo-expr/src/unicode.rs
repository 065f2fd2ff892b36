#![forbid(unsafe_code)]

//! Identifier classification.
//!
//! The identifier ranges are stored compressed as inclusive code point
//! ranges and expanded once, on first use, into a dense per-code-point table
//! covering the Basic Multilingual Plane. Characters outside the BMP fall
//! back to `char::is_alphabetic`.

use std::sync::OnceLock;

const BMP: usize = 0x1_0000;

const ID_START: u8 = 1 << 0;
const ID_PART: u8 = 1 << 1;

/// Inclusive ranges of code points that may start an identifier.
const ID_START_RANGES: &[(u32, u32)] = &[
    (0x24, 0x24), // $
    (0x41, 0x5A),
    (0x5F, 0x5F), // _
    (0x61, 0x7A),
    (0xAA, 0xAA),
    (0xBA, 0xBA),
    (0xC0, 0xD6),
    (0xD8, 0xF6),
    (0xF8, 0x2B8),
    (0x2C0, 0x2C1),
    (0x2E0, 0x2E4),
    (0x370, 0x373),
    (0x376, 0x377),
    (0x37B, 0x37D),
    (0x37F, 0x37F),
    (0x386, 0x386),
    (0x388, 0x38A),
    (0x38C, 0x38C),
    (0x38E, 0x3A1),
    (0x3A3, 0x3F5),
    (0x3F7, 0x481),
    (0x48A, 0x52F),
    (0x531, 0x556),
    (0x561, 0x587),
    (0x5D0, 0x5EA),
    (0x5F0, 0x5F2),
    (0x620, 0x64A),
    (0x671, 0x6D3),
    (0x6FA, 0x6FC),
    (0x904, 0x939),
    (0x958, 0x961),
    (0x972, 0x980),
    (0xE01, 0xE30),
    (0xE40, 0xE46),
    (0x10A0, 0x10C5),
    (0x10D0, 0x10FA),
    (0x1100, 0x1248),
    (0x1E00, 0x1F15),
    (0x1F18, 0x1F1D),
    (0x1F20, 0x1F45),
    (0x1F48, 0x1F4D),
    (0x1F50, 0x1F57),
    (0x1F59, 0x1F59),
    (0x1F5B, 0x1F5B),
    (0x1F5D, 0x1F5D),
    (0x1F5F, 0x1F7D),
    (0x1F80, 0x1FB4),
    (0x1FB6, 0x1FBC),
    (0x1FC2, 0x1FC4),
    (0x1FC6, 0x1FCC),
    (0x1FD0, 0x1FD3),
    (0x1FD6, 0x1FDB),
    (0x1FE0, 0x1FEC),
    (0x1FF2, 0x1FF4),
    (0x1FF6, 0x1FFC),
    (0x2071, 0x2071),
    (0x207F, 0x207F),
    (0x2090, 0x209C),
    (0x2C00, 0x2CE4),
    (0x3005, 0x3007),
    (0x3041, 0x3096),
    (0x30A1, 0x30FA),
    (0x3105, 0x312F),
    (0x3131, 0x318E),
    (0x3400, 0x4DBF),
    (0x4E00, 0x9FFF),
    (0xA000, 0xA48C),
    (0xAC00, 0xD7A3),
    (0xF900, 0xFA6D),
    (0xFB00, 0xFB06),
    (0xFF21, 0xFF3A),
    (0xFF41, 0xFF5A),
    (0xFF66, 0xFFBE),
];

/// Additional ranges allowed after the first character.
const ID_CONTINUE_RANGES: &[(u32, u32)] = &[
    (0x30, 0x39),
    (0x300, 0x36F),
    (0x483, 0x487),
    (0x591, 0x5BD),
    (0x610, 0x61A),
    (0x660, 0x669),
    (0x6F0, 0x6F9),
    (0x900, 0x903),
    (0x93A, 0x94F),
    (0x966, 0x96F),
    (0xE31, 0xE3A),
    (0xE50, 0xE59),
    (0x200C, 0x200D),
    (0x203F, 0x2040),
    (0x20D0, 0x20DC),
    (0x3099, 0x309A),
    (0xFE00, 0xFE0F),
    (0xFE20, 0xFE2F),
    (0xFF10, 0xFF19),
];

static TABLE: OnceLock<Box<[u8]>> = OnceLock::new();

fn decompress() -> Box<[u8]> {
    let mut table = vec![0u8; BMP].into_boxed_slice();
    for &(start, end) in ID_START_RANGES {
        for cp in start..=end {
            table[cp as usize] |= ID_START | ID_PART;
        }
    }
    for &(start, end) in ID_CONTINUE_RANGES {
        for cp in start..=end {
            table[cp as usize] |= ID_PART;
        }
    }
    table
}

#[inline]
fn lookup(c: char) -> Option<u8> {
    let table = TABLE.get_or_init(decompress);
    table.get(c as usize).copied()
}

/// Whether `c` may start an identifier.
#[inline]
#[must_use]
pub fn is_identifier_start(c: char) -> bool {
    match lookup(c) {
        Some(bits) => bits & ID_START != 0,
        None => c.is_alphabetic(),
    }
}

/// Whether `c` may continue an identifier.
#[inline]
#[must_use]
pub fn is_identifier_part(c: char) -> bool {
    match lookup(c) {
        Some(bits) => bits & ID_PART != 0,
        None => c.is_alphanumeric(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii() {
        for c in ['a', 'Z', '_', '$'] {
            assert!(is_identifier_start(c), "{c}");
        }
        assert!(!is_identifier_start('1'));
        assert!(is_identifier_part('1'));
        assert!(!is_identifier_part('-'));
        assert!(!is_identifier_part(' '));
    }

    #[test]
    fn non_ascii() {
        assert!(is_identifier_start('é'));
        assert!(is_identifier_start('Ж'));
        assert!(is_identifier_start('名'));
        assert!(is_identifier_start('한'));
        assert!(!is_identifier_start('\u{301}'));
        assert!(is_identifier_part('\u{301}'));
        assert!(!is_identifier_start('×'));
        assert!(is_identifier_start('𝐀'));
    }

    #[test]
    fn ranges_are_sorted_and_disjoint() {
        for window in ID_START_RANGES.windows(2) {
            assert!(window[0].1 < window[1].0, "{window:?}");
        }
        assert!(ID_START_RANGES.iter().all(|&(s, e)| s <= e && (e as usize) < BMP));
    }
}
