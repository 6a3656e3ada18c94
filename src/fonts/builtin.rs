//! Metrics for the global default font: PDF base-14 Helvetica.
//!
//! This font is never loaded from disk, so it is always available. It covers
//! printable ASCII and Latin-1 only; every other code point is reported as
//! missing.

/// Helvetica advance widths for 0x20..=0x7E, in 1/1000 em.
const ASCII_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // ' '../
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556, // 0..?
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778, // @..O
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556, // P.._
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556, // `..o
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584, // p..~
];

pub const UNITS_PER_EM: u16 = 1000;
pub const ASCENT: i16 = 718;
pub const DESCENT: i16 = -207;
pub const CAP_HEIGHT: i16 = 718;
pub const BBOX: [i16; 4] = [-166, -225, 1000, 931];
pub const MISSING_WIDTH: u16 = 556;

/// Width of a code point in 1/1000 em, `None` when Helvetica has no glyph.
pub fn helvetica_width(ch: char) -> Option<u16> {
    let code = ch as u32;
    match code {
        0x20..=0x7E => Some(ASCII_WIDTHS[(code - 0x20) as usize]),
        0xA0 => Some(278),
        0xA1..=0xFF => Some(latin1_width(ch)),
        _ => win_ansi_extra_width(ch),
    }
}

/// Characters WinAnsiEncoding places in 0x80..=0x9F.
fn win_ansi_extra_width(ch: char) -> Option<u16> {
    let width = match ch {
        '‚' | '‘' | '’' => 222,
        '„' | '“' | '”' | 'ˆ' | '˜' | '‹' | '›' => 333,
        '•' => 350,
        'š' | 'ž' => 500,
        '€' | 'ƒ' | '†' | '‡' | '–' => 556,
        'Ž' => 611,
        'Š' | 'Ÿ' => 667,
        'œ' => 944,
        '…' | '‰' | 'Œ' | '—' | '™' => 1000,
        _ => return None,
    };
    Some(width)
}

/// Latin-1 supplement widths: accented letters reuse their base letter.
fn latin1_width(ch: char) -> u16 {
    match ch {
        'À'..='Å' => 667,
        'Æ' => 1000,
        'Ç' => 722,
        'È'..='Ë' => 667,
        'Ì'..='Ï' => 278,
        'Ð' | 'Ñ' => 722,
        'Ò'..='Ö' | 'Ø' => 778,
        '×' => 584,
        'Ù'..='Ü' => 722,
        'Ý' | 'Þ' => 667,
        'ß' => 611,
        'à'..='å' => 556,
        'æ' => 889,
        'ç' => 500,
        'è'..='ë' => 556,
        'ì'..='ï' => 278,
        'ð'..='ö' | 'ø' => 556,
        '÷' => 584,
        'ù'..='ü' => 556,
        'ý' | 'þ' | 'ÿ' => 500,
        '¡' | '¦' => 333,
        '¢' | '£' | '¤' | '¥' | '§' => 556,
        '©' | '®' => 737,
        '°' => 400,
        '±' | '¬' => 584,
        '¼' | '½' | '¾' => 834,
        '¿' => 611,
        '«' | '»' => 556,
        '·' => 278,
        _ => 333,
    }
}

/// Approximate widths for the other standard fonts found in PDFs without a
/// `Widths` array. Courier is monospaced; everything else borrows Helvetica.
pub fn standard_font_width(base_font: &str, ch: char) -> u16 {
    if base_font.contains("Courier") {
        return 600;
    }
    helvetica_width(ch).unwrap_or(MISSING_WIDTH)
}

/// Maps a code point to its WinAnsiEncoding byte.
pub fn win_ansi_encode(ch: char) -> Option<u8> {
    let code = ch as u32;
    match code {
        0x20..=0x7E | 0xA0..=0xFF => Some(code as u8),
        _ => WIN_ANSI_HIGH
            .iter()
            .position(|mapped| *mapped == ch)
            .map(|index| 0x80 + index as u8),
    }
}

/// Decodes a WinAnsiEncoding byte. Undefined bytes fall back to Latin-1.
pub fn win_ansi_decode(byte: u8) -> char {
    if (0x80..=0x9F).contains(&byte) {
        let mapped = WIN_ANSI_HIGH[(byte - 0x80) as usize];
        if mapped != '\0' {
            return mapped;
        }
    }
    byte as char
}

/// WinAnsiEncoding bytes 0x80..=0x9F; `'\0'` marks undefined slots.
const WIN_ANSI_HIGH: [char; 32] = [
    '€', '\0', '‚', 'ƒ', '„', '…', '†', '‡', 'ˆ', '‰', 'Š', '‹', 'Œ', '\0', 'Ž', '\0', //
    '\0', '‘', '’', '“', '”', '•', '–', '—', '˜', '™', 'š', '›', 'œ', '\0', 'ž', 'Ÿ',
];
