//! ToUnicode CMaps: reading them from source fonts and writing them for
//! embedded ones.

use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CodeSpace {
    start: u32,
    end: u32,
    len: usize,
}

/// Character code to Unicode string mapping.
#[derive(Debug, Clone, Default)]
pub struct ToUnicode {
    codespaces: Vec<CodeSpace>,
    map: HashMap<u32, String>,
}

impl ToUnicode {
    pub fn parse(data: &[u8]) -> Self {
        let tokens = tokenize(data);
        let mut cmap = ToUnicode::default();
        let mut index = 0;
        while index < tokens.len() {
            match tokens[index].as_str() {
                "begincodespacerange" => {
                    index += 1;
                    while index + 1 < tokens.len() && tokens[index] != "endcodespacerange" {
                        let start = parse_hex(&tokens[index]);
                        let end = parse_hex(&tokens[index + 1]);
                        if !start.is_empty() && start.len() == end.len() {
                            cmap.codespaces.push(CodeSpace {
                                start: be_u32(&start),
                                end: be_u32(&end),
                                len: start.len(),
                            });
                        }
                        index += 2;
                    }
                }
                "beginbfchar" => {
                    index += 1;
                    while index + 1 < tokens.len() && tokens[index] != "endbfchar" {
                        let code = be_u32(&parse_hex(&tokens[index]));
                        if let Some(text) = utf16be(&parse_hex(&tokens[index + 1])) {
                            cmap.map.insert(code, text);
                        }
                        index += 2;
                    }
                }
                "beginbfrange" => {
                    index += 1;
                    while index + 2 < tokens.len() && tokens[index] != "endbfrange" {
                        let start = be_u32(&parse_hex(&tokens[index]));
                        let end = be_u32(&parse_hex(&tokens[index + 1]));
                        index += 2;
                        if tokens[index] == "[" {
                            index += 1;
                            let mut code = start;
                            while index < tokens.len() && tokens[index] != "]" {
                                if let Some(text) = utf16be(&parse_hex(&tokens[index])) {
                                    cmap.map.insert(code, text);
                                }
                                code = code.saturating_add(1);
                                index += 1;
                            }
                            index += 1;
                        } else {
                            let target = parse_hex(&tokens[index]);
                            index += 1;
                            cmap.insert_range(start, end, &target);
                        }
                    }
                }
                _ => {}
            }
            index += 1;
        }
        cmap
    }

    /// `start..=end` maps to consecutive values, incrementing the last
    /// UTF-16 unit of `target`.
    fn insert_range(&mut self, start: u32, end: u32, target: &[u8]) {
        if target.len() < 2 || end < start || end - start > 0xFFFF {
            return;
        }
        let mut units: Vec<u16> = target
            .chunks(2)
            .map(|pair| u16::from_be_bytes([pair[0], *pair.get(1).unwrap_or(&0)]))
            .collect();
        for code in start..=end {
            if let Ok(text) = String::from_utf16(&units) {
                self.map.insert(code, text);
            }
            if let Some(last) = units.last_mut() {
                *last = last.wrapping_add(1);
            }
        }
    }

    /// Byte length of the code starting at `bytes[0]`, from the codespace
    /// ranges, or `default_len` when none match.
    pub fn code_len(&self, bytes: &[u8], default_len: usize) -> usize {
        for space in &self.codespaces {
            if bytes.len() >= space.len && (space.start..=space.end).contains(&be_u32(&bytes[..space.len])) {
                return space.len;
            }
        }
        default_len
    }

    pub fn has_codespaces(&self) -> bool {
        !self.codespaces.is_empty()
    }

    pub fn lookup(&self, code: u32) -> Option<&str> {
        self.map.get(&code).map(String::as_str)
    }
}

/// Builds a ToUnicode CMap for an Identity-H font, one `bfchar` entry per
/// glyph id, chunked by 100 as the format requires.
pub fn write_to_unicode(glyphs: &BTreeMap<u16, char>) -> String {
    let entries: Vec<(u16, char)> = glyphs.iter().map(|(gid, ch)| (*gid, *ch)).collect();

    let mut out = String::new();
    out.push_str("/CIDInit /ProcSet findresource begin\n");
    out.push_str("12 dict begin\n");
    out.push_str("begincmap\n");
    out.push_str("/CIDSystemInfo << /Registry (Adobe) /Ordering (UCS) /Supplement 0 >> def\n");
    out.push_str("/CMapName /Adobe-Identity-UCS def\n");
    out.push_str("/CMapType 2 def\n");
    out.push_str("1 begincodespacerange\n<0000> <FFFF>\nendcodespacerange\n");

    for chunk in entries.chunks(100) {
        out.push_str(&format!("{} beginbfchar\n", chunk.len()));
        for (gid, ch) in chunk {
            let mut units = [0u16; 2];
            let hex: String = ch
                .encode_utf16(&mut units)
                .iter()
                .map(|unit| format!("{:04X}", unit))
                .collect();
            out.push_str(&format!("<{:04X}> <{}>\n", gid, hex));
        }
        out.push_str("endbfchar\n");
    }

    out.push_str("endcmap\n");
    out.push_str("CMapName currentdict /CMap defineresource pop\n");
    out.push_str("end\nend\n");
    out
}

/// Splits CMap source into hex strings, names, brackets and bare words.
fn tokenize(data: &[u8]) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut index = 0;
    while index < data.len() {
        let byte = data[index];
        match byte {
            b'%' => {
                while index < data.len() && data[index] != b'\n' && data[index] != b'\r' {
                    index += 1;
                }
            }
            b'<' | b'>' if data.get(index + 1) == Some(&byte) => {
                tokens.push(if byte == b'<' { "<<" } else { ">>" }.to_string());
                index += 2;
            }
            b'<' => {
                let start = index;
                while index < data.len() && data[index] != b'>' {
                    index += 1;
                }
                tokens.push(String::from_utf8_lossy(&data[start..(index + 1).min(data.len())]).into_owned());
                index += 1;
            }
            b'[' | b']' => {
                tokens.push((byte as char).to_string());
                index += 1;
            }
            _ if byte.is_ascii_whitespace() => index += 1,
            _ => {
                let start = index;
                while index < data.len()
                    && !data[index].is_ascii_whitespace()
                    && !matches!(data[index], b'[' | b']' | b'<' | b'>' | b'%')
                {
                    index += 1;
                }
                if index == start {
                    index += 1;
                    continue;
                }
                tokens.push(String::from_utf8_lossy(&data[start..index]).into_owned());
            }
        }
    }
    tokens
}

fn parse_hex(token: &str) -> Vec<u8> {
    let digits: Vec<u8> = token
        .trim_start_matches('<')
        .trim_end_matches('>')
        .bytes()
        .filter(u8::is_ascii_hexdigit)
        .collect();
    digits
        .chunks(2)
        .map(|pair| {
            let text = std::str::from_utf8(pair).unwrap_or("0");
            let value = u8::from_str_radix(text, 16).unwrap_or(0);
            if pair.len() == 1 { value << 4 } else { value }
        })
        .collect()
}

fn be_u32(bytes: &[u8]) -> u32 {
    bytes.iter().take(4).fold(0u32, |acc, byte| (acc << 8) | *byte as u32)
}

fn utf16be(bytes: &[u8]) -> Option<String> {
    if bytes.is_empty() {
        return None;
    }
    let units: Vec<u16> = bytes
        .chunks(2)
        .map(|pair| u16::from_be_bytes([pair[0], *pair.get(1).unwrap_or(&0)]))
        .collect();
    String::from_utf16(&units).ok()
}
