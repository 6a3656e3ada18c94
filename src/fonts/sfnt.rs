//! Raw sfnt container handling.

/// Returns a standalone sfnt for face `index`. Plain font files are returned
/// as they are; faces of a `ttcf` collection are copied out with their table
/// offsets rewritten.
pub fn extract_face(data: &[u8], index: u32) -> Option<Vec<u8>> {
    if data.get(..4)? != b"ttcf" {
        return Some(data.to_vec());
    }
    let count = read_u32(data, 8)?;
    if index >= count {
        return None;
    }
    let offset = read_u32(data, 12 + 4 * index as usize)? as usize;
    let num_tables = read_u16(data, offset + 4)? as usize;

    let header_len = 12 + 16 * num_tables;
    let mut out = Vec::with_capacity(header_len);
    out.extend_from_slice(data.get(offset..offset + 12)?);
    let mut tables = Vec::new();
    let mut next = header_len;
    for table in 0..num_tables {
        let record = offset + 12 + 16 * table;
        let tag = data.get(record..record + 4)?;
        let checksum = data.get(record + 4..record + 8)?;
        let table_offset = read_u32(data, record + 8)? as usize;
        let length = read_u32(data, record + 12)? as usize;
        let body = data.get(table_offset..table_offset + length)?;

        out.extend_from_slice(tag);
        out.extend_from_slice(checksum);
        out.extend_from_slice(&(next as u32).to_be_bytes());
        out.extend_from_slice(&(length as u32).to_be_bytes());
        tables.push(body);
        next += (length + 3) & !3;
    }
    for body in tables {
        out.extend_from_slice(body);
        while out.len() % 4 != 0 {
            out.push(0);
        }
    }
    Some(out)
}

fn read_u32(data: &[u8], at: usize) -> Option<u32> {
    let bytes = data.get(at..at + 4)?;
    Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn read_u16(data: &[u8], at: usize) -> Option<u16> {
    let bytes = data.get(at..at + 2)?;
    Some(u16::from_be_bytes([bytes[0], bytes[1]]))
}
