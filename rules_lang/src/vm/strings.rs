//! String object encoding helpers
//!
//! Strings live on the heap as a length field followed by code units of
//! 1, 2, or 4 bytes, little-endian.

use crate::types::identity;
use crate::types::{RuleType, StrEncoding};

use super::heap::Heap;

/// Encode a string into code-unit bytes
pub fn encode(encoding: StrEncoding, value: &str) -> Vec<u8> {
    match encoding {
        StrEncoding::Utf8 => value.as_bytes().to_vec(),
        StrEncoding::Utf16 => value
            .encode_utf16()
            .flat_map(|unit| unit.to_le_bytes())
            .collect(),
        StrEncoding::Utf32 => value
            .chars()
            .flat_map(|c| (c as u32).to_le_bytes())
            .collect(),
    }
}

/// Decode code-unit bytes back into a string; invalid sequences decode to
/// the replacement character
pub fn decode(encoding: StrEncoding, units: &[u8]) -> String {
    match encoding {
        StrEncoding::Utf8 => String::from_utf8_lossy(units).into_owned(),
        StrEncoding::Utf16 => {
            let units: Vec<u16> = units
                .chunks_exact(2)
                .map(|c| u16::from_le_bytes([c[0], c[1]]))
                .collect();
            String::from_utf16_lossy(&units)
        }
        StrEncoding::Utf32 => units
            .chunks_exact(4)
            .map(|c| {
                char::from_u32(u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                    .unwrap_or(char::REPLACEMENT_CHARACTER)
            })
            .collect(),
    }
}

/// Allocate a string object and return its address
pub fn alloc_string(heap: &mut Heap, encoding: StrEncoding, value: &str) -> u64 {
    let units = encode(encoding, value);
    let unit_size = encoding.unit_size();
    let length = (units.len() / unit_size) as u64;
    let identity = identity::intern(&RuleType::StrLit {
        encoding,
        value: String::new(),
    });
    let addr = heap.alloc(identity, 8 + units.len());
    let data = heap.data_addr(addr);
    heap.write_scalar(data, 8, length);
    heap.write(data + 8, &units);
    addr
}

/// Read a string object's value back out of the heap
pub fn read_string(heap: &Heap, encoding: StrEncoding, addr: u64) -> String {
    let data = heap.data_addr(addr);
    let length = heap.read_scalar(data, 8) as usize;
    let units = heap.read(data + 8, length * encoding.unit_size());
    decode(encoding, units)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_all_encodings() {
        let mut heap = Heap::new();
        for encoding in [StrEncoding::Utf8, StrEncoding::Utf16, StrEncoding::Utf32] {
            let addr = alloc_string(&mut heap, encoding, "héllo");
            assert_eq!(read_string(&heap, encoding, addr), "héllo");
        }
    }

    #[test]
    fn test_lengths_are_code_units() {
        let mut heap = Heap::new();
        let addr = alloc_string(&mut heap, StrEncoding::Utf8, "é");
        assert_eq!(heap.length_at(addr), 2);
        let addr = alloc_string(&mut heap, StrEncoding::Utf32, "é");
        assert_eq!(heap.length_at(addr), 1);
    }
}
