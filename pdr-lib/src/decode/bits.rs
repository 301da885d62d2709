//! Bit string fields (`MSB_BIT_STRING` columns and their `BIT_COLUMN`s).
use serde::Serialize;

use super::Endian;
use crate::label::Block;

/// One `BIT_COLUMN` within a bit string field. `start_bit` is 1-based as in the label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BitField {
    pub name: String,
    pub start_bit: usize,
    pub bits: Option<usize>,
}

impl BitField {
    /// Build from a `BIT_COLUMN` block; `None` without a usable `START_BIT`.
    pub fn from_block(block: &Block) -> Option<Self> {
        let start_bit = usize::try_from(block.get("START_BIT")?.as_i64()?).ok()?;
        Some(Self {
            name: block
                .get("NAME")
                .map(ToString::to_string)
                .unwrap_or_default(),
            start_bit: start_bit.max(1),
            bits: block
                .get("BITS")
                .and_then(|v| v.as_i64())
                .and_then(|v| usize::try_from(v).ok()),
        })
    }
}

/// Render bytes as a string of `0`/`1`, most significant bit first.
///
/// Little-endian fields are byte-reversed first so the string reads in significance order.
pub fn to_bit_string(bytes: &[u8], endian: Endian) -> String {
    let render = |b: &u8| format!("{b:08b}");
    match endian {
        Endian::Big => bytes.iter().map(render).collect(),
        Endian::Little => bytes.iter().rev().map(render).collect(),
    }
}

/// Split a bit string at 1-based start positions. Each piece runs to the next start.
pub fn split_bits<'a>(bits: &'a str, starts: &[usize]) -> Vec<&'a str> {
    let mut out = Vec::with_capacity(starts.len());
    for (i, start) in starts.iter().enumerate() {
        let from = start.saturating_sub(1).min(bits.len());
        let to = starts
            .get(i + 1)
            .map_or(bits.len(), |next| next.saturating_sub(1).min(bits.len()))
            .max(from);
        out.push(&bits[from..to]);
    }
    out
}

/// Value of a bit string of at most 64 bits.
pub fn bits_to_uint(bits: &str) -> Option<u64> {
    if bits.is_empty() {
        return Some(0);
    }
    u64::from_str_radix(bits, 2).ok()
}

/// Hex rendering of a bit string, left-padded to whole nibbles.
pub fn bits_to_hex(bits: &str) -> String {
    let pad = (4 - bits.len() % 4) % 4;
    let padded = format!("{}{bits}", "0".repeat(pad));
    padded
        .as_bytes()
        .chunks(4)
        .map(|nibble| {
            let v = nibble.iter().fold(0u32, |acc, b| (acc << 1) | u32::from(*b == b'1'));
            char::from_digit(v, 16).unwrap_or('0')
        })
        .collect()
}

/// Extract each field as an unsigned integer.
///
/// Fields with an explicit `BITS` use exactly that many bits; others run to the next
/// field's start.
pub fn extract(bytes: &[u8], endian: Endian, fields: &[BitField]) -> Vec<Option<u64>> {
    let bits = to_bit_string(bytes, endian);
    let starts: Vec<usize> = fields.iter().map(|f| f.start_bit).collect();
    split_bits(&bits, &starts)
        .into_iter()
        .zip(fields)
        .map(|(piece, field)| {
            let piece = match field.bits {
                Some(n) => {
                    let from = field.start_bit - 1;
                    bits.get(from..(from + n).min(bits.len())).unwrap_or(piece)
                }
                None => piece,
            };
            bits_to_uint(piece)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bit_strings_respect_endianness() {
        assert_eq!(to_bit_string(&[0x01, 0x80], Endian::Big), "0000000110000000");
        assert_eq!(to_bit_string(&[0x01, 0x80], Endian::Little), "1000000000000001");
    }

    #[test]
    fn split_at_start_bits() {
        let parts = split_bits("1100101011110000", &[1, 3, 9]);
        assert_eq!(parts, vec!["11", "001010", "11110000"]);
    }

    #[test]
    fn hex() {
        assert_eq!(bits_to_hex("11111111"), "ff");
        assert_eq!(bits_to_hex("101"), "5");
    }

    #[test]
    fn extract_fields() {
        let fields = vec![
            BitField { name: "A".into(), start_bit: 1, bits: Some(4) },
            BitField { name: "B".into(), start_bit: 5, bits: None },
        ];
        assert_eq!(extract(&[0xA5], Endian::Big, &fields), vec![Some(0xA), Some(0x5)]);
    }

    #[test]
    fn from_block() {
        let block = Block::new().with("NAME", "FLAG").with("START_BIT", 3).with("BITS", 2);
        let field = BitField::from_block(&block).unwrap();
        assert_eq!(field.start_bit, 3);
        assert_eq!(field.bits, Some(2));
        assert!(BitField::from_block(&Block::new()).is_none());
    }
}
