use serde::Serialize;
use tracing::trace;

use super::SampleType;
use crate::label::pds4::text_of;
use crate::label::{Block, Value};

/// Label keys that name special constants directly.
pub const CONSTANT_NAMES: [&str; 6] = [
    "INVALID_CONSTANT",
    "MISSING_CONSTANT",
    "INFINITY_CONSTANT",
    "NOT_APPLICABLE_CONSTANT",
    "NULL_CONSTANT",
    "UNKNOWN_CONSTANT",
];

const ISIS_CATEGORIES: [&str; 5] = ["CORE_", "BAND_SUFFIX_", "SAMPLE_SUFFIX_", "LINE_SUFFIX_", ""];
const ISIS_DIRECTIONS: [&str; 2] = ["HIGH_", "LOW_"];
const ISIS_ENTITIES: [&str; 2] = ["INST_", "REPR_"];
const ISIS_PROPERTIES: [&str; 3] = ["NULL", "SATURATION", "SAT"];

/// ISIS special pixel keys as they appear when made explicit in a PDS3 label, e.g.
/// `CORE_HIGH_REPR_SATURATION`.
pub fn isis_constant_names() -> Vec<String> {
    let mut names = Vec::new();
    for category in ISIS_CATEGORIES {
        for direction in ISIS_DIRECTIONS {
            for entity in ISIS_ENTITIES {
                for property in ISIS_PROPERTIES {
                    names.push(format!("{category}{direction}{entity}{property}"));
                }
            }
        }
    }
    names
}

fn f32_bits(bits: u32) -> f64 {
    f64::from(f32::from_bits(bits))
}

const ISIS_NULL_F32: f32 = -3.402_822_655_088_904_4e38;

/// Sentinels commonly present without being declared in the label, by sample type.
///
/// Single-byte types have none; 0 and 255 are too often real data.
pub fn implicit_constants(sample_type: &SampleType) -> Vec<f64> {
    match *sample_type {
        SampleType::Int { width: 1, .. } => Vec::new(),
        SampleType::Int { signed: true, width: 2, .. } => {
            vec![-32768.0, -32767.0, -32766.0, -32765.0, -32764.0, 32767.0]
        }
        SampleType::Int { signed: false, width: 2, .. } => {
            vec![0.0, 1.0, 2.0, 65533.0, 65534.0, 65535.0]
        }
        SampleType::Int { signed: true, width: 4 | 8, .. } => vec![-2_147_483_648.0, 2_147_483_647.0],
        SampleType::Int { signed: false, width: 4, .. } => {
            let mut v = vec![4_294_967_293.0, 4_294_967_294.0];
            v.extend((0xFF7F_FFFBu32..=0xFF7F_FFFF).map(f64::from));
            v
        }
        SampleType::Float { width: 4, .. } | SampleType::Vax { width: 4 } => vec![
            f64::from(ISIS_NULL_F32),
            f64::from(-1e32f32),
            f64::from(1e32f32),
            f32_bits(0xFF7F_FFFC),
            f32_bits(0xFF7F_FFFD),
            f32_bits(0xFF7F_FFFE),
            f32_bits(0xFF7F_FFFF),
        ],
        SampleType::Float { width: 8, .. } => vec![f64::from(ISIS_NULL_F32)],
        _ => Vec::new(),
    }
}

/// Values to treat as missing data in one object.
///
/// NaN and infinities always count as special.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SpecialConstants {
    named: Vec<(String, f64)>,
    implicit: Vec<f64>,
}

fn constant_value(value: &Value) -> Option<f64> {
    match value {
        Value::Text(s) if s.trim() == "N/A" => None,
        Value::Sequence(items) | Value::Set(items) => items.first().and_then(constant_value),
        other => other.as_f64(),
    }
}

impl SpecialConstants {
    /// Constants declared in an object block, by name.
    pub fn from_block(block: &Block) -> Self {
        let mut specials = Self::default();
        let isis = isis_constant_names();
        let names = CONSTANT_NAMES
            .iter()
            .copied()
            .chain(isis.iter().map(String::as_str));
        for name in names {
            if let Some(v) = block.get(name).and_then(constant_value) {
                specials.insert(name, v);
            }
        }
        trace!(count = specials.named.len(), "declared special constants");
        specials
    }

    /// Constants from a PDS4 `Special_Constants` element.
    pub fn from_pds4(block: &Block) -> Self {
        let mut specials = Self::default();
        for (key, value) in block.iter() {
            let named = key.ends_with("_constant") || key.ends_with("_saturation");
            if let (true, Some(v)) = (named, text_of(value).and_then(Value::as_f64)) {
                specials.insert(key, v);
            }
        }
        specials
    }

    /// Add the implicit constants for `sample_type`.
    #[must_use]
    pub fn with_implicit(mut self, sample_type: &SampleType) -> Self {
        self.implicit = implicit_constants(sample_type);
        self
    }

    /// Add or replace a named constant.
    pub fn insert<S: Into<String>>(&mut self, name: S, value: f64) {
        let name = name.into();
        match self.named.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.named.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.named.iter().find(|(n, _)| n == name).map(|(_, v)| *v)
    }

    pub fn named(&self) -> impl Iterator<Item = (&str, f64)> {
        self.named.iter().map(|(n, v)| (n.as_str(), *v))
    }

    /// True for a raw (unscaled) value that marks missing data.
    pub fn is_special(&self, raw: f64) -> bool {
        !raw.is_finite()
            || self.named.iter().any(|(_, v)| *v == raw)
            || self.implicit.iter().any(|v| *v == raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::Endian;

    #[test]
    fn isis_names() {
        let names = isis_constant_names();
        assert_eq!(names.len(), 60);
        assert!(names.contains(&"CORE_HIGH_REPR_SATURATION".to_string()));
        assert!(names.contains(&"LOW_INST_NULL".to_string()));
    }

    #[test]
    fn declared_constants() {
        let block = Block::new()
            .with("MISSING_CONSTANT", -9999)
            .with("NULL_CONSTANT", "N/A")
            .with("CORE_NULL", 0)
            .with(
                "INVALID_CONSTANT",
                Value::Sequence(vec![(-1).into(), (-2).into()]),
            );
        let s = SpecialConstants::from_block(&block);
        assert_eq!(s.get("MISSING_CONSTANT"), Some(-9999.0));
        assert_eq!(s.get("NULL_CONSTANT"), None);
        assert_eq!(s.get("INVALID_CONSTANT"), Some(-1.0));
        assert!(s.is_special(-9999.0));
        assert!(!s.is_special(0.0));
        assert!(s.is_special(f64::NAN));
        assert!(s.is_special(f64::NEG_INFINITY));
    }

    #[test]
    fn implicit_by_type() {
        let u8 = SampleType::Int { signed: false, width: 1, endian: Endian::Big };
        assert!(implicit_constants(&u8).is_empty());
        let i16 = SampleType::Int { signed: true, width: 2, endian: Endian::Big };
        let s = SpecialConstants::default().with_implicit(&i16);
        assert!(s.is_special(-32768.0));
        assert!(!s.is_special(0.0));
        let f32t = SampleType::Float { width: 4, endian: Endian::Little };
        let s = SpecialConstants::default().with_implicit(&f32t);
        assert!(s.is_special(f64::from(-1e32f32)));
        assert!(s.is_special(f64::from(f32::from_bits(0xFF7F_FFFF))));
    }

    #[test]
    fn pds4_constants() {
        let block = Block::new()
            .with("missing_constant", -999)
            .with("high_instrument_saturation", 4095)
            .with("description", "not a constant");
        let s = SpecialConstants::from_pds4(&block);
        assert_eq!(s.named().count(), 2);
        assert!(s.is_special(4095.0));
    }

    #[test]
    fn insert_replaces() {
        let mut s = SpecialConstants::default();
        s.insert("NULL", 1.0);
        s.insert("NULL", 65535.0);
        assert_eq!(s.named().count(), 1);
        assert!(s.is_special(65535.0));
    }
}
