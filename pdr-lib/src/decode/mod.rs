//! Numeric decode primitives shared by the table and image builders.
use chrono::{NaiveDate, NaiveDateTime};
use derive_more::From;
use serde::Serialize;

pub mod bits;
mod sample;
mod scaling;
mod special;
pub mod vax;

pub use sample::{AsciiKind, SampleType};
pub use scaling::Scaling;
pub use special::SpecialConstants;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Endian {
    Big,
    Little,
}

/// A single decoded table value.
#[derive(Debug, Clone, PartialEq, Serialize, From)]
#[serde(untagged)]
pub enum Cell {
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    /// Values of a multi-item field, or the sub-fields of a bit string.
    Items(Vec<Cell>),
    /// A special constant or otherwise absent value.
    Null,
}

impl Cell {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Int(v) => Some(*v as f64),
            Cell::UInt(v) => Some(*v as f64),
            Cell::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Cell::Int(v) => Some(*v),
            Cell::UInt(v) => i64::try_from(*v).ok(),
            Cell::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    /// Apply `f` to numeric values, including those nested in items.
    #[must_use]
    pub fn map_numeric<F: Fn(f64) -> Cell + Copy>(self, f: F) -> Cell {
        match self {
            Cell::Items(items) => Cell::Items(items.into_iter().map(|c| c.map_numeric(f)).collect()),
            other => match other.as_f64() {
                Some(v) => f(v),
                None => other,
            },
        }
    }
}

impl std::fmt::Display for Cell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Cell::Int(v) => write!(f, "{v}"),
            Cell::UInt(v) => write!(f, "{v}"),
            Cell::Float(v) => write!(f, "{v}"),
            Cell::Text(v) => write!(f, "{v}"),
            Cell::Date(v) => write!(f, "{v}"),
            Cell::DateTime(v) => write!(f, "{}", v.format("%Y-%m-%dT%H:%M:%S%.f")),
            Cell::Items(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Cell::Null => Ok(()),
        }
    }
}
