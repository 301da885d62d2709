//! PDS3 data pointers (`^NAME = ...`) and the object kinds they name.
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::label::Value;
use crate::{Error, Result};

/// Objects not loaded unless asked for by name. These are mostly shared reference
/// documents archived apart from the product.
static IGNORED_BY_DEFAULT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:DATA_SET_MAP_PROJECT.*|.*_DESC|.*DESCRIPTION(?:_[0-9]*)?)$")
        .expect("Invalid ignore regex")
});

pub fn is_ignored_by_default(name: &str) -> bool {
    IGNORED_BY_DEFAULT.is_match(name)
}

/// Where in a file an object starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Location {
    /// 1-based byte offset (`<BYTES>`).
    Bytes(u64),
    /// 1-based record index.
    Record(u64),
    /// Start of the file.
    FileStart,
}

/// A resolved `^NAME` pointer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Pointer {
    /// Object name without the leading `^`.
    pub name: String,
    /// Files named by the pointer; empty for an attached object.
    pub files: Vec<String>,
    pub location: Location,
}

fn location(value: &Value) -> Option<Location> {
    match value {
        Value::Integer(n) => Some(Location::Record(u64::try_from(*n).ok()?)),
        Value::Real(r) if r.fract() == 0.0 && *r >= 0.0 => Some(Location::Record(*r as u64)),
        Value::Quantity(q) if q.value >= 0.0 => {
            let n = q.value as u64;
            Some(if q.is_bytes() {
                Location::Bytes(n)
            } else {
                Location::Record(n)
            })
        }
        Value::Text(_) => Some(Location::FileStart),
        _ => None,
    }
}

impl Pointer {
    /// Interpret the value of `^name`.
    ///
    /// # Errors
    /// [Error::PointerResolution] when the value has no recognizable shape.
    pub fn from_value(name: &str, value: &Value) -> Result<Self> {
        let name = name.trim_start_matches('^').to_string();
        let fail = |reason: &str| Error::PointerResolution {
            object: name.clone(),
            reason: format!("{reason}: {value}"),
        };
        match value {
            Value::Text(file) => Ok(Self {
                files: vec![file.clone()],
                location: Location::FileStart,
                name,
            }),
            Value::Sequence(items) | Value::Set(items) => {
                let files: Vec<String> = items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect();
                // The last element carries the position.
                let location = items
                    .last()
                    .and_then(location)
                    .ok_or_else(|| fail("unknown data pointer format"))?;
                Ok(Self {
                    files,
                    location,
                    name,
                })
            }
            Value::Block(_) => Err(fail("pointer names a block")),
            other => Ok(Self {
                location: location(other).ok_or_else(|| fail("unknown data pointer format"))?,
                files: Vec::new(),
                name,
            }),
        }
    }

    /// File holding the data, if not the label's own file.
    pub fn file(&self) -> Option<&str> {
        self.files.first().map(String::as_str)
    }

    /// 0-based start byte. `None` when the pointer counts records of unknown size.
    pub fn start_byte(&self, record_bytes: Option<u64>) -> Option<u64> {
        match self.location {
            Location::Bytes(n) => Some(n.saturating_sub(1)),
            Location::Record(n) => record_bytes.map(|rb| rb * n.saturating_sub(1)),
            Location::FileStart => Some(0),
        }
    }
}

/// Start byte of an object assumed to end the file.
pub fn count_from_bottom(file_size: u64, object_bytes: u64) -> u64 {
    file_size.saturating_sub(object_bytes)
}

/// Kind of loader an object name calls for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ObjectKind {
    /// Structural pointers with nothing to load.
    Trivial,
    Label,
    Text,
    Array,
    Table,
    Header,
    Image,
    Unsupported,
}

const TABLE_WORDS: [&str; 6] = [
    "TABLE",
    "SPREADSHEET",
    "CONTAINER",
    "SERIES",
    "SPECTRUM",
    "HISTOGRAM",
];

impl ObjectKind {
    /// Classify by name. Order matters: binary tables are often called `*_IMAGE_TABLE`.
    ///
    /// # Example
    /// ```
    /// use pdr::pointer::ObjectKind;
    ///
    /// assert_eq!(ObjectKind::from_name("IMAGE_TIME_TABLE"), ObjectKind::Table);
    /// assert_eq!(ObjectKind::from_name("SPECTRUM_HEADER"), ObjectKind::Header);
    /// assert_eq!(ObjectKind::from_name("HISTOGRAM_IMAGE"), ObjectKind::Image);
    /// ```
    pub fn from_name(name: &str) -> Self {
        let name = name.trim_start_matches('^');
        if name == "LABEL" {
            return ObjectKind::Label;
        }
        if name.contains("STRUCTURE") || name.contains("PDS_OBJECT") {
            return ObjectKind::Trivial;
        }
        if ["TEXT", "PDF", "DESC"].iter().any(|w| name.contains(w)) {
            return ObjectKind::Text;
        }
        if name.contains("ARRAY") {
            return ObjectKind::Array;
        }
        if TABLE_WORDS.iter().any(|w| name.contains(w))
            && !TABLE_WORDS
                .iter()
                .any(|w| name.contains(&format!("{w}_HEADER")))
            && !name.contains("HISTOGRAM_IMAGE")
        {
            return ObjectKind::Table;
        }
        if name.contains("HEADER") {
            return ObjectKind::Header;
        }
        if name.contains("IMAGE") || name.contains("QUB") {
            return ObjectKind::Image;
        }
        ObjectKind::Unsupported
    }

    pub fn is_loadable(&self) -> bool {
        !matches!(self, ObjectKind::Trivial | ObjectKind::Unsupported)
    }
}
