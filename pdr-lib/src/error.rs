use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Label text could not be tokenized.
    #[error("label syntax error at line {line}: {text:?}")]
    LabelSyntax { line: usize, text: String },

    /// A declared object has no resolvable byte range.
    #[error("cannot resolve pointer for {object}: {reason}")]
    PointerResolution { object: String, reason: String },

    /// A recognized construct that is intentionally not supported.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Inputs that cannot be read locally, e.g., URLs.
    #[error("unsupported input: {0}")]
    UnsupportedInput(String),

    #[error("file not found: {0:?}")]
    NotFound(PathBuf),

    #[error("no object named {0}")]
    NoSuchObject(String),

    #[error("{object} is a {actual}, not a {expected}")]
    WrongVariant {
        object: String,
        expected: &'static str,
        actual: &'static str,
    },

    /// Buffer length is not a multiple of the element size.
    #[error("invalid length {actual}; must be a multiple of {multiple}")]
    InvalidLength { actual: usize, multiple: usize },

    #[error("Not enough bytes")]
    NotEnoughData { actual: usize, minimum: usize },

    #[error(transparent)]
    Xml(#[from] quick_xml::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// A non-fatal problem encountered while building an object.
///
/// The object is still returned; the warning records which best-effort fallback was taken.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct DecodeWarning {
    pub object: String,
    pub message: String,
}

impl DecodeWarning {
    pub fn new<O: Into<String>, M: Into<String>>(object: O, message: M) -> Self {
        Self {
            object: object.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for DecodeWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.object, self.message)
    }
}
