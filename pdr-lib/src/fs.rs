//! File access helpers.
use std::{
    fs::{self, File},
    io::{Read, Seek, SeekFrom},
    path::{Path, PathBuf},
    sync::LazyLock,
};

use regex::Regex;
use tracing::debug;

use crate::{Error, Result};

static URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(?:https?|ftp):|www\.").expect("Invalid url regex"));

/// Extensions of detached labels, in lookup order.
pub const LABEL_EXTENSIONS: [&str; 3] = ["LBL", "lbl", "xml"];

/// Whether `input` names a remote resource rather than a local path.
pub fn is_url(input: &str) -> bool {
    URL.is_match(input)
}

/// `path` if it exists, else the one sibling whose name matches case-insensitively.
pub fn check_cases<P: AsRef<Path>>(path: P) -> Result<PathBuf> {
    let path = path.as_ref();
    if path.exists() {
        return Ok(path.to_path_buf());
    }
    let not_found = || Error::NotFound(path.to_path_buf());
    let name = path.file_name().and_then(|n| n.to_str()).ok_or_else(not_found)?;
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let entries = fs::read_dir(dir).map_err(|_| not_found())?;
    for entry in entries.flatten() {
        if entry.file_name().to_string_lossy().eq_ignore_ascii_case(name) {
            debug!(requested = %path.display(), found = %entry.path().display(), "case-insensitive match");
            return Ok(entry.path());
        }
    }
    Err(not_found())
}

/// Read `len` bytes starting at `start`, or through the end of the file when `len` is `None`.
///
/// Fewer bytes are returned when the file is shorter.
pub fn read_range<P: AsRef<Path>>(path: P, start: u64, len: Option<u64>) -> Result<Vec<u8>> {
    let mut file = File::open(path.as_ref())?;
    file.seek(SeekFrom::Start(start))?;
    let mut buf = Vec::new();
    match len {
        Some(n) => {
            file.take(n).read_to_end(&mut buf)?;
        }
        None => {
            file.read_to_end(&mut buf)?;
        }
    }
    Ok(buf)
}

/// The first `len` bytes of a file.
pub fn read_head<P: AsRef<Path>>(path: P, len: u64) -> Result<Vec<u8>> {
    read_range(path, 0, Some(len))
}

pub fn file_size<P: AsRef<Path>>(path: P) -> Option<u64> {
    fs::metadata(path).ok().map(|m| m.len())
}

/// Detached label for a data file: a sibling with the same stem and a label extension.
pub fn find_label<P: AsRef<Path>>(path: P) -> Option<PathBuf> {
    let path = path.as_ref();
    let is_label = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| LABEL_EXTENSIONS.iter().any(|l| l.eq_ignore_ascii_case(e)));
    if is_label {
        return None;
    }
    LABEL_EXTENSIONS
        .iter()
        .map(|ext| path.with_extension(ext))
        .find_map(|candidate| check_cases(candidate).ok())
}
