use std::fs;
use std::path::{Path, PathBuf};

/// Record size used by [attached] products.
pub const RECORD_BYTES: usize = 512;
/// Records reserved for the label in [attached] products; data starts at record 5.
pub const LABEL_RECORDS: usize = 4;

/// Write a product with an attached label: `label` padded to [LABEL_RECORDS] records,
/// followed by `data`.
pub fn attached(dir: &Path, name: &str, label: &str, data: &[u8]) -> PathBuf {
    let mut bytes = label.replace('\n', "\r\n").into_bytes();
    assert!(
        bytes.len() <= RECORD_BYTES * LABEL_RECORDS,
        "label does not fit in {LABEL_RECORDS} records"
    );
    bytes.resize(RECORD_BYTES * LABEL_RECORDS, b' ');
    bytes.extend_from_slice(data);
    let path = dir.join(name);
    fs::write(&path, bytes).expect("writing attached product");
    path
}

/// Write a file, returning its path.
pub fn write(dir: &Path, name: &str, contents: &[u8]) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).expect("writing fixture file");
    path
}

/// Rows of `(X: u8, Y: f32, X: f64)`, big endian, 13 bytes each.
pub fn xyx_rows(rows: &[(u8, f32, f64)]) -> Vec<u8> {
    let mut data = Vec::new();
    for (x, y, x1) in rows {
        data.push(*x);
        data.extend_from_slice(&y.to_be_bytes());
        data.extend_from_slice(&x1.to_be_bytes());
    }
    data
}

pub const XYX_LABEL: &str = r#"PDS_VERSION_ID = PDS3
RECORD_TYPE = FIXED_LENGTH
RECORD_BYTES = 512
FILE_RECORDS = 5
LABEL_RECORDS = 4
INSTRUMENT_ID = "TEST"
^TABLE = 5
OBJECT = TABLE
  ROWS = 3
  ROW_BYTES = 13
  COLUMNS = 3
  OBJECT = COLUMN
    NAME = X
    DATA_TYPE = MSB_UNSIGNED_INTEGER
    START_BYTE = 1
    BYTES = 1
  END_OBJECT = COLUMN
  OBJECT = COLUMN
    NAME = Y
    DATA_TYPE = IEEE_REAL
    START_BYTE = 2
    BYTES = 4
  END_OBJECT = COLUMN
  OBJECT = COLUMN
    NAME = X
    DATA_TYPE = IEEE_REAL
    START_BYTE = 6
    BYTES = 8
  END_OBJECT = COLUMN
END_OBJECT = TABLE
END
"#;
