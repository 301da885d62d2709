use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

use super::bits::{bits_to_hex, to_bit_string};
use super::{vax, Cell, Endian};
use crate::{Error, Result};

/// How an ASCII-encoded field should be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AsciiKind {
    Integer,
    Real,
    Boolean,
    /// Integer digits in the given radix.
    Based(u32),
}

/// Storage type of a table field or image sample.
///
/// # Example
/// ```
/// use pdr::decode::{Cell, Endian, SampleType};
///
/// let st = SampleType::from_pds3("LSB_UNSIGNED_INTEGER", 2).unwrap();
/// assert_eq!(st, SampleType::Int { signed: false, width: 2, endian: Endian::Little });
/// assert_eq!(st.decode(&[0x01, 0x02]).unwrap(), Cell::UInt(0x0201));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[non_exhaustive]
pub enum SampleType {
    Int {
        signed: bool,
        width: usize,
        endian: Endian,
    },
    Float {
        width: usize,
        endian: Endian,
    },
    /// VAX F-floating (4 bytes). 8-byte VAX types are recognized but not decodable.
    Vax { width: usize },
    Ascii(AsciiKind),
    BitString { endian: Endian },
    Character,
    Date,
}

fn little_prefixed(name: &str) -> bool {
    ["LSB", "PC_", "VAX"].iter().any(|p| name.starts_with(p))
}

impl SampleType {
    /// Resolve a PDS3 `DATA_TYPE`/`SAMPLE_TYPE` for a field of `bytes` bytes.
    ///
    /// # Errors
    /// [Error::UnsupportedFormat] for unknown type names or impossible widths.
    pub fn from_pds3(data_type: &str, bytes: usize) -> Result<Self> {
        let name = data_type.trim().to_ascii_uppercase().replace(' ', "_");
        let unsupported = || Error::UnsupportedFormat(format!("{data_type} with {bytes} bytes"));
        let endian = if little_prefixed(&name) {
            Endian::Little
        } else {
            Endian::Big
        };

        let st = if name.contains("BIT_STRING") {
            SampleType::BitString { endian }
        } else if name == "ASCII_REAL" {
            SampleType::Ascii(AsciiKind::Real)
        } else if name == "ASCII_INTEGER" {
            SampleType::Ascii(AsciiKind::Integer)
        } else if name == "BOOLEAN" || name == "ASCII_BOOLEAN" {
            SampleType::Ascii(AsciiKind::Boolean)
        } else if name == "CHARACTER" || name == "ASCII" || name == "ASCII_STRING" {
            SampleType::Character
        } else if name == "DATE" || name == "TIME" || name.ends_with("_TIME") {
            SampleType::Date
        } else if name.contains("COMPLEX") {
            return Err(unsupported());
        } else if name.starts_with("VAX") && name.contains("REAL") {
            SampleType::Vax { width: bytes }
        } else if name.contains("REAL") || name == "FLOAT" {
            if !matches!(bytes, 4 | 8) {
                return Err(unsupported());
            }
            let endian = if name.starts_with("PC") || name.starts_with("LSB") {
                Endian::Little
            } else {
                Endian::Big
            };
            SampleType::Float {
                width: bytes,
                endian,
            }
        } else if name.contains("INTEGER") {
            if !matches!(bytes, 1 | 2 | 4 | 8) {
                return Err(unsupported());
            }
            SampleType::Int {
                signed: !name.contains("UNSIGNED"),
                width: bytes,
                endian,
            }
        } else {
            return Err(unsupported());
        };
        Ok(st)
    }

    /// Resolve a PDS4 `data_type` such as `SignedMSB2` or `IEEE754LSBDouble`.
    pub fn from_pds4(data_type: &str) -> Result<Self> {
        let unsupported = || Error::UnsupportedFormat(data_type.to_string());
        let st = match data_type.trim() {
            "SignedByte" => SampleType::Int {
                signed: true,
                width: 1,
                endian: Endian::Big,
            },
            "UnsignedByte" => SampleType::Int {
                signed: false,
                width: 1,
                endian: Endian::Big,
            },
            "IEEE754MSBSingle" => SampleType::Float { width: 4, endian: Endian::Big },
            "IEEE754MSBDouble" => SampleType::Float { width: 8, endian: Endian::Big },
            "IEEE754LSBSingle" => SampleType::Float { width: 4, endian: Endian::Little },
            "IEEE754LSBDouble" => SampleType::Float { width: 8, endian: Endian::Little },
            "ASCII_Real" => SampleType::Ascii(AsciiKind::Real),
            "ASCII_Integer" | "ASCII_NonNegative_Integer" => SampleType::Ascii(AsciiKind::Integer),
            "ASCII_Boolean" => SampleType::Ascii(AsciiKind::Boolean),
            "ASCII_Numeric_Base2" => SampleType::Ascii(AsciiKind::Based(2)),
            "ASCII_Numeric_Base8" => SampleType::Ascii(AsciiKind::Based(8)),
            "ASCII_Numeric_Base16" => SampleType::Ascii(AsciiKind::Based(16)),
            "SignedBitString" | "UnsignedBitString" => SampleType::BitString { endian: Endian::Big },
            s if s.starts_with("ASCII_Date") => SampleType::Date,
            s if s.starts_with("ASCII_") || s.starts_with("UTF8_") => SampleType::Character,
            s => {
                // SignedMSB2, UnsignedLSB4, ...
                let (signed, rest) = if let Some(rest) = s.strip_prefix("Signed") {
                    (true, rest)
                } else if let Some(rest) = s.strip_prefix("Unsigned") {
                    (false, rest)
                } else {
                    return Err(unsupported());
                };
                let endian = match &rest[..rest.len().min(3)] {
                    "MSB" => Endian::Big,
                    "LSB" => Endian::Little,
                    _ => return Err(unsupported()),
                };
                let width: usize = rest[3..].parse().map_err(|_| unsupported())?;
                if !matches!(width, 1 | 2 | 4 | 8) {
                    return Err(unsupported());
                }
                SampleType::Int {
                    signed,
                    width,
                    endian,
                }
            }
        };
        Ok(st)
    }

    /// Fixed byte width, if the type has one.
    pub fn width(&self) -> Option<usize> {
        match self {
            SampleType::Int { width, .. }
            | SampleType::Float { width, .. }
            | SampleType::Vax { width } => Some(*width),
            _ => None,
        }
    }

    /// True for binary numeric types that images can be built from.
    pub fn is_binary_numeric(&self) -> bool {
        matches!(
            self,
            SampleType::Int { .. } | SampleType::Float { .. } | SampleType::Vax { width: 4 }
        )
    }

    /// True for types stored as text.
    pub fn is_ascii(&self) -> bool {
        matches!(
            self,
            SampleType::Ascii(_) | SampleType::Character | SampleType::Date
        )
    }

    /// Decode a binary numeric sample to `f64`.
    ///
    /// # Errors
    /// [Error::NotEnoughData] if `bytes` is shorter than the sample width, and
    /// [Error::UnsupportedFormat] for non-numeric types.
    pub fn read_f64(&self, bytes: &[u8]) -> Result<f64> {
        match *self {
            SampleType::Int {
                signed,
                width,
                endian,
            } => {
                let raw = read_uint(bytes, width, endian)?;
                Ok(if signed {
                    sign_extend(raw, width) as f64
                } else {
                    raw as f64
                })
            }
            SampleType::Float { width, endian } => read_float(bytes, width, endian),
            SampleType::Vax { width: 4 } => {
                let b = take::<4>(bytes)?;
                Ok(f64::from(vax::vax_to_f32(b)))
            }
            other => Err(Error::UnsupportedFormat(format!(
                "{other:?} is not a binary numeric type"
            ))),
        }
    }

    /// Decode one field value.
    ///
    /// Text that fails to parse as its declared ASCII type is returned as [Cell::Text].
    /// Bit strings wider than 64 bits are rendered as hex text.
    pub fn decode(&self, bytes: &[u8]) -> Result<Cell> {
        let cell = match *self {
            SampleType::Int {
                signed,
                width,
                endian,
            } => {
                let raw = read_uint(bytes, width, endian)?;
                if signed {
                    Cell::Int(sign_extend(raw, width))
                } else {
                    Cell::UInt(raw)
                }
            }
            SampleType::Float { .. } | SampleType::Vax { .. } => Cell::Float(self.read_f64(bytes)?),
            SampleType::BitString { endian } if bytes.len() > 8 => {
                Cell::Text(bits_to_hex(&to_bit_string(bytes, endian)))
            }
            SampleType::BitString { endian } => Cell::UInt(read_uint(bytes, bytes.len(), endian)?),
            SampleType::Ascii(kind) => parse_ascii(kind, &text(bytes)),
            SampleType::Character => Cell::Text(text(bytes)),
            SampleType::Date => parse_date(&text(bytes)),
        };
        Ok(cell)
    }

    /// Parse a value that has already been split out of delimited text.
    pub fn parse_text(&self, raw: &str) -> Cell {
        let s = raw.trim_matches(|c: char| c.is_whitespace() || c == '"' || c == ',');
        match *self {
            SampleType::Ascii(kind) => parse_ascii(kind, s),
            SampleType::Date => parse_date(s),
            SampleType::Int { .. } => parse_ascii(AsciiKind::Integer, s),
            SampleType::Float { .. } | SampleType::Vax { .. } => parse_ascii(AsciiKind::Real, s),
            _ => Cell::Text(s.to_string()),
        }
    }
}

fn text(bytes: &[u8]) -> String {
    let s: String = bytes.iter().map(|b| *b as char).collect();
    s.trim_matches(|c: char| c.is_whitespace() || c == '"' || c == '\0')
        .to_string()
}

fn take<const N: usize>(bytes: &[u8]) -> Result<[u8; N]> {
    bytes
        .get(..N)
        .and_then(|b| b.try_into().ok())
        .ok_or(Error::NotEnoughData {
            actual: bytes.len(),
            minimum: N,
        })
}

fn read_uint(bytes: &[u8], width: usize, endian: Endian) -> Result<u64> {
    let Some(b) = bytes.get(..width) else {
        return Err(Error::NotEnoughData {
            actual: bytes.len(),
            minimum: width,
        });
    };
    let fold = |acc: u64, byte: &u8| (acc << 8) | u64::from(*byte);
    Ok(match endian {
        Endian::Big => b.iter().fold(0, fold),
        Endian::Little => b.iter().rev().fold(0, fold),
    })
}

fn sign_extend(raw: u64, width: usize) -> i64 {
    let shift = 64 - 8 * width as u32;
    ((raw << shift) as i64) >> shift
}

fn read_float(bytes: &[u8], width: usize, endian: Endian) -> Result<f64> {
    Ok(match (width, endian) {
        (4, Endian::Big) => f64::from(f32::from_be_bytes(take::<4>(bytes)?)),
        (4, Endian::Little) => f64::from(f32::from_le_bytes(take::<4>(bytes)?)),
        (8, Endian::Big) => f64::from_be_bytes(take::<8>(bytes)?),
        (8, Endian::Little) => f64::from_le_bytes(take::<8>(bytes)?),
        _ => return Err(Error::UnsupportedFormat(format!("{width} byte float"))),
    })
}

fn parse_ascii(kind: AsciiKind, s: &str) -> Cell {
    let parsed = match kind {
        AsciiKind::Integer => s
            .parse::<i64>()
            .map(Cell::Int)
            .ok()
            .or_else(|| s.parse::<f64>().ok().map(Cell::Float)),
        // Fortran-style exponents, e.g. 1.0D+03
        AsciiKind::Real => s.replace(['D', 'd'], "E").parse::<f64>().ok().map(Cell::Float),
        AsciiKind::Boolean => match s.to_ascii_uppercase().as_str() {
            "T" | "TRUE" | "1" => Some(Cell::Int(1)),
            "F" | "FALSE" | "0" => Some(Cell::Int(0)),
            _ => None,
        },
        AsciiKind::Based(radix) => {
            let digits = s
                .split('#')
                .filter(|p| !p.is_empty())
                .last()
                .unwrap_or(s);
            u64::from_str_radix(digits, radix).ok().map(Cell::UInt)
        }
    };
    match parsed {
        Some(cell) => cell,
        None if s.is_empty() => Cell::Null,
        None => Cell::Text(s.to_string()),
    }
}

const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%jT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
];
const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%Y-%j"];

/// Parse PDS date/time text. Unparseable values are kept as text.
pub(crate) fn parse_date(s: &str) -> Cell {
    let s = s.trim().trim_end_matches('Z');
    if s.is_empty() {
        return Cell::Null;
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Cell::DateTime(dt);
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Cell::Date(d);
        }
    }
    Cell::Text(s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("MSB_INTEGER", 2, SampleType::Int { signed: true, width: 2, endian: Endian::Big }; "msb int")]
    #[test_case("INTEGER", 4, SampleType::Int { signed: true, width: 4, endian: Endian::Big }; "bare int")]
    #[test_case("UNSIGNED_INTEGER", 1, SampleType::Int { signed: false, width: 1, endian: Endian::Big }; "uint8")]
    #[test_case("PC_UNSIGNED_INTEGER", 2, SampleType::Int { signed: false, width: 2, endian: Endian::Little }; "pc uint")]
    #[test_case("VAX_INTEGER", 4, SampleType::Int { signed: true, width: 4, endian: Endian::Little }; "vax int")]
    #[test_case("IEEE_REAL", 4, SampleType::Float { width: 4, endian: Endian::Big }; "ieee")]
    #[test_case("PC_REAL", 8, SampleType::Float { width: 8, endian: Endian::Little }; "pc double")]
    #[test_case("VAX_REAL", 4, SampleType::Vax { width: 4 }; "vax real")]
    #[test_case("LSB_BIT_STRING", 2, SampleType::BitString { endian: Endian::Little }; "lsb bits")]
    #[test_case("ASCII_REAL", 10, SampleType::Ascii(AsciiKind::Real); "ascii real")]
    #[test_case("CHARACTER", 3, SampleType::Character; "character")]
    #[test_case("TIME", 23, SampleType::Date; "time")]
    fn pds3_types(name: &str, bytes: usize, expected: SampleType) {
        assert_eq!(SampleType::from_pds3(name, bytes).unwrap(), expected);
    }

    #[test]
    fn unsupported_types() {
        assert!(SampleType::from_pds3("IEEE_COMPLEX", 8).is_err());
        assert!(SampleType::from_pds3("MSB_INTEGER", 3).is_err());
        assert!(SampleType::from_pds3("N/A", 3).is_err());
    }

    #[test]
    fn pds4_types() {
        assert_eq!(
            SampleType::from_pds4("SignedLSB4").unwrap(),
            SampleType::Int { signed: true, width: 4, endian: Endian::Little }
        );
        assert_eq!(
            SampleType::from_pds4("IEEE754MSBDouble").unwrap(),
            SampleType::Float { width: 8, endian: Endian::Big }
        );
        assert_eq!(SampleType::from_pds4("ASCII_Date_Time_YMD").unwrap(), SampleType::Date);
        assert!(SampleType::from_pds4("ComplexLSB8").is_err());
    }

    #[test]
    fn decode_signed() {
        let st = SampleType::from_pds3("MSB_INTEGER", 2).unwrap();
        assert_eq!(st.decode(&[0xFF, 0xFE]).unwrap(), Cell::Int(-2));
        assert!(matches!(st.decode(&[0xFF]), Err(Error::NotEnoughData { .. })));
    }

    #[test]
    fn decode_bit_strings() {
        let st = SampleType::from_pds3("LSB_BIT_STRING", 2).unwrap();
        assert_eq!(st.decode(&[0x01, 0x80]).unwrap(), Cell::UInt(0x8001));
        let st = SampleType::from_pds3("MSB_BIT_STRING", 10).unwrap();
        assert_eq!(
            st.decode(&[0, 0, 0, 0, 0, 0, 0, 0, 0xAB, 0xCD]).unwrap(),
            Cell::Text("0000000000000000abcd".into())
        );
    }

    #[test]
    fn decode_floats() {
        let st = SampleType::from_pds3("IEEE_REAL", 4).unwrap();
        assert_eq!(st.decode(&4.5f32.to_be_bytes()).unwrap(), Cell::Float(4.5));
        let st = SampleType::from_pds3("PC_REAL", 8).unwrap();
        assert_eq!(st.decode(&8.8f64.to_le_bytes()).unwrap(), Cell::Float(8.8));
        let st = SampleType::from_pds3("VAX_REAL", 4).unwrap();
        assert_eq!(st.read_f64(&[0x80, 0x40, 0, 0]).unwrap(), 1.0);
    }

    #[test]
    fn decode_ascii() {
        let st = SampleType::from_pds3("ASCII_REAL", 10).unwrap();
        assert_eq!(st.decode(b"  1.5D+02 ").unwrap(), Cell::Float(150.0));
        assert_eq!(st.decode(b" abc").unwrap(), Cell::Text("abc".into()));
        assert_eq!(st.decode(b"     ").unwrap(), Cell::Null);
        let st = SampleType::Ascii(AsciiKind::Based(16));
        assert_eq!(st.decode(b"16#FF#").unwrap(), Cell::UInt(255));
        assert_eq!(st.decode(b"ff").unwrap(), Cell::UInt(255));
    }

    #[test]
    fn decode_dates() {
        let cell = SampleType::Date.decode(b"2012-08-06T05:17:57.000Z").unwrap();
        assert!(matches!(cell, Cell::DateTime(_)));
        let cell = SampleType::Date.decode(b"2012-219").unwrap();
        assert_eq!(cell, Cell::Date(NaiveDate::from_ymd_opt(2012, 8, 6).unwrap()));
        assert_eq!(
            SampleType::Date.decode(b"UNK").unwrap(),
            Cell::Text("UNK".into())
        );
    }

    #[test]
    fn parse_text_strips_padding() {
        let st = SampleType::Ascii(AsciiKind::Integer);
        assert_eq!(st.parse_text(" -12\r"), Cell::Int(-12));
        assert_eq!(SampleType::Character.parse_text(" \"cat\","), Cell::Text("cat".into()));
    }
}
