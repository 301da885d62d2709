//! VAX F-floating <-> IEEE754 single precision.
//!
//! A VAX F-float is two little-endian 16-bit words stored high word first. Swapping the
//! words yields the bit pattern of a little-endian IEEE754 float that is four times the
//! VAX value.
//!
//! # Example
//! ```
//! use pdr::decode::vax;
//!
//! let encoded = vax::to_vax32(&[1.0, -2.5]);
//! assert_eq!(&encoded[..4], &[0x80, 0x40, 0x00, 0x00]);
//! assert_eq!(vax::from_vax32(&encoded).unwrap(), vec![1.0, -2.5]);
//! ```
use ndarray::{Array, ArrayBase, Data, Dimension};

use crate::{Error, Result};

/// Decode one VAX F-float.
pub fn vax_to_f32(b: [u8; 4]) -> f32 {
    f32::from_le_bytes([b[2], b[3], b[0], b[1]]) / 4.0
}

/// Encode one value as a VAX F-float.
pub fn f32_to_vax(v: f32) -> [u8; 4] {
    let le = (v * 4.0).to_le_bytes();
    [le[2], le[3], le[0], le[1]]
}

/// Decode a buffer of packed VAX F-floats, e.g. `&[u8]`, `Vec<u8>` or `&mut [u8]`.
///
/// # Errors
/// [Error::InvalidLength] if the buffer length is not a multiple of 4.
pub fn from_vax32<B: AsRef<[u8]> + ?Sized>(data: &B) -> Result<Vec<f32>> {
    let data = data.as_ref();
    if data.len() % 4 != 0 {
        return Err(Error::InvalidLength {
            actual: data.len(),
            multiple: 4,
        });
    }
    Ok(data
        .chunks_exact(4)
        .map(|c| vax_to_f32([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// Decode text whose characters each carry one byte (latin-1).
///
/// # Errors
/// [Error::InvalidLength] for lengths that are not a multiple of 4, and
/// [Error::UnsupportedInput] for characters above U+00FF.
pub fn from_vax32_latin1(text: &str) -> Result<Vec<f32>> {
    let bytes = text
        .chars()
        .map(|c| {
            u8::try_from(u32::from(c))
                .map_err(|_| Error::UnsupportedInput(format!("{c:?} is not a latin-1 character")))
        })
        .collect::<Result<Vec<u8>>>()?;
    from_vax32(&bytes)
}

/// Encode values as packed VAX F-floats.
pub fn to_vax32(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| f32_to_vax(*v)).collect()
}

/// Encode an array of any shape. Each output element holds the VAX bit pattern, read as a
/// little-endian `f32`; the numeric values are not meaningful until decoded again.
pub fn to_vax32_array<S, D>(array: &ArrayBase<S, D>) -> Array<f32, D>
where
    S: Data<Elem = f32>,
    D: Dimension,
{
    array.mapv(|v| f32::from_le_bytes(f32_to_vax(v)))
}

/// Decode an array produced by [to_vax32_array] or read raw from disk as `f32` words.
pub fn from_vax32_array<S, D>(array: &ArrayBase<S, D>) -> Array<f32, D>
where
    S: Data<Elem = f32>,
    D: Dimension,
{
    array.mapv(|v| vax_to_f32(v.to_le_bytes()))
}
