use ndarray::{Array3, Axis};
use serde::Serialize;

use crate::label::pds4::text_of;
use crate::label::{Block, Value};

/// Linear scaling `raw * factor + offset`.
///
/// Factors and offsets are either single values or one per band.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Scaling {
    factors: Vec<f64>,
    offsets: Vec<f64>,
}

impl Default for Scaling {
    fn default() -> Self {
        Self::new(1.0, 0.0)
    }
}

fn numbers(value: Option<&Value>, default: f64) -> Vec<f64> {
    match value {
        Some(Value::Sequence(items) | Value::Set(items)) => {
            let nums: Vec<f64> = items.iter().filter_map(Value::as_f64).collect();
            if nums.is_empty() {
                vec![default]
            } else {
                nums
            }
        }
        Some(v) => vec![v.as_f64().unwrap_or(default)],
        None => vec![default],
    }
}

impl Scaling {
    pub fn new(factor: f64, offset: f64) -> Self {
        Self {
            factors: vec![factor],
            offsets: vec![offset],
        }
    }

    /// Read `SCALING_FACTOR`/`OFFSET` from a PDS3 object or column block.
    pub fn from_block(block: &Block) -> Self {
        Self::from_keys(block, "SCALING_FACTOR", "OFFSET")
    }

    /// Read scaling from arbitrary keys, e.g. PDS4 `scaling_factor`/`value_offset`.
    pub fn from_keys(block: &Block, factor_key: &str, offset_key: &str) -> Self {
        let scalar = |key: &str| block.get(key).map(|v| text_of(v).unwrap_or(v));
        Self {
            factors: numbers(scalar(factor_key), 1.0),
            offsets: numbers(scalar(offset_key), 0.0),
        }
    }

    pub fn is_identity(&self) -> bool {
        self.factors.iter().all(|f| *f == 1.0) && self.offsets.iter().all(|o| *o == 0.0)
    }

    /// True when factors and offsets are given per band for exactly `bands` bands.
    pub fn is_per_band(&self, bands: usize) -> bool {
        bands > 1 && self.factors.len() == bands && self.offsets.len() == bands
    }

    fn pick(values: &[f64], band: usize) -> f64 {
        values.get(band).or_else(|| values.first()).copied().unwrap_or_default()
    }

    /// Scale one value belonging to `band` (0 for tables and single-band images).
    pub fn apply(&self, raw: f64, band: usize) -> f64 {
        raw * Self::pick(&self.factors, band) + Self::pick(&self.offsets, band)
    }

    /// Scale a (band, line, sample) array in place. Per-band values are only used when
    /// their count matches the band count; otherwise the first values apply everywhere.
    pub fn apply_array(&self, data: &mut Array3<f64>) {
        if self.is_identity() {
            return;
        }
        let bands = data.len_of(Axis(0));
        let per_band = self.is_per_band(bands);
        for (band, mut plane) in data.axis_iter_mut(Axis(0)).enumerate() {
            let band = if per_band { band } else { 0 };
            let (factor, offset) = (
                Self::pick(&self.factors, band),
                Self::pick(&self.offsets, band),
            );
            plane.mapv_inplace(|v| v * factor + offset);
        }
    }
}
