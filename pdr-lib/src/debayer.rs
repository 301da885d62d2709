//! Demosaicing for color filter array images.
use ndarray::{Array2, ArrayView2};

use crate::{Error, Result};

/// Pixel classes defined as fixed positions in an `m x n` tile repeated over the image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    /// Tile (rows, columns).
    pub shape: (usize, usize),
    /// Class name and its (row, column) position within the tile.
    pub classes: Vec<(String, (usize, usize))>,
}

impl Pattern {
    /// Conventional RGGB Bayer tile.
    pub fn rggb() -> Self {
        Self {
            shape: (2, 2),
            classes: vec![
                ("red".into(), (0, 0)),
                ("green_1".into(), (0, 1)),
                ("green_2".into(), (1, 0)),
                ("blue".into(), (1, 1)),
            ],
        }
    }

    pub fn position(&self, class: &str) -> Option<(usize, usize)> {
        self.classes
            .iter()
            .find(|(name, _)| name == class)
            .map(|(_, pos)| *pos)
    }
}

impl Default for Pattern {
    fn default() -> Self {
        Self::rggb()
    }
}

/// Row and column indices covered by one class over an image of `shape`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassMask {
    pub name: String,
    pub rows: Vec<usize>,
    pub columns: Vec<usize>,
}

pub fn pattern_masks(shape: (usize, usize), pattern: &Pattern) -> Vec<ClassMask> {
    let (prows, pcols) = pattern.shape;
    pattern
        .classes
        .iter()
        .map(|(name, (r, c))| ClassMask {
            name: name.clone(),
            rows: (*r..shape.0).step_by(prows.max(1)).collect(),
            columns: (*c..shape.1).step_by(pcols.max(1)).collect(),
        })
        .collect()
}

/// Piecewise-linear interpolation at `x`, holding the end values outside `xs`.
fn interp(x: usize, xs: &[usize], ys: &[f64]) -> f64 {
    match xs.binary_search(&x) {
        Ok(i) => ys[i],
        Err(0) => ys[0],
        Err(i) if i == xs.len() => ys[i - 1],
        Err(i) => {
            let (x0, x1) = (xs[i - 1] as f64, xs[i] as f64);
            let t = (x as f64 - x0) / (x1 - x0);
            ys[i - 1] + t * (ys[i] - ys[i - 1])
        }
    }
}

/// Spread values sampled on a regular subgrid over the full `shape`.
///
/// `values` is indexed (row in `rows`, column in `columns`). Interpolates along each sampled
/// row first, then along every column.
pub fn bilinear_interpolate_subgrid(
    rows: &[usize],
    columns: &[usize],
    values: &ArrayView2<'_, f64>,
    shape: (usize, usize),
) -> Array2<f64> {
    let mut horizontal = Array2::<f64>::zeros((rows.len(), shape.1));
    for (ri, mut out) in horizontal.outer_iter_mut().enumerate() {
        let ys: Vec<f64> = values.row(ri).to_vec();
        for (c, v) in out.iter_mut().enumerate() {
            *v = interp(c, columns, &ys);
        }
    }
    let mut output = Array2::<f64>::zeros(shape);
    for c in 0..shape.1 {
        let ys: Vec<f64> = horizontal.column(c).to_vec();
        for r in 0..shape.0 {
            output[[r, c]] = interp(r, rows, &ys);
        }
    }
    output
}

/// Upsample the named classes to full resolution, averaging when more than one is given.
///
/// # Errors
/// [Error::UnsupportedFormat] for an unknown class, no classes, or an image smaller than
/// the pattern tile.
pub fn debayer(image: &ArrayView2<'_, f64>, classes: &[&str], pattern: &Pattern) -> Result<Array2<f64>> {
    if classes.is_empty() {
        return Err(Error::UnsupportedFormat("no pixel classes to debayer".into()));
    }
    let shape = image.dim();
    let masks = pattern_masks(shape, pattern);
    let mut sum = Array2::<f64>::zeros(shape);
    for class in classes {
        let mask = masks
            .iter()
            .find(|m| m.name == *class)
            .ok_or_else(|| Error::UnsupportedFormat(format!("unknown pixel class {class}")))?;
        if mask.rows.is_empty() || mask.columns.is_empty() {
            return Err(Error::UnsupportedFormat(format!(
                "image {shape:?} is smaller than the pattern tile"
            )));
        }
        let sub = Array2::from_shape_fn((mask.rows.len(), mask.columns.len()), |(i, j)| {
            image[[mask.rows[i], mask.columns[j]]]
        });
        sum += &bilinear_interpolate_subgrid(&mask.rows, &mask.columns, &sub.view(), shape);
    }
    Ok(sum / classes.len() as f64)
}
