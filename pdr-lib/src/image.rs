//! Raster objects: layout from the label, decode into a (band, line, sample) array.
use ndarray::{s, Array2, Array3, ArrayView2, Axis};
use serde::Serialize;
use tracing::debug;

use crate::debayer::{self, Pattern};
use crate::decode::{SampleType, Scaling, SpecialConstants};
use crate::label::pds4::text_of;
use crate::label::{Block, Value};
use crate::{DecodeWarning, Error, Result};

/// Order in which bands, lines and samples are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BandStorage {
    /// BSQ: each band is a complete image.
    BandSequential,
    /// BIL: each line holds that line of every band in turn.
    LineInterleaved,
    /// BIP: each sample holds every band.
    SampleInterleaved,
}

impl BandStorage {
    pub fn from_label(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "BAND_SEQUENTIAL" | "BSQ" => Some(Self::BandSequential),
            "LINE_INTERLEAVED" | "BIL" => Some(Self::LineInterleaved),
            "SAMPLE_INTERLEAVED" | "BIP" => Some(Self::SampleInterleaved),
            _ => None,
        }
    }
}

/// Everything needed to decode an image from its first byte.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageSpec {
    pub sample_type: SampleType,
    pub lines: usize,
    pub samples: usize,
    pub bands: usize,
    pub storage: BandStorage,
    pub line_prefix_bytes: usize,
    pub line_suffix_bytes: usize,
    /// Trailing ISIS suffix planes along (band, line, sample), in pixels.
    pub suffix_planes: [usize; 3],
    pub scaling: Scaling,
    pub specials: SpecialConstants,
}

fn int(block: &Block, key: &str) -> Option<usize> {
    block
        .get(key)
        .and_then(text_of)
        .and_then(Value::as_i64)
        .and_then(|v| usize::try_from(v).ok())
}

fn text(block: &Block, key: &str) -> Option<String> {
    block.get(key).and_then(text_of).map(|v| match v {
        Value::Text(s) => s.trim().to_string(),
        other => other.to_string(),
    })
}

fn ints(value: Option<&Value>) -> Vec<usize> {
    match value {
        Some(Value::Sequence(items) | Value::Set(items)) => items
            .iter()
            .map(|v| v.as_i64().and_then(|n| usize::try_from(n).ok()).unwrap_or(0))
            .collect(),
        Some(v) => v
            .as_i64()
            .and_then(|n| usize::try_from(n).ok())
            .into_iter()
            .collect(),
        None => Vec::new(),
    }
}

fn required(name: &str, block: &Block, key: &str) -> Result<usize> {
    int(block, key).ok_or_else(|| Error::UnsupportedFormat(format!("{name} has no {key}")))
}

/// Storage order implied by axis names listed slowest first.
fn storage_from_axes(axes: &[String]) -> Option<BandStorage> {
    let axes: Vec<String> = axes.iter().map(|a| a.to_ascii_uppercase()).collect();
    let pos = |name: &str| axes.iter().position(|a| a == name);
    match (pos("BAND")?, pos("LINE")?, pos("SAMPLE")?) {
        (0, 1, 2) => Some(BandStorage::BandSequential),
        (1, 0, 2) => Some(BandStorage::LineInterleaved),
        (2, 0, 1) => Some(BandStorage::SampleInterleaved),
        _ => None,
    }
}

impl ImageSpec {
    /// Layout of a PDS3 `IMAGE` or `QUBE` object.
    ///
    /// # Errors
    /// [Error::UnsupportedFormat] for missing dimensions, unknown sample types, a
    /// multiband image without `BAND_STORAGE_TYPE`, or line prefixes the decoder cannot
    /// strip.
    pub fn from_pds3(name: &str, block: &Block, warnings: &mut Vec<DecodeWarning>) -> Result<Self> {
        let spec = if block.contains_key("CORE_ITEMS") {
            Self::from_qube(name, block)?
        } else {
            Self::from_image(name, block, warnings)?
        };
        spec.validate(name)?;
        debug!(object = name, lines = spec.lines, samples = spec.samples, bands = spec.bands, storage = ?spec.storage, "pds3 image layout");
        Ok(spec)
    }

    fn from_image(name: &str, block: &Block, warnings: &mut Vec<DecodeWarning>) -> Result<Self> {
        let sample_bits = required(name, block, "SAMPLE_BITS")?;
        let sample_type_name = text(block, "SAMPLE_TYPE")
            .ok_or_else(|| Error::UnsupportedFormat(format!("{name} has no SAMPLE_TYPE")))?;
        let sample_type = SampleType::from_pds3(&sample_type_name, sample_bits / 8)?;
        let bands = int(block, "BANDS").unwrap_or(1).max(1);
        let storage = match text(block, "BAND_STORAGE_TYPE") {
            Some(value) => BandStorage::from_label(&value).unwrap_or_else(|| {
                let message = format!("unsupported BAND_STORAGE_TYPE {value}; guessing BAND_SEQUENTIAL");
                debug!(object = name, "{message}");
                warnings.push(DecodeWarning::new(name, message));
                BandStorage::BandSequential
            }),
            None if bands > 1 => {
                return Err(Error::UnsupportedFormat(format!(
                    "{name} has {bands} bands and no BAND_STORAGE_TYPE"
                )))
            }
            None => BandStorage::BandSequential,
        };
        Ok(Self {
            sample_type,
            lines: required(name, block, "LINES")?,
            samples: required(name, block, "LINE_SAMPLES")?,
            bands,
            storage,
            line_prefix_bytes: int(block, "LINE_PREFIX_BYTES").unwrap_or(0),
            line_suffix_bytes: int(block, "LINE_SUFFIX_BYTES").unwrap_or(0),
            suffix_planes: [0; 3],
            scaling: Scaling::from_block(block),
            specials: SpecialConstants::from_block(block).with_implicit(&sample_type),
        })
    }

    fn from_qube(name: &str, block: &Block) -> Result<Self> {
        let core = ints(block.get("CORE_ITEMS"));
        let axes: Vec<String> = match block.get("AXIS_NAME") {
            Some(Value::Sequence(items) | Value::Set(items)) => {
                items.iter().map(ToString::to_string).collect()
            }
            _ => vec!["SAMPLE".into(), "LINE".into(), "BAND".into()],
        };
        if core.len() != 3 || axes.len() != 3 {
            return Err(Error::UnsupportedFormat(format!(
                "{name}: CORE_ITEMS and AXIS_NAME must name three axes"
            )));
        }
        let item_bytes = required(name, block, "CORE_ITEM_BYTES")?;
        let type_name = text(block, "CORE_ITEM_TYPE")
            .ok_or_else(|| Error::UnsupportedFormat(format!("{name} has no CORE_ITEM_TYPE")))?;
        let sample_type = SampleType::from_pds3(&type_name, item_bytes)?;

        let upper: Vec<String> = axes.iter().map(|a| a.to_ascii_uppercase()).collect();
        let dim = |axis: &str| upper.iter().position(|a| a == axis).map(|i| core[i]);
        // Axis names are listed fastest first.
        let slowest_first: Vec<String> = upper.iter().rev().cloned().collect();
        let storage = storage_from_axes(&slowest_first).ok_or_else(|| {
            Error::UnsupportedFormat(format!("{name}: unsupported axis order {axes:?}"))
        })?;

        let suffix_items = ints(block.get("SUFFIX_ITEMS"));
        let mut suffix_planes = [0; 3];
        for (slot, axis) in ["BAND", "LINE", "SAMPLE"].iter().enumerate() {
            let Some(i) = upper.iter().position(|a| a == axis) else {
                continue;
            };
            let count = suffix_items.get(i).copied().unwrap_or(0);
            if count == 0 {
                continue;
            }
            let bytes = int(block, &format!("{axis}_SUFFIX_ITEM_BYTES")).unwrap_or(item_bytes);
            if (count * bytes) % item_bytes != 0 {
                return Err(Error::UnsupportedFormat(format!(
                    "{name}: {axis} suffix is not a whole number of core items"
                )));
            }
            suffix_planes[slot] = count * bytes / item_bytes;
        }

        let mut specials = SpecialConstants::from_block(block).with_implicit(&sample_type);
        for key in ["CORE_NULL", "CORE_LOW_REPR_SATURATION", "CORE_LOW_INSTR_SATURATION", "CORE_HIGH_REPR_SATURATION", "CORE_HIGH_INSTR_SATURATION"] {
            if let Some(v) = block.get(key).and_then(Value::as_f64) {
                specials.insert(key, v);
            }
        }
        let scaling = match (block.get("CORE_MULTIPLIER"), block.get("CORE_BASE")) {
            (None, None) => Scaling::from_block(block),
            (m, b) => Scaling::new(
                m.and_then(Value::as_f64).unwrap_or(1.0),
                b.and_then(Value::as_f64).unwrap_or(0.0),
            ),
        };
        Ok(Self {
            sample_type,
            lines: dim("LINE").unwrap_or(1),
            samples: dim("SAMPLE").unwrap_or(1),
            bands: dim("BAND").unwrap_or(1),
            storage,
            line_prefix_bytes: 0,
            line_suffix_bytes: 0,
            suffix_planes,
            scaling,
            specials,
        })
    }

    /// Layout of a PDS3 `ARRAY` of one `ELEMENT` type, read as a band-sequential image
    /// with missing leading axes of length 1.
    pub fn from_pds3_array(name: &str, block: &Block) -> Result<Self> {
        let element = block
            .get("ELEMENT")
            .and_then(Value::as_block)
            .ok_or_else(|| Error::UnsupportedFormat(format!("{name} has no ELEMENT")))?;
        let data_type = text(element, "DATA_TYPE")
            .ok_or_else(|| Error::UnsupportedFormat(format!("{name} has no DATA_TYPE")))?;
        let sample_type = SampleType::from_pds3(&data_type, required(name, element, "BYTES")?)?;
        let (bands, lines, samples) = match ints(block.get("AXIS_ITEMS")).as_slice() {
            [n] => (1, 1, *n),
            [l, s] => (1, *l, *s),
            [b, l, s] => (*b, *l, *s),
            other => {
                return Err(Error::UnsupportedFormat(format!(
                    "{name}: {} axes",
                    other.len()
                )))
            }
        };
        Ok(Self {
            sample_type,
            lines,
            samples,
            bands,
            storage: BandStorage::BandSequential,
            line_prefix_bytes: 0,
            line_suffix_bytes: 0,
            suffix_planes: [0; 3],
            scaling: Scaling::from_block(element),
            specials: SpecialConstants::from_block(element),
        })
    }

    /// Layout of a PDS4 `Array_*` element.
    pub fn from_pds4(name: &str, block: &Block) -> Result<Self> {
        let element = block
            .get("Element_Array")
            .and_then(Value::as_block)
            .ok_or_else(|| Error::UnsupportedFormat(format!("{name} has no Element_Array")))?;
        let data_type = text(element, "data_type")
            .ok_or_else(|| Error::UnsupportedFormat(format!("{name} has no data_type")))?;
        let sample_type = SampleType::from_pds4(&data_type)?;

        let mut axes: Vec<(usize, String, usize)> = block
            .get_all("Axis_Array")
            .filter_map(Value::as_block)
            .map(|axis| {
                (
                    int(axis, "sequence_number").unwrap_or(0),
                    text(axis, "axis_name").unwrap_or_default(),
                    int(axis, "elements").unwrap_or(0),
                )
            })
            .collect();
        axes.sort_by_key(|(seq, _, _)| *seq);
        let names: Vec<String> = axes.iter().map(|(_, n, _)| n.to_ascii_uppercase()).collect();
        let dims: Vec<usize> = axes.iter().map(|(_, _, e)| *e).collect();

        let (bands, lines, samples, storage) = match dims.as_slice() {
            [n] => (1, 1, *n, BandStorage::BandSequential),
            [l, s] => (1, *l, *s, BandStorage::BandSequential),
            [_, _, _] => {
                let find = |axis: &str| {
                    names
                        .iter()
                        .position(|n| n.contains(axis))
                        .map(|i| dims[i])
                };
                let storage = storage_from_axes(
                    &names
                        .iter()
                        .map(|n| {
                            ["BAND", "LINE", "SAMPLE"]
                                .iter()
                                .find(|a| n.contains(*a))
                                .map_or_else(|| n.clone(), |a| a.to_string())
                        })
                        .collect::<Vec<_>>(),
                )
                .unwrap_or(BandStorage::BandSequential);
                match (find("BAND"), find("LINE"), find("SAMPLE")) {
                    (Some(b), Some(l), Some(s)) => (b, l, s, storage),
                    _ => (dims[0], dims[1], dims[2], BandStorage::BandSequential),
                }
            }
            other => {
                return Err(Error::UnsupportedFormat(format!(
                    "{name}: {} axes",
                    other.len()
                )))
            }
        };
        let specials = block
            .get("Special_Constants")
            .and_then(Value::as_block)
            .map(SpecialConstants::from_pds4)
            .unwrap_or_default();
        Ok(Self {
            sample_type,
            lines,
            samples,
            bands,
            storage,
            line_prefix_bytes: 0,
            line_suffix_bytes: 0,
            suffix_planes: [0; 3],
            scaling: Scaling::from_keys(element, "scaling_factor", "value_offset"),
            specials,
        })
    }

    fn validate(&self, name: &str) -> Result<()> {
        let px = self.pixel_bytes()?;
        let fixes = self.line_prefix_bytes.saturating_add(self.line_suffix_bytes);
        if fixes == 0 {
            return Ok(());
        }
        if self.line_prefix_bytes % px != 0 || self.line_suffix_bytes % px != 0 {
            return Err(Error::UnsupportedFormat(format!(
                "{name}: line prefix/suffix not aligned with {px}-byte samples"
            )));
        }
        if self.bands > 1 && self.storage != BandStorage::LineInterleaved {
            return Err(Error::UnsupportedFormat(format!(
                "{name}: line prefix/suffix with {:?} storage",
                self.storage
            )));
        }
        if self.suffix_planes.iter().any(|p| *p > 0) {
            return Err(Error::UnsupportedFormat(format!(
                "{name}: line prefixes together with suffix planes"
            )));
        }
        Ok(())
    }

    fn pixel_bytes(&self) -> Result<usize> {
        match self.sample_type.width() {
            Some(w) if self.sample_type.is_binary_numeric() => Ok(w),
            _ => Err(Error::UnsupportedFormat(format!(
                "{:?} is not an image sample type",
                self.sample_type
            ))),
        }
    }

    fn padded(&self) -> (usize, usize, usize) {
        let [b, l, s] = self.suffix_planes;
        (
            self.bands.saturating_add(b),
            self.lines.saturating_add(l),
            self.samples.saturating_add(s),
        )
    }

    /// Bytes the image occupies on disk.
    ///
    /// # Errors
    /// [Error::UnsupportedFormat] when the dimensions overflow `usize`.
    pub fn byte_len(&self) -> Result<usize> {
        let px = self.sample_type.width().unwrap_or(1);
        let (b, l, s) = self.padded();
        b.checked_mul(l)
            .and_then(|n| n.checked_mul(s))
            .and_then(|n| n.checked_mul(px))
            .and_then(|n| {
                let framing = self.line_prefix_bytes.checked_add(self.line_suffix_bytes)?;
                n.checked_add(l.checked_mul(framing)?)
            })
            .ok_or_else(|| {
                Error::UnsupportedFormat(format!("{b} x {l} x {s} image is too large to address"))
            })
    }
}

/// A decoded image.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Image {
    /// Scaled values in (band, line, sample) order.
    #[serde(skip)]
    pub data: Array3<f64>,
    /// `true` where the raw value was a special constant.
    #[serde(skip)]
    pub mask: Option<Array3<bool>>,
    pub sample_type: SampleType,
}

/// Summary statistics over unmasked values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Stats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub count: usize,
}

impl Image {
    pub fn bands(&self) -> usize {
        self.data.len_of(Axis(0))
    }

    /// `(bands, lines, samples)`
    pub fn shape(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    pub fn band(&self, index: usize) -> Option<ArrayView2<'_, f64>> {
        (index < self.bands()).then(|| self.data.index_axis(Axis(0), index))
    }

    /// Statistics over unmasked values; `None` when every value is masked.
    pub fn stats(&self) -> Option<Stats> {
        let mask: Vec<bool> = self
            .mask
            .as_ref()
            .map(|m| m.iter().copied().collect())
            .unwrap_or_default();
        let mut stats: Option<Stats> = None;
        for (i, v) in self.data.iter().enumerate() {
            if mask.get(i).copied().unwrap_or(false) {
                continue;
            }
            let s = stats.get_or_insert(Stats {
                min: *v,
                max: *v,
                mean: 0.0,
                count: 0,
            });
            s.min = s.min.min(*v);
            s.max = s.max.max(*v);
            s.mean += *v;
            s.count += 1;
        }
        stats.map(|mut s| {
            s.mean /= s.count as f64;
            s
        })
    }

    /// Demosaic one band of a color filter array image.
    ///
    /// # Errors
    /// [Error::NoSuchObject] for a band index out of range, and errors from [debayer::debayer].
    pub fn debayer(&self, band: usize, classes: &[&str], pattern: &Pattern) -> Result<Array2<f64>> {
        let view = self
            .band(band)
            .ok_or_else(|| Error::NoSuchObject(format!("band {band}")))?;
        debayer::debayer(&view, classes, pattern)
    }
}

/// Zero bytes [build_image] will add to short data.
pub const MAX_PADDING_BYTES: usize = 64 * 1024 * 1024;

/// Decode an image from `data`, which starts at the image's first byte.
///
/// Short data is zero-padded with a warning, up to [MAX_PADDING_BYTES]. Beyond that the
/// label's dimensions are taken to be wrong and [Error::NotEnoughData] is returned.
pub fn build_image(
    name: &str,
    data: &[u8],
    spec: &ImageSpec,
    warnings: &mut Vec<DecodeWarning>,
) -> Result<Image> {
    spec.validate(name)?;
    let px = spec.pixel_bytes()?;
    let needed = spec.byte_len()?;
    if needed - data.len().min(needed) > MAX_PADDING_BYTES {
        return Err(Error::NotEnoughData {
            actual: data.len(),
            minimum: needed,
        });
    }
    let padded_data;
    let data = if data.len() < needed {
        let message = format!("expected {needed} bytes, found {}; padding with zeros", data.len());
        debug!(object = name, "{message}");
        warnings.push(DecodeWarning::new(name, message));
        let mut v = data.to_vec();
        v.resize(needed, 0);
        padded_data = v;
        &padded_data[..]
    } else {
        &data[..needed]
    };

    let (b, l, s) = spec.padded();
    let mut raw = Vec::with_capacity(b * l * s);
    if spec.line_prefix_bytes + spec.line_suffix_bytes > 0 {
        // One prefixed line holds every band (BIL) or the only band.
        let line_bytes = spec.line_prefix_bytes + b * s * px + spec.line_suffix_bytes;
        for line in data.chunks_exact(line_bytes) {
            let body = &line[spec.line_prefix_bytes..line_bytes - spec.line_suffix_bytes];
            for sample in body.chunks_exact(px) {
                raw.push(spec.sample_type.read_f64(sample)?);
            }
        }
    } else {
        for sample in data.chunks_exact(px) {
            raw.push(spec.sample_type.read_f64(sample)?);
        }
    }

    let shape_err = |e: ndarray::ShapeError| Error::UnsupportedFormat(format!("{name}: {e}"));
    let full = match spec.storage {
        BandStorage::BandSequential => Array3::from_shape_vec((b, l, s), raw).map_err(shape_err)?,
        BandStorage::SampleInterleaved => Array3::from_shape_vec((l, s, b), raw)
            .map_err(shape_err)?
            .permuted_axes([2, 0, 1]),
        BandStorage::LineInterleaved => Array3::from_shape_vec((l, b, s), raw)
            .map_err(shape_err)?
            .permuted_axes([1, 0, 2]),
    };
    let mut values = full
        .slice(s![..spec.bands, ..spec.lines, ..spec.samples])
        .as_standard_layout()
        .into_owned();

    let mask = values.mapv(|v| spec.specials.is_special(v));
    let mask = mask.iter().any(|m| *m).then_some(mask);
    spec.scaling.apply_array(&mut values);
    debug!(object = name, shape = ?values.dim(), masked = mask.is_some(), "built image");
    Ok(Image {
        data: values,
        mask,
        sample_type: spec.sample_type,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::Endian;
    use crate::label::pds3;

    fn spec(bands: usize, storage: BandStorage) -> ImageSpec {
        ImageSpec {
            sample_type: SampleType::Int { signed: false, width: 1, endian: Endian::Big },
            lines: 2,
            samples: 3,
            bands,
            storage,
            line_prefix_bytes: 0,
            line_suffix_bytes: 0,
            suffix_planes: [0; 3],
            scaling: Scaling::default(),
            specials: SpecialConstants::default(),
        }
    }

    /// Value encodes position: band * 100 + line * 10 + sample.
    fn expected(b: usize, l: usize, s: usize) -> f64 {
        (b * 100 + l * 10 + s) as f64
    }

    #[test]
    fn band_sequential() {
        let mut data = Vec::new();
        for b in 0..2 {
            for l in 0..2 {
                for s in 0..3 {
                    data.push(expected(b, l, s) as u8);
                }
            }
        }
        let image = build_image("IMAGE", &data, &spec(2, BandStorage::BandSequential), &mut Vec::new()).unwrap();
        assert_eq!(image.shape(), (2, 2, 3));
        assert_eq!(image.data[[1, 1, 2]], expected(1, 1, 2));
        assert!(image.mask.is_none());
    }

    #[test]
    fn sample_interleaved() {
        let mut data = Vec::new();
        for l in 0..2 {
            for s in 0..3 {
                for b in 0..2 {
                    data.push(expected(b, l, s) as u8);
                }
            }
        }
        let image = build_image("IMAGE", &data, &spec(2, BandStorage::SampleInterleaved), &mut Vec::new()).unwrap();
        assert_eq!(image.shape(), (2, 2, 3));
        assert_eq!(image.data[[1, 0, 2]], expected(1, 0, 2));
        assert_eq!(image.data[[0, 1, 1]], expected(0, 1, 1));
    }

    #[test]
    fn line_interleaved_with_prefix() {
        let mut spec = spec(2, BandStorage::LineInterleaved);
        spec.line_prefix_bytes = 2;
        let mut data = Vec::new();
        for l in 0..2 {
            data.extend([0xEE, 0xEE]);
            for b in 0..2 {
                for s in 0..3 {
                    data.push(expected(b, l, s) as u8);
                }
            }
        }
        let image = build_image("IMAGE", &data, &spec, &mut Vec::new()).unwrap();
        assert_eq!(image.data[[1, 1, 0]], expected(1, 1, 0));
        assert_eq!(image.data[[0, 1, 2]], expected(0, 1, 2));
    }

    #[test]
    fn prefix_rejected_for_bsq() {
        let mut spec = spec(2, BandStorage::BandSequential);
        spec.line_prefix_bytes = 1;
        assert!(matches!(
            build_image("IMAGE", &[0; 20], &spec, &mut Vec::new()),
            Err(Error::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn short_data_is_padded() {
        let mut warnings = Vec::new();
        let image = build_image("IMAGE", &[7, 7], &spec(1, BandStorage::BandSequential), &mut warnings).unwrap();
        assert_eq!(warnings.len(), 1);
        assert_eq!(image.data[[0, 0, 1]], 7.0);
        assert_eq!(image.data[[0, 1, 2]], 0.0);
    }

    #[test]
    fn implausible_dimensions_are_refused() {
        let mut spec = spec(1, BandStorage::BandSequential);
        spec.lines = 100_000_000;
        spec.samples = 1024;
        let result = build_image("IMAGE", &[0; 4096], &spec, &mut Vec::new());
        assert!(matches!(
            result,
            Err(Error::NotEnoughData { actual: 4096, minimum }) if minimum == 100_000_000 * 1024
        ));

        spec.lines = usize::MAX / 2;
        assert!(matches!(spec.byte_len(), Err(Error::UnsupportedFormat(_))));
        assert!(build_image("IMAGE", &[0; 16], &spec, &mut Vec::new()).is_err());
    }

    #[test]
    fn pds3_spec_with_scaling_and_mask() {
        let (tree, _) = pds3::parse_block(
            r#"
OBJECT = IMAGE
  LINES = 1
  LINE_SAMPLES = 2
  SAMPLE_BITS = 16
  SAMPLE_TYPE = MSB_INTEGER
  SCALING_FACTOR = 2
  OFFSET = 1
END_OBJECT = IMAGE
"#,
        )
        .unwrap();
        let block = tree.find_block("IMAGE").unwrap();
        let spec = ImageSpec::from_pds3("IMAGE", block, &mut Vec::new()).unwrap();
        let image = build_image("IMAGE", &[0, 5, 0x80, 0x00], &spec, &mut Vec::new()).unwrap();
        assert_eq!(image.data[[0, 0, 0]], 11.0);
        let mask = image.mask.as_ref().unwrap();
        assert!(!mask[[0, 0, 0]]);
        assert!(mask[[0, 0, 1]]);
        let stats = image.stats().unwrap();
        assert_eq!((stats.count, stats.min), (1, 11.0));
    }

    #[test]
    fn multiband_requires_storage_type() {
        let block = Block::new()
            .with("LINES", 1)
            .with("LINE_SAMPLES", 1)
            .with("BANDS", 3)
            .with("SAMPLE_BITS", 8)
            .with("SAMPLE_TYPE", "MSB_UNSIGNED_INTEGER");
        assert!(ImageSpec::from_pds3("IMAGE", &block, &mut Vec::new()).is_err());

        let block = block.with("BAND_STORAGE_TYPE", "BAND_WOVEN");
        let mut warnings = Vec::new();
        let spec = ImageSpec::from_pds3("IMAGE", &block, &mut warnings).unwrap();
        assert_eq!(spec.storage, BandStorage::BandSequential);
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn qube_axes() {
        let block = Block::new()
            .with("CORE_ITEMS", Value::Sequence(vec![3.into(), 2.into(), 2.into()]))
            .with("AXIS_NAME", Value::Sequence(vec!["SAMPLE".into(), "BAND".into(), "LINE".into()]))
            .with("CORE_ITEM_BYTES", 2)
            .with("CORE_ITEM_TYPE", "SUN_INTEGER")
            .with("SUFFIX_ITEMS", Value::Sequence(vec![1.into(), 0.into(), 0.into()]))
            .with("SAMPLE_SUFFIX_ITEM_BYTES", 4);
        let spec = ImageSpec::from_pds3("QUBE", &block, &mut Vec::new()).unwrap();
        assert_eq!(spec.storage, BandStorage::LineInterleaved);
        assert_eq!((spec.bands, spec.lines, spec.samples), (2, 2, 3));
        assert_eq!(spec.suffix_planes, [0, 0, 2]);
        assert_eq!(spec.byte_len().unwrap(), 2 * 2 * 5 * 2);
    }

    #[test]
    fn pds3_array() {
        let element = Block::new().with("DATA_TYPE", "LSB_INTEGER").with("BYTES", 2);
        let block = Block::new()
            .with("AXIS_ITEMS", Value::Sequence(vec![2.into(), 2.into()]))
            .with("ELEMENT", Value::Block(element));
        let spec = ImageSpec::from_pds3_array("ARRAY", &block).unwrap();
        assert_eq!((spec.bands, spec.lines, spec.samples), (1, 2, 2));
        let image = build_image("ARRAY", &[1, 0, 2, 0, 3, 0, 4, 0], &spec, &mut Vec::new()).unwrap();
        assert_eq!(image.data[[0, 1, 0]], 3.0);
    }
}
