//! Opening products and building their objects on demand.
use std::cell::{OnceCell, RefCell};
use std::path::{Path, PathBuf};

use derive_more::From;
use serde::Serialize;
use tracing::{debug, trace, warn};
use typed_builder::TypedBuilder;

use crate::fs;
use crate::image::{build_image, Image, ImageSpec};
use crate::label::pds4::{self, text_of, Pds4Object, ARRAY_TAGS, TABLE_TAGS};
use crate::label::{pds3, Block, Identifiers, LabelFormat, Metadata, Value};
use crate::pointer::{count_from_bottom, is_ignored_by_default, ObjectKind, Pointer};
use crate::registry::{DispatchKey, HookContext, LoadRequest, Registry};
use crate::table::{build_table, splice_structures, RowLayout, Table};
use crate::{DecodeWarning, Error, Result};

/// How a product is opened.
#[derive(Debug, Clone, TypedBuilder)]
pub struct Options {
    /// Build objects on first access rather than all at once in [read].
    #[builder(default = true)]
    pub lazy_load: bool,
    /// Suppress logging of decode warnings. They are still recorded on the product.
    #[builder(default = false)]
    pub quiet: bool,
    /// Label to use instead of the one discovered next to the data file.
    #[builder(default, setter(strip_option, into))]
    pub label_path: Option<PathBuf>,
    #[builder(default)]
    pub registry: Registry,
}

impl Default for Options {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// A built data object.
#[derive(Debug, Clone, PartialEq, Serialize, From)]
pub enum ObjectValue {
    #[from(skip)]
    Label(String),
    #[from(skip)]
    Header(String),
    #[from(skip)]
    Text(String),
    Table(Table),
    Array(Image),
}

impl ObjectValue {
    pub fn kind(&self) -> &'static str {
        match self {
            ObjectValue::Label(_) => "label",
            ObjectValue::Header(_) => "header",
            ObjectValue::Text(_) => "text",
            ObjectValue::Table(_) => "table",
            ObjectValue::Array(_) => "array",
        }
    }

    fn wrong(&self, expected: &'static str) -> Error {
        Error::WrongVariant {
            object: "value".into(),
            expected,
            actual: self.kind(),
        }
    }

    pub fn as_table(&self) -> Result<&Table> {
        match self {
            ObjectValue::Table(t) => Ok(t),
            other => Err(other.wrong("table")),
        }
    }

    pub fn as_array(&self) -> Result<&Image> {
        match self {
            ObjectValue::Array(a) => Ok(a),
            other => Err(other.wrong("array")),
        }
    }

    pub fn as_header(&self) -> Result<&str> {
        match self {
            ObjectValue::Header(h) => Ok(h),
            other => Err(other.wrong("header")),
        }
    }

    /// Text of a `Text` object, or the label text of `LABEL`.
    pub fn as_text(&self) -> Result<&str> {
        match self {
            ObjectValue::Text(t) | ObjectValue::Label(t) => Ok(t),
            other => Err(other.wrong("text")),
        }
    }
}

#[derive(Debug)]
enum Source {
    Label,
    Pointer(Pointer),
    Pds4(Pds4Object),
}

#[derive(Debug)]
struct Entry {
    name: String,
    source: Source,
    /// Included in [Product::keys].
    listed: bool,
    value: OnceCell<ObjectValue>,
}

impl Entry {
    fn new<S: Into<String>>(name: S, source: Source, listed: bool) -> Self {
        Self {
            name: name.into(),
            source,
            listed,
            value: OnceCell::new(),
        }
    }
}

/// An opened product: its label plus lazily built data objects.
///
/// A failure to build one object is returned for that object only.
#[derive(Debug)]
pub struct Product {
    path: PathBuf,
    label_path: PathBuf,
    metadata: Metadata,
    identifiers: Identifiers,
    key: DispatchKey,
    registry: Registry,
    quiet: bool,
    entries: Vec<Entry>,
    warnings: RefCell<Vec<DecodeWarning>>,
}

/// Open a product from a data file or its label.
///
/// # Errors
/// [Error::UnsupportedInput] for URLs, [Error::NotFound] when neither the path nor a
/// case-insensitive sibling exists, and label parse failures.
pub fn read<P: AsRef<Path>>(path: P, options: Options) -> Result<Product> {
    let path = path.as_ref();
    if fs::is_url(&path.to_string_lossy()) {
        return Err(Error::UnsupportedInput(path.display().to_string()));
    }
    let path = fs::check_cases(path)?;
    let label_path = match options.label_path {
        Some(p) => fs::check_cases(p)?,
        None => fs::find_label(&path).unwrap_or_else(|| path.clone()),
    };
    debug!(path = %path.display(), label = %label_path.display(), "opening product");

    let metadata = load_label(&label_path)?;
    let identifiers = metadata.identifiers();
    let key = options.registry.dispatch_key(&identifiers);
    let mut warnings = metadata.warnings().to_vec();
    let entries = match metadata.format() {
        LabelFormat::Pds3 => pds3_entries(&metadata, &mut warnings),
        LabelFormat::Pds4 => pds4_entries(&metadata),
    };
    let product = Product {
        path,
        label_path,
        metadata,
        identifiers,
        key,
        registry: options.registry,
        quiet: options.quiet,
        entries,
        warnings: RefCell::new(Vec::new()),
    };
    product.record(warnings);
    if !options.lazy_load {
        product.load_all();
    }
    Ok(product)
}

/// Alias for [read].
pub fn open<P: AsRef<Path>>(path: P, options: Options) -> Result<Product> {
    read(path, options)
}

fn load_label(path: &Path) -> Result<Metadata> {
    let is_xml = path
        .extension()
        .is_some_and(|e| e.eq_ignore_ascii_case("xml"));
    if is_xml {
        let bytes = std::fs::read(path)?;
        return pds4::parse(&String::from_utf8_lossy(&bytes));
    }
    let head = fs::read_head(path, pds3::DEFAULT_LABEL_LIMIT as u64)?;
    pds3::parse(&String::from_utf8_lossy(pds3::trim_label(&head)))
}

fn pds3_entries(metadata: &Metadata, warnings: &mut Vec<DecodeWarning>) -> Vec<Entry> {
    let mut entries = vec![Entry::new("LABEL", Source::Label, true)];
    for (key, value) in metadata.tree().iter() {
        let Some(name) = key.strip_prefix('^') else {
            continue;
        };
        if !ObjectKind::from_name(name).is_loadable() {
            trace!(object = name, "skipping pointer");
            continue;
        }
        match Pointer::from_value(key, value) {
            Ok(pointer) => {
                if let [first, rest @ ..] = pointer.files.as_slice() {
                    if !rest.is_empty() {
                        warnings.push(DecodeWarning::new(
                            name,
                            format!("pointer lists {} files; reading only {first}", rest.len() + 1),
                        ));
                    }
                }
                entries.push(Entry::new(
                    name,
                    Source::Pointer(pointer),
                    !is_ignored_by_default(name),
                ));
            }
            Err(err) => warnings.push(DecodeWarning::new(name, err.to_string())),
        }
    }
    entries
}

fn pds4_entries(metadata: &Metadata) -> Vec<Entry> {
    let mut entries = vec![Entry::new("LABEL", Source::Label, true)];
    for object in pds4::objects(metadata) {
        entries.push(Entry::new(object.name.clone(), Source::Pds4(object), true));
    }
    entries
}

fn size(block: &Block, key: &str) -> Option<u64> {
    block
        .get(key)
        .and_then(text_of)
        .and_then(Value::as_i64)
        .and_then(|v| u64::try_from(v).ok())
}

fn decode_text(data: &[u8]) -> String {
    String::from_utf8_lossy(data)
        .trim_end_matches('\0')
        .to_string()
}

impl Product {
    pub fn label(&self) -> &Metadata {
        &self.metadata
    }

    /// The label exactly as read.
    pub fn label_text(&self) -> &str {
        self.metadata.text()
    }

    pub fn identifiers(&self) -> &Identifiers {
        &self.identifiers
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn label_path(&self) -> &Path {
        &self.label_path
    }

    /// `LABEL` followed by the names of the product's data objects, in label order.
    pub fn keys(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|e| e.listed)
            .map(|e| e.name.as_str())
            .collect()
    }

    /// Warnings recorded so far, including those of objects built on access.
    pub fn warnings(&self) -> Vec<DecodeWarning> {
        self.warnings.borrow().clone()
    }

    pub fn metaget(&self, key: &str) -> Option<Value> {
        self.metadata.metaget(key)
    }

    pub fn metaget_(&self, key: &str) -> Option<&Value> {
        self.metadata.metaget_(key)
    }

    pub fn metablock(&self, name: &str) -> Option<&Block> {
        self.metadata.metablock(name)
    }

    pub fn metaget_fuzzy(&self, approx: &str) -> Option<Value> {
        self.metadata.metaget_fuzzy(approx)
    }

    /// Build, or return the already built, object `name`.
    ///
    /// # Errors
    /// [Error::NoSuchObject] for names not in the label, or whatever prevented the
    /// object from being built. A failed object is attempted again on the next call.
    pub fn get(&self, name: &str) -> Result<&ObjectValue> {
        let entry = self
            .entries
            .iter()
            .find(|e| e.name == name)
            .ok_or_else(|| Error::NoSuchObject(name.to_string()))?;
        if let Some(value) = entry.value.get() {
            return Ok(value);
        }
        let mut warnings = Vec::new();
        let built = self.build(entry, &mut warnings);
        self.record(warnings);
        let value = built?;
        debug!(object = name, kind = value.kind(), "built object");
        Ok(entry.value.get_or_init(|| value))
    }

    /// [get](Self::get) narrowed to a table.
    pub fn table(&self, name: &str) -> Result<&Table> {
        self.get(name)?.as_table().map_err(|e| named(e, name))
    }

    /// [get](Self::get) narrowed to an image or array.
    pub fn array(&self, name: &str) -> Result<&Image> {
        self.get(name)?.as_array().map_err(|e| named(e, name))
    }

    /// Directories an object file may live in, each joined with `rel`: the label's
    /// directory, then the data file's.
    pub fn absolute_paths(&self, rel: &str) -> Vec<PathBuf> {
        let dir = |p: &Path| match p.parent() {
            Some(d) if !d.as_os_str().is_empty() => d.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let mut paths = vec![dir(&self.label_path).join(rel)];
        let data = dir(&self.path).join(rel);
        if !paths.contains(&data) {
            paths.push(data);
        }
        paths
    }

    /// First existing path of the file holding object `name`.
    pub fn resolve_path(&self, name: &str) -> Option<PathBuf> {
        let entry = self.entries.iter().find(|e| e.name == name)?;
        match &entry.source {
            Source::Label => Some(self.label_path.clone()),
            Source::Pointer(pointer) => self.data_path(pointer).ok(),
            Source::Pds4(object) => self.find_file(&object.file_name).ok(),
        }
    }

    fn record(&self, warnings: Vec<DecodeWarning>) {
        if !self.quiet {
            for w in &warnings {
                warn!(object = %w.object, "{}", w.message);
            }
        }
        self.warnings.borrow_mut().extend(warnings);
    }

    fn load_all(&self) {
        let names: Vec<String> = self.keys().into_iter().map(str::to_string).collect();
        for name in names {
            if let Err(err) = self.get(&name) {
                self.record(vec![DecodeWarning::new(
                    name,
                    format!("failed to load: {err}"),
                )]);
            }
        }
    }

    fn find_file(&self, rel: &str) -> Result<PathBuf> {
        self.absolute_paths(rel)
            .into_iter()
            .find_map(|p| fs::check_cases(p).ok())
            .ok_or_else(|| Error::NotFound(PathBuf::from(rel)))
    }

    fn data_path(&self, pointer: &Pointer) -> Result<PathBuf> {
        match pointer.file() {
            Some(file) => self.find_file(file),
            None => Ok(self.path.clone()),
        }
    }

    /// Parse a `^STRUCTURE` format file, looked up beside the label or in a sibling
    /// `LABEL` directory.
    fn load_format(&self, file: &str) -> Result<Block> {
        let mut candidates = self.absolute_paths(file);
        if let Some(root) = self.label_path.parent().and_then(Path::parent) {
            candidates.push(root.join("LABEL").join(file));
        }
        let path = candidates
            .into_iter()
            .find_map(|p| fs::check_cases(p).ok())
            .ok_or_else(|| Error::NotFound(PathBuf::from(file)))?;
        let bytes = std::fs::read(&path)?;
        let (block, _) = pds3::parse_block(&String::from_utf8_lossy(&bytes))?;
        Ok(block)
    }

    fn build(&self, entry: &Entry, warnings: &mut Vec<DecodeWarning>) -> Result<ObjectValue> {
        match &entry.source {
            Source::Label => Ok(ObjectValue::Label(self.metadata.text().to_string())),
            Source::Pointer(pointer) => self.build_pds3(&entry.name, pointer, warnings),
            Source::Pds4(object) => self.build_pds4(object, warnings),
        }
    }

    fn build_pds3(
        &self,
        name: &str,
        pointer: &Pointer,
        warnings: &mut Vec<DecodeWarning>,
    ) -> Result<ObjectValue> {
        let kind = ObjectKind::from_name(name);
        let path = self.data_path(pointer)?;
        let file_size = fs::file_size(&path);
        let ctx = HookContext {
            label: &self.metadata,
            identifiers: &self.identifiers,
            file_size,
        };
        let block = self
            .registry
            .block(&self.key, &ctx, name)
            .or_else(|| self.metadata.metablock(name).cloned());
        let record_bytes = block
            .as_ref()
            .and_then(|b| size(b, "RECORD_BYTES"))
            .or_else(|| size(self.metadata.tree(), "RECORD_BYTES"));
        let start = |object_bytes: Option<u64>| -> Result<u64> {
            if let Some(start) = self.registry.start_byte(&self.key, &ctx, name) {
                return Ok(start);
            }
            if let Some(start) = pointer.start_byte(record_bytes) {
                return Ok(start);
            }
            match (file_size, object_bytes) {
                (Some(file_size), Some(len)) => Ok(count_from_bottom(file_size, len)),
                _ => Err(Error::PointerResolution {
                    object: name.to_string(),
                    reason: "record pointer without RECORD_BYTES".into(),
                }),
            }
        };
        let require = |block: Option<Block>| {
            block.ok_or_else(|| Error::PointerResolution {
                object: name.to_string(),
                reason: "no object block describes it".into(),
            })
        };
        trace!(object = name, ?kind, path = %path.display(), "building pds3 object");

        match kind {
            ObjectKind::Table => {
                let block = require(block)?;
                let block = splice_structures(&block, &mut |file: &str| self.load_format(file))?;
                if let Some(loader) = self.registry.table_loader(&self.key, &ctx, name) {
                    let data = fs::read_range(&path, start(None)?, None)?;
                    let request = LoadRequest {
                        name,
                        block: &block,
                        label: &self.metadata,
                        data: &data,
                    };
                    return Ok(loader(&request, warnings)?.into());
                }
                let layout = RowLayout::from_pds3(name, &block)?;
                let table_bytes = match (layout.rows, layout.row_bytes) {
                    (rows, Some(_)) if rows > 0 => Some((rows * layout.stride()) as u64),
                    _ => None,
                };
                let data = fs::read_range(&path, start(table_bytes)?, table_bytes)?;
                Ok(build_table(name, &data, &layout, warnings)?.into())
            }
            ObjectKind::Image | ObjectKind::Array => {
                let block = require(block)?;
                if let Some(loader) = self.registry.image_loader(&self.key, &ctx, name) {
                    let data = fs::read_range(&path, start(None)?, None)?;
                    let request = LoadRequest {
                        name,
                        block: &block,
                        label: &self.metadata,
                        data: &data,
                    };
                    return Ok(loader(&request, warnings)?.into());
                }
                let mut spec = if kind == ObjectKind::Array {
                    ImageSpec::from_pds3_array(name, &block)?
                } else {
                    ImageSpec::from_pds3(name, &block, warnings)?
                };
                if let Some(specials) =
                    self.registry
                        .special_constants(&self.key, &ctx, name, &spec.specials)
                {
                    spec.specials = specials;
                }
                let len = spec.byte_len()? as u64;
                let data = fs::read_range(&path, start(Some(len))?, Some(len))?;
                Ok(build_image(name, &data, &spec, warnings)?.into())
            }
            ObjectKind::Header => {
                let len = block.as_ref().and_then(|b| {
                    size(b, "BYTES").or_else(|| Some(size(b, "RECORDS")? * record_bytes?))
                });
                let data = fs::read_range(&path, start(len)?, len)?;
                Ok(ObjectValue::Header(decode_text(&data)))
            }
            ObjectKind::Text => {
                let data = fs::read_range(&path, start(None)?, None)?;
                Ok(ObjectValue::Text(decode_text(&data)))
            }
            ObjectKind::Label => Ok(ObjectValue::Label(self.metadata.text().to_string())),
            ObjectKind::Trivial | ObjectKind::Unsupported => Err(Error::UnsupportedFormat(
                format!("{name}: no loader for {kind:?} objects"),
            )),
        }
    }

    fn build_pds4(&self, object: &Pds4Object, warnings: &mut Vec<DecodeWarning>) -> Result<ObjectValue> {
        let path = self.find_file(&object.file_name)?;
        let name = object.name.as_str();
        let tag = object.tag.as_str();
        let offset = size(&object.block, "offset").unwrap_or(0);
        trace!(object = name, tag, offset, path = %path.display(), "building pds4 object");

        if ARRAY_TAGS.contains(&tag) {
            let spec = ImageSpec::from_pds4(name, &object.block)?;
            let len = spec.byte_len()? as u64;
            let data = fs::read_range(&path, offset, Some(len))?;
            Ok(build_image(name, &data, &spec, warnings)?.into())
        } else if TABLE_TAGS.contains(&tag) {
            let layout = RowLayout::from_pds4(tag, &object.block)?;
            let len = size(&object.block, "object_length").or_else(|| {
                (layout.rows > 0 && layout.row_bytes.is_some())
                    .then(|| (layout.rows * layout.stride()) as u64)
            });
            let data = fs::read_range(&path, offset, len)?;
            Ok(build_table(name, &data, &layout, warnings)?.into())
        } else {
            let len = size(&object.block, "object_length");
            let data = fs::read_range(&path, offset, len)?;
            Ok(ObjectValue::Header(decode_text(&data)))
        }
    }
}

fn named(err: Error, name: &str) -> Error {
    match err {
        Error::WrongVariant {
            expected, actual, ..
        } => Error::WrongVariant {
            object: name.to_string(),
            expected,
            actual,
        },
        other => other,
    }
}
