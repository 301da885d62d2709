//! Per-mission corrections dispatched on label identifiers.
//!
//! A [Registration] pairs match criteria with a set of optional [Hooks]. Each hook covers
//! one extension point of the object pipeline; a hook returning `None` defers to the
//! default behavior.
use std::{collections::HashSet, fs::File, path::Path};

use serde::Deserialize;
use tracing::{debug, trace};

use crate::decode::SpecialConstants;
use crate::image::Image;
use crate::label::{Block, Identifiers, Metadata, Value};
use crate::table::{read_csv_with_headers, Table};
use crate::{DecodeWarning, Result};

const MISSIONSDB: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/src/missions.json"));

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Mission {
    pub name: String,
    pub aliases: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct MissionsDb {
    #[allow(dead_code)]
    version: String,
    missions: Vec<Mission>,
}

/// What hooks may inspect about the product.
#[derive(Debug, Clone, Copy)]
pub struct HookContext<'a> {
    pub label: &'a Metadata,
    pub identifiers: &'a Identifiers,
    /// Size of the file holding the object, when known.
    pub file_size: Option<u64>,
}

/// Input to a replacement table or image constructor.
#[derive(Debug, Clone, Copy)]
pub struct LoadRequest<'a> {
    pub name: &'a str,
    pub block: &'a Block,
    pub label: &'a Metadata,
    /// Object bytes from the resolved start byte to the end of the file.
    pub data: &'a [u8],
}

pub type TableLoader = fn(&LoadRequest<'_>, &mut Vec<DecodeWarning>) -> Result<Table>;
pub type ImageLoader = fn(&LoadRequest<'_>, &mut Vec<DecodeWarning>) -> Result<Image>;

pub type BlockHook = fn(&HookContext<'_>, &str) -> Option<Block>;
pub type StartByteHook = fn(&HookContext<'_>, &str) -> Option<u64>;
pub type TableLoaderHook = fn(&HookContext<'_>, &str) -> Option<TableLoader>;
pub type ImageLoaderHook = fn(&HookContext<'_>, &str) -> Option<ImageLoader>;
/// Receives the constants found in the label; returns a replacement set.
pub type SpecialConstantsHook =
    fn(&HookContext<'_>, &str, &SpecialConstants) -> Option<SpecialConstants>;

#[derive(Debug, Clone, Copy, Default)]
pub struct Hooks {
    pub block: Option<BlockHook>,
    pub start_byte: Option<StartByteHook>,
    pub table_loader: Option<TableLoaderHook>,
    pub image_loader: Option<ImageLoaderHook>,
    pub special_constants: Option<SpecialConstantsHook>,
}

/// Products a registration applies to. Unset criteria match anything.
#[derive(Debug, Clone, Default)]
pub struct Registration {
    pub name: String,
    /// Mission tag from the alias table, e.g., `msl`.
    pub mission: Option<String>,
    /// Exact `INSTRUMENT_ID`.
    pub instrument: Option<String>,
    /// Prefix of `DATA_SET_ID`.
    pub dataset_prefix: Option<String>,
    pub hooks: Hooks,
}

impl Registration {
    pub fn new<S: Into<String>>(name: S, hooks: Hooks) -> Self {
        Self {
            name: name.into(),
            hooks,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn mission<S: Into<String>>(mut self, mission: S) -> Self {
        self.mission = Some(mission.into());
        self
    }

    #[must_use]
    pub fn instrument<S: Into<String>>(mut self, instrument: S) -> Self {
        self.instrument = Some(instrument.into());
        self
    }

    #[must_use]
    pub fn dataset_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.dataset_prefix = Some(prefix.into());
        self
    }

    pub fn matches(&self, key: &DispatchKey) -> bool {
        self.mission
            .as_ref()
            .map_or(true, |m| key.mission.as_deref() == Some(m.as_str()))
            && self
                .instrument
                .as_ref()
                .map_or(true, |i| key.instrument == *i)
            && self
                .dataset_prefix
                .as_ref()
                .map_or(true, |p| key.dataset.starts_with(p.as_str()))
    }
}

/// The identifiers registrations are matched against.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchKey {
    pub mission: Option<String>,
    pub instrument: String,
    pub dataset: String,
}

/// Override registry.
///
/// The default registry carries a built-in mission alias table, included at compile-time,
/// and a few built-in registrations. Use [with_file](Registry::with_file) to load a custom
/// alias table.
///
/// # Example
/// ```
/// use pdr::label::pds3;
/// use pdr::registry::Registry;
///
/// let meta = pds3::parse("SPACECRAFT_NAME = \"MARS SCIENCE LABORATORY\"\n").unwrap();
/// let key = Registry::default().dispatch_key(&meta.identifiers());
/// assert_eq!(key.mission.as_deref(), Some("msl"));
/// ```
#[derive(Debug, Clone)]
pub struct Registry {
    missions: Vec<Mission>,
    registrations: Vec<Registration>,
}

fn builtin_missions() -> Vec<Mission> {
    let db: MissionsDb =
        serde_json::from_str(MISSIONSDB).expect("built-in mission db is not valid");
    db.missions
}

impl Default for Registry {
    fn default() -> Self {
        Self {
            missions: builtin_missions(),
            registrations: builtin::registrations(),
        }
    }
}

impl Registry {
    /// Load the mission alias table from a JSON file. With `built_in`, the built-in
    /// missions absent from the file and the built-in registrations are added.
    pub fn with_file<P: AsRef<Path>>(path: P, built_in: bool) -> std::result::Result<Self, std::io::Error> {
        let mut db: MissionsDb = serde_json::from_reader(File::open(path)?)?;
        let mut registrations = Vec::new();

        if built_in {
            let file_names: HashSet<String> = db.missions.iter().map(|m| m.name.clone()).collect();
            for mission in builtin_missions() {
                // skip any that already exist from the file
                if file_names.contains(&mission.name) {
                    continue;
                }
                db.missions.push(mission);
            }
            registrations = builtin::registrations();
        }

        Ok(Self {
            missions: db.missions,
            registrations,
        })
    }

    pub fn missions(&self) -> &[Mission] {
        &self.missions
    }

    pub fn registrations(&self) -> &[Registration] {
        &self.registrations
    }

    /// Add a registration. It takes precedence over everything registered before it.
    pub fn register(&mut self, registration: Registration) {
        debug!(name = %registration.name, "registered override");
        self.registrations.push(registration);
    }

    /// Mission tag for the first alias matching `SPACECRAFT_NAME`, `INSTRUMENT_HOST_NAME`
    /// or the leading token of `DATA_SET_ID`.
    pub fn mission(&self, identifiers: &Identifiers) -> Option<&str> {
        let dataset = identifiers.get("DATA_SET_ID");
        let dataset_head = dataset.split(['-', '_']).next().unwrap_or_default();
        let candidates = [
            identifiers.get("SPACECRAFT_NAME"),
            identifiers.get("INSTRUMENT_HOST_NAME"),
            dataset_head,
        ];
        candidates
            .iter()
            .map(|c| c.trim().to_ascii_uppercase())
            .filter(|c| !c.is_empty())
            .find_map(|c| {
                self.missions
                    .iter()
                    .find(|m| m.name.eq_ignore_ascii_case(&c) || m.aliases.iter().any(|a| *a == c))
            })
            .map(|m| m.name.as_str())
    }

    pub fn dispatch_key(&self, identifiers: &Identifiers) -> DispatchKey {
        DispatchKey {
            mission: self.mission(identifiers).map(str::to_string),
            instrument: identifiers.get("INSTRUMENT_ID").trim().to_string(),
            dataset: identifiers.get("DATA_SET_ID").trim().to_string(),
        }
    }

    /// Hooks of matching registrations, most recent first.
    fn matching<'a>(&'a self, key: &'a DispatchKey) -> impl Iterator<Item = &'a Registration> + 'a {
        self.registrations.iter().rev().filter(move |r| r.matches(key))
    }

    pub fn block(&self, key: &DispatchKey, ctx: &HookContext<'_>, name: &str) -> Option<Block> {
        self.matching(key).find_map(|r| {
            let block = r.hooks.block.and_then(|hook| hook(ctx, name))?;
            trace!(registration = %r.name, object = name, "block override");
            Some(block)
        })
    }

    pub fn start_byte(&self, key: &DispatchKey, ctx: &HookContext<'_>, name: &str) -> Option<u64> {
        self.matching(key).find_map(|r| {
            let start = r.hooks.start_byte.and_then(|hook| hook(ctx, name))?;
            trace!(registration = %r.name, object = name, start, "start byte override");
            Some(start)
        })
    }

    pub fn table_loader(&self, key: &DispatchKey, ctx: &HookContext<'_>, name: &str) -> Option<TableLoader> {
        self.matching(key)
            .find_map(|r| r.hooks.table_loader.and_then(|hook| hook(ctx, name)))
    }

    pub fn image_loader(&self, key: &DispatchKey, ctx: &HookContext<'_>, name: &str) -> Option<ImageLoader> {
        self.matching(key)
            .find_map(|r| r.hooks.image_loader.and_then(|hook| hook(ctx, name)))
    }

    pub fn special_constants(
        &self,
        key: &DispatchKey,
        ctx: &HookContext<'_>,
        name: &str,
        specials: &SpecialConstants,
    ) -> Option<SpecialConstants> {
        self.matching(key)
            .find_map(|r| r.hooks.special_constants.and_then(|hook| hook(ctx, name, specials)))
    }
}

mod builtin {
    use super::*;

    pub(super) fn registrations() -> Vec<Registration> {
        vec![
            Registration::new(
                "msl-chemin",
                Hooks {
                    block: Some(chemin_block),
                    start_byte: Some(chemin_start_byte),
                    table_loader: Some(chemin_table_loader),
                    ..Default::default()
                },
            )
            .mission("msl")
            .instrument("CHEMIN"),
            Registration::new(
                "odyssey-themis",
                Hooks {
                    start_byte: Some(themis_qube_start_byte),
                    ..Default::default()
                },
            )
            .mission("odyssey")
            .instrument("THEMIS"),
            Registration::new(
                "mro-crism",
                Hooks {
                    special_constants: Some(crism_special_constants),
                    ..Default::default()
                },
            )
            .mission("mro")
            .instrument("CRISM"),
        ]
    }

    /// Histogram pointers give the object length rather than its position.
    fn chemin_start_byte(_: &HookContext<'_>, name: &str) -> Option<u64> {
        match name {
            "HISTOGRAM" => Some(300),
            "CHMN_HSK_HEADER_TABLE" => Some(0),
            _ => None,
        }
    }

    /// The housekeeping pointer and its object disagree on the name.
    fn chemin_block(ctx: &HookContext<'_>, name: &str) -> Option<Block> {
        (name == "CHMN_HSK_HEADER_TABLE")
            .then(|| ctx.label.metablock("CHMN_HSKN_HEADER_TABLE").cloned())
            .flatten()
    }

    fn chemin_table_loader(_: &HookContext<'_>, name: &str) -> Option<TableLoader> {
        name.contains("SPREADSHEET").then_some(headed_csv as TableLoader)
    }

    fn headed_csv(req: &LoadRequest<'_>, _: &mut Vec<DecodeWarning>) -> Result<Table> {
        read_csv_with_headers(req.data)
    }

    /// Some cubes give a byte offset where a record index belongs.
    fn themis_qube_start_byte(ctx: &HookContext<'_>, name: &str) -> Option<u64> {
        if name != "QUBE" {
            return None;
        }
        let records = ctx.label.metaget_("FILE_RECORDS").and_then(Value::as_i64)?;
        let size = ctx.file_size?;
        if u64::try_from(records).ok()? < size {
            return None;
        }
        let offset = ctx
            .label
            .metaget_("^QUBE")
            .and_then(|v| v.as_slice().and_then(<[Value]>::last).or(Some(v)))
            .and_then(Value::as_i64)?;
        u64::try_from(offset - 1).ok()
    }

    fn crism_special_constants(
        _: &HookContext<'_>,
        _: &str,
        specials: &SpecialConstants,
    ) -> Option<SpecialConstants> {
        let mut specials = specials.clone();
        specials.insert("NULL", 65535.0);
        Some(specials)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::label::pds3;

    fn label(text: &str) -> Metadata {
        pds3::parse(text).unwrap()
    }

    #[test]
    fn default() {
        let registry = Registry::default();
        assert!(registry.missions().len() > 10);
        assert_eq!(registry.registrations().len(), 3);
    }

    #[test]
    fn mission_from_dataset() {
        let meta = label("DATA_SET_ID = \"MRO-M-CRISM-3-RDR-TARGETED-V1.0\"\n");
        let key = Registry::default().dispatch_key(&meta.identifiers());
        assert_eq!(key.mission.as_deref(), Some("mro"));
        assert_eq!(key.dataset, "MRO-M-CRISM-3-RDR-TARGETED-V1.0");
    }

    #[test]
    fn chemin_hooks() {
        let meta = label(
            "SPACECRAFT_NAME = \"MARS SCIENCE LABORATORY\"\nINSTRUMENT_ID = CHEMIN\nOBJECT = CHMN_HSKN_HEADER_TABLE\n  ROWS = 1\nEND_OBJECT\n",
        );
        let ids = meta.identifiers();
        let registry = Registry::default();
        let key = registry.dispatch_key(&ids);
        let ctx = HookContext { label: &meta, identifiers: &ids, file_size: None };
        assert_eq!(registry.start_byte(&key, &ctx, "HISTOGRAM"), Some(300));
        assert_eq!(registry.start_byte(&key, &ctx, "IMAGE"), None);
        let block = registry.block(&key, &ctx, "CHMN_HSK_HEADER_TABLE").unwrap();
        assert_eq!(block.get("ROWS"), Some(&Value::Integer(1)));
        assert!(registry.table_loader(&key, &ctx, "SPREADSHEET").is_some());
    }

    #[test]
    fn themis_qube() {
        let meta = label(
            "INSTRUMENT_HOST_NAME = \"2001 MARS ODYSSEY\"\nINSTRUMENT_ID = THEMIS\nFILE_RECORDS = 5000\n^QUBE = 1025\n",
        );
        let ids = meta.identifiers();
        let registry = Registry::default();
        let key = registry.dispatch_key(&ids);
        let ctx = HookContext { label: &meta, identifiers: &ids, file_size: Some(4000) };
        assert_eq!(registry.start_byte(&key, &ctx, "QUBE"), Some(1024));
        let ctx = HookContext { file_size: Some(10_000), ..ctx };
        assert_eq!(registry.start_byte(&key, &ctx, "QUBE"), None);
    }

    #[test]
    fn crism_null() {
        let meta = label("DATA_SET_ID = \"MRO-M-CRISM-2-EDR-V1.0\"\nINSTRUMENT_ID = CRISM\n");
        let ids = meta.identifiers();
        let registry = Registry::default();
        let key = registry.dispatch_key(&ids);
        let ctx = HookContext { label: &meta, identifiers: &ids, file_size: None };
        let specials = registry
            .special_constants(&key, &ctx, "IMAGE", &SpecialConstants::default())
            .unwrap();
        assert!(specials.is_special(65535.0));
    }

    #[test]
    fn builtins_are_scoped_by_mission() {
        let meta = label("SPACECRAFT_NAME = \"MARS EXPRESS\"\nINSTRUMENT_ID = CHEMIN\n");
        let ids = meta.identifiers();
        let registry = Registry::default();
        let key = registry.dispatch_key(&ids);
        assert_eq!(key.mission.as_deref(), Some("mex"));
        let ctx = HookContext { label: &meta, identifiers: &ids, file_size: None };
        assert_eq!(registry.start_byte(&key, &ctx, "HISTOGRAM"), None);

        let meta = label("INSTRUMENT_ID = CRISM\n");
        let ids = meta.identifiers();
        let key = registry.dispatch_key(&ids);
        let ctx = HookContext { label: &meta, identifiers: &ids, file_size: None };
        assert!(registry
            .special_constants(&key, &ctx, "IMAGE", &SpecialConstants::default())
            .is_none());
    }

    #[test]
    fn later_registration_wins() {
        fn zero(_: &HookContext<'_>, _: &str) -> Option<u64> {
            Some(0)
        }
        let meta = label("SPACECRAFT_NAME = MSL\nINSTRUMENT_ID = CHEMIN\n");
        let ids = meta.identifiers();
        let mut registry = Registry::default();
        registry.register(
            Registration::new("custom", Hooks { start_byte: Some(zero), ..Default::default() })
                .mission("msl")
                .instrument("CHEMIN"),
        );
        let key = registry.dispatch_key(&ids);
        let ctx = HookContext { label: &meta, identifiers: &ids, file_size: None };
        assert_eq!(registry.start_byte(&key, &ctx, "HISTOGRAM"), Some(0));
    }

    #[test]
    fn with_file() {
        let tmpdir = tempfile::tempdir().unwrap();
        let out_path = tmpdir.path().join("missions.json");
        fs::write(
            &out_path,
            r#"{
  "version": "xxx",
  "missions": [
    {
      "name": "msl",
      "aliases": ["ROVER"]
    }
  ]
}"#,
        )
        .unwrap();

        let registry = Registry::with_file(&out_path, false).unwrap();
        assert_eq!(registry.missions().len(), 1, "Should only be 1 mission");
        assert!(registry.registrations().is_empty());

        let registry = Registry::with_file(&out_path, true).unwrap();
        assert!(
            registry.missions().len() > 1,
            "Should be more than 1 mission when including built-ins"
        );
        let meta = label("SPACECRAFT_NAME = ROVER\nINSTRUMENT_ID = CHEMIN\n");
        let ids = meta.identifiers();
        assert_eq!(registry.mission(&ids), Some("msl"));
        let key = registry.dispatch_key(&ids);
        let ctx = HookContext { label: &meta, identifiers: &ids, file_size: None };
        assert_eq!(registry.start_byte(&key, &ctx, "HISTOGRAM"), Some(300));
    }
}
