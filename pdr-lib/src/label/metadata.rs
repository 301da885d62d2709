use std::collections::HashMap;

use serde::Serialize;

use super::{Block, Value};
use crate::DecodeWarning;

/// Which label standard a product follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LabelFormat {
    Pds3,
    Pds4,
}

/// Label fields commonly used to identify a product.
pub const IDENTIFIER_FIELDS: [&str; 17] = [
    "DATA_SET_ID",
    "DATA_SET_NAME",
    "FILE_NAME",
    "FILE_RECORDS",
    "INSTRUMENT_HOST_NAME",
    "INSTRUMENT_ID",
    "INSTRUMENT_NAME",
    "LABEL_RECORDS",
    "NOTE",
    "PRODUCT_ID",
    "PRODUCT_TYPE",
    "RECORD_BYTES",
    "RECORD_TYPE",
    "ROW_BYTES",
    "ROWS",
    "SPACECRAFT_NAME",
    "STANDARD_DATA_PRODUCT_ID",
];

/// Identifying label fields. Absent fields read as an empty string.
///
/// # Example
/// ```
/// use pdr::label::pds3;
///
/// let meta = pds3::parse("SPACECRAFT_NAME = \"MARS ODYSSEY\"\n").unwrap();
/// let ids = meta.identifiers();
/// assert_eq!(ids.get("SPACECRAFT_NAME"), "MARS ODYSSEY");
/// assert_eq!(ids.get("PRODUCT_ID"), "");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Identifiers {
    fields: Vec<(&'static str, String)>,
}

impl Identifiers {
    pub fn get(&self, field: &str) -> &str {
        self.fields
            .iter()
            .find(|(k, _)| *k == field)
            .map_or("", |(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        self.fields.iter().map(|(k, v)| (*k, v.as_str()))
    }
}

/// A parsed label and its query operations.
///
/// Holds the label tree, a count of every key name at every depth (`fieldcounts`), the
/// label format, and the verbatim label text.
#[derive(Debug, Clone, Serialize)]
pub struct Metadata {
    tree: Block,
    fieldcounts: Vec<(String, usize)>,
    format: LabelFormat,
    #[serde(skip)]
    text: String,
    #[serde(skip)]
    warnings: Vec<DecodeWarning>,
}

impl Metadata {
    pub fn new(tree: Block, fieldnames: Vec<String>, format: LabelFormat, text: String) -> Self {
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut fieldcounts: Vec<(String, usize)> = Vec::new();
        for name in fieldnames {
            match index.get(&name) {
                Some(i) => fieldcounts[*i].1 += 1,
                None => {
                    index.insert(name.clone(), fieldcounts.len());
                    fieldcounts.push((name, 1));
                }
            }
        }
        Self {
            tree,
            fieldcounts,
            format,
            text,
            warnings: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_warnings(mut self, warnings: Vec<DecodeWarning>) -> Self {
        self.warnings = warnings;
        self
    }

    /// Non-fatal problems noticed while parsing.
    pub fn warnings(&self) -> &[DecodeWarning] {
        &self.warnings
    }

    pub fn tree(&self) -> &Block {
        &self.tree
    }

    pub fn format(&self) -> LabelFormat {
        self.format
    }

    /// The label exactly as read.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Number of occurrences of each key at any depth, in first-seen order.
    pub fn fieldcounts(&self) -> &[(String, usize)] {
        &self.fieldcounts
    }

    pub fn fieldcount(&self, key: &str) -> usize {
        self.fieldcounts
            .iter()
            .find(|(k, _)| k == key)
            .map_or(0, |(_, n)| *n)
    }

    /// First value stored under `key` at any depth, with quantities unwrapped to numbers.
    pub fn metaget(&self, key: &str) -> Option<Value> {
        self.tree.find(key).map(Value::unwrapped)
    }

    /// [metaget](Self::metaget) with a fallback.
    pub fn metaget_or(&self, key: &str, default: Value) -> Value {
        self.metaget(key).unwrap_or(default)
    }

    /// First value stored under `key` at any depth, exactly as stored.
    pub fn metaget_(&self, key: &str) -> Option<&Value> {
        self.tree.find(key)
    }

    /// First block named `name` at any depth.
    pub fn metablock(&self, name: &str) -> Option<&Block> {
        self.tree.find_block(name)
    }

    /// Every block named `name` at any depth.
    pub fn metablock_(&self, name: &str) -> Vec<&Block> {
        self.tree.find_blocks(name)
    }

    /// Value of the key most similar to `approx`.
    ///
    /// Similarity is the normalized indel ratio; ties go to the key seen first.
    /// Returns `None` only when the label has no keys.
    pub fn metaget_fuzzy(&self, approx: &str) -> Option<Value> {
        let mut best: Option<(&str, f64)> = None;
        for (key, _) in &self.fieldcounts {
            let score = ratio(approx, key);
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((key, score));
            }
        }
        best.and_then(|(key, _)| self.metaget(key))
    }

    /// The identifier fields, stringified.
    pub fn identifiers(&self) -> Identifiers {
        let fields = IDENTIFIER_FIELDS
            .iter()
            .map(|field| {
                let value = self
                    .metaget_(field)
                    .filter(|v| !v.is_block())
                    .map(Value::to_string)
                    .unwrap_or_default();
                (*field, value)
            })
            .collect();
        Identifiers { fields }
    }
}

/// Insertions plus deletions turning `a` into `b`; a substitution counts as two.
fn indel_distance(a: &[char], b: &[char]) -> usize {
    // Longest common subsequence, one row at a time.
    let mut prev = vec![0usize; b.len() + 1];
    let mut cur = vec![0usize; b.len() + 1];
    for ca in a {
        for (j, cb) in b.iter().enumerate() {
            cur[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                prev[j + 1].max(cur[j])
            };
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    a.len() + b.len() - 2 * prev[b.len()]
}

/// Similarity in `[0, 1]`: indel distance over the combined length, 1 meaning identical.
fn ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    1.0 - indel_distance(&a, &b) as f64 / total as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::label::Quantity;

    fn meta() -> Metadata {
        let tree = Block::new()
            .with("^CAT", "MEOW.CAT")
            .with("CAT_NAME", "LILY")
            .with(
                "GROUP",
                Block::new()
                    .with("ANGLE", Quantity::new(-0.5, Some("rad")))
                    .with("CAT_NAME", "OTHER"),
            );
        let names = tree.all_keys();
        Metadata::new(tree, names, LabelFormat::Pds3, String::new())
    }

    #[test]
    fn fieldcounts_count_all_depths() {
        let m = meta();
        assert_eq!(m.fieldcount("CAT_NAME"), 2);
        assert_eq!(m.fieldcounts()[0], ("^CAT".to_string(), 1));
    }

    #[test]
    fn metaget_unwraps_quantities() {
        let m = meta();
        assert_eq!(m.metaget("ANGLE"), Some(Value::Real(-0.5)));
        assert!(m.metaget_("ANGLE").unwrap().as_quantity().is_some());
        assert_eq!(m.metaget("NOPE"), None);
        assert_eq!(m.metaget_or("NOPE", Value::Integer(1)), Value::Integer(1));
    }

    #[test]
    fn fuzzy() {
        let m = meta();
        assert_eq!(m.metaget_fuzzy("KAT"), Some(Value::from("MEOW.CAT")));
        assert_eq!(m.metaget_fuzzy("CAT_NAM"), Some(Value::from("LILY")));
        let empty = Metadata::new(Block::new(), vec![], LabelFormat::Pds3, String::new());
        assert_eq!(empty.metaget_fuzzy("KAT"), None);
    }

    #[test]
    fn indel_distances() {
        let d = |a: &str, b: &str| {
            indel_distance(&a.chars().collect::<Vec<_>>(), &b.chars().collect::<Vec<_>>())
        };
        assert_eq!(d("kitten", "sitting"), 5);
        assert_eq!(d("", "abc"), 3);
        assert_eq!(d("KAT", "^CAT"), 3);
        assert_eq!(d("ABCD", "ABCD"), 0);
    }

    #[test]
    fn fuzzy_substitutions_cost_two() {
        let tree = Block::new().with("ABXD", 1).with("ABCDEF", 2);
        let names = tree.all_keys();
        let m = Metadata::new(tree, names, LabelFormat::Pds3, String::new());
        assert_eq!(m.metaget_fuzzy("ABCD"), Some(Value::Integer(2)));
    }

    #[test]
    fn identifiers_default_to_empty() {
        let tree = Block::new().with("DATA_SET_ID", Value::Sequence(vec!["A".into(), "B".into()]));
        let m = Metadata::new(tree, vec![], LabelFormat::Pds3, String::new());
        let ids = m.identifiers();
        assert_eq!(ids.get("DATA_SET_ID"), "(A, B)");
        assert_eq!(ids.get("ROWS"), "");
        assert_eq!(ids.get("NOT_AN_IDENTIFIER"), "");
        assert_eq!(ids.iter().count(), IDENTIFIER_FIELDS.len());
    }
}
