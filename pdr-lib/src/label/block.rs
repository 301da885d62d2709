use serde::ser::{Serialize, SerializeMap, Serializer};

use super::Value;

/// Ordered, multi-valued mapping of label keys to values.
///
/// Keys may repeat at the same level (multiple `HISTORY` groups, multiple `Axis_Array`
/// elements, ...). Insertion order is preserved and lookups return the first occurrence.
///
/// # Example
/// ```
/// use pdr::label::{Block, Value};
///
/// let mut block = Block::new();
/// block.push("HISTORY", Value::from("first"));
/// block.push("HISTORY", Value::from("second"));
/// assert_eq!(block.get("HISTORY"), Some(&Value::from("first")));
/// assert_eq!(block.get_all("HISTORY").count(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Block {
    entries: Vec<(String, Value)>,
}

impl Block {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push<K: Into<String>>(&mut self, key: K, value: Value) {
        self.entries.push((key.into(), value));
    }

    /// Builder-style [push](Self::push).
    #[must_use]
    pub fn with<K: Into<String>, V: Into<Value>>(mut self, key: K, value: V) -> Self {
        self.push(key, value.into());
        self
    }

    /// First value stored directly under `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Every value stored directly under `key`, in insertion order.
    pub fn get_all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a Value> + 'a {
        self.entries
            .iter()
            .filter(move |(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    /// Replace the first value under `key`, or append it when absent.
    pub fn set<K: Into<String>>(&mut self, key: K, value: Value) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub(crate) fn entries_mut(&mut self) -> &mut Vec<(String, Value)> {
        &mut self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Depth-first, pre-order search for the first value stored under `key` at any depth.
    pub fn find(&self, key: &str) -> Option<&Value> {
        for (k, v) in &self.entries {
            if k == key {
                return Some(v);
            }
            if let Value::Block(child) = v {
                if let Some(found) = child.find(key) {
                    return Some(found);
                }
            }
        }
        None
    }

    /// First block stored under `name` at any depth.
    pub fn find_block(&self, name: &str) -> Option<&Block> {
        for (k, v) in &self.entries {
            if let Value::Block(child) = v {
                if k == name {
                    return Some(child);
                }
                if let Some(found) = child.find_block(name) {
                    return Some(found);
                }
            }
        }
        None
    }

    /// Every block stored under `name` at any depth, in pre-order.
    pub fn find_blocks<'a>(&'a self, name: &str) -> Vec<&'a Block> {
        let mut found = Vec::new();
        self.collect_blocks(name, &mut found);
        found
    }

    fn collect_blocks<'a>(&'a self, name: &str, found: &mut Vec<&'a Block>) {
        for (k, v) in &self.entries {
            if let Value::Block(child) = v {
                if k == name {
                    found.push(child);
                }
                child.collect_blocks(name, found);
            }
        }
    }

    /// Every key at every depth, in pre-order, including repeats.
    pub fn all_keys(&self) -> Vec<String> {
        let mut keys = Vec::new();
        self.collect_keys(&mut keys);
        keys
    }

    fn collect_keys(&self, keys: &mut Vec<String>) {
        for (k, v) in &self.entries {
            keys.push(k.clone());
            if let Value::Block(child) = v {
                child.collect_keys(keys);
            }
        }
    }
}

impl<'a> IntoIterator for &'a Block {
    type Item = (&'a str, &'a Value);
    type IntoIter = Box<dyn Iterator<Item = (&'a str, &'a Value)> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}

// Serialized as a map that may carry duplicate keys, matching the label text.
impl Serialize for Block {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}
