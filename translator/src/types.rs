use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Target-field-name to value, in mapping order.
pub type TranslatedResult = IndexMap<String, Value>;

/// Source identifiers name both a plugin and a directory on disk, so they are
/// restricted to ASCII alphanumerics, `-` and `_`.
pub fn is_valid_identifier(identifier: &str) -> bool {
    !identifier.is_empty()
        && identifier.len() <= 64
        && identifier
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Where the value of one source field ends up.
///
/// Only one level of `Nested` is evaluated. Deeper levels are kept so the
/// document round-trips through storage, but every target beneath them
/// resolves to null.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MappingTarget {
    Flat(String),
    Nested(IndexMap<String, MappingTarget>),
}

impl MappingTarget {
    /// All target-field-names reachable from this target, depth first.
    pub fn target_names(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_names(&mut names);
        names
    }

    fn collect_names<'a>(&'a self, names: &mut Vec<&'a str>) {
        match self {
            MappingTarget::Flat(name) => names.push(name),
            MappingTarget::Nested(fields) => {
                for target in fields.values() {
                    target.collect_names(names);
                }
            }
        }
    }
}

/// Declarative source-field to target-field mapping for one PMS source.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MappingDocument {
    entries: IndexMap<String, MappingTarget>,
}

impl MappingDocument {
    pub fn new(entries: IndexMap<String, MappingTarget>) -> Self {
        MappingDocument { entries }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &MappingTarget)> {
        self.entries.iter()
    }

    pub fn get(&self, source_field: &str) -> Option<&MappingTarget> {
        self.entries.get(source_field)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Target names written by more than one entry. The last writer wins for these.
    pub fn duplicate_targets(&self) -> Vec<&str> {
        let mut seen = std::collections::HashSet::new();
        let mut duplicates = Vec::new();
        for target in self.entries.values() {
            for name in target.target_names() {
                if !seen.insert(name) && !duplicates.contains(&name) {
                    duplicates.push(name);
                }
            }
        }
        duplicates
    }
}

impl<K, V> FromIterator<(K, V)> for MappingDocument
where
    K: Into<String>,
    V: Into<MappingTarget>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        MappingDocument {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl From<&str> for MappingTarget {
    fn from(name: &str) -> Self {
        MappingTarget::Flat(name.to_string())
    }
}

impl From<String> for MappingTarget {
    fn from(name: String) -> Self {
        MappingTarget::Flat(name)
    }
}

impl<K: Into<String>, V: Into<MappingTarget>, const N: usize> From<[(K, V); N]> for MappingTarget {
    fn from(fields: [(K, V); N]) -> Self {
        MappingTarget::Nested(
            fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}
