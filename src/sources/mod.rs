mod import_resolver;

pub use import_resolver::{resolve, UnresolvedImport};

use std::collections::BTreeMap;

/// A virtual file collection keyed by logical path, exactly as the paths
/// appear in import statements and in the compiler input.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SourceSet {
    units: BTreeMap<String, String>,
}

impl SourceSet {
    pub fn insert(&mut self, path: impl Into<String>, content: impl Into<String>) {
        self.units.insert(path.into(), content.into());
    }

    pub fn contains(&self, path: &str) -> bool {
        self.units.contains_key(path)
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.units.get(path).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.units.iter().map(|(p, c)| (p.as_str(), c.as_str()))
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.units.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn into_inner(self) -> BTreeMap<String, String> {
        self.units
    }
}

impl FromIterator<(String, String)> for SourceSet {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self {
            units: iter.into_iter().collect(),
        }
    }
}
