//! Entity Alias Map - Maps source-specific country names to canonical names
//!
//! Sources disagree on naming ("Korea, Rep." vs "Korea"). The map is many-to-one
//! and supplied by configuration; names without an entry pass through unchanged.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityAliasMap {
    aliases: HashMap<String, String>,
}

impl EntityAliasMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a raw name for a canonical entity.
    pub fn insert(&mut self, raw: impl Into<String>, canonical: impl Into<String>) {
        self.aliases.insert(raw.into(), canonical.into());
    }

    pub fn with_alias(mut self, raw: impl Into<String>, canonical: impl Into<String>) -> Self {
        self.insert(raw, canonical);
        self
    }

    /// Merge another map into this one. Entries from `other` win.
    pub fn extend(&mut self, other: &EntityAliasMap) {
        for (raw, canonical) in &other.aliases {
            self.aliases.insert(raw.clone(), canonical.clone());
        }
    }

    /// Canonical name for `raw`, or `raw` itself when unmapped.
    pub fn resolve<'a>(&'a self, raw: &'a str) -> &'a str {
        self.aliases.get(raw).map(String::as_str).unwrap_or(raw)
    }

    /// All raw names that resolve to `canonical`, sorted.
    pub fn raw_names_for(&self, canonical: &str) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .aliases
            .iter()
            .filter(|(_, c)| c.as_str() == canonical)
            .map(|(raw, _)| raw.as_str())
            .collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for EntityAliasMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = EntityAliasMap::new();
        for (raw, canonical) in iter {
            map.insert(raw, canonical);
        }
        map
    }
}
