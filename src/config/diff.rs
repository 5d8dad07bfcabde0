//! Key-level differences between two configuration snapshots.

use super::types::Configuration;

/// What changed between an old and a new snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigDiff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub changed: Vec<String>,
}

impl ConfigDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }

    /// Total number of keys touched.
    pub fn len(&self) -> usize {
        self.added.len() + self.removed.len() + self.changed.len()
    }
}

impl Configuration {
    /// Compare `self` (old) against `next` (new).
    pub fn diff(&self, next: &Configuration) -> ConfigDiff {
        let mut diff = ConfigDiff::default();

        for (key, value) in self {
            match next.get(key) {
                None => diff.removed.push(key.clone()),
                Some(other) if other != value => diff.changed.push(key.clone()),
                Some(_) => {}
            }
        }

        for key in next.keys() {
            if !self.contains_key(key) {
                diff.added.push(key.clone());
            }
        }

        diff
    }
}
