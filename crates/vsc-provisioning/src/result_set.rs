//! Per-project outcome collections.
//!
//! A [`ResultSet`] maps a project id to the members processed under it.
//! Merging appends, so folding partial results from different projects (or
//! different storages) never drops an entry and the fold order does not
//! change which members end up under which key.

use serde::Serialize;
use std::collections::BTreeMap;
use vsc_core::VscId;

/// Multi-map from a project id to an ordered list of member ids.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResultSet(BTreeMap<VscId, Vec<VscId>>);

impl ResultSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensure `key` is present, without members.
    pub fn touch(&mut self, key: VscId) {
        self.0.entry(key).or_default();
    }

    /// Append `values` under `key`.
    pub fn record(&mut self, key: VscId, values: impl IntoIterator<Item = VscId>) {
        self.0.entry(key).or_default().extend(values);
    }

    /// Append every entry of `other`.
    pub fn merge(&mut self, other: ResultSet) {
        for (key, values) in other.0 {
            self.record(key, values);
        }
    }

    /// Members recorded under `key`.
    #[must_use]
    pub fn get(&self, key: &VscId) -> Option<&[VscId]> {
        self.0.get(key).map(Vec::as_slice)
    }

    #[must_use]
    pub fn contains_key(&self, key: &VscId) -> bool {
        self.0.contains_key(key)
    }

    /// Project ids, sorted.
    pub fn keys(&self) -> impl Iterator<Item = &VscId> {
        self.0.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&VscId, &[VscId])> {
        self.0.iter().map(|(k, v)| (k, v.as_slice()))
    }

    /// Number of projects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
