//! Data state snapshots.
//!
//! A data state maps variable ids to structured values at one point in the
//! pipeline. States derive from a parent by sharing values behind `Arc`, so
//! deriving and merging cost O(changed keys), not O(state size). Once a
//! state is sealed into a [`StateHistory`](crate::history::StateHistory) it
//! is immutable; new information always produces a new state.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use tracing::debug;

use mre_model::{Catalogue, StructuredValue};

use crate::error::{Result, StateError};

/// Snapshot of variable values at one pipeline point.
///
/// An absent key means "not yet determined", never "null". Every present
/// key has passed catalogue validation at merge time.
#[derive(Debug, Clone, Default)]
pub struct DataState {
    level: Option<String>,
    version: Option<u64>,
    sealed_at: Option<DateTime<Utc>>,
    values: BTreeMap<String, Arc<StructuredValue>>,
    /// Entries loaded from a project file whose ids the running catalogue
    /// does not know. Retained opaquely so a catalogue upgrade never drops
    /// data; not visible through [`get`](Self::get).
    orphans: BTreeMap<String, JsonValue>,
    changed: BTreeSet<String>,
    sealed: bool,
}

impl DataState {
    /// The empty root state of a new history.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Derive a child state from a parent.
    ///
    /// The child shares the parent's values until a merge overwrites them.
    pub fn derive(parent: &DataState) -> Self {
        Self {
            level: None,
            version: None,
            sealed_at: None,
            values: parent.values.clone(),
            orphans: parent.orphans.clone(),
            changed: BTreeSet::new(),
            sealed: false,
        }
    }

    /// Validate `value` against the catalogue and install it, overwriting
    /// any prior value for `id`.
    pub fn merge(&mut self, catalogue: &Catalogue, id: &str, value: StructuredValue) -> Result<()> {
        if self.sealed {
            return Err(StateError::Sealed);
        }
        catalogue.validate(id, &value)?;
        if let Some(previous) = self.values.get(id) {
            if previous.as_ref() == &value {
                debug!(id, "merge repeats the existing value");
            } else {
                debug!(id, "existing value overwritten");
            }
        }
        self.values.insert(id.to_string(), Arc::new(value));
        self.changed.insert(id.to_string());
        Ok(())
    }

    /// Install an already-validated shared value. Used when replaying
    /// merges from sealed states, which passed validation when first
    /// merged.
    pub(crate) fn install_shared(&mut self, id: String, value: Arc<StructuredValue>) {
        self.changed.insert(id.clone());
        self.values.insert(id, value);
    }

    pub(crate) fn seal_in_place(&mut self, version: u64, level: Option<String>) {
        self.version = Some(version);
        self.level = level;
        self.sealed_at = Some(Utc::now());
        self.sealed = true;
    }

    pub(crate) fn from_parts(
        version: u64,
        level: Option<String>,
        sealed_at: Option<DateTime<Utc>>,
        values: BTreeMap<String, Arc<StructuredValue>>,
        orphans: BTreeMap<String, JsonValue>,
        changed: BTreeSet<String>,
    ) -> Self {
        Self {
            level,
            version: Some(version),
            sealed_at,
            values,
            orphans,
            changed,
            sealed: true,
        }
    }

    pub fn get(&self, id: &str) -> Option<&StructuredValue> {
        self.values.get(id).map(Arc::as_ref)
    }

    /// Shared handle on a value, for zero-copy hand-off to module inputs.
    pub fn shared(&self, id: &str) -> Option<Arc<StructuredValue>> {
        self.values.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.values.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Ids merged into this state since it was derived.
    pub fn changed_ids(&self) -> &BTreeSet<String> {
        &self.changed
    }

    pub fn orphaned_ids(&self) -> impl Iterator<Item = &str> {
        self.orphans.keys().map(String::as_str)
    }

    pub(crate) fn orphans(&self) -> &BTreeMap<String, JsonValue> {
        &self.orphans
    }

    pub(crate) fn values(&self) -> &BTreeMap<String, Arc<StructuredValue>> {
        &self.values
    }

    pub fn level(&self) -> Option<&str> {
        self.level.as_deref()
    }

    pub fn version(&self) -> Option<u64> {
        self.version
    }

    pub fn sealed_at(&self) -> Option<DateTime<Utc>> {
        self.sealed_at
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
