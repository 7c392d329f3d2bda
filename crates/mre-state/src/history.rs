//! Ordered, branchable history of sealed data states.
//!
//! The history is the single writer surface for a project's data: every
//! mutation derives a state from the current one, merges, and seals a new
//! version. Named levels checkpoint versions so a caller can rewind to an
//! earlier stage; later versions stay reachable, and a preserving rewind
//! re-applies the merges recorded after the checkpoint.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info};

use mre_model::{Catalogue, StructuredValue};

use crate::error::{Result, StateError};
use crate::state::DataState;

/// Level registered for the empty root state of every project.
pub const INITIAL_LEVEL: &str = "initial";

/// Per-project sequence of sealed states.
#[derive(Debug, Clone)]
pub struct StateHistory {
    /// Sealed states in creation order; versions are strictly increasing.
    states: Vec<DataState>,
    /// Index of the current state within `states`.
    current: usize,
    /// Named checkpoints: level name to version.
    levels: BTreeMap<String, u64>,
    next_version: u64,
    catalogue_fingerprint: String,
}

impl StateHistory {
    /// New history with an empty root state sealed at [`INITIAL_LEVEL`].
    pub fn new(catalogue: &Catalogue) -> Self {
        let mut root = DataState::empty();
        root.seal_in_place(0, Some(INITIAL_LEVEL.to_string()));
        let mut levels = BTreeMap::new();
        levels.insert(INITIAL_LEVEL.to_string(), 0);
        Self {
            states: vec![root],
            current: 0,
            levels,
            next_version: 1,
            catalogue_fingerprint: catalogue.fingerprint(),
        }
    }

    pub(crate) fn from_parts(
        states: Vec<DataState>,
        current: usize,
        levels: BTreeMap<String, u64>,
        next_version: u64,
        catalogue_fingerprint: String,
    ) -> Self {
        Self {
            states,
            current,
            levels,
            next_version,
            catalogue_fingerprint,
        }
    }

    /// The current state.
    pub fn current(&self) -> &DataState {
        &self.states[self.current]
    }

    pub fn current_version(&self) -> u64 {
        self.states[self.current].version().unwrap_or(0)
    }

    /// Number of sealed states, including the root.
    pub fn version_count(&self) -> usize {
        self.states.len()
    }

    pub fn levels(&self) -> &BTreeMap<String, u64> {
        &self.levels
    }

    pub fn has_level(&self, level: &str) -> bool {
        self.levels.contains_key(level)
    }

    pub fn level_version(&self, level: &str) -> Option<u64> {
        self.levels.get(level).copied()
    }

    pub fn catalogue_fingerprint(&self) -> &str {
        &self.catalogue_fingerprint
    }

    pub fn state_at(&self, version: u64) -> Option<&DataState> {
        self.index_of(version).map(|index| &self.states[index])
    }

    pub(crate) fn states(&self) -> &[DataState] {
        &self.states
    }

    /// Seal a populated state into the history, assigning the next version
    /// and moving the current pointer to it. A `level` also records a
    /// checkpoint under that name.
    pub fn seal(&mut self, mut state: DataState, level: Option<&str>) -> Result<u64> {
        if state.is_sealed() {
            return Err(StateError::Sealed);
        }
        let version = self.next_version;
        self.next_version += 1;
        state.seal_in_place(version, level.map(str::to_string));
        if let Some(level) = level {
            self.levels.insert(level.to_string(), version);
        }
        self.states.push(state);
        self.current = self.states.len() - 1;
        debug!(version, level = level.unwrap_or("-"), "data state sealed");
        Ok(version)
    }

    /// Record the current version under `level`.
    pub fn checkpoint(&mut self, level: &str) {
        let version = self.current_version();
        self.levels.insert(level.to_string(), version);
        debug!(level, version, "checkpoint recorded");
    }

    /// Derive from the current state, merge one value and seal.
    pub fn merge_value(
        &mut self,
        catalogue: &Catalogue,
        id: &str,
        value: StructuredValue,
        level: Option<&str>,
    ) -> Result<u64> {
        let mut next = DataState::derive(self.current());
        next.merge(catalogue, id, value)?;
        self.seal(next, level)
    }

    /// Derive from the current state, merge a batch of values and seal.
    ///
    /// Any validation failure aborts before sealing, leaving the history
    /// untouched.
    pub fn merge_values(
        &mut self,
        catalogue: &Catalogue,
        values: BTreeMap<String, StructuredValue>,
        level: Option<&str>,
    ) -> Result<u64> {
        let mut next = DataState::derive(self.current());
        for (id, value) in values {
            next.merge(catalogue, &id, value)?;
        }
        self.seal(next, level)
    }

    /// Move the current pointer back to the version checkpointed under
    /// `level`. Later versions are kept.
    ///
    /// With `preserve`, every merge recorded strictly after the checkpoint
    /// is re-applied on top of the rewound state in original version order
    /// (last writer wins), sealing one new state so edits made after the
    /// checkpoint survive the rewind. Returns the version the history is
    /// now current at.
    pub fn rewind(&mut self, level: &str, preserve: bool) -> Result<u64> {
        let version = self
            .level_version(level)
            .ok_or_else(|| StateError::UnknownLevel {
                level: level.to_string(),
            })?;
        let index = self.index_of(version).ok_or_else(|| StateError::UnknownLevel {
            level: level.to_string(),
        })?;

        if !preserve {
            self.current = index;
            info!(level, version, "history rewound");
            return Ok(version);
        }

        // Last writer wins across the states recorded after the checkpoint.
        let mut replay: BTreeMap<String, Arc<StructuredValue>> = BTreeMap::new();
        for state in &self.states[index + 1..] {
            for id in state.changed_ids() {
                if let Some(value) = state.shared(id) {
                    replay.insert(id.clone(), value);
                }
            }
        }

        self.current = index;
        if replay.is_empty() {
            info!(level, version, "history rewound, nothing to preserve");
            return Ok(version);
        }

        let preserved = replay.len();
        let mut next = DataState::derive(&self.states[index]);
        for (id, value) in replay {
            next.install_shared(id, value);
        }
        let sealed = self.seal(next, None)?;
        info!(level, version, preserved, "history rewound with preserved merges");
        Ok(sealed)
    }

    fn index_of(&self, version: u64) -> Option<usize> {
        self.states
            .binary_search_by_key(&version, |state| state.version().unwrap_or(0))
            .ok()
    }
}
