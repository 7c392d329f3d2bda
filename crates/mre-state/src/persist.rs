//! Persisted project format.
//!
//! A project file is a schema-versioned JSON document holding the ordered
//! sealed states, the checkpoint map and the fingerprint of the catalogue
//! the history was built against. Values are stored as raw JSON so entries
//! whose ids a future catalogue no longer knows can be retained opaquely
//! instead of being dropped.
//!
//! Writes go to a temporary sibling file first and are renamed into place,
//! so a crash mid-save never corrupts an existing project file.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::warn;

use mre_model::{Catalogue, StructuredValue};

use crate::error::{Result, StateError};
use crate::history::StateHistory;
use crate::state::DataState;

pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// One sealed state as stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub version: u64,
    pub level: Option<String>,
    pub sealed_at: Option<DateTime<Utc>>,
    /// Ids merged into this state relative to its parent.
    pub changed: Vec<String>,
    /// Variable id to raw value payload, orphaned entries included.
    pub values: BTreeMap<String, JsonValue>,
}

/// Serialized state history plus the catalogue version it was built
/// against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectFile {
    pub schema_version: u32,
    pub catalogue_fingerprint: String,
    pub current_version: u64,
    pub next_version: u64,
    pub levels: BTreeMap<String, u64>,
    pub states: Vec<StateSnapshot>,
}

/// Snapshot a history into its persisted form.
pub fn to_project_file(history: &StateHistory) -> Result<ProjectFile> {
    let mut states = Vec::with_capacity(history.version_count());
    for state in history.states() {
        let mut values = BTreeMap::new();
        for (id, value) in state.values() {
            let payload =
                serde_json::to_value(value.as_ref()).map_err(|e| StateError::Format {
                    message: format!("failed to encode '{id}': {e}"),
                })?;
            values.insert(id.clone(), payload);
        }
        for (id, payload) in state.orphans() {
            values.insert(id.clone(), payload.clone());
        }
        states.push(StateSnapshot {
            version: state.version().unwrap_or(0),
            level: state.level().map(str::to_string),
            sealed_at: state.sealed_at(),
            changed: state.changed_ids().iter().cloned().collect(),
            values,
        });
    }
    Ok(ProjectFile {
        schema_version: CURRENT_SCHEMA_VERSION,
        catalogue_fingerprint: history.catalogue_fingerprint().to_string(),
        current_version: history.current_version(),
        next_version: states.last().map(|s| s.version + 1).unwrap_or(1),
        levels: history.levels().clone(),
        states,
    })
}

/// Rebuild a history from its persisted form, resolving every id against
/// the running catalogue.
///
/// Ids the catalogue does not know are retained as orphaned entries and
/// reported; a known id whose stored value no longer validates fails with
/// [`StateError::IncompatibleCatalogue`], since silently truncating or
/// reinterpreting data would be worse than refusing the load.
pub fn from_project_file(file: &ProjectFile, catalogue: &Catalogue) -> Result<StateHistory> {
    if file.schema_version != CURRENT_SCHEMA_VERSION {
        return Err(StateError::Format {
            message: format!(
                "unsupported schema version {} (expected {})",
                file.schema_version, CURRENT_SCHEMA_VERSION
            ),
        });
    }

    let fingerprint = catalogue.fingerprint();
    if file.catalogue_fingerprint != fingerprint {
        warn!(
            stored = %file.catalogue_fingerprint,
            running = %fingerprint,
            "project file was written against a different catalogue"
        );
    }

    let mut states: Vec<DataState> = Vec::with_capacity(file.states.len());
    let mut previous_version: Option<u64> = None;
    let mut orphan_count = 0usize;

    for snapshot in &file.states {
        if let Some(previous) = previous_version
            && snapshot.version <= previous
        {
            return Err(StateError::Format {
                message: format!(
                    "state versions must be strictly increasing ({} follows {})",
                    snapshot.version, previous
                ),
            });
        }
        previous_version = Some(snapshot.version);

        let mut values: BTreeMap<String, Arc<StructuredValue>> = BTreeMap::new();
        let mut orphans: BTreeMap<String, JsonValue> = BTreeMap::new();
        for (id, payload) in &snapshot.values {
            if !catalogue.contains(id) {
                orphans.insert(id.clone(), payload.clone());
                orphan_count += 1;
                continue;
            }
            let value: StructuredValue =
                serde_json::from_value(payload.clone()).map_err(|e| {
                    StateError::IncompatibleCatalogue {
                        message: format!("stored value for '{id}' no longer decodes: {e}"),
                    }
                })?;
            catalogue
                .validate(id, &value)
                .map_err(|e| StateError::IncompatibleCatalogue {
                    message: format!("stored value for '{id}' no longer validates: {e}"),
                })?;
            values.insert(id.clone(), Arc::new(value));
        }

        let changed: BTreeSet<String> = snapshot.changed.iter().cloned().collect();
        states.push(DataState::from_parts(
            snapshot.version,
            snapshot.level.clone(),
            snapshot.sealed_at,
            values,
            orphans,
            changed,
        ));
    }

    if states.is_empty() {
        return Err(StateError::Format {
            message: "project file holds no states".to_string(),
        });
    }

    if orphan_count > 0 {
        warn!(
            count = orphan_count,
            "retained orphaned entries for ids unknown to the running catalogue"
        );
    }

    let current = states
        .iter()
        .position(|state| state.version() == Some(file.current_version))
        .ok_or_else(|| StateError::Format {
            message: format!("current version {} is not present", file.current_version),
        })?;

    let max_version = states.last().and_then(DataState::version).unwrap_or(0);
    let next_version = file.next_version.max(max_version + 1);

    Ok(StateHistory::from_parts(
        states,
        current,
        file.levels.clone(),
        next_version,
        file.catalogue_fingerprint.clone(),
    ))
}

/// Write a history to disk as a project file.
pub fn save_history(history: &StateHistory, path: &Path) -> Result<()> {
    let file = to_project_file(history)?;
    let bytes = serde_json::to_vec_pretty(&file).map_err(|e| StateError::Format {
        message: e.to_string(),
    })?;
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes).map_err(|e| StateError::io(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| StateError::io(path, e))?;
    Ok(())
}

/// Read a project file from disk and rebuild the history against
/// `catalogue`.
pub fn load_history(path: &Path, catalogue: &Catalogue) -> Result<StateHistory> {
    let bytes = fs::read(path).map_err(|e| StateError::io(path, e))?;
    let file: ProjectFile = serde_json::from_slice(&bytes).map_err(|e| StateError::Format {
        message: format!("{}: {e}", path.display()),
    })?;
    from_project_file(&file, catalogue)
}
