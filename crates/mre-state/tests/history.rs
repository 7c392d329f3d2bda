//! Tests for the state history: sealing, checkpoints, rewind semantics.

use std::collections::BTreeMap;

use mre_model::{Catalogue, Scalar, StructuralType, StructuredValue, VariableDefinition};
use mre_state::{INITIAL_LEVEL, StateError, StateHistory};

fn catalogue() -> Catalogue {
    let mut catalogue = Catalogue::new();
    for (id, title) in [
        ("project.annual_energy", "Annual energy yield"),
        ("project.number_of_devices", "Device count"),
        ("project.lcoe", "Levelised cost of energy"),
        ("project.capex_total", "Total capital expenditure"),
    ] {
        catalogue
            .define(VariableDefinition::new(id, StructuralType::Scalar, title))
            .expect("definition");
    }
    catalogue
}

fn scalar(value: f64) -> StructuredValue {
    StructuredValue::Scalar(Scalar::Float(value))
}

// ============================================================================
// Sealing and versions
// ============================================================================

#[test]
fn new_history_has_sealed_initial_root() {
    let history = StateHistory::new(&catalogue());
    assert_eq!(history.version_count(), 1);
    assert_eq!(history.current_version(), 0);
    assert_eq!(history.level_version(INITIAL_LEVEL), Some(0));
    assert!(history.current().is_sealed());
    assert!(history.current().is_empty());
}

#[test]
fn merge_value_seals_a_new_version() {
    let catalogue = catalogue();
    let mut history = StateHistory::new(&catalogue);
    let version = history
        .merge_value(&catalogue, "project.annual_energy", scalar(1200.0), Some("input"))
        .expect("merge");
    assert_eq!(version, 1);
    assert_eq!(history.current_version(), 1);
    assert_eq!(history.current().level(), Some("input"));
    assert_eq!(
        history.current().get("project.annual_energy"),
        Some(&scalar(1200.0))
    );
}

#[test]
fn failed_merge_leaves_history_untouched() {
    let catalogue = catalogue();
    let mut history = StateHistory::new(&catalogue);
    let error = history
        .merge_value(&catalogue, "project.unknown", scalar(1.0), None)
        .unwrap_err();
    assert!(matches!(error, StateError::Model(_)));
    assert_eq!(history.version_count(), 1);
    assert_eq!(history.current_version(), 0);
}

#[test]
fn failed_batch_merge_is_all_or_nothing() {
    let catalogue = catalogue();
    let mut history = StateHistory::new(&catalogue);
    let mut batch = BTreeMap::new();
    batch.insert("project.annual_energy".to_string(), scalar(900.0));
    batch.insert("project.unknown".to_string(), scalar(1.0));
    let error = history
        .merge_values(&catalogue, batch, None)
        .unwrap_err();
    assert!(matches!(error, StateError::Model(_)));
    assert_eq!(history.version_count(), 1);
    assert!(!history.current().contains("project.annual_energy"));
}

// ============================================================================
// Rewind semantics
// ============================================================================

#[test]
fn rewind_to_unknown_level_fails() {
    let mut history = StateHistory::new(&catalogue());
    let error = history.rewind("no such level", false).unwrap_err();
    assert!(matches!(error, StateError::UnknownLevel { .. }));
}

#[test]
fn plain_rewind_hides_later_merges_but_keeps_versions() {
    let catalogue = catalogue();
    let mut history = StateHistory::new(&catalogue);
    history
        .merge_value(&catalogue, "project.number_of_devices", scalar(20.0), None)
        .expect("merge");
    history.checkpoint("modules initial");
    history
        .merge_value(&catalogue, "project.annual_energy", scalar(1200.0), None)
        .expect("merge");
    history
        .merge_value(&catalogue, "project.lcoe", scalar(0.21), None)
        .expect("merge");
    history
        .merge_value(&catalogue, "project.capex_total", scalar(4.5e6), None)
        .expect("merge");

    let count_before = history.version_count();
    history.rewind("modules initial", false).expect("rewind");

    assert!(!history.current().contains("project.annual_energy"));
    assert!(!history.current().contains("project.lcoe"));
    assert!(!history.current().contains("project.capex_total"));
    assert!(history.current().contains("project.number_of_devices"));
    // Later versions stay reachable.
    assert_eq!(history.version_count(), count_before);
}

#[test]
fn preserving_rewind_reapplies_later_merges() {
    let catalogue = catalogue();
    let mut history = StateHistory::new(&catalogue);
    history
        .merge_value(&catalogue, "project.number_of_devices", scalar(20.0), None)
        .expect("merge");
    history.checkpoint("modules initial");
    history
        .merge_value(&catalogue, "project.annual_energy", scalar(1200.0), None)
        .expect("merge");
    history
        .merge_value(&catalogue, "project.lcoe", scalar(0.21), None)
        .expect("merge");
    history
        .merge_value(&catalogue, "project.capex_total", scalar(4.5e6), None)
        .expect("merge");

    history.rewind("modules initial", true).expect("rewind");

    for (id, expected) in [
        ("project.number_of_devices", 20.0),
        ("project.annual_energy", 1200.0),
        ("project.lcoe", 0.21),
        ("project.capex_total", 4.5e6),
    ] {
        assert_eq!(history.current().get(id), Some(&scalar(expected)), "{id}");
    }
}

#[test]
fn preserving_rewind_reproduces_pre_rewind_state() {
    let catalogue = catalogue();
    let mut history = StateHistory::new(&catalogue);
    history
        .merge_value(&catalogue, "project.annual_energy", scalar(800.0), None)
        .expect("merge");
    history.checkpoint("modules initial");
    // Overwrite after the checkpoint, then add a fresh id.
    history
        .merge_value(&catalogue, "project.annual_energy", scalar(950.0), None)
        .expect("merge");
    history
        .merge_value(&catalogue, "project.lcoe", scalar(0.18), None)
        .expect("merge");

    let before: Vec<(String, StructuredValue)> = history
        .current()
        .ids()
        .map(|id| {
            (
                id.to_string(),
                history.current().get(id).expect("present").clone(),
            )
        })
        .collect();

    history.rewind("modules initial", true).expect("rewind");

    for (id, value) in before {
        assert_eq!(history.current().get(&id), Some(&value), "{id}");
    }
}

#[test]
fn last_writer_wins_when_replaying_repeated_merges() {
    let catalogue = catalogue();
    let mut history = StateHistory::new(&catalogue);
    history.checkpoint("modules initial");
    history
        .merge_value(&catalogue, "project.lcoe", scalar(0.30), None)
        .expect("merge");
    history
        .merge_value(&catalogue, "project.lcoe", scalar(0.25), None)
        .expect("merge");
    history
        .merge_value(&catalogue, "project.lcoe", scalar(0.22), None)
        .expect("merge");

    history.rewind("modules initial", true).expect("rewind");
    assert_eq!(history.current().get("project.lcoe"), Some(&scalar(0.22)));
}

#[test]
fn versions_keep_increasing_after_a_rewind() {
    let catalogue = catalogue();
    let mut history = StateHistory::new(&catalogue);
    history
        .merge_value(&catalogue, "project.annual_energy", scalar(1000.0), None)
        .expect("merge");
    history.checkpoint("modules initial");
    history
        .merge_value(&catalogue, "project.lcoe", scalar(0.2), None)
        .expect("merge");

    history.rewind("modules initial", false).expect("rewind");
    let version = history
        .merge_value(&catalogue, "project.capex_total", scalar(3.0e6), None)
        .expect("merge");
    assert_eq!(version, 3);
    assert_eq!(history.current_version(), 3);
}
