//! Variable catalogue: the static registry every other component resolves
//! identifiers against.
//!
//! The catalogue is built once at process start and treated as read-only
//! thereafter. Each entry pins a variable id to a structural type and its
//! validation constraints; no value enters a data state without passing
//! [`Catalogue::validate`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{ModelError, Result};
use crate::value::{Scalar, StructuralType, StructuredValue};

/// Allowed-value constraint on a scalar variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Constraint {
    /// The value must be one of the listed text options.
    OneOf(Vec<String>),
    /// The numeric value must lie in the closed interval.
    Range { min: f64, max: f64 },
    /// The numeric value must be zero or greater.
    NonNegative,
}

impl Constraint {
    fn check(&self, scalar: &Scalar) -> std::result::Result<(), String> {
        match self {
            Constraint::OneOf(options) => {
                let Some(text) = scalar.as_text() else {
                    return Err(format!(
                        "enumerated variable expects text, found {}",
                        scalar.type_name()
                    ));
                };
                if options.iter().any(|option| option == text) {
                    Ok(())
                } else {
                    Err(format!(
                        "'{}' is not one of: {}",
                        text,
                        options.join(", ")
                    ))
                }
            }
            Constraint::Range { min, max } => {
                let Some(value) = scalar.as_f64() else {
                    return Err(format!(
                        "ranged variable expects a number, found {}",
                        scalar.type_name()
                    ));
                };
                if value >= *min && value <= *max {
                    Ok(())
                } else {
                    Err(format!("{value} is outside [{min}, {max}]"))
                }
            }
            Constraint::NonNegative => {
                let Some(value) = scalar.as_f64() else {
                    return Err(format!(
                        "non-negative variable expects a number, found {}",
                        scalar.type_name()
                    ));
                };
                if value >= 0.0 {
                    Ok(())
                } else {
                    Err(format!("{value} is negative"))
                }
            }
        }
    }
}

/// A catalogue entry: identifier, structural type and metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableDefinition {
    /// Dotted identifier, e.g. `device.system_type`.
    pub id: String,
    pub structural_type: StructuralType,
    /// Human-readable title.
    pub title: String,
    pub unit: Option<String>,
    pub category: Option<String>,
    pub constraint: Option<Constraint>,
}

impl VariableDefinition {
    pub fn new(
        id: impl Into<String>,
        structural_type: StructuralType,
        title: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            structural_type,
            title: title.into(),
            unit: None,
            category: None,
            constraint: None,
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.constraint = Some(constraint);
        self
    }
}

/// Registry of variable definitions keyed by id.
#[derive(Debug, Clone, Default)]
pub struct Catalogue {
    definitions: BTreeMap<String, VariableDefinition>,
}

impl Catalogue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a definition. Ids are unique.
    pub fn define(&mut self, definition: VariableDefinition) -> Result<()> {
        if self.definitions.contains_key(&definition.id) {
            return Err(ModelError::DuplicateDefinition { id: definition.id });
        }
        self.definitions.insert(definition.id.clone(), definition);
        Ok(())
    }

    /// Definition for an id.
    pub fn lookup(&self, id: &str) -> Result<&VariableDefinition> {
        self.definitions
            .get(id)
            .ok_or_else(|| ModelError::UnknownVariable { id: id.to_string() })
    }

    pub fn contains(&self, id: &str) -> bool {
        self.definitions.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.definitions.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Validate a value against the definition for `id`.
    ///
    /// Checks, in order: the id is defined, the value's shape matches the
    /// declared structural type, the payload is internally consistent, and
    /// any scalar constraint holds.
    pub fn validate(&self, id: &str, value: &StructuredValue) -> Result<()> {
        let definition = self.lookup(id)?;

        let found = value.structural_type();
        if found != definition.structural_type {
            return Err(ModelError::Validation {
                id: id.to_string(),
                message: format!(
                    "expected {}, found {}",
                    definition.structural_type, found
                ),
            });
        }

        value.verify().map_err(|message| ModelError::Validation {
            id: id.to_string(),
            message,
        })?;

        if let Some(constraint) = &definition.constraint
            && let StructuredValue::Scalar(scalar) = value
        {
            constraint
                .check(scalar)
                .map_err(|message| ModelError::Validation {
                    id: id.to_string(),
                    message,
                })?;
        }

        Ok(())
    }

    /// Hex digest over the sorted (id, structural type) pairs.
    ///
    /// Persisted projects embed this so a load against a different catalogue
    /// is detected rather than silently truncating data.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for definition in self.definitions.values() {
            hasher.update(definition.id.as_bytes());
            hasher.update(b"\t");
            hasher.update(definition.structural_type.as_str().as_bytes());
            hasher.update(b"\n");
        }
        hex::encode(hasher.finalize())
    }
}
