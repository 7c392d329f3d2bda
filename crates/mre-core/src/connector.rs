//! Executability checks and validated execution.
//!
//! The connector decides whether a contract can run against a data state
//! and performs the execute-validate-merge cycle. Merging is all-or-nothing:
//! a compute failure or a single invalid output aborts the call and leaves
//! the history exactly as it was.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, info};

use mre_model::Catalogue;
use mre_state::{DataState, StateHistory};

use crate::contract::{InputSet, InterfaceContract};
use crate::error::{CoreError, Result};

/// Executability of one contract against one data state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContractStatus {
    /// Every required input is present and valid.
    Satisfied,
    /// Missing or invalid required inputs, in declaration order.
    Blocked { missing: Vec<String> },
}

impl ContractStatus {
    pub fn is_satisfied(&self) -> bool {
        matches!(self, ContractStatus::Satisfied)
    }

    pub fn missing(&self) -> &[String] {
        match self {
            ContractStatus::Satisfied => &[],
            ContractStatus::Blocked { missing } => missing,
        }
    }
}

/// Result of a successful execution.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    /// Version of the sealed state holding the outputs.
    pub version: u64,
    /// Ids written by the execution.
    pub changed: BTreeSet<String>,
}

/// Scheduler facade over a catalogue.
#[derive(Debug, Clone)]
pub struct Connector {
    catalogue: Arc<Catalogue>,
}

impl Connector {
    pub fn new(catalogue: Arc<Catalogue>) -> Self {
        Self { catalogue }
    }

    pub fn catalogue(&self) -> &Catalogue {
        &self.catalogue
    }

    /// Check every required input of `contract` against `state`. Optional
    /// inputs never block.
    pub fn status(&self, contract: &InterfaceContract, state: &DataState) -> ContractStatus {
        let mut missing = Vec::new();
        for id in contract.required() {
            match state.get(id) {
                Some(value) if self.catalogue.validate(id, value).is_ok() => {}
                _ => missing.push(id.clone()),
            }
        }
        if missing.is_empty() {
            ContractStatus::Satisfied
        } else {
            ContractStatus::Blocked { missing }
        }
    }

    /// Restrict `state` to the contract's required and optional ids that
    /// are present.
    pub fn gather_inputs(&self, contract: &InterfaceContract, state: &DataState) -> InputSet {
        let mut inputs = InputSet::default();
        for id in contract.required().iter().chain(contract.optional()) {
            if let Some(value) = state.shared(id) {
                inputs.insert(id.clone(), value);
            }
        }
        inputs
    }

    /// Execute `contract` against the history's current state, sealing the
    /// outputs at a level named after the contract.
    pub fn execute(
        &self,
        contract: &InterfaceContract,
        history: &mut StateHistory,
    ) -> Result<ExecutionOutcome> {
        self.execute_at_level(contract, history, contract.id())
    }

    /// Execute `contract`, sealing the outputs under an explicit level tag.
    pub fn execute_at_level(
        &self,
        contract: &InterfaceContract,
        history: &mut StateHistory,
        level: &str,
    ) -> Result<ExecutionOutcome> {
        let state = history.current();
        if let ContractStatus::Blocked { missing } = self.status(contract, state) {
            return Err(CoreError::NotExecutable {
                contract_id: contract.id().to_string(),
                missing,
            });
        }

        let inputs = self.gather_inputs(contract, state);
        debug!(
            contract = contract.id(),
            inputs = inputs.len(),
            "executing interface contract"
        );

        let outputs = contract
            .invoke(&inputs)
            .map_err(|source| CoreError::Execution {
                contract_id: contract.id().to_string(),
                source,
            })?;

        // All-or-nothing: every output must be declared and valid before
        // anything is merged.
        for (id, value) in &outputs {
            if !contract.declares_output(id) {
                return Err(CoreError::OutputValidation {
                    contract_id: contract.id().to_string(),
                    id: id.clone(),
                    message: "output is not declared by the contract".to_string(),
                });
            }
            self.catalogue
                .validate(id, value)
                .map_err(|e| CoreError::OutputValidation {
                    contract_id: contract.id().to_string(),
                    id: id.clone(),
                    message: e.to_string(),
                })?;
        }

        let mut next = DataState::derive(history.current());
        let mut changed = BTreeSet::new();
        for (id, value) in outputs {
            next.merge(&self.catalogue, &id, value)?;
            changed.insert(id);
        }
        let version = history.seal(next, Some(level))?;
        info!(
            contract = contract.id(),
            version,
            outputs = changed.len(),
            "interface contract executed"
        );
        Ok(ExecutionOutcome { version, changed })
    }
}
