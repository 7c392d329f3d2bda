//! Pipeline structure: stages, branches and the tree.
//!
//! The macro-structure of a project is fixed: Options, then Filtering, then
//! Modules, then Themes. Branches group the variables presented together at
//! each stage and bind at most one interface contract. Stage transitions
//! are modelled as an explicit finite-state machine; the transition methods
//! on the engine are the only places gate checks happen.

use std::collections::BTreeMap;
use std::fmt;

use mre_model::Catalogue;

use crate::connector::ContractStatus;
use crate::contract::ContractRegistry;
use crate::error::{CoreError, Result};

/// Lifecycle of a project's pipeline.
///
/// Transitions are one-way: Unconfigured → PipelineInitiated →
/// DataflowInitiated → Executing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Unconfigured,
    PipelineInitiated,
    DataflowInitiated,
    Executing,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Unconfigured => "unconfigured",
            PipelineStage::PipelineInitiated => "pipeline initiated",
            PipelineStage::DataflowInitiated => "dataflow initiated",
            PipelineStage::Executing => "executing",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Fixed stage groups of the pipeline tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum StageGroup {
    Options,
    Filtering,
    Modules,
    Themes,
}

impl StageGroup {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageGroup::Options => "options",
            StageGroup::Filtering => "filtering",
            StageGroup::Modules => "modules",
            StageGroup::Themes => "themes",
        }
    }
}

impl fmt::Display for StageGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Named grouping of variables, bound to zero-or-one contract.
#[derive(Debug, Clone)]
pub struct Branch {
    name: String,
    stage: StageGroup,
    variables: Vec<String>,
    contract_id: Option<String>,
}

impl Branch {
    pub fn new(name: impl Into<String>, stage: StageGroup) -> Self {
        Self {
            name: name.into(),
            stage,
            variables: Vec::new(),
            contract_id: None,
        }
    }

    pub fn with_variables(mut self, ids: &[&str]) -> Self {
        self.variables = ids.iter().map(|id| (*id).to_string()).collect();
        self
    }

    /// Bind the branch to an interface contract.
    pub fn bind(mut self, contract_id: impl Into<String>) -> Self {
        self.contract_id = Some(contract_id.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stage(&self) -> StageGroup {
        self.stage
    }

    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    pub fn contract_id(&self) -> Option<&str> {
        self.contract_id.as_deref()
    }
}

/// The fixed pipeline tree: branches in stage order.
#[derive(Debug, Clone, Default)]
pub struct Tree {
    branches: Vec<Branch>,
    index: BTreeMap<String, usize>,
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a branch. Branch names are unique across stages.
    pub fn add_branch(&mut self, branch: Branch) -> Result<()> {
        if self.index.contains_key(branch.name()) {
            return Err(CoreError::DuplicateBranch {
                name: branch.name().to_string(),
            });
        }
        self.index
            .insert(branch.name().to_string(), self.branches.len());
        self.branches.push(branch);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&Branch> {
        self.index
            .get(name)
            .map(|&position| &self.branches[position])
            .ok_or_else(|| CoreError::UnknownBranch {
                name: name.to_string(),
            })
    }

    pub fn branches(&self) -> &[Branch] {
        &self.branches
    }

    /// Branches of one stage, in insertion order.
    pub fn in_stage(&self, stage: StageGroup) -> impl Iterator<Item = &Branch> {
        self.branches
            .iter()
            .filter(move |branch| branch.stage() == stage)
    }

    pub fn branch_for_contract(&self, contract_id: &str) -> Option<&Branch> {
        self.branches
            .iter()
            .find(|branch| branch.contract_id() == Some(contract_id))
    }

    /// Check that every branch variable exists in the catalogue and every
    /// bound contract is registered. Run once at engine construction.
    pub fn validate(&self, catalogue: &Catalogue, registry: &ContractRegistry) -> Result<()> {
        for branch in &self.branches {
            for id in branch.variables() {
                catalogue.lookup(id)?;
            }
            if let Some(contract_id) = branch.contract_id()
                && !registry.contains(contract_id)
            {
                return Err(CoreError::UnknownModule {
                    name: contract_id.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Per-variable input state of a branch, for UI and CLI consumption.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableStatus {
    /// A value is present in the current state.
    Satisfied,
    /// Absent and required by the branch's contract.
    Required,
    /// Absent and optional for the branch's contract.
    Optional,
    /// Absent and not consumed by the branch's contract.
    Unavailable,
}

/// Aggregated input status of one branch.
#[derive(Debug, Clone)]
pub struct BranchStatus {
    pub branch: String,
    pub variables: BTreeMap<String, VariableStatus>,
    /// Overall status of the bound contract, if the branch has one.
    pub contract: Option<ContractStatus>,
}

impl BranchStatus {
    pub fn is_satisfied(&self) -> bool {
        self.contract
            .as_ref()
            .map(ContractStatus::is_satisfied)
            .unwrap_or(true)
    }
}
