//! Project handle and the engine surface callers drive.
//!
//! A [`Project`] owns its state history and pipeline position; the
//! [`Engine`] owns the catalogue, the contract registry and the tree, and
//! is the single place stage gates are checked. One logical writer per
//! project is assumed; the engine itself holds no locks.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info};

use mre_model::{Catalogue, StructuredValue, VariableDefinition};
use mre_state::StateHistory;

use crate::connector::{Connector, ContractStatus, ExecutionOutcome};
use crate::contract::{ContractRegistry, InterfaceContract};
use crate::error::{CoreError, Result};
use crate::pipeline::{Branch, BranchStatus, PipelineStage, StageGroup, Tree, VariableStatus};

/// Level tag sealed for user and auto-populated inputs.
pub const INPUT_LEVEL: &str = "input";

/// Checkpoint registered when the dataflow is initiated, marking the
/// pre-data-collection point modules can be reset to.
pub const MODULES_INITIAL_LEVEL: &str = "modules initial";

/// External data-source collaborator for branch auto-population.
///
/// Implementations resolve ready-made values (for example from a site
/// database); results pass through the same validated merge path as a
/// manual `set_value`.
pub trait AutoProvider {
    fn fetch(&self, ids: &[String]) -> anyhow::Result<BTreeMap<String, StructuredValue>>;
}

/// A single design project: one state history plus pipeline position.
#[derive(Debug)]
pub struct Project {
    title: String,
    history: StateHistory,
    stage: PipelineStage,
    active_modules: Vec<String>,
    active_themes: Vec<String>,
    completed_modules: Vec<String>,
    cursor: usize,
}

impl Project {
    fn new(title: impl Into<String>, history: StateHistory) -> Self {
        Self {
            title: title.into(),
            history,
            stage: PipelineStage::Unconfigured,
            active_modules: Vec::new(),
            active_themes: Vec::new(),
            completed_modules: Vec::new(),
            cursor: 0,
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn stage(&self) -> PipelineStage {
        self.stage
    }

    pub fn history(&self) -> &StateHistory {
        &self.history
    }

    /// Modules in user-declared activation order.
    pub fn active_modules(&self) -> &[String] {
        &self.active_modules
    }

    pub fn active_themes(&self) -> &[String] {
        &self.active_themes
    }

    pub fn completed_modules(&self) -> &[String] {
        &self.completed_modules
    }

    /// The next not-yet-executed module in the activation sequence.
    pub fn current_module(&self) -> Option<&str> {
        self.active_modules.get(self.cursor).map(String::as_str)
    }
}

/// The engine: catalogue, registry and tree behind the caller surface.
#[derive(Debug)]
pub struct Engine {
    catalogue: Arc<Catalogue>,
    registry: ContractRegistry,
    tree: Tree,
    connector: Connector,
}

impl Engine {
    /// Build an engine, verifying the tree against the catalogue and the
    /// registry up front.
    pub fn new(catalogue: Arc<Catalogue>, registry: ContractRegistry, tree: Tree) -> Result<Self> {
        tree.validate(&catalogue, &registry)?;
        let connector = Connector::new(Arc::clone(&catalogue));
        Ok(Self {
            catalogue,
            registry,
            tree,
            connector,
        })
    }

    pub fn catalogue(&self) -> &Catalogue {
        &self.catalogue
    }

    pub fn registry(&self) -> &ContractRegistry {
        &self.registry
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn connector(&self) -> &Connector {
        &self.connector
    }

    /// Fresh project with an empty history sealed at "initial".
    pub fn new_project(&self, title: &str) -> Project {
        info!(project = title, "new project created");
        Project::new(title, StateHistory::new(&self.catalogue))
    }

    /// Re-open a project from a loaded history.
    ///
    /// The pipeline position is not part of the persisted format; the
    /// caller re-declares activation before initiating the dataflow again.
    pub fn open_project(&self, title: &str, history: StateHistory) -> Project {
        info!(project = title, version = history.current_version(), "project opened");
        Project::new(title, history)
    }

    // ------------------------------------------------------------------
    // Variable read/write surface
    // ------------------------------------------------------------------

    /// Current value of a variable; `None` means not yet determined.
    pub fn get_value<'p>(
        &self,
        project: &'p Project,
        id: &str,
    ) -> Result<Option<&'p StructuredValue>> {
        self.catalogue.lookup(id)?;
        Ok(project.history.current().get(id))
    }

    /// Validate and merge a value, sealing a new version at the input
    /// level.
    pub fn set_value(
        &self,
        project: &mut Project,
        id: &str,
        value: StructuredValue,
    ) -> Result<u64> {
        let version =
            project
                .history
                .merge_value(&self.catalogue, id, value, Some(INPUT_LEVEL))?;
        Ok(version)
    }

    pub fn get_metadata(&self, id: &str) -> Result<&VariableDefinition> {
        Ok(self.catalogue.lookup(id)?)
    }

    /// Pull ready-made values from a collaborator and merge them through
    /// the standard validation path. All-or-nothing: one invalid entry
    /// rejects the whole batch.
    pub fn read_auto(
        &self,
        project: &mut Project,
        branch_name: &str,
        provider: &dyn AutoProvider,
    ) -> Result<u64> {
        let branch = self.tree.get(branch_name)?;
        self.read_auto_branch(project, branch, provider)
    }

    fn read_auto_branch(
        &self,
        project: &mut Project,
        branch: &Branch,
        provider: &dyn AutoProvider,
    ) -> Result<u64> {
        let origin = format!("auto: {}", branch.name());
        let fetched = provider
            .fetch(branch.variables())
            .map_err(|error| CoreError::Execution {
                contract_id: origin.clone(),
                source: error,
            })?;
        for (id, value) in &fetched {
            if !branch.variables().iter().any(|variable| variable == id) {
                return Err(CoreError::OutputValidation {
                    contract_id: origin.clone(),
                    id: id.clone(),
                    message: "id is not part of the branch".to_string(),
                });
            }
            self.catalogue
                .validate(id, value)
                .map_err(|e| CoreError::OutputValidation {
                    contract_id: origin.clone(),
                    id: id.clone(),
                    message: e.to_string(),
                })?;
        }
        if fetched.is_empty() {
            debug!(branch = branch.name(), "auto-population returned nothing");
            return Ok(project.history.current_version());
        }
        let count = fetched.len();
        let version =
            project
                .history
                .merge_values(&self.catalogue, fetched, Some(INPUT_LEVEL))?;
        info!(branch = branch.name(), count, version, "branch auto-populated");
        Ok(version)
    }

    /// Aggregated per-variable status of a branch.
    pub fn get_input_status(&self, project: &Project, branch_name: &str) -> Result<BranchStatus> {
        let branch = self.tree.get(branch_name)?;
        let state = project.history.current();
        let contract = branch.contract_id().and_then(|id| self.registry.get(id));
        let mut variables = BTreeMap::new();
        for id in branch.variables() {
            let status = if state.contains(id) {
                VariableStatus::Satisfied
            } else if contract
                .map(|c| c.required().iter().any(|required| required == id))
                .unwrap_or(false)
            {
                VariableStatus::Required
            } else if contract
                .map(|c| c.optional().iter().any(|optional| optional == id))
                .unwrap_or(false)
            {
                VariableStatus::Optional
            } else {
                VariableStatus::Unavailable
            };
            variables.insert(id.clone(), status);
        }
        Ok(BranchStatus {
            branch: branch.name().to_string(),
            variables,
            contract: contract.map(|c| self.connector.status(c, state)),
        })
    }

    /// Status of an activatable module against the current state.
    pub fn module_status(&self, project: &Project, name: &str) -> Result<ContractStatus> {
        let contract = self.module_contract(name)?;
        Ok(self.connector.status(contract, project.history.current()))
    }

    // ------------------------------------------------------------------
    // Activation
    // ------------------------------------------------------------------

    /// Module-stage contracts not yet activated, in tree order.
    pub fn list_available_modules(&self, project: &Project) -> Vec<&str> {
        self.tree
            .in_stage(StageGroup::Modules)
            .filter_map(Branch::contract_id)
            .filter(|id| !project.active_modules.iter().any(|active| active == id))
            .collect()
    }

    /// Theme-stage contracts not yet activated, in tree order.
    pub fn list_available_themes(&self, project: &Project) -> Vec<&str> {
        self.tree
            .in_stage(StageGroup::Themes)
            .filter_map(Branch::contract_id)
            .filter(|id| !project.active_themes.iter().any(|active| active == id))
            .collect()
    }

    /// Append a module to the activation sequence.
    pub fn activate_module(&self, project: &mut Project, name: &str) -> Result<()> {
        self.ensure_activation_open(project)?;
        let contract = self.module_contract(name)?;
        if project.active_modules.iter().any(|active| active == name) {
            return Err(CoreError::ModuleConflict {
                name: name.to_string(),
                message: "module is already active".to_string(),
            });
        }
        if let Some(family) = contract.family() {
            for active in &project.active_modules {
                if let Some(other) = self.registry.get(active).and_then(InterfaceContract::family)
                    && other != family
                {
                    return Err(CoreError::ModuleConflict {
                        name: name.to_string(),
                        message: format!(
                            "device family '{family}' is incompatible with active module \
                             '{active}' ('{other}')"
                        ),
                    });
                }
            }
        }
        project.active_modules.push(name.to_string());
        info!(module = name, "module activated");
        Ok(())
    }

    /// Append a theme to the activation sequence.
    pub fn activate_theme(&self, project: &mut Project, name: &str) -> Result<()> {
        self.ensure_activation_open(project)?;
        self.theme_contract(name)?;
        if project.active_themes.iter().any(|active| active == name) {
            return Err(CoreError::ModuleConflict {
                name: name.to_string(),
                message: "theme is already active".to_string(),
            });
        }
        project.active_themes.push(name.to_string());
        info!(theme = name, "theme activated");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Stage transitions
    // ------------------------------------------------------------------

    /// One-way gate: run the Options-stage contracts and open activation.
    pub fn initiate_pipeline(&self, project: &mut Project) -> Result<()> {
        if project.stage != PipelineStage::Unconfigured {
            return Err(CoreError::PipelineLocked {
                message: format!("pipeline already initiated (stage: {})", project.stage),
            });
        }
        for branch in self.tree.in_stage(StageGroup::Options) {
            if let Some(contract_id) = branch.contract_id() {
                let contract = self.contract(contract_id)?;
                self.connector.execute(contract, &mut project.history)?;
            }
        }
        project.stage = PipelineStage::PipelineInitiated;
        info!(project = project.title(), "pipeline initiated");
        Ok(())
    }

    /// Auto-populate and run the Filtering-stage contracts.
    pub fn initiate_filter(
        &self,
        project: &mut Project,
        provider: &dyn AutoProvider,
    ) -> Result<()> {
        if project.stage != PipelineStage::PipelineInitiated {
            return Err(CoreError::PipelineLocked {
                message: format!(
                    "filtering requires an initiated, unfrozen pipeline (stage: {})",
                    project.stage
                ),
            });
        }
        for branch in self.tree.in_stage(StageGroup::Filtering) {
            self.read_auto_branch(project, branch, provider)?;
            if let Some(contract_id) = branch.contract_id() {
                let contract = self.contract(contract_id)?;
                self.connector.execute(contract, &mut project.history)?;
            }
        }
        Ok(())
    }

    /// One-way gate: freeze activation and checkpoint the
    /// pre-data-collection point.
    pub fn initiate_dataflow(&self, project: &mut Project) -> Result<()> {
        match project.stage {
            PipelineStage::PipelineInitiated => {}
            PipelineStage::Unconfigured => {
                return Err(CoreError::PipelineLocked {
                    message: "pipeline has not been initiated".to_string(),
                });
            }
            PipelineStage::DataflowInitiated | PipelineStage::Executing => {
                return Err(CoreError::PipelineLocked {
                    message: "dataflow already initiated".to_string(),
                });
            }
        }
        project.stage = PipelineStage::DataflowInitiated;
        project.history.checkpoint(MODULES_INITIAL_LEVEL);
        info!(project = project.title(), "dataflow initiated");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Execution
    // ------------------------------------------------------------------

    /// Execute the next module in the activation sequence, then
    /// auto-execute every satisfied active theme on its outputs.
    ///
    /// The cursor advances only on success; a blocked module fails with
    /// the precise missing-input list and the history stays unmodified.
    pub fn execute_current(&self, project: &mut Project) -> Result<ExecutionOutcome> {
        self.ensure_dataflow_open(project)?;
        let Some(name) = project.current_module().map(str::to_string) else {
            return Err(CoreError::NoModuleScheduled);
        };
        let contract = self.contract(&name)?;
        let outcome = self.connector.execute(contract, &mut project.history)?;
        project.stage = PipelineStage::Executing;
        project.cursor += 1;
        project.completed_modules.push(name.clone());

        for theme in project.active_themes.clone() {
            let theme_contract = self.contract(&theme)?;
            match self
                .connector
                .status(theme_contract, project.history.current())
            {
                ContractStatus::Satisfied => {
                    let level = format!("{name} {theme} output");
                    self.connector
                        .execute_at_level(theme_contract, &mut project.history, &level)?;
                }
                ContractStatus::Blocked { missing } => {
                    debug!(theme = %theme, ?missing, "theme skipped, inputs not satisfied");
                }
            }
        }
        Ok(outcome)
    }

    /// Run every satisfied active theme against the current state.
    /// Unsatisfied themes are skipped.
    pub fn execute_themes(&self, project: &mut Project) -> Result<Vec<ExecutionOutcome>> {
        self.ensure_dataflow_open(project)?;
        let mut outcomes = Vec::new();
        for theme in project.active_themes.clone() {
            let contract = self.contract(&theme)?;
            match self.connector.status(contract, project.history.current()) {
                ContractStatus::Satisfied => {
                    outcomes.push(self.connector.execute(contract, &mut project.history)?);
                }
                ContractStatus::Blocked { missing } => {
                    debug!(theme = %theme, ?missing, "theme skipped, inputs not satisfied");
                }
            }
        }
        Ok(outcomes)
    }

    /// Rewind the project to a checkpointed level.
    ///
    /// Rewinding to the modules-initial checkpoint re-opens the whole
    /// activation sequence for execution; rewinding to a module's own
    /// output level positions the cursor just after that module.
    pub fn reset_level(&self, project: &mut Project, level: &str, preserve: bool) -> Result<u64> {
        let version = project.history.rewind(level, preserve)?;
        if level == MODULES_INITIAL_LEVEL {
            project.cursor = 0;
            project.completed_modules.clear();
            if project.stage == PipelineStage::Executing {
                project.stage = PipelineStage::DataflowInitiated;
            }
        } else if let Some(position) = project
            .active_modules
            .iter()
            .position(|module| module == level)
        {
            project.cursor = position + 1;
            project.completed_modules.truncate(position + 1);
        }
        info!(level, preserve, version, "project reset to level");
        Ok(version)
    }

    // ------------------------------------------------------------------
    // Lookups and gates
    // ------------------------------------------------------------------

    fn contract(&self, id: &str) -> Result<&InterfaceContract> {
        self.registry.get(id).ok_or_else(|| CoreError::UnknownModule {
            name: id.to_string(),
        })
    }

    fn module_contract(&self, name: &str) -> Result<&InterfaceContract> {
        let bound = self
            .tree
            .in_stage(StageGroup::Modules)
            .filter_map(Branch::contract_id)
            .any(|contract_id| contract_id == name);
        if !bound {
            return Err(CoreError::UnknownModule {
                name: name.to_string(),
            });
        }
        self.contract(name)
    }

    fn theme_contract(&self, name: &str) -> Result<&InterfaceContract> {
        let bound = self
            .tree
            .in_stage(StageGroup::Themes)
            .filter_map(Branch::contract_id)
            .any(|contract_id| contract_id == name);
        if !bound {
            return Err(CoreError::UnknownTheme {
                name: name.to_string(),
            });
        }
        self.registry.get(name).ok_or_else(|| CoreError::UnknownTheme {
            name: name.to_string(),
        })
    }

    fn ensure_activation_open(&self, project: &Project) -> Result<()> {
        match project.stage {
            PipelineStage::PipelineInitiated => Ok(()),
            PipelineStage::Unconfigured => Err(CoreError::PipelineLocked {
                message: "pipeline has not been initiated".to_string(),
            }),
            PipelineStage::DataflowInitiated | PipelineStage::Executing => {
                Err(CoreError::PipelineLocked {
                    message: "activation is frozen once the dataflow is initiated".to_string(),
                })
            }
        }
    }

    fn ensure_dataflow_open(&self, project: &Project) -> Result<()> {
        match project.stage {
            PipelineStage::DataflowInitiated | PipelineStage::Executing => Ok(()),
            _ => Err(CoreError::PipelineLocked {
                message: "dataflow has not been initiated".to_string(),
            }),
        }
    }
}
