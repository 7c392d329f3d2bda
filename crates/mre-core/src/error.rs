use mre_model::ModelError;
use mre_state::StateError;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error("unknown module '{name}'")]
    UnknownModule { name: String },

    #[error("unknown theme '{name}'")]
    UnknownTheme { name: String },

    #[error("unknown branch '{name}'")]
    UnknownBranch { name: String },

    #[error("branch '{name}' is already defined")]
    DuplicateBranch { name: String },

    #[error("interface contract '{id}' is already registered")]
    DuplicateContract { id: String },

    #[error("module '{name}' can not be activated: {message}")]
    ModuleConflict { name: String, message: String },

    #[error("interface '{contract_id}' is not executable; missing or invalid inputs: {}", .missing.join(", "))]
    NotExecutable {
        contract_id: String,
        missing: Vec<String>,
    },

    #[error("execution of '{contract_id}' failed: {source}")]
    Execution {
        contract_id: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("interface '{contract_id}' produced an invalid value for '{id}': {message}")]
    OutputValidation {
        contract_id: String,
        id: String,
        message: String,
    },

    #[error("pipeline is locked: {message}")]
    PipelineLocked { message: String },

    #[error("no module is scheduled for execution")]
    NoModuleScheduled,
}

pub type Result<T> = std::result::Result<T, CoreError>;
