pub mod connector;
pub mod contract;
pub mod error;
pub mod pipeline;
pub mod project;

pub use connector::{Connector, ContractStatus, ExecutionOutcome};
pub use contract::{ContractRegistry, InputSet, InterfaceContract, OutputMap};
pub use error::{CoreError, Result};
pub use pipeline::{Branch, BranchStatus, PipelineStage, StageGroup, Tree, VariableStatus};
pub use project::{
    AutoProvider, Engine, INPUT_LEVEL, MODULES_INITIAL_LEVEL, Project,
};
