pub mod error;
pub mod history;
pub mod persist;
pub mod state;

pub use error::{Result, StateError};
pub use history::{INITIAL_LEVEL, StateHistory};
pub use persist::{
    CURRENT_SCHEMA_VERSION, ProjectFile, StateSnapshot, from_project_file, load_history,
    save_history, to_project_file,
};
pub use state::DataState;
