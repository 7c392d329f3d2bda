use std::path::PathBuf;

use mre_model::ModelError;

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("data state is sealed and can not be modified")]
    Sealed,

    #[error("unknown level '{level}'")]
    UnknownLevel { level: String },

    #[error("project file was built against an incompatible catalogue: {message}")]
    IncompatibleCatalogue { message: String },

    #[error("failed to access project file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid project file: {message}")]
    Format { message: String },
}

impl StateError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, StateError>;
