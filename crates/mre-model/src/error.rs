use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("variable '{id}' is already defined in the catalogue")]
    DuplicateDefinition { id: String },

    #[error("unknown variable '{id}'")]
    UnknownVariable { id: String },

    #[error("invalid value for '{id}': {message}")]
    Validation { id: String, message: String },

    #[error("malformed value: {message}")]
    Shape { message: String },

    #[error("failed to encode value: {message}")]
    Encode { message: String },

    #[error("failed to decode value: {message}")]
    Decode { message: String },
}

pub type Result<T> = std::result::Result<T, ModelError>;
