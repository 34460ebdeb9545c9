use thiserror::Error;

/// Synchronous rejection of a build request.
///
/// Raised before anything is enqueued; a request that fails validation never
/// becomes a job.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("uploaded file '{file_name}' is not a Dockerfile")]
    NotADockerfile { file_name: String },

    #[error("could not read '{which}': {reason}")]
    UnreadableInput { which: String, reason: String },

    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    #[error("invalid {field} '{value}': {reason}")]
    InvalidName {
        field: &'static str,
        value: String,
        reason: &'static str,
    },

    #[error("invalid tag '{tag}': {reason}")]
    InvalidTag { tag: String, reason: String },

    #[error("Dockerfile is empty")]
    EmptyDockerfile,

    #[error("invalid file name '{name}': {reason}")]
    InvalidFileName { name: String, reason: &'static str },

    #[error("file name '{0}' collides with the Dockerfile")]
    ReservedFileName(String),

    #[error("file '{0}' was uploaded more than once")]
    DuplicateFileName(String),
}

impl ValidationError {
    /// Name of the input the error is about, for response bodies and logs.
    pub fn subject(&self) -> &str {
        match self {
            ValidationError::NotADockerfile { file_name } => file_name,
            ValidationError::UnreadableInput { which, .. } => which,
            ValidationError::MissingField(field) => field,
            ValidationError::InvalidName { field, .. } => field,
            ValidationError::InvalidTag { .. } => "tag",
            ValidationError::EmptyDockerfile => "dockerfile",
            ValidationError::InvalidFileName { name, .. } => name,
            ValidationError::ReservedFileName(name) => name,
            ValidationError::DuplicateFileName(name) => name,
        }
    }
}

pub type Result<T> = std::result::Result<T, ValidationError>;
