//! Error types for the run-status domain model

/// Errors raised while building or querying the workflow model
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("Invalid name: {0:?}")]
    InvalidName(String),

    #[error("Duplicate workflow: {0}")]
    DuplicateWorkflow(String),

    #[error("Duplicate profile: {0}")]
    DuplicateProfile(String),

    #[error("Duplicate processor '{processor}' in workflow '{workflow}'")]
    DuplicateProcessor { workflow: String, processor: String },

    #[error("Duplicate activity '{activity}' in profile '{profile}'")]
    DuplicateActivity { profile: String, activity: String },

    #[error("Duplicate port: {0}")]
    DuplicatePort(String),

    #[error("Workflow not found: {0}")]
    UnknownWorkflow(String),

    #[error("Profile not found: {0}")]
    UnknownProfile(String),

    #[error("Unknown state literal: {0:?}")]
    UnknownState(String),

    #[error("Invalid data path: {0:?}")]
    InvalidDataPath(String),
}

/// Result type alias for model operations
pub type ModelResult<T> = Result<T, ModelError>;
