//! Error types for report construction and persistence

use run_types::SubjectKind;

/// Errors raised while building or mutating a report tree
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("Duplicate invocation '{id}' under {report}")]
    DuplicateInvocation { report: String, id: String },

    #[error("Port '{port}' is not declared by {subject}")]
    UnknownPort { subject: String, port: String },

    #[error("Nested workflow not found in bundle: {0}")]
    UnknownNestedWorkflow(String),

    #[error("Workflow nests itself: {0}")]
    RecursiveWorkflow(String),

    #[error("Report parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Report serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while loading a persisted report document.
///
/// Variants carry the offending field and raw value.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Malformed report document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error reading report: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid date in field '{field}': {value:?}")]
    InvalidDate { field: String, value: String },

    #[error("Unknown state literal in field '{field}': {value:?}")]
    UnknownState { field: String, value: String },

    #[error("Invocation '{invocation}' has non-invocation state {value:?}")]
    InvalidInvocationState { invocation: String, value: String },

    #[error("Subject URI does not resolve against the workflow bundle: {uri}")]
    UnresolvedSubject { uri: String },

    #[error("Subject {uri} is a {found}, expected a {expected}")]
    SubjectKindMismatch {
        uri: String,
        expected: SubjectKind,
        found: SubjectKind,
    },

    #[error("Invocation '{invocation}' binds undeclared port '{port}'")]
    UnknownPort { invocation: String, port: String },

    #[error("Invocation '{invocation}' names unknown parent '{parent}'")]
    UnknownParentInvocation { invocation: String, parent: String },

    #[error("Invocation id {found:?} does not match its parent chain ({expected:?})")]
    InvocationIdMismatch { expected: String, found: String },

    #[error("Duplicate invocation id: {0}")]
    DuplicateInvocation(String),

    #[error("Invalid data path for invocation '{invocation}' port '{port}': {value:?}")]
    InvalidDataPath {
        invocation: String,
        port: String,
        value: String,
    },
}

/// Result type alias for report operations
pub type ReportResult<T> = Result<T, ReportError>;
