//! Error types for run lifecycle control

use run_report::{ParseError, ReportError};
use run_types::{DataPath, ExecutionId, ModelError, RunId, State, Transition};

/// Errors surfaced by [`RunService`](crate::RunService) and [`Run`](crate::Run)
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("Invalid run id: {0}")]
    InvalidRunId(String),

    #[error("Cannot {transition} run {run_id} while it is {state}")]
    InvalidTransition {
        run_id: RunId,
        state: State,
        transition: Transition,
    },

    #[error("Run {0} was opened from a saved report and cannot be controlled")]
    ReadOnly(RunId),

    #[error("Run configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Report error: {0}")]
    Report(#[from] ReportError),

    #[error("Report parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Manifest error: {0}")]
    Manifest(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RunError {
    pub fn is_invalid_run_id(&self) -> bool {
        matches!(self, Self::InvalidRunId(_))
    }

    pub fn is_invalid_transition(&self) -> bool {
        matches!(self, Self::InvalidTransition { .. })
    }
}

/// A run could not be assembled from its profile
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("No workflow specified and the bundle has no main workflow")]
    MissingWorkflow,

    #[error("Workflow not found in bundle: {0}")]
    UnknownWorkflow(String),

    #[error("No profile specified and the bundle has no main profile")]
    MissingProfile,

    #[error("Profile not found in bundle: {0}")]
    UnknownProfile(String),

    #[error("No input data bundle specified")]
    MissingInputData,

    #[error("No execution environment specified")]
    MissingExecutionEnvironment,

    #[error("Workflow failed to compile: {0}")]
    Compile(#[from] CompileError),

    #[error("Invalid workflow model: {0}")]
    Model(#[from] ModelError),
}

/// Raised by a [`WorkflowCompiler`](crate::WorkflowCompiler)
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("Data link {link} in workflow '{workflow}' references an undeclared port")]
    DanglingLink { workflow: String, link: String },

    #[error("Workflow '{workflow}' has a dependency cycle through processor '{processor}'")]
    Cycle { workflow: String, processor: String },

    #[error("Processor '{processor}' of workflow '{workflow}' is not bound to any activity")]
    UnboundProcessor { workflow: String, processor: String },

    #[error("Nested workflow not found in bundle: {0}")]
    UnknownNestedWorkflow(String),

    #[error("Workflow nests itself: {0}")]
    RecursiveWorkflow(String),
}

/// Raised by an [`ExecutionEnvironment`](crate::ExecutionEnvironment) or
/// while running an activity
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("Unknown execution: {0}")]
    UnknownExecution(ExecutionId),

    #[error("Execution {0} was already started")]
    AlreadyStarted(ExecutionId),

    #[error("Execution cancelled")]
    Cancelled,

    #[error("No implementation registered for activity type {0}")]
    UnknownActivityType(String),

    #[error("Activity '{activity}' failed: {message}")]
    ActivityFailed { activity: String, message: String },

    #[error("No value for input port '{port}'")]
    MissingInput { port: String },

    #[error("Report error: {0}")]
    Report(#[from] ReportError),

    #[error("Data error: {0}")]
    Data(#[from] DataError),

    #[error("Backend error: {0}")]
    Backend(String),
}

/// Raised by a [`DataStore`](crate::DataStore)
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    #[error("No value at {0}")]
    NotFound(DataPath),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed value: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for run operations
pub type RunResult<T> = Result<T, RunError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds_distinguishable() {
        let unknown = RunError::InvalidRunId("does-not-exist".into());
        assert!(unknown.is_invalid_run_id());
        assert!(!unknown.is_invalid_transition());

        let transition = RunError::InvalidTransition {
            run_id: RunId::new("r1"),
            state: State::Created,
            transition: Transition::Pause,
        };
        assert!(transition.is_invalid_transition());
        assert!(!transition.is_invalid_run_id());
        assert_eq!(transition.to_string(), "Cannot pause run r1 while it is CREATED");
    }

    #[test]
    fn test_configuration_error_wraps_compile_error() {
        let err: RunError =
            ConfigurationError::from(CompileError::RecursiveWorkflow("wf".into())).into();
        assert!(matches!(
            err,
            RunError::Configuration(ConfigurationError::Compile(CompileError::RecursiveWorkflow(_)))
        ));
    }
}
