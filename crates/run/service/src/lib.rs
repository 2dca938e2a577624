//! Run Service
//!
//! Lifecycle control for workflow runs. A [`RunService`] keeps a registry of
//! [`Run`]s; each run couples a report tree from `run-report` with one
//! execution on a pluggable [`ExecutionEnvironment`].
//!
//! # Lifecycle
//!
//! | Call     | Root state required          |
//! |----------|------------------------------|
//! | `start`  | `CREATED`                    |
//! | `pause`  | `RUNNING`                    |
//! | `resume` | `PAUSED`                     |
//! | `cancel` | not terminal                 |
//! | `delete` | any                          |
//!
//! A call either reaches the backend and advances the report, or fails and
//! leaves the report untouched. Accepted calls are published as
//! [`RunEvent`]s.
//!
//! # Example
//!
//! ```rust,no_run
//! use run_service::local::{InMemoryDataStore, LocalExecutionEnvironment};
//! use run_service::{RunProfile, RunService};
//! use run_types::{DataBundle, WorkflowBundle};
//! use std::sync::Arc;
//!
//! # async fn example(bundle: WorkflowBundle) -> run_service::RunResult<()> {
//! let service = RunService::with_defaults();
//! let env = Arc::new(LocalExecutionEnvironment::new(Arc::new(InMemoryDataStore::new())));
//! let run_id = service
//!     .create_run(
//!         RunProfile::new(bundle)
//!             .with_data_bundle(DataBundle::new("/tmp/run-1"))
//!             .with_environment(env),
//!     )
//!     .await?;
//! service.start(run_id.as_str()).await?;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]

pub mod collaborators;
pub mod config;
pub mod errors;
pub mod events;
pub mod local;
pub mod logging;
pub mod run;
pub mod service;

pub use collaborators::{
    DataStore, ExecutableGraph, ExecutableStep, ExecutionEnvironment, ExecutionRequest,
    WorkflowCompiler,
};
pub use config::{EventConfig, LoggingConfig, PersistenceConfig, RunServiceConfig};
pub use errors::{
    CompileError, ConfigurationError, DataError, ExecutionError, RunError, RunResult,
};
pub use events::{RunEvent, RunEventBus, RunEventEnvelope};
pub use run::{Run, RunProfile};
pub use service::{RunManifest, RunService};
