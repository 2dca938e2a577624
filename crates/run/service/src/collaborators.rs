//! Interfaces of the services a run depends on
//!
//! - [`WorkflowCompiler`] turns a workflow and profile into an
//!   [`ExecutableGraph`]
//! - [`ExecutionEnvironment`] runs a graph and pushes progress straight into
//!   the run's [`WorkflowReport`]
//! - [`DataStore`] holds input, intermediate and output values

use crate::errors::{CompileError, DataError, ExecutionError};
use async_trait::async_trait;
use run_report::WorkflowReport;
use run_types::{DataBundle, DataPath, ExecutionId, Profile, Workflow, WorkflowBundle};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

// ── Compilation ──────────────────────────────────────────────────────

/// One processor of a compiled workflow
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutableStep {
    pub processor: String,
    /// Bound activities, tried in order
    pub activities: Vec<String>,
}

/// A workflow compiled for execution
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutableGraph {
    pub workflow: String,
    pub profile: String,
    /// Processors in dependency order
    pub steps: Vec<ExecutableStep>,
    /// Graphs of nested workflows, keyed by workflow name
    #[serde(default)]
    pub nested: BTreeMap<String, ExecutableGraph>,
}

impl ExecutableGraph {
    pub fn step(&self, processor: &str) -> Option<&ExecutableStep> {
        self.steps.iter().find(|s| s.processor == processor)
    }
}

/// Compiles workflows into executable graphs
pub trait WorkflowCompiler: Send + Sync {
    fn compile(
        &self,
        bundle: &WorkflowBundle,
        workflow: &Workflow,
        profile: &Profile,
    ) -> Result<ExecutableGraph, CompileError>;

    fn name(&self) -> &str;
}

// ── Execution ────────────────────────────────────────────────────────

/// Everything a backend needs to run one workflow
#[derive(Clone)]
pub struct ExecutionRequest {
    pub graph: ExecutableGraph,
    pub bundle: Arc<WorkflowBundle>,
    pub workflow: String,
    pub profile: String,
    pub data_bundle: DataBundle,
    /// Report tree the backend records progress into
    pub report: WorkflowReport,
}

/// An execution backend.
///
/// Implementations record state changes, invocations and job counters into
/// the request's report as work progresses.
#[async_trait]
pub trait ExecutionEnvironment: Send + Sync {
    fn name(&self) -> &str;

    async fn create_execution(&self, request: ExecutionRequest)
        -> Result<ExecutionId, ExecutionError>;

    async fn start(&self, execution: &ExecutionId) -> Result<(), ExecutionError>;

    async fn pause(&self, execution: &ExecutionId) -> Result<(), ExecutionError>;

    async fn resume(&self, execution: &ExecutionId) -> Result<(), ExecutionError>;

    async fn cancel(&self, execution: &ExecutionId) -> Result<(), ExecutionError>;

    async fn delete(&self, execution: &ExecutionId) -> Result<(), ExecutionError>;
}

// ── Data ─────────────────────────────────────────────────────────────

/// Value storage addressed by data bundle and relative path
pub trait DataStore: Send + Sync {
    /// Locator of the named workflow input within `bundle`
    fn locator(&self, bundle: &DataBundle, port: &str) -> DataPath {
        let _ = bundle;
        DataPath::input(port)
    }

    fn read_value(&self, bundle: &DataBundle, path: &DataPath) -> Result<Value, DataError>;

    fn write_value(
        &self,
        bundle: &DataBundle,
        path: &DataPath,
        value: Value,
    ) -> Result<(), DataError>;
}
