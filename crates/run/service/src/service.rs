//! Run Service - registry of runs and the lifecycle API over them
//!
//! All calls are indexed by [`RunId`]. An unknown id is always
//! [`RunError::InvalidRunId`], distinct from the precondition failures a
//! [`Run`] reports itself.

use crate::collaborators::WorkflowCompiler;
use crate::config::RunServiceConfig;
use crate::errors::{RunError, RunResult};
use crate::events::{RunEvent, RunEventBus, RunEventEnvelope};
use crate::local::SequentialCompiler;
use crate::run::{Run, RunProfile};
use dashmap::DashMap;
use run_report::{ReportSerializer, WorkflowReport};
use run_types::{DataBundle, RunId, State, WorkflowBundle};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, instrument, warn};

/// Companion file of a saved report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunManifest {
    pub workflow: String,
    pub profile: String,
}

/// Registry of runs
pub struct RunService {
    runs: DashMap<RunId, Arc<Run>>,
    compiler: Arc<dyn WorkflowCompiler>,
    events: RunEventBus,
    config: RunServiceConfig,
}

impl RunService {
    pub fn new(compiler: Arc<dyn WorkflowCompiler>, config: RunServiceConfig) -> Self {
        let events = RunEventBus::new(config.events.channel_capacity);
        Self {
            runs: DashMap::new(),
            compiler,
            events,
            config,
        }
    }

    /// Service using the [`SequentialCompiler`] and default configuration
    pub fn with_defaults() -> Self {
        Self::new(Arc::new(SequentialCompiler::new()), RunServiceConfig::default())
    }

    pub fn config(&self) -> &RunServiceConfig {
        &self.config
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<RunEventEnvelope> {
        self.events.subscribe()
    }

    fn run(&self, run_id: &str) -> RunResult<Arc<Run>> {
        self.runs
            .get(&RunId::from(run_id))
            .map(|r| r.value().clone())
            .ok_or_else(|| RunError::InvalidRunId(run_id.to_string()))
    }

    /// Create and register a run. Nothing is registered if creation fails.
    #[instrument(skip(self, profile), fields(bundle = %profile.bundle.name))]
    pub async fn create_run(&self, profile: RunProfile) -> RunResult<RunId> {
        let id = RunId::generate();
        let run = Run::create(id.clone(), profile, self.compiler.as_ref()).await?;
        info!(run_id = %id, workflow = run.workflow_name(), "Run created");
        self.runs.insert(id.clone(), Arc::new(run));
        self.events.publish(RunEvent::Created { run_id: id.clone() });
        Ok(id)
    }

    #[instrument(skip(self))]
    pub async fn start(&self, run_id: &str) -> RunResult<()> {
        let run = self.run(run_id)?;
        run.start().await?;
        self.events.publish(RunEvent::Started {
            run_id: run.id().clone(),
        });
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn pause(&self, run_id: &str) -> RunResult<()> {
        let run = self.run(run_id)?;
        run.pause().await?;
        self.events.publish(RunEvent::Paused {
            run_id: run.id().clone(),
        });
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn resume(&self, run_id: &str) -> RunResult<()> {
        let run = self.run(run_id)?;
        run.resume().await?;
        self.events.publish(RunEvent::Resumed {
            run_id: run.id().clone(),
        });
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn cancel(&self, run_id: &str) -> RunResult<()> {
        let run = self.run(run_id)?;
        run.cancel().await?;
        self.events.publish(RunEvent::Cancelled {
            run_id: run.id().clone(),
        });
        Ok(())
    }

    /// Release the run's backend execution and drop it from the registry
    #[instrument(skip(self))]
    pub async fn delete(&self, run_id: &str) -> RunResult<()> {
        // Unregister first so a concurrent delete of the same id sees it gone
        let (id, run) = self
            .runs
            .remove(&RunId::from(run_id))
            .ok_or_else(|| RunError::InvalidRunId(run_id.to_string()))?;
        if let Err(e) = run.delete().await {
            self.runs.insert(id, run);
            return Err(e);
        }
        info!(run_id = %run.id(), "Run deleted");
        self.events.publish(RunEvent::Deleted {
            run_id: run.id().clone(),
        });
        Ok(())
    }

    pub fn get_state(&self, run_id: &str) -> RunResult<State> {
        Ok(self.run(run_id)?.state())
    }

    pub fn get_workflow_report(&self, run_id: &str) -> RunResult<WorkflowReport> {
        Ok(self.run(run_id)?.report().clone())
    }

    pub fn get_run(&self, run_id: &str) -> RunResult<Arc<Run>> {
        self.run(run_id)
    }

    /// Registered run ids, oldest first
    pub fn list_runs(&self) -> Vec<RunId> {
        let mut ids: Vec<RunId> = self.runs.iter().map(|r| r.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn run_count(&self) -> usize {
        self.runs.len()
    }

    /// Write the run's report and manifest into `dir`
    #[instrument(skip(self, dir), fields(dir = %dir.as_ref().display()))]
    pub fn save(&self, run_id: &str, dir: impl AsRef<Path>) -> RunResult<()> {
        let run = self.run(run_id)?;
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;

        let persistence = &self.config.persistence;
        ReportSerializer::new().save(run.report(), dir.join(&persistence.report_file_name))?;
        let manifest = RunManifest {
            workflow: run.workflow_name().to_string(),
            profile: run.profile_name().to_string(),
        };
        std::fs::write(
            dir.join(&persistence.manifest_file_name),
            serde_json::to_vec_pretty(&manifest)?,
        )?;
        info!(run_id = %run.id(), "Run saved");
        Ok(())
    }

    /// Register a saved run for inspection under a fresh id.
    ///
    /// Invocation paths resolve against `dir`. The run has no backend, so
    /// lifecycle calls other than delete fail with [`RunError::ReadOnly`].
    #[instrument(skip(self, bundle, dir), fields(dir = %dir.as_ref().display()))]
    pub fn open(&self, bundle: Arc<WorkflowBundle>, dir: impl AsRef<Path>) -> RunResult<RunId> {
        let dir = dir.as_ref();
        let persistence = &self.config.persistence;

        let manifest: RunManifest =
            serde_json::from_slice(&std::fs::read(dir.join(&persistence.manifest_file_name))?)?;
        let data_bundle = DataBundle::new(dir);
        let report = ReportSerializer::new().load(
            dir.join(&persistence.report_file_name),
            &bundle,
            Some(data_bundle.clone()),
        )?;

        let id = RunId::generate();
        let run = Run::replay(
            id.clone(),
            bundle,
            manifest.workflow,
            manifest.profile,
            data_bundle,
            report,
        );
        info!(run_id = %id, state = %run.state(), "Run opened");
        self.runs.insert(id.clone(), Arc::new(run));
        self.events.publish(RunEvent::Opened { run_id: id.clone() });
        Ok(id)
    }

    /// Delete every run. Backend failures are logged and skipped.
    pub async fn shutdown(&self) {
        for run_id in self.list_runs() {
            if let Some((_, run)) = self.runs.remove(&run_id) {
                if let Err(e) = run.delete().await {
                    warn!(run_id = %run_id, error = %e, "Failed to delete run during shutdown");
                }
            }
        }
        info!("Run service shut down");
    }
}
