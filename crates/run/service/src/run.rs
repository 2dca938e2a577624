//! A single workflow run and its guarded lifecycle

use crate::collaborators::{ExecutionEnvironment, ExecutionRequest, WorkflowCompiler};
use crate::errors::{ConfigurationError, RunError, RunResult};
use run_report::{ReportTree, WorkflowReport};
use run_types::{now_millis, DataBundle, ExecutionId, RunId, State, Transition, WorkflowBundle};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// What to run: a workflow of a bundle, a profile, input data and a backend.
///
/// Workflow and profile default to the bundle's main ones.
#[derive(Clone)]
pub struct RunProfile {
    pub bundle: Arc<WorkflowBundle>,
    pub workflow: Option<String>,
    pub profile: Option<String>,
    pub data_bundle: Option<DataBundle>,
    pub environment: Option<Arc<dyn ExecutionEnvironment>>,
}

impl RunProfile {
    pub fn new(bundle: impl Into<Arc<WorkflowBundle>>) -> Self {
        Self {
            bundle: bundle.into(),
            workflow: None,
            profile: None,
            data_bundle: None,
            environment: None,
        }
    }

    pub fn with_workflow(mut self, workflow: impl Into<String>) -> Self {
        self.workflow = Some(workflow.into());
        self
    }

    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }

    pub fn with_data_bundle(mut self, data_bundle: DataBundle) -> Self {
        self.data_bundle = Some(data_bundle);
        self
    }

    pub fn with_environment(mut self, environment: Arc<dyn ExecutionEnvironment>) -> Self {
        self.environment = Some(environment);
        self
    }
}

struct Backend {
    environment: Arc<dyn ExecutionEnvironment>,
    execution: ExecutionId,
}

/// One run: a report tree coupled to a backend execution
pub struct Run {
    id: RunId,
    bundle: Arc<WorkflowBundle>,
    workflow: String,
    profile: String,
    data_bundle: DataBundle,
    report: WorkflowReport,
    backend: Option<Backend>,
    /// Serialises lifecycle calls against each other
    control: Mutex<()>,
}

impl Run {
    /// Validate `profile`, compile the workflow, build the report tree and
    /// create the backend execution.
    ///
    /// Nothing is created on the backend unless every input is present and
    /// the workflow compiles.
    pub async fn create(
        id: RunId,
        profile: RunProfile,
        compiler: &dyn WorkflowCompiler,
    ) -> RunResult<Self> {
        let RunProfile {
            bundle,
            workflow,
            profile,
            data_bundle,
            environment,
        } = profile;

        let workflow = match workflow {
            Some(name) => bundle
                .workflow(&name)
                .ok_or(ConfigurationError::UnknownWorkflow(name))?,
            None => bundle
                .main_workflow()
                .ok_or(ConfigurationError::MissingWorkflow)?,
        };
        let profile = match profile {
            Some(name) => bundle
                .profile(&name)
                .ok_or(ConfigurationError::UnknownProfile(name))?,
            None => bundle
                .main_profile()
                .ok_or(ConfigurationError::MissingProfile)?,
        };
        let data_bundle = data_bundle.ok_or(ConfigurationError::MissingInputData)?;
        let environment = environment.ok_or(ConfigurationError::MissingExecutionEnvironment)?;

        let graph = compiler
            .compile(&bundle, workflow, profile)
            .map_err(ConfigurationError::from)?;
        let report = ReportTree::build(&bundle, workflow, profile)?;
        report.set_data_bundle(data_bundle.clone());

        let request = ExecutionRequest {
            graph,
            bundle: bundle.clone(),
            workflow: workflow.name.clone(),
            profile: profile.name.clone(),
            data_bundle: data_bundle.clone(),
            report: report.clone(),
        };
        let execution = environment.create_execution(request).await?;
        debug!(
            run_id = %id,
            execution = %execution,
            environment = environment.name(),
            "Created backend execution"
        );

        Ok(Self {
            id,
            workflow: workflow.name.clone(),
            profile: profile.name.clone(),
            bundle,
            data_bundle,
            report,
            backend: Some(Backend {
                environment,
                execution,
            }),
            control: Mutex::new(()),
        })
    }

    /// A run restored from a saved report, with no backend attached
    pub fn replay(
        id: RunId,
        bundle: Arc<WorkflowBundle>,
        workflow: String,
        profile: String,
        data_bundle: DataBundle,
        report: WorkflowReport,
    ) -> Self {
        Self {
            id,
            bundle,
            workflow,
            profile,
            data_bundle,
            report,
            backend: None,
            control: Mutex::new(()),
        }
    }

    pub fn id(&self) -> &RunId {
        &self.id
    }

    pub fn bundle(&self) -> &Arc<WorkflowBundle> {
        &self.bundle
    }

    pub fn workflow_name(&self) -> &str {
        &self.workflow
    }

    pub fn profile_name(&self) -> &str {
        &self.profile
    }

    pub fn data_bundle(&self) -> &DataBundle {
        &self.data_bundle
    }

    pub fn report(&self) -> &WorkflowReport {
        &self.report
    }

    pub fn state(&self) -> State {
        self.report.state()
    }

    pub fn is_replay(&self) -> bool {
        self.backend.is_none()
    }

    pub fn execution_id(&self) -> Option<&ExecutionId> {
        self.backend.as_ref().map(|b| &b.execution)
    }

    pub async fn start(&self) -> RunResult<()> {
        self.transition(Transition::Start).await
    }

    pub async fn pause(&self) -> RunResult<()> {
        self.transition(Transition::Pause).await
    }

    pub async fn resume(&self) -> RunResult<()> {
        self.transition(Transition::Resume).await
    }

    pub async fn cancel(&self) -> RunResult<()> {
        self.transition(Transition::Cancel).await
    }

    /// Release the backend execution. Replay runs have nothing to release.
    pub async fn delete(&self) -> RunResult<()> {
        let _guard = self.control.lock().await;
        if let Some(backend) = &self.backend {
            backend.environment.delete(&backend.execution).await?;
        }
        Ok(())
    }

    async fn transition(&self, transition: Transition) -> RunResult<()> {
        let backend = self
            .backend
            .as_ref()
            .ok_or_else(|| RunError::ReadOnly(self.id.clone()))?;
        let _guard = self.control.lock().await;

        let state = self.report.state();
        let permitted = match transition {
            Transition::Cancel => !state.is_terminal(),
            Transition::Start | Transition::Pause | Transition::Resume => {
                transition.is_permitted_from(state)
            }
            Transition::Complete | Transition::Fail => false,
        };
        if !permitted {
            return Err(RunError::InvalidTransition {
                run_id: self.id.clone(),
                state,
                transition,
            });
        }

        let env = &backend.environment;
        let execution = &backend.execution;
        match transition {
            Transition::Start => env.start(execution).await?,
            Transition::Pause => env.pause(execution).await?,
            Transition::Resume => env.resume(execution).await?,
            Transition::Cancel => env.cancel(execution).await?,
            Transition::Complete | Transition::Fail => {}
        }

        // The backend may have finished while the call was in flight
        if !self.report.record_unless_terminal(transition, now_millis()) {
            debug!(run_id = %self.id, %transition, "Run finished before transition was recorded");
        }
        info!(run_id = %self.id, %transition, state = %self.report.state(), "Run transition");
        Ok(())
    }
}

impl std::fmt::Debug for Run {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Run")
            .field("id", &self.id)
            .field("workflow", &self.workflow)
            .field("profile", &self.profile)
            .field("state", &self.state())
            .field("replay", &self.is_replay())
            .finish()
    }
}
