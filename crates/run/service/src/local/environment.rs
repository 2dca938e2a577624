//! In-process execution backend
//!
//! Each execution runs on its own tokio task, one processor at a time in the
//! compiled order. Progress is recorded straight into the run's report tree:
//!
//! ```text
//! wf0                                  workflow invocation
//! └── wf0/proc-<processor>0            processor invocation
//!     └── wf0/proc-<p>0/act-<a>0       activity invocation
//!         └── .../act-<a>0/wf0         nested workflow, recursing
//! ```
//!
//! Pause, resume and cancel are cooperative: the task checks its control
//! channel before every processor.

use super::activities::{
    ActivityFn, ConcatenateActivity, ConstantActivity, PortValues, CONCATENATE_ACTIVITY_TYPE,
    CONSTANT_ACTIVITY_TYPE,
};
use crate::collaborators::{
    DataStore, ExecutableGraph, ExecutableStep, ExecutionEnvironment, ExecutionRequest,
};
use crate::errors::{DataError, ExecutionError};
use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use run_report::{
    ActivityReport, Invocation, ProcessorReport, WorkflowReport, JOBS_COMPLETED_PROPERTY,
    JOBS_COMPLETED_WITH_ERRORS_PROPERTY, JOBS_QUEUED_PROPERTY, JOBS_STARTED_PROPERTY,
};
use run_types::{
    now_millis, DataBundle, DataPath, ExecutionId, PortRef, State, Transition, Workflow,
    WorkflowBundle,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Control {
    Run,
    Pause,
    Cancel,
}

struct Execution {
    request: ExecutionRequest,
    control: watch::Sender<Control>,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// Runs workflows on the local tokio runtime
pub struct LocalExecutionEnvironment {
    name: String,
    store: Arc<dyn DataStore>,
    activities: Arc<DashMap<String, Arc<dyn ActivityFn>>>,
    executions: DashMap<ExecutionId, Arc<Execution>>,
}

impl LocalExecutionEnvironment {
    /// Backend with the constant and concatenate activities registered
    pub fn new(store: Arc<dyn DataStore>) -> Self {
        let env = Self {
            name: "local".to_string(),
            store,
            activities: Arc::new(DashMap::new()),
            executions: DashMap::new(),
        };
        env.register_activity(CONSTANT_ACTIVITY_TYPE, Arc::new(ConstantActivity));
        env.register_activity(CONCATENATE_ACTIVITY_TYPE, Arc::new(ConcatenateActivity));
        env
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Register the implementation of an activity type URI
    pub fn register_activity(
        &self,
        activity_type: impl Into<String>,
        implementation: Arc<dyn ActivityFn>,
    ) {
        self.activities.insert(activity_type.into(), implementation);
    }

    pub fn data_store(&self) -> &Arc<dyn DataStore> {
        &self.store
    }

    pub fn execution_count(&self) -> usize {
        self.executions.len()
    }

    fn execution(&self, id: &ExecutionId) -> Result<Arc<Execution>, ExecutionError> {
        self.executions
            .get(id)
            .map(|e| e.value().clone())
            .ok_or_else(|| ExecutionError::UnknownExecution(id.clone()))
    }
}

#[async_trait]
impl ExecutionEnvironment for LocalExecutionEnvironment {
    fn name(&self) -> &str {
        &self.name
    }

    async fn create_execution(
        &self,
        request: ExecutionRequest,
    ) -> Result<ExecutionId, ExecutionError> {
        let id = ExecutionId::generate();
        let (control, _) = watch::channel(Control::Run);
        self.executions.insert(
            id.clone(),
            Arc::new(Execution {
                request,
                control,
                task: Mutex::new(None),
            }),
        );
        debug!(execution = %id, "Execution created");
        Ok(id)
    }

    async fn start(&self, id: &ExecutionId) -> Result<(), ExecutionError> {
        let execution = self.execution(id)?;
        let mut task = execution.task.lock();
        if task.is_some() {
            return Err(ExecutionError::AlreadyStarted(id.clone()));
        }

        let request = &execution.request;
        let runner = Runner {
            store: self.store.clone(),
            activities: self.activities.clone(),
            bundle: request.bundle.clone(),
            data_bundle: request.data_bundle.clone(),
            profile: request.profile.clone(),
            control: execution.control.subscribe(),
        };
        let graph = request.graph.clone();
        let report = request.report.clone();
        let execution_id = id.clone();

        *task = Some(tokio::spawn(async move {
            match runner.run_root(&graph, &report).await {
                Ok(_) => info!(execution = %execution_id, "Execution completed"),
                Err(ExecutionError::Cancelled) => {
                    info!(execution = %execution_id, "Execution cancelled")
                }
                Err(e) => warn!(execution = %execution_id, error = %e, "Execution failed"),
            }
        }));
        Ok(())
    }

    async fn pause(&self, id: &ExecutionId) -> Result<(), ExecutionError> {
        self.execution(id)?.control.send_replace(Control::Pause);
        Ok(())
    }

    async fn resume(&self, id: &ExecutionId) -> Result<(), ExecutionError> {
        self.execution(id)?.control.send_replace(Control::Run);
        Ok(())
    }

    async fn cancel(&self, id: &ExecutionId) -> Result<(), ExecutionError> {
        self.execution(id)?.control.send_replace(Control::Cancel);
        Ok(())
    }

    async fn delete(&self, id: &ExecutionId) -> Result<(), ExecutionError> {
        let (_, execution) = self
            .executions
            .remove(id)
            .ok_or_else(|| ExecutionError::UnknownExecution(id.clone()))?;
        execution.control.send_replace(Control::Cancel);
        if let Some(task) = execution.task.lock().take() {
            task.abort();
        }
        debug!(execution = %id, "Execution deleted");
        Ok(())
    }
}

// ── Runner ───────────────────────────────────────────────────────────

/// State of one running execution
struct Runner {
    store: Arc<dyn DataStore>,
    activities: Arc<DashMap<String, Arc<dyn ActivityFn>>>,
    bundle: Arc<WorkflowBundle>,
    data_bundle: DataBundle,
    profile: String,
    control: watch::Receiver<Control>,
}

/// Locator of a value bound to an invocation port
fn scoped_path(invocation: &Invocation, direction: &str, port: &str) -> DataPath {
    DataPath::intermediate(&format!("{}/{}", invocation.id(), direction), port)
}

/// Value flowing into `sink`, from a workflow input or an upstream output
fn linked_value(
    workflow: &Workflow,
    sink: &PortRef,
    inputs: &PortValues,
    produced: &HashMap<(String, String), Value>,
) -> Option<Value> {
    workflow.links_into(sink).find_map(|link| match &link.source {
        PortRef::Workflow { port } => inputs.get(port).cloned(),
        PortRef::Processor { processor, port } => {
            produced.get(&(processor.clone(), port.clone())).cloned()
        }
    })
}

impl Runner {
    /// Wait while paused; fail once cancelled
    async fn checkpoint(&self) -> Result<(), ExecutionError> {
        let mut control = self.control.clone();
        loop {
            let current = *control.borrow_and_update();
            match current {
                Control::Run => return Ok(()),
                Control::Cancel => return Err(ExecutionError::Cancelled),
                Control::Pause => {
                    if control.changed().await.is_err() {
                        return Err(ExecutionError::Cancelled);
                    }
                }
            }
        }
    }

    fn workflow(&self, name: &str) -> Result<&Workflow, ExecutionError> {
        self.bundle
            .workflow(name)
            .ok_or_else(|| ExecutionError::Backend(format!("workflow '{}' not in bundle", name)))
    }

    fn write(&self, path: &DataPath, value: &Value) -> Result<(), ExecutionError> {
        self.store
            .write_value(&self.data_bundle, path, value.clone())
            .map_err(ExecutionError::from)
    }

    async fn run_root(
        &self,
        graph: &ExecutableGraph,
        report: &WorkflowReport,
    ) -> Result<PortValues, ExecutionError> {
        // Started before any work, so a quick finish never skips RUNNING
        report.record_from(State::Created, Transition::Start, now_millis());
        match self.root_inputs(&graph.workflow) {
            Ok(inputs) => self.run_workflow(graph, report, None, inputs).await,
            Err(e) => {
                report.record_unless_terminal(Transition::Fail, now_millis());
                Err(e)
            }
        }
    }

    /// Read every input of the root workflow from the data store
    fn root_inputs(&self, workflow: &str) -> Result<PortValues, ExecutionError> {
        let workflow = self.workflow(workflow)?;
        let mut inputs = PortValues::new();
        for port in &workflow.input_ports {
            let path = self.store.locator(&self.data_bundle, &port.name);
            let value = self
                .store
                .read_value(&self.data_bundle, &path)
                .map_err(|e| match e {
                    DataError::NotFound(_) => ExecutionError::MissingInput {
                        port: port.name.clone(),
                    },
                    other => other.into(),
                })?;
            inputs.insert(port.name.clone(), value);
        }
        Ok(inputs)
    }

    fn run_workflow<'a>(
        &'a self,
        graph: &'a ExecutableGraph,
        report: &'a WorkflowReport,
        parent: Option<&'a Arc<Invocation>>,
        inputs: PortValues,
    ) -> BoxFuture<'a, Result<PortValues, ExecutionError>> {
        async move {
            let result: Result<PortValues, ExecutionError> = async {
                let workflow = self.workflow(&graph.workflow)?;
                report.record_from(State::Created, Transition::Start, now_millis());
                let invocation = Invocation::new("wf0", vec![], parent, report)?;

                let mut bound = PortValues::new();
                for port in &workflow.input_ports {
                    let Some(value) = inputs.get(&port.name) else {
                        continue;
                    };
                    let path = match parent {
                        None => self.store.locator(&self.data_bundle, &port.name),
                        Some(_) => {
                            let path = scoped_path(&invocation, "inputs", &port.name);
                            self.write(&path, value)?;
                            path
                        }
                    };
                    invocation.set_input(&port.name, path)?;
                    bound.insert(port.name.clone(), value.clone());
                }

                let mut produced: HashMap<(String, String), Value> = HashMap::new();
                for step in &graph.steps {
                    self.checkpoint().await?;
                    let processor = workflow.processor(&step.processor).ok_or_else(|| {
                        let message = format!("processor '{}' not in workflow", step.processor);
                        ExecutionError::Backend(message)
                    })?;
                    let processor_report =
                        report.processor_report(&step.processor).ok_or_else(|| {
                            let message = format!("no report for processor '{}'", step.processor);
                            ExecutionError::Backend(message)
                        })?;

                    let step_inputs: PortValues = processor
                        .input_ports
                        .iter()
                        .filter_map(|port| {
                            let sink = PortRef::processor(&processor.name, &port.name);
                            linked_value(workflow, &sink, &bound, &produced)
                                .map(|v| (port.name.clone(), v))
                        })
                        .collect();

                    let outputs = self
                        .run_processor(graph, step, &processor_report, &invocation, step_inputs)
                        .await?;
                    for (port, value) in outputs {
                        produced.insert((step.processor.clone(), port), value);
                    }
                }

                let mut outputs = PortValues::new();
                for port in &workflow.output_ports {
                    let sink = PortRef::workflow(&port.name);
                    let Some(value) = linked_value(workflow, &sink, &bound, &produced) else {
                        continue;
                    };
                    let path = match parent {
                        None => DataPath::output(&port.name),
                        Some(_) => scoped_path(&invocation, "outputs", &port.name),
                    };
                    self.write(&path, &value)?;
                    invocation.set_output(&port.name, path)?;
                    outputs.insert(port.name.clone(), value);
                }

                invocation.set_completed_date(now_millis());
                report.record_unless_terminal(Transition::Complete, now_millis());
                Ok(outputs)
            }
            .await;

            if let Err(e) = &result {
                if !matches!(e, ExecutionError::Cancelled) {
                    report.record_unless_terminal(Transition::Fail, now_millis());
                }
            }
            result
        }
        .boxed()
    }

    /// Run a processor, falling over to the next bound activity on failure
    async fn run_processor(
        &self,
        graph: &ExecutableGraph,
        step: &ExecutableStep,
        report: &ProcessorReport,
        parent: &Arc<Invocation>,
        inputs: PortValues,
    ) -> Result<PortValues, ExecutionError> {
        report.record_unless_terminal(Transition::Start, now_millis());
        let queued = Arc::new(AtomicU64::new(1));
        let depth = queued.clone();
        report.bind_live_property(
            JOBS_QUEUED_PROPERTY,
            Arc::new(move || Some(Value::from(depth.load(Ordering::SeqCst)))),
        );

        let invocation = Invocation::new(
            format!("proc-{}0", step.processor),
            vec![],
            Some(parent),
            report,
        )?;
        for (port, value) in &inputs {
            let path = scoped_path(&invocation, "inputs", port);
            self.write(&path, value)?;
            invocation.set_input(port, path)?;
        }

        queued.store(0, Ordering::SeqCst);
        report.telemetry().increment(JOBS_STARTED_PROPERTY, 1);

        let declared = &report.subject().output_ports;
        let mut last_error = None;
        for activity_name in &step.activities {
            let Some(activity_report) = report
                .activity_reports()
                .into_iter()
                .find(|a| &a.subject().name == activity_name)
            else {
                continue;
            };
            match self
                .run_activity(graph, activity_name, &activity_report, &invocation, inputs.clone())
                .await
            {
                Ok(outputs) => {
                    for (port, value) in &outputs {
                        if !declared.contains(port) {
                            continue;
                        }
                        let path = scoped_path(&invocation, "outputs", port);
                        self.write(&path, value)?;
                        invocation.set_output(port, path)?;
                    }
                    invocation.set_completed_date(now_millis());
                    report.telemetry().increment(JOBS_COMPLETED_PROPERTY, 1);
                    report.save_properties();
                    report.record_unless_terminal(Transition::Complete, now_millis());
                    return Ok(outputs);
                }
                Err(ExecutionError::Cancelled) => {
                    report.save_properties();
                    return Err(ExecutionError::Cancelled);
                }
                Err(e) => {
                    warn!(
                        processor = %step.processor,
                        activity = %activity_name,
                        error = %e,
                        "Activity failed"
                    );
                    last_error = Some(e);
                }
            }
        }

        report
            .telemetry()
            .increment(JOBS_COMPLETED_WITH_ERRORS_PROPERTY, 1);
        report.save_properties();
        report.record_unless_terminal(Transition::Fail, now_millis());
        Err(last_error.unwrap_or_else(|| {
            let message = format!("processor '{}' has no runnable activity", step.processor);
            ExecutionError::Backend(message)
        }))
    }

    async fn run_activity(
        &self,
        graph: &ExecutableGraph,
        name: &str,
        report: &ActivityReport,
        parent: &Arc<Invocation>,
        inputs: PortValues,
    ) -> Result<PortValues, ExecutionError> {
        let activity = self
            .bundle
            .profile(&self.profile)
            .and_then(|p| p.activity(name))
            .ok_or_else(|| ExecutionError::Backend(format!("activity '{}' not in profile", name)))?;

        report.record_unless_terminal(Transition::Start, now_millis());
        let invocation = Invocation::new(format!("act-{}0", name), vec![], Some(parent), report)?;

        let result: Result<PortValues, ExecutionError> = async {
            let subject = report.subject();
            for (port, value) in &inputs {
                if !subject.input_ports.contains(port) {
                    continue;
                }
                let path = scoped_path(&invocation, "inputs", port);
                self.write(&path, value)?;
                invocation.set_input(port, path)?;
            }

            let outputs = if activity.is_nested_workflow() {
                let nested_name = activity.nested_workflow.as_deref().unwrap_or_default();
                let nested_graph = graph.nested.get(nested_name).ok_or_else(|| {
                    let message = format!("nested workflow '{}' not compiled", nested_name);
                    ExecutionError::Backend(message)
                })?;
                let nested_report = report.nested_workflow_report().ok_or_else(|| {
                    let message = format!("no report for nested workflow '{}'", nested_name);
                    ExecutionError::Backend(message)
                })?;
                self.run_workflow(nested_graph, &nested_report, Some(&invocation), inputs)
                    .await?
            } else {
                let implementation = self
                    .activities
                    .get(&activity.activity_type)
                    .map(|e| e.value().clone())
                    .ok_or_else(|| {
                        ExecutionError::UnknownActivityType(activity.activity_type.clone())
                    })?;
                implementation.invoke(activity, inputs).await?
            };

            for (port, value) in &outputs {
                if !subject.output_ports.contains(port) {
                    continue;
                }
                let path = scoped_path(&invocation, "outputs", port);
                self.write(&path, value)?;
                invocation.set_output(port, path)?;
            }
            Ok(outputs)
        }
        .await;

        match &result {
            Ok(_) => {
                invocation.set_completed_date(now_millis());
                report.record_unless_terminal(Transition::Complete, now_millis());
            }
            Err(ExecutionError::Cancelled) => {}
            Err(_) => {
                report.record_unless_terminal(Transition::Fail, now_millis());
            }
        }
        result
    }
}
