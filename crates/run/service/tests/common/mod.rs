//! Shared fixtures for run-service integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use run_report::{ReportListener, StatusReport};
use run_service::local::{
    ActivityFn, InMemoryDataStore, LocalExecutionEnvironment, PortValues,
    CONCATENATE_ACTIVITY_TYPE, CONSTANT_ACTIVITY_TYPE,
};
use run_service::{DataStore, ExecutionError, RunProfile, RunService};
use run_types::{
    Activity, DataBundle, DataPath, PortRef, Processor, ProcessorBinding, Profile, RunId, State,
    Workflow, WorkflowBundle,
};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};

pub const GATED_ACTIVITY_TYPE: &str = "urn:test:gated";
pub const FAILING_ACTIVITY_TYPE: &str = "urn:test:failing";

// ---------------------------------------------------------------------------
// Bundles
// ---------------------------------------------------------------------------

/// Two-processor greeting workflow: a constant "Hello, " concatenated with
/// the `name` input.
pub fn hello_anyone(hello_type: &str) -> WorkflowBundle {
    let mut bundle = WorkflowBundle::with_uri(
        "helloanyone",
        "http://ns.taverna.org.uk/2010/workflowBundle/01348671-5aaa-4cc2-84cc-477329b70b0d/",
    );

    let mut wf = Workflow::new("Hello_Anyone")
        .with_input("name")
        .with_output("greeting");
    wf.add_processor(Processor::new("hello").with_output("value"))
        .unwrap();
    wf.add_processor(
        Processor::new("Concatenate_two_strings")
            .with_input("string1")
            .with_input("string2")
            .with_output("output"),
    )
    .unwrap();
    wf.add_link(
        PortRef::processor("hello", "value"),
        PortRef::processor("Concatenate_two_strings", "string1"),
    );
    wf.add_link(
        PortRef::workflow("name"),
        PortRef::processor("Concatenate_two_strings", "string2"),
    );
    wf.add_link(
        PortRef::processor("Concatenate_two_strings", "output"),
        PortRef::workflow("greeting"),
    );
    bundle.add_workflow(wf).unwrap();

    let mut profile = Profile::new("taverna-2.4.0");
    profile
        .add_activity(
            Activity::new("hello", hello_type)
                .with_output("value")
                .with_config("value", "Hello, "),
        )
        .unwrap();
    profile
        .add_activity(
            Activity::new("Concatenate_two_strings", CONCATENATE_ACTIVITY_TYPE)
                .with_input("string1")
                .with_input("string2")
                .with_output("output"),
        )
        .unwrap();
    profile.bind(ProcessorBinding::new("Hello_Anyone", "hello", "hello"));
    profile.bind(ProcessorBinding::new(
        "Hello_Anyone",
        "Concatenate_two_strings",
        "Concatenate_two_strings",
    ));
    bundle.add_profile(profile).unwrap();
    bundle
}

pub fn hello_bundle() -> Arc<WorkflowBundle> {
    Arc::new(hello_anyone(CONSTANT_ACTIVITY_TYPE))
}

/// `Outer` wraps the greeting workflow in a single nested-workflow processor
pub fn nested_hello() -> Arc<WorkflowBundle> {
    let mut bundle = hello_anyone(CONSTANT_ACTIVITY_TYPE);
    let mut outer = Workflow::new("Outer")
        .with_input("name")
        .with_output("greeting");
    outer
        .add_processor(
            Processor::new("wrap")
                .with_input("name")
                .with_output("greeting"),
        )
        .unwrap();
    outer.add_link(PortRef::workflow("name"), PortRef::processor("wrap", "name"));
    outer.add_link(PortRef::processor("wrap", "greeting"), PortRef::workflow("greeting"));
    bundle.add_workflow(outer).unwrap();

    let profile = bundle.profiles.get_mut("taverna-2.4.0").unwrap();
    profile
        .add_activity(
            Activity::nested("wrap", "Hello_Anyone")
                .with_input("name")
                .with_output("greeting"),
        )
        .unwrap();
    profile.bind(ProcessorBinding::new("Outer", "wrap", "wrap"));
    Arc::new(bundle)
}

// ---------------------------------------------------------------------------
// Activities
// ---------------------------------------------------------------------------

/// Constant activity that waits for a permit before emitting
pub struct GatedActivity {
    pub entered: Notify,
    pub gate: Semaphore,
}

impl GatedActivity {
    pub fn new() -> Self {
        Self {
            entered: Notify::new(),
            gate: Semaphore::new(0),
        }
    }

    pub fn release(&self) {
        self.gate.add_permits(1);
    }
}

#[async_trait]
impl ActivityFn for GatedActivity {
    async fn invoke(
        &self,
        activity: &Activity,
        _inputs: PortValues,
    ) -> Result<PortValues, ExecutionError> {
        self.entered.notify_one();
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| ExecutionError::Backend(e.to_string()))?;
        permit.forget();
        let value = activity.configuration.get("value").cloned().unwrap_or_default();
        Ok(activity
            .output_ports
            .iter()
            .map(|p| (p.name.clone(), Value::from(value.clone())))
            .collect())
    }
}

/// Fails every invocation
pub struct FailingActivity;

#[async_trait]
impl ActivityFn for FailingActivity {
    async fn invoke(
        &self,
        activity: &Activity,
        _inputs: PortValues,
    ) -> Result<PortValues, ExecutionError> {
        Err(ExecutionError::ActivityFailed {
            activity: activity.name.clone(),
            message: "service unavailable".to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Listeners
// ---------------------------------------------------------------------------

/// Records every state change of the report it is attached to
#[derive(Default)]
pub struct TransitionLog {
    transitions: Mutex<Vec<(State, State)>>,
}

impl TransitionLog {
    pub fn transitions(&self) -> Vec<(State, State)> {
        self.transitions.lock().clone()
    }
}

impl ReportListener for TransitionLog {
    fn state_changed(&self, _report: &StatusReport, old: State, new: State) {
        self.transitions.lock().push((old, new));
    }
}

// ---------------------------------------------------------------------------
// Runs
// ---------------------------------------------------------------------------

pub fn seed_name(store: &dyn DataStore, data: &DataBundle, name: &str) {
    store
        .write_value(data, &DataPath::input("name"), Value::from(name))
        .unwrap();
}

pub struct Harness {
    pub service: RunService,
    pub store: Arc<InMemoryDataStore>,
    pub env: Arc<LocalExecutionEnvironment>,
    pub data: DataBundle,
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(InMemoryDataStore::new());
        let env = Arc::new(LocalExecutionEnvironment::new(store.clone()));
        env.register_activity(FAILING_ACTIVITY_TYPE, Arc::new(FailingActivity));
        let data = DataBundle::new("/runs/hello");
        seed_name(store.as_ref(), &data, "John Doe");
        Self {
            service: RunService::with_defaults(),
            store,
            env,
            data,
        }
    }

    pub fn profile(&self, bundle: Arc<WorkflowBundle>) -> RunProfile {
        RunProfile::new(bundle)
            .with_data_bundle(self.data.clone())
            .with_environment(self.env.clone())
    }

    pub fn read(&self, path: &DataPath) -> Value {
        self.store.read_value(&self.data, path).unwrap()
    }
}

/// Poll until the run's root report reaches `expected`
pub async fn wait_for_state(service: &RunService, run_id: &RunId, expected: State) {
    let reached = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if service.get_state(run_id.as_str()).unwrap() == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(
        reached.is_ok(),
        "run {} stuck in {} waiting for {}",
        run_id,
        service.get_state(run_id.as_str()).unwrap(),
        expected
    );
}
