//! Fixtures shared by unit tests

use crate::{ReportListener, ReportTree, StatusReport, WorkflowReport};
use parking_lot::Mutex;
use run_types::{
    Activity, DataPath, PortRef, Processor, ProcessorBinding, Profile, State, Workflow,
    WorkflowBundle,
};

/// The two-processor greeting workflow
pub(crate) fn hello_bundle() -> WorkflowBundle {
    let mut bundle = WorkflowBundle::with_uri("hello", "http://example.com/bundle/hello/");
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

    let mut profile = Profile::new("local");
    profile
        .add_activity(
            Activity::new("hello", "urn:constant")
                .with_output("value")
                .with_config("value", "Hello, "),
        )
        .unwrap();
    profile
        .add_activity(
            Activity::new("Concatenate_two_strings", "urn:concat")
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

/// `Outer` runs `Inner` through its `wrap` processor
pub(crate) fn nested_bundle() -> WorkflowBundle {
    let mut bundle = WorkflowBundle::with_uri("nested", "http://example.com/nested/");
    let mut outer = Workflow::new("Outer").with_input("x");
    outer
        .add_processor(Processor::new("wrap").with_input("in").with_output("out"))
        .unwrap();
    bundle.add_workflow(outer).unwrap();
    let mut inner = Workflow::new("Inner");
    inner
        .add_processor(Processor::new("leaf").with_output("value"))
        .unwrap();
    bundle.add_workflow(inner).unwrap();

    let mut profile = Profile::new("local");
    profile
        .add_activity(Activity::nested("wrap", "Inner").with_input("in").with_output("out"))
        .unwrap();
    profile
        .add_activity(Activity::new("leaf", "urn:constant").with_output("value"))
        .unwrap();
    profile.bind(ProcessorBinding::new("Outer", "wrap", "wrap"));
    profile.bind(ProcessorBinding::new("Inner", "leaf", "leaf"));
    bundle.add_profile(profile).unwrap();
    bundle
}

pub(crate) fn hello_report() -> WorkflowReport {
    let bundle = hello_bundle();
    ReportTree::build(
        &bundle,
        bundle.main_workflow().unwrap(),
        bundle.main_profile().unwrap(),
    )
    .unwrap()
}

/// Records every notification it receives
#[derive(Default)]
pub(crate) struct RecordingListener {
    transitions: Mutex<Vec<(State, State)>>,
    outputs: Mutex<Vec<(String, String, Vec<usize>)>>,
}

impl RecordingListener {
    pub(crate) fn transitions(&self) -> Vec<(State, State)> {
        self.transitions.lock().clone()
    }

    pub(crate) fn outputs(&self) -> Vec<(String, String, Vec<usize>)> {
        self.outputs.lock().clone()
    }
}

impl ReportListener for RecordingListener {
    fn state_changed(&self, _report: &StatusReport, old: State, new: State) {
        self.transitions.lock().push((old, new));
    }

    fn output_added(&self, _report: &StatusReport, path: &DataPath, port: &str, index: &[usize]) {
        self.outputs
            .lock()
            .push((path.as_str().to_string(), port.to_string(), index.to_vec()));
    }
}
