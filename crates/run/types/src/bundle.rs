//! Workflow bundles: the declarative task graphs a run executes
//!
//! A [`WorkflowBundle`] groups workflows and profiles. A [`Workflow`] holds
//! processors wired together by [`DataLink`]s. A [`Profile`] binds each
//! processor to one or more [`Activity`] implementations; an activity whose
//! type is [`NESTED_WORKFLOW_TYPE`] runs another workflow of the bundle.

use crate::subject::SubjectPath;
use crate::{ModelError, ModelResult, Subject, SubjectKind};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Activity type URI of activities that run a nested workflow
pub const NESTED_WORKFLOW_TYPE: &str = "http://ns.taverna.org.uk/2010/activity/nested-workflow";

/// Prefix under which generated bundle URIs are minted
pub const BUNDLE_URI_BASE: &str = "http://ns.taverna.org.uk/2010/workflowBundle/";

fn check_name(name: &str) -> ModelResult<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(ModelError::InvalidName(name.to_string()));
    }
    Ok(())
}

fn check_ports(ports: &[Port]) -> ModelResult<()> {
    let mut seen = HashSet::new();
    for port in ports {
        check_name(&port.name)?;
        if !seen.insert(port.name.as_str()) {
            return Err(ModelError::DuplicatePort(port.name.clone()));
        }
    }
    Ok(())
}

fn port_names(ports: &[Port]) -> Vec<String> {
    ports.iter().map(|p| p.name.clone()).collect()
}

// ── Ports and Links ──────────────────────────────────────────────────

/// A named input or output port
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Port {
    pub name: String,
    /// List nesting depth of values on this port (0 = single value)
    #[serde(default)]
    pub depth: u32,
}

impl Port {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            depth: 0,
        }
    }

    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }
}

/// One end of a data link
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PortRef {
    /// A workflow input (as a source) or workflow output (as a sink)
    Workflow { port: String },
    /// A processor output (as a source) or processor input (as a sink)
    Processor { processor: String, port: String },
}

impl PortRef {
    pub fn workflow(port: impl Into<String>) -> Self {
        Self::Workflow { port: port.into() }
    }

    pub fn processor(processor: impl Into<String>, port: impl Into<String>) -> Self {
        Self::Processor {
            processor: processor.into(),
            port: port.into(),
        }
    }
}

impl std::fmt::Display for PortRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Workflow { port } => write!(f, "{}", port),
            Self::Processor { processor, port } => write!(f, "{}:{}", processor, port),
        }
    }
}

/// A directed value flow between two ports
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataLink {
    pub source: PortRef,
    pub sink: PortRef,
}

impl DataLink {
    pub fn new(source: PortRef, sink: PortRef) -> Self {
        Self { source, sink }
    }
}

// ── Workflow ─────────────────────────────────────────────────────────

/// A task inside a workflow
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Processor {
    pub name: String,
    #[serde(default)]
    pub input_ports: Vec<Port>,
    #[serde(default)]
    pub output_ports: Vec<Port>,
}

impl Processor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            input_ports: Vec::new(),
            output_ports: Vec::new(),
        }
    }

    pub fn with_input(mut self, port: impl Into<String>) -> Self {
        self.input_ports.push(Port::new(port));
        self
    }

    pub fn with_output(mut self, port: impl Into<String>) -> Self {
        self.output_ports.push(Port::new(port));
        self
    }

    pub fn input_port(&self, name: &str) -> Option<&Port> {
        self.input_ports.iter().find(|p| p.name == name)
    }

    pub fn output_port(&self, name: &str) -> Option<&Port> {
        self.output_ports.iter().find(|p| p.name == name)
    }
}

/// A graph of processors and data links
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workflow {
    pub name: String,
    #[serde(default)]
    pub input_ports: Vec<Port>,
    #[serde(default)]
    pub output_ports: Vec<Port>,
    #[serde(default)]
    pub processors: Vec<Processor>,
    #[serde(default)]
    pub data_links: Vec<DataLink>,
}

impl Workflow {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            input_ports: Vec::new(),
            output_ports: Vec::new(),
            processors: Vec::new(),
            data_links: Vec::new(),
        }
    }

    pub fn with_input(mut self, port: impl Into<String>) -> Self {
        self.input_ports.push(Port::new(port));
        self
    }

    pub fn with_output(mut self, port: impl Into<String>) -> Self {
        self.output_ports.push(Port::new(port));
        self
    }

    /// Add a processor, rejecting duplicate names
    pub fn add_processor(&mut self, processor: Processor) -> ModelResult<()> {
        check_name(&processor.name)?;
        check_ports(&processor.input_ports)?;
        check_ports(&processor.output_ports)?;
        if self.processor(&processor.name).is_some() {
            return Err(ModelError::DuplicateProcessor {
                workflow: self.name.clone(),
                processor: processor.name,
            });
        }
        self.processors.push(processor);
        Ok(())
    }

    pub fn add_link(&mut self, source: PortRef, sink: PortRef) {
        self.data_links.push(DataLink::new(source, sink));
    }

    pub fn processor(&self, name: &str) -> Option<&Processor> {
        self.processors.iter().find(|p| p.name == name)
    }

    /// Links feeding the given sink
    pub fn links_into<'a>(&'a self, sink: &'a PortRef) -> impl Iterator<Item = &'a DataLink> + 'a {
        self.data_links.iter().filter(move |l| &l.sink == sink)
    }
}

// ── Profile ──────────────────────────────────────────────────────────

/// A concrete implementation a processor can be bound to
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    pub name: String,
    /// Type URI selecting the implementation
    pub activity_type: String,
    #[serde(default)]
    pub input_ports: Vec<Port>,
    #[serde(default)]
    pub output_ports: Vec<Port>,
    /// Implementation-specific settings
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub configuration: BTreeMap<String, String>,
    /// Name of the bundle workflow run by a nested-workflow activity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nested_workflow: Option<String>,
}

impl Activity {
    pub fn new(name: impl Into<String>, activity_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            activity_type: activity_type.into(),
            input_ports: Vec::new(),
            output_ports: Vec::new(),
            configuration: BTreeMap::new(),
            nested_workflow: None,
        }
    }

    /// An activity that runs another workflow of the same bundle
    pub fn nested(name: impl Into<String>, workflow: impl Into<String>) -> Self {
        let mut activity = Self::new(name, NESTED_WORKFLOW_TYPE);
        activity.nested_workflow = Some(workflow.into());
        activity
    }

    pub fn with_input(mut self, port: impl Into<String>) -> Self {
        self.input_ports.push(Port::new(port));
        self
    }

    pub fn with_output(mut self, port: impl Into<String>) -> Self {
        self.output_ports.push(Port::new(port));
        self
    }

    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.configuration.insert(key.into(), value.into());
        self
    }

    pub fn is_nested_workflow(&self) -> bool {
        self.activity_type == NESTED_WORKFLOW_TYPE && self.nested_workflow.is_some()
    }
}

/// Binds a processor of a workflow to an activity of the profile
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessorBinding {
    pub workflow: String,
    pub processor: String,
    pub activity: String,
}

impl ProcessorBinding {
    pub fn new(
        workflow: impl Into<String>,
        processor: impl Into<String>,
        activity: impl Into<String>,
    ) -> Self {
        Self {
            workflow: workflow.into(),
            processor: processor.into(),
            activity: activity.into(),
        }
    }
}

/// An execution profile: the activities and bindings used to run workflows
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    #[serde(default)]
    pub activities: BTreeMap<String, Activity>,
    #[serde(default)]
    pub processor_bindings: Vec<ProcessorBinding>,
}

impl Profile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            activities: BTreeMap::new(),
            processor_bindings: Vec::new(),
        }
    }

    pub fn add_activity(&mut self, activity: Activity) -> ModelResult<()> {
        check_name(&activity.name)?;
        check_ports(&activity.input_ports)?;
        check_ports(&activity.output_ports)?;
        if self.activities.contains_key(&activity.name) {
            return Err(ModelError::DuplicateActivity {
                profile: self.name.clone(),
                activity: activity.name,
            });
        }
        self.activities.insert(activity.name.clone(), activity);
        Ok(())
    }

    pub fn bind(&mut self, binding: ProcessorBinding) {
        self.processor_bindings.push(binding);
    }

    pub fn activity(&self, name: &str) -> Option<&Activity> {
        self.activities.get(name)
    }

    /// Activities bound to a processor, in binding order
    pub fn activities_for<'a>(
        &'a self,
        workflow: &'a str,
        processor: &'a str,
    ) -> impl Iterator<Item = &'a Activity> + 'a {
        self.processor_bindings
            .iter()
            .filter(move |b| b.workflow == workflow && b.processor == processor)
            .filter_map(move |b| self.activities.get(&b.activity))
    }
}

// ── Workflow Bundle ──────────────────────────────────────────────────

/// A set of workflows and profiles sharing one base URI
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowBundle {
    pub name: String,
    /// Base URI, always ending in `/`
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_workflow: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_profile: Option<String>,
    #[serde(default)]
    pub workflows: BTreeMap<String, Workflow>,
    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
}

impl WorkflowBundle {
    /// Create an empty bundle under a freshly minted URI
    pub fn new(name: impl Into<String>) -> Self {
        let uri = format!("{}{}/", BUNDLE_URI_BASE, uuid::Uuid::new_v4());
        Self::with_uri(name, uri)
    }

    pub fn with_uri(name: impl Into<String>, uri: impl Into<String>) -> Self {
        let mut uri = uri.into();
        if !uri.ends_with('/') {
            uri.push('/');
        }
        Self {
            name: name.into(),
            uri,
            main_workflow: None,
            main_profile: None,
            workflows: BTreeMap::new(),
            profiles: BTreeMap::new(),
        }
    }

    /// Add a workflow; the first one added becomes the main workflow
    pub fn add_workflow(&mut self, workflow: Workflow) -> ModelResult<()> {
        check_name(&workflow.name)?;
        check_ports(&workflow.input_ports)?;
        check_ports(&workflow.output_ports)?;
        if self.workflows.contains_key(&workflow.name) {
            return Err(ModelError::DuplicateWorkflow(workflow.name));
        }
        if self.main_workflow.is_none() {
            self.main_workflow = Some(workflow.name.clone());
        }
        self.workflows.insert(workflow.name.clone(), workflow);
        Ok(())
    }

    /// Add a profile; the first one added becomes the main profile
    pub fn add_profile(&mut self, profile: Profile) -> ModelResult<()> {
        check_name(&profile.name)?;
        if self.profiles.contains_key(&profile.name) {
            return Err(ModelError::DuplicateProfile(profile.name));
        }
        if self.main_profile.is_none() {
            self.main_profile = Some(profile.name.clone());
        }
        self.profiles.insert(profile.name.clone(), profile);
        Ok(())
    }

    pub fn set_main_workflow(&mut self, name: &str) -> ModelResult<()> {
        if !self.workflows.contains_key(name) {
            return Err(ModelError::UnknownWorkflow(name.to_string()));
        }
        self.main_workflow = Some(name.to_string());
        Ok(())
    }

    pub fn set_main_profile(&mut self, name: &str) -> ModelResult<()> {
        if !self.profiles.contains_key(name) {
            return Err(ModelError::UnknownProfile(name.to_string()));
        }
        self.main_profile = Some(name.to_string());
        Ok(())
    }

    pub fn workflow(&self, name: &str) -> Option<&Workflow> {
        self.workflows.get(name)
    }

    pub fn profile(&self, name: &str) -> Option<&Profile> {
        self.profiles.get(name)
    }

    pub fn main_workflow(&self) -> Option<&Workflow> {
        self.main_workflow.as_deref().and_then(|n| self.workflow(n))
    }

    pub fn main_profile(&self) -> Option<&Profile> {
        self.main_profile.as_deref().and_then(|n| self.profile(n))
    }

    // ── Subjects ─────────────────────────────────────────────────────

    pub fn workflow_uri(&self, workflow: &str) -> String {
        format!("{}workflow/{}/", self.uri, workflow)
    }

    pub fn processor_uri(&self, workflow: &str, processor: &str) -> String {
        format!("{}workflow/{}/processor/{}/", self.uri, workflow, processor)
    }

    pub fn activity_uri(&self, profile: &str, activity: &str) -> String {
        format!("{}profile/{}/activity/{}/", self.uri, profile, activity)
    }

    pub fn workflow_subject(&self, workflow: &Workflow) -> Subject {
        Subject::new(
            SubjectKind::Workflow,
            self.workflow_uri(&workflow.name),
            &workflow.name,
        )
        .with_ports(port_names(&workflow.input_ports), port_names(&workflow.output_ports))
    }

    pub fn processor_subject(&self, workflow: &Workflow, processor: &Processor) -> Subject {
        Subject::new(
            SubjectKind::Processor,
            self.processor_uri(&workflow.name, &processor.name),
            &processor.name,
        )
        .with_ports(port_names(&processor.input_ports), port_names(&processor.output_ports))
    }

    pub fn activity_subject(&self, profile: &Profile, activity: &Activity) -> Subject {
        Subject::new(
            SubjectKind::Activity,
            self.activity_uri(&profile.name, &activity.name),
            &activity.name,
        )
        .with_ports(port_names(&activity.input_ports), port_names(&activity.output_ports))
    }

    /// Resolve a subject URI against this bundle
    pub fn resolve_subject(&self, uri: &str) -> Option<Subject> {
        let relative = uri.strip_prefix(self.uri.as_str())?;
        match SubjectPath::parse(relative)? {
            SubjectPath::Workflow(wf) => {
                let workflow = self.workflow(wf)?;
                Some(self.workflow_subject(workflow))
            }
            SubjectPath::Processor {
                workflow,
                processor,
            } => {
                let workflow = self.workflow(workflow)?;
                let processor = workflow.processor(processor)?;
                Some(self.processor_subject(workflow, processor))
            }
            SubjectPath::Activity { profile, activity } => {
                let profile = self.profile(profile)?;
                let activity = profile.activity(activity)?;
                Some(self.activity_subject(profile, activity))
            }
        }
    }
}
