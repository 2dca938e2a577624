//! The report arena and typed handles into it
//!
//! A [`ReportTree`] is built once per run and never changes shape. Nodes are
//! stored in pre-order and refer to their parent and children by
//! [`ReportId`]; handles pair the shared tree with one node id.

use crate::telemetry::{
    LiveProperty, ProcessorTelemetry, JOBS_COMPLETED_PROPERTY, JOBS_COMPLETED_WITH_ERRORS_PROPERTY,
    JOBS_QUEUED_PROPERTY, JOBS_STARTED_PROPERTY,
};
use crate::{ReportError, ReportResult, StatusReport};
use parking_lot::RwLock;
use run_types::{DataBundle, Profile, Subject, Workflow, WorkflowBundle};
use serde_json::Value;
use std::ops::Deref;
use std::sync::{Arc, Weak};

/// Position of a node in its [`ReportTree`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReportId(usize);

impl ReportId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl std::fmt::Display for ReportId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Which specialisation a report node is
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReportKind {
    Workflow,
    Processor,
    Activity,
}

/// Variant-specific payload of a node
pub(crate) enum NodeKind {
    Workflow {
        processors: Vec<ReportId>,
        data_bundle: RwLock<Option<DataBundle>>,
    },
    Processor {
        activities: Vec<ReportId>,
        telemetry: ProcessorTelemetry,
    },
    Activity {
        nested: Option<ReportId>,
    },
}

impl NodeKind {
    pub(crate) fn workflow() -> Self {
        Self::Workflow {
            processors: Vec::new(),
            data_bundle: RwLock::new(None),
        }
    }

    pub(crate) fn processor() -> Self {
        Self::Processor {
            activities: Vec::new(),
            telemetry: ProcessorTelemetry::new(),
        }
    }

    pub(crate) fn activity() -> Self {
        Self::Activity { nested: None }
    }

    pub(crate) fn report_kind(&self) -> ReportKind {
        match self {
            Self::Workflow { .. } => ReportKind::Workflow,
            Self::Processor { .. } => ReportKind::Processor,
            Self::Activity { .. } => ReportKind::Activity,
        }
    }

    /// Record `child` under this node
    pub(crate) fn attach(&mut self, child: ReportId) {
        match self {
            Self::Workflow { processors, .. } => processors.push(child),
            Self::Processor { activities, .. } => activities.push(child),
            Self::Activity { nested } => *nested = Some(child),
        }
    }
}

/// A node waiting to be placed in a tree
pub(crate) struct NodeSpec {
    pub subject: Subject,
    pub parent: Option<ReportId>,
    pub kind: NodeKind,
}

/// Accumulates nodes in pre-order, wiring parent and child ids
#[derive(Default)]
pub(crate) struct TreeBuilder {
    specs: Vec<NodeSpec>,
}

impl TreeBuilder {
    pub(crate) fn push(
        &mut self,
        subject: Subject,
        parent: Option<ReportId>,
        kind: NodeKind,
    ) -> ReportId {
        let id = ReportId(self.specs.len());
        if let Some(parent) = parent {
            self.specs[parent.0].kind.attach(id);
        }
        self.specs.push(NodeSpec {
            subject,
            parent,
            kind,
        });
        id
    }

    pub(crate) fn finish(self) -> Arc<ReportTree> {
        Arc::new_cyclic(|weak: &Weak<ReportTree>| ReportTree {
            nodes: self
                .specs
                .into_iter()
                .enumerate()
                .map(|(i, spec)| {
                    let id = ReportId(i);
                    StatusReport::new(id, spec.subject, spec.parent, spec.kind, weak.clone())
                })
                .collect(),
        })
    }
}

// ── Report Tree ──────────────────────────────────────────────────────

/// Arena of every report node of one run
pub struct ReportTree {
    nodes: Vec<StatusReport>,
}

impl ReportTree {
    /// Materialise the full report tree for `workflow` under `profile`.
    ///
    /// Processor reports follow the workflow's processor order; activity
    /// reports follow the profile's binding order. Nested-workflow activities
    /// recurse into the named workflow of `bundle`.
    pub fn build(
        bundle: &WorkflowBundle,
        workflow: &Workflow,
        profile: &Profile,
    ) -> ReportResult<WorkflowReport> {
        let mut builder = TreeBuilder::default();
        let mut stack = Vec::new();
        build_workflow(&mut builder, bundle, workflow, profile, None, &mut stack)?;
        let tree = builder.finish();
        tracing::debug!(
            workflow = %workflow.name,
            nodes = tree.len(),
            "Built report tree"
        );
        Ok(WorkflowReport {
            tree,
            id: ReportId(0),
        })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: ReportId) -> Option<&StatusReport> {
        self.nodes.get(id.0)
    }

    /// All nodes in pre-order
    pub fn iter(&self) -> impl Iterator<Item = &StatusReport> {
        self.nodes.iter()
    }

    pub fn root(self: &Arc<Self>) -> Option<WorkflowReport> {
        WorkflowReport::new(self.clone(), ReportId(0))
    }

    /// Nodes from `id` up to the root, starting with `id` itself
    pub fn ancestors(&self, id: ReportId) -> impl Iterator<Item = &StatusReport> + '_ {
        std::iter::successors(self.node(id), move |node| {
            node.parent_id().and_then(|p| self.node(p))
        })
    }
}

fn build_workflow(
    builder: &mut TreeBuilder,
    bundle: &WorkflowBundle,
    workflow: &Workflow,
    profile: &Profile,
    parent: Option<ReportId>,
    stack: &mut Vec<String>,
) -> ReportResult<ReportId> {
    if stack.iter().any(|name| name == &workflow.name) {
        return Err(ReportError::RecursiveWorkflow(workflow.name.clone()));
    }
    stack.push(workflow.name.clone());

    let workflow_id = builder.push(bundle.workflow_subject(workflow), parent, NodeKind::workflow());
    for processor in &workflow.processors {
        let processor_id = builder.push(
            bundle.processor_subject(workflow, processor),
            Some(workflow_id),
            NodeKind::processor(),
        );
        for activity in profile.activities_for(&workflow.name, &processor.name) {
            let activity_id = builder.push(
                bundle.activity_subject(profile, activity),
                Some(processor_id),
                NodeKind::activity(),
            );
            if !activity.is_nested_workflow() {
                continue;
            }
            if let Some(nested_name) = activity.nested_workflow.as_deref() {
                let nested = bundle
                    .workflow(nested_name)
                    .ok_or_else(|| ReportError::UnknownNestedWorkflow(nested_name.to_string()))?;
                build_workflow(builder, bundle, nested, profile, Some(activity_id), stack)?;
            }
        }
    }

    stack.pop();
    Ok(workflow_id)
}

// ── Handles ──────────────────────────────────────────────────────────

macro_rules! report_handle {
    ($name:ident, $kind:ident) => {
        #[derive(Clone)]
        pub struct $name {
            tree: Arc<ReportTree>,
            id: ReportId,
        }

        impl $name {
            /// Handle to `id` if that node is of this kind
            pub fn new(tree: Arc<ReportTree>, id: ReportId) -> Option<Self> {
                let kind = tree.node(id)?.kind();
                (kind == ReportKind::$kind).then(|| Self { tree, id })
            }

            pub fn tree(&self) -> &Arc<ReportTree> {
                &self.tree
            }

            pub fn as_report(&self) -> ReportRef {
                ReportRef {
                    tree: self.tree.clone(),
                    id: self.id,
                }
            }

            pub fn ptr_eq(&self, other: &Self) -> bool {
                Arc::ptr_eq(&self.tree, &other.tree) && self.id == other.id
            }
        }

        impl Deref for $name {
            type Target = StatusReport;

            fn deref(&self) -> &StatusReport {
                &self.tree.nodes[self.id.0]
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                std::fmt::Debug::fmt(&**self, f)
            }
        }
    };
}

report_handle!(WorkflowReport, Workflow);
report_handle!(ProcessorReport, Processor);
report_handle!(ActivityReport, Activity);

/// Handle to a node of any kind
#[derive(Clone)]
pub struct ReportRef {
    tree: Arc<ReportTree>,
    id: ReportId,
}

impl ReportRef {
    pub fn new(tree: Arc<ReportTree>, id: ReportId) -> Option<Self> {
        tree.node(id)?;
        Some(Self { tree, id })
    }

    pub fn as_workflow(&self) -> Option<WorkflowReport> {
        WorkflowReport::new(self.tree.clone(), self.id)
    }

    pub fn as_processor(&self) -> Option<ProcessorReport> {
        ProcessorReport::new(self.tree.clone(), self.id)
    }

    pub fn as_activity(&self) -> Option<ActivityReport> {
        ActivityReport::new(self.tree.clone(), self.id)
    }

    pub fn parent_report(&self) -> Option<ReportRef> {
        let parent = self.parent_id()?;
        ReportRef::new(self.tree.clone(), parent)
    }
}

impl Deref for ReportRef {
    type Target = StatusReport;

    fn deref(&self) -> &StatusReport {
        &self.tree.nodes[self.id.0]
    }
}

impl std::fmt::Debug for ReportRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(&**self, f)
    }
}

impl StatusReport {
    /// The containing report, while the tree is alive
    pub fn parent_report(&self) -> Option<ReportRef> {
        let tree = self.tree()?;
        ReportRef::new(tree, self.parent_id()?)
    }
}

// ── Workflow Report ──────────────────────────────────────────────────

impl WorkflowReport {
    fn processor_ids(&self) -> &[ReportId] {
        match &self.kind {
            NodeKind::Workflow { processors, .. } => processors,
            _ => &[],
        }
    }

    pub fn processor_reports(&self) -> Vec<ProcessorReport> {
        self.processor_ids()
            .iter()
            .filter_map(|id| ProcessorReport::new(self.tree.clone(), *id))
            .collect()
    }

    pub fn processor_report(&self, name: &str) -> Option<ProcessorReport> {
        self.processor_reports()
            .into_iter()
            .find(|p| p.subject().name == name)
    }

    /// The activity report running this workflow, for nested workflows
    pub fn parent_report(&self) -> Option<ActivityReport> {
        ActivityReport::new(self.tree.clone(), self.parent_id()?)
    }

    pub fn is_root(&self) -> bool {
        self.parent_id().is_none()
    }

    /// Data bundle of this report, or of the nearest enclosing workflow
    pub fn data_bundle(&self) -> Option<DataBundle> {
        if let NodeKind::Workflow { data_bundle, .. } = &self.kind {
            if let Some(bundle) = data_bundle.read().clone() {
                return Some(bundle);
            }
        }
        let activity = self.parent_report()?;
        activity.parent_report()?.parent_report()?.data_bundle()
    }

    pub fn set_data_bundle(&self, bundle: DataBundle) {
        if let NodeKind::Workflow { data_bundle, .. } = &self.kind {
            *data_bundle.write() = Some(bundle);
        }
    }
}

// ── Processor Report ─────────────────────────────────────────────────

impl ProcessorReport {
    fn activity_ids(&self) -> &[ReportId] {
        match &self.kind {
            NodeKind::Processor { activities, .. } => activities,
            _ => &[],
        }
    }

    pub fn activity_reports(&self) -> Vec<ActivityReport> {
        self.activity_ids()
            .iter()
            .filter_map(|id| ActivityReport::new(self.tree.clone(), *id))
            .collect()
    }

    pub fn parent_report(&self) -> Option<WorkflowReport> {
        WorkflowReport::new(self.tree.clone(), self.parent_id()?)
    }

    pub fn telemetry(&self) -> &ProcessorTelemetry {
        match &self.kind {
            NodeKind::Processor { telemetry, .. } => telemetry,
            _ => unreachable!("processor handle on a non-processor node"),
        }
    }

    pub fn jobs_queued(&self) -> u64 {
        self.telemetry().counter(JOBS_QUEUED_PROPERTY)
    }

    pub fn set_jobs_queued(&self, jobs: u64) {
        self.telemetry().set_counter(JOBS_QUEUED_PROPERTY, jobs);
    }

    pub fn jobs_started(&self) -> u64 {
        self.telemetry().counter(JOBS_STARTED_PROPERTY)
    }

    pub fn set_jobs_started(&self, jobs: u64) {
        self.telemetry().set_counter(JOBS_STARTED_PROPERTY, jobs);
    }

    pub fn jobs_completed(&self) -> u64 {
        self.telemetry().counter(JOBS_COMPLETED_PROPERTY)
    }

    pub fn set_jobs_completed(&self, jobs: u64) {
        self.telemetry().set_counter(JOBS_COMPLETED_PROPERTY, jobs);
    }

    pub fn jobs_completed_with_errors(&self) -> u64 {
        self.telemetry().counter(JOBS_COMPLETED_WITH_ERRORS_PROPERTY)
    }

    pub fn set_jobs_completed_with_errors(&self, jobs: u64) {
        self.telemetry()
            .set_counter(JOBS_COMPLETED_WITH_ERRORS_PROPERTY, jobs);
    }

    pub fn property(&self, key: &str) -> Option<Value> {
        self.telemetry().property(key)
    }

    pub fn set_property(&self, key: impl Into<String>, value: Value) {
        self.telemetry().set_property(key, value);
    }

    pub fn bind_live_property(&self, key: impl Into<String>, property: Arc<dyn LiveProperty>) {
        self.telemetry().bind_live(key, property);
    }

    pub fn property_keys(&self) -> Vec<String> {
        self.telemetry().keys()
    }

    /// Freeze live telemetry into static values
    pub fn save_properties(&self) {
        self.telemetry().save_properties();
    }
}

// ── Activity Report ──────────────────────────────────────────────────

impl ActivityReport {
    pub fn parent_report(&self) -> Option<ProcessorReport> {
        ProcessorReport::new(self.tree.clone(), self.parent_id()?)
    }

    pub fn nested_workflow_report(&self) -> Option<WorkflowReport> {
        match &self.kind {
            NodeKind::Activity { nested: Some(id) } => WorkflowReport::new(self.tree.clone(), *id),
            _ => None,
        }
    }
}
