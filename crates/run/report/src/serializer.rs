//! JSON persistence of a report tree
//!
//! A run report document nests reports structurally: `processorReports`
//! under a workflow report, `activityReports` under a processor report and
//! an optional `nestedWorkflowReport` under an activity report. Subjects are
//! written as URIs and resolved against the workflow bundle on load.

use crate::invocation::{ContextId, Invocation, InvocationSnapshot};
use crate::tree::{NodeKind, ReportId, ReportTree, TreeBuilder};
use crate::{ParseError, ReportResult, ReportTimes, StatusReport, WorkflowReport};
use chrono::{DateTime, Utc};
use run_types::{DataBundle, DataPath, State, SubjectKind, WorkflowBundle};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::Arc;

/// Date layout used in report documents, e.g. `2013-01-02T13:37:00.000+0000`
pub const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f%z";

// ── Document ─────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReportDocument {
    subject: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    parent: Option<String>,
    state: String,
    created_date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    started_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    paused_date: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    paused_dates: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    resumed_date: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    resumed_dates: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    cancelled_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    failed_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    completed_date: Option<String>,
    #[serde(default)]
    invocations: Vec<InvocationDocument>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    properties: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    processor_reports: Option<Vec<ReportDocument>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    activity_reports: Option<Vec<ReportDocument>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    nested_workflow_report: Option<Box<ReportDocument>>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InvocationDocument {
    name: String,
    id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    parent: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    index: Vec<usize>,
    state: String,
    started_date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    completed_date: Option<String>,
    #[serde(default)]
    inputs: BTreeMap<String, String>,
    #[serde(default)]
    outputs: BTreeMap<String, String>,
}

fn format_date(date: &DateTime<Utc>) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn format_opt(date: &Option<DateTime<Utc>>) -> Option<String> {
    date.as_ref().map(format_date)
}

fn parse_date(field: &str, value: &str) -> Result<DateTime<Utc>, ParseError> {
    DateTime::parse_from_str(value, DATE_FORMAT)
        .or_else(|_| DateTime::parse_from_rfc3339(value))
        .map(|d| d.with_timezone(&Utc))
        .map_err(|_| ParseError::InvalidDate {
            field: field.to_string(),
            value: value.to_string(),
        })
}

fn parse_opt(field: &str, value: &Option<String>) -> Result<Option<DateTime<Utc>>, ParseError> {
    value.as_deref().map(|v| parse_date(field, v)).transpose()
}

fn parse_state(field: &str, value: &str) -> Result<State, ParseError> {
    value.parse().map_err(|_| ParseError::UnknownState {
        field: field.to_string(),
        value: value.to_string(),
    })
}

// ── Writing ──────────────────────────────────────────────────────────

fn report_document(tree: &Arc<ReportTree>, node: &StatusReport) -> ReportDocument {
    let times = node.times();
    let mut doc = ReportDocument {
        subject: node.subject().uri.clone(),
        parent: node
            .parent_id()
            .and_then(|p| tree.node(p))
            .map(|p| p.subject().uri.clone()),
        state: times.state.as_str().to_string(),
        created_date: format_date(&times.created_date),
        started_date: format_opt(&times.started_date),
        paused_date: format_opt(&times.paused_date),
        paused_dates: times.paused_dates.iter().map(format_date).collect(),
        resumed_date: format_opt(&times.resumed_date),
        resumed_dates: times.resumed_dates.iter().map(format_date).collect(),
        cancelled_date: format_opt(&times.cancelled_date),
        failed_date: format_opt(&times.failed_date),
        completed_date: format_opt(&times.completed_date),
        invocations: node.invocations().iter().map(|i| invocation_document(i)).collect(),
        properties: BTreeMap::new(),
        processor_reports: None,
        activity_reports: None,
        nested_workflow_report: None,
    };
    let children = |ids: &[ReportId]| -> Vec<ReportDocument> {
        ids.iter()
            .filter_map(|id| tree.node(*id))
            .map(|child| report_document(tree, child))
            .collect()
    };
    match &node.kind {
        NodeKind::Workflow { processors, .. } => {
            doc.processor_reports = Some(children(processors));
        }
        NodeKind::Processor {
            activities,
            telemetry,
        } => {
            doc.properties = telemetry.static_properties();
            doc.activity_reports = Some(children(activities));
        }
        NodeKind::Activity { nested } => {
            doc.nested_workflow_report = (*nested)
                .and_then(|id| tree.node(id))
                .map(|child| Box::new(report_document(tree, child)));
        }
    }
    doc
}

fn invocation_document(invocation: &Invocation) -> InvocationDocument {
    let snapshot = invocation.snapshot();
    let bound = |ports: BTreeMap<String, Option<DataPath>>| -> BTreeMap<String, String> {
        ports
            .into_iter()
            .filter_map(|(port, path)| path.map(|p| (port, String::from(p))))
            .collect()
    };
    InvocationDocument {
        name: invocation.name().to_string(),
        id: invocation.id(),
        parent: invocation.parent_id(),
        index: invocation.index().to_vec(),
        state: snapshot.state.as_str().to_string(),
        started_date: format_date(&snapshot.started_date),
        completed_date: format_opt(&snapshot.completed_date),
        inputs: bound(snapshot.inputs),
        outputs: bound(snapshot.outputs),
    }
}

// ── Reading ──────────────────────────────────────────────────────────

/// First pass: resolve subjects and lay out the arena in pre-order
fn layout<'d>(
    builder: &mut TreeBuilder,
    bundle: &WorkflowBundle,
    doc: &'d ReportDocument,
    expected: SubjectKind,
    parent: Option<ReportId>,
    order: &mut Vec<(ReportId, &'d ReportDocument)>,
) -> Result<(), ParseError> {
    let subject = bundle
        .resolve_subject(&doc.subject)
        .ok_or_else(|| ParseError::UnresolvedSubject {
            uri: doc.subject.clone(),
        })?;
    if subject.kind != expected {
        return Err(ParseError::SubjectKindMismatch {
            uri: doc.subject.clone(),
            expected,
            found: subject.kind,
        });
    }
    let kind = match expected {
        SubjectKind::Workflow => NodeKind::workflow(),
        SubjectKind::Processor => NodeKind::processor(),
        SubjectKind::Activity => NodeKind::activity(),
    };
    let id = builder.push(subject, parent, kind);
    order.push((id, doc));

    match expected {
        SubjectKind::Workflow => {
            for child in doc.processor_reports.iter().flatten() {
                layout(builder, bundle, child, SubjectKind::Processor, Some(id), order)?;
            }
        }
        SubjectKind::Processor => {
            for child in doc.activity_reports.iter().flatten() {
                layout(builder, bundle, child, SubjectKind::Activity, Some(id), order)?;
            }
        }
        SubjectKind::Activity => {
            if let Some(child) = &doc.nested_workflow_report {
                layout(builder, bundle, child, SubjectKind::Workflow, Some(id), order)?;
            }
        }
    }
    Ok(())
}

fn restore_times(doc: &ReportDocument) -> Result<ReportTimes, ParseError> {
    let dates = |field: &str, values: &[String]| -> Result<Vec<DateTime<Utc>>, ParseError> {
        values.iter().map(|v| parse_date(field, v)).collect()
    };
    Ok(ReportTimes {
        state: parse_state("state", &doc.state)?,
        created_date: parse_date("createdDate", &doc.created_date)?,
        started_date: parse_opt("startedDate", &doc.started_date)?,
        paused_date: parse_opt("pausedDate", &doc.paused_date)?,
        paused_dates: dates("pausedDates", &doc.paused_dates)?,
        resumed_date: parse_opt("resumedDate", &doc.resumed_date)?,
        resumed_dates: dates("resumedDates", &doc.resumed_dates)?,
        cancelled_date: parse_opt("cancelledDate", &doc.cancelled_date)?,
        completed_date: parse_opt("completedDate", &doc.completed_date)?,
        failed_date: parse_opt("failedDate", &doc.failed_date)?,
    })
}

/// Find a parent invocation in `id` or any enclosing report
fn find_parent(tree: &ReportTree, id: ReportId, parent: &str) -> Option<Arc<Invocation>> {
    tree.ancestors(id).find_map(|node| node.get_invocation(parent))
}

fn restore_ports(
    invocation: &str,
    declared: &[String],
    bound: &BTreeMap<String, String>,
) -> Result<BTreeMap<String, Option<DataPath>>, ParseError> {
    let mut ports: BTreeMap<String, Option<DataPath>> =
        declared.iter().map(|p| (p.clone(), None)).collect();
    for (port, value) in bound {
        let slot = ports.get_mut(port).ok_or_else(|| ParseError::UnknownPort {
            invocation: invocation.to_string(),
            port: port.clone(),
        })?;
        let path = DataPath::new(value.clone()).map_err(|_| ParseError::InvalidDataPath {
            invocation: invocation.to_string(),
            port: port.clone(),
            value: value.clone(),
        })?;
        *slot = Some(path);
    }
    Ok(ports)
}

fn restore_invocations(
    tree: &ReportTree,
    node: &StatusReport,
    docs: &[InvocationDocument],
) -> Result<(), ParseError> {
    // Shorter ids first, so parents under the same report precede children
    let mut docs: Vec<&InvocationDocument> = docs.iter().collect();
    docs.sort_by_key(|d| ContextId::new(d.id.clone()));

    for doc in docs {
        let parent = match &doc.parent {
            Some(parent_id) => Some(find_parent(tree, node.id(), parent_id).ok_or_else(|| {
                ParseError::UnknownParentInvocation {
                    invocation: doc.id.clone(),
                    parent: parent_id.clone(),
                }
            })?),
            None => None,
        };
        let parent_context = parent.as_ref().map(|p| p.context_id());
        let expected = ContextId::child(parent_context.as_ref(), &doc.name);
        if expected.as_str() != doc.id {
            return Err(ParseError::InvocationIdMismatch {
                expected: expected.into_string(),
                found: doc.id.clone(),
            });
        }

        let state = parse_state("state", &doc.state)?;
        if !matches!(state, State::Running | State::Completed) {
            return Err(ParseError::InvalidInvocationState {
                invocation: doc.id.clone(),
                value: doc.state.clone(),
            });
        }
        let subject = node.subject();
        let snapshot = InvocationSnapshot {
            state,
            started_date: parse_date("startedDate", &doc.started_date)?,
            completed_date: parse_opt("completedDate", &doc.completed_date)?,
            inputs: restore_ports(&doc.id, &subject.input_ports, &doc.inputs)?,
            outputs: restore_ports(&doc.id, &subject.output_ports, &doc.outputs)?,
        };
        Invocation::restore(doc.name.clone(), doc.index.clone(), parent.as_ref(), node, snapshot)
            .map_err(|_| ParseError::DuplicateInvocation(doc.id.clone()))?;
    }
    Ok(())
}

// ── Serializer ───────────────────────────────────────────────────────

/// Reads and writes run report documents
#[derive(Clone, Debug)]
pub struct ReportSerializer {
    pretty: bool,
}

impl Default for ReportSerializer {
    fn default() -> Self {
        Self { pretty: true }
    }
}

impl ReportSerializer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Single-line output
    pub fn compact() -> Self {
        Self { pretty: false }
    }

    pub fn to_string(&self, report: &WorkflowReport) -> ReportResult<String> {
        let doc = report_document(report.tree(), report);
        let json = if self.pretty {
            serde_json::to_string_pretty(&doc)?
        } else {
            serde_json::to_string(&doc)?
        };
        Ok(json)
    }

    pub fn to_writer<W: Write>(&self, report: &WorkflowReport, writer: W) -> ReportResult<()> {
        let doc = report_document(report.tree(), report);
        if self.pretty {
            serde_json::to_writer_pretty(writer, &doc)?;
        } else {
            serde_json::to_writer(writer, &doc)?;
        }
        Ok(())
    }

    pub fn save(&self, report: &WorkflowReport, path: impl AsRef<Path>) -> ReportResult<()> {
        let path = path.as_ref();
        let json = self.to_string(report)?;
        std::fs::write(path, json)?;
        tracing::debug!(path = %path.display(), "Saved run report");
        Ok(())
    }

    /// Rebuild a report tree from a document.
    ///
    /// Subjects resolve against `bundle`; invocation paths are relative to
    /// `data_bundle`, which becomes the root report's data bundle.
    pub fn from_str(
        &self,
        json: &str,
        bundle: &WorkflowBundle,
        data_bundle: Option<DataBundle>,
    ) -> Result<WorkflowReport, ParseError> {
        let doc: ReportDocument = serde_json::from_str(json)?;
        self.rebuild(&doc, bundle, data_bundle)
    }

    pub fn from_reader<R: Read>(
        &self,
        reader: R,
        bundle: &WorkflowBundle,
        data_bundle: Option<DataBundle>,
    ) -> Result<WorkflowReport, ParseError> {
        let doc: ReportDocument = serde_json::from_reader(reader)?;
        self.rebuild(&doc, bundle, data_bundle)
    }

    pub fn load(
        &self,
        path: impl AsRef<Path>,
        bundle: &WorkflowBundle,
        data_bundle: Option<DataBundle>,
    ) -> ReportResult<WorkflowReport> {
        let file = std::fs::File::open(path.as_ref())?;
        let report = self.from_reader(std::io::BufReader::new(file), bundle, data_bundle)?;
        Ok(report)
    }

    fn rebuild(
        &self,
        doc: &ReportDocument,
        bundle: &WorkflowBundle,
        data_bundle: Option<DataBundle>,
    ) -> Result<WorkflowReport, ParseError> {
        let mut builder = TreeBuilder::default();
        let mut order = Vec::new();
        layout(&mut builder, bundle, doc, SubjectKind::Workflow, None, &mut order)?;
        let tree = builder.finish();

        // Pre-order: every ancestor's invocations exist before its children's
        for (id, doc) in order {
            let node = tree
                .node(id)
                .ok_or_else(|| ParseError::UnresolvedSubject {
                    uri: doc.subject.clone(),
                })?;
            node.restore_times(restore_times(doc)?);
            if let NodeKind::Processor { telemetry, .. } = &node.kind {
                telemetry.restore(doc.properties.clone());
            }
            restore_invocations(&tree, node, &doc.invocations)?;
        }

        let report = tree.root().ok_or_else(|| ParseError::UnresolvedSubject {
            uri: doc.subject.clone(),
        })?;
        if let Some(data_bundle) = data_bundle {
            report.set_data_bundle(data_bundle);
        }
        Ok(report)
    }
}
