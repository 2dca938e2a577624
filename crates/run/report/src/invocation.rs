//! Invocations: concrete firings of a report's subject

use crate::tree::{ReportId, ReportRef, ReportTree};
use crate::{ReportError, ReportResult, StatusReport};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use run_types::{now_millis, DataPath, State};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

/// Separator between invocation names in a context id
pub const CONTEXT_SEPARATOR: char = '/';

// ── Context Id ───────────────────────────────────────────────────────

/// Slash-joined path of invocation names from the root invocation.
///
/// Orders shorter ids first, then lexicographically among equal lengths,
/// so `invoc5 < invoc49`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ContextId(String);

impl ContextId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Id of `name` under an optional parent id
    pub fn child(parent: Option<&ContextId>, name: &str) -> Self {
        match parent {
            Some(parent) => Self(format!("{}{}{}", parent.0, CONTEXT_SEPARATOR, name)),
            None => Self(name.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl Ord for ContextId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .len()
            .cmp(&other.0.len())
            .then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for ContextId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl std::fmt::Display for ContextId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ── Invocation ───────────────────────────────────────────────────────

/// Mutable part of an invocation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InvocationSnapshot {
    /// `Running` or `Completed`
    pub state: State,
    pub started_date: DateTime<Utc>,
    pub completed_date: Option<DateTime<Utc>>,
    /// Every declared input port, `None` until bound
    pub inputs: BTreeMap<String, Option<DataPath>>,
    /// Every declared output port, `None` until bound
    pub outputs: BTreeMap<String, Option<DataPath>>,
}

/// One firing of a report's subject at an iteration index
pub struct Invocation {
    name: String,
    index: Vec<usize>,
    parent: Option<Arc<Invocation>>,
    tree: Weak<ReportTree>,
    report: ReportId,
    inner: Mutex<InvocationSnapshot>,
    children: Mutex<Vec<Weak<Invocation>>>,
}

impl Invocation {
    /// Create an invocation and register it with `report` and `parent`.
    ///
    /// The invocation starts `Running`, stamped now, with every port of the
    /// report's subject present and unbound.
    pub fn new(
        name: impl Into<String>,
        index: Vec<usize>,
        parent: Option<&Arc<Invocation>>,
        report: &StatusReport,
    ) -> ReportResult<Arc<Self>> {
        let subject = report.subject();
        let unbound = |ports: &[String]| -> BTreeMap<String, Option<DataPath>> {
            ports.iter().map(|p| (p.clone(), None)).collect()
        };
        let snapshot = InvocationSnapshot {
            state: State::Running,
            started_date: now_millis(),
            completed_date: None,
            inputs: unbound(&subject.input_ports),
            outputs: unbound(&subject.output_ports),
        };
        Self::restore(name, index, parent, report, snapshot)
    }

    /// Recreate an invocation with previously recorded state
    pub(crate) fn restore(
        name: impl Into<String>,
        index: Vec<usize>,
        parent: Option<&Arc<Invocation>>,
        report: &StatusReport,
        snapshot: InvocationSnapshot,
    ) -> ReportResult<Arc<Self>> {
        let invocation = Arc::new(Self {
            name: name.into(),
            index,
            parent: parent.cloned(),
            tree: report.tree_weak().clone(),
            report: report.id(),
            inner: Mutex::new(snapshot),
            children: Mutex::new(Vec::new()),
        });
        report.register_invocation(invocation.clone())?;
        if let Some(parent) = parent {
            parent.children.lock().push(Arc::downgrade(&invocation));
        }
        Ok(invocation)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn index(&self) -> &[usize] {
        &self.index
    }

    pub fn parent(&self) -> Option<&Arc<Invocation>> {
        self.parent.as_ref()
    }

    /// Context id computed from the parent chain
    pub fn context_id(&self) -> ContextId {
        let mut names = vec![self.name.as_str()];
        let mut current = self.parent.as_deref();
        while let Some(inv) = current {
            names.push(inv.name.as_str());
            current = inv.parent.as_deref();
        }
        names.reverse();
        ContextId(names.join(&CONTEXT_SEPARATOR.to_string()))
    }

    pub fn id(&self) -> String {
        self.context_id().into_string()
    }

    pub fn parent_id(&self) -> Option<String> {
        self.parent.as_ref().map(|p| p.id())
    }

    pub fn report_id(&self) -> ReportId {
        self.report
    }

    /// The owning report, while its tree is alive
    pub fn report(&self) -> Option<ReportRef> {
        let tree = self.tree.upgrade()?;
        ReportRef::new(tree, self.report)
    }

    /// Child invocations still alive, in creation order
    pub fn children(&self) -> Vec<Arc<Invocation>> {
        self.children
            .lock()
            .iter()
            .filter_map(Weak::upgrade)
            .collect()
    }

    pub fn snapshot(&self) -> InvocationSnapshot {
        self.inner.lock().clone()
    }

    pub fn state(&self) -> State {
        self.inner.lock().state
    }

    pub fn started_date(&self) -> DateTime<Utc> {
        self.inner.lock().started_date
    }

    pub fn completed_date(&self) -> Option<DateTime<Utc>> {
        self.inner.lock().completed_date
    }

    /// Mark completed; the first completion date wins
    pub fn set_completed_date(&self, at: DateTime<Utc>) {
        let mut inner = self.inner.lock();
        inner.completed_date.get_or_insert(at);
        inner.state = State::Completed;
    }

    pub fn inputs(&self) -> BTreeMap<String, Option<DataPath>> {
        self.inner.lock().inputs.clone()
    }

    pub fn outputs(&self) -> BTreeMap<String, Option<DataPath>> {
        self.inner.lock().outputs.clone()
    }

    pub fn input(&self, port: &str) -> Option<DataPath> {
        self.inner.lock().inputs.get(port).cloned().flatten()
    }

    pub fn output(&self, port: &str) -> Option<DataPath> {
        self.inner.lock().outputs.get(port).cloned().flatten()
    }

    /// Bind a value locator to a declared input port
    pub fn set_input(&self, port: &str, path: DataPath) -> ReportResult<()> {
        let mut inner = self.inner.lock();
        match inner.inputs.get_mut(port) {
            Some(slot) => {
                *slot = Some(path);
                Ok(())
            }
            None => Err(self.unknown_port(port)),
        }
    }

    /// Bind a value locator to a declared output port and tell the
    /// owning report's listeners.
    pub fn set_output(&self, port: &str, path: DataPath) -> ReportResult<()> {
        {
            let mut inner = self.inner.lock();
            match inner.outputs.get_mut(port) {
                Some(slot) => *slot = Some(path.clone()),
                None => return Err(self.unknown_port(port)),
            }
        }
        if let Some(report) = self.report() {
            report.output_added(&path, port, &self.index);
        }
        Ok(())
    }

    fn unknown_port(&self, port: &str) -> ReportError {
        ReportError::UnknownPort {
            subject: self.id(),
            port: port.to_string(),
        }
    }
}

impl PartialEq for Invocation {
    fn eq(&self, other: &Self) -> bool {
        self.context_id() == other.context_id()
    }
}

impl Eq for Invocation {}

impl Ord for Invocation {
    fn cmp(&self, other: &Self) -> Ordering {
        self.context_id().cmp(&other.context_id())
    }
}

impl PartialOrd for Invocation {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl std::fmt::Debug for Invocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Invocation")
            .field("id", &self.id())
            .field("index", &self.index)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{hello_report, RecordingListener};
    use proptest::prelude::*;

    #[test]
    fn test_context_id_ordering() {
        assert!(ContextId::new("invoc5") < ContextId::new("invoc49"));
        assert!(ContextId::new("a5") < ContextId::new("a49"));
        assert!(ContextId::new("b1") > ContextId::new("a1"));
        assert_eq!(
            ContextId::new("x").cmp(&ContextId::new("x")),
            Ordering::Equal
        );
    }

    #[test]
    fn test_root_invocation() {
        let report = hello_report();
        let inv = Invocation::new("wf0", vec![], None, &report).unwrap();
        assert_eq!(inv.id(), "wf0");
        assert_eq!(inv.state(), State::Running);
        assert!(inv.parent().is_none());
        assert!(inv.completed_date().is_none());
        assert_eq!(report.invocation_count(), 1);
    }

    #[test]
    fn test_ports_prepopulated() {
        let report = hello_report();
        let inv = Invocation::new("wf0", vec![], None, &report).unwrap();
        let inputs = inv.inputs();
        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs.get("name"), Some(&None));
        assert_eq!(inv.outputs().get("greeting"), Some(&None));
    }

    #[test]
    fn test_child_registration() {
        let report = hello_report();
        let proc = report.processor_report("hello").unwrap();
        let root = Invocation::new("wf0", vec![], None, &report).unwrap();
        let child = Invocation::new("proc-hello0", vec![0], Some(&root), &proc).unwrap();

        assert_eq!(child.id(), "wf0/proc-hello0");
        assert_eq!(child.parent_id().as_deref(), Some("wf0"));
        assert_eq!(root.children().len(), 1);
        assert!(Arc::ptr_eq(&root.children()[0], &child));
        assert!(proc.get_invocation("wf0/proc-hello0").is_some());
        assert!(report.get_invocation("wf0/proc-hello0").is_none());
        assert_eq!(child.state(), State::Running);
        assert!(child.started_date() >= root.started_date());
    }

    #[test]
    fn test_duplicate_invocation_rejected() {
        let report = hello_report();
        Invocation::new("wf0", vec![], None, &report).unwrap();
        let result = Invocation::new("wf0", vec![], None, &report);
        assert!(matches!(result, Err(ReportError::DuplicateInvocation { .. })));
        assert_eq!(report.invocation_count(), 1);
    }

    #[test]
    fn test_bind_ports() {
        let report = hello_report();
        let inv = Invocation::new("wf0", vec![], None, &report).unwrap();
        inv.set_input("name", DataPath::input("name")).unwrap();
        assert_eq!(inv.input("name"), Some(DataPath::input("name")));
        assert!(matches!(
            inv.set_input("nope", DataPath::input("nope")),
            Err(ReportError::UnknownPort { .. })
        ));
        assert!(inv.set_output("name", DataPath::output("name")).is_err());
    }

    #[test]
    fn test_set_output_notifies_report() {
        let report = hello_report();
        let listener = Arc::new(RecordingListener::default());
        report.add_listener(listener.clone());
        let inv = Invocation::new("wf0", vec![2], None, &report).unwrap();

        inv.set_output("greeting", DataPath::output("greeting")).unwrap();
        assert_eq!(
            listener.outputs(),
            vec![("outputs/greeting".to_string(), "greeting".to_string(), vec![2])]
        );
    }

    #[test]
    fn test_completion() {
        let report = hello_report();
        let inv = Invocation::new("wf0", vec![], None, &report).unwrap();
        let first = now_millis();
        inv.set_completed_date(first);
        inv.set_completed_date(first + chrono::Duration::seconds(3));
        assert_eq!(inv.state(), State::Completed);
        assert_eq!(inv.completed_date(), Some(first));
    }

    #[test]
    fn test_report_back_reference() {
        let report = hello_report();
        let inv = Invocation::new("wf0", vec![], None, &report).unwrap();
        let owner = inv.report().unwrap();
        assert_eq!(owner.id(), report.id());
        assert!(owner.as_workflow().is_some());
    }

    proptest! {
        #[test]
        fn test_shorter_ids_sort_first(a in "[a-z0-9/]{1,12}", b in "[a-z0-9/]{1,12}") {
            let (ca, cb) = (ContextId::new(a.clone()), ContextId::new(b.clone()));
            if a.len() < b.len() {
                prop_assert!(ca < cb);
            } else if a.len() > b.len() {
                prop_assert!(ca > cb);
            } else {
                prop_assert_eq!(ca.cmp(&cb), a.cmp(&b));
            }
            prop_assert_eq!(ca == cb, a == b);
        }

        #[test]
        fn test_lookup_finds_every_invocation(
            names in proptest::collection::btree_set("[a-z]{1,3}[0-9]{1,3}", 1..20)
        ) {
            let report = hello_report();
            for name in &names {
                Invocation::new(name.clone(), vec![], None, &report).unwrap();
            }
            for name in &names {
                let found = report.get_invocation(name);
                prop_assert_eq!(found.map(|i| i.id()), Some(name.clone()));
            }
            prop_assert!(report.get_invocation("zzzz9999").is_none());

            let ids: Vec<ContextId> = report.invocations().iter().map(|i| i.context_id()).collect();
            let mut sorted = ids.clone();
            sorted.sort();
            prop_assert_eq!(ids, sorted);
        }
    }
}
