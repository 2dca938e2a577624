//! The status report node: one state machine in the report tree
//!
//! Every state-setting method stamps its timestamp and moves the node to the
//! state the method names, then notifies listeners if the state changed.
//! Guarding which transitions are *allowed* is the caller's job (see
//! [`Transition::is_permitted_from`]); the report records what happened.

use crate::invocation::{ContextId, Invocation};
use crate::tree::{NodeKind, ReportId, ReportKind, ReportTree};
use crate::{ReportError, ReportListener, ReportResult};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, ReentrantMutex, RwLock};
use run_types::{now_millis, DataPath, State, Subject, Transition};
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

// ── Report Times ─────────────────────────────────────────────────────

/// State and timestamps of a report node
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReportTimes {
    pub state: State,
    /// Set once, at construction
    pub created_date: DateTime<Utc>,
    /// First start wins
    pub started_date: Option<DateTime<Utc>>,
    /// Latest pause; always the last element of `paused_dates`
    pub paused_date: Option<DateTime<Utc>>,
    pub paused_dates: Vec<DateTime<Utc>>,
    /// Latest resume; always the last element of `resumed_dates`
    pub resumed_date: Option<DateTime<Utc>>,
    pub resumed_dates: Vec<DateTime<Utc>>,
    pub cancelled_date: Option<DateTime<Utc>>,
    pub completed_date: Option<DateTime<Utc>>,
    pub failed_date: Option<DateTime<Utc>>,
}

impl ReportTimes {
    pub fn new(created_date: DateTime<Utc>) -> Self {
        Self {
            state: State::Created,
            created_date,
            started_date: None,
            paused_date: None,
            paused_dates: Vec::new(),
            resumed_date: None,
            resumed_dates: Vec::new(),
            cancelled_date: None,
            completed_date: None,
            failed_date: None,
        }
    }

    fn stamp(&mut self, transition: Transition, at: DateTime<Utc>) {
        match transition {
            Transition::Start => {
                self.started_date.get_or_insert(at);
            }
            Transition::Pause => {
                self.paused_date = Some(at);
                self.paused_dates.push(at);
            }
            Transition::Resume => {
                self.resumed_date = Some(at);
                self.resumed_dates.push(at);
            }
            Transition::Cancel => {
                self.cancelled_date.get_or_insert(at);
            }
            Transition::Complete => {
                self.completed_date.get_or_insert(at);
            }
            Transition::Fail => {
                self.failed_date.get_or_insert(at);
            }
        }
    }

    fn enter(&mut self, transition: Transition, at: DateTime<Utc>) {
        self.stamp(transition, at);
        self.state = transition.target();
    }
}

// ── Status Report ────────────────────────────────────────────────────

/// A node of the report tree
pub struct StatusReport {
    id: ReportId,
    subject: Subject,
    parent: Option<ReportId>,
    pub(crate) kind: NodeKind,
    tree: Weak<ReportTree>,
    /// Held across a state change and its notifications, so listeners see
    /// changes in the order they were applied
    dispatch: ReentrantMutex<()>,
    times: Mutex<ReportTimes>,
    invocations: Mutex<BTreeMap<ContextId, Arc<Invocation>>>,
    listeners: RwLock<Vec<Arc<dyn ReportListener>>>,
}

impl StatusReport {
    pub(crate) fn new(
        id: ReportId,
        subject: Subject,
        parent: Option<ReportId>,
        kind: NodeKind,
        tree: Weak<ReportTree>,
    ) -> Self {
        Self {
            id,
            subject,
            parent,
            kind,
            tree,
            dispatch: ReentrantMutex::new(()),
            times: Mutex::new(ReportTimes::new(now_millis())),
            invocations: Mutex::new(BTreeMap::new()),
            listeners: RwLock::new(Vec::new()),
        }
    }

    pub fn id(&self) -> ReportId {
        self.id
    }

    pub fn subject(&self) -> &Subject {
        &self.subject
    }

    /// The logically containing report, if any
    pub fn parent_id(&self) -> Option<ReportId> {
        self.parent
    }

    pub fn kind(&self) -> ReportKind {
        self.kind.report_kind()
    }

    /// The tree this node lives in, while it is still alive
    pub fn tree(&self) -> Option<Arc<ReportTree>> {
        self.tree.upgrade()
    }

    pub(crate) fn tree_weak(&self) -> &Weak<ReportTree> {
        &self.tree
    }

    // ── State ────────────────────────────────────────────────────────

    pub fn state(&self) -> State {
        self.times.lock().state
    }

    /// Snapshot of the state and every timestamp
    pub fn times(&self) -> ReportTimes {
        self.times.lock().clone()
    }

    pub fn created_date(&self) -> DateTime<Utc> {
        self.times.lock().created_date
    }

    pub fn started_date(&self) -> Option<DateTime<Utc>> {
        self.times.lock().started_date
    }

    pub fn paused_date(&self) -> Option<DateTime<Utc>> {
        self.times.lock().paused_date
    }

    pub fn paused_dates(&self) -> Vec<DateTime<Utc>> {
        self.times.lock().paused_dates.clone()
    }

    pub fn resumed_date(&self) -> Option<DateTime<Utc>> {
        self.times.lock().resumed_date
    }

    pub fn resumed_dates(&self) -> Vec<DateTime<Utc>> {
        self.times.lock().resumed_dates.clone()
    }

    pub fn cancelled_date(&self) -> Option<DateTime<Utc>> {
        self.times.lock().cancelled_date
    }

    pub fn completed_date(&self) -> Option<DateTime<Utc>> {
        self.times.lock().completed_date
    }

    pub fn failed_date(&self) -> Option<DateTime<Utc>> {
        self.times.lock().failed_date
    }

    pub fn set_started_date(&self, at: DateTime<Utc>) {
        self.record(Transition::Start, at);
    }

    pub fn set_paused_date(&self, at: DateTime<Utc>) {
        self.record(Transition::Pause, at);
    }

    pub fn set_resumed_date(&self, at: DateTime<Utc>) {
        self.record(Transition::Resume, at);
    }

    pub fn set_cancelled_date(&self, at: DateTime<Utc>) {
        self.record(Transition::Cancel, at);
    }

    pub fn set_completed_date(&self, at: DateTime<Utc>) {
        self.record(Transition::Complete, at);
    }

    pub fn set_failed_date(&self, at: DateTime<Utc>) {
        self.record(Transition::Fail, at);
    }

    /// Stamp `transition` and enter its target state. Returns the old state.
    pub fn record(&self, transition: Transition, at: DateTime<Utc>) -> State {
        match self.apply_if(|_| true, |times| times.enter(transition, at)) {
            Ok(old) | Err(old) => old,
        }
    }

    /// Like [`record`](Self::record), but leaves a terminal report untouched.
    ///
    /// Returns whether the transition was applied.
    pub fn record_unless_terminal(&self, transition: Transition, at: DateTime<Utc>) -> bool {
        self.apply_if(|state| !state.is_terminal(), |times| times.enter(transition, at)).is_ok()
    }

    /// Like [`record`](Self::record), but only while the report is in
    /// `expected`.
    ///
    /// Returns whether the transition was applied.
    pub fn record_from(&self, expected: State, transition: Transition, at: DateTime<Utc>) -> bool {
        self.apply_if(|state| state == expected, |times| times.enter(transition, at)).is_ok()
    }

    /// Replace the state without stamping any date.
    ///
    /// Listeners are notified if the state changed.
    pub fn set_state(&self, state: State) {
        let _ = self.apply_if(|_| true, |times| times.state = state);
    }

    /// Apply `update` if `allowed` accepts the current state, then notify
    /// listeners of any change. `Ok` carries the state before the update,
    /// `Err` the state that refused it.
    fn apply_if(
        &self,
        allowed: impl FnOnce(State) -> bool,
        update: impl FnOnce(&mut ReportTimes),
    ) -> Result<State, State> {
        let _dispatch = self.dispatch.lock();
        let (old, new) = {
            let mut times = self.times.lock();
            let old = times.state;
            if !allowed(old) {
                return Err(old);
            }
            update(&mut times);
            (old, times.state)
        };
        if old != new {
            self.notify_state_changed(old, new);
        }
        Ok(old)
    }

    pub(crate) fn restore_times(&self, times: ReportTimes) {
        *self.times.lock() = times;
    }

    // ── Listeners ────────────────────────────────────────────────────

    pub fn add_listener(&self, listener: Arc<dyn ReportListener>) {
        self.listeners.write().push(listener);
    }

    /// Remove a previously added listener. Returns whether it was registered.
    pub fn remove_listener(&self, listener: &Arc<dyn ReportListener>) -> bool {
        let target = Arc::as_ptr(listener) as *const ();
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|l| Arc::as_ptr(l) as *const () != target);
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    fn listeners_snapshot(&self) -> Vec<Arc<dyn ReportListener>> {
        self.listeners.read().clone()
    }

    fn notify_state_changed(&self, old: State, new: State) {
        tracing::debug!(subject = %self.subject, ?old, ?new, "Report state changed");
        for listener in self.listeners_snapshot() {
            listener.state_changed(self, old, new);
        }
    }

    /// Tell listeners a value was bound to an output port under this report
    pub fn output_added(&self, path: &DataPath, port: &str, index: &[usize]) {
        for listener in self.listeners_snapshot() {
            listener.output_added(self, path, port, index);
        }
    }

    // ── Invocations ──────────────────────────────────────────────────

    /// All invocations, shortest context id first
    pub fn invocations(&self) -> Vec<Arc<Invocation>> {
        self.invocations.lock().values().cloned().collect()
    }

    pub fn invocation_count(&self) -> usize {
        self.invocations.lock().len()
    }

    /// Look up an invocation by context id.
    ///
    /// Seeks to the first entry not ordered before `id` and accepts it
    /// only if its id is equal.
    pub fn get_invocation(&self, id: &str) -> Option<Arc<Invocation>> {
        let target = ContextId::new(id);
        let invocations = self.invocations.lock();
        invocations
            .range(target.clone()..)
            .next()
            .filter(|(key, _)| **key == target)
            .map(|(_, invocation)| invocation.clone())
    }

    pub(crate) fn register_invocation(&self, invocation: Arc<Invocation>) -> ReportResult<()> {
        let key = invocation.context_id();
        let mut invocations = self.invocations.lock();
        if invocations.contains_key(&key) {
            return Err(ReportError::DuplicateInvocation {
                report: self.subject.uri.clone(),
                id: key.into_string(),
            });
        }
        invocations.insert(key, invocation);
        Ok(())
    }
}

impl std::fmt::Debug for StatusReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusReport")
            .field("id", &self.id)
            .field("subject", &self.subject.uri)
            .field("kind", &self.kind())
            .field("state", &self.state())
            .finish()
    }
}
