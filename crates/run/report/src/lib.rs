//! Run Status Reports
//!
//! A run's progress is modelled as a tree of status reports mirroring the
//! workflow it executes:
//!
//! ```text
//! WorkflowReport
//! └── ProcessorReport        (one per processor)
//!     └── ActivityReport     (one per bound activity)
//!         └── WorkflowReport (nested workflow, recursing to any depth)
//! ```
//!
//! Every node is a [`StatusReport`] state machine with timestamps, a set of
//! [`Invocation`]s recording concrete firings, and [`ReportListener`]s that
//! are told about state changes and arriving outputs.
//!
//! # Architecture
//!
//! - [`ReportTree`]: an arena of report nodes built once, eagerly, from a
//!   workflow bundle; nodes refer to each other by [`ReportId`]
//! - [`WorkflowReport`], [`ProcessorReport`], [`ActivityReport`]: typed
//!   handles into the tree that add the variant-specific operations
//! - [`Invocation`]: one firing of a subject at an iteration index
//! - [`ReportSerializer`]: JSON persistence of a whole tree
//!
//! # Concurrency
//!
//! Each node guards its own state, invocation set and listener list. There is
//! no tree-wide lock: backend workers may record invocations under sibling
//! processors in parallel. Listeners run after the node's state lock is
//! released, in the order the changes were applied.
//!
//! # Example
//!
//! ```rust
//! use run_report::{Invocation, ReportTree};
//! use run_types::*;
//!
//! let mut bundle = WorkflowBundle::new("example");
//! let mut wf = Workflow::new("main").with_input("x");
//! wf.add_processor(Processor::new("double").with_input("in").with_output("out"))
//!     .unwrap();
//! bundle.add_workflow(wf).unwrap();
//! let mut profile = Profile::new("local");
//! profile
//!     .add_activity(Activity::new("double", "urn:double").with_input("in").with_output("out"))
//!     .unwrap();
//! profile.bind(ProcessorBinding::new("main", "double", "double"));
//! bundle.add_profile(profile).unwrap();
//!
//! let report = ReportTree::build(
//!     &bundle,
//!     bundle.main_workflow().unwrap(),
//!     bundle.main_profile().unwrap(),
//! )
//! .unwrap();
//! assert_eq!(report.state(), State::Created);
//! assert_eq!(report.processor_reports().len(), 1);
//!
//! let root = Invocation::new("wf0", vec![], None, &report).unwrap();
//! assert_eq!(root.id(), "wf0");
//! assert_eq!(root.state(), State::Running);
//! ```

#![deny(unsafe_code)]

pub mod errors;
pub mod invocation;
pub mod listener;
pub mod serializer;
pub mod status;
pub mod telemetry;
pub mod tree;

#[cfg(test)]
mod test_support;

pub use errors::{ParseError, ReportError, ReportResult};
pub use invocation::{ContextId, Invocation, InvocationSnapshot, CONTEXT_SEPARATOR};
pub use listener::ReportListener;
pub use serializer::ReportSerializer;
pub use status::{ReportTimes, StatusReport};
pub use telemetry::{
    property_key, LiveProperty, ProcessorTelemetry, JOBS_COMPLETED_PROPERTY,
    JOBS_COMPLETED_WITH_ERRORS_PROPERTY, JOBS_QUEUED_PROPERTY, JOBS_STARTED_PROPERTY,
};
pub use tree::{
    ActivityReport, ProcessorReport, ReportId, ReportKind, ReportRef, ReportTree, WorkflowReport,
};
