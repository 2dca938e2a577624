//! Run-Status Domain Types
//!
//! Shared vocabulary for tracking the execution of scientific workflows.
//!
//! # Key Concepts
//!
//! - **State**: the six-valued lifecycle of every report node
//!   (`CREATED`, `RUNNING`, `PAUSED`, `CANCELLED`, `COMPLETED`, `FAILED`).
//! - **Transition**: a named move between states (start, pause, resume,
//!   cancel, complete, fail) and the table of which moves are permitted.
//! - **WorkflowBundle**: the declarative task graph a run executes: workflows,
//!   their processors and data links, and profiles binding processors to
//!   activities.
//! - **Subject**: the stable, URI-addressed identity of a workflow, processor
//!   or activity that a status report is attached to.
//! - **DataBundle / DataPath**: the root of a run's value store and the
//!   relative locators invocations use to point into it.
//! - **RunId**: a time-ordered, sortable run identifier.

#![deny(unsafe_code)]

mod bundle;
mod data;
mod errors;
mod ids;
mod state;
mod subject;
mod timestamp;

pub use bundle::*;
pub use data::*;
pub use errors::*;
pub use ids::*;
pub use state::*;
pub use subject::*;
pub use timestamp::*;
