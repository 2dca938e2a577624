//! In-process reference backend
//!
//! [`SequentialCompiler`] orders processors by their data links,
//! [`LocalExecutionEnvironment`] runs the result on a tokio task, and the
//! data stores hold port values in memory or as JSON files.

mod activities;
mod compiler;
mod environment;
mod store;

pub use activities::{
    ActivityFn, ConcatenateActivity, ConstantActivity, PortValues, CONCATENATE_ACTIVITY_TYPE,
    CONSTANT_ACTIVITY_TYPE,
};
pub use compiler::SequentialCompiler;
pub use environment::LocalExecutionEnvironment;
pub use store::{FileDataStore, InMemoryDataStore};
