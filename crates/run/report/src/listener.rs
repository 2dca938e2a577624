//! Observers of report state changes and output arrival

use crate::StatusReport;
use run_types::{DataPath, State};

/// Notified synchronously by a [`StatusReport`] after its locks are released.
///
/// Implementations should return quickly; both methods default to no-ops.
pub trait ReportListener: Send + Sync {
    /// The report moved from `old` to `new`
    fn state_changed(&self, report: &StatusReport, old: State, new: State) {
        let _ = (report, old, new);
    }

    /// A value was bound to output `port` of an invocation under `report`
    fn output_added(&self, report: &StatusReport, path: &DataPath, port: &str, index: &[usize]) {
        let _ = (report, path, port, index);
    }
}
