//! Report clock
//!
//! Reports persist timestamps with millisecond precision, so every stamp is
//! taken at that precision to keep in-memory and reloaded trees identical.

use chrono::{DateTime, SubsecRound, Utc};

/// The current time truncated to whole milliseconds
pub fn now_millis() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}
