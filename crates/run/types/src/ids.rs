//! Run and execution identifiers

use serde::{Deserialize, Serialize};

// ── Run Identifier ───────────────────────────────────────────────────

/// Identifier of a run in the run registry.
///
/// Generated identifiers are UUIDv7 strings, so lexical order follows
/// creation time.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::now_v7().to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn short(&self) -> &str {
        &self.0[..8.min(self.0.len())]
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RunId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

// ── Execution Identifier ─────────────────────────────────────────────

/// Identifier handed out by an execution backend
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExecutionId(pub String);

impl ExecutionId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_ids_sort_by_creation() {
        let ids: Vec<RunId> = (0..5)
            .map(|_| {
                std::thread::sleep(std::time::Duration::from_millis(2));
                RunId::generate()
            })
            .collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
    }

    #[test]
    fn test_run_id_display() {
        let id = RunId::new("run-1");
        assert_eq!(format!("{}", id), "run-1");
        assert_eq!(id.short(), "run-1");
        assert_eq!(RunId::from("abc"), RunId::new("abc"));
    }

    #[test]
    fn test_execution_id() {
        let id = ExecutionId::generate();
        assert!(!id.as_str().is_empty());
        assert_ne!(id, ExecutionId::generate());
    }
}
