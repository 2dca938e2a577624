//! Processor telemetry: job counters and backend properties
//!
//! A processor report keeps a string-keyed property bag. Each key holds a
//! static value and may additionally be bound to a [`LiveProperty`] supplied
//! by the backend. Reads poll the live binding and fall back to the static
//! value when the binding has nothing to offer.

use parking_lot::Mutex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Number of jobs waiting in the dispatch queue
pub const JOBS_QUEUED_PROPERTY: &str = "dispatch:parallelize:queuesize";
/// Number of jobs handed to an activity
pub const JOBS_STARTED_PROPERTY: &str = "dispatch:parallelize:sentjobs";
/// Number of jobs that produced results
pub const JOBS_COMPLETED_PROPERTY: &str = "dispatch:parallelize:completedjobs";
/// Number of jobs whose failure was translated into error results
pub const JOBS_COMPLETED_WITH_ERRORS_PROPERTY: &str = "dispatch:errorbounce:totalTranslated";

/// Join name segments into a property key
pub fn property_key(parts: &[&str]) -> String {
    parts.join(":")
}

/// A backend-supplied value polled on read.
///
/// Returning `None` means the value is currently unavailable.
pub trait LiveProperty: Send + Sync {
    fn read(&self) -> Option<Value>;
}

impl<F> LiveProperty for F
where
    F: Fn() -> Option<Value> + Send + Sync,
{
    fn read(&self) -> Option<Value> {
        self()
    }
}

#[derive(Default)]
struct Properties {
    values: BTreeMap<String, Value>,
    live: BTreeMap<String, Arc<dyn LiveProperty>>,
}

/// Property bag of one processor report
#[derive(Default)]
pub struct ProcessorTelemetry {
    inner: Mutex<Properties>,
}

impl ProcessorTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of `key`: the live reading if available, else the
    /// static value.
    pub fn property(&self, key: &str) -> Option<Value> {
        let (live, fallback) = {
            let inner = self.inner.lock();
            (inner.live.get(key).cloned(), inner.values.get(key).cloned())
        };
        // Poll outside the lock; a live read may call into the backend
        match live.map(|p| p.read()) {
            Some(Some(value)) => Some(value),
            Some(None) => {
                tracing::debug!(key, "Live property unavailable, using stored value");
                fallback
            }
            None => fallback,
        }
    }

    pub fn set_property(&self, key: impl Into<String>, value: Value) {
        self.inner.lock().values.insert(key.into(), value);
    }

    pub fn bind_live(&self, key: impl Into<String>, property: Arc<dyn LiveProperty>) {
        self.inner.lock().live.insert(key.into(), property);
    }

    pub fn is_live(&self, key: &str) -> bool {
        self.inner.lock().live.contains_key(key)
    }

    /// Every key with a static value or a live binding
    pub fn keys(&self) -> Vec<String> {
        let inner = self.inner.lock();
        let mut keys: Vec<String> = inner.values.keys().cloned().collect();
        for key in inner.live.keys() {
            if !inner.values.contains_key(key) {
                keys.push(key.clone());
            }
        }
        keys.sort();
        keys
    }

    /// Freeze every live reading into a static value and drop the bindings
    pub fn save_properties(&self) {
        let live = std::mem::take(&mut self.inner.lock().live);
        let readings: Vec<(String, Option<Value>)> =
            live.into_iter().map(|(k, p)| (k, p.read())).collect();
        let mut inner = self.inner.lock();
        for (key, reading) in readings {
            if let Some(value) = reading {
                inner.values.insert(key, value);
            }
        }
    }

    /// Static values only
    pub fn static_properties(&self) -> BTreeMap<String, Value> {
        self.inner.lock().values.clone()
    }

    pub(crate) fn restore(&self, values: BTreeMap<String, Value>) {
        let mut inner = self.inner.lock();
        inner.values = values;
        inner.live.clear();
    }

    // ── Counters ─────────────────────────────────────────────────────

    /// Read a counter property, defaulting to zero.
    ///
    /// A live reading that is not a count falls back to the static value.
    pub fn counter(&self, key: &str) -> u64 {
        self.property(key)
            .and_then(|v| v.as_u64())
            .or_else(|| self.static_counter(key))
            .unwrap_or(0)
    }

    fn static_counter(&self, key: &str) -> Option<u64> {
        self.inner.lock().values.get(key).and_then(Value::as_u64)
    }

    pub fn set_counter(&self, key: &str, value: u64) {
        self.set_property(key, Value::from(value));
    }

    /// Add `delta` to the static value of a counter
    pub fn increment(&self, key: &str, delta: u64) {
        let mut inner = self.inner.lock();
        let current = inner.values.get(key).and_then(Value::as_u64).unwrap_or(0);
        inner
            .values
            .insert(key.to_string(), Value::from(current + delta));
    }
}

impl std::fmt::Debug for ProcessorTelemetry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessorTelemetry")
            .field("keys", &self.keys())
            .finish()
    }
}
