//! Activity implementations for the local backend

use crate::errors::ExecutionError;
use async_trait::async_trait;
use run_types::Activity;
use serde_json::Value;
use std::collections::BTreeMap;

/// Activity type of [`ConstantActivity`]
pub const CONSTANT_ACTIVITY_TYPE: &str = "http://ns.taverna.org.uk/2010/activity/constant";

/// Activity type of [`ConcatenateActivity`]
pub const CONCATENATE_ACTIVITY_TYPE: &str =
    "http://ns.taverna.org.uk/2010/activity/localworker/concatenate";

/// Values keyed by port name
pub type PortValues = BTreeMap<String, Value>;

/// Runs one activity type
#[async_trait]
pub trait ActivityFn: Send + Sync {
    async fn invoke(
        &self,
        activity: &Activity,
        inputs: PortValues,
    ) -> Result<PortValues, ExecutionError>;
}

/// Emits the configured `value` on every output port
#[derive(Debug, Default)]
pub struct ConstantActivity;

#[async_trait]
impl ActivityFn for ConstantActivity {
    async fn invoke(
        &self,
        activity: &Activity,
        _inputs: PortValues,
    ) -> Result<PortValues, ExecutionError> {
        let value = activity
            .configuration
            .get("value")
            .ok_or_else(|| ExecutionError::ActivityFailed {
                activity: activity.name.clone(),
                message: "missing 'value' configuration".to_string(),
            })?;
        Ok(activity
            .output_ports
            .iter()
            .map(|p| (p.name.clone(), Value::from(value.as_str())))
            .collect())
    }
}

/// Joins the string inputs, in input-port order, onto the first output
#[derive(Debug, Default)]
pub struct ConcatenateActivity;

#[async_trait]
impl ActivityFn for ConcatenateActivity {
    async fn invoke(
        &self,
        activity: &Activity,
        inputs: PortValues,
    ) -> Result<PortValues, ExecutionError> {
        let mut joined = String::new();
        for port in &activity.input_ports {
            match inputs.get(&port.name) {
                Some(Value::String(s)) => joined.push_str(s),
                Some(other) => joined.push_str(&other.to_string()),
                None => {
                    return Err(ExecutionError::MissingInput {
                        port: port.name.clone(),
                    })
                }
            }
        }
        let output = activity
            .output_ports
            .first()
            .ok_or_else(|| ExecutionError::ActivityFailed {
                activity: activity.name.clone(),
                message: "no output port".to_string(),
            })?;
        Ok(PortValues::from([(output.name.clone(), Value::from(joined))]))
    }
}
