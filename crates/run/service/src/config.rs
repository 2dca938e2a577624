//! Configuration for the run service

use serde::{Deserialize, Serialize};

/// Main run service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunServiceConfig {
    /// Lifecycle event channel
    #[serde(default)]
    pub events: EventConfig,

    /// Saved run layout
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Lifecycle event channel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventConfig {
    /// Events buffered per subscriber before it lags
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
        }
    }
}

/// File names used when saving a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Run report document
    #[serde(default = "default_report_file_name")]
    pub report_file_name: String,

    /// Workflow and profile names of the saved run
    #[serde(default = "default_manifest_file_name")]
    pub manifest_file_name: String,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            report_file_name: default_report_file_name(),
            manifest_file_name: default_manifest_file_name(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level or filter directive
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value helpers
fn default_channel_capacity() -> usize {
    1024
}

fn default_report_file_name() -> String {
    "workflowrun.json".to_string()
}

fn default_manifest_file_name() -> String {
    "run.json".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl RunServiceConfig {
    /// Load configuration from defaults, an optional file and the environment
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        // Add default configuration
        builder = builder.add_source(config::Config::try_from(&RunServiceConfig::default())?);

        // Add file configuration if provided
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        // Add environment variables, e.g. RUN_SERVICE__EVENTS__CHANNEL_CAPACITY
        builder = builder.add_source(
            config::Environment::with_prefix("RUN_SERVICE")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = RunServiceConfig::default();
        assert_eq!(config.events.channel_capacity, 1024);
        assert_eq!(config.persistence.report_file_name, "workflowrun.json");
        assert_eq!(config.persistence.manifest_file_name, "run.json");
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.json);
    }

    #[test]
    fn test_load_without_file() {
        let config = RunServiceConfig::load(None).unwrap();
        assert_eq!(config.persistence.report_file_name, "workflowrun.json");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[persistence]\nreport_file_name = \"report.json\"\n\n[logging]\njson = true"
        )
        .unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let config = RunServiceConfig::load(Some(&path)).unwrap();
        assert_eq!(config.persistence.report_file_name, "report.json");
        assert_eq!(config.persistence.manifest_file_name, "run.json");
        assert!(config.logging.json);
    }

    #[test]
    fn test_partial_deserialize_uses_defaults() {
        let config: RunServiceConfig =
            serde_json::from_str(r#"{"events": {"channel_capacity": 8}}"#).unwrap();
        assert_eq!(config.events.channel_capacity, 8);
        assert_eq!(config.logging.level, "info");
    }
}
