//! Data bundle roots and the relative locators that point into them

use crate::{ModelError, ModelResult};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

/// Root directory of a run's input, output and intermediate values
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataBundle {
    root: PathBuf,
}

impl DataBundle {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a locator against this bundle's root
    pub fn resolve(&self, path: &DataPath) -> PathBuf {
        path.0.split('/').fold(self.root.clone(), |acc, part| acc.join(part))
    }
}

/// A `/`-separated path relative to a [`DataBundle`] root.
///
/// Absolute paths and `..` segments are rejected so a locator can never
/// escape its bundle.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DataPath(String);

impl DataPath {
    pub fn new(path: impl Into<String>) -> ModelResult<Self> {
        let path = path.into();
        let invalid = path.is_empty()
            || path.starts_with('/')
            || path.contains('\\')
            || path.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..")
            || Path::new(&path)
                .components()
                .any(|c| !matches!(c, Component::Normal(_)));
        if invalid {
            return Err(ModelError::InvalidDataPath(path));
        }
        Ok(Self(path))
    }

    /// Locator of a workflow input value
    pub fn input(port: &str) -> Self {
        Self(format!("inputs/{}", port))
    }

    /// Locator of a workflow output value
    pub fn output(port: &str) -> Self {
        Self(format!("outputs/{}", port))
    }

    /// Locator of an intermediate value produced inside the workflow
    pub fn intermediate(scope: &str, port: &str) -> Self {
        Self(format!("intermediates/{}/{}", scope, port))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DataPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for DataPath {
    type Error = ModelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<DataPath> for String {
    fn from(path: DataPath) -> Self {
        path.0
    }
}
