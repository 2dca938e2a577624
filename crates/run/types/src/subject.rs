//! Subjects: the workflow, processor and activity definitions reports attach to
//!
//! A subject is referenced by a stable URI rooted at its bundle's URI:
//!
//! ```text
//! {bundle}workflow/{workflow}/
//! {bundle}workflow/{workflow}/processor/{processor}/
//! {bundle}profile/{profile}/activity/{activity}/
//! ```

use serde::{Deserialize, Serialize};

/// What kind of definition a subject is
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectKind {
    Workflow,
    Processor,
    Activity,
}

impl std::fmt::Display for SubjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Workflow => "workflow",
            Self::Processor => "processor",
            Self::Activity => "activity",
        })
    }
}

/// The identity of a definition, as seen by its status report
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub kind: SubjectKind,
    pub uri: String,
    pub name: String,
    /// Declared input port names, in declaration order
    pub input_ports: Vec<String>,
    /// Declared output port names, in declaration order
    pub output_ports: Vec<String>,
}

impl Subject {
    pub fn new(kind: SubjectKind, uri: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            uri: uri.into(),
            name: name.into(),
            input_ports: Vec::new(),
            output_ports: Vec::new(),
        }
    }

    pub fn with_ports<I, O>(mut self, inputs: I, outputs: O) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
        O: IntoIterator,
        O::Item: Into<String>,
    {
        self.input_ports = inputs.into_iter().map(Into::into).collect();
        self.output_ports = outputs.into_iter().map(Into::into).collect();
        self
    }
}

impl std::fmt::Display for Subject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.uri)
    }
}

/// A subject URI split into its naming segments
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum SubjectPath<'a> {
    Workflow(&'a str),
    Processor { workflow: &'a str, processor: &'a str },
    Activity { profile: &'a str, activity: &'a str },
}

impl<'a> SubjectPath<'a> {
    /// Parse the part of a URI after the bundle prefix
    pub(crate) fn parse(relative: &'a str) -> Option<Self> {
        let trimmed = relative.strip_suffix('/').unwrap_or(relative);
        let segments: Vec<&str> = trimmed.split('/').collect();
        match segments.as_slice() {
            ["workflow", wf] => Some(Self::Workflow(wf)),
            ["workflow", wf, "processor", proc] => Some(Self::Processor {
                workflow: wf,
                processor: proc,
            }),
            ["profile", profile, "activity", act] => Some(Self::Activity {
                profile,
                activity: act,
            }),
            _ => None,
        }
    }
}
