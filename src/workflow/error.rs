//! Error types for building and running workflows

use std::fmt;
use thiserror::Error;

use crate::expression::ParseError;
use crate::inventory::InventoryError;

/// Malformed workflow configuration, found before anything runs
#[derive(Debug, Clone, Error, PartialEq)]
pub enum BuildError {
    #[error("{0} is missing an id")]
    MissingId(String),

    #[error("step `{0}` is missing a name")]
    MissingName(String),

    #[error("process is missing a name")]
    MissingProcessName,

    #[error("step `{0}` has no targets")]
    MissingTargets(String),

    #[error("step `{0}` has no module")]
    MissingModule(String),

    #[error("step `{step}` uses unknown module `{module}`")]
    UnknownModule { step: String, module: String },

    #[error("step id `{step}` is used more than once in process `{process}`")]
    DuplicateStepId { process: String, step: String },

    #[error("escalate block of {0} sets neither `escalate` nor `impersonate_user`")]
    EmptyEscalate(String),

    #[error("{context}: {source}")]
    Expression {
        context: String,
        #[source]
        source: ParseError,
    },

    #[error(transparent)]
    Inventory(#[from] InventoryError),
}

impl BuildError {
    pub fn expression(context: impl Into<String>, source: ParseError) -> Self {
        BuildError::Expression {
            context: context.into(),
            source,
        }
    }
}

/// A propagated failure of one step on one host
#[derive(Debug, Clone, PartialEq)]
pub struct HostError {
    pub host: String,
    pub label: Option<String>,
    pub message: String,
    pub detail: Option<String>,
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.label {
            Some(label) => write!(f, "{}->{}: {}", self.host, label, self.message)?,
            None => write!(f, "{}: {}", self.host, self.message)?,
        }
        if let Some(detail) = &self.detail {
            write!(f, " ({detail})")?;
        }
        Ok(())
    }
}

impl std::error::Error for HostError {}

/// A step that failed on one or more hosts
#[derive(Debug, Clone, PartialEq, Error)]
#[error("step `{step}` failed: {}", join(.errors))]
pub struct StepError {
    pub step: String,
    pub errors: Vec<HostError>,
}

/// A process whose steps failed on one or more hosts
#[derive(Debug, Clone, PartialEq, Error)]
#[error("process `{process}` failed: {}", join(.steps))]
pub struct ProcessError {
    pub process: String,
    pub steps: Vec<StepError>,
}

impl ProcessError {
    /// Names of every host that failed in this process
    pub fn failed_hosts(&self) -> Vec<&str> {
        let mut hosts: Vec<&str> = self
            .steps
            .iter()
            .flat_map(|s| s.errors.iter().map(|e| e.host.as_str()))
            .collect();
        hosts.sort_unstable();
        hosts.dedup();
        hosts
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error("workflow was cancelled before process `{0}`")]
    Cancelled(String),
}

fn join<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
