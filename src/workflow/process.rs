//! Processes: ordered steps sharing common defaults

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{info, warn};

use super::context::WorkflowContext;
use super::error::{BuildError, ProcessError};
use super::step::{EscalateConfig, LoopConfig, Step};
use crate::expression::{Expression, Value};
use crate::inventory::Host;

/// Defaults a process declares for its steps
#[derive(Debug, Clone, Default)]
pub struct ProcessDefaults {
    pub targets: Option<Vec<Arc<Host>>>,
    pub loop_config: Option<LoopConfig>,
    pub exec_timeout: Option<Expression>,
    pub what_if: Option<bool>,
    pub input: Option<BTreeMap<String, Expression>>,
    pub escalate: Option<EscalateConfig>,
}

/// Outputs of one process: step id, then host name
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProcessOutput {
    pub name: String,
    pub steps: BTreeMap<String, BTreeMap<String, Value>>,
}

impl ProcessOutput {
    /// Stored output of a step on a host
    pub fn get(&self, step: &str, host: &str) -> Option<&Value> {
        self.steps.get(step).and_then(|hosts| hosts.get(host))
    }
}

#[derive(Debug)]
pub struct Process {
    name: String,
    steps: Vec<Step>,
}

impl Process {
    pub fn new(name: impl Into<String>, steps: Vec<Step>) -> Result<Self, BuildError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(BuildError::MissingProcessName);
        }

        let mut ids = BTreeSet::new();
        for step in &steps {
            if !ids.insert(step.id()) {
                return Err(BuildError::DuplicateStepId {
                    process: name,
                    step: step.id().to_string(),
                });
            }
        }

        Ok(Self { name, steps })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Every host targeted by any step, in first-seen order
    pub fn hosts(&self) -> Vec<Arc<Host>> {
        let mut seen = BTreeSet::new();
        self.steps
            .iter()
            .flat_map(|step| step.targets())
            .filter(|host| seen.insert(host.name().to_string()))
            .cloned()
            .collect()
    }

    /// Run every step in order
    ///
    /// A host that fails a step is left out of the remaining steps; the other
    /// hosts carry on. The error lists every propagated failure.
    pub async fn run(
        &self,
        ctx: &mut WorkflowContext,
    ) -> (ProcessOutput, Result<(), ProcessError>) {
        info!(
            "Running process `{}` with {} step(s)",
            self.name,
            self.steps.len()
        );
        ctx.display.process_header(&self.name);

        let mut output = ProcessOutput {
            name: self.name.clone(),
            ..ProcessOutput::default()
        };
        let mut failures = Vec::new();

        for step in &self.steps {
            let run = step.run(ctx).await;
            if let Some(error) = run.error() {
                warn!("{}", error);
                failures.push(error);
            }
            output.steps.insert(run.step, run.outputs);
        }

        if failures.is_empty() {
            (output, Ok(()))
        } else {
            (
                output,
                Err(ProcessError {
                    process: self.name.clone(),
                    steps: failures,
                }),
            )
        }
    }
}
