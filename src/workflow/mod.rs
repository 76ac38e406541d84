//! Workflow execution engine
//!
//! A [`Workflow`] is an ordered list of [`Process`]es, each an ordered list of
//! [`Step`]s. Processes and steps run strictly in order; each step fans out
//! across its target hosts concurrently and joins before the next step
//! starts. Within a host, loop iterations run in order.

use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, warn};

pub mod context;
pub mod display;
pub mod error;
mod executor;
pub mod iterator;
pub mod process;
pub mod step;

pub use context::{EvalScope, ExecutionConfig, HostLane, ScopeLayer, WorkflowContext};
pub use display::{ConsoleDisplay, RecordingDisplay, WorkflowDisplay};
pub use error::{BuildError, HostError, ProcessError, StepError, WorkflowError};
pub use iterator::{IteratorKind, StepIteration, StepIterator};
pub use process::{Process, ProcessDefaults, ProcessOutput};
pub use step::{EscalateConfig, LoopConfig, OutputConfig, Step, StepBuilder, StepRun};

use crate::inventory::Host;

/// Everything a workflow run produced
///
/// Outputs of processes that ran are kept even when the run failed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WorkflowOutcome {
    pub processes: Vec<ProcessOutput>,
    #[serde(skip)]
    pub error: Option<WorkflowError>,
}

impl WorkflowOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Output of the named process
    pub fn process(&self, name: &str) -> Option<&ProcessOutput> {
        self.processes.iter().find(|p| p.name == name)
    }

    pub fn into_result(self) -> Result<Vec<ProcessOutput>, WorkflowError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.processes),
        }
    }
}

#[derive(Debug, Default)]
pub struct Workflow {
    processes: Vec<Process>,
}

impl Workflow {
    pub fn new(processes: Vec<Process>) -> Self {
        Self { processes }
    }

    pub fn processes(&self) -> &[Process] {
        &self.processes
    }

    /// Every host any step targets, in first-seen order
    pub fn hosts(&self) -> Vec<Arc<Host>> {
        let mut seen = BTreeSet::new();
        self.processes
            .iter()
            .flat_map(Process::hosts)
            .filter(|host| seen.insert(host.name().to_string()))
            .collect()
    }

    /// Run every process in order, stopping at the first failing process
    ///
    /// Transports of all hosts are closed before returning, however far the
    /// run got.
    pub async fn run(&self, ctx: &mut WorkflowContext) -> WorkflowOutcome {
        let hosts = self.hosts();
        for host in &hosts {
            ctx.add_host(Arc::clone(host));
        }
        info!(
            "Running workflow: {} process(es), {} host(s)",
            self.processes.len(),
            hosts.len()
        );

        let mut outcome = WorkflowOutcome::default();
        for process in &self.processes {
            if ctx.cancel.is_cancelled() {
                outcome.error = Some(WorkflowError::Cancelled(process.name().to_string()));
                break;
            }

            let (output, result) = process.run(ctx).await;
            outcome.processes.push(output);
            if let Err(error) = result {
                outcome.error = Some(error.into());
                break;
            }
        }

        close_transports(ctx).await;
        outcome
    }
}

async fn close_transports(ctx: &WorkflowContext) {
    for lane in ctx.lanes() {
        if let Err(e) = lane.host.transport().close().await {
            warn!("Failed to close transport of {}: {}", lane.host.name(), e);
            ctx.display()
                .warning(&format!("failed to close connection to {}: {e}", lane.host.name()));
        }
    }
}
