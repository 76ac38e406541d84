//! Pluggable modules executed by workflow steps
//!
//! Every step binds exactly one module. The engine evaluates the step's
//! inputs, converts and validates them against the module's [`InputSpec`],
//! and only then invokes [`Module::run`].

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::time::Duration;

pub mod builtin;
pub mod registry;
pub mod result;
pub mod spec;

pub use registry::ModuleRegistry;
pub use result::ModuleResult;
pub use spec::{FieldSpec, FieldType, InputError, InputSpec};

use crate::expression::Value;
use crate::inventory::Host;
use crate::transport::{CancellationToken, Escalation};

/// Per-invocation settings resolved by the executor
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Escalation to apply to commands, if any
    pub escalation: Option<Escalation>,
    /// Deadline for the invocation
    pub timeout: Duration,
    /// Report intended changes without applying them
    pub what_if: bool,
    /// Cancelled when the run is interrupted or times out
    pub cancel: CancellationToken,
}

/// Core trait that all modules implement
#[async_trait]
pub trait Module: Send + Sync {
    /// Unique name steps use to refer to the module
    fn name(&self) -> &str;

    /// Short description for listings
    fn description(&self) -> &str {
        ""
    }

    /// Inputs this module accepts
    fn input_spec(&self) -> InputSpec;

    /// Timeout used when the step does not set one
    fn default_timeout(&self) -> Option<Duration> {
        None
    }

    /// Module-specific checks on converted input
    fn validate(&self, _host: &Host, _input: &BTreeMap<String, Value>) -> Result<(), InputError> {
        Ok(())
    }

    /// Run the module; `None` means the module produced no result
    async fn run(
        &self,
        host: &Host,
        config: &RunConfig,
        input: &BTreeMap<String, Value>,
    ) -> Option<ModuleResult>;
}
