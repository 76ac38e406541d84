use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::expression::Value;
use crate::transport::Transport;

/// A managed host: identity, variables and transport handle
pub struct Host {
    name: String,
    transport: Arc<dyn Transport>,
    escalate_secret: Option<String>,
    vars: BTreeMap<String, Value>,
}

impl Host {
    pub fn new(name: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        Self {
            name: name.into(),
            transport,
            escalate_secret: None,
            vars: BTreeMap::new(),
        }
    }

    pub fn with_escalate_secret(mut self, secret: impl Into<String>) -> Self {
        self.escalate_secret = Some(secret.into());
        self
    }

    pub fn with_var(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }

    pub fn with_vars(mut self, vars: BTreeMap<String, Value>) -> Self {
        self.vars.extend(vars);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    pub fn escalate_secret(&self) -> Option<&str> {
        self.escalate_secret.as_deref()
    }

    pub fn vars(&self) -> &BTreeMap<String, Value> {
        &self.vars
    }
}

impl fmt::Debug for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Host")
            .field("name", &self.name)
            .field("transport", &self.transport.kind())
            .field("vars", &self.vars)
            .finish_non_exhaustive()
    }
}

/// Per-run mutable state of one host
///
/// Owned by the host's execution lane; only the task running a step for this
/// host ever touches it.
#[derive(Debug, Clone, Default)]
pub struct HostState {
    failed: bool,
    tasks: BTreeMap<String, Value>,
}

impl HostState {
    pub fn is_failed(&self) -> bool {
        self.failed
    }

    pub fn mark_failed(&mut self) {
        self.failed = true;
    }

    /// Store the output of a step so later steps can read `tasks.<id>`
    pub fn store_task(&mut self, step_id: impl Into<String>, output: Value) {
        self.tasks.insert(step_id.into(), output);
    }

    pub fn task(&self, step_id: &str) -> Option<&Value> {
        self.tasks.get(step_id)
    }

    pub fn tasks(&self) -> &BTreeMap<String, Value> {
        &self.tasks
    }
}
