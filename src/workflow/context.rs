//! Execution context for workflow runs
//!
//! The [`WorkflowContext`] owns one [`HostLane`] per host. A lane pairs the
//! immutable host with its mutable run state; steps hand out disjoint `&mut`
//! borrows of lanes to their per-host tasks, so host state needs no locking.
//!
//! Expressions evaluate against an [`EvalScope`]: a base layer with the host's
//! variables, plus child layers pushed for loop iterations and output
//! transforms. Layers are popped when their [`ScopeLayer`] guard drops.

use std::collections::BTreeMap;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

use super::display::WorkflowDisplay;
use crate::expression::{Value, Variables};
use crate::inventory::{Host, HostState};
use crate::transport::CancellationToken;

/// Default module timeout when neither the step nor the module sets one
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Settings threaded through workflow execution
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionConfig {
    pub default_timeout: Duration,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            default_timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// A host together with its per-run state
#[derive(Debug)]
pub struct HostLane {
    pub host: Arc<Host>,
    pub state: HostState,
}

/// State shared by every process and step of one workflow run
pub struct WorkflowContext {
    pub(crate) config: ExecutionConfig,
    pub(crate) display: Arc<dyn WorkflowDisplay>,
    pub(crate) cancel: CancellationToken,
    pub(crate) lanes: Vec<HostLane>,
    hostvars: Arc<Value>,
}

impl WorkflowContext {
    pub fn new(config: ExecutionConfig, display: Arc<dyn WorkflowDisplay>) -> Self {
        Self {
            config,
            display,
            cancel: CancellationToken::new(),
            lanes: Vec::new(),
            hostvars: Arc::new(Value::Map(BTreeMap::new())),
        }
    }

    /// Use an externally controlled cancellation token
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Register a host; hosts already known keep their state
    pub fn add_host(&mut self, host: Arc<Host>) {
        if self.lane(host.name()).is_none() {
            self.lanes.push(HostLane {
                host,
                state: HostState::default(),
            });
        }
    }

    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn display(&self) -> &dyn WorkflowDisplay {
        self.display.as_ref()
    }

    pub fn lanes(&self) -> &[HostLane] {
        &self.lanes
    }

    fn lane(&self, name: &str) -> Option<&HostLane> {
        self.lanes.iter().find(|l| l.host.name() == name)
    }

    pub fn host_state(&self, name: &str) -> Option<&HostState> {
        self.lane(name).map(|l| &l.state)
    }

    pub fn is_failed(&self, name: &str) -> bool {
        self.host_state(name).is_some_and(HostState::is_failed)
    }

    /// Rebuild the `hostvars` snapshot shared read-only by the next step
    pub(crate) fn load_host_vars(&mut self) -> Arc<Value> {
        let hostvars: BTreeMap<String, Value> = self
            .lanes
            .iter()
            .map(|lane| {
                (
                    lane.host.name().to_string(),
                    Value::Map(lane.host.vars().clone()),
                )
            })
            .collect();
        trace!("Loaded variables for {} host(s)", hostvars.len());
        self.hostvars = Arc::new(Value::Map(hostvars));
        Arc::clone(&self.hostvars)
    }
}

/// Layered variable scope for one host
#[derive(Debug, Clone)]
pub struct EvalScope {
    hostvars: Arc<Value>,
    layers: Vec<BTreeMap<String, Value>>,
}

impl EvalScope {
    /// Base scope exposing `host`, `var`, `hostvars` and `tasks`
    pub fn for_host(host: &Host, state: &HostState, hostvars: Arc<Value>) -> Self {
        let mut base = BTreeMap::new();
        base.insert(
            "host".to_string(),
            Value::map([("name", Value::from(host.name()))]),
        );
        base.insert("var".to_string(), Value::Map(host.vars().clone()));
        base.insert("tasks".to_string(), Value::Map(state.tasks().clone()));
        Self {
            hostvars,
            layers: vec![base],
        }
    }

    /// Scope with the given variables and no host
    pub fn from_vars(vars: BTreeMap<String, Value>) -> Self {
        Self {
            hostvars: Arc::new(Value::Map(BTreeMap::new())),
            layers: vec![vars],
        }
    }

    /// Push a child layer, popped when the returned guard drops
    pub fn push(&mut self) -> ScopeLayer<'_> {
        self.layers.push(BTreeMap::new());
        ScopeLayer { scope: self }
    }

    pub fn depth(&self) -> usize {
        self.layers.len()
    }
}

impl Variables for EvalScope {
    fn lookup(&self, name: &str) -> Option<&Value> {
        self.layers
            .iter()
            .rev()
            .find_map(|layer| layer.get(name))
            .or_else(|| (name == "hostvars").then_some(self.hostvars.as_ref()))
    }
}

/// Guard for a pushed scope layer
pub struct ScopeLayer<'a> {
    scope: &'a mut EvalScope,
}

impl ScopeLayer<'_> {
    /// Bind a variable in this layer, shadowing outer bindings
    pub fn bind(&mut self, name: impl Into<String>, value: Value) {
        if let Some(layer) = self.scope.layers.last_mut() {
            layer.insert(name.into(), value);
        }
    }
}

impl Variables for ScopeLayer<'_> {
    fn lookup(&self, name: &str) -> Option<&Value> {
        self.scope.lookup(name)
    }
}

impl Deref for ScopeLayer<'_> {
    type Target = EvalScope;

    fn deref(&self) -> &EvalScope {
        self.scope
    }
}

impl DerefMut for ScopeLayer<'_> {
    fn deref_mut(&mut self) -> &mut EvalScope {
        self.scope
    }
}

impl Drop for ScopeLayer<'_> {
    fn drop(&mut self) {
        self.scope.layers.pop();
    }
}
