//! Step configuration, inheritance and host fan-out

use futures::future::join_all;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

use super::context::WorkflowContext;
use super::error::{BuildError, HostError, StepError};
use super::executor::{HostExecutor, StepContext};
use super::process::ProcessDefaults;
use crate::expression::{Expression, Value};
use crate::inventory::Host;
use crate::module::Module;

/// Loop block of a step
#[derive(Debug, Clone, PartialEq)]
pub struct LoopConfig {
    /// Must evaluate to a list or map
    pub items: Expression,
    pub label: Option<Expression>,
    /// Evaluated per iteration; false skips the iteration
    pub condition: Option<Expression>,
}

impl LoopConfig {
    pub fn new(items: Expression) -> Self {
        Self {
            items,
            label: None,
            condition: None,
        }
    }

    pub fn with_label(mut self, label: Expression) -> Self {
        self.label = Some(label);
        self
    }

    pub fn with_condition(mut self, condition: Expression) -> Self {
        self.condition = Some(condition);
        self
    }
}

/// Privilege escalation block
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EscalateConfig {
    pub escalate: Option<Expression>,
    pub impersonate_user: Option<Expression>,
}

impl EscalateConfig {
    pub fn is_empty(&self) -> bool {
        self.escalate.is_none() && self.impersonate_user.is_none()
    }
}

/// Output transforms applied to each module result
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutputConfig {
    pub changed_condition: Option<Expression>,
    pub failed_condition: Option<Expression>,
    pub continue_on_fail: Option<Expression>,
}

/// A fully resolved step bound to one module
pub struct Step {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) targets: Vec<Arc<Host>>,
    pub(crate) condition: Option<Expression>,
    pub(crate) loop_config: Option<LoopConfig>,
    pub(crate) exec_timeout: Option<Expression>,
    pub(crate) what_if: bool,
    pub(crate) input: BTreeMap<String, Expression>,
    pub(crate) escalate: Option<EscalateConfig>,
    pub(crate) output: OutputConfig,
    pub(crate) module: Arc<dyn Module>,
}

impl Step {
    pub fn builder(id: impl Into<String>, name: impl Into<String>) -> StepBuilder {
        StepBuilder::new(id, name)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn targets(&self) -> &[Arc<Host>] {
        &self.targets
    }

    pub fn loop_config(&self) -> Option<&LoopConfig> {
        self.loop_config.as_ref()
    }

    pub fn exec_timeout(&self) -> Option<&Expression> {
        self.exec_timeout.as_ref()
    }

    pub fn what_if(&self) -> bool {
        self.what_if
    }

    pub fn input(&self) -> &BTreeMap<String, Expression> {
        &self.input
    }

    pub fn escalate(&self) -> Option<&EscalateConfig> {
        self.escalate.as_ref()
    }

    pub fn module(&self) -> &dyn Module {
        self.module.as_ref()
    }

    fn targets_host(&self, name: &str) -> bool {
        self.targets.iter().any(|h| h.name() == name)
    }

    /// Run the step on every target host concurrently
    ///
    /// Hosts that already failed earlier in the run are left out and get no
    /// output entry.
    pub async fn run(&self, ctx: &mut WorkflowContext) -> StepRun {
        info!("Running step `{}` on {} host(s)", self.id, self.targets.len());
        ctx.display.step_header(&self.name);

        for host in &self.targets {
            ctx.add_host(Arc::clone(host));
        }
        let hostvars = ctx.load_host_vars();

        let shared = StepContext {
            config: &ctx.config,
            display: ctx.display.as_ref(),
            cancel: &ctx.cancel,
            hostvars,
        };

        let tasks = ctx
            .lanes
            .iter_mut()
            .filter(|lane| self.targets_host(lane.host.name()))
            .map(|lane| {
                let shared = &shared;
                async move {
                    if lane.state.is_failed() {
                        debug!(
                            "Skipping step `{}` on {}: host already failed",
                            self.id,
                            lane.host.name()
                        );
                        return None;
                    }
                    let name = lane.host.name().to_string();
                    let outcome = HostExecutor::new(self, shared, &lane.host, &mut lane.state)
                        .run()
                        .await;
                    Some((name, outcome))
                }
            });

        let mut run = StepRun::new(&self.id);
        for (host, outcome) in join_all(tasks).await.into_iter().flatten() {
            run.outputs.insert(host, outcome.output);
            run.errors.extend(outcome.errors);
            run.tolerated.extend(outcome.tolerated);
        }

        debug!(
            "Step `{}` finished: {} output(s), {} error(s), {} tolerated",
            self.id,
            run.outputs.len(),
            run.errors.len(),
            run.tolerated.len()
        );
        run
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("module", &self.module.name())
            .field(
                "targets",
                &self.targets.iter().map(|h| h.name()).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

/// Outcome of running one step across its hosts
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepRun {
    pub step: String,
    /// Stored output per host name
    pub outputs: BTreeMap<String, Value>,
    /// Failures that stop their host
    pub errors: Vec<HostError>,
    /// Failures recorded but allowed by `continue_on_fail`
    pub tolerated: Vec<HostError>,
}

impl StepRun {
    fn new(step: &str) -> Self {
        Self {
            step: step.to_string(),
            ..Self::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn error(&self) -> Option<StepError> {
        (!self.errors.is_empty()).then(|| StepError {
            step: self.step.clone(),
            errors: self.errors.clone(),
        })
    }
}

/// Builds a [`Step`], resolving inherited process defaults
pub struct StepBuilder {
    id: String,
    name: String,
    module: Option<Arc<dyn Module>>,
    targets: Option<Vec<Arc<Host>>>,
    condition: Option<Expression>,
    loop_config: Option<LoopConfig>,
    exec_timeout: Option<Expression>,
    what_if: Option<bool>,
    input: Option<BTreeMap<String, Expression>>,
    escalate: Option<EscalateConfig>,
    output: OutputConfig,
}

impl StepBuilder {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            module: None,
            targets: None,
            condition: None,
            loop_config: None,
            exec_timeout: None,
            what_if: None,
            input: None,
            escalate: None,
            output: OutputConfig::default(),
        }
    }

    pub fn module(mut self, module: Arc<dyn Module>) -> Self {
        self.module = Some(module);
        self
    }

    pub fn targets(mut self, targets: Vec<Arc<Host>>) -> Self {
        self.targets = Some(targets);
        self
    }

    pub fn condition(mut self, condition: Expression) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn loop_config(mut self, loop_config: LoopConfig) -> Self {
        self.loop_config = Some(loop_config);
        self
    }

    pub fn exec_timeout(mut self, timeout: Expression) -> Self {
        self.exec_timeout = Some(timeout);
        self
    }

    pub fn what_if(mut self, what_if: bool) -> Self {
        self.what_if = Some(what_if);
        self
    }

    /// Add one named input; any input replaces the process input block
    pub fn input(mut self, name: impl Into<String>, value: Expression) -> Self {
        self.input
            .get_or_insert_with(BTreeMap::new)
            .insert(name.into(), value);
        self
    }

    pub fn escalate(mut self, escalate: EscalateConfig) -> Self {
        self.escalate = Some(escalate);
        self
    }

    pub fn output(mut self, output: OutputConfig) -> Self {
        self.output = output;
        self
    }

    /// Resolve against process defaults and validate
    ///
    /// Unset targets, timeout and what-if fall back to the process value.
    /// Loop, input and escalate blocks are taken whole from the process only
    /// when the step declares none.
    pub fn build(self, defaults: &ProcessDefaults) -> Result<Step, BuildError> {
        if self.id.trim().is_empty() {
            return Err(BuildError::MissingId(format!("step `{}`", self.name)));
        }
        if self.name.trim().is_empty() {
            return Err(BuildError::MissingName(self.id));
        }

        let targets = self
            .targets
            .or_else(|| defaults.targets.clone())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| BuildError::MissingTargets(self.id.clone()))?;
        let module = self
            .module
            .ok_or_else(|| BuildError::MissingModule(self.id.clone()))?;
        let escalate = self.escalate.or_else(|| defaults.escalate.clone());
        if escalate.as_ref().is_some_and(EscalateConfig::is_empty) {
            return Err(BuildError::EmptyEscalate(format!("step `{}`", self.id)));
        }

        Ok(Step {
            id: self.id,
            name: self.name,
            targets,
            condition: self.condition,
            loop_config: self.loop_config.or_else(|| defaults.loop_config.clone()),
            exec_timeout: self.exec_timeout.or_else(|| defaults.exec_timeout.clone()),
            what_if: self.what_if.or(defaults.what_if).unwrap_or(false),
            input: self
                .input
                .or_else(|| defaults.input.clone())
                .unwrap_or_default(),
            escalate,
            output: self.output,
            module,
        })
    }
}
