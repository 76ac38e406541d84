//! Per-host step execution
//!
//! For one (step, host) pair: evaluate the step condition, build the
//! iterator, then run every iteration in order. Each iteration resolves its
//! label, loop condition, escalation, timeout and inputs, validates the input
//! against the module, invokes the module and applies output transforms.
//! Every failure becomes a [`ModuleResult`]; nothing here aborts the run.

use humantime_serde::re::humantime::format_duration;
use std::collections::BTreeMap;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

use super::context::{EvalScope, ExecutionConfig};
use super::display::WorkflowDisplay;
use super::error::HostError;
use super::iterator::{default_label, IteratorKind, StepIteration, StepIterator};
use super::step::Step;
use crate::expression::{EvalError, Value};
use crate::inventory::{Host, HostState};
use crate::module::{ModuleResult, RunConfig};
use crate::transport::{CancellationToken, Escalation};

/// Read-only state shared by all hosts of one step
pub(crate) struct StepContext<'a> {
    pub config: &'a ExecutionConfig,
    pub display: &'a dyn WorkflowDisplay,
    pub cancel: &'a CancellationToken,
    pub hostvars: Arc<Value>,
}

/// What one host reports back to its step
#[derive(Debug, Default)]
pub(crate) struct HostOutcome {
    pub output: Value,
    pub errors: Vec<HostError>,
    pub tolerated: Vec<HostError>,
}

struct IterationRecord {
    key: String,
    label: String,
    result: ModuleResult,
    propagate: bool,
}

enum Attempt {
    /// The loop condition was false
    Skipped,
    /// Failed before the module was invoked
    Failed(ModuleResult),
    /// The module ran
    Ran(ModuleResult),
}

pub(crate) struct HostExecutor<'a> {
    step: &'a Step,
    ctx: &'a StepContext<'a>,
    host: &'a Host,
    state: &'a mut HostState,
}

impl<'a> HostExecutor<'a> {
    pub fn new(
        step: &'a Step,
        ctx: &'a StepContext<'a>,
        host: &'a Host,
        state: &'a mut HostState,
    ) -> Self {
        Self {
            step,
            ctx,
            host,
            state,
        }
    }

    pub async fn run(self) -> HostOutcome {
        let (step, host) = (self.step, self.host);
        let mut scope = EvalScope::for_host(host, self.state, Arc::clone(&self.ctx.hostvars));

        if let Some(condition) = &step.condition {
            match condition.evaluate_bool(&scope) {
                Ok(true) => trace!("Condition of `{}` holds on {}", step.id, host.name()),
                Ok(false) => {
                    debug!("Skipping `{}` on {}: condition is false", step.id, host.name());
                    let result = ModuleResult::skipped();
                    self.ctx.display.host_result(host.name(), None, &result);
                    return self.finish(result.to_value(), Vec::new());
                }
                Err(e) => return self.fail_step("failed to evaluate condition", e),
            }
        }

        let iterator = match self.iterator(&scope) {
            Ok(iterator) => iterator,
            Err(e) => return self.fail_step("failed to evaluate loop items", e),
        };
        let kind = iterator.kind();
        debug!(
            "Running `{}` on {} with {} iteration(s)",
            self.step.id,
            self.host.name(),
            iterator.len()
        );

        let mut records = Vec::with_capacity(iterator.len());
        for iteration in iterator {
            records.push(self.run_iteration(&mut scope, iteration, kind).await);
        }

        let output = match kind {
            IteratorKind::Single => records
                .first()
                .map(|r| r.result.to_value())
                .unwrap_or_default(),
            IteratorKind::List | IteratorKind::Map => loop_output(&records),
        };
        self.finish(output, records)
    }

    fn iterator(&self, scope: &EvalScope) -> Result<StepIterator, String> {
        match &self.step.loop_config {
            None => Ok(StepIterator::single()),
            Some(config) => {
                let items = config.items.evaluate(scope).map_err(|e| e.to_string())?;
                StepIterator::from_items(items).map_err(|e| e.to_string())
            }
        }
    }

    /// Record a step-level failure; these always stop the host
    fn fail_step(self, message: &str, error: impl Display) -> HostOutcome {
        let result = ModuleResult::failure(message, error.to_string());
        self.ctx.display.host_result(self.host.name(), None, &result);
        let record = IterationRecord {
            key: String::new(),
            label: String::new(),
            result,
            propagate: true,
        };
        let output = record.result.to_value();
        self.finish(output, vec![record])
    }

    fn finish(self, output: Value, records: Vec<IterationRecord>) -> HostOutcome {
        let looped = self.step.loop_config.is_some();
        let mut outcome = HostOutcome {
            output: output.clone(),
            ..HostOutcome::default()
        };

        for record in records.into_iter().filter(|r| r.result.failed) {
            let error = HostError {
                host: self.host.name().to_string(),
                label: (looped && !record.label.is_empty()).then_some(record.label),
                message: record.result.error_message().to_string(),
                detail: record.result.error_detail.clone(),
            };
            if record.propagate {
                outcome.errors.push(error);
            } else {
                warn!("Tolerated failure of `{}`: {}", self.step.id, error);
                outcome.tolerated.push(error);
            }
        }

        self.state.store_task(self.step.id.clone(), output);
        if !outcome.errors.is_empty() {
            debug!("Marking {} as failed", self.host.name());
            self.state.mark_failed();
        }
        outcome
    }

    async fn run_iteration(
        &self,
        scope: &mut EvalScope,
        iteration: StepIteration,
        kind: IteratorKind,
    ) -> IterationRecord {
        let key = default_label(&iteration.index);
        let mut scope = scope.push();
        scope.bind("item", iteration.item);
        scope.bind("index", iteration.index);

        let mut label = iteration.label;
        let attempt = match self.resolve_label(&scope) {
            Ok(Some(resolved)) => {
                label = resolved;
                self.attempt(&scope).await
            }
            Ok(None) => self.attempt(&scope).await,
            Err(result) => Attempt::Failed(result),
        };

        let (mut result, ran) = match attempt {
            Attempt::Skipped => (ModuleResult::skipped(), false),
            Attempt::Failed(result) => (result, false),
            Attempt::Ran(result) => (result, true),
        };

        let tolerated = self.apply_output(&mut scope, &mut result, ran);
        result.ignored_failure = result.failed && tolerated;

        let shown_label = (kind != IteratorKind::Single).then_some(label.as_str());
        self.ctx
            .display
            .host_result(self.host.name(), shown_label, &result);

        IterationRecord {
            propagate: result.failed && !tolerated,
            key,
            label,
            result,
        }
    }

    fn resolve_label(&self, scope: &EvalScope) -> Result<Option<String>, ModuleResult> {
        let Some(expr) = self.step.loop_config.as_ref().and_then(|l| l.label.as_ref()) else {
            return Ok(None);
        };
        expr.evaluate_string(scope)
            .map(Some)
            .map_err(|e| ModuleResult::failure("failed to evaluate loop label", e.to_string()))
    }

    /// Everything from the loop condition through module invocation
    async fn attempt(&self, scope: &EvalScope) -> Attempt {
        let step = self.step;

        if let Some(condition) = step.loop_config.as_ref().and_then(|l| l.condition.as_ref()) {
            match condition.evaluate_bool(scope) {
                Ok(true) => {}
                Ok(false) => return Attempt::Skipped,
                Err(e) => return failed("failed to evaluate loop condition", e),
            }
        }

        let escalation = match self.resolve_escalation(scope) {
            Ok(escalation) => escalation,
            Err(e) => return failed("failed to evaluate escalation", e),
        };

        let timeout = match self.resolve_timeout(scope) {
            Ok(timeout) => timeout,
            Err(e) => return failed("failed to evaluate exec_timeout", e),
        };

        let mut raw = BTreeMap::new();
        for (name, expr) in &step.input {
            match expr.evaluate(scope) {
                Ok(value) => {
                    raw.insert(name.clone(), value);
                }
                Err(e) => return failed(&format!("failed to evaluate input `{name}`"), e),
            }
        }

        let spec = step.module.input_spec();
        let input = match spec.convert(raw) {
            Ok(input) => input,
            Err(e) => return failed("invalid module input", e),
        };
        if let Err(e) = spec.validate(&input) {
            return failed("invalid module input", e);
        }
        if let Err(e) = step.module.validate(self.host, &input) {
            return failed("module validation failed", e);
        }

        if self.ctx.cancel.is_cancelled() {
            return Attempt::Failed(ModuleResult::failure("execution cancelled", ""));
        }

        let token = self.ctx.cancel.child();
        let config = RunConfig {
            escalation,
            timeout,
            what_if: step.what_if,
            cancel: token.clone(),
        };
        debug!(
            "Invoking module `{}` on {} (timeout {}, escalation {:?})",
            step.module.name(),
            self.host.name(),
            format_duration(timeout),
            config.escalation
        );

        let result = tokio::select! {
            result = step.module.run(self.host, &config, &input) => match result {
                Some(result) => ModuleResult {
                    invoked: true,
                    ..result
                },
                None => ModuleResult::failure("no result returned from module", ""),
            },
            _ = tokio::time::sleep(timeout) => ModuleResult::failure(
                format!("module timed out after {}", format_duration(timeout)),
                "",
            ),
            _ = self.ctx.cancel.cancelled() => ModuleResult::failure("execution cancelled", ""),
        };
        token.cancel();

        Attempt::Ran(result)
    }

    fn resolve_escalation(&self, scope: &EvalScope) -> Result<Option<Escalation>, EvalError> {
        let Some(config) = &self.step.escalate else {
            return Ok(None);
        };
        let escalate = match &config.escalate {
            Some(expr) => expr.evaluate_bool(scope)?,
            None => false,
        };
        if !escalate {
            return Ok(None);
        }

        let secret = self.host.escalate_secret().map(str::to_string);
        let user = match &config.impersonate_user {
            Some(expr) => match expr.evaluate(scope)? {
                Value::Null => String::new(),
                value if value.is_wholly_known() => value.to_string_value()?,
                value => return Err(EvalError::conversion(&value, "string")),
            },
            None => String::new(),
        };

        if user.is_empty() {
            Ok(Some(Escalation::AsSelf { secret }))
        } else {
            Ok(Some(Escalation::Impersonate { user, secret }))
        }
    }

    fn resolve_timeout(&self, scope: &EvalScope) -> Result<Duration, EvalError> {
        match &self.step.exec_timeout {
            Some(expr) => expr.evaluate_duration(scope),
            None => Ok(self
                .step
                .module
                .default_timeout()
                .unwrap_or(self.ctx.config.default_timeout)),
        }
    }

    /// Apply output transforms; returns whether a failure is tolerated
    fn apply_output(&self, scope: &mut EvalScope, result: &mut ModuleResult, ran: bool) -> bool {
        let output = &self.step.output;
        let mut scope = scope.push();

        if ran {
            scope.bind("result", result.to_value());

            if let Some(expr) = &output.failed_condition {
                match expr.evaluate_bool(&scope) {
                    Ok(failed) => {
                        if failed && !result.failed && result.error.is_none() {
                            result.error = Some("failed_condition is true".to_string());
                        }
                        result.failed = failed;
                    }
                    Err(e) => {
                        result.failed = true;
                        result.append_error(format!("failed to evaluate failed_condition: {e}"));
                    }
                }
            }

            if let Some(expr) = &output.changed_condition {
                match expr.evaluate_bool(&scope) {
                    Ok(changed) => result.changed = changed,
                    Err(e) => {
                        result.changed = false;
                        result.failed = true;
                        result.append_error(format!("failed to evaluate changed_condition: {e}"));
                    }
                }
            }
        }

        if !result.failed {
            return false;
        }
        match &output.continue_on_fail {
            None => false,
            Some(expr) => match expr.evaluate_bool(&scope) {
                Ok(tolerate) => tolerate,
                Err(e) => {
                    result.append_error(format!("failed to evaluate continue_on_fail: {e}"));
                    false
                }
            },
        }
    }
}

fn failed(message: &str, error: impl Display) -> Attempt {
    Attempt::Failed(ModuleResult::failure(message, error.to_string()))
}

/// Aggregate of a looped step: flags summarise, `results` holds each iteration
///
/// Iterations are keyed by index so repeated labels never overwrite each
/// other; the label is kept inside each iteration object.
fn loop_output(records: &[IterationRecord]) -> Value {
    let results: BTreeMap<String, Value> = records
        .iter()
        .map(|r| {
            let mut value = r.result.to_value();
            if let Value::Map(entries) = &mut value {
                entries.insert("label".to_string(), Value::from(r.label.as_str()));
            }
            (r.key.clone(), value)
        })
        .collect();
    Value::map([
        ("changed", Value::Bool(records.iter().any(|r| r.result.changed))),
        ("failed", Value::Bool(records.iter().any(|r| r.result.failed))),
        ("skipped", Value::Bool(records.iter().all(|r| r.result.skipped))),
        ("results", Value::Map(results)),
    ])
}
