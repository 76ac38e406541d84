//! Common test utilities and helpers
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use hostflow::expression::{Expression, Value};
use hostflow::inventory::Host;
use hostflow::module::{FieldType, InputError, InputSpec, Module, ModuleResult, RunConfig};
use hostflow::transport::{
    CancellationToken, CommandOutput, Escalation, NoneTransport, Transport, TransportError,
};
use hostflow::workflow::{ExecutionConfig, RecordingDisplay, WorkflowContext};

/// One recorded call of [`SpyModule::run`]
#[derive(Debug, Clone)]
pub struct Invocation {
    pub host: String,
    pub input: BTreeMap<String, Value>,
    pub escalation: Option<Escalation>,
    pub timeout: Duration,
    pub what_if: bool,
}

type Responder = dyn Fn(&Host, &BTreeMap<String, Value>) -> Option<ModuleResult> + Send + Sync;
type Validator = dyn Fn(&Host, &BTreeMap<String, Value>) -> Result<(), InputError> + Send + Sync;

/// Module that records every invocation and answers through a closure
#[derive(Clone)]
pub struct SpyModule {
    name: String,
    responder: Arc<Responder>,
    validator: Option<Arc<Validator>>,
    invocations: Arc<Mutex<Vec<Invocation>>>,
    delay: Option<Duration>,
    default_timeout: Option<Duration>,
}

impl SpyModule {
    pub fn new<F>(name: &str, responder: F) -> Self
    where
        F: Fn(&Host, &BTreeMap<String, Value>) -> Option<ModuleResult> + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            responder: Arc::new(responder),
            validator: None,
            invocations: Arc::new(Mutex::new(Vec::new())),
            delay: None,
            default_timeout: None,
        }
    }

    /// Succeeds with `changed: true` and echoes every set input as output;
    /// fails when the `fail` input is true
    pub fn echo(name: &str) -> Self {
        Self::new(name, |_, input| {
            if input.get("fail") == Some(&Value::Bool(true)) {
                return Some(ModuleResult::failure("spy failure", "requested by input"));
            }
            let output = input
                .iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            Some(ModuleResult::success(true, output))
        })
    }

    /// Module-specific validation run before every invocation
    pub fn with_validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(&Host, &BTreeMap<String, Value>) -> Result<(), InputError> + Send + Sync + 'static,
    {
        self.validator = Some(Arc::new(validator));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = Some(timeout);
        self
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.invocations.lock().unwrap().len()
    }

    pub fn hosts(&self) -> Vec<String> {
        self.invocations().into_iter().map(|i| i.host).collect()
    }
}

#[async_trait]
impl Module for SpyModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn input_spec(&self) -> InputSpec {
        let mut spec = InputSpec::new();
        spec.add_optional("item", FieldType::Any, "loop item")
            .add_optional("value", FieldType::Any, "any value")
            .add_optional("count", FieldType::Number, "a number")
            .add_optional("fail", FieldType::Bool, "fail the invocation");
        spec
    }

    fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout
    }

    fn validate(&self, host: &Host, input: &BTreeMap<String, Value>) -> Result<(), InputError> {
        match &self.validator {
            Some(validator) => validator(host, input),
            None => Ok(()),
        }
    }

    async fn run(
        &self,
        host: &Host,
        config: &RunConfig,
        input: &BTreeMap<String, Value>,
    ) -> Option<ModuleResult> {
        self.invocations.lock().unwrap().push(Invocation {
            host: host.name().to_string(),
            input: input.clone(),
            escalation: config.escalation.clone(),
            timeout: config.timeout,
            what_if: config.what_if,
        });
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        (self.responder)(host, input)
    }
}

/// Transport that records commands and counts closes
#[derive(Debug, Default)]
pub struct MockTransport {
    pub commands: Mutex<Vec<(String, Option<Escalation>)>>,
    pub output: CommandOutput,
    closes: AtomicUsize,
}

impl MockTransport {
    pub fn new(output: CommandOutput) -> Self {
        Self {
            output,
            ..Self::default()
        }
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn commands(&self) -> Vec<(String, Option<Escalation>)> {
        self.commands.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn kind(&self) -> &'static str {
        "mock"
    }

    async fn execute(
        &self,
        command: &str,
        escalation: Option<&Escalation>,
        _cancel: &CancellationToken,
    ) -> Result<CommandOutput, TransportError> {
        self.commands
            .lock()
            .unwrap()
            .push((command.to_string(), escalation.cloned()));
        Ok(self.output.clone())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn host(name: &str) -> Arc<Host> {
    Arc::new(Host::new(name, Arc::new(NoneTransport)))
}

pub fn hosts(names: &[&str]) -> Vec<Arc<Host>> {
    names.iter().map(|name| host(name)).collect()
}

pub fn expr(source: &str) -> Expression {
    Expression::parse(source).unwrap()
}

pub fn template(source: &str) -> Expression {
    Expression::template(source).unwrap()
}

/// Context reporting to a [`RecordingDisplay`] the test can inspect
pub fn context() -> (WorkflowContext, RecordingDisplay) {
    context_with(ExecutionConfig::default())
}

pub fn context_with(config: ExecutionConfig) -> (WorkflowContext, RecordingDisplay) {
    let display = RecordingDisplay::new();
    let ctx = WorkflowContext::new(config, Arc::new(display.clone()));
    (ctx, display)
}
