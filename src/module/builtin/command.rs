//! Command module for running shell commands on a host

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::debug;

use crate::expression::Value;
use crate::inventory::Host;
use crate::module::{FieldType, InputError, InputSpec, Module, ModuleResult, RunConfig};
use crate::transport::TransportError;

/// Runs a shell command through the host's transport
#[derive(Debug, Default, Clone, Copy)]
pub struct CommandModule;

impl CommandModule {
    fn command(input: &BTreeMap<String, Value>) -> &str {
        input.get("command").and_then(Value::as_str).unwrap_or_default()
    }
}

#[async_trait]
impl Module for CommandModule {
    fn name(&self) -> &str {
        "command"
    }

    fn description(&self) -> &str {
        "Run a shell command on the host"
    }

    fn input_spec(&self) -> InputSpec {
        let mut spec = InputSpec::new();
        spec.add_required("command", FieldType::String, "The shell command to execute")
            .add_optional_with_default(
                "changed",
                FieldType::Bool,
                true,
                "Report the host as changed on success",
            );
        spec
    }

    fn validate(&self, _host: &Host, input: &BTreeMap<String, Value>) -> Result<(), InputError> {
        if Self::command(input).trim().is_empty() {
            return Err(InputError::Invalid("input `command` must not be empty".to_string()));
        }
        Ok(())
    }

    async fn run(
        &self,
        host: &Host,
        config: &RunConfig,
        input: &BTreeMap<String, Value>,
    ) -> Option<ModuleResult> {
        let command = Self::command(input);
        let changed = input.get("changed") != Some(&Value::Bool(false));

        if config.what_if {
            let mut output = BTreeMap::new();
            output.insert("command".to_string(), Value::from(command));
            return Some(
                ModuleResult::success(changed, output)
                    .with_message(format!("would run: {command}")),
            );
        }

        let start = Instant::now();
        let result = host
            .transport()
            .execute(command, config.escalation.as_ref(), &config.cancel)
            .await;
        debug!(
            "Command on {} finished in {:?}",
            host.name(),
            start.elapsed()
        );

        let output = match result {
            Ok(output) => output,
            Err(TransportError::Cancelled) => {
                return Some(ModuleResult::failure("execution cancelled", command))
            }
            Err(e) => {
                return Some(ModuleResult::failure(
                    format!("failed to execute command: {e}"),
                    command,
                ))
            }
        };

        let mut values = BTreeMap::new();
        values.insert("stdout".to_string(), Value::from(output.stdout.as_str()));
        values.insert("stderr".to_string(), Value::from(output.stderr.as_str()));
        values.insert("exit_code".to_string(), Value::from(output.exit_code));

        if !output.success() {
            let mut result = ModuleResult::failure(
                format!("command exited with code {}", output.exit_code),
                output.stderr.trim(),
            );
            result.output = values;
            return Some(result);
        }

        Some(ModuleResult::success(changed, values))
    }
}
