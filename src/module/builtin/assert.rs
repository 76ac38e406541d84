use async_trait::async_trait;
use std::collections::BTreeMap;

use crate::expression::Value;
use crate::inventory::Host;
use crate::module::{FieldType, InputSpec, Module, ModuleResult, RunConfig};

const DEFAULT_FAILURE_MESSAGE: &str = "condition failed";

/// Fails the step when `condition` is false
#[derive(Debug, Default, Clone, Copy)]
pub struct AssertModule;

#[async_trait]
impl Module for AssertModule {
    fn name(&self) -> &str {
        "assert"
    }

    fn description(&self) -> &str {
        "Fail unless a condition holds"
    }

    fn input_spec(&self) -> InputSpec {
        let mut spec = InputSpec::new();
        spec.add_required("condition", FieldType::Bool, "Condition that must be true")
            .add_optional_with_default(
                "success_message",
                FieldType::String,
                "",
                "Message shown when the condition holds",
            )
            .add_optional_with_default(
                "failure_message",
                FieldType::String,
                DEFAULT_FAILURE_MESSAGE,
                "Error reported when the condition fails",
            );
        spec
    }

    async fn run(
        &self,
        _host: &Host,
        _config: &RunConfig,
        input: &BTreeMap<String, Value>,
    ) -> Option<ModuleResult> {
        let message = |key: &str, default: &str| {
            input
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or(default)
                .to_string()
        };

        if input.get("condition") != Some(&Value::Bool(true)) {
            return Some(ModuleResult::failure(
                message("failure_message", DEFAULT_FAILURE_MESSAGE),
                "",
            ));
        }

        let success = message("success_message", "");
        let mut output = BTreeMap::new();
        output.insert("message".to_string(), Value::from(success.as_str()));
        let mut result = ModuleResult::success(false, output);
        if !success.is_empty() {
            result = result.with_message(success);
        }
        Some(result)
    }
}
