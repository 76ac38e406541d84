//! Message module for printing values

use async_trait::async_trait;
use std::collections::BTreeMap;

use crate::expression::Value;
use crate::inventory::Host;
use crate::module::{FieldType, InputSpec, Module, ModuleResult, RunConfig};

/// Prints a message; never changes the host
#[derive(Debug, Default, Clone, Copy)]
pub struct MessageModule;

#[async_trait]
impl Module for MessageModule {
    fn name(&self) -> &str {
        "message"
    }

    fn description(&self) -> &str {
        "Print a message or value"
    }

    fn input_spec(&self) -> InputSpec {
        let mut spec = InputSpec::new();
        spec.add_required("message", FieldType::Any, "Message or value to print");
        spec
    }

    async fn run(
        &self,
        _host: &Host,
        _config: &RunConfig,
        input: &BTreeMap<String, Value>,
    ) -> Option<ModuleResult> {
        let message = match input.get("message") {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.debug_string(),
            None => return Some(ModuleResult::failure("input `message` is missing", "")),
        };
        Some(ModuleResult::success(false, BTreeMap::new()).with_message(message))
    }
}
