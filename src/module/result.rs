//! Result types for module execution

use std::collections::BTreeMap;

use crate::expression::Value;

/// Result of one module invocation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModuleResult {
    /// Whether the invocation failed
    pub failed: bool,

    /// Whether a failure was tolerated by `continue_on_fail`
    pub ignored_failure: bool,

    /// Whether the module did nothing
    pub skipped: bool,

    /// Whether the module changed the host
    pub changed: bool,

    /// Error message if the invocation failed
    pub error: Option<String>,

    /// Additional error context
    pub error_detail: Option<String>,

    /// Structured module output
    pub output: BTreeMap<String, Value>,

    /// Whether a module returned this result, as opposed to the engine
    /// recording a failure or skip on its behalf
    pub invoked: bool,

    /// Informational messages shown to the user
    pub messages: Vec<String>,

    /// Warnings shown to the user
    pub warnings: Vec<String>,
}

impl ModuleResult {
    /// Creates a successful result
    pub fn success(changed: bool, output: BTreeMap<String, Value>) -> Self {
        Self {
            changed,
            output,
            ..Self::default()
        }
    }

    /// Creates a skipped result
    pub fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }

    /// Creates a failed result
    pub fn failure(error: impl Into<String>, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        Self {
            failed: true,
            error: Some(error.into()),
            error_detail: (!detail.is_empty()).then_some(detail),
            ..Self::default()
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.messages.push(message.into());
        self
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    /// Append an error, joining it to any existing one
    pub fn append_error(&mut self, error: impl Into<String>) {
        let error = error.into();
        self.error = Some(match self.error.take() {
            Some(existing) => format!("{existing}\n{error}"),
            None => error,
        });
    }

    /// Error message, or a generic one for failures that carry none
    pub fn error_message(&self) -> &str {
        self.error.as_deref().unwrap_or("module failed")
    }

    /// Structured form stored in host task outputs and workflow output
    pub fn to_value(&self) -> Value {
        let mut entries = BTreeMap::new();
        entries.insert("changed".to_string(), Value::Bool(self.changed));
        entries.insert("failed".to_string(), Value::Bool(self.failed));
        entries.insert("skipped".to_string(), Value::Bool(self.skipped));
        if self.ignored_failure {
            entries.insert("ignored_failure".to_string(), Value::Bool(true));
        }
        if self.invoked || !self.output.is_empty() {
            entries.insert("output".to_string(), Value::Map(self.output.clone()));
        }
        if let Some(error) = &self.error {
            entries.insert("error".to_string(), Value::from(error.as_str()));
        }
        if let Some(detail) = &self.error_detail {
            entries.insert("error_detail".to_string(), Value::from(detail.as_str()));
        }
        if !self.messages.is_empty() {
            entries.insert("messages".to_string(), strings(&self.messages));
        }
        if !self.warnings.is_empty() {
            entries.insert("warnings".to_string(), strings(&self.warnings));
        }
        Value::Map(entries)
    }
}

fn strings(items: &[String]) -> Value {
    Value::List(items.iter().map(|s| Value::from(s.as_str())).collect())
}
