//! Expression evaluation for step attributes
//!
//! Step attributes (conditions, loop items, timeouts, inputs, output
//! transforms) are parsed once when a workflow is built and evaluated per
//! host and per iteration against a [`Variables`] scope.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

mod eval;
mod parser;
mod value;

pub use parser::{ArithmeticOp, ComparisonOp, Expr, LogicalOp, TemplatePart};
pub use value::Value;

/// Error raised when expression source text cannot be parsed
#[derive(Debug, Clone, Error, PartialEq)]
#[error("invalid expression `{expression}`: {message}")]
pub struct ParseError {
    pub expression: String,
    pub message: String,
}

impl ParseError {
    pub fn new(expression: &str, message: impl Into<String>) -> Self {
        Self {
            expression: expression.to_string(),
            message: message.into(),
        }
    }
}

/// Error raised while evaluating an expression
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EvalError {
    #[error("variable `{0}` is not defined")]
    UndefinedVariable(String),

    #[error("{target} value has no field `{field}`")]
    MissingField { target: &'static str, field: String },

    #[error("index {index} is out of range for a list of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("cannot index a {target} value with {index}")]
    InvalidIndex { target: &'static str, index: String },

    #[error("cannot apply `{op}` to {left} and {right}")]
    InvalidOperands {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },

    #[error("cannot convert {value} to {target}{}", .reason.as_ref().map(|r| format!(": {r}")).unwrap_or_default())]
    Conversion {
        value: String,
        target: &'static str,
        reason: Option<String>,
    },
}

impl EvalError {
    pub(crate) fn conversion(value: &Value, target: &'static str) -> Self {
        EvalError::Conversion {
            value: value.debug_string(),
            target,
            reason: None,
        }
    }
}

/// Read-only variable lookup used during evaluation
pub trait Variables {
    fn lookup(&self, name: &str) -> Option<&Value>;
}

impl Variables for BTreeMap<String, Value> {
    fn lookup(&self, name: &str) -> Option<&Value> {
        self.get(name)
    }
}

impl Variables for HashMap<String, Value> {
    fn lookup(&self, name: &str) -> Option<&Value> {
        self.get(name)
    }
}

/// A parsed expression together with its source text
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    source: String,
    root: Expr,
}

impl Expression {
    /// Parse a bare expression such as `result.output.count > 0`
    pub fn parse(source: &str) -> Result<Self, ParseError> {
        Ok(Self {
            source: source.to_string(),
            root: parser::parse_expression(source)?,
        })
    }

    /// Parse a template string such as `echo ${item}`
    pub fn template(source: &str) -> Result<Self, ParseError> {
        Ok(Self {
            source: source.to_string(),
            root: parser::parse_template(source)?,
        })
    }

    /// An expression that always evaluates to `value`
    pub fn literal(value: impl Into<Value>) -> Self {
        let value = value.into();
        Self {
            source: value.debug_string(),
            root: Expr::Literal(value),
        }
    }

    /// An expression building a list from element expressions
    pub fn list(items: Vec<Expression>) -> Self {
        let source = format!(
            "[{}]",
            items.iter().map(|i| i.source.as_str()).collect::<Vec<_>>().join(", ")
        );
        Self {
            source,
            root: Expr::List(items.into_iter().map(|i| i.root).collect()),
        }
    }

    /// An expression building a map from entry expressions
    pub fn map(entries: Vec<(String, Expression)>) -> Self {
        let source = format!(
            "{{{}}}",
            entries
                .iter()
                .map(|(k, v)| format!("{k:?}: {}", v.source))
                .collect::<Vec<_>>()
                .join(", ")
        );
        Self {
            source,
            root: Expr::Map(entries.into_iter().map(|(k, v)| (k, v.root)).collect()),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn root(&self) -> &Expr {
        &self.root
    }

    /// Evaluate against the given variables
    pub fn evaluate(&self, vars: &dyn Variables) -> Result<Value, EvalError> {
        eval::evaluate(&self.root, vars)
    }

    /// Evaluate and require a known boolean
    pub fn evaluate_bool(&self, vars: &dyn Variables) -> Result<bool, EvalError> {
        self.evaluate_known(vars)?.to_bool()
    }

    /// Evaluate and require a known scalar, rendered as a string
    pub fn evaluate_string(&self, vars: &dyn Variables) -> Result<String, EvalError> {
        self.evaluate_known(vars)?.to_string_value()
    }

    /// Evaluate and require a duration (seconds or humantime string)
    pub fn evaluate_duration(&self, vars: &dyn Variables) -> Result<Duration, EvalError> {
        self.evaluate_known(vars)?.to_duration()
    }

    fn evaluate_known(&self, vars: &dyn Variables) -> Result<Value, EvalError> {
        let value = self.evaluate(vars)?;
        if !value.is_wholly_known() {
            return Err(EvalError::conversion(&value, "a known value"));
        }
        Ok(value)
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}
