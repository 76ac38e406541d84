//! Input specifications for modules
//!
//! A module declares the fields it accepts. Evaluated step inputs are coerced
//! into the declared types and checked before the module ever runs.

use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

use crate::expression::Value;

/// Type of a module input field
#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    Any,
    String,
    Bool,
    Number,
    /// Seconds as a number, or a humantime string such as `5m`
    Duration,
    List(Box<FieldType>),
    Map(Box<FieldType>),
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Any => write!(f, "any"),
            FieldType::String => write!(f, "string"),
            FieldType::Bool => write!(f, "bool"),
            FieldType::Number => write!(f, "number"),
            FieldType::Duration => write!(f, "duration"),
            FieldType::List(inner) => write!(f, "list({inner})"),
            FieldType::Map(inner) => write!(f, "map({inner})"),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum InputError {
    #[error("missing required input `{0}`")]
    MissingField(String),

    #[error("unknown input `{0}`")]
    UnknownField(String),

    #[error("input `{field}` must be {expected}, got {found}")]
    Conversion {
        field: String,
        expected: String,
        found: String,
    },

    #[error("input `{0}` is not known")]
    UnknownValue(String),

    #[error("input `{field}` must be one of {allowed}, got {found}")]
    NotAllowed {
        field: String,
        allowed: String,
        found: String,
    },

    #[error("{0}")]
    Invalid(String),
}

/// One declared input field
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: String,
    pub field_type: FieldType,
    pub required: bool,
    pub default: Option<Value>,
    pub allowed: Vec<Value>,
    pub description: String,
}

/// Defines the inputs a module accepts
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputSpec {
    fields: Vec<FieldSpec>,
}

impl InputSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a required field
    pub fn add_required(&mut self, name: &str, field_type: FieldType, description: &str) -> &mut Self {
        self.push(name, field_type, true, None, description)
    }

    /// Adds an optional field that is null when omitted
    pub fn add_optional(&mut self, name: &str, field_type: FieldType, description: &str) -> &mut Self {
        self.push(name, field_type, false, None, description)
    }

    /// Adds an optional field with a default value
    pub fn add_optional_with_default(
        &mut self,
        name: &str,
        field_type: FieldType,
        default: impl Into<Value>,
        description: &str,
    ) -> &mut Self {
        self.push(name, field_type, false, Some(default.into()), description)
    }

    /// Restricts a field to a fixed set of values
    pub fn constrain(&mut self, name: &str, allowed: Vec<Value>) -> &mut Self {
        if let Some(field) = self.fields.iter_mut().find(|f| f.name == name) {
            field.allowed = allowed;
        }
        self
    }

    fn push(
        &mut self,
        name: &str,
        field_type: FieldType,
        required: bool,
        default: Option<Value>,
        description: &str,
    ) -> &mut Self {
        self.fields.retain(|f| f.name != name);
        self.fields.push(FieldSpec {
            name: name.to_string(),
            field_type,
            required,
            default,
            allowed: Vec::new(),
            description: description.to_string(),
        });
        self
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Coerce raw input into the declared types and fill in defaults
    pub fn convert(
        &self,
        mut input: BTreeMap<String, Value>,
    ) -> Result<BTreeMap<String, Value>, InputError> {
        if let Some(unknown) = input.keys().find(|k| self.field(k).is_none()) {
            return Err(InputError::UnknownField(unknown.clone()));
        }

        let mut converted = BTreeMap::new();
        for field in &self.fields {
            let value = match input.remove(&field.name) {
                Some(value) if !value.is_wholly_known() => {
                    return Err(InputError::UnknownValue(field.name.clone()))
                }
                Some(value) if !value.is_null() => coerce(&field.name, value, &field.field_type)?,
                _ => match &field.default {
                    Some(default) => default.clone(),
                    None if field.required => {
                        return Err(InputError::MissingField(field.name.clone()))
                    }
                    None => Value::Null,
                },
            };
            converted.insert(field.name.clone(), value);
        }
        Ok(converted)
    }

    /// Check required fields and value constraints on converted input
    pub fn validate(&self, input: &BTreeMap<String, Value>) -> Result<(), InputError> {
        for field in &self.fields {
            let value = input.get(&field.name).unwrap_or(&Value::Null);
            if value.is_null() {
                if field.required {
                    return Err(InputError::MissingField(field.name.clone()));
                }
                continue;
            }
            if !field.allowed.is_empty() && !field.allowed.contains(value) {
                let allowed: Vec<String> = field.allowed.iter().map(Value::debug_string).collect();
                return Err(InputError::NotAllowed {
                    field: field.name.clone(),
                    allowed: format!("[{}]", allowed.join(", ")),
                    found: value.debug_string(),
                });
            }
        }
        Ok(())
    }
}

fn coerce(field: &str, value: Value, field_type: &FieldType) -> Result<Value, InputError> {
    let mismatch = |value: &Value| InputError::Conversion {
        field: field.to_string(),
        expected: field_type.to_string(),
        found: value.debug_string(),
    };

    match (field_type, value) {
        (FieldType::Any, value) => Ok(value),
        (FieldType::String, value @ (Value::String(_) | Value::Number(_) | Value::Bool(_))) => {
            value.to_string_value().map(Value::String).map_err(|_| mismatch(&value))
        }
        (FieldType::Bool, value @ (Value::Bool(_) | Value::String(_))) => {
            value.to_bool().map(Value::Bool).map_err(|_| mismatch(&value))
        }
        (FieldType::Number, Value::Number(n)) => Ok(Value::Number(n)),
        (FieldType::Number, Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map(Value::Number)
            .map_err(|_| mismatch(&Value::String(s))),
        (FieldType::Duration, value @ (Value::Number(_) | Value::String(_))) => value
            .to_duration()
            .map(|d| Value::Number(d.as_secs_f64()))
            .map_err(|_| mismatch(&value)),
        (FieldType::List(inner), Value::List(items)) => items
            .into_iter()
            .map(|item| coerce(field, item, inner))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::List),
        (FieldType::Map(inner), Value::Map(entries)) => entries
            .into_iter()
            .map(|(k, v)| Ok((k, coerce(field, v, inner)?)))
            .collect::<Result<BTreeMap<_, _>, InputError>>()
            .map(Value::Map),
        (_, value) => Err(mismatch(&value)),
    }
}
