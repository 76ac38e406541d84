//! YAML front-end
//!
//! Inventory and workflow documents are deserialized with serde and then
//! built into [`Inventory`](crate::inventory::Inventory) and
//! [`Workflow`](crate::workflow::Workflow). Every structural problem is
//! reported here, before anything runs.

use serde_yaml::Value as Yaml;
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{Error, Result};
use crate::expression::{Expression, ParseError, Value};
use crate::workflow::BuildError;

pub mod inventory;
pub mod workflow;

pub use inventory::{load_inventory, parse_inventory, HostDocument, InventoryDocument, TransportKind};
pub use workflow::{
    load_workflow, parse_workflow, ProcessDocument, StepDocument, WorkflowDocument, WorkflowLoader,
};

pub(crate) fn read_document<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_yaml::from_str(&content).map_err(|source| Error::Yaml {
        path: path.to_path_buf(),
        source,
    })
}

/// Plain data value of a YAML node
pub(crate) fn yaml_to_value(yaml: &Yaml) -> Result<Value> {
    Ok(match yaml {
        Yaml::Null => Value::Null,
        Yaml::Bool(b) => Value::Bool(*b),
        Yaml::Number(n) => Value::Number(number(n)),
        Yaml::String(s) => Value::String(s.clone()),
        Yaml::Sequence(items) => Value::List(
            items
                .iter()
                .map(yaml_to_value)
                .collect::<Result<Vec<_>>>()?,
        ),
        Yaml::Mapping(entries) => {
            let mut map = BTreeMap::new();
            for (key, value) in entries {
                let name = scalar_key(key)
                    .ok_or_else(|| Error::Config(format!("unsupported map key {key:?}")))?;
                map.insert(name, yaml_to_value(value)?);
            }
            Value::Map(map)
        }
        Yaml::Tagged(tagged) => yaml_to_value(&tagged.value)?,
    })
}

/// An attribute: strings are expressions, other scalars are literals
pub(crate) fn attribute(context: &str, yaml: &Yaml) -> std::result::Result<Expression, BuildError> {
    match yaml {
        Yaml::String(source) => {
            Expression::parse(source).map_err(|e| BuildError::expression(context, e))
        }
        other => template(context, other),
    }
}

/// A template: strings interpolate `${...}`, collections recurse
pub(crate) fn template(context: &str, yaml: &Yaml) -> std::result::Result<Expression, BuildError> {
    match yaml {
        Yaml::Null => Ok(Expression::literal(Value::Null)),
        Yaml::Bool(b) => Ok(Expression::literal(*b)),
        Yaml::Number(n) => Ok(Expression::literal(number(n))),
        Yaml::String(source) => {
            Expression::template(source).map_err(|e| BuildError::expression(context, e))
        }
        Yaml::Sequence(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| template(&format!("{context}[{i}]"), item))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map(Expression::list),
        Yaml::Mapping(entries) => {
            let mut fields = Vec::with_capacity(entries.len());
            for (key, value) in entries {
                let Some(name) = scalar_key(key) else {
                    return Err(BuildError::expression(
                        context,
                        ParseError::new(&format!("{key:?}"), "unsupported map key"),
                    ));
                };
                let value = template(&format!("{context}.{name}"), value)?;
                fields.push((name, value));
            }
            Ok(Expression::map(fields))
        }
        Yaml::Tagged(tagged) => template(context, &tagged.value),
    }
}

fn number(n: &serde_yaml::Number) -> f64 {
    n.as_f64().unwrap_or_default()
}

fn scalar_key(key: &Yaml) -> Option<String> {
    match key {
        Yaml::String(s) => Some(s.clone()),
        Yaml::Bool(b) => Some(b.to_string()),
        Yaml::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
