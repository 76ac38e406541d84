//! Loop iteration over step items

use thiserror::Error;

use crate::expression::Value;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum IteratorError {
    #[error("items must be a wholly known and non-null value, got {0}")]
    NotKnown(String),

    #[error("items must be a list or map, got {0}")]
    NotCollection(&'static str),
}

/// Shape of the collection a step iterates over
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IteratorKind {
    Single,
    List,
    Map,
}

/// One loop iteration; the single iteration of an unlooped step is empty
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StepIteration {
    pub label: String,
    pub index: Value,
    pub item: Value,
}

impl StepIteration {
    fn new(index: Value, item: Value) -> Self {
        Self {
            label: default_label(&index),
            index,
            item,
        }
    }
}

/// Label of an iteration whose step sets no label expression
pub fn default_label(index: &Value) -> String {
    match index {
        Value::Number(n) if n.fract() == 0.0 => format!("{}", *n as i64),
        Value::String(s) => s.clone(),
        other => other.debug_string(),
    }
}

/// Produces the iterations of a step for one host
#[derive(Debug)]
pub struct StepIterator {
    kind: IteratorKind,
    iterations: std::vec::IntoIter<StepIteration>,
}

impl StepIterator {
    /// Exactly one empty iteration
    pub fn single() -> Self {
        Self {
            kind: IteratorKind::Single,
            iterations: vec![StepIteration::default()].into_iter(),
        }
    }

    /// Iterate over an evaluated `items` value
    ///
    /// Lists yield their positions as the index; maps yield their keys, in key
    /// order.
    pub fn from_items(items: Value) -> Result<Self, IteratorError> {
        if !items.is_wholly_known() || items.is_null() {
            return Err(IteratorError::NotKnown(items.debug_string()));
        }

        let (kind, iterations) = match items {
            Value::List(items) => (
                IteratorKind::List,
                items
                    .into_iter()
                    .enumerate()
                    .map(|(i, item)| StepIteration::new(Value::from(i), item))
                    .collect::<Vec<_>>(),
            ),
            Value::Map(entries) => (
                IteratorKind::Map,
                entries
                    .into_iter()
                    .map(|(key, item)| StepIteration::new(Value::String(key), item))
                    .collect(),
            ),
            other => return Err(IteratorError::NotCollection(other.type_name())),
        };

        Ok(Self {
            kind,
            iterations: iterations.into_iter(),
        })
    }

    pub fn kind(&self) -> IteratorKind {
        self.kind
    }
}

impl Iterator for StepIterator {
    type Item = StepIteration;

    fn next(&mut self) -> Option<Self::Item> {
        self.iterations.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.iterations.size_hint()
    }
}

impl ExactSizeIterator for StepIterator {}
