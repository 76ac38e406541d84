//! Expression evaluation against a variable scope

use super::parser::{ArithmeticOp, ComparisonOp, Expr, LogicalOp, TemplatePart};
use super::value::{format_number, Value};
use super::{EvalError, Variables};
use std::collections::BTreeMap;

/// Evaluate an expression node
pub(crate) fn evaluate(expr: &Expr, vars: &dyn Variables) -> Result<Value, EvalError> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Variable(name) => vars
            .lookup(name)
            .cloned()
            .ok_or_else(|| EvalError::UndefinedVariable(name.clone())),
        Expr::Field { target, name } => {
            let target = evaluate(target, vars)?;
            field(&target, name)
        }
        Expr::Index { target, index } => {
            let target = evaluate(target, vars)?;
            let index = evaluate(index, vars)?;
            index_value(&target, &index)
        }
        Expr::List(items) => items
            .iter()
            .map(|item| evaluate(item, vars))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::List),
        Expr::Map(entries) => entries
            .iter()
            .map(|(key, value)| Ok((key.clone(), evaluate(value, vars)?)))
            .collect::<Result<BTreeMap<_, _>, EvalError>>()
            .map(Value::Map),
        Expr::Template(parts) => template(parts, vars),
        Expr::Not(inner) => match evaluate(inner, vars)? {
            Value::Unknown => Ok(Value::Unknown),
            value => Ok(Value::Bool(!value.to_bool()?)),
        },
        Expr::Negate(inner) => match evaluate(inner, vars)? {
            Value::Number(n) => Ok(Value::Number(-n)),
            Value::Unknown => Ok(Value::Unknown),
            other => Err(EvalError::conversion(&other, "number")),
        },
        Expr::Comparison { left, op, right } => {
            let left = evaluate(left, vars)?;
            let right = evaluate(right, vars)?;
            compare(left, *op, right)
        }
        Expr::Logical { left, op, right } => logical(left, *op, right, vars),
        Expr::Arithmetic { left, op, right } => {
            let left = evaluate(left, vars)?;
            let right = evaluate(right, vars)?;
            arithmetic(left, *op, right)
        }
    }
}

fn field(target: &Value, name: &str) -> Result<Value, EvalError> {
    match target {
        Value::Map(entries) => entries.get(name).cloned().ok_or_else(|| EvalError::MissingField {
            target: target.type_name(),
            field: name.to_string(),
        }),
        Value::Unknown => Ok(Value::Unknown),
        other => Err(EvalError::MissingField {
            target: other.type_name(),
            field: name.to_string(),
        }),
    }
}

fn index_value(target: &Value, index: &Value) -> Result<Value, EvalError> {
    match (target, index) {
        (Value::Unknown, _) | (_, Value::Unknown) => Ok(Value::Unknown),
        (Value::List(items), Value::Number(n)) if n.fract() == 0.0 && *n >= 0.0 => items
            .get(*n as usize)
            .cloned()
            .ok_or(EvalError::IndexOutOfRange {
                index: *n as usize,
                len: items.len(),
            }),
        (Value::Map(_), Value::String(key)) => field(target, key),
        _ => Err(EvalError::InvalidIndex {
            target: target.type_name(),
            index: index.debug_string(),
        }),
    }
}

/// A template with a single interpolation keeps the interpolated value's type
fn template(parts: &[TemplatePart], vars: &dyn Variables) -> Result<Value, EvalError> {
    if let [TemplatePart::Interpolation(expr)] = parts {
        return evaluate(expr, vars);
    }

    let mut out = String::new();
    for part in parts {
        match part {
            TemplatePart::Text(text) => out.push_str(text),
            TemplatePart::Interpolation(expr) => match evaluate(expr, vars)? {
                Value::Unknown => return Ok(Value::Unknown),
                value => out.push_str(&value.to_string_value()?),
            },
        }
    }

    Ok(Value::String(out))
}

fn logical(
    left: &Expr,
    op: LogicalOp,
    right: &Expr,
    vars: &dyn Variables,
) -> Result<Value, EvalError> {
    let left = evaluate(left, vars)?;
    if left == Value::Unknown {
        return Ok(Value::Unknown);
    }

    let left = left.to_bool()?;
    match (op, left) {
        (LogicalOp::And, false) => return Ok(Value::Bool(false)),
        (LogicalOp::Or, true) => return Ok(Value::Bool(true)),
        _ => {}
    }

    match evaluate(right, vars)? {
        Value::Unknown => Ok(Value::Unknown),
        right => Ok(Value::Bool(right.to_bool()?)),
    }
}

/// Compare two values; numeric strings compare equal to numbers
fn compare(left: Value, op: ComparisonOp, right: Value) -> Result<Value, EvalError> {
    if left == Value::Unknown || right == Value::Unknown {
        return Ok(Value::Unknown);
    }

    let (left, right) = coerce_for_comparison(left, right);

    let result = match op {
        ComparisonOp::Equal => left == right,
        ComparisonOp::NotEqual => left != right,
        _ => {
            let ordering = match (&left, &right) {
                (Value::Number(l), Value::Number(r)) => l.partial_cmp(r),
                (Value::String(l), Value::String(r)) => Some(l.cmp(r)),
                _ => None,
            };
            let ordering = ordering.ok_or_else(|| EvalError::InvalidOperands {
                op: op.symbol(),
                left: left.type_name(),
                right: right.type_name(),
            })?;
            match op {
                ComparisonOp::GreaterThan => ordering.is_gt(),
                ComparisonOp::LessThan => ordering.is_lt(),
                ComparisonOp::GreaterThanOrEqual => ordering.is_ge(),
                ComparisonOp::LessThanOrEqual => ordering.is_le(),
                ComparisonOp::Equal | ComparisonOp::NotEqual => unreachable!(),
            }
        }
    };

    Ok(Value::Bool(result))
}

fn coerce_for_comparison(left: Value, right: Value) -> (Value, Value) {
    match (&left, &right) {
        (Value::String(s), Value::Number(_)) => match s.parse::<f64>() {
            Ok(n) => (Value::Number(n), right),
            Err(_) => (left, right),
        },
        (Value::Number(_), Value::String(s)) => match s.parse::<f64>() {
            Ok(n) => (left, Value::Number(n)),
            Err(_) => (left, right),
        },
        _ => (left, right),
    }
}

fn arithmetic(left: Value, op: ArithmeticOp, right: Value) -> Result<Value, EvalError> {
    match (op, left, right) {
        (_, Value::Unknown, _) | (_, _, Value::Unknown) => Ok(Value::Unknown),
        (ArithmeticOp::Add, Value::Number(l), Value::Number(r)) => Ok(Value::Number(l + r)),
        (ArithmeticOp::Subtract, Value::Number(l), Value::Number(r)) => Ok(Value::Number(l - r)),
        (ArithmeticOp::Add, Value::List(mut l), Value::List(r)) => {
            l.extend(r);
            Ok(Value::List(l))
        }
        (ArithmeticOp::Add, Value::String(l), r) => Ok(Value::String(l + &concat_operand(&r)?)),
        (ArithmeticOp::Add, l, Value::String(r)) => Ok(Value::String(concat_operand(&l)? + &r)),
        (op, l, r) => Err(EvalError::InvalidOperands {
            op: op.symbol(),
            left: l.type_name(),
            right: r.type_name(),
        }),
    }
}

fn concat_operand(value: &Value) -> Result<String, EvalError> {
    match value {
        Value::Number(n) => Ok(format_number(*n)),
        other => other.to_string_value(),
    }
}
