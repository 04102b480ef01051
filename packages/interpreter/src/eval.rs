use crate::ast::{BinaryOp, Expr, UnaryOp};
use serde_json::{Number, Value};
use std::borrow::Cow;
use std::cmp::Ordering;
use thiserror::Error;

pub type EvalResult<T> = Result<T, EvalError>;

/// Failure while evaluating an expression against a model
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("Invalid operands for {operator}: {left} and {right}")]
    InvalidOperands {
        operator: &'static str,
        left: &'static str,
        right: &'static str,
    },

    #[error("Cannot index {target} with {index}")]
    InvalidIndex {
        target: &'static str,
        index: &'static str,
    },

    #[error("Division by zero")]
    DivisionByZero,
}

pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Text written to the output for a value
pub fn to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

/// Equality with integers and floats compared numerically
pub fn values_equal(left: &Value, right: &Value) -> bool {
    match (as_number(left), as_number(right)) {
        (Some(Num::Int(a)), Some(Num::Int(b))) => a == b,
        (Some(a), Some(b)) => a.float() == b.float(),
        _ => left == right,
    }
}

pub fn evaluate(expr: &Expr, model: &Value) -> EvalResult<Value> {
    Ok(resolve(expr, model)?.into_owned())
}

/// Evaluate, borrowing from the model for plain member and index paths
fn resolve<'v>(expr: &Expr, model: &'v Value) -> EvalResult<Cow<'v, Value>> {
    match expr {
        Expr::Model => Ok(Cow::Borrowed(model)),

        Expr::Member { object, property } => member(resolve(object, model)?, property),

        Expr::Index { object, index } => {
            let target = resolve(object, model)?;
            let index = evaluate(index, model)?;
            index_value(target, &index)
        }

        other => compute(other, model).map(Cow::Owned),
    }
}

fn compute(expr: &Expr, model: &Value) -> EvalResult<Value> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),

        Expr::Model | Expr::Member { .. } | Expr::Index { .. } => evaluate(expr, model),

        Expr::Call {
            function,
            arguments,
        } => {
            let values = arguments
                .iter()
                .map(|argument| evaluate(argument, model))
                .collect::<EvalResult<Vec<_>>>()?;
            (function.call)(&values)
        }

        Expr::Unary { operator, operand } => {
            let value = evaluate(operand, model)?;
            match operator {
                UnaryOp::Not => Ok(Value::Bool(!expect_bool(&value)?)),
                UnaryOp::Negate => match as_number(&value) {
                    Some(Num::Int(n)) => Ok(n
                        .checked_neg()
                        .map(Value::from)
                        .unwrap_or_else(|| from_float(-(n as f64)))),
                    Some(Num::Float(f)) => Ok(from_float(-f)),
                    None => Err(EvalError::TypeMismatch {
                        expected: "number",
                        found: type_name(&value),
                    }),
                },
            }
        }

        Expr::Binary {
            left,
            operator,
            right,
        } => match operator {
            BinaryOp::And => {
                if !expect_bool(&evaluate(left, model)?)? {
                    return Ok(Value::Bool(false));
                }
                Ok(Value::Bool(expect_bool(&evaluate(right, model)?)?))
            }
            BinaryOp::Or => {
                if expect_bool(&evaluate(left, model)?)? {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(expect_bool(&evaluate(right, model)?)?))
            }
            op => {
                let left = evaluate(left, model)?;
                let right = evaluate(right, model)?;
                binary(*op, &left, &right)
            }
        },
    }
}

fn binary(op: BinaryOp, left: &Value, right: &Value) -> EvalResult<Value> {
    let invalid = || EvalError::InvalidOperands {
        operator: op.symbol(),
        left: type_name(left),
        right: type_name(right),
    };

    match op {
        BinaryOp::Add if left.is_string() || right.is_string() => {
            let mut text = to_text(left);
            text.push_str(&to_text(right));
            Ok(Value::String(text))
        }
        BinaryOp::Add
        | BinaryOp::Subtract
        | BinaryOp::Multiply
        | BinaryOp::Divide
        | BinaryOp::Remainder => match (as_number(left), as_number(right)) {
            (Some(a), Some(b)) => arithmetic(op, a, b).ok_or_else(invalid)?,
            _ => Err(invalid()),
        },
        BinaryOp::Equals => Ok(Value::Bool(values_equal(left, right))),
        BinaryOp::NotEquals => Ok(Value::Bool(!values_equal(left, right))),
        BinaryOp::LessThan
        | BinaryOp::LessThanOrEqual
        | BinaryOp::GreaterThan
        | BinaryOp::GreaterThanOrEqual => {
            let ordering = compare(left, right).ok_or_else(invalid)?;
            Ok(Value::Bool(match op {
                BinaryOp::LessThan => ordering == Ordering::Less,
                BinaryOp::LessThanOrEqual => ordering != Ordering::Greater,
                BinaryOp::GreaterThan => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            }))
        }
        BinaryOp::And | BinaryOp::Or => Err(invalid()),
    }
}

fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => match (as_number(left)?, as_number(right)?) {
            (Num::Int(a), Num::Int(b)) => Some(a.cmp(&b)),
            (a, b) => a.float().partial_cmp(&b.float()),
        },
    }
}

fn member<'v>(target: Cow<'v, Value>, property: &str) -> EvalResult<Cow<'v, Value>> {
    match target {
        Cow::Borrowed(Value::Object(map)) => {
            Ok(map.get(property).map_or(Cow::Owned(Value::Null), Cow::Borrowed))
        }
        Cow::Owned(Value::Object(mut map)) => {
            Ok(Cow::Owned(map.remove(property).unwrap_or(Value::Null)))
        }
        Cow::Borrowed(Value::Null) | Cow::Owned(Value::Null) => Ok(Cow::Owned(Value::Null)),
        other => Err(EvalError::TypeMismatch {
            expected: "object",
            found: type_name(&other),
        }),
    }
}

fn index_value<'v>(target: Cow<'v, Value>, index: &Value) -> EvalResult<Cow<'v, Value>> {
    let invalid = |target: &Value| EvalError::InvalidIndex {
        target: type_name(target),
        index: type_name(index),
    };
    let position = |len: usize| match index.as_i64() {
        Some(i) if i >= 0 && (i as usize) < len => Ok(Some(i as usize)),
        Some(_) => Ok(None),
        None => Err(()),
    };

    match (target, index) {
        (target, _) if target.is_null() => Ok(Cow::Owned(Value::Null)),
        (target, Value::String(key)) if target.is_object() => member(target, key),
        (Cow::Borrowed(Value::Array(items)), Value::Number(_)) => match position(items.len()) {
            Ok(Some(i)) => Ok(Cow::Borrowed(&items[i])),
            Ok(None) => Ok(Cow::Owned(Value::Null)),
            Err(()) => Err(invalid(&Value::Array(Vec::new()))),
        },
        (Cow::Owned(Value::Array(mut items)), Value::Number(_)) => match position(items.len()) {
            Ok(Some(i)) => Ok(Cow::Owned(items.swap_remove(i))),
            Ok(None) => Ok(Cow::Owned(Value::Null)),
            Err(()) => Err(invalid(&Value::Array(items))),
        },
        (target, Value::Number(_)) if target.is_string() => {
            let text = target.as_str().unwrap_or_default();
            match position(usize::MAX) {
                Ok(Some(i)) => Ok(Cow::Owned(
                    text.chars()
                        .nth(i)
                        .map(|c| Value::String(c.to_string()))
                        .unwrap_or(Value::Null),
                )),
                Ok(None) => Ok(Cow::Owned(Value::Null)),
                Err(()) => Err(invalid(&target)),
            }
        }
        (target, _) => Err(invalid(&target)),
    }
}

fn expect_bool(value: &Value) -> EvalResult<bool> {
    value.as_bool().ok_or(EvalError::TypeMismatch {
        expected: "bool",
        found: type_name(value),
    })
}

#[derive(Debug, Clone, Copy)]
enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    fn float(self) -> f64 {
        match self {
            Num::Int(n) => n as f64,
            Num::Float(f) => f,
        }
    }
}

fn as_number(value: &Value) -> Option<Num> {
    match value {
        Value::Number(n) => n.as_i64().map(Num::Int).or_else(|| n.as_f64().map(Num::Float)),
        _ => None,
    }
}

fn from_float(value: f64) -> Value {
    Number::from_f64(value)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

/// `None` when `op` is not arithmetic
fn arithmetic(op: BinaryOp, left: Num, right: Num) -> Option<EvalResult<Value>> {
    if let (Num::Int(a), Num::Int(b)) = (left, right) {
        let exact = match op {
            BinaryOp::Add => a.checked_add(b),
            BinaryOp::Subtract => a.checked_sub(b),
            BinaryOp::Multiply => a.checked_mul(b),
            BinaryOp::Divide | BinaryOp::Remainder if b == 0 => {
                return Some(Err(EvalError::DivisionByZero))
            }
            BinaryOp::Divide => a.checked_div(b),
            BinaryOp::Remainder => a.checked_rem(b),
            _ => return None,
        };
        if let Some(result) = exact {
            return Some(Ok(Value::from(result)));
        }
    }

    let (a, b) = (left.float(), right.float());
    let result = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Subtract => a - b,
        BinaryOp::Multiply => a * b,
        BinaryOp::Divide | BinaryOp::Remainder if b == 0.0 => {
            return Some(Err(EvalError::DivisionByZero))
        }
        BinaryOp::Divide => a / b,
        BinaryOp::Remainder => a % b,
        _ => return None,
    };
    Some(Ok(from_float(result)))
}
