//! Operator semantics shared by the evaluator and the constant folder.

use std::cmp::Ordering;

use crate::{
    ast::node::{BinaryOp, UnaryOp},
    number::Number,
    value::Value,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpError {
    InvalidTypes,
    ZeroDivision,
}

pub fn unary(op: UnaryOp, operand: &Value) -> Result<Value, OpError> {
    match (op, operand) {
        (UnaryOp::Neg, Value::Number(n)) => Ok(Value::Number(-*n)),
        (UnaryOp::Neg, _) => Err(OpError::InvalidTypes),
        (UnaryOp::Not, value) => Ok(Value::Bool(!value.is_truthy())),
    }
}

pub fn binary(op: BinaryOp, lhs: &Value, rhs: &Value) -> Result<Value, OpError> {
    match op {
        BinaryOp::Add => add(lhs, rhs),
        BinaryOp::Sub => arithmetic(lhs, rhs, |a, b| a - b),
        BinaryOp::Mul => arithmetic(lhs, rhs, |a, b| a * b),
        BinaryOp::Div => checked_arithmetic(lhs, rhs, |a, b| a / b),
        BinaryOp::Mod => checked_arithmetic(lhs, rhs, |a, b| a % b),
        BinaryOp::Eq => Ok(Value::Bool(lhs == rhs)),
        BinaryOp::Ne => Ok(Value::Bool(lhs != rhs)),
        BinaryOp::Lt => compare(lhs, rhs, Ordering::is_lt),
        BinaryOp::Lte => compare(lhs, rhs, Ordering::is_le),
        BinaryOp::Gt => compare(lhs, rhs, Ordering::is_gt),
        BinaryOp::Gte => compare(lhs, rhs, Ordering::is_ge),
        BinaryOp::And => Ok(Value::Bool(lhs.is_truthy() && rhs.is_truthy())),
        BinaryOp::Or => Ok(Value::Bool(lhs.is_truthy() || rhs.is_truthy())),
    }
}

fn add(lhs: &Value, rhs: &Value) -> Result<Value, OpError> {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => Ok(Value::Number(*a + *b)),
        (Value::String(a), b) => Ok(Value::String(format!("{}{}", a, b))),
        (a, Value::String(b)) => Ok(Value::String(format!("{}{}", a, b))),
        (Value::List(a), Value::List(b)) => {
            Ok(Value::List(a.iter().chain(b.iter()).cloned().collect()))
        }
        _ => Err(OpError::InvalidTypes),
    }
}

#[inline(always)]
fn arithmetic(
    lhs: &Value,
    rhs: &Value,
    f: impl FnOnce(Number, Number) -> Number,
) -> Result<Value, OpError> {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => Ok(Value::Number(f(*a, *b))),
        _ => Err(OpError::InvalidTypes),
    }
}

#[inline(always)]
fn checked_arithmetic(
    lhs: &Value,
    rhs: &Value,
    f: impl FnOnce(Number, Number) -> Number,
) -> Result<Value, OpError> {
    match (lhs, rhs) {
        (Value::Number(_), Value::Number(b)) if b.is_zero() => Err(OpError::ZeroDivision),
        _ => arithmetic(lhs, rhs, f),
    }
}

fn compare(
    lhs: &Value,
    rhs: &Value,
    test: impl FnOnce(Ordering) -> bool,
) -> Result<Value, OpError> {
    let ordering = match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => return Err(OpError::InvalidTypes),
    };
    // NaN compares false against everything.
    Ok(Value::Bool(ordering.is_some_and(test)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::add(BinaryOp::Add, Value::from(1), Value::from(2), Ok(Value::from(3)))]
    #[case::concat(BinaryOp::Add, Value::from("n="), Value::from(2), Ok(Value::from("n=2")))]
    #[case::concat_rhs(BinaryOp::Add, Value::from(true), Value::from("!"), Ok(Value::from("True!")))]
    #[case::list_concat(
        BinaryOp::Add,
        Value::List(vec![Value::from(1)]),
        Value::List(vec![Value::from(2)]),
        Ok(Value::List(vec![Value::from(1), Value::from(2)]))
    )]
    #[case::add_invalid(BinaryOp::Add, Value::from(1), Value::Null, Err(OpError::InvalidTypes))]
    #[case::sub(BinaryOp::Sub, Value::from(1), Value::from(2.5), Ok(Value::from(-1.5)))]
    #[case::mul(BinaryOp::Mul, Value::from(4), Value::from(2.5), Ok(Value::from(10)))]
    #[case::div(BinaryOp::Div, Value::from(7), Value::from(2), Ok(Value::from(3.5)))]
    #[case::div_zero(BinaryOp::Div, Value::from(7), Value::from(0), Err(OpError::ZeroDivision))]
    #[case::mod_zero(BinaryOp::Mod, Value::from(7), Value::from(0), Err(OpError::ZeroDivision))]
    #[case::div_string(BinaryOp::Div, Value::from("a"), Value::from(0), Err(OpError::InvalidTypes))]
    #[case::modulo(BinaryOp::Mod, Value::from(7), Value::from(3), Ok(Value::from(1)))]
    #[case::eq_structural(
        BinaryOp::Eq,
        Value::List(vec![Value::from("a")]),
        Value::List(vec![Value::from("a")]),
        Ok(Value::from(true))
    )]
    #[case::eq_mixed(BinaryOp::Eq, Value::from(1), Value::from("1"), Ok(Value::from(false)))]
    #[case::ne(BinaryOp::Ne, Value::Null, Value::from(false), Ok(Value::from(true)))]
    #[case::lt(BinaryOp::Lt, Value::from(1), Value::from(2), Ok(Value::from(true)))]
    #[case::gte_strings(BinaryOp::Gte, Value::from("b"), Value::from("a"), Ok(Value::from(true)))]
    #[case::lt_nan(BinaryOp::Lt, Value::from(f64::NAN), Value::from(2), Ok(Value::from(false)))]
    #[case::lt_mixed(BinaryOp::Lt, Value::from(1), Value::from("2"), Err(OpError::InvalidTypes))]
    #[case::and(BinaryOp::And, Value::from(1), Value::from(""), Ok(Value::from(false)))]
    #[case::or(BinaryOp::Or, Value::Null, Value::from("x"), Ok(Value::from(true)))]
    fn test_binary(
        #[case] op: BinaryOp,
        #[case] lhs: Value,
        #[case] rhs: Value,
        #[case] expected: Result<Value, OpError>,
    ) {
        assert_eq!(binary(op, &lhs, &rhs), expected);
    }

    #[rstest]
    #[case::neg(UnaryOp::Neg, Value::from(2), Ok(Value::from(-2)))]
    #[case::neg_string(UnaryOp::Neg, Value::from("2"), Err(OpError::InvalidTypes))]
    #[case::not(UnaryOp::Not, Value::Null, Ok(Value::from(true)))]
    #[case::not_list(UnaryOp::Not, Value::List(vec![Value::Null]), Ok(Value::from(false)))]
    fn test_unary(
        #[case] op: UnaryOp,
        #[case] operand: Value,
        #[case] expected: Result<Value, OpError>,
    ) {
        assert_eq!(unary(op, &operand), expected);
    }
}
