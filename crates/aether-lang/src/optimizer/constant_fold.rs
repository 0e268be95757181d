use std::rc::Rc;

use crate::{
    ast::node::{Expr, Literal, Node},
    eval::ops,
    value::Value,
};

use super::{Pass, walk_children};

/// Replaces unary and binary operations over literals with their result.
///
/// Folding goes through the same operator table as the evaluator, so a folded
/// program produces identical values. Operations that would fail at runtime
/// (division by zero, mismatched types) are left in place to fail there.
#[derive(Debug, Default)]
pub struct ConstantFolder;

impl Pass for ConstantFolder {
    fn node(&mut self, node: &Rc<Node>) -> Rc<Node> {
        let node = walk_children(self, node);

        let folded = match &*node.expr {
            Expr::Unary(op, operand) => operand
                .literal()
                .and_then(|operand| ops::unary(*op, &Value::from(operand)).ok()),
            Expr::Binary(op, lhs, rhs) => match (lhs.literal(), rhs.literal()) {
                (Some(lhs), Some(rhs)) => {
                    ops::binary(*op, &Value::from(lhs), &Value::from(rhs)).ok()
                }
                _ => None,
            },
            _ => None,
        };

        match folded.and_then(to_literal) {
            Some(literal) => node.replace_with(Expr::Literal(literal)),
            None => node,
        }
    }
}

fn to_literal(value: Value) -> Option<Literal> {
    match value {
        Value::Null => Some(Literal::Null),
        Value::Bool(b) => Some(Literal::Bool(b)),
        Value::Number(n) => Some(Literal::Number(n)),
        Value::String(s) => Some(Literal::String(s)),
        Value::List(_) | Value::Map(_) | Value::Function(_) => None,
    }
}
