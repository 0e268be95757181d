use std::rc::Rc;

use crate::{
    Program,
    ast::node::{Cond, Expr, Literal, Node},
    value::Value,
};

use super::{Pass, walk_children};

/// Removes code that can never run or whose value is never observed:
///
/// - `If` arms behind a literal condition are resolved at compile time.
/// - `While` loops with a falsy literal condition become `Null`.
/// - Statements after `Return`, `Break` or `Continue` in the same block.
/// - Literal statements that are not the last one in their block.
#[derive(Debug, Default)]
pub struct DeadCodeEliminator;

impl Pass for DeadCodeEliminator {
    fn node(&mut self, node: &Rc<Node>) -> Rc<Node> {
        let node = walk_children(self, node);

        match &*node.expr {
            Expr::If(conds) => prune_if(&node, conds),
            Expr::While(cond, _) if cond.literal().is_some_and(|literal| !is_truthy(literal)) => {
                node.replace_with(Expr::Literal(Literal::Null))
            }
            _ => node,
        }
    }

    fn program(&mut self, program: &Program) -> Program {
        let mut reachable = Vec::with_capacity(program.len());

        for node in program {
            let node = self.node(node);
            let terminator = node.is_terminator();
            reachable.push(node);
            if terminator {
                break;
            }
        }

        let last = reachable.len().saturating_sub(1);
        reachable
            .into_iter()
            .enumerate()
            .filter(|(i, node)| *i == last || !node.is_literal())
            .map(|(_, node)| node)
            .collect()
    }
}

fn is_truthy(literal: &Literal) -> bool {
    Value::from(literal).is_truthy()
}

fn prune_if(node: &Rc<Node>, conds: &[Cond]) -> Rc<Node> {
    let mut kept: Vec<Cond> = Vec::with_capacity(conds.len());

    for (cond, body) in conds {
        let always_taken = match cond {
            None => true,
            Some(cond) => match cond.literal() {
                Some(literal) if is_truthy(literal) => true,
                Some(_) => continue,
                None => false,
            },
        };

        if !always_taken {
            kept.push((cond.clone(), body.clone()));
            continue;
        }

        if kept.is_empty() {
            return node.replace_with(Expr::Block(body.clone()));
        }

        kept.push((None, body.clone()));
        break;
    }

    if kept.is_empty() {
        node.replace_with(Expr::Literal(Literal::Null))
    } else {
        node.replace_with(Expr::If(kept))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ast::parser::Parser, lexer::Lexer};
    use rstest::rstest;

    fn eliminate(code: &str) -> String {
        let tokens = Lexer::new().tokenize(code).unwrap();
        let program = Parser::new(&tokens).parse().unwrap();
        DeadCodeEliminator
            .program(&program)
            .iter()
            .map(|node| node.to_string())
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[rstest]
    #[case::if_true("If (True) { 1 } Else { 2 }", "(do 1)")]
    #[case::if_false_with_else("If (False) { 1 } Else { 2 }", "(do 2)")]
    #[case::if_false_without_else("If (False) { 1 }", "Null")]
    #[case::if_middle_arm_taken(
        "If (X) { 1 } Elif (1) { 2 } Elif (Y) { 3 }",
        "(if X 1 else 2)"
    )]
    #[case::if_false_arm_dropped(
        "If (X) { 1 } Elif (0) { 2 } Else { 3 }",
        "(if X 1 else 3)"
    )]
    #[case::if_dynamic_kept("If (X) { 1 }", "(if X 1)")]
    #[case::while_false("While (False) { X }", "Null")]
    #[case::while_dynamic_kept("While (X) { Break }", "(while X break)")]
    #[case::after_return(
        "Func F() { Return 1\nPRINTLN(\"never\") }",
        "(func F () (return 1))"
    )]
    #[case::after_break("While (X) { Break\nSet Y 1 }", "(while X break)")]
    #[case::literal_statements("1\n\"a\"\nSet X 1\n2", "(set X 1) 2")]
    #[case::last_literal_kept("X\n3", "X 3")]
    fn test_eliminate(#[case] code: &str, #[case] expected: &str) {
        assert_eq!(eliminate(code), expected);
    }
}
