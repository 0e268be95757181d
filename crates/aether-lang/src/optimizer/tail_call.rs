use std::rc::Rc;

use crate::{
    Program,
    ast::{
        Params,
        node::{Args, Expr, Ident, Node},
    },
};

use super::{Pass, walk_children};

/// Rewrites self calls in tail position of a named function into
/// `TailCall` nodes, which the evaluator runs in the same frame.
///
/// A call is in tail position when it is the operand of `Return` anywhere in
/// the function body, or the final expression of the body (looking through
/// `If` arms and blocks in final position). Nested functions and lambdas are
/// rewritten on their own terms, never on behalf of the enclosing function.
///
/// Functions whose body may rebind their own name are left untouched.
#[derive(Debug, Default)]
pub struct TailCallRewriter;

impl Pass for TailCallRewriter {
    fn node(&mut self, node: &Rc<Node>) -> Rc<Node> {
        let node = walk_children(self, node);

        match &*node.expr {
            Expr::Func(ident, params, body) if !rebinds(ident, params, body) => {
                let body = rewrite_tail_position(ident, &rewrite_returns(ident, body));
                node.replace_with(Expr::Func(ident.clone(), params.clone(), body))
            }
            _ => node,
        }
    }
}

fn rebinds(name: &Ident, params: &Params, body: &Program) -> bool {
    params.contains(name) || body.iter().any(|node| binds(name, node))
}

fn binds(name: &Ident, node: &Node) -> bool {
    let bound = match &*node.expr {
        Expr::Set(ident, _) | Expr::Func(ident, _, _) | Expr::For(ident, _, _) => ident == name,
        _ => false,
    };

    bound || node.children().into_iter().any(|child| binds(name, child))
}

fn self_call<'a>(name: &Ident, node: &'a Node) -> Option<&'a Args> {
    match &*node.expr {
        Expr::Call(ident, args) if ident == name => Some(args),
        _ => None,
    }
}

fn rewrite_returns(name: &Ident, program: &Program) -> Program {
    program.iter().map(|node| rewrite_return(name, node)).collect()
}

fn rewrite_return(name: &Ident, node: &Rc<Node>) -> Rc<Node> {
    let expr = match &*node.expr {
        Expr::Return(Some(value)) => match self_call(name, value) {
            Some(args) => Expr::TailCall(name.clone(), args.clone()),
            None => return Rc::clone(node),
        },
        Expr::If(conds) => Expr::If(
            conds
                .iter()
                .map(|(cond, body)| (cond.clone(), rewrite_returns(name, body)))
                .collect(),
        ),
        Expr::While(cond, body) => Expr::While(Rc::clone(cond), rewrite_returns(name, body)),
        Expr::For(ident, iterable, body) => Expr::For(
            ident.clone(),
            Rc::clone(iterable),
            rewrite_returns(name, body),
        ),
        Expr::Block(body) => Expr::Block(rewrite_returns(name, body)),
        _ => return Rc::clone(node),
    };

    node.replace_with(expr)
}

fn rewrite_tail_position(name: &Ident, program: &Program) -> Program {
    let mut program = program.clone();
    if let Some(last) = program.last_mut() {
        *last = rewrite_tail(name, last);
    }
    program
}

fn rewrite_tail(name: &Ident, node: &Rc<Node>) -> Rc<Node> {
    if let Some(args) = self_call(name, node) {
        return node.replace_with(Expr::TailCall(name.clone(), args.clone()));
    }

    match &*node.expr {
        Expr::If(conds) => node.replace_with(Expr::If(
            conds
                .iter()
                .map(|(cond, body)| (cond.clone(), rewrite_tail_position(name, body)))
                .collect(),
        )),
        Expr::Block(body) => node.replace_with(Expr::Block(rewrite_tail_position(name, body))),
        _ => Rc::clone(node),
    }
}
