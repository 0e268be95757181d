use std::rc::Rc;

use serde::Serialize;

use crate::{
    Program,
    ast::node::{Args, Expr, Node},
    stack,
};

pub mod constant_fold;
pub mod dead_code;
pub mod tail_call;

/// Which passes run. Part of the AST cache key, since the optimized program
/// depends on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct OptimizationFlags {
    pub constant_folding: bool,
    pub dead_code_elimination: bool,
    pub tail_recursion: bool,
}

impl Default for OptimizationFlags {
    fn default() -> Self {
        Self {
            constant_folding: true,
            dead_code_elimination: true,
            tail_recursion: true,
        }
    }
}

impl OptimizationFlags {
    pub fn none() -> Self {
        Self {
            constant_folding: false,
            dead_code_elimination: false,
            tail_recursion: false,
        }
    }

    /// Compact encoding used in cache fingerprints.
    pub fn bits(&self) -> u8 {
        (self.constant_folding as u8)
            | (self.dead_code_elimination as u8) << 1
            | (self.tail_recursion as u8) << 2
    }
}

/// An AST to AST rewrite.
///
/// Implementors override `node` and call [`walk_children`] to rebuild the
/// node from rewritten children.
pub trait Pass {
    fn node(&mut self, node: &Rc<Node>) -> Rc<Node>;

    fn program(&mut self, program: &Program) -> Program {
        program.iter().map(|node| self.node(node)).collect()
    }

    fn args(&mut self, args: &Args) -> Args {
        args.iter().map(|node| self.node(node)).collect()
    }
}

/// Rebuilds `node` with every child passed through `pass`. The result keeps
/// the id and range of `node`.
pub fn walk_children<P: Pass + ?Sized>(pass: &mut P, node: &Rc<Node>) -> Rc<Node> {
    stack::ensure_sufficient_stack(|| rebuild(pass, node))
}

fn rebuild<P: Pass + ?Sized>(pass: &mut P, node: &Rc<Node>) -> Rc<Node> {
    let expr = match &*node.expr {
        Expr::Literal(_) | Expr::Ident(_) | Expr::Break | Expr::Continue => {
            return Rc::clone(node);
        }
        Expr::List(items) => Expr::List(pass.args(items)),
        Expr::Map(entries) => Expr::Map(
            entries
                .iter()
                .map(|(key, value)| (key.clone(), pass.node(value)))
                .collect(),
        ),
        Expr::Index(target, index) => Expr::Index(pass.node(target), pass.node(index)),
        Expr::Unary(op, operand) => Expr::Unary(*op, pass.node(operand)),
        Expr::Binary(op, lhs, rhs) => Expr::Binary(*op, pass.node(lhs), pass.node(rhs)),
        Expr::Set(ident, value) => Expr::Set(ident.clone(), pass.node(value)),
        Expr::Call(ident, args) => Expr::Call(ident.clone(), pass.args(args)),
        Expr::Io(op, args) => Expr::Io(*op, pass.args(args)),
        Expr::Func(ident, params, body) => {
            Expr::Func(ident.clone(), params.clone(), pass.program(body))
        }
        Expr::Lambda(params, body) => Expr::Lambda(params.clone(), pass.program(body)),
        Expr::If(conds) => Expr::If(
            conds
                .iter()
                .map(|(cond, body)| {
                    let cond = cond.as_ref().map(|cond| pass.node(cond));
                    (cond, pass.program(body))
                })
                .collect(),
        ),
        Expr::While(cond, body) => Expr::While(pass.node(cond), pass.program(body)),
        Expr::For(ident, iterable, body) => {
            Expr::For(ident.clone(), pass.node(iterable), pass.program(body))
        }
        Expr::Block(body) => Expr::Block(pass.program(body)),
        Expr::Return(value) => Expr::Return(value.as_ref().map(|value| pass.node(value))),
        Expr::TailCall(ident, args) => Expr::TailCall(ident.clone(), pass.args(args)),
    };

    node.replace_with(expr)
}

/// Runs the enabled passes in a fixed order: constant folding, dead code
/// elimination, then the tail recursion rewrite.
#[derive(Debug, Default, Clone, Copy)]
pub struct Optimizer {
    flags: OptimizationFlags,
}

impl Optimizer {
    pub fn new(flags: OptimizationFlags) -> Self {
        Self { flags }
    }

    pub fn flags(&self) -> OptimizationFlags {
        self.flags
    }

    pub fn optimize(&self, program: &Program) -> Program {
        let mut program = program.clone();

        if self.flags.constant_folding {
            program = constant_fold::ConstantFolder.program(&program);
        }

        if self.flags.dead_code_elimination {
            program = dead_code::DeadCodeEliminator.program(&program);
        }

        if self.flags.tail_recursion {
            program = tail_call::TailCallRewriter.program(&program);
        }

        program
    }
}
