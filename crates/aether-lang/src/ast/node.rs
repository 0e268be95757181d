use std::{
    fmt::{self, Display, Formatter},
    rc::Rc,
};

use serde::Serialize;
use smol_str::SmolStr;

use crate::{number::Number, range::Range};

use super::{IdentName, Params, Program};

pub type Args = Vec<Rc<Node>>;
/// One arm of an `If`: `None` as condition marks the `Else` arm.
pub type Cond = (Option<Rc<Node>>, Program);

/// Stable identity of a node within one compiled program.
#[derive(PartialEq, Eq, PartialOrd, Ord, Debug, Clone, Copy, Hash, Default, Serialize)]
#[serde(transparent)]
pub struct NodeId(pub u32);

impl Display for NodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(PartialEq, Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub range: Range,
    pub expr: Rc<Expr>,
}

impl Node {
    pub fn new(id: NodeId, range: Range, expr: Expr) -> Self {
        Self {
            id,
            range,
            expr: Rc::new(expr),
        }
    }

    /// Builds a node that takes over the identity and location of `self`.
    pub fn replace_with(&self, expr: Expr) -> Rc<Node> {
        Rc::new(Node {
            id: self.id,
            range: self.range,
            expr: Rc::new(expr),
        })
    }

    pub fn is_literal(&self) -> bool {
        matches!(&*self.expr, Expr::Literal(_))
    }

    pub fn literal(&self) -> Option<&Literal> {
        match &*self.expr {
            Expr::Literal(literal) => Some(literal),
            _ => None,
        }
    }

    /// Nodes after which nothing in the same block can run.
    pub fn is_terminator(&self) -> bool {
        matches!(
            &*self.expr,
            Expr::Return(_) | Expr::Break | Expr::Continue | Expr::TailCall(_, _)
        )
    }

    /// Direct children in evaluation order, function bodies included.
    pub fn children(&self) -> Vec<&Rc<Node>> {
        match &*self.expr {
            Expr::Literal(_) | Expr::Ident(_) | Expr::Break | Expr::Continue => Vec::new(),
            Expr::List(args)
            | Expr::Call(_, args)
            | Expr::Io(_, args)
            | Expr::TailCall(_, args)
            | Expr::Func(_, _, args)
            | Expr::Lambda(_, args)
            | Expr::Block(args) => args.iter().collect(),
            Expr::Map(entries) => entries.iter().map(|(_, value)| value).collect(),
            Expr::Index(lhs, rhs) | Expr::Binary(_, lhs, rhs) => vec![lhs, rhs],
            Expr::Unary(_, operand) | Expr::Set(_, operand) => vec![operand],
            Expr::If(conds) => conds
                .iter()
                .flat_map(|(cond, body)| cond.iter().chain(body.iter()))
                .collect(),
            Expr::While(cond, body) | Expr::For(_, cond, body) => {
                std::iter::once(cond).chain(body.iter()).collect()
            }
            Expr::Return(value) => value.iter().collect(),
        }
    }
}

#[derive(PartialEq, Debug, Eq, Clone, Hash, PartialOrd, Ord)]
pub struct Ident {
    pub name: IdentName,
}

impl Ident {
    pub fn new(name: &str) -> Self {
        Self {
            name: SmolStr::new(name),
        }
    }

    pub fn as_str(&self) -> &str {
        self.name.as_str()
    }
}

impl Display for Ident {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "{}", self.name)
    }
}

#[derive(PartialEq, Debug, Clone)]
pub enum Literal {
    String(String),
    Number(Number),
    Bool(bool),
    Null,
}

#[derive(PartialEq, Eq, Debug, Clone, Copy, Hash)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(PartialEq, Eq, Debug, Clone, Copy, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    And,
    Or,
}

impl Display for UnaryOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            UnaryOp::Neg => write!(f, "-"),
            UnaryOp::Not => write!(f, "!"),
        }
    }
}

impl Display for BinaryOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let op = match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Lte => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Gte => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        };
        write!(f, "{}", op)
    }
}

/// Built-in operations that reach outside the process.
#[derive(PartialEq, Eq, Debug, Clone, Copy, Hash)]
pub enum IoOp {
    Print,
    PrintLn,
    ReadFile,
    WriteFile,
    AppendFile,
    FileExists,
    DeleteFile,
}

impl IoOp {
    pub fn from_name(name: &str) -> Option<IoOp> {
        match name {
            "PRINT" => Some(IoOp::Print),
            "PRINTLN" => Some(IoOp::PrintLn),
            "READ_FILE" => Some(IoOp::ReadFile),
            "WRITE_FILE" => Some(IoOp::WriteFile),
            "APPEND_FILE" => Some(IoOp::AppendFile),
            "FILE_EXISTS" => Some(IoOp::FileExists),
            "DELETE_FILE" => Some(IoOp::DeleteFile),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            IoOp::Print => "PRINT",
            IoOp::PrintLn => "PRINTLN",
            IoOp::ReadFile => "READ_FILE",
            IoOp::WriteFile => "WRITE_FILE",
            IoOp::AppendFile => "APPEND_FILE",
            IoOp::FileExists => "FILE_EXISTS",
            IoOp::DeleteFile => "DELETE_FILE",
        }
    }
}

impl Display for IoOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(PartialEq, Debug, Clone)]
pub enum Expr {
    Literal(Literal),
    Ident(Ident),
    List(Args),
    Map(Vec<(SmolStr, Rc<Node>)>),
    Index(Rc<Node>, Rc<Node>),
    Unary(UnaryOp, Rc<Node>),
    Binary(BinaryOp, Rc<Node>, Rc<Node>),
    Set(Ident, Rc<Node>),
    Call(Ident, Args),
    Io(IoOp, Args),
    Func(Ident, Params, Program),
    Lambda(Params, Program),
    If(Vec<Cond>),
    While(Rc<Node>, Program),
    For(Ident, Rc<Node>, Program),
    Block(Program),
    Return(Option<Rc<Node>>),
    Break,
    Continue,
    /// A self call in tail position of the named function, produced by the
    /// tail-recursion rewrite.
    TailCall(Ident, Args),
}

impl From<Literal> for Expr {
    fn from(literal: Literal) -> Self {
        Expr::Literal(literal)
    }
}

impl Display for Literal {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Literal::String(s) => write!(f, "{:?}", s),
            Literal::Number(n) => write!(f, "{}", n),
            Literal::Bool(true) => write!(f, "True"),
            Literal::Bool(false) => write!(f, "False"),
            Literal::Null => write!(f, "Null"),
        }
    }
}

fn write_args(f: &mut Formatter<'_>, args: &[Rc<Node>]) -> fmt::Result {
    args.iter().try_for_each(|arg| write!(f, " {}", arg))
}

fn write_params(f: &mut Formatter<'_>, params: &Params) -> fmt::Result {
    write!(
        f,
        " ({})",
        params
            .iter()
            .map(|param| param.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    )
}

fn write_body(f: &mut Formatter<'_>, body: &Program) -> fmt::Result {
    match body.as_slice() {
        [single] => write!(f, " {}", single),
        _ => {
            write!(f, " (do")?;
            write_args(f, body)?;
            write!(f, ")")
        }
    }
}

/// Renders the node as an s-expression, mainly for tests and debugging.
impl Display for Node {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &*self.expr {
            Expr::Literal(literal) => write!(f, "{}", literal),
            Expr::Ident(ident) => write!(f, "{}", ident),
            Expr::List(items) => {
                write!(f, "(list")?;
                write_args(f, items)?;
                write!(f, ")")
            }
            Expr::Map(entries) => {
                write!(f, "(map")?;
                entries
                    .iter()
                    .try_for_each(|(key, value)| write!(f, " {}:{}", key, value))?;
                write!(f, ")")
            }
            Expr::Index(target, index) => write!(f, "(index {} {})", target, index),
            Expr::Unary(op, operand) => write!(f, "({} {})", op, operand),
            Expr::Binary(op, lhs, rhs) => write!(f, "({} {} {})", op, lhs, rhs),
            Expr::Set(ident, value) => write!(f, "(set {} {})", ident, value),
            Expr::Call(ident, args) => {
                write!(f, "(call {}", ident)?;
                write_args(f, args)?;
                write!(f, ")")
            }
            Expr::Io(op, args) => {
                write!(f, "(io {}", op)?;
                write_args(f, args)?;
                write!(f, ")")
            }
            Expr::Func(ident, params, body) => {
                write!(f, "(func {}", ident)?;
                write_params(f, params)?;
                write_body(f, body)?;
                write!(f, ")")
            }
            Expr::Lambda(params, body) => {
                write!(f, "(lambda")?;
                write_params(f, params)?;
                write_body(f, body)?;
                write!(f, ")")
            }
            Expr::If(conds) => {
                write!(f, "(if")?;
                for (cond, body) in conds {
                    match cond {
                        Some(cond) => write!(f, " {}", cond)?,
                        None => write!(f, " else")?,
                    }
                    write_body(f, body)?;
                }
                write!(f, ")")
            }
            Expr::While(cond, body) => {
                write!(f, "(while {}", cond)?;
                write_body(f, body)?;
                write!(f, ")")
            }
            Expr::For(ident, iterable, body) => {
                write!(f, "(for {} {}", ident, iterable)?;
                write_body(f, body)?;
                write!(f, ")")
            }
            Expr::Block(body) => {
                write!(f, "(do")?;
                write_args(f, body)?;
                write!(f, ")")
            }
            Expr::Return(None) => write!(f, "(return)"),
            Expr::Return(Some(value)) => write!(f, "(return {})", value),
            Expr::Break => write!(f, "break"),
            Expr::Continue => write!(f, "continue"),
            Expr::TailCall(ident, args) => {
                write!(f, "(tailcall {}", ident)?;
                write_args(f, args)?;
                write!(f, ")")
            }
        }
    }
}
