use std::{collections::BTreeMap, path::Path, rc::Rc};

use itertools::Itertools;

use crate::{
    Program,
    ast::node::{self as ast, BinaryOp, Expr, IoOp, Node, NodeId},
    io::Io,
    limits::{LimitKind, LimitMonitor, Limits, RunStats},
    permission::{Capability, Permissions},
    stack,
    trace::{TraceEvent, TraceKind, TraceLevel, Tracer},
    value::{Closure, Value},
};

pub mod builtin;
pub mod env;
pub mod error;
pub mod ops;

use env::Env;
use error::EvalError;

/// Non-local exits threaded through evaluation as the error side of a
/// `Result`. Everything except `Error` is caught by the construct it
/// belongs to.
#[derive(Debug)]
pub enum Unwind {
    Error(EvalError),
    Return(Value),
    Break,
    Continue,
    /// Arguments for the next iteration of the running function.
    TailCall(Vec<Value>),
}

impl From<EvalError> for Unwind {
    fn from(err: EvalError) -> Self {
        Unwind::Error(err)
    }
}

type EvalResult = Result<Value, Unwind>;

/// Bound on nested node evaluations across all active calls, applied even
/// when the recursion depth limit is off.
pub const MAX_EVAL_NESTING: usize = 10_000;

/// Walks a program for a single `eval` call.
///
/// Every node evaluation is one step of the [`LimitMonitor`]; user function
/// calls also count against the recursion depth. Operands, arguments, list
/// items and map entries are evaluated left to right.
pub struct Evaluator<'a> {
    monitor: LimitMonitor,
    permissions: Permissions,
    tracer: &'a mut Tracer,
    io: &'a mut dyn Io,
    frames: Vec<Rc<Closure>>,
    current_node: Option<NodeId>,
    nesting: usize,
}

impl<'a> Evaluator<'a> {
    pub fn new(
        limits: Limits,
        permissions: Permissions,
        tracer: &'a mut Tracer,
        io: &'a mut dyn Io,
    ) -> Self {
        Self {
            monitor: LimitMonitor::new(limits),
            permissions,
            tracer,
            io,
            frames: Vec::new(),
            current_node: None,
            nesting: 0,
        }
    }

    /// Runs `program` in the innermost scope of `env`. The value of the
    /// program is the value of its last statement; a top level `Return`
    /// ends the program early with its value.
    pub fn eval(&mut self, program: &Program, env: &mut Env) -> Result<Value, EvalError> {
        let depth = env.depth();
        let result = self.eval_statements(program, env);

        while env.depth() > depth && env.pop_scope() {}

        match result {
            Ok(value) | Err(Unwind::Return(value)) => Ok(value),
            // The parser only accepts these inside loops and functions.
            Err(Unwind::Break | Unwind::Continue | Unwind::TailCall(_)) => Ok(Value::Null),
            Err(Unwind::Error(err)) => {
                let mut event = TraceEvent::new(TraceKind::Error, err.to_string());
                if let Some(node) = self.current_node {
                    event = event.with_node(node);
                }
                self.tracer.record(event);
                Err(err)
            }
        }
    }

    pub fn stats(&self) -> RunStats {
        self.monitor.stats()
    }

    fn eval_statements(&mut self, program: &Program, env: &mut Env) -> EvalResult {
        let mut value = Value::Null;
        for node in program {
            value = self.eval_node(node, env)?;
        }
        Ok(value)
    }

    fn eval_block(&mut self, program: &Program, env: &mut Env) -> EvalResult {
        env.push_scope();
        let result = self.eval_statements(program, env);
        env.pop_scope();
        result
    }

    #[inline(always)]
    fn limit_error(node: &Node, kind: LimitKind) -> Unwind {
        tracing::warn!(limit = %kind, node = %node.id, "evaluation aborted by limit");
        Unwind::Error(EvalError::LimitExceeded(node.range, kind))
    }

    fn step(&mut self, node: &Node) -> Result<(), Unwind> {
        self.current_node = Some(node.id);
        self.monitor
            .step()
            .map_err(|kind| Self::limit_error(node, kind))?;
        self.flush_warning(node);
        Ok(())
    }

    fn flush_warning(&mut self, node: &Node) {
        if let Some(warning) = self.monitor.take_warning() {
            self.tracer.record(
                TraceEvent::new(TraceKind::LimitWarning, warning.to_string())
                    .with_category(warning.kind.to_string().to_lowercase())
                    .with_node(node.id),
            );
        }
    }

    fn eval_node(&mut self, node: &Rc<Node>, env: &mut Env) -> EvalResult {
        if self.nesting >= MAX_EVAL_NESTING {
            return Err(Self::limit_error(node, LimitKind::Recursion));
        }

        self.nesting += 1;
        let result = stack::ensure_sufficient_stack(|| self.eval_expr(node, env));
        self.nesting -= 1;
        result
    }

    fn eval_expr(&mut self, node: &Rc<Node>, env: &mut Env) -> EvalResult {
        self.step(node)?;

        match &*node.expr {
            Expr::Literal(literal) => Ok(Value::from(literal)),
            Expr::Ident(ident) => env.get(ident.as_str()).map_err(|_| {
                EvalError::UndefinedVariable(node.range, ident.name.clone()).into()
            }),
            Expr::List(items) => Ok(Value::List(self.eval_args(items, env)?)),
            Expr::Map(entries) => self.eval_map(entries, env),
            Expr::Index(target, index) => {
                let target = self.eval_node(target, env)?;
                let index = self.eval_node(index, env)?;
                Self::eval_index(node, target, index)
            }
            Expr::Unary(op, operand) => {
                let operand = self.eval_node(operand, env)?;
                ops::unary(*op, &operand)
                    .map_err(|err| Self::op_error(node, &op.to_string(), err, &[&operand]))
            }
            Expr::Binary(op, lhs, rhs) => self.eval_binary(node, *op, lhs, rhs, env),
            Expr::Set(ident, value) => {
                let value = self.eval_node(value, env)?;
                env.assign(&ident.name, value);
                Ok(Value::Null)
            }
            Expr::Call(ident, args) => self.eval_call(node, ident, args, env),
            Expr::Io(op, args) => self.eval_io(node, *op, args, env),
            Expr::Func(ident, params, body) => {
                let closure = Closure {
                    name: Some(ident.name.clone()),
                    params: params.clone(),
                    body: body.clone(),
                    env: env.clone(),
                };
                env.define(ident.name.clone(), Value::Function(Rc::new(closure)));
                Ok(Value::Null)
            }
            Expr::Lambda(params, body) => Ok(Value::Function(Rc::new(Closure {
                name: None,
                params: params.clone(),
                body: body.clone(),
                env: env.clone(),
            }))),
            Expr::If(conds) => self.eval_if(conds, env),
            Expr::While(cond, body) => self.eval_while(cond, body, env),
            Expr::For(ident, iterable, body) => self.eval_for(node, ident, iterable, body, env),
            Expr::Block(body) => self.eval_block(body, env),
            Expr::Return(value) => {
                let value = match value {
                    Some(value) => self.eval_node(value, env)?,
                    None => Value::Null,
                };
                Err(Unwind::Return(value))
            }
            Expr::Break => Err(Unwind::Break),
            Expr::Continue => Err(Unwind::Continue),
            Expr::TailCall(ident, args) => self.eval_tail_call(node, ident, args, env),
        }
    }

    fn eval_args(&mut self, args: &ast::Args, env: &mut Env) -> Result<Vec<Value>, Unwind> {
        args.iter().map(|arg| self.eval_node(arg, env)).collect()
    }

    fn eval_map(
        &mut self,
        entries: &[(smol_str::SmolStr, Rc<Node>)],
        env: &mut Env,
    ) -> EvalResult {
        let mut map = BTreeMap::new();
        for (key, value) in entries {
            let value = self.eval_node(value, env)?;
            map.insert(key.to_string(), value);
        }
        Ok(Value::Map(map))
    }

    fn op_error(node: &Node, name: &str, err: ops::OpError, operands: &[&Value]) -> Unwind {
        match err {
            ops::OpError::ZeroDivision => EvalError::ZeroDivision(node.range).into(),
            ops::OpError::InvalidTypes => EvalError::InvalidTypes {
                range: node.range,
                name: name.to_string(),
                args: operands
                    .iter()
                    .map(|value| value.type_name().into())
                    .collect(),
            }
            .into(),
        }
    }

    fn eval_binary(
        &mut self,
        node: &Node,
        op: BinaryOp,
        lhs: &Rc<Node>,
        rhs: &Rc<Node>,
        env: &mut Env,
    ) -> EvalResult {
        let lhs = self.eval_node(lhs, env)?;

        match op {
            BinaryOp::And if !lhs.is_truthy() => Ok(Value::Bool(false)),
            BinaryOp::Or if lhs.is_truthy() => Ok(Value::Bool(true)),
            BinaryOp::And | BinaryOp::Or => Ok(Value::Bool(self.eval_node(rhs, env)?.is_truthy())),
            _ => {
                let rhs = self.eval_node(rhs, env)?;
                ops::binary(op, &lhs, &rhs)
                    .map_err(|err| Self::op_error(node, &op.to_string(), err, &[&lhs, &rhs]))
            }
        }
    }

    fn eval_index(node: &Node, target: Value, index: Value) -> EvalResult {
        match (&target, &index) {
            (Value::List(list), Value::Number(n)) => {
                if n.is_int() && n.value() >= 0.0 {
                    if let Some(value) = list.get(n.value() as usize) {
                        return Ok(value.clone());
                    }
                }
                Err(EvalError::IndexOutOfBounds(node.range, *n).into())
            }
            (Value::String(s), Value::Number(n)) => {
                if n.is_int() && n.value() >= 0.0 {
                    if let Some(c) = s.chars().nth(n.value() as usize) {
                        return Ok(Value::String(c.to_string()));
                    }
                }
                Err(EvalError::IndexOutOfBounds(node.range, *n).into())
            }
            (Value::Map(map), Value::String(key)) => Ok(map.get(key).cloned().unwrap_or_default()),
            _ => Err(Self::op_error(
                node,
                "[]",
                ops::OpError::InvalidTypes,
                &[&target, &index],
            )),
        }
    }

    fn eval_if(&mut self, conds: &[ast::Cond], env: &mut Env) -> EvalResult {
        for (cond, body) in conds {
            let taken = match cond {
                Some(cond) => self.eval_node(cond, env)?.is_truthy(),
                None => true,
            };
            if taken {
                return self.eval_block(body, env);
            }
        }
        Ok(Value::Null)
    }

    fn eval_while(&mut self, cond: &Rc<Node>, body: &Program, env: &mut Env) -> EvalResult {
        while self.eval_node(cond, env)?.is_truthy() {
            match self.eval_block(body, env) {
                Ok(_) | Err(Unwind::Continue) => {}
                Err(Unwind::Break) => break,
                Err(unwind) => return Err(unwind),
            }
        }
        Ok(Value::Null)
    }

    fn eval_for(
        &mut self,
        node: &Node,
        ident: &ast::Ident,
        iterable: &Rc<Node>,
        body: &Program,
        env: &mut Env,
    ) -> EvalResult {
        let items = match self.eval_node(iterable, env)? {
            Value::List(list) => list,
            Value::Map(map) => map.into_keys().map(Value::String).collect(),
            Value::String(s) => s.chars().map(|c| Value::String(c.to_string())).collect(),
            other => {
                return Err(Self::op_error(
                    node,
                    "For",
                    ops::OpError::InvalidTypes,
                    &[&other],
                ));
            }
        };

        for item in items {
            env.push_scope();
            env.define(ident.name.clone(), item);
            let result = self.eval_statements(body, env);
            env.pop_scope();

            match result {
                Ok(_) | Err(Unwind::Continue) => {}
                Err(Unwind::Break) => break,
                Err(unwind) => return Err(unwind),
            }
        }

        Ok(Value::Null)
    }

    /// Name resolution for calls: bindings in scope win over built-ins.
    fn eval_call(
        &mut self,
        node: &Node,
        ident: &ast::Ident,
        args: &ast::Args,
        env: &mut Env,
    ) -> EvalResult {
        let name = ident.as_str();

        match env.get(name) {
            Ok(Value::Function(closure)) => {
                let args = self.eval_args(args, env)?;
                self.call_closure(node, &closure, args)
            }
            Ok(_) => Err(EvalError::NotCallable(node.range, name.to_string()).into()),
            Err(_) => {
                if let Some(level) = builtin::trace_level(name) {
                    let args = self.eval_args(args, env)?;
                    self.eval_trace(node, level, &args);
                    Ok(Value::Null)
                } else if builtin::is_builtin(name) {
                    let args = self.eval_args(args, env)?;
                    match builtin::eval_builtin(name, &args) {
                        Some(result) => result.map_err(|err| err.to_eval_error(node.range).into()),
                        None => Err(EvalError::UndefinedVariable(node.range, ident.name.clone()).into()),
                    }
                } else {
                    Err(EvalError::UndefinedVariable(node.range, ident.name.clone()).into())
                }
            }
        }
    }

    fn eval_trace(&mut self, node: &Node, level: TraceLevel, args: &[Value]) {
        let (category, message) = builtin::trace_message(args);
        let values = args
            .iter()
            .skip(if args.len() > 1 { 1 } else { 0 })
            .map(Value::to_json_lossy)
            .collect();

        self.tracer.record(
            TraceEvent::new(TraceKind::User, message)
                .with_level(level)
                .with_category(category)
                .with_node(node.id)
                .with_values(values),
        );
    }

    /// A self call in tail position. When the name still resolves to the
    /// running function the frame is reused; otherwise it behaves exactly
    /// like `Return NAME(args)`.
    fn eval_tail_call(
        &mut self,
        node: &Node,
        ident: &ast::Ident,
        args: &ast::Args,
        env: &mut Env,
    ) -> EvalResult {
        if let Ok(Value::Function(closure)) = env.get(ident.as_str()) {
            if self
                .frames
                .last()
                .is_some_and(|running| Rc::ptr_eq(running, &closure))
            {
                let args = self.eval_args(args, env)?;
                if args.len() != closure.params.len() {
                    return Err(EvalError::InvalidNumberOfArguments(
                        node.range,
                        closure.display_name().to_string(),
                        closure.params.len(),
                        args.len(),
                    )
                    .into());
                }
                return Err(Unwind::TailCall(args));
            }
        }

        let value = self.eval_call(node, ident, args, env)?;
        Err(Unwind::Return(value))
    }

    fn call_closure(&mut self, node: &Node, closure: &Rc<Closure>, args: Vec<Value>) -> EvalResult {
        let name = closure.display_name();

        if args.len() != closure.params.len() {
            return Err(EvalError::InvalidNumberOfArguments(
                node.range,
                name.to_string(),
                closure.params.len(),
                args.len(),
            )
            .into());
        }

        self.monitor
            .enter_call()
            .map_err(|kind| Self::limit_error(node, kind))?;
        self.flush_warning(node);

        self.tracer.record(
            TraceEvent::new(
                TraceKind::EnterCall,
                format!("{}({})", name, args.iter().join(", ")),
            )
            .with_category(name)
            .with_node(node.id),
        );

        self.frames.push(Rc::clone(closure));
        let result = self.run_closure(closure, args);
        self.frames.pop();
        self.monitor.exit_call();

        let message = match &result {
            Ok(value) => format!("{} returned {}", name, value),
            Err(_) => format!("{} unwound", name),
        };
        self.tracer.record(
            TraceEvent::new(TraceKind::ExitCall, message)
                .with_category(name)
                .with_node(node.id),
        );

        result
    }

    fn run_closure(&mut self, closure: &Closure, mut args: Vec<Value>) -> EvalResult {
        loop {
            let mut env = closure.env.child();
            for (param, arg) in closure.params.iter().zip(args) {
                env.define(param.name.clone(), arg);
            }

            let result = self.eval_statements(&closure.body, &mut env);
            env.pop_scope();

            match result {
                Ok(value) | Err(Unwind::Return(value)) => return Ok(value),
                Err(Unwind::TailCall(next)) => args = next,
                Err(Unwind::Break | Unwind::Continue) => return Ok(Value::Null),
                Err(unwind @ Unwind::Error(_)) => return Err(unwind),
            }
        }
    }

    fn eval_io(&mut self, node: &Node, op: IoOp, args: &ast::Args, env: &mut Env) -> EvalResult {
        let name = op.name();

        if let Err(denied) = self.permissions.check(Capability::Io) {
            tracing::warn!(operation = name, node = %node.id, "I/O denied");
            self.tracer.record(
                TraceEvent::new(TraceKind::IoAttempt, format!("{} denied", name))
                    .with_level(TraceLevel::Warn)
                    .with_node(node.id),
            );
            return Err(EvalError::permission_denied(node.range, name, denied).into());
        }

        self.tracer.record(
            TraceEvent::new(TraceKind::IoAttempt, format!("{} allowed", name)).with_node(node.id),
        );

        let args = self.eval_args(args, env)?;
        self.perform_io(node, op, &args)
    }

    fn perform_io(&mut self, node: &Node, op: IoOp, args: &[Value]) -> EvalResult {
        let name = op.name();
        let io_error = |err: std::io::Error| -> Unwind {
            EvalError::IoError(node.range, name.to_string(), err.to_string()).into()
        };
        let invalid_types = || -> Unwind {
            EvalError::InvalidTypes {
                range: node.range,
                name: name.to_string(),
                args: args.iter().map(|value| value.type_name().into()).collect(),
            }
            .into()
        };

        match (op, args) {
            (IoOp::Print, args) => {
                self.io.print(&args.iter().join("")).map_err(io_error)?;
                Ok(Value::Null)
            }
            (IoOp::PrintLn, args) => {
                self.io
                    .print(&format!("{}\n", args.iter().join("")))
                    .map_err(io_error)?;
                Ok(Value::Null)
            }
            (IoOp::ReadFile, [Value::String(path)]) => self
                .io
                .read_file(Path::new(path))
                .map(Value::String)
                .map_err(io_error),
            (IoOp::WriteFile, [Value::String(path), contents]) => {
                self.io
                    .write_file(Path::new(path), &contents.to_string())
                    .map_err(io_error)?;
                Ok(Value::Null)
            }
            (IoOp::AppendFile, [Value::String(path), contents]) => {
                self.io
                    .append_file(Path::new(path), &contents.to_string())
                    .map_err(io_error)?;
                Ok(Value::Null)
            }
            (IoOp::FileExists, [Value::String(path)]) => self
                .io
                .file_exists(Path::new(path))
                .map(Value::Bool)
                .map_err(io_error),
            (IoOp::DeleteFile, [Value::String(path)]) => {
                self.io.delete_file(Path::new(path)).map_err(io_error)?;
                Ok(Value::Null)
            }
            (IoOp::ReadFile | IoOp::FileExists | IoOp::DeleteFile, [_])
            | (IoOp::WriteFile | IoOp::AppendFile, [_, _]) => Err(invalid_types()),
            (IoOp::ReadFile | IoOp::FileExists | IoOp::DeleteFile, _) => Err(
                EvalError::InvalidNumberOfArguments(node.range, name.to_string(), 1, args.len())
                    .into(),
            ),
            (IoOp::WriteFile | IoOp::AppendFile, _) => Err(EvalError::InvalidNumberOfArguments(
                node.range,
                name.to_string(),
                2,
                args.len(),
            )
            .into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, io, path::Path};

    use super::*;
    use crate::{
        ast::parser::Parser, io::StdIo, lexer::Lexer, number::Number, range::Range,
    };
    use rstest::rstest;

    #[derive(Default)]
    struct CaptureIo {
        out: Rc<RefCell<String>>,
    }

    impl Io for CaptureIo {
        fn print(&mut self, text: &str) -> io::Result<()> {
            self.out.borrow_mut().push_str(text);
            Ok(())
        }

        fn read_file(&mut self, path: &Path) -> io::Result<String> {
            StdIo.read_file(path)
        }

        fn write_file(&mut self, path: &Path, contents: &str) -> io::Result<()> {
            StdIo.write_file(path, contents)
        }

        fn append_file(&mut self, path: &Path, contents: &str) -> io::Result<()> {
            StdIo.append_file(path, contents)
        }

        fn file_exists(&mut self, path: &Path) -> io::Result<bool> {
            StdIo.file_exists(path)
        }

        fn delete_file(&mut self, path: &Path) -> io::Result<()> {
            StdIo.delete_file(path)
        }
    }

    fn parse(code: &str) -> Program {
        let tokens = Lexer::new().tokenize(code).unwrap();
        Parser::new(&tokens).parse().unwrap()
    }

    fn run_with(
        code: &str,
        limits: Limits,
        permissions: Permissions,
        tracer: &mut Tracer,
    ) -> (Result<Value, EvalError>, RunStats) {
        let program = parse(code);
        let mut io = CaptureIo::default();
        let mut env = Env::new();
        let mut evaluator = Evaluator::new(limits, permissions, tracer, &mut io);
        let result = evaluator.eval(&program, &mut env);
        (result, evaluator.stats())
    }

    fn run(code: &str) -> Result<Value, EvalError> {
        run_with(
            code,
            Limits::default().with_max_recursion_depth(50),
            Permissions::restricted(),
            &mut Tracer::default(),
        )
        .0
    }

    #[rstest]
    #[case::arithmetic("Set X 10\nSet Y 20\n(X + Y)", Value::from(30))]
    #[case::precedence("2 + 3 * 4 - 1", Value::from(13))]
    #[case::string_concat("\"n=\" + 3", Value::from("n=3"))]
    #[case::comparison("(10 + 20) >= 30", Value::from(true))]
    #[case::short_circuit_and("False && UNDEFINED", Value::from(false))]
    #[case::short_circuit_or("1 || UNDEFINED", Value::from(true))]
    #[case::not("!Null", Value::from(true))]
    #[case::func("Func ADD (A, B) {\n  Return (A + B)\n}\nADD(15, 15)", Value::from(30))]
    #[case::implicit_return("Func SQ(X) { X * X }\nSQ(7)", Value::from(49))]
    #[case::recursion(
        "Func FACT(N) {\n  If (N <= 1) { Return 1 }\n  Return N * FACT(N - 1)\n}\nFACT(10)",
        Value::from(3628800)
    )]
    #[case::closure(
        "Func MAKE(N) { Lambda(X) { X + N } }\nSet ADD5 MAKE(5)\nADD5(10)",
        Value::from(15)
    )]
    #[case::if_elif_else(
        "Set X 5\nIf (X > 10) { \"big\" } Elif (X > 3) { \"mid\" } Else { \"small\" }",
        Value::from("mid")
    )]
    #[case::if_not_taken("If (False) { 1 }", Value::Null)]
    #[case::while_loop("Set I 0\nWhile (I < 5) { Set I (I + 1) }\nI", Value::from(5))]
    #[case::while_break(
        "Set I 0\nWhile (True) {\n  Set I (I + 1)\n  If (I == 3) { Break }\n}\nI",
        Value::from(3)
    )]
    #[case::for_continue(
        "Set SUM 0\nFor N In [1, 2, 3, 4] {\n  If (N % 2 == 0) { Continue }\n  Set SUM (SUM + N)\n}\nSUM",
        Value::from(4)
    )]
    #[case::for_map_keys(
        "Set OUT \"\"\nFor K In {b: 1, a: 2} { Set OUT (OUT + K) }\nOUT",
        Value::from("ab")
    )]
    #[case::for_accumulate(
        "Set USERS [\"alice\", \"bob\"]\nSet RESULT []\nFor USER In USERS { Set RESULT PUSH(RESULT, USER) }\nLENGTH(RESULT)",
        Value::from(2)
    )]
    #[case::index(
        "Set CONFIG {\"users\": [\"alice\", \"bob\"]}\nCONFIG[\"users\"][1]",
        Value::from("bob")
    )]
    #[case::missing_key("{a: 1}[\"b\"]", Value::Null)]
    #[case::string_index("\"abc\"[2]", Value::from("c"))]
    #[case::block_scope(
        "Set X 1\nIf (True) { Set Y 2\nSet X (X + Y) }\nX",
        Value::from(3)
    )]
    #[case::top_level_return("Return 1\n2", Value::from(1))]
    #[case::builtins("JOIN(SPLIT(UPPER(\"a,b\"), \",\"), \"-\")", Value::from("A-B"))]
    #[case::shadow_builtin("Func LENGTH(X) { 42 }\nLENGTH([])", Value::from(42))]
    #[case::trace_returns_null("TRACE(\"test\", \"Hello\")", Value::Null)]
    #[case::empty("", Value::Null)]
    fn test_eval(#[case] code: &str, #[case] expected: Value) {
        assert_eq!(run(code), Ok(expected));
    }

    #[rstest]
    #[case::undefined("X + 1", EvalError::UndefinedVariable(Range::default(), "X".into()))]
    #[case::zero_division("1 / 0", EvalError::ZeroDivision(Range::default()))]
    #[case::invalid_types(
        "1 - \"a\"",
        EvalError::InvalidTypes {
            range: Range::default(),
            name: "-".to_string(),
            args: vec!["number".into(), "string".into()],
        }
    )]
    #[case::arity(
        "Func F(A) { A }\nF(1, 2)",
        EvalError::InvalidNumberOfArguments(Range::default(), "F".to_string(), 1, 2)
    )]
    #[case::not_callable("Set X 1\nX()", EvalError::NotCallable(Range::default(), "X".to_string()))]
    #[case::out_of_bounds("[1][3]", EvalError::IndexOutOfBounds(Range::default(), Number::from(3)))]
    #[case::unknown_function("NOPE(1)", EvalError::UndefinedVariable(Range::default(), "NOPE".into()))]
    #[case::function_scope("Func F() { Set LOCAL 1 }\nF()\nLOCAL", EvalError::UndefinedVariable(Range::default(), "LOCAL".into()))]
    fn test_eval_error(#[case] code: &str, #[case] expected: EvalError) {
        let err = run(code).unwrap_err();
        // Ranges are checked separately; compare with the location erased.
        let erased = match err {
            EvalError::UndefinedVariable(_, name) => EvalError::UndefinedVariable(Range::default(), name),
            EvalError::ZeroDivision(_) => EvalError::ZeroDivision(Range::default()),
            EvalError::InvalidTypes { name, args, .. } => EvalError::InvalidTypes {
                range: Range::default(),
                name,
                args,
            },
            EvalError::InvalidNumberOfArguments(_, name, expected, got) => {
                EvalError::InvalidNumberOfArguments(Range::default(), name, expected, got)
            }
            EvalError::NotCallable(_, name) => EvalError::NotCallable(Range::default(), name),
            EvalError::IndexOutOfBounds(_, n) => EvalError::IndexOutOfBounds(Range::default(), n),
            other => other,
        };
        assert_eq!(erased, expected);
    }

    #[test]
    fn test_error_range_points_at_node() {
        let err = run("Set X 1\nSet Y (X / 0)").unwrap_err();
        assert_eq!(err.range().start.line, 2);
        assert_eq!(err.range().start.column, 8);
    }

    #[test]
    fn test_step_limit() {
        let mut tracer = Tracer::default();
        let (result, stats) = run_with(
            "While (True) { 1 }",
            Limits::unlimited().with_max_steps(100),
            Permissions::restricted(),
            &mut tracer,
        );
        assert!(matches!(
            result,
            Err(EvalError::LimitExceeded(_, LimitKind::Steps))
        ));
        assert_eq!(stats.steps, 100);
        let stats = tracer.stats();
        assert_eq!(stats.by_kind.get(&TraceKind::LimitWarning), Some(&1));
        assert_eq!(stats.by_kind.get(&TraceKind::Error), Some(&1));
    }

    #[test]
    fn test_recursion_limit() {
        let (result, stats) = run_with(
            "Func LOOP(N) { LOOP(N + 1) + 0 }\nLOOP(0)",
            Limits::unlimited().with_max_recursion_depth(10),
            Permissions::restricted(),
            &mut Tracer::default(),
        );
        assert!(matches!(
            result,
            Err(EvalError::LimitExceeded(_, LimitKind::Recursion))
        ));
        assert_eq!(stats.max_depth, 10);
    }

    #[test]
    fn test_nesting_bound_without_depth_limit() {
        let (result, stats) = run_with(
            "Func DOWN(N) { 1 + DOWN(N - 1) }\nDOWN(0)",
            Limits::unlimited(),
            Permissions::restricted(),
            &mut Tracer::default(),
        );
        assert!(matches!(
            result,
            Err(EvalError::LimitExceeded(_, LimitKind::Recursion))
        ));
        assert!((stats.max_depth as usize) < MAX_EVAL_NESTING);
    }

    #[test]
    fn test_non_tail_recursion_up_to_default_depth() {
        let (result, stats) = run_with(
            "Func D(N) { If (N == 0) { 0 } Else { 1 + D(N - 1) } }\nD(199)",
            Limits::default(),
            Permissions::restricted(),
            &mut Tracer::default(),
        );
        assert_eq!(result, Ok(Value::from(199)));
        assert_eq!(stats.max_depth, 200);
    }

    #[test]
    fn test_tail_call_runs_in_constant_depth() {
        let program = parse("Func COUNT(N, ACC) { If (N == 0) { Return ACC }\n Return COUNT(N - 1, ACC + 1) }\nCOUNT(500, 0)");
        let program = crate::optimizer::Optimizer::default().optimize(&program);
        let mut tracer = Tracer::default();
        let mut io = CaptureIo::default();
        let mut env = Env::new();
        let mut evaluator = Evaluator::new(
            Limits::unlimited().with_max_recursion_depth(5),
            Permissions::restricted(),
            &mut tracer,
            &mut io,
        );
        assert_eq!(evaluator.eval(&program, &mut env), Ok(Value::from(500)));
        assert_eq!(evaluator.stats().max_depth, 1);
    }

    #[test]
    fn test_tail_call_follows_rebinding() {
        let program = parse(
            "Func F(N) { If (N > 0) { Return F(N - 1) }\n Return \"old\" }\nSet G F\nFunc F(N) { \"new\" }\nG(3)",
        );
        let program = crate::optimizer::Optimizer::default().optimize(&program);
        let mut tracer = Tracer::default();
        let mut io = CaptureIo::default();
        let mut env = Env::new();
        let mut evaluator =
            Evaluator::new(Limits::default(), Permissions::restricted(), &mut tracer, &mut io);
        assert_eq!(evaluator.eval(&program, &mut env), Ok(Value::from("new")));
    }

    #[test]
    fn test_call_trace() {
        let mut tracer = Tracer::default();
        let (result, _) = run_with(
            "Func ADD(A, B) { A + B }\nADD(1, 2)",
            Limits::default(),
            Permissions::restricted(),
            &mut tracer,
        );
        assert_eq!(result, Ok(Value::from(3)));
        let messages: Vec<_> = tracer
            .entries()
            .map(|entry| (entry.kind, entry.message.clone()))
            .collect();
        assert_eq!(
            messages,
            vec![
                (TraceKind::EnterCall, "ADD(1, 2)".to_string()),
                (TraceKind::ExitCall, "ADD returned 3".to_string()),
            ]
        );
    }

    #[test]
    fn test_user_trace() {
        let mut tracer = Tracer::default();
        run_with(
            "TRACE_WARN(\"calc\", \"x=\", 30)",
            Limits::default(),
            Permissions::restricted(),
            &mut tracer,
        )
        .0
        .unwrap();
        let entry = tracer.entries().next().unwrap();
        assert_eq!(entry.kind, TraceKind::User);
        assert_eq!(entry.level, TraceLevel::Warn);
        assert_eq!(entry.raw_line(), "[WARN] calc: x=30");
        assert_eq!(entry.values, vec![serde_json::json!("x="), serde_json::json!(30)]);
    }

    #[test]
    fn test_io_denied() {
        let mut tracer = Tracer::default();
        let (result, _) = run_with(
            "Set X 1\nPRINTLN(UNDEFINED)",
            Limits::default(),
            Permissions::restricted(),
            &mut tracer,
        );
        assert!(matches!(
            result,
            Err(EvalError::PermissionDenied(_, ref name, Capability::Io)) if name == "PRINTLN"
        ));
        let stats = tracer.stats();
        assert_eq!(stats.by_kind.get(&TraceKind::IoAttempt), Some(&1));
    }

    #[test]
    fn test_io_allowed() {
        let mut tracer = Tracer::default();
        let program = parse("PRINT(\"a\", 1)\nPRINTLN(\"b\")");
        let mut io = CaptureIo::default();
        let out = Rc::clone(&io.out);
        let mut env = Env::new();
        let mut evaluator =
            Evaluator::new(Limits::default(), Permissions::all(), &mut tracer, &mut io);
        assert_eq!(evaluator.eval(&program, &mut env), Ok(Value::Null));
        assert_eq!(out.borrow().as_str(), "a1b\n");
        assert_eq!(tracer.stats().by_kind.get(&TraceKind::IoAttempt), Some(&2));
    }

    #[test]
    fn test_file_builtins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.txt");
        let code = format!(
            "Set P {:?}\nWRITE_FILE(P, \"a\")\nAPPEND_FILE(P, 1)\nSet C READ_FILE(P)\nDELETE_FILE(P)\n[C, FILE_EXISTS(P)]",
            path.to_string_lossy()
        );
        let (result, _) = run_with(
            &code,
            Limits::default(),
            Permissions::all(),
            &mut Tracer::default(),
        );
        assert_eq!(
            result,
            Ok(Value::List(vec![Value::from("a1"), Value::from(false)]))
        );
    }

    #[test]
    fn test_read_missing_file_is_runtime_error() {
        let (result, _) = run_with(
            "READ_FILE(\"/definitely/not/here.txt\")",
            Limits::default(),
            Permissions::all(),
            &mut Tracer::default(),
        );
        assert!(matches!(result, Err(EvalError::IoError(_, _, _))));
    }

    #[test]
    fn test_scopes_restored_after_error() {
        let program = parse("Func F() { If (True) { 1 / 0 } }\nF()");
        let mut tracer = Tracer::default();
        let mut io = CaptureIo::default();
        let mut env = Env::new();
        let mut evaluator =
            Evaluator::new(Limits::default(), Permissions::restricted(), &mut tracer, &mut io);
        assert!(evaluator.eval(&program, &mut env).is_err());
        assert_eq!(env.depth(), 1);
        assert!(env.get_global("F").is_some());
    }
}
