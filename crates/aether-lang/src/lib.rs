//! `aether-lang` is an embeddable interpreter for the Aether scripting language.
//!
//! A host creates an [`Engine`], optionally grants capabilities and sets
//! resource limits, then evaluates source text. Programs are parsed once,
//! optimized, and cached by fingerprint; evaluation runs against a global
//! scope that persists across calls.
//!
//! ## Examples
//!
//! ```rust
//! use aether_lang::{Engine, Limits, Value};
//!
//! let mut engine = Engine::default();
//! engine.set_limits(Limits::default().with_max_steps(10_000));
//!
//! engine.eval("Func SQ(X) { X * X }").unwrap();
//! assert_eq!(engine.eval("SQ(12)").unwrap(), Value::from(144));
//!
//! // I/O is denied unless the engine was created with the capability.
//! assert!(engine.eval(r#"PRINTLN("hi")"#).is_err());
//! let trace = engine.take_trace();
//! assert!(trace.last().unwrap().starts_with("[ERROR]"));
//! ```
mod ast;
mod cache;
mod engine;
mod error;
mod eval;
mod io;
mod lexer;
mod limits;
mod number;
mod optimizer;
mod permission;
mod range;
mod stack;
mod trace;
mod value;

use lexer::Lexer;

pub use ast::IdentName;
pub use ast::Program;
pub use ast::node::Node as AstNode;
pub use ast::parser::Parser as AstParser;
pub use cache::{AstCache, CacheOptions, CacheStats};
pub use engine::{Engine, Options};
pub use error::{Error, ErrorCode, InnerError};
pub use eval::env::{Env, EnvError};
pub use eval::error::EvalError;
pub use io::{Io, StdIo};
pub use lexer::token::{Token, TokenKind};
pub use limits::{DEFAULT_MAX_RECURSION_DEPTH, LimitKind, Limits, RunStats};
pub use number::Number;
pub use optimizer::{OptimizationFlags, Optimizer};
pub use permission::{Capability, Permissions};
pub use range::{Position, Range};
pub use trace::{TraceEntry, TraceKind, TraceLevel, TraceOptions, TraceStats};
pub use value::{SerializationError, Value};

pub type AetherResult = Result<Value, Error>;

#[allow(clippy::result_large_err)]
pub fn parse(code: &str) -> Result<Program, Error> {
    let tokens = tokenize(code)?;
    AstParser::new(&tokens)
        .parse()
        .map_err(|e| Error::from_error(code, InnerError::Parse(e)))
}

#[allow(clippy::result_large_err)]
pub fn tokenize(code: &str) -> Result<Vec<Token>, Error> {
    Lexer::new()
        .tokenize(code)
        .map_err(|e| Error::from_error(code, InnerError::Lexer(e)))
}
