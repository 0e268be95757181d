use miette::{Diagnostic, SourceOffset, SourceSpan};
use serde::Serialize;

use crate::{
    ast::error::ParseError,
    eval::{env::EnvError, error::EvalError},
    lexer::error::LexerError,
    range::{Position, Range},
    value::SerializationError,
};

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum InnerError {
    #[error(transparent)]
    Lexer(#[from] LexerError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Eval(#[from] EvalError),
    #[error(transparent)]
    Env(#[from] EnvError),
    #[error(transparent)]
    Serialization(#[from] SerializationError),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Stable integer taxonomy shared with the C boundary.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Success = 0,
    ParseError = 1,
    RuntimeError = 2,
    PermissionDenied = 3,
    LimitExceeded = 4,
    SerializationError = 5,
    VariableNotFound = 6,
    InvalidArgument = 7,
}

impl ErrorCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

impl InnerError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            InnerError::Lexer(_) | InnerError::Parse(_) => ErrorCode::ParseError,
            InnerError::Eval(EvalError::PermissionDenied(..)) => ErrorCode::PermissionDenied,
            InnerError::Eval(EvalError::LimitExceeded(..)) => ErrorCode::LimitExceeded,
            InnerError::Eval(_) => ErrorCode::RuntimeError,
            InnerError::Env(EnvError::UndefinedVariable(_)) => ErrorCode::VariableNotFound,
            InnerError::Serialization(_) => ErrorCode::SerializationError,
            InnerError::InvalidArgument(_) => ErrorCode::InvalidArgument,
        }
    }

    fn range(&self) -> Option<Range> {
        match self {
            InnerError::Lexer(err) => {
                let position = err.position();
                Some(Range::new(position, position))
            }
            InnerError::Parse(err) => Some(err.range()),
            InnerError::Eval(err) => Some(err.range()),
            InnerError::Env(_) | InnerError::Serialization(_) | InnerError::InvalidArgument(_) => {
                None
            }
        }
    }
}

/// Represents a high-level error with diagnostic information for the user.
#[derive(PartialEq, Debug, thiserror::Error)]
#[error("{cause}")]
pub struct Error {
    /// The underlying cause of the error.
    pub cause: InnerError,
    /// The source code related to the error.
    pub source_code: String,
    /// The location in the source code for diagnostics.
    pub location: SourceSpan,
}

impl Error {
    pub fn from_error(source_code: impl Into<String>, cause: impl Into<InnerError>) -> Self {
        let source_code = source_code.into();
        let cause = cause.into();

        let location = match cause.range() {
            Some(range) => {
                let start = offset(&source_code, range.start);
                let end = offset(&source_code, range.end);
                SourceSpan::new(start.into(), std::cmp::max(end.saturating_sub(start), 1))
            }
            None => SourceSpan::new(SourceOffset::from(0), 0),
        };

        Self {
            cause,
            source_code,
            location,
        }
    }

    /// Errors that carry no source, such as a bad JSON value at the host boundary.
    pub fn without_source(cause: impl Into<InnerError>) -> Self {
        Self::from_error(String::new(), cause)
    }

    pub fn error_code(&self) -> ErrorCode {
        self.cause.error_code()
    }
}

fn offset(source_code: &str, position: Position) -> usize {
    if source_code.is_empty() {
        return 0;
    }

    SourceOffset::from_location(source_code, position.line as usize, position.column)
        .offset()
        .min(source_code.len())
}

impl Diagnostic for Error {
    fn code<'a>(&'a self) -> Option<Box<dyn std::fmt::Display + 'a>> {
        let c = match &self.cause {
            InnerError::Lexer(LexerError::UnexpectedCharacter(_, _)) => {
                "LexerError::UnexpectedCharacter"
            }
            InnerError::Lexer(LexerError::UnexpectedEOFDetected(_)) => {
                "LexerError::UnexpectedEOFDetected"
            }
            InnerError::Parse(ParseError::UnexpectedToken(_)) => "ParseError::UnexpectedToken",
            InnerError::Parse(ParseError::UnexpectedEOFDetected(_)) => {
                "ParseError::UnexpectedEOFDetected"
            }
            InnerError::Parse(ParseError::ExpectedClosingParen(_)) => {
                "ParseError::ExpectedClosingParen"
            }
            InnerError::Parse(ParseError::ExpectedClosingBrace(_)) => {
                "ParseError::ExpectedClosingBrace"
            }
            InnerError::Parse(ParseError::ExpectedClosingBracket(_)) => {
                "ParseError::ExpectedClosingBracket"
            }
            InnerError::Parse(ParseError::OutsideOfLoop(_)) => "ParseError::OutsideOfLoop",
            InnerError::Parse(ParseError::NestingTooDeep(_)) => "ParseError::NestingTooDeep",
            InnerError::Eval(EvalError::UndefinedVariable(_, _)) => "EvalError::UndefinedVariable",
            InnerError::Eval(EvalError::NotCallable(_, _)) => "EvalError::NotCallable",
            InnerError::Eval(EvalError::InvalidTypes { .. }) => "EvalError::InvalidTypes",
            InnerError::Eval(EvalError::InvalidNumberOfArguments(_, _, _, _)) => {
                "EvalError::InvalidNumberOfArguments"
            }
            InnerError::Eval(EvalError::IndexOutOfBounds(_, _)) => "EvalError::IndexOutOfBounds",
            InnerError::Eval(EvalError::ZeroDivision(_)) => "EvalError::ZeroDivision",
            InnerError::Eval(EvalError::InvalidArgument(_, _, _)) => "EvalError::InvalidArgument",
            InnerError::Eval(EvalError::IoError(_, _, _)) => "EvalError::IoError",
            InnerError::Eval(EvalError::PermissionDenied(_, _, _)) => "EvalError::PermissionDenied",
            InnerError::Eval(EvalError::LimitExceeded(_, _)) => "EvalError::LimitExceeded",
            InnerError::Env(EnvError::UndefinedVariable(_)) => "EnvError::UndefinedVariable",
            InnerError::Serialization(SerializationError::Function(_)) => {
                "SerializationError::Function"
            }
            InnerError::Serialization(SerializationError::NonFiniteNumber(_)) => {
                "SerializationError::NonFiniteNumber"
            }
            InnerError::Serialization(SerializationError::Json(_)) => "SerializationError::Json",
            InnerError::InvalidArgument(_) => "InvalidArgument",
        };

        Some(Box::new(c))
    }

    fn source_code(&self) -> Option<&dyn miette::SourceCode> {
        Some(&self.source_code)
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = miette::LabeledSpan> + '_>> {
        Some(Box::new(std::iter::once(miette::LabeledSpan::new(
            Some(self.cause.to_string()),
            self.location.offset(),
            self.location.len(),
        ))))
    }
}
