use smol_str::SmolStr;
use thiserror::Error;

use crate::{
    limits::LimitKind,
    number::Number,
    permission::{Capability, PermissionDenied},
    range::Range,
};

type FunctionName = String;
type ArgType = Vec<SmolStr>;

#[derive(Error, Debug, PartialEq)]
pub enum EvalError {
    #[error("Undefined variable `{1}`")]
    UndefinedVariable(Range, SmolStr),
    #[error("`{1}` is not callable")]
    NotCallable(Range, String),
    #[error(r#"Invalid types for "{}", got {}"#, name, args.join(", "))]
    InvalidTypes {
        range: Range,
        name: FunctionName,
        args: ArgType,
    },
    #[error("Invalid number of arguments in \"{1}\", expected {2}, got {3}")]
    InvalidNumberOfArguments(Range, FunctionName, usize, usize),
    #[error("Index out of bounds {1}")]
    IndexOutOfBounds(Range, Number),
    #[error("Divided by 0")]
    ZeroDivision(Range),
    #[error("Invalid argument for \"{1}\": {2}")]
    InvalidArgument(Range, FunctionName, String),
    #[error("I/O error in \"{1}\": {2}")]
    IoError(Range, FunctionName, String),
    #[error("Permission denied: `{1}` requires the `{2}` capability")]
    PermissionDenied(Range, FunctionName, Capability),
    #[error("Limit exceeded: {1}")]
    LimitExceeded(Range, LimitKind),
}

impl EvalError {
    #[cold]
    pub fn range(&self) -> Range {
        match self {
            EvalError::UndefinedVariable(range, _)
            | EvalError::NotCallable(range, _)
            | EvalError::InvalidTypes { range, .. }
            | EvalError::InvalidNumberOfArguments(range, _, _, _)
            | EvalError::IndexOutOfBounds(range, _)
            | EvalError::ZeroDivision(range)
            | EvalError::InvalidArgument(range, _, _)
            | EvalError::IoError(range, _, _)
            | EvalError::PermissionDenied(range, _, _)
            | EvalError::LimitExceeded(range, _) => *range,
        }
    }

    pub fn permission_denied(range: Range, name: &str, denied: PermissionDenied) -> Self {
        EvalError::PermissionDenied(range, name.to_string(), denied.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::range::Position;
    use rstest::rstest;

    #[rstest]
    #[case::invalid_types(
        EvalError::InvalidTypes {
            range: Range::default(),
            name: "+".to_string(),
            args: vec!["number".into(), "null".into()],
        },
        r#"Invalid types for "+", got number, null"#
    )]
    #[case::arity(
        EvalError::InvalidNumberOfArguments(Range::default(), "ADD".to_string(), 2, 1),
        "Invalid number of arguments in \"ADD\", expected 2, got 1"
    )]
    #[case::limit(
        EvalError::LimitExceeded(Range::default(), LimitKind::Recursion),
        "Limit exceeded: Recursion"
    )]
    #[case::permission(
        EvalError::PermissionDenied(Range::default(), "PRINTLN".to_string(), Capability::Io),
        "Permission denied: `PRINTLN` requires the `io` capability"
    )]
    fn test_display(#[case] error: EvalError, #[case] expected: &str) {
        assert_eq!(error.to_string(), expected);
    }

    #[test]
    fn test_range() {
        let range = Range::new(Position::new(2, 3), Position::new(2, 8));
        assert_eq!(EvalError::ZeroDivision(range).range(), range);
    }
}
