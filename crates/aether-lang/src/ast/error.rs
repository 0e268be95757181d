use thiserror::Error;

use crate::{Token, range::Range};

#[derive(Error, Debug, PartialEq)]
pub enum ParseError {
    #[error("Unexpected token `{}`", if .0.is_eof() { "EOF".to_string() } else { .0.to_string() })]
    UnexpectedToken(Token),
    #[error("Unexpected EOF detected")]
    UnexpectedEOFDetected(Range),
    #[error("Expected a closing parenthesis `)` but got `{}` delimiter", if .0.is_eof() { "EOF".to_string() } else { .0.to_string() })]
    ExpectedClosingParen(Token),
    #[error("Expected a closing brace `}}` but got `{}` delimiter", if .0.is_eof() { "EOF".to_string() } else { .0.to_string() })]
    ExpectedClosingBrace(Token),
    #[error("Expected a closing bracket `]` but got `{}` delimiter", if .0.is_eof() { "EOF".to_string() } else { .0.to_string() })]
    ExpectedClosingBracket(Token),
    #[error("`{}` outside of a loop", .0)]
    OutsideOfLoop(Token),
    #[error("Nesting exceeds the maximum depth of {}", crate::ast::parser::MAX_NESTING_DEPTH)]
    NestingTooDeep(Range),
}

impl ParseError {
    pub fn range(&self) -> Range {
        match self {
            ParseError::UnexpectedToken(token)
            | ParseError::ExpectedClosingParen(token)
            | ParseError::ExpectedClosingBrace(token)
            | ParseError::ExpectedClosingBracket(token)
            | ParseError::OutsideOfLoop(token) => token.range,
            ParseError::UnexpectedEOFDetected(range) | ParseError::NestingTooDeep(range) => *range,
        }
    }
}
