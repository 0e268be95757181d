use thiserror::Error;

use crate::range::Position;

#[derive(Error, Debug, PartialEq)]
pub enum LexerError {
    #[error("Unexpected character `{1}`")]
    UnexpectedCharacter(Position, char),
    #[error("Unexpected EOF detected")]
    UnexpectedEOFDetected(Position),
}

impl LexerError {
    pub fn position(&self) -> Position {
        match self {
            LexerError::UnexpectedCharacter(position, _) => *position,
            LexerError::UnexpectedEOFDetected(position) => *position,
        }
    }
}
