use std::fmt::{self, Display, Formatter};

use smol_str::SmolStr;

use crate::{number::Number, range::Range};

#[derive(PartialEq, Debug, Clone)]
pub struct Token {
    pub range: Range,
    pub kind: TokenKind,
}

impl Token {
    pub fn is_eof(&self) -> bool {
        matches!(self.kind, TokenKind::Eof)
    }
}

#[derive(PartialEq, Debug, Clone)]
pub enum TokenKind {
    And,
    Asterisk,
    BoolLiteral(bool),
    Break,
    Colon,
    Comma,
    Comment(String),
    Continue,
    Elif,
    Else,
    Eof,
    EqEq,
    For,
    Func,
    Gt,
    Gte,
    Ident(SmolStr),
    If,
    In,
    Lambda,
    LBrace,
    LBracket,
    LParen,
    Lt,
    Lte,
    Minus,
    NeEq,
    NewLine,
    Not,
    Null,
    NumberLiteral(Number),
    Or,
    Percent,
    Plus,
    RBrace,
    RBracket,
    Return,
    RParen,
    SemiColon,
    Set,
    Slash,
    StringLiteral(String),
    While,
}

impl TokenKind {
    /// Maps a bare word to its keyword token, if it is one.
    pub fn keyword(word: &str) -> Option<TokenKind> {
        let kind = match word {
            "Set" => TokenKind::Set,
            "Func" => TokenKind::Func,
            "Lambda" => TokenKind::Lambda,
            "Return" => TokenKind::Return,
            "If" => TokenKind::If,
            "Elif" => TokenKind::Elif,
            "Else" => TokenKind::Else,
            "While" => TokenKind::While,
            "For" => TokenKind::For,
            "In" => TokenKind::In,
            "Break" => TokenKind::Break,
            "Continue" => TokenKind::Continue,
            "True" => TokenKind::BoolLiteral(true),
            "False" => TokenKind::BoolLiteral(false),
            "Null" => TokenKind::Null,
            _ => return None,
        };
        Some(kind)
    }

    pub fn is_statement_end(&self) -> bool {
        matches!(
            self,
            TokenKind::NewLine | TokenKind::SemiColon | TokenKind::Comment(_) | TokenKind::Eof
        )
    }
}

impl Display for Token {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "{}", self.kind)
    }
}

impl Display for TokenKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        match &self {
            TokenKind::And => write!(f, "&&"),
            TokenKind::Asterisk => write!(f, "*"),
            TokenKind::BoolLiteral(true) => write!(f, "True"),
            TokenKind::BoolLiteral(false) => write!(f, "False"),
            TokenKind::Break => write!(f, "Break"),
            TokenKind::Colon => write!(f, ":"),
            TokenKind::Comma => write!(f, ","),
            TokenKind::Comment(comment) => write!(f, "// {}", comment.trim()),
            TokenKind::Continue => write!(f, "Continue"),
            TokenKind::Elif => write!(f, "Elif"),
            TokenKind::Else => write!(f, "Else"),
            TokenKind::Eof => write!(f, ""),
            TokenKind::EqEq => write!(f, "=="),
            TokenKind::For => write!(f, "For"),
            TokenKind::Func => write!(f, "Func"),
            TokenKind::Gt => write!(f, ">"),
            TokenKind::Gte => write!(f, ">="),
            TokenKind::Ident(ident) => write!(f, "{}", ident),
            TokenKind::If => write!(f, "If"),
            TokenKind::In => write!(f, "In"),
            TokenKind::Lambda => write!(f, "Lambda"),
            TokenKind::LBrace => write!(f, "{{"),
            TokenKind::LBracket => write!(f, "["),
            TokenKind::LParen => write!(f, "("),
            TokenKind::Lt => write!(f, "<"),
            TokenKind::Lte => write!(f, "<="),
            TokenKind::Minus => write!(f, "-"),
            TokenKind::NeEq => write!(f, "!="),
            TokenKind::NewLine => writeln!(f),
            TokenKind::Not => write!(f, "!"),
            TokenKind::Null => write!(f, "Null"),
            TokenKind::NumberLiteral(n) => write!(f, "{}", n),
            TokenKind::Or => write!(f, "||"),
            TokenKind::Percent => write!(f, "%"),
            TokenKind::Plus => write!(f, "+"),
            TokenKind::RBrace => write!(f, "}}"),
            TokenKind::RBracket => write!(f, "]"),
            TokenKind::Return => write!(f, "Return"),
            TokenKind::RParen => write!(f, ")"),
            TokenKind::SemiColon => write!(f, ";"),
            TokenKind::Set => write!(f, "Set"),
            TokenKind::Slash => write!(f, "/"),
            TokenKind::StringLiteral(s) => write!(f, "\"{}\"", s),
            TokenKind::While => write!(f, "While"),
        }
    }
}
