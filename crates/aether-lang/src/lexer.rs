pub mod error;
pub mod token;

use error::LexerError;
use nom::Parser;
use nom::character::complete::{digit1, line_ending, not_line_ending, one_of, space0};
use nom::combinator::opt;
use nom::{
    IResult,
    branch::alt,
    bytes::complete::{escaped_transform, tag, take_while_m_n},
    character::complete::{alpha1, alphanumeric1, char, none_of},
    combinator::{map, map_opt, map_res, recognize, value},
    multi::many0,
    sequence::{delimited, pair, preceded},
};
use nom_locate::position;
use smol_str::SmolStr;
use token::{Token, TokenKind};

use crate::number::Number;
use crate::range::{Position, Range, Span};

macro_rules! define_token_parser {
    ($name:ident, $tag:expr, $kind:expr) => {
        fn $name(input: Span) -> IResult<Span, Token> {
            map(tag($tag), |span: Span| Token {
                range: span.into(),
                kind: $kind,
            })
            .parse(input)
        }
    };
}

/// Turns Aether source text into a flat token stream.
///
/// Spaces and tabs are dropped, newlines survive as `NewLine` tokens because
/// they terminate statements. The stream always ends with `Eof`.
#[derive(Debug, Default)]
pub struct Lexer;

impl Lexer {
    pub fn new() -> Self {
        Self
    }

    pub fn tokenize(&self, input: &str) -> Result<Vec<Token>, LexerError> {
        match tokens(Span::new(input)) {
            Ok((span, tokens)) => {
                if span.fragment().is_empty() {
                    let eof: Range = span.into();
                    Ok([
                        tokens,
                        vec![Token {
                            range: eof,
                            kind: TokenKind::Eof,
                        }],
                    ]
                    .concat())
                } else {
                    let position: Position = span.into();
                    match span.fragment().chars().next() {
                        Some('"') => Err(LexerError::UnexpectedEOFDetected(position)),
                        Some(c) => Err(LexerError::UnexpectedCharacter(position, c)),
                        None => Err(LexerError::UnexpectedEOFDetected(position)),
                    }
                }
            }
            Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
                let position: Position = e.input.into();
                match e.input.fragment().chars().next() {
                    Some(c) => Err(LexerError::UnexpectedCharacter(position, c)),
                    None => Err(LexerError::UnexpectedEOFDetected(position)),
                }
            }
            Err(nom::Err::Incomplete(_)) => {
                Err(LexerError::UnexpectedEOFDetected(Position::default()))
            }
        }
    }
}

fn unicode(input: Span) -> IResult<Span, char> {
    map_opt(
        map_res(
            preceded(
                char('u'),
                delimited(
                    char('{'),
                    take_while_m_n(1, 6, |c: char| c.is_ascii_hexdigit()),
                    char('}'),
                ),
            ),
            |span: Span| u32::from_str_radix(span.fragment(), 16),
        ),
        char::from_u32,
    )
    .parse(input)
}

fn inline_comment(input: Span) -> IResult<Span, Token> {
    map(preceded(tag("//"), not_line_ending), |span: Span| Token {
        range: span.into(),
        kind: TokenKind::Comment(span.fragment().to_string()),
    })
    .parse(input)
}

fn newline(input: Span) -> IResult<Span, Token> {
    map(line_ending, |span: Span| Token {
        range: span.into(),
        kind: TokenKind::NewLine,
    })
    .parse(input)
}

define_token_parser!(comma, ",", TokenKind::Comma);
define_token_parser!(colon, ":", TokenKind::Colon);
define_token_parser!(semi_colon, ";", TokenKind::SemiColon);
define_token_parser!(l_paren, "(", TokenKind::LParen);
define_token_parser!(r_paren, ")", TokenKind::RParen);
define_token_parser!(l_bracket, "[", TokenKind::LBracket);
define_token_parser!(r_bracket, "]", TokenKind::RBracket);
define_token_parser!(l_brace, "{", TokenKind::LBrace);
define_token_parser!(r_brace, "}", TokenKind::RBrace);
define_token_parser!(eq_eq, "==", TokenKind::EqEq);
define_token_parser!(ne_eq, "!=", TokenKind::NeEq);
define_token_parser!(gte, ">=", TokenKind::Gte);
define_token_parser!(lte, "<=", TokenKind::Lte);
define_token_parser!(and, "&&", TokenKind::And);
define_token_parser!(or, "||", TokenKind::Or);
define_token_parser!(gt, ">", TokenKind::Gt);
define_token_parser!(lt, "<", TokenKind::Lt);
define_token_parser!(not, "!", TokenKind::Not);
define_token_parser!(plus, "+", TokenKind::Plus);
define_token_parser!(minus, "-", TokenKind::Minus);
define_token_parser!(asterisk, "*", TokenKind::Asterisk);
define_token_parser!(slash, "/", TokenKind::Slash);
define_token_parser!(percent, "%", TokenKind::Percent);
define_token_parser!(
    empty_string,
    "\"\"",
    TokenKind::StringLiteral(String::new())
);

fn punctuations(input: Span) -> IResult<Span, Token> {
    alt((
        l_paren, r_paren, l_bracket, r_bracket, l_brace, r_brace, comma, colon, semi_colon,
    ))
    .parse(input)
}

fn operators(input: Span) -> IResult<Span, Token> {
    alt((
        eq_eq, ne_eq, gte, lte, and, or, gt, lt, not, plus, minus, asterisk, slash, percent,
    ))
    .parse(input)
}

fn number_literal(input: Span) -> IResult<Span, Token> {
    map_res(
        recognize((
            digit1,
            opt(pair(char('.'), digit1)),
            opt((one_of("eE"), opt(one_of("+-")), digit1)),
        )),
        |span: Span| {
            str::parse::<f64>(span.fragment()).map(|n| Token {
                range: span.into(),
                kind: TokenKind::NumberLiteral(Number::new(n)),
            })
        },
    )
    .parse(input)
}

fn string_literal(input: Span) -> IResult<Span, Token> {
    let (span, start) = position(input)?;
    let (span, s) = delimited(
        char('"'),
        escaped_transform(
            none_of("\"\\"),
            '\\',
            alt((
                value('\\', char('\\')),
                value('\"', char('\"')),
                value('\r', char('r')),
                value('\n', char('n')),
                value('\t', char('t')),
                unicode,
            )),
        ),
        char('"'),
    )
    .parse(span)?;
    let (span, end) = position(span)?;

    Ok((
        span,
        Token {
            range: Range {
                start: start.into(),
                end: end.into(),
            },
            kind: TokenKind::StringLiteral(s),
        },
    ))
}

fn literals(input: Span) -> IResult<Span, Token> {
    alt((number_literal, empty_string, string_literal)).parse(input)
}

fn ident(input: Span) -> IResult<Span, Token> {
    map(
        recognize(pair(
            alt((alpha1, tag("_"))),
            many0(alt((alphanumeric1, tag("_")))),
        )),
        |span: Span| {
            let kind = TokenKind::keyword(span.fragment())
                .unwrap_or_else(|| TokenKind::Ident(SmolStr::new(span.fragment())));
            Token {
                range: span.into(),
                kind,
            }
        },
    )
    .parse(input)
}

fn token(input: Span) -> IResult<Span, Token> {
    alt((
        newline,
        inline_comment,
        operators,
        punctuations,
        literals,
        ident,
    ))
    .parse(input)
}

fn tokens(input: Span) -> IResult<Span, Vec<Token>> {
    let (span, tokens) = many0(delimited(space0, token, space0)).parse(input)?;
    let (span, _) = space0(span)?;
    Ok((span, tokens))
}
