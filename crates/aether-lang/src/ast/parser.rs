use std::iter::Peekable;
use std::rc::Rc;

use smol_str::SmolStr;

use crate::lexer::token::{Token, TokenKind};
use crate::range::Range;
use crate::stack;

use super::error::ParseError;
use super::node::{Args, BinaryOp, Cond, Expr, Ident, IoOp, Literal, Node, NodeId, UnaryOp};
use super::{Params, Program};

type Tokens<'a> = Peekable<core::slice::Iter<'a, Token>>;

/// Deepest statement or expression nesting the parser accepts.
pub const MAX_NESTING_DEPTH: usize = 256;

/// Recursive descent parser from a token slice to a [`Program`].
///
/// Node ids are handed out in creation order, so the same source always
/// yields the same ids.
pub struct Parser<'a> {
    tokens: Tokens<'a>,
    next_id: u32,
    /// Depth of `(`, `[` and `{` delimiters; newlines are insignificant inside them.
    nesting: usize,
    loop_depth: usize,
    /// Statements and unary expressions currently being parsed.
    depth: usize,
    eof: Range,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [Token]) -> Self {
        Self {
            tokens: tokens.iter().peekable(),
            next_id: 0,
            nesting: 0,
            loop_depth: 0,
            depth: 0,
            eof: tokens.last().map(|token| token.range).unwrap_or_default(),
        }
    }

    pub fn parse(&mut self) -> Result<Program, ParseError> {
        self.parse_statements(&TokenKind::Eof)
    }

    fn alloc(&mut self, range: Range, expr: Expr) -> Rc<Node> {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        Rc::new(Node::new(id, range, expr))
    }

    fn descend<T>(
        &mut self,
        range: Range,
        f: impl FnOnce(&mut Self) -> Result<T, ParseError>,
    ) -> Result<T, ParseError> {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(ParseError::NestingTooDeep(range));
        }

        self.depth += 1;
        let result = stack::ensure_sufficient_stack(|| f(self));
        self.depth -= 1;
        result
    }

    #[inline(always)]
    fn eof_error(&self) -> ParseError {
        ParseError::UnexpectedEOFDetected(self.eof)
    }

    fn skip_newlines(&mut self) {
        while self
            .tokens
            .peek()
            .is_some_and(|token| matches!(token.kind, TokenKind::NewLine | TokenKind::Comment(_)))
        {
            self.tokens.next();
        }
    }

    fn skip_separators(&mut self) {
        while self.tokens.peek().is_some_and(|token| {
            matches!(
                token.kind,
                TokenKind::NewLine | TokenKind::Comment(_) | TokenKind::SemiColon
            )
        }) {
            self.tokens.next();
        }
    }

    fn peek(&mut self) -> Option<&'a Token> {
        if self.nesting > 0 {
            self.skip_newlines();
        }
        self.tokens.peek().copied()
    }

    fn next_token(&mut self) -> Result<&'a Token, ParseError> {
        if self.nesting > 0 {
            self.skip_newlines();
        }
        self.tokens.next().ok_or_else(|| self.eof_error())
    }

    /// Looks at the next token after any newlines without consuming them.
    fn peek_past_newlines(&self) -> (Tokens<'a>, Option<&'a Token>) {
        let mut lookahead = self.tokens.clone();
        while lookahead
            .peek()
            .is_some_and(|token| matches!(token.kind, TokenKind::NewLine | TokenKind::Comment(_)))
        {
            lookahead.next();
        }
        let next = lookahead.peek().copied();
        (lookahead, next)
    }

    fn at_statement_end(&mut self) -> bool {
        self.tokens
            .peek()
            .is_none_or(|token| token.kind.is_statement_end() || token.kind == TokenKind::RBrace)
    }

    fn closing_error(closing: &TokenKind, token: &Token) -> ParseError {
        match closing {
            TokenKind::RParen => ParseError::ExpectedClosingParen(token.clone()),
            TokenKind::RBracket => ParseError::ExpectedClosingBracket(token.clone()),
            TokenKind::RBrace => ParseError::ExpectedClosingBrace(token.clone()),
            _ => ParseError::UnexpectedToken(token.clone()),
        }
    }

    fn parse_statements(&mut self, closing: &TokenKind) -> Result<Program, ParseError> {
        let mut program = Vec::new();

        loop {
            self.skip_separators();
            let token = self.tokens.peek().copied().ok_or_else(|| self.eof_error())?;

            if &token.kind == closing {
                break;
            }

            match &token.kind {
                TokenKind::Eof => return Err(Self::closing_error(closing, token)),
                TokenKind::RBrace => return Err(ParseError::UnexpectedToken(token.clone())),
                _ => {}
            }

            program.push(self.parse_statement()?);

            match self.tokens.peek() {
                Some(next) if next.kind.is_statement_end() || &next.kind == closing => {}
                Some(next) => return Err(ParseError::UnexpectedToken((*next).clone())),
                None => return Err(self.eof_error()),
            }
        }

        Ok(program)
    }

    fn parse_statement(&mut self) -> Result<Rc<Node>, ParseError> {
        let token = self.peek().ok_or_else(|| self.eof_error())?;
        self.descend(token.range, |parser| parser.parse_statement_kind(token))
    }

    fn parse_statement_kind(&mut self, token: &'a Token) -> Result<Rc<Node>, ParseError> {
        match &token.kind {
            TokenKind::Set => {
                self.tokens.next();
                let ident = self.parse_ident()?;
                let value = self.parse_expr()?;
                let range = token.range.merge(&value.range);
                Ok(self.alloc(range, Expr::Set(ident, value)))
            }
            TokenKind::Func => {
                self.tokens.next();
                let ident = self.parse_ident()?;
                let params = self.parse_params()?;
                let (body, body_range) = self.parse_function_body()?;
                let range = token.range.merge(&body_range);
                Ok(self.alloc(range, Expr::Func(ident, params, body)))
            }
            TokenKind::Return => {
                self.tokens.next();
                if self.at_statement_end() {
                    Ok(self.alloc(token.range, Expr::Return(None)))
                } else {
                    let value = self.parse_expr()?;
                    let range = token.range.merge(&value.range);
                    Ok(self.alloc(range, Expr::Return(Some(value))))
                }
            }
            TokenKind::If => self.parse_if(token),
            TokenKind::While => {
                self.tokens.next();
                let cond = self.parse_expr()?;
                let (body, body_range) = self.parse_loop_body()?;
                let range = token.range.merge(&body_range);
                Ok(self.alloc(range, Expr::While(cond, body)))
            }
            TokenKind::For => {
                self.tokens.next();
                let ident = self.parse_ident()?;
                let in_token = self.next_token()?;
                if in_token.kind != TokenKind::In {
                    return Err(ParseError::UnexpectedToken(in_token.clone()));
                }
                let iterable = self.parse_expr()?;
                let (body, body_range) = self.parse_loop_body()?;
                let range = token.range.merge(&body_range);
                Ok(self.alloc(range, Expr::For(ident, iterable, body)))
            }
            TokenKind::Break | TokenKind::Continue => {
                self.tokens.next();
                if self.loop_depth == 0 {
                    return Err(ParseError::OutsideOfLoop(token.clone()));
                }
                let expr = if token.kind == TokenKind::Break {
                    Expr::Break
                } else {
                    Expr::Continue
                };
                Ok(self.alloc(token.range, expr))
            }
            _ => self.parse_expr(),
        }
    }

    fn parse_if(&mut self, if_token: &'a Token) -> Result<Rc<Node>, ParseError> {
        self.tokens.next();
        let mut conds: Vec<Cond> = Vec::with_capacity(2);

        let cond = self.parse_expr()?;
        let (body, body_range) = self.parse_block()?;
        let mut range = if_token.range.merge(&body_range);
        conds.push((Some(cond), body));

        loop {
            let (lookahead, next) = self.peek_past_newlines();
            match next.map(|token| &token.kind) {
                Some(TokenKind::Elif) => {
                    self.tokens = lookahead;
                    self.tokens.next();
                    let cond = self.parse_expr()?;
                    let (body, body_range) = self.parse_block()?;
                    range = range.merge(&body_range);
                    conds.push((Some(cond), body));
                }
                Some(TokenKind::Else) => {
                    self.tokens = lookahead;
                    self.tokens.next();
                    let (body, body_range) = self.parse_block()?;
                    range = range.merge(&body_range);
                    conds.push((None, body));
                    break;
                }
                _ => break,
            }
        }

        Ok(self.alloc(range, Expr::If(conds)))
    }

    fn parse_block(&mut self) -> Result<(Program, Range), ParseError> {
        let saved_nesting = std::mem::replace(&mut self.nesting, 0);
        self.skip_newlines();

        let open = self.next_token()?;
        if open.kind != TokenKind::LBrace {
            return Err(ParseError::UnexpectedToken(open.clone()));
        }

        let body = self.parse_statements(&TokenKind::RBrace)?;
        let close = self.next_token()?;
        self.nesting = saved_nesting;

        Ok((body, open.range.merge(&close.range)))
    }

    fn parse_loop_body(&mut self) -> Result<(Program, Range), ParseError> {
        self.loop_depth += 1;
        let block = self.parse_block();
        self.loop_depth -= 1;
        block
    }

    fn parse_function_body(&mut self) -> Result<(Program, Range), ParseError> {
        let saved_loop_depth = std::mem::replace(&mut self.loop_depth, 0);
        let block = self.parse_block();
        self.loop_depth = saved_loop_depth;
        block
    }

    fn parse_ident(&mut self) -> Result<Ident, ParseError> {
        let token = self.next_token()?;
        match &token.kind {
            TokenKind::Ident(name) => Ok(Ident::new(name)),
            TokenKind::Eof => Err(self.eof_error()),
            _ => Err(ParseError::UnexpectedToken(token.clone())),
        }
    }

    fn parse_params(&mut self) -> Result<Params, ParseError> {
        let open = self.next_token()?;
        if open.kind != TokenKind::LParen {
            return Err(ParseError::UnexpectedToken(open.clone()));
        }

        self.nesting += 1;
        let mut params = Params::new();
        loop {
            let token = self.next_token()?;
            match &token.kind {
                TokenKind::RParen => break,
                TokenKind::Comma if !params.is_empty() => continue,
                TokenKind::Ident(name) => params.push(Ident::new(name)),
                _ => return Err(Self::closing_error(&TokenKind::RParen, token)),
            }
        }
        self.nesting -= 1;

        Ok(params)
    }

    #[inline(always)]
    fn binary_op(kind: &TokenKind) -> Option<(BinaryOp, u8)> {
        let op = match kind {
            TokenKind::Or => (BinaryOp::Or, 1),
            TokenKind::And => (BinaryOp::And, 2),
            TokenKind::EqEq => (BinaryOp::Eq, 3),
            TokenKind::NeEq => (BinaryOp::Ne, 3),
            TokenKind::Lt => (BinaryOp::Lt, 4),
            TokenKind::Lte => (BinaryOp::Lte, 4),
            TokenKind::Gt => (BinaryOp::Gt, 4),
            TokenKind::Gte => (BinaryOp::Gte, 4),
            TokenKind::Plus => (BinaryOp::Add, 5),
            TokenKind::Minus => (BinaryOp::Sub, 5),
            TokenKind::Asterisk => (BinaryOp::Mul, 6),
            TokenKind::Slash => (BinaryOp::Div, 6),
            TokenKind::Percent => (BinaryOp::Mod, 6),
            _ => return None,
        };
        Some(op)
    }

    #[inline(always)]
    fn parse_expr(&mut self) -> Result<Rc<Node>, ParseError> {
        self.parse_binary(1)
    }

    fn parse_binary(&mut self, min_prec: u8) -> Result<Rc<Node>, ParseError> {
        let mut lhs = self.parse_unary()?;

        while let Some((op, prec)) = self.peek().and_then(|token| Self::binary_op(&token.kind)) {
            if prec < min_prec {
                break;
            }
            self.next_token()?;
            let rhs = self.parse_binary(prec + 1)?;
            let range = lhs.range.merge(&rhs.range);
            lhs = self.alloc(range, Expr::Binary(op, lhs, rhs));
        }

        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Rc<Node>, ParseError> {
        let token = self.peek().ok_or_else(|| self.eof_error())?;
        self.descend(token.range, |parser| parser.parse_prefixed(token))
    }

    fn parse_prefixed(&mut self, token: &'a Token) -> Result<Rc<Node>, ParseError> {
        let op = match token.kind {
            TokenKind::Minus => UnaryOp::Neg,
            TokenKind::Not => UnaryOp::Not,
            _ => return self.parse_postfix(),
        };

        self.next_token()?;
        let operand = self.parse_unary()?;
        let range = token.range.merge(&operand.range);
        Ok(self.alloc(range, Expr::Unary(op, operand)))
    }

    fn parse_postfix(&mut self) -> Result<Rc<Node>, ParseError> {
        let mut target = self.parse_primary()?;

        while self
            .tokens
            .peek()
            .is_some_and(|token| token.kind == TokenKind::LBracket)
        {
            self.tokens.next();
            self.nesting += 1;
            let index = self.parse_expr()?;
            let close = self.next_token()?;
            self.nesting -= 1;
            if close.kind != TokenKind::RBracket {
                return Err(ParseError::ExpectedClosingBracket(close.clone()));
            }
            let range = target.range.merge(&close.range);
            target = self.alloc(range, Expr::Index(target, index));
        }

        Ok(target)
    }

    fn parse_primary(&mut self) -> Result<Rc<Node>, ParseError> {
        let token = self.next_token()?;

        match &token.kind {
            TokenKind::NumberLiteral(n) => {
                Ok(self.alloc(token.range, Expr::Literal(Literal::Number(*n))))
            }
            TokenKind::StringLiteral(s) => {
                Ok(self.alloc(token.range, Expr::Literal(Literal::String(s.clone()))))
            }
            TokenKind::BoolLiteral(b) => {
                Ok(self.alloc(token.range, Expr::Literal(Literal::Bool(*b))))
            }
            TokenKind::Null => Ok(self.alloc(token.range, Expr::Literal(Literal::Null))),
            TokenKind::Ident(name) => {
                if self
                    .tokens
                    .peek()
                    .is_some_and(|token| token.kind == TokenKind::LParen)
                {
                    self.tokens.next();
                    let (args, close) = self.parse_delimited(&TokenKind::RParen)?;
                    let range = token.range.merge(&close);
                    let expr = match IoOp::from_name(name) {
                        Some(op) => Expr::Io(op, args),
                        None => Expr::Call(Ident::new(name), args),
                    };
                    Ok(self.alloc(range, expr))
                } else {
                    Ok(self.alloc(token.range, Expr::Ident(Ident::new(name))))
                }
            }
            TokenKind::LParen => {
                self.nesting += 1;
                let expr = self.parse_expr()?;
                let close = self.next_token()?;
                self.nesting -= 1;
                if close.kind != TokenKind::RParen {
                    return Err(ParseError::ExpectedClosingParen(close.clone()));
                }
                Ok(expr)
            }
            TokenKind::LBracket => {
                let (items, close) = self.parse_delimited(&TokenKind::RBracket)?;
                let range = token.range.merge(&close);
                Ok(self.alloc(range, Expr::List(items)))
            }
            TokenKind::LBrace => self.parse_map(token),
            TokenKind::Lambda => {
                let params = self.parse_params()?;
                let (body, body_range) = self.parse_function_body()?;
                let range = token.range.merge(&body_range);
                Ok(self.alloc(range, Expr::Lambda(params, body)))
            }
            TokenKind::Eof => Err(self.eof_error()),
            _ => Err(ParseError::UnexpectedToken(token.clone())),
        }
    }

    /// Parses comma separated expressions up to `closing`; the opening
    /// delimiter has already been consumed.
    fn parse_delimited(&mut self, closing: &TokenKind) -> Result<(Args, Range), ParseError> {
        self.nesting += 1;
        let mut args = Args::new();

        loop {
            let token = self.peek().ok_or_else(|| self.eof_error())?;

            if &token.kind == closing {
                self.tokens.next();
                self.nesting -= 1;
                return Ok((args, token.range));
            }

            if token.is_eof() {
                return Err(Self::closing_error(closing, token));
            }

            if !args.is_empty() {
                if token.kind != TokenKind::Comma {
                    return Err(Self::closing_error(closing, token));
                }
                self.tokens.next();
                if self.peek().is_some_and(|token| &token.kind == closing) {
                    continue;
                }
            }

            args.push(self.parse_expr()?);
        }
    }

    fn parse_map(&mut self, open: &'a Token) -> Result<Rc<Node>, ParseError> {
        self.nesting += 1;
        let mut entries: Vec<(SmolStr, Rc<Node>)> = Vec::new();

        let close = loop {
            let token = self.next_token()?;
            let key = match &token.kind {
                TokenKind::RBrace => break token,
                TokenKind::Comma if !entries.is_empty() => continue,
                TokenKind::StringLiteral(key) => SmolStr::new(key),
                TokenKind::Ident(key) => key.clone(),
                TokenKind::Eof => return Err(ParseError::ExpectedClosingBrace(token.clone())),
                _ => return Err(ParseError::UnexpectedToken(token.clone())),
            };

            let colon = self.next_token()?;
            if colon.kind != TokenKind::Colon {
                return Err(ParseError::UnexpectedToken(colon.clone()));
            }

            let value = self.parse_expr()?;
            entries.push((key, value));

            match self.peek() {
                Some(token) if matches!(token.kind, TokenKind::Comma | TokenKind::RBrace) => {}
                Some(token) => return Err(ParseError::ExpectedClosingBrace(token.clone())),
                None => return Err(self.eof_error()),
            }
        };
        self.nesting -= 1;

        let range = open.range.merge(&close.range);
        Ok(self.alloc(range, Expr::Map(entries)))
    }
}
