//! Recursive-descent parser producing an [`Expr`] tree.
//!
//! Precedence, loosest first:
//!
//! | Level | Operators |
//! |-------|-----------|
//! | conditional | `c ? a : b` (right associative) |
//! | or | `\|\|` |
//! | and | `&&` |
//! | relation | `== != < <= > >= in` |
//! | additive | `+ -` |
//! | multiplicative | `* / %` |
//! | unary | `! -` |
//! | member | `a.b` `a.?b` `a[i]` `a[?i]` `a.f(x)` |

use std::sync::Arc;

use crate::cel::ast::{BinaryOp, Expr, ListElement, MapEntry, UnaryOp};
use crate::cel::error::CompileError;
use crate::cel::lexer::{tokenize, Spanned, Token};
use crate::cel::value::Value;

/// Nesting limit; deeper input is rejected instead of exhausting the stack.
/// Brackets, parentheses and every link of an operator or member chain count,
/// since each one adds a level to the tree that later passes recurse over.
const MAX_DEPTH: usize = 100;

pub fn parse(src: &str) -> Result<Expr, CompileError> {
    let mut parser = Parser {
        tokens: tokenize(src)?,
        pos: 0,
        depth: 0,
    };
    let expr = parser.expr()?;
    match parser.peek() {
        Token::Eof => Ok(expr),
        other => Err(parser.unexpected(&other.clone())),
    }
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    depth: usize,
}

impl Parser {
    // -----------------------------------------------------------------------
    // Token helpers
    // -----------------------------------------------------------------------

    fn peek(&self) -> &Token {
        self.peek_at(0)
    }

    fn peek_at(&self, offset: usize) -> &Token {
        self.tokens
            .get(self.pos + offset)
            .or_else(|| self.tokens.last())
            .map(|s| &s.token)
            .unwrap_or(&Token::Eof)
    }

    fn column(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|s| s.column)
            .unwrap_or(1)
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == token {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token) -> Result<(), CompileError> {
        if self.eat(&token) {
            Ok(())
        } else {
            Err(CompileError::syntax(
                self.column(),
                format!("expected {}, found {}", describe(&token), describe(self.peek())),
            ))
        }
    }

    fn unexpected(&self, token: &Token) -> CompileError {
        let message = match token {
            Token::Eof => "unexpected end of expression".to_owned(),
            other => format!("unexpected {}", describe(other)),
        };
        CompileError::syntax(self.column(), message)
    }

    fn enter(&mut self) -> Result<(), CompileError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(CompileError::syntax(
                self.column(),
                "expression nesting exceeds maximum depth",
            ));
        }
        Ok(())
    }

    fn ident(&mut self) -> Result<String, CompileError> {
        match self.advance() {
            Token::Ident(name) => Ok(name),
            other => {
                self.pos -= 1;
                Err(CompileError::syntax(
                    self.column(),
                    format!("expected identifier, found {}", describe(&other)),
                ))
            }
        }
    }

    // -----------------------------------------------------------------------
    // Grammar
    // -----------------------------------------------------------------------

    fn expr(&mut self) -> Result<Expr, CompileError> {
        self.enter()?;
        let condition = self.or()?;
        let result = if self.eat(&Token::Question) {
            let then = self.or()?;
            self.expect(Token::Colon)?;
            let otherwise = self.expr()?;
            Expr::conditional(condition, then, otherwise)
        } else {
            condition
        };
        self.depth -= 1;
        Ok(result)
    }

    fn or(&mut self) -> Result<Expr, CompileError> {
        let mut lhs = self.and()?;
        let mut links = 0;
        while self.eat(&Token::OrOr) {
            self.enter()?;
            links += 1;
            let rhs = self.and()?;
            lhs = Expr::binary(BinaryOp::Or, lhs, rhs);
        }
        self.depth -= links;
        Ok(lhs)
    }

    fn and(&mut self) -> Result<Expr, CompileError> {
        let mut lhs = self.relation()?;
        let mut links = 0;
        while self.eat(&Token::AndAnd) {
            self.enter()?;
            links += 1;
            let rhs = self.relation()?;
            lhs = Expr::binary(BinaryOp::And, lhs, rhs);
        }
        self.depth -= links;
        Ok(lhs)
    }

    fn relation(&mut self) -> Result<Expr, CompileError> {
        let mut lhs = self.additive()?;
        let mut links = 0;
        loop {
            let op = match self.peek() {
                Token::EqEq => BinaryOp::Eq,
                Token::NotEq => BinaryOp::Ne,
                Token::Lt => BinaryOp::Lt,
                Token::Le => BinaryOp::Le,
                Token::Gt => BinaryOp::Gt,
                Token::Ge => BinaryOp::Ge,
                Token::In => BinaryOp::In,
                _ => break,
            };
            self.advance();
            self.enter()?;
            links += 1;
            let rhs = self.additive()?;
            lhs = Expr::binary(op, lhs, rhs);
        }
        self.depth -= links;
        Ok(lhs)
    }

    fn additive(&mut self) -> Result<Expr, CompileError> {
        let mut lhs = self.multiplicative()?;
        let mut links = 0;
        loop {
            let op = match self.peek() {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            self.enter()?;
            links += 1;
            let rhs = self.multiplicative()?;
            lhs = Expr::binary(op, lhs, rhs);
        }
        self.depth -= links;
        Ok(lhs)
    }

    fn multiplicative(&mut self) -> Result<Expr, CompileError> {
        let mut lhs = self.unary()?;
        let mut links = 0;
        loop {
            let op = match self.peek() {
                Token::Star => BinaryOp::Mul,
                Token::Slash => BinaryOp::Div,
                Token::Percent => BinaryOp::Rem,
                _ => break,
            };
            self.advance();
            self.enter()?;
            links += 1;
            let rhs = self.unary()?;
            lhs = Expr::binary(op, lhs, rhs);
        }
        self.depth -= links;
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr, CompileError> {
        match self.peek() {
            Token::Bang => {
                let mut count = 0;
                while self.eat(&Token::Bang) {
                    count += 1;
                }
                let operand = self.member()?;
                Ok(if count % 2 == 0 {
                    operand
                } else {
                    Expr::Unary(UnaryOp::Not, Box::new(operand))
                })
            }
            Token::Minus => {
                let mut count = 0;
                while self.eat(&Token::Minus) {
                    count += 1;
                }
                // `-9223372036854775808` only fits once the sign is applied.
                if count % 2 == 1 {
                    if let Some(literal) = self.negative_literal()? {
                        return Ok(literal);
                    }
                }
                let operand = self.member()?;
                Ok(if count % 2 == 0 {
                    operand
                } else {
                    Expr::Unary(UnaryOp::Neg, Box::new(operand))
                })
            }
            _ => self.member(),
        }
    }

    /// A numeric literal directly after a unary minus, when no member access
    /// follows it.
    fn negative_literal(&mut self) -> Result<Option<Expr>, CompileError> {
        if matches!(self.peek_at(1), Token::Dot | Token::LBracket) {
            return Ok(None);
        }
        let column = self.column();
        match self.peek().clone() {
            Token::Int(magnitude) => {
                self.advance();
                let value = 0i64
                    .checked_sub_unsigned(magnitude)
                    .ok_or_else(|| {
                        CompileError::syntax(column, format!("integer literal out of range: -{magnitude}"))
                    })?;
                Ok(Some(Expr::Literal(Value::Int(value))))
            }
            Token::Double(d) => {
                self.advance();
                Ok(Some(Expr::Literal(Value::Double(-d))))
            }
            _ => Ok(None),
        }
    }

    fn member(&mut self) -> Result<Expr, CompileError> {
        let mut expr = self.primary()?;
        let mut links = 0;
        loop {
            match self.peek() {
                Token::Dot => {
                    self.advance();
                    self.enter()?;
                    links += 1;
                    let optional = self.eat(&Token::Question);
                    let field = self.ident()?;
                    if !optional && self.eat(&Token::LParen) {
                        let args = self.args(Token::RParen)?;
                        expr = Expr::Call {
                            target: Some(Box::new(expr)),
                            function: field,
                            args,
                        };
                    } else {
                        expr = Expr::Select {
                            operand: Box::new(expr),
                            field,
                            test_only: false,
                            optional,
                        };
                    }
                }
                Token::LBracket => {
                    self.advance();
                    self.enter()?;
                    links += 1;
                    let optional = self.eat(&Token::Question);
                    let index = self.expr()?;
                    self.expect(Token::RBracket)?;
                    expr = Expr::Index {
                        operand: Box::new(expr),
                        index: Box::new(index),
                        optional,
                    };
                }
                _ => break,
            }
        }
        self.depth -= links;
        Ok(expr)
    }

    fn primary(&mut self) -> Result<Expr, CompileError> {
        let column = self.column();
        match self.advance() {
            Token::Dot => {
                let name = self.ident()?;
                self.ident_or_call(name)
            }
            Token::Ident(name) => self.ident_or_call(name),
            Token::LParen => {
                let expr = self.expr()?;
                self.expect(Token::RParen)?;
                Ok(expr)
            }
            Token::LBracket => self.list(),
            Token::LBrace => self.map(),
            Token::Int(magnitude) => i64::try_from(magnitude)
                .map(|i| Expr::Literal(Value::Int(i)))
                .map_err(|_| {
                    CompileError::syntax(column, format!("integer literal out of range: {magnitude}"))
                }),
            Token::Uint(u) => Ok(Expr::Literal(Value::Uint(u))),
            Token::Double(d) => Ok(Expr::Literal(Value::Double(d))),
            Token::Str(s) => Ok(Expr::Literal(Value::String(Arc::from(s)))),
            Token::Bytes(b) => Ok(Expr::Literal(Value::Bytes(Arc::from(b)))),
            Token::True => Ok(Expr::Literal(Value::Bool(true))),
            Token::False => Ok(Expr::Literal(Value::Bool(false))),
            Token::Null => Ok(Expr::Literal(Value::Null)),
            other => {
                self.pos -= 1;
                Err(self.unexpected(&other))
            }
        }
    }

    fn ident_or_call(&mut self, name: String) -> Result<Expr, CompileError> {
        if self.eat(&Token::LParen) {
            let args = self.args(Token::RParen)?;
            Ok(Expr::call(name, args))
        } else {
            Ok(Expr::Ident(name))
        }
    }

    /// Comma separated expressions up to `close`; a trailing comma is allowed.
    fn args(&mut self, close: Token) -> Result<Vec<Expr>, CompileError> {
        let mut args = Vec::new();
        while !self.eat(&close) {
            args.push(self.expr()?);
            if !self.eat(&Token::Comma) {
                self.expect(close)?;
                break;
            }
        }
        Ok(args)
    }

    fn list(&mut self) -> Result<Expr, CompileError> {
        self.enter()?;
        let mut items = Vec::new();
        while !self.eat(&Token::RBracket) {
            let optional = self.eat(&Token::Question);
            let value = self.expr()?;
            items.push(ListElement { value, optional });
            if !self.eat(&Token::Comma) {
                self.expect(Token::RBracket)?;
                break;
            }
        }
        self.depth -= 1;
        Ok(Expr::List(items))
    }

    fn map(&mut self) -> Result<Expr, CompileError> {
        self.enter()?;
        let mut entries = Vec::new();
        while !self.eat(&Token::RBrace) {
            let optional = self.eat(&Token::Question);
            let key = self.expr()?;
            self.expect(Token::Colon)?;
            let value = self.expr()?;
            entries.push(MapEntry {
                key,
                value,
                optional,
            });
            if !self.eat(&Token::Comma) {
                self.expect(Token::RBrace)?;
                break;
            }
        }
        self.depth -= 1;
        Ok(Expr::Map(entries))
    }
}

fn describe(token: &Token) -> String {
    match token {
        Token::Ident(name) => format!("identifier '{name}'"),
        Token::Int(i) => format!("'{i}'"),
        Token::Uint(u) => format!("'{u}u'"),
        Token::Double(d) => format!("'{d}'"),
        Token::Str(_) => "string literal".to_owned(),
        Token::Bytes(_) => "bytes literal".to_owned(),
        Token::True => "'true'".to_owned(),
        Token::False => "'false'".to_owned(),
        Token::Null => "'null'".to_owned(),
        Token::In => "'in'".to_owned(),
        Token::LParen => "'('".to_owned(),
        Token::RParen => "')'".to_owned(),
        Token::LBracket => "'['".to_owned(),
        Token::RBracket => "']'".to_owned(),
        Token::LBrace => "'{'".to_owned(),
        Token::RBrace => "'}'".to_owned(),
        Token::Dot => "'.'".to_owned(),
        Token::Comma => "','".to_owned(),
        Token::Colon => "':'".to_owned(),
        Token::Question => "'?'".to_owned(),
        Token::Plus => "'+'".to_owned(),
        Token::Minus => "'-'".to_owned(),
        Token::Star => "'*'".to_owned(),
        Token::Slash => "'/'".to_owned(),
        Token::Percent => "'%'".to_owned(),
        Token::Bang => "'!'".to_owned(),
        Token::EqEq => "'=='".to_owned(),
        Token::NotEq => "'!='".to_owned(),
        Token::Lt => "'<'".to_owned(),
        Token::Le => "'<='".to_owned(),
        Token::Gt => "'>'".to_owned(),
        Token::Ge => "'>='".to_owned(),
        Token::AndAnd => "'&&'".to_owned(),
        Token::OrOr => "'||'".to_owned(),
        Token::Eof => "end of expression".to_owned(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
