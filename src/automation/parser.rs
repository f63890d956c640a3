//! Recursive-descent parser for the advanced automation dialect

use std::sync::Arc;

use super::ast::{BinaryOp, Expr, FunctionDef, Stmt, TemplatePart, UnaryOp};
use super::error::CompileError;
use super::lexer::{tokenize, Spanned, Token};

/// Bare words that act as commands: `print "hi"` is `print("hi")`
const COMMAND_WORDS: &[&str] = &["print", "error", "success", "clear", "sleep"];

/// Parse a whole advanced-dialect program
pub fn parse_program(source: &str) -> Result<Vec<Stmt>, CompileError> {
    let mut parser = Parser::new(tokenize(source)?, true);
    parser.parse_program()
}

/// Parse a comma-separated expression list that must span all of `source`
///
/// String literals are taken as-is, without `{expr}` interpolation.
pub fn parse_arguments(source: &str) -> Result<Vec<Expr>, CompileError> {
    let mut parser = Parser::new(tokenize(source)?, false);
    let mut args = Vec::new();
    if parser.at_end() {
        return Ok(args);
    }
    args.push(parser.parse_expression()?);
    while parser.eat(&Token::Comma) {
        args.push(parser.parse_expression()?);
    }
    parser.expect_end()?;
    Ok(args)
}

/// Parse a single expression that must span all of `source`
pub fn parse_expression(source: &str, interpolate: bool) -> Result<Expr, CompileError> {
    let mut parser = Parser::new(tokenize(source)?, interpolate);
    let expr = parser.parse_expression()?;
    parser.expect_end()?;
    Ok(expr)
}

/// Parser over a token stream
#[derive(Debug)]
pub struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    interpolate: bool,
}

impl Parser {
    /// Create a parser; `interpolate` enables `{expr}` segments in strings
    pub fn new(tokens: Vec<Spanned>, interpolate: bool) -> Self {
        Self {
            tokens,
            pos: 0,
            interpolate,
        }
    }

    fn current(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|spanned| &spanned.token)
    }

    fn peek(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset).map(|spanned| &spanned.token)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    /// Line of the current token, or of the last token at end of input
    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|spanned| spanned.line)
            .unwrap_or(1)
    }

    /// Whether the current token sits on the same line as the previous one
    fn on_same_line(&self) -> bool {
        match (self.tokens.get(self.pos), self.pos.checked_sub(1)) {
            (Some(current), Some(prev)) => self.tokens[prev].line == current.line,
            _ => false,
        }
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.current().cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn check(&self, expected: &Token) -> bool {
        self.current() == Some(expected)
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.check(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: Token) -> Result<(), CompileError> {
        if self.eat(&expected) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("expected {expected}")))
        }
    }

    fn expect_end(&self) -> Result<(), CompileError> {
        match self.current() {
            None => Ok(()),
            Some(_) => Err(self.unexpected("expected end of input")),
        }
    }

    fn unexpected(&self, context: &str) -> CompileError {
        match self.current() {
            Some(token) => CompileError::at_line(self.line(), format!("Unexpected {token}, {context}")),
            None => CompileError::at_line(self.line(), format!("Unexpected end of input, {context}")),
        }
    }

    fn expect_ident(&mut self, what: &str) -> Result<String, CompileError> {
        match self.current() {
            Some(Token::Ident(name)) => {
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.unexpected(&format!("expected {what}"))),
        }
    }

    /// Parse statements until the input runs out
    pub fn parse_program(&mut self) -> Result<Vec<Stmt>, CompileError> {
        let mut statements = Vec::new();
        while !self.at_end() {
            if self.eat(&Token::Semicolon) {
                continue;
            }
            if self.current().is_some_and(Token::closes_block) {
                return Err(self.unexpected("no block is open"));
            }
            statements.push(self.parse_statement()?);
        }
        Ok(statements)
    }

    /// Parse `{ ... }` or `{ ... end`
    fn parse_block(&mut self) -> Result<Vec<Stmt>, CompileError> {
        let opened_on = self.line();
        self.expect(Token::OpenBrace)?;

        let mut statements = Vec::new();
        loop {
            match self.current() {
                None => {
                    return Err(CompileError::at_line(
                        self.line(),
                        format!("Unterminated block opened on line {opened_on}"),
                    ))
                }
                Some(token) if token.closes_block() => {
                    self.pos += 1;
                    return Ok(statements);
                }
                Some(Token::Semicolon) => {
                    self.pos += 1;
                }
                Some(_) => statements.push(self.parse_statement()?),
            }
        }
    }

    fn parse_statement(&mut self) -> Result<Stmt, CompileError> {
        match self.current() {
            Some(Token::Let) | Some(Token::Const) => self.parse_let(),
            Some(Token::Fn) if matches!(self.peek(1), Some(Token::Ident(_))) => self.parse_fn_def(),
            Some(Token::If) => self.parse_if(),
            Some(Token::For) => self.parse_for(),
            Some(Token::While) => self.parse_while(),
            Some(Token::Try) => self.parse_try(),
            Some(Token::Return) => self.parse_return(),
            Some(Token::Throw) => {
                self.pos += 1;
                Ok(Stmt::Throw(self.parse_expression()?))
            }
            Some(Token::Break) => {
                self.pos += 1;
                Ok(Stmt::Break)
            }
            Some(Token::Continue) => {
                self.pos += 1;
                Ok(Stmt::Continue)
            }
            Some(Token::Await) => {
                // every call completes before the next statement runs
                self.pos += 1;
                self.parse_statement()
            }
            Some(Token::Ident(name)) if COMMAND_WORDS.contains(&name.as_str()) => {
                match self.parse_command()? {
                    Some(stmt) => Ok(stmt),
                    None => self.parse_expression_statement(),
                }
            }
            _ => self.parse_expression_statement(),
        }
    }

    /// `print "a", b` / bare `clear`; `None` when the word is used as an expression
    fn parse_command(&mut self) -> Result<Option<Stmt>, CompileError> {
        let start = self.pos;
        let name = self.expect_ident("command")?;

        let ends_statement = match self.current() {
            None => true,
            Some(token) => {
                !self.on_same_line() || token.closes_block() || *token == Token::Semicolon
            }
        };
        if ends_statement {
            return Ok(Some(Stmt::Expr(Expr::call(&name, Vec::new()))));
        }

        let takes_arguments = self.current().is_some_and(|token| {
            token.starts_expression() && !matches!(token, Token::OpenParen | Token::OpenBracket)
        });
        if !takes_arguments {
            self.pos = start;
            return Ok(None);
        }

        let mut args = vec![self.parse_expression()?];
        while self.eat(&Token::Comma) {
            args.push(self.parse_expression()?);
        }
        Ok(Some(Stmt::Expr(Expr::call(&name, args))))
    }

    fn parse_let(&mut self) -> Result<Stmt, CompileError> {
        let constant = matches!(self.advance(), Some(Token::Const));
        let name = self.expect_ident("variable name")?;
        let value = if self.eat(&Token::Assign) {
            Some(self.parse_expression()?)
        } else {
            None
        };
        Ok(Stmt::Let {
            name,
            value,
            constant,
        })
    }

    fn parse_fn_def(&mut self) -> Result<Stmt, CompileError> {
        self.expect(Token::Fn)?;
        let name = self.expect_ident("function name")?;
        let params = self.parse_params()?;
        let body = self.parse_block()?;
        Ok(Stmt::FnDef(Arc::new(FunctionDef {
            name: Some(name),
            params,
            body,
        })))
    }

    fn parse_params(&mut self) -> Result<Vec<String>, CompileError> {
        self.expect(Token::OpenParen)?;
        let mut params = Vec::new();
        if self.eat(&Token::CloseParen) {
            return Ok(params);
        }
        loop {
            params.push(self.expect_ident("parameter name")?);
            if self.eat(&Token::CloseParen) {
                return Ok(params);
            }
            self.expect(Token::Comma)?;
        }
    }

    fn parse_if(&mut self) -> Result<Stmt, CompileError> {
        self.expect(Token::If)?;
        let mut branches = vec![(self.parse_expression()?, self.parse_block()?)];
        let mut otherwise = None;

        loop {
            if self.eat(&Token::Elif) {
                branches.push((self.parse_expression()?, self.parse_block()?));
            } else if self.check(&Token::Else) && self.peek(1) == Some(&Token::If) {
                self.pos += 2;
                branches.push((self.parse_expression()?, self.parse_block()?));
            } else if self.eat(&Token::Else) {
                otherwise = Some(self.parse_block()?);
                break;
            } else {
                break;
            }
        }

        Ok(Stmt::If {
            branches,
            otherwise,
        })
    }

    fn parse_for(&mut self) -> Result<Stmt, CompileError> {
        self.expect(Token::For)?;
        let var = self.expect_ident("loop variable")?;
        self.expect(Token::In)?;
        let first = self.parse_expression()?;

        if self.eat(&Token::DotDot) {
            let end = self.parse_expression()?;
            let body = self.parse_block()?;
            return Ok(Stmt::ForRange {
                var,
                start: first,
                end,
                body,
            });
        }

        let body = self.parse_block()?;
        Ok(Stmt::ForEach {
            var,
            iterable: first,
            body,
        })
    }

    fn parse_while(&mut self) -> Result<Stmt, CompileError> {
        self.expect(Token::While)?;
        let condition = self.parse_expression()?;
        let body = self.parse_block()?;
        Ok(Stmt::While { condition, body })
    }

    fn parse_try(&mut self) -> Result<Stmt, CompileError> {
        self.expect(Token::Try)?;
        let body = self.parse_block()?;
        self.expect(Token::Catch)?;
        let handler = self.parse_block()?;
        Ok(Stmt::Try { body, handler })
    }

    fn parse_return(&mut self) -> Result<Stmt, CompileError> {
        self.expect(Token::Return)?;
        let has_value = self.on_same_line()
            && self
                .current()
                .is_some_and(|token| token.starts_expression());
        let value = if has_value {
            Some(self.parse_expression()?)
        } else {
            None
        };
        Ok(Stmt::Return(value))
    }

    fn parse_expression_statement(&mut self) -> Result<Stmt, CompileError> {
        let line = self.line();
        let expr = self.parse_expression()?;

        if self.eat(&Token::Assign) {
            if !matches!(expr, Expr::Ident(_) | Expr::Member { .. } | Expr::Index { .. }) {
                return Err(CompileError::at_line(line, "Invalid assignment target"));
            }
            let value = self.parse_expression()?;
            return Ok(Stmt::Assign {
                target: expr,
                value,
            });
        }

        Ok(Stmt::Expr(expr))
    }

    /// Parse an expression
    pub fn parse_expression(&mut self) -> Result<Expr, CompileError> {
        self.parse_or()
    }

    fn binary_level(
        &mut self,
        next: fn(&mut Self) -> Result<Expr, CompileError>,
        operator: fn(&Token) -> Option<BinaryOp>,
    ) -> Result<Expr, CompileError> {
        let mut left = next(self)?;
        while let Some(op) = self.current().and_then(operator) {
            self.pos += 1;
            let right = next(self)?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_or(&mut self) -> Result<Expr, CompileError> {
        self.binary_level(Self::parse_and, |token| match token {
            Token::OrOr => Some(BinaryOp::Or),
            _ => None,
        })
    }

    fn parse_and(&mut self) -> Result<Expr, CompileError> {
        self.binary_level(Self::parse_equality, |token| match token {
            Token::AndAnd => Some(BinaryOp::And),
            _ => None,
        })
    }

    fn parse_equality(&mut self) -> Result<Expr, CompileError> {
        self.binary_level(Self::parse_comparison, |token| match token {
            Token::Eq => Some(BinaryOp::Eq),
            Token::NotEq => Some(BinaryOp::NotEq),
            _ => None,
        })
    }

    fn parse_comparison(&mut self) -> Result<Expr, CompileError> {
        self.binary_level(Self::parse_additive, |token| match token {
            Token::Lt => Some(BinaryOp::Lt),
            Token::LtEq => Some(BinaryOp::LtEq),
            Token::Gt => Some(BinaryOp::Gt),
            Token::GtEq => Some(BinaryOp::GtEq),
            _ => None,
        })
    }

    fn parse_additive(&mut self) -> Result<Expr, CompileError> {
        self.binary_level(Self::parse_multiplicative, |token| match token {
            Token::Plus => Some(BinaryOp::Add),
            Token::Minus => Some(BinaryOp::Sub),
            _ => None,
        })
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, CompileError> {
        self.binary_level(Self::parse_unary, |token| match token {
            Token::Star => Some(BinaryOp::Mul),
            Token::Slash => Some(BinaryOp::Div),
            Token::Percent => Some(BinaryOp::Rem),
            _ => None,
        })
    }

    fn parse_unary(&mut self) -> Result<Expr, CompileError> {
        let op = match self.current() {
            Some(Token::Bang) => UnaryOp::Not,
            Some(Token::Minus) => UnaryOp::Neg,
            Some(Token::Await) => {
                self.pos += 1;
                return self.parse_unary();
            }
            _ => return self.parse_postfix(),
        };
        self.pos += 1;
        let operand = self.parse_unary()?;
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    fn parse_postfix(&mut self) -> Result<Expr, CompileError> {
        let mut expr = self.parse_primary()?;

        loop {
            match self.current() {
                Some(Token::Dot) => {
                    self.pos += 1;
                    let property = self.expect_ident("property name")?;
                    expr = Expr::Member {
                        object: Box::new(expr),
                        property,
                    };
                }
                Some(Token::OpenParen) if self.on_same_line() => {
                    self.pos += 1;
                    let args = self.parse_call_args()?;
                    expr = Expr::Call {
                        callee: Box::new(expr),
                        args,
                    };
                }
                Some(Token::OpenBracket) if self.on_same_line() => {
                    self.pos += 1;
                    let index = self.parse_expression()?;
                    self.expect(Token::CloseBracket)?;
                    expr = Expr::Index {
                        object: Box::new(expr),
                        index: Box::new(index),
                    };
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_call_args(&mut self) -> Result<Vec<Expr>, CompileError> {
        let mut args = Vec::new();
        if self.eat(&Token::CloseParen) {
            return Ok(args);
        }
        loop {
            args.push(self.parse_expression()?);
            if self.eat(&Token::CloseParen) {
                return Ok(args);
            }
            self.expect(Token::Comma)?;
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, CompileError> {
        let line = self.line();
        let Some(token) = self.current().cloned() else {
            return Err(self.unexpected("expected an expression"));
        };

        match token {
            Token::Number(n) => {
                self.pos += 1;
                Ok(Expr::Number(n))
            }
            Token::Str(raw) => {
                self.pos += 1;
                self.string_literal(&raw, line)
            }
            Token::True => {
                self.pos += 1;
                Ok(Expr::Bool(true))
            }
            Token::False => {
                self.pos += 1;
                Ok(Expr::Bool(false))
            }
            Token::Nil => {
                self.pos += 1;
                Ok(Expr::Nil)
            }
            Token::Ident(name) => {
                if self.peek(1) == Some(&Token::FatArrow) {
                    self.pos += 2;
                    return self.lambda_body(vec![name]);
                }
                self.pos += 1;
                Ok(Expr::Ident(name))
            }
            Token::Fn => {
                self.pos += 1;
                let params = self.parse_params()?;
                self.eat(&Token::FatArrow);
                self.lambda_body(params)
            }
            Token::OpenParen if self.is_arrow_params() => {
                let params = self.parse_params()?;
                self.expect(Token::FatArrow)?;
                self.lambda_body(params)
            }
            Token::OpenParen => {
                self.pos += 1;
                let expr = self.parse_expression()?;
                self.expect(Token::CloseParen)?;
                Ok(expr)
            }
            Token::OpenBracket => {
                self.pos += 1;
                let mut items = Vec::new();
                while !self.check(&Token::CloseBracket) {
                    items.push(self.parse_expression()?);
                    if !self.eat(&Token::Comma) {
                        break;
                    }
                }
                self.expect(Token::CloseBracket)?;
                Ok(Expr::Array(items))
            }
            _ => Err(self.unexpected("expected an expression")),
        }
    }

    /// Look ahead from `(` for `(a, b) =>`
    fn is_arrow_params(&self) -> bool {
        let mut offset = 1;
        let mut expect_ident = true;
        loop {
            match self.peek(offset) {
                Some(Token::CloseParen) => {
                    return self.peek(offset + 1) == Some(&Token::FatArrow);
                }
                Some(Token::Ident(_)) if expect_ident => expect_ident = false,
                Some(Token::Comma) if !expect_ident => expect_ident = true,
                _ => return false,
            }
            offset += 1;
        }
    }

    fn lambda_body(&mut self, params: Vec<String>) -> Result<Expr, CompileError> {
        let body = if self.check(&Token::OpenBrace) {
            self.parse_block()?
        } else {
            vec![Stmt::Return(Some(self.parse_expression()?))]
        };
        Ok(Expr::Lambda(Arc::new(FunctionDef {
            name: None,
            params,
            body,
        })))
    }

    fn string_literal(&self, raw: &str, line: usize) -> Result<Expr, CompileError> {
        if !self.interpolate {
            return Ok(Expr::Str(unescape(raw)));
        }

        let parts = split_template(raw, line)?;
        match parts.as_slice() {
            [] => Ok(Expr::Str(String::new())),
            [TemplatePart::Literal(text)] => Ok(Expr::Str(text.clone())),
            _ => Ok(Expr::Template(parts)),
        }
    }
}

/// Split a raw string literal into literal text and `{expr}` segments
///
/// `\{` produces a literal brace. An unmatched `{` is kept as text. A `{`
/// inside an open segment is rejected: nested interpolation is unsupported.
fn split_template(raw: &str, line: usize) -> Result<Vec<TemplatePart>, CompileError> {
    let mut parts = Vec::new();
    let mut literal = String::new();
    let mut rest = raw;

    while let Some(idx) = rest.find(['{', '\\']) {
        let (before, tail) = rest.split_at(idx);
        literal.push_str(before);

        if let Some(escaped) = tail.strip_prefix('\\') {
            let mut chars = escaped.chars();
            match chars.next() {
                Some(brace @ ('{' | '}')) => literal.push_str(&format!("\\u{{{:x}}}", brace as u32)),
                Some(other) => {
                    literal.push('\\');
                    literal.push(other);
                }
                None => literal.push('\\'),
            }
            rest = chars.as_str();
            continue;
        }

        let inner_and_tail = &tail[1..];
        let Some(close) = inner_and_tail.find('}') else {
            literal.push_str(tail);
            rest = "";
            break;
        };

        let inner = &inner_and_tail[..close];
        if inner.contains('{') {
            return Err(CompileError::at_line(
                line,
                "Nested braces inside string interpolation are not supported",
            ));
        }

        if inner.trim().is_empty() {
            literal.push_str("{}");
        } else {
            let expr = parse_expression(inner, false).map_err(|err| {
                CompileError::at_line(line, format!("in interpolation {{{inner}}}: {}", err.reason))
            })?;
            if !literal.is_empty() {
                parts.push(TemplatePart::Literal(unescape(&literal)));
                literal.clear();
            }
            parts.push(TemplatePart::Expr(expr));
        }
        rest = &inner_and_tail[close + 1..];
    }

    literal.push_str(rest);
    if !literal.is_empty() {
        parts.push(TemplatePart::Literal(unescape(&literal)));
    }
    Ok(parts)
}

/// Resolve backslash escapes in a raw string literal
pub fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some('u') => {
                // \u{7b}
                let rest = chars.as_str();
                let decoded = rest
                    .strip_prefix('{')
                    .and_then(|body| body.split_once('}'))
                    .and_then(|(hex, after)| {
                        let ch = char::from_u32(u32::from_str_radix(hex, 16).ok()?)?;
                        Some((ch, after))
                    });
                match decoded {
                    Some((decoded, after)) => {
                        out.push(decoded);
                        chars = after.chars();
                    }
                    None => out.push('u'),
                }
            }
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}
