//! Tokenizer for the advanced automation dialect
//!
//! Tokens are produced by a logos lexer. Whitespace, newlines and both comment
//! styles (`--` and `//`) are skipped; line numbers are recovered from spans
//! so the parser can still tell whether two tokens share a line.

use std::fmt;
use std::ops::Range;

use logos::Logos;

use super::error::CompileError;

/// All tokens of the advanced dialect
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n\f]+|--[^\n]*|//[^\n]*")]
pub enum Token {
    // Keywords
    #[token("let")]
    Let,
    #[token("const")]
    Const,
    #[token("fn")]
    #[token("function")]
    Fn,
    #[token("return")]
    Return,
    #[token("if")]
    If,
    #[token("elif")]
    Elif,
    #[token("else")]
    Else,
    #[token("for")]
    For,
    #[token("in")]
    In,
    #[token("while")]
    While,
    #[token("try")]
    Try,
    #[token("catch")]
    Catch,
    #[token("throw")]
    Throw,
    #[token("break")]
    Break,
    #[token("continue")]
    Continue,
    #[token("await")]
    Await,
    // `end` closes a block exactly like `}`
    #[token("end")]
    End,
    #[token("true")]
    True,
    #[token("false")]
    False,
    #[token("nil")]
    #[token("null")]
    Nil,

    // Delimiters
    #[token("(")]
    OpenParen,
    #[token(")")]
    CloseParen,
    #[token("{")]
    OpenBrace,
    #[token("}")]
    CloseBrace,
    #[token("[")]
    OpenBracket,
    #[token("]")]
    CloseBracket,
    #[token(",")]
    Comma,
    #[token(";")]
    Semicolon,
    #[token(":")]
    Colon,
    #[token(".")]
    Dot,
    #[token("..")]
    DotDot,

    // Operators
    #[token("=>")]
    FatArrow,
    #[token("=")]
    Assign,
    #[token("==")]
    #[token("===")]
    Eq,
    #[token("!=")]
    #[token("!==")]
    NotEq,
    #[token("<")]
    Lt,
    #[token("<=")]
    LtEq,
    #[token(">")]
    Gt,
    #[token(">=")]
    GtEq,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("!")]
    Bang,
    #[token("&&")]
    #[token("and")]
    AndAnd,
    #[token("||")]
    #[token("or")]
    OrOr,

    // Literals
    #[regex(r"[0-9]+(\.[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    Number(f64),
    #[regex(r#""([^"\\\n]|\\.)*""#, strip_quotes)]
    #[regex(r#"'([^'\\\n]|\\.)*'"#, strip_quotes)]
    Str(String),
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),
}

fn strip_quotes(lex: &mut logos::Lexer<'_, Token>) -> String {
    let slice = lex.slice();
    slice[1..slice.len() - 1].to_string()
}

impl Token {
    /// Whether this token can begin an expression
    pub fn starts_expression(&self) -> bool {
        matches!(
            self,
            Token::Number(_)
                | Token::Str(_)
                | Token::Ident(_)
                | Token::True
                | Token::False
                | Token::Nil
                | Token::Fn
                | Token::Await
                | Token::OpenParen
                | Token::OpenBracket
                | Token::Minus
                | Token::Bang
        )
    }

    /// Whether this token closes a block
    pub fn closes_block(&self) -> bool {
        matches!(self, Token::CloseBrace | Token::End)
    }
}

impl Token {
    fn symbol(&self) -> &'static str {
        match self {
            Token::Let => "let",
            Token::Const => "const",
            Token::Fn => "fn",
            Token::Return => "return",
            Token::If => "if",
            Token::Elif => "elif",
            Token::Else => "else",
            Token::For => "for",
            Token::In => "in",
            Token::While => "while",
            Token::Try => "try",
            Token::Catch => "catch",
            Token::Throw => "throw",
            Token::Break => "break",
            Token::Continue => "continue",
            Token::Await => "await",
            Token::End => "end",
            Token::True => "true",
            Token::False => "false",
            Token::Nil => "nil",
            Token::OpenParen => "(",
            Token::CloseParen => ")",
            Token::OpenBrace => "{",
            Token::CloseBrace => "}",
            Token::OpenBracket => "[",
            Token::CloseBracket => "]",
            Token::Comma => ",",
            Token::Semicolon => ";",
            Token::Colon => ":",
            Token::Dot => ".",
            Token::DotDot => "..",
            Token::FatArrow => "=>",
            Token::Assign => "=",
            Token::Eq => "==",
            Token::NotEq => "!=",
            Token::Lt => "<",
            Token::LtEq => "<=",
            Token::Gt => ">",
            Token::GtEq => ">=",
            Token::Plus => "+",
            Token::Minus => "-",
            Token::Star => "*",
            Token::Slash => "/",
            Token::Percent => "%",
            Token::Bang => "!",
            Token::AndAnd => "&&",
            Token::OrOr => "||",
            Token::Number(_) => "number",
            Token::Str(_) => "string",
            Token::Ident(_) => "identifier",
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number(n) => write!(f, "number {n}"),
            Token::Str(s) => write!(f, "string \"{s}\""),
            Token::Ident(name) => write!(f, "'{name}'"),
            other => write!(f, "'{}'", other.symbol()),
        }
    }
}

/// A token with its byte span and 1-based line number
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub span: Range<usize>,
    pub line: usize,
}

/// Tokenize `source`, failing on the first character no token accepts
pub fn tokenize(source: &str) -> Result<Vec<Spanned>, CompileError> {
    let mut lexer = Token::lexer(source);
    let mut tokens = Vec::new();
    let mut line = 1;
    let mut counted_to = 0;

    while let Some(result) = lexer.next() {
        let span = lexer.span();
        line += source[counted_to..span.start].matches('\n').count();
        counted_to = span.start;

        match result {
            Ok(token) => tokens.push(Spanned { token, span, line }),
            Err(()) => {
                let snippet = lexer.slice();
                let reason = if snippet.starts_with('"') || snippet.starts_with('\'') {
                    "Unterminated string literal".to_string()
                } else {
                    format!("Unexpected character '{snippet}'")
                };
                return Err(CompileError::at_line(line, reason));
            }
        }
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|spanned| spanned.token)
            .collect()
    }

    #[test]
    fn test_keywords_and_identifiers() {
        assert_eq!(
            kinds("let letter = nil"),
            vec![
                Token::Let,
                Token::Ident("letter".into()),
                Token::Assign,
                Token::Nil
            ]
        );
        assert_eq!(kinds("function fn"), vec![Token::Fn, Token::Fn]);
    }

    #[test]
    fn test_range_is_not_a_float() {
        assert_eq!(
            kinds("1..5 2.5"),
            vec![
                Token::Number(1.0),
                Token::DotDot,
                Token::Number(5.0),
                Token::Number(2.5)
            ]
        );
    }

    #[test]
    fn test_comments_are_skipped() {
        assert_eq!(
            kinds("print x -- trailing\n// whole line\nend"),
            vec![Token::Ident("print".into()), Token::Ident("x".into()), Token::End]
        );
    }

    #[test]
    fn test_strings_keep_raw_contents() {
        assert_eq!(
            kinds(r#""a {b}" 'c\'d'"#),
            vec![Token::Str("a {b}".into()), Token::Str(r"c\'d".into())]
        );
    }

    #[test]
    fn test_line_numbers() {
        let tokens = tokenize("a\n\nb c\nd").unwrap();
        let lines: Vec<_> = tokens.iter().map(|t| t.line).collect();
        assert_eq!(lines, vec![1, 3, 3, 4]);
    }

    #[test]
    fn test_unexpected_character() {
        let err = tokenize("let x = 1\nlet y = #").unwrap_err();
        assert!(err.reason.contains("Unexpected character '#'"));
        assert!(err.reason.contains("line 2"));
    }

    #[test]
    fn test_unterminated_string() {
        let err = tokenize("print \"oops").unwrap_err();
        assert!(err.reason.contains("Unterminated string"));
    }
}
