//! Token classification.
//!
//! The lexer drives a [`CharScanner`] and cuts the stream into tokens. Each
//! token class is recognised by a small nom parser over the unread text; the
//! scanner is then advanced over the recognised code points so positions and
//! forbidden-character checks stay exact.
//!
//! Every token except a parenthesis must end on a boundary: whitespace, `(`,
//! `)` or end of input. A token that runs into anything else is reported as
//! [`TokenKind::Invalid`] carrying the run plus the offending code point.

use std::fmt;

use nom::{
    IResult, Parser,
    bytes::complete::{take_while, take_while1},
    character::complete::{char, digit1, satisfy},
    combinator::{opt, recognize},
    sequence::pair,
};
use tracing::trace;

use crate::Error;
use crate::scanner::{CharScanner, Position};

/// Characters that make up operator tokens
pub const OPERATOR_CHARS: &str = "-+/*&^%!|<>=";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    OpenParen,
    CloseParen,
    Identifier,
    Operator,
    Number,
    /// String literal; the token text keeps its quotes
    String,
    Invalid,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub pos: Position,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.text)
    }
}

fn is_operator_char(c: char) -> bool {
    OPERATOR_CHARS.contains(c)
}

fn is_boundary(c: Option<char>) -> bool {
    match c {
        None => true,
        Some(c) => c.is_whitespace() || c == '(' || c == ')',
    }
}

fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        satisfy(char::is_alphabetic),
        take_while(char::is_alphanumeric),
    ))
    .parse(input)
}

/// `-?[0-9]+(\.[0-9]+)?`
fn number(input: &str) -> IResult<&str, &str> {
    recognize((opt(char('-')), digit1, opt(pair(char('.'), digit1)))).parse(input)
}

fn operator(input: &str) -> IResult<&str, &str> {
    take_while1(is_operator_char).parse(input)
}

/// Opening quote and everything up to (not including) the closing quote,
/// a newline, or end of input.
fn string_body(input: &str) -> IResult<&str, &str> {
    recognize(pair(char('"'), take_while(|c: char| c != '"' && c != '\n'))).parse(input)
}

/// Classify the token starting at `input` and return its byte length.
/// `input` is never empty.
fn scan_run(input: &str) -> (TokenKind, usize) {
    let mut chars = input.chars();
    let Some(first) = chars.next() else {
        return (TokenKind::Invalid, 0);
    };
    let second = chars.next();

    let recognized = match first {
        '(' => return (TokenKind::OpenParen, 1),
        ')' => return (TokenKind::CloseParen, 1),
        '"' => {
            return match string_body(input) {
                Ok((rest, body)) if rest.starts_with('"') => (TokenKind::String, body.len() + 1),
                Ok((_, body)) => (TokenKind::Invalid, body.len()),
                Err(_) => (TokenKind::Invalid, first.len_utf8()),
            };
        }
        '-' if second.is_some_and(|c| c.is_ascii_digit()) => {
            number(input).map(|(_, run)| (TokenKind::Number, run))
        }
        c if is_operator_char(c) => operator(input).map(|(_, run)| (TokenKind::Operator, run)),
        c if c.is_ascii_digit() => number(input).map(|(_, run)| (TokenKind::Number, run)),
        c if c.is_alphabetic() => identifier(input).map(|(_, run)| (TokenKind::Identifier, run)),
        _ => return (TokenKind::Invalid, first.len_utf8()),
    };

    match recognized {
        Ok((kind, run)) => (kind, run.len()),
        Err(_) => (TokenKind::Invalid, first.len_utf8()),
    }
}

/// Produces tokens from source text one at a time.
pub struct Lexer<'a> {
    scanner: CharScanner<'a>,
    finished: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(file: &str, source: &'a str) -> Self {
        let mut scanner = CharScanner::new(file, source);
        scanner.advance();
        Lexer {
            scanner,
            finished: false,
        }
    }

    /// Position of the last code point the scanner reached.
    pub fn position(&self) -> Position {
        self.scanner.position()
    }

    /// Read the next token, or `None` at end of input.
    pub fn next_token(&mut self) -> Result<Option<Token>, Error> {
        if self.finished {
            return Ok(None);
        }
        let result = self.read_token();
        if !matches!(result, Ok(Some(_))) {
            self.finished = true;
        }
        result
    }

    fn read_token(&mut self) -> Result<Option<Token>, Error> {
        self.skip_trivia();
        self.check_scanner()?;
        if self.scanner.current().is_none() {
            return Ok(None);
        }

        let pos = self.scanner.position();
        let input = self.scanner.remaining();
        let (mut kind, mut len) = scan_run(input);

        let parens = matches!(kind, TokenKind::OpenParen | TokenKind::CloseParen);
        if kind != TokenKind::Invalid && !parens {
            let next = input[len..].chars().next();
            if !is_boundary(next) {
                kind = TokenKind::Invalid;
                len += next.map_or(0, char::len_utf8);
            }
        }

        let text = &input[..len];
        for _ in text.chars() {
            self.scanner.advance();
            self.check_scanner()?;
        }

        let token = Token {
            kind,
            text: text.to_owned(),
            pos,
        };
        trace!(kind = ?token.kind, text = %token.text, pos = %token.pos, "token");
        Ok(Some(token))
    }

    /// Skip whitespace and `;` line comments.
    fn skip_trivia(&mut self) {
        let mut in_comment = false;
        while let Some(c) = self.scanner.current() {
            match c {
                '\n' => in_comment = false,
                ';' => in_comment = true,
                c if in_comment || c.is_whitespace() => {}
                _ => break,
            }
            self.scanner.advance();
        }
    }

    fn check_scanner(&self) -> Result<(), Error> {
        match self.scanner.error() {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }
}

impl Iterator for Lexer<'_> {
    type Item = Result<Token, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_token().transpose()
    }
}

/// Tokenize a whole source. Stops after the first invalid token, which is
/// included in the result.
pub fn tokenize(file: &str, source: &str) -> Result<Vec<Token>, Error> {
    let mut tokens = Vec::new();
    for token in Lexer::new(file, source) {
        let token = token?;
        let invalid = token.kind == TokenKind::Invalid;
        tokens.push(token);
        if invalid {
            break;
        }
    }
    Ok(tokens)
}
