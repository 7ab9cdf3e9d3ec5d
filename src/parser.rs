//! Recursive-descent parser.
//!
//! A parenthesised form whose first token is the identifier `if`, `fn` or
//! `let` is a special form with its own grammar; every other form is a call.
//! Operator tokens are resolved to built-ins here, so an unknown operator is
//! a parse error rather than a runtime one.

use tracing::debug;

use crate::ast::Expr;
use crate::builtinops::find_operator;
use crate::lexer::{Lexer, Token, TokenKind};
use crate::scanner::Position;
use crate::{Error, MAX_PARSE_DEPTH, ParseError, ParseErrorKind};

/// Parse a whole source into its top-level expressions.
pub fn parse(file: &str, source: &str) -> Result<Vec<Expr>, Error> {
    let mut parser = Parser::new(file, source);
    let exprs = parser.parse_program()?;
    debug!(file, count = exprs.len(), "parsed source");
    Ok(exprs)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SpecialForm {
    If,
    Fn,
    Let,
}

impl SpecialForm {
    fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "if" => Some(SpecialForm::If),
            "fn" => Some(SpecialForm::Fn),
            "let" => Some(SpecialForm::Let),
            _ => None,
        }
    }
}

fn token_error(kind: ParseErrorKind, message: impl Into<String>, token: &Token) -> Error {
    ParseError::new(kind, message, Some(token.text.clone()), token.pos.clone()).into()
}

fn form_error(message: impl Into<String>, pos: &Position) -> Error {
    ParseError::at(ParseErrorKind::MalformedSpecialForm, message, pos.clone()).into()
}

struct Parser<'a> {
    lexer: Lexer<'a>,
    peeked: Option<Token>,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn new(file: &str, source: &'a str) -> Self {
        Parser {
            lexer: Lexer::new(file, source),
            peeked: None,
            depth: 0,
        }
    }

    fn next(&mut self) -> Result<Option<Token>, Error> {
        match self.peeked.take() {
            Some(token) => Ok(Some(token)),
            None => self.lexer.next_token(),
        }
    }

    fn peek(&mut self) -> Result<Option<&Token>, Error> {
        if self.peeked.is_none() {
            self.peeked = self.lexer.next_token()?;
        }
        Ok(self.peeked.as_ref())
    }

    fn unexpected_eof(&self) -> Error {
        ParseError::at(
            ParseErrorKind::UnexpectedEof,
            "unexpected end of input",
            self.lexer.position(),
        )
        .into()
    }

    fn parse_program(&mut self) -> Result<Vec<Expr>, Error> {
        let mut exprs = Vec::new();
        while let Some(token) = self.next()? {
            exprs.push(self.parse_expr(token)?);
        }
        Ok(exprs)
    }

    fn parse_expr(&mut self, token: Token) -> Result<Expr, Error> {
        let pos = token.pos.clone();
        match token.kind {
            TokenKind::OpenParen => self.parse_form(pos),
            TokenKind::CloseParen => Err(token_error(
                ParseErrorKind::UnexpectedToken,
                "unbalanced close paren",
                &token,
            )),
            TokenKind::Identifier => Ok(match token.text.as_str() {
                "true" => Expr::Bool { value: true, pos },
                "false" => Expr::Bool { value: false, pos },
                "nil" => Expr::Nil { pos },
                _ => Expr::Identifier {
                    name: token.text,
                    pos,
                },
            }),
            TokenKind::Number => match token.text.parse::<f64>() {
                // literals must be finite so their code string reads back as a number
                Ok(value) if value.is_finite() => Ok(Expr::Number { value, pos }),
                Ok(_) => Err(token_error(
                    ParseErrorKind::InvalidToken,
                    "number out of range",
                    &token,
                )),
                Err(_) => Err(token_error(
                    ParseErrorKind::InvalidToken,
                    "malformed number",
                    &token,
                )),
            },
            TokenKind::String => {
                let value = token
                    .text
                    .strip_prefix('"')
                    .and_then(|s| s.strip_suffix('"'))
                    .map(str::to_owned);
                match value {
                    Some(value) => Ok(Expr::String { value, pos }),
                    None => Err(token_error(
                        ParseErrorKind::InvalidToken,
                        "malformed string",
                        &token,
                    )),
                }
            }
            TokenKind::Operator => match find_operator(&token.text) {
                Some(op) => Ok(Expr::FunctionLiteral { op, pos }),
                None => Err(token_error(
                    ParseErrorKind::UnrecognizedOperator,
                    "unrecognized operator",
                    &token,
                )),
            },
            TokenKind::Invalid => Err(token_error(
                ParseErrorKind::InvalidToken,
                "invalid token",
                &token,
            )),
        }
    }

    /// Parse a form whose open paren is at `pos` and has been consumed.
    fn parse_form(&mut self, pos: Position) -> Result<Expr, Error> {
        if self.depth >= MAX_PARSE_DEPTH {
            return Err(ParseError::at(
                ParseErrorKind::TooDeeplyNested,
                format!("expression too deeply nested (max depth: {MAX_PARSE_DEPTH})"),
                pos,
            )
            .into());
        }
        self.depth += 1;
        let result = self.parse_form_contents(pos);
        self.depth -= 1;
        result
    }

    fn parse_form_contents(&mut self, pos: Position) -> Result<Expr, Error> {
        let special = match self.peek()? {
            Some(token) if token.kind == TokenKind::Identifier => {
                SpecialForm::from_keyword(&token.text)
            }
            _ => None,
        };

        let Some(form) = special else {
            let exprs = self.parse_until_close()?;
            return Ok(Expr::Call { exprs, pos });
        };

        // drop the keyword
        self.next()?;
        match form {
            SpecialForm::If => self.parse_if(pos),
            SpecialForm::Fn => self.parse_fn(pos),
            SpecialForm::Let => self.parse_let(pos),
        }
    }

    /// Parse expressions up to and including the matching close paren.
    fn parse_until_close(&mut self) -> Result<Vec<Expr>, Error> {
        let mut exprs = Vec::new();
        loop {
            match self.next()? {
                None => return Err(self.unexpected_eof()),
                Some(token) if token.kind == TokenKind::CloseParen => return Ok(exprs),
                Some(token) => exprs.push(self.parse_expr(token)?),
            }
        }
    }

    fn parse_if(&mut self, pos: Position) -> Result<Expr, Error> {
        let exprs = self.parse_until_close()?;
        if exprs.is_empty() {
            return Err(form_error("if statement must have a condition", &pos));
        }
        if exprs.len() > 3 {
            return Err(form_error(
                format!(
                    "if statement can have no more than 3 expressions, got {}",
                    exprs.len()
                ),
                &pos,
            ));
        }

        // missing branches evaluate to nil
        let mut parts = exprs.into_iter();
        let mut next_part = || {
            Box::new(
                parts
                    .next()
                    .unwrap_or_else(|| Expr::Nil { pos: pos.clone() }),
            )
        };
        let condition = next_part();
        let then_branch = next_part();
        let else_branch = next_part();
        Ok(Expr::If {
            condition,
            then_branch,
            else_branch,
            pos,
        })
    }

    fn parse_fn(&mut self, pos: Position) -> Result<Expr, Error> {
        let params = match self.next()? {
            None => return Err(self.unexpected_eof()),
            Some(token) if token.kind == TokenKind::OpenParen => self.parse_params()?,
            Some(token) => {
                return Err(token_error(
                    ParseErrorKind::MalformedSpecialForm,
                    "fn expects a parenthesized parameter list",
                    &token,
                ));
            }
        };
        let body = self.parse_until_close()?;
        Ok(Expr::Fn {
            params,
            body: body.into(),
            pos,
        })
    }

    fn parse_params(&mut self) -> Result<Vec<String>, Error> {
        let mut params = Vec::new();
        loop {
            match self.next()? {
                None => return Err(self.unexpected_eof()),
                Some(token) => match token.kind {
                    TokenKind::CloseParen => return Ok(params),
                    TokenKind::Identifier => params.push(token.text),
                    _ => {
                        return Err(token_error(
                            ParseErrorKind::MalformedSpecialForm,
                            "fn parameters can only be identifiers",
                            &token,
                        ));
                    }
                },
            }
        }
    }

    fn parse_let(&mut self, pos: Position) -> Result<Expr, Error> {
        let exprs = self.parse_until_close()?;
        let [target, value] = match <[Expr; 2]>::try_from(exprs) {
            Ok(pair) => pair,
            Err(exprs) => {
                return Err(form_error(
                    format!("let expects 2 arguments, got {}", exprs.len()),
                    &pos,
                ));
            }
        };
        match target {
            Expr::Identifier { name, .. } => Ok(Expr::Let {
                name,
                value: Box::new(value),
                pos,
            }),
            other => Err(form_error(
                "let expects an identifier as its first argument",
                other.pos(),
            )),
        }
    }
}
