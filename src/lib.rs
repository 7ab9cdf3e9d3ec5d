//! minilisp - a small s-expression language
//!
//! This crate implements a complete pipeline for a minimal Lisp dialect:
//! a character scanner with source positions, a lexer, a recursive-descent
//! parser that recognises the `if`, `fn` and `let` special forms, and a
//! tree-walking evaluator with lexically scoped closures.
//!
//! ```scheme
//! ; numbers are 64-bit floats
//! (let double (fn (x) (* x 2)))
//! (double 21)                           ; 42
//! (listMap (list 1 2 3) double)         ; [2 4 6]
//! (if (== 1 2) "same" "different")      ; "different"
//! ```
//!
//! ## Strict typing
//!
//! No value is ever coerced into another kind: conditions must be booleans,
//! arithmetic only accepts numbers, and every built-in validates the shape of
//! its arguments before doing any work.
//!
//! ## Modules
//!
//! - `scanner`: code point stream with file/row/column tracking
//! - `lexer`: token classification and boundary rules
//! - `parser`: special-form aware recursive descent
//! - `ast`: expression tree and runtime values
//! - `evaluator`: environments, closures and evaluation
//! - `builtinops`: the read-only built-in library

use std::fmt;

use crate::ast::ValueType;
use crate::scanner::Position;

/// Maximum nesting of parenthesised forms accepted by the parser
pub const MAX_PARSE_DEPTH: usize = 64;

/// Maximum nesting of call evaluations on one thread
///
/// Built-in calls count as well as user functions, so a function recursing
/// through one built-in reaches about half this many levels. The evaluator
/// grows its stack on the heap as it goes; this bound stops runaway
/// recursion.
pub const MAX_EVAL_DEPTH: usize = 10_000;

/// Categorizes the different kinds of parsing errors.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ParseErrorKind {
    /// The lexer could not classify a run of characters
    InvalidToken,
    /// A well-formed token showed up where the grammar does not allow it
    UnexpectedToken,
    /// An operator token that has no built-in behind it
    UnrecognizedOperator,
    /// `if`, `fn` or `let` with the wrong shape
    MalformedSpecialForm,
    /// Input ended before a form was closed
    UnexpectedEof,
    /// Nesting exceeded [`MAX_PARSE_DEPTH`]
    TooDeeplyNested,
}

/// A structured error providing detailed information about a parsing failure.
#[derive(Debug, PartialEq, Clone)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub message: String,
    /// Text of the offending token, if there was one
    pub token: Option<String>,
    /// Where the problem was detected; for EOF this is the last known position
    pub pos: Position,
}

impl ParseError {
    /// Create a ParseError with all fields
    pub fn new(
        kind: ParseErrorKind,
        message: impl Into<String>,
        token: Option<String>,
        pos: Position,
    ) -> Self {
        ParseError {
            kind,
            message: message.into(),
            token,
            pos,
        }
    }

    /// Create a ParseError that is not attached to a particular token
    pub fn at(kind: ParseErrorKind, message: impl Into<String>, pos: Position) -> Self {
        Self::new(kind, message, None, pos)
    }
}

/// Error types for the interpreter
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// The scanner met a code point that may not appear in source text
    ForbiddenCharacter { ch: char, pos: Position },
    ParseError(ParseError),
    TypeError {
        expected: ValueType,
        actual: ValueType,
        pos: Position,
    },
    EvalError {
        message: String,
        pos: Option<Position>,
    },
    /// Raised by the argument mapper while a built-in validates its arguments
    ArgumentError {
        function: String,
        index: usize,
        expected: String,
        actual: String,
    },
}

impl Error {
    /// Create an EvalError with no position; the calling expression supplies one later
    pub fn eval(message: impl Into<String>) -> Self {
        Error::EvalError {
            message: message.into(),
            pos: None,
        }
    }

    /// Create an EvalError at a known source position
    pub fn eval_at(message: impl Into<String>, pos: &Position) -> Self {
        Error::EvalError {
            message: message.into(),
            pos: Some(pos.clone()),
        }
    }

    pub fn argument(
        function: impl Into<String>,
        index: usize,
        expected: impl fmt::Display,
        actual: impl fmt::Display,
    ) -> Self {
        Error::ArgumentError {
            function: function.into(),
            index,
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// Attach a position to an EvalError that does not have one yet.
    /// All other errors are returned untouched.
    pub(crate) fn or_at(self, at: &Position) -> Self {
        match self {
            Error::EvalError { message, pos: None } => Error::EvalError {
                message,
                pos: Some(at.clone()),
            },
            other => other,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::ForbiddenCharacter { ch, pos } => {
                write!(f, "ForbiddenCharacter: {ch:?} is not allowed at {pos}")
            }
            Error::ParseError(e) => {
                write!(f, "ParseError: {}", e.message)?;
                if let Some(token) = &e.token {
                    write!(f, " for token `{token}`")?;
                }
                write!(f, " at {}", e.pos)
            }
            Error::TypeError {
                expected,
                actual,
                pos,
            } => write!(f, "Type error: expected {expected}, got {actual} at {pos}"),
            Error::EvalError { message, pos } => match pos {
                Some(pos) => write!(f, "EvaluationError: {message} at {pos}"),
                None => write!(f, "EvaluationError: {message}"),
            },
            Error::ArgumentError {
                function,
                index,
                expected,
                actual,
            } => write!(
                f,
                "ArgumentError: '{function}' argument {index}: expected {expected}, got {actual}"
            ),
        }
    }
}

impl std::error::Error for Error {}

impl From<ParseError> for Error {
    fn from(e: ParseError) -> Self {
        Error::ParseError(e)
    }
}

pub mod ast;
pub mod builtinops;
pub mod evaluator;
pub mod lexer;
pub mod parser;
pub mod scanner;
