//! Code point scanner with source positions.
//!
//! The scanner hands out one code point at a time together with the
//! file/row/column it was found at. Rows and columns are 1-based; a newline
//! belongs to the row it ends, and the code point after it starts the next
//! row at column 1. Multi-byte glyphs advance the column by exactly one.

use std::fmt;
use std::sync::Arc;

use crate::Error;

/// Code points that may never appear in source text
const FORBIDDEN: &[char] = &['\0'];

fn is_forbidden(c: char) -> bool {
    FORBIDDEN.contains(&c)
}

/// A location in a named source.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Position {
    pub file: Arc<str>,
    pub row: usize,
    pub col: usize,
}

impl Position {
    pub fn new(file: impl Into<Arc<str>>, row: usize, col: usize) -> Self {
        Position {
            file: file.into(),
            row,
            col,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.row, self.col)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum ScanState {
    /// `advance` has not been called yet
    Pending,
    Scanning,
    /// End of input reached; not an error
    Exhausted,
    /// A forbidden code point was met; terminal
    Failed(Error),
}

/// Streams the code points of a source string.
#[derive(Debug, Clone)]
pub struct CharScanner<'a> {
    file: Arc<str>,
    source: &'a str,
    /// Byte offset of `current` within `source`
    offset: usize,
    current: Option<char>,
    row: usize,
    col: usize,
    state: ScanState,
}

impl<'a> CharScanner<'a> {
    /// Create a scanner positioned before the first code point.
    pub fn new(file: impl Into<Arc<str>>, source: &'a str) -> Self {
        CharScanner {
            file: file.into(),
            source,
            offset: 0,
            current: None,
            row: 1,
            col: 0,
            state: ScanState::Pending,
        }
    }

    /// Move to the next code point.
    ///
    /// Returns `false` once the input is exhausted or a forbidden code point
    /// has been met; both states are terminal. Check [`CharScanner::error`]
    /// to tell them apart.
    pub fn advance(&mut self) -> bool {
        let next_offset = match (&self.state, self.current) {
            (ScanState::Pending, _) => 0,
            (ScanState::Scanning, Some(c)) => self.offset + c.len_utf8(),
            _ => return false,
        };

        let Some(next) = self.source[next_offset..].chars().next() else {
            self.current = None;
            self.state = ScanState::Exhausted;
            return false;
        };

        if self.current == Some('\n') {
            self.row += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        self.offset = next_offset;

        if is_forbidden(next) {
            self.current = None;
            self.state = ScanState::Failed(Error::ForbiddenCharacter {
                ch: next,
                pos: self.position(),
            });
            return false;
        }

        self.current = Some(next);
        self.state = ScanState::Scanning;
        true
    }

    /// The code point under the scanner, if any.
    pub fn current(&self) -> Option<char> {
        self.current
    }

    /// Position of the current code point. After the end of input this stays
    /// at the last code point that was read.
    pub fn position(&self) -> Position {
        Position {
            file: Arc::clone(&self.file),
            row: self.row,
            col: self.col,
        }
    }

    /// The unread source text starting at the current code point.
    pub fn remaining(&self) -> &'a str {
        match self.state {
            ScanState::Scanning => &self.source[self.offset..],
            ScanState::Pending => self.source,
            ScanState::Exhausted | ScanState::Failed(_) => "",
        }
    }

    /// The terminal error, if scanning stopped on a forbidden code point.
    pub fn error(&self) -> Option<&Error> {
        match &self.state {
            ScanState::Failed(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self.state, ScanState::Exhausted | ScanState::Failed(_))
    }
}
