//! Source positions.

use std::fmt;
use std::sync::Arc;

/// Position in an input source, with 1-based line and column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Position {
    pub source: Arc<str>,
    pub line: u32,
    pub column: u32,
}

impl Position {
    pub fn new(source: Arc<str>, line: u32, column: u32) -> Self {
        Position { source, line, column }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: line {}, column {}", self.source, self.line, self.column)
    }
}
