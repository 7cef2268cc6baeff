//! Parse diagnostics carrying source positions.

use std::fmt;

use idlc_core::pos::Position;

/// A scan or preprocessing error.
///
/// `positions` is the stack of file positions at the point of the error,
/// innermost first: the failing position, then the position of each
/// `#include` still open around it.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    pub positions: Vec<Position>,
}

impl ParseError {
    pub fn new(message: impl Into<String>) -> Self {
        ParseError { message: message.into(), positions: Vec::new() }
    }

    pub fn at(message: impl Into<String>, position: Position) -> Self {
        ParseError { message: message.into(), positions: vec![position] }
    }

    pub fn at_stack(message: impl Into<String>, positions: Vec<Position>) -> Self {
        ParseError { message: message.into(), positions }
    }

    /// The innermost position, if any.
    pub fn position(&self) -> Option<&Position> {
        self.positions.first()
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.positions.split_first() {
            Some((innermost, rest)) => {
                write!(f, "{} at {}", self.message, innermost)?;
                for pos in rest {
                    write!(f, ", included from {pos}")?;
                }
                Ok(())
            }
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for ParseError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Note,
    Warning,
}

/// A non-fatal remark collected during scanning.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub level: Level,
    pub message: String,
    pub position: Option<Position>,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.level {
            Level::Note => "note",
            Level::Warning => "warning",
        };
        match &self.position {
            Some(pos) => write!(f, "{level}: {} at {pos}", self.message),
            None => write!(f, "{level}: {}", self.message),
        }
    }
}

/// Warnings and notes accumulated over a scan, in the order they were
/// raised.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Diagnostics::default()
    }

    pub fn warn(&mut self, message: impl Into<String>, position: Option<Position>) {
        self.entries.push(Diagnostic {
            level: Level::Warning,
            message: message.into(),
            position,
        });
    }

    pub fn note(&mut self, message: impl Into<String>, position: Option<Position>) {
        self.entries.push(Diagnostic {
            level: Level::Note,
            message: message.into(),
            position,
        });
    }

    pub fn warning_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|d| d.level == Level::Warning)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
