//! Layered character input.
//!
//! The scanner reads from a stack of frames: the main file at the bottom,
//! included files and macro expansions pushed on top. Positions always
//! refer to the innermost file frame; expansion frames are transparent.

use std::sync::Arc;

use idlc_core::pos::Position;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum FrameKind {
    Main,
    Include,
    Expansion { name: String },
}

#[derive(Debug)]
struct Frame {
    chars: Vec<char>,
    cursor: usize,
    kind: FrameKind,
    source: Arc<str>,
    line: u32,
    column: u32,
}

impl Frame {
    fn new(source: Arc<str>, text: &str, kind: FrameKind) -> Self {
        Frame {
            chars: text.chars().collect(),
            cursor: 0,
            kind,
            source,
            line: 1,
            column: 1,
        }
    }
}

/// What ended when the top file frame ran out of characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FrameEnd {
    Include,
    Main,
}

#[derive(Debug)]
pub(crate) struct Input {
    stack: Vec<Frame>,
}

impl Input {
    pub(crate) fn new(source: impl Into<Arc<str>>, text: &str) -> Self {
        Input {
            stack: vec![Frame::new(source.into(), text, FrameKind::Main)],
        }
    }

    pub(crate) fn push_include(&mut self, source: impl Into<Arc<str>>, text: &str) {
        self.stack.push(Frame::new(source.into(), text, FrameKind::Include));
    }

    pub(crate) fn push_expansion(&mut self, name: &str, text: &str) {
        let source: Arc<str> = Arc::from(format!("<{name}>"));
        self.stack.push(Frame::new(
            source,
            text,
            FrameKind::Expansion { name: name.to_string() },
        ));
    }

    /// Whether a macro expansion with this name is already active.
    pub(crate) fn expanding(&self, name: &str) -> bool {
        self.stack.iter().any(|f| {
            matches!(&f.kind, FrameKind::Expansion { name: n } if n == name)
        })
    }

    /// Position of the innermost file frame.
    pub(crate) fn position(&self) -> Position {
        let frame = self
            .stack
            .iter()
            .rev()
            .find(|f| !matches!(f.kind, FrameKind::Expansion { .. }))
            .or(self.stack.first());
        match frame {
            Some(f) => Position::new(f.source.clone(), f.line, f.column),
            None => Position::new(Arc::from("<eof>"), 0, 0),
        }
    }

    /// Positions of all open file frames, innermost first. Expansion
    /// frames are transparent here as well.
    pub(crate) fn position_stack(&self) -> Vec<Position> {
        self.stack
            .iter()
            .rev()
            .filter(|f| !matches!(f.kind, FrameKind::Expansion { .. }))
            .map(|f| Position::new(f.source.clone(), f.line, f.column))
            .collect()
    }

    /// The next character, without consuming it. Spent expansion frames
    /// are read through but stay on the stack until
    /// [`Input::pop_spent_expansions`] releases them, so the macro names
    /// they carry remain visible to [`Input::expanding`] until the token
    /// that drained them is complete. An exhausted file frame yields
    /// `None` until [`Input::finish_frame`] pops it.
    pub(crate) fn peek(&self) -> Option<char> {
        for frame in self.stack.iter().rev() {
            if let Some(c) = frame.chars.get(frame.cursor) {
                return Some(*c);
            }
            if !matches!(frame.kind, FrameKind::Expansion { .. }) {
                return None;
            }
        }
        None
    }

    /// Consumes the character last returned by [`Input::peek`].
    pub(crate) fn bump(&mut self) -> Option<char> {
        let mut ix = self.stack.len();
        while ix > 0 {
            ix -= 1;
            let frame = &mut self.stack[ix];
            if let Some(c) = frame.chars.get(frame.cursor).copied() {
                frame.cursor += 1;
                if c == '\n' {
                    frame.line += 1;
                    frame.column = 1;
                } else {
                    frame.column += 1;
                }
                return Some(c);
            }
            if !matches!(frame.kind, FrameKind::Expansion { .. }) {
                return None;
            }
        }
        None
    }

    /// Drops expansion frames whose text is fully consumed. Called at
    /// token boundaries; a macro name stays active for cycle detection
    /// until the token that ended its expansion has been produced.
    pub(crate) fn pop_spent_expansions(&mut self) {
        while let Some(top) = self.stack.last() {
            let spent = matches!(top.kind, FrameKind::Expansion { .. })
                && top.cursor >= top.chars.len();
            if !spent {
                break;
            }
            self.stack.pop();
        }
    }

    /// Pops the exhausted top file frame.
    pub(crate) fn finish_frame(&mut self) -> FrameEnd {
        match self.stack.last().map(|f| &f.kind) {
            Some(FrameKind::Include) => {
                self.stack.pop();
                FrameEnd::Include
            }
            _ => FrameEnd::Main,
        }
    }
}
