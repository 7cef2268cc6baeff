//! IDL scanner with an integrated C-style preprocessor.
//!
//! The scanner owns the input stack and the preprocessor state and hands
//! directive effects (includes, pragmas) to a [`Directives`]
//! implementation. The token stream it produces is already
//! preprocessed: conditional regions are skipped, macros expanded and
//! annotations collected on the side.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;

use idlc_core::annotations::Annotations;
use idlc_core::pos::Position;

use crate::diagnostics::{Diagnostics, ParseError};
use crate::Error;

mod input;
mod lexer;
mod preproc;
mod ppexpr;
mod token;
mod annotations;

pub use token::Token;

use input::Input;
use preproc::IfFrame;

/// Receiver of preprocessor directive effects.
///
/// All methods default to no-ops so scanner-only uses can pass `()`.
pub trait Directives {
    /// A `#include` resolved to `fullpath`. Returns whether the file
    /// contents should be scanned; `false` skips the file (it was
    /// already included) and triggers [`Directives::declare_include`]
    /// instead.
    fn enter_include(&mut self, filename: &str, fullpath: &str) -> Result<bool, Error> {
        let _ = (filename, fullpath);
        Ok(true)
    }

    /// The innermost include file has been fully scanned.
    fn leave_include(&mut self) -> Result<(), Error> {
        Ok(())
    }

    /// A `#include` of an already-included file.
    fn declare_include(&mut self, filename: &str, fullpath: &str) -> Result<(), Error> {
        let _ = (filename, fullpath);
        Ok(())
    }

    /// `#pragma ID <name> "<repository-id>"`.
    fn pragma_id(&mut self, name: &str, id: &str, pos: &Position) -> Result<(), Error> {
        let _ = (name, id, pos);
        Ok(())
    }

    /// `#pragma version <name> <major>.<minor>`.
    fn pragma_version(&mut self, name: &str, version: &str, pos: &Position) -> Result<(), Error> {
        let _ = (name, version, pos);
        Ok(())
    }

    /// `#pragma prefix "<prefix>"`.
    fn pragma_prefix(&mut self, prefix: &str, pos: &Position) -> Result<(), Error> {
        let _ = (prefix, pos);
        Ok(())
    }

    /// Any other pragma. Returns whether it was handled; unhandled
    /// pragmas are ignored.
    fn handle_pragma(&mut self, text: &str, pos: &Position) -> Result<bool, Error> {
        let _ = (text, pos);
        Ok(false)
    }
}

impl Directives for () {}

/// Scanner-side state saved while an include file is open.
pub(crate) struct IncludeFrame {
    /// Directory entry pushed on `xincludepaths` for this include, if any.
    pub(crate) pushed_dir: Option<PathBuf>,
    /// Conditional nesting depth at entry; `#if` regions opened in the
    /// file must close before it ends.
    pub(crate) if_depth: usize,
}

pub struct Scanner<D: Directives> {
    pub(crate) input: Input,
    pub(crate) directives: D,
    pub(crate) defines: IndexMap<String, String>,
    pub(crate) ifs: Vec<IfFrame>,
    includepaths: Vec<PathBuf>,
    /// Directories of quoted includes, searched before `includepaths`.
    pub(crate) xincludepaths: Vec<PathBuf>,
    /// One entry per open include frame, innermost last.
    pub(crate) include_frames: Vec<IncludeFrame>,
    pub(crate) diagnostics: Diagnostics,
    pub(crate) pending: Annotations,
    pub(crate) trailing: Annotations,
    pub(crate) at_line_start: bool,
    /// One-token pushback, used by the annotation parser.
    pub(crate) relexed: Option<(Token, Position)>,
}

impl<D: Directives> Scanner<D> {
    pub fn new(source: impl Into<Arc<str>>, text: &str, directives: D) -> Self {
        Scanner {
            input: Input::new(source, text),
            directives,
            defines: IndexMap::new(),
            ifs: Vec::new(),
            includepaths: Vec::new(),
            xincludepaths: Vec::new(),
            include_frames: Vec::new(),
            diagnostics: Diagnostics::new(),
            pending: Annotations::new(),
            trailing: Annotations::new(),
            at_line_start: true,
            relexed: None,
        }
    }

    pub fn from_file(path: impl AsRef<Path>, directives: D) -> Result<Self, Error> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let mut scanner = Scanner::new(path.to_string_lossy().into_owned(), &text, directives);
        if let Some(dir) = path.parent() {
            scanner.xincludepaths.push(dir.to_path_buf());
        }
        Ok(scanner)
    }

    pub fn add_include_path(&mut self, path: impl Into<PathBuf>) {
        self.includepaths.push(path.into());
    }

    /// Registers a macro as if `#define name body` had been read.
    pub fn define(&mut self, name: impl Into<String>, body: impl Into<String>) {
        let body = body.into();
        let body = if body.is_empty() { "1".to_string() } else { body };
        self.defines.insert(name.into(), body);
    }

    pub fn undefine(&mut self, name: &str) {
        self.defines.shift_remove(name);
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.defines.contains_key(name)
    }

    pub fn directives(&self) -> &D {
        &self.directives
    }

    pub fn directives_mut(&mut self) -> &mut D {
        &mut self.directives
    }

    pub fn into_directives(self) -> D {
        self.directives
    }

    pub fn position(&self) -> Position {
        self.input.position()
    }

    /// Annotations scanned since the last call, to be attached to the
    /// next definition.
    pub fn take_annotations(&mut self) -> Annotations {
        self.pending.take()
    }

    /// `//@` comment annotations, to be attached to the definition the
    /// line belongs to.
    pub fn take_trailing_annotations(&mut self) -> Annotations {
        self.trailing.take()
    }

    /// Warnings and notes raised so far (unrecognized pragmas included).
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub(crate) fn error(&self, message: impl Into<String>) -> Error {
        Error::Parse(ParseError::at_stack(message, self.input.position_stack()))
    }

    /// An error at `pos`, with the enclosing include positions appended.
    pub(crate) fn error_at(&self, message: impl Into<String>, pos: &Position) -> Error {
        let mut positions = self.input.position_stack();
        match positions.first_mut() {
            Some(first) => *first = pos.clone(),
            None => positions.push(pos.clone()),
        }
        Error::Parse(ParseError::at_stack(message, positions))
    }

    /// Resolves quoted (`"file"`) or angle (`<file>`) include paths.
    pub(crate) fn resolve_include(&mut self, spec: &str, quoted: bool) -> Option<PathBuf> {
        let spec = Path::new(spec);
        if spec.is_absolute() {
            return spec.exists().then(|| spec.to_path_buf());
        }
        let quoted_dirs: &[PathBuf] = if quoted { &self.xincludepaths } else { &[] };
        for dir in quoted_dirs.iter().chain(self.includepaths.iter()) {
            let candidate = dir.join(spec);
            if candidate.exists() {
                return Some(candidate);
            }
        }
        None
    }
}
