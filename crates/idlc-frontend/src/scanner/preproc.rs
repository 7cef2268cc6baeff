//! Preprocessor directives: conditionals, defines, includes, pragmas.

use idlc_core::pos::Position;

use crate::diagnostics::ParseError;
use crate::Error;

use super::{ppexpr, Directives, Scanner};

/// One open `#if`/`#ifdef` region.
#[derive(Debug)]
pub(crate) struct IfFrame {
    /// Whether the enclosing region is live.
    parent_live: bool,
    /// Whether the currently selected branch is live.
    live: bool,
    /// Whether any branch has been taken yet.
    taken: bool,
    seen_else: bool,
}

impl IfFrame {
    fn new(parent_live: bool, cond: bool) -> Self {
        IfFrame {
            parent_live,
            live: parent_live && cond,
            taken: cond,
            seen_else: false,
        }
    }
}

fn split_first_word(text: &str) -> (&str, &str) {
    let text = text.trim_start();
    match text.find(|c: char| c.is_whitespace()) {
        Some(ix) => (&text[..ix], text[ix..].trim_start()),
        None => (text, ""),
    }
}

impl<D: Directives> Scanner<D> {
    /// Whether tokens at the cursor are inside live conditional branches.
    pub(crate) fn pp_live(&self) -> bool {
        self.ifs.last().is_none_or(|f| f.live)
    }

    /// Skips a dead conditional region, processing only the directives
    /// that can end it. Returns with either the region live again or the
    /// current frame exhausted.
    pub(crate) fn skip_inactive_region(&mut self) -> Result<(), Error> {
        while !self.pp_live() {
            let Some(c) = self.input.peek() else {
                return Ok(());
            };
            match c {
                '\n' => {
                    self.input.bump();
                    self.at_line_start = true;
                }
                c if c.is_whitespace() => {
                    self.input.bump();
                }
                '#' if self.at_line_start => {
                    self.input.bump();
                    self.directive()?;
                }
                _ => {
                    self.at_line_start = false;
                    // discard the rest of the line
                    while let Some(c) = self.input.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.input.bump();
                    }
                }
            }
        }
        Ok(())
    }

    /// Handles one directive; the `#` is already consumed.
    pub(crate) fn directive(&mut self) -> Result<(), Error> {
        let pos = self.input.position();
        let line = self.directive_line()?;
        let line = line.trim();
        if line.is_empty() {
            return Ok(());
        }
        let (name, rest) = split_first_word(line);
        match name {
            "if" => {
                let live = self.pp_live();
                let cond = live && self.eval_condition(rest, &pos)?;
                self.ifs.push(IfFrame::new(live, cond));
            }
            "ifdef" | "ifndef" => {
                let live = self.pp_live();
                let (word, _) = split_first_word(rest);
                if word.is_empty() {
                    return Err(self.error_at(format!("missing name after #{name}"), &pos));
                }
                let mut cond = self.is_defined(word);
                if name == "ifndef" {
                    cond = !cond;
                }
                self.ifs.push(IfFrame::new(live, live && cond));
            }
            "elif" => {
                let (parent_live, taken, seen_else) = match self.ifs.last() {
                    Some(f) => (f.parent_live, f.taken, f.seen_else),
                    None => {
                        return Err(self.error_at("#elif without #if", &pos));
                    }
                };
                if seen_else {
                    return Err(self.error_at("#elif after #else", &pos));
                }
                let cond = parent_live && !taken && self.eval_condition(rest, &pos)?;
                if let Some(frame) = self.ifs.last_mut() {
                    frame.live = cond;
                    frame.taken |= cond;
                }
            }
            "else" => {
                let seen_else = match self.ifs.last() {
                    Some(f) => f.seen_else,
                    None => return Err(self.error_at("#else without #if", &pos)),
                };
                if seen_else {
                    return Err(self.error_at("duplicate #else", &pos));
                }
                if let Some(frame) = self.ifs.last_mut() {
                    frame.seen_else = true;
                    frame.live = frame.parent_live && !frame.taken;
                    frame.taken = true;
                }
            }
            "endif" => {
                if self.ifs.pop().is_none() {
                    return Err(self.error_at("#endif without #if", &pos));
                }
            }
            _ if !self.pp_live() => {}
            "define" => {
                let (word, body) = split_first_word(rest);
                if word.is_empty() {
                    return Err(self.error_at("missing name after #define", &pos));
                }
                if self.defines.contains_key(word) {
                    return Err(self.error_at(format!("duplicate #define of '{word}'"), &pos));
                }
                self.define(word, body);
            }
            "undef" => {
                let (word, _) = split_first_word(rest);
                self.undefine(word);
            }
            "include" => self.include(rest, &pos)?,
            "pragma" => self.pragma(rest, &pos)?,
            "error" => {
                return Err(self.error_at(format!("#error {rest}"), &pos));
            }
            // line markers from upstream preprocessors
            _ if name.chars().all(|c| c.is_ascii_digit()) => {}
            _ => {
                return Err(self.error_at(format!("unknown preprocessor directive #{name}"), &pos));
            }
        }
        Ok(())
    }

    /// The directive's logical line: backslash continuations joined,
    /// comments stripped, final newline consumed.
    fn directive_line(&mut self) -> Result<String, Error> {
        let mut out = String::new();
        loop {
            let Some(c) = self.input.peek() else {
                return Ok(out);
            };
            match c {
                '\n' => {
                    self.input.bump();
                    self.at_line_start = true;
                    return Ok(out);
                }
                '\\' => {
                    self.input.bump();
                    match self.input.peek() {
                        Some('\n') => {
                            self.input.bump();
                            out.push(' ');
                        }
                        _ => out.push('\\'),
                    }
                }
                '/' => {
                    self.input.bump();
                    match self.input.peek() {
                        Some('/') => {
                            while self.input.peek().is_some_and(|c| c != '\n') {
                                self.input.bump();
                            }
                        }
                        Some('*') => {
                            self.input.bump();
                            self.block_comment_in_directive()?;
                            out.push(' ');
                        }
                        _ => out.push('/'),
                    }
                }
                c => {
                    out.push(c);
                    self.input.bump();
                }
            }
        }
    }

    fn block_comment_in_directive(&mut self) -> Result<(), Error> {
        let mut star = false;
        loop {
            let c = self
                .input
                .bump()
                .ok_or_else(|| self.error("unterminated block comment"))?;
            if star && c == '/' {
                return Ok(());
            }
            star = c == '*';
        }
    }

    fn eval_condition(&self, text: &str, pos: &Position) -> Result<bool, Error> {
        let resolved = self
            .resolve_macros(text)
            .map_err(|e| self.error_at(e.message, pos))?;
        let value = ppexpr::eval(&resolved).map_err(|e| self.error_at(e.message, pos))?;
        Ok(value != 0)
    }

    /// Substitutes defined words in a conditional expression.
    /// `defined(NAME)` resolves to `1` or `0` before substitution;
    /// unknown words become `0`, like a C preprocessor.
    pub(crate) fn resolve_macros(&self, text: &str) -> Result<String, ParseError> {
        let mut stack = Vec::new();
        self.resolve_words(text, &mut stack)
    }

    fn resolve_words(&self, text: &str, stack: &mut Vec<String>) -> Result<String, ParseError> {
        let chars: Vec<char> = text.chars().collect();
        let mut out = String::new();
        let mut ix = 0;
        while ix < chars.len() {
            let c = chars[ix];
            if c.is_alphabetic() || c == '_' {
                let mut word = String::new();
                while ix < chars.len() && (chars[ix].is_alphanumeric() || chars[ix] == '_') {
                    word.push(chars[ix]);
                    ix += 1;
                }
                if word == "defined" {
                    let known = Self::defined_operand(&chars, &mut ix)
                        .map(|name| self.defines.contains_key(&name))
                        .ok_or_else(|| ParseError::new("malformed defined() operand"))?;
                    out.push(if known { '1' } else { '0' });
                } else if word == "true" || word == "false" {
                    out.push_str(&word);
                } else if let Some(body) = self.defines.get(&word) {
                    if stack.iter().any(|w| *w == word) {
                        return Err(ParseError::new(format!(
                            "circular macro reference '{word}'"
                        )));
                    }
                    stack.push(word);
                    let resolved = self.resolve_words(body, stack)?;
                    stack.pop();
                    out.push_str(&resolved);
                } else {
                    out.push('0');
                }
            } else if c.is_ascii_digit() {
                // numbers (hex included) pass through unchanged
                while ix < chars.len() && (chars[ix].is_alphanumeric() || chars[ix] == '_') {
                    out.push(chars[ix]);
                    ix += 1;
                }
            } else {
                out.push(c);
                ix += 1;
            }
        }
        Ok(out)
    }

    /// The name tested by `defined NAME` or `defined(NAME)`, with `ix`
    /// advanced past it.
    fn defined_operand(chars: &[char], ix: &mut usize) -> Option<String> {
        while *ix < chars.len() && chars[*ix].is_whitespace() {
            *ix += 1;
        }
        let parens = chars.get(*ix) == Some(&'(');
        if parens {
            *ix += 1;
            while *ix < chars.len() && chars[*ix].is_whitespace() {
                *ix += 1;
            }
        }
        let mut name = String::new();
        while *ix < chars.len() && (chars[*ix].is_alphanumeric() || chars[*ix] == '_') {
            name.push(chars[*ix]);
            *ix += 1;
        }
        if name.is_empty() {
            return None;
        }
        if parens {
            while *ix < chars.len() && chars[*ix].is_whitespace() {
                *ix += 1;
            }
            if chars.get(*ix) != Some(&')') {
                return None;
            }
            *ix += 1;
        }
        Some(name)
    }

    fn include(&mut self, rest: &str, pos: &Position) -> Result<(), Error> {
        let rest = rest.trim();
        let (spec, quoted) = if let Some(inner) = rest.strip_prefix('"') {
            let Some(end) = inner.find('"') else {
                return Err(self.error_at("malformed #include", pos));
            };
            (&inner[..end], true)
        } else if let Some(inner) = rest.strip_prefix('<') {
            let Some(end) = inner.find('>') else {
                return Err(self.error_at("malformed #include", pos));
            };
            (&inner[..end], false)
        } else {
            return Err(self.error_at("malformed #include", pos));
        };

        let Some(fullpath) = self.resolve_include(spec, quoted) else {
            return Err(self.error_at(format!("cannot open include file '{spec}'"), pos));
        };
        let full = fullpath.to_string_lossy().into_owned();
        if self.directives.enter_include(spec, &full)? {
            let mut pushed_dir = None;
            if quoted {
                if let Some(dir) = fullpath.parent() {
                    if !self.xincludepaths.iter().any(|p| p == dir) {
                        self.xincludepaths.push(dir.to_path_buf());
                        pushed_dir = Some(dir.to_path_buf());
                    }
                }
            }
            self.include_frames.push(super::IncludeFrame {
                pushed_dir,
                if_depth: self.ifs.len(),
            });
            let text = std::fs::read_to_string(&fullpath)?;
            self.input.push_include(full, &text);
            self.at_line_start = true;
        } else {
            self.directives.declare_include(spec, &full)?;
        }
        Ok(())
    }

    fn pragma(&mut self, rest: &str, pos: &Position) -> Result<(), Error> {
        let (kind, args) = split_first_word(rest);
        match kind {
            "ID" => {
                let (name, id) = split_first_word(args);
                let id = unquote(id)
                    .ok_or_else(|| self.error_at("malformed #pragma ID", pos))?;
                self.directives.pragma_id(name, id, pos)?;
            }
            "version" => {
                let (name, version) = split_first_word(args);
                if name.is_empty() || version.is_empty() {
                    return Err(self.error_at("malformed #pragma version", pos));
                }
                self.directives.pragma_version(name, version.trim(), pos)?;
            }
            "prefix" => {
                let prefix = unquote(args.trim())
                    .ok_or_else(|| self.error_at("malformed #pragma prefix", pos))?;
                self.directives.pragma_prefix(prefix, pos)?;
            }
            _ => {
                // unknown pragmas are passed through; an unhandled one
                // is a warning, not an error
                if !self.directives.handle_pragma(rest, pos)? {
                    self.diagnostics
                        .warn(format!("ignoring unrecognized #pragma {rest}"), Some(pos.clone()));
                }
            }
        }
        Ok(())
    }
}

fn unquote(text: &str) -> Option<&str> {
    text.strip_prefix('"')?.strip_suffix('"')
}
