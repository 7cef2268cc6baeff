//! Tokenization: identifiers, keywords, literals, macro expansion.

use idlc_core::pos::Position;

use crate::Error;

use super::input::FrameEnd;
use super::token::{keyword_lookup, Token};
use super::{Directives, Scanner};

impl<D: Directives> Scanner<D> {
    /// The next significant token. Annotations are absorbed into the
    /// scanner's pending/trailing queues on the way.
    pub fn next_token(&mut self) -> Result<(Token, Position), Error> {
        loop {
            let (token, pos) = self.lex()?;
            if token.is_punct('@') {
                let annotation = self.parse_annotation()?;
                self.pending.push(annotation);
                continue;
            }
            return Ok((token, pos));
        }
    }

    /// Raw tokenizer, also used by the annotation parser.
    pub(crate) fn lex(&mut self) -> Result<(Token, Position), Error> {
        if let Some(stashed) = self.relexed.take() {
            return Ok(stashed);
        }
        loop {
            self.input.pop_spent_expansions();
            if !self.pp_live() {
                self.skip_inactive_region()?;
            }
            let Some(c) = self.input.peek() else {
                match self.input.finish_frame() {
                    FrameEnd::Include => {
                        if let Some(frame) = self.include_frames.pop() {
                            if self.ifs.len() != frame.if_depth {
                                return Err(self.error("missing #endif at end of include"));
                            }
                            if let Some(dir) = frame.pushed_dir {
                                if let Some(ix) =
                                    self.xincludepaths.iter().rposition(|p| *p == dir)
                                {
                                    self.xincludepaths.remove(ix);
                                }
                            }
                        }
                        self.directives.leave_include()?;
                        self.at_line_start = true;
                        continue;
                    }
                    FrameEnd::Main => {
                        if !self.ifs.is_empty() {
                            return Err(self.error("missing #endif at end of input"));
                        }
                        return Ok((Token::Eof, self.input.position()));
                    }
                }
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
                '/' => {
                    let pos = self.input.position();
                    self.input.bump();
                    match self.input.peek() {
                        Some('/') => {
                            self.input.bump();
                            self.line_comment()?;
                        }
                        Some('*') => {
                            self.input.bump();
                            self.block_comment()?;
                        }
                        _ => {
                            self.at_line_start = false;
                            return Ok((Token::Punct('/'), pos));
                        }
                    }
                }
                _ => {
                    self.at_line_start = false;
                    let pos = self.input.position();
                    let token = self.token_at(c)?;
                    // a defined word expands in place of producing a token
                    let Some(token) = token else { continue };
                    return Ok((token, pos));
                }
            }
        }
    }

    /// One token starting at `c`, or `None` when a macro was expanded.
    fn token_at(&mut self, c: char) -> Result<Option<Token>, Error> {
        Ok(Some(match c {
            '"' => {
                self.input.bump();
                Token::Str(self.string_literal()?)
            }
            '\'' => {
                self.input.bump();
                let (value, wide) = self.char_literal(false)?;
                if wide {
                    return Err(self.error("universal character in a narrow char literal"));
                }
                Token::Char(value as u8)
            }
            c if c.is_ascii_digit() => self.number()?,
            c if c.is_alphabetic() || c == '_' => match self.word_token()? {
                Some(t) => t,
                None => return Ok(None),
            },
            ':' => {
                self.input.bump();
                if self.input.peek() == Some(':') {
                    self.input.bump();
                    Token::ScopeSep
                } else {
                    Token::Punct(':')
                }
            }
            '<' => {
                self.input.bump();
                if self.input.peek() == Some('<') {
                    self.input.bump();
                    Token::ShiftLeft
                } else {
                    Token::Punct('<')
                }
            }
            '>' => {
                self.input.bump();
                if self.input.peek() == Some('>') {
                    self.input.bump();
                    Token::ShiftRight
                } else {
                    Token::Punct('>')
                }
            }
            c => {
                self.input.bump();
                Token::Punct(c)
            }
        }))
    }

    fn word(&mut self) -> String {
        let mut out = String::new();
        while let Some(c) = self.input.peek() {
            if c.is_alphanumeric() || c == '_' {
                out.push(c);
                self.input.bump();
            } else {
                break;
            }
        }
        out
    }

    /// Identifier, keyword, wide literal prefix or macro expansion.
    fn word_token(&mut self) -> Result<Option<Token>, Error> {
        let word = self.word();
        if word == "L" {
            match self.input.peek() {
                Some('\'') => {
                    self.input.bump();
                    let (value, _) = self.char_literal(true)?;
                    return Ok(Some(Token::WChar(value)));
                }
                Some('"') => {
                    self.input.bump();
                    return Ok(Some(Token::WStr(self.string_literal()?)));
                }
                _ => {}
            }
        }
        if let Some(body) = self.defines.get(&word) {
            if self.input.expanding(&word) {
                return Err(self.error(format!("circular macro expansion of '{word}'")));
            }
            let body = body.clone();
            self.input.push_expansion(&word, &body);
            return Ok(None);
        }
        // a leading underscore escapes an identifier from keyword
        // matching; the remainder must itself be letter-initial
        if let Some(escaped) = word.strip_prefix('_') {
            if !escaped.chars().next().is_some_and(char::is_alphabetic) {
                return Err(self.error(format!("malformed escaped identifier '{word}'")));
            }
            return Ok(Some(Token::Identifier(word)));
        }
        match keyword_lookup(&word) {
            Some(canonical) if canonical == word => Ok(Some(Token::Keyword(canonical))),
            Some(canonical) => Err(self.error(format!(
                "'{word}' collides with IDL keyword '{canonical}'"
            ))),
            None => Ok(Some(Token::Identifier(word))),
        }
    }

    fn number(&mut self) -> Result<Token, Error> {
        let mut text = String::new();
        let first = self.input.bump().unwrap_or('0');
        text.push(first);

        if first == '0' && matches!(self.input.peek(), Some('x' | 'X')) {
            self.input.bump();
            let digits = self.word();
            if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(self.error(format!("malformed hexadecimal literal '0x{digits}'")));
            }
            let value = i128::from_str_radix(&digits, 16)
                .map_err(|_| self.error(format!("hexadecimal literal '0x{digits}' overflows")))?;
            return Ok(Token::Integer(value));
        }

        let mut is_float = false;
        let mut is_fixed = false;
        loop {
            match self.input.peek() {
                Some(c) if c.is_ascii_digit() => {
                    text.push(c);
                    self.input.bump();
                }
                Some('.') if !is_float => {
                    is_float = true;
                    text.push('.');
                    self.input.bump();
                }
                Some('e' | 'E') => {
                    is_float = true;
                    text.push('e');
                    self.input.bump();
                    if let Some(sign @ ('+' | '-')) = self.input.peek() {
                        text.push(sign);
                        self.input.bump();
                    }
                }
                Some('d' | 'D') => {
                    is_fixed = true;
                    self.input.bump();
                    break;
                }
                _ => break,
            }
        }

        if is_fixed {
            return Ok(Token::Fixed(text));
        }
        if is_float {
            let value: f64 = text
                .parse()
                .map_err(|_| self.error(format!("malformed floating point literal '{text}'")))?;
            return Ok(Token::Float(value));
        }
        if first == '0' && text.len() > 1 {
            if text.contains(['8', '9']) {
                return Err(self.error(format!("digits 8 and 9 in octal literal '{text}'")));
            }
            let value = i128::from_str_radix(&text[1..], 8)
                .map_err(|_| self.error(format!("octal literal '{text}' overflows")))?;
            return Ok(Token::Integer(value));
        }
        let value: i128 = text
            .parse()
            .map_err(|_| self.error(format!("integer literal '{text}' overflows")))?;
        Ok(Token::Integer(value))
    }

    /// Body of a char literal; the opening quote is already consumed.
    /// Returns the character and whether a universal escape was used.
    fn char_literal(&mut self, wide: bool) -> Result<(char, bool), Error> {
        let c = self
            .input
            .bump()
            .ok_or_else(|| self.error("unterminated character literal"))?;
        let (value, universal) = if c == '\\' {
            self.escape(wide)?
        } else {
            (c, false)
        };
        if self.input.bump() != Some('\'') {
            return Err(self.error("unterminated character literal"));
        }
        if !wide && (value as u32) > 0xff {
            return Err(self.error("character literal out of range"));
        }
        Ok((value, universal))
    }

    /// Body of a string literal; the opening quote is already consumed.
    /// Adjacent literals concatenate.
    fn string_literal(&mut self) -> Result<String, Error> {
        let mut out = String::new();
        loop {
            loop {
                let c = self
                    .input
                    .bump()
                    .ok_or_else(|| self.error("unterminated string literal"))?;
                match c {
                    '"' => break,
                    '\\' => out.push(self.escape(true)?.0),
                    '\n' => return Err(self.error("newline in string literal")),
                    c => out.push(c),
                }
            }
            // `"a" "b"` is one literal
            while self.input.peek().is_some_and(|c| c.is_whitespace()) {
                self.input.bump();
            }
            if self.input.peek() == Some('"') {
                self.input.bump();
                continue;
            }
            return Ok(out);
        }
    }

    /// An escape sequence after the backslash. Returns the character and
    /// whether it was a `\u` universal name.
    fn escape(&mut self, wide: bool) -> Result<(char, bool), Error> {
        let c = self
            .input
            .bump()
            .ok_or_else(|| self.error("unterminated escape sequence"))?;
        Ok(match c {
            'n' => ('\n', false),
            't' => ('\t', false),
            'v' => ('\u{b}', false),
            'b' => ('\u{8}', false),
            'r' => ('\r', false),
            'f' => ('\u{c}', false),
            'a' => ('\u{7}', false),
            '\\' => ('\\', false),
            '?' => ('?', false),
            '\'' => ('\'', false),
            '"' => ('"', false),
            'x' => {
                let v = self.hex_digits(2)?;
                let c = char::from_u32(v).ok_or_else(|| self.error("invalid \\x escape"))?;
                (c, false)
            }
            'u' => {
                if !wide {
                    return Err(self.error("\\u escape in a narrow literal"));
                }
                let v = self.hex_digits(4)?;
                let c = char::from_u32(v).ok_or_else(|| self.error("invalid \\u escape"))?;
                (c, true)
            }
            c @ '0'..='7' => {
                let mut v = c as u32 - '0' as u32;
                for _ in 0..2 {
                    match self.input.peek() {
                        Some(d @ '0'..='7') => {
                            v = v * 8 + (d as u32 - '0' as u32);
                            self.input.bump();
                        }
                        _ => break,
                    }
                }
                let c = char::from_u32(v).ok_or_else(|| self.error("invalid octal escape"))?;
                (c, false)
            }
            c => return Err(self.error(format!("unknown escape sequence '\\{c}'"))),
        })
    }

    fn hex_digits(&mut self, max: usize) -> Result<u32, Error> {
        let mut v = 0u32;
        let mut count = 0;
        while count < max {
            match self.input.peek() {
                Some(c) if c.is_ascii_hexdigit() => {
                    v = v * 16 + c.to_digit(16).unwrap_or(0);
                    self.input.bump();
                    count += 1;
                }
                _ => break,
            }
        }
        if count == 0 {
            return Err(self.error("missing digits in hex escape"));
        }
        Ok(v)
    }

    /// `// ...` comment; a `//@` body is parsed as trailing annotations.
    fn line_comment(&mut self) -> Result<(), Error> {
        if self.input.peek() == Some('@') {
            self.input.bump();
            let annotation = self.parse_annotation()?;
            self.trailing.push(annotation);
        }
        while let Some(c) = self.input.peek() {
            if c == '\n' {
                break;
            }
            self.input.bump();
        }
        Ok(())
    }

    fn block_comment(&mut self) -> Result<(), Error> {
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
}
