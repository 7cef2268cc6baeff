//! Evaluator for preprocessor conditional expressions.
//!
//! `#if`/`#elif` bodies arrive here after macro substitution, so the
//! grammar is integers, `true`/`false` and the C operator set down to
//! unary `! ~ -`. Nonzero means true.

use crate::diagnostics::ParseError;

pub(crate) fn eval(text: &str) -> Result<i64, ParseError> {
    let mut p = Parser {
        chars: text.chars().collect(),
        cursor: 0,
    };
    let v = p.or_expr()?;
    p.skip_ws();
    if p.cursor < p.chars.len() {
        return Err(p.error("trailing input in conditional expression"));
    }
    Ok(v)
}

struct Parser {
    chars: Vec<char>,
    cursor: usize,
}

impl Parser {
    fn error(&self, message: &str) -> ParseError {
        ParseError::new(format!("{message}: {}", self.chars.iter().collect::<String>()))
    }

    fn skip_ws(&mut self) {
        while self.chars.get(self.cursor).is_some_and(|c| c.is_whitespace()) {
            self.cursor += 1;
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.skip_ws();
        self.chars.get(self.cursor).copied()
    }

    fn peek2(&self) -> Option<char> {
        self.chars.get(self.cursor + 1).copied()
    }

    /// Consumes `op` when it is next; multi-character operators must
    /// match fully.
    fn accept(&mut self, op: &str) -> bool {
        self.skip_ws();
        let mut chars = op.chars();
        let first = chars.next();
        let second = chars.next();
        if self.chars.get(self.cursor).copied() != first {
            return false;
        }
        if second.is_some() && self.peek2() != second {
            return false;
        }
        // a bare `|`, `&`, `<` or `>` must not swallow `||`, `<=`, ...
        if second.is_none() {
            if let (Some(f), Some(n)) = (first, self.peek2()) {
                if matches!((f, n), ('|', '|') | ('&', '&') | ('<', '<' | '=') | ('>', '>' | '=') | ('=', '=') | ('!', '=')) {
                    return false;
                }
            }
        }
        self.cursor += op.chars().count();
        true
    }

    fn or_expr(&mut self) -> Result<i64, ParseError> {
        let mut v = self.and_expr()?;
        while self.accept("||") {
            let r = self.and_expr()?;
            v = ((v != 0) || (r != 0)) as i64;
        }
        Ok(v)
    }

    fn and_expr(&mut self) -> Result<i64, ParseError> {
        let mut v = self.bitor_expr()?;
        while self.accept("&&") {
            let r = self.bitor_expr()?;
            v = ((v != 0) && (r != 0)) as i64;
        }
        Ok(v)
    }

    fn bitor_expr(&mut self) -> Result<i64, ParseError> {
        let mut v = self.bitxor_expr()?;
        while self.accept("|") {
            v |= self.bitxor_expr()?;
        }
        Ok(v)
    }

    fn bitxor_expr(&mut self) -> Result<i64, ParseError> {
        let mut v = self.bitand_expr()?;
        while self.accept("^") {
            v ^= self.bitand_expr()?;
        }
        Ok(v)
    }

    fn bitand_expr(&mut self) -> Result<i64, ParseError> {
        let mut v = self.eq_expr()?;
        while self.accept("&") {
            v &= self.eq_expr()?;
        }
        Ok(v)
    }

    fn eq_expr(&mut self) -> Result<i64, ParseError> {
        let mut v = self.rel_expr()?;
        loop {
            if self.accept("==") {
                v = (v == self.rel_expr()?) as i64;
            } else if self.accept("!=") {
                v = (v != self.rel_expr()?) as i64;
            } else {
                return Ok(v);
            }
        }
    }

    fn rel_expr(&mut self) -> Result<i64, ParseError> {
        let mut v = self.shift_expr()?;
        loop {
            if self.accept("<=") {
                v = (v <= self.shift_expr()?) as i64;
            } else if self.accept(">=") {
                v = (v >= self.shift_expr()?) as i64;
            } else if self.accept("<") {
                v = (v < self.shift_expr()?) as i64;
            } else if self.accept(">") {
                v = (v > self.shift_expr()?) as i64;
            } else {
                return Ok(v);
            }
        }
    }

    fn shift_expr(&mut self) -> Result<i64, ParseError> {
        let mut v = self.add_expr()?;
        loop {
            if self.accept("<<") {
                let r = self.add_expr()?;
                v = self.shift(v, r, true)?;
            } else if self.accept(">>") {
                let r = self.add_expr()?;
                v = self.shift(v, r, false)?;
            } else {
                return Ok(v);
            }
        }
    }

    fn shift(&self, v: i64, by: i64, left: bool) -> Result<i64, ParseError> {
        let by = u32::try_from(by)
            .ok()
            .filter(|b| *b < 64)
            .ok_or_else(|| self.error("shift amount out of range"))?;
        Ok(if left { v.wrapping_shl(by) } else { v.wrapping_shr(by) })
    }

    fn add_expr(&mut self) -> Result<i64, ParseError> {
        let mut v = self.mul_expr()?;
        loop {
            if self.accept("+") {
                v = v.wrapping_add(self.mul_expr()?);
            } else if self.accept("-") {
                v = v.wrapping_sub(self.mul_expr()?);
            } else {
                return Ok(v);
            }
        }
    }

    fn mul_expr(&mut self) -> Result<i64, ParseError> {
        let mut v = self.unary_expr()?;
        loop {
            if self.accept("*") {
                v = v.wrapping_mul(self.unary_expr()?);
            } else if self.accept("/") {
                let r = self.unary_expr()?;
                if r == 0 {
                    return Err(self.error("division by zero"));
                }
                v /= r;
            } else if self.accept("%") {
                let r = self.unary_expr()?;
                if r == 0 {
                    return Err(self.error("division by zero"));
                }
                v %= r;
            } else {
                return Ok(v);
            }
        }
    }

    fn unary_expr(&mut self) -> Result<i64, ParseError> {
        if self.accept("!") {
            return Ok((self.unary_expr()? == 0) as i64);
        }
        if self.accept("~") {
            return Ok(!self.unary_expr()?);
        }
        if self.accept("-") {
            return Ok(self.unary_expr()?.wrapping_neg());
        }
        if self.accept("+") {
            return self.unary_expr();
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<i64, ParseError> {
        if self.accept("(") {
            let v = self.or_expr()?;
            if !self.accept(")") {
                return Err(self.error("missing closing parenthesis"));
            }
            return Ok(v);
        }
        match self.peek() {
            Some(c) if c.is_ascii_digit() => self.number(),
            Some(c) if c.is_alphabetic() || c == '_' => {
                let word = self.word();
                match word.as_str() {
                    "true" => Ok(1),
                    "false" => Ok(0),
                    _ => Err(self.error("unexpected word in conditional expression")),
                }
            }
            _ => Err(self.error("expected an operand")),
        }
    }

    fn word(&mut self) -> String {
        let mut out = String::new();
        while let Some(c) = self.chars.get(self.cursor) {
            if c.is_alphanumeric() || *c == '_' {
                out.push(*c);
                self.cursor += 1;
            } else {
                break;
            }
        }
        out
    }

    fn number(&mut self) -> Result<i64, ParseError> {
        let word = self.word();
        // an integer suffix (1L, 0x10UL) is accepted and ignored
        let trimmed = word.trim_end_matches(['u', 'U', 'l', 'L']);
        let parsed = if let Some(hex) = trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
            i64::from_str_radix(hex, 16)
        } else if trimmed.len() > 1 && trimmed.starts_with('0') {
            i64::from_str_radix(&trimmed[1..], 8)
        } else {
            trimmed.parse()
        };
        parsed.map_err(|_| self.error("malformed number in conditional expression"))
    }
}
