//! Annotation parsing (`@id`, `@id(value)`, `@id(key=value, ...)`).

use idlc_core::annotations::{Annotation, AnnotationValue};
use idlc_core::pos::Position;
use idlc_core::value::Value;

use crate::Error;

use super::token::Token;
use super::{Directives, Scanner};

impl<D: Directives> Scanner<D> {
    pub(crate) fn unlex(&mut self, stashed: (Token, Position)) {
        self.relexed = Some(stashed);
    }

    /// Parses one annotation; the `@` is already consumed.
    pub(crate) fn parse_annotation(&mut self) -> Result<Annotation, Error> {
        let (tok, _) = self.lex()?;
        let id = match tok {
            Token::Identifier(s) => s,
            // annotation ids may collide with keywords (@default)
            Token::Keyword(k) => k.to_string(),
            other => return Err(self.error(format!("expected annotation name, got '{other}'"))),
        };
        let mut annotation = Annotation::new(id);
        if self.input.peek() == Some('(') {
            self.input.bump();
            self.annotation_body(&mut annotation)?;
        }
        Ok(annotation)
    }

    fn annotation_body(&mut self, annotation: &mut Annotation) -> Result<(), Error> {
        let first = self.lex()?;
        if first.0.is_punct(')') {
            return Ok(());
        }
        self.unlex(first);

        let mut positional = Vec::new();
        loop {
            let (tok, _) = self.lex()?;
            match tok {
                Token::Identifier(name) => {
                    let next = self.lex()?;
                    if next.0.is_punct('=') {
                        let value = self.annotation_value()?;
                        annotation.fields.insert(name, value);
                    } else {
                        self.unlex(next);
                        let value = self.annotation_value_from(Token::Identifier(name))?;
                        positional.push(value);
                    }
                }
                tok => positional.push(self.annotation_value_from(tok)?),
            }
            let (delim, _) = self.lex()?;
            if delim.is_punct(')') {
                break;
            }
            if !delim.is_punct(',') {
                return Err(self.error(format!("expected ',' or ')' in annotation, got '{delim}'")));
            }
        }

        match positional.len() {
            0 => {}
            1 => {
                if let Some(value) = positional.pop() {
                    annotation.fields.insert("value".to_string(), value);
                }
            }
            _ => {
                annotation
                    .fields
                    .insert("value".to_string(), AnnotationValue::List(positional));
            }
        }
        Ok(())
    }

    fn annotation_value(&mut self) -> Result<AnnotationValue, Error> {
        let (tok, _) = self.lex()?;
        self.annotation_value_from(tok)
    }

    fn annotation_value_from(&mut self, tok: Token) -> Result<AnnotationValue, Error> {
        Ok(match tok {
            Token::Integer(v) => AnnotationValue::Literal(Value::Int(v)),
            Token::Float(v) => AnnotationValue::Literal(Value::Float(v)),
            Token::Fixed(s) => AnnotationValue::Literal(Value::Fixed(s)),
            Token::Char(c) => AnnotationValue::Literal(Value::Char(c)),
            Token::WChar(c) => AnnotationValue::Literal(Value::WChar(c)),
            Token::Str(s) => AnnotationValue::Literal(Value::Str(s)),
            Token::WStr(s) => AnnotationValue::Literal(Value::WStr(s)),
            Token::Keyword("TRUE") => AnnotationValue::Literal(Value::Bool(true)),
            Token::Keyword("FALSE") => AnnotationValue::Literal(Value::Bool(false)),
            Token::Keyword(k) => AnnotationValue::Symbol(k.to_string()),
            Token::Identifier(first) => {
                let mut name = first;
                loop {
                    let next = self.lex()?;
                    if next.0 == Token::ScopeSep {
                        let (part, _) = self.lex()?;
                        match part {
                            Token::Identifier(p) => {
                                name.push_str("::");
                                name.push_str(&p);
                            }
                            other => {
                                return Err(self
                                    .error(format!("expected identifier after '::', got '{other}'")));
                            }
                        }
                    } else {
                        self.unlex(next);
                        break;
                    }
                }
                AnnotationValue::Symbol(name)
            }
            Token::Punct('-') => {
                let (num, _) = self.lex()?;
                match num {
                    Token::Integer(v) => AnnotationValue::Literal(Value::Int(-v)),
                    Token::Float(v) => AnnotationValue::Literal(Value::Float(-v)),
                    other => {
                        return Err(self.error(format!("expected number after '-', got '{other}'")));
                    }
                }
            }
            Token::Punct(open @ ('[' | '{')) => {
                let close = if open == '[' { ']' } else { '}' };
                let mut items = Vec::new();
                let first = self.lex()?;
                if !first.0.is_punct(close) {
                    self.unlex(first);
                    loop {
                        items.push(self.annotation_value()?);
                        let (delim, _) = self.lex()?;
                        if delim.is_punct(close) {
                            break;
                        }
                        if !delim.is_punct(',') {
                            return Err(self.error(format!(
                                "expected ',' or '{close}' in annotation list, got '{delim}'"
                            )));
                        }
                    }
                }
                AnnotationValue::List(items)
            }
            Token::Punct('@') => AnnotationValue::Nested(Box::new(self.parse_annotation()?)),
            other => {
                return Err(self.error(format!("unexpected annotation value '{other}'")));
            }
        })
    }
}
