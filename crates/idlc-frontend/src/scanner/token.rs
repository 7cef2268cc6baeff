//! Tokens and the IDL keyword table.

use std::fmt;

/// IDL keywords in their canonical spelling, IDL4 additions included.
pub(crate) const KEYWORDS: &[&str] = &[
    "abstract", "any", "attribute", "boolean", "case", "char", "component", "connector", "const",
    "consumes", "context", "custom", "default", "double", "exception", "emits", "enum",
    "eventtype", "factory", "FALSE", "finder", "fixed", "float", "getraises", "home", "import",
    "in", "inout", "interface", "local", "long", "manages", "mirrorport", "module", "multiple",
    "native", "Object", "octet", "oneway", "out", "port", "porttype", "primarykey", "private",
    "provides", "public", "publishes", "raises", "readonly", "setraises", "sequence", "short",
    "string", "struct", "supports", "switch", "TRUE", "truncatable", "typedef", "typeid",
    "typeprefix", "union", "unsigned", "uses", "ValueBase", "valuetype", "void", "wchar",
    "wstring", "map", "bitfield", "bitmask", "bitset", "int8", "uint8", "int16", "int32", "int64",
    "uint16", "uint32", "uint64",
];

/// Canonical keyword spelling matching `word` case-insensitively.
pub(crate) fn keyword_lookup(word: &str) -> Option<&'static str> {
    KEYWORDS
        .iter()
        .find(|k| k.eq_ignore_ascii_case(word))
        .copied()
}

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Identifier(String),
    /// Canonical keyword spelling.
    Keyword(&'static str),
    Integer(i128),
    Float(f64),
    /// Fixed-point literal digits, without the `d` suffix.
    Fixed(String),
    Char(u8),
    WChar(char),
    Str(String),
    WStr(String),
    /// A single punctuation character.
    Punct(char),
    ScopeSep,
    ShiftLeft,
    ShiftRight,
    Eof,
}

impl Token {
    pub fn is_keyword(&self, kw: &str) -> bool {
        matches!(self, Token::Keyword(k) if *k == kw)
    }

    pub fn is_punct(&self, c: char) -> bool {
        matches!(self, Token::Punct(p) if *p == c)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Identifier(s) => write!(f, "{s}"),
            Token::Keyword(k) => write!(f, "{k}"),
            Token::Integer(v) => write!(f, "{v}"),
            Token::Float(v) => write!(f, "{v}"),
            Token::Fixed(s) => write!(f, "{s}d"),
            Token::Char(c) => write!(f, "'{}'", *c as char),
            Token::WChar(c) => write!(f, "L'{c}'"),
            Token::Str(s) => write!(f, "\"{s}\""),
            Token::WStr(s) => write!(f, "L\"{s}\""),
            Token::Punct(c) => write!(f, "{c}"),
            Token::ScopeSep => write!(f, "::"),
            Token::ShiftLeft => write!(f, "<<"),
            Token::ShiftRight => write!(f, ">>"),
            Token::Eof => write!(f, "<eof>"),
        }
    }
}
