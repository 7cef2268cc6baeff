//! Identifier spellings and case-insensitive lookup keys.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// An IDL identifier.
///
/// Scope lookup is case-insensitive but the exact spelling is significant:
/// reusing an introduced name with different case is a clash, not a match.
/// A keyword-escape underscore (`_interface`) is stripped off the
/// effective name; the spelling as written is retained so consumers can
/// reproduce the source form. Equality and hashing use the effective name,
/// so an escaped spelling denotes the same name as its plain form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identifier {
    name: String,
    spelling: String,
}

impl Identifier {
    pub fn new(spelling: impl Into<String>) -> Self {
        let spelling = spelling.into();
        let name = match spelling.strip_prefix('_') {
            Some(rest) if rest.chars().next().is_some_and(char::is_alphabetic) => {
                rest.to_string()
            }
            _ => spelling.clone(),
        };
        Identifier { name, spelling }
    }

    /// The effective name, escape underscore stripped.
    pub fn as_str(&self) -> &str {
        &self.name
    }

    /// The name as written in source.
    pub fn spelling(&self) -> &str {
        &self.spelling
    }

    pub fn is_escaped(&self) -> bool {
        self.name != self.spelling
    }

    /// Case-folded key used for scope lookups.
    pub fn key(&self) -> String {
        self.name.to_ascii_lowercase()
    }
}

impl PartialEq for Identifier {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Identifier {}

impl Hash for Identifier {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl From<&str> for Identifier {
    fn from(s: &str) -> Self {
        Identifier::new(s)
    }
}
