//! Binary persistence of a parsed AST.
//!
//! A preprocessing run can dump its result and a later run can pick it up
//! without re-parsing the IDL sources. The snapshot carries the arena plus
//! the include registry keyed by include path.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::ast::{Ast, NodeId};

#[derive(Error, Debug)]
pub enum BootstrapError {
    #[error("encoding AST snapshot failed: {0}")]
    Encode(#[source] postcard::Error),
    #[error("decoding AST snapshot failed: {0}")]
    Decode(#[source] postcard::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A serialized parse result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub ast: Ast,
    /// Include nodes by the path they were included as.
    pub includes: IndexMap<String, NodeId>,
}

impl Snapshot {
    pub fn new(ast: Ast, includes: IndexMap<String, NodeId>) -> Self {
        Snapshot { ast, includes }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, BootstrapError> {
        postcard::to_allocvec(self).map_err(BootstrapError::Encode)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Snapshot, BootstrapError> {
        postcard::from_bytes(bytes).map_err(BootstrapError::Decode)
    }

    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<(), BootstrapError> {
        std::fs::write(path, self.to_bytes()?)?;
        Ok(())
    }

    pub fn read_from(path: impl AsRef<Path>) -> Result<Snapshot, BootstrapError> {
        Snapshot::from_bytes(&std::fs::read(path)?)
    }
}
