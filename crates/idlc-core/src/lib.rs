//! Core data structures for the IDLC compiler frontend.
//!
//! This crate provides the semantic layer shared by the scanner and the
//! parser delegate:
//! - `ident` - identifier spellings and case-insensitive lookup keys
//! - `pos` - source positions
//! - `annotations` - user annotations attached to definitions
//! - `value` - host representation of IDL constant values
//! - `types` - the IDL type algebra (narrowing, matching, instantiation)
//! - `expr` - constant expression folding with type promotion
//! - `ast` - arena-based AST and symbol table
//! - `bootstrap` - binary persistence of a parsed AST

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub mod annotations;
pub mod ast;
pub mod bootstrap;
pub mod expr;
pub mod ident;
pub mod pos;
pub mod types;
pub mod value;


pub use annotations::{Annotation, AnnotationValue, Annotations};
pub use ast::{
    Ast, CaseLabel, Concrete, InstantiationContext, Node, NodeId, NodeKind, NodeSpec,
    SemanticError, Visitor,
};
pub use bootstrap::{BootstrapError, Snapshot};
pub use expr::{Expr, ExprError, OpKind};
pub use ident::Identifier;
pub use pos::Position;
pub use types::{Bound, Type};
pub use value::Value;

/// Result type for AST and symbol table mutations.
pub type Result<T> = std::result::Result<T, SemanticError>;
