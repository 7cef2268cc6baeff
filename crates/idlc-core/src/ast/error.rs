//! Semantic errors raised by AST and symbol table operations.

use thiserror::Error;

use crate::expr::ExprError;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SemanticError {
    #[error("anonymous type definitions are not allowed: {context}")]
    AnonymousType { context: String },
    #[error("fixed number of digits exceeds 31: {digits}")]
    InvalidFixedDigits { digits: u16 },

    #[error("{name} is already defined")]
    Redefinition { name: String },
    #[error("{name} is already introduced as {existing} in {scope}")]
    AlreadyIntroduced { name: String, existing: String, scope: String },
    #[error("definition of {name} clashed with earlier definition of {existing}")]
    NameClash { name: String, existing: String },
    #[error("cannot define a {kind} in a {scope_kind}")]
    NotDefinable { kind: &'static str, scope_kind: &'static str },
    #[error("{kind} {name} cannot be overridden")]
    CannotOverride { name: String, kind: &'static str },
    #[error("annotations with forward declaration of {name} are not allowed")]
    AnnotationsOnForward { name: String },
    #[error("cannot find a definition named {name}")]
    UnknownName { name: String },
    #[error("{name} is an invalid reference here")]
    InvalidReference { name: String },
    #[error("{name} is ambiguous: {first} and {second}")]
    AmbiguousName { name: String, first: String, second: String },

    #[error("invalid base for {name}: {reason}")]
    InvalidBase { name: String, reason: String },
    #[error("circular inheritance detected for {name}: {base}")]
    CircularInheritance { name: String, base: String },
    #[error("base {base} of {name} is not defined")]
    UndefinedBase { name: String, base: String },
    #[error("{base} is inherited by {name} more than once")]
    DuplicateBase { name: String, base: String },
    #[error("{name} inherits duplicated operations or attributes from {base}")]
    DuplicateInherited { name: String, base: String },

    #[error("incomplete type {typename} not allowed here: {context}")]
    IncompleteType { typename: String, context: String },
    #[error("local type {typename} not allowed for {context}")]
    LocalType { typename: String, context: String },
    #[error("exception {typename} is not allowed as {context}")]
    ExceptionAsType { typename: String, context: String },

    #[error("invalid switch type {typename}")]
    InvalidSwitchType { typename: String },
    #[error("duplicate case label {label}")]
    DuplicateCaseLabel { label: String },
    #[error("duplicate 'default' case label")]
    DuplicateDefault,
    #[error("'default' case label superfluous: all possible case label values covered")]
    SuperfluousDefault,

    #[error("bit bound {value} exceeds maximum of {max}")]
    BitBound { value: u16, max: u16 },

    #[error("invalid prefix {prefix:?}")]
    InvalidPrefix { prefix: String },
    #[error("invalid repository id {id:?} for {name}")]
    InvalidRepoId { name: String, id: String },
    #[error("conflicting repository id for {name}: {existing} and {new_id}")]
    RepoIdConflict { name: String, existing: String, new_id: String },
    #[error("conflicting repository version for {name}: id {id} and version {version}")]
    RepoVersionConflict { name: String, id: String, version: String },

    #[error("missing template parameter {param}")]
    MissingTemplateParameter { param: String },
    #[error("anonymous type definitions are not allowed as template argument for {param}")]
    AnonymousTemplateArgument { param: String },
    #[error("template parameter mismatch for {param}: {reason}")]
    TemplateParamMismatch { param: String, reason: String },

    #[error("{literal} is not a valid literal value")]
    InvalidLiteral { literal: String },
    #[error("'context' phrases are not supported")]
    ContextNotSupported,

    #[error(transparent)]
    Expr(#[from] ExprError),
}
