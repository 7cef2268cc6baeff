//! IDL compiler frontend: scanner, preprocessor and semantic actions.
//!
//! The [`Scanner`] turns IDL text into a preprocessed token stream and
//! reports directive effects to a [`Directives`] sink. The
//! [`Delegator`] is the standard sink: it owns the AST under
//! construction and exposes one method per grammar production for a
//! parser to drive.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub mod delegator;
pub mod diagnostics;
pub mod scanner;

#[cfg(test)]
mod delegator_tests;
#[cfg(test)]
mod scanner_tests;

pub use delegator::Delegator;
pub use diagnostics::{Diagnostic, Diagnostics, Level, ParseError};
pub use scanner::{Directives, Scanner, Token};

use idlc_core::ast::SemanticError;
use idlc_core::bootstrap::BootstrapError;
use idlc_core::expr::ExprError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Semantic(#[from] SemanticError),
    #[error(transparent)]
    Expr(#[from] ExprError),
    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
