//! Shared types for the Folio template compiler.
//!
//! This crate defines the AST node types, source positions, diagnostics,
//! and the whitespace rules shared by the compiler and the runtime.

mod error;
mod span;
pub mod ast;
pub mod whitespace;

pub use error::{CompileErrors, ErrorCategory, ErrorCode, FolioError, Severity, MAX_ERRORS};
pub use span::{Position, Range, SourceFile};

/// Result type used throughout the Folio compiler.
pub type Result<T> = std::result::Result<T, FolioError>;
