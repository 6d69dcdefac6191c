//! Folio lexer: classifies template source one token at a time.
//!
//! The parser drives the lexer, choosing a [`LexContext`] for every call.

pub mod lexer;
pub mod token;

pub use lexer::Lexer;
pub use token::{LexContext, Token, TokenKind, DIRECTIVES, EXPRESSION_KEYWORDS};
