//! Folio parser: compiles template source into a [`Program`].
//!
//! Expressions are parsed by a Pratt parser driven by an [`OperatorTable`];
//! the template driver handles literal text, directives and whitespace.

pub mod operators;
mod parse_expr;
mod parse_template;
mod parser;

use folio_types::ast::Program;
use folio_types::SourceFile;

pub use operators::{Led, LedFn, Nud, NudFn, OperatorTable};
pub use parser::{ExprResult, ParseResult, Parser, DEFAULT_MAX_NESTING, MAX_EXPRESSION_DEPTH};

/// Compile a template with the standard operator table.
pub fn parse(source_file: &SourceFile) -> ParseResult {
    Parser::new(source_file).parse()
}

/// Parse a standalone expression.
pub fn parse_expression(source: &str) -> ExprResult {
    let source_file = SourceFile::new("<expression>", source);
    Parser::new(&source_file).parse_expression()
}

/// Compile a template, returning only the program if it has no errors.
pub fn compile(name: &str, source: &str) -> Option<Program> {
    parse(&SourceFile::new(name, source)).program
}
