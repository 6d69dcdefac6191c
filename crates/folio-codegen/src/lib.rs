//! Folio routine emitter: renders a compiled [`folio_types::ast::Program`]
//! as render-routine source text.
//!
//! # Layout
//!
//! ```text
//! const extend = ["base.tpl"];          // only with @extend
//!
//! function init(scope, out) {
//!   out.text("Hello ");
//!   out.emit(scope.name);
//!   return out.finish();
//! }
//!
//! function postinit(scope, out) { … }   // only with @postinit
//! function repeat(scope) { … }          // only with @repeat
//!
//! blocks["title"] = function (scope, out) { … };
//! ```
//!
//! Expressions are spliced in as their canonical fragments. The listing is
//! for inspection; the evaluator runs the program tree directly.

pub mod routine;
pub mod source_map;

pub use routine::{emit_routine, emit_routine_with_source_map};
pub use source_map::{FuncKind, SourceMap, SourceMapEntry};
