//! Folio runtime: values, pages and the tree-walking evaluator.
//!
//! Renders compiled [`Program`](folio_types::ast::Program)s directly from the
//! AST. A [`Template`] bundles a program with its ancestor chain;
//! [`instantiate`] turns it into one or more [`Page`]s for a
//! [`Generation`], and [`render`] runs the lifecycle of a page against a
//! [`Host`], the build driver's view of the rest of the site.
//!
//! # Example
//!
//! ```
//! use std::rc::Rc;
//! use folio_eval::{render_all, Generation, Limits, NullHost, Template};
//!
//! let program = folio_parser::compile("hello.tpl", "Hello @{ upper('world') }!").unwrap();
//! let template = Rc::new(Template::new("hello.tpl", Rc::new(program), Vec::new()));
//! let pages = render_all(&template, &Rc::new(Generation::default()), &NullHost, Limits::default()).unwrap();
//! assert_eq!(pages[0].output(), "Hello WORLD!");
//! assert_eq!(pages[0].url(), "/hello.html");
//! ```

pub mod builtins;
pub mod creator;
pub mod env;
pub mod error;
pub mod evaluator;
pub mod host;
pub mod output;
pub mod page;
pub mod value;

pub use creator::{disambiguate, instantiate, render, render_all};
pub use error::{EvalError, EvalResult};
pub use evaluator::{Evaluator, Limits};
pub use host::{Host, NullHost};
pub use output::Output;
pub use page::{BlockTable, Generation, Iteration, Page, PageStatus, Template};
pub use value::{Callable, MapRef, SeqRef, Value};
