//! Folio site driver: resolves templates, caches compiled programs and
//! rendered pages, and runs build passes.
//!
//! ```text
//! Resolver → ProgramCache (lex + parse) → Template + ancestors
//!          → instantiate (repeat) → render (init / body / postinit) → OutputSink
//! ```
//!
//! # Example
//!
//! ```
//! use folio_compiler::{MemoryResolver, MemorySink, Site, SiteConfig};
//!
//! let resolver = MemoryResolver::new()
//!     .with("_init.tpl", "@postinit\n<main>@content</main>\n@end\n")
//!     .with("index.tpl", "Hello");
//! let site = Site::new(resolver, SiteConfig::default());
//! let mut sink = MemorySink::new();
//! let report = site.build(&mut sink).unwrap();
//! assert!(report.is_success());
//! assert_eq!(sink.get("index.html"), Some("<main>Hello</main>\n"));
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod jobs;
pub mod logging;
pub mod resolver;
pub mod site;
pub mod sink;

pub use cache::{CacheStats, Compiled, ProgramCache};
pub use config::SiteConfig;
pub use error::{SiteError, SiteResult};
pub use jobs::{Job, JobQueue};
pub use resolver::{FileHandle, FsResolver, MemoryResolver, Resolver};
pub use site::{BuildReport, PageFailure, RenderedPage, Site};
pub use sink::{MemorySink, OutputSink};
