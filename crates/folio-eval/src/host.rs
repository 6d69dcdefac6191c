//! The build driver as seen from templates.

use crate::error::{EvalError, EvalResult};
use crate::page::Page;
use crate::value::Value;

/// Services a template can reach during rendering: other pages and the
/// asset job queue.
///
/// Implementations hand out pages that are already rendered, or the
/// in-progress page when a reference cycles back to it.
pub trait Host {
    /// Resolve `name` relative to the requesting page and return one of its
    /// pages. `key` selects a page of a repeated set.
    fn get_page(
        &self,
        from: &Page,
        name: &str,
        generation: Option<&str>,
        key: Option<&Value>,
    ) -> EvalResult<Value>;

    /// Every page of every template matching `pattern`.
    fn get_pages(&self, from: &Page, pattern: &str, generation: Option<&str>) -> EvalResult<Value>;

    /// Schedule a verbatim copy and return the destination URL.
    fn copy_file(&self, from: &Page, src: &str, dest: Option<&str>) -> EvalResult<Value>;

    /// Schedule a transforming copy and return the destination URL.
    fn process_file(&self, from: &Page, src: &str, dest: &str, transform: &str) -> EvalResult<Value>;
}

/// A host with nothing behind it, for rendering a template on its own.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullHost;

impl Host for NullHost {
    fn get_page(&self, _: &Page, name: &str, _: Option<&str>, _: Option<&Value>) -> EvalResult<Value> {
        Err(EvalError::Host(format!("no page `{name}`")))
    }

    fn get_pages(&self, _: &Page, _: &str, _: Option<&str>) -> EvalResult<Value> {
        Ok(Value::sequence(Vec::new()))
    }

    fn copy_file(&self, _: &Page, src: &str, _: Option<&str>) -> EvalResult<Value> {
        Err(EvalError::Host(format!("cannot copy `{src}` without a site")))
    }

    fn process_file(&self, _: &Page, src: &str, _: &str, _: &str) -> EvalResult<Value> {
        Err(EvalError::Host(format!("cannot process `{src}` without a site")))
    }
}
