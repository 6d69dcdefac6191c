//! Destinations for rendered pages.

use std::collections::BTreeMap;

use crate::error::SiteResult;

/// Receives the rendered text of every emitted page.
pub trait OutputSink {
    /// Store `content` at the site-relative `path`.
    fn write(&mut self, path: &str, content: &str) -> SiteResult<()>;
}

/// Keeps written pages in memory, ordered by path.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    files: BTreeMap<String, String>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.files.get(path).map(String::as_str)
    }

    pub fn files(&self) -> &BTreeMap<String, String> {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl OutputSink for MemorySink {
    fn write(&mut self, path: &str, content: &str) -> SiteResult<()> {
        self.files.insert(path.to_string(), content.to_string());
        Ok(())
    }
}
