//! Compiled-program cache keyed by template name.
//!
//! An entry is fresh while its recorded modification time is at least the
//! file's current one. A stale entry whose source still has the same SHA-256
//! fingerprint is revalidated without recompiling.

use std::collections::HashMap;
use std::rc::Rc;
use std::time::SystemTime;

use folio_parser::Parser;
use folio_types::ast::Program;
use folio_types::{CompileErrors, SourceFile};
use sha2::{Digest, Sha256};
use tracing::{debug, error, trace};

use crate::error::SiteResult;
use crate::resolver::{FileHandle, Resolver};

/// The outcome of compiling one template source.
#[derive(Debug)]
pub struct Compiled {
    pub name: String,
    pub mtime: SystemTime,
    /// Hex SHA-256 of the source text.
    pub fingerprint: String,
    /// `None` when `errors` holds an error.
    pub program: Option<Rc<Program>>,
    pub errors: CompileErrors,
}

/// Counters for cache behaviour over the cache's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: usize,
    /// Stale entries revalidated by fingerprint.
    pub reused: usize,
    pub compiled: usize,
}

#[derive(Debug)]
pub struct ProgramCache {
    entries: HashMap<String, Rc<Compiled>>,
    max_nesting: usize,
    stats: CacheStats,
}

pub fn fingerprint(source: &str) -> String {
    format!("{:x}", Sha256::digest(source.as_bytes()))
}

impl ProgramCache {
    pub fn new(max_nesting: usize) -> Self {
        Self {
            entries: HashMap::new(),
            max_nesting,
            stats: CacheStats::default(),
        }
    }

    /// The compiled form of `handle`, compiling it if needed.
    pub fn load(&mut self, resolver: &dyn Resolver, handle: &FileHandle) -> SiteResult<Rc<Compiled>> {
        let cached = self.entries.get(&handle.name).cloned();
        if let Some(entry) = &cached {
            if entry.mtime >= handle.mtime {
                self.stats.hits += 1;
                trace!(template = %handle.name, "program cache hit");
                return Ok(Rc::clone(entry));
            }
        }

        let source = resolver.read(handle)?;
        let fingerprint = fingerprint(&source);
        let compiled = match cached {
            Some(entry) if entry.fingerprint == fingerprint => {
                self.stats.reused += 1;
                debug!(template = %handle.name, "source unchanged, program reused");
                Compiled {
                    name: handle.name.clone(),
                    mtime: handle.mtime,
                    fingerprint,
                    program: entry.program.clone(),
                    errors: entry.errors.clone(),
                }
            }
            _ => {
                self.stats.compiled += 1;
                self.compile(handle, &source, fingerprint)
            }
        };
        let compiled = Rc::new(compiled);
        self.entries
            .insert(handle.name.clone(), Rc::clone(&compiled));
        Ok(compiled)
    }

    fn compile(&self, handle: &FileHandle, source: &str, fingerprint: String) -> Compiled {
        let source_file = SourceFile::new(handle.name.as_str(), source);
        let result = Parser::new(&source_file)
            .max_nesting(self.max_nesting)
            .parse();
        if result.errors.has_errors() {
            error!(
                template = %handle.name,
                errors = result.errors.total_errors,
                "compile failed"
            );
            for diagnostic in &result.errors.errors {
                error!("{diagnostic}");
            }
        } else {
            debug!(template = %handle.name, "compiled");
        }
        Compiled {
            name: handle.name.clone(),
            mtime: handle.mtime,
            fingerprint,
            program: result.program.map(Rc::new),
            errors: result.errors,
        }
    }

    pub fn get(&self, name: &str) -> Option<Rc<Compiled>> {
        self.entries.get(name).cloned()
    }

    pub fn invalidate(&mut self, name: &str) -> bool {
        self.entries.remove(name).is_some()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
