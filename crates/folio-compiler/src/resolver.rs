//! File resolution: where template sources come from.
//!
//! Names are site-relative, `/`-separated paths such as `blog/post.tpl`.
//! [`MemoryResolver`] keeps sources in memory; [`FsResolver`] reads a
//! directory tree and lists it with the `ignore` walker.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::{Duration, SystemTime};

use ignore::overrides::{Override, OverrideBuilder};
use ignore::WalkBuilder;
use tracing::trace;

use crate::error::{SiteError, SiteResult};

/// A resolved template source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHandle {
    /// Site-relative path, e.g. `blog/post.tpl`.
    pub name: String,
    /// Absolute location of the source.
    pub path: PathBuf,
    /// Directory part of `name`, empty at the root.
    pub local_dir: String,
    /// File name including its extension.
    pub basename: String,
    pub mtime: SystemTime,
}

impl FileHandle {
    pub fn new(name: impl Into<String>, path: PathBuf, mtime: SystemTime) -> Self {
        let name = name.into();
        let (local_dir, basename) = match name.rsplit_once('/') {
            Some((dir, file)) => (dir.to_string(), file.to_string()),
            None => (String::new(), name.clone()),
        };
        Self {
            name,
            path,
            local_dir,
            basename,
            mtime,
        }
    }
}

/// Source of template files.
pub trait Resolver {
    /// Find `name`, a site-relative path.
    fn lookup(&self, name: &str) -> Option<FileHandle>;

    fn lookup_or_fail(&self, name: &str) -> SiteResult<FileHandle> {
        self.lookup(name)
            .ok_or_else(|| SiteError::NotFound(name.to_string()))
    }

    fn read(&self, handle: &FileHandle) -> SiteResult<String>;

    /// Every file matching a gitignore-style glob, sorted by name.
    fn list(&self, pattern: &str) -> SiteResult<Vec<FileHandle>>;
}

/// Normalize a site-relative name: no leading `/`, no `.` segments, `..`
/// resolved. Returns `None` for names escaping the root or naming nothing.
pub fn normalize(name: &str) -> Option<String> {
    let mut parts: Vec<&str> = Vec::new();
    for part in name.split(['/', '\\']) {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            part => parts.push(part),
        }
    }
    (!parts.is_empty()).then(|| parts.join("/"))
}

/// Join a directory and a relative name.
pub fn join(dir: &str, name: &str) -> Option<String> {
    if dir.is_empty() {
        normalize(name)
    } else {
        normalize(&format!("{dir}/{name}"))
    }
}

fn matcher(pattern: &str) -> SiteResult<Override> {
    let invalid = |e: ignore::Error| SiteError::Pattern {
        pattern: pattern.to_string(),
        message: e.to_string(),
    };
    let mut builder = OverrideBuilder::new(".");
    builder.add(pattern).map_err(invalid)?;
    builder.build().map_err(invalid)
}

fn matches(matcher: &Override, name: &str) -> bool {
    matcher.matched(name, false).is_whitelist()
}

// ══════════════════════════════════════════════════════════════════════════════
// In-memory resolver
// ══════════════════════════════════════════════════════════════════════════════

/// Sources held in memory. Clones share the same files, so a caller can
/// keep a handle and edit sources after giving one to a site. Every
/// [`insert`](Self::insert) advances the modification time of the file it
/// touches.
#[derive(Debug, Default, Clone)]
pub struct MemoryResolver {
    files: Rc<RefCell<BTreeMap<String, (String, SystemTime)>>>,
    clock: Rc<Cell<u64>>,
}

impl MemoryResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a file.
    pub fn insert(&self, name: &str, source: impl Into<String>) {
        let Some(name) = normalize(name) else {
            return;
        };
        self.clock.set(self.clock.get() + 1);
        let mtime = SystemTime::UNIX_EPOCH + Duration::from_secs(self.clock.get());
        self.files.borrow_mut().insert(name, (source.into(), mtime));
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(self, name: &str, source: impl Into<String>) -> Self {
        self.insert(name, source);
        self
    }

    pub fn remove(&self, name: &str) -> bool {
        normalize(name).is_some_and(|name| self.files.borrow_mut().remove(&name).is_some())
    }

    fn handle(name: &str, mtime: SystemTime) -> FileHandle {
        FileHandle::new(name, PathBuf::from("/").join(name), mtime)
    }
}

impl Resolver for MemoryResolver {
    fn lookup(&self, name: &str) -> Option<FileHandle> {
        let name = normalize(name)?;
        let mtime = self.files.borrow().get(&name).map(|(_, mtime)| *mtime)?;
        Some(Self::handle(&name, mtime))
    }

    fn read(&self, handle: &FileHandle) -> SiteResult<String> {
        self.files
            .borrow()
            .get(&handle.name)
            .map(|(source, _)| source.clone())
            .ok_or_else(|| SiteError::NotFound(handle.name.clone()))
    }

    fn list(&self, pattern: &str) -> SiteResult<Vec<FileHandle>> {
        let matcher = matcher(pattern)?;
        Ok(self
            .files
            .borrow()
            .iter()
            .filter(|(name, _)| matches(&matcher, name))
            .map(|(name, (_, mtime))| Self::handle(name, *mtime))
            .collect())
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Filesystem resolver
// ══════════════════════════════════════════════════════════════════════════════

/// Sources under a directory on disk. Listing honours `.ignore` files and
/// skips hidden entries.
#[derive(Debug, Clone)]
pub struct FsResolver {
    root: PathBuf,
}

impl FsResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn relative_name(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<&str> = relative
            .components()
            .map(|c| c.as_os_str().to_str())
            .collect::<Option<_>>()?;
        (!parts.is_empty()).then(|| parts.join("/"))
    }
}

impl Resolver for FsResolver {
    fn lookup(&self, name: &str) -> Option<FileHandle> {
        let name = normalize(name)?;
        let path = self.root.join(&name);
        let metadata = std::fs::metadata(&path).ok()?;
        if !metadata.is_file() {
            return None;
        }
        let mtime = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        Some(FileHandle::new(name, path, mtime))
    }

    fn read(&self, handle: &FileHandle) -> SiteResult<String> {
        std::fs::read_to_string(&handle.path).map_err(|e| SiteError::io(&handle.path, e))
    }

    fn list(&self, pattern: &str) -> SiteResult<Vec<FileHandle>> {
        let matcher = matcher(pattern)?;
        let mut handles = Vec::new();
        for entry in WalkBuilder::new(&self.root).build() {
            let entry = entry.map_err(|e| SiteError::Pattern {
                pattern: pattern.to_string(),
                message: e.to_string(),
            })?;
            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }
            let Some(name) = self.relative_name(entry.path()) else {
                continue;
            };
            if !matches(&matcher, &name) {
                continue;
            }
            let mtime = entry
                .metadata()
                .ok()
                .and_then(|m| m.modified().ok())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            handles.push(FileHandle::new(name, entry.path().to_path_buf(), mtime));
        }
        handles.sort_by(|a, b| a.name.cmp(&b.name));
        trace!(pattern, count = handles.len(), "listed");
        Ok(handles)
    }
}
