//! The build driver.
//!
//! A [`Site`] resolves templates through a [`Resolver`], keeps compiled
//! programs across passes and pages within a pass, and serves as the
//! [`Host`] templates call back into for `get_page`, `get_pages` and asset
//! jobs.
//!
//! Page sets are cached by (template, generation). A set is inserted into the
//! cache before any of its pages render, so a reference that cycles back
//! observes the in-progress page instead of recursing.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::rc::Rc;

use folio_eval::{
    disambiguate, instantiate, render, EvalError, EvalResult, Generation, Host, Limits, Page,
    PageStatus, Template, Value,
};
use folio_types::ast::Program;
use folio_types::CompileErrors;
use serde::Serialize;
use tracing::{debug, error, info, trace, warn};

use crate::cache::{fingerprint, CacheStats, ProgramCache};
use crate::config::SiteConfig;
use crate::error::{SiteError, SiteResult};
use crate::jobs::{Job, JobQueue};
use crate::resolver::{join, normalize, FileHandle, Resolver};
use crate::sink::OutputSink;

/// (template name, generation name)
type PageKey = (String, String);

pub struct Site {
    resolver: Box<dyn Resolver>,
    config: SiteConfig,
    generations: Vec<Rc<Generation>>,
    programs: RefCell<ProgramCache>,
    templates: RefCell<HashMap<String, Rc<Template>>>,
    pages: RefCell<HashMap<PageKey, EvalResult<Vec<Rc<Page>>>>>,
    instantiating: RefCell<HashSet<PageKey>>,
    urls: RefCell<BTreeMap<String, Rc<Page>>>,
    jobs: RefCell<JobQueue>,
    pass: Cell<u64>,
}

impl Site {
    pub fn new(resolver: impl Resolver + 'static, config: SiteConfig) -> Self {
        let generations = config.generations().into_iter().map(Rc::new).collect();
        let programs = ProgramCache::new(config.max_nesting);
        Self {
            resolver: Box::new(resolver),
            config,
            generations,
            programs: RefCell::new(programs),
            templates: RefCell::new(HashMap::new()),
            pages: RefCell::new(HashMap::new()),
            instantiating: RefCell::new(HashSet::new()),
            urls: RefCell::new(BTreeMap::new()),
            jobs: RefCell::new(JobQueue::new()),
            pass: Cell::new(0),
        }
    }

    pub fn config(&self) -> &SiteConfig {
        &self.config
    }

    pub fn resolver(&self) -> &dyn Resolver {
        self.resolver.as_ref()
    }

    pub fn limits(&self) -> Limits {
        self.config.limits()
    }

    pub fn generations(&self) -> &[Rc<Generation>] {
        &self.generations
    }

    pub fn generation(&self, name: &str) -> SiteResult<Rc<Generation>> {
        self.generations
            .iter()
            .find(|g| g.name == name)
            .cloned()
            .ok_or_else(|| SiteError::UnknownGeneration(name.to_string()))
    }

    fn default_generation(&self) -> SiteResult<Rc<Generation>> {
        self.generations
            .first()
            .cloned()
            .ok_or_else(|| SiteError::UnknownGeneration("default".to_string()))
    }

    fn generation_for(&self, from: &Page, name: Option<&str>) -> SiteResult<Rc<Generation>> {
        match name {
            Some(name) => self.generation(name),
            None => Ok(Rc::clone(from.generation())),
        }
    }

    // ── Passes ────────────────────────────────────────────────────────────

    /// Number of passes started so far.
    pub fn pass(&self) -> u64 {
        self.pass.get()
    }

    /// Start a new build pass: forget every page, template and claimed URL.
    /// Compiled programs stay cached and are revalidated by modification
    /// time.
    pub fn begin_pass(&self) {
        self.pass.set(self.pass.get() + 1);
        self.templates.borrow_mut().clear();
        self.pages.borrow_mut().clear();
        self.urls.borrow_mut().clear();
        debug!(pass = self.pass.get(), "build pass started");
    }

    // ── Templates ─────────────────────────────────────────────────────────

    /// Find template `name` as seen from directory `dir`: relative to `dir`
    /// first, then from the root. The template extension is appended when
    /// `name` has none.
    pub fn resolve(&self, dir: &str, name: &str) -> Option<FileHandle> {
        let name = self.config.with_extension(name);
        let mut candidates = Vec::new();
        if !name.starts_with('/') && !dir.is_empty() {
            candidates.extend(join(dir, &name));
        }
        candidates.extend(normalize(&name));
        candidates.iter().find_map(|c| self.resolver.lookup(c))
    }

    /// Whether `handle` is built on its own: a template that is neither a
    /// partial (`_` prefix) nor an initializer.
    pub fn is_page_template(&self, handle: &FileHandle) -> bool {
        self.config.is_template(&handle.basename)
            && !handle.basename.starts_with('_')
            && handle.basename != self.config.initializer
    }

    fn program(&self, handle: &FileHandle) -> SiteResult<Rc<Program>> {
        let compiled = self
            .programs
            .borrow_mut()
            .load(self.resolver.as_ref(), handle)?;
        compiled.program.clone().ok_or_else(|| SiteError::Compile {
            path: handle.name.clone(),
            errors: compiled.errors.clone(),
        })
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.programs.borrow().stats()
    }

    /// Diagnostics of the template at the site-relative `name`.
    pub fn diagnostics(&self, name: &str) -> SiteResult<CompileErrors> {
        let handle = self.resolver.lookup_or_fail(name)?;
        let compiled = self
            .programs
            .borrow_mut()
            .load(self.resolver.as_ref(), &handle)?;
        Ok(compiled.errors.clone())
    }

    /// The template at the site-relative `name` with its ancestor chain:
    /// directory initializers from the root down, then `@extend` targets.
    pub fn template(&self, name: &str) -> SiteResult<Rc<Template>> {
        if let Some(template) = self.templates.borrow().get(name) {
            return Ok(Rc::clone(template));
        }
        let handle = self.resolver.lookup_or_fail(name)?;
        let program = self.program(&handle)?;

        let mut ancestry = Ancestry::default();
        for dir in dir_chain(&handle.local_dir) {
            let Some(initializer) = join(&dir, &self.config.initializer) else {
                continue;
            };
            if initializer == handle.name {
                continue;
            }
            if let Some(initializer) = self.resolver.lookup(&initializer) {
                self.push_ancestor(&initializer, &mut ancestry, &mut Vec::new())?;
            }
        }
        let mut visiting = vec![handle.name.clone()];
        self.push_extends(&handle, &program, &mut ancestry, &mut visiting)?;

        trace!(template = %handle.name, ancestors = ?ancestry.names, "ancestors resolved");
        let template = Rc::new(Template::new(
            handle.name.clone(),
            program,
            ancestry.programs,
        ));
        self.templates
            .borrow_mut()
            .insert(handle.name, Rc::clone(&template));
        Ok(template)
    }

    fn push_ancestor(
        &self,
        handle: &FileHandle,
        ancestry: &mut Ancestry,
        visiting: &mut Vec<String>,
    ) -> SiteResult<()> {
        if ancestry.names.contains(&handle.name) {
            return Ok(());
        }
        if visiting.contains(&handle.name) {
            return Err(SiteError::ExtendCycle(handle.name.clone()));
        }
        let program = self.program(handle)?;
        visiting.push(handle.name.clone());
        self.push_extends(handle, &program, ancestry, visiting)?;
        visiting.pop();
        ancestry.names.push(handle.name.clone());
        ancestry.programs.push(program);
        Ok(())
    }

    fn push_extends(
        &self,
        handle: &FileHandle,
        program: &Program,
        ancestry: &mut Ancestry,
        visiting: &mut Vec<String>,
    ) -> SiteResult<()> {
        for target in &program.extends {
            let target = self
                .resolve(&handle.local_dir, target)
                .ok_or_else(|| SiteError::NotFound(target.clone()))?;
            self.push_ancestor(&target, ancestry, visiting)?;
        }
        Ok(())
    }

    /// Listing of the render routine compiled from `name`.
    pub fn routine_source(&self, name: &str) -> SiteResult<String> {
        let template = self.template(name)?;
        Ok(folio_codegen::emit_routine(&template.program))
    }

    // ── Pages ─────────────────────────────────────────────────────────────

    /// Every page of template `name` for `generation`. The set is created
    /// and rendered on first use within a pass; page failures stay recorded
    /// on the pages.
    pub fn template_pages(
        &self,
        name: &str,
        generation: &Rc<Generation>,
    ) -> EvalResult<Vec<Rc<Page>>> {
        let key = (name.to_string(), generation.name.clone());
        if let Some(set) = self.pages.borrow().get(&key) {
            trace!(template = name, generation = %generation.name, "page cache hit");
            return set.clone();
        }
        if !self.instantiating.borrow_mut().insert(key.clone()) {
            return Err(EvalError::Host(format!(
                "`{name}` refers to itself while instantiating"
            )));
        }
        let created = self
            .template(name)
            .map_err(EvalError::from)
            .and_then(|template| instantiate(&template, generation, self, self.limits()));
        self.instantiating.borrow_mut().remove(&key);

        let pages = match created {
            Ok(pages) => pages,
            Err(e) => {
                error!(template = name, generation = %generation.name, "cannot instantiate: {e}");
                self.pages.borrow_mut().insert(key, Err(e.clone()));
                return Err(e);
            }
        };
        debug!(template = name, generation = %generation.name, count = pages.len(), "page set created");
        self.pages.borrow_mut().insert(key, Ok(pages.clone()));

        for page in &pages {
            if let Err(e) = render(page, self, self.limits()) {
                error!(
                    template = name,
                    generation = %generation.name,
                    key = %page.key().to_text(),
                    "page failed: {e}"
                );
            }
        }
        disambiguate(&pages);
        for page in &pages {
            if page.status() == PageStatus::Rendered && !page.skip() {
                self.register(page);
            }
        }
        Ok(pages)
    }

    fn find_page(
        &self,
        dir: &str,
        name: &str,
        generation: &Rc<Generation>,
        key: Option<&Value>,
    ) -> EvalResult<Rc<Page>> {
        let handle = self
            .resolve(dir, name)
            .ok_or_else(|| SiteError::NotFound(name.to_string()))?;
        let pages = self.template_pages(&handle.name, generation)?;
        let page = match key {
            None => pages.first().cloned(),
            Some(key) => pages
                .iter()
                .find(|p| p.key().strict_eq(key) || p.key().to_text() == key.to_text())
                .cloned(),
        };
        let page = page.ok_or_else(|| {
            EvalError::Host(match key {
                Some(key) => format!("`{}` has no page `{}`", handle.name, key.to_text()),
                None => format!("`{}` has no pages", handle.name),
            })
        })?;
        render(&page, self, self.limits())?;
        Ok(page)
    }

    /// A page of template `name`, resolved from the site root. `key` selects
    /// a page of a repeated set; without one the first page is returned.
    pub fn page(
        &self,
        name: &str,
        generation: Option<&str>,
        key: Option<&Value>,
    ) -> SiteResult<Rc<Page>> {
        let generation = match generation {
            Some(name) => self.generation(name)?,
            None => self.default_generation()?,
        };
        Ok(self.find_page("", name, &generation, key)?)
    }

    /// Claim the output path of `page`. The first claim wins.
    fn register(&self, page: &Rc<Page>) -> bool {
        let path = page.output_path();
        let mut urls = self.urls.borrow_mut();
        match urls.get(&path) {
            Some(owner) if Rc::ptr_eq(owner, page) => true,
            Some(owner) => {
                warn!(
                    path = %path,
                    owner = %owner.template().path,
                    page = %page.template().path,
                    "output path already claimed"
                );
                false
            }
            None => {
                urls.insert(path, Rc::clone(page));
                true
            }
        }
    }

    /// The page that claimed `path` in the current pass.
    pub fn url_owner(&self, path: &str) -> Option<Rc<Page>> {
        self.urls.borrow().get(path).cloned()
    }

    pub fn claimed_paths(&self) -> Vec<String> {
        self.urls.borrow().keys().cloned().collect()
    }

    // ── Jobs ──────────────────────────────────────────────────────────────

    pub fn jobs(&self) -> Vec<Job> {
        self.jobs.borrow().jobs().to_vec()
    }

    /// Hand the queued asset jobs to the executor.
    pub fn take_jobs(&self) -> Vec<Job> {
        self.jobs.borrow_mut().take()
    }

    // ── Build ─────────────────────────────────────────────────────────────

    /// Run a full pass: render every page template for every generation and
    /// write each non-skipped page that owns its output path.
    pub fn build(&self, sink: &mut dyn OutputSink) -> SiteResult<BuildReport> {
        self.begin_pass();
        let pattern = format!("*.{}", self.config.template_extension);
        let templates: Vec<FileHandle> = self
            .resolver
            .list(&pattern)?
            .into_iter()
            .filter(|h| self.is_page_template(h))
            .collect();

        let mut report = BuildReport {
            pass: self.pass.get(),
            ..BuildReport::default()
        };
        for generation in &self.generations {
            for handle in &templates {
                match self.template_pages(&handle.name, generation) {
                    Ok(pages) => {
                        for page in &pages {
                            self.emit(page, sink, &mut report);
                        }
                    }
                    Err(e) => report.failures.push(PageFailure {
                        template: handle.name.clone(),
                        generation: generation.name.clone(),
                        key: None,
                        message: e.to_string(),
                    }),
                }
            }
        }
        report.jobs = self.jobs.borrow().len();

        info!(
            pass = report.pass,
            pages = report.pages.len(),
            failures = report.failures.len(),
            skipped = report.skipped,
            collisions = report.collisions.len(),
            "build pass finished"
        );
        Ok(report)
    }

    fn emit(&self, page: &Rc<Page>, sink: &mut dyn OutputSink, report: &mut BuildReport) {
        let template = page.template().path.clone();
        let generation = page.generation().name.clone();
        let key = page.iteration().map(|_| page.key().to_text());
        let failure = |message: String| PageFailure {
            template: template.clone(),
            generation: generation.clone(),
            key: key.clone(),
            message,
        };

        if page.status() != PageStatus::Rendered {
            let message = page
                .error()
                .map(|e| e.to_string())
                .unwrap_or_else(|| "page did not finish rendering".to_string());
            report.failures.push(failure(message));
            return;
        }
        if page.skip() {
            report.skipped += 1;
            return;
        }
        let path = page.output_path();
        let owned = self
            .urls
            .borrow()
            .get(&path)
            .is_some_and(|owner| Rc::ptr_eq(owner, page));
        if !owned {
            report.collisions.push(path);
            return;
        }
        let output = page.output();
        if let Err(e) = sink.write(&path, &output) {
            error!(path = %path, "{e}");
            report.failures.push(failure(e.to_string()));
            return;
        }
        report.pages.push(RenderedPage {
            url: page.url(),
            digest: fingerprint(&output),
            template: template.clone(),
            generation: generation.clone(),
            key: key.clone(),
            path,
        });
    }
}

impl Host for Site {
    fn get_page(
        &self,
        from: &Page,
        name: &str,
        generation: Option<&str>,
        key: Option<&Value>,
    ) -> EvalResult<Value> {
        let generation = self.generation_for(from, generation)?;
        let page = self.find_page(&from.template().local_dir, name, &generation, key)?;
        Ok(Value::Page(page))
    }

    fn get_pages(&self, from: &Page, pattern: &str, generation: Option<&str>) -> EvalResult<Value> {
        let generation = self.generation_for(from, generation)?;
        let mut pages = Vec::new();
        for handle in self.resolver.list(pattern)? {
            if !self.is_page_template(&handle) {
                continue;
            }
            match self.template_pages(&handle.name, &generation) {
                Ok(set) => pages.extend(
                    set.into_iter()
                        .filter(|p| p.status() != PageStatus::Failed)
                        .map(Value::Page),
                ),
                Err(e) => warn!(template = %handle.name, "left out of get_pages: {e}"),
            }
        }
        Ok(Value::sequence(pages))
    }

    fn copy_file(&self, from: &Page, src: &str, dest: Option<&str>) -> EvalResult<Value> {
        let dir = &from.template().local_dir;
        let src = self.resolver.lookup_or_fail(&locate(dir, src)?)?.name;
        let dest = match dest {
            Some(dest) => locate(dir, dest)?,
            None => src.clone(),
        };
        self.jobs.borrow_mut().schedule(Job::copy(src, dest.as_str()));
        Ok(Value::text(format!("/{dest}")))
    }

    fn process_file(&self, from: &Page, src: &str, dest: &str, transform: &str) -> EvalResult<Value> {
        let dir = &from.template().local_dir;
        let src = self.resolver.lookup_or_fail(&locate(dir, src)?)?.name;
        let dest = locate(dir, dest)?;
        self.jobs
            .borrow_mut()
            .schedule(Job::process(src, dest.as_str(), transform));
        Ok(Value::text(format!("/{dest}")))
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Reports
// ══════════════════════════════════════════════════════════════════════════════

/// A page written by a build pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedPage {
    pub template: String,
    pub generation: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Output path relative to the output root.
    pub path: String,
    pub url: String,
    /// Hex SHA-256 of the written text.
    pub digest: String,
}

/// A page, or a whole template, that produced no output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageFailure {
    pub template: String,
    pub generation: String,
    /// `None` when the template failed before it had pages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub message: String,
}

/// Summary of one build pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildReport {
    pub pass: u64,
    pub pages: Vec<RenderedPage>,
    pub failures: Vec<PageFailure>,
    /// Rendered pages with `skip` set.
    pub skipped: usize,
    /// Output paths a page could not claim because another page had.
    pub collisions: Vec<String>,
    /// Asset jobs queued after the pass.
    pub jobs: usize,
}

impl BuildReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn page(&self, path: &str) -> Option<&RenderedPage> {
        self.pages.iter().find(|p| p.path == path)
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────

#[derive(Default)]
struct Ancestry {
    names: Vec<String>,
    programs: Vec<Rc<Program>>,
}

/// `""`, `"a"`, `"a/b"` for `"a/b"`.
fn dir_chain(local_dir: &str) -> Vec<String> {
    let mut dirs = vec![String::new()];
    let mut current = String::new();
    for part in local_dir.split('/').filter(|p| !p.is_empty()) {
        if !current.is_empty() {
            current.push('/');
        }
        current.push_str(part);
        dirs.push(current.clone());
    }
    dirs
}

/// A site-relative path for `name` as written in a template in `dir`.
fn locate(dir: &str, name: &str) -> SiteResult<String> {
    let located = if name.starts_with('/') {
        normalize(name)
    } else {
        join(dir, name)
    };
    located.ok_or_else(|| SiteError::NotFound(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dir_chain() {
        assert_eq!(dir_chain(""), [""]);
        assert_eq!(dir_chain("a/b"), ["", "a", "a/b"]);
    }

    #[test]
    fn test_locate() {
        assert_eq!(locate("blog", "img/a.png").unwrap(), "blog/img/a.png");
        assert_eq!(locate("blog", "/img/a.png").unwrap(), "img/a.png");
        assert_eq!(locate("blog", "../a.png").unwrap(), "a.png");
        assert!(locate("", "../a.png").is_err());
    }
}
