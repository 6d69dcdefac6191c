//! Page model: templates, generations, iterations and rendered pages.

use std::cell::{Ref, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use folio_types::ast::{BlockDef, Program};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::EvalError;
use crate::value::{MapRef, SeqRef, Value};

// ══════════════════════════════════════════════════════════════════════════════
// Templates & generations
// ══════════════════════════════════════════════════════════════════════════════

/// A compiled template together with its resolved ancestor chain.
#[derive(Debug)]
pub struct Template {
    /// Path relative to the site root, e.g. `blog/post.tpl`.
    pub path: String,
    /// Directory part of `path`, empty at the root.
    pub local_dir: String,
    /// File name without its extension.
    pub stem: String,
    pub program: Rc<Program>,
    /// Ancestor initializers, outermost first.
    pub ancestors: Vec<Rc<Program>>,
}

impl Template {
    pub fn new(path: impl Into<String>, program: Rc<Program>, ancestors: Vec<Rc<Program>>) -> Self {
        let path = path.into();
        let (local_dir, file) = match path.rsplit_once('/') {
            Some((dir, file)) => (dir.to_string(), file),
            None => (String::new(), path.as_str()),
        };
        let stem = match file.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem.to_string(),
            _ => file.to_string(),
        };
        Self {
            local_dir,
            stem,
            path,
            program,
            ancestors,
        }
    }

    /// Every program of the chain, outermost ancestor first.
    pub fn chain(&self) -> impl DoubleEndedIterator<Item = &Rc<Program>> {
        self.ancestors.iter().chain(std::iter::once(&self.program))
    }
}

/// One output flavour of the site: a language, a URL prefix and an
/// extension, plus variables preset in every page of the generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Generation {
    pub name: String,
    pub lang: Option<String>,
    pub prefix: String,
    pub extension: String,
    pub vars: serde_json::Map<String, serde_json::Value>,
}

impl Default for Generation {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            lang: None,
            prefix: String::new(),
            extension: ".html".to_string(),
            vars: serde_json::Map::new(),
        }
    }
}

impl Generation {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Blocks
// ══════════════════════════════════════════════════════════════════════════════

/// One registration of a block by a program of the chain.
#[derive(Debug, Clone)]
pub struct BlockLayer {
    program: Rc<Program>,
    index: usize,
}

impl BlockLayer {
    pub fn def(&self) -> &BlockDef {
        &self.program.blocks[self.index]
    }
}

/// Blocks of a page keyed by name. Each name holds its registrations in
/// registration order; the last one is active.
#[derive(Debug, Default)]
pub struct BlockTable {
    layers: IndexMap<String, Vec<BlockLayer>>,
}

impl BlockTable {
    pub fn register(&mut self, program: &Rc<Program>) {
        for (index, block) in program.blocks.iter().enumerate() {
            self.layers
                .entry(block.name.clone())
                .or_default()
                .push(BlockLayer {
                    program: Rc::clone(program),
                    index,
                });
        }
    }

    /// The registration `depth` levels below the active one.
    pub fn layer(&self, name: &str, depth: usize) -> Option<BlockLayer> {
        let layers = self.layers.get(name)?;
        let index = layers.len().checked_sub(depth + 1)?;
        layers.get(index).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.layers.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.layers.keys().map(String::as_str)
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Pages
// ══════════════════════════════════════════════════════════════════════════════

/// Position of a page within a repeated set.
#[derive(Debug)]
pub struct Iteration {
    pub index: usize,
    pub key: Value,
    pub value: Value,
    pub count: usize,
    pub is_first: bool,
    pub is_last: bool,
    prev: RefCell<Weak<Page>>,
    next: RefCell<Weak<Page>>,
}

impl Iteration {
    pub fn new(index: usize, key: Value, value: Value, count: usize) -> Self {
        Self {
            index,
            key,
            value,
            count,
            is_first: index == 0,
            is_last: index + 1 == count,
            prev: RefCell::new(Weak::new()),
            next: RefCell::new(Weak::new()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageStatus {
    Pending,
    Rendering,
    Rendered,
    Failed,
}

#[derive(Debug)]
struct PageState {
    status: PageStatus,
    blocks: BlockTable,
    output: String,
    slug_suffix: String,
    error: Option<EvalError>,
}

/// One rendering instance of a template for a generation.
pub struct Page {
    template: Rc<Template>,
    generation: Rc<Generation>,
    iteration: Option<Iteration>,
    bindings: MapRef,
    yields: SeqRef,
    state: RefCell<PageState>,
}

impl Page {
    /// Create an unrendered page with its page scope preset from the
    /// generation and the iteration.
    pub fn new(
        template: Rc<Template>,
        generation: Rc<Generation>,
        iteration: Option<Iteration>,
    ) -> Self {
        let mut bindings: IndexMap<String, Value> = generation
            .vars
            .iter()
            .map(|(k, v)| (k.clone(), Value::from_json(v)))
            .collect();
        bindings.insert("generation".to_string(), Value::text(&generation.name));
        bindings.insert(
            "lang".to_string(),
            generation.lang.as_deref().map_or(Value::Null, Value::text),
        );
        if let Some(it) = &iteration {
            bindings.insert("key".to_string(), it.key.clone());
            bindings.insert("value".to_string(), it.value.clone());
            bindings.insert("index".to_string(), Value::Number(it.index as f64));
        }
        Self {
            template,
            generation,
            iteration,
            bindings: Rc::new(RefCell::new(bindings)),
            yields: Rc::new(RefCell::new(Vec::new())),
            state: RefCell::new(PageState {
                status: PageStatus::Pending,
                blocks: BlockTable::default(),
                output: String::new(),
                slug_suffix: String::new(),
                error: None,
            }),
        }
    }

    pub fn template(&self) -> &Rc<Template> {
        &self.template
    }

    pub fn generation(&self) -> &Rc<Generation> {
        &self.generation
    }

    pub fn iteration(&self) -> Option<&Iteration> {
        self.iteration.as_ref()
    }

    pub fn key(&self) -> Value {
        self.iteration.as_ref().map_or(Value::Null, |it| it.key.clone())
    }

    pub fn status(&self) -> PageStatus {
        self.state.borrow().status
    }

    pub fn error(&self) -> Option<EvalError> {
        self.state.borrow().error.clone()
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────

    /// Move from pending to rendering. `false` if the page was already
    /// started.
    pub(crate) fn begin(&self) -> bool {
        let mut state = self.state.borrow_mut();
        if state.status != PageStatus::Pending {
            return false;
        }
        state.status = PageStatus::Rendering;
        for program in self.template.chain() {
            state.blocks.register(program);
        }
        true
    }

    pub(crate) fn finish(&self, output: String) {
        let mut state = self.state.borrow_mut();
        state.output = output;
        state.status = PageStatus::Rendered;
    }

    pub(crate) fn fail(&self, error: EvalError) {
        let mut state = self.state.borrow_mut();
        state.error = Some(error);
        state.status = PageStatus::Failed;
    }

    pub(crate) fn set_output(&self, output: String) {
        self.state.borrow_mut().output = output;
    }

    pub(crate) fn set_slug_suffix(&self, suffix: String) {
        self.state.borrow_mut().slug_suffix = suffix;
    }

    pub(crate) fn link(prev: &Rc<Page>, next: &Rc<Page>) {
        if let Some(it) = &prev.iteration {
            *it.next.borrow_mut() = Rc::downgrade(next);
        }
        if let Some(it) = &next.iteration {
            *it.prev.borrow_mut() = Rc::downgrade(prev);
        }
    }

    // ── Bindings & blocks ─────────────────────────────────────────────────

    pub fn bindings(&self) -> &MapRef {
        &self.bindings
    }

    pub fn binding(&self, name: &str) -> Option<Value> {
        self.bindings.borrow().get(name).cloned()
    }

    pub fn yields(&self) -> &SeqRef {
        &self.yields
    }

    pub fn has_block(&self, name: &str) -> bool {
        self.state.borrow().blocks.contains(name)
    }

    pub fn block_layer(&self, name: &str, depth: usize) -> Option<BlockLayer> {
        self.state.borrow().blocks.layer(name, depth)
    }

    pub fn blocks(&self) -> Ref<'_, BlockTable> {
        Ref::map(self.state.borrow(), |s| &s.blocks)
    }

    pub fn prev(&self) -> Option<Rc<Page>> {
        self.iteration.as_ref()?.prev.borrow().upgrade()
    }

    pub fn next(&self) -> Option<Rc<Page>> {
        self.iteration.as_ref()?.next.borrow().upgrade()
    }

    // ── Identity ──────────────────────────────────────────────────────────

    /// Rendered text, empty until the page has rendered.
    pub fn output(&self) -> String {
        self.state.borrow().output.clone()
    }

    pub fn slug(&self) -> String {
        let base = match self.binding("slug") {
            Some(v) if !v.is_null() => v.to_text(),
            _ => self.template.stem.clone(),
        };
        format!("{base}{}", self.state.borrow().slug_suffix)
    }

    /// Whether an `output` binding overrides the derived path.
    pub fn has_explicit_output(&self) -> bool {
        matches!(self.binding("output"), Some(v) if !v.is_null())
    }

    /// Output path relative to the site root, without a leading slash.
    pub fn output_path(&self) -> String {
        if let Some(v) = self.binding("output") {
            if !v.is_null() {
                return v.to_text().trim_start_matches('/').to_string();
            }
        }
        let prefix = self.generation.prefix.trim_matches('/');
        let file = format!("{}{}", self.slug(), self.generation.extension);
        [prefix, self.template.local_dir.as_str(), file.as_str()]
            .iter()
            .filter(|part| !part.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join("/")
    }

    pub fn url(&self) -> String {
        format!("/{}", self.output_path())
    }

    pub fn skip(&self) -> bool {
        self.binding("skip").is_some_and(|v| v.truthy())
    }

    /// Built-in page properties, as exposed to templates via `page.<name>`.
    pub fn property(&self, name: &str) -> Option<Value> {
        let it = self.iteration.as_ref();
        let page_or_null = |page: Option<Rc<Page>>| page.map_or(Value::Null, Value::Page);
        let value = match name {
            "url" => Value::text(self.url()),
            "slug" => Value::text(self.slug()),
            "output" => Value::text(self.output_path()),
            "content" => Value::text(self.output()),
            "skip" => Value::Bool(self.skip()),
            "yields" => Value::Sequence(Rc::clone(&self.yields)),
            "key" => self.key(),
            "value" => it.map_or(Value::Null, |it| it.value.clone()),
            "index" => it.map_or(Value::Null, |it| Value::Number(it.index as f64)),
            "count" => Value::Number(it.map_or(1, |it| it.count) as f64),
            "is_first" => Value::Bool(it.map_or(true, |it| it.is_first)),
            "is_last" => Value::Bool(it.map_or(true, |it| it.is_last)),
            "prev" => page_or_null(self.prev()),
            "next" => page_or_null(self.next()),
            _ => return None,
        };
        Some(value)
    }
}

impl fmt::Debug for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Page")
            .field("template", &self.template.path)
            .field("generation", &self.generation.name)
            .field("key", &self.key().to_text())
            .field("status", &self.status())
            .finish()
    }
}
