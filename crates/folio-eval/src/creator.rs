//! Page lifecycle: instantiation, repetition and rendering.
//!
//! A template instantiates into one page, or into one page per entry of its
//! `@repeat` collection. Rendering a page runs the chain in this order:
//!
//! 1. Ancestor bodies, outermost first, output discarded.
//! 2. The template body, producing the page output.
//! 3. Postinit hooks, the template's own first and then the ancestors'
//!    innermost first. Each sees the output so far as `content`; a hook that
//!    renders something other than whitespace replaces the output.

use std::collections::HashMap;
use std::rc::Rc;

use folio_types::whitespace;
use tracing::{debug, trace, warn};

use crate::error::{EvalError, EvalResult};
use crate::evaluator::{Evaluator, Limits};
use crate::host::Host;
use crate::page::{Generation, Iteration, Page, PageStatus, Template};
use crate::value::Value;

/// Create the unrendered pages of `template` for `generation`.
pub fn instantiate(
    template: &Rc<Template>,
    generation: &Rc<Generation>,
    host: &dyn Host,
    limits: Limits,
) -> EvalResult<Vec<Rc<Page>>> {
    let Some(repeat) = &template.program.repeat else {
        return Ok(vec![Rc::new(Page::new(
            Rc::clone(template),
            Rc::clone(generation),
            None,
        ))]);
    };

    let scratch = Rc::new(Page::new(Rc::clone(template), Rc::clone(generation), None));
    let mut ev = Evaluator::new(host, scratch, limits);
    for ancestor in &template.ancestors {
        ev.render(&ancestor.body)?;
    }
    let collection = ev.eval(repeat).map_err(|e| e.at(repeat.range.start))?;
    let entries: Vec<(Value, Value)> = match &collection {
        Value::Map(entries) => entries
            .borrow()
            .iter()
            .map(|(k, v)| (Value::text(k), v.clone()))
            .collect(),
        Value::Sequence(items) => items
            .borrow()
            .iter()
            .enumerate()
            .map(|(i, v)| (Value::Number(i as f64), v.clone()))
            .collect(),
        other => {
            return Err(
                EvalError::NotACollection(other.type_name().to_string()).at(repeat.range.start)
            )
        }
    };

    let count = entries.len();
    let pages: Vec<Rc<Page>> = entries
        .into_iter()
        .enumerate()
        .map(|(index, (key, value))| {
            Rc::new(Page::new(
                Rc::clone(template),
                Rc::clone(generation),
                Some(Iteration::new(index, key, value, count)),
            ))
        })
        .collect();
    for pair in pages.windows(2) {
        Page::link(&pair[0], &pair[1]);
    }
    debug!(template = %template.path, generation = %generation.name, count, "repeated");
    Ok(pages)
}

/// Render `page` unless it was already started. A failure is recorded on the
/// page and returned.
pub fn render(page: &Rc<Page>, host: &dyn Host, limits: Limits) -> EvalResult<()> {
    if !page.begin() {
        return match page.status() {
            PageStatus::Failed => Err(page
                .error()
                .unwrap_or_else(|| EvalError::Host("page failed".to_string()))),
            _ => Ok(()),
        };
    }
    trace!(template = %page.template().path, key = %page.key(), "rendering");
    match run(page, host, limits) {
        Ok(output) => {
            page.finish(output);
            Ok(())
        }
        Err(error) => {
            page.fail(error.clone());
            Err(error)
        }
    }
}

fn run(page: &Rc<Page>, host: &dyn Host, limits: Limits) -> EvalResult<String> {
    let template = Rc::clone(page.template());
    let mut ev = Evaluator::new(host, Rc::clone(page), limits);

    for ancestor in &template.ancestors {
        ev.render(&ancestor.body)?;
    }
    let mut output = ev.render(&template.program.body)?;
    page.set_output(output.clone());

    for program in template.chain().rev() {
        let Some(postinit) = &program.postinit else {
            continue;
        };
        ev.env.define_page("content", Value::text(&output));
        let wrapped = ev.render(postinit)?;
        if !whitespace::is_blank(&wrapped) {
            output = wrapped;
            page.set_output(output.clone());
        }
    }
    debug!(template = %template.path, gas = ev.gas_used(), "rendered");
    Ok(output)
}

/// Suffix repeated pages whose slugs collide with `-<key>`.
pub fn disambiguate(pages: &[Rc<Page>]) {
    let mut counts: HashMap<String, usize> = HashMap::new();
    let candidates: Vec<&Rc<Page>> = pages
        .iter()
        .filter(|p| p.iteration().is_some() && !p.has_explicit_output())
        .collect();
    for page in &candidates {
        *counts.entry(page.slug()).or_default() += 1;
    }
    for page in candidates {
        if counts.get(&page.slug()).is_some_and(|n| *n > 1) {
            page.set_slug_suffix(format!("-{}", page.key().to_text()));
        }
    }
}

/// Instantiate and render every page of a template. Page failures are
/// returned alongside the pages rather than aborting the set.
pub fn render_all(
    template: &Rc<Template>,
    generation: &Rc<Generation>,
    host: &dyn Host,
    limits: Limits,
) -> EvalResult<Vec<Rc<Page>>> {
    let pages = instantiate(template, generation, host, limits)?;
    for page in &pages {
        // Failures stay recorded on the page.
        if let Err(error) = render(page, host, limits) {
            warn!(
                template = %template.path,
                key = %page.key(),
                %error,
                "page failed"
            );
        }
    }
    disambiguate(&pages);
    Ok(pages)
}
