//! Builtin functions available to template expressions.
//!
//! Builtins are plain functions over [`Value`]s. Most of them are also
//! reachable as methods, with the receiver passed as the first argument:
//! `xs.join(", ")` is `join(xs, ", ")`.

use std::cmp::Ordering;
use std::fmt::Write as _;
use std::rc::Rc;

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::error::{EvalError, EvalResult};
use crate::evaluator::Evaluator;
use crate::value::{RegexValue, Value};

/// Every builtin name.
pub const BUILTINS: &[&str] = &[
    "len",
    "upper",
    "lower",
    "trim",
    "join",
    "split",
    "replace",
    "range",
    "keys",
    "values",
    "first",
    "last",
    "sort",
    "reverse",
    "json",
    "escape",
    "test",
    "format_date",
    "Date",
    "RegExp",
    "get_page",
    "get_pages",
    "copy_file",
    "process_file",
    "block",
];

/// Builtins that take no receiver.
const FUNCTIONS_ONLY: &[&str] = &[
    "range",
    "Date",
    "RegExp",
    "get_page",
    "get_pages",
    "copy_file",
    "process_file",
];

pub fn lookup(name: &str) -> Option<&'static str> {
    BUILTINS.iter().copied().find(|b| *b == name)
}

/// The builtin a `value.name` access binds to, if any.
pub fn method(name: &str) -> Option<&'static str> {
    lookup(name).filter(|b| !FUNCTIONS_ONLY.contains(b))
}

/// Call a builtin by name.
pub fn call(ev: &mut Evaluator<'_>, name: &str, args: Vec<Value>) -> EvalResult<Value> {
    match name {
        "len" => len(&arg(&args, 0)),
        "upper" => Ok(Value::text(arg(&args, 0).to_text().to_uppercase())),
        "lower" => Ok(Value::text(arg(&args, 0).to_text().to_lowercase())),
        "trim" => Ok(Value::text(arg(&args, 0).to_text().trim())),
        "join" => {
            let items = sequence(name, &args, 0)?;
            let sep = match arg(&args, 1) {
                Value::Null => ",".to_string(),
                sep => sep.to_text(),
            };
            let parts = items
                .iter()
                .map(|item| ev.text_of(item))
                .collect::<EvalResult<Vec<_>>>()?;
            let len = parts.iter().map(String::len).sum::<usize>() + sep.len() * parts.len();
            ev.charge_text(len)?;
            Ok(Value::text(parts.join(&sep)))
        }
        "split" => split(&arg(&args, 0).to_text(), &arg(&args, 1)),
        "replace" => {
            let text = ev.text_of(&arg(&args, 0))?;
            let replaced = replace(&text, &arg(&args, 1), &arg(&args, 2).to_text())?;
            ev.charge_text(replaced.to_text().len())?;
            Ok(replaced)
        }
        "range" => range(ev, &args),
        "keys" => keys(&arg(&args, 0)),
        "values" => match arg(&args, 0) {
            Value::Map(entries) => Ok(Value::sequence(entries.borrow().values().cloned().collect())),
            _ => Ok(Value::sequence(sequence(name, &args, 0)?)),
        },
        "first" | "last" => {
            let target = arg(&args, 0);
            let found = match &target {
                Value::Text(s) => {
                    let c = if name == "first" { s.chars().next() } else { s.chars().last() };
                    c.map(|c| Value::text(c.to_string()))
                }
                _ => {
                    let items = sequence(name, &args, 0)?;
                    if name == "first" {
                        items.first().cloned()
                    } else {
                        items.last().cloned()
                    }
                }
            };
            Ok(found.unwrap_or(Value::Null))
        }
        "sort" => sort(ev, &args),
        "reverse" => match arg(&args, 0) {
            Value::Text(s) => Ok(Value::text(s.chars().rev().collect::<String>())),
            _ => {
                let mut items = sequence(name, &args, 0)?;
                items.reverse();
                Ok(Value::sequence(items))
            }
        },
        "json" => {
            let json = ev.json_of(&arg(&args, 0))?;
            let text = if arg(&args, 1).truthy() {
                serde_json::to_string_pretty(&json)
            } else {
                serde_json::to_string(&json)
            };
            let text = text.map_err(|e| EvalError::builtin(name, e.to_string()))?;
            ev.charge_text(text.len())?;
            Ok(Value::text(text))
        }
        "escape" => Ok(Value::text(escape(&arg(&args, 0).to_text()))),
        "test" => match (arg(&args, 0), arg(&args, 1)) {
            (Value::Regex(re), subject) | (subject, Value::Regex(re)) => {
                Ok(Value::Bool(re.regex.is_match(&subject.to_text())))
            }
            (haystack, needle) => Ok(Value::Bool(haystack.to_text().contains(&needle.to_text()))),
        },
        "format_date" => format_date(&arg(&args, 0), &arg(&args, 1)),
        "Date" => date(&args),
        "RegExp" => RegexValue::new(&arg(&args, 0).to_text(), &arg(&args, 1).to_text())
            .map(|r| Value::Regex(Rc::new(r)))
            .map_err(|m| EvalError::builtin(name, m)),
        "get_page" => {
            let target = arg(&args, 0).to_text();
            let (generation, key) = match arg(&args, 1) {
                Value::Text(g) => (Some(g.to_string()), None),
                Value::Map(opts) => {
                    let opts = opts.borrow();
                    let generation = opts
                        .get("generation")
                        .filter(|v| !v.is_null())
                        .map(Value::to_text);
                    (generation, opts.get("key").cloned())
                }
                _ => (None, None),
            };
            let page = Rc::clone(ev.page());
            ev.host()
                .get_page(&page, &target, generation.as_deref(), key.as_ref())
        }
        "get_pages" => {
            let pattern = arg(&args, 0).to_text();
            let generation = optional_text(&arg(&args, 1));
            let page = Rc::clone(ev.page());
            ev.host().get_pages(&page, &pattern, generation.as_deref())
        }
        "copy_file" => {
            let src = arg(&args, 0).to_text();
            let dest = optional_text(&arg(&args, 1));
            let page = Rc::clone(ev.page());
            ev.host().copy_file(&page, &src, dest.as_deref())
        }
        "process_file" => {
            let src = arg(&args, 0).to_text();
            let dest = arg(&args, 1).to_text();
            let transform = arg(&args, 2).to_text();
            let page = Rc::clone(ev.page());
            ev.host().process_file(&page, &src, &dest, &transform)
        }
        "block" => match arg(&args, 0) {
            Value::Page(page) => ev.block_text(&page, &arg(&args, 1).to_text()),
            target => {
                let page = Rc::clone(ev.page());
                ev.block_text(&page, &target.to_text())
            }
        },
        other => Err(EvalError::NotCallable(other.to_string())),
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────

fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or(Value::Null)
}

fn optional_text(value: &Value) -> Option<String> {
    (!value.is_null()).then(|| value.to_text())
}

/// A snapshot of a sequence argument. Null is an empty sequence.
fn sequence(name: &str, args: &[Value], index: usize) -> EvalResult<Vec<Value>> {
    match arg(args, index) {
        Value::Sequence(items) => Ok(items.borrow().clone()),
        Value::Null => Ok(Vec::new()),
        other => Err(EvalError::builtin(
            name,
            format!("expected a sequence, got {}", other.type_name()),
        )),
    }
}

fn len(value: &Value) -> EvalResult<Value> {
    let n = match value {
        Value::Null => 0,
        Value::Text(s) => s.chars().count(),
        Value::Sequence(items) => items.borrow().len(),
        Value::Map(entries) => entries.borrow().len(),
        other => {
            return Err(EvalError::builtin(
                "len",
                format!("{} has no length", other.type_name()),
            ))
        }
    };
    Ok(Value::Number(n as f64))
}

fn keys(value: &Value) -> EvalResult<Value> {
    let keys = match value {
        Value::Null => Vec::new(),
        Value::Map(entries) => entries.borrow().keys().map(Value::text).collect(),
        Value::Page(page) => page.bindings().borrow().keys().map(Value::text).collect(),
        Value::Sequence(items) => (0..items.borrow().len())
            .map(|i| Value::Number(i as f64))
            .collect(),
        other => {
            return Err(EvalError::builtin(
                "keys",
                format!("{} has no keys", other.type_name()),
            ))
        }
    };
    Ok(Value::sequence(keys))
}

fn split(text: &str, separator: &Value) -> EvalResult<Value> {
    let parts: Vec<Value> = match separator {
        Value::Null => vec![Value::text(text)],
        Value::Regex(re) => re.regex.split(text).map(Value::text).collect(),
        sep => {
            let sep = sep.to_text();
            if sep.is_empty() {
                text.chars().map(|c| Value::text(c.to_string())).collect()
            } else {
                text.split(sep.as_str()).map(Value::text).collect()
            }
        }
    };
    Ok(Value::sequence(parts))
}

/// Text patterns replace their first occurrence; regex patterns replace
/// every match when global, `$1` referring to capture groups.
fn replace(text: &str, pattern: &Value, replacement: &str) -> EvalResult<Value> {
    let replaced = match pattern {
        Value::Regex(re) if re.global() => re.regex.replace_all(text, replacement).into_owned(),
        Value::Regex(re) => re.regex.replace(text, replacement).into_owned(),
        pattern => text.replacen(pattern.to_text().as_str(), replacement, 1),
    };
    Ok(Value::text(replaced))
}

fn range(ev: &mut Evaluator<'_>, args: &[Value]) -> EvalResult<Value> {
    let (start, end, step) = match args.len() {
        0 => return Err(EvalError::builtin("range", "expected an end")),
        1 => (0.0, args[0].to_number(), 1.0),
        2 => (args[0].to_number(), args[1].to_number(), 1.0),
        _ => (args[0].to_number(), args[1].to_number(), args[2].to_number()),
    };
    if step == 0.0 || !step.is_finite() || !start.is_finite() || !end.is_finite() {
        return Err(EvalError::builtin("range", "bounds and step must be finite, step non-zero"));
    }
    let count = ((end - start) / step).ceil().max(0.0) as u64;
    ev.charge(count)?;
    Ok(Value::sequence(
        (0..count).map(|i| Value::Number(start + i as f64 * step)).collect(),
    ))
}

fn sort(ev: &mut Evaluator<'_>, args: &[Value]) -> EvalResult<Value> {
    let items = sequence("sort", args, 0)?;
    ev.charge(items.len() as u64)?;
    let sorted = match args.get(1) {
        Some(Value::Callable(compare)) => {
            let compare = compare.clone();
            let mut failure = None;
            let sorted = merge_sort(items, &mut |a, b| {
                if failure.is_some() {
                    return Ordering::Equal;
                }
                match ev.call(&compare, vec![a.clone(), b.clone()]) {
                    Ok(v) => v.to_number().partial_cmp(&0.0).unwrap_or(Ordering::Equal),
                    Err(e) => {
                        failure = Some(e);
                        Ordering::Equal
                    }
                }
            });
            if let Some(e) = failure {
                return Err(e);
            }
            sorted
        }
        _ => merge_sort(items, &mut |a, b| a.compare(b).unwrap_or(Ordering::Equal)),
    };
    Ok(Value::sequence(sorted))
}

/// Stable sort that tolerates comparators without a total order.
fn merge_sort(items: Vec<Value>, compare: &mut dyn FnMut(&Value, &Value) -> Ordering) -> Vec<Value> {
    if items.len() <= 1 {
        return items;
    }
    let mut left = items;
    let right = left.split_off(left.len() / 2);
    let left = merge_sort(left, compare);
    let right = merge_sort(right, compare);
    let mut merged = Vec::with_capacity(left.len() + right.len());
    let mut left = left.into_iter().peekable();
    let mut right = right.into_iter().peekable();
    loop {
        let take_right = match (left.peek(), right.peek()) {
            (Some(a), Some(b)) => compare(b, a) == Ordering::Less,
            _ => break,
        };
        let next = if take_right { right.next() } else { left.next() };
        merged.extend(next);
    }
    merged.extend(left);
    merged.extend(right);
    merged
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

fn format_date(date: &Value, format: &Value) -> EvalResult<Value> {
    let Value::Date(date) = date else {
        return Err(EvalError::builtin(
            "format_date",
            format!("expected a date, got {}", date.type_name()),
        ));
    };
    let format = match format {
        Value::Null => "%Y-%m-%d".to_string(),
        f => f.to_text(),
    };
    if StrftimeItems::new(&format).any(|item| matches!(item, Item::Error)) {
        return Err(EvalError::builtin("format_date", format!("invalid format `{format}`")));
    }
    let mut out = String::new();
    write!(out, "{}", date.format(&format))
        .map_err(|_| EvalError::builtin("format_date", format!("cannot format with `{format}`")))?;
    Ok(Value::text(out))
}

const DATE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M"];

/// `Date(text)`, `Date(millis)` or `Date(year, month, day[, hour, minute, second])`.
fn date(args: &[Value]) -> EvalResult<Value> {
    let invalid = |detail: String| EvalError::builtin("Date", detail);
    match args {
        [] => Err(invalid("expected arguments".to_string())),
        [Value::Date(d)] => Ok(Value::Date(*d)),
        [Value::Text(s)] => {
            let s = s.trim();
            DATE_FORMATS
                .iter()
                .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
                .or_else(|| {
                    NaiveDate::parse_from_str(s, "%Y-%m-%d")
                        .ok()
                        .and_then(|d| d.and_hms_opt(0, 0, 0))
                })
                .map(Value::Date)
                .ok_or_else(|| invalid(format!("cannot parse `{s}`")))
        }
        [millis] => DateTime::from_timestamp_millis(millis.to_number() as i64)
            .map(|d| Value::Date(d.naive_utc()))
            .ok_or_else(|| invalid(format!("timestamp {millis} out of range"))),
        parts => {
            let n = |i: usize| parts.get(i).map_or(0.0, Value::to_number);
            let day = parts.get(2).map_or(1.0, Value::to_number);
            NaiveDate::from_ymd_opt(n(0) as i32, n(1) as u32, day as u32)
                .and_then(|d| d.and_hms_opt(n(3) as u32, n(4) as u32, n(5) as u32))
                .map(Value::Date)
                .ok_or_else(|| invalid("components out of range".to_string()))
        }
    }
}
