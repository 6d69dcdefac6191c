//! Runtime values.
//!
//! Values follow JavaScript-like dynamic semantics: text concatenation with
//! `+`, 32-bit bitwise operators, and a fixed set of falsy values. Sequences
//! and maps are shared by reference.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use chrono::{Datelike, NaiveDateTime, Timelike};
use folio_types::ast::{format_number, FnDef};
use indexmap::IndexMap;

use crate::error::{EvalError, EvalResult};
use crate::page::Page;

/// Collection nesting the infallible conversions follow before giving up.
pub const MAX_NESTING: usize = 256;

/// Keyed collection with insertion order.
pub type MapRef = Rc<RefCell<IndexMap<String, Value>>>;

/// Sequence shared by reference.
pub type SeqRef = Rc<RefCell<Vec<Value>>>;

#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    Text(Rc<str>),
    Date(NaiveDateTime),
    Regex(Rc<RegexValue>),
    Sequence(SeqRef),
    Map(MapRef),
    Callable(Callable),
    Page(Rc<Page>),
}

/// A compiled regular expression with its literal spelling.
#[derive(Debug)]
pub struct RegexValue {
    pub regex: regex::Regex,
    pub source: String,
    pub flags: String,
}

impl RegexValue {
    /// Compile `source` with JavaScript-style `flags`.
    pub fn new(source: &str, flags: &str) -> Result<Self, String> {
        let regex = regex::RegexBuilder::new(source)
            .case_insensitive(flags.contains('i'))
            .multi_line(flags.contains('m'))
            .dot_matches_new_line(flags.contains('s'))
            .build()
            .map_err(|e| e.to_string())?;
        Ok(Self {
            regex,
            source: source.to_string(),
            flags: flags.to_string(),
        })
    }

    pub fn global(&self) -> bool {
        self.flags.contains('g')
    }
}

/// Something that can be called.
#[derive(Debug, Clone)]
pub enum Callable {
    /// A builtin function by name.
    Builtin(&'static str),
    /// A builtin bound to a receiver: `xs.join` with `xs` as first argument.
    Method {
        name: &'static str,
        receiver: Box<Value>,
    },
    /// `fn(a, b) => expr`
    Lambda(Rc<Lambda>),
    /// `@fn name(a, b) … @end`
    Template(Rc<FnDef>),
}

#[derive(Debug)]
pub struct Lambda {
    pub params: Vec<String>,
    pub body: folio_types::ast::Expr,
}

impl Value {
    pub fn text(text: impl AsRef<str>) -> Self {
        Value::Text(Rc::from(text.as_ref()))
    }

    pub fn sequence(items: Vec<Value>) -> Self {
        Value::Sequence(Rc::new(RefCell::new(items)))
    }

    pub fn map(entries: IndexMap<String, Value>) -> Self {
        Value::Map(Rc::new(RefCell::new(entries)))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::Text(_) => "text",
            Value::Date(_) => "date",
            Value::Regex(_) => "regex",
            Value::Sequence(_) => "sequence",
            Value::Map(_) => "map",
            Value::Callable(_) => "function",
            Value::Page(_) => "page",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Empty text, empty sequence, empty map, 0, NaN, false and null are
    /// falsy; everything else is truthy.
    pub fn truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Text(s) => !s.is_empty(),
            Value::Sequence(items) => !items.borrow().is_empty(),
            Value::Map(entries) => !entries.borrow().is_empty(),
            Value::Date(_) | Value::Regex(_) | Value::Callable(_) | Value::Page(_) => true,
        }
    }

    /// Numeric conversion.
    pub fn to_number(&self) -> f64 {
        match self {
            Value::Null => 0.0,
            Value::Bool(b) => f64::from(u8::from(*b)),
            Value::Number(n) => *n,
            Value::Text(s) => {
                let s = s.trim();
                if s.is_empty() {
                    0.0
                } else if let Some(hex) = s.strip_prefix("0x") {
                    i64::from_str_radix(hex, 16).map_or(f64::NAN, |n| n as f64)
                } else {
                    s.parse().unwrap_or(f64::NAN)
                }
            }
            Value::Date(d) => d.and_utc().timestamp_millis() as f64,
            _ => f64::NAN,
        }
    }

    /// Conversion to a 32-bit integer for bitwise operators.
    pub fn to_int32(&self) -> i32 {
        let n = self.to_number();
        if !n.is_finite() {
            return 0;
        }
        (n.trunc() as i64 & 0xFFFF_FFFF) as u32 as i32
    }

    /// Text conversion. `null` converts to empty text. Collections nested
    /// deeper than [`MAX_NESTING`] (including self-containing ones) convert
    /// to the error text.
    pub fn to_text(&self) -> String {
        self.try_to_text(MAX_NESTING)
            .unwrap_or_else(|error| format!("[{error}]"))
    }

    /// Text conversion failing on collections nested deeper than
    /// `max_depth`.
    pub fn try_to_text(&self, max_depth: usize) -> EvalResult<String> {
        let mut out = String::new();
        self.write_text(&mut out, 0, max_depth)?;
        Ok(out)
    }

    fn write_text(&self, out: &mut String, depth: usize, limit: usize) -> EvalResult<()> {
        match self {
            Value::Null => {}
            Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
            Value::Number(n) => out.push_str(&format_number(*n)),
            Value::Text(s) => out.push_str(s),
            Value::Date(d) => out.push_str(&d.format("%Y-%m-%dT%H:%M:%S").to_string()),
            Value::Regex(r) => out.push_str(&format!("/{}/{}", r.source, r.flags)),
            Value::Sequence(items) => {
                let depth = nested(depth, limit)?;
                for (i, item) in items.borrow().iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    item.write_text(out, depth, limit)?;
                }
            }
            Value::Map(_) => out.push_str(&self.json_within(depth, limit)?.to_string()),
            Value::Callable(_) => out.push_str("[function]"),
            Value::Page(page) => out.push_str(&page.output()),
        }
        Ok(())
    }

    /// Strict equality: primitives by value, shared values by identity.
    pub fn strict_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::Regex(a), Value::Regex(b)) => Rc::ptr_eq(a, b),
            (Value::Sequence(a), Value::Sequence(b)) => Rc::ptr_eq(a, b),
            (Value::Map(a), Value::Map(b)) => Rc::ptr_eq(a, b),
            (Value::Page(a), Value::Page(b)) => Rc::ptr_eq(a, b),
            (Value::Callable(a), Value::Callable(b)) => match (a, b) {
                (Callable::Builtin(x), Callable::Builtin(y)) => x == y,
                (Callable::Lambda(x), Callable::Lambda(y)) => Rc::ptr_eq(x, y),
                (Callable::Template(x), Callable::Template(y)) => Rc::ptr_eq(x, y),
                _ => false,
            },
            _ => false,
        }
    }

    /// Ordering used by relational operators and `sort`.
    ///
    /// Two texts compare lexically, two dates chronologically, anything else
    /// numerically. `None` when the numbers are unordered (NaN).
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
            _ => self.to_number().partial_cmp(&other.to_number()),
        }
    }

    // ── JSON ──────────────────────────────────────────────────────────────

    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::text(s),
            serde_json::Value::Array(items) => {
                Value::sequence(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(entries) => Value::map(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// JSON conversion. Collections nested deeper than [`MAX_NESTING`]
    /// convert to `null`.
    pub fn to_json(&self) -> serde_json::Value {
        self.try_to_json(MAX_NESTING)
            .unwrap_or(serde_json::Value::Null)
    }

    /// JSON conversion failing on collections nested deeper than
    /// `max_depth`.
    pub fn try_to_json(&self, max_depth: usize) -> EvalResult<serde_json::Value> {
        self.json_within(0, max_depth)
    }

    fn json_within(&self, depth: usize, limit: usize) -> EvalResult<serde_json::Value> {
        Ok(match self {
            Value::Null | Value::Callable(_) => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) if n.fract() == 0.0 && n.abs() < 9.0e15 => {
                serde_json::Value::from(*n as i64)
            }
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Text(s) => serde_json::Value::String(s.to_string()),
            Value::Date(_) | Value::Regex(_) => serde_json::Value::String(self.to_text()),
            Value::Sequence(items) => {
                let depth = nested(depth, limit)?;
                serde_json::Value::Array(
                    items
                        .borrow()
                        .iter()
                        .map(|v| v.json_within(depth, limit))
                        .collect::<EvalResult<_>>()?,
                )
            }
            Value::Map(entries) => {
                let depth = nested(depth, limit)?;
                serde_json::Value::Object(
                    entries
                        .borrow()
                        .iter()
                        .map(|(k, v)| Ok((k.clone(), v.json_within(depth, limit)?)))
                        .collect::<EvalResult<_>>()?,
                )
            }
            Value::Page(page) => serde_json::Value::String(page.url()),
        })
    }
}

/// One level below `depth`, or an error past `limit`.
fn nested(depth: usize, limit: usize) -> EvalResult<usize> {
    if depth >= limit {
        Err(EvalError::NestingTooDeep(limit))
    } else {
        Ok(depth + 1)
    }
}

/// Named date components, as exposed by `date.year` and friends.
pub fn date_field(date: &NaiveDateTime, field: &str) -> Option<Value> {
    let n = match field {
        "year" => date.year() as f64,
        "month" => date.month() as f64,
        "day" => date.day() as f64,
        "hour" => date.hour() as f64,
        "minute" => date.minute() as f64,
        "second" => date.second() as f64,
        "iso" => return Some(Value::text(date.format("%Y-%m-%dT%H:%M:%S").to_string())),
        _ => return None,
    };
    Some(Value::Number(n))
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::text(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness() {
        for falsy in [
            Value::Null,
            Value::Bool(false),
            Value::Number(0.0),
            Value::Number(f64::NAN),
            Value::text(""),
            Value::sequence(vec![]),
            Value::map(IndexMap::new()),
        ] {
            assert!(!falsy.truthy(), "{falsy:?}");
        }
        assert!(Value::text("0").truthy());
        assert!(Value::sequence(vec![Value::Null]).truthy());
    }

    #[test]
    fn test_to_text() {
        assert_eq!(Value::Null.to_text(), "");
        assert_eq!(Value::Number(3.0).to_text(), "3");
        assert_eq!(Value::Number(0.25).to_text(), "0.25");
        let seq = Value::sequence(vec![Value::Number(1.0), Value::text("a")]);
        assert_eq!(seq.to_text(), "1,a");
    }

    #[test]
    fn test_self_containing_sequence_stops_at_the_limit() {
        let seq = Value::sequence(vec![Value::Number(1.0)]);
        if let Value::Sequence(items) = &seq {
            items.borrow_mut().push(seq.clone());
        }
        assert!(matches!(seq.try_to_text(8), Err(EvalError::NestingTooDeep(8))));
        assert!(matches!(seq.try_to_json(8), Err(EvalError::NestingTooDeep(8))));
        assert_eq!(seq.to_json(), serde_json::Value::Null);
        assert!(seq.to_text().contains("nested deeper than 256 levels"));
    }

    #[test]
    fn test_nesting_within_the_limit() {
        let inner = Value::sequence(vec![Value::Number(2.0)]);
        let outer = Value::sequence(vec![Value::Number(1.0), inner]);
        assert_eq!(outer.try_to_text(2).unwrap(), "1,2");
        assert!(outer.try_to_text(1).is_err());
    }

    #[test]
    fn test_to_number() {
        assert_eq!(Value::text(" 42 ").to_number(), 42.0);
        assert_eq!(Value::text("").to_number(), 0.0);
        assert!(Value::text("abc").to_number().is_nan());
        assert_eq!(Value::Bool(true).to_number(), 1.0);
    }

    #[test]
    fn test_to_int32_wraps() {
        assert_eq!(Value::Number(4294967297.0).to_int32(), 1);
        assert_eq!(Value::Number(-1.5).to_int32(), -1);
        assert_eq!(Value::Number(f64::INFINITY).to_int32(), 0);
    }

    #[test]
    fn test_strict_eq() {
        assert!(Value::text("a").strict_eq(&Value::text("a")));
        assert!(!Value::Number(1.0).strict_eq(&Value::text("1")));
        assert!(!Value::Number(f64::NAN).strict_eq(&Value::Number(f64::NAN)));
        let seq = Value::sequence(vec![]);
        assert!(seq.strict_eq(&seq.clone()));
        assert!(!seq.strict_eq(&Value::sequence(vec![])));
    }

    #[test]
    fn test_json_conversion() {
        let json: serde_json::Value = serde_json::from_str(r#"{"b": 1, "a": [true, null]}"#).unwrap();
        let value = Value::from_json(&json);
        let Value::Map(entries) = &value else {
            panic!("expected a map");
        };
        assert_eq!(entries.borrow().len(), 2);
        assert_eq!(value.to_json()["a"], serde_json::json!([true, null]));
    }

    #[test]
    fn test_regex_flags() {
        let re = RegexValue::new("abc", "gi").unwrap();
        assert!(re.global());
        assert!(re.regex.is_match("xABCx"));
    }
}
