//! Core expression and statement evaluator.

use std::cmp::Ordering;
use std::rc::Rc;

use chrono::NaiveDate;
use folio_types::ast::*;
use folio_types::Position;
use indexmap::IndexMap;
use tracing::warn;

use crate::builtins;
use crate::env::Environment;
use crate::error::{EvalError, EvalResult};
use crate::host::Host;
use crate::output::Output;
use crate::page::Page;
use crate::value::{date_field, Callable, Lambda, RegexValue, Value};

/// Per-page evaluation bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Steps (expressions and statements) a page may take.
    pub gas_limit: u64,
    /// Nesting of function calls and block renders.
    pub max_call_depth: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            gas_limit: 1_000_000,
            max_call_depth: 256,
        }
    }
}

/// Bytes of built or emitted text that cost one unit of gas.
const TEXT_BYTES_PER_GAS: usize = 64;

/// An assignable location.
enum Place {
    Name(String),
    Property(Value, String),
    Slot(Value, Value),
}

/// The core evaluator: walks statements of one page, writing to its output.
pub struct Evaluator<'h> {
    host: &'h dyn Host,
    page: Rc<Page>,
    /// Variable environment over the page scope.
    pub env: Environment,
    out: Output,
    gas: u64,
    limits: Limits,
    depth: usize,
    /// Blocks being rendered, innermost last, with their layer depth.
    block_cursor: Vec<(String, usize)>,
}

impl<'h> Evaluator<'h> {
    pub fn new(host: &'h dyn Host, page: Rc<Page>, limits: Limits) -> Self {
        Self {
            host,
            env: Environment::new(Rc::clone(page.bindings())),
            page,
            out: Output::new(),
            gas: 0,
            limits,
            depth: 0,
            block_cursor: Vec::new(),
        }
    }

    pub fn page(&self) -> &Rc<Page> {
        &self.page
    }

    pub fn host(&self) -> &'h dyn Host {
        self.host
    }

    pub fn gas_used(&self) -> u64 {
        self.gas
    }

    /// Consume one unit of gas. Returns error if exhausted.
    fn tick(&mut self) -> EvalResult<()> {
        self.charge(1)
    }

    /// Consume `amount` units of gas at once.
    pub fn charge(&mut self, amount: u64) -> EvalResult<()> {
        self.gas = self.gas.saturating_add(amount);
        if self.gas > self.limits.gas_limit {
            Err(EvalError::GasExhausted)
        } else {
            Ok(())
        }
    }

    /// Charge for building `len` bytes of text, before allocating them.
    pub fn charge_text(&mut self, len: usize) -> EvalResult<()> {
        self.charge((len / TEXT_BYTES_PER_GAS) as u64)
    }

    /// Text conversion bounded by the call depth limit.
    pub fn text_of(&self, value: &Value) -> EvalResult<String> {
        value.try_to_text(self.limits.max_call_depth)
    }

    pub fn json_of(&self, value: &Value) -> EvalResult<serde_json::Value> {
        value.try_to_json(self.limits.max_call_depth)
    }

    fn enter(&mut self) -> EvalResult<()> {
        if self.depth >= self.limits.max_call_depth {
            return Err(EvalError::CallDepthExceeded(self.limits.max_call_depth));
        }
        self.depth += 1;
        Ok(())
    }

    fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    // ══════════════════════════════════════════════════════════════════════
    // Statements
    // ══════════════════════════════════════════════════════════════════════

    /// Run `stmts` into a fresh output and return the finished text.
    pub fn render(&mut self, stmts: &[Stmt]) -> EvalResult<String> {
        let saved = std::mem::take(&mut self.out);
        let result = self.exec_block(stmts);
        let out = std::mem::replace(&mut self.out, saved);
        result?;
        Ok(out.finish())
    }

    /// Run `stmts` into a detached scope of the current output.
    fn capture(&mut self, stmts: &[Stmt]) -> EvalResult<String> {
        self.out.open_capture();
        let result = self.exec_block(stmts);
        let text = self.out.capture();
        result?;
        Ok(text)
    }

    pub fn exec_block(&mut self, stmts: &[Stmt]) -> EvalResult<()> {
        for stmt in stmts {
            self.exec_stmt(stmt)?;
        }
        Ok(())
    }

    /// Run a directive body in its own output scope.
    fn body(&mut self, stmts: &[Stmt]) -> EvalResult<()> {
        self.out.open();
        let result = self.exec_block(stmts);
        self.out.close();
        result
    }

    fn exec_stmt(&mut self, stmt: &Stmt) -> EvalResult<()> {
        self.tick()
            .and_then(|()| self.exec_kind(&stmt.kind))
            .map_err(|e| e.at(stmt.range.start))
    }

    fn exec_kind(&mut self, kind: &StmtKind) -> EvalResult<()> {
        match kind {
            StmtKind::Text(text) => {
                self.out.push_text(text);
                Ok(())
            }
            StmtKind::Emit(expr) => self.emit(expr),
            StmtKind::If {
                branches,
                otherwise,
            } => {
                for branch in branches {
                    if self.eval(&branch.test)?.truthy() {
                        return self.body(&branch.body);
                    }
                }
                match otherwise {
                    Some(body) => self.body(body),
                    None => Ok(()),
                }
            }
            StmtKind::For {
                key,
                value,
                iterable,
                body,
                otherwise,
            } => self.exec_for(key.as_deref(), value, iterable, body, otherwise.as_deref()),
            StmtKind::While { test, body } => {
                while self.eval(test)?.truthy() {
                    self.body(body)?;
                }
                Ok(())
            }
            StmtKind::Switch {
                subject,
                cases,
                default,
            } => {
                let subject = self.eval(subject)?;
                for case in cases {
                    for value in &case.values {
                        if self.eval(value)?.strict_eq(&subject) {
                            return self.body(&case.body);
                        }
                    }
                }
                match default {
                    Some(body) => self.body(body),
                    None => Ok(()),
                }
            }
            StmtKind::Block { name } => self.render_block(name, 0),
            StmtKind::Super => match self.block_cursor.last().cloned() {
                Some((name, depth)) => self.render_block(&name, depth + 1),
                None => Ok(()),
            },
            StmtKind::Let(bindings) => {
                for binding in bindings {
                    let value = self.eval(&binding.value)?;
                    self.env.define(&binding.name, value);
                }
                Ok(())
            }
            StmtKind::Filter { callee, body } => {
                let text = self.capture(body)?;
                let result = self
                    .eval(callee)
                    .and_then(|f| self.call_value(f, vec![Value::text(text)]))
                    .and_then(|v| self.emit_value(v, callee.range.start));
                self.isolate(result, callee.range.start)
            }
            StmtKind::Lang { langs, body } => {
                if self.lang_matches(langs) {
                    self.body(body)
                } else {
                    Ok(())
                }
            }
            StmtKind::FnDef(def) => {
                let value = Value::Callable(Callable::Template(Rc::clone(def)));
                self.env.define(&def.name, value);
                Ok(())
            }
        }
    }

    fn exec_for(
        &mut self,
        key: Option<&str>,
        value: &str,
        iterable: &Expr,
        body: &[Stmt],
        otherwise: Option<&[Stmt]>,
    ) -> EvalResult<()> {
        let collection = self.eval(iterable)?;
        let entries = entries_of(&collection)?;
        if entries.is_empty() {
            return match otherwise {
                Some(body) => self.body(body),
                None => Ok(()),
            };
        }
        for (k, v) in entries {
            self.env.push_scope();
            if let Some(key) = key {
                self.env.define(key, k);
            }
            self.env.define(value, v);
            let result = self.body(body);
            self.env.pop_scope();
            result?;
        }
        Ok(())
    }

    fn lang_matches(&self, langs: &[String]) -> bool {
        let generation = self.page.generation();
        let current = generation.lang.as_deref().unwrap_or(&generation.name);
        langs.iter().any(|l| l == current)
    }

    // ── Blocks ───────────────────────────────────────────────────────────

    fn render_block(&mut self, name: &str, depth: usize) -> EvalResult<()> {
        let Some(layer) = self.page.block_layer(name, depth) else {
            return Ok(());
        };
        self.enter()?;
        self.block_cursor.push((name.to_string(), depth));
        self.out.open();
        let result = self.exec_block(&layer.def().body);
        self.out.close();
        self.block_cursor.pop();
        self.leave();
        result
    }

    /// Render the active version of a block of `page` to text. A missing
    /// block renders as empty text.
    pub fn block_text(&mut self, page: &Rc<Page>, name: &str) -> EvalResult<Value> {
        if Rc::ptr_eq(page, &self.page) {
            self.out.open_capture();
            let result = self.render_block(name, 0);
            let text = self.out.capture();
            result?;
            return Ok(Value::text(text));
        }
        self.enter()?;
        let mut other = Evaluator::new(self.host, Rc::clone(page), self.limits);
        other.gas = self.gas;
        other.depth = self.depth;
        let result = other.render_block(name, 0);
        self.gas = other.gas;
        self.leave();
        result?;
        Ok(Value::text(other.out.finish()))
    }

    // ── Emission ─────────────────────────────────────────────────────────

    fn emit(&mut self, expr: &Expr) -> EvalResult<()> {
        let result = match expr.kind {
            ExprKind::Assign { .. } | ExprKind::Update { .. } | ExprKind::Yield(_) => {
                self.eval(expr).map(|_| self.out.mark_empty())
            }
            _ => self
                .eval(expr)
                .and_then(|v| self.emit_value(v, expr.range.start)),
        };
        self.isolate(result, expr.range.start)
    }

    /// Write a value to the output, flattening sequences and invoking
    /// callables.
    fn emit_value(&mut self, value: Value, at: Position) -> EvalResult<()> {
        self.emit_nested(value, at, 0)
    }

    fn emit_nested(&mut self, value: Value, at: Position, nesting: usize) -> EvalResult<()> {
        self.tick()?;
        if nesting >= self.limits.max_call_depth {
            return Err(EvalError::NestingTooDeep(self.limits.max_call_depth));
        }
        match value {
            Value::Null => {
                self.out.mark_empty();
                Ok(())
            }
            Value::Sequence(items) => {
                let items = items.borrow().clone();
                if items.is_empty() {
                    self.out.mark_empty();
                }
                for item in items {
                    self.emit_nested(item, at, nesting + 1)?;
                }
                Ok(())
            }
            Value::Callable(callable) => {
                let result = self
                    .call(&callable, Vec::new())
                    .and_then(|v| self.emit_nested(v, at, nesting + 1));
                self.isolate(result, at)
            }
            Value::Page(page) => {
                let text = page.output();
                self.charge_text(text.len())?;
                self.push(&text);
                Ok(())
            }
            other => {
                let text = self.text_of(&other)?;
                self.charge_text(text.len())?;
                self.push(&text);
                Ok(())
            }
        }
    }

    fn push(&mut self, text: &str) {
        if text.is_empty() {
            self.out.mark_empty();
        } else {
            self.out.push_text(text);
        }
    }

    /// Turn a failed emission into an inline diagnostic. Fatal errors pass
    /// through.
    fn isolate(&mut self, result: EvalResult<()>, at: Position) -> EvalResult<()> {
        match result {
            Ok(()) => Ok(()),
            Err(error) if error.is_fatal() => Err(error),
            Err(error) => {
                let position = match &error {
                    EvalError::Located { position, .. } => *position,
                    _ => at,
                };
                let message = error.root().to_string();
                warn!(
                    template = %self.page.template().path,
                    %position,
                    "render error: {message}"
                );
                self.out
                    .push_text(&format!("[render error at {position}: {message}]"));
                Ok(())
            }
        }
    }

    // ══════════════════════════════════════════════════════════════════════
    // Expressions
    // ══════════════════════════════════════════════════════════════════════

    /// Evaluate an expression to a Value.
    pub fn eval(&mut self, expr: &Expr) -> EvalResult<Value> {
        self.tick()?;
        match &expr.kind {
            ExprKind::Null => Ok(Value::Null),
            ExprKind::Bool(b) => Ok(Value::Bool(*b)),
            ExprKind::Number(n) => Ok(Value::Number(*n)),
            ExprKind::Str(s) => Ok(Value::text(s)),
            ExprKind::Template(parts) => {
                let mut text = String::new();
                for part in parts {
                    match part {
                        TemplatePart::Literal(s) => text.push_str(s),
                        TemplatePart::Expr(e) => text.push_str(&self.eval(e)?.to_text()),
                    }
                }
                Ok(Value::text(text))
            }
            ExprKind::Date(d) => date_value(d),
            ExprKind::Regex { pattern, flags } => RegexValue::new(pattern, flags)
                .map(|r| Value::Regex(Rc::new(r)))
                .map_err(|m| EvalError::builtin("RegExp", m)),
            ExprKind::Array(items) => Ok(Value::sequence(self.eval_args(items)?)),
            ExprKind::Object(entries) => {
                let mut map = IndexMap::with_capacity(entries.len());
                for (key, value) in entries {
                    map.insert(key.clone(), self.eval(value)?);
                }
                Ok(Value::map(map))
            }
            ExprKind::Lambda { params, body } => Ok(Value::Callable(Callable::Lambda(Rc::new(
                Lambda {
                    params: params.clone(),
                    body: (**body).clone(),
                },
            )))),

            ExprKind::Ident(name) => Ok(self.lookup(name)),
            ExprKind::Member {
                object,
                property,
                optional,
            } => {
                let object = self.eval(object)?;
                if *optional && object.is_null() {
                    return Ok(Value::Null);
                }
                self.member(&object, property)
            }
            ExprKind::Index { object, index } => {
                let object = self.eval(object)?;
                let index = self.eval(index)?;
                self.index(&object, &index)
            }
            ExprKind::Call { callee, args } | ExprKind::New { callee, args } => {
                let callee = self.eval(callee)?;
                let args = self.eval_args(args)?;
                self.call_value(callee, args)
            }

            ExprKind::Unary { op, operand } => {
                let v = self.eval(operand)?;
                Ok(match op {
                    UnaryOp::Neg => Value::Number(-v.to_number()),
                    UnaryOp::Plus => Value::Number(v.to_number()),
                    UnaryOp::Not => Value::Bool(!v.truthy()),
                    UnaryOp::BitNot => Value::Number(f64::from(!v.to_int32())),
                })
            }
            ExprKind::Update { op, prefix, target } => self.eval_update(*op, *prefix, target),
            ExprKind::Binary { op, left, right } => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                self.apply_binary(*op, &left, &right)
            }
            ExprKind::Logical { op, left, right } => {
                let left = self.eval(left)?;
                let short = match op {
                    LogicalOp::And => !left.truthy(),
                    LogicalOp::Or => left.truthy(),
                    LogicalOp::Coalesce => !left.is_null(),
                };
                if short {
                    Ok(left)
                } else {
                    self.eval(right)
                }
            }
            ExprKind::Conditional {
                test,
                then,
                otherwise,
            } => {
                if self.eval(test)?.truthy() {
                    self.eval(then)
                } else {
                    self.eval(otherwise)
                }
            }
            ExprKind::Assign { op, target, value } => self.eval_assign(*op, target, value),
            ExprKind::Yield(value) => {
                let value = match value {
                    Some(e) => self.eval(e)?,
                    None => Value::Null,
                };
                self.page.yields().borrow_mut().push(value);
                Ok(Value::Null)
            }
        }
    }

    fn eval_args(&mut self, args: &[Expr]) -> EvalResult<Vec<Value>> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.eval(arg)?);
        }
        Ok(values)
    }

    /// Bindings first, then the current page, then builtins. Unknown names
    /// are null.
    fn lookup(&self, name: &str) -> Value {
        if let Some(value) = self.env.get(name) {
            return value;
        }
        if name == "page" {
            return Value::Page(Rc::clone(&self.page));
        }
        builtins::lookup(name).map_or(Value::Null, |b| Value::Callable(Callable::Builtin(b)))
    }

    // ── Access ───────────────────────────────────────────────────────────

    pub fn member(&self, object: &Value, property: &str) -> EvalResult<Value> {
        let found = match object {
            Value::Null => {
                return Err(EvalError::NullAccess {
                    property: property.to_string(),
                })
            }
            Value::Map(entries) => {
                let entries = entries.borrow();
                let found = entries.get(property).cloned();
                found.or_else(|| (property == "length").then(|| Value::Number(entries.len() as f64)))
            }
            Value::Sequence(items) => {
                (property == "length").then(|| Value::Number(items.borrow().len() as f64))
            }
            Value::Text(s) => (property == "length").then(|| Value::Number(s.chars().count() as f64)),
            Value::Date(d) => date_field(d, property),
            Value::Regex(r) => match property {
                "source" => Some(Value::text(&r.source)),
                "flags" => Some(Value::text(&r.flags)),
                "global" => Some(Value::Bool(r.global())),
                _ => None,
            },
            Value::Page(page) => page.property(property).or_else(|| page.binding(property)),
            _ => None,
        };
        Ok(found
            .or_else(|| {
                builtins::method(property).map(|name| {
                    Value::Callable(Callable::Method {
                        name,
                        receiver: Box::new(object.clone()),
                    })
                })
            })
            .unwrap_or(Value::Null))
    }

    pub fn index(&self, object: &Value, index: &Value) -> EvalResult<Value> {
        match object {
            Value::Null => Err(EvalError::NullAccess {
                property: index.to_text(),
            }),
            Value::Sequence(items) => Ok(position(index)
                .and_then(|i| items.borrow().get(i).cloned())
                .unwrap_or(Value::Null)),
            Value::Text(s) => Ok(position(index)
                .and_then(|i| s.chars().nth(i))
                .map_or(Value::Null, |c| Value::text(c.to_string()))),
            Value::Map(_) | Value::Page(_) | Value::Date(_) | Value::Regex(_) => {
                self.member(object, &index.to_text())
            }
            _ => Ok(Value::Null),
        }
    }

    // ── Assignment ───────────────────────────────────────────────────────

    fn place(&mut self, target: &Expr) -> EvalResult<Place> {
        match &target.kind {
            ExprKind::Ident(name) => Ok(Place::Name(name.clone())),
            ExprKind::Member {
                object,
                property,
                optional: false,
            } => Ok(Place::Property(self.eval(object)?, property.clone())),
            ExprKind::Index { object, index } => {
                let object = self.eval(object)?;
                let index = self.eval(index)?;
                Ok(Place::Slot(object, index))
            }
            _ => Err(EvalError::InvalidTarget(target.to_string())),
        }
    }

    fn read(&self, place: &Place) -> EvalResult<Value> {
        match place {
            Place::Name(name) => Ok(self.env.get(name).unwrap_or(Value::Null)),
            Place::Property(object, property) => self.member(object, property),
            Place::Slot(object, index) => self.index(object, index),
        }
    }

    fn write(&mut self, place: &Place, value: Value) -> EvalResult<()> {
        let (object, key) = match place {
            Place::Name(name) => {
                self.env.assign(name, value);
                return Ok(());
            }
            Place::Property(object, property) => (object, Value::text(property)),
            Place::Slot(object, index) => (object, index.clone()),
        };
        match object {
            Value::Map(entries) => {
                entries.borrow_mut().insert(key.to_text(), value);
                Ok(())
            }
            Value::Page(page) => {
                page.bindings().borrow_mut().insert(key.to_text(), value);
                Ok(())
            }
            Value::Sequence(items) => {
                let Some(i) = position(&key) else {
                    return Err(EvalError::InvalidTarget(format!("sequence index {key}")));
                };
                let len = items.borrow().len();
                if i >= len {
                    self.charge((i - len) as u64)?;
                    items.borrow_mut().resize(i + 1, Value::Null);
                }
                items.borrow_mut()[i] = value;
                Ok(())
            }
            Value::Null => Err(EvalError::NullAccess {
                property: key.to_text(),
            }),
            other => Err(EvalError::InvalidTarget(format!(
                "cannot set `{key}` on {}",
                other.type_name()
            ))),
        }
    }

    fn eval_assign(&mut self, op: AssignOp, target: &Expr, value: &Expr) -> EvalResult<Value> {
        let place = self.place(target)?;
        let new = if op == AssignOp::Assign {
            self.eval(value)?
        } else {
            let current = self.read(&place)?;
            match op.binary() {
                Some(bin) => {
                    let rhs = self.eval(value)?;
                    self.apply_binary(bin, &current, &rhs)?
                }
                None if !current.is_null() => return Ok(current),
                None => self.eval(value)?,
            }
        };
        self.write(&place, new.clone())?;
        Ok(new)
    }

    fn eval_update(&mut self, op: UpdateOp, prefix: bool, target: &Expr) -> EvalResult<Value> {
        let place = self.place(target)?;
        let old = self.read(&place)?.to_number();
        let new = match op {
            UpdateOp::Increment => old + 1.0,
            UpdateOp::Decrement => old - 1.0,
        };
        self.write(&place, Value::Number(new))?;
        Ok(Value::Number(if prefix { new } else { old }))
    }

    /// [`binary`] with text concatenation charged by its result length.
    fn apply_binary(&mut self, op: BinOp, left: &Value, right: &Value) -> EvalResult<Value> {
        if op != BinOp::Add || (is_numeric(left) && is_numeric(right)) {
            return binary(op, left, right);
        }
        let mut text = self.text_of(left)?;
        let right = self.text_of(right)?;
        self.charge_text(text.len() + right.len())?;
        text.push_str(&right);
        Ok(Value::text(text))
    }

    // ── Calls ────────────────────────────────────────────────────────────

    pub fn call_value(&mut self, callee: Value, args: Vec<Value>) -> EvalResult<Value> {
        match callee {
            Value::Callable(callable) => self.call(&callable, args),
            other => Err(EvalError::NotCallable(other.type_name().to_string())),
        }
    }

    pub fn call(&mut self, callable: &Callable, args: Vec<Value>) -> EvalResult<Value> {
        match callable {
            Callable::Builtin(name) => builtins::call(self, name, args),
            Callable::Method { name, receiver } => {
                let mut full = Vec::with_capacity(args.len() + 1);
                full.push((**receiver).clone());
                full.extend(args);
                builtins::call(self, name, full)
            }
            Callable::Lambda(lambda) => {
                let lambda = Rc::clone(lambda);
                self.enter()?;
                self.env.push_scope();
                self.bind_params(&lambda.params, args);
                let result = self.eval(&lambda.body);
                self.env.pop_scope();
                self.leave();
                result
            }
            Callable::Template(def) => {
                let def = Rc::clone(def);
                self.enter()?;
                self.env.push_scope();
                self.bind_params(&def.params, args);
                let result = self.capture(&def.body);
                self.env.pop_scope();
                self.leave();
                result.map(Value::text)
            }
        }
    }

    fn bind_params(&mut self, params: &[String], args: Vec<Value>) {
        let mut args = args.into_iter();
        for param in params {
            self.env.define(param, args.next().unwrap_or(Value::Null));
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Operators
// ══════════════════════════════════════════════════════════════════════════════

/// Apply a binary operator to two evaluated operands.
pub fn binary(op: BinOp, left: &Value, right: &Value) -> EvalResult<Value> {
    let num = |f: fn(f64, f64) -> f64| Value::Number(f(left.to_number(), right.to_number()));
    let int = |f: fn(i32, i32) -> i32| Value::Number(f64::from(f(left.to_int32(), right.to_int32())));
    let ordered = |accept: fn(Ordering) -> bool| Value::Bool(left.compare(right).is_some_and(accept));
    Ok(match op {
        BinOp::Add => {
            if is_numeric(left) && is_numeric(right) {
                num(|a, b| a + b)
            } else {
                Value::text(format!("{}{}", left.to_text(), right.to_text()))
            }
        }
        BinOp::Sub => num(|a, b| a - b),
        BinOp::Mul => num(|a, b| a * b),
        BinOp::Div => num(|a, b| a / b),
        BinOp::Rem => num(|a, b| a % b),
        BinOp::Pow => num(f64::powf),
        BinOp::Shl => int(|a, b| a.wrapping_shl(b as u32)),
        BinOp::Shr => int(|a, b| a.wrapping_shr(b as u32)),
        BinOp::UShr => {
            let shifted = (left.to_int32() as u32).wrapping_shr(right.to_int32() as u32);
            Value::Number(f64::from(shifted))
        }
        BinOp::Less => ordered(Ordering::is_lt),
        BinOp::Greater => ordered(Ordering::is_gt),
        BinOp::LessEq => ordered(Ordering::is_le),
        BinOp::GreaterEq => ordered(Ordering::is_ge),
        BinOp::In => Value::Bool(contains(right, left)?),
        BinOp::Eq => Value::Bool(left.strict_eq(right)),
        BinOp::NotEq => Value::Bool(!left.strict_eq(right)),
        BinOp::BitAnd => int(|a, b| a & b),
        BinOp::BitXor => int(|a, b| a ^ b),
        BinOp::BitOr => int(|a, b| a | b),
    })
}

fn is_numeric(value: &Value) -> bool {
    matches!(value, Value::Number(_) | Value::Bool(_) | Value::Null)
}

/// `key in collection`
fn contains(collection: &Value, key: &Value) -> EvalResult<bool> {
    match collection {
        Value::Map(entries) => Ok(entries.borrow().contains_key(key.to_text().as_str())),
        Value::Sequence(items) => Ok(position(key).is_some_and(|i| i < items.borrow().len())),
        Value::Page(page) => Ok(page.binding(&key.to_text()).is_some()),
        Value::Text(s) => Ok(s.contains(key.to_text().as_str())),
        other => Err(EvalError::TypeMismatch(format!(
            "`in` expects a collection, got {}",
            other.type_name()
        ))),
    }
}

/// A non-negative integral index.
fn position(index: &Value) -> Option<usize> {
    let n = index.to_number();
    (n.is_finite() && n >= 0.0 && n.fract() == 0.0).then_some(n as usize)
}

/// Entries visited by `@for`, as (key, value) pairs. The collection is
/// snapshotted so the loop body may modify it.
pub fn entries_of(collection: &Value) -> EvalResult<Vec<(Value, Value)>> {
    Ok(match collection {
        Value::Null => Vec::new(),
        Value::Sequence(items) => items
            .borrow()
            .iter()
            .enumerate()
            .map(|(i, v)| (Value::Number(i as f64), v.clone()))
            .collect(),
        Value::Map(entries) => entries
            .borrow()
            .iter()
            .map(|(k, v)| (Value::text(k), v.clone()))
            .collect(),
        Value::Text(s) => s
            .chars()
            .enumerate()
            .map(|(i, c)| (Value::Number(i as f64), Value::text(c.to_string())))
            .collect(),
        other => return Err(EvalError::NotIterable(other.type_name().to_string())),
    })
}

fn date_value(d: &DateLiteral) -> EvalResult<Value> {
    NaiveDate::from_ymd_opt(d.year, d.month, d.day)
        .and_then(|date| date.and_hms_opt(d.hour, d.minute, d.second))
        .map(Value::Date)
        .ok_or_else(|| {
            EvalError::builtin(
                "Date",
                format!("invalid date {:04}-{:02}-{:02}", d.year, d.month, d.day),
            )
        })
}
