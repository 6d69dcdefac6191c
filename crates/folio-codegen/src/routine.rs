//! Routine listing emitter.
//!
//! Walks a compiled [`Program`] and writes one listing line per statement,
//! recording a [`SourceMap`] entry for every line that stems from a template
//! statement.

use folio_types::ast::*;
use folio_types::Range;

use crate::source_map::{FuncKind, SourceMap};

const INDENT: &str = "  ";

// ══════════════════════════════════════════════════════════════════════════════
// Public API
// ══════════════════════════════════════════════════════════════════════════════

/// Render `program` as render-routine source text.
pub fn emit_routine(program: &Program) -> String {
    emit_routine_with_source_map(program).0
}

/// Render `program` and return the listing together with its source map.
pub fn emit_routine_with_source_map(program: &Program) -> (String, SourceMap) {
    let mut w = Writer::new();
    w.raw(&format!("// compiled from {}", program.name));
    if !program.extends.is_empty() {
        let targets: Vec<String> = program.extends.iter().map(|t| quote(t)).collect();
        w.raw(&format!("const extend = [{}];", targets.join(", ")));
    }

    w.blank();
    w.function("init", FuncKind::Init, |w| w.stmts(&program.body));

    if let Some(postinit) = &program.postinit {
        w.blank();
        w.function("postinit", FuncKind::Postinit, |w| w.stmts(postinit));
    }

    if let Some(repeat) = &program.repeat {
        w.blank();
        w.enter("repeat", FuncKind::Repeat);
        w.raw("function repeat(scope) {");
        w.depth += 1;
        w.line(&format!("return {repeat};"), repeat.range);
        w.depth -= 1;
        w.raw("}");
    }

    for block in &program.blocks {
        w.blank();
        w.enter(&block.name, FuncKind::Block);
        w.line(
            &format!("blocks[{}] = function (scope, out) {{", quote(&block.name)),
            block.range,
        );
        w.routine_body(&block.body, "};");
    }

    (w.out, w.map)
}

// ══════════════════════════════════════════════════════════════════════════════
// Writer
// ══════════════════════════════════════════════════════════════════════════════

struct Writer {
    out: String,
    map: SourceMap,
    /// 1-based number of the next line to be written.
    next_line: u32,
    depth: usize,
    func_name: String,
    func_kind: FuncKind,
}

impl Writer {
    fn new() -> Self {
        Self {
            out: String::new(),
            map: SourceMap::new(),
            next_line: 1,
            depth: 0,
            func_name: String::new(),
            func_kind: FuncKind::Init,
        }
    }

    fn enter(&mut self, name: &str, kind: FuncKind) {
        self.func_name = name.to_string();
        self.func_kind = kind;
    }

    /// Write a line that does not map to a template statement.
    fn raw(&mut self, text: &str) {
        for _ in 0..self.depth {
            self.out.push_str(INDENT);
        }
        self.out.push_str(text);
        self.out.push('\n');
        self.next_line += 1;
    }

    /// Write a line mapped to `range`.
    fn line(&mut self, text: &str, range: Range) {
        let func_name = self.func_name.clone();
        self.map.push(self.next_line, func_name, self.func_kind, range);
        self.raw(text);
    }

    fn blank(&mut self) {
        self.out.push('\n');
        self.next_line += 1;
    }

    /// `function name(scope, out) { … return out.finish(); }`
    fn function(&mut self, name: &str, kind: FuncKind, body: impl FnOnce(&mut Self)) {
        self.enter(name, kind);
        self.raw(&format!("function {name}(scope, out) {{"));
        self.depth += 1;
        body(self);
        self.raw("return out.finish();");
        self.depth -= 1;
        self.raw("}");
    }

    /// A nested body closed by `close`.
    fn body(&mut self, stmts: &[Stmt], close: &str) {
        self.nested(stmts);
        self.raw(close);
    }

    /// A body that renders into its own buffer and returns it.
    fn routine_body(&mut self, stmts: &[Stmt], close: &str) {
        self.depth += 1;
        self.stmts(stmts);
        self.raw("return out.finish();");
        self.depth -= 1;
        self.raw(close);
    }

    fn nested(&mut self, stmts: &[Stmt]) {
        self.depth += 1;
        self.stmts(stmts);
        self.depth -= 1;
    }

    fn stmts(&mut self, stmts: &[Stmt]) {
        for stmt in stmts {
            self.stmt(stmt);
        }
    }

    fn stmt(&mut self, stmt: &Stmt) {
        let r = stmt.range;
        match &stmt.kind {
            StmtKind::Text(text) => self.line(&format!("out.text({});", quote(text)), r),
            StmtKind::Emit(expr) => self.line(&format!("out.emit({expr});"), r),
            StmtKind::If {
                branches,
                otherwise,
            } => {
                for (i, branch) in branches.iter().enumerate() {
                    let head = format!("if (truthy({})) {{", branch.test);
                    if i == 0 {
                        self.line(&head, r);
                    } else {
                        self.line(&format!("}} else {head}"), branch.test.range);
                    }
                    self.nested(&branch.body);
                }
                if let Some(otherwise) = otherwise {
                    self.raw("} else {");
                    self.nested(otherwise);
                }
                self.raw("}");
            }
            StmtKind::For {
                key,
                value,
                iterable,
                body,
                otherwise,
            } => {
                let key = key.as_deref().map(quote).unwrap_or_else(|| "null".to_string());
                let head = format!(
                    "each({iterable}, {key}, {}, function (scope) {{",
                    quote(value)
                );
                match otherwise {
                    Some(otherwise) => {
                        self.line(&format!("if (!{head}"), r);
                        self.body(body, "})) {");
                        self.body(otherwise, "}");
                    }
                    None => {
                        self.line(&head, r);
                        self.body(body, "});");
                    }
                }
            }
            StmtKind::While { test, body } => {
                self.line(&format!("while (truthy({test})) {{"), r);
                self.body(body, "}");
            }
            StmtKind::Switch {
                subject,
                cases,
                default,
            } => {
                self.line(&format!("switch ({subject}) {{"), r);
                self.depth += 1;
                for case in cases {
                    for value in &case.values {
                        self.line(&format!("case {value}:"), value.range);
                    }
                    self.depth += 1;
                    self.stmts(&case.body);
                    self.raw("break;");
                    self.depth -= 1;
                }
                if let Some(default) = default {
                    self.raw("default:");
                    self.nested(default);
                }
                self.depth -= 1;
                self.raw("}");
            }
            StmtKind::Block { name } => self.line(&format!("out.block({});", quote(name)), r),
            StmtKind::Super => self.line("out.super();", r),
            StmtKind::Let(bindings) => {
                for binding in bindings {
                    self.line(
                        &format!("scope.let({}, {});", quote(&binding.name), binding.value),
                        binding.value.range,
                    );
                }
            }
            StmtKind::Filter { callee, body } => {
                self.line(&format!("out.filter({callee}, function (scope, out) {{"), r);
                self.routine_body(body, "});");
            }
            StmtKind::Lang { langs, body } => {
                let langs: Vec<String> = langs.iter().map(|l| quote(l)).collect();
                self.line(&format!("if (lang([{}])) {{", langs.join(", ")), r);
                self.body(body, "}");
            }
            StmtKind::FnDef(def) => {
                let params: Vec<String> = def.params.iter().map(|p| quote(p)).collect();
                self.line(
                    &format!(
                        "scope.let({}, template([{}], function (scope, out) {{",
                        quote(&def.name),
                        params.join(", ")
                    ),
                    r,
                );
                self.routine_body(&def.body, "}));");
            }
        }
    }
}
