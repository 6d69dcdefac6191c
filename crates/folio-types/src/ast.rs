//! AST node types for Folio templates.
//!
//! Every node carries a [`Range`] for error reporting. Expressions render
//! through [`fmt::Display`] as canonical target-routine fragments: compound
//! expressions are fully parenthesized, identifiers resolve against `scope`,
//! and date literals are rewritten into an explicit constructor call.

use crate::Range;
use std::fmt;
use std::rc::Rc;

// ══════════════════════════════════════════════════════════════════════════════
// Top Level
// ══════════════════════════════════════════════════════════════════════════════

/// A compiled template: the emitted statements plus blocks and lifecycle hooks.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    /// Source file name the program was compiled from.
    pub name: String,
    /// The `init` routine: everything at the top level of the template.
    pub body: Vec<Stmt>,
    /// Blocks defined anywhere in the template, in source order.
    pub blocks: Vec<BlockDef>,
    /// `@postinit … @end` body.
    pub postinit: Option<Vec<Stmt>>,
    /// `@repeat(expr)` collection expression.
    pub repeat: Option<Expr>,
    /// `@extend("name")` targets, in source order.
    pub extends: Vec<String>,
}

impl Program {
    /// Create an empty program.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            body: Vec::new(),
            blocks: Vec::new(),
            postinit: None,
            repeat: None,
            extends: Vec::new(),
        }
    }

    /// Look up a block defined by this program.
    pub fn block(&self, name: &str) -> Option<&BlockDef> {
        self.blocks.iter().find(|b| b.name == name)
    }
}

/// `@block(name) … @end`
#[derive(Debug, Clone, PartialEq)]
pub struct BlockDef {
    pub name: String,
    pub body: Vec<Stmt>,
    pub range: Range,
}

// ══════════════════════════════════════════════════════════════════════════════
// Statements
// ══════════════════════════════════════════════════════════════════════════════

/// One emitted statement of a routine.
#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub range: Range,
}

impl Stmt {
    pub fn new(kind: StmtKind, range: Range) -> Self {
        Self { kind, range }
    }

    /// The literal text of a text statement.
    pub fn as_text(&self) -> Option<&str> {
        match &self.kind {
            StmtKind::Text(text) => Some(text),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    /// Literal text emission.
    Text(String),
    /// Value emission: `@{ expr }` or `@name.chain`.
    Emit(Expr),
    /// `@if(…) … @elif(…) … @else … @end`
    If {
        branches: Vec<Branch>,
        otherwise: Option<Vec<Stmt>>,
    },
    /// `@for([key,] value in iterable) … [@else …] @end`
    For {
        key: Option<String>,
        value: String,
        iterable: Expr,
        body: Vec<Stmt>,
        otherwise: Option<Vec<Stmt>>,
    },
    /// `@while(test) … @end`
    While { test: Expr, body: Vec<Stmt> },
    /// `@switch(subject) @case(…) … @default … @end`
    Switch {
        subject: Expr,
        cases: Vec<Case>,
        default: Option<Vec<Stmt>>,
    },
    /// Render the active version of a block at this position.
    Block { name: String },
    /// `@super`: render the overridden version of the enclosing block.
    Super,
    /// `@let(name = value, …)`
    Let(Vec<Binding>),
    /// `@filter(callee) … @end`
    Filter { callee: Expr, body: Vec<Stmt> },
    /// `@lang(en, …) … @end`
    Lang { langs: Vec<String>, body: Vec<Stmt> },
    /// `@fn name(params) … @end`
    FnDef(Rc<FnDef>),
}

/// A guarded branch of an `@if`.
#[derive(Debug, Clone, PartialEq)]
pub struct Branch {
    pub test: Expr,
    pub body: Vec<Stmt>,
}

/// One `@case(values…)` arm of a `@switch`.
#[derive(Debug, Clone, PartialEq)]
pub struct Case {
    pub values: Vec<Expr>,
    pub body: Vec<Stmt>,
}

/// A `name = value` pair of `@let`.
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub name: String,
    pub value: Expr,
}

/// An inline template function.
#[derive(Debug, Clone, PartialEq)]
pub struct FnDef {
    pub name: String,
    pub params: Vec<String>,
    pub body: Vec<Stmt>,
}

// ══════════════════════════════════════════════════════════════════════════════
// Expressions
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub range: Range,
}

impl Expr {
    pub fn new(kind: ExprKind, range: Range) -> Self {
        Self { kind, range }
    }

    /// Whether the expression can appear on the left of an assignment.
    pub fn is_assignable(&self) -> bool {
        matches!(
            self.kind,
            ExprKind::Ident(_) | ExprKind::Member { optional: false, .. } | ExprKind::Index { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    // ── Literals ──
    Null,
    Bool(bool),
    Number(f64),
    Str(String),
    /// Double-quoted string with `${…}` interpolation.
    Template(Vec<TemplatePart>),
    Date(DateLiteral),
    Regex { pattern: String, flags: String },
    Array(Vec<Expr>),
    Object(Vec<(String, Expr)>),
    /// `fn(params) => body`
    Lambda { params: Vec<String>, body: Box<Expr> },

    // ── Names & access ──
    /// A bare identifier, resolved against the value-binding namespace.
    Ident(String),
    /// `object.property` / `object?.property`; the property is verbatim.
    Member {
        object: Box<Expr>,
        property: String,
        optional: bool,
    },
    Index { object: Box<Expr>, index: Box<Expr> },
    Call { callee: Box<Expr>, args: Vec<Expr> },
    New { callee: Box<Expr>, args: Vec<Expr> },

    // ── Operators ──
    Unary { op: UnaryOp, operand: Box<Expr> },
    Update {
        op: UpdateOp,
        prefix: bool,
        target: Box<Expr>,
    },
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Conditional {
        test: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    Assign {
        op: AssignOp,
        target: Box<Expr>,
        value: Box<Expr>,
    },
    Yield(Option<Box<Expr>>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum TemplatePart {
    Literal(String),
    Expr(Expr),
}

/// A `#YYYY-MM-DD[THH:MM[:SS]]#` literal, already validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateLiteral {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Plus,
    Not,
    BitNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOp {
    Increment,
    Decrement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Pow,
    Mul,
    Div,
    Rem,
    Add,
    Sub,
    Shl,
    Shr,
    UShr,
    Less,
    Greater,
    LessEq,
    GreaterEq,
    In,
    Eq,
    NotEq,
    BitAnd,
    BitXor,
    BitOr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    Coalesce,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Coalesce,
}

impl AssignOp {
    /// The binary operator a compound assignment applies, if any.
    pub fn binary(self) -> Option<BinOp> {
        match self {
            AssignOp::Add => Some(BinOp::Add),
            AssignOp::Sub => Some(BinOp::Sub),
            AssignOp::Mul => Some(BinOp::Mul),
            AssignOp::Div => Some(BinOp::Div),
            AssignOp::Rem => Some(BinOp::Rem),
            AssignOp::Assign | AssignOp::Coalesce => None,
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Fragment rendering
// ══════════════════════════════════════════════════════════════════════════════

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            UnaryOp::Neg => "-",
            UnaryOp::Plus => "+",
            UnaryOp::Not => "!",
            UnaryOp::BitNot => "~",
        })
    }
}

impl fmt::Display for UpdateOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            UpdateOp::Increment => "++",
            UpdateOp::Decrement => "--",
        })
    }
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BinOp::Pow => "**",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Rem => "%",
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
            BinOp::UShr => ">>>",
            BinOp::Less => "<",
            BinOp::Greater => ">",
            BinOp::LessEq => "<=",
            BinOp::GreaterEq => ">=",
            BinOp::In => "in",
            BinOp::Eq => "==",
            BinOp::NotEq => "!=",
            BinOp::BitAnd => "&",
            BinOp::BitXor => "^",
            BinOp::BitOr => "|",
        })
    }
}

impl fmt::Display for LogicalOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogicalOp::And => "&&",
            LogicalOp::Or => "||",
            LogicalOp::Coalesce => "??",
        })
    }
}

impl fmt::Display for AssignOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AssignOp::Assign => "=",
            AssignOp::Add => "+=",
            AssignOp::Sub => "-=",
            AssignOp::Mul => "*=",
            AssignOp::Div => "/=",
            AssignOp::Rem => "%=",
            AssignOp::Coalesce => "??=",
        })
    }
}

/// Format a number the way the runtime prints it: integral values have no
/// fractional part.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == n.trunc() && n.abs() < 1e21 {
        format!("{}", n as i128)
    } else {
        format!("{n}")
    }
}

/// Quote `text` as a double-quoted string literal.
pub fn quote(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for ch in text.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => out.push_str(&format!("\\u{{{:x}}}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[Expr]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExprKind::Null => f.write_str("null"),
            ExprKind::Bool(b) => write!(f, "{b}"),
            ExprKind::Number(n) => f.write_str(&format_number(*n)),
            ExprKind::Str(s) => f.write_str(&quote(s)),
            ExprKind::Template(parts) => {
                f.write_str("`")?;
                for part in parts {
                    match part {
                        TemplatePart::Literal(text) => {
                            let escaped = text
                                .replace('\\', "\\\\")
                                .replace('`', "\\`")
                                .replace("${", "\\${");
                            f.write_str(&escaped)?;
                        }
                        TemplatePart::Expr(expr) => write!(f, "${{{expr}}}")?,
                    }
                }
                f.write_str("`")
            }
            ExprKind::Date(d) => write!(
                f,
                "Date({}, {}, {}, {}, {}, {})",
                d.year, d.month, d.day, d.hour, d.minute, d.second
            ),
            ExprKind::Regex { pattern, flags } => write!(f, "/{pattern}/{flags}"),
            ExprKind::Array(items) => {
                f.write_str("[")?;
                write_list(f, items)?;
                f.write_str("]")
            }
            ExprKind::Object(entries) => {
                f.write_str("{")?;
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {value}", quote(key))?;
                }
                f.write_str("}")
            }
            ExprKind::Lambda { params, body } => {
                write!(f, "(({}) => {body})", params.join(", "))
            }
            ExprKind::Ident(name) => write!(f, "scope.{name}"),
            ExprKind::Member {
                object,
                property,
                optional,
            } => {
                let dot = if *optional { "?." } else { "." };
                write!(f, "{object}{dot}{property}")
            }
            ExprKind::Index { object, index } => write!(f, "{object}[{index}]"),
            ExprKind::Call { callee, args } => {
                write!(f, "{callee}(")?;
                write_list(f, args)?;
                f.write_str(")")
            }
            ExprKind::New { callee, args } => {
                write!(f, "new {callee}(")?;
                write_list(f, args)?;
                f.write_str(")")
            }
            ExprKind::Unary { op, operand } => write!(f, "({op}{operand})"),
            ExprKind::Update { op, prefix, target } => {
                if *prefix {
                    write!(f, "({op}{target})")
                } else {
                    write!(f, "({target}{op})")
                }
            }
            ExprKind::Binary { op, left, right } => write!(f, "({left} {op} {right})"),
            ExprKind::Logical { op, left, right } => write!(f, "({left} {op} {right})"),
            ExprKind::Conditional {
                test,
                then,
                otherwise,
            } => write!(f, "({test} ? {then} : {otherwise})"),
            ExprKind::Assign { op, target, value } => write!(f, "({target} {op} {value})"),
            ExprKind::Yield(Some(value)) => write!(f, "(yield {value})"),
            ExprKind::Yield(None) => f.write_str("(yield)"),
        }
    }
}
