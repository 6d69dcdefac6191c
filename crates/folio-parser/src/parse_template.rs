//! Template compilation: the top-level driver.
//!
//! Alternates between literal text and directives. Block-bodied directives
//! push a frame onto an explicit stack; `@end` pops it and emits the finished
//! statement into the enclosing frame.
//!
//! Directives that produce no output (headers, `@end`, comments, `@{ }`) take
//! their whole line with them when nothing else shares it; see
//! [`folio_types::whitespace`].

use std::rc::Rc;

use folio_lexer::{LexContext, Token, TokenKind};
use folio_types::ast::*;
use folio_types::{whitespace, ErrorCode, Position, Range};

use crate::parse_expr::unescape;
use crate::parser::Parser;

// ══════════════════════════════════════════════════════════════════════════════
// Frames
// ══════════════════════════════════════════════════════════════════════════════

/// What an open directive body will become once its `@end` is reached.
enum FrameKind {
    /// `test` is `None` once `@else` has been seen.
    If {
        branches: Vec<Branch>,
        test: Option<Expr>,
    },
    /// `body` holds the loop body once `@else` has been seen.
    For {
        key: Option<String>,
        value: String,
        iterable: Expr,
        body: Option<Vec<Stmt>>,
    },
    While {
        test: Expr,
    },
    Switch {
        subject: Expr,
        cases: Vec<Case>,
        default: Option<Vec<Stmt>>,
        arm: Arm,
    },
    Block {
        name: String,
    },
    Filter {
        callee: Expr,
    },
    Lang {
        langs: Vec<String>,
    },
    Fn {
        name: String,
        params: Vec<String>,
    },
    Postinit,
}

/// The `@switch` arm currently collecting statements.
enum Arm {
    /// Before the first `@case`: only whitespace is allowed.
    Leading,
    Case(Vec<Expr>),
    Default,
}

struct Frame {
    kind: FrameKind,
    stmts: Vec<Stmt>,
    /// Whether the body began at the start of a line.
    line_start: bool,
    directive: TokenKind,
    opened_at: Range,
}

impl Frame {
    fn new(kind: FrameKind, directive: &Token, line_start: bool) -> Self {
        Self {
            kind,
            stmts: Vec::new(),
            line_start,
            directive: directive.kind,
            opened_at: directive.range(),
        }
    }
}

/// Compilation state of one template.
struct Builder {
    program: Program,
    root: Vec<Stmt>,
    stack: Vec<Frame>,
    /// A preceding directive asked to strip the whitespace that follows it.
    trim_next: bool,
    /// The last non-text statement of the scope took its line with it.
    fresh_line: bool,
}

impl Builder {
    fn new(name: &str) -> Self {
        Self {
            program: Program::new(name),
            root: Vec::new(),
            stack: Vec::new(),
            trim_next: false,
            fresh_line: false,
        }
    }

    fn stmts(&mut self) -> &mut Vec<Stmt> {
        match self.stack.last_mut() {
            Some(frame) => &mut frame.stmts,
            None => &mut self.root,
        }
    }

    fn push(&mut self, stmt: Stmt) {
        self.stmts().push(stmt);
    }

    /// Append literal text, merging with a directly preceding text statement.
    fn push_text(&mut self, text: &str, range: Range) {
        if text.is_empty() {
            return;
        }
        let stmts = self.stmts();
        if let Some(Stmt {
            kind: StmtKind::Text(prev),
            range: prev_range,
        }) = stmts.last_mut()
        {
            prev.push_str(text);
            *prev_range = prev_range.merge(range);
            return;
        }
        stmts.push(Stmt::new(StmtKind::Text(text.to_string()), range));
    }

    /// Strip trailing whitespace from the text emitted so far in this scope.
    ///
    /// `all` strips newlines too; otherwise only spaces and tabs go.
    fn retract(&mut self, all: bool) {
        let stmts = self.stmts();
        if let Some(Stmt {
            kind: StmtKind::Text(text),
            ..
        }) = stmts.last_mut()
        {
            let keep = if all {
                text.trim_end().len()
            } else {
                text.len() - whitespace::trailing_horizontal(text)
            };
            text.truncate(keep);
            if text.is_empty() {
                stmts.pop();
            }
        }
    }

    /// Whether only horizontal whitespace separates the cursor from the
    /// start of its line within the current scope.
    fn left_alone(&self) -> bool {
        let (stmts, line_start) = match self.stack.last() {
            Some(frame) => (&frame.stmts, frame.line_start),
            None => (&self.root, true),
        };
        let before = if stmts.len() <= 1 {
            line_start
        } else {
            self.fresh_line
        };
        match stmts.last() {
            None => line_start,
            Some(stmt) => match stmt.as_text() {
                Some(text) => whitespace::left_alone(text, before),
                None => self.fresh_line,
            },
        }
    }

    fn in_block(&self) -> bool {
        self.stack
            .iter()
            .any(|f| matches!(f.kind, FrameKind::Block { .. }))
    }

    fn block_declared(&self, name: &str) -> bool {
        self.program.block(name).is_some()
            || self
                .stack
                .iter()
                .any(|f| matches!(&f.kind, FrameKind::Block { name: open } if open == name))
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Driver
// ══════════════════════════════════════════════════════════════════════════════

impl<'src> Parser<'src> {
    /// Compile the whole source as a template.
    pub(crate) fn parse_template(&mut self) -> Program {
        let mut b = Builder::new(self.file_name());
        loop {
            if self.too_many_errors() {
                break;
            }
            let token = self.lex(LexContext::TopLevel);
            self.literal_text(&mut b, &token);
            match token.kind {
                TokenKind::Eof => break,
                TokenKind::Escape => b.push_text("@", token.range()),
                TokenKind::Comment => {
                    self.finish_static(&mut b, token.trim_right);
                }
                TokenKind::Unterminated => self.error_with_suggestion(
                    ErrorCode::UNTERMINATED_LITERAL,
                    "unterminated comment",
                    token.range(),
                    "close the comment with `*@`",
                ),
                TokenKind::Unexpected => self.error_with_suggestion(
                    ErrorCode::UNEXPECTED_TOKEN,
                    format!("stray {}", self.describe(&token)),
                    token.range(),
                    "write `@@` for a literal `@`",
                ),
                TokenKind::OpenEmit => self.emission(&mut b, &token),
                TokenKind::At => self.inline_emission(&mut b, &token),
                _ => self.directive(&mut b, &token),
            }
        }

        while let Some(frame) = b.stack.pop() {
            self.error_with_suggestion(
                ErrorCode::UNCLOSED_DIRECTIVE,
                format!(
                    "`{}` opened at {} is never closed",
                    frame.directive, frame.opened_at
                ),
                frame.opened_at,
                "add a matching `@end`",
            );
            self.close_frame(&mut b, frame);
        }

        let mut program = b.program;
        program.body = b.root;
        program
    }

    /// Emit the literal text before `token`, applying trim markers.
    fn literal_text(&mut self, b: &mut Builder, token: &Token) {
        let mut text = token.prev_text(self.source);
        if std::mem::take(&mut b.trim_next) {
            text = text.trim_start();
        }
        let start = self.position_in(token, token.value_start.offset - text.len());
        b.push_text(text, Range::new(start, token.value_start));
        if token.trim_left {
            b.retract(true);
        }
    }

    /// Position of byte `offset`, which lies inside `token`'s prev_text.
    fn position_in(&self, token: &Token, offset: usize) -> Position {
        let skipped = &self.source[token.start.offset..offset];
        token.start.advance_str(skipped)
    }

    /// Finish a directive that produces no output.
    ///
    /// When it is alone on its line, the line's indentation is retracted and
    /// the rest of the line, newline included, is skipped. Returns whether
    /// that happened.
    fn finish_static(&mut self, b: &mut Builder, trim_right: bool) -> bool {
        let alone = b.left_alone() && {
            let rest = &self.source[self.cursor.offset..];
            match whitespace::line_lead(rest, true) {
                Some(len) => {
                    self.cursor = self.cursor.advance_str(&rest[..len]);
                    true
                }
                None => false,
            }
        };
        if alone {
            b.retract(false);
        }
        b.fresh_line = alone;
        if trim_right {
            b.trim_next = true;
        }
        alone
    }

    /// Push a directive body frame, enforcing the nesting bound.
    fn open(&mut self, b: &mut Builder, frame: Frame) {
        if b.stack.len() >= self.max_nesting {
            self.error_at(
                ErrorCode::NESTING_LIMIT_EXCEEDED,
                format!("directives nest deeper than {} levels", self.max_nesting),
                frame.opened_at,
            );
        }
        b.stack.push(frame);
    }

    fn misplaced(&mut self, token: &Token, message: impl Into<String>) {
        self.error_at(ErrorCode::MISPLACED_DIRECTIVE, message, token.range());
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Emissions
    // ══════════════════════════════════════════════════════════════════════════

    /// `@{ expr }` or the empty `@{ }`.
    fn emission(&mut self, b: &mut Builder, open: &Token) {
        let expr = self.with_context(LexContext::Expression, |p| p.expression(0));
        let close = self.expect_closing(TokenKind::RBrace, open);
        let trim_right = close.is_some_and(|t| t.trim_right);
        match expr {
            Some(expr) => {
                b.push(Stmt::new(StmtKind::Emit(expr), self.range_from(open.value_start)));
                b.fresh_line = false;
                b.trim_next = trim_right;
            }
            None => {
                self.finish_static(b, trim_right);
            }
        }
    }

    /// `@name.member[index](args)`
    fn inline_emission(&mut self, b: &mut Builder, at: &Token) {
        let expr = self.with_context(LexContext::Inline, |p| p.require_expression(0));
        b.push(Stmt::new(StmtKind::Emit(expr), self.range_from(at.value_start)));
        b.fresh_line = false;
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Directive headers
    // ══════════════════════════════════════════════════════════════════════════

    /// Parse `( … )` after a directive. Returns the body's value and whether
    /// the closing `)` carried a trim marker.
    fn header<T>(&mut self, directive: &Token, body: impl FnOnce(&mut Self) -> T) -> (T, bool) {
        let open = self.lex(LexContext::Expression);
        if open.kind != TokenKind::LParen {
            self.restore(open.start);
            self.error_at(
                ErrorCode::UNEXPECTED_TOKEN,
                format!(
                    "expected `(` after `{}`, found {}",
                    directive.kind,
                    self.describe(&open)
                ),
                open.range(),
            );
        }
        let value = self.with_context(LexContext::Expression, body);
        let close = self.lex(LexContext::Expression);
        if close.kind == TokenKind::RParen {
            return (value, close.trim_right);
        }
        self.restore(close.start);
        self.error_at(
            ErrorCode::UNCLOSED_DELIMITER,
            format!(
                "expected `)` to close the `{}` header, found {}",
                directive.kind,
                self.describe(&close)
            ),
            close.range(),
        );
        let trim = self.synchronize_header().is_some_and(|t| t.trim_right);
        (value, trim)
    }

    /// Comma-separated header items, up to (not including) the closing `)`.
    fn header_list<T>(&mut self, mut item: impl FnMut(&mut Self) -> Option<T>) -> Vec<T> {
        let mut items = Vec::new();
        loop {
            if self.peek(LexContext::Expression).kind == TokenKind::RParen {
                break;
            }
            match item(self) {
                Some(value) => items.push(value),
                None => break,
            }
            if self.peek(LexContext::Expression).kind != TokenKind::Comma {
                break;
            }
            self.lex(LexContext::Expression);
        }
        items
    }

    /// A name given as an identifier or a string literal.
    fn header_name(&mut self) -> Option<String> {
        let token = self.lex(LexContext::Expression);
        match token.kind {
            TokenKind::Ident => Some(self.text(&token).to_string()),
            TokenKind::Str => {
                let text = self.text(&token);
                Some(unescape(&text[1..text.len() - 1]))
            }
            _ => {
                self.restore(token.start);
                self.error_at(
                    ErrorCode::UNEXPECTED_TOKEN,
                    format!("expected a name, found {}", self.describe(&token)),
                    token.range(),
                );
                None
            }
        }
    }

    fn header_string(&mut self) -> Option<String> {
        let token = self.lex(LexContext::Expression);
        if token.kind == TokenKind::Str {
            let text = self.text(&token);
            return Some(unescape(&text[1..text.len() - 1]));
        }
        self.restore(token.start);
        self.error_at(
            ErrorCode::UNEXPECTED_TOKEN,
            format!("expected a string literal, found {}", self.describe(&token)),
            token.range(),
        );
        None
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Directives
    // ══════════════════════════════════════════════════════════════════════════

    fn directive(&mut self, b: &mut Builder, token: &Token) {
        match token.kind {
            TokenKind::If => {
                let (test, trim) = self.header(token, |p| p.require_expression(0));
                let alone = self.finish_static(b, trim);
                let kind = FrameKind::If {
                    branches: Vec::new(),
                    test: Some(test),
                };
                self.open(b, Frame::new(kind, token, alone));
            }
            TokenKind::Elif => self.elif(b, token),
            TokenKind::Else => self.else_branch(b, token),
            TokenKind::End => self.end(b, token),
            TokenKind::For => self.for_loop(b, token),
            TokenKind::While => {
                let (test, trim) = self.header(token, |p| p.require_expression(0));
                let alone = self.finish_static(b, trim);
                self.open(b, Frame::new(FrameKind::While { test }, token, alone));
            }
            TokenKind::Switch => {
                let (subject, trim) = self.header(token, |p| p.require_expression(0));
                let alone = self.finish_static(b, trim);
                let kind = FrameKind::Switch {
                    subject,
                    cases: Vec::new(),
                    default: None,
                    arm: Arm::Leading,
                };
                self.open(b, Frame::new(kind, token, alone));
            }
            TokenKind::Case | TokenKind::Default => self.switch_arm(b, token),
            TokenKind::Block => {
                let (name, trim) = self.header(token, |p| p.header_name());
                let name = name.unwrap_or_default();
                if !name.is_empty() && b.block_declared(&name) {
                    self.error_at(
                        ErrorCode::DUPLICATE_BLOCK,
                        format!("block `{name}` is defined more than once"),
                        token.range(),
                    );
                }
                let alone = self.finish_static(b, trim);
                self.open(b, Frame::new(FrameKind::Block { name }, token, alone));
            }
            TokenKind::Super => {
                if !b.in_block() {
                    self.misplaced(token, "`@super` is only allowed inside a `@block` body");
                }
                b.push(Stmt::new(StmtKind::Super, token.range()));
                b.fresh_line = false;
                b.trim_next = token.trim_right;
            }
            TokenKind::Extend => {
                let (target, trim) = self.header(token, |p| p.header_string());
                if !b.stack.is_empty() {
                    self.misplaced(token, "`@extend` is only allowed at the top level");
                }
                b.program.extends.extend(target);
                self.finish_static(b, trim);
            }
            TokenKind::Raw => self.raw(b, token),
            TokenKind::Filter => {
                let (callee, trim) = self.header(token, |p| p.require_expression(0));
                let alone = self.finish_static(b, trim);
                self.open(b, Frame::new(FrameKind::Filter { callee }, token, alone));
            }
            TokenKind::Let => {
                let (bindings, trim) = self.header(token, |p| {
                    p.header_list(|p| {
                        let (name, _) = p.expect_identifier()?;
                        p.expect(TokenKind::Eq)?;
                        let value = p.require_expression(0);
                        Some(Binding { name, value })
                    })
                });
                let range = self.range_from(token.value_start);
                self.finish_static(b, trim);
                b.push(Stmt::new(StmtKind::Let(bindings), range));
            }
            TokenKind::FnDirective => {
                let name = self.expect_identifier().map(|(n, _)| n).unwrap_or_default();
                let (params, trim) = self.header(token, |p| {
                    p.header_list(|p| p.expect_identifier().map(|(n, _)| n))
                });
                let alone = self.finish_static(b, trim);
                self.open(b, Frame::new(FrameKind::Fn { name, params }, token, alone));
            }
            TokenKind::Lang => {
                let (langs, trim) = self.header(token, |p| p.header_list(|p| p.header_name()));
                let alone = self.finish_static(b, trim);
                self.open(b, Frame::new(FrameKind::Lang { langs }, token, alone));
            }
            TokenKind::Repeat => {
                let (collection, trim) = self.header(token, |p| p.require_expression(0));
                if !b.stack.is_empty() {
                    self.misplaced(token, "`@repeat` is only allowed at the top level");
                } else if b.program.repeat.is_some() {
                    self.error_at(
                        ErrorCode::DUPLICATE_HOOK,
                        "`@repeat` is declared more than once",
                        token.range(),
                    );
                } else {
                    b.program.repeat = Some(collection);
                }
                self.finish_static(b, trim);
            }
            TokenKind::Postinit => {
                if !b.stack.is_empty() {
                    self.misplaced(token, "`@postinit` is only allowed at the top level");
                } else if b.program.postinit.is_some() {
                    self.error_at(
                        ErrorCode::DUPLICATE_HOOK,
                        "`@postinit` is declared more than once",
                        token.range(),
                    );
                }
                let alone = self.finish_static(b, token.trim_right);
                self.open(b, Frame::new(FrameKind::Postinit, token, alone));
            }
            _ => {
                self.error_at(
                    ErrorCode::UNEXPECTED_TOKEN,
                    format!("unexpected {}", self.describe(token)),
                    token.range(),
                );
            }
        }
    }

    /// `@for(value in iterable)` / `@for(key, value in iterable)`
    fn for_loop(&mut self, b: &mut Builder, token: &Token) {
        let ((key, value, iterable), trim) = self.header(token, |p| {
            let first = p.expect_identifier().map(|(n, _)| n).unwrap_or_default();
            let (key, value) = if p.peek(LexContext::Expression).kind == TokenKind::Comma {
                p.lex(LexContext::Expression);
                let second = p.expect_identifier().map(|(n, _)| n).unwrap_or_default();
                (Some(first), second)
            } else {
                (None, first)
            };
            p.expect(TokenKind::In);
            (key, value, p.require_expression(0))
        });
        let alone = self.finish_static(b, trim);
        let kind = FrameKind::For {
            key,
            value,
            iterable,
            body: None,
        };
        self.open(b, Frame::new(kind, token, alone));
    }

    fn elif(&mut self, b: &mut Builder, token: &Token) {
        let (test, trim) = self.header(token, |p| p.require_expression(0));
        let valid = matches!(
            b.stack.last(),
            Some(Frame {
                kind: FrameKind::If { test: Some(_), .. },
                ..
            })
        );
        if !valid {
            self.misplaced(token, "`@elif` must follow `@if` or `@elif`");
            return;
        }
        let alone = self.finish_static(b, trim);
        if let Some(frame) = b.stack.last_mut() {
            if let FrameKind::If {
                branches,
                test: current,
            } = &mut frame.kind
            {
                if let Some(previous) = current.replace(test) {
                    branches.push(Branch {
                        test: previous,
                        body: std::mem::take(&mut frame.stmts),
                    });
                }
                frame.line_start = alone;
            }
        }
    }

    fn else_branch(&mut self, b: &mut Builder, token: &Token) {
        let valid = matches!(
            b.stack.last(),
            Some(Frame {
                kind: FrameKind::If { test: Some(_), .. } | FrameKind::For { body: None, .. },
                ..
            })
        );
        if !valid {
            self.misplaced(token, "`@else` must follow `@if`, `@elif` or `@for`");
            return;
        }
        let alone = self.finish_static(b, token.trim_right);
        if let Some(frame) = b.stack.last_mut() {
            let stmts = std::mem::take(&mut frame.stmts);
            match &mut frame.kind {
                FrameKind::If { branches, test } => {
                    if let Some(test) = test.take() {
                        branches.push(Branch { test, body: stmts });
                    }
                }
                FrameKind::For { body, .. } => *body = Some(stmts),
                _ => {}
            }
            frame.line_start = alone;
        }
    }

    /// `@case(values…)` / `@default`
    fn switch_arm(&mut self, b: &mut Builder, token: &Token) {
        let (values, trim) = if token.kind == TokenKind::Case {
            self.header(token, |p| p.header_list(|p| Some(p.require_expression(0))))
        } else {
            (Vec::new(), token.trim_right)
        };

        let state = match b.stack.last() {
            Some(Frame {
                kind: FrameKind::Switch { arm, .. },
                ..
            }) => Some(matches!(arm, Arm::Default)),
            _ => None,
        };
        match state {
            None => {
                self.misplaced(token, format!("`{}` must be inside `@switch`", token.kind));
                return;
            }
            Some(true) => {
                self.misplaced(token, format!("`{}` after `@default`", token.kind));
                return;
            }
            Some(false) => {}
        }

        let alone = self.finish_static(b, trim);
        let Some(frame) = b.stack.pop() else { return };
        let mut frame = self.flush_arm(frame);
        if let FrameKind::Switch { arm, .. } = &mut frame.kind {
            *arm = if token.kind == TokenKind::Case {
                Arm::Case(values)
            } else {
                Arm::Default
            };
        }
        frame.line_start = alone;
        b.stack.push(frame);
    }

    /// Move the statements of the current `@switch` arm into place.
    fn flush_arm(&mut self, mut frame: Frame) -> Frame {
        if let FrameKind::Switch {
            cases,
            default,
            arm,
            ..
        } = &mut frame.kind
        {
            let stmts = std::mem::take(&mut frame.stmts);
            match std::mem::replace(arm, Arm::Leading) {
                Arm::Leading => {
                    if let Some(stmt) = stmts
                        .iter()
                        .find(|s| !s.as_text().is_some_and(whitespace::is_blank))
                    {
                        self.misplaced_range(stmt.range, "content before the first `@case`");
                    }
                }
                Arm::Case(values) => cases.push(Case {
                    values,
                    body: stmts,
                }),
                Arm::Default => *default = Some(stmts),
            }
        }
        frame
    }

    fn misplaced_range(&mut self, range: Range, message: &str) {
        self.error_at(ErrorCode::MISPLACED_DIRECTIVE, message, range);
    }

    /// `@raw … @end`
    fn raw(&mut self, b: &mut Builder, token: &Token) {
        self.finish_static(b, token.trim_right);
        let end = self.lex(LexContext::Raw);
        self.literal_text(b, &end);
        if end.is_eof() {
            self.error_with_suggestion(
                ErrorCode::UNCLOSED_DIRECTIVE,
                format!("`@raw` opened at {} is never closed", token.value_start),
                token.range(),
                "add a matching `@end`",
            );
            return;
        }
        self.finish_static(b, end.trim_right);
    }

    fn end(&mut self, b: &mut Builder, token: &Token) {
        if b.stack.is_empty() {
            self.misplaced(token, "`@end` without an open directive");
            return;
        }
        self.finish_static(b, token.trim_right);
        if let Some(frame) = b.stack.pop() {
            self.close_frame(b, frame);
        }
    }

    /// Turn a finished frame into its statement in the enclosing scope.
    fn close_frame(&mut self, b: &mut Builder, frame: Frame) {
        let range = Range::new(frame.opened_at.start, self.cursor);
        let frame = self.flush_arm(frame);
        let stmts = frame.stmts;
        let kind = match frame.kind {
            FrameKind::If { mut branches, test } => {
                let otherwise = match test {
                    Some(test) => {
                        branches.push(Branch { test, body: stmts });
                        None
                    }
                    None => Some(stmts),
                };
                StmtKind::If {
                    branches,
                    otherwise,
                }
            }
            FrameKind::For {
                key,
                value,
                iterable,
                body,
            } => {
                let (body, otherwise) = match body {
                    Some(body) => (body, Some(stmts)),
                    None => (stmts, None),
                };
                StmtKind::For {
                    key,
                    value,
                    iterable,
                    body,
                    otherwise,
                }
            }
            FrameKind::While { test } => StmtKind::While { test, body: stmts },
            FrameKind::Switch {
                subject,
                cases,
                default,
                ..
            } => StmtKind::Switch {
                subject,
                cases,
                default,
            },
            FrameKind::Block { name } => {
                b.program.blocks.push(BlockDef {
                    name: name.clone(),
                    body: stmts,
                    range,
                });
                StmtKind::Block { name }
            }
            FrameKind::Filter { callee } => StmtKind::Filter {
                callee,
                body: stmts,
            },
            FrameKind::Lang { langs } => StmtKind::Lang { langs, body: stmts },
            FrameKind::Fn { name, params } => StmtKind::FnDef(Rc::new(FnDef {
                name,
                params,
                body: stmts,
            })),
            FrameKind::Postinit => {
                if b.program.postinit.is_none() {
                    b.program.postinit = Some(stmts);
                }
                return;
            }
        };
        b.push(Stmt::new(kind, range));
    }
}
