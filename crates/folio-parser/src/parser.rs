//! Core parser infrastructure: lexer cursor, error reporting, helpers.

use folio_lexer::{LexContext, Lexer, Token, TokenKind};
use folio_types::ast::{Expr, ExprKind, Program};
use folio_types::{CompileErrors, ErrorCode, FolioError, Position, Range, SourceFile};

use crate::operators::OperatorTable;

/// Default bound on nested directive bodies.
pub const DEFAULT_MAX_NESTING: usize = 64;

/// Bound on nested sub-expressions (parentheses, arrays, calls, …).
pub const MAX_EXPRESSION_DEPTH: u32 = 256;

/// The Folio parser.
///
/// Drives the lexer over one source file, choosing the lexical context for
/// every token. Collects errors and recovers where possible.
pub struct Parser<'src> {
    pub(crate) lexer: Lexer<'src>,
    pub(crate) source: &'src str,
    source_file: &'src SourceFile,
    pub(crate) table: &'src OperatorTable,
    /// Next unread position. Never moves past the end of input.
    pub(crate) cursor: Position,
    /// Context expressions are lexed in: `Expression` or `Inline`.
    pub(crate) context: LexContext,
    errors: CompileErrors,
    pub(crate) max_nesting: usize,
    pub(crate) expr_depth: u32,
}

/// Result of parsing a template.
///
/// `program` is `None` whenever `errors` holds at least one error.
pub struct ParseResult {
    pub program: Option<Program>,
    pub errors: CompileErrors,
}

/// Result of parsing a standalone expression.
pub struct ExprResult {
    pub expr: Option<Expr>,
    pub errors: CompileErrors,
}

impl<'src> Parser<'src> {
    /// Create a parser using the standard operator table.
    pub fn new(source_file: &'src SourceFile) -> Self {
        Self::with_table(source_file, OperatorTable::shared())
    }

    /// Create a parser with a custom operator table.
    pub fn with_table(source_file: &'src SourceFile, table: &'src OperatorTable) -> Self {
        Self {
            lexer: Lexer::new(&source_file.source),
            source: &source_file.source,
            source_file,
            table,
            cursor: Position::START,
            context: LexContext::Expression,
            errors: CompileErrors::empty(),
            max_nesting: DEFAULT_MAX_NESTING,
            expr_depth: 0,
        }
    }

    /// Override the nesting bound for directive bodies.
    pub fn max_nesting(mut self, max_nesting: usize) -> Self {
        self.max_nesting = max_nesting;
        self
    }

    // ── Lexer Cursor ──────────────────────────────────────────────────────────

    /// Lex the next token in `context` and move the cursor past it.
    pub(crate) fn lex(&mut self, context: LexContext) -> Token {
        let token = self.lexer.next(context, self.cursor);
        self.cursor = token.end;
        token
    }

    /// Lex the next token in `context` without consuming it.
    pub(crate) fn peek(&self, context: LexContext) -> Token {
        self.lexer.next(context, self.cursor)
    }

    /// Move the cursor back to a position returned by an earlier token.
    pub(crate) fn restore(&mut self, pos: Position) {
        self.cursor = pos;
    }

    /// Run `f` with expressions lexed in `context`.
    pub(crate) fn with_context<T>(
        &mut self,
        context: LexContext,
        f: impl FnOnce(&mut Self) -> T,
    ) -> T {
        let saved = std::mem::replace(&mut self.context, context);
        let result = f(self);
        self.context = saved;
        result
    }

    pub(crate) fn file_name(&self) -> &'src str {
        &self.source_file.name
    }

    /// The token's own text.
    pub(crate) fn text(&self, token: &Token) -> &'src str {
        token.value(self.source)
    }

    /// A range from `start` to the cursor.
    pub(crate) fn range_from(&self, start: Position) -> Range {
        Range::new(start, self.cursor)
    }

    /// How a token is named in diagnostics.
    pub(crate) fn describe(&self, token: &Token) -> String {
        match token.kind {
            TokenKind::Eof => "end of input".to_string(),
            _ => format!("`{}`", self.text(token)),
        }
    }

    // ── Expect Helpers ────────────────────────────────────────────────────────

    /// Expect a token of `kind` in the expression context.
    ///
    /// On mismatch the token is left unread and an error is reported.
    pub(crate) fn expect(&mut self, kind: TokenKind) -> Option<Token> {
        let token = self.lex(LexContext::Expression);
        if token.kind == kind {
            Some(token)
        } else {
            self.error_at(
                ErrorCode::UNEXPECTED_TOKEN,
                format!("expected `{kind}`, found {}", self.describe(&token)),
                token.range(),
            );
            self.restore(token.start);
            None
        }
    }

    /// Expect the delimiter closing `opener`.
    pub(crate) fn expect_closing(&mut self, kind: TokenKind, opener: &Token) -> Option<Token> {
        let token = self.lex(LexContext::Expression);
        if token.kind == kind {
            Some(token)
        } else {
            let opened = self.text(opener).to_string();
            self.error_at(
                ErrorCode::UNCLOSED_DELIMITER,
                format!(
                    "expected `{kind}` to close `{opened}` opened at {}, found {}",
                    opener.value_start,
                    self.describe(&token)
                ),
                token.range(),
            );
            self.restore(token.start);
            None
        }
    }

    /// Expect an identifier and return its name.
    pub(crate) fn expect_identifier(&mut self) -> Option<(String, Range)> {
        let token = self.lex(LexContext::Expression);
        if token.kind == TokenKind::Ident {
            Some((self.text(&token).to_string(), token.range()))
        } else {
            self.error_at(
                ErrorCode::UNEXPECTED_TOKEN,
                format!("expected identifier, found {}", self.describe(&token)),
                token.range(),
            );
            self.restore(token.start);
            None
        }
    }

    /// Parse an expression that must be present.
    ///
    /// Reports E104 and returns a placeholder when nothing parses.
    pub(crate) fn require_expression(&mut self, min_bp: u8) -> Expr {
        match self.expression(min_bp) {
            Some(expr) => expr,
            None => {
                let token = self.peek(self.context);
                self.error_at(
                    ErrorCode::EXPECTED_EXPRESSION,
                    format!("expected expression, found {}", self.describe(&token)),
                    token.range(),
                );
                Self::placeholder(token.range())
            }
        }
    }

    /// Stand-in for an expression that failed to parse.
    pub(crate) fn placeholder(range: Range) -> Expr {
        Expr::new(ExprKind::Null, range)
    }

    // ── Error Reporting ───────────────────────────────────────────────────────

    /// Report an error at a specific range.
    pub(crate) fn error_at(&mut self, code: ErrorCode, message: impl Into<String>, range: Range) {
        let source_line = self
            .source_file
            .line(range.start.line)
            .unwrap_or("")
            .to_string();
        let error = FolioError::new(&self.source_file.name, code, message, range, source_line);
        self.errors.push_error(error);
    }

    /// Report an error with a fix suggestion.
    pub(crate) fn error_with_suggestion(
        &mut self,
        code: ErrorCode,
        message: impl Into<String>,
        range: Range,
        suggestion: impl Into<String>,
    ) {
        let source_line = self
            .source_file
            .line(range.start.line)
            .unwrap_or("")
            .to_string();
        let error = FolioError::new(&self.source_file.name, code, message, range, source_line)
            .with_suggestion(suggestion);
        self.errors.push_error(error);
    }

    /// Returns `true` if we've hit the error limit and should stop.
    pub(crate) fn too_many_errors(&self) -> bool {
        self.errors.total_errors >= folio_types::MAX_ERRORS
    }

    pub(crate) fn has_errors(&self) -> bool {
        self.errors.has_errors()
    }

    // ── Synchronization ───────────────────────────────────────────────────────

    /// Skip the rest of a broken directive header.
    ///
    /// Consumes expression tokens up to the `)` balancing the header's `(`,
    /// stopping early before a line break or at end of input. Returns the
    /// closing token when one was found.
    pub(crate) fn synchronize_header(&mut self) -> Option<Token> {
        let mut depth = 0usize;
        loop {
            let token = self.lex(LexContext::Expression);
            if token.prev_text(self.source).contains('\n') || token.is_eof() {
                self.restore(token.start);
                return None;
            }
            match token.kind {
                TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => depth += 1,
                TokenKind::RParen if depth == 0 => return Some(token),
                TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => {
                    depth = depth.saturating_sub(1)
                }
                _ => {}
            }
        }
    }

    // ── Public API ────────────────────────────────────────────────────────────

    /// Parse the source file as a template.
    pub fn parse(mut self) -> ParseResult {
        let program = self.parse_template();
        let program = if self.has_errors() {
            None
        } else {
            Some(program)
        };
        ParseResult {
            program,
            errors: self.errors,
        }
    }

    /// Parse the whole source file as a single expression.
    pub fn parse_expression(mut self) -> ExprResult {
        let expr = self.require_expression(0);
        let rest = self.lex(LexContext::Expression);
        if !rest.is_eof() {
            self.error_at(
                ErrorCode::UNEXPECTED_TOKEN,
                format!("unexpected {} after expression", self.describe(&rest)),
                rest.range(),
            );
        }
        let expr = if self.has_errors() {
            None
        } else {
            Some(expr)
        };
        ExprResult {
            expr,
            errors: self.errors,
        }
    }
}
