use crate::Range;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum number of errors stored before further errors are only counted.
pub const MAX_ERRORS: usize = 20;

/// Diagnostic severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// Diagnostic category, determined by error code range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    Syntax,
    Structure,
    Resolution,
    Render,
}

/// Numeric error code (E100–E499).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ErrorCode(pub u16);

impl ErrorCode {
    // ── Lexical & syntax errors (E100–E199) ──
    pub const UNEXPECTED_TOKEN: Self = Self(100);
    pub const UNCLOSED_DELIMITER: Self = Self(101);
    pub const UNTERMINATED_LITERAL: Self = Self(102);
    pub const INVALID_LITERAL: Self = Self(103);
    pub const EXPECTED_EXPRESSION: Self = Self(104);
    pub const INVALID_ASSIGNMENT_TARGET: Self = Self(105);

    // ── Structure errors (E200–E299) ──
    pub const MISPLACED_DIRECTIVE: Self = Self(200);
    pub const UNCLOSED_DIRECTIVE: Self = Self(201);
    pub const DUPLICATE_BLOCK: Self = Self(202);
    pub const DUPLICATE_HOOK: Self = Self(203);
    pub const NESTING_LIMIT_EXCEEDED: Self = Self(204);

    // ── Resolution errors (E300–E399) ──
    pub const UNRESOLVED_TEMPLATE: Self = Self(300);
    pub const UNREADABLE_TEMPLATE: Self = Self(301);

    // ── Render errors (E400–E499) ──
    pub const RENDER_FAILED: Self = Self(400);
    pub const PAGE_FAILED: Self = Self(401);

    /// Get the category for this error code.
    pub fn category(self) -> ErrorCategory {
        match self.0 {
            100..=199 => ErrorCategory::Syntax,
            200..=299 => ErrorCategory::Structure,
            300..=399 => ErrorCategory::Resolution,
            400..=499 => ErrorCategory::Render,
            _ => ErrorCategory::Syntax,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{}", self.0)
    }
}

/// A structured template diagnostic.
///
/// Consumers render these; they must not parse free-form strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FolioError {
    /// Source file name.
    pub file: String,
    /// Error code (e.g., E201).
    pub code: ErrorCode,
    /// Diagnostic severity.
    pub severity: Severity,
    /// Category (derived from code).
    pub category: ErrorCategory,
    /// Human-readable message.
    pub message: String,
    /// Source location.
    pub range: Range,
    /// The exact source line for context.
    pub source_line: String,
    /// Optional fix suggestion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl FolioError {
    /// Create a new error.
    pub fn new(
        file: impl Into<String>,
        code: ErrorCode,
        message: impl Into<String>,
        range: Range,
        source_line: impl Into<String>,
    ) -> Self {
        Self {
            file: file.into(),
            code,
            severity: Severity::Error,
            category: code.category(),
            message: message.into(),
            range,
            source_line: source_line.into(),
            suggestion: None,
        }
    }

    /// Attach a fix suggestion.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Downgrade to a warning.
    pub fn as_warning(mut self) -> Self {
        self.severity = Severity::Warning;
        self
    }
}

impl fmt::Display for FolioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}: {} [{}] {}",
            self.file, self.range, self.code, self.category, self.message
        )
    }
}

impl std::error::Error for FolioError {}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Syntax => write!(f, "syntax"),
            Self::Structure => write!(f, "structure"),
            Self::Resolution => write!(f, "resolution"),
            Self::Render => write!(f, "render"),
        }
    }
}

/// The collected diagnostics of one compilation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompileErrors {
    pub errors: Vec<FolioError>,
    pub warnings: Vec<FolioError>,
    pub total_errors: usize,
    pub total_warnings: usize,
}

impl CompileErrors {
    /// Create an empty result (no errors).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Check if there are any errors.
    pub fn has_errors(&self) -> bool {
        self.total_errors > 0
    }

    /// Add an error, respecting the [`MAX_ERRORS`] limit.
    pub fn push_error(&mut self, error: FolioError) {
        if self.errors.len() < MAX_ERRORS {
            self.errors.push(error);
        }
        self.total_errors += 1;
    }

    /// Add a warning.
    pub fn push_warning(&mut self, warning: FolioError) {
        self.warnings.push(warning.as_warning());
        self.total_warnings += 1;
    }

    /// Append every diagnostic of `other`.
    pub fn extend(&mut self, other: CompileErrors) {
        let uncounted = other.total_errors.saturating_sub(other.errors.len());
        for e in other.errors {
            self.push_error(e);
        }
        self.total_errors += uncounted;
        for w in other.warnings {
            self.push_warning(w);
        }
    }
}
