//! Runtime error types for the Folio evaluator.

use folio_types::Position;
use thiserror::Error;

/// Evaluation error: a failed operation, an exhausted limit, or a host
/// failure.
#[derive(Debug, Clone, Error)]
pub enum EvalError {
    /// Property read or call on `null`.
    #[error("cannot read `{property}` of null")]
    NullAccess { property: String },

    #[error("{0} is not callable")]
    NotCallable(String),

    #[error("invalid assignment target: {0}")]
    InvalidTarget(String),

    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    #[error("cannot iterate over {0}")]
    NotIterable(String),

    /// `@repeat` produced something other than a map or a sequence.
    #[error("@repeat expects a map or a sequence, got {0}")]
    NotACollection(String),

    /// A builtin rejected its arguments.
    #[error("{name}: {message}")]
    Builtin { name: String, message: String },

    #[error("gas exhausted")]
    GasExhausted,

    #[error("call depth limit of {0} exceeded")]
    CallDepthExceeded(usize),

    /// A collection nests deeper than the limit, e.g. a sequence holding
    /// itself.
    #[error("values nested deeper than {0} levels")]
    NestingTooDeep(usize),

    /// The build driver failed to resolve or schedule something.
    #[error("{0}")]
    Host(String),

    /// An error attributed to a template position.
    #[error("{position}: {error}")]
    Located {
        position: Position,
        error: Box<EvalError>,
    },
}

impl EvalError {
    pub fn builtin(name: &str, message: impl Into<String>) -> Self {
        Self::Builtin {
            name: name.to_string(),
            message: message.into(),
        }
    }

    /// Attach a position unless one is already attached.
    pub fn at(self, position: Position) -> Self {
        match self {
            Self::Located { .. } => self,
            error => Self::Located {
                position,
                error: Box::new(error),
            },
        }
    }

    /// The error without its position.
    pub fn root(&self) -> &EvalError {
        match self {
            Self::Located { error, .. } => error.root(),
            error => error,
        }
    }

    /// Whether the error must abort the page instead of being isolated at
    /// the emission site.
    pub fn is_fatal(&self) -> bool {
        matches!(self.root(), Self::GasExhausted)
    }
}

/// Result alias for evaluator operations.
pub type EvalResult<T> = Result<T, EvalError>;
