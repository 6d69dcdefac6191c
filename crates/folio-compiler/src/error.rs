//! Build driver error types.

use std::path::PathBuf;

use folio_eval::EvalError;
use folio_types::CompileErrors;
use thiserror::Error;

/// A failure of the build driver, as opposed to a diagnostic in a template.
#[derive(Debug, Error)]
pub enum SiteError {
    #[error("`{0}` not found")]
    NotFound(String),

    #[error("cannot read `{}`: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid pattern `{pattern}`: {message}")]
    Pattern { pattern: String, message: String },

    /// The template has diagnostics and produced no program.
    #[error("`{path}` failed to compile with {} error(s)", errors.total_errors)]
    Compile { path: String, errors: CompileErrors },

    /// An ancestor chain refers back to itself through `@extend`.
    #[error("`{0}` extends itself")]
    ExtendCycle(String),

    #[error("unknown generation `{0}`")]
    UnknownGeneration(String),

    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    #[error(transparent)]
    Eval(#[from] EvalError),

    /// The output sink rejected a page.
    #[error("cannot write `{path}`: {message}")]
    Write { path: String, message: String },
}

impl SiteError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<SiteError> for EvalError {
    fn from(error: SiteError) -> Self {
        match error {
            SiteError::Eval(error) => error,
            other => EvalError::Host(other.to_string()),
        }
    }
}

pub type SiteResult<T> = Result<T, SiteError>;
