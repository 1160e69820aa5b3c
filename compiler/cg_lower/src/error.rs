//! Lowering errors and the generation report.

use cg_backend::BackendError;
use cg_ir::Span;
use thiserror::Error;

/// Error raised while lowering one procedure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LowerError {
    /// A swizzle store names the same destination component twice.
    #[error("swizzle assignment writes component {component} more than once")]
    DuplicateSwizzleComponent { component: i32, span: Span },

    #[error("swizzle of {count} components; expected 2, 3 or 4")]
    InvalidSwizzleCount { count: usize, span: Span },

    /// A runtime procedure or referenced symbol was never declared.
    #[error("required symbol `{name}` is not defined")]
    UnresolvedSymbol { name: String, span: Span },

    #[error("expression is not addressable")]
    NotAddressable { span: Span },

    #[error("cannot lower {what}")]
    Unsupported { what: &'static str, span: Span },

    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl LowerError {
    /// Backend failures poison the whole module.
    pub fn is_fatal(&self) -> bool {
        matches!(self, LowerError::Backend(_))
    }

    pub fn span(&self) -> Span {
        match self {
            LowerError::DuplicateSwizzleComponent { span, .. }
            | LowerError::InvalidSwizzleCount { span, .. }
            | LowerError::UnresolvedSymbol { span, .. }
            | LowerError::NotAddressable { span }
            | LowerError::Unsupported { span, .. } => *span,
            LowerError::Backend(_) => Span::DUMMY,
        }
    }
}

/// Fatal error from a generation phase.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerateError {
    #[error("backend failure while generating `{procedure}`: {source}")]
    Backend {
        procedure: String,
        source: BackendError,
    },
}

impl GenerateError {
    /// # Panics
    /// If `err` is not fatal.
    pub(crate) fn from_fatal(procedure: String, err: LowerError) -> Self {
        match err {
            LowerError::Backend(source) => GenerateError::Backend { procedure, source },
            other => panic!("`{other}` does not end the generation phase"),
        }
    }
}

/// A procedure that reported user-facing errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcFailure {
    pub procedure: String,
    pub span: Span,
    pub errors: Vec<LowerError>,
    /// False if lowering was abandoned and nothing was published.
    pub completed: bool,
}

/// Outcome of a non-fatal generation phase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerateReport {
    /// Names of procedures handed to the backend, per worker in completion order.
    pub generated: Vec<String>,
    pub failures: Vec<ProcFailure>,
}

impl GenerateReport {
    pub fn is_ok(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn error_count(&self) -> usize {
        self.failures.iter().map(|f| f.errors.len()).sum()
    }

    pub(crate) fn merge(&mut self, other: GenerateReport) {
        self.generated.extend(other.generated);
        self.failures.extend(other.failures);
    }
}
