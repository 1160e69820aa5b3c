use thiserror::Error;

use crate::ids::SymbolId;

/// A backend call that could not be carried out.
///
/// Any of these leaves the backend module in an unknown state, so callers
/// treat them as fatal for the whole generation phase.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("symbol `{0}` is already declared")]
    DuplicateSymbol(String),

    #[error("no symbol with handle {0:?}")]
    UnknownSymbol(SymbolId),

    #[error("function `{0}` already has a body")]
    AlreadyDefined(String),

    #[error("backend rejected `{name}`: {reason}")]
    Rejected { name: String, reason: String },
}
