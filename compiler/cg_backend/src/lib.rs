//! Interface to the low-level code generation backend.
//!
//! The backend owns instruction selection, register allocation and object
//! emission. The lowering core only ever talks to it through the traits in
//! this crate:
//!
//! - [`Backend`]: module-level operations (symbol declaration, function
//!   creation and completion). Shared by every lowering worker, so every
//!   method takes `&self`.
//! - [`FunctionBuilder`]: per-function IR construction. Exclusively owned
//!   by the worker lowering that function.
//!
//! All backend objects are referenced through `Copy` handle newtypes
//! ([`NodeId`], [`SymbolId`], ...), so no backend lifetime leaks into the
//! lowering code.
//!
//! [`RecordingBackend`] is an in-memory implementation that records every
//! call. It is what tests and IR dumps run against.

mod error;
mod ids;
mod recording;
mod traits;
mod types;

pub use error::BackendError;
pub use ids::{ExternalId, FunctionId, GlobalId, NodeId, SymbolId};
pub use recording::{
    BackendEvent, Inst, RecordedFunction, RecordingBackend, RecordingBuilder, SymbolKind,
    SymbolRecord,
};
pub use traits::{Backend, FunctionBuilder};
pub use types::{BinOp, CastOp, DataType, Inlining, Linkage, Prototype};
