//! Backend traits.
//!
//! Follows the `rustc_codegen_ssa` split between module-level and
//! builder-level methods. Node construction never fails: a malformed node
//! is a defect in the caller, not a recoverable condition. Module-level
//! calls return `BackendError` because they touch shared backend state.

use smallvec::SmallVec;

use crate::error::BackendError;
use crate::ids::{ExternalId, FunctionId, GlobalId, NodeId, SymbolId};
use crate::types::{BinOp, CastOp, DataType, Inlining, Linkage, Prototype};

/// Module-level backend operations.
///
/// Implementations must tolerate concurrent calls from every lowering
/// worker.
pub trait Backend: Send + Sync {
    type Builder: FunctionBuilder + Send;

    /// Declare a function symbol so call sites can reference it before its
    /// body exists.
    fn declare_function(&self, name: &str, linkage: Linkage) -> Result<FunctionId, BackendError>;

    /// Declare a symbol resolved at link time.
    fn declare_external(&self, name: &str) -> Result<ExternalId, BackendError>;

    /// Declare a global variable. Storage is attached by [`Backend::define_global`].
    fn declare_global(&self, name: &str, linkage: Linkage) -> Result<GlobalId, BackendError>;

    /// Attach zero-initialised storage to a declared global.
    fn define_global(&self, global: GlobalId, size: u64, align: u64) -> Result<(), BackendError>;

    /// Start building the body of a declared function.
    fn begin_function(
        &self,
        func: FunctionId,
        prototype: Prototype,
    ) -> Result<Self::Builder, BackendError>;

    /// Hand a finished body back to the module.
    fn finish_function(&self, builder: Self::Builder, inlining: Inlining)
        -> Result<(), BackendError>;
}

/// IR construction for one function body.
pub trait FunctionBuilder {
    /// The function being built.
    fn function(&self) -> FunctionId;

    fn param(&mut self, index: usize) -> NodeId;

    /// Stack slot of `size` bytes.
    fn local(&mut self, size: u64, align: u64) -> NodeId;

    fn const_int(&mut self, dt: DataType, value: i64) -> NodeId;

    fn const_null(&mut self) -> NodeId;

    /// Pointer to read-only bytes.
    fn const_string(&mut self, bytes: &[u8]) -> NodeId;

    fn symbol_address(&mut self, symbol: SymbolId) -> NodeId;

    fn load(&mut self, dt: DataType, addr: NodeId, align: u64) -> NodeId;

    fn store(&mut self, dt: DataType, addr: NodeId, value: NodeId, align: u64);

    /// `base + offset` bytes.
    fn member_access(&mut self, base: NodeId, offset: i64) -> NodeId;

    /// `base + index * stride` bytes.
    fn array_access(&mut self, base: NodeId, index: NodeId, stride: i64) -> NodeId;

    fn memcpy(&mut self, dst: NodeId, src: NodeId, size: u64, align: u64);

    fn memzero(&mut self, dst: NodeId, size: u64, align: u64);

    fn binary(&mut self, op: BinOp, dt: DataType, lhs: NodeId, rhs: NodeId) -> NodeId;

    /// Equality comparison producing a `Bool`.
    fn cmp_eq(&mut self, dt: DataType, lhs: NodeId, rhs: NodeId) -> NodeId;

    fn select(&mut self, dt: DataType, cond: NodeId, then: NodeId, otherwise: NodeId) -> NodeId;

    fn convert(&mut self, op: CastOp, to: DataType, value: NodeId) -> NodeId;

    /// Direct call; returns one node per result in `prototype.returns`.
    fn call(
        &mut self,
        target: SymbolId,
        prototype: &Prototype,
        args: &[NodeId],
    ) -> SmallVec<[NodeId; 2]>;

    fn ret(&mut self, values: &[NodeId]);
}
