//! Operands produced and consumed by lowering.

use cg_backend::{ExternalId, FunctionId, GlobalId, NodeId, SymbolId};
use cg_ir::TypeId;

/// How a [`Value`]'s payload is consumed.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// A node holding the datum itself.
    Plain(NodeId),
    /// A node holding the address of the datum; one more load reads it.
    Address(NodeId),
    /// A backend symbol, used as a call target or as the address of a global.
    Symbol(SymbolId),
}

/// A typed operand.
///
/// `ty` is the type of the datum, also for `Address` values.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Value {
    pub ty: TypeId,
    pub kind: ValueKind,
}

impl Value {
    pub fn global(global: GlobalId, ty: TypeId) -> Self {
        Self::from_symbol(global, ty)
    }

    pub fn external(external: ExternalId, ty: TypeId) -> Self {
        Self::from_symbol(external, ty)
    }

    pub fn function(func: FunctionId, ty: TypeId) -> Self {
        Self::from_symbol(func, ty)
    }

    /// Any symbol-class handle.
    pub fn from_symbol(symbol: impl Into<SymbolId>, ty: TypeId) -> Self {
        Value {
            ty,
            kind: ValueKind::Symbol(symbol.into()),
        }
    }

    /// A raw node is always a plain value.
    pub fn node(node: NodeId, ty: TypeId) -> Self {
        Value {
            ty,
            kind: ValueKind::Plain(node),
        }
    }

    /// `node` points at a datum of type `ty`.
    pub fn address(node: NodeId, ty: TypeId) -> Self {
        Value {
            ty,
            kind: ValueKind::Address(node),
        }
    }

    #[inline]
    pub fn is_symbol(self) -> bool {
        matches!(self.kind, ValueKind::Symbol(_))
    }

    #[inline]
    pub fn is_address(self) -> bool {
        matches!(self.kind, ValueKind::Address(_))
    }

    /// The backend symbol of a `Symbol` value.
    ///
    /// # Panics
    /// If the value is not a symbol.
    pub fn symbol(self) -> SymbolId {
        match self.kind {
            ValueKind::Symbol(s) => s,
            ValueKind::Plain(_) | ValueKind::Address(_) => {
                panic!("value {self:?} is not a symbol")
            }
        }
    }

    /// The node of a `Plain` or `Address` value.
    ///
    /// # Panics
    /// If the value is a symbol; symbols must be materialised first.
    pub fn node_id(self) -> NodeId {
        match self.kind {
            ValueKind::Plain(n) | ValueKind::Address(n) => n,
            ValueKind::Symbol(_) => panic!("value {self:?} has no node"),
        }
    }

    /// Same payload, different type.
    #[must_use]
    pub fn with_type(self, ty: TypeId) -> Self {
        Value { ty, ..self }
    }
}
