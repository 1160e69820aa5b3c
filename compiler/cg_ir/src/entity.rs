//! Resolved declarations.

use crate::ast::{BodyId, ExprId};
use crate::span::Span;
use crate::types::TypeId;

/// Index of an `Entity` in `CheckerInfo`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct EntityId(u32);

impl EntityId {
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        EntityId(raw)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Inlining directive attached to a procedure declaration.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
pub enum ProcInlining {
    #[default]
    None,
    Inline,
    NoInline,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VariableDecl {
    /// Package-level variable rather than a procedure local or parameter.
    pub global: bool,
    /// Initialiser of a global, run from the startup routine.
    pub init: Option<ExprId>,
    pub link_name: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProcDecl {
    /// `None` for foreign procedures.
    pub body: Option<BodyId>,
    /// Parameter entities in declaration order.
    pub params: Vec<EntityId>,
    /// Enclosing procedure for procedure literals declared inside a body.
    pub parent: Option<EntityId>,
    pub is_foreign: bool,
    pub is_export: bool,
    pub is_entry_point: bool,
    /// `@(init)`: run from the startup routine before user code.
    pub is_startup: bool,
    /// `@(fini)`: run from the cleanup routine at termination.
    pub is_cleanup: bool,
    pub inlining: ProcInlining,
    pub link_name: Option<String>,
    /// Checker-defined attribute bits, carried through untouched.
    pub tags: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EntityKind {
    Variable(VariableDecl),
    Procedure(ProcDecl),
    TypeName,
}

/// A checked, uniquely identified declaration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entity {
    pub name: String,
    /// Declaring package, used as the symbol prefix.
    pub pkg: String,
    pub ty: TypeId,
    pub span: Span,
    pub kind: EntityKind,
}

impl Entity {
    pub fn as_procedure(&self) -> Option<&ProcDecl> {
        match &self.kind {
            EntityKind::Procedure(decl) => Some(decl),
            EntityKind::Variable(_) | EntityKind::TypeName => None,
        }
    }

    pub fn as_variable(&self) -> Option<&VariableDecl> {
        match &self.kind {
            EntityKind::Variable(decl) => Some(decl),
            EntityKind::Procedure(_) | EntityKind::TypeName => None,
        }
    }

    /// Package-level variable.
    pub fn is_global(&self) -> bool {
        matches!(&self.kind, EntityKind::Variable(v) if v.global)
    }
}
