//! Flat, checked AST.
//!
//! Nodes live in an `Ast` arena and reference each other by index. Every
//! expression carries the type the checker assigned to it.

use smallvec::SmallVec;

use crate::entity::EntityId;
use crate::selection::Selection;
use crate::span::Span;
use crate::types::TypeId;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(transparent)]
        pub struct $name(u32);

        impl $name {
            #[inline]
            pub const fn from_raw(raw: u32) -> Self {
                $name(raw)
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
    };
}

define_id!(
    /// Index into `Ast::exprs`.
    ExprId
);
define_id!(
    /// Index into `Ast::stmts`.
    StmtId
);
define_id!(
    /// Index into `Ast::bodies`.
    BodyId
);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Eq,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExprKind {
    IntLit(i64),
    BoolLit(bool),
    Nil,
    /// Reference to a variable, parameter or procedure.
    Ident(EntityId),
    /// The implicit `context` value.
    Context,
    /// `base.a.b`, resolved to field indices.
    Field { base: ExprId, selection: Selection },
    /// `base[index]` on arrays, slices, maps and `#soa` types.
    Index { base: ExprId, index: ExprId },
    /// `base.xyz` / `swizzle(base, ..)` component selection of an array.
    Swizzle { base: ExprId, indices: SmallVec<[i32; 4]> },
    Deref(ExprId),
    AddrOf(ExprId),
    Binary { op: BinaryOp, lhs: ExprId, rhs: ExprId },
    Call { callee: ExprId, args: Vec<ExprId> },
    /// Procedure literal declared inside the enclosing body.
    ProcLit(EntityId),
    /// `type_info_of(T)`
    TypeInfoOf(TypeId),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Expr {
    pub kind: ExprKind,
    pub ty: TypeId,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StmtKind {
    /// `x: T` or `x := init`
    Local { entity: EntityId, init: Option<ExprId> },
    Assign { lhs: ExprId, rhs: ExprId },
    Expr(ExprId),
    Return(Option<ExprId>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

/// A procedure body: statements in source order.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Body {
    pub stmts: Vec<StmtId>,
    pub span: Span,
}

/// Arena owning every expression, statement and body.
#[derive(Clone, Debug, Default)]
pub struct Ast {
    exprs: Vec<Expr>,
    stmts: Vec<Stmt>,
    bodies: Vec<Body>,
}

fn next_index(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}

impl Ast {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc_expr(&mut self, kind: ExprKind, ty: TypeId, span: Span) -> ExprId {
        let id = ExprId(next_index(self.exprs.len()));
        self.exprs.push(Expr { kind, ty, span });
        id
    }

    pub fn alloc_stmt(&mut self, kind: StmtKind, span: Span) -> StmtId {
        let id = StmtId(next_index(self.stmts.len()));
        self.stmts.push(Stmt { kind, span });
        id
    }

    pub fn alloc_body(&mut self, stmts: Vec<StmtId>, span: Span) -> BodyId {
        let id = BodyId(next_index(self.bodies.len()));
        self.bodies.push(Body { stmts, span });
        id
    }

    #[inline]
    pub fn expr(&self, id: ExprId) -> &Expr {
        &self.exprs[id.index()]
    }

    #[inline]
    pub fn stmt(&self, id: StmtId) -> &Stmt {
        &self.stmts[id.index()]
    }

    #[inline]
    pub fn body(&self, id: BodyId) -> &Body {
        &self.bodies[id.index()]
    }
}
