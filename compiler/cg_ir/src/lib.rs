//! Checked program data consumed by the lowering core.
//!
//! Everything in this crate is produced by the front-end (parser and type
//! checker) and is read-only while code generation runs:
//! - Spans for diagnostics
//! - Types and their memory layouts (`TypePool`)
//! - Resolved declarations (`Entity`)
//! - A flat AST arena (`ExprId`, `StmtId`, `BodyId` indices)
//! - `CheckerInfo`, the bundle handed to the code generator
//!
//! # Design Philosophy
//!
//! - **Flatten Everything**: expressions reference each other by `ExprId`,
//!   never by `Box<Expr>`.
//! - **Layouts up front**: sizes, alignments and field offsets are computed
//!   when a type is registered, so lowering never recomputes them.

mod ast;
mod checker;
mod entity;
mod selection;
mod span;
mod types;

pub use ast::{Ast, BinaryOp, Body, BodyId, Expr, ExprId, ExprKind, Stmt, StmtId, StmtKind};
pub use checker::CheckerInfo;
pub use entity::{Entity, EntityId, EntityKind, ProcDecl, ProcInlining, VariableDecl};
pub use selection::Selection;
pub use span::Span;
pub use types::{
    CallingConvention, Field, FieldDef, Layout, ProcSig, SoaLayout, StructType, TypeId, TypeKind,
    TypePool,
};
