//! Statements.

use cg_backend::{Backend, FunctionBuilder};
use cg_ir::{EntityId, ExprId, ExprKind, Span, StmtId, StmtKind};

use super::ProcCx;
use crate::abi::ReturnPass;
use crate::addr::distinct_components;
use crate::error::LowerError;
use crate::value::Value;

impl<B: Backend> ProcCx<'_, '_, B> {
    pub(super) fn lower_stmt(&mut self, id: StmtId) -> Result<(), LowerError> {
        let info = self.info;
        let stmt = info.ast.stmt(id);
        match &stmt.kind {
            StmtKind::Local { entity, init } => self.lower_local(*entity, *init, stmt.span),
            StmtKind::Assign { lhs, rhs } => self.lower_assign(*lhs, *rhs, stmt.span),
            StmtKind::Expr(expr) => {
                match &info.ast.expr(*expr).kind {
                    ExprKind::Call { callee, args } => {
                        let ty = info.ast.expr(*expr).ty;
                        self.lower_call(*callee, args, ty, stmt.span)?;
                    }
                    _ => {
                        self.build_expr(*expr)?;
                    }
                }
                Ok(())
            }
            StmtKind::Return(value) => self.lower_return(*value),
        }
    }

    /// Stack slot for a local; zeroed unless initialised.
    fn lower_local(
        &mut self,
        entity: EntityId,
        init: Option<ExprId>,
        span: Span,
    ) -> Result<(), LowerError> {
        let ty = self.info.entity(entity).ty;
        let layout = self.types().layout(ty);
        let slot = self.alloc_local(ty);
        let addr = self.location(Value::address(slot, ty));
        match init {
            Some(init) => {
                let value = self.build_expr(init)?;
                self.addr_store(&addr, value, span)?;
            }
            None => self.fb().memzero(slot, layout.size, layout.align),
        }
        self.locals.insert(entity, addr);
        Ok(())
    }

    /// Swizzle targets are checked before anything is emitted, so a
    /// rejected store leaves no trace in the body.
    fn lower_assign(&mut self, lhs: ExprId, rhs: ExprId, span: Span) -> Result<(), LowerError> {
        let info = self.info;
        if let ExprKind::Swizzle { indices, .. } = &info.ast.expr(lhs).kind {
            if let Err(err) = distinct_components(indices.iter().copied(), span) {
                self.report(err);
                return Ok(());
            }
        }
        let addr = self.build_place(lhs)?;
        let value = self.build_expr(rhs)?;
        self.addr_store(&addr, value, span)
    }

    fn lower_return(&mut self, value: Option<ExprId>) -> Result<(), LowerError> {
        let value = value.map(|e| self.build_expr(e)).transpose()?;
        match (self.abi.ret, value) {
            (ReturnPass::Direct(_), Some(v)) => {
                let node = self.scalar(v);
                self.fb().ret(&[node]);
                self.terminated = true;
            }
            (ReturnPass::Indirect, Some(v)) => {
                let ptr = self
                    .result_ptr
                    .unwrap_or_else(|| panic!("aggregate return without a result pointer"));
                self.store_value(ptr, v.ty, v);
                self.fb().ret(&[]);
                self.terminated = true;
            }
            (ReturnPass::Void, _) => {
                self.fb().ret(&[]);
                self.terminated = true;
            }
            (ReturnPass::Direct(_) | ReturnPass::Indirect, None) => self.implicit_return(),
        }
        Ok(())
    }
}
