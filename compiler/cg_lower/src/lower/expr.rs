//! Expressions, addresses and calls.

use cg_backend::{Backend, BinOp, DataType, FunctionBuilder, NodeId};
use cg_ir::{BinaryOp, EntityId, ExprId, ExprKind, Span, TypeId, TypeKind};
use smallvec::SmallVec;
use tracing::debug;

use super::access::imm;
use super::ProcCx;
use crate::abi::{data_type, proc_sig, takes_context, ParamPass, ProcAbi, ReturnPass};
use crate::addr::{Addr, AddrKind, LargeSwizzle, SmallSwizzle};
use crate::error::LowerError;
use crate::module::nested_procedure_name;
use crate::procedure::{ProcFlags, Procedure};
use crate::stack::ensure_sufficient_stack;
use crate::value::Value;

/// Whether a location is built to be read or written.
///
/// Reads may go through a temporary copy of a protocol-only base; writes
/// must reach the real storage.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(super) enum Access {
    Read,
    Write,
}

impl<B: Backend> ProcCx<'_, '_, B> {
    /// Lower an expression to a value.
    pub(super) fn build_expr(&mut self, id: ExprId) -> Result<Value, LowerError> {
        ensure_sufficient_stack(|| self.build_expr_inner(id))
    }

    fn build_expr_inner(&mut self, id: ExprId) -> Result<Value, LowerError> {
        let info = self.info;
        let expr = info.ast.expr(id);
        let types = self.types();
        match &expr.kind {
            ExprKind::IntLit(v) => {
                let dt = data_type(types, expr.ty).unwrap_or(DataType::I64);
                Ok(Value::node(self.fb().const_int(dt, *v), expr.ty))
            }
            ExprKind::BoolLit(b) => {
                let node = self.fb().const_int(DataType::Bool, i64::from(*b));
                Ok(Value::node(node, expr.ty))
            }
            ExprKind::Nil => match data_type(types, expr.ty) {
                Some(dt) => Ok(Value::node(self.zero_scalar(dt), expr.ty)),
                None => {
                    let layout = types.layout(expr.ty);
                    let slot = self.alloc_local(expr.ty);
                    self.fb().memzero(slot, layout.size, layout.align);
                    Ok(Value::address(slot, expr.ty))
                }
            },
            ExprKind::Ident(entity) if info.entity(*entity).as_procedure().is_some() => {
                self.procedure_value(*entity, expr.span)
            }
            ExprKind::Ident(_)
            | ExprKind::Context
            | ExprKind::Field { .. }
            | ExprKind::Index { .. }
            | ExprKind::Swizzle { .. }
            | ExprKind::Deref(_) => {
                let addr = self.build_addr(id)?;
                self.addr_load(&addr, expr.span)
            }
            ExprKind::AddrOf(inner) => {
                let addr = self.build_place(*inner)?;
                let ptr = self.addr_pointer(&addr, expr.span)?;
                Ok(Value::node(ptr, expr.ty))
            }
            ExprKind::Binary { op, lhs, rhs } => self.lower_binary(*op, *lhs, *rhs, expr.ty, expr.span),
            ExprKind::Call { callee, args } => self
                .lower_call(*callee, args, expr.ty, expr.span)?
                .ok_or(LowerError::Unsupported {
                    what: "a call without a result used as a value",
                    span: expr.span,
                }),
            ExprKind::ProcLit(entity) => self.lower_proc_lit(*entity, expr.span),
            ExprKind::TypeInfoOf(ty) => {
                if self.module.type_info_globals.is_none() {
                    return Err(LowerError::Unsupported {
                        what: "type_info_of with type info disabled",
                        span: expr.span,
                    });
                }
                let ptr = self.type_info_address(*ty);
                Ok(Value::node(ptr, expr.ty))
            }
        }
    }

    fn lower_binary(
        &mut self,
        op: BinaryOp,
        lhs: ExprId,
        rhs: ExprId,
        ty: TypeId,
        span: Span,
    ) -> Result<Value, LowerError> {
        let l = self.build_expr(lhs)?;
        let r = self.build_expr(rhs)?;
        let Some(dt) = data_type(self.types(), l.ty) else {
            return Err(LowerError::Unsupported {
                what: "arithmetic on aggregates",
                span,
            });
        };
        let a = self.scalar(l);
        let b = self.scalar(r);
        let node = match op {
            BinaryOp::Add => self.fb().binary(BinOp::Add, dt, a, b),
            BinaryOp::Sub => self.fb().binary(BinOp::Sub, dt, a, b),
            BinaryOp::Mul => self.fb().binary(BinOp::Mul, dt, a, b),
            BinaryOp::Eq => self.fb().cmp_eq(dt, a, b),
        };
        Ok(Value::node(node, ty))
    }

    // ---------------------------------------------------------------------
    // Addresses
    // ---------------------------------------------------------------------

    /// Lower an expression to the location it denotes, for reading. Values
    /// that have no location are spilled to a stack slot.
    pub(super) fn build_addr(&mut self, id: ExprId) -> Result<Addr, LowerError> {
        self.build_addr_for(id, Access::Read)
    }

    /// Location an assignment or `&` targets.
    pub(super) fn build_place(&mut self, id: ExprId) -> Result<Addr, LowerError> {
        self.build_addr_for(id, Access::Write)
    }

    fn build_addr_for(&mut self, id: ExprId, access: Access) -> Result<Addr, LowerError> {
        ensure_sufficient_stack(|| self.build_addr_inner(id, access))
    }

    fn build_addr_inner(&mut self, id: ExprId, access: Access) -> Result<Addr, LowerError> {
        let info = self.info;
        let expr = info.ast.expr(id);
        let types = self.types();
        match &expr.kind {
            ExprKind::Ident(entity) => {
                if let Some(addr) = self.locals.get(entity) {
                    return Ok(addr.clone());
                }
                if info.entity(*entity).is_global() {
                    let global = self.module.global_value(*entity, expr.span)?;
                    return Ok(self.location(global));
                }
                Err(LowerError::NotAddressable { span: expr.span })
            }
            ExprKind::Context => Ok(Addr::from_value(self.context_value())),
            ExprKind::Field { base, selection } => {
                let base_expr = info.ast.expr(*base);
                if matches!(base_expr.kind, ExprKind::Context) {
                    let ctx = self.context_value();
                    return Ok(Addr::context_field(ctx, selection.clone(), expr.ty));
                }
                let base_addr = self.build_addr_for(*base, access)?;
                if let AddrKind::SoaElement(soa) = &base_addr.kind {
                    return Ok(self.soa_field_location(&base_addr, soa.index, selection));
                }
                let ptr = self.addr_pointer_or_temp(&base_addr, access, base_expr.span)?;
                let (field_ptr, field_ty) = self.navigate(ptr, base_addr.ty, selection.indices());
                Ok(self.location(Value::address(field_ptr, field_ty)))
            }
            ExprKind::Index { base, index } => {
                self.build_index(expr.ty, *base, *index, access, expr.span)
            }
            ExprKind::Swizzle { base, indices } => {
                let base_expr = info.ast.expr(*base);
                let TypeKind::Array { elem, .. } = types.base_kind(base_expr.ty) else {
                    return Err(LowerError::Unsupported {
                        what: "swizzle of a non-array value",
                        span: expr.span,
                    });
                };
                let base_addr = self.build_addr_for(*base, access)?;
                let ptr = self.addr_pointer_or_temp(&base_addr, access, base_expr.span)?;
                let array = Value::address(ptr, base_expr.ty);
                if indices.len() > 4 {
                    let large = LargeSwizzle {
                        elem: *elem,
                        indices: indices.to_vec(),
                    };
                    return Ok(Addr::swizzle_large(array, large, expr.ty));
                }
                let components = indices
                    .iter()
                    .map(|&i| u8::try_from(i))
                    .collect::<Result<SmallVec<[u8; 4]>, _>>()
                    .map_err(|_| LowerError::Unsupported {
                        what: "negative swizzle component",
                        span: expr.span,
                    })?;
                let small = SmallSwizzle::new(*elem, &components, expr.span)?;
                Ok(Addr::swizzle_small(array, small, expr.ty))
            }
            ExprKind::Deref(inner) => {
                let inner_ty = info.ast.expr(*inner).ty;
                match types.base_kind(inner_ty) {
                    TypeKind::Pointer(_) => {
                        let p = self.build_expr(*inner)?;
                        let ptr = self.scalar(p);
                        Ok(self.location(Value::address(ptr, expr.ty)))
                    }
                    TypeKind::RelativePointer { .. } => {
                        let storage = self.build_addr_for(*inner, access)?;
                        Ok(Addr::relative_pointer(storage.base, expr.ty, true))
                    }
                    _ => Err(LowerError::Unsupported {
                        what: "dereference of a non-pointer",
                        span: expr.span,
                    }),
                }
            }
            ExprKind::IntLit(_)
            | ExprKind::BoolLit(_)
            | ExprKind::Nil
            | ExprKind::AddrOf(_)
            | ExprKind::Binary { .. }
            | ExprKind::Call { .. }
            | ExprKind::ProcLit(_)
            | ExprKind::TypeInfoOf(_) => {
                let value = self.build_expr(id)?;
                let ptr = self.memory(value);
                Ok(self.location(Value::address(ptr, value.ty)))
            }
        }
    }

    fn build_index(
        &mut self,
        ty: TypeId,
        base: ExprId,
        index: ExprId,
        access: Access,
        span: Span,
    ) -> Result<Addr, LowerError> {
        let info = self.info;
        let types = self.types();
        let base_expr = info.ast.expr(base);
        let base_ty = base_expr.ty;
        match types.base_kind(base_ty) {
            TypeKind::Map { .. } => {
                let map = self.build_addr_for(base, access)?;
                let ptr = self.addr_pointer_or_temp(&map, access, base_expr.span)?;
                let key = self.build_expr(index)?;
                Ok(Addr::map_element(Value::address(ptr, base_ty), key, base_ty, ty))
            }
            TypeKind::Soa { .. } => {
                let soa = self.build_addr_for(base, access)?;
                let ptr = self.addr_pointer_or_temp(&soa, access, base_expr.span)?;
                let i = self.build_expr(index)?;
                Ok(Addr::soa_element(Value::address(ptr, base_ty), i, Some(index), ty))
            }
            TypeKind::Array { elem, .. } => {
                let array = self.build_addr_for(base, access)?;
                let ptr = self.addr_pointer_or_temp(&array, access, base_expr.span)?;
                let i = self.build_expr(index)?;
                let i = self.scalar(i);
                let at = self.fb().array_access(ptr, i, imm(types.size_of(*elem)));
                Ok(self.location(Value::address(at, *elem)))
            }
            TypeKind::Slice(_) | TypeKind::String => {
                let slice = self.build_expr(base)?;
                let header = self.memory(slice);
                let data = self.fb().load(DataType::Ptr, header, 8);
                let i = self.build_expr(index)?;
                let i = self.scalar(i);
                let at = self.fb().array_access(data, i, imm(types.size_of(ty)));
                Ok(self.location(Value::address(at, ty)))
            }
            _ => Err(LowerError::Unsupported {
                what: "indexing this type",
                span,
            }),
        }
    }

    /// Pointer to a location. For reads, protocol-only locations are
    /// materialised into a temporary copy; writes through them are
    /// `NotAddressable`.
    fn addr_pointer_or_temp(
        &mut self,
        addr: &Addr,
        access: Access,
        span: Span,
    ) -> Result<NodeId, LowerError> {
        match self.addr_pointer(addr, span) {
            Err(LowerError::NotAddressable { .. }) if access == Access::Read => {
                let value = self.addr_load(addr, span)?;
                Ok(self.memory(value))
            }
            other => other,
        }
    }

    // ---------------------------------------------------------------------
    // Procedures and calls
    // ---------------------------------------------------------------------

    /// Value referencing a procedure entity.
    ///
    /// Nested procedures of the current body are created on first
    /// reference.
    fn procedure_value(&mut self, entity: EntityId, span: Span) -> Result<Value, LowerError> {
        if let Some(value) = self.unit.nested.get(&entity) {
            return Ok(*value);
        }
        if let Some(value) = self.module.entity_value(entity) {
            return Ok(value);
        }
        let info = self.info;
        let e = info.entity(entity);
        let current = self.unit.procs.proc(self.id).entity;
        match e.as_procedure() {
            Some(decl) if decl.parent.is_some() && decl.parent == current => {
                self.lower_proc_lit(entity, span)
            }
            _ => Err(LowerError::UnresolvedSymbol {
                name: e.name.clone(),
                span,
            }),
        }
    }

    /// Create the child procedure for a literal inside this body.
    ///
    /// The child is declared now and generated after this procedure has
    /// finished.
    fn lower_proc_lit(&mut self, entity: EntityId, span: Span) -> Result<Value, LowerError> {
        if let Some(value) = self.unit.nested.get(&entity) {
            return Ok(*value);
        }
        let info = self.info;
        let e = info.entity(entity);
        if e.as_procedure().is_none() {
            return Err(LowerError::Unsupported {
                what: "procedure literal of a non-procedure",
                span,
            });
        }
        let guid = self.module.next_nested_guid();
        let name = nested_procedure_name(&self.unit.procs.proc(self.id).name, &e.name, guid);
        let mut child = Procedure::from_entity(info, entity, name);
        let func = self
            .module
            .backend
            .declare_function(&child.name, child.linkage())?;
        child.set_function(func);
        if takes_context(proc_sig(self.types(), e.ty), child.is_runtime_hook()) {
            child.flags |= ProcFlags::TAKES_CONTEXT;
        }
        debug!(name = %child.name, parent = self.id.raw(), "nested procedure");
        let child_id = self.module.alloc_proc_id();
        self.unit.procs.add_child(self.id, child_id, child);
        let value = Value::function(func, e.ty);
        self.unit.nested.insert(entity, value);
        Ok(value)
    }

    /// Direct call. Returns `None` for procedures without a result.
    pub(super) fn lower_call(
        &mut self,
        callee: ExprId,
        args: &[ExprId],
        result_ty: TypeId,
        span: Span,
    ) -> Result<Option<Value>, LowerError> {
        let info = self.info;
        let callee_expr = info.ast.expr(callee);
        let (entity, target) = match &callee_expr.kind {
            ExprKind::Ident(e) => (*e, self.procedure_value(*e, callee_expr.span)?),
            ExprKind::ProcLit(e) => (*e, self.lower_proc_lit(*e, callee_expr.span)?),
            _ => {
                return Err(LowerError::Unsupported {
                    what: "indirect calls",
                    span,
                })
            }
        };
        let e = info.entity(entity);
        let Some(decl) = e.as_procedure() else {
            return Err(LowerError::Unsupported {
                what: "calling a non-procedure",
                span,
            });
        };
        let sig = proc_sig(self.types(), e.ty);
        let runtime_hook = decl.is_startup || decl.is_cleanup || decl.is_entry_point;
        let abi = ProcAbi::compute(self.types(), sig, takes_context(sig, runtime_hook), span)?;

        let mut nodes: SmallVec<[NodeId; 8]> = SmallVec::new();
        let result_slot = if abi.ret == ReturnPass::Indirect {
            let slot = self.alloc_local(result_ty);
            nodes.push(slot);
            Some(slot)
        } else {
            None
        };
        for (&arg, pass) in args.iter().zip(&abi.params) {
            let value = self.build_expr(arg)?;
            let node = match pass {
                ParamPass::Direct(_) => self.scalar(value),
                ParamPass::Indirect => self.memory(value),
            };
            nodes.push(node);
        }
        if abi.takes_context {
            let ctx = self.context_value();
            let ptr = self.base_pointer(ctx);
            nodes.push(ptr);
        }

        let results = self.fb().call(target.symbol(), &abi.prototype, &nodes);
        Ok(match abi.ret {
            ReturnPass::Void => None,
            ReturnPass::Direct(_) => Some(Value::node(results[0], result_ty)),
            ReturnPass::Indirect => result_slot.map(|slot| Value::address(slot, result_ty)),
        })
    }
}
