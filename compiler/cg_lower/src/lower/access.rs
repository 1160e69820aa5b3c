//! Load and store protocols.
//!
//! `addr_load` and `addr_store` dispatch on `AddrKind`. Scalars move through
//! a single typed load or store; aggregates are copied with `memcpy`, and a
//! loaded aggregate always lands in a fresh stack slot so later stores to
//! the source cannot change it.

use cg_backend::{Backend, BinOp, CastOp, DataType, FunctionBuilder, NodeId, Prototype, SymbolId};
use cg_ir::{Selection, SoaLayout, Span, TypeId, TypeKind};
use smallvec::SmallVec;
use tracing::trace;

use super::ProcCx;
use crate::abi::data_type;
use crate::addr::{Addr, AddrKind};
use crate::error::LowerError;
use crate::type_info::record_address;
use crate::value::{Value, ValueKind};

const WORD: u64 = 8;

#[inline]
pub(super) fn imm(v: u64) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}

impl<B: Backend> ProcCx<'_, '_, B> {
    // ---------------------------------------------------------------------
    // Dispatch
    // ---------------------------------------------------------------------

    pub(super) fn addr_load(&mut self, addr: &Addr, span: Span) -> Result<Value, LowerError> {
        trace!(kind = ?std::mem::discriminant(&addr.kind), ty = addr.ty.raw(), "load");
        match &addr.kind {
            AddrKind::Default => {
                let ptr = self.base_pointer(addr.base);
                Ok(self.load_value(ptr, addr.ty))
            }
            AddrKind::MapElement(map) => {
                let found = self.map_lookup(addr.base, map.key, map.map_type, span)?;
                let zero = self.alloc_local(map.result);
                let layout = self.types().layout(map.result);
                self.fb().memzero(zero, layout.size, layout.align);
                let null = self.fb().const_null();
                let missing = self.fb().cmp_eq(DataType::Ptr, found, null);
                let src = self.fb().select(DataType::Ptr, missing, zero, found);
                Ok(self.load_value(src, map.result))
            }
            AddrKind::ContextField(selection) => {
                let ptr = self.context_field_pointer(addr, selection);
                Ok(self.load_value(ptr, addr.ty))
            }
            AddrKind::SoaElement(soa) => {
                let index = self.scalar(soa.index);
                let storage = self.base_pointer(addr.base);
                let tmp = self.alloc_local(addr.ty);
                let types = self.types();
                for (j, field) in types.fields(addr.ty).iter().enumerate() {
                    let src = self.soa_field_pointer(storage, addr.base.ty, j, index);
                    let dst = self.fb().member_access(tmp, imm(field.offset));
                    self.copy_datum(dst, src, field.ty);
                }
                Ok(Value::address(tmp, addr.ty))
            }
            AddrKind::RelativePointer { deref } => {
                let storage = self.base_pointer(addr.base);
                let abs = self.relative_decode(storage, relative_base(self, addr.base.ty));
                if *deref {
                    Ok(self.load_value(abs, addr.ty))
                } else {
                    Ok(Value::node(abs, addr.ty))
                }
            }
            AddrKind::RelativeSlice { .. } => {
                let storage = self.base_pointer(addr.base);
                let base = relative_base(self, addr.base.ty);
                let base_size = self.types().size_of(base);
                let data = self.relative_decode(storage, base);
                let len_at = self.fb().member_access(storage, imm(base_size));
                let bdt = self.int_type(base);
                let len = self.fb().load(bdt, len_at, base_size);
                let len = self.widen(len, base);

                let slot = self.alloc_local(addr.ty);
                self.fb().store(DataType::Ptr, slot, data, WORD);
                let len_dst = self.fb().member_access(slot, 8);
                self.fb().store(DataType::I64, len_dst, len, WORD);
                Ok(Value::address(slot, addr.ty))
            }
            AddrKind::SwizzleSmall(_) | AddrKind::SwizzleLarge(_) => {
                let (elem, components) = swizzle_parts(&addr.kind);
                let stride = self.types().size_of(elem);
                let src = self.base_pointer(addr.base);
                let tmp = self.alloc_local(addr.ty);
                for (i, &component) in components.iter().enumerate() {
                    let from = self.fb().member_access(src, i64::from(component) * imm(stride));
                    let to = self.fb().member_access(tmp, imm(i as u64 * stride));
                    self.copy_datum(to, from, elem);
                }
                Ok(Value::address(tmp, addr.ty))
            }
        }
    }

    pub(super) fn addr_store(
        &mut self,
        addr: &Addr,
        value: Value,
        span: Span,
    ) -> Result<(), LowerError> {
        addr.validate_store(span)?;
        trace!(kind = ?std::mem::discriminant(&addr.kind), ty = addr.ty.raw(), "store");
        match &addr.kind {
            AddrKind::Default => {
                let ptr = self.base_pointer(addr.base);
                self.store_value(ptr, addr.ty, value);
            }
            AddrKind::MapElement(map) => {
                let map_ptr = self.base_pointer(addr.base);
                let info = self.type_info_address(map.map_type);
                let key = self.memory(map.key);
                let val = self.memory(value);
                self.runtime_call(
                    crate::runtime::MAP_SET_PROC_NAME,
                    &[map_ptr, info, key, val],
                    span,
                )?;
            }
            AddrKind::ContextField(selection) => {
                let ptr = self.context_field_pointer(addr, selection);
                self.store_value(ptr, addr.ty, value);
            }
            AddrKind::SoaElement(soa) => {
                let index = self.scalar(soa.index);
                let storage = self.base_pointer(addr.base);
                let src = self.memory(value);
                let types = self.types();
                for (j, field) in types.fields(addr.ty).iter().enumerate() {
                    let from = self.fb().member_access(src, imm(field.offset));
                    let to = self.soa_field_pointer(storage, addr.base.ty, j, index);
                    self.copy_datum(to, from, field.ty);
                }
            }
            AddrKind::RelativePointer { deref } => {
                let storage = self.base_pointer(addr.base);
                let base = relative_base(self, addr.base.ty);
                if *deref {
                    let abs = self.relative_decode(storage, base);
                    self.store_value(abs, addr.ty, value);
                } else {
                    let target = self.scalar(value);
                    self.relative_encode(storage, base, target);
                }
            }
            AddrKind::RelativeSlice { .. } => {
                let storage = self.base_pointer(addr.base);
                let base = relative_base(self, addr.base.ty);
                let base_size = self.types().size_of(base);
                let src = self.memory(value);
                let data = self.fb().load(DataType::Ptr, src, WORD);
                let len_at = self.fb().member_access(src, 8);
                let len = self.fb().load(DataType::I64, len_at, WORD);

                self.relative_encode(storage, base, data);
                let len = self.narrow(len, base);
                let bdt = self.int_type(base);
                let len_dst = self.fb().member_access(storage, imm(base_size));
                self.fb().store(bdt, len_dst, len, base_size);
            }
            AddrKind::SwizzleSmall(_) | AddrKind::SwizzleLarge(_) => {
                let (elem, components) = swizzle_parts(&addr.kind);
                let stride = self.types().size_of(elem);
                let dst = self.base_pointer(addr.base);
                let src = self.memory(value);
                for (i, &component) in components.iter().enumerate() {
                    let from = self.fb().member_access(src, imm(i as u64 * stride));
                    let to = self.fb().member_access(dst, i64::from(component) * imm(stride));
                    self.copy_datum(to, from, elem);
                }
            }
        }
        Ok(())
    }

    /// Pointer to the datum an address denotes.
    ///
    /// # Errors
    /// `NotAddressable` for locations that only exist through a protocol
    /// (map elements, `#soa` elements, swizzles).
    pub(super) fn addr_pointer(&mut self, addr: &Addr, span: Span) -> Result<NodeId, LowerError> {
        match &addr.kind {
            AddrKind::Default
            | AddrKind::RelativePointer { deref: false }
            | AddrKind::RelativeSlice { .. } => Ok(self.base_pointer(addr.base)),
            AddrKind::RelativePointer { deref: true } => {
                let storage = self.base_pointer(addr.base);
                let base = relative_base(self, addr.base.ty);
                Ok(self.relative_decode(storage, base))
            }
            AddrKind::ContextField(selection) => Ok(self.context_field_pointer(addr, selection)),
            AddrKind::MapElement(_)
            | AddrKind::SoaElement(_)
            | AddrKind::SwizzleSmall(_)
            | AddrKind::SwizzleLarge(_) => Err(LowerError::NotAddressable { span }),
        }
    }

    /// Location of a datum stored at `value`, picking the relative
    /// protocols for relative types.
    pub(super) fn location(&self, value: Value) -> Addr {
        match self.types().base_kind(value.ty) {
            TypeKind::RelativePointer { pointer, .. } => {
                Addr::relative_pointer(value, *pointer, false)
            }
            TypeKind::RelativeSlice { slice, .. } => Addr::relative_slice(value, *slice, false),
            _ => Addr::from_value(value),
        }
    }

    // ---------------------------------------------------------------------
    // Operands
    // ---------------------------------------------------------------------

    /// Node holding the location a base value refers to.
    pub(super) fn base_pointer(&mut self, base: Value) -> NodeId {
        match base.kind {
            ValueKind::Plain(n) | ValueKind::Address(n) => n,
            ValueKind::Symbol(s) => self.fb().symbol_address(s),
        }
    }

    /// The datum of a scalar value as a node.
    ///
    /// # Panics
    /// If an aggregate is used where a scalar is required.
    pub(super) fn scalar(&mut self, value: Value) -> NodeId {
        match value.kind {
            ValueKind::Plain(n) => n,
            ValueKind::Address(ptr) => {
                let dt = self.scalar_type(value.ty);
                let align = self.types().align_of(value.ty);
                self.fb().load(dt, ptr, align)
            }
            ValueKind::Symbol(s) => self.fb().symbol_address(s),
        }
    }

    /// Pointer to a copy of the datum, spilling plain values to the stack.
    pub(super) fn memory(&mut self, value: Value) -> NodeId {
        match value.kind {
            ValueKind::Address(ptr) => ptr,
            ValueKind::Plain(_) | ValueKind::Symbol(_) => {
                let node = self.scalar(value);
                let dt = self.scalar_type(value.ty);
                let slot = self.alloc_local(value.ty);
                let align = self.types().align_of(value.ty);
                self.fb().store(dt, slot, node, align);
                slot
            }
        }
    }

    pub(super) fn load_value(&mut self, ptr: NodeId, ty: TypeId) -> Value {
        let layout = self.types().layout(ty);
        match data_type(self.types(), ty) {
            Some(dt) => Value::node(self.fb().load(dt, ptr, layout.align), ty),
            None => {
                let slot = self.alloc_local(ty);
                self.fb().memcpy(slot, ptr, layout.size, layout.align);
                Value::address(slot, ty)
            }
        }
    }

    pub(super) fn store_value(&mut self, ptr: NodeId, ty: TypeId, value: Value) {
        let layout = self.types().layout(ty);
        match data_type(self.types(), ty) {
            Some(dt) => {
                let node = self.scalar(value);
                self.fb().store(dt, ptr, node, layout.align);
            }
            None => {
                let src = self.memory(value);
                self.fb().memcpy(ptr, src, layout.size, layout.align);
            }
        }
    }

    fn copy_datum(&mut self, dst: NodeId, src: NodeId, ty: TypeId) {
        let layout = self.types().layout(ty);
        match data_type(self.types(), ty) {
            Some(dt) => {
                let v = self.fb().load(dt, src, layout.align);
                self.fb().store(dt, dst, v, layout.align);
            }
            None => self.fb().memcpy(dst, src, layout.size, layout.align),
        }
    }

    fn scalar_type(&self, ty: TypeId) -> DataType {
        data_type(self.types(), ty).unwrap_or_else(|| {
            panic!("`{}` used as a scalar", self.types().display(ty))
        })
    }

    fn int_type(&self, ty: TypeId) -> DataType {
        match self.scalar_type(ty) {
            dt @ DataType::Int(_) => dt,
            other => panic!("relative base must be an integer, found {other:?}"),
        }
    }

    // ---------------------------------------------------------------------
    // Protocol pieces
    // ---------------------------------------------------------------------

    /// Walk field indices from the datum at `ptr`, loading through pointers
    /// before each step.
    pub(super) fn navigate(
        &mut self,
        mut ptr: NodeId,
        mut ty: TypeId,
        steps: &[u32],
    ) -> (NodeId, TypeId) {
        let types = self.types();
        for &index in steps {
            if let TypeKind::Pointer(pointee) = types.base_kind(ty) {
                ptr = self.fb().load(DataType::Ptr, ptr, WORD);
                ty = *pointee;
            }
            let field = types.fields(ty).get(index as usize).unwrap_or_else(|| {
                panic!("`{}` has no field {index}", types.display(ty))
            });
            ptr = self.fb().member_access(ptr, imm(field.offset));
            ty = field.ty;
        }
        (ptr, ty)
    }

    fn context_field_pointer(&mut self, addr: &Addr, selection: &Selection) -> NodeId {
        let ctx = self.base_pointer(addr.base);
        self.navigate(ctx, addr.base.ty, selection.indices()).0
    }

    /// Location of a field of a `#soa` element, inside the field's column.
    pub(super) fn soa_field_location(
        &mut self,
        element: &Addr,
        index: Value,
        selection: &Selection,
    ) -> Addr {
        let Some((&first, rest)) = selection.indices().split_first() else {
            return element.clone();
        };
        let index = self.scalar(index);
        let storage = self.base_pointer(element.base);
        let column = self.soa_field_pointer(storage, element.base.ty, first as usize, index);
        let field_ty = self.types().fields(element.ty)[first as usize].ty;
        let (ptr, ty) = self.navigate(column, field_ty, rest);
        self.location(Value::address(ptr, ty))
    }

    /// Element `index` of field `field` in a `#soa` value at `storage`.
    fn soa_field_pointer(
        &mut self,
        storage: NodeId,
        soa_ty: TypeId,
        field: usize,
        index: NodeId,
    ) -> NodeId {
        let types = self.types();
        let TypeKind::Soa { elem, layout } = types.base_kind(soa_ty) else {
            panic!("`{}` is not a #soa type", types.display(soa_ty));
        };
        let field_ty = types.fields(*elem)[field].ty;
        let stride = imm(types.size_of(field_ty));
        let column = match layout {
            SoaLayout::Fixed(count) => {
                let offset = types.soa_block_offset(*elem, *count, field);
                self.fb().member_access(storage, imm(offset))
            }
            SoaLayout::Slice | SoaLayout::Dynamic => {
                let at = self.fb().member_access(storage, imm(field as u64 * WORD));
                self.fb().load(DataType::Ptr, at, WORD)
            }
        };
        self.fb().array_access(column, index, stride)
    }

    fn widen(&mut self, node: NodeId, base: TypeId) -> NodeId {
        let dt = self.int_type(base);
        if dt.bytes() >= 8 {
            return node;
        }
        let op = if self.types().is_signed(base) {
            CastOp::SignExtend
        } else {
            CastOp::ZeroExtend
        };
        self.fb().convert(op, DataType::I64, node)
    }

    fn narrow(&mut self, node: NodeId, base: TypeId) -> NodeId {
        let dt = self.int_type(base);
        if dt.bytes() >= 8 {
            return node;
        }
        self.fb().convert(CastOp::Truncate, dt, node)
    }

    /// Absolute pointer encoded by the offset at `storage`; zero is nil.
    fn relative_decode(&mut self, storage: NodeId, base: TypeId) -> NodeId {
        let bdt = self.int_type(base);
        let off = self.fb().load(bdt, storage, bdt.bytes());
        let off = self.widen(off, base);
        let fb = self.fb();
        let zero = fb.const_int(DataType::I64, 0);
        let is_nil = fb.cmp_eq(DataType::I64, off, zero);
        let here = fb.convert(CastOp::PtrToInt, DataType::I64, storage);
        let sum = fb.binary(BinOp::Add, DataType::I64, here, off);
        let abs = fb.convert(CastOp::IntToPtr, DataType::Ptr, sum);
        let null = fb.const_null();
        fb.select(DataType::Ptr, is_nil, null, abs)
    }

    /// Store `target` at `storage` as an offset from `storage`; nil is zero.
    fn relative_encode(&mut self, storage: NodeId, base: TypeId, target: NodeId) {
        let bdt = self.int_type(base);
        let fb = self.fb();
        let here = fb.convert(CastOp::PtrToInt, DataType::I64, storage);
        let there = fb.convert(CastOp::PtrToInt, DataType::I64, target);
        let off = fb.binary(BinOp::Sub, DataType::I64, there, here);
        let off = self.narrow(off, base);
        let fb = self.fb();
        let null = fb.const_null();
        let is_nil = fb.cmp_eq(DataType::Ptr, target, null);
        let zero = fb.const_int(bdt, 0);
        let encoded = fb.select(bdt, is_nil, zero, off);
        fb.store(bdt, storage, encoded, bdt.bytes());
    }

    /// `__dynamic_map_get`: pointer to the value for `key`, or null.
    fn map_lookup(
        &mut self,
        map: Value,
        key: Value,
        map_type: TypeId,
        span: Span,
    ) -> Result<NodeId, LowerError> {
        let map_ptr = self.base_pointer(map);
        let info = self.type_info_address(map_type);
        let key = self.memory(key);
        self.runtime_call(crate::runtime::MAP_GET_PROC_NAME, &[map_ptr, info, key], span)
    }

    /// Call a runtime procedure taking and returning pointers.
    fn runtime_call(
        &mut self,
        name: &str,
        args: &[NodeId],
        span: Span,
    ) -> Result<NodeId, LowerError> {
        let target = self.runtime_symbol(name, span)?;
        let proto = Prototype::new(vec![DataType::Ptr; args.len()], vec![DataType::Ptr]);
        let results = self.fb().call(target, &proto, args);
        Ok(results[0])
    }

    /// Module-level symbol `name`, declared by collection.
    pub(super) fn runtime_symbol(&self, name: &str, span: Span) -> Result<SymbolId, LowerError> {
        match self.module.member(name) {
            Some(value) if value.is_symbol() => Ok(value.symbol()),
            _ => Err(LowerError::UnresolvedSymbol {
                name: name.to_owned(),
                span,
            }),
        }
    }

    /// Address of `ty`'s reflection record, or null without type info.
    pub(super) fn type_info_address(&mut self, ty: TypeId) -> NodeId {
        let Some(globals) = self.module.type_info_globals else {
            return self.fb().const_null();
        };
        let slot = self.module.type_info.slot(self.types(), ty);
        let data = self.fb().symbol_address(globals.data.symbol());
        record_address(self.fb(), data, slot.index)
    }
}

/// Integer type a relative pointer or slice type stores its offset in.
fn relative_base<B: Backend>(cx: &ProcCx<'_, '_, B>, ty: TypeId) -> TypeId {
    match cx.types().base_kind(ty) {
        TypeKind::RelativePointer { base, .. } | TypeKind::RelativeSlice { base, .. } => *base,
        _ => panic!("`{}` is not a relative type", cx.types().display(ty)),
    }
}

/// Element type and component indices of a swizzle.
fn swizzle_parts(kind: &AddrKind) -> (TypeId, SmallVec<[i32; 8]>) {
    match kind {
        AddrKind::SwizzleSmall(s) => (s.elem(), s.indices().iter().map(|&i| i32::from(i)).collect()),
        AddrKind::SwizzleLarge(s) => (s.elem, s.indices.iter().copied().collect()),
        AddrKind::Default
        | AddrKind::MapElement(_)
        | AddrKind::ContextField(_)
        | AddrKind::SoaElement(_)
        | AddrKind::RelativePointer { .. }
        | AddrKind::RelativeSlice { .. } => unreachable!("not a swizzle: {kind:?}"),
    }
}
