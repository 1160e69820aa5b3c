//! Reflection tables.
//!
//! Every type that code asks `type_info_of` for (directly, or as the key,
//! value, field or element of such a type) receives one 48-byte record in
//! `__$type_info_data`. Struct members additionally get a contiguous run in
//! each member array. Slots are handed out from atomics while procedures
//! are generated in parallel; the records themselves are written by the
//! `__$startup_type_info` routine emitted at finalisation.
//!
//! Record layout (all fields 8 bytes):
//!
//! | Offset | Field |
//! |---|---|
//! | 0 | size |
//! | 8 | align |
//! | 16 | kind tag |
//! | 24 | element/base/pointee record, or null |
//! | 32 | first member slot |
//! | 40 | member count |

use std::sync::atomic::{AtomicUsize, Ordering};

use cg_backend::{
    Backend, BackendError, DataType, FunctionBuilder, FunctionId, GlobalId, Inlining, Linkage,
    NodeId, Prototype,
};
use cg_ir::{TypeId, TypeKind, TypePool};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use smallvec::{smallvec, SmallVec};
use tracing::debug;

pub const TYPE_INFO_DATA_NAME: &str = "__$type_info_data";
pub const TYPE_INFO_TYPES_DATA_NAME: &str = "__$type_info_types_data";
pub const TYPE_INFO_NAMES_DATA_NAME: &str = "__$type_info_names_data";
pub const TYPE_INFO_OFFSETS_DATA_NAME: &str = "__$type_info_offsets_data";
pub const TYPE_INFO_USINGS_DATA_NAME: &str = "__$type_info_usings_data";
pub const TYPE_INFO_TAGS_DATA_NAME: &str = "__$type_info_tags_data";

/// Bytes per record in `__$type_info_data`.
pub const TYPE_INFO_RECORD_SIZE: u64 = 48;

/// `{data, len}` string entries in the name and tag arrays.
const STRING_ENTRY_SIZE: u64 = 16;
const WORD: u64 = 8;

/// Slots reserved for one struct's members, one run per member array.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MemberSlots {
    pub types: usize,
    pub names: usize,
    pub offsets: usize,
    pub usings: usize,
    pub tags: usize,
    pub count: usize,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TypeInfoSlot {
    /// Record index in `__$type_info_data`.
    pub index: usize,
    pub members: Option<MemberSlots>,
}

/// Number of slots handed out per array.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct TypeInfoCounts {
    pub data: usize,
    pub types: usize,
    pub names: usize,
    pub offsets: usize,
    pub usings: usize,
    pub tags: usize,
}

/// Slot allocator for the reflection arrays.
#[derive(Debug, Default)]
pub struct TypeInfoTables {
    memo: Mutex<FxHashMap<TypeId, TypeInfoSlot>>,
    data_index: AtomicUsize,
    types_index: AtomicUsize,
    names_index: AtomicUsize,
    offsets_index: AtomicUsize,
    usings_index: AtomicUsize,
    tags_index: AtomicUsize,
}

impl TypeInfoTables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slot of `ty`, reserving it and every type it refers to on first use.
    pub fn slot(&self, types: &TypePool, ty: TypeId) -> TypeInfoSlot {
        let slot = {
            let mut memo = self.memo.lock();
            if let Some(slot) = memo.get(&ty) {
                return *slot;
            }
            let index = self.data_index.fetch_add(1, Ordering::Relaxed);
            let count = types.fields(ty).len();
            let members = (count > 0).then(|| MemberSlots {
                types: self.types_index.fetch_add(count, Ordering::Relaxed),
                names: self.names_index.fetch_add(count, Ordering::Relaxed),
                offsets: self.offsets_index.fetch_add(count, Ordering::Relaxed),
                usings: self.usings_index.fetch_add(count, Ordering::Relaxed),
                tags: self.tags_index.fetch_add(count, Ordering::Relaxed),
                count,
            });
            let slot = TypeInfoSlot { index, members };
            memo.insert(ty, slot);
            slot
        };
        for dep in dependencies(types, ty) {
            self.slot(types, dep);
        }
        slot
    }

    /// Slot of `ty` if it has been reserved.
    pub fn get(&self, ty: TypeId) -> Option<TypeInfoSlot> {
        self.memo.lock().get(&ty).copied()
    }

    /// Number of reserved records.
    pub fn len(&self) -> usize {
        self.data_index.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn counts(&self) -> TypeInfoCounts {
        TypeInfoCounts {
            data: self.data_index.load(Ordering::Relaxed),
            types: self.types_index.load(Ordering::Relaxed),
            names: self.names_index.load(Ordering::Relaxed),
            offsets: self.offsets_index.load(Ordering::Relaxed),
            usings: self.usings_index.load(Ordering::Relaxed),
            tags: self.tags_index.load(Ordering::Relaxed),
        }
    }

    /// Reserved types in slot order.
    pub fn entries(&self) -> Vec<(TypeId, TypeInfoSlot)> {
        let mut entries: Vec<_> = self.memo.lock().iter().map(|(t, s)| (*t, *s)).collect();
        entries.sort_by_key(|(_, s)| s.index);
        entries
    }
}

/// Types whose records a record of `ty` points at.
fn dependencies(types: &TypePool, ty: TypeId) -> SmallVec<[TypeId; 4]> {
    match types.kind(ty) {
        TypeKind::Bool
        | TypeKind::Int { .. }
        | TypeKind::Float { .. }
        | TypeKind::Rawptr
        | TypeKind::String => SmallVec::new(),
        TypeKind::Pointer(t) | TypeKind::Slice(t) => smallvec![*t],
        TypeKind::Array { elem, .. } | TypeKind::Soa { elem, .. } => smallvec![*elem],
        TypeKind::Named { base, .. } => smallvec![*base],
        TypeKind::Map { key, value } => smallvec![*key, *value],
        TypeKind::RelativePointer { pointer, .. } => smallvec![*pointer],
        TypeKind::RelativeSlice { slice, .. } => smallvec![*slice],
        TypeKind::Struct(st) => st.fields.iter().map(|f| f.ty).collect(),
        TypeKind::Proc(sig) => sig.params.iter().chain(&sig.results).copied().collect(),
    }
}

/// Record the `elem` field points at.
fn element(types: &TypePool, ty: TypeId) -> Option<TypeId> {
    match types.kind(ty) {
        TypeKind::Pointer(t) | TypeKind::Slice(t) => Some(*t),
        TypeKind::Array { elem, .. } | TypeKind::Soa { elem, .. } => Some(*elem),
        TypeKind::Named { base, .. } => Some(*base),
        TypeKind::Map { value, .. } => Some(*value),
        TypeKind::RelativePointer { pointer, .. } => Some(*pointer),
        TypeKind::RelativeSlice { slice, .. } => Some(*slice),
        TypeKind::Bool
        | TypeKind::Int { .. }
        | TypeKind::Float { .. }
        | TypeKind::Rawptr
        | TypeKind::String
        | TypeKind::Struct(_)
        | TypeKind::Proc(_) => None,
    }
}

/// Kind tag stored at offset 16.
fn kind_tag(kind: &TypeKind) -> i64 {
    match kind {
        TypeKind::Named { .. } => 1,
        TypeKind::Bool => 2,
        TypeKind::Int { .. } => 3,
        TypeKind::Float { .. } => 4,
        TypeKind::Rawptr => 5,
        TypeKind::String => 6,
        TypeKind::Pointer(_) => 7,
        TypeKind::Slice(_) => 8,
        TypeKind::Array { .. } => 9,
        TypeKind::Struct(_) => 10,
        TypeKind::Map { .. } => 11,
        TypeKind::Soa { .. } => 12,
        TypeKind::RelativePointer { .. } => 13,
        TypeKind::RelativeSlice { .. } => 14,
        TypeKind::Proc(_) => 15,
    }
}

#[inline]
fn imm(v: u64) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}

#[inline]
fn slot_offset(index: usize, stride: u64) -> i64 {
    imm(index as u64 * stride)
}

// ---------------------------------------------------------------------------
// Emission
// ---------------------------------------------------------------------------

/// Backend globals backing the reflection arrays.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct TypeInfoGlobals {
    pub data: GlobalId,
    pub types: GlobalId,
    pub names: GlobalId,
    pub offsets: GlobalId,
    pub usings: GlobalId,
    pub tags: GlobalId,
}

impl TypeInfoGlobals {
    pub fn declare<B: Backend>(backend: &B) -> Result<Self, BackendError> {
        Ok(TypeInfoGlobals {
            data: backend.declare_global(TYPE_INFO_DATA_NAME, Linkage::Private)?,
            types: backend.declare_global(TYPE_INFO_TYPES_DATA_NAME, Linkage::Private)?,
            names: backend.declare_global(TYPE_INFO_NAMES_DATA_NAME, Linkage::Private)?,
            offsets: backend.declare_global(TYPE_INFO_OFFSETS_DATA_NAME, Linkage::Private)?,
            usings: backend.declare_global(TYPE_INFO_USINGS_DATA_NAME, Linkage::Private)?,
            tags: backend.declare_global(TYPE_INFO_TAGS_DATA_NAME, Linkage::Private)?,
        })
    }
}

/// Address of record `index` given the address of `__$type_info_data`.
pub(crate) fn record_address<F: FunctionBuilder>(fb: &mut F, data: NodeId, index: usize) -> NodeId {
    fb.member_access(data, slot_offset(index, TYPE_INFO_RECORD_SIZE))
}

fn store_word<F: FunctionBuilder>(fb: &mut F, base: NodeId, offset: i64, value: i64) {
    let at = fb.member_access(base, offset);
    let v = fb.const_int(DataType::I64, value);
    fb.store(DataType::I64, at, v, WORD);
}

fn store_string<F: FunctionBuilder>(fb: &mut F, at: NodeId, text: &str) {
    let data = fb.const_string(text.as_bytes());
    fb.store(DataType::Ptr, at, data, WORD);
    store_word(fb, at, 8, imm(text.len() as u64));
}

impl TypeInfoTables {
    /// Attach storage to the arrays and define `func` as the routine that
    /// fills them. Returns the number of records written.
    pub(crate) fn emit<B: Backend>(
        &self,
        backend: &B,
        types: &TypePool,
        globals: &TypeInfoGlobals,
        func: FunctionId,
    ) -> Result<usize, BackendError> {
        let counts = self.counts();
        backend.define_global(globals.data, counts.data as u64 * TYPE_INFO_RECORD_SIZE, WORD)?;
        backend.define_global(globals.types, counts.types as u64 * WORD, WORD)?;
        backend.define_global(globals.names, counts.names as u64 * STRING_ENTRY_SIZE, WORD)?;
        backend.define_global(globals.offsets, counts.offsets as u64 * WORD, WORD)?;
        backend.define_global(globals.usings, counts.usings as u64, 1)?;
        backend.define_global(globals.tags, counts.tags as u64 * STRING_ENTRY_SIZE, WORD)?;

        let entries = self.entries();
        let memo: FxHashMap<TypeId, TypeInfoSlot> = entries.iter().copied().collect();
        let mut fb = backend.begin_function(func, Prototype::default())?;
        let data = fb.symbol_address(globals.data.symbol());
        let member_types = fb.symbol_address(globals.types.symbol());
        let member_names = fb.symbol_address(globals.names.symbol());
        let member_offsets = fb.symbol_address(globals.offsets.symbol());
        let member_usings = fb.symbol_address(globals.usings.symbol());
        let member_tags = fb.symbol_address(globals.tags.symbol());

        for (ty, slot) in &entries {
            let layout = types.layout(*ty);
            let rec = record_address(&mut fb, data, slot.index);
            store_word(&mut fb, rec, 0, imm(layout.size));
            store_word(&mut fb, rec, 8, imm(layout.align));
            store_word(&mut fb, rec, 16, kind_tag(types.kind(*ty)));

            let elem_at = fb.member_access(rec, 24);
            let elem = match element(types, *ty).and_then(|e| memo.get(&e)) {
                Some(e) => record_address(&mut fb, data, e.index),
                None => fb.const_null(),
            };
            fb.store(DataType::Ptr, elem_at, elem, WORD);

            let (base, count) = slot
                .members
                .map_or((0, 0), |m| (m.types as u64, m.count as u64));
            store_word(&mut fb, rec, 32, imm(base));
            store_word(&mut fb, rec, 40, imm(count));

            let Some(members) = slot.members else {
                continue;
            };
            for (k, field) in types.fields(*ty).iter().enumerate() {
                let at = fb.member_access(member_types, slot_offset(members.types + k, WORD));
                let field_rec = match memo.get(&field.ty) {
                    Some(s) => record_address(&mut fb, data, s.index),
                    None => fb.const_null(),
                };
                fb.store(DataType::Ptr, at, field_rec, WORD);

                let at = fb.member_access(
                    member_names,
                    slot_offset(members.names + k, STRING_ENTRY_SIZE),
                );
                store_string(&mut fb, at, &field.name);

                store_word(
                    &mut fb,
                    member_offsets,
                    slot_offset(members.offsets + k, WORD),
                    imm(field.offset),
                );

                let at = fb.member_access(member_usings, slot_offset(members.usings + k, 1));
                let using = fb.const_int(DataType::Bool, i64::from(field.using));
                fb.store(DataType::Bool, at, using, 1);

                let at = fb.member_access(
                    member_tags,
                    slot_offset(members.tags + k, STRING_ENTRY_SIZE),
                );
                store_string(&mut fb, at, &field.tag);
            }
        }
        fb.ret(&[]);
        backend.finish_function(fb, Inlining::Never)?;
        debug!(records = entries.len(), members = counts.types, "emitted type info");
        Ok(entries.len())
    }
}
