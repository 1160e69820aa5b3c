//! Checked types and their memory layouts.
//!
//! Types are registered once by the checker and referenced by `TypeId`.
//! Layout (size, alignment, field offsets) is computed at registration so
//! the code generator can read it without recomputation.

use rustc_hash::FxHashMap;

// ---------------------------------------------------------------------------
// TypeId
// ---------------------------------------------------------------------------

/// Index into a `TypePool`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct TypeId(u32);

impl TypeId {
    pub const BOOL: TypeId = TypeId(0);
    pub const I8: TypeId = TypeId(1);
    pub const I16: TypeId = TypeId(2);
    pub const I32: TypeId = TypeId(3);
    /// Word-sized signed integer.
    pub const INT: TypeId = TypeId(4);
    pub const U8: TypeId = TypeId(5);
    pub const U32: TypeId = TypeId(6);
    /// Word-sized unsigned integer able to hold an address.
    pub const UINTPTR: TypeId = TypeId(7);
    pub const F32: TypeId = TypeId(8);
    pub const F64: TypeId = TypeId(9);
    pub const RAWPTR: TypeId = TypeId(10);
    pub const STRING: TypeId = TypeId(11);

    /// First index available to compound types.
    pub const FIRST_COMPOUND: u32 = 12;

    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        TypeId(raw)
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

// ---------------------------------------------------------------------------
// Type kinds
// ---------------------------------------------------------------------------

/// A struct field with its resolved byte offset.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub ty: TypeId,
    pub offset: u64,
    /// Declared with `using`, promoting its members into the parent scope.
    pub using: bool,
    /// Raw field tag string, empty when absent.
    pub tag: String,
}

/// A struct field as declared, before layout.
#[derive(Clone, Debug)]
pub struct FieldDef {
    pub name: String,
    pub ty: TypeId,
    pub using: bool,
    pub tag: String,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, ty: TypeId) -> Self {
        FieldDef {
            name: name.into(),
            ty,
            using: false,
            tag: String::new(),
        }
    }

    #[must_use]
    pub fn with_using(mut self) -> Self {
        self.using = true;
        self
    }

    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StructType {
    pub fields: Vec<Field>,
}

/// Storage shape of a struct-of-arrays type.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum SoaLayout {
    /// `#soa[N]T`: one inline `[N]field` block per field.
    Fixed(u64),
    /// `#soa[]T`: one data pointer per field, then `len`.
    Slice,
    /// `#soa[dynamic]T`: one data pointer per field, then `len`, `cap`, allocator.
    Dynamic,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
pub enum CallingConvention {
    /// Native convention: trailing implicit context pointer.
    #[default]
    Odin,
    /// Foreign convention: no implicit context.
    C,
}

#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct ProcSig {
    pub params: Vec<TypeId>,
    pub results: Vec<TypeId>,
    pub convention: CallingConvention,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TypeKind {
    Bool,
    Int { bytes: u8, signed: bool },
    Float { bytes: u8 },
    Rawptr,
    /// `{data: ^u8, len: int}`
    String,
    Pointer(TypeId),
    /// `{data: ^T, len: int}`
    Slice(TypeId),
    Array { elem: TypeId, count: u64 },
    Struct(StructType),
    /// Runtime-managed hash map; opaque 32-byte header.
    Map { key: TypeId, value: TypeId },
    Soa { elem: TypeId, layout: SoaLayout },
    /// Pointer stored as a signed offset from its own address.
    RelativePointer { pointer: TypeId, base: TypeId },
    /// `{offset: base, len: base}` where `offset` is relative to the slice's address.
    RelativeSlice { slice: TypeId, base: TypeId },
    Proc(ProcSig),
    Named { name: String, base: TypeId },
}

/// Size and alignment in bytes.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub struct Layout {
    pub size: u64,
    pub align: u64,
}

impl Layout {
    const WORD: Layout = Layout { size: 8, align: 8 };

    const fn new(size: u64, align: u64) -> Self {
        Layout { size, align }
    }
}

/// Round `offset` up to a multiple of `align`.
#[inline]
fn align_up(offset: u64, align: u64) -> u64 {
    let align = align.max(1);
    offset.div_ceil(align) * align
}

/// Bytes of runtime allocator header (`{procedure, data}`).
const ALLOCATOR_SIZE: u64 = 16;

// ---------------------------------------------------------------------------
// TypePool
// ---------------------------------------------------------------------------

/// Registry of every type the checker produced.
pub struct TypePool {
    kinds: Vec<TypeKind>,
    layouts: Vec<Layout>,
    /// Interned `^T` for each pointee.
    pointers: FxHashMap<TypeId, TypeId>,
    /// Interned `[]T` for each element.
    slices: FxHashMap<TypeId, TypeId>,
}

impl TypePool {
    /// Create a pool with the primitive types at their fixed ids.
    pub fn new() -> Self {
        let mut pool = TypePool {
            kinds: Vec::with_capacity(64),
            layouts: Vec::with_capacity(64),
            pointers: FxHashMap::default(),
            slices: FxHashMap::default(),
        };
        let primitives = [
            (TypeId::BOOL, TypeKind::Bool),
            (TypeId::I8, TypeKind::Int { bytes: 1, signed: true }),
            (TypeId::I16, TypeKind::Int { bytes: 2, signed: true }),
            (TypeId::I32, TypeKind::Int { bytes: 4, signed: true }),
            (TypeId::INT, TypeKind::Int { bytes: 8, signed: true }),
            (TypeId::U8, TypeKind::Int { bytes: 1, signed: false }),
            (TypeId::U32, TypeKind::Int { bytes: 4, signed: false }),
            (TypeId::UINTPTR, TypeKind::Int { bytes: 8, signed: false }),
            (TypeId::F32, TypeKind::Float { bytes: 4 }),
            (TypeId::F64, TypeKind::Float { bytes: 8 }),
            (TypeId::RAWPTR, TypeKind::Rawptr),
            (TypeId::STRING, TypeKind::String),
        ];
        for (id, kind) in primitives {
            let pushed = pool.push(kind);
            debug_assert_eq!(pushed, id, "primitive registered out of order");
        }
        pool
    }

    fn push(&mut self, kind: TypeKind) -> TypeId {
        let layout = self.compute_layout(&kind);
        let id = TypeId(u32::try_from(self.kinds.len()).unwrap_or(u32::MAX));
        self.kinds.push(kind);
        self.layouts.push(layout);
        id
    }

    fn compute_layout(&self, kind: &TypeKind) -> Layout {
        match kind {
            TypeKind::Bool => Layout::new(1, 1),
            TypeKind::Int { bytes, .. } | TypeKind::Float { bytes } => {
                Layout::new(u64::from(*bytes), u64::from(*bytes))
            }
            TypeKind::Rawptr | TypeKind::Pointer(_) | TypeKind::Proc(_) => Layout::WORD,
            TypeKind::String | TypeKind::Slice(_) => Layout::new(16, 8),
            TypeKind::Array { elem, count } => {
                let elem = self.layout(*elem);
                Layout::new(elem.size * count, elem.align)
            }
            TypeKind::Struct(st) => {
                let align = st
                    .fields
                    .iter()
                    .map(|f| self.align_of(f.ty))
                    .max()
                    .unwrap_or(1);
                let end = st
                    .fields
                    .iter()
                    .map(|f| f.offset + self.size_of(f.ty))
                    .max()
                    .unwrap_or(0);
                Layout::new(align_up(end, align), align)
            }
            TypeKind::Map { .. } => Layout::new(16 + ALLOCATOR_SIZE, 8),
            TypeKind::Soa { elem, layout } => self.soa_layout(*elem, *layout),
            TypeKind::RelativePointer { base, .. } => self.layout(*base),
            TypeKind::RelativeSlice { base, .. } => {
                let base = self.layout(*base);
                Layout::new(base.size * 2, base.align)
            }
            TypeKind::Named { base, .. } => self.layout(*base),
        }
    }

    fn soa_layout(&self, elem: TypeId, layout: SoaLayout) -> Layout {
        let fields = self.fields(elem);
        let pointers = fields.len() as u64 * 8;
        match layout {
            SoaLayout::Fixed(count) => {
                let mut end = 0;
                let mut align = 1;
                for f in fields {
                    let fl = self.layout(f.ty);
                    end = align_up(end, fl.align) + fl.size * count;
                    align = align.max(fl.align);
                }
                Layout::new(align_up(end, align), align)
            }
            SoaLayout::Slice => Layout::new(pointers + 8, 8),
            SoaLayout::Dynamic => Layout::new(pointers + 16 + ALLOCATOR_SIZE, 8),
        }
    }

    // -- Registration --

    /// Intern `^pointee`.
    pub fn pointer_to(&mut self, pointee: TypeId) -> TypeId {
        if let Some(&id) = self.pointers.get(&pointee) {
            return id;
        }
        let id = self.push(TypeKind::Pointer(pointee));
        self.pointers.insert(pointee, id);
        id
    }

    /// Intern `[]elem`.
    pub fn slice_of(&mut self, elem: TypeId) -> TypeId {
        if let Some(&id) = self.slices.get(&elem) {
            return id;
        }
        let id = self.push(TypeKind::Slice(elem));
        self.slices.insert(elem, id);
        id
    }

    pub fn array_of(&mut self, elem: TypeId, count: u64) -> TypeId {
        self.push(TypeKind::Array { elem, count })
    }

    /// Register a struct, laying fields out in declaration order with
    /// natural alignment.
    pub fn struct_type(&mut self, defs: Vec<FieldDef>) -> TypeId {
        let mut offset = 0;
        let fields = defs
            .into_iter()
            .map(|def| {
                let layout = self.layout(def.ty);
                let field_offset = align_up(offset, layout.align);
                offset = field_offset + layout.size;
                Field {
                    name: def.name,
                    ty: def.ty,
                    offset: field_offset,
                    using: def.using,
                    tag: def.tag,
                }
            })
            .collect();
        self.push(TypeKind::Struct(StructType { fields }))
    }

    pub fn map_of(&mut self, key: TypeId, value: TypeId) -> TypeId {
        self.push(TypeKind::Map { key, value })
    }

    /// Register a struct-of-arrays over `elem`, which must be a struct.
    pub fn soa_of(&mut self, elem: TypeId, layout: SoaLayout) -> TypeId {
        debug_assert!(
            matches!(self.base_kind(elem), TypeKind::Struct(_)),
            "#soa element must be a struct"
        );
        self.push(TypeKind::Soa { elem, layout })
    }

    pub fn relative_pointer(&mut self, pointer: TypeId, base: TypeId) -> TypeId {
        self.push(TypeKind::RelativePointer { pointer, base })
    }

    pub fn relative_slice(&mut self, slice: TypeId, base: TypeId) -> TypeId {
        self.push(TypeKind::RelativeSlice { slice, base })
    }

    pub fn proc_type(&mut self, sig: ProcSig) -> TypeId {
        self.push(TypeKind::Proc(sig))
    }

    pub fn named(&mut self, name: impl Into<String>, base: TypeId) -> TypeId {
        self.push(TypeKind::Named {
            name: name.into(),
            base,
        })
    }

    // -- Queries --

    #[inline]
    pub fn kind(&self, ty: TypeId) -> &TypeKind {
        &self.kinds[ty.index()]
    }

    /// Strip `Named` wrappers.
    pub fn base(&self, mut ty: TypeId) -> TypeId {
        while let TypeKind::Named { base, .. } = self.kind(ty) {
            ty = *base;
        }
        ty
    }

    #[inline]
    pub fn base_kind(&self, ty: TypeId) -> &TypeKind {
        self.kind(self.base(ty))
    }

    #[inline]
    pub fn layout(&self, ty: TypeId) -> Layout {
        self.layouts[ty.index()]
    }

    #[inline]
    pub fn size_of(&self, ty: TypeId) -> u64 {
        self.layouts[ty.index()].size
    }

    #[inline]
    pub fn align_of(&self, ty: TypeId) -> u64 {
        self.layouts[ty.index()].align
    }

    /// True for types that fit a single backend register.
    pub fn is_scalar(&self, ty: TypeId) -> bool {
        matches!(
            self.base_kind(ty),
            TypeKind::Bool
                | TypeKind::Int { .. }
                | TypeKind::Float { .. }
                | TypeKind::Rawptr
                | TypeKind::Pointer(_)
                | TypeKind::Proc(_)
        )
    }

    /// Fields of a struct type; empty for anything else.
    pub fn fields(&self, ty: TypeId) -> &[Field] {
        match self.base_kind(ty) {
            TypeKind::Struct(st) => &st.fields,
            _ => &[],
        }
    }

    /// Byte offset of field `index`'s `[N]T` block inside a fixed `#soa` array.
    pub fn soa_block_offset(&self, elem: TypeId, count: u64, index: usize) -> u64 {
        let mut end = 0;
        for (i, f) in self.fields(elem).iter().enumerate() {
            let fl = self.layout(f.ty);
            let start = align_up(end, fl.align);
            if i == index {
                return start;
            }
            end = start + fl.size * count;
        }
        end
    }

    /// Signedness of an integer type; `false` for non-integers.
    pub fn is_signed(&self, ty: TypeId) -> bool {
        matches!(self.base_kind(ty), TypeKind::Int { signed: true, .. })
    }

    /// Readable name for logs and diagnostics.
    pub fn display(&self, ty: TypeId) -> String {
        match self.kind(ty) {
            TypeKind::Bool => "bool".to_owned(),
            TypeKind::Int { bytes, signed } => {
                format!("{}{}", if *signed { "i" } else { "u" }, u32::from(*bytes) * 8)
            }
            TypeKind::Float { bytes } => format!("f{}", u32::from(*bytes) * 8),
            TypeKind::Rawptr => "rawptr".to_owned(),
            TypeKind::String => "string".to_owned(),
            TypeKind::Pointer(p) => format!("^{}", self.display(*p)),
            TypeKind::Slice(e) => format!("[]{}", self.display(*e)),
            TypeKind::Array { elem, count } => format!("[{count}]{}", self.display(*elem)),
            TypeKind::Struct(st) => format!("struct{{{} fields}}", st.fields.len()),
            TypeKind::Map { key, value } => {
                format!("map[{}]{}", self.display(*key), self.display(*value))
            }
            TypeKind::Soa { elem, layout } => match layout {
                SoaLayout::Fixed(n) => format!("#soa[{n}]{}", self.display(*elem)),
                SoaLayout::Slice => format!("#soa[]{}", self.display(*elem)),
                SoaLayout::Dynamic => format!("#soa[dynamic]{}", self.display(*elem)),
            },
            TypeKind::RelativePointer { pointer, base } => {
                format!("#relative({}) {}", self.display(*base), self.display(*pointer))
            }
            TypeKind::RelativeSlice { slice, base } => {
                format!("#relative({}) {}", self.display(*base), self.display(*slice))
            }
            TypeKind::Proc(sig) => format!("proc({} params)", sig.params.len()),
            TypeKind::Named { name, .. } => name.clone(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}

impl Default for TypePool {
    fn default() -> Self {
        Self::new()
    }
}
