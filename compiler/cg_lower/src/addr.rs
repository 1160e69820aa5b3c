//! Storage locations and the protocol each one loads and stores with.
//!
//! An [`Addr`] pairs a base [`Value`] with an [`AddrKind`]. The kind picks
//! the instruction sequence `ProcCx::addr_load` / `ProcCx::addr_store`
//! emit; see `lower::access` for the sequences themselves.

use cg_ir::{ExprId, Selection, Span, TypeId};
use rustc_hash::FxHashSet;
use smallvec::SmallVec;

use crate::error::LowerError;
use crate::value::Value;

/// A location plus its access protocol.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Addr {
    /// Base operand: the storage itself for `Default`, the map header for
    /// `MapElement`, the context record for `ContextField`, and so on.
    pub base: Value,
    /// Type of the datum this location loads and stores.
    pub ty: TypeId,
    pub kind: AddrKind,
}

/// Access protocol of an [`Addr`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AddrKind {
    /// Plain memory.
    Default,
    /// Element of a runtime hash map, accessed through runtime calls.
    MapElement(MapElement),
    /// Field of the implicit context, reached through `selection`.
    ContextField(Selection),
    /// Element of a struct-of-arrays value.
    SoaElement(SoaElement),
    /// Pointer stored as an offset from its own address. With `deref`, the
    /// location is the pointee rather than the pointer.
    RelativePointer { deref: bool },
    /// Slice stored as `{offset, len}`.
    RelativeSlice { deref: bool },
    /// Two to four components of a fixed array.
    SwizzleSmall(SmallSwizzle),
    /// Any number of components of a fixed array.
    SwizzleLarge(LargeSwizzle),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MapElement {
    pub key: Value,
    pub map_type: TypeId,
    pub result: TypeId,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SoaElement {
    pub index: Value,
    /// Source of `index`, for diagnostics.
    pub index_expr: Option<ExprId>,
}

/// Up to four component indices, stored inline.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SmallSwizzle {
    elem: TypeId,
    count: u8,
    indices: [u8; 4],
}

impl SmallSwizzle {
    /// # Errors
    /// `InvalidSwizzleCount` unless there are 2, 3 or 4 indices.
    pub fn new(elem: TypeId, indices: &[u8], span: Span) -> Result<Self, LowerError> {
        if !(2..=4).contains(&indices.len()) {
            return Err(LowerError::InvalidSwizzleCount {
                count: indices.len(),
                span,
            });
        }
        let mut inline = [0u8; 4];
        inline[..indices.len()].copy_from_slice(indices);
        Ok(SmallSwizzle {
            elem,
            count: indices.len() as u8,
            indices: inline,
        })
    }

    #[inline]
    pub fn elem(&self) -> TypeId {
        self.elem
    }

    #[inline]
    pub fn count(&self) -> usize {
        usize::from(self.count)
    }

    pub fn indices(&self) -> &[u8] {
        &self.indices[..self.count()]
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LargeSwizzle {
    pub elem: TypeId,
    pub indices: Vec<i32>,
}

impl Addr {
    /// Promote a value to a plain-memory location.
    pub fn from_value(value: Value) -> Self {
        Addr {
            base: value,
            ty: value.ty,
            kind: AddrKind::Default,
        }
    }

    pub fn map_element(map: Value, key: Value, map_type: TypeId, result: TypeId) -> Self {
        Addr {
            base: map,
            ty: result,
            kind: AddrKind::MapElement(MapElement {
                key,
                map_type,
                result,
            }),
        }
    }

    pub fn context_field(context: Value, selection: Selection, field_ty: TypeId) -> Self {
        Addr {
            base: context,
            ty: field_ty,
            kind: AddrKind::ContextField(selection),
        }
    }

    pub fn soa_element(
        soa: Value,
        index: Value,
        index_expr: Option<ExprId>,
        elem_ty: TypeId,
    ) -> Self {
        Addr {
            base: soa,
            ty: elem_ty,
            kind: AddrKind::SoaElement(SoaElement { index, index_expr }),
        }
    }

    /// `storage` holds the offset; `ty` is the pointer type, or the pointee
    /// type when `deref` is set.
    pub fn relative_pointer(storage: Value, ty: TypeId, deref: bool) -> Self {
        Addr {
            base: storage,
            ty,
            kind: AddrKind::RelativePointer { deref },
        }
    }

    pub fn relative_slice(storage: Value, slice_ty: TypeId, deref: bool) -> Self {
        Addr {
            base: storage,
            ty: slice_ty,
            kind: AddrKind::RelativeSlice { deref },
        }
    }

    pub fn swizzle_small(array: Value, swizzle: SmallSwizzle, result: TypeId) -> Self {
        Addr {
            base: array,
            ty: result,
            kind: AddrKind::SwizzleSmall(swizzle),
        }
    }

    pub fn swizzle_large(array: Value, swizzle: LargeSwizzle, result: TypeId) -> Self {
        Addr {
            base: array,
            ty: result,
            kind: AddrKind::SwizzleLarge(swizzle),
        }
    }

    /// Reject stores that cannot be lowered before anything is emitted.
    ///
    /// # Errors
    /// `DuplicateSwizzleComponent` for the first repeated destination index.
    pub fn validate_store(&self, span: Span) -> Result<(), LowerError> {
        let indices: SmallVec<[i32; 8]> = match &self.kind {
            AddrKind::SwizzleSmall(s) => s.indices().iter().map(|&i| i32::from(i)).collect(),
            AddrKind::SwizzleLarge(s) => s.indices.iter().copied().collect(),
            AddrKind::Default
            | AddrKind::MapElement(_)
            | AddrKind::ContextField(_)
            | AddrKind::SoaElement(_)
            | AddrKind::RelativePointer { .. }
            | AddrKind::RelativeSlice { .. } => return Ok(()),
        };
        distinct_components(indices, span)
    }

    /// Map payload.
    ///
    /// # Panics
    /// If the kind is not `MapElement`.
    pub fn map(&self) -> &MapElement {
        match &self.kind {
            AddrKind::MapElement(m) => m,
            other => panic!("expected a map element address, found {other:?}"),
        }
    }

    /// `#soa` payload.
    ///
    /// # Panics
    /// If the kind is not `SoaElement`.
    pub fn soa(&self) -> &SoaElement {
        match &self.kind {
            AddrKind::SoaElement(s) => s,
            other => panic!("expected a #soa element address, found {other:?}"),
        }
    }
}

/// # Errors
/// `DuplicateSwizzleComponent` for the first repeated index.
pub(crate) fn distinct_components(
    indices: impl IntoIterator<Item = i32>,
    span: Span,
) -> Result<(), LowerError> {
    let mut seen = FxHashSet::default();
    for component in indices {
        if !seen.insert(component) {
            return Err(LowerError::DuplicateSwizzleComponent { component, span });
        }
    }
    Ok(())
}
