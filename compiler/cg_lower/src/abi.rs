//! Mapping from checked types and signatures to backend prototypes.
//!
//! Parameter order is `[result pointer] params.. [context pointer]`:
//! - a single aggregate result is returned through a leading pointer
//! - aggregate parameters are passed by pointer
//! - native-convention procedures take the context pointer last

use cg_backend::{DataType, Prototype};
use cg_ir::{CallingConvention, ProcSig, Span, TypeId, TypeKind, TypePool};

use crate::error::LowerError;

/// Backend type of a scalar; `None` for aggregates.
pub(crate) fn data_type(types: &TypePool, ty: TypeId) -> Option<DataType> {
    match types.base_kind(ty) {
        TypeKind::Bool => Some(DataType::Bool),
        TypeKind::Int { bytes, .. } => Some(DataType::Int(u16::from(*bytes) * 8)),
        TypeKind::Float { bytes } => Some(DataType::Float(u16::from(*bytes) * 8)),
        TypeKind::Rawptr | TypeKind::Pointer(_) | TypeKind::Proc(_) => Some(DataType::Ptr),
        TypeKind::String
        | TypeKind::Slice(_)
        | TypeKind::Array { .. }
        | TypeKind::Struct(_)
        | TypeKind::Map { .. }
        | TypeKind::Soa { .. }
        | TypeKind::RelativePointer { .. }
        | TypeKind::RelativeSlice { .. }
        | TypeKind::Named { .. } => None,
    }
}

/// Signature of a procedure type.
///
/// # Panics
/// If `ty` is not a procedure type.
pub(crate) fn proc_sig(types: &TypePool, ty: TypeId) -> &ProcSig {
    match types.base_kind(ty) {
        TypeKind::Proc(sig) => sig,
        _ => panic!("`{}` is not a procedure type", types.display(ty)),
    }
}

/// Whether a procedure of this signature receives the caller's context.
pub(crate) fn takes_context(sig: &ProcSig, runtime_hook: bool) -> bool {
    sig.convention == CallingConvention::Odin && !runtime_hook
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum ParamPass {
    Direct(DataType),
    /// Pointer to caller-owned storage.
    Indirect,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum ReturnPass {
    Void,
    Direct(DataType),
    /// Written through the leading result pointer.
    Indirect,
}

/// Lowered calling convention of one signature.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct ProcAbi {
    pub prototype: Prototype,
    pub params: Vec<ParamPass>,
    pub ret: ReturnPass,
    pub takes_context: bool,
}

impl ProcAbi {
    pub fn compute(
        types: &TypePool,
        sig: &ProcSig,
        takes_context: bool,
        span: Span,
    ) -> Result<Self, LowerError> {
        let ret = match sig.results.as_slice() {
            [] => ReturnPass::Void,
            [ty] => match data_type(types, *ty) {
                Some(dt) => ReturnPass::Direct(dt),
                None => ReturnPass::Indirect,
            },
            _ => {
                return Err(LowerError::Unsupported {
                    what: "procedures with multiple results",
                    span,
                })
            }
        };

        let mut proto_params = Vec::with_capacity(sig.params.len() + 2);
        if ret == ReturnPass::Indirect {
            proto_params.push(DataType::Ptr);
        }
        let params: Vec<ParamPass> = sig
            .params
            .iter()
            .map(|&ty| match data_type(types, ty) {
                Some(dt) => ParamPass::Direct(dt),
                None => ParamPass::Indirect,
            })
            .collect();
        proto_params.extend(params.iter().map(|p| match p {
            ParamPass::Direct(dt) => *dt,
            ParamPass::Indirect => DataType::Ptr,
        }));
        if takes_context {
            proto_params.push(DataType::Ptr);
        }

        let returns = match ret {
            ReturnPass::Direct(dt) => vec![dt],
            ReturnPass::Void | ReturnPass::Indirect => Vec::new(),
        };

        Ok(ProcAbi {
            prototype: Prototype::new(proto_params, returns),
            params,
            ret,
            takes_context,
        })
    }

    /// Backend parameter index of source parameter `i`.
    pub fn param_index(&self, i: usize) -> usize {
        i + usize::from(self.ret == ReturnPass::Indirect)
    }

    pub fn context_index(&self) -> Option<usize> {
        self.takes_context.then(|| self.prototype.params.len() - 1)
    }
}
