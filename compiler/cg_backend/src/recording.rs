//! In-memory backend that records every call.
//!
//! `RecordingBackend` performs no instruction selection or emission: it
//! keeps the symbol table and each function's node list so callers can
//! inspect exactly what the lowering core asked for. Module state sits
//! behind one `parking_lot::Mutex`, which makes it safe to share across
//! lowering workers the same way a real backend module is.

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use tracing::trace;

use crate::error::BackendError;
use crate::ids::{ExternalId, FunctionId, GlobalId, NodeId, SymbolId};
use crate::traits::{Backend, FunctionBuilder};
use crate::types::{BinOp, CastOp, DataType, Inlining, Linkage, Prototype};

// ---------------------------------------------------------------------------
// Recorded data
// ---------------------------------------------------------------------------

/// One recorded IR node. A node's `NodeId` is its index in the function.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Inst {
    Param(usize),
    Local { size: u64, align: u64 },
    ConstInt { dt: DataType, value: i64 },
    ConstNull,
    ConstString(Vec<u8>),
    SymbolAddress(SymbolId),
    Load { dt: DataType, addr: NodeId, align: u64 },
    Store { dt: DataType, addr: NodeId, value: NodeId, align: u64 },
    MemberAccess { base: NodeId, offset: i64 },
    ArrayAccess { base: NodeId, index: NodeId, stride: i64 },
    Memcpy { dst: NodeId, src: NodeId, size: u64, align: u64 },
    Memzero { dst: NodeId, size: u64, align: u64 },
    Binary { op: BinOp, dt: DataType, lhs: NodeId, rhs: NodeId },
    CmpEq { dt: DataType, lhs: NodeId, rhs: NodeId },
    Select { dt: DataType, cond: NodeId, then: NodeId, otherwise: NodeId },
    Convert { op: CastOp, to: DataType, value: NodeId },
    Call { target: SymbolId, args: Vec<NodeId> },
    /// Result `index` of the preceding `Call` node `call`.
    CallResult { call: NodeId, index: usize },
    Return(Vec<NodeId>),
}

/// A finished function body.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct RecordedFunction {
    pub prototype: Prototype,
    pub insts: Vec<Inst>,
}

impl RecordedFunction {
    #[inline]
    pub fn inst(&self, node: NodeId) -> &Inst {
        &self.insts[node.index()]
    }

    /// Number of `Store` nodes (memcpy/memzero excluded).
    pub fn store_count(&self) -> usize {
        self.insts
            .iter()
            .filter(|i| matches!(i, Inst::Store { .. }))
            .count()
    }

    /// Call targets in emission order.
    pub fn call_targets(&self) -> Vec<SymbolId> {
        self.insts
            .iter()
            .filter_map(|i| match i {
                Inst::Call { target, .. } => Some(*target),
                _ => None,
            })
            .collect()
    }

    /// True if the body ends in a `Return`.
    pub fn is_terminated(&self) -> bool {
        matches!(self.insts.last(), Some(Inst::Return(_)))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SymbolKind {
    Function {
        linkage: Linkage,
        inlining: Inlining,
        body: Option<RecordedFunction>,
    },
    Global {
        linkage: Linkage,
        /// `(size, align)` once storage is attached.
        storage: Option<(u64, u64)>,
    },
    External,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SymbolRecord {
    pub name: String,
    pub kind: SymbolKind,
}

/// Function lifecycle events in the order the backend saw them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BackendEvent {
    Begin(String),
    Finish(String),
}

// ---------------------------------------------------------------------------
// RecordingBackend
// ---------------------------------------------------------------------------

#[derive(Default)]
struct ModuleState {
    symbols: Vec<SymbolRecord>,
    by_name: FxHashMap<String, SymbolId>,
    events: Vec<BackendEvent>,
}

impl ModuleState {
    fn declare(&mut self, name: &str, kind: SymbolKind) -> Result<SymbolId, BackendError> {
        if self.by_name.contains_key(name) {
            return Err(BackendError::DuplicateSymbol(name.to_owned()));
        }
        let id = SymbolId::from_raw(u32::try_from(self.symbols.len()).unwrap_or(u32::MAX));
        self.symbols.push(SymbolRecord {
            name: name.to_owned(),
            kind,
        });
        self.by_name.insert(name.to_owned(), id);
        Ok(id)
    }

    fn record_mut(&mut self, id: SymbolId) -> Result<&mut SymbolRecord, BackendError> {
        self.symbols
            .get_mut(id.index())
            .ok_or(BackendError::UnknownSymbol(id))
    }
}

/// Backend that records instead of emitting.
#[derive(Default)]
pub struct RecordingBackend {
    state: Mutex<ModuleState>,
    /// Symbol name whose declaration or definition is rejected.
    reject: Option<String>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend that rejects every operation on the symbol `name`.
    pub fn rejecting(name: impl Into<String>) -> Self {
        RecordingBackend {
            state: Mutex::default(),
            reject: Some(name.into()),
        }
    }

    fn check_rejected(&self, name: &str) -> Result<(), BackendError> {
        match &self.reject {
            Some(rejected) if rejected == name => Err(BackendError::Rejected {
                name: name.to_owned(),
                reason: "rejected by configuration".to_owned(),
            }),
            _ => Ok(()),
        }
    }

    // -- Inspection --

    pub fn symbol(&self, name: &str) -> Option<SymbolId> {
        self.state.lock().by_name.get(name).copied()
    }

    pub fn symbol_name(&self, id: SymbolId) -> Option<String> {
        self.state
            .lock()
            .symbols
            .get(id.index())
            .map(|s| s.name.clone())
    }

    pub fn record(&self, name: &str) -> Option<SymbolRecord> {
        let state = self.state.lock();
        let id = state.by_name.get(name)?;
        state.symbols.get(id.index()).cloned()
    }

    /// Body of a finished function.
    pub fn function(&self, name: &str) -> Option<RecordedFunction> {
        match self.record(name)?.kind {
            SymbolKind::Function { body, .. } => body,
            SymbolKind::Global { .. } | SymbolKind::External => None,
        }
    }

    pub fn symbol_count(&self) -> usize {
        self.state.lock().symbols.len()
    }

    pub fn events(&self) -> Vec<BackendEvent> {
        self.state.lock().events.clone()
    }
}

impl Backend for RecordingBackend {
    type Builder = RecordingBuilder;

    fn declare_function(&self, name: &str, linkage: Linkage) -> Result<FunctionId, BackendError> {
        self.check_rejected(name)?;
        let kind = SymbolKind::Function {
            linkage,
            inlining: Inlining::Default,
            body: None,
        };
        let id = self.state.lock().declare(name, kind)?;
        trace!(name, ?linkage, "declare function");
        Ok(FunctionId::new(id))
    }

    fn declare_external(&self, name: &str) -> Result<ExternalId, BackendError> {
        self.check_rejected(name)?;
        let id = self.state.lock().declare(name, SymbolKind::External)?;
        trace!(name, "declare external");
        Ok(ExternalId::new(id))
    }

    fn declare_global(&self, name: &str, linkage: Linkage) -> Result<GlobalId, BackendError> {
        self.check_rejected(name)?;
        let kind = SymbolKind::Global {
            linkage,
            storage: None,
        };
        let id = self.state.lock().declare(name, kind)?;
        trace!(name, ?linkage, "declare global");
        Ok(GlobalId::new(id))
    }

    fn define_global(&self, global: GlobalId, size: u64, align: u64) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        let record = state.record_mut(global.symbol())?;
        match &mut record.kind {
            SymbolKind::Global { storage, .. } => {
                *storage = Some((size, align));
                Ok(())
            }
            SymbolKind::Function { .. } | SymbolKind::External => {
                Err(BackendError::UnknownSymbol(global.symbol()))
            }
        }
    }

    fn begin_function(
        &self,
        func: FunctionId,
        prototype: Prototype,
    ) -> Result<RecordingBuilder, BackendError> {
        let mut state = self.state.lock();
        let record = state.record_mut(func.symbol())?;
        let name = record.name.clone();
        self.check_rejected(&name)?;
        if let SymbolKind::Function { body: Some(_), .. } = &record.kind {
            return Err(BackendError::AlreadyDefined(name));
        }
        state.events.push(BackendEvent::Begin(name.clone()));
        Ok(RecordingBuilder {
            func,
            name,
            body: RecordedFunction {
                prototype,
                insts: Vec::new(),
            },
        })
    }

    fn finish_function(
        &self,
        builder: RecordingBuilder,
        inlining: Inlining,
    ) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        let RecordingBuilder { func, name, body } = builder;
        let record = state.record_mut(func.symbol())?;
        match &mut record.kind {
            SymbolKind::Function {
                body: slot,
                inlining: recorded,
                ..
            } => {
                if slot.is_some() {
                    return Err(BackendError::AlreadyDefined(name));
                }
                trace!(name = %name, nodes = body.insts.len(), ?inlining, "finish function");
                *slot = Some(body);
                *recorded = inlining;
            }
            SymbolKind::Global { .. } | SymbolKind::External => {
                return Err(BackendError::UnknownSymbol(func.symbol()));
            }
        }
        state.events.push(BackendEvent::Finish(name));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// RecordingBuilder
// ---------------------------------------------------------------------------

/// Builder that appends each requested node to a list.
#[derive(Debug)]
pub struct RecordingBuilder {
    func: FunctionId,
    name: String,
    body: RecordedFunction,
}

impl RecordingBuilder {
    fn push(&mut self, inst: Inst) -> NodeId {
        let id = NodeId::from_raw(u32::try_from(self.body.insts.len()).unwrap_or(u32::MAX));
        self.body.insts.push(inst);
        id
    }

    /// Nodes recorded so far.
    pub fn insts(&self) -> &[Inst] {
        &self.body.insts
    }
}

impl FunctionBuilder for RecordingBuilder {
    fn function(&self) -> FunctionId {
        self.func
    }

    fn param(&mut self, index: usize) -> NodeId {
        self.push(Inst::Param(index))
    }

    fn local(&mut self, size: u64, align: u64) -> NodeId {
        self.push(Inst::Local { size, align })
    }

    fn const_int(&mut self, dt: DataType, value: i64) -> NodeId {
        self.push(Inst::ConstInt { dt, value })
    }

    fn const_null(&mut self) -> NodeId {
        self.push(Inst::ConstNull)
    }

    fn const_string(&mut self, bytes: &[u8]) -> NodeId {
        self.push(Inst::ConstString(bytes.to_vec()))
    }

    fn symbol_address(&mut self, symbol: SymbolId) -> NodeId {
        self.push(Inst::SymbolAddress(symbol))
    }

    fn load(&mut self, dt: DataType, addr: NodeId, align: u64) -> NodeId {
        self.push(Inst::Load { dt, addr, align })
    }

    fn store(&mut self, dt: DataType, addr: NodeId, value: NodeId, align: u64) {
        self.push(Inst::Store {
            dt,
            addr,
            value,
            align,
        });
    }

    fn member_access(&mut self, base: NodeId, offset: i64) -> NodeId {
        self.push(Inst::MemberAccess { base, offset })
    }

    fn array_access(&mut self, base: NodeId, index: NodeId, stride: i64) -> NodeId {
        self.push(Inst::ArrayAccess {
            base,
            index,
            stride,
        })
    }

    fn memcpy(&mut self, dst: NodeId, src: NodeId, size: u64, align: u64) {
        self.push(Inst::Memcpy {
            dst,
            src,
            size,
            align,
        });
    }

    fn memzero(&mut self, dst: NodeId, size: u64, align: u64) {
        self.push(Inst::Memzero { dst, size, align });
    }

    fn binary(&mut self, op: BinOp, dt: DataType, lhs: NodeId, rhs: NodeId) -> NodeId {
        self.push(Inst::Binary { op, dt, lhs, rhs })
    }

    fn cmp_eq(&mut self, dt: DataType, lhs: NodeId, rhs: NodeId) -> NodeId {
        self.push(Inst::CmpEq { dt, lhs, rhs })
    }

    fn select(&mut self, dt: DataType, cond: NodeId, then: NodeId, otherwise: NodeId) -> NodeId {
        self.push(Inst::Select {
            dt,
            cond,
            then,
            otherwise,
        })
    }

    fn convert(&mut self, op: CastOp, to: DataType, value: NodeId) -> NodeId {
        self.push(Inst::Convert { op, to, value })
    }

    fn call(
        &mut self,
        target: SymbolId,
        prototype: &Prototype,
        args: &[NodeId],
    ) -> SmallVec<[NodeId; 2]> {
        let call = self.push(Inst::Call {
            target,
            args: args.to_vec(),
        });
        (0..prototype.returns.len())
            .map(|index| self.push(Inst::CallResult { call, index }))
            .collect()
    }

    fn ret(&mut self, values: &[NodeId]) {
        self.push(Inst::Return(values.to_vec()));
    }
}
