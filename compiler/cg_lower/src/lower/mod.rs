//! Lowering of one procedure body.
//!
//! A [`ProcCx`] drives a single backend function from prologue to
//! epilogue. It borrows the shared [`Module`] immutably and the worker's
//! [`WorkUnit`] mutably, so nested procedure literals it encounters are
//! created in the unit without touching other workers.
//!
//! - `access`: the load/store protocol of every `AddrKind`
//! - `expr`: expressions, addresses and calls
//! - `stmt`: statements and returns
//! - `routine`: bodies of the runtime routines

mod access;
mod expr;
mod routine;
mod stmt;

use cg_backend::{Backend, DataType, FunctionBuilder, NodeId};
use cg_ir::{CheckerInfo, EntityId, Span, TypeId, TypePool};
use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use crate::abi::{proc_sig, ParamPass, ProcAbi, ReturnPass};
use crate::addr::Addr;
use crate::error::LowerError;
use crate::generate::WorkUnit;
use crate::module::Module;
use crate::procedure::{ProcFlags, ProcId, ProcState};
use crate::value::Value;

/// Per-procedure lowering state.
pub(crate) struct ProcCx<'a, 'info, B: Backend> {
    module: &'a Module<'info, B>,
    info: &'info CheckerInfo,
    unit: &'a mut WorkUnit,
    id: ProcId,
    builder: Option<B::Builder>,
    abi: ProcAbi,
    /// Storage of parameters and locals.
    locals: FxHashMap<EntityId, Addr>,
    /// Address of the context record, once known.
    context: Option<Value>,
    /// Hidden result pointer for aggregate returns.
    result_ptr: Option<NodeId>,
    /// Recoverable errors; lowering continued past each of them.
    diagnostics: Vec<LowerError>,
    terminated: bool,
}

impl<'a, 'info, B: Backend> ProcCx<'a, 'info, B> {
    /// Begin the backend function for procedure `id` and lower its prologue.
    ///
    /// # Panics
    /// If the procedure has no backend function (foreign procedures are
    /// never generated) or has already begun.
    pub fn begin(
        module: &'a Module<'info, B>,
        unit: &'a mut WorkUnit,
        id: ProcId,
    ) -> Result<Self, LowerError> {
        let info = module.info;
        let proc = unit.procs.proc(id);
        assert!(
            !proc.state.contains(ProcState::BEGUN),
            "procedure `{}` begun twice",
            proc.name
        );
        let func = proc
            .func
            .unwrap_or_else(|| panic!("procedure `{}` has no body to generate", proc.name));
        let span = proc.entity.map_or(Span::DUMMY, |e| info.entity(e).span);
        let abi = ProcAbi::compute(
            &info.types,
            proc_sig(&info.types, proc.ty),
            proc.flags.contains(ProcFlags::TAKES_CONTEXT),
            span,
        )?;
        let params: Vec<EntityId> = proc
            .entity
            .and_then(|e| info.entity(e).as_procedure())
            .map(|d| d.params.clone())
            .unwrap_or_default();
        debug!(name = %proc.name, params = params.len(), "begin procedure");

        let builder = module.backend.begin_function(func, abi.prototype.clone())?;
        unit.procs.proc_mut(id).state |= ProcState::BEGUN;

        let mut cx = ProcCx {
            module,
            info,
            unit,
            id,
            builder: Some(builder),
            abi,
            locals: FxHashMap::default(),
            context: None,
            result_ptr: None,
            diagnostics: Vec::new(),
            terminated: false,
        };
        cx.prologue(&params);
        Ok(cx)
    }

    /// Bind parameters to stack slots and pick up the hidden pointers.
    fn prologue(&mut self, params: &[EntityId]) {
        if self.abi.ret == ReturnPass::Indirect {
            let ptr = self.fb().param(0);
            self.result_ptr = Some(ptr);
        }
        let passing = self.abi.params.clone();
        for (i, (&param, pass)) in params.iter().zip(passing).enumerate() {
            let ty = self.info.entity(param).ty;
            let layout = self.types().layout(ty);
            let index = self.abi.param_index(i);
            let incoming = self.fb().param(index);
            let slot = self.alloc_local(ty);
            match pass {
                ParamPass::Direct(dt) => self.fb().store(dt, slot, incoming, layout.align),
                ParamPass::Indirect => self.fb().memcpy(slot, incoming, layout.size, layout.align),
            }
            let addr = self.location(Value::address(slot, ty));
            self.locals.insert(param, addr);
        }
        if let Some(index) = self.abi.context_index() {
            let ptr = self.fb().param(index);
            self.context = Some(Value::address(ptr, self.info.context_type()));
        }
    }

    /// Lower every statement of the body in source order.
    pub fn lower_body(&mut self) -> Result<(), LowerError> {
        let info = self.info;
        let proc = self.unit.procs.proc(self.id);
        if let Some(routine) = proc.routine {
            self.lower_routine(routine)?;
        } else if let Some(body) = proc.body {
            for &stmt in &info.ast.body(body).stmts {
                if self.terminated {
                    break;
                }
                self.lower_stmt(stmt)?;
            }
        }
        self.unit.procs.proc_mut(self.id).state |= ProcState::BODY_LOWERED;
        Ok(())
    }

    /// Close the body and hand it to the backend. Returns the recoverable
    /// diagnostics collected along the way.
    pub fn finish(&mut self) -> Result<Vec<LowerError>, LowerError> {
        let proc = self.unit.procs.proc(self.id);
        if proc.state.contains(ProcState::FINISHED) {
            return Ok(Vec::new());
        }
        let inlining = proc.backend_inlining();
        if !self.terminated {
            self.implicit_return();
        }
        let Some(builder) = self.builder.take() else {
            return Ok(Vec::new());
        };
        self.module.backend.finish_function(builder, inlining)?;
        let proc = self.unit.procs.proc_mut(self.id);
        proc.state |= ProcState::FINISHED;
        debug!(name = %proc.name, diagnostics = self.diagnostics.len(), "finished procedure");
        Ok(std::mem::take(&mut self.diagnostics))
    }

    /// Return of a body that falls off its end: zero for scalar results.
    fn implicit_return(&mut self) {
        match self.abi.ret {
            ReturnPass::Direct(dt) => {
                let zero = self.zero_scalar(dt);
                self.fb().ret(&[zero]);
            }
            ReturnPass::Void | ReturnPass::Indirect => self.fb().ret(&[]),
        }
        self.terminated = true;
    }

    // -- Helpers shared by the submodules --

    /// The open builder.
    ///
    /// # Panics
    /// If the function was already handed back to the backend.
    fn fb(&mut self) -> &mut B::Builder {
        self.builder
            .as_mut()
            .unwrap_or_else(|| panic!("procedure {:?} already finished", self.id))
    }

    #[inline]
    fn types(&self) -> &'info TypePool {
        &self.info.types
    }

    /// Fresh stack slot for a datum of type `ty`.
    fn alloc_local(&mut self, ty: TypeId) -> NodeId {
        let layout = self.types().layout(ty);
        self.fb().local(layout.size.max(1), layout.align.max(1))
    }

    fn zero_scalar(&mut self, dt: DataType) -> NodeId {
        match dt {
            DataType::Ptr => self.fb().const_null(),
            DataType::Bool | DataType::Int(_) | DataType::Float(_) => self.fb().const_int(dt, 0),
        }
    }

    /// Address of the context record, creating a zeroed one for procedures
    /// that were not handed a context.
    fn context_value(&mut self) -> Value {
        if let Some(ctx) = self.context {
            return ctx;
        }
        let ty = self.info.context_type();
        let layout = self.types().layout(ty);
        let slot = self.alloc_local(ty);
        self.fb().memzero(slot, layout.size, layout.align);
        let ctx = Value::address(slot, ty);
        self.context = Some(ctx);
        ctx
    }

    /// Record a recoverable error and carry on.
    fn report(&mut self, err: LowerError) {
        warn!(error = %err, span = ?err.span(), "lowering diagnostic");
        self.diagnostics.push(err);
    }
}
