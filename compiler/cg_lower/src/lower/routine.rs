//! Bodies of the synthesised runtime routines.

use cg_backend::{Backend, FunctionBuilder, Prototype, SymbolId};
use cg_ir::{Span, TypeId};

use super::ProcCx;
use crate::abi::{proc_sig, ProcAbi};
use crate::error::LowerError;
use crate::procedure::Procedure;
use crate::runtime::{
    Routine, CLEANUP_RUNTIME_PROC_NAME, STARTUP_RUNTIME_PROC_NAME, STARTUP_TYPE_INFO_PROC_NAME,
};

impl<B: Backend> ProcCx<'_, '_, B> {
    pub(super) fn lower_routine(&mut self, routine: Routine) -> Result<(), LowerError> {
        match routine {
            Routine::StartupRuntime => {
                if self.module.type_info_globals.is_some() {
                    let target = self.runtime_symbol(STARTUP_TYPE_INFO_PROC_NAME, Span::DUMMY)?;
                    self.fb().call(target, &Prototype::default(), &[]);
                }
                self.lower_global_initializers()?;
                for (target, ty) in self.hooks(|p| p.is_startup) {
                    self.call_hook(target, ty)?;
                }
            }
            Routine::CleanupRuntime => {
                for (target, ty) in self.hooks(|p| p.is_cleanup).into_iter().rev() {
                    self.call_hook(target, ty)?;
                }
            }
            Routine::EntryPoint => {
                let startup = self.runtime_symbol(STARTUP_RUNTIME_PROC_NAME, Span::DUMMY)?;
                self.fb().call(startup, &Prototype::default(), &[]);
                for (target, ty) in self.hooks(|p| p.is_entry_point) {
                    self.call_hook(target, ty)?;
                }
                let cleanup = self.runtime_symbol(CLEANUP_RUNTIME_PROC_NAME, Span::DUMMY)?;
                self.fb().call(cleanup, &Prototype::default(), &[]);
            }
        }
        Ok(())
    }

    /// Store each global's initialiser, in declaration order.
    fn lower_global_initializers(&mut self) -> Result<(), LowerError> {
        let info = self.info;
        for (entity, e) in info.entities() {
            let Some(init) = e.as_variable().filter(|v| v.global).and_then(|v| v.init) else {
                continue;
            };
            let value = self.build_expr(init)?;
            let global = self.module.global_value(entity, e.span)?;
            let addr = self.location(global);
            self.addr_store(&addr, value, e.span)?;
        }
        Ok(())
    }

    /// Symbols of the module's procedures matching `pred`, in collection order.
    fn hooks(&self, pred: impl Fn(&Procedure) -> bool) -> Vec<(SymbolId, TypeId)> {
        self.module
            .arena
            .iter()
            .filter_map(|(_, p)| if pred(p) { p.symbol.map(|s| (s, p.ty)) } else { None })
            .collect()
    }

    /// Call a parameterless hook without a context.
    fn call_hook(&mut self, target: SymbolId, ty: TypeId) -> Result<(), LowerError> {
        let abi = ProcAbi::compute(self.types(), proc_sig(self.types(), ty), false, Span::DUMMY)?;
        if !abi.prototype.params.is_empty() {
            return Err(LowerError::Unsupported {
                what: "startup, cleanup or entry procedures with parameters",
                span: Span::DUMMY,
            });
        }
        self.fb().call(target, &abi.prototype, &[]);
        Ok(())
    }
}
