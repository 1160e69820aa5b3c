//! Module-synthesised routines.
//!
//! After all procedures are generated, [`Module::finalize`] emits:
//! - `__$startup_runtime`: fills the type-info tables, runs global
//!   initialisers, then calls every `@(init)` procedure in collection order
//! - `__$cleanup_runtime`: calls every `@(fini)` procedure in reverse order
//! - `main`: the process entry trampoline around the entry-point procedure
//! - `__$startup_type_info` and the reflection arrays

use cg_backend::{Backend, FunctionId, Linkage};
use cg_ir::TypeId;
use tracing::debug;

use crate::error::{GenerateError, GenerateReport};
use crate::generate::WorkUnit;
use crate::module::Module;
use crate::procedure::{ProcArena, ProcState, Procedure};
use crate::value::Value;

pub const STARTUP_RUNTIME_PROC_NAME: &str = "__$startup_runtime";
pub const CLEANUP_RUNTIME_PROC_NAME: &str = "__$cleanup_runtime";
pub const STARTUP_TYPE_INFO_PROC_NAME: &str = "__$startup_type_info";
pub const ENTRY_POINT_NAME: &str = "main";

/// Runtime map lookup: `(map, info, key) -> ^value`, null when absent.
pub const MAP_GET_PROC_NAME: &str = "__dynamic_map_get";
/// Runtime map insert: `(map, info, key, value) -> ^value`.
pub const MAP_SET_PROC_NAME: &str = "__dynamic_map_set";

/// Body generator of a synthesised procedure.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Routine {
    StartupRuntime,
    CleanupRuntime,
    EntryPoint,
}

impl<B: Backend> Module<'_, B> {
    /// Emit the runtime routines and reflection tables. Call after
    /// [`Module::generate`]; a second call does nothing.
    ///
    /// # Errors
    /// A backend failure in any emitted routine.
    pub fn finalize(&mut self) -> Result<GenerateReport, GenerateError> {
        let mut report = GenerateReport::default();
        if self.member(STARTUP_RUNTIME_PROC_NAME).is_some() {
            return Ok(report);
        }
        let info = self.info;
        let hook_ty = info.runtime_proc_type();

        let type_info_func = if self.type_info_globals.is_some() {
            Some(self.declare_routine(STARTUP_TYPE_INFO_PROC_NAME, hook_ty, Linkage::Private)?)
        } else {
            None
        };
        let startup = self.declare_routine(STARTUP_RUNTIME_PROC_NAME, hook_ty, Linkage::Private)?;
        let cleanup = self.declare_routine(CLEANUP_RUNTIME_PROC_NAME, hook_ty, Linkage::Private)?;
        let mut units = vec![
            self.routine_unit(STARTUP_RUNTIME_PROC_NAME, startup, hook_ty, Routine::StartupRuntime),
            self.routine_unit(CLEANUP_RUNTIME_PROC_NAME, cleanup, hook_ty, Routine::CleanupRuntime),
        ];
        let has_entry = self
            .arena
            .iter()
            .any(|(_, p)| p.is_entry_point && p.symbol.is_some());
        if self.config.emit_entry_point && has_entry {
            let entry_ty = info.entry_proc_type();
            let main = self.declare_routine(ENTRY_POINT_NAME, entry_ty, Linkage::Public)?;
            units.push(self.routine_unit(ENTRY_POINT_NAME, main, entry_ty, Routine::EntryPoint));
        }

        for unit in units {
            let outcome = self.generate_unit(unit);
            self.arena.absorb(outcome.unit.procs);
            report.merge(outcome.report);
            if let Some(err) = outcome.fatal {
                return Err(err);
            }
        }

        // Last: the routines above may still reserve records.
        if let (Some(globals), Some(func)) = (self.type_info_globals, type_info_func) {
            let records = self
                .type_info
                .emit(&self.backend, &info.types, &globals, func)
                .map_err(|source| GenerateError::Backend {
                    procedure: STARTUP_TYPE_INFO_PROC_NAME.to_owned(),
                    source,
                })?;
            let id = self.alloc_proc_id();
            let mut proc = Procedure::synthetic(STARTUP_TYPE_INFO_PROC_NAME, hook_ty, func);
            proc.state |= ProcState::BEGUN | ProcState::BODY_LOWERED | ProcState::FINISHED;
            self.publish(id, &mut proc);
            self.arena.insert(id, proc);
            report.generated.push(STARTUP_TYPE_INFO_PROC_NAME.to_owned());
            debug!(records, "type info emitted");
        }
        Ok(report)
    }

    fn declare_routine(
        &self,
        name: &str,
        ty: TypeId,
        linkage: Linkage,
    ) -> Result<FunctionId, GenerateError> {
        let func = self
            .backend
            .declare_function(name, linkage)
            .map_err(|source| GenerateError::Backend {
                procedure: name.to_owned(),
                source,
            })?;
        self.add_member(name, Value::function(func, ty));
        Ok(func)
    }

    fn routine_unit(&self, name: &str, func: FunctionId, ty: TypeId, routine: Routine) -> WorkUnit {
        let id = self.alloc_proc_id();
        let mut proc = Procedure::synthetic(name, ty, func);
        proc.routine = Some(routine);
        let mut procs = ProcArena::new();
        procs.insert(id, proc);
        WorkUnit::new(id, procs)
    }
}
