//! Shared state of one generation phase.
//!
//! A [`Module`] owns the backend and everything lowering workers share:
//! - the entity cache, mapping declarations to the [`Value`] that
//!   references them
//! - name tables for members and finished procedures
//! - the procedure arena and the list of procedures still to generate
//! - the reflection tables
//!
//! The entity cache is a `parking_lot::RwLock` map. First insertions go
//! through an in-flight set so that exactly one worker declares a given
//! global while the others wait; no module lock is held while the backend
//! runs.

use std::sync::atomic::{AtomicU32, Ordering};

use cg_backend::{Backend, BackendError, FunctionId, Linkage};
use cg_ir::{CheckerInfo, EntityId, EntityKind, Span};
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex, RwLock};
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, trace};

use crate::abi::{proc_sig, takes_context};
use crate::config::LowerConfig;
use crate::error::{GenerateError, LowerError};
use crate::procedure::{ProcArena, ProcFlags, ProcId, ProcState, Procedure};
use crate::type_info::{TypeInfoGlobals, TypeInfoTables};
use crate::value::Value;
use crate::PKG_NAME_SEPARATOR;

/// Name-table entry for a generated procedure.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ProcEntry {
    pub id: ProcId,
    pub func: FunctionId,
    pub entity: Option<EntityId>,
}

/// Code generation state for one program.
pub struct Module<'info, B: Backend> {
    pub(crate) backend: B,
    pub(crate) info: &'info CheckerInfo,
    pub(crate) config: LowerConfig,

    values: RwLock<FxHashMap<EntityId, Value>>,
    in_flight: Mutex<FxHashSet<EntityId>>,
    in_flight_done: Condvar,

    members: DashMap<String, Value>,
    procedures: DashMap<String, ProcEntry>,
    procedure_values: DashMap<FunctionId, EntityId>,

    pub(crate) arena: ProcArena,
    pub(crate) procedures_to_generate: Vec<ProcId>,
    next_proc_id: AtomicU32,
    nested_type_name_guid: AtomicU32,

    pub(crate) type_info: TypeInfoTables,
    pub(crate) type_info_globals: Option<TypeInfoGlobals>,
}

impl<'info, B: Backend> Module<'info, B> {
    /// Create a module over `backend`. Declares the reflection arrays when
    /// type info is enabled.
    pub fn new(
        backend: B,
        info: &'info CheckerInfo,
        config: LowerConfig,
    ) -> Result<Self, BackendError> {
        let type_info_globals = if config.emit_type_info {
            Some(TypeInfoGlobals::declare(&backend)?)
        } else {
            None
        };
        Ok(Module {
            backend,
            info,
            config,
            values: RwLock::new(FxHashMap::default()),
            in_flight: Mutex::new(FxHashSet::default()),
            in_flight_done: Condvar::new(),
            members: DashMap::new(),
            procedures: DashMap::new(),
            procedure_values: DashMap::new(),
            arena: ProcArena::new(),
            procedures_to_generate: Vec::new(),
            next_proc_id: AtomicU32::new(0),
            nested_type_name_guid: AtomicU32::new(0),
            type_info: TypeInfoTables::new(),
            type_info_globals,
        })
    }

    // -- Accessors --

    #[inline]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Consume the module, returning the populated backend.
    pub fn into_backend(self) -> B {
        self.backend
    }

    #[inline]
    pub fn info(&self) -> &'info CheckerInfo {
        self.info
    }

    #[inline]
    pub fn config(&self) -> &LowerConfig {
        &self.config
    }

    pub fn arena(&self) -> &ProcArena {
        &self.arena
    }

    /// Procedures collected but not yet generated.
    pub fn pending(&self) -> &[ProcId] {
        &self.procedures_to_generate
    }

    pub fn type_info(&self) -> &TypeInfoTables {
        &self.type_info
    }

    // -- Entity cache --

    /// Cached value of `entity`, if any.
    pub fn entity_value(&self, entity: EntityId) -> Option<Value> {
        self.values.read().get(&entity).copied()
    }

    /// Cached value of `entity`, creating it with `create` on first use.
    ///
    /// Concurrent callers for the same entity block until the first one
    /// finishes and then observe its value. If `create` fails nothing is
    /// cached and the next caller tries again.
    pub fn value_or_insert_with(
        &self,
        entity: EntityId,
        create: impl FnOnce() -> Result<Value, LowerError>,
    ) -> Result<Value, LowerError> {
        if let Some(value) = self.entity_value(entity) {
            return Ok(value);
        }
        {
            let mut in_flight = self.in_flight.lock();
            loop {
                if let Some(value) = self.entity_value(entity) {
                    return Ok(value);
                }
                if in_flight.insert(entity) {
                    break;
                }
                self.in_flight_done.wait(&mut in_flight);
            }
        }

        let _claim = InFlightClaim {
            in_flight: &self.in_flight,
            done: &self.in_flight_done,
            entity,
        };
        let result = create();
        if let Ok(value) = &result {
            self.values.write().insert(entity, *value);
        }
        result
    }

    /// Value of a global variable, declaring its storage on first use.
    pub(crate) fn global_value(&self, entity: EntityId, span: Span) -> Result<Value, LowerError> {
        self.value_or_insert_with(entity, || {
            let e = self.info.entity(entity);
            let Some(var) = e.as_variable().filter(|v| v.global) else {
                return Err(LowerError::UnresolvedSymbol {
                    name: e.name.clone(),
                    span,
                });
            };
            let name = var
                .link_name
                .clone()
                .unwrap_or_else(|| qualified_name(&e.pkg, &e.name));
            let linkage = if var.link_name.is_some() {
                Linkage::Public
            } else {
                Linkage::Private
            };
            let global = self.backend.declare_global(&name, linkage)?;
            let layout = self.info.types.layout(e.ty);
            self.backend.define_global(global, layout.size, layout.align)?;
            debug!(name = %name, size = layout.size, "declared global");
            let value = Value::global(global, e.ty);
            self.members.insert(name, value);
            Ok(value)
        })
    }

    // -- Name tables --

    pub fn add_member(&self, name: impl Into<String>, value: Value) {
        self.members.insert(name.into(), value);
    }

    /// Module-level symbol by name: procedures, externals and globals.
    pub fn member(&self, name: &str) -> Option<Value> {
        self.members.get(name).map(|v| *v)
    }

    /// Generated procedure by name.
    pub fn procedure(&self, name: &str) -> Option<ProcEntry> {
        self.procedures.get(name).map(|e| *e)
    }

    /// Source entity of a generated procedure.
    pub fn procedure_entity(&self, func: FunctionId) -> Option<EntityId> {
        self.procedure_values.get(&func).map(|e| *e)
    }

    pub fn procedure_count(&self) -> usize {
        self.procedures.len()
    }

    /// Record a finished procedure in the name tables.
    pub(crate) fn publish(&self, id: ProcId, proc: &mut Procedure) {
        if proc.state.contains(ProcState::PUBLISHED) {
            return;
        }
        let Some(func) = proc.func else {
            return;
        };
        self.procedures.insert(
            proc.name.clone(),
            ProcEntry {
                id,
                func,
                entity: proc.entity,
            },
        );
        if let Some(entity) = proc.entity {
            self.procedure_values.insert(func, entity);
            if proc.flags.contains(ProcFlags::NESTED) {
                if let Some(value) = proc.value {
                    self.values.write().insert(entity, value);
                    self.members.insert(proc.name.clone(), value);
                }
            }
        }
        proc.state |= ProcState::PUBLISHED;
        trace!(name = %proc.name, "published");
    }

    // -- Counters --

    pub(crate) fn alloc_proc_id(&self) -> ProcId {
        ProcId::from_raw(self.next_proc_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Next suffix for a nested procedure name.
    pub fn next_nested_guid(&self) -> u32 {
        self.nested_type_name_guid.fetch_add(1, Ordering::Relaxed)
    }

    // -- Collection --

    /// Create a record for every top-level procedure and declare its
    /// symbol. Foreign procedures become externals; all others are queued
    /// for [`Module::generate`]. Call once per module.
    pub fn collect_procedures(&mut self) -> Result<usize, GenerateError> {
        let info = self.info;
        let mut queued = 0;
        for (id, entity) in info.entities() {
            let EntityKind::Procedure(decl) = &entity.kind else {
                continue;
            };
            if decl.parent.is_some() {
                continue;
            }
            let name = procedure_name(info, id);
            let proc_id = self.alloc_proc_id();
            let mut proc = Procedure::from_entity(info, id, name.clone());
            let backend_err = |source| GenerateError::Backend {
                procedure: name.clone(),
                source,
            };

            if decl.is_foreign {
                let external = self.backend.declare_external(&name).map_err(backend_err)?;
                let value = Value::external(external, entity.ty);
                proc.symbol = Some(external.symbol());
                proc.value = Some(value);
                self.values.get_mut().insert(id, value);
                self.members.insert(name, value);
                self.arena.insert(proc_id, proc);
                continue;
            }

            let func = self
                .backend
                .declare_function(&name, proc.linkage())
                .map_err(backend_err)?;
            proc.set_function(func);
            if takes_context(proc_sig(&info.types, entity.ty), proc.is_runtime_hook()) {
                proc.flags |= ProcFlags::TAKES_CONTEXT;
            }
            let value = Value::function(func, entity.ty);
            self.values.get_mut().insert(id, value);
            self.members.insert(name, value);
            self.arena.insert(proc_id, proc);
            self.procedures_to_generate.push(proc_id);
            queued += 1;
        }
        debug!(queued, total = self.arena.len(), "collected procedures");
        Ok(queued)
    }
}

/// `pkg.name`, or `name` when the package is empty.
/// Releases an entity claimed in the in-flight set and wakes its waiters,
/// also when the creator unwinds.
struct InFlightClaim<'m> {
    in_flight: &'m Mutex<FxHashSet<EntityId>>,
    done: &'m Condvar,
    entity: EntityId,
}

impl Drop for InFlightClaim<'_> {
    fn drop(&mut self) {
        self.in_flight.lock().remove(&self.entity);
        self.done.notify_all();
    }
}

pub(crate) fn qualified_name(pkg: &str, name: &str) -> String {
    if pkg.is_empty() {
        name.to_owned()
    } else {
        format!("{pkg}{PKG_NAME_SEPARATOR}{name}")
    }
}

/// Symbol name of a top-level procedure.
///
/// Link names win; foreign and exported procedures keep their bare name;
/// everything else is package-qualified.
pub(crate) fn procedure_name(info: &CheckerInfo, entity: EntityId) -> String {
    let e = info.entity(entity);
    match e.as_procedure() {
        Some(decl) => match &decl.link_name {
            Some(link) => link.clone(),
            None if decl.is_foreign || decl.is_export => e.name.clone(),
            None => qualified_name(&e.pkg, &e.name),
        },
        None => qualified_name(&e.pkg, &e.name),
    }
}

/// `parent.name-N`, or `parent.$anon-N` for an unnamed literal.
pub(crate) fn nested_procedure_name(parent: &str, name: &str, guid: u32) -> String {
    let name = if name.is_empty() { "$anon" } else { name };
    format!("{parent}{PKG_NAME_SEPARATOR}{name}-{guid}")
}
