//! Per-procedure codegen records.
//!
//! Procedures live in a [`ProcArena`] keyed by [`ProcId`]. Nested procedure
//! literals hang off their enclosing procedure through `parent`/`children`,
//! so the arena holds a forest. Ids come from a module-wide counter and grow
//! monotonically, which keeps arena iteration in creation order.

use std::collections::BTreeMap;

use bitflags::bitflags;
use cg_backend::{FunctionId, Inlining, Linkage, SymbolId};
use cg_ir::{BodyId, CheckerInfo, EntityId, ProcInlining, TypeId};

use crate::runtime::Routine;
use crate::value::Value;

/// Index of a [`Procedure`] in a [`ProcArena`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct ProcId(u32);

impl ProcId {
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        ProcId(raw)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

bitflags! {
    /// Codegen attributes fixed when the procedure is created.
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
    pub struct ProcFlags: u16 {
        /// Declared inside another procedure's body.
        const NESTED = 1 << 0;
        /// Takes the implicit context pointer as its last parameter.
        const TAKES_CONTEXT = 1 << 1;
        /// Synthesised by the module, not backed by an entity.
        const SYNTHETIC = 1 << 2;
    }
}

bitflags! {
    /// Progress through generation. Each step checks its bit so that
    /// repeating a step is a no-op.
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
    pub struct ProcState: u16 {
        const BEGUN = 1 << 0;
        const BODY_LOWERED = 1 << 1;
        const FINISHED = 1 << 2;
        const PUBLISHED = 1 << 3;
    }
}

/// Codegen record of one procedure.
#[derive(Clone, Debug)]
pub struct Procedure {
    pub flags: ProcFlags,
    pub state: ProcState,
    pub parent: Option<ProcId>,
    pub children: Vec<ProcId>,
    /// `None` for foreign procedures.
    pub func: Option<FunctionId>,
    pub symbol: Option<SymbolId>,
    /// `None` for synthesised routines.
    pub entity: Option<EntityId>,
    pub name: String,
    pub ty: TypeId,
    pub body: Option<BodyId>,
    pub tags: u64,
    pub is_foreign: bool,
    pub is_export: bool,
    pub is_entry_point: bool,
    pub is_startup: bool,
    pub is_cleanup: bool,
    pub inlining: ProcInlining,
    /// Value other code uses to reference this procedure.
    pub value: Option<Value>,
    /// Body generator of a synthesised routine.
    pub(crate) routine: Option<Routine>,
}

impl Procedure {
    /// Record for a procedure entity. Backend handles are attached by the
    /// caller once the symbol is declared.
    ///
    /// # Panics
    /// If `entity` is not a procedure.
    pub fn from_entity(info: &CheckerInfo, entity: EntityId, name: String) -> Self {
        let e = info.entity(entity);
        let decl = e
            .as_procedure()
            .unwrap_or_else(|| panic!("entity `{}` is not a procedure", e.name));
        let mut flags = ProcFlags::empty();
        if decl.parent.is_some() {
            flags |= ProcFlags::NESTED;
        }
        Procedure {
            flags,
            state: ProcState::empty(),
            parent: None,
            children: Vec::new(),
            func: None,
            symbol: None,
            entity: Some(entity),
            name,
            ty: e.ty,
            body: decl.body,
            tags: decl.tags,
            is_foreign: decl.is_foreign,
            is_export: decl.is_export,
            is_entry_point: decl.is_entry_point,
            is_startup: decl.is_startup,
            is_cleanup: decl.is_cleanup,
            inlining: decl.inlining,
            value: None,
            routine: None,
        }
    }

    /// Record for a module-synthesised routine with no source entity.
    pub fn synthetic(name: impl Into<String>, ty: TypeId, func: FunctionId) -> Self {
        Procedure {
            flags: ProcFlags::SYNTHETIC,
            state: ProcState::empty(),
            parent: None,
            children: Vec::new(),
            func: Some(func),
            symbol: Some(func.symbol()),
            entity: None,
            name: name.into(),
            ty,
            body: None,
            tags: 0,
            is_foreign: false,
            is_export: false,
            is_entry_point: false,
            is_startup: false,
            is_cleanup: false,
            inlining: ProcInlining::None,
            value: Some(Value::function(func, ty)),
            routine: None,
        }
    }

    /// Attach the declared backend function.
    pub fn set_function(&mut self, func: FunctionId) {
        self.func = Some(func);
        self.symbol = Some(func.symbol());
        self.value = Some(Value::function(func, self.ty));
    }

    /// Exported and entry-point procedures are visible to the linker.
    pub fn linkage(&self) -> Linkage {
        if self.is_export || self.is_entry_point {
            Linkage::Public
        } else {
            Linkage::Private
        }
    }

    pub fn backend_inlining(&self) -> Inlining {
        match self.inlining {
            ProcInlining::None => Inlining::Default,
            ProcInlining::Inline => Inlining::Always,
            ProcInlining::NoInline => Inlining::Never,
        }
    }

    /// Startup, cleanup and entry procedures are called by generated code
    /// that has no caller context to pass on.
    pub fn is_runtime_hook(&self) -> bool {
        self.is_startup || self.is_cleanup || self.is_entry_point
    }
}

// ---------------------------------------------------------------------------
// ProcArena
// ---------------------------------------------------------------------------

/// Owning store of procedures, iterated in creation order.
#[derive(Clone, Debug, Default)]
pub struct ProcArena {
    procs: BTreeMap<ProcId, Procedure>,
}

impl ProcArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: ProcId, proc: Procedure) {
        let previous = self.procs.insert(id, proc);
        assert!(previous.is_none(), "procedure {id:?} inserted twice");
    }

    #[inline]
    pub fn get(&self, id: ProcId) -> Option<&Procedure> {
        self.procs.get(&id)
    }

    /// # Panics
    /// If `id` is not in this arena.
    pub fn proc(&self, id: ProcId) -> &Procedure {
        self.procs
            .get(&id)
            .unwrap_or_else(|| panic!("procedure {id:?} is not in this arena"))
    }

    /// # Panics
    /// If `id` is not in this arena.
    pub fn proc_mut(&mut self, id: ProcId) -> &mut Procedure {
        self.procs
            .get_mut(&id)
            .unwrap_or_else(|| panic!("procedure {id:?} is not in this arena"))
    }

    /// Insert `child` and link it under `parent`.
    ///
    /// # Panics
    /// If `parent` is missing or `child_id` is already present.
    pub fn add_child(&mut self, parent: ProcId, child_id: ProcId, mut child: Procedure) {
        child.parent = Some(parent);
        child.flags |= ProcFlags::NESTED;
        self.insert(child_id, child);
        let parent = self.proc_mut(parent);
        if !parent.children.contains(&child_id) {
            parent.children.push(child_id);
        }
    }

    /// `root` and its descendants, parents before children, siblings in
    /// creation order.
    pub fn subtree(&self, root: ProcId) -> Vec<ProcId> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if let Some(proc) = self.procs.get(&id) {
                out.push(id);
                stack.extend(proc.children.iter().rev().copied());
            }
        }
        out
    }

    /// Move `root` and its descendants into a new arena.
    pub fn take_subtree(&mut self, root: ProcId) -> ProcArena {
        let mut taken = ProcArena::new();
        for id in self.subtree(root) {
            if let Some(proc) = self.procs.remove(&id) {
                taken.procs.insert(id, proc);
            }
        }
        taken
    }

    /// Merge every procedure of `other` back in.
    pub fn absorb(&mut self, other: ProcArena) {
        for (id, proc) in other.procs {
            self.insert(id, proc);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (ProcId, &Procedure)> {
        self.procs.iter().map(|(id, p)| (*id, p))
    }

    pub fn len(&self) -> usize {
        self.procs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.procs.is_empty()
    }
}
