//! The checker's output bundle.

use crate::ast::Ast;
use crate::entity::{Entity, EntityId};
use crate::types::{CallingConvention, FieldDef, ProcSig, TypeId, TypePool};

/// Everything the code generator reads from the front-end.
///
/// Built single-threaded by the checker, then shared immutably by every
/// lowering worker.
pub struct CheckerInfo {
    pub types: TypePool,
    pub ast: Ast,
    entities: Vec<Entity>,
    context_type: TypeId,
    runtime_proc_type: TypeId,
    entry_proc_type: TypeId,
}

impl CheckerInfo {
    /// Create an empty program with the runtime `Context` record registered.
    pub fn new() -> Self {
        let mut types = TypePool::new();
        let allocator = types.struct_type(vec![
            FieldDef::new("procedure", TypeId::RAWPTR),
            FieldDef::new("data", TypeId::RAWPTR),
        ]);
        let allocator = types.named("Allocator", allocator);
        let context = types.struct_type(vec![
            FieldDef::new("allocator", allocator),
            FieldDef::new("temp_allocator", allocator),
            FieldDef::new("assertion_failure_proc", TypeId::RAWPTR),
            FieldDef::new("user_ptr", TypeId::RAWPTR),
            FieldDef::new("user_index", TypeId::INT),
        ]);
        let context_type = types.named("Context", context);
        let runtime_proc_type = types.proc_type(ProcSig {
            params: Vec::new(),
            results: Vec::new(),
            convention: CallingConvention::C,
        });
        let entry_proc_type = types.proc_type(ProcSig {
            params: Vec::new(),
            results: vec![TypeId::I32],
            convention: CallingConvention::C,
        });
        CheckerInfo {
            types,
            ast: Ast::new(),
            entities: Vec::new(),
            context_type,
            runtime_proc_type,
            entry_proc_type,
        }
    }

    /// Type of the implicit `context` value.
    #[inline]
    pub fn context_type(&self) -> TypeId {
        self.context_type
    }

    /// `proc "c" ()`: startup, cleanup and type-info routines.
    #[inline]
    pub fn runtime_proc_type(&self) -> TypeId {
        self.runtime_proc_type
    }

    /// `proc "c" () -> i32`: the process entry trampoline.
    #[inline]
    pub fn entry_proc_type(&self) -> TypeId {
        self.entry_proc_type
    }

    pub fn add_entity(&mut self, entity: Entity) -> EntityId {
        let id = EntityId::from_raw(u32::try_from(self.entities.len()).unwrap_or(u32::MAX));
        self.entities.push(entity);
        id
    }

    #[inline]
    pub fn entity(&self, id: EntityId) -> &Entity {
        &self.entities[id.index()]
    }

    /// Mutable access while the checker is still building the program.
    #[inline]
    pub fn entity_mut(&mut self, id: EntityId) -> &mut Entity {
        &mut self.entities[id.index()]
    }

    /// All entities in declaration order.
    pub fn entities(&self) -> impl Iterator<Item = (EntityId, &Entity)> {
        self.entities
            .iter()
            .enumerate()
            .map(|(i, e)| (EntityId::from_raw(u32::try_from(i).unwrap_or(u32::MAX)), e))
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }
}

impl Default for CheckerInfo {
    fn default() -> Self {
        Self::new()
    }
}
