//! Hand-built checked programs.

use cg_backend::{Inst, RecordedFunction, RecordingBackend, SymbolId};
use cg_ir::{
    BodyId, CallingConvention, CheckerInfo, Entity, EntityId, EntityKind, ExprId, ExprKind,
    ProcDecl, ProcSig, Span, StmtId, StmtKind, TypeId, VariableDecl,
};
use cg_lower::{GenerateReport, LowerConfig, Module};

pub const PKG: &str = "app";

/// A program under construction.
pub struct Program {
    pub info: CheckerInfo,
}

impl Program {
    pub fn new() -> Self {
        Program {
            info: CheckerInfo::new(),
        }
    }

    pub fn proc_type(
        &mut self,
        params: &[TypeId],
        results: &[TypeId],
        convention: CallingConvention,
    ) -> TypeId {
        self.info.types.proc_type(ProcSig {
            params: params.to_vec(),
            results: results.to_vec(),
            convention,
        })
    }

    fn entity(&mut self, name: &str, ty: TypeId, kind: EntityKind) -> EntityId {
        self.info.add_entity(Entity {
            name: name.to_owned(),
            pkg: PKG.to_owned(),
            ty,
            span: Span::DUMMY,
            kind,
        })
    }

    pub fn global(&mut self, name: &str, ty: TypeId, init: Option<ExprId>) -> EntityId {
        self.entity(
            name,
            ty,
            EntityKind::Variable(VariableDecl {
                global: true,
                init,
                link_name: None,
            }),
        )
    }

    /// A local variable or parameter.
    pub fn local(&mut self, name: &str, ty: TypeId) -> EntityId {
        self.entity(name, ty, EntityKind::Variable(VariableDecl::default()))
    }

    pub fn expr(&mut self, kind: ExprKind, ty: TypeId) -> ExprId {
        self.info.ast.alloc_expr(kind, ty, Span::DUMMY)
    }

    pub fn int(&mut self, v: i64) -> ExprId {
        self.expr(ExprKind::IntLit(v), TypeId::INT)
    }

    pub fn ident(&mut self, entity: EntityId) -> ExprId {
        let ty = self.info.entity(entity).ty;
        self.expr(ExprKind::Ident(entity), ty)
    }

    pub fn stmt(&mut self, kind: StmtKind) -> StmtId {
        self.info.ast.alloc_stmt(kind, Span::DUMMY)
    }

    pub fn stmt_at(&mut self, kind: StmtKind, span: Span) -> StmtId {
        self.info.ast.alloc_stmt(kind, span)
    }

    pub fn body(&mut self, stmts: Vec<StmtId>) -> BodyId {
        self.info.ast.alloc_body(stmts, Span::DUMMY)
    }

    /// Procedure with a body; `decl` supplies the attributes.
    pub fn procedure(
        &mut self,
        name: &str,
        ty: TypeId,
        stmts: Vec<StmtId>,
        decl: ProcDecl,
    ) -> EntityId {
        let body = self.body(stmts);
        self.entity(
            name,
            ty,
            EntityKind::Procedure(ProcDecl {
                body: Some(body),
                ..decl
            }),
        )
    }

    /// `proc()` with the given statements.
    pub fn simple_proc(&mut self, name: &str, stmts: Vec<StmtId>) -> EntityId {
        let ty = self.proc_type(&[], &[], CallingConvention::Odin);
        self.procedure(name, ty, stmts, ProcDecl::default())
    }

    /// Declare a procedure body later, once nested statements reference it.
    pub fn reserve_proc(&mut self, name: &str, ty: TypeId, decl: ProcDecl) -> EntityId {
        self.entity(name, ty, EntityKind::Procedure(decl))
    }

    pub fn set_body(&mut self, entity: EntityId, stmts: Vec<StmtId>) {
        let body = self.body(stmts);
        if let EntityKind::Procedure(decl) = &mut self.info.entity_mut(entity).kind {
            decl.body = Some(body);
        }
    }

    /// Foreign declarations of the runtime map procedures.
    pub fn map_runtime(&mut self) {
        let ty = self.proc_type(
            &[TypeId::RAWPTR, TypeId::RAWPTR, TypeId::RAWPTR],
            &[TypeId::RAWPTR],
            CallingConvention::C,
        );
        self.foreign(cg_lower::MAP_GET_PROC_NAME, ty);
        let ty = self.proc_type(
            &[TypeId::RAWPTR, TypeId::RAWPTR, TypeId::RAWPTR, TypeId::RAWPTR],
            &[TypeId::RAWPTR],
            CallingConvention::C,
        );
        self.foreign(cg_lower::MAP_SET_PROC_NAME, ty);
    }

    pub fn foreign(&mut self, name: &str, ty: TypeId) -> EntityId {
        self.entity(
            name,
            ty,
            EntityKind::Procedure(ProcDecl {
                is_foreign: true,
                ..ProcDecl::default()
            }),
        )
    }
}

/// Collect and generate, without finalising.
pub fn generate<'a>(
    info: &'a CheckerInfo,
    config: LowerConfig,
) -> (Module<'a, RecordingBackend>, GenerateReport) {
    let mut module = Module::new(RecordingBackend::new(), info, config).unwrap();
    module.collect_procedures().unwrap();
    let report = module.generate().unwrap();
    (module, report)
}

pub fn single_threaded() -> LowerConfig {
    LowerConfig::single_threaded()
}

pub fn qualified(name: &str) -> String {
    format!("{PKG}.{name}")
}

/// Recorded body of `name`, which must have been finished.
pub fn body(backend: &RecordingBackend, name: &str) -> RecordedFunction {
    backend
        .function(name)
        .unwrap_or_else(|| panic!("no finished body for `{name}`"))
}

pub fn symbol(backend: &RecordingBackend, name: &str) -> SymbolId {
    backend
        .symbol(name)
        .unwrap_or_else(|| panic!("no symbol `{name}`"))
}

/// Names of the procedures `body` calls, in order.
pub fn callees(backend: &RecordingBackend, body: &RecordedFunction) -> Vec<String> {
    body.call_targets()
        .into_iter()
        .map(|s| backend.symbol_name(s).unwrap_or_default())
        .collect()
}

pub fn count(body: &RecordedFunction, pred: impl Fn(&Inst) -> bool) -> usize {
    body.insts.iter().filter(|i| pred(i)).count()
}
