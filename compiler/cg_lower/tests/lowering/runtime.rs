//! Startup, cleanup and entry routines.

use cg_backend::{DataType, Inst, Linkage, SymbolKind};
use cg_ir::{CallingConvention, ExprKind, ProcDecl, StmtKind, TypeId};
use cg_lower::{
    LowerConfig, LowerError, CLEANUP_RUNTIME_PROC_NAME, ENTRY_POINT_NAME,
    STARTUP_RUNTIME_PROC_NAME, STARTUP_TYPE_INFO_PROC_NAME, TYPE_INFO_DATA_NAME,
    TYPE_INFO_RECORD_SIZE,
};
use pretty_assertions::assert_eq;

use crate::util::{body, callees, generate, qualified, single_threaded, Program};

/// Two init hooks, two fini hooks, an entry point and an initialised global.
fn hooked_program() -> Program {
    let mut p = Program::new();
    let seven = p.int(7);
    p.global("counter", TypeId::INT, Some(seven));
    p.global("scratch", TypeId::INT, None);
    let hook_ty = p.proc_type(&[], &[], CallingConvention::Odin);
    let startup = ProcDecl {
        is_startup: true,
        ..ProcDecl::default()
    };
    let cleanup = ProcDecl {
        is_cleanup: true,
        ..ProcDecl::default()
    };
    p.procedure("setup1", hook_ty, Vec::new(), startup.clone());
    p.procedure("teardown1", hook_ty, Vec::new(), cleanup.clone());
    p.procedure("setup2", hook_ty, Vec::new(), startup);
    p.procedure("teardown2", hook_ty, Vec::new(), cleanup);
    p.procedure(
        "main",
        hook_ty,
        Vec::new(),
        ProcDecl {
            is_entry_point: true,
            ..ProcDecl::default()
        },
    );
    p
}

#[test]
fn startup_fills_type_info_then_globals_then_init_hooks() {
    let p = hooked_program();
    let (mut module, report) = generate(&p.info, single_threaded());
    assert!(report.is_ok(), "{report:?}");
    let report = module.finalize().unwrap();
    assert!(report.is_ok(), "{report:?}");

    let backend = module.into_backend();
    let startup = body(&backend, STARTUP_RUNTIME_PROC_NAME);
    assert_eq!(
        callees(&backend, &startup),
        vec![
            STARTUP_TYPE_INFO_PROC_NAME.to_owned(),
            qualified("setup1"),
            qualified("setup2"),
        ]
    );
    // Only `counter` has an initialiser.
    assert_eq!(startup.store_count(), 1);
    assert!(startup.insts.contains(&Inst::ConstInt {
        dt: DataType::I64,
        value: 7
    }));
    // Hooks are called without a context.
    assert!(startup.prototype.params.is_empty());
    assert!(body(&backend, &qualified("setup1")).prototype.params.is_empty());
}

#[test]
fn cleanup_runs_fini_hooks_in_reverse() {
    let p = hooked_program();
    let (mut module, _) = generate(&p.info, single_threaded());
    module.finalize().unwrap();

    let backend = module.into_backend();
    let cleanup = body(&backend, CLEANUP_RUNTIME_PROC_NAME);
    assert_eq!(
        callees(&backend, &cleanup),
        vec![qualified("teardown2"), qualified("teardown1")]
    );
}

#[test]
fn entry_point_wraps_user_main() {
    let p = hooked_program();
    let (mut module, _) = generate(&p.info, single_threaded());
    let report = module.finalize().unwrap();
    assert!(report.generated.contains(&ENTRY_POINT_NAME.to_owned()));

    let backend = module.into_backend();
    let main = body(&backend, ENTRY_POINT_NAME);
    assert_eq!(
        callees(&backend, &main),
        vec![
            STARTUP_RUNTIME_PROC_NAME.to_owned(),
            qualified("main"),
            CLEANUP_RUNTIME_PROC_NAME.to_owned(),
        ]
    );
    assert_eq!(main.prototype.returns, vec![DataType::I32]);
    let Some(Inst::Return(values)) = main.insts.last() else {
        panic!("entry point does not return");
    };
    assert_eq!(
        main.inst(values[0]),
        &Inst::ConstInt {
            dt: DataType::I32,
            value: 0
        }
    );
    assert!(matches!(
        backend.record(ENTRY_POINT_NAME).unwrap().kind,
        SymbolKind::Function {
            linkage: Linkage::Public,
            ..
        }
    ));
}

#[test]
fn finalize_twice_emits_nothing_new() {
    let p = hooked_program();
    let (mut module, _) = generate(&p.info, single_threaded());
    let first = module.finalize().unwrap();
    let symbols = module.backend().symbol_count();
    let second = module.finalize().unwrap();

    assert_eq!(first.generated.len(), 4);
    assert!(second.generated.is_empty());
    assert_eq!(module.backend().symbol_count(), symbols);
}

#[test]
fn entry_point_can_be_disabled() {
    let p = hooked_program();
    let (mut module, _) = generate(&p.info, single_threaded().with_entry_point(false));
    module.finalize().unwrap();

    let backend = module.into_backend();
    assert!(backend.record(ENTRY_POINT_NAME).is_none());
    assert!(backend.function(STARTUP_RUNTIME_PROC_NAME).is_some());
}

#[test]
fn without_type_info_no_tables_are_emitted() {
    let p = hooked_program();
    let (mut module, _) = generate(&p.info, single_threaded().with_type_info(false));
    module.finalize().unwrap();

    let backend = module.into_backend();
    assert!(backend.record(STARTUP_TYPE_INFO_PROC_NAME).is_none());
    assert!(backend.record(TYPE_INFO_DATA_NAME).is_none());
    let startup = body(&backend, STARTUP_RUNTIME_PROC_NAME);
    assert_eq!(
        callees(&backend, &startup),
        vec![qualified("setup1"), qualified("setup2")]
    );
}

#[test]
fn type_info_records_get_storage_at_finalize() {
    let mut p = Program::new();
    let info_ty = TypeId::RAWPTR;
    let of_int = p.expr(ExprKind::TypeInfoOf(TypeId::INT), info_ty);
    let ret = p.stmt(StmtKind::Return(Some(of_int)));
    let ty = p.proc_type(&[], &[info_ty], CallingConvention::Odin);
    p.procedure("reflect", ty, vec![ret], ProcDecl::default());

    let (mut module, report) = generate(&p.info, single_threaded());
    assert!(report.is_ok(), "{report:?}");
    assert_eq!(module.type_info().len(), 1);
    module.finalize().unwrap();

    let backend = module.into_backend();
    assert_eq!(
        backend.record(TYPE_INFO_DATA_NAME).unwrap().kind,
        SymbolKind::Global {
            linkage: Linkage::Private,
            storage: Some((TYPE_INFO_RECORD_SIZE, 8))
        }
    );
    let fill = body(&backend, STARTUP_TYPE_INFO_PROC_NAME);
    assert!(fill.is_terminated());
    assert!(fill.store_count() > 0);
}

#[test]
fn type_info_of_without_tables_is_rejected() {
    let mut p = Program::new();
    let of_int = p.expr(ExprKind::TypeInfoOf(TypeId::INT), TypeId::RAWPTR);
    let ret = p.stmt(StmtKind::Return(Some(of_int)));
    let ty = p.proc_type(&[], &[TypeId::RAWPTR], CallingConvention::Odin);
    p.procedure("reflect", ty, vec![ret], ProcDecl::default());

    let (_, report) = generate(&p.info, LowerConfig::single_threaded().with_type_info(false));
    assert!(matches!(
        &report.failures[0].errors[..],
        [LowerError::Unsupported { .. }]
    ));
}

#[test]
fn init_hook_with_parameters_fails_the_startup_routine() {
    let mut p = Program::new();
    let x = p.local("x", TypeId::INT);
    let ty = p.proc_type(&[TypeId::INT], &[], CallingConvention::Odin);
    p.procedure(
        "setup",
        ty,
        Vec::new(),
        ProcDecl {
            params: vec![x],
            is_startup: true,
            ..ProcDecl::default()
        },
    );

    let (mut module, report) = generate(&p.info, single_threaded());
    assert!(report.is_ok(), "{report:?}");
    let report = module.finalize().unwrap();
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].procedure, STARTUP_RUNTIME_PROC_NAME);
    assert!(module.procedure(STARTUP_RUNTIME_PROC_NAME).is_none());
    assert!(module.procedure(CLEANUP_RUNTIME_PROC_NAME).is_some());
}
