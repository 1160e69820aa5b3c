//! Load/store protocols, observed through the recorded IR.

use cg_backend::{CastOp, DataType, Inst, NodeId, RecordedFunction};
use cg_ir::{
    CallingConvention, ExprId, ExprKind, FieldDef, ProcDecl, Selection, SoaLayout, Span, StmtId,
    StmtKind, TypeId,
};
use cg_lower::{LowerError, MAP_GET_PROC_NAME, MAP_SET_PROC_NAME};
use pretty_assertions::assert_eq;
use smallvec::smallvec;

use crate::util::{body, callees, count, generate, qualified, single_threaded, Program};

/// Storage a computed address is rooted in, following member and array
/// steps back to their base.
fn root(f: &RecordedFunction, mut node: NodeId) -> NodeId {
    loop {
        match f.inst(node) {
            Inst::MemberAccess { base, .. } | Inst::ArrayAccess { base, .. } => node = *base,
            _ => return node,
        }
    }
}

/// Address and value of every store of type `dt`, in emission order.
fn stores(f: &RecordedFunction, dt: DataType) -> Vec<(NodeId, NodeId)> {
    f.insts
        .iter()
        .filter_map(|i| match i {
            Inst::Store {
                dt: stored,
                addr,
                value,
                ..
            } if *stored == dt => Some((*addr, *value)),
            _ => None,
        })
        .collect()
}

fn member_offsets(f: &RecordedFunction) -> Vec<i64> {
    f.insts
        .iter()
        .filter_map(|i| match i {
            Inst::MemberAccess { offset, .. } => Some(*offset),
            _ => None,
        })
        .collect()
}

fn array_strides(f: &RecordedFunction) -> Vec<i64> {
    f.insts
        .iter()
        .filter_map(|i| match i {
            Inst::ArrayAccess { stride, .. } => Some(*stride),
            _ => None,
        })
        .collect()
}

/// `{a: int, b: f32}` and `#soa[4]` of it.
fn soa_types(p: &mut Program) -> (TypeId, TypeId) {
    let elem = p.info.types.struct_type(vec![
        FieldDef::new("a", TypeId::INT),
        FieldDef::new("b", TypeId::F32),
    ]);
    (elem, p.info.types.soa_of(elem, SoaLayout::Fixed(4)))
}

/// `m: map[int]int` and `read :: proc() -> int`, whose body `stmts` builds
/// around the expression `m[3]`.
fn map_program(
    with_runtime: bool,
    stmts: impl FnOnce(&mut Program, ExprId) -> Vec<StmtId>,
) -> Program {
    let mut p = Program::new();
    if with_runtime {
        p.map_runtime();
    }
    let map_ty = p.info.types.map_of(TypeId::INT, TypeId::INT);
    let m = p.global("m", map_ty, None);
    let key = p.int(3);
    let base = p.ident(m);
    let index = p.expr(ExprKind::Index { base, index: key }, TypeId::INT);
    let stmts = stmts(&mut p, index);
    let ty = p.proc_type(&[], &[TypeId::INT], CallingConvention::Odin);
    p.procedure("read", ty, stmts, ProcDecl::default());
    p
}

#[test]
fn map_index_load_calls_the_runtime_lookup() {
    let p = map_program(true, |p, index| vec![p.stmt(StmtKind::Return(Some(index)))]);
    let (module, report) = generate(&p.info, single_threaded());
    assert!(report.is_ok(), "{report:?}");

    let backend = module.into_backend();
    let f = body(&backend, &qualified("read"));
    assert_eq!(callees(&backend, &f), vec![MAP_GET_PROC_NAME.to_owned()]);
    let args = f
        .insts
        .iter()
        .find_map(|i| match i {
            Inst::Call { args, .. } => Some(args.len()),
            _ => None,
        })
        .unwrap();
    assert_eq!(args, 3);
    // A missing key reads from a zeroed slot.
    assert_eq!(count(&f, |i| matches!(i, Inst::Memzero { .. })), 1);
    assert_eq!(
        count(&f, |i| matches!(i, Inst::Select { dt: DataType::Ptr, .. })),
        1
    );
}

#[test]
fn map_index_store_calls_the_runtime_insert() {
    let p = map_program(true, |p, index| {
        let value = p.int(9);
        let zero = p.int(0);
        vec![
            p.stmt(StmtKind::Assign { lhs: index, rhs: value }),
            p.stmt(StmtKind::Return(Some(zero))),
        ]
    });
    let (module, report) = generate(&p.info, single_threaded());
    assert!(report.is_ok(), "{report:?}");

    let backend = module.into_backend();
    let f = body(&backend, &qualified("read"));
    assert_eq!(callees(&backend, &f), vec![MAP_SET_PROC_NAME.to_owned()]);
}

#[test]
fn map_access_without_runtime_abandons_the_procedure() {
    let p = map_program(false, |p, index| vec![p.stmt(StmtKind::Return(Some(index)))]);
    let (module, report) = generate(&p.info, single_threaded());

    assert_eq!(report.failures.len(), 1);
    let failure = &report.failures[0];
    assert_eq!(failure.procedure, qualified("read"));
    assert!(!failure.completed);
    assert!(matches!(
        &failure.errors[..],
        [LowerError::UnresolvedSymbol { name, .. }] if name == MAP_GET_PROC_NAME
    ));
    assert!(module.procedure(&qualified("read")).is_none());
    assert!(module.into_backend().function(&qualified("read")).is_none());
}

#[test]
fn map_info_is_null_without_type_info() {
    let p = map_program(true, |p, index| vec![p.stmt(StmtKind::Return(Some(index)))]);
    let (module, report) = generate(&p.info, single_threaded().with_type_info(false));
    assert!(report.is_ok(), "{report:?}");

    let backend = module.into_backend();
    let f = body(&backend, &qualified("read"));
    let info_arg = f
        .insts
        .iter()
        .find_map(|i| match i {
            Inst::Call { args, .. } => Some(args[1]),
            _ => None,
        })
        .unwrap();
    assert_eq!(f.inst(info_arg), &Inst::ConstNull);
}

#[test]
fn duplicate_swizzle_store_is_reported_and_skipped() {
    let mut p = Program::new();
    let vec4 = p.info.types.array_of(TypeId::F32, 4);
    let vec2 = p.info.types.array_of(TypeId::F32, 2);
    let v = p.local("v", vec4);
    let w = p.local("w", vec2);
    let declare_v = p.stmt(StmtKind::Local { entity: v, init: None });
    let declare_w = p.stmt(StmtKind::Local { entity: w, init: None });
    let base = p.ident(v);
    let lhs = p.expr(
        ExprKind::Swizzle {
            base,
            indices: smallvec![0, 0],
        },
        vec2,
    );
    let rhs = p.ident(w);
    let span = Span::new(40, 52);
    let assign = p.stmt_at(StmtKind::Assign { lhs, rhs }, span);
    p.simple_proc("f", vec![declare_v, declare_w, assign]);

    let (module, report) = generate(&p.info, single_threaded());
    assert_eq!(report.failures.len(), 1);
    let failure = &report.failures[0];
    assert!(failure.completed);
    assert_eq!(
        failure.errors,
        vec![LowerError::DuplicateSwizzleComponent { component: 0, span }]
    );
    // Still published, with nothing stored for the rejected statement.
    assert!(module.procedure(&qualified("f")).is_some());
    let f = body(&module.into_backend(), &qualified("f"));
    assert_eq!(f.store_count(), 0);
    assert_eq!(count(&f, |i| matches!(i, Inst::Memcpy { .. })), 0);
    assert!(f.is_terminated());
}

#[test]
fn swizzle_load_gathers_components() {
    let mut p = Program::new();
    let vec4 = p.info.types.array_of(TypeId::F32, 4);
    let vec3 = p.info.types.array_of(TypeId::F32, 3);
    let v = p.local("v", vec4);
    let out = p.local("out", vec3);
    let declare_v = p.stmt(StmtKind::Local { entity: v, init: None });
    let base = p.ident(v);
    let zyx = p.expr(
        ExprKind::Swizzle {
            base,
            indices: smallvec![2, 1, 0],
        },
        vec3,
    );
    let declare_out = p.stmt(StmtKind::Local {
        entity: out,
        init: Some(zyx),
    });
    p.simple_proc("f", vec![declare_v, declare_out]);

    let (module, report) = generate(&p.info, single_threaded());
    assert!(report.is_ok(), "{report:?}");
    let f = body(&module.into_backend(), &qualified("f"));
    // Source component then destination lane, per component.
    assert_eq!(member_offsets(&f), vec![8, 0, 4, 4, 0, 8]);
}

#[test]
fn relative_pointer_round_trips_through_offsets() {
    let mut p = Program::new();
    let int_ptr = p.info.types.pointer_to(TypeId::INT);
    let rel = p.info.types.relative_pointer(int_ptr, TypeId::I16);
    let x = p.local("x", TypeId::INT);
    let r = p.local("r", rel);
    let declare_x = p.stmt(StmtKind::Local { entity: x, init: None });
    let declare_r = p.stmt(StmtKind::Local { entity: r, init: None });
    let target = p.ident(x);
    let addr_of_x = p.expr(ExprKind::AddrOf(target), int_ptr);
    let lhs = p.ident(r);
    let assign = p.stmt(StmtKind::Assign { lhs, rhs: addr_of_x });
    let inner = p.ident(r);
    let deref = p.expr(ExprKind::Deref(inner), TypeId::INT);
    let ret = p.stmt(StmtKind::Return(Some(deref)));
    let ty = p.proc_type(&[], &[TypeId::INT], CallingConvention::Odin);
    p.procedure(
        "f",
        ty,
        vec![declare_x, declare_r, assign, ret],
        ProcDecl::default(),
    );

    let (module, report) = generate(&p.info, single_threaded());
    assert!(report.is_ok(), "{report:?}");
    let f = body(&module.into_backend(), &qualified("f"));

    // Encode: the 64-bit difference is truncated into the i16 slot.
    assert_eq!(
        count(&f, |i| matches!(
            i,
            Inst::Convert { op: CastOp::Truncate, to: DataType::I16, .. }
        )),
        1
    );
    assert_eq!(
        count(&f, |i| matches!(i, Inst::Store { dt: DataType::I16, .. })),
        1
    );
    // Decode: the offset is sign-extended and a zero offset reads as nil.
    assert_eq!(
        count(&f, |i| matches!(
            i,
            Inst::Convert { op: CastOp::SignExtend, to: DataType::I64, .. }
        )),
        1
    );
    assert_eq!(
        count(&f, |i| matches!(i, Inst::Select { dt: DataType::Ptr, .. })),
        1
    );
    assert_eq!(
        count(&f, |i| matches!(i, Inst::Load { dt: DataType::I16, .. })),
        1
    );
}

#[test]
fn soa_element_load_reads_each_field_column() {
    let mut p = Program::new();
    let (elem, soa) = soa_types(&mut p);
    let s = p.local("s", soa);
    let e = p.local("e", elem);
    let declare_s = p.stmt(StmtKind::Local { entity: s, init: None });
    let base = p.ident(s);
    let one = p.int(1);
    let index = p.expr(ExprKind::Index { base, index: one }, elem);
    let declare_e = p.stmt(StmtKind::Local {
        entity: e,
        init: Some(index),
    });
    p.simple_proc("f", vec![declare_s, declare_e]);

    let (module, report) = generate(&p.info, single_threaded());
    assert!(report.is_ok(), "{report:?}");
    let f = body(&module.into_backend(), &qualified("f"));

    assert_eq!(array_strides(&f), vec![8, 4]);
    // The `b` column starts after four `a` entries.
    assert!(f
        .insts
        .iter()
        .any(|i| matches!(i, Inst::MemberAccess { offset: 32, .. })));
}

#[test]
fn soa_element_store_writes_each_field_column() {
    let mut p = Program::new();
    let (elem, soa) = soa_types(&mut p);
    let s = p.local("s", soa);
    let e = p.local("e", elem);
    let declare_s = p.stmt(StmtKind::Local { entity: s, init: None });
    let declare_e = p.stmt(StmtKind::Local { entity: e, init: None });
    let base = p.ident(s);
    let two = p.int(2);
    let lhs = p.expr(ExprKind::Index { base, index: two }, elem);
    let rhs = p.ident(e);
    let assign = p.stmt(StmtKind::Assign { lhs, rhs });
    p.simple_proc("f", vec![declare_s, declare_e, assign]);

    let (module, report) = generate(&p.info, single_threaded());
    assert!(report.is_ok(), "{report:?}");
    let f = body(&module.into_backend(), &qualified("f"));

    assert_eq!(array_strides(&f), vec![8, 4]);
    let [(a_at, _)] = stores(&f, DataType::I64)[..] else {
        panic!("expected one store to the `a` column");
    };
    let [(b_at, _)] = stores(&f, DataType::Float(32))[..] else {
        panic!("expected one store to the `b` column");
    };
    // Both columns live inside `s`, the `b` column after four `a` entries.
    let slot = root(&f, a_at);
    assert_eq!(f.inst(slot), &Inst::Local { size: 48, align: 8 });
    assert_eq!(root(&f, b_at), slot);
    let Inst::ArrayAccess { base: column, .. } = f.inst(b_at) else {
        panic!("expected a strided store");
    };
    assert_eq!(f.inst(*column), &Inst::MemberAccess { base: slot, offset: 32 });
}

#[test]
fn soa_field_store_lands_in_the_soa_storage() {
    let mut p = Program::new();
    let (elem, soa) = soa_types(&mut p);
    let s = p.local("s", soa);
    let declare_s = p.stmt(StmtKind::Local { entity: s, init: None });
    let base = p.ident(s);
    let one = p.int(1);
    let element = p.expr(ExprKind::Index { base, index: one }, elem);
    let lhs = p.expr(
        ExprKind::Field {
            base: element,
            selection: Selection::new(&[0]),
        },
        TypeId::INT,
    );
    let seven = p.int(7);
    let assign = p.stmt(StmtKind::Assign { lhs, rhs: seven });
    p.simple_proc("f", vec![declare_s, assign]);

    let (module, report) = generate(&p.info, single_threaded());
    assert!(report.is_ok(), "{report:?}");
    let f = body(&module.into_backend(), &qualified("f"));

    let [(at, value)] = stores(&f, DataType::I64)[..] else {
        panic!("expected a single field store");
    };
    assert_eq!(f.inst(value), &Inst::ConstInt { dt: DataType::I64, value: 7 });
    assert!(matches!(f.inst(at), Inst::ArrayAccess { stride: 8, .. }));
    // No copy of the element: the only stack slot is `s` itself.
    let slot = root(&f, at);
    assert_eq!(f.inst(slot), &Inst::Local { size: 48, align: 8 });
    assert_eq!(count(&f, |i| matches!(i, Inst::Local { .. })), 1);
}

#[test]
fn field_store_through_a_map_element_is_not_addressable() {
    let mut p = Program::new();
    p.map_runtime();
    let pair = p.info.types.struct_type(vec![
        FieldDef::new("x", TypeId::INT),
        FieldDef::new("y", TypeId::INT),
    ]);
    let map_ty = p.info.types.map_of(TypeId::INT, pair);
    let m = p.global("m", map_ty, None);
    let base = p.ident(m);
    let key = p.int(3);
    let element = p.expr(ExprKind::Index { base, index: key }, pair);
    let lhs = p.expr(
        ExprKind::Field {
            base: element,
            selection: Selection::new(&[1]),
        },
        TypeId::INT,
    );
    let value = p.int(4);
    let assign = p.stmt(StmtKind::Assign { lhs, rhs: value });
    p.simple_proc("f", vec![assign]);

    let (module, report) = generate(&p.info, single_threaded());
    assert_eq!(report.failures.len(), 1);
    let failure = &report.failures[0];
    assert!(!failure.completed);
    assert!(matches!(
        &failure.errors[..],
        [LowerError::NotAddressable { .. }]
    ));
    assert!(module.procedure(&qualified("f")).is_none());
}

#[test]
fn rejected_swizzle_store_leaves_its_base_untouched() {
    let mut p = Program::new();
    p.map_runtime();
    let vec4 = p.info.types.array_of(TypeId::F32, 4);
    let vec2 = p.info.types.array_of(TypeId::F32, 2);
    let map_ty = p.info.types.map_of(TypeId::INT, vec4);
    let m = p.global("m", map_ty, None);
    let w = p.local("w", vec2);
    let declare_w = p.stmt(StmtKind::Local { entity: w, init: None });
    let base = p.ident(m);
    let key = p.int(1);
    let element = p.expr(ExprKind::Index { base, index: key }, vec4);
    let lhs = p.expr(
        ExprKind::Swizzle {
            base: element,
            indices: smallvec![1, 1],
        },
        vec2,
    );
    let rhs = p.ident(w);
    let assign = p.stmt(StmtKind::Assign { lhs, rhs });
    p.simple_proc("f", vec![declare_w, assign]);

    let (module, report) = generate(&p.info, single_threaded());
    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].completed);
    assert!(matches!(
        &report.failures[0].errors[..],
        [LowerError::DuplicateSwizzleComponent { component: 1, .. }]
    ));
    let f = body(&module.into_backend(), &qualified("f"));
    // Neither the map lookup nor the global's address is emitted.
    assert!(f.call_targets().is_empty());
    assert_eq!(count(&f, |i| matches!(i, Inst::SymbolAddress(_))), 0);
}

#[test]
fn large_swizzle_load_gathers_components() {
    let mut p = Program::new();
    let vec8 = p.info.types.array_of(TypeId::F32, 8);
    let vec5 = p.info.types.array_of(TypeId::F32, 5);
    let v = p.local("v", vec8);
    let out = p.local("out", vec5);
    let declare_v = p.stmt(StmtKind::Local { entity: v, init: None });
    let base = p.ident(v);
    let swizzle = p.expr(
        ExprKind::Swizzle {
            base,
            indices: smallvec![7, 6, 5, 4, 3],
        },
        vec5,
    );
    let declare_out = p.stmt(StmtKind::Local {
        entity: out,
        init: Some(swizzle),
    });
    p.simple_proc("f", vec![declare_v, declare_out]);

    let (module, report) = generate(&p.info, single_threaded());
    assert!(report.is_ok(), "{report:?}");
    let f = body(&module.into_backend(), &qualified("f"));

    assert_eq!(
        member_offsets(&f),
        vec![28, 0, 24, 4, 20, 8, 16, 12, 12, 16]
    );
    assert_eq!(
        count(&f, |i| matches!(i, Inst::Load { dt: DataType::Float(32), .. })),
        5
    );
}

#[test]
fn large_swizzle_store_scatters_components() {
    let mut p = Program::new();
    let vec8 = p.info.types.array_of(TypeId::F32, 8);
    let vec5 = p.info.types.array_of(TypeId::F32, 5);
    let v = p.local("v", vec8);
    let w = p.local("w", vec5);
    let declare_v = p.stmt(StmtKind::Local { entity: v, init: None });
    let declare_w = p.stmt(StmtKind::Local { entity: w, init: None });
    let base = p.ident(v);
    let lhs = p.expr(
        ExprKind::Swizzle {
            base,
            indices: smallvec![0, 2, 4, 6, 1],
        },
        vec5,
    );
    let rhs = p.ident(w);
    let assign = p.stmt(StmtKind::Assign { lhs, rhs });
    p.simple_proc("f", vec![declare_v, declare_w, assign]);

    let (module, report) = generate(&p.info, single_threaded());
    assert!(report.is_ok(), "{report:?}");
    let f = body(&module.into_backend(), &qualified("f"));

    // Source lane then destination component, per component.
    assert_eq!(member_offsets(&f), vec![0, 0, 4, 8, 8, 16, 12, 24, 16, 4]);
    let written = stores(&f, DataType::Float(32));
    assert_eq!(written.len(), 5);
    let v_slot = root(&f, written[0].0);
    assert_eq!(f.inst(v_slot), &Inst::Local { size: 32, align: 4 });
    assert!(written.iter().all(|&(at, _)| root(&f, at) == v_slot));
}

#[test]
fn relative_slice_round_trips_through_offsets() {
    let mut p = Program::new();
    let ints = p.info.types.slice_of(TypeId::INT);
    let rel = p.info.types.relative_slice(ints, TypeId::I16);
    let g = p.global("g", ints, None);
    let r = p.local("r", rel);
    let t = p.local("t", ints);
    let declare_r = p.stmt(StmtKind::Local { entity: r, init: None });
    let lhs = p.ident(r);
    let rhs = p.ident(g);
    let assign = p.stmt(StmtKind::Assign { lhs, rhs });
    let reread = p.ident(r);
    let declare_t = p.stmt(StmtKind::Local {
        entity: t,
        init: Some(reread),
    });
    p.simple_proc("f", vec![declare_r, assign, declare_t]);

    let (module, report) = generate(&p.info, single_threaded());
    assert!(report.is_ok(), "{report:?}");
    let f = body(&module.into_backend(), &qualified("f"));

    // Store: the data offset and the length are both narrowed to i16, and a
    // nil data pointer encodes as a zero offset.
    assert_eq!(
        count(&f, |i| matches!(
            i,
            Inst::Convert { op: CastOp::Truncate, to: DataType::I16, .. }
        )),
        2
    );
    let [(offset_at, encoded), (len_at, _)] = stores(&f, DataType::I16)[..] else {
        panic!("expected the offset and length stores");
    };
    let Inst::Select { dt: DataType::I16, cond, then, .. } = f.inst(encoded) else {
        panic!("offset is not selected against nil");
    };
    assert!(matches!(f.inst(*cond), Inst::CmpEq { dt: DataType::Ptr, .. }));
    assert_eq!(f.inst(*then), &Inst::ConstInt { dt: DataType::I16, value: 0 });
    let r_slot = offset_at;
    assert_eq!(f.inst(r_slot), &Inst::Local { size: 4, align: 2 });
    assert_eq!(f.inst(len_at), &Inst::MemberAccess { base: r_slot, offset: 2 });

    // Load: both halves are widened back and rebuilt as `{data, len}`.
    assert_eq!(
        count(&f, |i| matches!(i, Inst::Load { dt: DataType::I16, .. })),
        2
    );
    assert_eq!(
        count(&f, |i| matches!(
            i,
            Inst::Convert { op: CastOp::SignExtend, to: DataType::I64, .. }
        )),
        2
    );
    let [(data_at, data)] = stores(&f, DataType::Ptr)[..] else {
        panic!("expected one data pointer store");
    };
    assert!(matches!(f.inst(data), Inst::Select { dt: DataType::Ptr, .. }));
    assert_eq!(f.inst(data_at), &Inst::Local { size: 16, align: 8 });
    let [(pair_len_at, _)] = stores(&f, DataType::I64)[..] else {
        panic!("expected one length store");
    };
    assert_eq!(
        f.inst(pair_len_at),
        &Inst::MemberAccess { base: data_at, offset: 8 }
    );
}

#[test]
fn context_field_store_goes_through_the_context_parameter() {
    let mut p = Program::new();
    let ctx_ty = p.info.context_type();
    let base = p.expr(ExprKind::Context, ctx_ty);
    let field = p.expr(
        ExprKind::Field {
            base,
            selection: Selection::new(&[4]),
        },
        TypeId::INT,
    );
    let five = p.int(5);
    let assign = p.stmt(StmtKind::Assign { lhs: field, rhs: five });
    p.simple_proc("f", vec![assign]);

    let (module, report) = generate(&p.info, single_threaded());
    assert!(report.is_ok(), "{report:?}");
    let f = body(&module.into_backend(), &qualified("f"));

    // The context pointer is the only parameter of a `proc()`.
    assert_eq!(f.prototype.params, vec![DataType::Ptr]);
    let ctx = NodeId::from_raw(0);
    assert_eq!(f.inst(ctx), &Inst::Param(0));
    assert!(f.insts.contains(&Inst::MemberAccess { base: ctx, offset: 48 }));
    assert_eq!(
        count(&f, |i| matches!(i, Inst::Store { dt: DataType::I64, .. })),
        1
    );
}

#[test]
fn aggregate_result_is_written_through_the_hidden_pointer() {
    let mut p = Program::new();
    let triple = p.info.types.struct_type(vec![
        FieldDef::new("a", TypeId::INT),
        FieldDef::new("b", TypeId::INT),
        FieldDef::new("c", TypeId::INT),
    ]);
    let t = p.local("t", triple);
    let declare = p.stmt(StmtKind::Local { entity: t, init: None });
    let value = p.ident(t);
    let ret = p.stmt(StmtKind::Return(Some(value)));
    let ty = p.proc_type(&[], &[triple], CallingConvention::Odin);
    p.procedure("make", ty, vec![declare, ret], ProcDecl::default());

    let (module, report) = generate(&p.info, single_threaded());
    assert!(report.is_ok(), "{report:?}");
    let f = body(&module.into_backend(), &qualified("make"));

    assert_eq!(f.prototype.params, vec![DataType::Ptr, DataType::Ptr]);
    assert!(f.prototype.returns.is_empty());
    let sret = NodeId::from_raw(0);
    assert_eq!(f.inst(sret), &Inst::Param(0));
    assert!(f.insts.iter().any(|i| matches!(
        i,
        Inst::Memcpy { dst, size: 24, .. } if *dst == sret
    )));
    assert_eq!(f.insts.last(), Some(&Inst::Return(Vec::new())));
}
