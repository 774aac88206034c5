//! Module-level scaffolding: runtime declarations, the entry trampoline,
//! and the static initializer table.

mod common;

use common::*;
use kona_ast::Type;

fn args_ty() -> Type {
    Type::Array(Box::new(Type::Str))
}

#[test]
fn runtime_support_is_declared_up_front() {
    let mut main = class("Main");
    main.methods.push(main_method(vec![local_stmt(
        "n",
        Type::Int,
        Some(get_field(local("args", args_ty()), "length", Type::Int)),
    )]));
    let ir = lower(&unit(vec![main]));

    assert!(ir.contains("declare ptr @kona_gc_alloc(i64)"), "ir:\n{ir}");
    assert!(ir.contains("%kona.array = type { i64, i64, [0 x i8] }"), "ir:\n{ir}");
    // array length comes from the uniform header, not a runtime call
    assert!(ir.contains("getelementptr inbounds %kona.array"), "ir:\n{ir}");
}

#[test]
fn entry_trampoline_wraps_the_candidate() {
    let mut main = class("Main");
    main.methods.push(main_method(vec![]));
    let ir = lower(&unit(vec![main]));

    assert!(ir.contains("define i32 @main(i32"), "ir:\n{ir}");
    assert!(ir.contains("call ptr @kona_args_new(i32"), "ir:\n{ir}");
    assert!(ir.contains("call void @Main_main(ptr"), "ir:\n{ir}");
    assert!(ir.contains("ret i32 0"), "ir:\n{ir}");
}

#[test]
fn first_candidate_wins() {
    let mut a = class("A");
    a.methods.push(main_method(vec![]));
    let mut b = class("B");
    b.methods.push(main_method(vec![]));
    let ir = lower(&unit(vec![a, b]));

    assert!(ir.contains("call void @A_main(ptr"), "ir:\n{ir}");
    assert!(!ir.contains("call void @B_main(ptr"), "ir:\n{ir}");
}

#[test]
fn instance_main_is_not_a_candidate() {
    let mut main = class("Main");
    main.methods.push(method(
        "main",
        vec![param("args", args_ty())],
        Type::Void,
        vec![],
    ));
    let ir = lower(&unit(vec![main]));

    assert!(!ir.contains("@main("), "ir:\n{ir}");
    assert!(!ir.contains("kona_args_new"), "ir:\n{ir}");
}

#[test]
fn initializer_table_runs_in_declaration_order() {
    let mut a = class("A");
    a.fields.push(static_field("x", Type::Int, Some(int(1))));
    let mut b = class("B");
    b.fields.push(static_field("y", Type::Int, Some(int(2))));
    b.fields.push(static_field("z", Type::Float, Some(float(0.5))));
    let ir = lower(&unit(vec![a, b]));

    assert!(
        ir.contains("@llvm.global_ctors = appending global [3 x { i32, ptr, ptr }]"),
        "ir:\n{ir}"
    );
    assert!(ir.contains("{ i32 0, ptr @sinit.0, ptr null }"), "ir:\n{ir}");
    assert!(ir.contains("{ i32 2, ptr @sinit.2, ptr null }"), "ir:\n{ir}");
    assert!(ir.contains("define private void @sinit.0()"), "ir:\n{ir}");
    assert!(ir.contains("store i64 1, ptr @A_x"), "ir:\n{ir}");
    assert!(ir.contains("store double 5.000000e-01, ptr @B_z"), "ir:\n{ir}");
}

#[test]
fn static_blocks_interleave_with_field_initializers() {
    // source order inside Cfg: x = 1, then a block filling y, then z = 2
    let mut cfg = class("Cfg");
    let mut x = static_field("x", Type::Int, Some(int(1)));
    x.span = 10..11;
    let mut y = static_field("y", Type::Int, None);
    y.span = 20..21;
    let mut fill = static_block(vec![
        local_stmt("t", Type::Int, Some(int(5))),
        expr_stmt(assign(static_ref("Cfg", "y", Type::Int), local("t", Type::Int))),
    ]);
    fill.span = 30..31;
    let mut z = static_field("z", Type::Int, Some(int(2)));
    z.span = 40..41;
    cfg.fields.push(x);
    cfg.fields.push(y);
    cfg.fields.push(z);
    cfg.static_blocks.push(fill);
    let ir = lower(&unit(vec![cfg]));

    assert!(
        ir.contains("@llvm.global_ctors = appending global [3 x { i32, ptr, ptr }]"),
        "ir:\n{ir}"
    );
    assert!(ir.contains("{ i32 1, ptr @sinit.1, ptr null }"), "ir:\n{ir}");

    let first = function_body(&ir, "define private void @sinit.0()");
    assert!(first.contains("store i64 1, ptr @Cfg_x"), "first:\n{first}");
    // the block landed between the two field stores and runs as a real body
    let second = function_body(&ir, "define private void @sinit.1()");
    assert!(second.contains("%t = alloca i64"), "second:\n{second}");
    assert!(second.contains("store i64 5, ptr %t"), "second:\n{second}");
    assert!(second.contains("store i64 %t1, ptr @Cfg_y"), "second:\n{second}");
    let third = function_body(&ir, "define private void @sinit.2()");
    assert!(third.contains("store i64 2, ptr @Cfg_z"), "third:\n{third}");
}

#[test]
fn empty_initializer_table_is_omitted() {
    let mut cfg = class("Cfg");
    cfg.fields.push(static_field("count", Type::Int, None));
    let ir = lower(&unit(vec![cfg]));

    assert!(!ir.contains("llvm.global_ctors"), "ir:\n{ir}");
    // the storage itself still exists, zero-initialized
    assert!(ir.contains("@Cfg_count = global i64 0"), "ir:\n{ir}");
}
