//! String concatenation normalization behavior.

mod common;

use common::*;
use kona_ast::{BinOp, ExprKind, Stmt, Type};
use konac::desugar;
use konac::diagnostics::Severity;

fn method_with(body: Vec<Stmt>) -> kona_ast::Unit {
    let mut main = class("Main");
    main.methods.push(method("run", vec![], Type::Void, body));
    unit(vec![main])
}

fn first_expr(unit: &kona_ast::Unit) -> &kona_ast::Expr {
    let Stmt::Expr(s) = &unit.class("Main").expect("Main vanished").methods[0].body[0] else {
        panic!("method body reshaped unexpectedly");
    };
    &s.expr
}

#[test]
fn primitive_operands_are_converted() {
    let mut unit = method_with(vec![
        expr_stmt(bin(BinOp::Add, str_lit("n="), int(7), Type::Str)),
        expr_stmt(bin(BinOp::Add, str_lit("f="), float(1.5), Type::Str)),
        expr_stmt(bin(BinOp::Add, str_lit("b="), boolean(true), Type::Str)),
    ]);
    desugar::run(&mut unit).expect("desugar failed");

    let main = unit.class("Main").expect("Main vanished");
    for stmt in &main.methods[0].body {
        let Stmt::Expr(s) = stmt else { panic!("statement reshaped unexpectedly") };
        let ExprKind::Call { target, method, args } = &s.expr.kind else {
            panic!("concatenation did not become a call");
        };
        assert_eq!(s.expr.ty, Type::Str);
        assert_eq!(method, "concat");
        assert!(matches!(&target.kind, ExprKind::StrLit(_)));
        assert_eq!(args.len(), 1);
        assert_eq!(args[0].ty, Type::Str);
        let ExprKind::StaticCall { class, method, args: from_args } = &args[0].kind else {
            panic!("primitive operand was not routed through String.from");
        };
        assert_eq!(class, "String");
        assert_eq!(method, "from");
        assert_eq!(from_args.len(), 1);
    }
}

#[test]
fn null_becomes_the_literal_null() {
    let mut unit = method_with(vec![expr_stmt(bin(
        BinOp::Add,
        str_lit("v="),
        null_lit(),
        Type::Str,
    ))]);
    desugar::run(&mut unit).expect("desugar failed");

    let ExprKind::Call { args, .. } = &first_expr(&unit).kind else {
        panic!("concatenation did not become a call");
    };
    assert!(matches!(&args[0].kind, ExprKind::StrLit(s) if s == "null"));
}

#[test]
fn object_operand_calls_to_string() {
    let obj = local("p", Type::Class("Point".to_string()));
    let mut unit = method_with(vec![expr_stmt(bin(
        BinOp::Add,
        str_lit("p="),
        obj,
        Type::Str,
    ))]);
    desugar::run(&mut unit).expect("desugar failed");

    let ExprKind::Call { args, .. } = &first_expr(&unit).kind else {
        panic!("concatenation did not become a call");
    };
    assert_eq!(args[0].ty, Type::Str);
    let ExprKind::Call { target, method, args: inner_args } = &args[0].kind else {
        panic!("object operand was not routed through to_string");
    };
    assert_eq!(method, "to_string");
    assert!(inner_args.is_empty());
    assert!(matches!(&target.kind, ExprKind::Local(name) if name == "p"));
}

#[test]
fn string_operands_pass_through_unconverted() {
    let mut unit = method_with(vec![expr_stmt(bin(
        BinOp::Add,
        local("a", Type::Str),
        local("b", Type::Str),
        Type::Str,
    ))]);
    desugar::run(&mut unit).expect("desugar failed");

    let ExprKind::Call { target, args, .. } = &first_expr(&unit).kind else {
        panic!("concatenation did not become a call");
    };
    assert!(matches!(&target.kind, ExprKind::Local(name) if name == "a"));
    assert!(matches!(&args[0].kind, ExprKind::Local(name) if name == "b"));
}

#[test]
fn nested_concats_stay_left_associated() {
    // ("a" + 1) + "b": the inner concat becomes the outer receiver
    let inner = bin(BinOp::Add, str_lit("a"), int(1), Type::Str);
    let mut unit = method_with(vec![expr_stmt(bin(
        BinOp::Add,
        inner,
        str_lit("b"),
        Type::Str,
    ))]);
    desugar::run(&mut unit).expect("desugar failed");

    let ExprKind::Call { target, args, .. } = &first_expr(&unit).kind else {
        panic!("concatenation did not become a call");
    };
    assert!(matches!(&args[0].kind, ExprKind::StrLit(s) if s == "b"));
    let ExprKind::Call { method, .. } = &target.kind else {
        panic!("inner concatenation was not normalized first");
    };
    assert_eq!(method, "concat");
}

#[test]
fn field_initializers_are_normalized() {
    let mut main = class("Main");
    main.fields.push(static_field(
        "banner",
        Type::Str,
        Some(bin(BinOp::Add, str_lit("v"), int(2), Type::Str)),
    ));
    let mut unit = unit(vec![main]);
    desugar::run(&mut unit).expect("desugar failed");

    let main = unit.class("Main").expect("Main vanished");
    let init = main.fields[0].init.as_ref().expect("initializer vanished");
    assert!(matches!(&init.kind, ExprKind::Call { method, .. } if method == "concat"));
}

#[test]
fn static_block_bodies_are_normalized() {
    let mut main = class("Main");
    main.fields.push(static_field("banner", Type::Str, None));
    main.static_blocks.push(static_block(vec![expr_stmt(assign(
        static_ref("Main", "banner", Type::Str),
        bin(BinOp::Add, str_lit("v"), int(2), Type::Str),
    ))]));
    let mut unit = unit(vec![main]);
    desugar::run(&mut unit).expect("desugar failed");

    let main = unit.class("Main").expect("Main vanished");
    let Stmt::Expr(s) = &main.static_blocks[0].body[0] else {
        panic!("block body reshaped unexpectedly");
    };
    let ExprKind::Assign { value, .. } = &s.expr.kind else {
        panic!("assignment vanished from the block");
    };
    assert!(matches!(&value.kind, ExprKind::Call { method, .. } if method == "concat"));
}

#[test]
fn non_add_string_operator_is_a_contract_breach() {
    let mut unit = method_with(vec![expr_stmt(bin(
        BinOp::Lt,
        local("a", Type::Str),
        local("b", Type::Str),
        Type::Bool,
    ))]);
    let err = desugar::run(&mut unit).expect_err("expected a diagnostic");
    assert_eq!(err.severity, Severity::Bug);
}
