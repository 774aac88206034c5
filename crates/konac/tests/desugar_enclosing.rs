//! Enclosing-instance capture desugaring behavior.

mod common;

use common::*;
use kona_ast::{ExprKind, Stmt, Type};
use konac::desugar::{self, enclosing::CAPTURE_NAME};
use konac::diagnostics::Severity;

#[test]
fn capture_plumbing_is_declared_once() {
    let mut unit = unit(vec![class("Out"), inner_class("Inn", "Out")]);
    desugar::run(&mut unit).expect("desugar failed");

    let inn = unit.class("Inn").expect("Inn vanished");
    let capture_fields: Vec<_> =
        inn.fields.iter().filter(|f| f.name == CAPTURE_NAME).collect();
    assert_eq!(capture_fields.len(), 1);
    assert_eq!(inn.fields[0].name, CAPTURE_NAME);
    assert_eq!(inn.fields[0].ty, Type::Class("Out".to_string()));
    assert!(inn.fields[0].is_final);

    let ctor = inn.ctor.as_ref().expect("no constructor materialized");
    let capture_params: Vec<_> =
        ctor.params.iter().filter(|p| p.name == CAPTURE_NAME).collect();
    assert_eq!(capture_params.len(), 1);
    assert_eq!(ctor.params[0].name, CAPTURE_NAME);

    // first statement stores the formal into the capture field
    let Stmt::Expr(first) = &ctor.body[0] else {
        panic!("first constructor statement is not the capture store");
    };
    let ExprKind::Assign { target, value } = &first.expr.kind else {
        panic!("capture store is not an assignment");
    };
    assert!(matches!(&target.kind, ExprKind::Field { name, .. } if name == CAPTURE_NAME));
    assert!(matches!(&value.kind, ExprKind::Local(name) if name == CAPTURE_NAME));
}

#[test]
fn implicit_constructor_delegates_to_superclass() {
    let mut base = class("Base");
    base.ctor = Some(ctor(vec![], vec![]));
    let mut sub = class("Sub");
    sub.superclass = Some("Base".to_string());
    let mut unit = unit(vec![base, sub]);
    desugar::run(&mut unit).expect("desugar failed");

    let sub = unit.class("Sub").expect("Sub vanished");
    let ctor = sub.ctor.as_ref().expect("no constructor materialized");
    assert!(matches!(&ctor.body[0], Stmt::SuperCall(s) if s.args.is_empty()));
}

#[test]
fn construction_walks_the_capture_chain() {
    // Out encloses Mid encloses Inn; constructing Mid from inside Inn
    // needs an Out, two capture reads away.
    let mid = inner_class("Mid", "Out");
    let mut inn = inner_class("Inn", "Mid");
    inn.methods.push(method(
        "make",
        vec![],
        Type::Void,
        vec![expr_stmt(new_obj("Mid", vec![]))],
    ));
    let mut unit = unit(vec![class("Out"), mid, inn]);
    desugar::run(&mut unit).expect("desugar failed");

    let inn = unit.class("Inn").expect("Inn vanished");
    let Stmt::Expr(s) = &inn.methods[0].body[0] else {
        panic!("method body reshaped unexpectedly");
    };
    let ExprKind::New { qualifier, args, .. } = &s.expr.kind else {
        panic!("construction disappeared");
    };
    assert!(qualifier.is_none());
    assert_eq!(args.len(), 1);

    // args[0] = this.outer$.outer$, typed Out
    assert_eq!(args[0].ty, Type::Class("Out".to_string()));
    let ExprKind::Field { target: outer_read, name } = &args[0].kind else {
        panic!("enclosing argument is not a capture read");
    };
    assert_eq!(name, CAPTURE_NAME);
    assert_eq!(outer_read.ty, Type::Class("Mid".to_string()));
    let ExprKind::Field { target: this_read, name } = &outer_read.kind else {
        panic!("chain is not two reads deep");
    };
    assert_eq!(name, CAPTURE_NAME);
    assert!(matches!(&this_read.kind, ExprKind::This { qualifier: None }));
}

#[test]
fn explicit_qualifier_is_used_directly() {
    let mut out = class("Out");
    out.methods.push(method(
        "make",
        vec![param("o", Type::Class("Out".to_string()))],
        Type::Void,
        vec![expr_stmt(new_qualified("Inn", local("o", Type::Class("Out".to_string())), vec![]))],
    ));
    let mut unit = unit(vec![out, inner_class("Inn", "Out")]);
    desugar::run(&mut unit).expect("desugar failed");

    let out = unit.class("Out").expect("Out vanished");
    let Stmt::Expr(s) = &out.methods[0].body[0] else {
        panic!("method body reshaped unexpectedly");
    };
    let ExprKind::New { qualifier, args, .. } = &s.expr.kind else {
        panic!("construction disappeared");
    };
    assert!(qualifier.is_none(), "qualifier must be consumed");
    assert_eq!(args.len(), 1);
    // no walk: the qualifier itself became the leading argument
    assert!(matches!(&args[0].kind, ExprKind::Local(name) if name == "o"));
}

#[test]
fn qualified_this_becomes_a_chain_read() {
    let mid = inner_class("Mid", "Out");
    let mut inn = inner_class("Inn", "Mid");
    inn.methods.push(method(
        "grab",
        vec![],
        Type::Class("Out".to_string()),
        vec![ret(Some(qualified_this("Out")))],
    ));
    let mut unit = unit(vec![class("Out"), mid, inn]);
    desugar::run(&mut unit).expect("desugar failed");

    let inn = unit.class("Inn").expect("Inn vanished");
    let Stmt::Return(s) = &inn.methods[0].body[0] else {
        panic!("return reshaped unexpectedly");
    };
    let returned = s.value.as_ref().expect("return lost its value");
    assert_eq!(returned.ty, Type::Class("Out".to_string()));
    assert!(matches!(&returned.kind, ExprKind::Field { name, .. } if name == CAPTURE_NAME));
}

#[test]
fn constructor_chain_starts_at_the_capture_formal() {
    // inside Inn's constructor the capture field may not be stored yet,
    // so the derived enclosing instance must read the formal instead
    let mut inn = inner_class("Inn", "Out");
    inn.ctor = Some(ctor(vec![], vec![expr_stmt(new_obj("Peer", vec![]))]));
    let peer = inner_class("Peer", "Out");
    let mut unit = unit(vec![class("Out"), inn, peer]);
    desugar::run(&mut unit).expect("desugar failed");

    let inn = unit.class("Inn").expect("Inn vanished");
    let body = &inn.ctor.as_ref().expect("constructor vanished").body;
    // body[0] is the synthesized capture store; the user statement follows
    let Stmt::Expr(s) = &body[1] else {
        panic!("user statement not found after the capture store");
    };
    let ExprKind::New { args, .. } = &s.expr.kind else {
        panic!("construction disappeared");
    };
    assert!(
        matches!(&args[0].kind, ExprKind::Local(name) if name == CAPTURE_NAME),
        "expected the constructor formal, found {:?}",
        args[0].kind
    );
}

#[test]
fn super_delegation_gets_the_enclosing_instance() {
    let base = inner_class("Base", "Out");
    let mut sub = inner_class("Sub", "Out");
    sub.superclass = Some("Base".to_string());
    sub.ctor = Some(ctor(vec![], vec![super_call(vec![])]));
    let mut unit = unit(vec![class("Out"), base, sub]);
    desugar::run(&mut unit).expect("desugar failed");

    let sub = unit.class("Sub").expect("Sub vanished");
    let body = &sub.ctor.as_ref().expect("constructor vanished").body;
    assert!(matches!(&body[0], Stmt::Expr(_)), "capture store must come first");
    let Stmt::SuperCall(s) = &body[1] else {
        panic!("delegation not found after the capture store");
    };
    assert_eq!(s.args.len(), 1);
    assert!(matches!(&s.args[0].kind, ExprKind::Local(name) if name == CAPTURE_NAME));
}

#[test]
fn declaration_order_does_not_matter() {
    // the constructing class precedes both nesting classes in the unit
    let mut main = class("Main");
    main.methods.push(method(
        "make",
        vec![param("o", Type::Class("Out".to_string()))],
        Type::Void,
        vec![expr_stmt(new_qualified("Inn", local("o", Type::Class("Out".to_string())), vec![]))],
    ));
    let mut unit = unit(vec![main, class("Out"), inner_class("Inn", "Out")]);
    desugar::run(&mut unit).expect("desugar failed");

    let main = unit.class("Main").expect("Main vanished");
    let Stmt::Expr(s) = &main.methods[0].body[0] else {
        panic!("method body reshaped unexpectedly");
    };
    let ExprKind::New { args, .. } = &s.expr.kind else {
        panic!("construction disappeared");
    };
    assert_eq!(args.len(), 1, "late-declared capture formal was not seen");

    let inn = unit.class("Inn").expect("Inn vanished");
    assert_eq!(inn.ctor.as_ref().expect("constructor vanished").params[0].name, CAPTURE_NAME);
}

#[test]
fn unreachable_enclosing_instance_is_a_positioned_error() {
    let mut solo = class("Solo");
    solo.methods.push(method(
        "make",
        vec![],
        Type::Void,
        vec![expr_stmt(new_obj("Inn", vec![]))],
    ));
    let mut unit = unit(vec![solo, class("Out"), inner_class("Inn", "Out")]);
    let err = desugar::run(&mut unit).expect_err("expected a diagnostic");
    assert_eq!(err.severity, Severity::Error);
    assert!(err.span_start.is_some());
    assert!(err.message.contains("no enclosing instance"), "got: {}", err.message);
}

#[test]
fn unrelated_constructor_dead_ends_as_a_semantic_error() {
    // Solo neither nests nor captures; its constructor has no lexical
    // path to the Out that Inn requires
    let mut solo = class("Solo");
    solo.ctor = Some(ctor(vec![], vec![expr_stmt(new_obj("Inn", vec![]))]));
    let mut unit = unit(vec![solo, class("Out"), inner_class("Inn", "Out")]);
    let err = desugar::run(&mut unit).expect_err("expected a diagnostic");
    assert_eq!(err.severity, Severity::Error);
    assert!(err.span_start.is_some());
    assert!(err.message.contains("no enclosing instance"), "got: {}", err.message);
}

#[test]
fn static_context_is_a_positioned_error() {
    let mut out = class("Out");
    out.methods.push(static_method(
        "make",
        vec![],
        Type::Void,
        vec![expr_stmt(new_obj("Inn", vec![]))],
    ));
    let mut unit = unit(vec![out, inner_class("Inn", "Out")]);
    let err = desugar::run(&mut unit).expect_err("expected a diagnostic");
    assert_eq!(err.severity, Severity::Error);
    assert!(err.message.contains("static context"), "got: {}", err.message);
}

#[test]
fn unqualified_super_upcasts_the_receiver() {
    let mut base = class("Base");
    base.methods.push(method("m", vec![], Type::Void, vec![]));
    let mut sub = class("Sub");
    sub.superclass = Some("Base".to_string());
    sub.methods.push(method(
        "call_up",
        vec![],
        Type::Void,
        vec![expr_stmt(call(super_ref("Base"), "m", vec![], Type::Void))],
    ));
    let mut unit = unit(vec![base, sub]);
    desugar::run(&mut unit).expect("desugar failed");

    let sub = unit.class("Sub").expect("Sub vanished");
    let Stmt::Expr(s) = &sub.methods[0].body[0] else {
        panic!("method body reshaped unexpectedly");
    };
    let ExprKind::Call { target, .. } = &s.expr.kind else {
        panic!("call disappeared");
    };
    assert_eq!(target.ty, Type::Class("Base".to_string()));
    let ExprKind::Cast(inner) = &target.kind else {
        panic!("super receiver is not an upcast, found {:?}", target.kind);
    };
    assert!(matches!(&inner.kind, ExprKind::This { qualifier: None }));
}

#[test]
fn qualified_super_walks_then_upcasts() {
    let mut out = class("Out");
    out.superclass = Some("Base".to_string());
    let mut base = class("Base");
    base.methods.push(method("m", vec![], Type::Void, vec![]));
    let mut inn = inner_class("Inn", "Out");
    inn.methods.push(method(
        "call_up",
        vec![],
        Type::Void,
        vec![expr_stmt(call(
            expr(
                ExprKind::Super { qualifier: Some("Out".to_string()) },
                Type::Class("Base".to_string()),
            ),
            "m",
            vec![],
            Type::Void,
        ))],
    ));
    let mut unit = unit(vec![base, out, inn]);
    desugar::run(&mut unit).expect("desugar failed");

    let inn = unit.class("Inn").expect("Inn vanished");
    let Stmt::Expr(s) = &inn.methods[0].body[0] else {
        panic!("method body reshaped unexpectedly");
    };
    let ExprKind::Call { target, .. } = &s.expr.kind else {
        panic!("call disappeared");
    };
    assert_eq!(target.ty, Type::Class("Base".to_string()));
    let ExprKind::Cast(inner) = &target.kind else {
        panic!("qualified super is not an upcast");
    };
    // the walked receiver is the capture read landing on Out
    assert_eq!(inner.ty, Type::Class("Out".to_string()));
    assert!(matches!(&inner.kind, ExprKind::Field { name, .. } if name == CAPTURE_NAME));
}
