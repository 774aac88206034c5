//! Shared builders for lowering tests.
//!
//! There is no parser in this crate, so tests assemble already-typed units
//! by hand with these helpers and run them through [`konac::compile_unit`]
//! or the desugaring passes directly.

#![allow(dead_code)]

use kona_ast::{
    BinOp, BlockStmt, ClassDecl, CtorDecl, Expr, ExprKind, ExprStmt, FieldDecl, IfStmt, LocalDecl,
    MethodDecl, Param, ReturnStmt, Span, StaticBlockDecl, Stmt, SuperCallStmt, Type, Unit,
    WhileStmt,
};
use konac::CompileOptions;

pub fn sp() -> Span {
    0..0
}

pub fn unit(classes: Vec<ClassDecl>) -> Unit {
    Unit { path: "test.kona".to_string(), classes, span: sp() }
}

pub fn class(name: &str) -> ClassDecl {
    ClassDecl {
        name: name.to_string(),
        superclass: None,
        enclosing: None,
        captures_enclosing: false,
        fields: Vec::new(),
        static_blocks: Vec::new(),
        ctor: None,
        methods: Vec::new(),
        span: sp(),
    }
}

/// A nested class that captures its enclosing instance.
pub fn inner_class(name: &str, enclosing: &str) -> ClassDecl {
    let mut c = class(name);
    c.enclosing = Some(enclosing.to_string());
    c.captures_enclosing = true;
    c
}

pub fn field(name: &str, ty: Type) -> FieldDecl {
    FieldDecl {
        name: name.to_string(),
        ty,
        is_static: false,
        is_final: false,
        init: None,
        span: sp(),
    }
}

pub fn static_field(name: &str, ty: Type, init: Option<Expr>) -> FieldDecl {
    FieldDecl { name: name.to_string(), ty, is_static: true, is_final: false, init, span: sp() }
}

pub fn static_block(body: Vec<Stmt>) -> StaticBlockDecl {
    StaticBlockDecl { body, span: sp() }
}

pub fn param(name: &str, ty: Type) -> Param {
    Param { name: name.to_string(), ty, span: sp() }
}

pub fn ctor(params: Vec<Param>, body: Vec<Stmt>) -> CtorDecl {
    CtorDecl { params, body, span: sp() }
}

pub fn method(name: &str, params: Vec<Param>, ret: Type, body: Vec<Stmt>) -> MethodDecl {
    MethodDecl { name: name.to_string(), is_static: false, params, ret, body, span: sp() }
}

pub fn static_method(name: &str, params: Vec<Param>, ret: Type, body: Vec<Stmt>) -> MethodDecl {
    MethodDecl { name: name.to_string(), is_static: true, params, ret, body, span: sp() }
}

/// The designated entry shape: `static main(String[])` returning nothing.
pub fn main_method(body: Vec<Stmt>) -> MethodDecl {
    static_method("main", vec![param("args", Type::Array(Box::new(Type::Str)))], Type::Void, body)
}

pub fn expr(kind: ExprKind, ty: Type) -> Expr {
    Expr { kind, ty, span: sp() }
}

pub fn int(v: i64) -> Expr {
    expr(ExprKind::IntLit(v), Type::Int)
}

pub fn float(v: f64) -> Expr {
    expr(ExprKind::FloatLit(v), Type::Float)
}

pub fn boolean(v: bool) -> Expr {
    expr(ExprKind::BoolLit(v), Type::Bool)
}

pub fn str_lit(s: &str) -> Expr {
    expr(ExprKind::StrLit(s.to_string()), Type::Str)
}

pub fn null_lit() -> Expr {
    expr(ExprKind::NullLit, Type::Null)
}

pub fn this(class: &str) -> Expr {
    expr(ExprKind::This { qualifier: None }, Type::Class(class.to_string()))
}

/// A qualified self reference (`Outer.this`) typed as the named outer
/// class.
pub fn qualified_this(outer: &str) -> Expr {
    expr(ExprKind::This { qualifier: Some(outer.to_string()) }, Type::Class(outer.to_string()))
}

pub fn super_ref(superclass: &str) -> Expr {
    expr(ExprKind::Super { qualifier: None }, Type::Class(superclass.to_string()))
}

pub fn local(name: &str, ty: Type) -> Expr {
    expr(ExprKind::Local(name.to_string()), ty)
}

pub fn get_field(target: Expr, name: &str, ty: Type) -> Expr {
    expr(ExprKind::Field { target: Box::new(target), name: name.to_string() }, ty)
}

pub fn static_ref(class: &str, name: &str, ty: Type) -> Expr {
    expr(ExprKind::StaticField { class: class.to_string(), name: name.to_string() }, ty)
}

pub fn bin(op: BinOp, lhs: Expr, rhs: Expr, ty: Type) -> Expr {
    expr(ExprKind::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) }, ty)
}

pub fn assign(target: Expr, value: Expr) -> Expr {
    let ty = target.ty.clone();
    expr(ExprKind::Assign { target: Box::new(target), value: Box::new(value) }, ty)
}

pub fn new_obj(class: &str, args: Vec<Expr>) -> Expr {
    expr(
        ExprKind::New { class: class.to_string(), qualifier: None, args },
        Type::Class(class.to_string()),
    )
}

pub fn new_qualified(class: &str, qualifier: Expr, args: Vec<Expr>) -> Expr {
    expr(
        ExprKind::New { class: class.to_string(), qualifier: Some(Box::new(qualifier)), args },
        Type::Class(class.to_string()),
    )
}

pub fn call(target: Expr, method: &str, args: Vec<Expr>, ty: Type) -> Expr {
    expr(ExprKind::Call { target: Box::new(target), method: method.to_string(), args }, ty)
}

pub fn static_call(class: &str, method: &str, args: Vec<Expr>, ty: Type) -> Expr {
    expr(
        ExprKind::StaticCall { class: class.to_string(), method: method.to_string(), args },
        ty,
    )
}

pub fn expr_stmt(e: Expr) -> Stmt {
    Stmt::Expr(ExprStmt { expr: e, span: sp() })
}

pub fn local_stmt(name: &str, ty: Type, init: Option<Expr>) -> Stmt {
    Stmt::Local(LocalDecl { name: name.to_string(), ty, init, span: sp() })
}

pub fn ret(value: Option<Expr>) -> Stmt {
    Stmt::Return(ReturnStmt { value, span: sp() })
}

pub fn block(stmts: Vec<Stmt>) -> Stmt {
    Stmt::Block(BlockStmt { stmts, span: sp() })
}

pub fn if_stmt(cond: Expr, then_branch: Stmt, else_branch: Option<Stmt>) -> Stmt {
    Stmt::If(IfStmt {
        cond,
        then_branch: Box::new(then_branch),
        else_branch: else_branch.map(Box::new),
        span: sp(),
    })
}

pub fn while_stmt(cond: Expr, body: Stmt) -> Stmt {
    Stmt::While(WhileStmt { cond, body: Box::new(body), span: sp() })
}

pub fn super_call(args: Vec<Expr>) -> Stmt {
    Stmt::SuperCall(SuperCallStmt { qualifier: None, args, span: sp() })
}

pub fn options(debug_info: bool) -> CompileOptions {
    CompileOptions { debug_info, target_triple: None }
}

/// Lowers a unit without debug metadata and panics on any diagnostic.
pub fn lower(unit: &Unit) -> String {
    konac::compile_unit(unit, "", &options(false)).expect("lowering failed")
}

/// Lowers a unit with debug metadata attached.
pub fn lower_debug(unit: &Unit) -> String {
    konac::compile_unit(unit, "", &options(true)).expect("lowering failed")
}

/// Slice of the module text covering one function definition.
pub fn function_body<'a>(ir: &'a str, header: &str) -> &'a str {
    let start = ir
        .find(header)
        .unwrap_or_else(|| panic!("`{header}` not found in:\n{ir}"));
    let rest = &ir[start..];
    let end = rest.find("\n}").map(|i| i + 2).unwrap_or(rest.len());
    &rest[..end]
}
