//! String-concatenation normalization.
//!
//! The last desugaring pass rewrites every string-sided `+` into an
//! explicit `concat` call on explicitly converted operands, so emission
//! never sees string magic in a binary operator: string operands pass
//! through untouched, `null` folds to the literal `"null"`, primitives go
//! through the typed conversion surface (`String.from`, bound per operand
//! type at emission), and reference operands dispatch through `to_string`.
//! Applied bottom-up, so nested concatenations normalize inside-out and
//! left association is preserved.

use kona_ast::{BinOp, Expr, ExprKind, Stmt, Type, Unit};

use crate::diagnostics::{Diagnostic, DiagnosticResult};

/// Class name carrying the static conversion entry points.
pub(crate) const STRING_CLASS: &str = "String";
/// Static conversion method; emission binds it per operand type.
pub(crate) const FROM_METHOD: &str = "from";
/// Instance method a normalized concatenation calls on its left operand.
pub(crate) const CONCAT_METHOD: &str = "concat";
/// Conversion method resolved against reference operands.
pub(crate) const TO_STRING_METHOD: &str = "to_string";

/// Runs the normalizer over every body and initializer in the unit.
pub fn normalize_concat(unit: &mut Unit) -> DiagnosticResult<()> {
    for class in &mut unit.classes {
        if let Some(ctor) = &mut class.ctor {
            for stmt in &mut ctor.body {
                normalize_stmt(stmt)?;
            }
        }
        for method in &mut class.methods {
            for stmt in &mut method.body {
                normalize_stmt(stmt)?;
            }
        }
        for field in &mut class.fields {
            if let Some(init) = &mut field.init {
                normalize_expr(init)?;
            }
        }
        for block in &mut class.static_blocks {
            for stmt in &mut block.body {
                normalize_stmt(stmt)?;
            }
        }
    }
    Ok(())
}

fn normalize_stmt(stmt: &mut Stmt) -> DiagnosticResult<()> {
    match stmt {
        Stmt::Local(s) => {
            if let Some(init) = &mut s.init {
                normalize_expr(init)?;
            }
        }
        Stmt::Expr(s) => normalize_expr(&mut s.expr)?,
        Stmt::Return(s) => {
            if let Some(value) = &mut s.value {
                normalize_expr(value)?;
            }
        }
        Stmt::If(s) => {
            normalize_expr(&mut s.cond)?;
            normalize_stmt(&mut s.then_branch)?;
            if let Some(alt) = &mut s.else_branch {
                normalize_stmt(alt)?;
            }
        }
        Stmt::While(s) => {
            normalize_expr(&mut s.cond)?;
            normalize_stmt(&mut s.body)?;
        }
        Stmt::Block(s) => {
            for st in &mut s.stmts {
                normalize_stmt(st)?;
            }
        }
        Stmt::SuperCall(s) => {
            if let Some(q) = &mut s.qualifier {
                normalize_expr(q)?;
            }
            for arg in &mut s.args {
                normalize_expr(arg)?;
            }
        }
    }
    Ok(())
}

fn normalize_expr(expr: &mut Expr) -> DiagnosticResult<()> {
    // children first, so nested concatenations are already in call form
    match &mut expr.kind {
        ExprKind::Field { target, .. } => normalize_expr(target)?,
        ExprKind::Binary { lhs, rhs, .. } => {
            normalize_expr(lhs)?;
            normalize_expr(rhs)?;
        }
        ExprKind::Assign { target, value } => {
            normalize_expr(target)?;
            normalize_expr(value)?;
        }
        ExprKind::New { qualifier, args, .. } => {
            if let Some(q) = qualifier {
                normalize_expr(q)?;
            }
            for arg in args {
                normalize_expr(arg)?;
            }
        }
        ExprKind::Call { target, args, .. } => {
            normalize_expr(target)?;
            for arg in args {
                normalize_expr(arg)?;
            }
        }
        ExprKind::StaticCall { args, .. } => {
            for arg in args {
                normalize_expr(arg)?;
            }
        }
        ExprKind::Cast(inner) => normalize_expr(inner)?,
        _ => {}
    }

    let string_sided = matches!(
        &expr.kind,
        ExprKind::Binary { lhs, rhs, .. } if lhs.ty == Type::Str || rhs.ty == Type::Str
    );
    if !string_sided {
        return Ok(());
    }
    let span = expr.span.clone();
    let kind = std::mem::replace(&mut expr.kind, ExprKind::NullLit);
    let ExprKind::Binary { op, lhs, rhs } = kind else {
        return Err(Diagnostic::bug_at("string normalization matched a non-binary node", span.start));
    };
    if op != BinOp::Add {
        return Err(Diagnostic::bug_at(
            format!("operator `{:?}` applied to a string operand survived type checking", op),
            span.start,
        ));
    }
    let lhs = convert_to_string(*lhs)?;
    let rhs = convert_to_string(*rhs)?;
    expr.ty = Type::Str;
    expr.kind = ExprKind::Call {
        target: Box::new(lhs),
        method: CONCAT_METHOD.to_string(),
        args: vec![rhs],
    };
    Ok(())
}

/// Wraps one concatenation operand in its conversion form. Operands that
/// are already strings come back untouched.
fn convert_to_string(operand: Expr) -> DiagnosticResult<Expr> {
    let span = operand.span.clone();
    match &operand.ty {
        Type::Str => Ok(operand),
        Type::Null => Ok(Expr {
            kind: ExprKind::StrLit("null".to_string()),
            ty: Type::Str,
            span,
        }),
        Type::Int | Type::Float | Type::Bool => Ok(Expr {
            kind: ExprKind::StaticCall {
                class: STRING_CLASS.to_string(),
                method: FROM_METHOD.to_string(),
                args: vec![operand],
            },
            ty: Type::Str,
            span,
        }),
        Type::Class(_) | Type::Array(_) => Ok(Expr {
            kind: ExprKind::Call {
                target: Box::new(operand),
                method: TO_STRING_METHOD.to_string(),
                args: Vec::new(),
            },
            ty: Type::Str,
            span,
        }),
        Type::Void => Err(Diagnostic::bug_at("void operand in string concatenation", span.start)),
    }
}
