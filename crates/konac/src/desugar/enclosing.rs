//! Enclosing-instance capture desugaring.
//!
//! Nested Kona classes may reference state of their lexically enclosing
//! instance. Lowering eliminates that feature in two passes over the unit:
//!
//! * **Declaration**: every capture-requiring class gets a synthetic final
//!   capture field (always field 0) typed as its immediately enclosing
//!   class, a matching leading constructor formal, and a field store as the
//!   first constructor statement.
//! * **Substitution**: every construction of a capture-requiring class,
//!   every delegation to a capturing superclass's constructor, and every
//!   qualified `this`/`super` is rewritten to thread an explicit enclosing
//!   instance, derived either from a supplied qualifier or from a
//!   capture-chain walk.
//!
//! Deeper nesting is reached by chained reads through successive capture
//! fields, never a flattened display. Inside a constructor a chain that has
//! to leave the class under construction starts from the constructor's own
//! capture formal, the only representation that is sound before the capture
//! field has been stored.

use kona_ast::{
    ClassDecl, CtorDecl, Expr, ExprKind, ExprStmt, FieldDecl, Param, Span, Stmt, SuperCallStmt,
    Type, Unit,
};

use crate::classes::ClassTable;
use crate::diagnostics::{Diagnostic, DiagnosticResult, Severity};

/// Name of the synthetic capture field and constructor formal. The `$`
/// keeps it out of the user namespace; the front end rejects identifiers
/// containing one.
pub const CAPTURE_NAME: &str = "outer$";

/// Declaration pass: materialize implicit constructors, then give every
/// capture-requiring class its capture plumbing.
///
/// Runs over the whole unit before any substitution happens, so a
/// construction site can rely on the constructed class's final shape no
/// matter where either is declared.
pub fn declare_captures(unit: &mut Unit) -> DiagnosticResult<()> {
    for class in &mut unit.classes {
        if class.ctor.is_none() {
            class.ctor = Some(implicit_ctor(class));
        }
        if !class.captures_enclosing {
            continue;
        }
        let outer = match &class.enclosing {
            Some(outer) => outer.clone(),
            None => {
                return Err(Diagnostic::bug_at(
                    format!(
                        "class `{}` requires an enclosing instance but has no enclosing class",
                        class.name
                    ),
                    class.span.start,
                ));
            }
        };
        if class.fields.iter().any(|f| f.name == CAPTURE_NAME) {
            return Err(Diagnostic::bug_at(
                format!("class `{}` already declares `{}`", class.name, CAPTURE_NAME),
                class.span.start,
            ));
        }
        class.fields.insert(
            0,
            FieldDecl {
                name: CAPTURE_NAME.to_string(),
                ty: Type::Class(outer.clone()),
                is_static: false,
                is_final: true,
                init: None,
                span: class.span.clone(),
            },
        );
        let class_name = class.name.clone();
        if let Some(ctor) = &mut class.ctor {
            ctor.params.insert(
                0,
                Param {
                    name: CAPTURE_NAME.to_string(),
                    ty: Type::Class(outer.clone()),
                    span: ctor.span.clone(),
                },
            );
            ctor.body.insert(0, capture_store(&class_name, &outer, &ctor.span));
        }
    }
    Ok(())
}

/// An implicit default constructor, delegating to the superclass default
/// when one exists.
fn implicit_ctor(class: &ClassDecl) -> CtorDecl {
    let span = class.span.clone();
    let body = match &class.superclass {
        Some(_) => vec![Stmt::SuperCall(SuperCallStmt {
            qualifier: None,
            args: Vec::new(),
            span: span.clone(),
        })],
        None => Vec::new(),
    };
    CtorDecl { params: Vec::new(), body, span }
}

/// `this.outer$ = outer$;` as the very first constructor statement, ahead
/// of superclass delegation, so chained walks rooted at a partially
/// constructed receiver already see the field.
fn capture_store(class_name: &str, outer: &str, span: &Span) -> Stmt {
    let outer_ty = Type::Class(outer.to_string());
    let this = Expr {
        kind: ExprKind::This { qualifier: None },
        ty: Type::Class(class_name.to_string()),
        span: span.clone(),
    };
    let target = Expr {
        kind: ExprKind::Field { target: Box::new(this), name: CAPTURE_NAME.to_string() },
        ty: outer_ty.clone(),
        span: span.clone(),
    };
    let value = Expr {
        kind: ExprKind::Local(CAPTURE_NAME.to_string()),
        ty: outer_ty.clone(),
        span: span.clone(),
    };
    Stmt::Expr(ExprStmt {
        expr: Expr {
            kind: ExprKind::Assign { target: Box::new(target), value: Box::new(value) },
            ty: outer_ty,
            span: span.clone(),
        },
        span: span.clone(),
    })
}

/// Substitution pass: rewrite constructions, superclass delegations, and
/// qualified self references against the declared capture plumbing.
pub fn substitute_captures(unit: &mut Unit, table: &ClassTable) -> DiagnosticResult<()> {
    let subst = Substituter { table };
    for class in &mut unit.classes {
        subst.rewrite_class(class)?;
    }
    Ok(())
}

/// Lexical position of the body being rewritten.
struct ScopeCx<'a> {
    /// The class whose member this is.
    class: &'a str,
    /// Capture formals of the surrounding constructor; `None` outside
    /// constructor bodies.
    ctor_capture: Option<Vec<Param>>,
    /// Whether an instance receiver exists at this position.
    has_receiver: bool,
}

struct Substituter<'t> {
    table: &'t ClassTable,
}

impl Substituter<'_> {
    fn rewrite_class(&self, class: &mut ClassDecl) -> DiagnosticResult<()> {
        let name = class.name.clone();
        if let Some(ctor) = &mut class.ctor {
            let capture: Vec<Param> =
                ctor.params.iter().filter(|p| p.name == CAPTURE_NAME).cloned().collect();
            let cx = ScopeCx { class: &name, ctor_capture: Some(capture), has_receiver: true };
            for stmt in &mut ctor.body {
                self.rewrite_stmt(stmt, &cx)?;
            }
        }
        for method in &mut class.methods {
            let cx =
                ScopeCx { class: &name, ctor_capture: None, has_receiver: !method.is_static };
            for stmt in &mut method.body {
                self.rewrite_stmt(stmt, &cx)?;
            }
        }
        for field in &mut class.fields {
            let has_receiver = !field.is_static;
            if let Some(init) = &mut field.init {
                let cx = ScopeCx { class: &name, ctor_capture: None, has_receiver };
                self.rewrite_expr(init, &cx)?;
            }
        }
        for block in &mut class.static_blocks {
            let cx = ScopeCx { class: &name, ctor_capture: None, has_receiver: false };
            for stmt in &mut block.body {
                self.rewrite_stmt(stmt, &cx)?;
            }
        }
        Ok(())
    }

    fn rewrite_stmt(&self, stmt: &mut Stmt, cx: &ScopeCx) -> DiagnosticResult<()> {
        match stmt {
            Stmt::Local(s) => {
                if let Some(init) = &mut s.init {
                    self.rewrite_expr(init, cx)?;
                }
            }
            Stmt::Expr(s) => self.rewrite_expr(&mut s.expr, cx)?,
            Stmt::Return(s) => {
                if let Some(value) = &mut s.value {
                    self.rewrite_expr(value, cx)?;
                }
            }
            Stmt::If(s) => {
                self.rewrite_expr(&mut s.cond, cx)?;
                self.rewrite_stmt(&mut s.then_branch, cx)?;
                if let Some(alt) = &mut s.else_branch {
                    self.rewrite_stmt(alt, cx)?;
                }
            }
            Stmt::While(s) => {
                self.rewrite_expr(&mut s.cond, cx)?;
                self.rewrite_stmt(&mut s.body, cx)?;
            }
            Stmt::Block(s) => {
                for st in &mut s.stmts {
                    self.rewrite_stmt(st, cx)?;
                }
            }
            Stmt::SuperCall(s) => {
                if let Some(q) = &mut s.qualifier {
                    self.rewrite_expr(q, cx)?;
                }
                for arg in &mut s.args {
                    self.rewrite_expr(arg, cx)?;
                }
                self.rewrite_super_delegation(s, cx)?;
            }
        }
        Ok(())
    }

    /// Children first, then the node itself, so a construction nested in
    /// another construction's arguments is rewritten before its parent
    /// grows an extra leading argument.
    fn rewrite_expr(&self, expr: &mut Expr, cx: &ScopeCx) -> DiagnosticResult<()> {
        match &mut expr.kind {
            ExprKind::Field { target, .. } => self.rewrite_expr(target, cx)?,
            ExprKind::Binary { lhs, rhs, .. } => {
                self.rewrite_expr(lhs, cx)?;
                self.rewrite_expr(rhs, cx)?;
            }
            ExprKind::Assign { target, value } => {
                self.rewrite_expr(target, cx)?;
                self.rewrite_expr(value, cx)?;
            }
            ExprKind::New { qualifier, args, .. } => {
                if let Some(q) = qualifier {
                    self.rewrite_expr(q, cx)?;
                }
                for arg in args {
                    self.rewrite_expr(arg, cx)?;
                }
            }
            ExprKind::Call { target, args, .. } => {
                self.rewrite_expr(target, cx)?;
                for arg in args {
                    self.rewrite_expr(arg, cx)?;
                }
            }
            ExprKind::StaticCall { args, .. } => {
                for arg in args {
                    self.rewrite_expr(arg, cx)?;
                }
            }
            ExprKind::Cast(inner) => self.rewrite_expr(inner, cx)?,
            _ => {}
        }
        self.rewrite_construction(expr, cx)?;
        self.rewrite_self_reference(expr, cx)
    }

    /// Constructions of capture-requiring classes get the enclosing
    /// instance prepended as the first argument, matching the formal the
    /// declaration pass added.
    fn rewrite_construction(&self, expr: &mut Expr, cx: &ScopeCx) -> DiagnosticResult<()> {
        let span = expr.span.clone();
        let ExprKind::New { class, qualifier, args } = &mut expr.kind else {
            return Ok(());
        };
        let Some(outer) = self.table.capture_target(class) else {
            if qualifier.is_some() {
                return Err(Diagnostic::bug_at(
                    format!(
                        "qualified construction of `{}`, which captures no enclosing instance",
                        class
                    ),
                    span.start,
                ));
            }
            return Ok(());
        };
        let enclosing = match qualifier.take() {
            Some(q) => *q,
            None => self.derive_enclosing(outer, &span, cx)?,
        };
        args.insert(0, enclosing);
        Ok(())
    }

    /// Delegations to a capturing superclass's constructor get the
    /// enclosing instance prepended, from the qualifier when one was
    /// written.
    fn rewrite_super_delegation(&self, s: &mut SuperCallStmt, cx: &ScopeCx) -> DiagnosticResult<()> {
        let superclass = match self.table.superclass_of(cx.class) {
            Some(superclass) => superclass,
            None => {
                return Err(Diagnostic::bug_at(
                    format!(
                        "constructor of `{}` delegates to a superclass, but none is declared",
                        cx.class
                    ),
                    s.span.start,
                ));
            }
        };
        let Some(outer) = self.table.capture_target(superclass) else {
            if s.qualifier.is_some() {
                return Err(Diagnostic::bug_at(
                    format!(
                        "qualified delegation to `{}`, which captures no enclosing instance",
                        superclass
                    ),
                    s.span.start,
                ));
            }
            return Ok(());
        };
        let enclosing = match s.qualifier.take() {
            Some(q) => q,
            None => self.derive_enclosing(outer, &s.span, cx)?,
        };
        s.args.insert(0, enclosing);
        Ok(())
    }

    /// Qualified self references become capture-chain walks; `super`
    /// references additionally upcast the walk result to the walked class's
    /// superclass, pinning the static type member resolution sees.
    fn rewrite_self_reference(&self, expr: &mut Expr, cx: &ScopeCx) -> DiagnosticResult<()> {
        match &expr.kind {
            ExprKind::This { qualifier: Some(target) } => {
                let target = target.clone();
                let span = expr.span.clone();
                *expr = self.derive_enclosing(&target, &span, cx)?;
            }
            ExprKind::Super { qualifier } => {
                let target = qualifier.clone().unwrap_or_else(|| cx.class.to_string());
                let span = expr.span.clone();
                let walked = self.derive_enclosing(&target, &span, cx)?;
                let walked_class = match walked.ty.class_name() {
                    Some(c) => c,
                    None => {
                        return Err(Diagnostic::bug_at(
                            format!("super reference walked to non-class type `{:?}`", walked.ty),
                            span.start,
                        ));
                    }
                };
                let superclass = match self.table.superclass_of(walked_class) {
                    Some(superclass) => superclass.to_string(),
                    None => {
                        return Err(Diagnostic::bug_at(
                            format!("`{}` has no superclass to reference", walked_class),
                            span.start,
                        ));
                    }
                };
                *expr = Expr {
                    kind: ExprKind::Cast(Box::new(walked)),
                    ty: Type::Class(superclass),
                    span,
                };
            }
            _ => {}
        }
        Ok(())
    }

    /// Derives an expression evaluating to the enclosing instance of type
    /// `target`, starting from the current lexical position.
    fn derive_enclosing(&self, target: &str, span: &Span, cx: &ScopeCx) -> DiagnosticResult<Expr> {
        if !cx.has_receiver {
            return Err(Diagnostic::span_boxed(
                Severity::Error,
                format!(
                    "cannot reference an enclosing instance of `{}` from a static context",
                    target
                ),
                span.start,
            ));
        }
        let start = self.walk_start(target, span, cx)?;
        self.walk_capture_chain(start, target, span)
    }

    /// The expression a capture-chain walk begins from.
    ///
    /// Inside a constructor, a walk that has to leave the class under
    /// construction starts from the constructor's capture formal: the
    /// capture field of `this` may not be stored yet at the point the
    /// derived expression runs. A non-capturing constructor has no such
    /// formal and starts from the receiver like any method body; the walk
    /// itself then reports the missing link if the chain dead-ends.
    fn walk_start(&self, target: &str, span: &Span, cx: &ScopeCx) -> DiagnosticResult<Expr> {
        if let Some(formals) = &cx.ctor_capture
            && cx.class != target
        {
            match formals.as_slice() {
                [formal] => {
                    return Ok(Expr {
                        kind: ExprKind::Local(formal.name.clone()),
                        ty: formal.ty.clone(),
                        span: span.clone(),
                    });
                }
                [] => {
                    let captures = self
                        .table
                        .info(cx.class)
                        .is_some_and(|info| info.captures_enclosing);
                    if captures {
                        return Err(Diagnostic::bug_at(
                            format!(
                                "constructor of `{}` is missing its capture formal",
                                cx.class
                            ),
                            span.start,
                        ));
                    }
                }
                formals => {
                    return Err(Diagnostic::bug_at(
                        format!(
                            "constructor of `{}` carries {} capture formals, expected at most one",
                            cx.class,
                            formals.len()
                        ),
                        span.start,
                    ));
                }
            }
        }
        Ok(Expr {
            kind: ExprKind::This { qualifier: None },
            ty: Type::Class(cx.class.to_string()),
            span: span.clone(),
        })
    }

    /// Reads capture fields outward until the expression's static type
    /// equals `target`.
    fn walk_capture_chain(
        &self,
        start: Expr,
        target: &str,
        use_span: &Span,
    ) -> DiagnosticResult<Expr> {
        let mut expr = start;
        loop {
            let class = match expr.ty.class_name() {
                Some(c) => c.to_string(),
                None => {
                    return Err(Diagnostic::bug_at(
                        format!("capture-chain walk reached non-class type `{:?}`", expr.ty),
                        use_span.start,
                    ));
                }
            };
            if class == target {
                return Ok(expr);
            }
            let Some(outer) = self.table.capture_target(&class) else {
                return Err(Diagnostic::span_boxed(
                    Severity::Error,
                    format!("no enclosing instance of `{}` is reachable from `{}`", target, class),
                    use_span.start,
                ));
            };
            let ty = Type::Class(outer.to_string());
            let span = expr.span.clone();
            expr = Expr {
                kind: ExprKind::Field { target: Box::new(expr), name: CAPTURE_NAME.to_string() },
                ty,
                span,
            };
        }
    }
}
