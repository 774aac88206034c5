//! Statement lowering.
//!
//! Each statement lowers against the current insertion point and reports
//! whether it emitted a block terminator, so sequences stop at the first
//! `return` and enclosing constructs know when their fallthrough wiring is
//! unnecessary.

use std::collections::HashMap;

use inkwell::values::{BasicMetadataValueEnum, FunctionValue};

use kona_ast::{IfStmt, LocalDecl, Stmt, SuperCallStmt, WhileStmt};

use crate::codegen::{CodeGen, LocalsStack, ParamMap};
use crate::diagnostics::{Diagnostic, DiagnosticResult};

impl<'ctx> CodeGen<'ctx> {
    /// Lowers a statement sequence; true when the sequence ended in a
    /// terminator.
    pub fn lower_stmts(
        &self,
        stmts: &[Stmt],
        function: FunctionValue<'ctx>,
        param_map: &ParamMap,
        locals: &mut LocalsStack<'ctx>,
    ) -> DiagnosticResult<bool> {
        for stmt in stmts {
            if self.lower_stmt(stmt, function, param_map, locals)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Lowers one statement; true when it emitted a terminator on every
    /// path.
    pub fn lower_stmt(
        &self,
        stmt: &Stmt,
        function: FunctionValue<'ctx>,
        param_map: &ParamMap,
        locals: &mut LocalsStack<'ctx>,
    ) -> DiagnosticResult<bool> {
        match stmt {
            Stmt::Local(decl) => {
                self.lower_local_decl(decl, function, param_map, locals)?;
                Ok(false)
            }
            Stmt::Expr(s) => {
                self.emit_location(s.span.start);
                self.lower_expr(&s.expr, function, param_map, locals)?;
                Ok(false)
            }
            Stmt::Return(s) => {
                self.emit_location(s.span.start);
                match &s.value {
                    Some(value) => {
                        let value = self.lower_expr(value, function, param_map, locals)?;
                        let _ = self.builder.build_return(Some(&value));
                    }
                    None => {
                        let _ = self.builder.build_return(None);
                    }
                }
                Ok(true)
            }
            Stmt::If(s) => self.lower_if(s, function, param_map, locals),
            Stmt::While(s) => self.lower_while(s, function, param_map, locals),
            Stmt::Block(s) => {
                locals.push(HashMap::new());
                let terminated = self.lower_stmts(&s.stmts, function, param_map, locals)?;
                locals.pop();
                Ok(terminated)
            }
            Stmt::SuperCall(s) => {
                self.lower_super_delegation(s, function, param_map, locals)?;
                Ok(false)
            }
        }
    }

    /// Local declarations allocate at the function top and store at the
    /// lexical position.
    ///
    /// Storage has to exist on every path through the function, no matter
    /// which branches run before the declaration is reached, so the alloca
    /// is hoisted into the entry block through a scoped cursor guard. Only
    /// the initializing store stays at the declaration site, where it runs
    /// in source order.
    fn lower_local_decl(
        &self,
        decl: &LocalDecl,
        function: FunctionValue<'ctx>,
        param_map: &ParamMap,
        locals: &mut LocalsStack<'ctx>,
    ) -> DiagnosticResult<()> {
        let slot_ty = self.map_kona_type(&decl.ty)?;
        let entry = function
            .get_first_basic_block()
            .ok_or_else(|| Diagnostic::bug_at("function has no entry block", decl.span.start))?;

        let alloca = {
            let _entry_cursor = self.cursor_to_entry(function)?;
            self.emit_location(decl.span.start);
            let alloca = self
                .builder
                .build_alloca(slot_ty, &decl.name)
                .map_err(|_| Diagnostic::bug_at("build_alloca failed", decl.span.start))?;
            self.declare_local_variable(&decl.name, &decl.ty, decl.span.start, alloca, entry)?;
            alloca
        };

        if let Some(scope) = locals.last_mut() {
            scope.insert(decl.name.clone(), (alloca, slot_ty, decl.ty.clone()));
        }

        if let Some(init) = &decl.init {
            self.emit_location(init.span.start);
            let value = self.lower_expr(init, function, param_map, locals)?;
            let _ = self.builder.build_store(alloca, value);
        }
        Ok(())
    }

    fn lower_if(
        &self,
        s: &IfStmt,
        function: FunctionValue<'ctx>,
        param_map: &ParamMap,
        locals: &mut LocalsStack<'ctx>,
    ) -> DiagnosticResult<bool> {
        self.emit_location(s.span.start);
        let cond =
            self.lower_expr(&s.cond, function, param_map, locals)?.into_int_value();
        let then_bb = self.context.append_basic_block(function, "if.then");
        let else_bb = self.context.append_basic_block(function, "if.else");
        let merge_bb = self.context.append_basic_block(function, "if.merge");
        let _ = self.builder.build_conditional_branch(cond, then_bb, else_bb);

        self.builder.position_at_end(then_bb);
        locals.push(HashMap::new());
        let then_terminated = self.lower_stmt(&s.then_branch, function, param_map, locals)?;
        locals.pop();
        self.ensure_unconditional_branch(merge_bb);

        self.builder.position_at_end(else_bb);
        let else_terminated = match &s.else_branch {
            Some(alt) => {
                locals.push(HashMap::new());
                let terminated = self.lower_stmt(alt, function, param_map, locals)?;
                locals.pop();
                terminated
            }
            None => false,
        };
        self.ensure_unconditional_branch(merge_bb);

        self.builder.position_at_end(merge_bb);
        if then_terminated && else_terminated {
            // both branches already left the function
            let _ = self.builder.build_unreachable();
            return Ok(true);
        }
        Ok(false)
    }

    fn lower_while(
        &self,
        s: &WhileStmt,
        function: FunctionValue<'ctx>,
        param_map: &ParamMap,
        locals: &mut LocalsStack<'ctx>,
    ) -> DiagnosticResult<bool> {
        let cond_bb = self.context.append_basic_block(function, "loop.cond");
        let body_bb = self.context.append_basic_block(function, "loop.body");
        let after_bb = self.context.append_basic_block(function, "loop.after");
        let _ = self.builder.build_unconditional_branch(cond_bb);

        self.builder.position_at_end(cond_bb);
        self.emit_location(s.span.start);
        let cond =
            self.lower_expr(&s.cond, function, param_map, locals)?.into_int_value();
        let _ = self.builder.build_conditional_branch(cond, body_bb, after_bb);

        self.builder.position_at_end(body_bb);
        locals.push(HashMap::new());
        self.lower_stmt(&s.body, function, param_map, locals)?;
        locals.pop();
        self.ensure_unconditional_branch(cond_bb);

        self.builder.position_at_end(after_bb);
        Ok(false)
    }

    /// Constructor delegation: a direct `{Super}_init(this, args...)`
    /// call. Any qualifier was consumed by desugaring; one surviving here
    /// breaks the pipeline contract.
    fn lower_super_delegation(
        &self,
        s: &SuperCallStmt,
        function: FunctionValue<'ctx>,
        param_map: &ParamMap,
        locals: &mut LocalsStack<'ctx>,
    ) -> DiagnosticResult<()> {
        self.emit_location(s.span.start);
        if s.qualifier.is_some() {
            return Err(Diagnostic::bug_at(
                "super delegation still qualified after desugaring",
                s.span.start,
            ));
        }
        let current = self
            .current_class
            .borrow()
            .clone()
            .ok_or_else(|| Diagnostic::bug_at("super delegation outside a class body", s.span.start))?;
        let superclass = self
            .classes
            .superclass_of(&current)
            .ok_or_else(|| {
                Diagnostic::bug_at(
                    format!("class `{}` has no superclass to delegate to", current),
                    s.span.start,
                )
            })?
            .to_string();
        let init_fn = self.get_or_declare_init(&superclass)?;
        let this = function.get_nth_param(0).ok_or_else(|| {
            Diagnostic::bug_at("receiver missing in constructor body", s.span.start)
        })?;
        let mut args: Vec<BasicMetadataValueEnum> = vec![this.into()];
        for arg in &s.args {
            args.push(self.lower_expr(arg, function, param_map, locals)?.into());
        }
        self.builder
            .build_call(init_fn, &args, "")
            .map_err(|_| Diagnostic::bug_at("build_call failed for super delegation", s.span.start))?;
        Ok(())
    }
}
