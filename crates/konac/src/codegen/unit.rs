//! Unit-level emission: pre-visit declarations and the unit-final
//! scaffolding.
//!
//! The pre-visit puts the module-scoped prerequisites in place before any
//! class body is lowered; the final hook runs after every class and wires
//! the pieces only a whole-unit view can decide: which collected entry
//! point gets the process trampoline, and whether a static-initializer
//! table is emitted at all.

use std::collections::HashMap;

use inkwell::module::Linkage;
use inkwell::types::BasicTypeEnum;
use inkwell::values::{FunctionValue, PointerValue};

use kona_ast::{Type, Unit};

use crate::codegen::{CodeGen, LocalsStack, ParamMap, StaticInitKind};
use crate::diagnostics::{Diagnostic, DiagnosticResult};
use crate::runtime_functions::names;

impl<'ctx> CodeGen<'ctx> {
    /// Emits the whole unit: pre-visit declarations, every class, then the
    /// unit-final scaffolding.
    pub fn emit_unit(&self, unit: &Unit) -> DiagnosticResult<()> {
        self.begin_unit();
        for class in &unit.classes {
            self.gen_class_ir(class)?;
        }
        self.finish_unit()
    }

    /// Pre-visit hook: the runtime allocator and the uniform array type,
    /// module-scoped declarations every class body may rely on.
    pub fn begin_unit(&self) {
        self.declare_runtime_alloc();
        let array_t = self.context.opaque_struct_type("kona.array");
        array_t.set_body(
            &[
                self.i64_t.into(),
                self.i64_t.into(),
                self.context.i8_type().array_type(0).into(),
            ],
            false,
        );
        self.array_t.set(Some(array_t));
    }

    /// Final hook: wire the first collected entry point to the process
    /// trampoline, then materialize the static-initializer table.
    pub fn finish_unit(&self) -> DiagnosticResult<()> {
        let entry = self.pending_entry_points.borrow().first().copied();
        if let Some(entry_fn) = entry {
            self.emit_entry_trampoline(entry_fn)?;
        }
        self.emit_static_init_table()?;
        self.finalize_debug_info();
        Ok(())
    }

    /// `main(i32, ptr) -> i32`, adapting the process argument vector into
    /// the string array the designated entry method expects. The exit code
    /// is a constant zero; runtime aborts bypass this return entirely.
    fn emit_entry_trampoline(&self, entry_fn: FunctionValue<'ctx>) -> DiagnosticResult<()> {
        let fn_ty = self.i32_t.fn_type(&[self.i32_t.into(), self.i8ptr_t.into()], false);
        let trampoline = self.module.add_function(names::ENTRY, fn_ty, None);
        self.push_function_scope(
            trampoline,
            names::ENTRY,
            &[Type::Int, Type::Array(Box::new(Type::Str))],
            &Type::Int,
            0,
        )?;
        let body = self.context.append_basic_block(trampoline, "entry");
        self.builder.position_at_end(body);
        self.emit_location(0);

        let argc = trampoline
            .get_nth_param(0)
            .ok_or_else(|| Diagnostic::bug("trampoline lost its argc parameter"))?;
        let argv = trampoline
            .get_nth_param(1)
            .ok_or_else(|| Diagnostic::bug("trampoline lost its argv parameter"))?;
        let args = self
            .builder
            .build_call(self.get_args_new(), &[argc.into(), argv.into()], "args")
            .map_err(|_| Diagnostic::bug("build_call failed for argument packaging"))?
            .try_as_basic_value()
            .left()
            .ok_or_else(|| Diagnostic::bug("argument packaging produced no value"))?;
        self.builder
            .build_call(entry_fn, &[args.into()], "")
            .map_err(|_| Diagnostic::bug("build_call failed for entry invocation"))?;
        let _ = self.builder.build_return(Some(&self.i32_t.const_zero()));
        self.pop_debug_scope();
        Ok(())
    }

    /// Deferred static initializers become private thunks referenced from
    /// one appending `llvm.global_ctors` array, priorities following
    /// registration order so cross-class initializers observe declaration
    /// order. Units with no static state to set up get no table at all.
    fn emit_static_init_table(&self) -> DiagnosticResult<()> {
        let inits = self.pending_inits.take();
        if inits.is_empty() {
            return Ok(());
        }
        let entry_ty = self.context.struct_type(
            &[self.i32_t.into(), self.i8ptr_t.into(), self.i8ptr_t.into()],
            false,
        );
        let thunk_ty = self.context.void_type().fn_type(&[], false);
        let mut entries = Vec::with_capacity(inits.len());
        for (index, pending) in inits.iter().enumerate() {
            let name = format!("sinit.{}", index);
            let thunk = self.module.add_function(&name, thunk_ty, Some(Linkage::Private));
            self.push_function_scope(
                thunk,
                &name,
                &[],
                &Type::Void,
                self.debug_line(pending.span.start),
            )?;
            let body = self.context.append_basic_block(thunk, "entry");
            self.builder.position_at_end(body);
            self.emit_location(pending.span.start);

            let mut locals: LocalsStack = vec![HashMap::new()];
            let terminated = match &pending.kind {
                StaticInitKind::Store { field, init } => {
                    let global = self.static_field_global(&pending.class, field, &init.ty)?;
                    let value = self.lower_expr(init, thunk, &ParamMap::new(), &mut locals)?;
                    let _ = self.builder.build_store(global, value);
                    false
                }
                StaticInitKind::Block { body } => {
                    self.lower_stmts(body, thunk, &ParamMap::new(), &mut locals)?
                }
            };
            if !terminated {
                let _ = self.builder.build_return(None);
            }
            self.pop_debug_scope();

            let priority = self.i32_t.const_int(index as u64, false);
            let fn_ptr = thunk.as_global_value().as_pointer_value();
            let data = self.i8ptr_t.const_null();
            entries.push(self.context.const_struct(
                &[priority.into(), fn_ptr.into(), data.into()],
                false,
            ));
        }
        let table = entry_ty.const_array(&entries);
        let global = self.module.add_global(
            entry_ty.array_type(entries.len() as u32),
            None,
            names::INIT_TABLE,
        );
        global.set_linkage(Linkage::Appending);
        global.set_initializer(&table);
        Ok(())
    }

    /// The module global backing `Class.field`, created zeroed on first
    /// use so forward references and the initializer thunks agree on one
    /// definition.
    pub fn static_field_global(
        &self,
        class: &str,
        field: &str,
        ty: &Type,
    ) -> DiagnosticResult<PointerValue<'ctx>> {
        let name = format!("{}_{}", class, field);
        if let Some(global) = self.module.get_global(&name) {
            return Ok(global.as_pointer_value());
        }
        let llvm_ty = self.map_kona_type(ty)?;
        let global = self.module.add_global(llvm_ty, None, &name);
        match llvm_ty {
            BasicTypeEnum::IntType(t) => global.set_initializer(&t.const_zero()),
            BasicTypeEnum::FloatType(t) => global.set_initializer(&t.const_zero()),
            BasicTypeEnum::PointerType(t) => global.set_initializer(&t.const_null()),
            other => {
                return Err(Diagnostic::bug(format!("unsupported static field type {:?}", other)));
            }
        }
        Ok(global.as_pointer_value())
    }
}
