//! LLVM IR generation for desugared Kona units.
//!
//! [`CodeGen`] is the translation context threaded through every emission
//! step: it owns the module and builder, caches LLVM types and runtime
//! function handles, interns string literals, and accumulates the pending
//! entry points and static initializers the unit-final scaffolding
//! consumes. Emission assumes a desugared, type-correct tree; anything
//! that breaks that contract surfaces as a [`Severity::Bug`] diagnostic,
//! never as a recoverable source error.

pub mod debug;
pub mod emit;
pub mod expr;
pub mod runtime_decls;
pub mod stmt;
pub mod unit;

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use inkwell::AddressSpace;
use inkwell::basic_block::BasicBlock;
use inkwell::builder::Builder;
use inkwell::context::Context;
use inkwell::module::{Linkage, Module};
use inkwell::targets::{TargetMachine, TargetTriple};
use inkwell::types::{BasicTypeEnum, FloatType, IntType, PointerType, StructType};
use inkwell::values::{FunctionValue, PointerValue};

use kona_ast::Type;

use crate::classes::ClassTable;
use crate::codegen::debug::DebugInfo;
use crate::diagnostics::{Diagnostic, DiagnosticResult, Severity};
use crate::CompileOptions;

/// A deferred static initializer, registered per class in source order:
/// field initializers interleave with static blocks by span.
#[derive(Debug, Clone)]
pub struct StaticInit {
    pub class: String,
    pub kind: StaticInitKind,
    pub span: kona_ast::Span,
}

/// What one initializer-table entry does when its thunk runs.
#[derive(Debug, Clone)]
pub enum StaticInitKind {
    /// Evaluate a field's initializer and store it to the field's global.
    Store { field: String, init: kona_ast::Expr },
    /// Run a `static { ... }` block body.
    Block { body: Vec<kona_ast::Stmt> },
}

/// One local's storage: the stack slot, its LLVM type, and the Kona type
/// it was declared with.
pub type LocalEntry<'ctx> = (PointerValue<'ctx>, BasicTypeEnum<'ctx>, Type);

/// Scoped name-to-storage maps for the function being lowered; inner
/// scopes shadow outer ones.
pub type LocalsStack<'ctx> = Vec<HashMap<String, LocalEntry<'ctx>>>;

/// Parameter name to (index, Kona type) for the function being lowered.
pub type ParamMap = HashMap<String, (u32, Type)>;

pub struct CodeGen<'ctx> {
    pub context: &'ctx Context,
    pub module: Module<'ctx>,
    pub builder: Builder<'ctx>,

    // frequently used LLVM types, cached once
    pub i64_t: IntType<'ctx>,
    pub i32_t: IntType<'ctx>,
    pub f64_t: FloatType<'ctx>,
    pub bool_t: IntType<'ctx>,
    pub i8ptr_t: PointerType<'ctx>,

    /// Uniform array representation, set up by the unit pre-visit.
    pub array_t: Cell<Option<StructType<'ctx>>>,

    // interned string literals and the counter naming their globals
    pub string_literals: RefCell<HashMap<String, PointerValue<'ctx>>>,
    pub next_str_id: Cell<u32>,

    // runtime function handles, declared on first use
    pub fn_gc_alloc: RefCell<Option<FunctionValue<'ctx>>>,
    pub fn_str_concat: RefCell<Option<FunctionValue<'ctx>>>,
    pub fn_int_to_string: RefCell<Option<FunctionValue<'ctx>>>,
    pub fn_f64_to_string: RefCell<Option<FunctionValue<'ctx>>>,
    pub fn_bool_to_string: RefCell<Option<FunctionValue<'ctx>>>,
    pub fn_array_to_string: RefCell<Option<FunctionValue<'ctx>>>,
    pub fn_args_new: RefCell<Option<FunctionValue<'ctx>>>,

    /// Class whose members are currently being lowered.
    pub current_class: RefCell<Option<String>>,

    /// Entry-point candidates in traversal order; the unit-final hook
    /// wires the first one.
    pub pending_entry_points: RefCell<Vec<FunctionValue<'ctx>>>,
    /// Deferred static initializers, in registration order.
    pub pending_inits: RefCell<Vec<StaticInit>>,

    /// Resolved class metadata for the unit.
    pub classes: ClassTable,
    /// Unit source text, for line and column mapping.
    pub source: &'ctx str,
    /// Debug-info state; `None` when debug emission is disabled.
    pub debug: Option<DebugInfo<'ctx>>,
}

impl<'ctx> CodeGen<'ctx> {
    /// Creates the translation context for one unit.
    pub fn new(
        context: &'ctx Context,
        unit_path: &str,
        source: &'ctx str,
        classes: ClassTable,
        options: &CompileOptions,
    ) -> CodeGen<'ctx> {
        let module = context.create_module(unit_path);
        match &options.target_triple {
            Some(triple) => module.set_triple(&TargetTriple::create(triple)),
            None => module.set_triple(&TargetMachine::get_default_triple()),
        }
        let builder = context.create_builder();
        let debug = if options.debug_info {
            Some(DebugInfo::new(context, &module, unit_path))
        } else {
            None
        };
        CodeGen {
            context,
            module,
            builder,
            i64_t: context.i64_type(),
            i32_t: context.i32_type(),
            f64_t: context.f64_type(),
            bool_t: context.bool_type(),
            i8ptr_t: context.ptr_type(AddressSpace::default()),
            array_t: Cell::new(None),
            string_literals: RefCell::new(HashMap::new()),
            next_str_id: Cell::new(0),
            fn_gc_alloc: RefCell::new(None),
            fn_str_concat: RefCell::new(None),
            fn_int_to_string: RefCell::new(None),
            fn_f64_to_string: RefCell::new(None),
            fn_bool_to_string: RefCell::new(None),
            fn_array_to_string: RefCell::new(None),
            fn_args_new: RefCell::new(None),
            current_class: RefCell::new(None),
            pending_entry_points: RefCell::new(Vec::new()),
            pending_inits: RefCell::new(Vec::new()),
            classes,
            source,
            debug,
        }
    }

    /// Maps a Kona value type onto its LLVM ABI type. References of every
    /// kind are opaque pointers at this level.
    pub fn map_kona_type(&self, ty: &Type) -> DiagnosticResult<BasicTypeEnum<'ctx>> {
        Ok(match ty {
            Type::Int => self.i64_t.into(),
            Type::Float => self.f64_t.into(),
            Type::Bool => self.bool_t.into(),
            Type::Str | Type::Null | Type::Class(_) | Type::Array(_) => self.i8ptr_t.into(),
            Type::Void => {
                return Err(Diagnostic::bug("void used in value position"));
            }
        })
    }

    /// Adds a branch to `target` when the current block has no terminator.
    pub fn ensure_unconditional_branch(&self, target: BasicBlock<'ctx>) {
        if let Some(current) = self.builder.get_insert_block()
            && current.get_terminator().is_none()
        {
            let _ = self.builder.build_unconditional_branch(target);
        }
    }

    /// Moves the cursor into `function`'s entry block, immediately before
    /// its terminator when one exists, returning a guard that restores the
    /// previous position when dropped.
    pub fn cursor_to_entry(
        &self,
        function: FunctionValue<'ctx>,
    ) -> DiagnosticResult<EntryCursor<'ctx, '_>> {
        let saved = self
            .builder
            .get_insert_block()
            .ok_or_else(|| Diagnostic::bug("cursor repositioning requested with no active block"))?;
        let entry = function
            .get_first_basic_block()
            .ok_or_else(|| Diagnostic::bug("function has no entry block"))?;
        match entry.get_terminator() {
            Some(terminator) => self.builder.position_before(&terminator),
            None => self.builder.position_at_end(entry),
        }
        Ok(EntryCursor { builder: &self.builder, saved })
    }

    /// Address `offset` bytes past the object `base` points at.
    pub fn offset_ptr(
        &self,
        base: PointerValue<'ctx>,
        offset: u64,
        name: &str,
    ) -> DiagnosticResult<PointerValue<'ctx>> {
        let base_int = self
            .builder
            .build_ptr_to_int(base, self.i64_t, "addr")
            .map_err(|_| Diagnostic::simple_boxed(Severity::Bug, "ptr_to_int failed"))?;
        let with_offset = self
            .builder
            .build_int_add(base_int, self.i64_t.const_int(offset, false), "addr.off")
            .map_err(|_| Diagnostic::simple_boxed(Severity::Bug, "offset add failed"))?;
        self.builder
            .build_int_to_ptr(with_offset, self.i8ptr_t, name)
            .map_err(|_| Diagnostic::simple_boxed(Severity::Bug, "int_to_ptr failed"))
    }

    /// Returns a pointer to the interned bytes of `value`, creating the
    /// backing global on first use.
    ///
    /// Literals are module-private constants shaped like runtime strings
    /// (header word, length word, NUL-terminated bytes) with the static
    /// bit set in the header so the collector never scans or frees them.
    pub fn intern_string_literal(&self, value: &str) -> DiagnosticResult<PointerValue<'ctx>> {
        if let Some(ptr) = self.string_literals.borrow().get(value) {
            return Ok(*ptr);
        }
        let id = self.next_str_id.get();
        self.next_str_id.set(id.wrapping_add(1));

        let bytes = value.as_bytes();
        let data = self.context.const_string(bytes, true);
        // static bit lives in the upper half of the header word
        let header = self.i64_t.const_int(1u64 << 32, false);
        let len = self.i64_t.const_int(bytes.len() as u64, false);
        let initializer =
            self.context.const_struct(&[header.into(), len.into(), data.into()], false);

        let global =
            self.module.add_global(initializer.get_type(), None, &format!("strlit.{}", id));
        global.set_initializer(&initializer);
        global.set_constant(true);
        global.set_linkage(Linkage::Private);

        // constant-folds to a constant expression, so the result is safe
        // to reuse across functions
        let zero = self.i32_t.const_zero();
        let two = self.i32_t.const_int(2, false);
        let ptr = unsafe {
            self.builder.build_gep(
                initializer.get_type(),
                global.as_pointer_value(),
                &[zero, two],
                "strptr",
            )
        }
        .map_err(|_| Diagnostic::simple_boxed(Severity::Bug, "string literal gep failed"))?;
        self.string_literals.borrow_mut().insert(value.to_string(), ptr);
        Ok(ptr)
    }
}

/// Scoped repositioning of the insertion cursor into a function's entry
/// block. Restores the saved position on drop, so hoisted allocas cannot
/// leave the builder misplaced on any exit path.
pub struct EntryCursor<'ctx, 'b> {
    builder: &'b Builder<'ctx>,
    saved: BasicBlock<'ctx>,
}

impl Drop for EntryCursor<'_, '_> {
    fn drop(&mut self) {
        self.builder.position_at_end(self.saved);
    }
}
