//! Runtime function declarations.
//!
//! Everything the emitted module expects the runtime to supply is declared
//! here: the allocator eagerly at unit start, the rest lazily the first
//! time a lowering needs it. Handles are cached on the context so repeated
//! use never re-queries the module.

use inkwell::types::{BasicMetadataTypeEnum, BasicType, BasicTypeEnum};
use inkwell::values::FunctionValue;

use crate::codegen::CodeGen;
use crate::runtime_functions::names;

impl<'ctx> CodeGen<'ctx> {
    /// Declares `name` with the given signature unless the module already
    /// carries it, invoking `on_declare` only for a fresh declaration.
    pub fn declare_function_if_missing<F: FnOnce(FunctionValue<'ctx>)>(
        &self,
        name: &str,
        param_types: &[BasicTypeEnum<'ctx>],
        return_type: Option<BasicTypeEnum<'ctx>>,
        on_declare: F,
    ) -> FunctionValue<'ctx> {
        if let Some(function) = self.module.get_function(name) {
            return function;
        }
        let params: Vec<BasicMetadataTypeEnum> =
            param_types.iter().map(|ty| (*ty).into()).collect();
        let fn_ty = match return_type {
            Some(ret) => ret.fn_type(&params, false),
            None => self.context.void_type().fn_type(&params, false),
        };
        let function = self.module.add_function(name, fn_ty, None);
        on_declare(function);
        function
    }

    /// The allocator the unit-level pre-visit promises every allocation
    /// site: `ptr (i64)`.
    pub fn declare_runtime_alloc(&self) -> FunctionValue<'ctx> {
        if let Some(function) = *self.fn_gc_alloc.borrow() {
            return function;
        }
        self.declare_function_if_missing(
            names::GC_ALLOC,
            &[self.i64_t.into()],
            Some(self.i8ptr_t.into()),
            |f| {
                self.fn_gc_alloc.borrow_mut().replace(f);
            },
        )
    }

    /// Concatenation of two runtime strings: `ptr (ptr, ptr)`.
    pub fn get_str_concat(&self) -> FunctionValue<'ctx> {
        if let Some(function) = *self.fn_str_concat.borrow() {
            return function;
        }
        self.declare_function_if_missing(
            names::STR_CONCAT,
            &[self.i8ptr_t.into(), self.i8ptr_t.into()],
            Some(self.i8ptr_t.into()),
            |f| {
                self.fn_str_concat.borrow_mut().replace(f);
            },
        )
    }

    /// Decimal rendering of an integer: `ptr (i64)`.
    pub fn get_int_to_string(&self) -> FunctionValue<'ctx> {
        if let Some(function) = *self.fn_int_to_string.borrow() {
            return function;
        }
        self.declare_function_if_missing(
            names::INT_TO_STRING,
            &[self.i64_t.into()],
            Some(self.i8ptr_t.into()),
            |f| {
                self.fn_int_to_string.borrow_mut().replace(f);
            },
        )
    }

    /// Shortest round-trip rendering of a float: `ptr (double)`.
    pub fn get_f64_to_string(&self) -> FunctionValue<'ctx> {
        if let Some(function) = *self.fn_f64_to_string.borrow() {
            return function;
        }
        self.declare_function_if_missing(
            names::F64_TO_STRING,
            &[self.f64_t.into()],
            Some(self.i8ptr_t.into()),
            |f| {
                self.fn_f64_to_string.borrow_mut().replace(f);
            },
        )
    }

    /// `"true"` or `"false"`: `ptr (i1)`.
    pub fn get_bool_to_string(&self) -> FunctionValue<'ctx> {
        if let Some(function) = *self.fn_bool_to_string.borrow() {
            return function;
        }
        self.declare_function_if_missing(
            names::BOOL_TO_STRING,
            &[self.bool_t.into()],
            Some(self.i8ptr_t.into()),
            |f| {
                self.fn_bool_to_string.borrow_mut().replace(f);
            },
        )
    }

    /// Rendering of a runtime array: `ptr (ptr)`.
    pub fn get_array_to_string(&self) -> FunctionValue<'ctx> {
        if let Some(function) = *self.fn_array_to_string.borrow() {
            return function;
        }
        self.declare_function_if_missing(
            names::ARRAY_TO_STRING,
            &[self.i8ptr_t.into()],
            Some(self.i8ptr_t.into()),
            |f| {
                self.fn_array_to_string.borrow_mut().replace(f);
            },
        )
    }

    /// Packages the process argument vector into a runtime string array
    /// for the designated entry method: `ptr (i32, ptr)`.
    pub fn get_args_new(&self) -> FunctionValue<'ctx> {
        if let Some(function) = *self.fn_args_new.borrow() {
            return function;
        }
        self.declare_function_if_missing(
            names::ARGS_NEW,
            &[self.i32_t.into(), self.i8ptr_t.into()],
            Some(self.i8ptr_t.into()),
            |f| {
                self.fn_args_new.borrow_mut().replace(f);
            },
        )
    }
}
