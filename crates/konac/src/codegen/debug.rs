//! Debug-metadata synchronization.
//!
//! Emission keeps LLVM debug info in lockstep with instruction output: one
//! compile unit and file per module, a subprogram for every generated
//! function (entry trampoline and initializer thunks included), a declare
//! record for every hoisted local, and a current location refreshed
//! whenever the cursor moves to a new source position. All of it hangs off
//! [`DebugInfo`]; when debug emission is disabled the [`CodeGen`] carries
//! `None` and every hook below turns into a no-op.

use std::cell::RefCell;
use std::path::Path;

use inkwell::basic_block::BasicBlock;
use inkwell::context::Context;
use inkwell::debug_info::{
    AsDIScope, DICompileUnit, DIFile, DIFlags, DIFlagsConstants, DIScope, DIType,
    DWARFEmissionKind, DWARFSourceLanguage, DebugInfoBuilder,
};
use inkwell::module::{FlagBehavior, Module};
use inkwell::values::{FunctionValue, PointerValue};

use kona_ast::Type;

use crate::codegen::CodeGen;
use crate::diagnostics::{Diagnostic, DiagnosticResult, Severity, line_col};

// DWARF base type encodings
const DW_ATE_ADDRESS: u32 = 0x01;
const DW_ATE_BOOLEAN: u32 = 0x02;
const DW_ATE_FLOAT: u32 = 0x04;
const DW_ATE_SIGNED: u32 = 0x05;

/// Per-module debug-info state.
pub struct DebugInfo<'ctx> {
    pub builder: DebugInfoBuilder<'ctx>,
    pub compile_unit: DICompileUnit<'ctx>,
    pub file: DIFile<'ctx>,
    /// Innermost-last stack of live lexical scopes.
    scopes: RefCell<Vec<DIScope<'ctx>>>,
}

impl<'ctx> DebugInfo<'ctx> {
    /// Creates the builder, compile unit, and file for one module and
    /// stamps the module flag debug consumers require.
    pub fn new(context: &'ctx Context, module: &Module<'ctx>, unit_path: &str) -> DebugInfo<'ctx> {
        let path = Path::new(unit_path);
        let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or(unit_path);
        let directory = path
            .parent()
            .and_then(|p| p.to_str())
            .filter(|p| !p.is_empty())
            .unwrap_or(".");
        let (builder, compile_unit) = module.create_debug_info_builder(
            true,
            // no DWARF language code exists for Kona
            DWARFSourceLanguage::C,
            file_name,
            directory,
            "konac",
            false,
            "",
            0,
            "",
            DWARFEmissionKind::Full,
            0,
            false,
            false,
            "",
            "",
        );
        let file = compile_unit.get_file();
        module.add_basic_value_flag(
            "Debug Info Version",
            FlagBehavior::Warning,
            context.i32_type().const_int(3, false),
        );
        DebugInfo { builder, compile_unit, file, scopes: RefCell::new(Vec::new()) }
    }

    /// Innermost live scope, falling back to the compile unit.
    fn current_scope(&self) -> DIScope<'ctx> {
        self.scopes
            .borrow()
            .last()
            .copied()
            .unwrap_or_else(|| self.compile_unit.as_debug_info_scope())
    }
}

impl<'ctx> CodeGen<'ctx> {
    /// DWARF type for a Kona value type; `None` for void.
    pub fn debug_type(&self, ty: &Type) -> DiagnosticResult<Option<DIType<'ctx>>> {
        let Some(di) = &self.debug else {
            return Ok(None);
        };
        let basic = match ty {
            Type::Void => return Ok(None),
            Type::Int => di.builder.create_basic_type("int", 64, DW_ATE_SIGNED, DIFlags::PUBLIC),
            Type::Float => di.builder.create_basic_type("float", 64, DW_ATE_FLOAT, DIFlags::PUBLIC),
            Type::Bool => di.builder.create_basic_type("bool", 8, DW_ATE_BOOLEAN, DIFlags::PUBLIC),
            // reference types are opaque addresses at this level
            _ => di.builder.create_basic_type("ptr", 64, DW_ATE_ADDRESS, DIFlags::PUBLIC),
        }
        .map_err(|e| {
            Diagnostic::simple_boxed(Severity::Bug, format!("debug type creation failed: {}", e))
        })?;
        Ok(Some(basic.as_type()))
    }

    /// Creates and pushes the subprogram scope for a function definition.
    /// Generated functions with no source anchor pass line 0.
    pub fn push_function_scope(
        &self,
        function: FunctionValue<'ctx>,
        name: &str,
        params: &[Type],
        ret: &Type,
        line: u32,
    ) -> DiagnosticResult<()> {
        let Some(di) = &self.debug else {
            return Ok(());
        };
        let ret_ty = self.debug_type(ret)?;
        let mut param_tys = Vec::with_capacity(params.len());
        for param in params {
            if let Some(ty) = self.debug_type(param)? {
                param_tys.push(ty);
            }
        }
        let subroutine =
            di.builder.create_subroutine_type(di.file, ret_ty, &param_tys, DIFlags::PUBLIC);
        let subprogram = di.builder.create_function(
            di.compile_unit.as_debug_info_scope(),
            name,
            None,
            di.file,
            line,
            subroutine,
            true,
            true,
            line,
            DIFlags::PUBLIC,
            false,
        );
        function.set_subprogram(subprogram);
        di.scopes.borrow_mut().push(subprogram.as_debug_info_scope());
        Ok(())
    }

    /// Pops the innermost debug scope.
    pub fn pop_debug_scope(&self) {
        if let Some(di) = &self.debug {
            di.scopes.borrow_mut().pop();
        }
    }

    /// Points the builder's current location at `offset`, so every
    /// instruction emitted from here on carries it.
    pub fn emit_location(&self, offset: usize) {
        if let Some(di) = &self.debug {
            let (line, col) = line_col(self.source, offset);
            let location = di.builder.create_debug_location(
                self.context,
                line as u32,
                col as u32 + 1,
                di.current_scope(),
                None,
            );
            self.builder.set_current_debug_location(location);
        }
    }

    /// Line number (1-based) for a source offset.
    pub fn debug_line(&self, offset: usize) -> u32 {
        line_col(self.source, offset).0 as u32
    }

    /// Attaches a local-variable descriptor to its entry-block storage.
    /// The declare record lands in `block` next to the alloca it
    /// describes, before the terminator when the block already has one.
    pub fn declare_local_variable(
        &self,
        name: &str,
        ty: &Type,
        offset: usize,
        storage: PointerValue<'ctx>,
        block: BasicBlock<'ctx>,
    ) -> DiagnosticResult<()> {
        let Some(di) = &self.debug else {
            return Ok(());
        };
        let Some(var_ty) = self.debug_type(ty)? else {
            return Ok(());
        };
        let (line, col) = line_col(self.source, offset);
        let scope = di.current_scope();
        let variable = di.builder.create_auto_variable(
            scope,
            name,
            di.file,
            line as u32,
            var_ty,
            true,
            DIFlags::ZERO,
            0,
        );
        let location =
            di.builder.create_debug_location(self.context, line as u32, col as u32 + 1, scope, None);
        let expression = di.builder.create_expression(vec![]);
        match block.get_terminator() {
            Some(terminator) => {
                let _ = di.builder.insert_declare_before_instruction(
                    storage,
                    Some(variable),
                    Some(expression),
                    location,
                    terminator,
                );
            }
            None => {
                let _ = di.builder.insert_declare_at_end(
                    storage,
                    Some(variable),
                    Some(expression),
                    location,
                    block,
                );
            }
        }
        Ok(())
    }

    /// Resolves forward metadata references once the unit is fully
    /// emitted. Must run after the last instruction.
    pub fn finalize_debug_info(&self) {
        if let Some(di) = &self.debug {
            di.builder.finalize();
        }
    }
}
