//! Kona lowering core.
//!
//! Takes a fully resolved [`kona_ast::Unit`] and produces an LLVM IR
//! module for it: three desugaring rewrites (enclosing-instance capture
//! declaration and substitution, string-concatenation normalization),
//! then one emission traversal with unit-level scaffolding and
//! synchronized debug metadata. Parsing, type checking, optimization, and
//! object emission live elsewhere; this crate is the middle of the
//! toolchain.

pub mod classes;
pub mod codegen;
pub mod desugar;
pub mod diagnostics;
pub mod runtime_functions;

use inkwell::context::Context;

use kona_ast::Unit;

use crate::codegen::CodeGen;
use crate::diagnostics::{Diagnostic, emit_diagnostic};

/// Options controlling one unit's lowering.
#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Attach debug metadata (compile unit, subprograms, locations,
    /// local-variable descriptors) alongside the instructions.
    pub debug_info: bool,
    /// Target triple for the emitted module; the host triple when `None`.
    pub target_triple: Option<String>,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions { debug_info: true, target_triple: None }
    }
}

/// Lowers one unit to LLVM IR text.
///
/// Runs the desugaring pipeline and the emission traversal, rendering any
/// diagnostic to stderr before surfacing it as an error. Set
/// `KONAC_DUMP_IR` to also dump the finished module to stderr.
pub fn compile_unit(unit: &Unit, source: &str, options: &CompileOptions) -> anyhow::Result<String> {
    let mut unit = unit.clone();
    let table = desugar::run(&mut unit).map_err(|d| fail(d, &unit.path, source))?;

    let context = Context::create();
    let codegen = CodeGen::new(&context, &unit.path, source, table, options);
    codegen.emit_unit(&unit).map_err(|d| fail(d, &unit.path, source))?;

    let ir = codegen.module.print_to_string().to_string();
    if std::env::var("KONAC_DUMP_IR").is_ok() {
        eprintln!("{}", ir);
    }
    Ok(ir)
}

/// Renders a diagnostic against the unit it came from, then converts it
/// into the error callers see.
fn fail(mut d: Box<Diagnostic>, path: &str, source: &str) -> anyhow::Error {
    if d.file.is_none() {
        d.file = Some(path.to_string());
    }
    emit_diagnostic(&d, Some(source));
    anyhow::anyhow!("{}", d.message)
}
