//! AST desugaring passes.
//!
//! Lowering runs three whole-unit rewrites in a fixed order before any IR
//! is emitted:
//!
//! 1. capture declaration ([`enclosing::declare_captures`]), which gives
//!    every capture-requiring nested class its capture field and
//!    constructor formal;
//! 2. capture substitution ([`enclosing::substitute_captures`]), which
//!    threads enclosing instances through constructions, superclass
//!    delegations, and qualified self references;
//! 3. string-concatenation normalization ([`strings::normalize_concat`]).
//!
//! The declaration pass must finish for the whole unit before substitution
//! starts: a construction expression may textually precede the class it
//! constructs, and the substituter consults the constructed class's
//! post-declaration shape. The [`ClassTable`] is therefore built between
//! the two passes, and returned so emission reuses the same resolved view.

pub mod enclosing;
pub mod strings;

use kona_ast::Unit;

use crate::classes::ClassTable;
use crate::diagnostics::DiagnosticResult;

/// Runs every desugaring pass over `unit`, in order.
pub fn run(unit: &mut Unit) -> DiagnosticResult<ClassTable> {
    enclosing::declare_captures(unit)?;
    let table = ClassTable::build(unit)?;
    enclosing::substitute_captures(unit, &table)?;
    strings::normalize_concat(unit)?;
    Ok(table)
}
