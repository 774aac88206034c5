//! Resolved class metadata for one compilation unit.
//!
//! The [`ClassTable`] is built once, after the capture-declaration pass has
//! finalized every class's fields and constructor signature, and is then
//! shared read-only by the substitution pass and by emission. Building it
//! up front is what makes forward references work: a constructor may
//! mention a class declared later in the unit, and by the time any rewrite
//! or lowering consults the table, every class is present.

use std::collections::HashMap;

use kona_ast::{Span, Type, Unit};

use crate::diagnostics::{Diagnostic, DiagnosticResult};

/// Byte offset of the first field slot: one header word plus one metadata
/// slot.
pub const OBJECT_FIELDS_OFFSET: u64 = 16;

/// Every field occupies one 8-byte slot regardless of its type.
pub const SLOT_SIZE: u64 = 8;

/// Signature of a declared method.
#[derive(Debug, Clone)]
pub struct MethodSig {
    pub name: String,
    pub is_static: bool,
    pub params: Vec<Type>,
    pub ret: Type,
}

/// Resolved metadata for one class.
#[derive(Debug, Clone)]
pub struct ClassInfo {
    pub enclosing: Option<String>,
    pub captures_enclosing: bool,
    pub superclass: Option<String>,
    /// Instance fields declared directly on the class, in declaration order.
    pub own_fields: Vec<(String, Type)>,
    /// Full instance layout, superclass fields first: name, type, byte
    /// offset from the object base.
    pub layout: Vec<(String, Type, u64)>,
    /// Constructor parameter types, capture formal included.
    pub ctor_params: Vec<Type>,
    pub methods: Vec<MethodSig>,
    pub span: Span,
}

/// Class metadata for a whole unit, keyed by class name.
#[derive(Debug)]
pub struct ClassTable {
    classes: HashMap<String, ClassInfo>,
}

impl ClassTable {
    /// Builds the table from a unit whose capture fields and constructors
    /// are already declared.
    ///
    /// All failures here are front-end contract breaches: duplicate class
    /// names, dangling superclass or enclosing references, inheritance or
    /// nesting cycles, a capture requirement without an enclosing class.
    pub fn build(unit: &Unit) -> DiagnosticResult<ClassTable> {
        let mut classes = HashMap::new();
        for class in &unit.classes {
            if classes.contains_key(&class.name) {
                return Err(Diagnostic::bug_at(
                    format!("duplicate class `{}` in unit", class.name),
                    class.span.start,
                ));
            }
            if class.captures_enclosing && class.enclosing.is_none() {
                return Err(Diagnostic::bug_at(
                    format!(
                        "class `{}` requires an enclosing instance but has no enclosing class",
                        class.name
                    ),
                    class.span.start,
                ));
            }
            let own_fields = class
                .fields
                .iter()
                .filter(|f| !f.is_static)
                .map(|f| (f.name.clone(), f.ty.clone()))
                .collect();
            let methods = class
                .methods
                .iter()
                .map(|m| MethodSig {
                    name: m.name.clone(),
                    is_static: m.is_static,
                    params: m.params.iter().map(|p| p.ty.clone()).collect(),
                    ret: m.ret.clone(),
                })
                .collect();
            let ctor_params = class
                .ctor
                .as_ref()
                .map(|c| c.params.iter().map(|p| p.ty.clone()).collect())
                .unwrap_or_default();
            classes.insert(
                class.name.clone(),
                ClassInfo {
                    enclosing: class.enclosing.clone(),
                    captures_enclosing: class.captures_enclosing,
                    superclass: class.superclass.clone(),
                    own_fields,
                    layout: Vec::new(),
                    ctor_params,
                    methods,
                    span: class.span.clone(),
                },
            );
        }

        // Referential integrity before any chain is walked.
        for class in &unit.classes {
            for link in [class.superclass.as_deref(), class.enclosing.as_deref()]
                .into_iter()
                .flatten()
            {
                if !classes.contains_key(link) {
                    return Err(Diagnostic::bug_at(
                        format!("class `{}` references unknown class `{}`", class.name, link),
                        class.span.start,
                    ));
                }
            }
        }

        let mut table = ClassTable { classes };
        for class in &unit.classes {
            let chain = table.super_chain(&class.name, class.span.start)?;
            let mut layout = Vec::new();
            let mut offset = OBJECT_FIELDS_OFFSET;
            for ancestor in &chain {
                if let Some(info) = table.classes.get(ancestor) {
                    for (name, ty) in &info.own_fields {
                        layout.push((name.clone(), ty.clone(), offset));
                        offset += SLOT_SIZE;
                    }
                }
            }
            if let Some(info) = table.classes.get_mut(&class.name) {
                info.layout = layout;
            }
            table.check_enclosing_chain(&class.name, class.span.start)?;
        }
        Ok(table)
    }

    /// The superclass chain of `name`, root first, `name` last.
    fn super_chain(&self, name: &str, at: usize) -> DiagnosticResult<Vec<String>> {
        let mut chain = vec![name.to_string()];
        let mut cur = name.to_string();
        while let Some(sup) = self.classes.get(&cur).and_then(|i| i.superclass.clone()) {
            if chain.contains(&sup) {
                return Err(Diagnostic::bug_at(
                    format!("inheritance cycle through class `{}`", sup),
                    at,
                ));
            }
            chain.push(sup.clone());
            cur = sup;
        }
        chain.reverse();
        Ok(chain)
    }

    fn check_enclosing_chain(&self, name: &str, at: usize) -> DiagnosticResult<()> {
        let mut seen = vec![name.to_string()];
        let mut cur = name.to_string();
        while let Some(outer) = self.classes.get(&cur).and_then(|i| i.enclosing.clone()) {
            if seen.contains(&outer) {
                return Err(Diagnostic::bug_at(
                    format!("nesting cycle through class `{}`", outer),
                    at,
                ));
            }
            seen.push(outer.clone());
            cur = outer;
        }
        Ok(())
    }

    /// Metadata for `name`, if the class exists.
    pub fn info(&self, name: &str) -> Option<&ClassInfo> {
        self.classes.get(name)
    }

    /// The class a capture-chain read off `name` lands on: its immediately
    /// enclosing class, and only when `name` actually captures it.
    pub fn capture_target(&self, name: &str) -> Option<&str> {
        self.classes
            .get(name)
            .filter(|i| i.captures_enclosing)
            .and_then(|i| i.enclosing.as_deref())
    }

    pub fn superclass_of(&self, name: &str) -> Option<&str> {
        self.classes.get(name).and_then(|i| i.superclass.as_deref())
    }

    /// Byte offset and type of a field, searching the most-derived
    /// declaration first so shadowing resolves like member lookup.
    pub fn field_offset(&self, class: &str, field: &str) -> Option<(u64, &Type)> {
        self.classes
            .get(class)?
            .layout
            .iter()
            .rev()
            .find(|(name, _, _)| name == field)
            .map(|(_, ty, off)| (*off, ty))
    }

    /// Allocation size in bytes for an instance of `class`.
    pub fn instance_size(&self, class: &str) -> Option<u64> {
        self.classes
            .get(class)
            .map(|i| OBJECT_FIELDS_OFFSET + SLOT_SIZE * i.layout.len() as u64)
    }

    /// Constructor parameter types for `class`.
    pub fn ctor_params(&self, class: &str) -> Option<&[Type]> {
        self.classes.get(class).map(|i| i.ctor_params.as_slice())
    }

    /// Resolves `method` against `class` and its superclass chain.
    ///
    /// Returns the owning class (whose symbol the call binds to) and the
    /// resolved signature.
    pub fn resolve_method(&self, class: &str, method: &str) -> Option<(&str, &MethodSig)> {
        let mut cur = class;
        loop {
            let (owner, info) = self.classes.get_key_value(cur)?;
            if let Some(sig) = info.methods.iter().find(|m| m.name == method) {
                return Some((owner.as_str(), sig));
            }
            cur = info.superclass.as_deref()?;
        }
    }
}
