//! Method emission and the per-class driver.

use std::collections::HashMap;

use inkwell::types::{BasicMetadataTypeEnum, BasicType, BasicTypeEnum};
use inkwell::values::FunctionValue;

use kona_ast::{ClassDecl, MethodDecl, Type};

use crate::classes::MethodSig;
use crate::codegen::{CodeGen, LocalsStack, ParamMap, StaticInit, StaticInitKind};
use crate::diagnostics::DiagnosticResult;

const ENTRY_METHOD: &str = "main";

/// Whether `method` fits the entry-point shape: `static main(String[])`
/// returning nothing.
fn is_entry_candidate(method: &MethodDecl) -> bool {
    method.is_static
        && method.name == ENTRY_METHOD
        && method.ret == Type::Void
        && method.params.len() == 1
        && matches!(&method.params[0].ty, Type::Array(elem) if **elem == Type::Str)
}

impl<'ctx> CodeGen<'ctx> {
    /// Emits one class: static field globals and deferred initializers
    /// first, then the constructor pair and every method.
    pub fn gen_class_ir(&self, class: &ClassDecl) -> DiagnosticResult<()> {
        *self.current_class.borrow_mut() = Some(class.name.clone());

        let mut deferred: Vec<StaticInit> = Vec::new();
        for field in &class.fields {
            if !field.is_static {
                continue;
            }
            self.static_field_global(&class.name, &field.name, &field.ty)?;
            if let Some(init) = &field.init {
                deferred.push(StaticInit {
                    class: class.name.clone(),
                    kind: StaticInitKind::Store {
                        field: field.name.clone(),
                        init: init.clone(),
                    },
                    span: field.span.clone(),
                });
            }
        }
        for block in &class.static_blocks {
            deferred.push(StaticInit {
                class: class.name.clone(),
                kind: StaticInitKind::Block { body: block.body.clone() },
                span: block.span.clone(),
            });
        }
        // field initializers and static blocks run interleaved in source
        // order; the sort is stable, so equal spans keep field-first order
        deferred.sort_by_key(|init| init.span.start);
        self.pending_inits.borrow_mut().extend(deferred);

        if let Some(ctor) = &class.ctor {
            self.gen_constructor_ir(class, ctor)?;
        }
        for method in &class.methods {
            self.gen_method_ir(class, method)?;
        }

        *self.current_class.borrow_mut() = None;
        Ok(())
    }

    /// Lowers one method to a function definition.
    ///
    /// Instance methods take the receiver as a leading `ptr` parameter;
    /// the symbol is `{Class}_{method}` and dispatch was resolved
    /// statically against the declaring class, so no vtable is involved.
    pub fn gen_method_ir(&self, class: &ClassDecl, method: &MethodDecl) -> DiagnosticResult<()> {
        let symbol = format!("{}_{}", class.name, method.name);

        // 1. Build the LLVM function type from the Kona signature.
        let mut param_types: Vec<BasicMetadataTypeEnum> = Vec::new();
        let mut param_map: ParamMap = HashMap::new();
        let mut index = 0u32;
        if !method.is_static {
            param_types.push(self.i8ptr_t.into());
            param_map.insert("this".to_string(), (0, Type::Class(class.name.clone())));
            index = 1;
        }
        for param in &method.params {
            param_types.push(self.map_kona_type(&param.ty)?.into());
            param_map.insert(param.name.clone(), (index, param.ty.clone()));
            index += 1;
        }
        let fn_ty = match &method.ret {
            Type::Void => self.context.void_type().fn_type(&param_types, false),
            ret => self.map_kona_type(ret)?.fn_type(&param_types, false),
        };

        // 2. Create the definition, reusing a forward declaration when a
        //    caller already demanded the symbol.
        let function = match self.module.get_function(&symbol) {
            Some(f) => f,
            None => self.module.add_function(&symbol, fn_ty, None),
        };
        if is_entry_candidate(method) {
            self.pending_entry_points.borrow_mut().push(function);
        }

        // 3. Entry block and debug scope, with a current location set
        //    before any instruction lands.
        let mut di_params = Vec::new();
        if !method.is_static {
            di_params.push(Type::Class(class.name.clone()));
        }
        di_params.extend(method.params.iter().map(|p| p.ty.clone()));
        self.push_function_scope(
            function,
            &symbol,
            &di_params,
            &method.ret,
            self.debug_line(method.span.start),
        )?;
        let entry = self.context.append_basic_block(function, "entry");
        self.builder.position_at_end(entry);
        self.emit_location(method.span.start);

        // 4. Lower the body.
        let mut locals: LocalsStack = vec![HashMap::new()];
        let terminated = self.lower_stmts(&method.body, function, &param_map, &mut locals)?;

        // 5. Close the function when the body fell through. Falling off a
        //    value-returning method is rejected by the front end, so that
        //    path only needs to be well formed, not reachable.
        if !terminated
            && self.builder.get_insert_block().is_none_or(|b| b.get_terminator().is_none())
        {
            match &method.ret {
                Type::Void => {
                    let _ = self.builder.build_return(None);
                }
                _ => {
                    let _ = self.builder.build_unreachable();
                }
            }
        }
        self.pop_debug_scope();
        Ok(())
    }

    /// `{Owner}_{method}`, declared from the resolved signature when the
    /// definition has not been emitted yet.
    pub fn get_or_declare_method(
        &self,
        owner: &str,
        sig: &MethodSig,
    ) -> DiagnosticResult<FunctionValue<'ctx>> {
        let symbol = format!("{}_{}", owner, sig.name);
        if let Some(function) = self.module.get_function(&symbol) {
            return Ok(function);
        }
        let mut param_types: Vec<BasicTypeEnum> = Vec::new();
        if !sig.is_static {
            param_types.push(self.i8ptr_t.into());
        }
        for ty in &sig.params {
            param_types.push(self.map_kona_type(ty)?);
        }
        let ret = match &sig.ret {
            Type::Void => None,
            ty => Some(self.map_kona_type(ty)?),
        };
        Ok(self.declare_function_if_missing(&symbol, &param_types, ret, |_| {}))
    }
}
