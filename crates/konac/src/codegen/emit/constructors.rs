//! Constructor emission and the per-class layout artifacts.
//!
//! Each constructor lowers to a pair of functions. `{Class}_init` runs the
//! constructor body against an already-allocated receiver, which is what
//! lets a subclass delegate without re-allocating. `{Class}_ctor` is the
//! allocation wrapper construction expressions call: allocate, stamp the
//! header and field-map words, zero the field slots, then hand off to
//! `{Class}_init`.
//!
//! Instances lay out as an 8-byte header word, an 8-byte metadata word,
//! then one 8-byte slot per field, superclass fields first.

use std::collections::HashMap;

use inkwell::types::{BasicMetadataTypeEnum, BasicTypeEnum};
use inkwell::values::{BasicMetadataValueEnum, FunctionValue};

use kona_ast::{ClassDecl, CtorDecl, Type};

use crate::classes::SLOT_SIZE;
use crate::codegen::{CodeGen, LocalsStack, ParamMap};
use crate::diagnostics::{Diagnostic, DiagnosticResult};

impl<'ctx> CodeGen<'ctx> {
    /// Emits the `{Class}_ctor` and `{Class}_init` pair for one
    /// constructor, plus the class's field map when it has one.
    pub fn gen_constructor_ir(&self, class: &ClassDecl, ctor: &CtorDecl) -> DiagnosticResult<()> {
        self.emit_field_map(class)?;
        self.gen_init_function(class, ctor)?;
        self.gen_ctor_wrapper(class, ctor)
    }

    /// `{Class}_init(this, params...)`: the constructor body. Superclass
    /// delegation lands here as a direct `{Super}_init` call.
    fn gen_init_function(&self, class: &ClassDecl, ctor: &CtorDecl) -> DiagnosticResult<()> {
        let symbol = format!("{}_init", class.name);
        let mut param_types: Vec<BasicMetadataTypeEnum> = vec![self.i8ptr_t.into()];
        let mut param_map: ParamMap = HashMap::new();
        param_map.insert("this".to_string(), (0, Type::Class(class.name.clone())));
        for (i, param) in ctor.params.iter().enumerate() {
            param_types.push(self.map_kona_type(&param.ty)?.into());
            param_map.insert(param.name.clone(), (i as u32 + 1, param.ty.clone()));
        }
        let fn_ty = self.context.void_type().fn_type(&param_types, false);
        let function = match self.module.get_function(&symbol) {
            Some(f) => f,
            None => self.module.add_function(&symbol, fn_ty, None),
        };

        let mut di_params = vec![Type::Class(class.name.clone())];
        di_params.extend(ctor.params.iter().map(|p| p.ty.clone()));
        self.push_function_scope(
            function,
            &symbol,
            &di_params,
            &Type::Void,
            self.debug_line(ctor.span.start),
        )?;
        let entry = self.context.append_basic_block(function, "entry");
        self.builder.position_at_end(entry);
        self.emit_location(ctor.span.start);

        let mut locals: LocalsStack = vec![HashMap::new()];
        let terminated = self.lower_stmts(&ctor.body, function, &param_map, &mut locals)?;
        if !terminated
            && self.builder.get_insert_block().is_none_or(|b| b.get_terminator().is_none())
        {
            let _ = self.builder.build_return(None);
        }
        self.pop_debug_scope();
        Ok(())
    }

    /// `{Class}_ctor(params...) -> ptr`: allocate, stamp the header and
    /// field-map words, zero every slot, then delegate to `{Class}_init`.
    fn gen_ctor_wrapper(&self, class: &ClassDecl, ctor: &CtorDecl) -> DiagnosticResult<()> {
        let symbol = format!("{}_ctor", class.name);
        let mut param_types: Vec<BasicMetadataTypeEnum> = Vec::with_capacity(ctor.params.len());
        for param in &ctor.params {
            param_types.push(self.map_kona_type(&param.ty)?.into());
        }
        let fn_ty = self.i8ptr_t.fn_type(&param_types, false);
        let function = match self.module.get_function(&symbol) {
            Some(f) => f,
            None => self.module.add_function(&symbol, fn_ty, None),
        };

        let di_params: Vec<Type> = ctor.params.iter().map(|p| p.ty.clone()).collect();
        self.push_function_scope(
            function,
            &symbol,
            &di_params,
            &Type::Class(class.name.clone()),
            self.debug_line(ctor.span.start),
        )?;
        let entry = self.context.append_basic_block(function, "entry");
        self.builder.position_at_end(entry);
        self.emit_location(ctor.span.start);

        // 1. Allocate the instance.
        let size = self
            .classes
            .instance_size(&class.name)
            .ok_or_else(|| Diagnostic::bug(format!("no layout for class `{}`", class.name)))?;
        let object = self
            .builder
            .build_call(
                self.declare_runtime_alloc(),
                &[self.i64_t.const_int(size, false).into()],
                "obj",
            )
            .map_err(|_| Diagnostic::bug("build_call failed for allocation"))?
            .try_as_basic_value()
            .left()
            .ok_or_else(|| Diagnostic::bug("allocator returned no value"))?
            .into_pointer_value();

        // 2. Header word: tag of 1 marks a live heap object.
        let _ = self.builder.build_store(object, self.i64_t.const_int(1, false));

        // 3. Field-map pointer in the metadata word when the class has a
        //    map; classes without pointer fields leave the word zeroed by
        //    the allocator.
        if let Some(map) = self.module.get_global(&format!("{}_field_map", class.name)) {
            let addr = self.offset_ptr(object, SLOT_SIZE, "meta.addr")?;
            let _ = self.builder.build_store(addr, map.as_pointer_value());
        }

        // 4. Zero every field slot, so a collection triggered mid-body
        //    only ever scans valid pointers.
        if let Some(info) = self.classes.info(&class.name) {
            for (_, field_ty, offset) in &info.layout {
                let addr = self.offset_ptr(object, *offset, "slot.addr")?;
                match self.map_kona_type(field_ty)? {
                    BasicTypeEnum::IntType(t) => {
                        let _ = self.builder.build_store(addr, t.const_zero());
                    }
                    BasicTypeEnum::FloatType(t) => {
                        let _ = self.builder.build_store(addr, t.const_zero());
                    }
                    BasicTypeEnum::PointerType(t) => {
                        let _ = self.builder.build_store(addr, t.const_null());
                    }
                    other => {
                        return Err(Diagnostic::bug(format!(
                            "unsupported field type {:?}",
                            other
                        )));
                    }
                }
            }
        }

        // 5. Hand off to the body with the receiver first.
        let init_fn = self.get_or_declare_init(&class.name)?;
        let mut call_args: Vec<BasicMetadataValueEnum> = vec![object.into()];
        for i in 0..ctor.params.len() as u32 {
            let param = function
                .get_nth_param(i)
                .ok_or_else(|| Diagnostic::bug("constructor parameter out of range"))?;
            call_args.push(param.into());
        }
        self.builder
            .build_call(init_fn, &call_args, "")
            .map_err(|_| Diagnostic::bug("build_call failed for constructor delegation"))?;
        let _ = self.builder.build_return(Some(&object));
        self.pop_debug_scope();
        Ok(())
    }

    /// `{Class}_init`, declared from table metadata when the definition
    /// has not been emitted yet.
    pub fn get_or_declare_init(&self, class: &str) -> DiagnosticResult<FunctionValue<'ctx>> {
        let symbol = format!("{}_init", class);
        if let Some(function) = self.module.get_function(&symbol) {
            return Ok(function);
        }
        let params = self
            .classes
            .ctor_params(class)
            .ok_or_else(|| Diagnostic::bug(format!("unknown class `{}`", class)))?;
        let mut param_types: Vec<BasicTypeEnum> = vec![self.i8ptr_t.into()];
        for ty in params {
            param_types.push(self.map_kona_type(ty)?);
        }
        Ok(self.declare_function_if_missing(&symbol, &param_types, None, |_| {}))
    }

    /// `{Class}_ctor`, declared from table metadata on first use so a
    /// construction may precede the class's own emission.
    pub fn get_or_declare_ctor(&self, class: &str) -> DiagnosticResult<FunctionValue<'ctx>> {
        let symbol = format!("{}_ctor", class);
        if let Some(function) = self.module.get_function(&symbol) {
            return Ok(function);
        }
        let params = self
            .classes
            .ctor_params(class)
            .ok_or_else(|| Diagnostic::bug(format!("unknown class `{}`", class)))?;
        let mut param_types: Vec<BasicTypeEnum> = Vec::with_capacity(params.len());
        for ty in params {
            param_types.push(self.map_kona_type(ty)?);
        }
        Ok(self.declare_function_if_missing(&symbol, &param_types, Some(self.i8ptr_t.into()), |_| {}))
    }

    /// `{Class}_field_map`: constant `{ i64, [N x i32] }` holding a tagged
    /// count word and the byte offsets of pointer-like fields, consumed by
    /// the collector when scanning instances. Classes without pointer
    /// fields get no map.
    fn emit_field_map(&self, class: &ClassDecl) -> DiagnosticResult<()> {
        let name = format!("{}_field_map", class.name);
        if self.module.get_global(&name).is_some() {
            return Ok(());
        }
        let info = self
            .classes
            .info(&class.name)
            .ok_or_else(|| Diagnostic::bug(format!("no layout for class `{}`", class.name)))?;
        let offsets: Vec<_> = info
            .layout
            .iter()
            .filter(|(_, ty, _)| ty.is_reference())
            .map(|(_, _, offset)| self.i32_t.const_int(*offset, false))
            .collect();
        if offsets.is_empty() {
            return Ok(());
        }
        // 'KONA' tag in the upper half marks a valid map
        let tag = (0x4B4F_4E41u64 << 32) | offsets.len() as u64;
        let meta = self.i64_t.const_int(tag, false);
        let array = self.i32_t.const_array(&offsets);
        let initializer = self.context.const_struct(&[meta.into(), array.into()], false);
        let global = self.module.add_global(initializer.get_type(), None, &name);
        global.set_initializer(&initializer);
        global.set_constant(true);
        Ok(())
    }
}
