//! Expression lowering.
//!
//! Expressions lower to values. The tree arriving here is desugared and
//! typed, so no string operators, qualified self references, or qualified
//! constructions remain; encountering one anyway is a pipeline bug, not a
//! source error. Calls resolve statically: built-in string and array
//! members bind to runtime entry points, class members to their
//! `{Owner}_{name}` symbols through the superclass chain.

use inkwell::values::{BasicMetadataValueEnum, BasicValueEnum, FunctionValue};
use inkwell::{FloatPredicate, IntPredicate};

use kona_ast::{BinOp, Expr, ExprKind, Type};

use crate::codegen::{CodeGen, LocalsStack, ParamMap};
use crate::desugar::strings::{CONCAT_METHOD, FROM_METHOD, STRING_CLASS, TO_STRING_METHOD};
use crate::diagnostics::{Diagnostic, DiagnosticResult};

impl<'ctx> CodeGen<'ctx> {
    /// Lowers one expression to its value.
    pub fn lower_expr(
        &self,
        expr: &Expr,
        function: FunctionValue<'ctx>,
        param_map: &ParamMap,
        locals: &mut LocalsStack<'ctx>,
    ) -> DiagnosticResult<BasicValueEnum<'ctx>> {
        match &expr.kind {
            ExprKind::IntLit(v) => Ok(self.i64_t.const_int(*v as u64, true).into()),
            ExprKind::FloatLit(v) => Ok(self.f64_t.const_float(*v).into()),
            ExprKind::BoolLit(v) => Ok(self.bool_t.const_int(u64::from(*v), false).into()),
            ExprKind::StrLit(s) => Ok(self.intern_string_literal(s)?.into()),
            ExprKind::NullLit => Ok(self.i8ptr_t.const_null().into()),
            ExprKind::Local(name) => self.lower_local_read(name, function, param_map, locals, expr),
            ExprKind::This { qualifier } => {
                if qualifier.is_some() {
                    return Err(Diagnostic::bug_at(
                        "qualified self reference survived desugaring",
                        expr.span.start,
                    ));
                }
                function.get_nth_param(0).ok_or_else(|| {
                    Diagnostic::bug_at(
                        "self reference in a receiverless function",
                        expr.span.start,
                    )
                })
            }
            ExprKind::Super { .. } => {
                Err(Diagnostic::bug_at("super reference survived desugaring", expr.span.start))
            }
            ExprKind::Field { target, name } => {
                self.lower_field_read(target, name, function, param_map, locals, expr)
            }
            ExprKind::StaticField { class, name } => {
                let global = self.static_field_global(class, name, &expr.ty)?;
                let ty = self.map_kona_type(&expr.ty)?;
                self.builder
                    .build_load(ty, global, name)
                    .map_err(|_| Diagnostic::bug_at("build_load failed", expr.span.start))
            }
            ExprKind::Binary { op, lhs, rhs } => {
                self.lower_binary(*op, lhs, rhs, function, param_map, locals, expr)
            }
            ExprKind::Assign { target, value } => {
                self.lower_assign(target, value, function, param_map, locals)
            }
            ExprKind::New { class, qualifier, args } => {
                if qualifier.is_some() {
                    return Err(Diagnostic::bug_at(
                        "construction still qualified after desugaring",
                        expr.span.start,
                    ));
                }
                let ctor = self.get_or_declare_ctor(class)?;
                let mut call_args: Vec<BasicMetadataValueEnum> = Vec::with_capacity(args.len());
                for arg in args {
                    call_args.push(self.lower_expr(arg, function, param_map, locals)?.into());
                }
                self.builder
                    .build_call(ctor, &call_args, "new")
                    .map_err(|_| Diagnostic::bug_at("build_call failed for construction", expr.span.start))?
                    .try_as_basic_value()
                    .left()
                    .ok_or_else(|| {
                        Diagnostic::bug_at("constructor returned no value", expr.span.start)
                    })
            }
            ExprKind::Call { target, method, args } => {
                self.lower_call(target, method, args, function, param_map, locals, expr)
            }
            ExprKind::StaticCall { class, method, args } => {
                self.lower_static_call(class, method, args, function, param_map, locals, expr)
            }
            // static retype only; every legal cast preserves representation
            ExprKind::Cast(inner) => {
                if self.map_kona_type(&expr.ty)? != self.map_kona_type(&inner.ty)? {
                    return Err(Diagnostic::bug_at(
                        "representation-changing cast reached emission",
                        expr.span.start,
                    ));
                }
                self.lower_expr(inner, function, param_map, locals)
            }
        }
    }

    /// Locals shadow parameters; both are resolved by name against the
    /// function being lowered.
    fn lower_local_read(
        &self,
        name: &str,
        function: FunctionValue<'ctx>,
        param_map: &ParamMap,
        locals: &mut LocalsStack<'ctx>,
        expr: &Expr,
    ) -> DiagnosticResult<BasicValueEnum<'ctx>> {
        for scope in locals.iter().rev() {
            if let Some((slot, slot_ty, _)) = scope.get(name) {
                return self
                    .builder
                    .build_load(*slot_ty, *slot, name)
                    .map_err(|_| Diagnostic::bug_at("build_load failed", expr.span.start));
            }
        }
        if let Some((index, _)) = param_map.get(name) {
            return function.get_nth_param(*index).ok_or_else(|| {
                Diagnostic::bug_at(format!("parameter `{}` out of range", name), expr.span.start)
            });
        }
        Err(Diagnostic::bug_at(format!("unresolved local `{}`", name), expr.span.start))
    }

    fn lower_field_read(
        &self,
        target: &Expr,
        name: &str,
        function: FunctionValue<'ctx>,
        param_map: &ParamMap,
        locals: &mut LocalsStack<'ctx>,
        expr: &Expr,
    ) -> DiagnosticResult<BasicValueEnum<'ctx>> {
        let base =
            self.lower_expr(target, function, param_map, locals)?.into_pointer_value();
        if let Type::Array(_) = &target.ty {
            if name == "length" {
                // length word sits right after the array header
                let array_t = self.array_t.get().ok_or_else(|| {
                    Diagnostic::bug_at("array type not declared for this unit", expr.span.start)
                })?;
                let addr = self
                    .builder
                    .build_struct_gep(array_t, base, 1, "len.addr")
                    .map_err(|_| Diagnostic::bug_at("struct gep failed", expr.span.start))?;
                return self
                    .builder
                    .build_load(self.i64_t, addr, "len")
                    .map_err(|_| Diagnostic::bug_at("build_load failed", expr.span.start));
            }
            return Err(Diagnostic::bug_at(
                format!("unknown array member `{}`", name),
                expr.span.start,
            ));
        }
        let class = target.ty.class_name().ok_or_else(|| {
            Diagnostic::bug_at(
                format!("field access on non-class type `{:?}`", target.ty),
                expr.span.start,
            )
        })?;
        let (offset, field_ty) = self.classes.field_offset(class, name).ok_or_else(|| {
            Diagnostic::bug_at(
                format!("no field `{}` on class `{}`", name, class),
                expr.span.start,
            )
        })?;
        let addr = self.offset_ptr(base, offset, &format!("{}.addr", name))?;
        let llvm_ty = self.map_kona_type(field_ty)?;
        self.builder
            .build_load(llvm_ty, addr, name)
            .map_err(|_| Diagnostic::bug_at("build_load failed", expr.span.start))
    }

    #[allow(clippy::too_many_arguments)]
    fn lower_binary(
        &self,
        op: BinOp,
        lhs: &Expr,
        rhs: &Expr,
        function: FunctionValue<'ctx>,
        param_map: &ParamMap,
        locals: &mut LocalsStack<'ctx>,
        expr: &Expr,
    ) -> DiagnosticResult<BasicValueEnum<'ctx>> {
        if lhs.ty == Type::Str || rhs.ty == Type::Str {
            return Err(Diagnostic::bug_at(
                "string operator survived normalization",
                expr.span.start,
            ));
        }
        let l = self.lower_expr(lhs, function, param_map, locals)?;
        let r = self.lower_expr(rhs, function, param_map, locals)?;
        let fail = |_| Diagnostic::bug_at("binary op emission failed", expr.span.start);
        match (l, r) {
            (BasicValueEnum::IntValue(a), BasicValueEnum::IntValue(b)) => {
                let value: BasicValueEnum = match op {
                    BinOp::Add => self.builder.build_int_add(a, b, "add").map_err(fail)?.into(),
                    BinOp::Sub => self.builder.build_int_sub(a, b, "sub").map_err(fail)?.into(),
                    BinOp::Mul => self.builder.build_int_mul(a, b, "mul").map_err(fail)?.into(),
                    BinOp::Div => {
                        self.builder.build_int_signed_div(a, b, "div").map_err(fail)?.into()
                    }
                    BinOp::Rem => {
                        self.builder.build_int_signed_rem(a, b, "rem").map_err(fail)?.into()
                    }
                    BinOp::Lt => self
                        .builder
                        .build_int_compare(IntPredicate::SLT, a, b, "lt")
                        .map_err(fail)?
                        .into(),
                    BinOp::Le => self
                        .builder
                        .build_int_compare(IntPredicate::SLE, a, b, "le")
                        .map_err(fail)?
                        .into(),
                    BinOp::Gt => self
                        .builder
                        .build_int_compare(IntPredicate::SGT, a, b, "gt")
                        .map_err(fail)?
                        .into(),
                    BinOp::Ge => self
                        .builder
                        .build_int_compare(IntPredicate::SGE, a, b, "ge")
                        .map_err(fail)?
                        .into(),
                    BinOp::Eq => self
                        .builder
                        .build_int_compare(IntPredicate::EQ, a, b, "eq")
                        .map_err(fail)?
                        .into(),
                    BinOp::Ne => self
                        .builder
                        .build_int_compare(IntPredicate::NE, a, b, "ne")
                        .map_err(fail)?
                        .into(),
                };
                Ok(value)
            }
            (BasicValueEnum::FloatValue(a), BasicValueEnum::FloatValue(b)) => {
                let value: BasicValueEnum = match op {
                    BinOp::Add => self.builder.build_float_add(a, b, "fadd").map_err(fail)?.into(),
                    BinOp::Sub => self.builder.build_float_sub(a, b, "fsub").map_err(fail)?.into(),
                    BinOp::Mul => self.builder.build_float_mul(a, b, "fmul").map_err(fail)?.into(),
                    BinOp::Div => self.builder.build_float_div(a, b, "fdiv").map_err(fail)?.into(),
                    BinOp::Rem => self.builder.build_float_rem(a, b, "frem").map_err(fail)?.into(),
                    BinOp::Lt => self
                        .builder
                        .build_float_compare(FloatPredicate::OLT, a, b, "flt")
                        .map_err(fail)?
                        .into(),
                    BinOp::Le => self
                        .builder
                        .build_float_compare(FloatPredicate::OLE, a, b, "fle")
                        .map_err(fail)?
                        .into(),
                    BinOp::Gt => self
                        .builder
                        .build_float_compare(FloatPredicate::OGT, a, b, "fgt")
                        .map_err(fail)?
                        .into(),
                    BinOp::Ge => self
                        .builder
                        .build_float_compare(FloatPredicate::OGE, a, b, "fge")
                        .map_err(fail)?
                        .into(),
                    BinOp::Eq => self
                        .builder
                        .build_float_compare(FloatPredicate::OEQ, a, b, "feq")
                        .map_err(fail)?
                        .into(),
                    BinOp::Ne => self
                        .builder
                        .build_float_compare(FloatPredicate::ONE, a, b, "fne")
                        .map_err(fail)?
                        .into(),
                };
                Ok(value)
            }
            (BasicValueEnum::PointerValue(a), BasicValueEnum::PointerValue(b)) => {
                // reference identity only
                let predicate = match op {
                    BinOp::Eq => IntPredicate::EQ,
                    BinOp::Ne => IntPredicate::NE,
                    other => {
                        return Err(Diagnostic::bug_at(
                            format!("operator `{:?}` applied to reference operands", other),
                            expr.span.start,
                        ));
                    }
                };
                let a = self.builder.build_ptr_to_int(a, self.i64_t, "lhs.addr").map_err(fail)?;
                let b = self.builder.build_ptr_to_int(b, self.i64_t, "rhs.addr").map_err(fail)?;
                Ok(self.builder.build_int_compare(predicate, a, b, "refcmp").map_err(fail)?.into())
            }
            _ => Err(Diagnostic::bug_at(
                "mixed operand representations in binary operator",
                expr.span.start,
            )),
        }
    }

    /// Assignment evaluates the value, stores through the resolved target
    /// location, and yields the value.
    fn lower_assign(
        &self,
        target: &Expr,
        value: &Expr,
        function: FunctionValue<'ctx>,
        param_map: &ParamMap,
        locals: &mut LocalsStack<'ctx>,
    ) -> DiagnosticResult<BasicValueEnum<'ctx>> {
        let stored = self.lower_expr(value, function, param_map, locals)?;
        match &target.kind {
            ExprKind::Local(name) => {
                for scope in locals.iter().rev() {
                    if let Some((slot, _, _)) = scope.get(name) {
                        let _ = self.builder.build_store(*slot, stored);
                        return Ok(stored);
                    }
                }
                // parameters have no storage; the front end rejects
                // assigning them
                Err(Diagnostic::bug_at(
                    format!("assignment to unresolved or immutable `{}`", name),
                    target.span.start,
                ))
            }
            ExprKind::Field { target: object, name } => {
                let base =
                    self.lower_expr(object, function, param_map, locals)?.into_pointer_value();
                let class = object.ty.class_name().ok_or_else(|| {
                    Diagnostic::bug_at(
                        format!("field store on non-class type `{:?}`", object.ty),
                        target.span.start,
                    )
                })?;
                let (offset, _) = self.classes.field_offset(class, name).ok_or_else(|| {
                    Diagnostic::bug_at(
                        format!("no field `{}` on class `{}`", name, class),
                        target.span.start,
                    )
                })?;
                let addr = self.offset_ptr(base, offset, &format!("{}.addr", name))?;
                let _ = self.builder.build_store(addr, stored);
                Ok(stored)
            }
            ExprKind::StaticField { class, name } => {
                let global = self.static_field_global(class, name, &target.ty)?;
                let _ = self.builder.build_store(global, stored);
                Ok(stored)
            }
            _ => Err(Diagnostic::bug_at("unsupported assignment target", target.span.start)),
        }
    }

    /// Instance calls: string and array built-ins bind to runtime entry
    /// points; class receivers resolve through the superclass chain to a
    /// statically dispatched symbol.
    #[allow(clippy::too_many_arguments)]
    fn lower_call(
        &self,
        target: &Expr,
        method: &str,
        args: &[Expr],
        function: FunctionValue<'ctx>,
        param_map: &ParamMap,
        locals: &mut LocalsStack<'ctx>,
        expr: &Expr,
    ) -> DiagnosticResult<BasicValueEnum<'ctx>> {
        match &target.ty {
            Type::Str => {
                let receiver = self.lower_expr(target, function, param_map, locals)?;
                if method == CONCAT_METHOD {
                    let arg = args.first().ok_or_else(|| {
                        Diagnostic::bug_at("concatenation without an operand", expr.span.start)
                    })?;
                    let rhs = self.lower_expr(arg, function, param_map, locals)?;
                    return self
                        .builder
                        .build_call(self.get_str_concat(), &[receiver.into(), rhs.into()], "concat")
                        .map_err(|_| Diagnostic::bug_at("build_call failed", expr.span.start))?
                        .try_as_basic_value()
                        .left()
                        .ok_or_else(|| {
                            Diagnostic::bug_at("concatenation produced no value", expr.span.start)
                        });
                }
                if method == TO_STRING_METHOD {
                    // identity on strings
                    return Ok(receiver);
                }
                Err(Diagnostic::bug_at(
                    format!("unknown string method `{}`", method),
                    expr.span.start,
                ))
            }
            Type::Array(_) => {
                let receiver = self.lower_expr(target, function, param_map, locals)?;
                if method == TO_STRING_METHOD {
                    return self
                        .builder
                        .build_call(self.get_array_to_string(), &[receiver.into()], "arr.str")
                        .map_err(|_| Diagnostic::bug_at("build_call failed", expr.span.start))?
                        .try_as_basic_value()
                        .left()
                        .ok_or_else(|| {
                            Diagnostic::bug_at("array rendering produced no value", expr.span.start)
                        });
                }
                Err(Diagnostic::bug_at(
                    format!("unknown array method `{}`", method),
                    expr.span.start,
                ))
            }
            Type::Class(class) => {
                let (owner, sig) = self.classes.resolve_method(class, method).ok_or_else(|| {
                    Diagnostic::bug_at(
                        format!("no method `{}` on class `{}`", method, class),
                        expr.span.start,
                    )
                })?;
                if sig.is_static {
                    return Err(Diagnostic::bug_at(
                        format!("instance call to static method `{}`", method),
                        expr.span.start,
                    ));
                }
                let callee = self.get_or_declare_method(owner, sig)?;
                let receiver = self.lower_expr(target, function, param_map, locals)?;
                let mut call_args: Vec<BasicMetadataValueEnum> = vec![receiver.into()];
                for arg in args {
                    call_args.push(self.lower_expr(arg, function, param_map, locals)?.into());
                }
                let call = self
                    .builder
                    .build_call(callee, &call_args, method)
                    .map_err(|_| Diagnostic::bug_at("build_call failed", expr.span.start))?;
                match call.try_as_basic_value().left() {
                    Some(value) => Ok(value),
                    // void calls surface a placeholder; statement lowering
                    // discards it
                    None => Ok(self.i64_t.const_zero().into()),
                }
            }
            other => Err(Diagnostic::bug_at(
                format!("method call on unsupported type `{:?}`", other),
                expr.span.start,
            )),
        }
    }

    /// Static calls: the `String.from` conversion surface binds per
    /// operand type to the runtime; everything else resolves to its
    /// `{Class}_{method}` symbol.
    #[allow(clippy::too_many_arguments)]
    fn lower_static_call(
        &self,
        class: &str,
        method: &str,
        args: &[Expr],
        function: FunctionValue<'ctx>,
        param_map: &ParamMap,
        locals: &mut LocalsStack<'ctx>,
        expr: &Expr,
    ) -> DiagnosticResult<BasicValueEnum<'ctx>> {
        if class == STRING_CLASS && method == FROM_METHOD {
            let arg = args.first().ok_or_else(|| {
                Diagnostic::bug_at("conversion call without an operand", expr.span.start)
            })?;
            let callee = match &arg.ty {
                Type::Int => self.get_int_to_string(),
                Type::Float => self.get_f64_to_string(),
                Type::Bool => self.get_bool_to_string(),
                other => {
                    return Err(Diagnostic::bug_at(
                        format!("no string conversion for `{:?}`", other),
                        expr.span.start,
                    ));
                }
            };
            let value = self.lower_expr(arg, function, param_map, locals)?;
            return self
                .builder
                .build_call(callee, &[value.into()], "str")
                .map_err(|_| Diagnostic::bug_at("build_call failed", expr.span.start))?
                .try_as_basic_value()
                .left()
                .ok_or_else(|| {
                    Diagnostic::bug_at("conversion produced no value", expr.span.start)
                });
        }
        let (owner, sig) = self.classes.resolve_method(class, method).ok_or_else(|| {
            Diagnostic::bug_at(
                format!("no method `{}` on class `{}`", method, class),
                expr.span.start,
            )
        })?;
        if !sig.is_static {
            return Err(Diagnostic::bug_at(
                format!("static call to instance method `{}`", method),
                expr.span.start,
            ));
        }
        let callee = self.get_or_declare_method(owner, sig)?;
        let mut call_args: Vec<BasicMetadataValueEnum> = Vec::with_capacity(args.len());
        for arg in args {
            call_args.push(self.lower_expr(arg, function, param_map, locals)?.into());
        }
        let call = self
            .builder
            .build_call(callee, &call_args, method)
            .map_err(|_| Diagnostic::bug_at("build_call failed", expr.span.start))?;
        match call.try_as_basic_value().left() {
            Some(value) => Ok(value),
            None => Ok(self.i64_t.const_zero().into()),
        }
    }
}
