//! Typing and constant folding of expressions, and resolution of the expressions which name
//! types.

use crate::ast::{
    BinaryOp, ExprId, ExprKind, FloatSuffix, FnId, Ident, IntSuffix, Literal, TemplatedIdent,
    UnaryOp, VarId, VariableKind,
};
use crate::diagnostic::Span;

use super::builtin::{self, BuiltinType};
use super::constant::{self, ConstantValue, EvalResult};
use super::materialize::convert_value;
use super::sem::{Behaviors, EvaluationStage, ExprInfo};
use super::types::{
    Access, AddressSpace, ArrayCount, Scalar, TexelFormat, TextureKind, Type, TypeId, Types,
};
use super::{Binding, Context, Fallible, Poisoned};

const MAX_EXPRESSION_DEPTH: usize = 512;

/// A resolved call argument.
type Argument = (ExprId, ExprInfo);

impl<'m> Context<'m> {
    /// Resolves a value expression and records it in the side-table.
    pub(super) fn expression(&mut self, expr: ExprId) -> Fallible<ExprInfo> {
        let span = self.expr_span(expr);
        if self.expression_depth >= MAX_EXPRESSION_DEPTH {
            return Err(
                self.error(span, format!("reached max expression depth of {MAX_EXPRESSION_DEPTH}"))
            );
        }

        self.expression_depth += 1;
        let result = self.expression_kind(expr, span);
        self.expression_depth -= 1;

        let mut info = result?;
        let module = self.module;
        match &module.exprs[expr].kind {
            // a call may also leave through its callee
            ExprKind::Call { args, .. } => info.behaviors |= self.behaviors_of(args).difference(Behaviors::NEXT),
            ExprKind::Index { base, index } => info.behaviors = self.behaviors_of(&[*base, *index]),
            ExprKind::Member { base, .. } | ExprKind::Unary { operand: base, .. } => {
                info.behaviors = self.behaviors_of(&[*base])
            },
            ExprKind::Binary { lhs, rhs, .. } => info.behaviors = self.behaviors_of(&[*lhs, *rhs]),
            ExprKind::Ident(_) | ExprKind::Literal(_) | ExprKind::Phony => {},
        }
        self.sem.exprs.insert(expr, info.clone());
        Ok(info)
    }

    /// The combined behaviors of resolved expressions.
    fn behaviors_of(&self, exprs: &[ExprId]) -> Behaviors {
        exprs
            .iter()
            .filter_map(|expr| self.sem.exprs.get(*expr))
            .fold(Behaviors::empty(), |behaviors, info| behaviors | info.behaviors)
    }

    fn expression_kind(&mut self, expr: ExprId, span: Span) -> Fallible<ExprInfo> {
        let module = self.module;
        match &module.exprs[expr].kind {
            ExprKind::Ident(templated) => self.identifier(templated),
            ExprKind::Literal(literal) => self.literal(*literal, span),
            ExprKind::Call { callee, args } => self.call(callee, args, span),
            ExprKind::Index { base, index } => self.index(*base, *index),
            ExprKind::Member { base, member } => self.member(*base, *member),
            ExprKind::Unary { op, operand } => self.unary(*op, *operand, span),
            ExprKind::Binary { op, lhs, rhs } => self.binary(*op, *lhs, *rhs, span),
            ExprKind::Phony => {
                Err(self.error(span, "'_' can only be used on the left-hand side of an assignment"))
            },
        }
    }

    fn identifier(&mut self, templated: &'m TemplatedIdent) -> Fallible<ExprInfo> {
        let ident = templated.ident;
        let name = self.name(ident);
        let Some(binding) = self.lookup(ident) else {
            return Err(self.error(ident.span, format!("unresolved identifier '{name}'")));
        };

        match binding {
            Binding::Variable(var) => {
                self.no_template(templated)?;
                let Some(variable) = self.sem.vars.get(var) else { return Err(Poisoned) };
                let mut info = ExprInfo::new(variable.ty, variable.stage);
                if variable.kind == VariableKind::Const {
                    info.value.clone_from(&variable.value);
                }
                let global = variable.global;
                info.source_variable = Some(self.root_variable(var));
                if global {
                    self.reference_global(var, ident.span);
                }
                Ok(info)
            },
            Binding::Function(func) => {
                self.error(ident.span, format!("cannot use function '{name}' as value"));
                let declared = self.module.functions[func].name.span;
                self.note(declared, format!("function '{name}' declared here"));
                Err(Poisoned)
            },
            Binding::Struct(_) | Binding::Alias(_) | Binding::BuiltinType(_) => {
                Err(self.error(ident.span, format!("cannot use type '{name}' as value")))
            },
            Binding::BuiltinFunction(_) => {
                Err(self.error(ident.span, format!("missing '(' for builtin function call '{name}'")))
            },
        }
    }

    /// The variable an identifier ultimately refers to, looking through `let`s of pointer type.
    fn root_variable(&self, var: VarId) -> VarId {
        let variable = &self.module.vars[var];
        let is_pointer = self.sem.vars.get(var).is_some_and(|info| self.types.is_pointer(info.ty));
        match (variable.kind, variable.initializer) {
            (VariableKind::Let, Some(init)) if is_pointer => {
                self.sem.exprs.get(init).and_then(|info| info.source_variable).unwrap_or(var)
            },
            _ => var,
        }
    }

    fn no_template(&mut self, templated: &TemplatedIdent) -> Fallible<()> {
        if templated.template.is_empty() {
            return Ok(());
        }
        let name = self.name(templated.ident);
        Err(self.error(templated.ident.span, format!("'{name}' does not take template arguments")))
    }

    fn reference_global(&mut self, var: VarId, span: Span) {
        let Some(state) = &mut self.function else { return };
        if !state.referenced_globals.iter().any(|(existing, _)| *existing == var) {
            state.referenced_globals.push((var, span));
        }
    }

    fn require_f16(&mut self, span: Span, what: &str) -> Fallible<()> {
        if self.module.is_enabled("f16") {
            return Ok(());
        }
        Err(self.error(span, format!("f16 {what} used without 'f16' extension enabled")))
    }

    fn literal(&mut self, literal: Literal, span: Span) -> Fallible<ExprInfo> {
        let (value, scalar) = match literal {
            Literal::Bool(value) => (ConstantValue::Bool(value), None),
            Literal::Int { value, suffix } => {
                let scalar = match suffix {
                    IntSuffix::None => None,
                    IntSuffix::I => Some(Scalar::I32),
                    IntSuffix::U => Some(Scalar::U32),
                };
                (ConstantValue::AbstractInt(value), scalar)
            },
            Literal::Float { value, suffix } => {
                let scalar = match suffix {
                    FloatSuffix::None => None,
                    FloatSuffix::F => Some(Scalar::F32),
                    FloatSuffix::H => {
                        self.require_f16(span, "literal")?;
                        Some(Scalar::F16)
                    },
                };
                (ConstantValue::AbstractFloat(value), scalar)
            },
        };

        let value = match scalar {
            Some(scalar) => value.convert_scalar(scalar).map_err(|message| self.error(span, message))?,
            None => value,
        };
        Ok(ExprInfo::constant(value))
    }

    fn call(
        &mut self,
        callee: &'m TemplatedIdent,
        args: &'m [ExprId],
        span: Span,
    ) -> Fallible<ExprInfo> {
        let ident = callee.ident;
        let name = self.name(ident);
        let binding = self.lookup(ident);

        let mut arguments = Vec::with_capacity(args.len());
        let mut failed = false;
        for &arg in args {
            match self.expression(arg) {
                Ok(info) => arguments.push((arg, info)),
                Err(Poisoned) => failed = true,
            }
        }

        let Some(binding) = binding else {
            if name == "bitcast" {
                return if failed { Err(Poisoned) } else { self.bitcast(callee, arguments, span) };
            }
            return Err(self.error(ident.span, format!("unresolved call target '{name}'")));
        };
        if failed {
            return Err(Poisoned);
        }

        match binding {
            Binding::Variable(var) => {
                self.error(ident.span, format!("cannot call variable '{name}'"));
                let declared = self.module.vars[var].name.span;
                self.note(declared, format!("'{name}' declared here"));
                Err(Poisoned)
            },
            Binding::Function(func) => self.user_call(func, callee, arguments, span),
            Binding::Struct(strukt) => {
                self.no_template(callee)?;
                let ty = self.sem.structs.get(strukt).copied().ok_or(Poisoned)?;
                self.construct(ty, arguments, span)
            },
            Binding::Alias(alias) => {
                self.no_template(callee)?;
                let ty = self.sem.aliases.get(alias).copied().ok_or(Poisoned)?;
                self.construct(ty, arguments, span)
            },
            Binding::BuiltinType(builtin) => {
                let ty = match self.inferred_constructor_type(builtin, callee, &arguments, span)? {
                    Some(ty) => ty,
                    None => self.builtin_type(builtin, callee, span)?,
                };
                self.construct(ty, arguments, span)
            },
            Binding::BuiltinFunction(function) => {
                self.no_template(callee)?;
                self.builtin_call(function, arguments, span)
            },
        }
    }

    fn user_call(
        &mut self,
        func: FnId,
        callee: &'m TemplatedIdent,
        arguments: Vec<Argument>,
        span: Span,
    ) -> Fallible<ExprInfo> {
        self.no_template(callee)?;
        let name = self.name(callee.ident);
        let Some(info) = self.sem.functions.get(func) else { return Err(Poisoned) };
        if info.is_entry_point() {
            return Err(self.error(span, "entry point functions cannot be the target of a function call"));
        }

        let params: Vec<TypeId> =
            info.params.iter().filter_map(|param| self.sem.vars.get(*param)).map(|param| param.ty).collect();
        let return_type = info.return_type;
        let behaviors = info.behaviors;

        if arguments.len() != params.len() {
            let which = if arguments.len() < params.len() { "few" } else { "many" };
            return Err(self.error(
                span,
                format!(
                    "too {which} arguments in call to '{name}', expected {}, got {}",
                    params.len(),
                    arguments.len()
                ),
            ));
        }

        let mut failed = false;
        for (index, ((arg, info), param)) in arguments.into_iter().zip(params).enumerate() {
            let Ok(info) = self.value(arg, info, Some(param)) else {
                failed = true;
                continue;
            };
            if info.ty != param {
                let expected = self.types.display(param);
                let found = self.types.display(info.ty);
                let span = self.expr_span(arg);
                self.error(
                    span,
                    format!(
                        "type mismatch for argument {} in call to '{name}', expected '{expected}', got '{found}'",
                        index + 1
                    ),
                );
                failed = true;
            }
        }
        if failed {
            return Err(Poisoned);
        }

        if let Some(state) = &mut self.function {
            if !state.callees.iter().any(|(existing, _)| *existing == func) {
                state.callees.push((func, span));
            }
        }

        if behaviors.contains(Behaviors::DISCARD) {
            if let Some((continuing, depth)) = self.continuing_block() {
                self.error(span, "cannot call a function that may discard inside a continuing block");
                // calls in the statements of the block itself sit right next to it
                if self.statement_depth > depth + 1 {
                    self.note(continuing, "see continuing block here");
                }
                return Err(Poisoned);
            }
        }

        let mut call_behaviors = behaviors.difference(Behaviors::RETURN);
        if behaviors.contains(Behaviors::RETURN) {
            call_behaviors.insert(Behaviors::NEXT);
        }
        Ok(ExprInfo {
            behaviors: call_behaviors,
            ..ExprInfo::new(return_type, EvaluationStage::Runtime)
        })
    }

    fn builtin_call(
        &mut self,
        function: &'static str,
        arguments: Vec<Argument>,
        span: Span,
    ) -> Fallible<ExprInfo> {
        if !builtin::is_supported(function) {
            return Err(self.error(span, format!("builtin function '{function}' is not supported")));
        }

        let arguments: Vec<Argument> =
            arguments.into_iter().map(|(arg, info)| (arg, self.load(info))).collect();
        let const_evaluable = builtin::is_const_evaluable(function);
        let fold = const_evaluable && arguments.iter().all(|(_, info)| info.value.is_some());

        let types: Vec<TypeId> = arguments.iter().map(|(_, info)| info.ty).collect();
        let candidates: Vec<TypeId> = match fold {
            true => types.clone(),
            false => types.iter().map(|ty| self.types.concretize(*ty)).collect(),
        };
        let Some(overload) = builtin::function_overload(&mut self.types, function, &candidates) else {
            let types: Vec<_> = types.iter().map(|ty| self.types.display(*ty)).collect();
            return Err(self.error(span, format!("no matching call to '{function}({})'", types.join(", "))));
        };

        let mut materialized = Vec::with_capacity(arguments.len());
        let mut failed = false;
        for ((arg, info), param) in arguments.into_iter().zip(overload.params.iter()) {
            match self.materialize(arg, info, Some(*param)) {
                Ok(info) => materialized.push(info),
                Err(Poisoned) => failed = true,
            }
        }
        if failed {
            return Err(Poisoned);
        }

        let stage = match (fold, const_evaluable) {
            (true, _) => EvaluationStage::Constant,
            (false, true) => materialized
                .iter()
                .map(|info| info.stage)
                .max()
                .unwrap_or(EvaluationStage::Constant),
            (false, false) => EvaluationStage::Runtime,
        };

        let mut info = ExprInfo::new(overload.ret, stage);
        if fold {
            let values: Vec<ConstantValue> =
                materialized.iter().filter_map(|info| info.value.clone()).collect();
            let value = builtin::const_eval(&mut self.types, function, &values, overload.ret)
                .map_err(|message| self.error(span, message))?;
            info.value = Some(value);
        }

        if let Some(state) = &mut self.function {
            if !state.builtin_calls.iter().any(|(existing, _)| *existing == function) {
                state.builtin_calls.push((function, span));
            }
        }
        Ok(info)
    }

    fn bitcast(
        &mut self,
        callee: &'m TemplatedIdent,
        arguments: Vec<Argument>,
        span: Span,
    ) -> Fallible<ExprInfo> {
        let [target] = callee.template[..] else {
            return Err(self.error(span, "'bitcast' requires exactly one template argument"));
        };
        let target = self.resolve_type(target)?;
        let Ok([(arg, info)]) = <[Argument; 1]>::try_from(arguments) else {
            return Err(self.error(span, "'bitcast' requires exactly one argument"));
        };
        let info = self.value(arg, info, None)?;

        match (bit_width(&self.types, info.ty), bit_width(&self.types, target)) {
            (Some(from), Some(to)) if from == to => {},
            _ => {
                let from = self.types.display(info.ty);
                let to = self.types.display(target);
                return Err(self.error(span, format!("cannot bitcast from '{from}' to '{to}'")));
            },
        }

        let folded = match &info.value {
            Some(value) => bitcast_value(&self.types, value, target)
                .transpose()
                .map_err(|message| self.error(span, message))?,
            None => None,
        };
        Ok(match folded {
            Some(value) => ExprInfo { value: Some(value), ..ExprInfo::new(target, EvaluationStage::Constant) },
            None => ExprInfo::new(target, info.stage.max(EvaluationStage::Override)),
        })
    }

    /// Splits a reference or pointer into its address space and access mode, and the type it
    /// refers to.
    fn view(&self, ty: TypeId) -> (Option<(AddressSpace, Access)>, TypeId) {
        match self.types.get(ty) {
            Type::Reference { space, store, access } => (Some((space, access)), store),
            Type::Pointer { space, pointee, access } => (Some((space, access)), pointee),
            _ => (None, ty),
        }
    }

    fn index(&mut self, base: ExprId, index: ExprId) -> Fallible<ExprInfo> {
        let base_info = self.expression(base);
        let index_info = self.expression(index);
        let (base_info, index_info) = (base_info?, index_info?);
        let index_span = self.expr_span(index);

        let index_type = self.types.unwrap_ref(index_info.ty);
        if !matches!(self.types.scalar(index_type), Some(Scalar::AbstractInt | Scalar::I32 | Scalar::U32)) {
            let display = self.types.display(index_type);
            return Err(
                self.error(index_span, format!("index must be of type 'i32' or 'u32', found: '{display}'"))
            );
        }
        let index_info = self.value(index, index_info, None)?;
        let index_value = index_info.value.as_ref().and_then(ConstantValue::as_int);

        let (view, container) = self.view(base_info.ty);
        let (elem, len) = match self.types.get(container) {
            Type::Vector { size, elem } => (elem, Some(u64::from(size))),
            Type::Matrix { columns, rows, elem } => (self.types.vector(elem, rows), Some(u64::from(columns))),
            Type::Array { elem, count: ArrayCount::Constant(count), .. } => (elem, Some(u64::from(count))),
            Type::Array { elem, .. } => (elem, None),
            _ => {
                let display = self.types.display(base_info.ty);
                let span = self.expr_span(base);
                return Err(self.error(span, format!("cannot index type '{display}'")));
            },
        };

        if let (Some(value), Some(len)) = (index_value, len) {
            if value < 0 || value as u64 >= len {
                return Err(self.error(index_span, format!("index {value} out of bounds [0..{}]", len - 1)));
            }
        }

        let mut info = match view {
            Some((space, access)) => {
                ExprInfo::new(self.types.reference(space, elem, access), EvaluationStage::Runtime)
            },
            None => match (&base_info.value, index_value) {
                (Some(value), Some(index)) => {
                    let value = value.index(index).map_err(|message| self.error(index_span, message))?;
                    ExprInfo { value: Some(value), ..ExprInfo::new(elem, EvaluationStage::Constant) }
                },
                _ => {
                    let stage = base_info.stage.max(index_info.stage);
                    // a dynamic index into an abstract composite uses its concrete type
                    let base_info = self.materialize(base, base_info.clone(), None)?;
                    let elem = constant::element_type(&mut self.types, base_info.ty);
                    ExprInfo::new(elem, stage)
                },
            },
        };
        info.source_variable = base_info.source_variable;
        Ok(info)
    }

    fn member(&mut self, base: ExprId, member: Ident) -> Fallible<ExprInfo> {
        let base_info = self.expression(base)?;
        let name = self.name(member);
        let (view, container) = self.view(base_info.ty);

        let mut info = match self.types.get(container) {
            Type::Struct(id) => {
                let found = self.types.struct_info(id).member(name).map(|(index, field)| (index, field.ty));
                let Some((index, ty)) = found else {
                    return Err(self.error(member.span, format!("struct member {name} not found")));
                };
                match view {
                    Some((space, access)) => {
                        ExprInfo::new(self.types.reference(space, ty, access), EvaluationStage::Runtime)
                    },
                    None => {
                        let mut info = ExprInfo::new(ty, base_info.stage);
                        if let Some(value) = &base_info.value {
                            let value =
                                value.index(index as i64).map_err(|message| self.error(member.span, message))?;
                            info.value = Some(value);
                        }
                        info
                    },
                }
            },
            Type::Vector { size, elem } => {
                let indices = self.swizzle(name, member.span, size)?;
                let mut info = match (view, &indices[..]) {
                    (Some((space, access)), [_]) => {
                        ExprInfo::new(self.types.reference(space, elem, access), EvaluationStage::Runtime)
                    },
                    (Some(_), _) => {
                        let ty = self.types.vector(elem, indices.len() as u8);
                        ExprInfo::new(ty, EvaluationStage::Runtime)
                    },
                    (None, [single]) => {
                        let mut info = ExprInfo::new(elem, base_info.stage);
                        if let Some(value) = &base_info.value {
                            let value = value
                                .index(i64::from(*single))
                                .map_err(|message| self.error(member.span, message))?;
                            info.value = Some(value);
                        }
                        info
                    },
                    (None, _) => {
                        let ty = self.types.vector(elem, indices.len() as u8);
                        let mut info = ExprInfo::new(ty, base_info.stage);
                        info.value = base_info.value.as_ref().map(|value| value.swizzle(ty, &indices));
                        info
                    },
                };
                info.is_swizzle = true;
                info
            },
            _ => {
                let display = self.types.display(base_info.ty);
                return Err(self.error(
                    member.span,
                    format!("invalid member accessor expression. Expected vector or struct, got '{display}'"),
                ));
            },
        };
        info.source_variable = base_info.source_variable;
        Ok(info)
    }

    /// Parses a swizzle such as `xzy` or `rgba` into component indices.
    fn swizzle(&mut self, name: &str, span: Span, size: u8) -> Fallible<Vec<u8>> {
        if name.is_empty() || name.len() > 4 {
            return Err(self.error(span, "invalid vector swizzle size"));
        }
        let mut indices = Vec::with_capacity(name.len());
        let mut color = None;
        for c in name.chars() {
            let (index, is_color) = match c {
                'x' => (0, false),
                'y' => (1, false),
                'z' => (2, false),
                'w' => (3, false),
                'r' => (0, true),
                'g' => (1, true),
                'b' => (2, true),
                'a' => (3, true),
                _ => return Err(self.error(span, "invalid vector swizzle character")),
            };
            if *color.get_or_insert(is_color) != is_color {
                return Err(self.error(span, "invalid mixing of vector swizzle characters rgba with xyzw"));
            }
            if index >= size {
                return Err(self.error(span, "invalid vector swizzle member"));
            }
            indices.push(index);
        }
        Ok(indices)
    }

    fn unary(&mut self, op: UnaryOp, operand: ExprId, span: Span) -> Fallible<ExprInfo> {
        let info = self.expression(operand)?;
        match op {
            UnaryOp::AddressOf => {
                if info.is_swizzle {
                    return Err(self.error(span, "cannot take the address of a vector component"));
                }
                let Type::Reference { space, store, access } = self.types.get(info.ty) else {
                    return Err(self.error(span, "cannot take the address of expression"));
                };
                if space == AddressSpace::Handle {
                    return Err(self.error(span, "cannot take the address of expression in handle address space"));
                }
                let ty = self.types.pointer(space, store, access);
                Ok(ExprInfo {
                    source_variable: info.source_variable,
                    ..ExprInfo::new(ty, EvaluationStage::Runtime)
                })
            },
            UnaryOp::Indirection => {
                let Type::Pointer { space, pointee, access } = self.types.get(info.ty) else {
                    let display = self.types.display(info.ty);
                    return Err(self.error(span, format!("cannot dereference expression of type '{display}'")));
                };
                let ty = self.types.reference(space, pointee, access);
                Ok(ExprInfo {
                    source_variable: info.source_variable,
                    ..ExprInfo::new(ty, EvaluationStage::Runtime)
                })
            },
            UnaryOp::Negate | UnaryOp::Not | UnaryOp::Complement => {
                let info = self.load(info);
                let Some(ty) = builtin::unary_overload(&self.types, op, info.ty) else {
                    let display = self.types.display(info.ty);
                    return Err(
                        self.error(span, format!("no matching overload for operator {} ({display})", op.as_str()))
                    );
                };
                let mut result = ExprInfo::new(ty, info.stage);
                if let Some(value) = &info.value {
                    let value = constant::unary(op, value, &mut self.types, ty)
                        .map_err(|message| self.error(span, message))?;
                    result.value = Some(value);
                }
                Ok(result)
            },
        }
    }

    fn binary(&mut self, op: BinaryOp, lhs: ExprId, rhs: ExprId, span: Span) -> Fallible<ExprInfo> {
        let left = self.expression(lhs);
        let right = self.expression(rhs);
        let (left, right) = (self.load(left?), self.load(right?));

        let Some(overload) = builtin::binary_overload(&mut self.types, op, left.ty, right.ty) else {
            let (lhs, rhs) = (self.types.display(left.ty), self.types.display(right.ty));
            return Err(self.error(span, format!("no matching overload for operator {} ({lhs}, {rhs})", op.as_str())));
        };

        let left = self.materialize(lhs, left, Some(overload.lhs));
        let right = self.materialize(rhs, right, Some(overload.rhs));
        let (left, right) = (left?, right?);

        let mut info = ExprInfo::new(overload.ret, left.stage.max(right.stage));
        if let (Some(a), Some(b)) = (&left.value, &right.value) {
            let value = constant::binary(op, a, b, &mut self.types, overload.ret)
                .map_err(|message| self.error(span, message))?;
            info.value = Some(value);
        }
        Ok(info)
    }

    /// The type constructed by a call to a type generator without a template list, such as
    /// `vec3(1.0, 2.0, 3.0)`, inferred from the arguments. Returns `None` for other callees.
    fn inferred_constructor_type(
        &mut self,
        builtin: BuiltinType,
        callee: &TemplatedIdent,
        arguments: &[Argument],
        span: Span,
    ) -> Fallible<Option<TypeId>> {
        if !callee.template.is_empty() || !builtin.is_generator() {
            return Ok(None);
        }
        let name = self.name(callee.ident);
        let types: Vec<TypeId> = arguments.iter().map(|(_, info)| self.types.unwrap_ref(info.ty)).collect();

        let element_types = |this: &Self| -> Option<Vec<TypeId>> {
            types
                .iter()
                .map(|&ty| match this.types.get(ty) {
                    Type::Scalar(_) => Some(ty),
                    Type::Vector { elem, .. } | Type::Matrix { elem, .. } => Some(elem),
                    _ => None,
                })
                .collect()
        };

        match builtin {
            BuiltinType::Vector { size, .. } => {
                let elem = match element_types(self) {
                    Some(elems) if elems.is_empty() => Some(TypeId::ABSTRACT_INT),
                    Some(elems) => self.types.common_type(&elems),
                    None => None,
                };
                match elem {
                    Some(elem) => Ok(Some(self.types.vector(elem, size))),
                    None => Err(self.no_matching_constructor(name, &types, span)),
                }
            },
            BuiltinType::Matrix { columns, rows, .. } => {
                let elem = match element_types(self) {
                    Some(elems) if elems.is_empty() => Some(TypeId::ABSTRACT_FLOAT),
                    Some(elems) => self.types.common_type(&elems),
                    None => None,
                };
                let elem = match elem.and_then(|elem| self.types.scalar(elem)) {
                    Some(Scalar::AbstractInt | Scalar::AbstractFloat) => TypeId::ABSTRACT_FLOAT,
                    Some(Scalar::F32 | Scalar::F16) => elem.unwrap_or(TypeId::ABSTRACT_FLOAT),
                    _ => return Err(self.no_matching_constructor(name, &types, span)),
                };
                Ok(Some(self.types.matrix(elem, columns, rows)))
            },
            BuiltinType::Array => {
                if let Some(elem) = self.types.common_type(&types) {
                    let count = ArrayCount::Constant(types.len() as u32);
                    return Ok(Some(self.types.array(elem, count)));
                }
                self.error(span, "cannot infer common array element type from initializer arguments");
                for (index, (arg, _)) in arguments.iter().enumerate() {
                    let display = self.types.display(types[index]);
                    let arg_span = self.expr_span(*arg);
                    self.note(arg_span, format!("argument {index} is of type '{display}'"));
                }
                Err(Poisoned)
            },
            _ => Err(self.error(span, format!("'{name}' requires template arguments"))),
        }
    }

    fn no_matching_constructor(&mut self, name: &str, types: &[TypeId], span: Span) -> Poisoned {
        let types: Vec<_> = types.iter().map(|ty| self.types.display(*ty)).collect();
        self.error(span, format!("no matching constructor for {name}({})", types.join(", ")))
    }

    /// Resolves a value constructor or conversion to `ty`.
    fn construct(&mut self, ty: TypeId, arguments: Vec<Argument>, span: Span) -> Fallible<ExprInfo> {
        if !self.types.is_constructible(ty) {
            let message = match self.types.is_runtime_array(ty) {
                true => "cannot construct a runtime-sized array".to_string(),
                false => format!("type '{}' is not constructible", self.types.display(ty)),
            };
            return Err(self.error(span, message));
        }

        if arguments.is_empty() {
            return Ok(match ConstantValue::zero(&mut self.types, ty) {
                Some(value) => ExprInfo { value: Some(value), ..ExprInfo::new(ty, EvaluationStage::Constant) },
                None => ExprInfo::new(ty, EvaluationStage::Constant),
            });
        }

        let arguments: Vec<Argument> =
            arguments.into_iter().map(|(arg, info)| (arg, self.load(info))).collect();
        let params = self.constructor_params(ty, &arguments, span)?;

        let mut materialized = Vec::with_capacity(arguments.len());
        let mut failed = false;
        for ((arg, info), param) in arguments.into_iter().zip(params) {
            match self.materialize(arg, info, Some(param)) {
                Ok(info) => materialized.push(info),
                Err(Poisoned) => failed = true,
            }
        }
        if failed {
            return Err(Poisoned);
        }

        let stage = materialized.iter().map(|info| info.stage).max().unwrap_or(EvaluationStage::Constant);
        let mut info = ExprInfo::new(ty, stage);
        let values: Option<Vec<ConstantValue>> = materialized.into_iter().map(|info| info.value).collect();
        if let Some(values) = values {
            let value = self.construct_value(ty, values).map_err(|message| self.error(span, message))?;
            info.value = Some(value);
        }
        Ok(info)
    }

    /// The types the arguments of a constructor of `ty` are converted to.
    fn constructor_params(&mut self, ty: TypeId, arguments: &[Argument], span: Span) -> Fallible<Vec<TypeId>> {
        let types: Vec<TypeId> = arguments.iter().map(|(_, info)| info.ty).collect();
        let params = match self.types.get(ty) {
            Type::Scalar(_) => match types[..] {
                [arg] if self.types.scalar(arg).is_some() => Some(vec![self.conversion_source(arg, ty)]),
                _ => None,
            },
            Type::Vector { size, elem } => self.vector_params(&types, size, elem, ty),
            Type::Matrix { columns, rows, elem } => self.matrix_params(&types, columns, rows, elem, ty),
            Type::Array { elem, count: ArrayCount::Constant(count), .. } => {
                if types.len() != count as usize {
                    let which = if types.len() < count as usize { "few" } else { "many" };
                    return Err(self.error(
                        span,
                        format!("array constructor has too {which} elements: expected {count}, found {}", types.len()),
                    ));
                }
                let mut failed = false;
                for (index, &arg) in types.iter().enumerate() {
                    if !self.types.can_convert(arg, elem) {
                        let (found, expected) = (self.types.display(arg), self.types.display(elem));
                        let arg_span = self.expr_span(arguments[index].0);
                        self.error(arg_span, format!("'{found}' cannot be used to construct an array of '{expected}'"));
                        failed = true;
                    }
                }
                if failed {
                    return Err(Poisoned);
                }
                Some(vec![elem; types.len()])
            },
            Type::Struct(id) => {
                let members: Vec<TypeId> = self.types.struct_info(id).members.iter().map(|member| member.ty).collect();
                if types.len() != members.len() {
                    let which = if types.len() < members.len() { "few" } else { "many" };
                    return Err(self.error(
                        span,
                        format!(
                            "structure constructor has too {which} inputs: expected {}, found {}",
                            members.len(),
                            types.len()
                        ),
                    ));
                }
                let mut failed = false;
                for (index, (&arg, &member)) in types.iter().zip(members.iter()).enumerate() {
                    if !self.types.can_convert(arg, member) {
                        let (expected, found) = (self.types.display(member), self.types.display(arg));
                        let arg_span = self.expr_span(arguments[index].0);
                        self.error(
                            arg_span,
                            format!(
                                "type in structure constructor does not match struct member type: expected '{expected}', found '{found}'"
                            ),
                        );
                        failed = true;
                    }
                }
                if failed {
                    return Err(Poisoned);
                }
                Some(members)
            },
            _ => None,
        };

        match params {
            Some(params) => Ok(params),
            None => {
                let name = self.types.display(ty);
                Err(self.no_matching_constructor(&name, &types, span))
            },
        }
    }

    /// The type an argument of a conversion is materialized to before it is converted.
    fn conversion_source(&mut self, arg: TypeId, target: TypeId) -> TypeId {
        match self.types.can_convert(arg, target) {
            true => target,
            false => self.types.concretize(arg),
        }
    }

    fn vector_params(&mut self, types: &[TypeId], size: u8, elem: TypeId, ty: TypeId) -> Option<Vec<TypeId>> {
        if let [arg] = *types {
            return match self.types.get(arg) {
                Type::Vector { size: n, .. } if n == size => Some(vec![self.conversion_source(arg, ty)]),
                Type::Scalar(_) if self.types.can_convert(arg, elem) => Some(vec![elem]),
                _ => None,
            };
        }

        let mut params = Vec::with_capacity(types.len());
        let mut components = 0;
        for &arg in types {
            let param = match self.types.get(arg) {
                Type::Scalar(_) => elem,
                Type::Vector { size: n, .. } => self.types.vector(elem, n),
                _ => return None,
            };
            if !self.types.can_convert(arg, param) {
                return None;
            }
            components += self.types.vector_size(param).unwrap_or(1);
            params.push(param);
        }
        (components == size).then_some(params)
    }

    fn matrix_params(
        &mut self,
        types: &[TypeId],
        columns: u8,
        rows: u8,
        elem: TypeId,
        ty: TypeId,
    ) -> Option<Vec<TypeId>> {
        if let [arg] = *types {
            return match self.types.get(arg) {
                Type::Matrix { columns: c, rows: r, .. } if (c, r) == (columns, rows) => {
                    Some(vec![self.conversion_source(arg, ty)])
                },
                _ => None,
            };
        }

        let column = self.types.vector(elem, rows);
        let scalars = usize::from(columns) * usize::from(rows);
        if types.len() == scalars
            && types.iter().all(|&arg| self.types.scalar(arg).is_some() && self.types.can_convert(arg, elem))
        {
            return Some(vec![elem; scalars]);
        }
        if types.len() == usize::from(columns) && types.iter().all(|&arg| self.types.can_convert(arg, column)) {
            return Some(vec![column; types.len()]);
        }
        None
    }

    /// Builds the value of a constructor from the converted values of its arguments.
    fn construct_value(&mut self, ty: TypeId, values: Vec<ConstantValue>) -> EvalResult {
        match self.types.get(ty) {
            Type::Scalar(_) => convert_value(&mut self.types, &values[0], ty),
            Type::Vector { size, .. } => {
                if let [single] = &values[..] {
                    return match single {
                        ConstantValue::Composite { .. } => convert_value(&mut self.types, single, ty),
                        scalar => Ok(ConstantValue::splat(ty, size, scalar.clone())),
                    };
                }
                let mut elements = Vec::with_capacity(usize::from(size));
                for value in values {
                    match value {
                        ConstantValue::Composite { elements: inner, .. } => elements.extend(inner),
                        scalar => elements.push(scalar),
                    }
                }
                Ok(ConstantValue::Composite { ty, elements })
            },
            Type::Matrix { columns, rows, elem } => {
                if values.len() == 1 {
                    return convert_value(&mut self.types, &values[0], ty);
                }
                if values.len() == usize::from(columns) {
                    return Ok(ConstantValue::Composite { ty, elements: values });
                }
                let column = self.types.vector(elem, rows);
                let elements = values
                    .chunks(usize::from(rows))
                    .map(|chunk| ConstantValue::Composite { ty: column, elements: chunk.to_vec() })
                    .collect();
                Ok(ConstantValue::Composite { ty, elements })
            },
            _ => Ok(ConstantValue::Composite { ty, elements: values }),
        }
    }
}

/// The number of bits in a concrete numeric scalar or vector.
fn bit_width(types: &Types, ty: TypeId) -> Option<u32> {
    if !types.is_numeric_scalar_or_vector(ty) {
        return None;
    }
    let width = match types.element_scalar(ty)? {
        Scalar::I32 | Scalar::U32 | Scalar::F32 => 32,
        Scalar::F16 => 16,
        _ => return None,
    };
    Some(width * types.vector_size(ty).map_or(1, u32::from))
}

/// Reinterprets the bits of a constant with 32-bit elements. Returns `None` if either side has
/// 16-bit elements, which are not folded.
fn bitcast_value(types: &Types, value: &ConstantValue, target: TypeId) -> Option<EvalResult> {
    let scalar = types.element_scalar(target)?;
    match value {
        ConstantValue::Composite { elements, .. } => {
            let mut converted = Vec::with_capacity(elements.len());
            for element in elements {
                match bitcast_scalar(element, scalar)? {
                    Ok(element) => converted.push(element),
                    Err(message) => return Some(Err(message)),
                }
            }
            Some(Ok(ConstantValue::Composite { ty: target, elements: converted }))
        },
        scalar_value => bitcast_scalar(scalar_value, scalar),
    }
}

fn bitcast_scalar(value: &ConstantValue, target: Scalar) -> Option<EvalResult> {
    let bits = match *value {
        ConstantValue::I32(value) => value as u32,
        ConstantValue::U32(value) => value,
        ConstantValue::F32(value) => value.to_bits(),
        _ => return None,
    };
    Some(match target {
        Scalar::I32 => Ok(ConstantValue::I32(bits as i32)),
        Scalar::U32 => Ok(ConstantValue::U32(bits)),
        Scalar::F32 => {
            let value = f32::from_bits(bits);
            match value.is_finite() {
                true => Ok(ConstantValue::F32(value)),
                false => Err(format!("value {bits:#x} cannot be represented as 'f32'")),
            }
        },
        _ => return None,
    })
}

/// Type expressions.
impl<'m> Context<'m> {
    /// Resolves an expression naming a type and records it in the side-table.
    pub(super) fn resolve_type(&mut self, expr: ExprId) -> Fallible<TypeId> {
        let module = self.module;
        let node = &module.exprs[expr];
        let ExprKind::Ident(templated) = &node.kind else {
            return Err(self.error(node.span, "expected a type"));
        };
        let ident = templated.ident;
        let name = self.name(ident);

        let ty = match self.lookup(ident) {
            None => return Err(self.error(ident.span, format!("unresolved type '{name}'"))),
            Some(Binding::Struct(strukt)) => {
                self.no_template(templated)?;
                self.sem.structs.get(strukt).copied().ok_or(Poisoned)?
            },
            Some(Binding::Alias(alias)) => {
                self.no_template(templated)?;
                let ty = self.sem.aliases.get(alias).copied().ok_or(Poisoned)?;
                self.sem.type_aliases.insert(expr, alias);
                ty
            },
            Some(Binding::BuiltinType(builtin)) => self.builtin_type(builtin, templated, node.span)?,
            Some(Binding::Variable(var)) => {
                self.error(ident.span, format!("'{name}' is not a type"));
                self.note(module.vars[var].name.span, format!("'{name}' declared here"));
                return Err(Poisoned);
            },
            Some(Binding::Function(func)) => {
                self.error(ident.span, format!("'{name}' is not a type"));
                self.note(module.functions[func].name.span, format!("'{name}' declared here"));
                return Err(Poisoned);
            },
            Some(Binding::BuiltinFunction(_)) => {
                return Err(self.error(ident.span, format!("'{name}' is not a type")));
            },
        };

        self.sem.type_exprs.insert(expr, ty);
        Ok(ty)
    }

    /// Reads an identifier used as an enumerant, such as an address space or texel format.
    pub(super) fn enumerant(&mut self, expr: ExprId) -> Fallible<(&'m str, Span)> {
        let module = self.module;
        let node = &module.exprs[expr];
        match &node.kind {
            ExprKind::Ident(templated) if templated.template.is_empty() => {
                Ok((module.name(templated.ident), node.span))
            },
            _ => Err(self.error(node.span, "expected an identifier")),
        }
    }

    pub(super) fn address_space(&mut self, expr: ExprId) -> Fallible<(AddressSpace, Span)> {
        let (name, span) = self.enumerant(expr)?;
        match AddressSpace::from_name(name) {
            Some(space) => Ok((space, span)),
            None => Err(self.error(span, format!("unresolved address space '{name}'"))),
        }
    }

    pub(super) fn access_mode(&mut self, expr: ExprId) -> Fallible<(Access, Span)> {
        let (name, span) = self.enumerant(expr)?;
        match Access::from_name(name) {
            Some(access) => Ok((access, span)),
            None => Err(self.error(span, format!("unresolved access '{name}'"))),
        }
    }

    fn template_arity(&mut self, templated: &TemplatedIdent, arity: usize, span: Span) -> Fallible<()> {
        let count = templated.template.len();
        if count == arity {
            return Ok(());
        }
        let name = self.name(templated.ident);
        Err(self.error(
            span,
            match arity {
                0 => format!("type '{name}' does not take template arguments"),
                1 => format!("'{name}' requires 1 template argument"),
                _ => format!("'{name}' requires {arity} template arguments"),
            },
        ))
    }

    fn builtin_type(&mut self, builtin: BuiltinType, templated: &'m TemplatedIdent, span: Span) -> Fallible<TypeId> {
        let template = &templated.template[..];
        match builtin {
            BuiltinType::Scalar(scalar) => {
                self.template_arity(templated, 0, span)?;
                if scalar == Scalar::F16 {
                    self.require_f16(span, "type")?;
                }
                Ok(scalar.id())
            },
            BuiltinType::Vector { size, elem } => {
                let elem = match elem {
                    Some(elem) => {
                        self.template_arity(templated, 0, span)?;
                        elem
                    },
                    None => {
                        self.template_arity(templated, 1, span)?;
                        let elem = self.resolve_type(template[0])?;
                        match self.types.scalar(elem) {
                            Some(scalar) if !scalar.is_abstract() => scalar,
                            _ => {
                                let span = self.expr_span(template[0]);
                                return Err(self.error(
                                    span,
                                    "vector element type must be 'bool', 'f32', 'f16', 'i32' or 'u32'",
                                ));
                            },
                        }
                    },
                };
                if elem == Scalar::F16 {
                    self.require_f16(span, "type")?;
                }
                Ok(self.types.vector(elem.id(), size))
            },
            BuiltinType::Matrix { columns, rows, elem } => {
                let elem = match elem {
                    Some(elem) => {
                        self.template_arity(templated, 0, span)?;
                        elem
                    },
                    None => {
                        self.template_arity(templated, 1, span)?;
                        let elem = self.resolve_type(template[0])?;
                        match self.types.scalar(elem) {
                            Some(scalar @ (Scalar::F32 | Scalar::F16)) => scalar,
                            _ => {
                                let span = self.expr_span(template[0]);
                                return Err(self.error(span, "matrix element type must be 'f32' or 'f16'"));
                            },
                        }
                    },
                };
                if elem == Scalar::F16 {
                    self.require_f16(span, "type")?;
                }
                Ok(self.types.matrix(elem.id(), columns, rows))
            },
            BuiltinType::Array => self.array_type(template, span),
            BuiltinType::Atomic => {
                self.template_arity(templated, 1, span)?;
                let elem = self.resolve_type(template[0])?;
                if !matches!(self.types.scalar(elem), Some(Scalar::I32 | Scalar::U32)) {
                    let span = self.expr_span(template[0]);
                    return Err(self.error(span, "atomic only supports i32 or u32 types"));
                }
                Ok(self.types.atomic(elem))
            },
            BuiltinType::Pointer => self.pointer_type(template, span),
            BuiltinType::Sampler { comparison } => {
                self.template_arity(templated, 0, span)?;
                Ok(self.types.intern(Type::Sampler { comparison }))
            },
            BuiltinType::SampledTexture(dimension) => {
                self.template_arity(templated, 1, span)?;
                let sampled = self.sampled_type(template[0])?;
                Ok(self.types.intern(Type::Texture(TextureKind::Sampled { dimension, sampled })))
            },
            BuiltinType::MultisampledTexture => {
                self.template_arity(templated, 1, span)?;
                let sampled = self.sampled_type(template[0])?;
                Ok(self.types.intern(Type::Texture(TextureKind::Multisampled { sampled })))
            },
            BuiltinType::DepthTexture(dimension) => {
                self.template_arity(templated, 0, span)?;
                Ok(self.types.intern(Type::Texture(TextureKind::Depth { dimension })))
            },
            BuiltinType::DepthMultisampledTexture => {
                self.template_arity(templated, 0, span)?;
                Ok(self.types.intern(Type::Texture(TextureKind::DepthMultisampled)))
            },
            BuiltinType::StorageTexture(dimension) => {
                self.template_arity(templated, 2, span)?;
                let (name, format_span) = self.enumerant(template[0])?;
                let Some(format) = TexelFormat::from_name(name) else {
                    return Err(self.error(format_span, format!("unresolved texel format '{name}'")));
                };
                let (access, _) = self.access_mode(template[1])?;
                Ok(self.types.intern(Type::Texture(TextureKind::Storage { dimension, format, access })))
            },
            BuiltinType::ExternalTexture => {
                self.template_arity(templated, 0, span)?;
                Ok(self.types.intern(Type::Texture(TextureKind::External)))
            },
        }
    }

    fn sampled_type(&mut self, expr: ExprId) -> Fallible<TypeId> {
        let ty = self.resolve_type(expr)?;
        if !matches!(self.types.scalar(ty), Some(Scalar::F32 | Scalar::I32 | Scalar::U32)) {
            let span = self.expr_span(expr);
            return Err(self.error(span, "texture sampled type must be 'f32', 'i32' or 'u32'"));
        }
        Ok(ty)
    }

    fn array_type(&mut self, template: &[ExprId], span: Span) -> Fallible<TypeId> {
        let (elem_expr, count_expr) = match *template {
            [elem] => (elem, None),
            [elem, count] => (elem, Some(count)),
            _ => return Err(self.error(span, "'array' requires 1 or 2 template arguments")),
        };

        let elem = self.resolve_type(elem_expr)?;
        let elem_span = self.expr_span(elem_expr);
        if !self.types.is_plain(elem) {
            let display = self.types.display(elem);
            return Err(self.error(elem_span, format!("'{display}' cannot be used as an element type of an array")));
        }
        let nested_runtime_array = self.types.is_runtime_array(elem)
            || self.types.as_struct(elem).is_some_and(|info| info.has_runtime_array(&self.types));
        if nested_runtime_array {
            return Err(self.error(elem_span, "an array element type cannot contain a runtime-sized array"));
        }

        let Some(count_expr) = count_expr else {
            return Ok(self.types.array(elem, ArrayCount::Runtime));
        };
        match self.array_count(count_expr)? {
            ArrayCount::Override(var) => {
                let name = self.name(self.module.vars[var].name);
                Ok(self.types.override_sized_array(elem, var, name))
            },
            count => {
                let ty = self.types.array(elem, count);
                let size = self.types.size_of(ty);
                if size > u64::from(u32::MAX) {
                    return Err(self.error(span, format!("array byte size (0x{size:x}) must not exceed 0xffffffff bytes")));
                }
                Ok(ty)
            },
        }
    }

    fn array_count(&mut self, expr: ExprId) -> Fallible<ArrayCount> {
        let span = self.expr_span(expr);
        let info = self.expression(expr)?;
        self.require_stage(expr, &info, "array count", EvaluationStage::Override)?;

        let ty = self.types.unwrap_ref(info.ty);
        if !matches!(self.types.scalar(ty), Some(Scalar::AbstractInt | Scalar::I32 | Scalar::U32)) {
            return Err(self.error(
                span,
                "array count must evaluate to a constant integer expression or override variable",
            ));
        }

        if info.stage == EvaluationStage::Override {
            let names_override = matches!(self.module.exprs[expr].kind, ExprKind::Ident(_))
                && info
                    .source_variable
                    .and_then(|var| self.sem.vars.get(var))
                    .is_some_and(|var| var.kind == VariableKind::Override);
            return match (names_override, info.source_variable) {
                (true, Some(var)) => Ok(ArrayCount::Override(var)),
                _ => Err(self.error(
                    span,
                    "array count must evaluate to a constant integer expression or override variable",
                )),
            };
        }

        let info = self.value(expr, info, None)?;
        let count = info.value.as_ref().and_then(ConstantValue::as_int).unwrap_or_default();
        if count < 1 {
            return Err(self.error(span, format!("array count ({count}) must be greater than 0")));
        }
        match u32::try_from(count) {
            Ok(count) => Ok(ArrayCount::Constant(count)),
            Err(_) => Err(self.error(span, format!("array count ({count}) must be less than 4294967296"))),
        }
    }

    fn pointer_type(&mut self, template: &[ExprId], span: Span) -> Fallible<TypeId> {
        let (space_expr, store_expr, access_expr) = match *template {
            [] => return Err(self.error(span, "ptr missing address space")),
            [_] => return Err(self.error(span, "ptr missing store type")),
            [space, store] => (space, store, None),
            [space, store, access] => (space, store, Some(access)),
            _ => return Err(self.error(span, "'ptr' requires 2 or 3 template arguments")),
        };

        let (space, _) = self.address_space(space_expr)?;
        let store = self.resolve_type(store_expr)?;
        if !self.types.is_storable(store) {
            let display = self.types.display(store);
            let store_span = self.expr_span(store_expr);
            return Err(self.error(store_span, format!("'{display}' cannot be used as the store type of a pointer")));
        }

        let access = match access_expr {
            None => space.default_access(),
            Some(access_expr) => {
                let (access, access_span) = self.access_mode(access_expr)?;
                if space != AddressSpace::Storage {
                    return Err(self.error(
                        access_span,
                        "only pointers in <storage> address space may specify an access mode",
                    ));
                }
                access
            },
        };
        Ok(self.types.pointer(space, store, access))
    }
}

#[cfg(test)]
mod tests {
    use expect_test::{expect, Expect};
    use indoc::indoc;

    use crate::ast::Module;
    use crate::resolve::{resolve, Resolved};

    fn resolve_source(source: &str) -> (Module, Resolved) {
        let module = crate::parse::parse(source).unwrap_or_else(|error| panic!("{error}"));
        let resolved = resolve(&module);
        (module, resolved)
    }

    fn check(source: &str, expected: Expect) {
        let (_, resolved) = resolve_source(source);
        expected.assert_eq(&resolved.diagnostics().to_string());
    }

    fn check_dump(source: &str, expected: Expect) {
        let (module, resolved) = resolve_source(source);
        assert!(resolved.is_valid(), "unexpected errors:\n{}", resolved.diagnostics());
        expected.assert_eq(&resolved.dump(&module));
    }

    #[test]
    fn folds_constants() {
        check_dump(
            indoc! {"
                const a = 1 + 2 * 3;
                const b = vec3(1, 2, 3).zy;
                const c = array(1.5, 2, 3)[1];
                const d = mat2x2(1.0, 2.0, 3.0, 4.0) * vec2(1.0, 0.0);
                const e: u32 = max(3u, 7);
                const f = -(1.0 / 4.0);
                const g = !(a > 5 && true);
                const h = vec2<f32>(2.0).y;
                const i = i32(2.9);
                const j = bitcast<u32>(-1i);
                struct S { x: i32, y: vec2<f32> }
                const k = S(1, vec2(2.0)).y.x;
            "},
            expect![[r#"
                const a: abstract-int = 7
                const b: vec2<abstract-int> = vec2<abstract-int>(3, 2)
                const c: abstract-float = 2
                const d: vec2<abstract-float> = vec2<abstract-float>(1, 2)
                const e: u32 = u32(7)
                const f: abstract-float = -0.25
                const g: bool = false
                const h: f32 = f32(2)
                const i: i32 = i32(2)
                const j: u32 = u32(4294967295)
                struct S (size 16, align 8)
                    @offset(0) x: i32
                    @offset(8) y: vec2<f32>
                const k: f32 = f32(2)
            "#]],
        );
    }

    #[test]
    fn evaluation_errors() {
        check(
            indoc! {"
                const a = 9223372036854775807 + 1;
                const b = 1 / 0;
                const c = sqrt(-1.0);
                const d = vec3(1, 2, 3)[3];
                const e = u32(-1.5);
            "},
            expect![[r#"
                1:11 error: '9223372036854775807 + 1' cannot be represented as 'abstract-int'
                2:11 error: integer division by zero is invalid
                3:11 error: sqrt must be called with a value >= 0
                4:25 error: index 3 out of bounds [0..2]
                5:11 error: value -1.5 cannot be represented as 'u32'"#]],
        );
    }

    #[test]
    fn concrete_float_conversions_saturate() {
        check_dump(
            indoc! {"
                const a = i32(1e10f);
                const b = u32(-2.5f);
                const c = u32(5e9f);
                const d = vec2<i32>(vec2(-3e9f, 1.5f));
            "},
            expect![[r#"
                const a: i32 = i32(2147483647)
                const b: u32 = u32(0)
                const c: u32 = u32(4294967295)
                const d: vec2<i32> = vec2<i32>(-2147483648, 1)
            "#]],
        );
    }

    #[test]
    fn unresolved_names() {
        check(
            indoc! {"
                fn f() {
                    let a = b;
                    let c: T = 1;
                    let d = g();
                }
            "},
            expect![[r#"
                2:13 error: unresolved identifier 'b'
                3:12 error: unresolved type 'T'
                4:13 error: unresolved call target 'g'"#]],
        );
    }

    #[test]
    fn wrong_kind_of_name() {
        check(
            indoc! {"
                struct S { x: f32 }
                fn g() {}
                fn f() {
                    let a = S;
                    let b = g;
                    let v = 1;
                    let c = v();
                    let d: v = 1;
                }
            "},
            expect![[r#"
                4:13 error: cannot use type 'S' as value
                5:13 error: cannot use function 'g' as value
                2:4 note: function 'g' declared here
                7:13 error: cannot call variable 'v'
                6:9 note: 'v' declared here
                8:12 error: 'v' is not a type
                6:9 note: 'v' declared here"#]],
        );
    }

    #[test]
    fn operators() {
        check(
            indoc! {"
                fn f() {
                    let a = 1 + true;
                    let b = vec2(1.0) * vec3(1.0);
                    let c = -true;
                    let d = 1u << 32u;
                }
            "},
            expect![[r#"
                2:13 error: no matching overload for operator + (abstract-int, bool)
                3:13 error: no matching overload for operator * (vec2<abstract-float>, vec3<abstract-float>)
                4:13 error: no matching overload for operator - (bool)
                5:13 error: shift left value must be less than the bit width of the lhs, which is 32"#]],
        );
    }

    #[test]
    fn swizzles() {
        check(
            indoc! {"
                fn f() {
                    var v = vec3(1.0, 2.0, 3.0);
                    let a = v.xq;
                    let b = v.xg;
                    let c = v.w;
                    let d = v.xyzxy;
                    let e = &v.x;
                    let ok: vec2<f32> = v.zx;
                }
            "},
            expect![[r#"
                3:15 error: invalid vector swizzle character
                4:15 error: invalid mixing of vector swizzle characters rgba with xyzw
                5:15 error: invalid vector swizzle member
                6:15 error: invalid vector swizzle size
                7:13 error: cannot take the address of a vector component"#]],
        );
    }

    #[test]
    fn references_and_pointers() {
        let (module, resolved) = resolve_source(indoc! {"
            struct S { a: array<vec4<f32>, 4> }
            @group(0) @binding(0) var<storage, read_write> buffer: S;
            fn f() {
                let p = &buffer.a[1];
                let x = (*p).y;
                let y = p[2];
            }
        "});
        assert!(resolved.is_valid(), "{}", resolved.diagnostics());
        let types = resolved.types();
        let buffer = module.vars.iter().find(|(_, var)| module.name(var.name) == "buffer").unwrap().0;
        let display: Vec<_> = module
            .vars
            .iter()
            .filter(|(_, var)| var.kind == crate::ast::VariableKind::Let)
            .map(|(id, var)| {
                let init = var.initializer.unwrap();
                assert_eq!(resolved.source_variable_of(init), Some(buffer));
                format!("{} {}", module.name(var.name), types.display(resolved.variable(id).unwrap().ty))
            })
            .collect();
        expect![[r#"
            [
                "p ptr<storage, vec4<f32>, read_write>",
                "x f32",
                "y f32",
            ]
        "#]]
        .assert_debug_eq(&display);
    }

    #[test]
    fn constructors() {
        check(
            indoc! {"
                struct S { a: i32, b: f32 }
                fn f() {
                    let a = vec3<f32>(1.0, 2.0);
                    let b = array<i32, 2>(1, 2, 3);
                    let c = S(1);
                    let d = S(1, true);
                    let e = array(1, true);
                }
            "},
            expect![[r#"
                3:13 error: no matching constructor for vec3<f32>(abstract-float, abstract-float)
                4:13 error: array constructor has too many elements: expected 2, found 3
                5:13 error: structure constructor has too few inputs: expected 2, found 1
                6:18 error: type in structure constructor does not match struct member type: expected 'f32', found 'bool'
                7:13 error: cannot infer common array element type from initializer arguments
                7:19 note: argument 0 is of type 'abstract-int'
                7:22 note: argument 1 is of type 'bool'"#]],
        );
    }

    #[test]
    fn type_expressions() {
        check(
            indoc! {"
                alias A = vec3<bool>;
                alias B = mat2x2<i32>;
                alias C = array<texture_2d<f32>, 2>;
                alias D = atomic<f32>;
                alias E = ptr<private, i32, read>;
                alias F = vec2h;
                alias G = array<f32, 0>;
            "},
            expect![[r#"
                2:18 error: matrix element type must be 'f32' or 'f16'
                3:17 error: 'texture_2d<f32>' cannot be used as an element type of an array
                4:18 error: atomic only supports i32 or u32 types
                5:29 error: only pointers in <storage> address space may specify an access mode
                6:11 error: f16 type used without 'f16' extension enabled
                7:22 error: array count (0) must be greater than 0"#]],
        );
    }

    #[test]
    fn override_sized_arrays() {
        check(
            indoc! {"
                override n: u32 = 4;
                var<workgroup> a: array<f32, n>;
                var<workgroup> b: array<f32, n * 2>;
                fn f() {
                    let x = 3u;
                    var c: array<f32, x>;
                }
            "},
            expect![[r#"
                3:30 error: array count must evaluate to a constant integer expression or override variable
                6:23 error: array count requires an override-expression, but expression is a runtime-expression"#]],
        );
    }

    #[test]
    fn builtin_calls() {
        check(
            indoc! {"
                fn f() {
                    let a = clamp(1, 2.0, 3u);
                    let b = dot(vec2(1.0), vec3(1.0));
                    let c = bitcast<f32>(1.0h);
                }
            "},
            expect![[r#"
                2:13 error: no matching call to 'clamp(abstract-int, abstract-float, u32)'
                3:13 error: no matching call to 'dot(vec2<abstract-float>, vec3<abstract-float>)'
                4:26 error: f16 literal used without 'f16' extension enabled"#]],
        );
    }

    #[test]
    fn expression_depth_limit() {
        let source = format!("const a = {}1{};", "-(".repeat(600), ")".repeat(600));
        let text = std::thread::Builder::new()
            .stack_size(256 << 20)
            .spawn(move || resolve_source(&source).1.diagnostics().to_string())
            .unwrap()
            .join()
            .unwrap();
        assert_eq!(text.matches("reached max expression depth of 512").count(), 1, "{text}");
    }
}
