//! Variable and function declarations, and the statements of function bodies.

use std::collections::HashMap;

use crate::ast::{
    Attribute, AttributeKind, BinaryOp, Block, CaseSelector, ExprId, ExprKind, FnId, StmtId,
    StmtKind, SwitchClause, VarId, VariableKind,
};
use crate::diagnostic::Span;

use super::builtin;
use super::constant::ConstantValue;
use super::sem::{
    Behaviors, BindingPoint, EvaluationStage, ExprInfo, FunctionInfo, IoAttributes, PipelineStage,
    VariableInfo, WorkgroupDimension,
};
use super::types::{Access, AddressSpace, Scalar, Type, TypeId};
use super::{Binding, Construct, Context, Fallible, FunctionState, Poisoned};

const MAX_STATEMENT_DEPTH: usize = 127;
const MAX_PARAMETERS: usize = 255;

fn variable_info(kind: VariableKind, ty: TypeId, stage: EvaluationStage, global: bool) -> VariableInfo {
    VariableInfo {
        kind,
        ty,
        store_type: ty,
        space: None,
        access: None,
        stage,
        value: None,
        binding: None,
        override_id: None,
        io: IoAttributes::default(),
        global,
    }
}

/// Declarations.
impl<'m> Context<'m> {
    /// Resolves a `const`, `override`, `let` or `var` declaration.
    pub(super) fn variable(&mut self, id: VarId, global: bool) -> Fallible<()> {
        let info = match self.module.vars[id].kind {
            VariableKind::Const => self.const_declaration(id, global)?,
            VariableKind::Override => self.override_declaration(id)?,
            VariableKind::Let => self.let_declaration(id)?,
            VariableKind::Var if global => self.module_var(id)?,
            VariableKind::Var => self.function_var(id)?,
            VariableKind::Parameter => unreachable!("parameters are resolved with their function"),
        };
        self.sem.vars.insert(id, info);
        Ok(())
    }

    /// Resolves the declared type and the initializer of a variable, converting the initializer
    /// to the declared type. Returns the type of the variable and its initializer.
    fn typed_initializer(
        &mut self,
        id: VarId,
        constraint: Option<(&str, EvaluationStage)>,
    ) -> Fallible<(TypeId, Option<ExprInfo>)> {
        let module = self.module;
        let decl = &module.vars[id];

        let declared = decl.ty.map(|ty| self.resolve_type(ty));
        let initializer = decl.initializer.map(|init| (init, self.expression(init)));
        let declared = declared.transpose()?;

        let Some((init, info)) = initializer else {
            return match declared {
                _ if matches!(decl.kind, VariableKind::Const | VariableKind::Let) => Err(self.error(
                    decl.name.span,
                    format!("'{}' declaration must have an initializer", decl.kind.as_str()),
                )),
                Some(ty) => Ok((ty, None)),
                None => Err(self.error(
                    decl.name.span,
                    format!("'{}' declaration requires a type or initializer", decl.kind.as_str()),
                )),
            };
        };
        let info = info?;
        if let Some((what, latest)) = constraint {
            self.require_stage(init, &info, what, latest)?;
        }

        let info = match (decl.kind, declared) {
            // an untyped `const` keeps its abstract type
            (VariableKind::Const, None) => self.load(info),
            (_, target) => self.value(init, info, target)?,
        };

        if let Some(ty) = declared {
            if info.ty != ty {
                let expected = self.types.display(ty);
                let found = self.types.display(info.ty);
                return Err(self.error(
                    decl.name.span,
                    format!(
                        "cannot initialize {} of type '{expected}' with value of type '{found}'",
                        decl.kind.as_str()
                    ),
                ));
            }
        }
        Ok((declared.unwrap_or(info.ty), Some(info)))
    }

    fn const_declaration(&mut self, id: VarId, global: bool) -> Fallible<VariableInfo> {
        if global {
            let module = self.module;
            self.check_attributes(&module.vars[id].attributes, &[], "'const' declaration");
        }
        let (ty, init) = self.typed_initializer(id, Some(("const initializer", EvaluationStage::Constant)))?;
        Ok(VariableInfo {
            value: init.and_then(|init| init.value),
            ..variable_info(VariableKind::Const, ty, EvaluationStage::Constant, global)
        })
    }

    fn override_declaration(&mut self, id: VarId) -> Fallible<VariableInfo> {
        let module = self.module;
        let decl = &module.vars[id];
        self.check_attributes(&decl.attributes, &[AttributeKind::Id], "'override' declaration");

        let override_id = match Self::attribute(&decl.attributes, AttributeKind::Id) {
            Some(attribute) => {
                let value = self.attribute_integer(attribute, "@id")?;
                match u16::try_from(value) {
                    Ok(value) => Some(value),
                    Err(_) => return Err(self.error(attribute.span, "@id value must be between 0 and 65535")),
                }
            },
            None => None,
        };

        let (ty, _) = self.typed_initializer(id, Some(("override initializer", EvaluationStage::Override)))?;
        if !matches!(self.types.scalar(ty), Some(scalar) if !scalar.is_abstract()) {
            let display = self.types.display(ty);
            return Err(self.error(decl.name.span, format!("'{display}' cannot be used as the type of an 'override'")));
        }

        Ok(VariableInfo { override_id, ..variable_info(VariableKind::Override, ty, EvaluationStage::Override, true) })
    }

    fn let_declaration(&mut self, id: VarId) -> Fallible<VariableInfo> {
        let (ty, init) = self.typed_initializer(id, None)?;
        if !self.types.is_constructible(ty) && !self.types.is_pointer(ty) {
            let display = self.types.display(ty);
            let span = self.module.vars[id].name.span;
            return Err(self.error(span, format!("'{display}' cannot be used as the type of a 'let'")));
        }
        Ok(VariableInfo {
            value: init.and_then(|init| init.value),
            ..variable_info(VariableKind::Let, ty, EvaluationStage::Runtime, false)
        })
    }

    fn function_var(&mut self, id: VarId) -> Fallible<VariableInfo> {
        let module = self.module;
        let decl = &module.vars[id];

        match decl.template[..] {
            [] => {},
            [space] => {
                let (space, span) = self.address_space(space)?;
                if space != AddressSpace::Function {
                    return Err(self.error(
                        span,
                        "function-scope 'var' declaration must use 'function' address space",
                    ));
                }
            },
            [_, access, ..] => {
                let span = self.expr_span(access);
                return Err(self.error(span, "only variables in <storage> address space may specify an access mode"));
            },
        }

        let (store, _) = self.typed_initializer(id, None)?;
        if !self.types.is_constructible(store) {
            let display = self.types.display(store);
            return Err(self.error(
                decl.name.span,
                format!("function-scope 'var' must have a constructible type, found '{display}'"),
            ));
        }
        self.check_store(id, store, AddressSpace::Function, Access::ReadWrite)?;

        let ty = self.types.reference(AddressSpace::Function, store, Access::ReadWrite);
        Ok(VariableInfo {
            ty,
            store_type: store,
            space: Some(AddressSpace::Function),
            access: Some(Access::ReadWrite),
            ..variable_info(VariableKind::Var, ty, EvaluationStage::Runtime, false)
        })
    }

    fn module_var(&mut self, id: VarId) -> Fallible<VariableInfo> {
        use AttributeKind as A;

        let module = self.module;
        let decl = &module.vars[id];
        self.check_attributes(&decl.attributes, &[A::Group, A::Binding], "module-scope 'var'");

        if let Some(&extra) = decl.template.get(2) {
            let span = self.expr_span(extra);
            return Err(self.error(span, "'var' takes at most 2 template arguments"));
        }
        let space = match decl.template.first() {
            Some(&expr) => Some(self.address_space(expr)?),
            None => None,
        };
        let access = match decl.template.get(1) {
            Some(&expr) => Some(self.access_mode(expr)?),
            None => None,
        };

        let (store, init) = self.typed_initializer(id, Some(("module-scope 'var' initializer", EvaluationStage::Override)))?;

        let space = match space {
            Some((_, span)) if self.types.is_handle(store) => {
                let display = self.types.display(store);
                return Err(self.error(span, format!("variables of type '{display}' must not specify an address space")));
            },
            Some((AddressSpace::Function, span)) => {
                return Err(self.error(span, "module-scope 'var' must not use the 'function' address space"));
            },
            Some((space, _)) => space,
            None if self.types.is_handle(store) => AddressSpace::Handle,
            None => {
                return Err(self.error(decl.name.span, "module-scope 'var' declaration must have a address space"));
            },
        };

        let access = match access {
            Some((_, span)) if space != AddressSpace::Storage => {
                return Err(self.error(span, "only variables in <storage> address space may specify an access mode"));
            },
            Some((Access::Write, span)) => {
                return Err(self.error(span, "access mode 'write' is not valid for the 'storage' address space"));
            },
            Some((access, _)) => access,
            None => space.default_access(),
        };

        if init.is_some() && space != AddressSpace::Private {
            return Err(self.error(
                decl.name.span,
                format!(
                    "var of address space '{}' cannot have an initializer. var initializers are only supported for the address spaces 'private' and 'function'",
                    space.name()
                ),
            ));
        }

        let is_resource = matches!(space, AddressSpace::Uniform | AddressSpace::Storage | AddressSpace::Handle);
        let group = Self::attribute(&decl.attributes, A::Group);
        let binding = Self::attribute(&decl.attributes, A::Binding);
        let binding = match (group, binding) {
            (Some(group), Some(binding)) if is_resource => {
                let group = self.attribute_integer(group, "@group");
                let binding = self.attribute_integer(binding, "@binding");
                Some(BindingPoint { group: group?, binding: binding? })
            },
            (None, None) if !is_resource => None,
            _ if is_resource => {
                return Err(self.error(decl.name.span, "resource variables require @group and @binding attributes"));
            },
            (group, binding) => {
                let span = group.or(binding).map_or(decl.name.span, |attribute| attribute.span);
                return Err(self.error(span, "non-resource variables must not have @group or @binding attributes"));
            },
        };

        self.check_store(id, store, space, access)?;

        let ty = self.types.reference(space, store, access);
        Ok(VariableInfo {
            ty,
            store_type: store,
            space: Some(space),
            access: Some(access),
            binding,
            ..variable_info(VariableKind::Var, ty, EvaluationStage::Runtime, true)
        })
    }

    pub(super) fn function(&mut self, id: FnId) -> Fallible<()> {
        use AttributeKind as A;

        let module = self.module;
        let decl = &module.functions[id];
        self.check_attributes(
            &decl.attributes,
            &[A::Vertex, A::Fragment, A::Compute, A::WorkgroupSize, A::MustUse],
            "functions",
        );
        let mut failed = false;

        let mut stages = decl.attributes.iter().filter_map(|attribute| match attribute.kind {
            A::Vertex => Some((PipelineStage::Vertex, attribute.span)),
            A::Fragment => Some((PipelineStage::Fragment, attribute.span)),
            A::Compute => Some((PipelineStage::Compute, attribute.span)),
            _ => None,
        });
        let stage = stages.next();
        if let Some((other, span)) = stages.find(|(other, _)| Some(*other) != stage.map(|(stage, _)| stage)) {
            self.error(span, format!("multiple entry point stage attributes, found @{}", other.name()));
            failed = true;
        }
        let stage = stage.map(|(stage, _)| stage);

        let scope = self.locals.begin();
        self.function = Some(FunctionState {
            return_type: Some(TypeId::VOID),
            constructs: Vec::new(),
            break_if: None,
            referenced_globals: Vec::new(),
            callees: Vec::new(),
            builtin_calls: Vec::new(),
        });

        if let Some(&param) = decl.params.get(MAX_PARAMETERS) {
            let span = module.vars[param].name.span;
            self.error(span, format!("functions may declare at most {MAX_PARAMETERS} parameters"));
            failed = true;
        }
        for &param in decl.params.iter() {
            if self.parameter(param, stage.is_some()).is_err() {
                failed = true;
            }
            self.declare_local(param);
        }

        let return_type = match decl.return_type {
            Some(expr) => match self.resolve_type(expr) {
                Ok(ty) if self.types.is_constructible(ty) => Some(ty),
                Ok(_) => {
                    let span = self.expr_span(expr);
                    self.error(span, "function return type must be a constructible type");
                    None
                },
                Err(Poisoned) => None,
            },
            None => Some(TypeId::VOID),
        };

        let (allowed, context): (&[A], _) = match stage {
            Some(_) => (&[A::Location, A::Builtin, A::Interpolate, A::Invariant], "entry point return types"),
            None => (&[], "non-entry point function return types"),
        };
        self.check_attributes(&decl.return_attributes, allowed, context);
        let return_io = match stage {
            Some(_) => self.io_attributes(&decl.return_attributes).unwrap_or_else(|Poisoned| {
                failed = true;
                IoAttributes::default()
            }),
            None => IoAttributes::default(),
        };

        let must_use = Self::attribute(&decl.attributes, A::MustUse);
        if let Some(attribute) = must_use {
            if decl.return_type.is_none() {
                self.error(attribute.span, "@must_use can only be applied to functions that return a value");
                failed = true;
            }
        }

        let workgroup_size = match (stage, Self::attribute(&decl.attributes, A::WorkgroupSize)) {
            (Some(PipelineStage::Compute), Some(attribute)) => match self.workgroup_size(attribute) {
                Ok(size) => Some(size),
                Err(Poisoned) => {
                    failed = true;
                    None
                },
            },
            (Some(PipelineStage::Compute), None) => {
                self.error(decl.name.span, "a compute shader must include 'workgroup_size' in its attributes");
                failed = true;
                None
            },
            (_, Some(attribute)) => {
                self.error(attribute.span, "the workgroup_size attribute is only valid for compute stages");
                failed = true;
                None
            },
            (_, None) => None,
        };

        self.state().return_type = return_type;
        let errors = self.diagnostics.error_count();
        let body = self.statements(&decl.body.stmts);
        self.locals.end(scope);
        let state = self.function.take().expect("function state outlives the function body");

        // a body with errors may not have had the chance to return
        let returns_value = return_type.is_some_and(|ty| ty != TypeId::VOID);
        if returns_value && body.contains(Behaviors::NEXT) && self.diagnostics.error_count() == errors {
            self.error(decl.name.span, "missing return at end of function");
        }

        let (false, Some(return_type)) = (failed, return_type) else {
            return Err(Poisoned);
        };

        let mut behaviors = body;
        if behaviors.contains(Behaviors::NEXT) {
            behaviors.remove(Behaviors::NEXT);
            behaviors.insert(Behaviors::RETURN);
        }

        let mut transitive: Vec<VarId> = state.referenced_globals.iter().map(|(var, _)| *var).collect();
        for (callee, _) in state.callees.iter() {
            let Some(callee) = self.sem.functions.get(*callee) else { continue };
            for var in callee.transitively_referenced_globals.iter() {
                if !transitive.contains(var) {
                    transitive.push(*var);
                }
            }
        }

        let params = decl.params.clone();
        self.sem.functions.insert(
            id,
            FunctionInfo {
                params,
                return_type,
                return_io,
                stage,
                workgroup_size,
                must_use: must_use.is_some(),
                behaviors,
                directly_referenced_globals: state.referenced_globals,
                transitively_referenced_globals: transitive,
                callees: state.callees,
                builtin_calls: state.builtin_calls,
            },
        );
        Ok(())
    }

    fn parameter(&mut self, id: VarId, entry_point: bool) -> Fallible<()> {
        use AttributeKind as A;

        let module = self.module;
        let decl = &module.vars[id];
        let (allowed, context): (&[A], _) = match entry_point {
            true => (&[A::Location, A::Builtin, A::Interpolate, A::Invariant], "entry point function parameters"),
            false => (&[], "non-entry point function parameters"),
        };
        self.check_attributes(&decl.attributes, allowed, context);

        let Some(ty_expr) = decl.ty else {
            return Err(self.error(decl.name.span, "function parameters require a type"));
        };
        let ty = self.resolve_type(ty_expr)?;
        if !self.types.is_constructible(ty) && !self.types.is_pointer(ty) && !self.types.is_handle(ty) {
            let span = self.expr_span(ty_expr);
            return Err(self.error(span, "type of function parameter must be constructible"));
        }

        let io = match entry_point {
            true => self.io_attributes(&decl.attributes)?,
            false => IoAttributes::default(),
        };
        self.sem.vars.insert(
            id,
            VariableInfo { io, ..variable_info(VariableKind::Parameter, ty, EvaluationStage::Runtime, false) },
        );
        Ok(())
    }

    fn workgroup_size(&mut self, attribute: &'m Attribute) -> Fallible<[WorkgroupDimension; 3]> {
        if attribute.args.is_empty() || attribute.args.len() > 3 {
            return Err(self.error(attribute.span, "@workgroup_size requires 1 to 3 arguments"));
        }

        let mut args = Vec::with_capacity(attribute.args.len());
        for &arg in attribute.args.iter() {
            let info = self.expression(arg)?;
            self.require_stage(arg, &info, "workgroup_size argument", EvaluationStage::Override)?;
            args.push((arg, self.load(info)));
        }

        let types: Vec<TypeId> = args.iter().map(|(_, info)| info.ty).collect();
        let common = self.types.common_type(&types).map(|ty| self.types.concretize(ty));
        let Some(common @ (TypeId::I32 | TypeId::U32)) = common else {
            return Err(self.error(
                attribute.span,
                "workgroup_size arguments must be of the same type, either i32 or u32",
            ));
        };

        let mut dimensions = [WorkgroupDimension::Constant(1); 3];
        for (index, (arg, info)) in args.into_iter().enumerate() {
            let info = self.materialize(arg, info, Some(common))?;
            dimensions[index] = match info.value.as_ref().and_then(ConstantValue::as_int) {
                Some(value) if value < 1 => {
                    let span = self.expr_span(arg);
                    return Err(self.error(span, "workgroup_size argument must be at least 1"));
                },
                Some(value) => WorkgroupDimension::Constant(value as u32),
                None => WorkgroupDimension::Override,
            };
        }
        Ok(dimensions)
    }

    /// Resolves a `const_assert`, at module scope or in a function body.
    pub(super) fn const_assert(&mut self, condition: ExprId) -> Fallible<()> {
        let info = self.expression(condition)?;
        self.require_stage(condition, &info, "const assertion", EvaluationStage::Constant)?;
        let info = self.load(info);
        let span = self.expr_span(condition);
        if info.ty != TypeId::BOOL {
            let display = self.types.display(info.ty);
            return Err(self.error(span, format!("const assertion condition must be a bool, got '{display}'")));
        }
        match info.value {
            Some(ConstantValue::Bool(true)) => Ok(()),
            _ => Err(self.error(span, "const assertion failed")),
        }
    }
}

/// Statements.
impl<'m> Context<'m> {
    fn state(&mut self) -> &mut FunctionState {
        self.function.as_mut().expect("statements are only resolved inside functions")
    }

    /// Resolves a sequence of statements in the current scope, returning their combined
    /// behaviors.
    fn statements(&mut self, stmts: &[StmtId]) -> Behaviors {
        let mut behaviors = Behaviors::NEXT;
        let mut warned = false;
        for &stmt in stmts {
            let reachable = behaviors.contains(Behaviors::NEXT);
            if !reachable && !warned {
                self.warning(self.module.stmts[stmt].span, "code is unreachable");
                warned = true;
            }
            let stmt_behaviors = self.statement(stmt);
            self.sem.reachable.insert(stmt, reachable);
            if reachable {
                behaviors = behaviors.difference(Behaviors::NEXT) | stmt_behaviors;
            }
        }
        behaviors
    }

    fn block(&mut self, block: &Block) -> Behaviors {
        let scope = self.locals.begin();
        let behaviors = self.statements(&block.stmts);
        self.locals.end(scope);
        behaviors
    }

    fn statement(&mut self, id: StmtId) -> Behaviors {
        let module = self.module;
        let stmt = &module.stmts[id];
        if self.statement_depth >= MAX_STATEMENT_DEPTH {
            self.error(
                stmt.span,
                format!("statement nesting depth / chaining length exceeds limit of {MAX_STATEMENT_DEPTH}"),
            );
            return Behaviors::NEXT;
        }

        self.statement_depth += 1;
        let result = self.statement_kind(id, &stmt.kind, stmt.span);
        self.statement_depth -= 1;

        // statements with errors fall through to the next one
        let behaviors = result.unwrap_or(Behaviors::NEXT);
        self.sem.stmts.insert(id, behaviors);
        behaviors
    }

    fn statement_kind(&mut self, id: StmtId, kind: &'m StmtKind, span: Span) -> Fallible<Behaviors> {
        match kind {
            StmtKind::Block(block) => Ok(self.block(block)),
            StmtKind::Decl(var) => {
                let result = self.variable(*var, false);
                self.declare_local(*var);
                result?;
                Ok(self.module.vars[*var].initializer.map_or(Behaviors::NEXT, |init| self.expr_behaviors(init)))
            },
            StmtKind::Return(value) => self.return_statement(*value, span),
            StmtKind::If { condition, accept, reject } => self.if_statement(*condition, accept, *reject),
            StmtKind::Switch { selector, clauses } => self.switch(*selector, clauses, span),
            StmtKind::Loop { body, continuing } => Ok(self.loop_statement(body, continuing.as_ref())),
            StmtKind::For { init, condition, update, body } => {
                Ok(self.for_loop(*init, *condition, *update, body))
            },
            StmtKind::While { condition, body } => Ok(self.for_loop(None, Some(*condition), None, body)),
            StmtKind::Break => self.break_statement(span),
            StmtKind::BreakIf(condition) => self.break_if(id, *condition, span),
            StmtKind::Continue => self.continue_statement(span),
            StmtKind::Discard => {
                if self.continuing_block().is_some() {
                    return Err(self.error(span, "continuing blocks must not contain a discard statement"));
                }
                Ok(Behaviors::DISCARD)
            },
            StmtKind::Assign { lhs, op, rhs } => self.assignment(*lhs, *op, *rhs, span),
            StmtKind::Increment(target) => self.increment(*target, "increment"),
            StmtKind::Decrement(target) => self.increment(*target, "decrement"),
            StmtKind::Call(call) => self.call_statement(*call, span),
            StmtKind::ConstAssert(condition) => self.const_assert(*condition).map(|()| Behaviors::NEXT),
        }
    }

    /// The behaviors of a resolved expression.
    fn expr_behaviors(&self, expr: ExprId) -> Behaviors {
        self.sem.exprs.get(expr).map_or(Behaviors::NEXT, |info| info.behaviors)
    }

    /// The innermost continuing block being resolved, and the statement depth of its loop.
    pub(super) fn continuing_block(&self) -> Option<(Span, usize)> {
        let state = self.function.as_ref()?;
        state.constructs.iter().rev().find_map(|construct| match *construct {
            Construct::Continuing { span, depth } => Some((span, depth)),
            _ => None,
        })
    }

    /// Resolves a condition, which must be a `bool`.
    fn condition(&mut self, expr: ExprId, what: &str) -> Fallible<ExprInfo> {
        let info = self.expression(expr)?;
        let info = self.value(expr, info, None)?;
        if info.ty != TypeId::BOOL {
            let display = self.types.display(info.ty);
            let span = self.expr_span(expr);
            return Err(self.error(span, format!("{what} must be bool, got '{display}'")));
        }
        Ok(info)
    }

    fn return_statement(&mut self, value: Option<ExprId>, span: Span) -> Fallible<Behaviors> {
        if self.continuing_block().is_some() {
            return Err(self.error(span, "continuing blocks must not contain a return statement"));
        }
        let return_type = self.state().return_type;

        let mut behaviors = Behaviors::RETURN;
        let found = match value {
            Some(expr) => {
                let info = self.expression(expr)?;
                let target = return_type.filter(|ty| *ty != TypeId::VOID);
                let info = self.value(expr, info, target)?;
                behaviors |= info.behaviors.difference(Behaviors::NEXT);
                info.ty
            },
            None => TypeId::VOID,
        };
        // the declared return type has already been reported
        let Some(return_type) = return_type else { return Err(Poisoned) };
        if found != return_type {
            let found = self.types.display(found);
            let expected = self.types.display(return_type);
            return Err(self.error(
                span,
                format!("return statement type must match its function return type, returned '{found}', expected '{expected}'"),
            ));
        }
        Ok(behaviors)
    }

    fn if_statement(&mut self, condition: ExprId, accept: &'m Block, reject: Option<StmtId>) -> Fallible<Behaviors> {
        let condition = self.condition(condition, "if statement condition");
        let accept = self.block(accept);
        let reject = match reject {
            Some(reject) => self.statement(reject),
            None => Behaviors::NEXT,
        };
        let condition = condition?;
        Ok(condition.behaviors.difference(Behaviors::NEXT) | accept | reject)
    }

    fn switch(&mut self, selector: ExprId, clauses: &'m [SwitchClause], span: Span) -> Fallible<Behaviors> {
        let mut failed = false;
        let selector_info = self.expression(selector).map(|info| self.load(info));

        let mut cases = Vec::new();
        let mut defaults = Vec::new();
        for clause in clauses.iter() {
            for selector in clause.selectors.iter() {
                match *selector {
                    CaseSelector::Default(span) => defaults.push(span),
                    CaseSelector::Expr(expr) => {
                        let Ok(info) = self.expression(expr) else {
                            failed = true;
                            continue;
                        };
                        if self.require_stage(expr, &info, "case selector", EvaluationStage::Constant).is_err() {
                            failed = true;
                            continue;
                        }
                        cases.push((expr, self.load(info)));
                    },
                }
            }
        }

        match defaults[..] {
            [] => {
                self.error(span, "switch statement must have a default clause");
                failed = true;
            },
            [_] => {},
            [first, second, ..] => {
                self.error(second, "switch statement must have exactly one default clause");
                self.note(first, "previous default case");
                failed = true;
            },
        }

        if let Ok(selector_info) = selector_info {
            let types: Vec<TypeId> =
                std::iter::once(selector_info.ty).chain(cases.iter().map(|(_, info)| info.ty)).collect();
            let common = self.types.common_type(&types).map(|ty| self.types.concretize(ty));
            match common {
                Some(common @ (TypeId::I32 | TypeId::U32)) => {
                    failed |= self.materialize(selector, selector_info, Some(common)).is_err();
                    failed |= self.case_values(cases, common).is_err();
                },
                _ => {
                    let selector_ty = self.types.concretize(selector_info.ty);
                    if !self.types.is_integer_scalar(selector_ty) {
                        let span = self.expr_span(selector);
                        self.error(span, "switch statement selector expression must be of a scalar integer type");
                        return Err(self.skip_clauses(clauses));
                    }
                    let expected = self.types.display(selector_ty);
                    for (expr, info) in cases.iter() {
                        if !self.types.can_convert(info.ty, selector_ty) {
                            let found = self.types.display(info.ty);
                            let span = self.expr_span(*expr);
                            self.error(
                                span,
                                format!("the case selector values must have the same type as the selector expression: expected '{expected}', found '{found}'"),
                            );
                        }
                    }
                    failed = true;
                },
            }
        } else {
            failed = true;
        }

        let mut behaviors = self.expr_behaviors(selector).difference(Behaviors::NEXT);
        self.state().constructs.push(Construct::Switch);
        for clause in clauses.iter() {
            behaviors |= self.block(&clause.body);
        }
        self.state().constructs.pop();

        if failed {
            return Err(Poisoned);
        }
        if behaviors.contains(Behaviors::BREAK) {
            behaviors.remove(Behaviors::BREAK);
            behaviors.insert(Behaviors::NEXT);
        }
        Ok(behaviors)
    }

    /// Resolves the bodies of a switch whose selector is invalid.
    fn skip_clauses(&mut self, clauses: &'m [SwitchClause]) -> Poisoned {
        self.state().constructs.push(Construct::Switch);
        for clause in clauses.iter() {
            self.block(&clause.body);
        }
        self.state().constructs.pop();
        Poisoned
    }

    /// Converts case selectors to the type of the switch and reports duplicate values.
    fn case_values(&mut self, cases: Vec<(ExprId, ExprInfo)>, ty: TypeId) -> Fallible<()> {
        let mut seen: HashMap<i64, Span> = HashMap::new();
        let mut failed = false;
        for (expr, info) in cases {
            let span = self.expr_span(expr);
            let Ok(info) = self.materialize(expr, info, Some(ty)) else {
                failed = true;
                continue;
            };
            if info.ty != ty {
                let expected = self.types.display(ty);
                let found = self.types.display(info.ty);
                self.error(
                    span,
                    format!("the case selector values must have the same type as the selector expression: expected '{expected}', found '{found}'"),
                );
                failed = true;
                continue;
            }
            let Some(value) = info.value.as_ref().and_then(ConstantValue::as_int) else { continue };
            if let Some(previous) = seen.insert(value, span) {
                let plain = info.value.as_ref().map_or_else(String::new, ConstantValue::plain);
                self.error(span, format!("duplicate switch case '{plain}'"));
                self.note(previous, "previous case declared here");
                failed = true;
            }
        }
        if failed {
            return Err(Poisoned);
        }
        Ok(())
    }

    /// The behaviors of a loop whose body, including its continuing block, has `body`.
    fn loop_behaviors(body: Behaviors) -> Behaviors {
        let mut behaviors = body.difference(Behaviors::NEXT).difference(Behaviors::CONTINUE);
        if body.contains(Behaviors::BREAK) {
            behaviors.remove(Behaviors::BREAK);
            behaviors.insert(Behaviors::NEXT);
        }
        behaviors
    }

    fn loop_statement(&mut self, body: &'m Block, continuing: Option<&'m Block>) -> Behaviors {
        // the continuing block sees the declarations of the body
        let scope = self.locals.begin();
        self.state().constructs.push(Construct::Loop);
        let mut behaviors = self.statements(&body.stmts);
        self.state().constructs.pop();

        if let Some(continuing) = continuing {
            let module = self.module;
            let break_if = continuing
                .stmts
                .last()
                .copied()
                .filter(|last| matches!(module.stmts[*last].kind, StmtKind::BreakIf(_)));
            let outer = std::mem::replace(&mut self.state().break_if, break_if);
            let depth = self.statement_depth;
            self.state().constructs.push(Construct::Continuing { span: continuing.span, depth });
            behaviors |= self.block(continuing);
            self.state().constructs.pop();
            self.state().break_if = outer;
        }
        self.locals.end(scope);

        Self::loop_behaviors(behaviors)
    }

    fn for_loop(
        &mut self,
        init: Option<StmtId>,
        condition: Option<ExprId>,
        update: Option<StmtId>,
        body: &'m Block,
    ) -> Behaviors {
        let scope = self.locals.begin();
        let mut behaviors = Behaviors::empty();
        if let Some(init) = init {
            behaviors |= self.statement(init);
        }
        if let Some(condition) = condition {
            if let Ok(info) = self.condition(condition, "loop condition") {
                behaviors |= info.behaviors;
            }
        }

        self.state().constructs.push(Construct::Loop);
        behaviors |= self.block(body);
        self.state().constructs.pop();
        if let Some(update) = update {
            behaviors |= self.statement(update);
        }
        self.locals.end(scope);

        // a false condition leaves the loop
        if condition.is_some() {
            behaviors.insert(Behaviors::BREAK);
        }
        Self::loop_behaviors(behaviors)
    }

    fn break_statement(&mut self, span: Span) -> Fallible<Behaviors> {
        match self.state().constructs.last() {
            Some(Construct::Loop | Construct::Switch) => Ok(Behaviors::BREAK),
            Some(Construct::Continuing { .. }) => Err(self.error(
                span,
                "`break` must not be used to exit from a continuing block. Use `break if` instead.",
            )),
            None => Err(self.error(span, "break statement must be in a loop or switch case")),
        }
    }

    fn break_if(&mut self, id: StmtId, condition: ExprId, span: Span) -> Fallible<Behaviors> {
        if self.state().break_if != Some(id) {
            return Err(self.error(span, "break-if must be the last statement in a continuing block"));
        }
        let condition = self.condition(condition, "break-if condition")?;
        Ok(condition.behaviors | Behaviors::BREAK)
    }

    fn continue_statement(&mut self, span: Span) -> Fallible<Behaviors> {
        let innermost = self
            .state()
            .constructs
            .iter()
            .rev()
            .copied()
            .find(|construct| *construct != Construct::Switch);
        match innermost {
            Some(Construct::Loop) => Ok(Behaviors::CONTINUE),
            Some(_) => Err(self.error(span, "continuing blocks must not contain a continue statement")),
            None => Err(self.error(span, "continue statement must be in a loop")),
        }
    }

    fn assignment(&mut self, lhs: ExprId, op: Option<BinaryOp>, rhs: ExprId, span: Span) -> Fallible<Behaviors> {
        let module = self.module;
        if matches!(module.exprs[lhs].kind, ExprKind::Phony) {
            let info = self.expression(rhs)?;
            let info = self.load(info);
            if !self.types.is_constructible(info.ty) && !self.types.is_pointer(info.ty) && !self.types.is_handle(info.ty) {
                let display = self.types.display(info.ty);
                let span = self.expr_span(rhs);
                return Err(self.error(
                    span,
                    format!("cannot assign '{display}' to '_'. '_' can only be assigned a constructible, pointer, texture or sampler type"),
                ));
            }
            return Ok(info.behaviors);
        }

        let target = self.expression(lhs);
        let value = self.expression(rhs);
        let (target, value) = (target?, value?);
        let (store, access) = self.assignment_target(lhs, &target, "assign to")?;

        let value = match op {
            None => self.value(rhs, value, Some(store))?,
            Some(op) => {
                let value = self.load(value);
                let Some(overload) = builtin::binary_overload(&mut self.types, op, store, value.ty) else {
                    let (lhs, rhs) = (self.types.display(store), self.types.display(value.ty));
                    return Err(self.error(
                        span,
                        format!("no matching overload for operator {}= ({lhs}, {rhs})", op.as_str()),
                    ));
                };
                let value = self.materialize(rhs, value, Some(overload.rhs))?;
                ExprInfo { ty: overload.ret, ..value }
            },
        };

        if !access.can_write() {
            let display = self.types.display(target.ty);
            return Err(self.error(span, format!("cannot store into a read-only type '{display}'")));
        }
        if value.ty != store {
            let (found, expected) = (self.types.display(value.ty), self.types.display(store));
            return Err(self.error(span, format!("cannot assign '{found}' to '{expected}'")));
        }
        Ok(value.behaviors | target.behaviors)
    }

    /// The store type and access mode of the reference an assignment or increment writes to.
    fn assignment_target(&mut self, expr: ExprId, info: &ExprInfo, what: &str) -> Fallible<(TypeId, Access)> {
        if let Type::Reference { store, access, .. } = self.types.get(info.ty) {
            return Ok((store, access));
        }
        let span = self.expr_span(expr);
        let module = self.module;
        let message = match info.source_variable.map(|var| &module.vars[var]) {
            Some(var) if var.kind != VariableKind::Var && matches!(module.exprs[expr].kind, ExprKind::Ident(_)) => {
                format!("cannot {what} {} '{}'", var.kind.as_str(), module.name(var.name))
            },
            _ => format!("cannot {what} value of type '{}'", self.types.display(info.ty)),
        };
        Err(self.error(span, message))
    }

    fn increment(&mut self, target: ExprId, what: &str) -> Fallible<Behaviors> {
        let info = self.expression(target)?;
        let (store, access) = self.assignment_target(target, &info, "modify")?;
        let span = self.expr_span(target);
        if !access.can_write() {
            let display = self.types.display(info.ty);
            return Err(self.error(span, format!("cannot modify read-only type '{display}'")));
        }
        if !matches!(self.types.scalar(store), Some(Scalar::I32 | Scalar::U32)) {
            return Err(self.error(span, format!("{what} statement can only be applied to an integer scalar")));
        }
        Ok(info.behaviors)
    }

    fn call_statement(&mut self, call: ExprId, span: Span) -> Fallible<Behaviors> {
        let info = self.expression(call)?;
        let module = self.module;
        let ExprKind::Call { callee, args } = &module.exprs[call].kind else {
            unreachable!("call statements hold a call expression")
        };
        let name = self.name(callee.ident);

        match self.lookup(callee.ident) {
            Some(Binding::Function(func)) => {
                if self.sem.functions.get(func).is_some_and(|func| func.must_use) {
                    return Err(self.error(
                        span,
                        format!("ignoring return value of function '{name}' annotated with @must_use"),
                    ));
                }
            },
            Some(Binding::BuiltinFunction(function)) => {
                if info.ty != TypeId::VOID && builtin::must_use(function) {
                    return Err(self.error(span, format!("ignoring return value of builtin '{function}'")));
                }
            },
            None if name == "bitcast" => {
                return Err(self.error(span, "ignoring return value of builtin 'bitcast'"));
            },
            Some(Binding::BuiltinType(_) | Binding::Struct(_) | Binding::Alias(_)) => {
                let conversion = match args[..] {
                    [arg] => self.sem.exprs.get(arg).is_some_and(|arg| {
                        let arg = self.types.unwrap_ref(arg.ty);
                        arg != info.ty && self.same_shape(arg, info.ty)
                    }),
                    _ => false,
                };
                let what = if conversion { "conversion" } else { "constructor" };
                return Err(self.error(span, format!("value {what} evaluated but not used")));
            },
            _ => {},
        }
        Ok(info.behaviors)
    }

    /// Whether two types are scalars, vectors of the same size or matrices of the same shape.
    fn same_shape(&self, a: TypeId, b: TypeId) -> bool {
        match (self.types.get(a), self.types.get(b)) {
            (Type::Scalar(_), Type::Scalar(_)) => true,
            (Type::Vector { size: a, .. }, Type::Vector { size: b, .. }) => a == b,
            (Type::Matrix { columns: c1, rows: r1, .. }, Type::Matrix { columns: c2, rows: r2, .. }) => {
                (c1, r1) == (c2, r2)
            },
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use expect_test::{expect, Expect};
    use indoc::indoc;

    use crate::ast::{Module, StmtKind};
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
    fn function_signatures() {
        check_dump(
            indoc! {"
                struct Out { @builtin(position) position: vec4<f32> }
                fn helper(a: i32, b: ptr<function, f32>) -> f32 { return *b; }
                @vertex fn vs(@builtin(vertex_index) index: u32) -> Out {
                    return Out(vec4(f32(index)));
                }
                override size: u32 = 4;
                @compute @workgroup_size(8, size) fn cs() {}
            "},
            expect![[r#"
                struct Out (size 16, align 16)
                    @offset(0) position: vec4<f32>
                fn helper(i32, ptr<function, f32, read_write>) -> f32
                fn vs(u32) -> Out @vertex
                override size: u32 @id(0)
                fn cs() @compute @workgroup_size(8, override, 1)
            "#]],
        );
    }

    #[test]
    fn declarations() {
        check(
            indoc! {"
                fn f() {
                    let a = 1;
                    let a = 2;
                    var<private> b: i32;
                    let c: sampler;
                    var d = 1;
                    d = 1.5;
                    a = 3;
                }
            "},
            expect![[r#"
                3:9 error: redeclaration of 'a'
                2:9 note: 'a' previously declared here
                4:9 error: function-scope 'var' declaration must use 'function' address space
                5:9 error: 'let' declaration must have an initializer
                7:5 error: cannot assign 'f32' to 'i32'
                8:5 error: cannot assign to let 'a'"#]],
        );
    }

    #[test]
    fn redefined_parameter() {
        check(
            "fn f(a: i32, a: f32) {}",
            expect![[r#"
                1:14 error: redefinition of parameter 'a'
                1:6 note: previous definition is here"#]],
        );
    }

    #[test]
    fn returns() {
        check(
            indoc! {"
                fn a() -> i32 {
                    if true { return 1; }
                }
                fn b() -> i32 {
                    if true { return 1; } else { return 2; }
                }
                fn c() -> f32 {
                    return 1u;
                }
                fn d() {
                    return 1;
                }
                fn e() -> i32 {
                    loop { return 1; }
                }
            "},
            expect![[r#"
                1:4 error: missing return at end of function
                8:5 error: return statement type must match its function return type, returned 'u32', expected 'f32'
                11:5 error: return statement type must match its function return type, returned 'i32', expected 'void'"#]],
        );
    }

    #[test]
    fn unreachable_code() {
        check(
            indoc! {"
                fn f() -> i32 {
                    return 1;
                    let a = 2;
                    let b = 3;
                }
                @fragment fn g() {
                    discard;
                    let c = 4;
                }
            "},
            expect![[r#"
                3:5 warning: code is unreachable
                8:5 warning: code is unreachable"#]],
        );
    }

    #[test]
    fn loop_control_flow() {
        check(
            indoc! {"
                fn f() {
                    break;
                    continue;
                    loop {
                        continuing {
                            break;
                            return;
                            break if true;
                            continue;
                        }
                    }
                    loop {
                        break if false;
                    }
                }
            "},
            expect![[r#"
                2:5 error: break statement must be in a loop or switch case
                3:5 error: continue statement must be in a loop
                6:13 error: `break` must not be used to exit from a continuing block. Use `break if` instead.
                7:13 error: continuing blocks must not contain a return statement
                8:13 error: break-if must be the last statement in a continuing block
                9:13 error: continuing blocks must not contain a continue statement
                12:5 warning: code is unreachable
                14:9 error: break-if must be the last statement in a continuing block"#]],
        );
    }

    #[test]
    fn loop_behaviors() {
        let (module, resolved) = resolve_source(indoc! {"
            fn f(x: i32) -> i32 {
                loop {
                    if x > 0 { break; }
                }
                for (var i = 0; i < 4; i++) {
                    continue;
                }
                while true {
                    return 2;
                }
                loop {
                    return 1;
                }
            }
        "});
        assert!(resolved.is_valid(), "{}", resolved.diagnostics());
        let behaviors: Vec<String> = module
            .stmts
            .iter()
            .filter(|(_, stmt)| matches!(stmt.kind, StmtKind::Loop { .. } | StmtKind::For { .. } | StmtKind::While { .. }))
            .map(|(id, _)| format!("{:?}", resolved.behaviors_of(id).unwrap()))
            .collect();
        expect![[r#"
            {"Next"}
            {"Next"}
            {"Next", "Return"}
            {"Return"}"#]]
        .assert_eq(&behaviors.join("\n"));
    }

    #[test]
    fn expression_behaviors() {
        check(
            indoc! {"
                fn g() -> i32 { discard; }
                fn f() -> i32 { let x = g(); }
                fn h() -> i32 {
                    let x = -g();
                    return x;
                }
                fn k(x: i32) -> i32 {
                    if g() > x { return 1; }
                    return 2;
                }
                @compute @workgroup_size(1) fn main() {
                    var y = 1;
                    y = f();
                }
            "},
            expect![[r#"
                5:5 warning: code is unreachable
                11:32 error: discard statement cannot be used in compute pipeline stage"#]],
        );

        let (module, resolved) = resolve_source(indoc! {"
            fn g() { discard; }
            fn f(a: array<i32, 2>) -> i32 {
                return a[0] + a[1];
            }
            fn h() -> i32 {
                let x = vec2(1, 2).x;
                return f(array(x, x)) + 1;
            }
            fn d(x: i32) { discard; }
            fn m() -> i32 { d(1 + 2); }
        "});
        assert!(resolved.is_valid(), "{}", resolved.diagnostics());
        let behaviors: Vec<String> = module
            .functions
            .iter()
            .map(|(id, _)| format!("{:?}", resolved.function(id).unwrap().behaviors))
            .collect();
        expect![[r#"
            {"Discard"}
            {"Return"}
            {"Return"}
            {"Discard"}
            {"Discard"}"#]]
        .assert_eq(&behaviors.join("\n"));
    }

    #[test]
    fn discarding_calls_in_continuing() {
        check(
            indoc! {"
                fn g() { discard; }
                fn f() {
                    loop {
                        continuing {
                            g();
                            break if true;
                        }
                    }
                }
                fn h(x: i32) {
                    loop {
                        continuing {
                            if x > 0 {
                                g();
                            }
                            break if true;
                        }
                    }
                }
            "},
            expect![[r#"
                5:13 error: cannot call a function that may discard inside a continuing block
                14:17 error: cannot call a function that may discard inside a continuing block
                12:20 note: see continuing block here"#]],
        );
    }

    #[test]
    fn unresolved_return_type() {
        check(
            indoc! {"
                fn f() -> Unknown {
                    return 1;
                }
                fn g() -> atomic<i32> {
                    return 1;
                }
            "},
            expect![[r#"
                1:11 error: unresolved type 'Unknown'
                4:11 error: function return type must be a constructible type"#]],
        );
    }

    #[test]
    fn statement_reachability() {
        let (module, resolved) = resolve_source(indoc! {"
            fn f(x: i32) -> i32 {
                if x > 0 {
                    return 1;
                    let a = 2;
                }
                return 2;
                let b = 3;
            }
        "});
        assert!(resolved.is_valid(), "{}", resolved.diagnostics());
        let mut stmts: Vec<_> = module.stmts.iter().collect();
        stmts.sort_by_key(|(_, stmt)| stmt.span.start);
        let reachability: Vec<String> = stmts
            .into_iter()
            .map(|(id, stmt)| {
                let kind = match stmt.kind {
                    StmtKind::If { .. } => "if",
                    StmtKind::Return(_) => "return",
                    StmtKind::Decl(_) => "let",
                    _ => "other",
                };
                format!("{kind}: {:?}", resolved.is_reachable(id))
            })
            .collect();
        expect![[r#"
            if: Some(true)
            return: Some(true)
            let: Some(false)
            return: Some(true)
            let: Some(false)"#]]
        .assert_eq(&reachability.join("\n"));
    }

    #[test]
    fn switch_statements() {
        check(
            indoc! {"
                fn f(x: i32, y: f32) {
                    switch x {
                        case 1, 2: {}
                        case 1u: {}
                        default: {}
                    }
                    switch x {
                        case 1: {}
                        case 3 - 2: {}
                    }
                    switch y {
                        default: {}
                    }
                    switch x {
                        case 0, default: {}
                        default: {}
                    }
                }
            "},
            expect![[r#"
                4:14 error: the case selector values must have the same type as the selector expression: expected 'i32', found 'u32'
                7:5 error: switch statement must have a default clause
                9:14 error: duplicate switch case '1'
                8:14 note: previous case declared here
                12:12 error: switch statement selector expression must be of a scalar integer type
                17:9 error: switch statement must have exactly one default clause
                16:17 note: previous default case"#]],
        );
    }

    #[test]
    fn assignments() {
        check(
            indoc! {"
                @group(0) @binding(0) var<storage> data: array<i32, 4>;
                fn f() {
                    var v = vec2(1, 2);
                    v.x += 2;
                    v.y++;
                    v += 1.5;
                    data[0] = 1;
                    _ = data;
                    _ = f;
                    let a = 1;
                    a++;
                }
            "},
            expect![[r#"
                6:5 error: no matching overload for operator += (vec2<i32>, abstract-float)
                7:5 error: cannot store into a read-only type 'ref<storage, i32, read>'
                9:9 error: cannot use function 'f' as value
                2:4 note: function 'f' declared here
                11:5 error: cannot modify let 'a'"#]],
        );
    }

    #[test]
    fn call_statements() {
        check(
            indoc! {"
                @must_use fn g() -> i32 { return 1; }
                fn h() -> i32 { return 1; }
                fn f() {
                    g();
                    h();
                    max(1, 2);
                    vec2<f32>(1.0);
                    f32(1i);
                    workgroupBarrier();
                }
            "},
            expect![[r#"
                4:5 error: ignoring return value of function 'g' annotated with @must_use
                6:5 error: ignoring return value of builtin 'max'
                7:5 error: value constructor evaluated but not used
                8:5 error: value conversion evaluated but not used"#]],
        );
    }

    #[test]
    fn const_assertions() {
        check(
            indoc! {"
                const a = 4;
                const_assert a > 2;
                const_assert a < 2;
                const_assert a;
                fn f() {
                    let b = 1;
                    const_assert b == 1;
                }
            "},
            expect![[r#"
                3:14 error: const assertion failed
                4:14 error: const assertion condition must be a bool, got 'abstract-int'
                7:18 error: const assertion requires a const-expression, but expression is a runtime-expression"#]],
        );
    }

    #[test]
    fn module_variables() {
        check(
            indoc! {"
                var<uniform> a: f32;
                @group(0) @binding(1) var<private> b: f32;
                var<storage, write> c: i32;
                var<workgroup> d: i32 = 1;
                @group(0) @binding(2) var<function> e: i32;
                @group(0) @binding(3) var t: texture_2d<f32>;
                @group(0) @binding(4) var<private> s: sampler;
            "},
            expect![[r#"
                1:14 error: resource variables require @group and @binding attributes
                2:1 error: non-resource variables must not have @group or @binding attributes
                3:14 error: access mode 'write' is not valid for the 'storage' address space
                4:16 error: var of address space 'workgroup' cannot have an initializer. var initializers are only supported for the address spaces 'private' and 'function'
                5:27 error: module-scope 'var' must not use the 'function' address space
                7:27 error: variables of type 'sampler' must not specify an address space"#]],
        );
    }

    #[test]
    fn entry_point_attributes() {
        check(
            indoc! {"
                @compute fn a() {}
                @vertex @workgroup_size(1) fn b() -> @builtin(position) vec4<f32> { return vec4(); }
                @compute @workgroup_size(0) fn c() {}
                @compute @workgroup_size(1i, 2u) fn d() {}
                @must_use fn e() {}
            "},
            expect![[r#"
                1:13 error: a compute shader must include 'workgroup_size' in its attributes
                2:9 error: the workgroup_size attribute is only valid for compute stages
                3:26 error: workgroup_size argument must be at least 1
                4:10 error: workgroup_size arguments must be of the same type, either i32 or u32
                5:1 error: @must_use can only be applied to functions that return a value"#]],
        );
    }

    #[test]
    fn statement_depth_limit() {
        let source = format!("fn f() {{ {}{} }}", "{ ".repeat(200), "} ".repeat(200));
        let text = std::thread::Builder::new()
            .stack_size(256 << 20)
            .spawn(move || resolve_source(&source).1.diagnostics().to_string())
            .unwrap()
            .join()
            .unwrap();
        assert_eq!(
            text.matches("statement nesting depth / chaining length exceeds limit of 127").count(),
            1,
            "{text}"
        );
    }
}
