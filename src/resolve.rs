//! Semantic analysis of a parsed [`Module`].
//!
//! Module-scope declarations are resolved one at a time in dependency order, so every name a
//! declaration refers to has already been resolved when it is reached. Each expression, statement
//! and declaration receives an entry in the semantic side-table ([`Sem`]) which is published as a
//! [`Resolved`] module once all declarations have been checked.
//!
//! Errors are collected into [`Diagnostics`] and never abort the pass: independent declarations
//! keep being checked so that all unrelated errors surface at once.

mod builtin;
mod constant;
mod dependency;
mod expression;
mod materialize;
mod scope;
mod sem;
mod statement;
mod types;
mod validate;

use std::collections::{hash_map::Entry, HashMap};
use std::fmt::Write as _;

use crate::ast::{
    AliasId, Attribute, AttributeKind, ExprId, FnId, GlobalDecl, Ident, Module, StmtId, StructId,
    Symbol, VarId, VariableKind,
};
use crate::diagnostic::{Diagnostics, Span};
use crate::util::round_up;

pub use self::builtin::BuiltinType;
pub use self::constant::ConstantValue;
pub use self::materialize::convert_value;
pub use self::sem::{
    Behaviors, BindingPoint, BuiltinValue, EvaluationStage, ExprInfo, FunctionInfo, IoAttributes,
    PipelineStage, Sem, Shadowed, VariableInfo, WorkgroupDimension,
};
pub use self::types::{
    Access, AddressSpace, ArrayCount, Scalar, StructMember, StructType, TexelFormat,
    TextureDimension, TextureKind, Type, TypeId, Types,
};

use self::scope::Scope;

/// Marks a failure which has already been reported to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Poisoned;

type Fallible<T> = Result<T, Poisoned>;

const MAX_OVERRIDES: usize = 65535;

/// Resolves a module, reporting every error found.
pub fn resolve(module: &Module) -> Resolved {
    let mut context = Context::new(module);
    context.run();
    context.finish()
}

/// Resolves a module on request, keeping the outcome around.
pub struct Resolver<'m> {
    module: &'m Module,
    resolved: Option<Resolved>,
}

impl<'m> Resolver<'m> {
    pub fn new(module: &'m Module) -> Resolver<'m> {
        Resolver { module, resolved: None }
    }

    /// Resolves the module. Returns `false` if any errors were found.
    pub fn resolve(&mut self) -> bool {
        assert!(self.resolved.is_none(), "module was already resolved");
        let resolved = resolve(self.module);
        let valid = resolved.is_valid();
        self.resolved = Some(resolved);
        valid
    }

    pub fn diagnostics(&self) -> Option<&Diagnostics> {
        self.resolved.as_ref().map(Resolved::diagnostics)
    }

    /// The outcome of [`Resolver::resolve`], or `None` if it has not been called.
    pub fn into_resolved(self) -> Option<Resolved> {
        self.resolved
    }
}

/// A resolved module: the semantic side-table and the diagnostics produced while building it.
pub struct Resolved {
    types: Types,
    sem: Sem,
    diagnostics: Diagnostics,
}

impl Resolved {
    pub fn is_valid(&self) -> bool {
        !self.diagnostics.contains_errors()
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn types(&self) -> &Types {
        &self.types
    }

    pub fn sem(&self) -> &Sem {
        &self.sem
    }

    /// The type of a value expression, or the type named by a type expression.
    pub fn type_of(&self, expr: ExprId) -> Option<TypeId> {
        self.sem.exprs.get(expr).map(|info| info.ty).or_else(|| self.sem.type_exprs.get(expr).copied())
    }

    /// Displays the type named by a type expression, using the alias it was spelled with, if any.
    pub fn type_name(&self, module: &Module, expr: ExprId) -> Option<String> {
        if let Some(&alias) = self.sem.type_aliases.get(expr) {
            return Some(module.name(module.aliases[alias].name).to_string());
        }
        self.sem.type_exprs.get(expr).map(|&ty| self.types.display(ty))
    }

    pub fn constant_value_of(&self, expr: ExprId) -> Option<&ConstantValue> {
        self.sem.exprs.get(expr)?.value.as_ref()
    }

    pub fn source_variable_of(&self, expr: ExprId) -> Option<VarId> {
        self.sem.exprs.get(expr)?.source_variable
    }

    pub fn stage_of(&self, expr: ExprId) -> Option<EvaluationStage> {
        self.sem.exprs.get(expr).map(|info| info.stage)
    }

    pub fn behaviors_of(&self, stmt: StmtId) -> Option<Behaviors> {
        self.sem.stmts.get(stmt).copied()
    }

    /// Whether control can reach a statement from the start of its enclosing block. `None` for
    /// statements outside of a block, such as the initializer of a `for` loop.
    pub fn is_reachable(&self, stmt: StmtId) -> Option<bool> {
        self.sem.reachable.get(stmt).copied()
    }

    pub fn variable(&self, var: VarId) -> Option<&VariableInfo> {
        self.sem.vars.get(var)
    }

    pub fn function(&self, func: FnId) -> Option<&FunctionInfo> {
        self.sem.functions.get(func)
    }

    pub fn struct_type(&self, strukt: StructId) -> Option<TypeId> {
        self.sem.structs.get(strukt).copied()
    }

    pub fn alias_type(&self, alias: AliasId) -> Option<TypeId> {
        self.sem.aliases.get(alias).copied()
    }

    /// The declaration hidden by a local declaration, if any.
    pub fn shadowed(&self, var: VarId) -> Option<Shadowed> {
        self.sem.shadows.get(&var).copied()
    }

    /// Describes every module-scope declaration with its resolved type, one per line.
    pub fn dump(&self, module: &Module) -> String {
        let mut out = String::new();
        for &decl in module.decls.iter() {
            self.dump_decl(module, decl, &mut out);
        }
        out
    }

    fn dump_decl(&self, module: &Module, decl: GlobalDecl, out: &mut String) {
        let types = &self.types;
        match decl {
            GlobalDecl::Var(var) => {
                let name = module.name(module.vars[var].name);
                let kind = module.vars[var].kind.as_str();
                let Some(info) = self.sem.vars.get(var) else {
                    let _ = writeln!(out, "{kind} {name}: <error>");
                    return;
                };
                match (info.space, info.access) {
                    (Some(space), Some(access)) => {
                        let _ = write!(out, "var<{}, {}> ", space.name(), access.name());
                    },
                    _ => {
                        let _ = write!(out, "{kind} ");
                    },
                }
                let _ = write!(out, "{name}: {}", types.display(info.store_type));
                if let Some(value) = &info.value {
                    let _ = write!(out, " = {}", value.display(types));
                }
                if let Some(id) = info.override_id {
                    let _ = write!(out, " @id({id})");
                }
                if let Some(binding) = info.binding {
                    let _ = write!(out, " @group({}) @binding({})", binding.group, binding.binding);
                }
                out.push('\n');
            },
            GlobalDecl::Function(func) => {
                let name = module.name(module.functions[func].name);
                let Some(info) = self.sem.functions.get(func) else {
                    let _ = writeln!(out, "fn {name}: <error>");
                    return;
                };
                let params: Vec<_> = info
                    .params
                    .iter()
                    .filter_map(|param| self.sem.vars.get(*param))
                    .map(|param| types.display(param.ty))
                    .collect();
                let _ = write!(out, "fn {name}({})", params.join(", "));
                if info.return_type != TypeId::VOID {
                    let _ = write!(out, " -> {}", types.display(info.return_type));
                }
                if let Some(stage) = info.stage {
                    let _ = write!(out, " @{}", stage.name());
                }
                if let Some(size) = info.workgroup_size {
                    let dimensions: Vec<_> = size
                        .iter()
                        .map(|dimension| match dimension {
                            WorkgroupDimension::Constant(value) => value.to_string(),
                            WorkgroupDimension::Override => "override".to_string(),
                        })
                        .collect();
                    let _ = write!(out, " @workgroup_size({})", dimensions.join(", "));
                }
                out.push('\n');
            },
            GlobalDecl::Struct(strukt) => {
                let name = module.name(module.structs[strukt].name);
                let Some(info) = self.struct_type(strukt).and_then(|ty| types.as_struct(ty)) else {
                    let _ = writeln!(out, "struct {name}: <error>");
                    return;
                };
                let _ = writeln!(out, "struct {name} (size {}, align {})", info.size, info.align);
                for member in info.members.iter() {
                    let _ = writeln!(
                        out,
                        "    @offset({}) {}: {}",
                        member.offset,
                        member.name,
                        types.display(member.ty)
                    );
                }
            },
            GlobalDecl::Alias(alias) => {
                let name = module.name(module.aliases[alias].name);
                match self.alias_type(alias) {
                    Some(ty) => {
                        let _ = writeln!(out, "alias {name} = {}", types.display(ty));
                    },
                    None => {
                        let _ = writeln!(out, "alias {name}: <error>");
                    },
                }
            },
            GlobalDecl::ConstAssert(_) => {},
        }
    }
}

/// What a name refers to.
#[derive(Debug, Clone, Copy)]
enum Binding {
    Variable(VarId),
    Function(FnId),
    Struct(StructId),
    Alias(AliasId),
    BuiltinType(BuiltinType),
    BuiltinFunction(&'static str),
}

/// A construct which `break` and `continue` statements may refer to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Construct {
    Loop,
    Switch,
    /// A continuing block, with the statement depth of the loop it belongs to.
    Continuing { span: Span, depth: usize },
}

/// State of the function body currently being resolved.
struct FunctionState {
    /// `None` if the declared return type could not be resolved.
    return_type: Option<TypeId>,
    constructs: Vec<Construct>,
    /// The `break if` statement which ends the innermost continuing block.
    break_if: Option<StmtId>,
    referenced_globals: Vec<(VarId, Span)>,
    callees: Vec<(FnId, Span)>,
    builtin_calls: Vec<(&'static str, Span)>,
}

struct Context<'m> {
    module: &'m Module,
    types: Types,
    sem: Sem,
    diagnostics: Diagnostics,
    globals: HashMap<Symbol, GlobalDecl>,
    locals: Scope<VarId>,
    function: Option<FunctionState>,
    expression_depth: usize,
    statement_depth: usize,
}

impl<'m> Context<'m> {
    fn new(module: &'m Module) -> Context<'m> {
        Context {
            module,
            types: Types::new(),
            sem: Sem::default(),
            diagnostics: Diagnostics::new(),
            globals: HashMap::new(),
            locals: Scope::new(),
            function: None,
            expression_depth: 0,
            statement_depth: 0,
        }
    }

    fn finish(self) -> Resolved {
        Resolved { types: self.types, sem: self.sem, diagnostics: self.diagnostics }
    }

    fn run(&mut self) {
        let module = self.module;

        tracing::debug!(declarations = module.decls.len(), "ordering module-scope declarations");
        self.globals = dependency::collect_globals(module, &mut self.diagnostics);
        let Some(order) = dependency::sort(module, &self.globals, &mut self.diagnostics) else {
            tracing::info!(errors = self.diagnostics.error_count(), "cyclic dependency");
            return;
        };

        tracing::debug!("resolving module-scope declarations");
        for decl in order {
            tracing::trace!(kind = module.decl_kind(decl), name = ?module.decl_name(decl).map(|name| module.name(name)), "resolving");
            // a redeclared name is reported and its later declarations skipped
            if let Some(name) = module.decl_name(decl) {
                if self.globals.get(&name.symbol) != Some(&decl) {
                    continue;
                }
            }
            let _ = self.global(decl);
        }

        tracing::debug!("allocating override ids");
        self.allocate_override_ids();

        tracing::debug!("validating entry points");
        self.validate_module();

        tracing::info!(errors = self.diagnostics.error_count(), "resolved module");
    }

    fn global(&mut self, decl: GlobalDecl) -> Fallible<()> {
        match decl {
            GlobalDecl::Var(var) => self.variable(var, true),
            GlobalDecl::Function(func) => self.function(func),
            GlobalDecl::Struct(strukt) => self.structure(strukt),
            GlobalDecl::Alias(alias) => self.alias(alias),
            GlobalDecl::ConstAssert(stmt) => {
                let module = self.module;
                match module.stmts[stmt].kind {
                    crate::ast::StmtKind::ConstAssert(condition) => self.const_assert(condition),
                    ref kind => unreachable!("module-scope const_assert holds {kind:?}"),
                }
            },
        }
    }

    fn error(&mut self, span: Span, message: impl Into<String>) -> Poisoned {
        self.diagnostics.error(self.module.location(span), message);
        Poisoned
    }

    fn note(&mut self, span: Span, message: impl Into<String>) {
        self.diagnostics.note(self.module.location(span), message);
    }

    fn warning(&mut self, span: Span, message: impl Into<String>) {
        self.diagnostics.warning(self.module.location(span), message);
    }

    fn name(&self, ident: Ident) -> &'m str {
        self.module.name(ident)
    }

    fn expr_span(&self, expr: ExprId) -> Span {
        self.module.exprs[expr].span
    }

    /// Finds what a name refers to: locals first, then module-scope declarations, then
    /// predeclared types and functions.
    fn lookup(&mut self, ident: Ident) -> Option<Binding> {
        if let Some(var) = self.locals.get(ident.symbol) {
            return Some(Binding::Variable(var));
        }
        if let Some(&decl) = self.globals.get(&ident.symbol) {
            return Some(match decl {
                GlobalDecl::Var(var) => Binding::Variable(var),
                GlobalDecl::Function(func) => Binding::Function(func),
                GlobalDecl::Struct(strukt) => Binding::Struct(strukt),
                GlobalDecl::Alias(alias) => Binding::Alias(alias),
                GlobalDecl::ConstAssert(_) => unreachable!("const_assert does not declare a name"),
            });
        }
        let name = self.name(ident);
        if let Some(ty) = builtin::builtin_type(name) {
            return Some(Binding::BuiltinType(ty));
        }
        builtin::builtin_function(name).map(Binding::BuiltinFunction)
    }

    /// Records what a local declaration hides. Must be called before the declaration is added to
    /// the scope.
    fn record_shadowing(&mut self, var: VarId) {
        let symbol = self.module.vars[var].name.symbol;
        let shadowed = match self.locals.get(symbol) {
            Some(outer) => Shadowed::Local(outer),
            None => match self.globals.get(&symbol) {
                Some(&decl) => Shadowed::Global(decl),
                None => return,
            },
        };
        self.sem.shadows.insert(var, shadowed);
    }

    /// Declares a local in the innermost scope, reporting a redeclaration in the same scope.
    fn declare_local(&mut self, var: VarId) {
        let module = self.module;
        let decl = &module.vars[var];
        self.record_shadowing(var);
        if let Err(previous) = self.locals.declare(decl.name.symbol, var) {
            let name = self.name(decl.name);
            let previous = module.vars[previous].name.span;
            if decl.kind == VariableKind::Parameter {
                self.error(decl.name.span, format!("redefinition of parameter '{name}'"));
                self.note(previous, "previous definition is here");
            } else {
                self.error(decl.name.span, format!("redeclaration of '{name}'"));
                self.note(previous, format!("'{name}' previously declared here"));
            }
        }
    }

    fn attribute(attributes: &'m [Attribute], kind: AttributeKind) -> Option<&'m Attribute> {
        attributes.iter().find(|attribute| attribute.kind == kind)
    }

    /// Reports attributes which are not valid in the given context, and duplicated attributes.
    fn check_attributes(&mut self, attributes: &[Attribute], allowed: &[AttributeKind], context: &str) {
        let mut seen: HashMap<AttributeKind, Span> = HashMap::new();
        for attribute in attributes {
            if !allowed.contains(&attribute.kind) {
                self.error(attribute.span, format!("attribute is not valid for {context}"));
                continue;
            }
            match seen.entry(attribute.kind) {
                Entry::Occupied(first) => {
                    let first = *first.get();
                    self.error(attribute.span, format!("duplicate {} attribute", attribute.kind.name()));
                    self.note(first, "first attribute declared here");
                },
                Entry::Vacant(entry) => {
                    entry.insert(attribute.span);
                },
            }
        }
    }

    /// Evaluates the single argument of an attribute to a non-negative integer.
    fn attribute_integer(&mut self, attribute: &Attribute, constraint: &str) -> Fallible<u32> {
        let name = attribute.kind.name();
        let [arg] = attribute.args[..] else {
            return Err(self.error(attribute.span, format!("@{name} expects 1 argument")));
        };
        let info = self.expression(arg)?;
        self.require_stage(arg, &info, constraint, EvaluationStage::Constant)?;
        let info = self.value(arg, info, None)?;
        let value = match (self.types.scalar(info.ty), info.value.as_ref().and_then(ConstantValue::as_int)) {
            (Some(Scalar::I32 | Scalar::U32), Some(value)) => value,
            _ => {
                let span = self.expr_span(arg);
                return Err(self.error(span, format!("@{name} must be an i32 or u32 value")));
            },
        };
        if value < 0 {
            let span = self.expr_span(arg);
            return Err(self.error(span, format!("@{name} value must be non-negative")));
        }
        Ok(value as u32)
    }

    fn structure(&mut self, id: StructId) -> Fallible<()> {
        let module = self.module;
        let decl = &module.structs[id];
        let name = self.name(decl.name);

        if decl.members.is_empty() {
            return Err(self.error(decl.name.span, "structures must have at least one member"));
        }

        let mut members = Vec::with_capacity(decl.members.len());
        let mut seen: HashMap<Symbol, Span> = HashMap::new();
        let mut offset: u64 = 0;
        let mut align: u32 = 1;
        let mut failed = false;

        for (index, member) in decl.members.iter().enumerate() {
            let member_name = self.name(member.name);
            if let Some(previous) = seen.insert(member.name.symbol, member.name.span) {
                self.error(member.name.span, format!("redefinition of '{member_name}'"));
                self.note(previous, "previous definition is here");
                failed = true;
            }

            use AttributeKind as A;
            self.check_attributes(
                &member.attributes,
                &[A::Align, A::Size, A::Location, A::Builtin, A::Interpolate, A::Invariant],
                "structure members",
            );

            let Ok(ty) = self.resolve_type(member.ty) else {
                failed = true;
                continue;
            };
            let type_span = self.expr_span(member.ty);
            if !self.types.is_plain(ty) {
                let display = self.types.display(ty);
                self.error(type_span, format!("'{display}' cannot be used as the type of a structure member"));
                failed = true;
                continue;
            }
            if self.types.is_runtime_array(ty) && index + 1 != decl.members.len() {
                self.error(member.name.span, "runtime arrays may only appear as the last member of a struct");
                failed = true;
                continue;
            }
            if self.types.as_struct(ty).is_some_and(|inner| inner.has_runtime_array(&self.types)) {
                self.error(
                    type_span,
                    "a struct that contains a runtime array cannot be nested inside another struct",
                );
                failed = true;
                continue;
            }

            let type_align = self.types.align_of(ty);
            let type_size = self.types.size_of(ty);

            let member_align = match Self::attribute(&member.attributes, A::Align) {
                Some(attribute) => match self.attribute_integer(attribute, "@align value") {
                    Ok(value) if value.is_power_of_two() => value,
                    Ok(_) => {
                        self.error(attribute.span, "@align value must be a positive, power-of-two integer");
                        failed = true;
                        continue;
                    },
                    Err(Poisoned) => {
                        failed = true;
                        continue;
                    },
                },
                None => type_align,
            };

            let member_size = match Self::attribute(&member.attributes, A::Size) {
                Some(attribute) => match self.attribute_integer(attribute, "@size value") {
                    Ok(value) if u64::from(value) >= type_size => u64::from(value),
                    Ok(_) => {
                        self.error(
                            attribute.span,
                            format!("@size must be at least as big as the type's size ({type_size})"),
                        );
                        failed = true;
                        continue;
                    },
                    Err(Poisoned) => {
                        failed = true;
                        continue;
                    },
                },
                None => type_size,
            };

            let Ok(io) = self.io_attributes(&member.attributes) else {
                failed = true;
                continue;
            };

            offset = round_up(u64::from(member_align), offset);
            members.push(StructMember {
                name: member_name.to_string(),
                ty,
                offset,
                align: member_align,
                size: member_size,
                span: member.span,
                io,
            });
            offset += member_size;
            align = align.max(member_align);
        }

        if failed {
            return Err(Poisoned);
        }

        let size = round_up(u64::from(align), offset);
        if size > u64::from(u32::MAX) {
            return Err(self.error(
                decl.name.span,
                format!("struct size (0x{size:x}) must not exceed 0xffffffff bytes"),
            ));
        }

        let ty = self.types.add_struct(StructType {
            name: name.to_string(),
            decl: Some(id),
            members,
            align,
            size,
            address_space_usage: Vec::new(),
        });
        self.sem.structs.insert(id, ty);
        Ok(())
    }

    fn alias(&mut self, id: AliasId) -> Fallible<()> {
        let ty = self.resolve_type(self.module.aliases[id].ty)?;
        self.sem.aliases.insert(id, ty);
        Ok(())
    }

    /// Assigns ids to the `override` declarations without an explicit `@id`: the lowest ids not
    /// taken by an explicit `@id`, in declaration order.
    fn allocate_override_ids(&mut self) {
        let module = self.module;
        let overrides: Vec<VarId> = module
            .decls
            .iter()
            .filter_map(|decl| match *decl {
                GlobalDecl::Var(var) if module.vars[var].kind == VariableKind::Override => Some(var),
                _ => None,
            })
            .filter(|var| self.sem.vars.contains(*var))
            .collect();

        let id_span = |var: VarId| {
            let decl = &module.vars[var];
            Self::attribute(&decl.attributes, AttributeKind::Id).map_or(decl.name.span, |attribute| attribute.span)
        };

        let mut used: HashMap<u16, VarId> = HashMap::new();
        for &var in overrides.iter() {
            let Some(id) = self.sem.vars.get(var).and_then(|info| info.override_id) else { continue };
            match used.entry(id) {
                Entry::Occupied(previous) => {
                    let previous = *previous.get();
                    self.error(id_span(var), "@id values must be unique");
                    self.note(
                        id_span(previous),
                        format!("a override with an ID of {id} was previously declared here"),
                    );
                },
                Entry::Vacant(entry) => {
                    entry.insert(var);
                },
            }
        }

        if overrides.len() > MAX_OVERRIDES {
            let span = module.vars[overrides[MAX_OVERRIDES]].name.span;
            self.error(span, format!("number of 'override' variables exceeded limit of {MAX_OVERRIDES}"));
            return;
        }

        let mut next: u32 = 0;
        for &var in overrides.iter() {
            let Some(info) = self.sem.vars.get_mut(var) else { continue };
            if info.override_id.is_some() {
                continue;
            }
            while used.contains_key(&(next as u16)) {
                next += 1;
            }
            let id = next as u16;
            info.override_id = Some(id);
            used.insert(id, var);
            next += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use expect_test::{expect, Expect};
    use indoc::indoc;

    use super::*;

    #[track_caller]
    fn resolve_source(source: &str) -> (Module, Resolved) {
        let module = match crate::parse::parse(source) {
            Ok(module) => module,
            Err(diagnostics) => panic!("could not parse test source:\n{diagnostics}"),
        };
        let resolved = resolve(&module);
        (module, resolved)
    }

    #[track_caller]
    fn check(source: &str, expected: Expect) {
        let (_, resolved) = resolve_source(source);
        expected.assert_eq(&resolved.diagnostics().to_string());
    }

    #[track_caller]
    fn check_dump(source: &str, expected: Expect) {
        let (module, resolved) = resolve_source(source);
        assert!(resolved.is_valid(), "unexpected errors:\n{}", resolved.diagnostics());
        expected.assert_eq(&resolved.dump(&module));
    }

    #[test]
    fn module_var_without_address_space() {
        check("var x: i32;", expect![[r#"1:5 error: module-scope 'var' declaration must have a address space"#]]);
    }

    #[test]
    fn storage_var_must_be_host_shareable() {
        check(
            "@group(0) @binding(0) var<storage> v: bool;",
            expect![[r#"
                1:36 error: Type 'bool' cannot be used in address space 'storage' as it is non-host-shareable
                1:36 note: while instantiating 'var' v"#]],
        );
    }

    #[test]
    fn host_shareability_through_aliases() {
        check(
            indoc! {"
                alias A = bool;
                alias B = A;
                @group(0) @binding(0) var<storage> v: B;
            "},
            expect![[r#"
                3:36 error: Type 'bool' cannot be used in address space 'storage' as it is non-host-shareable
                3:36 note: while instantiating 'var' v"#]],
        );

        let (_, resolved) = resolve_source(indoc! {"
            struct Light { color: vec4<f32>, count: u32 }
            alias L = Light;
            alias Lights = L;
            alias V = vec4<f32>;
            alias Color = V;
            @group(0) @binding(0) var<storage> lights: Lights;
            @group(0) @binding(1) var<uniform> color: Color;
        "});
        assert!(resolved.is_valid(), "{}", resolved.diagnostics());
    }

    #[test]
    fn alias_names_are_kept_for_display() {
        let (module, resolved) = resolve_source(indoc! {"
            alias A = vec4<f32>;
            alias B = A;
            var<private> v: B;
            var<private> w: vec4<f32>;
        "});
        assert!(resolved.is_valid(), "{}", resolved.diagnostics());
        let declared = |name: &str| {
            let (_, decl) = module.vars.iter().find(|(_, decl)| module.name(decl.name) == name).unwrap();
            decl.ty.unwrap()
        };
        let (v, w) = (declared("v"), declared("w"));
        assert_eq!(resolved.type_of(v), resolved.type_of(w));
        assert_eq!(resolved.type_name(&module, v).as_deref(), Some("B"));
        assert_eq!(resolved.type_name(&module, w).as_deref(), Some("vec4<f32>"));

        let (_, alias) = module.aliases.iter().find(|(_, decl)| module.name(decl.name) == "B").unwrap();
        assert_eq!(resolved.type_name(&module, alias.ty).as_deref(), Some("A"));
    }

    #[test]
    fn entry_point_parameter_without_io() {
        check(
            indoc! {"
                @fragment
                fn main(x: f32) {}
            "},
            expect![[r#"2:9 error: missing entry point IO attribute on parameter"#]],
        );
    }

    #[test]
    fn largest_i32_literal() {
        let (module, resolved) = resolve_source(indoc! {"
            fn f() {
                let a : i32 = 2147483647;
            }
        "});
        assert!(resolved.is_valid(), "{}", resolved.diagnostics());
        let (var, _) = module.vars.iter().find(|(_, var)| module.name(var.name) == "a").unwrap();
        let info = resolved.variable(var).unwrap();
        assert_eq!(info.ty, TypeId::I32);
        assert_eq!(info.value, Some(ConstantValue::I32(2147483647)));
    }

    #[test]
    fn i32_literal_out_of_range() {
        check(
            indoc! {"
                fn f() {
                    let a : i32 = 2147483648;
                }
            "},
            expect![[r#"2:19 error: value 2147483648 cannot be represented as 'i32'"#]],
        );
    }

    #[test]
    fn independent_errors_are_all_reported() {
        check(
            indoc! {"
                fn a() {
                    let x: i32 = 1.5;
                }
                fn b() {
                    let y: bool = 1u;
                }
            "},
            expect![[r#"
                2:9 error: cannot initialize let of type 'i32' with value of type 'f32'
                5:9 error: cannot initialize let of type 'bool' with value of type 'u32'"#]],
        );
    }

    #[test]
    fn resolution_is_deterministic() {
        let source = indoc! {"
            const a = b + 1;
            const b: u32 = 4;
            var<private> v: vec3<f32> = vec3(1.0, 2.0, 3.0);
            fn f() -> i32 { let z: i32 = 1.5; }
        "};
        let (_, first) = resolve_source(source);
        let (_, second) = resolve_source(source);
        assert_eq!(first.diagnostics().to_string(), second.diagnostics().to_string());
    }

    #[test]
    fn declarations_in_dependency_order() {
        check_dump(
            indoc! {"
                const a = b * 2;
                const b = 21;
                alias Vec = vec3<f32>;
                struct S {
                    v: Vec,
                    x: f32,
                    a: array<u32, a>,
                }
                var<private> p: S;
            "},
            expect![[r#"
                const a: abstract-int = 42
                const b: abstract-int = 21
                alias Vec = vec3<f32>
                struct S (size 192, align 16)
                    @offset(0) v: vec3<f32>
                    @offset(12) x: f32
                    @offset(16) a: array<u32, 42>
                var<private, read_write> p: S
            "#]],
        );
    }

    #[test]
    fn redeclared_globals() {
        check(
            indoc! {"
                const x = 1;
                var<private> x: i32;
            "},
            expect![[r#"
                2:14 error: redeclaration of 'x'
                1:7 note: 'x' previously declared here"#]],
        );
    }

    #[test]
    fn cyclic_constants() {
        check(
            indoc! {"
                const a = b;
                const b = a;
            "},
            expect![[r#"
                1:7 error: cyclic dependency found: 'a' -> 'b' -> 'a'
                1:11 note: const 'a' references const 'b' here
                2:11 note: const 'b' references const 'a' here"#]],
        );
    }

    #[test]
    fn override_ids() {
        check_dump(
            indoc! {"
                override a: i32;
                @id(0) override b: f32 = 1.0;
                override c = 2u;
                @id(2) override d: bool;
                override e: i32;
            "},
            expect![[r#"
                override a: i32 @id(1)
                override b: f32 @id(0)
                override c: u32 @id(3)
                override d: bool @id(2)
                override e: i32 @id(4)
            "#]],
        );
    }

    #[test]
    fn duplicate_override_ids() {
        check(
            indoc! {"
                @id(1) override a: i32;
                @id(1) override b: i32;
            "},
            expect![[r#"
                2:1 error: @id values must be unique
                1:1 note: a override with an ID of 1 was previously declared here"#]],
        );
    }

    #[test]
    fn override_id_out_of_range() {
        check(
            "@id(65536) override a: i32;",
            expect![[r#"1:1 error: @id value must be between 0 and 65535"#]],
        );
    }

    #[test]
    fn struct_layout_attributes() {
        check_dump(
            indoc! {"
                struct S {
                    a: f32,
                    @align(16) b: f32,
                    @size(12) c: vec2<f32>,
                    d: u32,
                }
            "},
            expect![[r#"
                struct S (size 48, align 16)
                    @offset(0) a: f32
                    @offset(16) b: f32
                    @offset(24) c: vec2<f32>
                    @offset(36) d: u32
            "#]],
        );
        check(
            indoc! {"
                struct S {
                    @align(3) a: f32,
                    @size(2) b: f32,
                }
            "},
            expect![[r#"
                2:5 error: @align value must be a positive, power-of-two integer
                3:5 error: @size must be at least as big as the type's size (4)"#]],
        );
    }

    #[test]
    fn struct_runtime_arrays() {
        check(
            indoc! {"
                struct A {
                    data: array<u32>,
                    len: u32,
                }
                struct B {
                    data: array<u32>,
                }
                struct C {
                    b: B,
                }
            "},
            expect![[r#"
                2:5 error: runtime arrays may only appear as the last member of a struct
                9:8 error: a struct that contains a runtime array cannot be nested inside another struct"#]],
        );
    }

    #[test]
    fn redefined_struct_member() {
        check(
            indoc! {"
                struct S {
                    a: f32,
                    a: i32,
                }
            "},
            expect![[r#"
                3:5 error: redefinition of 'a'
                2:5 note: previous definition is here"#]],
        );
    }

    #[test]
    fn invalid_attributes() {
        check(
            indoc! {"
                @group(0) const a = 1;
                @align(4) @align(8) var<private> b: i32;
            "},
            expect![[r#"
                1:1 error: attribute is not valid for 'const' declaration
                2:1 error: attribute is not valid for module-scope 'var'
                2:11 error: attribute is not valid for module-scope 'var'"#]],
        );
    }

    #[test]
    fn shadowing_is_recorded() {
        let (module, resolved) = resolve_source(indoc! {"
            const x = 1;
            fn f(y: i32) {
                let x = 2;
                {
                    let y = x;
                }
            }
        "});
        assert!(resolved.is_valid(), "{}", resolved.diagnostics());
        let find = |name: &str, kind: VariableKind| {
            module
                .vars
                .iter()
                .find(|(_, var)| module.name(var.name) == name && var.kind == kind)
                .map(|(id, _)| id)
                .unwrap()
        };
        let global_x = find("x", VariableKind::Const);
        let local_x = find("x", VariableKind::Let);
        let param_y = find("y", VariableKind::Parameter);
        let local_y = find("y", VariableKind::Let);
        assert_eq!(resolved.shadowed(local_x), Some(Shadowed::Global(GlobalDecl::Var(global_x))));
        assert_eq!(resolved.shadowed(local_y), Some(Shadowed::Local(param_y)));
        assert_eq!(resolved.shadowed(param_y), None);
    }

    #[test]
    fn resolver_reports_outcome() {
        let module = crate::parse::parse("const a: u32 = -1;").unwrap();
        let mut resolver = Resolver::new(&module);
        assert!(resolver.diagnostics().is_none());
        assert!(!resolver.resolve());
        expect![[r#"1:16 error: value -1 cannot be represented as 'u32'"#]]
            .assert_eq(&resolver.diagnostics().unwrap().to_string());
        assert!(!resolver.into_resolved().unwrap().is_valid());
    }
}
