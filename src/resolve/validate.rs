//! Rules for the values stored in each address space, and checks of entry points which need the
//! whole module resolved.

use std::collections::{hash_map::Entry, HashMap};

use crate::ast::{Attribute, AttributeKind, FnId, GlobalDecl, VarId};
use crate::diagnostic::Span;

use super::builtin;
use super::sem::{
    Behaviors, BindingPoint, BuiltinValue, InterpolationSampling, InterpolationType, IoAttributes,
    PipelineStage,
};
use super::types::{Access, AddressSpace, ArrayCount, Scalar, Type, TypeId, Types};
use super::{Context, Fallible, Poisoned};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Input,
    Output,
}

impl Direction {
    fn name(self) -> &'static str {
        match self {
            Direction::Input => "input",
            Direction::Output => "output",
        }
    }
}

/// Shader IO already declared on one side of an entry point.
#[derive(Default)]
struct Interface {
    builtins: Vec<BuiltinValue>,
    locations: Vec<u32>,
}

#[derive(Clone, Copy)]
struct EntryPoint<'m> {
    name: &'m str,
    span: Span,
    stage: PipelineStage,
}

/// The stages and directions in which a builtin value is available.
fn builtin_usage(value: BuiltinValue) -> &'static [(PipelineStage, Direction)] {
    use BuiltinValue as B;
    use Direction::{Input, Output};
    use PipelineStage::{Compute, Fragment, Vertex};

    match value {
        B::Position => &[(Vertex, Output), (Fragment, Input)],
        B::VertexIndex | B::InstanceIndex => &[(Vertex, Input)],
        B::FrontFacing | B::SampleIndex => &[(Fragment, Input)],
        B::FragDepth => &[(Fragment, Output)],
        B::SampleMask => &[(Fragment, Input), (Fragment, Output)],
        B::LocalInvocationId
        | B::LocalInvocationIndex
        | B::GlobalInvocationId
        | B::WorkgroupId
        | B::NumWorkgroups => &[(Compute, Input)],
    }
}

fn builtin_value_type(types: &mut Types, value: BuiltinValue) -> TypeId {
    use BuiltinValue as B;
    match value {
        B::Position => types.vector(TypeId::F32, 4),
        B::FrontFacing => TypeId::BOOL,
        B::FragDepth => TypeId::F32,
        B::LocalInvocationId | B::GlobalInvocationId | B::WorkgroupId | B::NumWorkgroups => {
            types.vector(TypeId::U32, 3)
        },
        B::VertexIndex | B::InstanceIndex | B::SampleIndex | B::SampleMask | B::LocalInvocationIndex => {
            TypeId::U32
        },
    }
}

/// Shader IO attributes.
impl<'m> Context<'m> {
    /// Evaluates the `@location`, `@builtin`, `@interpolate` and `@invariant` attributes of a
    /// declaration.
    pub(super) fn io_attributes(&mut self, attributes: &'m [Attribute]) -> Fallible<IoAttributes> {
        let mut io = IoAttributes::default();
        let mut failed = false;

        for attribute in attributes {
            match attribute.kind {
                AttributeKind::Location => match self.attribute_integer(attribute, "@location value") {
                    Ok(value) => io.location = Some((value, attribute.span)),
                    Err(Poisoned) => failed = true,
                },
                AttributeKind::Builtin => match self.builtin_attribute(attribute) {
                    Ok(value) => io.builtin = Some((value, attribute.span)),
                    Err(Poisoned) => failed = true,
                },
                AttributeKind::Interpolate => match self.interpolate_attribute(attribute) {
                    Ok((kind, sampling)) => io.interpolation = Some((kind, sampling, attribute.span)),
                    Err(Poisoned) => failed = true,
                },
                AttributeKind::Invariant => io.invariant = Some(attribute.span),
                _ => {},
            }
        }

        if let (Some(_), Some((_, span))) = (io.location, io.builtin) {
            self.error(span, "multiple entry point IO attributes");
            failed = true;
        }

        if failed {
            return Err(Poisoned);
        }
        Ok(io)
    }

    fn builtin_attribute(&mut self, attribute: &'m Attribute) -> Fallible<BuiltinValue> {
        let [arg] = attribute.args[..] else {
            return Err(self.error(attribute.span, "@builtin expects 1 argument"));
        };
        let (name, span) = self.enumerant(arg)?;
        match BuiltinValue::from_name(name) {
            Some(value) => Ok(value),
            None => Err(self.error(span, format!("unresolved builtin value '{name}'"))),
        }
    }

    fn interpolate_attribute(
        &mut self,
        attribute: &'m Attribute,
    ) -> Fallible<(InterpolationType, Option<InterpolationSampling>)> {
        let (kind, sampling) = match attribute.args[..] {
            [kind] => (kind, None),
            [kind, sampling] => (kind, Some(sampling)),
            _ => return Err(self.error(attribute.span, "@interpolate expects 1 or 2 arguments")),
        };

        let (name, span) = self.enumerant(kind)?;
        let Some(kind) = InterpolationType::from_name(name) else {
            return Err(self.error(span, format!("unresolved interpolation type '{name}'")));
        };

        let sampling = match sampling {
            Some(sampling) => {
                let (name, span) = self.enumerant(sampling)?;
                match InterpolationSampling::from_name(name) {
                    Some(sampling) => Some(sampling),
                    None => return Err(self.error(span, format!("unresolved interpolation sampling '{name}'"))),
                }
            },
            None => None,
        };

        if kind == InterpolationType::Flat && sampling.is_some() {
            return Err(self.error(attribute.span, "flat interpolation attribute must not have a sampling parameter"));
        }
        Ok((kind, sampling))
    }
}

/// Address spaces.
impl Context<'_> {
    /// Checks that values of type `store` may be kept in a variable in the given address space.
    pub(super) fn check_store(&mut self, var: VarId, store: TypeId, space: AddressSpace, access: Access) -> Fallible<()> {
        use AddressSpace as S;

        let module = self.module;
        let decl = &module.vars[var];
        let (name, span) = (self.name(decl.name), decl.name.span);
        let display = self.types.display(store);
        let atomic = self.types.contains_atomic(store);

        let message = if space.is_host_shareable() && !self.types.is_host_shareable(store) {
            Some(format!(
                "Type '{display}' cannot be used in address space '{}' as it is non-host-shareable",
                space.name()
            ))
        } else if space != S::Handle && !self.types.is_storable(store) {
            Some(format!("'{display}' cannot be used as the store type of a 'var<{}>'", space.name()))
        } else if self.contains_runtime_array(store) && space != S::Storage {
            Some("runtime-sized arrays can only be used in the <storage> address space".to_string())
        } else if atomic && !matches!(space, S::Storage | S::Workgroup) {
            Some("atomic variables must have <storage> or <workgroup> address space".to_string())
        } else if atomic && space == S::Storage && access != Access::ReadWrite {
            Some("atomic variables in <storage> address space must have read_write access mode".to_string())
        } else if matches!(self.types.get(store), Type::Array { count: ArrayCount::Override(_), .. })
            && space != S::Workgroup
        {
            Some("array with an 'override' element count can only be used as the store type of a 'var<workgroup>'".to_string())
        } else {
            None
        };

        let result = match message {
            Some(message) => Err(self.error(span, message)),
            None if space == S::Uniform => self.uniform_layout(store, span),
            None => Ok(()),
        };
        if result.is_err() {
            self.note(span, format!("while instantiating 'var' {name}"));
            return result;
        }

        self.record_usage(store, space);
        Ok(())
    }

    fn contains_runtime_array(&self, ty: TypeId) -> bool {
        self.types.is_runtime_array(ty)
            || self.types.as_struct(ty).is_some_and(|strukt| strukt.has_runtime_array(&self.types))
    }

    /// Uniform buffers require structures and array elements to start at 16-byte boundaries.
    fn uniform_layout(&mut self, ty: TypeId, var_span: Span) -> Fallible<()> {
        match self.types.get(ty) {
            Type::Array { elem, stride, .. } => {
                if stride % 16 != 0 {
                    let display = self.types.display(ty);
                    return Err(self.error(
                        var_span,
                        format!("'{display}' cannot be used in address space 'uniform' as the elements of the array must be 16-byte aligned"),
                    ));
                }
                self.uniform_layout(elem, var_span)
            },
            Type::Struct(id) => {
                let members: Vec<_> = self
                    .types
                    .struct_info(id)
                    .members
                    .iter()
                    .map(|member| (member.name.clone(), member.ty, member.offset, member.span))
                    .collect();
                for (name, member_ty, offset, span) in members {
                    let aggregate = matches!(self.types.get(member_ty), Type::Array { .. } | Type::Struct(_));
                    if aggregate && offset % 16 != 0 {
                        let display = self.types.display(member_ty);
                        return Err(self.error(
                            span,
                            format!(
                                "the offset of a struct member of type '{display}' in address space 'uniform' must be a multiple of 16 bytes, but '{name}' is currently at offset {offset}. Consider setting @align(16) on this member"
                            ),
                        ));
                    }
                    self.uniform_layout(member_ty, var_span)?;
                }
                Ok(())
            },
            _ => Ok(()),
        }
    }

    /// Records the address space in every structure reachable from `ty`.
    fn record_usage(&mut self, ty: TypeId, space: AddressSpace) {
        match self.types.get(ty) {
            Type::Array { elem, .. } => self.record_usage(elem, space),
            Type::Struct(id) => {
                let info = self.types.struct_info_mut(id);
                if info.address_space_usage.contains(&space) {
                    return;
                }
                info.address_space_usage.push(space);
                let members: Vec<TypeId> = info.members.iter().map(|member| member.ty).collect();
                for member in members {
                    self.record_usage(member, space);
                }
            },
            _ => {},
        }
    }
}

/// Entry points.
impl<'m> Context<'m> {
    pub(super) fn validate_module(&mut self) {
        let module = self.module;
        for &decl in module.decls.iter() {
            let GlobalDecl::Function(func) = decl else { continue };
            let Some(stage) = self.sem.functions.get(func).and_then(|info| info.stage) else { continue };
            let name = module.functions[func].name;
            let entry = EntryPoint { name: self.name(name), span: name.span, stage };
            tracing::trace!(name = entry.name, stage = stage.name(), "validating entry point");
            self.entry_point(func, entry);
        }
    }

    fn entry_point(&mut self, func: FnId, entry: EntryPoint<'m>) {
        let module = self.module;
        let decl = &module.functions[func];
        let Some(info) = self.sem.functions.get(func).cloned() else { return };

        let mut inputs = Interface::default();
        for &param in decl.params.iter() {
            let Some(var) = self.sem.vars.get(param) else { continue };
            let (ty, io) = (var.ty, var.io.clone());
            let span = module.vars[param].name.span;
            self.interface(entry, Direction::Input, ty, &io, span, &mut inputs);
        }

        let mut outputs = Interface::default();
        if info.return_type != TypeId::VOID {
            let span = decl.return_type.map_or(decl.name.span, |ty| self.expr_span(ty));
            self.interface(entry, Direction::Output, info.return_type, &info.return_io, span, &mut outputs);
        }
        if entry.stage == PipelineStage::Vertex && !outputs.builtins.contains(&BuiltinValue::Position) {
            self.error(entry.span, "a vertex shader must include the 'position' builtin in its return type");
        }

        if entry.stage != PipelineStage::Fragment && info.behaviors.contains(Behaviors::DISCARD) {
            self.error(
                entry.span,
                format!("discard statement cannot be used in {} pipeline stage", entry.stage.name()),
            );
        }

        for callee in self.reachable_functions(func) {
            self.stage_restrictions(callee, func, entry);
        }

        let mut bindings: HashMap<BindingPoint, VarId> = HashMap::new();
        for &decl in module.decls.iter() {
            let GlobalDecl::Var(var) = decl else { continue };
            if !info.transitively_referenced_globals.contains(&var) {
                continue;
            }
            let Some(binding) = self.sem.vars.get(var).and_then(|info| info.binding) else { continue };
            match bindings.entry(binding) {
                Entry::Occupied(first) => {
                    let first = *first.get();
                    self.error(
                        module.vars[var].name.span,
                        format!(
                            "entry point '{}' references multiple variables that use the same resource binding @group({}), @binding({})",
                            entry.name, binding.group, binding.binding
                        ),
                    );
                    self.note(module.vars[first].name.span, "first resource binding usage declared here");
                },
                Entry::Vacant(slot) => {
                    slot.insert(var);
                },
            }
        }
    }

    /// The function and every function it calls, directly or indirectly.
    fn reachable_functions(&self, func: FnId) -> Vec<FnId> {
        let mut functions = vec![func];
        let mut index = 0;
        while let Some(&current) = functions.get(index) {
            index += 1;
            let Some(info) = self.sem.functions.get(current) else { continue };
            for &(callee, _) in info.callees.iter() {
                if !functions.contains(&callee) {
                    functions.push(callee);
                }
            }
        }
        functions
    }

    /// Reports builtins and workgroup variables used by a function which the stage of an entry
    /// point calling it does not allow.
    fn stage_restrictions(&mut self, func: FnId, entry_fn: FnId, entry: EntryPoint<'m>) {
        let module = self.module;
        let Some(info) = self.sem.functions.get(func) else { return };
        let calls = info.builtin_calls.clone();
        let globals = info.directly_referenced_globals.clone();
        let stage = entry.stage.name();

        for (function, span) in calls {
            let Some(stages) = builtin::allowed_stages(function) else { continue };
            if !stages.contains(&entry.stage) {
                self.error(span, format!("built-in cannot be used by {stage} pipeline stage"));
                if func != entry_fn {
                    self.note(entry.span, format!("called by entry point '{}'", entry.name));
                }
            }
        }

        if entry.stage == PipelineStage::Compute {
            return;
        }
        for (var, span) in globals {
            if self.sem.vars.get(var).is_some_and(|info| info.space == Some(AddressSpace::Workgroup)) {
                self.error(span, format!("workgroup memory cannot be used by {stage} pipeline stage"));
                self.note(module.vars[var].name.span, "variable is declared here");
                if func != entry_fn {
                    self.note(entry.span, format!("called by entry point '{}'", entry.name));
                }
            }
        }
    }

    /// Checks one parameter or the return value of an entry point.
    fn interface(
        &mut self,
        entry: EntryPoint<'m>,
        direction: Direction,
        ty: TypeId,
        io: &IoAttributes,
        span: Span,
        seen: &mut Interface,
    ) {
        let Some(strukt) = self.types.as_struct(ty) else {
            let what = match direction {
                Direction::Input => " on parameter",
                Direction::Output => " on return type",
            };
            self.io_value(entry, direction, ty, io, span, what, seen);
            return;
        };

        let members: Vec<_> =
            strukt.members.iter().map(|member| (member.ty, member.io.clone(), member.span)).collect();
        if !io.is_empty() {
            self.error(span, "entry point IO attributes must not be used on structure types");
        }
        for (member_ty, member_io, member_span) in members {
            let errors = self.diagnostics.error_count();
            if self.types.as_struct(member_ty).is_some() {
                self.error(member_span, "nested structures cannot be used for entry point IO");
            } else {
                self.io_value(entry, direction, member_ty, &member_io, member_span, "", seen);
            }
            if self.diagnostics.error_count() != errors {
                self.note(entry.span, format!("while analyzing entry point '{}'", entry.name));
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn io_value(
        &mut self,
        entry: EntryPoint<'m>,
        direction: Direction,
        ty: TypeId,
        io: &IoAttributes,
        span: Span,
        what: &str,
        seen: &mut Interface,
    ) {
        match (io.location, io.builtin) {
            (None, None) => {
                self.error(span, format!("missing entry point IO attribute{what}"));
                return;
            },
            // reported together with the attributes
            (Some(_), Some(_)) => return,
            (None, Some((value, attribute))) => {
                let name = value.name();
                let expected = builtin_value_type(&mut self.types, value);
                if ty != expected {
                    let expected = self.types.display(expected);
                    self.error(attribute, format!("store type of @builtin({name}) must be '{expected}'"));
                }
                if !builtin_usage(value).contains(&(entry.stage, direction)) {
                    self.error(
                        attribute,
                        format!(
                            "@builtin({name}) cannot be used for {} shader {}",
                            entry.stage.name(),
                            direction.name()
                        ),
                    );
                }
                if seen.builtins.contains(&value) {
                    self.error(
                        attribute,
                        format!("@builtin({name}) appears multiple times as pipeline {}", direction.name()),
                    );
                } else {
                    seen.builtins.push(value);
                }
            },
            (Some((location, attribute)), None) => {
                if entry.stage == PipelineStage::Compute {
                    self.error(attribute, "@location cannot be used by compute shaders");
                    return;
                }
                if !self.types.is_numeric_scalar_or_vector(ty) {
                    let display = self.types.display(ty);
                    self.error(attribute, format!("cannot apply @location to declaration of type '{display}'"));
                } else if self.types.element_scalar(ty).is_some_and(Scalar::is_integer)
                    && !matches!(io.interpolation, Some((InterpolationType::Flat, ..)))
                {
                    match (entry.stage, direction) {
                        (PipelineStage::Vertex, Direction::Output) => {
                            self.error(span, "integral user-defined vertex outputs must have a @interpolate(flat) attribute");
                        },
                        (PipelineStage::Fragment, Direction::Input) => {
                            self.error(span, "integral user-defined fragment inputs must have a @interpolate(flat) attribute");
                        },
                        _ => {},
                    }
                }
                if seen.locations.contains(&location) {
                    self.error(attribute, format!("@location({location}) appears multiple times"));
                } else {
                    seen.locations.push(location);
                }
            },
        }

        if let (Some((.., attribute)), None) = (io.interpolation, io.location) {
            self.error(attribute, "@interpolate can only be used with @location");
        }
        if let Some(attribute) = io.invariant {
            if !matches!(io.builtin, Some((BuiltinValue::Position, _))) {
                self.error(attribute, "@invariant must be applied to a position builtin");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use expect_test::{expect, Expect};
    use indoc::indoc;

    use crate::resolve::{resolve, AddressSpace};

    fn check(source: &str, expected: Expect) {
        let module = crate::parse::parse(source).unwrap_or_else(|error| panic!("{error}"));
        let resolved = resolve(&module);
        expected.assert_eq(&resolved.diagnostics().to_string());
    }

    #[test]
    fn valid_interfaces() {
        check(
            indoc! {"
                struct VertexOut {
                    @builtin(position) position: vec4<f32>,
                    @location(0) color: vec3<f32>,
                    @location(1) @interpolate(flat) index: u32,
                }
                @vertex fn vs(@builtin(vertex_index) index: u32, @location(0) offset: vec2<f32>) -> VertexOut {
                    var out: VertexOut;
                    out.index = index;
                    return out;
                }
                @fragment fn fs(input: VertexOut) -> @location(0) vec4<f32> {
                    return input.position;
                }
            "},
            expect![[""]],
        );
    }

    #[test]
    fn invalid_interfaces() {
        check(
            indoc! {"
                @vertex fn a() -> @location(0) vec4<f32> { return vec4(); }
                @fragment fn b(@builtin(vertex_index) index: u32, @builtin(position) p: vec3<f32>) {}
                @fragment fn c(@location(0) x: i32, @location(0) y: f32) {}
                @fragment fn d(@location(1) b: bool) {}
                @compute @workgroup_size(1) fn e(@builtin(local_invocation_index) i: u32, @builtin(local_invocation_index) j: u32) {}
            "},
            expect![[r#"
                1:12 error: a vertex shader must include the 'position' builtin in its return type
                2:16 error: @builtin(vertex_index) cannot be used for fragment shader input
                2:51 error: store type of @builtin(position) must be 'vec4<f32>'
                3:29 error: integral user-defined fragment inputs must have a @interpolate(flat) attribute
                3:37 error: @location(0) appears multiple times
                4:16 error: cannot apply @location to declaration of type 'bool'
                5:75 error: @builtin(local_invocation_index) appears multiple times as pipeline input"#]],
        );
    }

    #[test]
    fn structure_interfaces() {
        check(
            indoc! {"
                struct Inner { @location(0) x: f32 }
                struct Outer { inner: Inner, @location(1) y: f32, z: f32 }
                @fragment fn f(input: Outer) {}
            "},
            expect![[r#"
                2:16 error: nested structures cannot be used for entry point IO
                3:14 note: while analyzing entry point 'f'
                2:51 error: missing entry point IO attribute
                3:14 note: while analyzing entry point 'f'"#]],
        );
    }

    #[test]
    fn resource_usage() {
        check(
            indoc! {"
                @group(0) @binding(0) var<uniform> a: vec4<f32>;
                @group(0) @binding(0) var<uniform> b: vec4<f32>;
                var<workgroup> cache: array<u32, 4>;
                fn helper() -> u32 { return cache[0]; }
                @fragment fn f() -> @location(0) vec4<f32> {
                    let x = helper();
                    return a + b;
                }
                @compute @workgroup_size(1) fn g() {
                    let y = a;
                    let z = cache[1];
                }
            "},
            expect![[r#"
                4:29 error: workgroup memory cannot be used by fragment pipeline stage
                3:16 note: variable is declared here
                5:14 note: called by entry point 'f'
                2:36 error: entry point 'f' references multiple variables that use the same resource binding @group(0), @binding(0)
                1:36 note: first resource binding usage declared here"#]],
        );
    }

    #[test]
    fn address_space_rules() {
        check(
            indoc! {"
                struct S { data: array<f32> }
                var<private> a: array<f32>;
                @group(0) @binding(0) var<uniform> b: S;
                var<private> c: atomic<u32>;
                @group(0) @binding(1) var<storage> d: atomic<u32>;
                var<workgroup> e: atomic<u32>;
                override n: u32 = 4;
                var<private> f: array<i32, n>;
                var<workgroup> g: array<i32, n>;
            "},
            expect![[r#"
                2:14 error: runtime-sized arrays can only be used in the <storage> address space
                2:14 note: while instantiating 'var' a
                3:36 error: runtime-sized arrays can only be used in the <storage> address space
                3:36 note: while instantiating 'var' b
                4:14 error: atomic variables must have <storage> or <workgroup> address space
                4:14 note: while instantiating 'var' c
                5:36 error: atomic variables in <storage> address space must have read_write access mode
                5:36 note: while instantiating 'var' d
                8:14 error: array with an 'override' element count can only be used as the store type of a 'var<workgroup>'
                8:14 note: while instantiating 'var' f"#]],
        );
    }

    #[test]
    fn uniform_layout() {
        check(
            indoc! {"
                struct Inner { x: f32 }
                struct S { a: f32, inner: Inner }
                @group(0) @binding(0) var<uniform> s: S;
                @group(0) @binding(1) var<uniform> v: array<f32, 4>;
            "},
            expect![[r#"
                2:20 error: the offset of a struct member of type 'Inner' in address space 'uniform' must be a multiple of 16 bytes, but 'inner' is currently at offset 4. Consider setting @align(16) on this member
                3:36 note: while instantiating 'var' s
                4:36 error: 'array<f32, 4>' cannot be used in address space 'uniform' as the elements of the array must be 16-byte aligned
                4:36 note: while instantiating 'var' v"#]],
        );
    }

    #[test]
    fn stage_restricted_builtins() {
        check(
            indoc! {"
                fn helper() { workgroupBarrier(); }
                @fragment fn f() { helper(); }
                @vertex fn v() -> @builtin(position) vec4<f32> { discard; }
            "},
            expect![[r#"
                1:15 error: built-in cannot be used by fragment pipeline stage
                2:14 note: called by entry point 'f'
                3:12 error: discard statement cannot be used in vertex pipeline stage"#]],
        );
    }

    #[test]
    fn struct_address_space_usage() {
        let module = crate::parse::parse(indoc! {"
            struct Light { color: vec4<f32> }
            struct Lights { items: array<Light, 2> }
            @group(0) @binding(0) var<uniform> lights: Lights;
            var<private> scratch: Light;
        "})
        .unwrap();
        let resolved = resolve(&module);
        assert!(resolved.is_valid(), "{}", resolved.diagnostics());
        let usage = |name: &str| {
            let (strukt, _) = module.structs.iter().find(|(_, decl)| module.name(decl.name) == name).unwrap();
            let ty = resolved.struct_type(strukt).unwrap();
            resolved.types().as_struct(ty).unwrap().address_space_usage.clone()
        };
        assert_eq!(usage("Lights"), [AddressSpace::Uniform]);
        assert_eq!(usage("Light"), [AddressSpace::Uniform, AddressSpace::Private]);
    }
}
