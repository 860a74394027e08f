//! Semantic information attached to syntax nodes by the resolver.

use std::collections::HashMap;

use crate::arena::SecondaryMap;
use crate::ast::{self, FnId, GlobalDecl, VarId, VariableKind};
use crate::diagnostic::Span;

use super::constant::ConstantValue;
use super::types::{Access, AddressSpace, TypeId};

/// When the value of an expression becomes known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EvaluationStage {
    /// At shader-creation time.
    Constant,
    /// At pipeline-creation time.
    Override,
    /// While the shader executes.
    Runtime,
}

impl EvaluationStage {
    pub fn name(self) -> &'static str {
        match self {
            EvaluationStage::Constant => "const-expression",
            EvaluationStage::Override => "override-expression",
            EvaluationStage::Runtime => "runtime-expression",
        }
    }

    pub fn with_article(self) -> String {
        match self {
            EvaluationStage::Override => format!("an {}", self.name()),
            _ => format!("a {}", self.name()),
        }
    }
}

bitflags::bitflags! {
    /// The ways in which control may leave a statement.
    #[derive(Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Behaviors: u8 {
        const NEXT = 1 << 0;
        const RETURN = 1 << 1;
        const DISCARD = 1 << 2;
        const BREAK = 1 << 3;
        const CONTINUE = 1 << 4;
    }
}

impl std::fmt::Debug for Behaviors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        const NAMES: [(Behaviors, &str); 5] = [
            (Behaviors::NEXT, "Next"),
            (Behaviors::RETURN, "Return"),
            (Behaviors::DISCARD, "Discard"),
            (Behaviors::BREAK, "Break"),
            (Behaviors::CONTINUE, "Continue"),
        ];
        f.debug_set()
            .entries(NAMES.iter().filter(|(flag, _)| self.contains(*flag)).map(|(_, name)| name))
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExprInfo {
    pub ty: TypeId,
    pub stage: EvaluationStage,
    pub value: Option<ConstantValue>,
    /// The variable ultimately read or written through this expression.
    pub source_variable: Option<VarId>,
    pub behaviors: Behaviors,
    /// Set for vector swizzles, which cannot have their address taken.
    pub is_swizzle: bool,
}

impl ExprInfo {
    pub fn new(ty: TypeId, stage: EvaluationStage) -> ExprInfo {
        ExprInfo {
            ty,
            stage,
            value: None,
            source_variable: None,
            behaviors: Behaviors::NEXT,
            is_swizzle: false,
        }
    }

    pub fn constant(value: ConstantValue) -> ExprInfo {
        let ty = value.ty();
        ExprInfo { value: Some(value), ..ExprInfo::new(ty, EvaluationStage::Constant) }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineStage {
    Vertex,
    Fragment,
    Compute,
}

impl PipelineStage {
    pub fn name(self) -> &'static str {
        match self {
            PipelineStage::Vertex => "vertex",
            PipelineStage::Fragment => "fragment",
            PipelineStage::Compute => "compute",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinValue {
    Position,
    VertexIndex,
    InstanceIndex,
    FrontFacing,
    FragDepth,
    SampleIndex,
    SampleMask,
    LocalInvocationId,
    LocalInvocationIndex,
    GlobalInvocationId,
    WorkgroupId,
    NumWorkgroups,
}

impl BuiltinValue {
    const ALL: [(BuiltinValue, &'static str); 12] = [
        (BuiltinValue::Position, "position"),
        (BuiltinValue::VertexIndex, "vertex_index"),
        (BuiltinValue::InstanceIndex, "instance_index"),
        (BuiltinValue::FrontFacing, "front_facing"),
        (BuiltinValue::FragDepth, "frag_depth"),
        (BuiltinValue::SampleIndex, "sample_index"),
        (BuiltinValue::SampleMask, "sample_mask"),
        (BuiltinValue::LocalInvocationId, "local_invocation_id"),
        (BuiltinValue::LocalInvocationIndex, "local_invocation_index"),
        (BuiltinValue::GlobalInvocationId, "global_invocation_id"),
        (BuiltinValue::WorkgroupId, "workgroup_id"),
        (BuiltinValue::NumWorkgroups, "num_workgroups"),
    ];

    pub fn from_name(name: &str) -> Option<BuiltinValue> {
        Self::ALL.iter().find(|(_, text)| *text == name).map(|(value, _)| *value)
    }

    pub fn name(self) -> &'static str {
        Self::ALL.iter().find(|(value, _)| *value == self).map_or("", |(_, name)| name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InterpolationType {
    Perspective,
    Linear,
    Flat,
}

impl InterpolationType {
    pub fn from_name(name: &str) -> Option<InterpolationType> {
        Some(match name {
            "perspective" => InterpolationType::Perspective,
            "linear" => InterpolationType::Linear,
            "flat" => InterpolationType::Flat,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InterpolationSampling {
    Center,
    Centroid,
    Sample,
}

impl InterpolationSampling {
    pub fn from_name(name: &str) -> Option<InterpolationSampling> {
        Some(match name {
            "center" => InterpolationSampling::Center,
            "centroid" => InterpolationSampling::Centroid,
            "sample" => InterpolationSampling::Sample,
            _ => return None,
        })
    }
}

/// Shader interface attributes of an entry point parameter, return value or structure member.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IoAttributes {
    pub location: Option<(u32, Span)>,
    pub builtin: Option<(BuiltinValue, Span)>,
    pub interpolation: Option<(InterpolationType, Option<InterpolationSampling>, Span)>,
    pub invariant: Option<Span>,
}

impl IoAttributes {
    pub fn is_empty(&self) -> bool {
        *self == IoAttributes::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BindingPoint {
    pub group: u32,
    pub binding: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableInfo {
    pub kind: VariableKind,
    /// The type of an identifier expression naming the variable: a reference for `var`s.
    pub ty: TypeId,
    pub store_type: TypeId,
    pub space: Option<AddressSpace>,
    pub access: Option<Access>,
    /// The stage at which the value of a `const`, `override` or `let` becomes known.
    pub stage: EvaluationStage,
    /// The value of the initializer, if it is a constant expression.
    pub value: Option<ConstantValue>,
    pub binding: Option<BindingPoint>,
    pub override_id: Option<u16>,
    pub io: IoAttributes,
    /// `true` for module-scope declarations.
    pub global: bool,
}

/// One dimension of a compute shader's workgroup size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkgroupDimension {
    Constant(u32),
    /// Determined by a pipeline-overridable constant.
    Override,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionInfo {
    pub params: Vec<VarId>,
    pub return_type: TypeId,
    pub return_io: IoAttributes,
    pub stage: Option<PipelineStage>,
    pub workgroup_size: Option<[WorkgroupDimension; 3]>,
    pub must_use: bool,
    pub behaviors: Behaviors,
    /// Module-scope variables referenced by the function body, with the first reference.
    pub directly_referenced_globals: Vec<(VarId, Span)>,
    /// Module-scope variables referenced by the function or anything it calls.
    pub transitively_referenced_globals: Vec<VarId>,
    /// Functions called by this function, with the first call site.
    pub callees: Vec<(FnId, Span)>,
    /// Builtin functions called by this function, with the first call site.
    pub builtin_calls: Vec<(&'static str, Span)>,
}

impl FunctionInfo {
    pub fn is_entry_point(&self) -> bool {
        self.stage.is_some()
    }
}

/// What a local declaration hides from an enclosing scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shadowed {
    Local(VarId),
    Global(GlobalDecl),
}

/// The semantic side-table, keyed by syntax node.
#[derive(Default)]
pub struct Sem {
    pub exprs: SecondaryMap<ast::Expr, ExprInfo>,
    /// Expressions which name a type, such as the declared type of a variable.
    pub type_exprs: SecondaryMap<ast::Expr, TypeId>,
    /// Type expressions which spell a type through an alias.
    pub type_aliases: SecondaryMap<ast::Expr, ast::AliasId>,
    pub stmts: SecondaryMap<ast::Stmt, Behaviors>,
    /// Whether control can reach a statement from the start of its enclosing block.
    pub reachable: SecondaryMap<ast::Stmt, bool>,
    pub vars: SecondaryMap<ast::Variable, VariableInfo>,
    pub functions: SecondaryMap<ast::Function, FunctionInfo>,
    pub structs: SecondaryMap<ast::Struct, TypeId>,
    pub aliases: SecondaryMap<ast::Alias, TypeId>,
    pub shadows: HashMap<VarId, Shadowed>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn behaviors() {
        let mut behaviors = Behaviors::NEXT | Behaviors::BREAK;
        assert!(behaviors.contains(Behaviors::BREAK));
        behaviors.remove(Behaviors::BREAK);
        behaviors.insert(Behaviors::RETURN);
        assert_eq!(format!("{behaviors:?}"), r#"{"Next", "Return"}"#);
        assert!(Behaviors::empty().is_empty());
        assert!(behaviors.contains(Behaviors::empty()));
        assert_eq!(format!("{:?}", behaviors.difference(Behaviors::NEXT)), r#"{"Return"}"#);
    }

    #[test]
    fn stages_are_ordered() {
        assert!(EvaluationStage::Constant < EvaluationStage::Override);
        assert!(EvaluationStage::Override < EvaluationStage::Runtime);
        assert_eq!(EvaluationStage::Override.with_article(), "an override-expression");
    }
}
