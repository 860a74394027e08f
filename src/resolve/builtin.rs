//! Predeclared types and functions.
//!
//! The names of builtin functions and predeclared type aliases come from the `wgsl-spec` data. The
//! overloads themselves are matched here against the argument types of a call.

use std::collections::HashMap;
use std::sync::OnceLock;

use crate::ast::{BinaryOp, UnaryOp};

use super::constant::{ConstantValue, EvalResult};
use super::sem::PipelineStage;
use super::types::{AddressSpace, ArrayCount, Scalar, TextureDimension, TextureKind, Type, TypeId, Types};

static BUILTIN_FUNCTIONS: OnceLock<wgsl_spec::FunctionInfo> = OnceLock::new();
static PREDECLARED_ALIASES: OnceLock<HashMap<String, BuiltinType>> = OnceLock::new();

fn get_builtin_functions() -> &'static wgsl_spec::FunctionInfo {
    BUILTIN_FUNCTIONS.get_or_init(|| {
        wgsl_spec::include::functions().expect("could not load builtin function definitions")
    })
}

fn predeclared_aliases() -> &'static HashMap<String, BuiltinType> {
    PREDECLARED_ALIASES.get_or_init(|| {
        let tokens = wgsl_spec::include::tokens().expect("could not load builtin token definitions");
        tokens
            .type_aliases
            .iter()
            .filter_map(|(name, target)| Some((name.clone(), parse_alias_target(target)?)))
            .collect()
    })
}

/// Parses the expansion of a predeclared alias, such as `vec3<f32>` or `mat2x4<f16>`.
fn parse_alias_target(target: &str) -> Option<BuiltinType> {
    let (generator, rest) = target.split_once('<')?;
    let scalar = match rest.strip_suffix('>')?.trim() {
        "f32" => Scalar::F32,
        "f16" => Scalar::F16,
        "i32" => Scalar::I32,
        "u32" => Scalar::U32,
        "bool" => Scalar::Bool,
        _ => return None,
    };
    match builtin_type_by_name(generator)? {
        BuiltinType::Vector { size, elem: None } => Some(BuiltinType::Vector { size, elem: Some(scalar) }),
        BuiltinType::Matrix { columns, rows, elem: None } => {
            Some(BuiltinType::Matrix { columns, rows, elem: Some(scalar) })
        },
        _ => None,
    }
}

/// A predeclared type or type generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinType {
    Scalar(Scalar),
    /// `vecN`, where the element type is implied by predeclared aliases such as `vec3f`.
    Vector { size: u8, elem: Option<Scalar> },
    Matrix { columns: u8, rows: u8, elem: Option<Scalar> },
    Array,
    Atomic,
    Pointer,
    Sampler { comparison: bool },
    SampledTexture(TextureDimension),
    MultisampledTexture,
    DepthTexture(TextureDimension),
    DepthMultisampledTexture,
    StorageTexture(TextureDimension),
    ExternalTexture,
}

impl BuiltinType {
    /// Whether the type requires a template list to name a type.
    pub fn is_generator(self) -> bool {
        matches!(
            self,
            BuiltinType::Vector { elem: None, .. }
                | BuiltinType::Matrix { elem: None, .. }
                | BuiltinType::Array
                | BuiltinType::Atomic
                | BuiltinType::Pointer
                | BuiltinType::SampledTexture(_)
                | BuiltinType::MultisampledTexture
                | BuiltinType::StorageTexture(_)
        )
    }
}

pub fn builtin_type(name: &str) -> Option<BuiltinType> {
    builtin_type_by_name(name).or_else(|| predeclared_aliases().get(name).copied())
}

fn builtin_type_by_name(name: &str) -> Option<BuiltinType> {
    use TextureDimension as D;
    Some(match name {
        "bool" => BuiltinType::Scalar(Scalar::Bool),
        "i32" => BuiltinType::Scalar(Scalar::I32),
        "u32" => BuiltinType::Scalar(Scalar::U32),
        "f32" => BuiltinType::Scalar(Scalar::F32),
        "f16" => BuiltinType::Scalar(Scalar::F16),
        "vec2" => BuiltinType::Vector { size: 2, elem: None },
        "vec3" => BuiltinType::Vector { size: 3, elem: None },
        "vec4" => BuiltinType::Vector { size: 4, elem: None },
        "array" => BuiltinType::Array,
        "atomic" => BuiltinType::Atomic,
        "ptr" => BuiltinType::Pointer,
        "sampler" => BuiltinType::Sampler { comparison: false },
        "sampler_comparison" => BuiltinType::Sampler { comparison: true },
        "texture_1d" => BuiltinType::SampledTexture(D::D1),
        "texture_2d" => BuiltinType::SampledTexture(D::D2),
        "texture_2d_array" => BuiltinType::SampledTexture(D::D2Array),
        "texture_3d" => BuiltinType::SampledTexture(D::D3),
        "texture_cube" => BuiltinType::SampledTexture(D::Cube),
        "texture_cube_array" => BuiltinType::SampledTexture(D::CubeArray),
        "texture_multisampled_2d" => BuiltinType::MultisampledTexture,
        "texture_depth_2d" => BuiltinType::DepthTexture(D::D2),
        "texture_depth_2d_array" => BuiltinType::DepthTexture(D::D2Array),
        "texture_depth_cube" => BuiltinType::DepthTexture(D::Cube),
        "texture_depth_cube_array" => BuiltinType::DepthTexture(D::CubeArray),
        "texture_depth_multisampled_2d" => BuiltinType::DepthMultisampledTexture,
        "texture_storage_1d" => BuiltinType::StorageTexture(D::D1),
        "texture_storage_2d" => BuiltinType::StorageTexture(D::D2),
        "texture_storage_2d_array" => BuiltinType::StorageTexture(D::D2Array),
        "texture_storage_3d" => BuiltinType::StorageTexture(D::D3),
        "texture_external" => BuiltinType::ExternalTexture,
        _ => {
            let dims = name.strip_prefix("mat")?.as_bytes();
            let [columns @ b'2'..=b'4', b'x', rows @ b'2'..=b'4'] = dims else { return None };
            BuiltinType::Matrix { columns: columns - b'0', rows: rows - b'0', elem: None }
        },
    })
}

/// The builtin functions this resolver can type-check.
const SUPPORTED: &[&str] = &[
    "abs", "acos", "acosh", "all", "any", "arrayLength", "asin", "asinh", "atan", "atan2", "atanh",
    "atomicAdd", "atomicAnd", "atomicExchange", "atomicLoad", "atomicMax", "atomicMin", "atomicOr",
    "atomicStore", "atomicSub", "atomicXor", "ceil", "clamp", "cos", "cosh", "countLeadingZeros",
    "countOneBits", "countTrailingZeros", "cross", "degrees", "determinant", "distance", "dot",
    "dpdx", "dpdxCoarse", "dpdxFine", "dpdy", "dpdyCoarse", "dpdyFine", "exp", "exp2",
    "extractBits", "faceForward", "firstLeadingBit", "firstTrailingBit", "floor", "fma", "fract",
    "fwidth", "fwidthCoarse", "fwidthFine", "insertBits", "inverseSqrt", "length", "log", "log2",
    "max", "min", "mix", "normalize", "pack2x16float", "pack2x16snorm", "pack2x16unorm",
    "pack4x8snorm", "pack4x8unorm", "pow", "quantizeToF16", "radians", "reflect", "refract",
    "reverseBits", "round", "saturate", "select", "sign", "sin", "sinh", "smoothstep", "sqrt",
    "step", "storageBarrier", "tan", "tanh", "textureBarrier", "textureDimensions", "textureLoad",
    "textureNumLayers", "textureNumLevels", "textureNumSamples", "textureSample",
    "textureSampleCompare", "textureSampleLevel", "textureStore", "transpose", "trunc",
    "unpack2x16float", "unpack2x16snorm", "unpack2x16unorm", "unpack4x8snorm", "unpack4x8unorm",
    "workgroupBarrier",
];

/// Builtins which may be evaluated at shader-creation time.
const CONST_EVALUABLE: &[&str] = &[
    "abs", "acos", "all", "any", "asin", "atan", "atan2", "ceil", "clamp", "cos", "cosh",
    "countLeadingZeros", "countOneBits", "countTrailingZeros", "cross", "degrees", "determinant",
    "distance", "dot", "exp", "exp2", "floor", "fract", "inverseSqrt", "length", "log", "log2",
    "max", "min", "normalize", "pow", "radians", "reverseBits", "round", "saturate", "select",
    "sign", "sin", "sinh", "sqrt", "step", "tan", "tanh", "transpose", "trunc",
];

/// Returns the canonical name of a builtin function, or `None` if there is no such builtin.
pub fn builtin_function(name: &str) -> Option<&'static str> {
    if let Some(found) = SUPPORTED.iter().find(|supported| **supported == name) {
        return Some(*found);
    }
    get_builtin_functions()
        .functions
        .get_key_value(name)
        .map(|(name, _)| name.as_str())
        .filter(|name| *name != "bitcast")
}

pub fn is_supported(name: &str) -> bool {
    SUPPORTED.contains(&name)
}

pub fn is_const_evaluable(name: &str) -> bool {
    CONST_EVALUABLE.contains(&name)
}

/// Whether the result of a call must be used.
pub fn must_use(name: &str) -> bool {
    !name.starts_with("atomic")
}

/// The pipeline stages a builtin may be used from, if it is restricted.
pub fn allowed_stages(name: &str) -> Option<&'static [PipelineStage]> {
    match name {
        "dpdx" | "dpdxCoarse" | "dpdxFine" | "dpdy" | "dpdyCoarse" | "dpdyFine" | "fwidth"
        | "fwidthCoarse" | "fwidthFine" | "textureSample" | "textureSampleCompare" => {
            Some(&[PipelineStage::Fragment])
        },
        "workgroupBarrier" | "storageBarrier" | "textureBarrier" => Some(&[PipelineStage::Compute]),
        _ => None,
    }
}

/// The parameter and return types of a builtin call.
#[derive(Debug, Clone, PartialEq)]
pub struct Overload {
    /// The types each argument is converted to.
    pub params: Vec<TypeId>,
    pub ret: TypeId,
}

/// Constraints on the scalar type of a generic parameter.
#[derive(Debug, Clone, Copy)]
enum Elem {
    Float,
    Numeric,
    Signed,
    Integer,
    Bool,
    F32,
}

impl Elem {
    /// The scalar type a parameter of type `scalar` is converted to, if accepted.
    fn accepts(self, scalar: Scalar) -> Option<Scalar> {
        match self {
            Elem::Float if scalar.is_float() => Some(scalar),
            Elem::Float if scalar == Scalar::AbstractInt => Some(Scalar::AbstractFloat),
            Elem::Numeric if scalar.is_numeric() => Some(scalar),
            Elem::Signed if scalar.is_numeric() && scalar != Scalar::U32 => Some(scalar),
            Elem::Integer if matches!(scalar, Scalar::I32 | Scalar::U32) => Some(scalar),
            Elem::Integer if scalar == Scalar::AbstractInt => Some(Scalar::I32),
            Elem::Bool if scalar == Scalar::Bool => Some(scalar),
            Elem::F32 if matches!(scalar, Scalar::F32 | Scalar::AbstractFloat | Scalar::AbstractInt) => {
                Some(Scalar::F32)
            },
            _ => None,
        }
    }
}

/// Finds the overload of a builtin matching the given argument types.
///
/// Arguments are given by their value types. Abstract arguments are kept abstract if the overload
/// accepts them, so that the call may be evaluated at shader-creation time.
pub fn function_overload(types: &mut Types, name: &str, args: &[TypeId]) -> Option<Overload> {
    let same = |ty: TypeId, count: usize| vec![ty; count];
    let overload = |params: Vec<TypeId>, ret: TypeId| Some(Overload { params, ret });

    match name {
        "acos" | "acosh" | "asin" | "asinh" | "atan" | "atanh" | "ceil" | "cos" | "cosh"
        | "degrees" | "exp" | "exp2" | "floor" | "fract" | "inverseSqrt" | "log" | "log2"
        | "radians" | "round" | "saturate" | "sin" | "sinh" | "sqrt" | "tan" | "tanh" | "trunc" => {
            let ty = componentwise(types, args, 1, Elem::Float)?;
            overload(same(ty, 1), ty)
        },
        "dpdx" | "dpdxCoarse" | "dpdxFine" | "dpdy" | "dpdyCoarse" | "dpdyFine" | "fwidth"
        | "fwidthCoarse" | "fwidthFine" | "quantizeToF16" => {
            let ty = componentwise(types, args, 1, Elem::F32)?;
            overload(same(ty, 1), ty)
        },
        "abs" => {
            let ty = componentwise(types, args, 1, Elem::Numeric)?;
            overload(same(ty, 1), ty)
        },
        "sign" => {
            let ty = componentwise(types, args, 1, Elem::Signed)?;
            overload(same(ty, 1), ty)
        },
        "atan2" | "pow" | "step" => {
            let ty = componentwise(types, args, 2, Elem::Float)?;
            overload(same(ty, 2), ty)
        },
        "min" | "max" => {
            let ty = componentwise(types, args, 2, Elem::Numeric)?;
            overload(same(ty, 2), ty)
        },
        "clamp" => {
            let ty = componentwise(types, args, 3, Elem::Numeric)?;
            overload(same(ty, 3), ty)
        },
        "smoothstep" | "fma" => {
            let ty = componentwise(types, args, 3, Elem::Float)?;
            overload(same(ty, 3), ty)
        },
        "mix" => {
            if let Some(ty) = componentwise(types, args, 3, Elem::Float) {
                return overload(same(ty, 3), ty);
            }
            // mix(vecN<T>, vecN<T>, T)
            let [a, b, t] = args else { return None };
            let ty = componentwise(types, &[*a, *b], 2, Elem::Float)?;
            types.vector_size(ty)?;
            let elem = types.element_scalar(ty)?.id();
            let scalar = types.common_type(&[elem, *t])?;
            let scalar = Elem::Float.accepts(types.scalar(scalar)?)?;
            let ty = types.with_scalar(ty, scalar);
            overload(vec![ty, ty, scalar.id()], ty)
        },
        "dot" => {
            let ty = componentwise(types, args, 2, Elem::Numeric)?;
            types.vector_size(ty)?;
            let scalar = types.element_scalar(ty)?.id();
            overload(same(ty, 2), scalar)
        },
        "cross" => {
            let ty = componentwise(types, args, 2, Elem::Float)?;
            (types.vector_size(ty)? == 3).then_some(())?;
            overload(same(ty, 2), ty)
        },
        "length" => {
            let ty = componentwise(types, args, 1, Elem::Float)?;
            let scalar = types.element_scalar(ty)?.id();
            overload(same(ty, 1), scalar)
        },
        "distance" => {
            let ty = componentwise(types, args, 2, Elem::Float)?;
            let scalar = types.element_scalar(ty)?.id();
            overload(same(ty, 2), scalar)
        },
        "normalize" => {
            let ty = componentwise(types, args, 1, Elem::Float)?;
            types.vector_size(ty)?;
            overload(same(ty, 1), ty)
        },
        "reflect" | "faceForward" => {
            let arity = if name == "reflect" { 2 } else { 3 };
            let ty = componentwise(types, args, arity, Elem::Float)?;
            types.vector_size(ty)?;
            overload(same(ty, arity), ty)
        },
        "refract" => {
            let [a, b, eta] = args else { return None };
            let ty = componentwise(types, &[*a, *b], 2, Elem::Float)?;
            types.vector_size(ty)?;
            let scalar = types.element_scalar(ty)?;
            types.can_convert(*eta, scalar.id()).then_some(())?;
            overload(vec![ty, ty, scalar.id()], ty)
        },
        "determinant" => {
            let [arg] = args else { return None };
            let Type::Matrix { columns, rows, elem } = types.get(*arg) else { return None };
            (columns == rows).then_some(())?;
            let scalar = Elem::Float.accepts(types.scalar(elem)?)?;
            let ty = types.matrix(scalar.id(), columns, rows);
            overload(vec![ty], scalar.id())
        },
        "transpose" => {
            let [arg] = args else { return None };
            let Type::Matrix { columns, rows, elem } = types.get(*arg) else { return None };
            let scalar = Elem::Float.accepts(types.scalar(elem)?)?;
            let ty = types.matrix(scalar.id(), columns, rows);
            let ret = types.matrix(scalar.id(), rows, columns);
            overload(vec![ty], ret)
        },
        "all" | "any" => {
            let ty = componentwise(types, args, 1, Elem::Bool)?;
            overload(vec![ty], TypeId::BOOL)
        },
        "select" => {
            let [f, t, condition] = args else { return None };
            let ty = types.common_type(&[*f, *t])?;
            if !matches!(types.get(ty), Type::Scalar(_) | Type::Vector { .. }) {
                return None;
            }
            let condition_ty = match types.get(*condition) {
                Type::Scalar(Scalar::Bool) => TypeId::BOOL,
                Type::Vector { size, elem: TypeId::BOOL } if types.vector_size(ty) == Some(size) => {
                    *condition
                },
                _ => return None,
            };
            overload(vec![ty, ty, condition_ty], ty)
        },
        "countLeadingZeros" | "countOneBits" | "countTrailingZeros" | "reverseBits"
        | "firstLeadingBit" | "firstTrailingBit" => {
            let ty = componentwise(types, args, 1, Elem::Integer)?;
            overload(vec![ty], ty)
        },
        "extractBits" => {
            let [e, offset, count] = args else { return None };
            let ty = componentwise(types, &[*e], 1, Elem::Integer)?;
            unsigned(types, &[*offset, *count])?;
            overload(vec![ty, TypeId::U32, TypeId::U32], ty)
        },
        "insertBits" => {
            let [e, newbits, offset, count] = args else { return None };
            let ty = componentwise(types, &[*e, *newbits], 2, Elem::Integer)?;
            unsigned(types, &[*offset, *count])?;
            overload(vec![ty, ty, TypeId::U32, TypeId::U32], ty)
        },
        "pack4x8snorm" | "pack4x8unorm" | "pack2x16snorm" | "pack2x16unorm" | "pack2x16float" => {
            let size = if name.starts_with("pack4") { 4 } else { 2 };
            let ty = types.vector(TypeId::F32, size);
            let [arg] = args else { return None };
            types.can_convert(*arg, ty).then_some(())?;
            overload(vec![ty], TypeId::U32)
        },
        "unpack4x8snorm" | "unpack4x8unorm" | "unpack2x16snorm" | "unpack2x16unorm"
        | "unpack2x16float" => {
            let size = if name.starts_with("unpack4") { 4 } else { 2 };
            let [arg] = args else { return None };
            types.can_convert(*arg, TypeId::U32).then_some(())?;
            let ret = types.vector(TypeId::F32, size);
            overload(vec![TypeId::U32], ret)
        },
        "workgroupBarrier" | "storageBarrier" | "textureBarrier" => {
            args.is_empty().then_some(())?;
            overload(Vec::new(), TypeId::VOID)
        },
        "arrayLength" => {
            let [arg] = args else { return None };
            let Type::Pointer { space: AddressSpace::Storage, pointee, .. } = types.get(*arg) else {
                return None;
            };
            let Type::Array { count: ArrayCount::Runtime, .. } = types.get(pointee) else { return None };
            overload(vec![*arg], TypeId::U32)
        },
        "atomicLoad" => {
            let [pointer] = args else { return None };
            let elem = atomic_pointee(types, *pointer)?;
            overload(vec![*pointer], elem)
        },
        "atomicStore" | "atomicAdd" | "atomicSub" | "atomicMax" | "atomicMin" | "atomicAnd"
        | "atomicOr" | "atomicXor" | "atomicExchange" => {
            let [pointer, value] = args else { return None };
            let elem = atomic_pointee(types, *pointer)?;
            types.can_convert(*value, elem).then_some(())?;
            let ret = if name == "atomicStore" { TypeId::VOID } else { elem };
            overload(vec![*pointer, elem], ret)
        },
        _ if name.starts_with("texture") => texture_overload(types, name, args),
        _ => None,
    }
}

/// The common scalar or vector type of the arguments, with its scalar type accepted by `elem`.
fn componentwise(types: &mut Types, args: &[TypeId], arity: usize, elem: Elem) -> Option<TypeId> {
    if args.len() != arity {
        return None;
    }
    if !args.iter().all(|arg| matches!(types.get(*arg), Type::Scalar(_) | Type::Vector { .. })) {
        return None;
    }
    let common = types.common_type(args)?;
    let scalar = elem.accepts(types.element_scalar(common)?)?;
    Some(types.with_scalar(common, scalar))
}

fn unsigned(types: &Types, args: &[TypeId]) -> Option<()> {
    args.iter().all(|arg| types.can_convert(*arg, TypeId::U32)).then_some(())
}

fn atomic_pointee(types: &Types, pointer: TypeId) -> Option<TypeId> {
    let Type::Pointer { pointee, space, .. } = types.get(pointer) else { return None };
    if !matches!(space, AddressSpace::Storage | AddressSpace::Workgroup) {
        return None;
    }
    match types.get(pointee) {
        Type::Atomic(elem) => Some(elem),
        _ => None,
    }
}

fn texture_overload(types: &mut Types, name: &str, args: &[TypeId]) -> Option<Overload> {
    let (&texture, rest) = args.split_first()?;
    let Type::Texture(kind) = types.get(texture) else { return None };

    let dimension = match kind {
        TextureKind::Sampled { dimension, .. }
        | TextureKind::Depth { dimension }
        | TextureKind::Storage { dimension, .. } => dimension,
        TextureKind::Multisampled { .. } | TextureKind::DepthMultisampled | TextureKind::External => {
            TextureDimension::D2
        },
    };
    let is_depth = matches!(kind, TextureKind::Depth { .. } | TextureKind::DepthMultisampled);

    let coordinates = |types: &mut Types, elem: TypeId| match dimension.coordinates() {
        1 => elem,
        n => types.vector(elem, n),
    };
    let integer = |types: &Types, ty: TypeId| -> Option<TypeId> {
        let scalar = types.element_scalar(ty)?;
        Some(match scalar {
            Scalar::I32 | Scalar::AbstractInt => TypeId::I32,
            Scalar::U32 => TypeId::U32,
            _ => return None,
        })
    };
    let matches = |types: &Types, params: &[TypeId]| {
        params.len() == args.len()
            && params.iter().zip(args.iter()).all(|(param, arg)| types.can_convert(*arg, *param))
    };
    let sampled_result = |types: &mut Types| match kind {
        TextureKind::Sampled { sampled, .. } | TextureKind::Multisampled { sampled } => {
            Some(types.vector(sampled, 4))
        },
        TextureKind::Storage { format, .. } => Some(types.vector(format.channel_type(), 4)),
        TextureKind::External => Some(types.vector(TypeId::F32, 4)),
        TextureKind::Depth { .. } | TextureKind::DepthMultisampled => Some(TypeId::F32),
    };

    match name {
        "textureDimensions" => {
            let ret = match dimension {
                TextureDimension::D1 => TypeId::U32,
                TextureDimension::D3 => types.vector(TypeId::U32, 3),
                _ => types.vector(TypeId::U32, 2),
            };
            match rest {
                [] => Some(Overload { params: vec![texture], ret }),
                [level] if matches!(kind, TextureKind::Sampled { .. } | TextureKind::Depth { .. }) => {
                    let level = integer(types, *level)?;
                    Some(Overload { params: vec![texture, level], ret })
                },
                _ => None,
            }
        },
        "textureNumLayers" => {
            (dimension.is_array() && rest.is_empty()).then_some(())?;
            Some(Overload { params: vec![texture], ret: TypeId::U32 })
        },
        "textureNumLevels" => {
            (matches!(kind, TextureKind::Sampled { .. } | TextureKind::Depth { .. }) && rest.is_empty())
                .then_some(())?;
            Some(Overload { params: vec![texture], ret: TypeId::U32 })
        },
        "textureNumSamples" => {
            (matches!(kind, TextureKind::Multisampled { .. } | TextureKind::DepthMultisampled)
                && rest.is_empty())
            .then_some(())?;
            Some(Overload { params: vec![texture], ret: TypeId::U32 })
        },
        "textureSample" | "textureSampleLevel" | "textureSampleCompare" => {
            let sampled_float = match kind {
                TextureKind::Sampled { sampled, .. } => sampled == TypeId::F32,
                TextureKind::Depth { .. } => true,
                _ => false,
            };
            sampled_float.then_some(())?;
            let comparison = name == "textureSampleCompare";
            if comparison != is_depth && comparison {
                return None;
            }
            let sampler = types.intern(Type::Sampler { comparison });
            let coords = coordinates(types, TypeId::F32);
            let mut params = vec![texture, sampler, coords];
            if dimension.is_array() {
                params.push(integer(types, *args.get(3)?)?);
            }
            match name {
                "textureSampleLevel" if is_depth => params.push(integer(types, *args.get(params.len())?)?),
                "textureSampleLevel" => params.push(TypeId::F32),
                "textureSampleCompare" => params.push(TypeId::F32),
                _ => {},
            }
            matches(types, &params).then_some(())?;
            let ret = if is_depth { TypeId::F32 } else { types.vector(TypeId::F32, 4) };
            Some(Overload { params, ret })
        },
        "textureLoad" => {
            let coords_elem = integer(types, *rest.first()?)?;
            let coords = coordinates(types, coords_elem);
            let mut params = vec![texture, coords];
            if dimension.is_array() {
                params.push(integer(types, *args.get(2)?)?);
            }
            match kind {
                TextureKind::Sampled { .. }
                | TextureKind::Depth { .. }
                | TextureKind::Multisampled { .. }
                | TextureKind::DepthMultisampled => {
                    params.push(integer(types, *args.get(params.len())?)?);
                },
                TextureKind::Storage { .. } | TextureKind::External => {},
            }
            matches(types, &params).then_some(())?;
            Some(Overload { params, ret: sampled_result(types)? })
        },
        "textureStore" => {
            let TextureKind::Storage { format, .. } = kind else { return None };
            let coords_elem = integer(types, *rest.first()?)?;
            let coords = coordinates(types, coords_elem);
            let mut params = vec![texture, coords];
            if dimension.is_array() {
                params.push(integer(types, *args.get(2)?)?);
            }
            params.push(types.vector(format.channel_type(), 4));
            matches(types, &params).then_some(())?;
            Some(Overload { params, ret: TypeId::VOID })
        },
        _ => None,
    }
}

/// Evaluates a builtin at shader-creation time. The arguments have already been converted to the
/// parameter types of the overload, and `ty` is its return type.
pub fn const_eval(types: &mut Types, name: &str, args: &[ConstantValue], ty: TypeId) -> EvalResult {
    let float = |value: &ConstantValue| value.as_float().unwrap_or_default();
    let unary = |types: &mut Types, f: &dyn Fn(f64) -> Result<f64, String>| {
        let arg = &args[0];
        arg.map(types, ty, &mut |value| {
            let scalar = value.scalar().expect("scalar");
            let result = f(float(value))?;
            if !result.is_finite() {
                return Err(format!(
                    "'{name}({})' cannot be represented as '{}'",
                    value.plain(),
                    scalar.name()
                ));
            }
            Ok(ConstantValue::from_f64(scalar, result))
        })
    };
    let domain = |condition: bool, message: &str| -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(format!("{name} must be called with a value {message}"))
        }
    };

    match name {
        "abs" => args[0].map(types, ty, &mut |value| {
            Ok(match value {
                ConstantValue::AbstractInt(x) => ConstantValue::AbstractInt(x.wrapping_abs()),
                ConstantValue::I32(x) => ConstantValue::I32(x.wrapping_abs()),
                ConstantValue::U32(x) => ConstantValue::U32(*x),
                other => ConstantValue::from_f64(other.scalar().expect("scalar"), float(other).abs()),
            })
        }),
        "sign" => args[0].map(types, ty, &mut |value| {
            let scalar = value.scalar().expect("scalar");
            let x = float(value);
            let sign = if x > 0.0 { 1.0 } else if x < 0.0 { -1.0 } else { 0.0 };
            Ok(ConstantValue::from_f64(scalar, sign))
        }),
        "min" | "max" | "step" | "atan2" | "pow" => {
            let (a, b) = (&args[0], &args[1]);
            a.zip(b, types, ty, &mut |x, y| {
                let scalar = x.scalar().expect("scalar");
                if let (Some(i), Some(j)) = (x.as_int(), y.as_int()) {
                    let pick = if name == "min" { i.min(j) } else { i.max(j) };
                    return Ok(ConstantValue::from_i64(scalar, pick));
                }
                let (i, j) = (float(x), float(y));
                let result = match name {
                    "min" => i.min(j),
                    "max" => i.max(j),
                    "step" => {
                        if j >= i {
                            1.0
                        } else {
                            0.0
                        }
                    },
                    "atan2" => i.atan2(j),
                    _ => i.powf(j),
                };
                if !result.is_finite() {
                    return Err(format!(
                        "'{name}({}, {})' cannot be represented as '{}'",
                        x.plain(),
                        y.plain(),
                        scalar.name()
                    ));
                }
                Ok(ConstantValue::from_f64(scalar, result))
            })
        },
        "clamp" => {
            let low = args[0].zip(&args[1], types, ty, &mut |x, low| max_of(x, low))?;
            low.zip(&args[2], types, ty, &mut |x, high| min_of(x, high))
        },
        "floor" => unary(types, &|x| Ok(x.floor())),
        "ceil" => unary(types, &|x| Ok(x.ceil())),
        "round" => unary(types, &|x| Ok(x.round_ties_even())),
        "trunc" => unary(types, &|x| Ok(x.trunc())),
        "fract" => unary(types, &|x| Ok(x - x.floor())),
        "sqrt" => unary(types, &|x| domain(x >= 0.0, ">= 0").map(|()| x.sqrt())),
        "inverseSqrt" => unary(types, &|x| domain(x > 0.0, "> 0").map(|()| 1.0 / x.sqrt())),
        "log" => unary(types, &|x| domain(x > 0.0, "> 0").map(|()| x.ln())),
        "log2" => unary(types, &|x| domain(x > 0.0, "> 0").map(|()| x.log2())),
        "exp" => unary(types, &|x| Ok(x.exp())),
        "exp2" => unary(types, &|x| Ok(x.exp2())),
        "sin" => unary(types, &|x| Ok(x.sin())),
        "cos" => unary(types, &|x| Ok(x.cos())),
        "tan" => unary(types, &|x| Ok(x.tan())),
        "sinh" => unary(types, &|x| Ok(x.sinh())),
        "cosh" => unary(types, &|x| Ok(x.cosh())),
        "tanh" => unary(types, &|x| Ok(x.tanh())),
        "asin" => unary(types, &|x| {
            domain((-1.0..=1.0).contains(&x), "in the range [-1 .. 1] (inclusive)").map(|()| x.asin())
        }),
        "acos" => unary(types, &|x| {
            domain((-1.0..=1.0).contains(&x), "in the range [-1 .. 1] (inclusive)").map(|()| x.acos())
        }),
        "atan" => unary(types, &|x| Ok(x.atan())),
        "saturate" => unary(types, &|x| Ok(x.clamp(0.0, 1.0))),
        "radians" => unary(types, &|x| Ok(x.to_radians())),
        "degrees" => unary(types, &|x| Ok(x.to_degrees())),
        "countOneBits" | "reverseBits" | "countLeadingZeros" | "countTrailingZeros" => {
            args[0].map(types, ty, &mut |value| {
                let scalar = value.scalar().expect("scalar");
                let bits = value.as_int().unwrap_or_default() as u32;
                let result = match name {
                    "countOneBits" => bits.count_ones(),
                    "reverseBits" => bits.reverse_bits(),
                    "countLeadingZeros" => bits.leading_zeros(),
                    _ => bits.trailing_zeros(),
                };
                Ok(match scalar {
                    Scalar::U32 => ConstantValue::U32(result),
                    _ => ConstantValue::I32(result as i32),
                })
            })
        },
        "all" | "any" => Ok(ConstantValue::Bool(args[0].all_or_any(name == "all"))),
        "select" => {
            let (f, t, condition) = (&args[0], &args[1], &args[2]);
            match condition {
                ConstantValue::Bool(true) => Ok(t.clone()),
                ConstantValue::Bool(false) => Ok(f.clone()),
                _ => {
                    let conditions = condition.elements().unwrap_or_default();
                    let (fs, ts) = (f.elements().unwrap_or_default(), t.elements().unwrap_or_default());
                    let elements = conditions
                        .iter()
                        .zip(fs.iter().zip(ts.iter()))
                        .map(|(c, (f, t))| if c.as_bool() == Some(true) { t.clone() } else { f.clone() })
                        .collect();
                    Ok(ConstantValue::Composite { ty, elements })
                },
            }
        },
        "dot" => {
            let scalar = scalar_of(&*types, &args[0]);
            let (a, b) = (args[0].elements().unwrap_or_default(), args[1].elements().unwrap_or_default());
            if scalar.is_integer() {
                let mut sum: i128 = 0;
                for (x, y) in a.iter().zip(b.iter()) {
                    sum += i128::from(x.as_int().unwrap_or_default()) * i128::from(y.as_int().unwrap_or_default());
                }
                if scalar == Scalar::AbstractInt && i64::try_from(sum).is_err() {
                    return Err(format!("'dot' result cannot be represented as '{}'", scalar.name()));
                }
                return Ok(ConstantValue::from_i64(scalar, sum as i64));
            }
            let sum: f64 = a.iter().zip(b.iter()).map(|(x, y)| float(x) * float(y)).sum();
            finite(name, scalar, sum)
        },
        "length" | "distance" | "normalize" => {
            let scalar = scalar_of(&*types, &args[0]);
            let difference: Vec<f64> = match name {
                "distance" => {
                    let (a, b) = (&args[0], &args[1]);
                    match (a.elements(), b.elements()) {
                        (Some(a), Some(b)) => a.iter().zip(b.iter()).map(|(x, y)| float(x) - float(y)).collect(),
                        _ => vec![float(a) - float(b)],
                    }
                },
                _ => match args[0].elements() {
                    Some(elements) => elements.iter().map(float).collect(),
                    None => vec![float(&args[0])],
                },
            };
            let length = difference.iter().map(|x| x * x).sum::<f64>().sqrt();
            if name != "normalize" {
                return finite(name, scalar, length);
            }
            if length == 0.0 {
                return Err("zero length vector can not be normalized".into());
            }
            let elements = difference
                .into_iter()
                .map(|x| finite(name, scalar, x / length))
                .collect::<Result<_, _>>()?;
            Ok(ConstantValue::Composite { ty, elements })
        },
        "cross" => {
            let scalar = scalar_of(&*types, &args[0]);
            let a: Vec<f64> = args[0].elements().unwrap_or_default().iter().map(float).collect();
            let b: Vec<f64> = args[1].elements().unwrap_or_default().iter().map(float).collect();
            let (&[a0, a1, a2], &[b0, b1, b2]) = (a.as_slice(), b.as_slice()) else {
                panic!("cross product of non-3-component vectors");
            };
            let elements = [a1 * b2 - a2 * b1, a2 * b0 - a0 * b2, a0 * b1 - a1 * b0]
                .into_iter()
                .map(|x| finite(name, scalar, x))
                .collect::<Result<_, _>>()?;
            Ok(ConstantValue::Composite { ty, elements })
        },
        "transpose" => {
            let columns: Vec<&[ConstantValue]> = args[0]
                .elements()
                .unwrap_or_default()
                .iter()
                .map(|column| column.elements().unwrap_or_default())
                .collect();
            let rows = columns.first().map_or(0, |column| column.len());
            let column_ty = super::constant::element_type(types, ty);
            let elements = (0..rows)
                .map(|r| ConstantValue::Composite {
                    ty: column_ty,
                    elements: columns.iter().map(|column| column[r].clone()).collect(),
                })
                .collect();
            Ok(ConstantValue::Composite { ty, elements })
        },
        "determinant" => {
            let scalar = scalar_of(&*types, &args[0]);
            let matrix: Vec<Vec<f64>> = args[0]
                .elements()
                .unwrap_or_default()
                .iter()
                .map(|column| column.elements().unwrap_or_default().iter().map(float).collect())
                .collect();
            finite(name, scalar, determinant(&matrix))
        },
        _ => panic!("builtin '{name}' has no constant evaluation rule"),
    }
}

fn scalar_of(types: &Types, value: &ConstantValue) -> Scalar {
    types.deepest_scalar(value.ty()).expect("builtin argument without a scalar type")
}

fn finite(name: &str, scalar: Scalar, value: f64) -> EvalResult {
    if !value.is_finite() {
        return Err(format!("'{name}' result cannot be represented as '{}'", scalar.name()));
    }
    Ok(ConstantValue::from_f64(scalar, value))
}

fn min_of(a: &ConstantValue, b: &ConstantValue) -> EvalResult {
    Ok(if compare(a, b).is_le() { a.clone() } else { b.clone() })
}

fn max_of(a: &ConstantValue, b: &ConstantValue) -> EvalResult {
    Ok(if compare(a, b).is_ge() { a.clone() } else { b.clone() })
}

fn compare(a: &ConstantValue, b: &ConstantValue) -> std::cmp::Ordering {
    match (a.as_int(), b.as_int()) {
        (Some(i), Some(j)) => i.cmp(&j),
        _ => {
            let (x, y) = (a.as_float().unwrap_or_default(), b.as_float().unwrap_or_default());
            x.partial_cmp(&y).unwrap_or(std::cmp::Ordering::Equal)
        },
    }
}

/// Laplace expansion along the first column. Matrices are given as lists of columns.
fn determinant(matrix: &[Vec<f64>]) -> f64 {
    match matrix.len() {
        0 => 1.0,
        1 => matrix[0][0],
        2 => matrix[0][0] * matrix[1][1] - matrix[1][0] * matrix[0][1],
        n => {
            let mut sum = 0.0;
            for row in 0..n {
                let minor: Vec<Vec<f64>> = matrix[1..]
                    .iter()
                    .map(|column| {
                        column.iter().enumerate().filter(|(r, _)| *r != row).map(|(_, x)| *x).collect()
                    })
                    .collect();
                let sign = if row % 2 == 0 { 1.0 } else { -1.0 };
                sum += sign * matrix[0][row] * determinant(&minor);
            }
            sum
        },
    }
}

/// The operand and result types of a binary operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinaryOverload {
    pub lhs: TypeId,
    pub rhs: TypeId,
    pub ret: TypeId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    Scalar,
    Vector(u8),
    Matrix(u8, u8),
}

fn shape(types: &Types, ty: TypeId) -> Option<Shape> {
    match types.get(ty) {
        Type::Scalar(_) => Some(Shape::Scalar),
        Type::Vector { size, .. } => Some(Shape::Vector(size)),
        Type::Matrix { columns, rows, .. } => Some(Shape::Matrix(columns, rows)),
        _ => None,
    }
}

/// Finds the overload of a binary operator for operands of the given value types.
pub fn binary_overload(types: &mut Types, op: BinaryOp, lhs: TypeId, rhs: TypeId) -> Option<BinaryOverload> {
    let (lhs_shape, rhs_shape) = (shape(types, lhs)?, shape(types, rhs)?);
    let (lhs_scalar, rhs_scalar) = (types.element_scalar(lhs)?, types.element_scalar(rhs)?);

    if matches!(op, BinaryOp::ShiftLeft | BinaryOp::ShiftRight) {
        if lhs_shape != rhs_shape || matches!(lhs_shape, Shape::Matrix(..)) {
            return None;
        }
        if !lhs_scalar.is_integer() || !matches!(rhs_scalar, Scalar::U32 | Scalar::AbstractInt) {
            return None;
        }
        let rhs = types.with_scalar(rhs, Scalar::U32);
        return Some(BinaryOverload { lhs, rhs, ret: lhs });
    }

    let elem = types.common_type(&[lhs_scalar.id(), rhs_scalar.id()])?;
    let elem = types.scalar(elem)?;
    let lhs = types.with_scalar(lhs, elem);
    let rhs = types.with_scalar(rhs, elem);
    let same = |ret| Some(BinaryOverload { lhs, rhs, ret });

    let is_matrix = |shape| matches!(shape, Shape::Matrix(..));
    if (is_matrix(lhs_shape) || is_matrix(rhs_shape)) && !elem.is_float() {
        return None;
    }

    match op {
        BinaryOp::LogicalAnd | BinaryOp::LogicalOr => {
            (elem == Scalar::Bool && lhs_shape == Shape::Scalar && rhs_shape == Shape::Scalar)
                .then_some(())?;
            same(TypeId::BOOL)
        },
        BinaryOp::And | BinaryOp::Or | BinaryOp::Xor => {
            let valid = elem.is_integer() || (elem == Scalar::Bool && op != BinaryOp::Xor);
            (valid && lhs_shape == rhs_shape && !is_matrix(lhs_shape)).then_some(())?;
            same(lhs)
        },
        BinaryOp::Equal
        | BinaryOp::NotEqual
        | BinaryOp::Less
        | BinaryOp::LessEqual
        | BinaryOp::Greater
        | BinaryOp::GreaterEqual => {
            let valid = elem.is_numeric() || matches!(op, BinaryOp::Equal | BinaryOp::NotEqual);
            (valid && lhs_shape == rhs_shape && !is_matrix(lhs_shape)).then_some(())?;
            let ret = match lhs_shape {
                Shape::Vector(size) => types.vector(TypeId::BOOL, size),
                _ => TypeId::BOOL,
            };
            same(ret)
        },
        BinaryOp::Add | BinaryOp::Subtract | BinaryOp::Multiply | BinaryOp::Divide | BinaryOp::Modulo => {
            if !elem.is_numeric() {
                return None;
            }
            let arithmetic = op != BinaryOp::Multiply;
            match (lhs_shape, rhs_shape) {
                (a, b) if a == b && !is_matrix(a) => same(lhs),
                (Shape::Vector(_), Shape::Scalar) => same(lhs),
                (Shape::Scalar, Shape::Vector(_)) => same(rhs),
                (Shape::Matrix(..), Shape::Matrix(..))
                    if lhs_shape == rhs_shape && matches!(op, BinaryOp::Add | BinaryOp::Subtract) =>
                {
                    same(lhs)
                },
                _ if arithmetic => None,
                (Shape::Matrix(..), Shape::Scalar) => same(lhs),
                (Shape::Scalar, Shape::Matrix(..)) => same(rhs),
                (Shape::Matrix(columns, rows), Shape::Vector(size)) if size == columns => {
                    let ret = types.vector(elem.id(), rows);
                    same(ret)
                },
                (Shape::Vector(size), Shape::Matrix(columns, rows)) if size == rows => {
                    let ret = types.vector(elem.id(), columns);
                    same(ret)
                },
                (Shape::Matrix(inner, rows), Shape::Matrix(columns, other)) if inner == other => {
                    let ret = types.matrix(elem.id(), columns, rows);
                    same(ret)
                },
                _ => None,
            }
        },
        BinaryOp::ShiftLeft | BinaryOp::ShiftRight => unreachable!("shifts are handled above"),
    }
}

/// The result type of a unary value operator, or `None` if the operand type is not accepted.
pub fn unary_overload(types: &Types, op: UnaryOp, operand: TypeId) -> Option<TypeId> {
    if !matches!(types.get(operand), Type::Scalar(_) | Type::Vector { .. }) {
        return None;
    }
    let scalar = types.element_scalar(operand)?;
    let valid = match op {
        UnaryOp::Negate => scalar.is_numeric() && scalar != Scalar::U32,
        UnaryOp::Not => scalar == Scalar::Bool,
        UnaryOp::Complement => scalar.is_integer(),
        UnaryOp::AddressOf | UnaryOp::Indirection => false,
    };
    valid.then_some(operand)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predeclared_types() {
        assert_eq!(builtin_type("vec3f"), Some(BuiltinType::Vector { size: 3, elem: Some(Scalar::F32) }));
        assert_eq!(
            builtin_type("mat2x4h"),
            Some(BuiltinType::Matrix { columns: 2, rows: 4, elem: Some(Scalar::F16) })
        );
        assert_eq!(builtin_type("mat3x3"), Some(BuiltinType::Matrix { columns: 3, rows: 3, elem: None }));
        assert_eq!(builtin_type("mat5x3"), None);
        assert!(builtin_type("vec3").is_some_and(BuiltinType::is_generator));
    }

    #[test]
    fn overloads() {
        let mut types = Types::new();
        let vec3f = types.vector(TypeId::F32, 3);
        let vec3_abstract = types.vector(TypeId::ABSTRACT_INT, 3);

        let overload = function_overload(&mut types, "max", &[TypeId::ABSTRACT_INT, TypeId::F32]).unwrap();
        assert_eq!(overload, Overload { params: vec![TypeId::F32, TypeId::F32], ret: TypeId::F32 });

        let overload = function_overload(&mut types, "sqrt", &[TypeId::ABSTRACT_INT]).unwrap();
        assert_eq!(overload.ret, TypeId::ABSTRACT_FLOAT);

        let overload = function_overload(&mut types, "dot", &[vec3_abstract, vec3f]).unwrap();
        assert_eq!(overload.ret, TypeId::F32);

        assert_eq!(function_overload(&mut types, "min", &[TypeId::I32, TypeId::U32]), None);
        assert_eq!(function_overload(&mut types, "cross", &[TypeId::F32, TypeId::F32]), None);
        assert_eq!(function_overload(&mut types, "countOneBits", &[TypeId::F32]), None);
    }

    #[test]
    fn evaluation() {
        let mut types = Types::new();
        let eval = |types: &mut Types, name, args: &[ConstantValue], ty| const_eval(types, name, args, ty);

        assert_eq!(
            eval(&mut types, "max", &[ConstantValue::I32(-3), ConstantValue::I32(2)], TypeId::I32),
            Ok(ConstantValue::I32(2))
        );
        assert_eq!(
            eval(&mut types, "clamp", &[ConstantValue::AbstractInt(9), ConstantValue::AbstractInt(0), ConstantValue::AbstractInt(5)], TypeId::ABSTRACT_INT),
            Ok(ConstantValue::AbstractInt(5))
        );
        assert_eq!(
            eval(&mut types, "sqrt", &[ConstantValue::AbstractFloat(-1.0)], TypeId::ABSTRACT_FLOAT),
            Err("sqrt must be called with a value >= 0".into())
        );
        assert_eq!(
            eval(&mut types, "countOneBits", &[ConstantValue::U32(0b1011)], TypeId::U32),
            Ok(ConstantValue::U32(3))
        );

        let mat2 = types.matrix(TypeId::F32, 2, 2);
        let vec2 = types.vector(TypeId::F32, 2);
        let column = |x, y| ConstantValue::Composite { ty: vec2, elements: vec![ConstantValue::F32(x), ConstantValue::F32(y)] };
        let matrix = ConstantValue::Composite { ty: mat2, elements: vec![column(1.0, 2.0), column(3.0, 4.0)] };
        assert_eq!(eval(&mut types, "determinant", &[matrix], TypeId::F32), Ok(ConstantValue::F32(-2.0)));
    }

    #[test]
    fn operators() {
        let mut types = Types::new();
        let vec3f = types.vector(TypeId::F32, 3);
        let mat2x3 = types.matrix(TypeId::F32, 2, 3);
        let vec2f = types.vector(TypeId::F32, 2);

        let overload = binary_overload(&mut types, BinaryOp::Add, vec3f, TypeId::ABSTRACT_INT).unwrap();
        assert_eq!(overload, BinaryOverload { lhs: vec3f, rhs: TypeId::F32, ret: vec3f });

        let overload = binary_overload(&mut types, BinaryOp::Multiply, mat2x3, vec2f).unwrap();
        assert_eq!(overload.ret, vec3f);

        let overload = binary_overload(&mut types, BinaryOp::Less, TypeId::U32, TypeId::ABSTRACT_INT).unwrap();
        assert_eq!(overload, BinaryOverload { lhs: TypeId::U32, rhs: TypeId::U32, ret: TypeId::BOOL });

        assert_eq!(binary_overload(&mut types, BinaryOp::Add, TypeId::F32, TypeId::I32), None);
        assert_eq!(binary_overload(&mut types, BinaryOp::Divide, mat2x3, vec2f), None);
        assert_eq!(unary_overload(&types, UnaryOp::Negate, TypeId::U32), None);
    }
}
