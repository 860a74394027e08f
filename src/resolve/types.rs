//! Canonical, hash-consed type descriptors.
//!
//! Every [`Type`] is interned once in [`Types`] and referred to by [`TypeId`]. Structurally equal
//! types always receive the same id, so type equality is id equality. Structures are nominal: each
//! `struct` declaration creates a distinct type.

use std::collections::HashMap;

use crate::ast::{StructId, VarId};
use crate::diagnostic::Span;
use crate::util::round_up;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(u32);

impl TypeId {
    pub const VOID: TypeId = TypeId(0);
    pub const BOOL: TypeId = TypeId(1);
    pub const ABSTRACT_INT: TypeId = TypeId(2);
    pub const ABSTRACT_FLOAT: TypeId = TypeId(3);
    pub const I32: TypeId = TypeId(4);
    pub const U32: TypeId = TypeId(5);
    pub const F32: TypeId = TypeId(6);
    pub const F16: TypeId = TypeId(7);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scalar {
    Bool,
    AbstractInt,
    AbstractFloat,
    I32,
    U32,
    F32,
    F16,
}

impl Scalar {
    pub fn name(self) -> &'static str {
        match self {
            Scalar::Bool => "bool",
            Scalar::AbstractInt => "abstract-int",
            Scalar::AbstractFloat => "abstract-float",
            Scalar::I32 => "i32",
            Scalar::U32 => "u32",
            Scalar::F32 => "f32",
            Scalar::F16 => "f16",
        }
    }

    pub fn id(self) -> TypeId {
        match self {
            Scalar::Bool => TypeId::BOOL,
            Scalar::AbstractInt => TypeId::ABSTRACT_INT,
            Scalar::AbstractFloat => TypeId::ABSTRACT_FLOAT,
            Scalar::I32 => TypeId::I32,
            Scalar::U32 => TypeId::U32,
            Scalar::F32 => TypeId::F32,
            Scalar::F16 => TypeId::F16,
        }
    }

    pub fn is_abstract(self) -> bool {
        matches!(self, Scalar::AbstractInt | Scalar::AbstractFloat)
    }

    pub fn is_integer(self) -> bool {
        matches!(self, Scalar::AbstractInt | Scalar::I32 | Scalar::U32)
    }

    pub fn is_float(self) -> bool {
        matches!(self, Scalar::AbstractFloat | Scalar::F32 | Scalar::F16)
    }

    pub fn is_numeric(self) -> bool {
        self != Scalar::Bool
    }

    pub fn is_signed(self) -> bool {
        !matches!(self, Scalar::Bool | Scalar::U32)
    }

    /// The type an abstract scalar materializes to when nothing else is known.
    pub fn concrete(self) -> Scalar {
        match self {
            Scalar::AbstractInt => Scalar::I32,
            Scalar::AbstractFloat => Scalar::F32,
            other => other,
        }
    }

    /// The number of automatic conversions needed to get from `self` to `target`, or `None` if
    /// there is no such conversion.
    pub fn conversion_rank(self, target: Scalar) -> Option<u32> {
        if self == target {
            return Some(0);
        }
        match (self, target) {
            (Scalar::AbstractFloat, Scalar::F32) => Some(1),
            (Scalar::AbstractFloat, Scalar::F16) => Some(2),
            (Scalar::AbstractInt, Scalar::I32) => Some(3),
            (Scalar::AbstractInt, Scalar::U32) => Some(4),
            (Scalar::AbstractInt, Scalar::AbstractFloat) => Some(5),
            (Scalar::AbstractInt, Scalar::F32) => Some(6),
            (Scalar::AbstractInt, Scalar::F16) => Some(7),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressSpace {
    Function,
    Private,
    Workgroup,
    Uniform,
    Storage,
    PushConstant,
    Handle,
}

impl AddressSpace {
    pub fn from_name(name: &str) -> Option<AddressSpace> {
        Some(match name {
            "function" => AddressSpace::Function,
            "private" => AddressSpace::Private,
            "workgroup" => AddressSpace::Workgroup,
            "uniform" => AddressSpace::Uniform,
            "storage" => AddressSpace::Storage,
            "push_constant" => AddressSpace::PushConstant,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            AddressSpace::Function => "function",
            AddressSpace::Private => "private",
            AddressSpace::Workgroup => "workgroup",
            AddressSpace::Uniform => "uniform",
            AddressSpace::Storage => "storage",
            AddressSpace::PushConstant => "push_constant",
            AddressSpace::Handle => "handle",
        }
    }

    /// Whether values in this address space are shared with the host, and thus need a
    /// host-shareable layout.
    pub fn is_host_shareable(self) -> bool {
        matches!(self, AddressSpace::Uniform | AddressSpace::Storage | AddressSpace::PushConstant)
    }

    pub fn default_access(self) -> Access {
        match self {
            AddressSpace::Storage | AddressSpace::Uniform | AddressSpace::Handle => Access::Read,
            _ => Access::ReadWrite,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Access {
    Read,
    Write,
    ReadWrite,
}

impl Access {
    pub fn from_name(name: &str) -> Option<Access> {
        Some(match name {
            "read" => Access::Read,
            "write" => Access::Write,
            "read_write" => Access::ReadWrite,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Access::Read => "read",
            Access::Write => "write",
            Access::ReadWrite => "read_write",
        }
    }

    pub fn can_read(self) -> bool {
        self != Access::Write
    }

    pub fn can_write(self) -> bool {
        self != Access::Read
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArrayCount {
    Constant(u32),
    /// Sized by a pipeline-overridable constant.
    Override(VarId),
    /// Runtime-sized.
    Runtime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureDimension {
    D1,
    D2,
    D2Array,
    D3,
    Cube,
    CubeArray,
}

impl TextureDimension {
    fn suffix(self) -> &'static str {
        match self {
            TextureDimension::D1 => "1d",
            TextureDimension::D2 => "2d",
            TextureDimension::D2Array => "2d_array",
            TextureDimension::D3 => "3d",
            TextureDimension::Cube => "cube",
            TextureDimension::CubeArray => "cube_array",
        }
    }

    /// Number of components in a coordinate addressing a texel, not counting array layers.
    pub fn coordinates(self) -> u8 {
        match self {
            TextureDimension::D1 => 1,
            TextureDimension::D2 | TextureDimension::D2Array => 2,
            TextureDimension::D3 | TextureDimension::Cube | TextureDimension::CubeArray => 3,
        }
    }

    pub fn is_array(self) -> bool {
        matches!(self, TextureDimension::D2Array | TextureDimension::CubeArray)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TexelFormat {
    Rgba8Unorm,
    Rgba8Snorm,
    Rgba8Uint,
    Rgba8Sint,
    Rgba16Uint,
    Rgba16Sint,
    Rgba16Float,
    R32Uint,
    R32Sint,
    R32Float,
    Rg32Uint,
    Rg32Sint,
    Rg32Float,
    Rgba32Uint,
    Rgba32Sint,
    Rgba32Float,
    Bgra8Unorm,
}

impl TexelFormat {
    const ALL: [(TexelFormat, &'static str); 17] = [
        (TexelFormat::Rgba8Unorm, "rgba8unorm"),
        (TexelFormat::Rgba8Snorm, "rgba8snorm"),
        (TexelFormat::Rgba8Uint, "rgba8uint"),
        (TexelFormat::Rgba8Sint, "rgba8sint"),
        (TexelFormat::Rgba16Uint, "rgba16uint"),
        (TexelFormat::Rgba16Sint, "rgba16sint"),
        (TexelFormat::Rgba16Float, "rgba16float"),
        (TexelFormat::R32Uint, "r32uint"),
        (TexelFormat::R32Sint, "r32sint"),
        (TexelFormat::R32Float, "r32float"),
        (TexelFormat::Rg32Uint, "rg32uint"),
        (TexelFormat::Rg32Sint, "rg32sint"),
        (TexelFormat::Rg32Float, "rg32float"),
        (TexelFormat::Rgba32Uint, "rgba32uint"),
        (TexelFormat::Rgba32Sint, "rgba32sint"),
        (TexelFormat::Rgba32Float, "rgba32float"),
        (TexelFormat::Bgra8Unorm, "bgra8unorm"),
    ];

    pub fn from_name(name: &str) -> Option<TexelFormat> {
        Self::ALL.iter().find(|(_, text)| *text == name).map(|(format, _)| *format)
    }

    pub fn name(self) -> &'static str {
        Self::ALL.iter().find(|(format, _)| *format == self).map(|(_, name)| *name).unwrap_or("")
    }

    /// The scalar type of a texel channel.
    pub fn channel_type(self) -> TypeId {
        match self {
            TexelFormat::Rgba8Uint
            | TexelFormat::Rgba16Uint
            | TexelFormat::R32Uint
            | TexelFormat::Rg32Uint
            | TexelFormat::Rgba32Uint => TypeId::U32,
            TexelFormat::Rgba8Sint
            | TexelFormat::Rgba16Sint
            | TexelFormat::R32Sint
            | TexelFormat::Rg32Sint
            | TexelFormat::Rgba32Sint => TypeId::I32,
            _ => TypeId::F32,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureKind {
    Sampled { dimension: TextureDimension, sampled: TypeId },
    Multisampled { sampled: TypeId },
    Depth { dimension: TextureDimension },
    DepthMultisampled,
    Storage { dimension: TextureDimension, format: TexelFormat, access: Access },
    External,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    Void,
    Scalar(Scalar),
    Vector { size: u8, elem: TypeId },
    Matrix { columns: u8, rows: u8, elem: TypeId },
    Array { elem: TypeId, count: ArrayCount, stride: u32 },
    Struct(StructTypeId),
    Atomic(TypeId),
    Pointer { space: AddressSpace, pointee: TypeId, access: Access },
    Reference { space: AddressSpace, store: TypeId, access: Access },
    Sampler { comparison: bool },
    Texture(TextureKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StructTypeId(u32);

#[derive(Debug, Clone)]
pub struct StructType {
    pub name: String,
    pub decl: Option<StructId>,
    pub members: Vec<StructMember>,
    pub align: u32,
    pub size: u64,
    /// Address spaces in which values of this structure are used.
    pub address_space_usage: Vec<AddressSpace>,
}

impl StructType {
    pub fn member(&self, name: &str) -> Option<(usize, &StructMember)> {
        self.members.iter().enumerate().find(|(_, member)| member.name == name)
    }

    pub fn has_runtime_array(&self, types: &Types) -> bool {
        self.members.last().is_some_and(|last| types.is_runtime_array(last.ty))
    }
}

#[derive(Debug, Clone)]
pub struct StructMember {
    pub name: String,
    pub ty: TypeId,
    pub offset: u64,
    pub align: u32,
    pub size: u64,
    pub span: Span,
    pub io: super::sem::IoAttributes,
}

pub struct Types {
    types: Vec<Type>,
    lookup: HashMap<Type, TypeId>,
    structs: Vec<StructType>,
    override_names: HashMap<VarId, String>,
}

impl Default for Types {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Types {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Types").field("len", &self.types.len()).finish()
    }
}

impl Types {
    pub fn new() -> Types {
        let mut types = Types {
            types: Vec::new(),
            lookup: HashMap::new(),
            structs: Vec::new(),
            override_names: HashMap::new(),
        };

        let primitives = [
            (Type::Void, TypeId::VOID),
            (Type::Scalar(Scalar::Bool), TypeId::BOOL),
            (Type::Scalar(Scalar::AbstractInt), TypeId::ABSTRACT_INT),
            (Type::Scalar(Scalar::AbstractFloat), TypeId::ABSTRACT_FLOAT),
            (Type::Scalar(Scalar::I32), TypeId::I32),
            (Type::Scalar(Scalar::U32), TypeId::U32),
            (Type::Scalar(Scalar::F32), TypeId::F32),
            (Type::Scalar(Scalar::F16), TypeId::F16),
        ];
        for (ty, expected) in primitives {
            assert_eq!(types.intern(ty), expected, "primitive types must be interned first");
        }

        types
    }

    pub fn intern(&mut self, ty: Type) -> TypeId {
        if let Some(id) = self.lookup.get(&ty) {
            return *id;
        }
        let id = TypeId(self.types.len() as u32);
        self.types.push(ty);
        self.lookup.insert(ty, id);
        id
    }

    pub fn get(&self, id: TypeId) -> Type {
        self.types[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn vector(&mut self, elem: TypeId, size: u8) -> TypeId {
        debug_assert!((2..=4).contains(&size));
        debug_assert!(self.scalar(elem).is_some());
        self.intern(Type::Vector { size, elem })
    }

    pub fn matrix(&mut self, elem: TypeId, columns: u8, rows: u8) -> TypeId {
        debug_assert!((2..=4).contains(&columns) && (2..=4).contains(&rows));
        self.intern(Type::Matrix { columns, rows, elem })
    }

    pub fn array(&mut self, elem: TypeId, count: ArrayCount) -> TypeId {
        let stride = round_up(u64::from(self.align_of(elem)), self.size_of(elem));
        let stride = u32::try_from(stride).unwrap_or(u32::MAX);
        self.intern(Type::Array { elem, count, stride })
    }

    pub fn override_sized_array(&mut self, elem: TypeId, var: VarId, name: &str) -> TypeId {
        self.override_names.entry(var).or_insert_with(|| name.to_string());
        self.array(elem, ArrayCount::Override(var))
    }

    pub fn atomic(&mut self, elem: TypeId) -> TypeId {
        self.intern(Type::Atomic(elem))
    }

    pub fn pointer(&mut self, space: AddressSpace, pointee: TypeId, access: Access) -> TypeId {
        self.intern(Type::Pointer { space, pointee, access })
    }

    pub fn reference(&mut self, space: AddressSpace, store: TypeId, access: Access) -> TypeId {
        self.intern(Type::Reference { space, store, access })
    }

    /// Registers a new structure. Every call creates a distinct type.
    pub fn add_struct(&mut self, info: StructType) -> TypeId {
        let id = StructTypeId(self.structs.len() as u32);
        self.structs.push(info);
        self.intern(Type::Struct(id))
    }

    pub fn struct_info(&self, id: StructTypeId) -> &StructType {
        &self.structs[id.0 as usize]
    }

    pub fn struct_info_mut(&mut self, id: StructTypeId) -> &mut StructType {
        &mut self.structs[id.0 as usize]
    }

    pub fn as_struct(&self, ty: TypeId) -> Option<&StructType> {
        match self.get(ty) {
            Type::Struct(id) => Some(self.struct_info(id)),
            _ => None,
        }
    }

    pub fn scalar(&self, ty: TypeId) -> Option<Scalar> {
        match self.get(ty) {
            Type::Scalar(scalar) => Some(scalar),
            _ => None,
        }
    }

    /// The scalar type of a scalar, vector or matrix.
    pub fn element_scalar(&self, ty: TypeId) -> Option<Scalar> {
        match self.get(ty) {
            Type::Scalar(scalar) => Some(scalar),
            Type::Vector { elem, .. } | Type::Matrix { elem, .. } => self.scalar(elem),
            _ => None,
        }
    }

    /// The scalar at the bottom of a (possibly nested) composite type.
    pub fn deepest_scalar(&self, ty: TypeId) -> Option<Scalar> {
        match self.get(ty) {
            Type::Scalar(scalar) => Some(scalar),
            Type::Vector { elem, .. } | Type::Matrix { elem, .. } | Type::Array { elem, .. } => {
                self.deepest_scalar(elem)
            },
            _ => None,
        }
    }

    pub fn vector_size(&self, ty: TypeId) -> Option<u8> {
        match self.get(ty) {
            Type::Vector { size, .. } => Some(size),
            _ => None,
        }
    }

    pub fn unwrap_ref(&self, ty: TypeId) -> TypeId {
        match self.get(ty) {
            Type::Reference { store, .. } => store,
            _ => ty,
        }
    }

    pub fn is_reference(&self, ty: TypeId) -> bool {
        matches!(self.get(ty), Type::Reference { .. })
    }

    pub fn is_pointer(&self, ty: TypeId) -> bool {
        matches!(self.get(ty), Type::Pointer { .. })
    }

    pub fn is_runtime_array(&self, ty: TypeId) -> bool {
        matches!(self.get(ty), Type::Array { count: ArrayCount::Runtime, .. })
    }

    pub fn is_handle(&self, ty: TypeId) -> bool {
        matches!(self.get(ty), Type::Sampler { .. } | Type::Texture(_))
    }

    pub fn is_abstract(&self, ty: TypeId) -> bool {
        match self.get(ty) {
            Type::Scalar(scalar) => scalar.is_abstract(),
            Type::Vector { elem, .. } | Type::Matrix { elem, .. } | Type::Array { elem, .. } => {
                self.is_abstract(elem)
            },
            _ => false,
        }
    }

    pub fn is_numeric_scalar(&self, ty: TypeId) -> bool {
        self.scalar(ty).is_some_and(Scalar::is_numeric)
    }

    pub fn is_integer_scalar(&self, ty: TypeId) -> bool {
        self.scalar(ty).is_some_and(Scalar::is_integer)
    }

    pub fn is_numeric_scalar_or_vector(&self, ty: TypeId) -> bool {
        matches!(self.get(ty), Type::Scalar(_) | Type::Vector { .. })
            && self.element_scalar(ty).is_some_and(Scalar::is_numeric)
    }

    pub fn contains_atomic(&self, ty: TypeId) -> bool {
        match self.get(ty) {
            Type::Atomic(_) => true,
            Type::Array { elem, .. } => self.contains_atomic(elem),
            Type::Struct(id) => {
                self.struct_info(id).members.iter().any(|member| self.contains_atomic(member.ty))
            },
            _ => false,
        }
    }

    /// Replaces every abstract scalar in `ty` with its default concrete type.
    pub fn concretize(&mut self, ty: TypeId) -> TypeId {
        match self.get(ty) {
            Type::Scalar(scalar) => scalar.concrete().id(),
            Type::Vector { size, elem } => {
                let elem = self.concretize(elem);
                self.vector(elem, size)
            },
            Type::Matrix { columns, rows, elem } => {
                let elem = self.concretize(elem);
                self.matrix(elem, columns, rows)
            },
            Type::Array { elem, count, .. } if self.is_abstract(elem) => {
                let elem = self.concretize(elem);
                self.array(elem, count)
            },
            _ => ty,
        }
    }

    /// Rebuilds a scalar, vector or matrix type with a different scalar type.
    pub fn with_scalar(&mut self, ty: TypeId, scalar: Scalar) -> TypeId {
        match self.get(ty) {
            Type::Vector { size, .. } => self.vector(scalar.id(), size),
            Type::Matrix { columns, rows, .. } => self.matrix(scalar.id(), columns, rows),
            _ => scalar.id(),
        }
    }

    /// Whether a value of type `from` can be automatically converted to `to`.
    pub fn can_convert(&self, from: TypeId, to: TypeId) -> bool {
        self.conversion_rank(from, to).is_some()
    }

    pub fn conversion_rank(&self, from: TypeId, to: TypeId) -> Option<u32> {
        if from == to {
            return Some(0);
        }
        match (self.get(from), self.get(to)) {
            (Type::Scalar(a), Type::Scalar(b)) => a.conversion_rank(b),
            (Type::Vector { size: n, elem: a }, Type::Vector { size: m, elem: b }) if n == m => {
                self.conversion_rank(a, b)
            },
            (
                Type::Matrix { columns: c0, rows: r0, elem: a },
                Type::Matrix { columns: c1, rows: r1, elem: b },
            ) if (c0, r0) == (c1, r1) => self.conversion_rank(a, b),
            (Type::Array { elem: a, count: n, .. }, Type::Array { elem: b, count: m, .. })
                if n == m =>
            {
                self.conversion_rank(a, b)
            },
            _ => None,
        }
    }

    /// The type all of `types` can be converted to with the least total conversion rank.
    pub fn common_type(&mut self, types: &[TypeId]) -> Option<TypeId> {
        let (&first, rest) = types.split_first()?;
        if rest.iter().all(|ty| *ty == first) {
            return Some(first);
        }

        // a concrete type wins if every other type converts to it
        let mut best: Option<(u32, TypeId)> = None;
        for &candidate in types {
            let mut total = 0;
            let mut all = true;
            for &ty in types {
                match self.conversion_rank(ty, candidate) {
                    Some(rank) => total += rank,
                    None => {
                        all = false;
                        break;
                    },
                }
            }
            if all && best.map_or(true, |(rank, _)| total < rank) {
                best = Some((total, candidate));
            }
        }
        if let Some((_, ty)) = best {
            return Some(ty);
        }

        // abstract-int mixed with abstract-float becomes abstract-float
        let float_version = self.with_scalar(first, Scalar::AbstractFloat);
        if self.is_abstract(first) && types.iter().all(|ty| self.can_convert(*ty, float_version)) {
            return Some(float_version);
        }

        None
    }

    pub fn size_of(&self, ty: TypeId) -> u64 {
        match self.get(ty) {
            Type::Void => 0,
            Type::Scalar(Scalar::F16) => 2,
            Type::Scalar(Scalar::AbstractInt | Scalar::AbstractFloat) => 8,
            Type::Scalar(_) | Type::Atomic(_) => 4,
            Type::Vector { size, elem } => u64::from(size) * self.size_of(elem),
            Type::Matrix { columns, rows, elem } => {
                let column = self.vector_layout(rows, elem);
                u64::from(columns) * round_up(column.0, column.1)
            },
            Type::Array { count, stride, .. } => match count {
                ArrayCount::Constant(count) => u64::from(count) * u64::from(stride),
                ArrayCount::Override(_) | ArrayCount::Runtime => u64::from(stride),
            },
            Type::Struct(id) => self.struct_info(id).size,
            Type::Pointer { .. } | Type::Reference { .. } => 8,
            Type::Sampler { .. } | Type::Texture(_) => 0,
        }
    }

    pub fn align_of(&self, ty: TypeId) -> u32 {
        match self.get(ty) {
            Type::Void | Type::Sampler { .. } | Type::Texture(_) => 1,
            Type::Scalar(Scalar::F16) => 2,
            Type::Scalar(Scalar::AbstractInt | Scalar::AbstractFloat) => 8,
            Type::Scalar(_) | Type::Atomic(_) => 4,
            Type::Vector { size, elem } => self.vector_layout(size, elem).0 as u32,
            Type::Matrix { rows, elem, .. } => self.vector_layout(rows, elem).0 as u32,
            Type::Array { elem, .. } => self.align_of(elem),
            Type::Struct(id) => self.struct_info(id).align,
            Type::Pointer { .. } | Type::Reference { .. } => 8,
        }
    }

    /// `(alignment, size)` of a vector.
    fn vector_layout(&self, size: u8, elem: TypeId) -> (u64, u64) {
        let scalar = self.size_of(elem);
        let align = match size {
            2 => 2 * scalar,
            _ => 4 * scalar,
        };
        (align, u64::from(size) * scalar)
    }

    pub fn display(&self, ty: TypeId) -> String {
        TypeDisplay { types: self, ty }.to_string()
    }
}

/// Predicates over types used by validation and by consumers of the resolved program.
impl Types {
    /// Scalars, atomics, vectors, matrices, arrays and structures.
    pub fn is_plain(&self, ty: TypeId) -> bool {
        matches!(
            self.get(ty),
            Type::Scalar(_)
                | Type::Atomic(_)
                | Type::Vector { .. }
                | Type::Matrix { .. }
                | Type::Array { .. }
                | Type::Struct(_)
        )
    }

    /// Types with a size that is fully determined at pipeline creation time.
    pub fn is_fixed_footprint(&self, ty: TypeId) -> bool {
        match self.get(ty) {
            Type::Scalar(_) | Type::Vector { .. } | Type::Matrix { .. } | Type::Atomic(_) => true,
            Type::Array { count: ArrayCount::Runtime, .. } => false,
            Type::Array { elem, .. } => self.is_fixed_footprint(elem),
            Type::Struct(id) => {
                self.struct_info(id).members.iter().all(|member| self.is_fixed_footprint(member.ty))
            },
            _ => false,
        }
    }

    /// Types which can be constructed by value constructors, returned from functions, and stored
    /// in function-scope variables.
    pub fn is_constructible(&self, ty: TypeId) -> bool {
        match self.get(ty) {
            Type::Scalar(_) | Type::Vector { .. } | Type::Matrix { .. } => true,
            Type::Array { elem, count: ArrayCount::Constant(_), .. } => self.is_constructible(elem),
            Type::Struct(id) => {
                self.struct_info(id).members.iter().all(|member| self.is_constructible(member.ty))
            },
            _ => false,
        }
    }

    /// Types which may be the store type of a variable.
    pub fn is_storable(&self, ty: TypeId) -> bool {
        self.is_plain(ty) || self.is_handle(ty)
    }

    /// Types with a layout that can be shared between the host and the device.
    pub fn is_host_shareable(&self, ty: TypeId) -> bool {
        match self.get(ty) {
            Type::Scalar(scalar) => matches!(scalar, Scalar::I32 | Scalar::U32 | Scalar::F32 | Scalar::F16),
            Type::Vector { elem, .. } | Type::Matrix { elem, .. } | Type::Array { elem, .. } => {
                self.is_host_shareable(elem)
            },
            Type::Atomic(elem) => self.is_host_shareable(elem),
            Type::Struct(id) => {
                self.struct_info(id).members.iter().all(|member| self.is_host_shareable(member.ty))
            },
            _ => false,
        }
    }
}

pub struct TypeDisplay<'a> {
    types: &'a Types,
    ty: TypeId,
}

impl std::fmt::Display for TypeDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let types = self.types;
        let name = |ty| TypeDisplay { types, ty };
        match types.get(self.ty) {
            Type::Void => write!(f, "void"),
            Type::Scalar(scalar) => write!(f, "{}", scalar.name()),
            Type::Vector { size, elem } => write!(f, "vec{size}<{}>", name(elem)),
            Type::Matrix { columns, rows, elem } => write!(f, "mat{columns}x{rows}<{}>", name(elem)),
            Type::Array { elem, count, .. } => match count {
                ArrayCount::Constant(count) => write!(f, "array<{}, {count}>", name(elem)),
                ArrayCount::Override(var) => {
                    let count = types.override_names.get(&var).map_or("?", |x| x.as_str());
                    write!(f, "array<{}, {count}>", name(elem))
                },
                ArrayCount::Runtime => write!(f, "array<{}>", name(elem)),
            },
            Type::Struct(id) => write!(f, "{}", types.struct_info(id).name),
            Type::Atomic(elem) => write!(f, "atomic<{}>", name(elem)),
            Type::Pointer { space, pointee, access } => {
                write!(f, "ptr<{}, {}, {}>", space.name(), name(pointee), access.name())
            },
            Type::Reference { space, store, access } => {
                write!(f, "ref<{}, {}, {}>", space.name(), name(store), access.name())
            },
            Type::Sampler { comparison: false } => write!(f, "sampler"),
            Type::Sampler { comparison: true } => write!(f, "sampler_comparison"),
            Type::Texture(kind) => match kind {
                TextureKind::Sampled { dimension, sampled } => {
                    write!(f, "texture_{}<{}>", dimension.suffix(), name(sampled))
                },
                TextureKind::Multisampled { sampled } => {
                    write!(f, "texture_multisampled_2d<{}>", name(sampled))
                },
                TextureKind::Depth { dimension } => write!(f, "texture_depth_{}", dimension.suffix()),
                TextureKind::DepthMultisampled => write!(f, "texture_depth_multisampled_2d"),
                TextureKind::Storage { dimension, format, access } => write!(
                    f,
                    "texture_storage_{}<{}, {}>",
                    dimension.suffix(),
                    format.name(),
                    access.name()
                ),
                TextureKind::External => write!(f, "texture_external"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_idempotent() {
        let mut types = Types::new();
        let a = types.vector(TypeId::F32, 4);
        let b = types.vector(TypeId::F32, 4);
        let c = types.vector(TypeId::I32, 4);
        assert_eq!(a, b);
        assert_ne!(a, c);

        let arr = types.array(a, ArrayCount::Constant(3));
        assert_eq!(arr, types.array(b, ArrayCount::Constant(3)));
        assert_eq!(types.display(arr), "array<vec4<f32>, 3>");
    }

    #[test]
    fn layout() {
        let mut types = Types::new();
        let vec3 = types.vector(TypeId::F32, 3);
        assert_eq!((types.align_of(vec3), types.size_of(vec3)), (16, 12));

        let mat = types.matrix(TypeId::F32, 4, 3);
        assert_eq!((types.align_of(mat), types.size_of(mat)), (16, 64));

        let arr = types.array(vec3, ArrayCount::Constant(2));
        assert_eq!(types.get(arr), Type::Array { elem: vec3, count: ArrayCount::Constant(2), stride: 16 });
        assert_eq!(types.size_of(arr), 32);

        let half = types.vector(TypeId::F16, 2);
        assert_eq!((types.align_of(half), types.size_of(half)), (4, 4));
    }

    #[test]
    fn host_shareable() {
        let mut types = Types::new();
        assert!(!types.is_host_shareable(TypeId::BOOL));
        assert!(types.is_host_shareable(TypeId::U32));
        let bools = types.vector(TypeId::BOOL, 2);
        assert!(!types.is_host_shareable(bools));
        let atomic = types.atomic(TypeId::I32);
        assert!(types.is_host_shareable(atomic));
        let ptr = types.pointer(AddressSpace::Function, TypeId::F32, Access::ReadWrite);
        assert!(!types.is_host_shareable(ptr));
        assert!(!types.is_constructible(atomic));
        assert!(types.is_fixed_footprint(atomic));
    }

    #[test]
    fn common_types() {
        let mut types = Types::new();
        assert_eq!(
            types.common_type(&[TypeId::ABSTRACT_INT, TypeId::ABSTRACT_FLOAT]),
            Some(TypeId::ABSTRACT_FLOAT)
        );
        assert_eq!(types.common_type(&[TypeId::ABSTRACT_INT, TypeId::U32]), Some(TypeId::U32));
        assert_eq!(types.common_type(&[TypeId::I32, TypeId::U32]), None);
        assert_eq!(types.common_type(&[TypeId::ABSTRACT_FLOAT, TypeId::I32]), None);

        let abstract_vec = types.vector(TypeId::ABSTRACT_INT, 2);
        let float_vec = types.vector(TypeId::F32, 2);
        assert_eq!(types.common_type(&[abstract_vec, float_vec]), Some(float_vec));
    }

    #[test]
    fn names() {
        let mut types = Types::new();
        let ptr = types.pointer(AddressSpace::Storage, TypeId::I32, Access::Read);
        assert_eq!(types.display(ptr), "ptr<storage, i32, read>");
        let texture = types.intern(Type::Texture(TextureKind::Storage {
            dimension: TextureDimension::D2,
            format: TexelFormat::Rgba8Unorm,
            access: Access::Write,
        }));
        assert_eq!(types.display(texture), "texture_storage_2d<rgba8unorm, write>");
        assert_eq!(types.display(TypeId::ABSTRACT_FLOAT), "abstract-float");
    }
}
