//! Compile-time constant values and the operations the constant evaluator folds.
//!
//! Operations return `Err(message)` when the result is not representable; the caller attaches the
//! message to the source location of the expression being evaluated.

use crate::ast::{BinaryOp, UnaryOp};
use crate::util::display_float;

use super::types::{Scalar, Type, TypeId, Types};

#[derive(Debug, Clone, PartialEq)]
pub enum ConstantValue {
    Bool(bool),
    AbstractInt(i64),
    AbstractFloat(f64),
    I32(i32),
    U32(u32),
    F32(f32),
    /// Always holds a value exactly representable in half precision.
    F16(f32),
    /// Vectors, matrices (as a list of column vectors), arrays and structures.
    Composite { ty: TypeId, elements: Vec<ConstantValue> },
}

pub type EvalResult = Result<ConstantValue, String>;

const F16_MAX: f64 = 65504.0;

impl ConstantValue {
    pub fn scalar(&self) -> Option<Scalar> {
        Some(match self {
            ConstantValue::Bool(_) => Scalar::Bool,
            ConstantValue::AbstractInt(_) => Scalar::AbstractInt,
            ConstantValue::AbstractFloat(_) => Scalar::AbstractFloat,
            ConstantValue::I32(_) => Scalar::I32,
            ConstantValue::U32(_) => Scalar::U32,
            ConstantValue::F32(_) => Scalar::F32,
            ConstantValue::F16(_) => Scalar::F16,
            ConstantValue::Composite { .. } => return None,
        })
    }

    pub fn ty(&self) -> TypeId {
        match self {
            ConstantValue::Composite { ty, .. } => *ty,
            scalar => scalar.scalar().map(Scalar::id).unwrap_or(TypeId::VOID),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConstantValue::Bool(value) => Some(*value),
            _ => None,
        }
    }

    /// The value of an integer scalar.
    pub fn as_int(&self) -> Option<i64> {
        match *self {
            ConstantValue::AbstractInt(value) => Some(value),
            ConstantValue::I32(value) => Some(i64::from(value)),
            ConstantValue::U32(value) => Some(i64::from(value)),
            _ => None,
        }
    }

    /// The value of any numeric scalar.
    pub fn as_float(&self) -> Option<f64> {
        match *self {
            ConstantValue::AbstractFloat(value) => Some(value),
            ConstantValue::F32(value) | ConstantValue::F16(value) => Some(f64::from(value)),
            _ => self.as_int().map(|value| value as f64),
        }
    }

    pub fn elements(&self) -> Option<&[ConstantValue]> {
        match self {
            ConstantValue::Composite { elements, .. } => Some(elements),
            _ => None,
        }
    }

    /// Whether every scalar in the value is `true`, or any is, depending on `all`.
    pub fn all_or_any(&self, all: bool) -> bool {
        match self {
            ConstantValue::Composite { elements, .. } if all => {
                elements.iter().all(|element| element.all_or_any(all))
            },
            ConstantValue::Composite { elements, .. } => {
                elements.iter().any(|element| element.all_or_any(all))
            },
            value => value.as_bool().unwrap_or(false),
        }
    }

    /// Builds a numeric scalar from a float, rounding to the precision of `scalar`.
    pub fn from_f64(scalar: Scalar, value: f64) -> ConstantValue {
        match scalar {
            Scalar::AbstractFloat => ConstantValue::AbstractFloat(value),
            Scalar::F32 => ConstantValue::F32(value as f32),
            Scalar::F16 => ConstantValue::F16(quantize_f16(value).unwrap_or(value as f32)),
            Scalar::AbstractInt => ConstantValue::AbstractInt(value as i64),
            Scalar::I32 => ConstantValue::I32(value as i32),
            Scalar::U32 => ConstantValue::U32(value as u32),
            Scalar::Bool => ConstantValue::Bool(value != 0.0),
        }
    }

    /// Builds an integer scalar, wrapping concrete integers to their bit width.
    pub fn from_i64(scalar: Scalar, value: i64) -> ConstantValue {
        match scalar {
            Scalar::AbstractInt => ConstantValue::AbstractInt(value),
            Scalar::I32 => ConstantValue::I32(value as i32),
            Scalar::U32 => ConstantValue::U32(value as u32),
            _ => ConstantValue::from_f64(scalar, value as f64),
        }
    }

    /// The zero value of a constructible type.
    pub fn zero(types: &mut Types, ty: TypeId) -> Option<ConstantValue> {
        Some(match types.get(ty) {
            Type::Scalar(Scalar::Bool) => ConstantValue::Bool(false),
            Type::Scalar(scalar) => ConstantValue::from_i64(scalar, 0),
            Type::Vector { size, elem } => {
                let element = ConstantValue::zero(types, elem)?;
                ConstantValue::Composite { ty, elements: vec![element; usize::from(size)] }
            },
            Type::Matrix { columns, rows, elem } => {
                let column = types.vector(elem, rows);
                let column = ConstantValue::zero(types, column)?;
                ConstantValue::Composite { ty, elements: vec![column; usize::from(columns)] }
            },
            Type::Array { elem, count: super::types::ArrayCount::Constant(count), .. } => {
                let element = ConstantValue::zero(types, elem)?;
                ConstantValue::Composite { ty, elements: vec![element; count as usize] }
            },
            Type::Struct(id) => {
                let members: Vec<TypeId> =
                    types.struct_info(id).members.iter().map(|member| member.ty).collect();
                let elements = members
                    .into_iter()
                    .map(|member| ConstantValue::zero(types, member))
                    .collect::<Option<Vec<_>>>()?;
                ConstantValue::Composite { ty, elements }
            },
            _ => return None,
        })
    }

    /// Replicates a scalar into every component of a vector.
    pub fn splat(ty: TypeId, size: u8, scalar: ConstantValue) -> ConstantValue {
        ConstantValue::Composite { ty, elements: vec![scalar; usize::from(size)] }
    }

    /// Converts a scalar to another scalar type, failing if the value cannot be represented.
    ///
    /// Integers convert between `i32` and `u32` by reinterpreting their bits, floats convert to
    /// integers by truncation, and booleans convert to `0` or `1`. Concrete floats outside the range
    /// of an integer type saturate at its limits; only abstract values fail to convert to one.
    pub fn convert_scalar(&self, target: Scalar) -> EvalResult {
        if self.scalar() == Some(target) {
            return Ok(self.clone());
        }

        let out_of_range =
            || format!("value {} cannot be represented as '{}'", self.plain(), target.name());

        if let ConstantValue::Bool(value) = *self {
            return Ok(ConstantValue::from_i64(target, i64::from(value)));
        }
        if target == Scalar::Bool {
            return Ok(ConstantValue::Bool(self.as_float().is_some_and(|value| value != 0.0)));
        }

        match (self, target) {
            (ConstantValue::I32(value), Scalar::U32) => Ok(ConstantValue::U32(*value as u32)),
            (ConstantValue::U32(value), Scalar::I32) => Ok(ConstantValue::I32(*value as i32)),
            (ConstantValue::AbstractInt(value), Scalar::I32) => {
                i32::try_from(*value).map(ConstantValue::I32).map_err(|_| out_of_range())
            },
            (ConstantValue::AbstractInt(value), Scalar::U32) => {
                u32::try_from(*value).map(ConstantValue::U32).map_err(|_| out_of_range())
            },
            (_, Scalar::AbstractFloat) => {
                Ok(ConstantValue::AbstractFloat(self.as_float().unwrap_or_default()))
            },
            (_, Scalar::F32) => {
                let value = self.as_float().unwrap_or_default();
                if value.abs() > f64::from(f32::MAX) {
                    return Err(out_of_range());
                }
                Ok(ConstantValue::F32(value as f32))
            },
            (_, Scalar::F16) => {
                let value = self.as_float().unwrap_or_default();
                quantize_f16(value).map(ConstantValue::F16).ok_or_else(out_of_range)
            },
            (_, Scalar::I32 | Scalar::U32 | Scalar::AbstractInt) => {
                let value = self.as_float().unwrap_or_default().trunc();
                let (min, max) = match target {
                    Scalar::I32 => (f64::from(i32::MIN), f64::from(i32::MAX)),
                    Scalar::U32 => (0.0, f64::from(u32::MAX)),
                    _ => (i64::MIN as f64, i64::MAX as f64),
                };
                if value >= min && value <= max {
                    return Ok(ConstantValue::from_i64(target, value as i64));
                }
                match self {
                    ConstantValue::F32(_) | ConstantValue::F16(_) => {
                        Ok(ConstantValue::from_i64(target, value.clamp(min, max) as i64))
                    },
                    _ => Err(out_of_range()),
                }
            },
            (_, Scalar::Bool) => unreachable!("boolean conversion is handled above"),
        }
    }

    /// Applies `f` to every scalar of the value, producing a value of type `ty`.
    pub fn map<F>(&self, types: &mut Types, ty: TypeId, f: &mut F) -> EvalResult
    where
        F: FnMut(&ConstantValue) -> EvalResult,
    {
        match self {
            ConstantValue::Composite { elements, .. } => {
                let element_ty = element_type(types, ty);
                let mut mapped = Vec::with_capacity(elements.len());
                for element in elements {
                    mapped.push(element.map(types, element_ty, f)?);
                }
                Ok(ConstantValue::Composite { ty, elements: mapped })
            },
            scalar => f(scalar),
        }
    }

    /// Applies `f` to pairs of scalars of two values with the same shape. A scalar operand is
    /// broadcast to every component of the other.
    pub fn zip<F>(&self, other: &ConstantValue, types: &mut Types, ty: TypeId, f: &mut F) -> EvalResult
    where
        F: FnMut(&ConstantValue, &ConstantValue) -> EvalResult,
    {
        let (lhs, rhs) = match (self, other) {
            (ConstantValue::Composite { .. }, _) | (_, ConstantValue::Composite { .. }) => {
                (self.elements(), other.elements())
            },
            (lhs, rhs) => return f(lhs, rhs),
        };

        let element_ty = element_type(types, ty);
        let count = lhs.or(rhs).map_or(0, <[_]>::len);
        if let (Some(lhs), Some(rhs)) = (lhs, rhs) {
            assert_eq!(lhs.len(), rhs.len(), "element-wise operation on values of different shapes");
        }

        let mut elements = Vec::with_capacity(count);
        for i in 0..count {
            let a = lhs.map_or(self, |lhs| &lhs[i]);
            let b = rhs.map_or(other, |rhs| &rhs[i]);
            elements.push(a.zip(b, types, element_ty, f)?);
        }
        Ok(ConstantValue::Composite { ty, elements })
    }

    pub fn index(&self, index: i64) -> EvalResult {
        let elements = self.elements().unwrap_or_default();
        match usize::try_from(index).ok().and_then(|index| elements.get(index)) {
            Some(element) => Ok(element.clone()),
            None => Err(format!(
                "index {index} out of bounds [0..{}]",
                elements.len().saturating_sub(1)
            )),
        }
    }

    pub fn swizzle(&self, ty: TypeId, indices: &[u8]) -> ConstantValue {
        let elements = self.elements().unwrap_or_default();
        let picked: Vec<_> =
            indices.iter().filter_map(|index| elements.get(usize::from(*index)).cloned()).collect();
        match picked.as_slice() {
            [single] if indices.len() == 1 => single.clone(),
            _ => ConstantValue::Composite { ty, elements: picked },
        }
    }

    /// The value without its type, as it appears in diagnostics.
    pub fn plain(&self) -> String {
        match self {
            ConstantValue::Bool(value) => value.to_string(),
            ConstantValue::AbstractInt(value) => value.to_string(),
            ConstantValue::I32(value) => value.to_string(),
            ConstantValue::U32(value) => value.to_string(),
            ConstantValue::AbstractFloat(value) => display_float(*value),
            ConstantValue::F32(value) | ConstantValue::F16(value) => display_f32(*value),
            ConstantValue::Composite { elements, .. } => {
                let elements: Vec<_> = elements.iter().map(ConstantValue::plain).collect();
                format!("({})", elements.join(", "))
            },
        }
    }

    pub fn display<'a>(&'a self, types: &'a Types) -> ConstantDisplay<'a> {
        ConstantDisplay { value: self, types }
    }
}

/// Prints the shortest digits which round-trip through an `f32`.
fn display_f32(value: f32) -> String {
    let shortest: f64 = value.to_string().parse().unwrap_or(f64::from(value));
    display_float(shortest)
}

/// Rounds to the nearest value representable in half precision, or `None` if out of range.
fn quantize_f16(value: f64) -> Option<f32> {
    if value.is_nan() || value.abs() > F16_MAX {
        return None;
    }
    if value == 0.0 {
        return Some(value as f32);
    }
    let exponent = value.abs().log2().floor() as i32;
    let ulp = 2f64.powi(exponent.max(-14) - 10);
    Some(((value / ulp).round_ties_even() * ulp) as f32)
}

/// The type of the elements of a composite value of type `ty`.
pub fn element_type(types: &mut Types, ty: TypeId) -> TypeId {
    match types.get(ty) {
        Type::Vector { elem, .. } | Type::Array { elem, .. } => elem,
        Type::Matrix { rows, elem, .. } => types.vector(elem, rows),
        Type::Atomic(elem) => elem,
        _ => ty,
    }
}

pub struct ConstantDisplay<'a> {
    value: &'a ConstantValue,
    types: &'a Types,
}

impl std::fmt::Display for ConstantDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.value {
            ConstantValue::Bool(value) => write!(f, "{value}"),
            ConstantValue::AbstractInt(_) | ConstantValue::AbstractFloat(_) => {
                write!(f, "{}", self.value.plain())
            },
            ConstantValue::Composite { ty, elements } => {
                write!(f, "{}(", self.types.display(*ty))?;
                for (i, element) in elements.iter().enumerate() {
                    if i != 0 {
                        write!(f, ", ")?;
                    }
                    match element {
                        ConstantValue::Composite { .. } => write!(f, "{}", element.display(self.types))?,
                        scalar => write!(f, "{}", scalar.plain())?,
                    }
                }
                write!(f, ")")
            },
            scalar => {
                let name = scalar.scalar().map_or("?", Scalar::name);
                write!(f, "{name}({})", scalar.plain())
            },
        }
    }
}

pub fn unary(op: UnaryOp, operand: &ConstantValue, types: &mut Types, ty: TypeId) -> EvalResult {
    operand.map(types, ty, &mut |value| match (op, value) {
        (UnaryOp::Negate, ConstantValue::AbstractInt(x)) => x
            .checked_neg()
            .map(ConstantValue::AbstractInt)
            .ok_or_else(|| format!("'-({x})' cannot be represented as 'abstract-int'")),
        (UnaryOp::Negate, ConstantValue::I32(x)) => Ok(ConstantValue::I32(x.wrapping_neg())),
        (UnaryOp::Negate, ConstantValue::AbstractFloat(x)) => Ok(ConstantValue::AbstractFloat(-x)),
        (UnaryOp::Negate, ConstantValue::F32(x)) => Ok(ConstantValue::F32(-x)),
        (UnaryOp::Negate, ConstantValue::F16(x)) => Ok(ConstantValue::F16(-x)),
        (UnaryOp::Not, ConstantValue::Bool(x)) => Ok(ConstantValue::Bool(!x)),
        (UnaryOp::Complement, ConstantValue::AbstractInt(x)) => Ok(ConstantValue::AbstractInt(!x)),
        (UnaryOp::Complement, ConstantValue::I32(x)) => Ok(ConstantValue::I32(!x)),
        (UnaryOp::Complement, ConstantValue::U32(x)) => Ok(ConstantValue::U32(!x)),
        (op, value) => panic!("unary operator {} applied to constant {value:?}", op.as_str()),
    })
}

/// Folds a binary operation. Both operands must already have been converted to the operand types
/// the overload expects, and `ty` is the type of the result.
pub fn binary(
    op: BinaryOp,
    lhs: &ConstantValue,
    rhs: &ConstantValue,
    types: &mut Types,
    ty: TypeId,
) -> EvalResult {
    if op == BinaryOp::Multiply {
        let is_matrix = |value: &ConstantValue| matches!(types.get(value.ty()), Type::Matrix { .. });
        let is_vector = |value: &ConstantValue| matches!(types.get(value.ty()), Type::Vector { .. });
        if (is_matrix(lhs) && (is_matrix(rhs) || is_vector(rhs))) || (is_vector(lhs) && is_matrix(rhs)) {
            return linear_multiply(lhs, rhs, types, ty);
        }
    }

    lhs.zip(rhs, types, ty, &mut |a, b| scalar_binary(op, a, b))
}

fn scalar_binary(op: BinaryOp, lhs: &ConstantValue, rhs: &ConstantValue) -> EvalResult {
    use ConstantValue as C;

    let scalar = lhs.scalar().expect("binary operation on a composite value");
    let overflow = || {
        format!("'{} {} {}' cannot be represented as '{}'", lhs.plain(), op.as_str(), rhs.plain(), scalar.name())
    };

    if let (C::Bool(a), C::Bool(b)) = (lhs, rhs) {
        return Ok(C::Bool(match op {
            BinaryOp::And | BinaryOp::LogicalAnd => *a && *b,
            BinaryOp::Or | BinaryOp::LogicalOr => *a || *b,
            BinaryOp::Xor | BinaryOp::NotEqual => a != b,
            BinaryOp::Equal => a == b,
            _ => panic!("operator {} applied to booleans", op.as_str()),
        }));
    }

    if matches!(op, BinaryOp::ShiftLeft | BinaryOp::ShiftRight) {
        return shift(op, lhs, rhs);
    }

    if scalar.is_integer() {
        let a = lhs.as_int().expect("integer operand");
        let b = rhs.as_int().expect("integer operand");
        let min = match scalar {
            Scalar::I32 => i64::from(i32::MIN),
            Scalar::U32 => 0,
            _ => i64::MIN,
        };

        let result = match op {
            BinaryOp::Add => i128::from(a) + i128::from(b),
            BinaryOp::Subtract => i128::from(a) - i128::from(b),
            BinaryOp::Multiply => i128::from(a) * i128::from(b),
            BinaryOp::Divide | BinaryOp::Modulo => {
                if b == 0 {
                    return Err(match op {
                        BinaryOp::Divide => "integer division by zero is invalid".into(),
                        _ => "integer remainder by zero is invalid".into(),
                    });
                }
                if scalar.is_signed() && a == min && b == -1 {
                    return Err(overflow());
                }
                match op {
                    BinaryOp::Divide => i128::from(a / b),
                    _ => i128::from(a % b),
                }
            },
            BinaryOp::And => i128::from(a & b),
            BinaryOp::Or => i128::from(a | b),
            BinaryOp::Xor => i128::from(a ^ b),
            BinaryOp::Equal => return Ok(C::Bool(a == b)),
            BinaryOp::NotEqual => return Ok(C::Bool(a != b)),
            BinaryOp::Less => return Ok(C::Bool(a < b)),
            BinaryOp::LessEqual => return Ok(C::Bool(a <= b)),
            BinaryOp::Greater => return Ok(C::Bool(a > b)),
            BinaryOp::GreaterEqual => return Ok(C::Bool(a >= b)),
            _ => panic!("operator {} applied to integers", op.as_str()),
        };

        if scalar == Scalar::AbstractInt {
            return i64::try_from(result).map(C::AbstractInt).map_err(|_| overflow());
        }
        // concrete integers wrap around
        return Ok(C::from_i64(scalar, result as i64));
    }

    let a = lhs.as_float().expect("float operand");
    let b = rhs.as_float().expect("float operand");
    let result = match scalar {
        Scalar::AbstractFloat => float_op(op, a, b),
        _ => float_op(op, a as f32, b as f32).map(f64::from),
    };
    match result {
        FloatResult::Bool(value) => Ok(C::Bool(value)),
        FloatResult::Value(value) => {
            if !value.is_finite() {
                return Err(overflow());
            }
            match scalar {
                Scalar::F16 => quantize_f16(value).map(C::F16).ok_or_else(overflow),
                _ => Ok(C::from_f64(scalar, value)),
            }
        },
    }
}

enum FloatResult<T> {
    Value(T),
    Bool(bool),
}

impl<T> FloatResult<T> {
    fn map<U>(self, f: impl FnOnce(T) -> U) -> FloatResult<U> {
        match self {
            FloatResult::Value(value) => FloatResult::Value(f(value)),
            FloatResult::Bool(value) => FloatResult::Bool(value),
        }
    }
}

fn float_op<T>(op: BinaryOp, a: T, b: T) -> FloatResult<T>
where
    T: Copy
        + PartialOrd
        + std::ops::Add<Output = T>
        + std::ops::Sub<Output = T>
        + std::ops::Mul<Output = T>
        + std::ops::Div<Output = T>
        + std::ops::Rem<Output = T>,
{
    FloatResult::Value(match op {
        BinaryOp::Add => a + b,
        BinaryOp::Subtract => a - b,
        BinaryOp::Multiply => a * b,
        BinaryOp::Divide => a / b,
        BinaryOp::Modulo => a % b,
        BinaryOp::Equal => return FloatResult::Bool(a == b),
        BinaryOp::NotEqual => return FloatResult::Bool(a != b),
        BinaryOp::Less => return FloatResult::Bool(a < b),
        BinaryOp::LessEqual => return FloatResult::Bool(a <= b),
        BinaryOp::Greater => return FloatResult::Bool(a > b),
        BinaryOp::GreaterEqual => return FloatResult::Bool(a >= b),
        _ => panic!("operator {} applied to floats", op.as_str()),
    })
}

fn shift(op: BinaryOp, lhs: &ConstantValue, rhs: &ConstantValue) -> EvalResult {
    let amount = rhs.as_int().expect("shift amount must be an integer");
    let value = lhs.as_int().expect("shifted value must be an integer");
    let scalar = lhs.scalar().expect("shift of a composite value");
    let bits: i64 = if scalar == Scalar::AbstractInt { 64 } else { 32 };

    if amount >= bits {
        let direction = if op == BinaryOp::ShiftLeft { "left" } else { "right" };
        return Err(format!(
            "shift {direction} value must be less than the bit width of the lhs, which is {bits}"
        ));
    }

    match (op, scalar) {
        (BinaryOp::ShiftLeft, Scalar::U32) => {
            Ok(ConstantValue::U32((value as u32) << amount as u32))
        },
        (BinaryOp::ShiftLeft, _) => {
            let shifted = i128::from(value) << amount;
            let fits = match scalar {
                Scalar::I32 => i32::try_from(shifted).is_ok(),
                _ => i64::try_from(shifted).is_ok(),
            };
            if !fits {
                return Err("shift left operation results in sign change".into());
            }
            Ok(ConstantValue::from_i64(scalar, shifted as i64))
        },
        (_, Scalar::U32) => Ok(ConstantValue::U32((value as u32) >> amount as u32)),
        (_, Scalar::I32) => Ok(ConstantValue::I32((value as i32) >> amount as u32)),
        _ => Ok(ConstantValue::AbstractInt(value >> amount)),
    }
}

/// `mat * mat`, `mat * vec` and `vec * mat`.
fn linear_multiply(
    lhs: &ConstantValue,
    rhs: &ConstantValue,
    types: &mut Types,
    ty: TypeId,
) -> EvalResult {
    let scalar = types.deepest_scalar(ty).expect("matrix product of non-numeric type");
    let floats = |value: &ConstantValue| -> Vec<f64> {
        value.elements().unwrap_or_default().iter().filter_map(ConstantValue::as_float).collect()
    };
    // matrices as lists of columns
    let columns = |value: &ConstantValue| -> Vec<Vec<f64>> {
        value.elements().unwrap_or_default().iter().map(floats).collect()
    };
    let make = |value: f64| -> EvalResult {
        let element = match scalar {
            Scalar::F32 => Some(value as f32).filter(|value| value.is_finite()).map(ConstantValue::F32),
            Scalar::F16 => quantize_f16(value).map(ConstantValue::F16),
            _ => value.is_finite().then(|| ConstantValue::from_f64(scalar, value)),
        };
        element.ok_or_else(|| {
            format!("'{} * {}' cannot be represented as '{}'", lhs.plain(), rhs.plain(), scalar.name())
        })
    };
    let vector = |values: Vec<f64>, ty: TypeId| -> EvalResult {
        let elements = values.into_iter().map(make).collect::<Result<_, _>>()?;
        Ok(ConstantValue::Composite { ty, elements })
    };

    let lhs_is_vector = matches!(types.get(lhs.ty()), Type::Vector { .. });
    let rhs_is_vector = matches!(types.get(rhs.ty()), Type::Vector { .. });

    if rhs_is_vector {
        let (m, v) = (columns(lhs), floats(rhs));
        let rows = m.first().map_or(0, Vec::len);
        let out: Vec<f64> = (0..rows).map(|r| (0..m.len()).map(|k| m[k][r] * v[k]).sum::<f64>()).collect();
        return vector(out, ty);
    }

    if lhs_is_vector {
        let (v, m) = (floats(lhs), columns(rhs));
        let out: Vec<f64> = m.iter().map(|column| (0..v.len()).map(|k| v[k] * column[k]).sum::<f64>()).collect();
        return vector(out, ty);
    }

    let (a, b) = (columns(lhs), columns(rhs));
    let rows = a.first().map_or(0, Vec::len);
    let column_ty = element_type(types, ty);
    let mut elements = Vec::with_capacity(b.len());
    for column in &b {
        let out: Vec<f64> = (0..rows).map(|r| (0..a.len()).map(|k| a[k][r] * column[k]).sum::<f64>()).collect();
        elements.push(vector(out, column_ty)?);
    }
    Ok(ConstantValue::Composite { ty, elements })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abstract_overflow() {
        let a = ConstantValue::AbstractInt(i64::MAX);
        let b = ConstantValue::AbstractInt(1);
        let mut types = Types::new();
        let error = binary(BinaryOp::Add, &a, &b, &mut types, TypeId::ABSTRACT_INT).unwrap_err();
        assert_eq!(error, "'9223372036854775807 + 1' cannot be represented as 'abstract-int'");
    }

    #[test]
    fn negate_overflow() {
        let mut types = Types::new();
        let min = ConstantValue::AbstractInt(i64::MIN);
        assert_eq!(
            unary(UnaryOp::Negate, &min, &mut types, TypeId::ABSTRACT_INT),
            Err("'-(-9223372036854775808)' cannot be represented as 'abstract-int'".into())
        );
    }

    #[test]
    fn concrete_integers_wrap() {
        let mut types = Types::new();
        let a = ConstantValue::I32(i32::MAX);
        let b = ConstantValue::I32(1);
        assert_eq!(
            binary(BinaryOp::Add, &a, &b, &mut types, TypeId::I32),
            Ok(ConstantValue::I32(i32::MIN))
        );
        let zero = ConstantValue::U32(0);
        assert_eq!(
            binary(BinaryOp::Modulo, &ConstantValue::U32(3), &zero, &mut types, TypeId::U32),
            Err("integer remainder by zero is invalid".into())
        );
    }

    #[test]
    fn shifts() {
        let mut types = Types::new();
        let shl = |a, b, types: &mut Types| binary(BinaryOp::ShiftLeft, &a, &b, types, a.ty());
        assert_eq!(
            shl(ConstantValue::I32(1), ConstantValue::U32(32), &mut types),
            Err("shift left value must be less than the bit width of the lhs, which is 32".into())
        );
        assert_eq!(
            shl(ConstantValue::I32(0x4000_0000), ConstantValue::U32(1), &mut types),
            Err("shift left operation results in sign change".into())
        );
        assert_eq!(
            shl(ConstantValue::U32(0x8000_0001), ConstantValue::U32(1), &mut types),
            Ok(ConstantValue::U32(2))
        );
    }

    #[test]
    fn conversions() {
        assert_eq!(
            ConstantValue::AbstractInt(2147483647).convert_scalar(Scalar::I32),
            Ok(ConstantValue::I32(2147483647))
        );
        assert_eq!(
            ConstantValue::AbstractInt(2147483648).convert_scalar(Scalar::I32),
            Err("value 2147483648 cannot be represented as 'i32'".into())
        );
        assert_eq!(ConstantValue::I32(-1).convert_scalar(Scalar::U32), Ok(ConstantValue::U32(u32::MAX)));
        assert_eq!(ConstantValue::F32(-2.75).convert_scalar(Scalar::I32), Ok(ConstantValue::I32(-2)));
        assert_eq!(ConstantValue::F32(1e10).convert_scalar(Scalar::I32), Ok(ConstantValue::I32(i32::MAX)));
        assert_eq!(ConstantValue::F16(-1.0).convert_scalar(Scalar::U32), Ok(ConstantValue::U32(0)));
        assert_eq!(
            ConstantValue::AbstractFloat(1e10).convert_scalar(Scalar::I32),
            Err("value 10000000000 cannot be represented as 'i32'".into())
        );
        assert_eq!(
            ConstantValue::AbstractFloat(1e39).convert_scalar(Scalar::F32),
            Err("value 1e+39 cannot be represented as 'f32'".into())
        );
        assert_eq!(
            ConstantValue::AbstractFloat(65519.0).convert_scalar(Scalar::F16),
            Err("value 65519 cannot be represented as 'f16'".into())
        );
        assert_eq!(
            ConstantValue::AbstractFloat(0.1).convert_scalar(Scalar::F16),
            Ok(ConstantValue::F16(0.099975586))
        );
    }

    #[test]
    fn matrix_vector_product() {
        let mut types = Types::new();
        let vec2 = types.vector(TypeId::F32, 2);
        let mat2 = types.matrix(TypeId::F32, 2, 2);
        let column = |x: f32, y: f32| ConstantValue::Composite {
            ty: vec2,
            elements: vec![ConstantValue::F32(x), ConstantValue::F32(y)],
        };
        // columns (1, 2) and (3, 4)
        let m = ConstantValue::Composite { ty: mat2, elements: vec![column(1.0, 2.0), column(3.0, 4.0)] };
        let v = column(1.0, 1.0);

        let mv = binary(BinaryOp::Multiply, &m, &v, &mut types, vec2).unwrap();
        assert_eq!(mv, column(4.0, 6.0));

        let vm = binary(BinaryOp::Multiply, &v, &m, &mut types, vec2).unwrap();
        assert_eq!(vm, column(3.0, 7.0));

        let mm = binary(BinaryOp::Multiply, &m, &m, &mut types, mat2).unwrap();
        assert_eq!(
            mm,
            ConstantValue::Composite { ty: mat2, elements: vec![column(7.0, 10.0), column(15.0, 22.0)] }
        );

        // finite in double precision, but not as an f32
        let big = ConstantValue::Composite { ty: mat2, elements: vec![column(3e38, 0.0), column(0.0, 3e38)] };
        let error = binary(BinaryOp::Multiply, &big, &column(2.0, 0.0), &mut types, vec2).unwrap_err();
        assert!(error.ends_with("cannot be represented as 'f32'"), "{error}");
        let error = binary(BinaryOp::Multiply, &column(2.0, 0.0), &big, &mut types, vec2).unwrap_err();
        assert!(error.ends_with("cannot be represented as 'f32'"), "{error}");
    }

    #[test]
    fn display() {
        let mut types = Types::new();
        let vec2 = types.vector(TypeId::I32, 2);
        let value = ConstantValue::Composite {
            ty: vec2,
            elements: vec![ConstantValue::I32(1), ConstantValue::I32(-2)],
        };
        assert_eq!(value.display(&types).to_string(), "vec2<i32>(1, -2)");
        assert_eq!(ConstantValue::I32(2147483647).display(&types).to_string(), "i32(2147483647)");
        assert_eq!(ConstantValue::F32(1.1).display(&types).to_string(), "f32(1.1)");
        assert_eq!(ConstantValue::AbstractFloat(0.1).display(&types).to_string(), "0.1");
        assert_eq!(ConstantValue::index(&value, 2), Err("index 2 out of bounds [0..1]".into()));
    }
}
