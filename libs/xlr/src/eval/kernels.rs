//! Elementwise rules per opcode and element type.
use num_traits::{Float, PrimInt, WrappingAdd, WrappingMul, WrappingNeg, WrappingSub};

use crate::{ArrayData, ArrayElement, BinaryOp, Error, Result, UnaryOp};

pub(crate) trait IntElement:
    ArrayElement + PrimInt + WrappingAdd + WrappingSub + WrappingMul + WrappingNeg
{
}

impl IntElement for i32 {}
impl IntElement for i64 {}
impl IntElement for u32 {}
impl IntElement for u64 {}

pub(crate) trait FloatElement: ArrayElement + Float {}

impl FloatElement for f32 {}
impl FloatElement for f64 {}

/// Addition and multiplication used by dot and conv accumulation.
pub(crate) trait Accumulate: ArrayElement {
    fn acc_add(self, rhs: Self) -> Self;
    fn acc_mul(self, rhs: Self) -> Self;
}

macro_rules! impl_accumulate {
    (wrapping: $($t:ty),*) => {
        $(impl Accumulate for $t {
            fn acc_add(self, rhs: Self) -> Self {
                self.wrapping_add(rhs)
            }
            fn acc_mul(self, rhs: Self) -> Self {
                self.wrapping_mul(rhs)
            }
        })*
    };
    (float: $($t:ty),*) => {
        $(impl Accumulate for $t {
            fn acc_add(self, rhs: Self) -> Self {
                self + rhs
            }
            fn acc_mul(self, rhs: Self) -> Self {
                self * rhs
            }
        })*
    };
}

impl_accumulate!(wrapping: i32, i64, u32, u64);
impl_accumulate!(float: f32, f64);

fn zip<T: Copy, U>(a: &[T], b: &[T], f: impl Fn(T, T) -> U) -> Vec<U> {
    a.iter().zip(b).map(|(&x, &y)| f(x, y)).collect()
}

/// Callers only pass comparison ops; anything else falls through to `le`.
fn compare<T: PartialOrd + Copy>(op: BinaryOp, a: &[T], b: &[T]) -> ArrayData {
    let f: fn(&T, &T) -> bool = match op {
        BinaryOp::Eq => T::eq,
        BinaryOp::Ne => T::ne,
        BinaryOp::Gt => T::gt,
        BinaryOp::Ge => T::ge,
        BinaryOp::Lt => T::lt,
        _ => T::le,
    };
    ArrayData::Pred(zip(a, b, |x, y| f(&x, &y)))
}

/// Division by zero yields all bits set, `MIN / -1` wraps to `MIN`.
fn int_div<T: IntElement>(x: T, y: T) -> T {
    match x.checked_div(&y) {
        Some(q) => q,
        None if y == T::zero() => !T::zero(),
        None => x,
    }
}

/// Negative exponents only have integral results for bases of 1 and -1.
fn int_pow<T: IntElement>(base: T, exp: T) -> T {
    if exp < T::zero() {
        return if base == T::one() {
            T::one()
        } else if base == !T::zero() {
            if exp & T::one() == T::one() {
                base
            } else {
                T::one()
            }
        } else {
            T::zero()
        };
    }
    let mut result = T::one();
    let mut base = base;
    let mut exp = exp;
    while exp > T::zero() {
        if exp & T::one() == T::one() {
            result = result.wrapping_mul(&base);
        }
        base = base.wrapping_mul(&base);
        exp = exp >> 1;
    }
    result
}

fn nan_max<T: FloatElement>(x: T, y: T) -> T {
    if x.is_nan() || y.is_nan() {
        T::nan()
    } else {
        x.max(y)
    }
}

fn nan_min<T: FloatElement>(x: T, y: T) -> T {
    if x.is_nan() || y.is_nan() {
        T::nan()
    } else {
        x.min(y)
    }
}

/// Booleans behave like single bits: add saturates to or, mul is and.
fn pred_binary(op: BinaryOp, a: &[bool], b: &[bool]) -> ArrayData {
    let f: fn(bool, bool) -> bool = match op {
        BinaryOp::Add | BinaryOp::Or | BinaryOp::Max => |x, y| x || y,
        BinaryOp::Mul | BinaryOp::And | BinaryOp::Min => |x, y| x && y,
        BinaryOp::Sub => |x, y| x && !y,
        BinaryOp::Div | BinaryOp::Pow => |x, y| x || !y,
        BinaryOp::Eq
        | BinaryOp::Ne
        | BinaryOp::Gt
        | BinaryOp::Ge
        | BinaryOp::Lt
        | BinaryOp::Le => return compare(op, a, b),
    };
    ArrayData::Pred(zip(a, b, f))
}

fn int_binary<T: IntElement>(op: BinaryOp, a: &[T], b: &[T]) -> ArrayData {
    let f: fn(T, T) -> T = match op {
        BinaryOp::Add => |x, y| x.wrapping_add(&y),
        BinaryOp::Sub => |x, y| x.wrapping_sub(&y),
        BinaryOp::Mul => |x, y| x.wrapping_mul(&y),
        BinaryOp::Div => int_div,
        BinaryOp::Pow => int_pow,
        BinaryOp::And => |x, y| x & y,
        BinaryOp::Or => |x, y| x | y,
        BinaryOp::Max => |x, y| x.max(y),
        BinaryOp::Min => |x, y| x.min(y),
        BinaryOp::Eq
        | BinaryOp::Ne
        | BinaryOp::Gt
        | BinaryOp::Ge
        | BinaryOp::Lt
        | BinaryOp::Le => return compare(op, a, b),
    };
    T::into_data(zip(a, b, f))
}

fn float_binary<T: FloatElement>(op: BinaryOp, a: &[T], b: &[T]) -> Result<ArrayData> {
    let f: fn(T, T) -> T = match op {
        BinaryOp::Add => |x, y| x + y,
        BinaryOp::Sub => |x, y| x - y,
        BinaryOp::Mul => |x, y| x * y,
        BinaryOp::Div => |x, y| x / y,
        BinaryOp::Pow => T::powf,
        BinaryOp::Max => nan_max,
        BinaryOp::Min => nan_min,
        BinaryOp::And | BinaryOp::Or => {
            return Err(Error::UnsupportedElementType {
                op: op.name(),
                ty: T::TY,
            });
        }
        BinaryOp::Eq
        | BinaryOp::Ne
        | BinaryOp::Gt
        | BinaryOp::Ge
        | BinaryOp::Lt
        | BinaryOp::Le => return Ok(compare(op, a, b)),
    };
    Ok(T::into_data(zip(a, b, f)))
}

/// Applies `op` to equally sized operands.
pub(crate) fn binary(op: BinaryOp, lhs: &ArrayData, rhs: &ArrayData) -> Result<ArrayData> {
    match (lhs, rhs) {
        (ArrayData::Pred(a), ArrayData::Pred(b)) => Ok(pred_binary(op, a, b)),
        (ArrayData::S32(a), ArrayData::S32(b)) => Ok(int_binary(op, a, b)),
        (ArrayData::S64(a), ArrayData::S64(b)) => Ok(int_binary(op, a, b)),
        (ArrayData::U32(a), ArrayData::U32(b)) => Ok(int_binary(op, a, b)),
        (ArrayData::U64(a), ArrayData::U64(b)) => Ok(int_binary(op, a, b)),
        (ArrayData::F32(a), ArrayData::F32(b)) => float_binary(op, a, b),
        (ArrayData::F64(a), ArrayData::F64(b)) => float_binary(op, a, b),
        (a, b) => Err(Error::ElementTypeMismatch {
            op: op.name(),
            expected: a.element_type(),
            got: b.element_type(),
        }),
    }
}

fn int_unary<T: IntElement>(op: UnaryOp, v: &[T]) -> Result<ArrayData> {
    let f: fn(T) -> T = match op {
        UnaryOp::Not => |x| !x,
        UnaryOp::Neg => |x| x.wrapping_neg(),
        UnaryOp::Abs => |x| if x < T::zero() { x.wrapping_neg() } else { x },
        _ => {
            return Err(Error::UnsupportedElementType {
                op: op.name(),
                ty: T::TY,
            });
        }
    };
    Ok(T::into_data(v.iter().map(|&x| f(x)).collect()))
}

fn float_unary<T: FloatElement>(op: UnaryOp, v: &[T]) -> Result<ArrayData> {
    let f: fn(T) -> T = match op {
        UnaryOp::Exp => T::exp,
        UnaryOp::Log => T::ln,
        UnaryOp::Neg => |x| -x,
        UnaryOp::Floor => T::floor,
        UnaryOp::Ceil => T::ceil,
        UnaryOp::Abs => T::abs,
        UnaryOp::Tanh => T::tanh,
        UnaryOp::Sqrt => T::sqrt,
        UnaryOp::Sin => T::sin,
        UnaryOp::Cos => T::cos,
        UnaryOp::Not => {
            return Err(Error::UnsupportedElementType {
                op: op.name(),
                ty: T::TY,
            });
        }
    };
    Ok(T::into_data(v.iter().map(|&x| f(x)).collect()))
}

pub(crate) fn unary(op: UnaryOp, data: &ArrayData) -> Result<ArrayData> {
    match data {
        ArrayData::Pred(v) if op == UnaryOp::Not => {
            Ok(ArrayData::Pred(v.iter().map(|x| !x).collect()))
        }
        ArrayData::Pred(_) => Err(Error::UnsupportedElementType {
            op: op.name(),
            ty: data.element_type(),
        }),
        ArrayData::S32(v) => int_unary(op, v),
        ArrayData::S64(v) => int_unary(op, v),
        ArrayData::U32(v) => int_unary(op, v),
        ArrayData::U64(v) => int_unary(op, v),
        ArrayData::F32(v) => float_unary(op, v),
        ArrayData::F64(v) => float_unary(op, v),
    }
}
