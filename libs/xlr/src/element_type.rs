use core::fmt;
use std::str::FromStr;

use zerocopy::{Immutable, IntoBytes};

use crate::{ArrayData, Error, Literal};

/// Array element type enumeration.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ElementType {
    Pred,
    S32,
    S64,
    U32,
    U64,
    F32,
    F64,
}

impl ElementType {
    pub const ALL: [ElementType; 7] = [
        ElementType::Pred,
        ElementType::S32,
        ElementType::S64,
        ElementType::U32,
        ElementType::U64,
        ElementType::F32,
        ElementType::F64,
    ];

    /// The size for this element type in bytes.
    pub fn element_size_in_bytes(&self) -> usize {
        match self {
            Self::Pred => 1,
            Self::S32 | Self::U32 | Self::F32 => 4,
            Self::S64 | Self::U64 | Self::F64 => 8,
        }
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Self::F32 | Self::F64)
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, Self::S32 | Self::S64 | Self::U32 | Self::U64)
    }

    pub fn is_signed(&self) -> bool {
        matches!(self, Self::S32 | Self::S64 | Self::F32 | Self::F64)
    }

    /// Short name used when printing shapes, e.g. `s32` in `s32[2,3]`.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Pred => "pred",
            Self::S32 => "s32",
            Self::S64 => "s64",
            Self::U32 => "u32",
            Self::U64 => "u64",
            Self::F32 => "f32",
            Self::F64 => "f64",
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Accepts both numpy dtype names (`float32`) and shape names (`f32`).
impl FromStr for ElementType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bool" | "pred" => Ok(Self::Pred),
            "int32" | "s32" => Ok(Self::S32),
            "int64" | "s64" => Ok(Self::S64),
            "uint32" | "u32" => Ok(Self::U32),
            "uint64" | "u64" => Ok(Self::U64),
            "float32" | "f32" => Ok(Self::F32),
            "float64" | "f64" => Ok(Self::F64),
            _ => Err(Error::UnknownElementType(s.to_string())),
        }
    }
}

/// Trait for types that can be stored in arrays.
pub trait ArrayElement:
    Copy + PartialEq + fmt::Debug + IntoBytes + Immutable + Send + Sync + 'static
{
    const TY: ElementType;
    const ZERO: Self;

    fn into_data(vals: Vec<Self>) -> ArrayData;
    fn from_data(data: &ArrayData) -> Option<&[Self]>;
}

macro_rules! impl_array_element {
    ($ty:ty, $v:ident, $zero:expr) => {
        impl ArrayElement for $ty {
            const TY: ElementType = ElementType::$v;
            const ZERO: Self = $zero;

            fn into_data(vals: Vec<Self>) -> ArrayData {
                ArrayData::$v(vals)
            }

            fn from_data(data: &ArrayData) -> Option<&[Self]> {
                match data {
                    ArrayData::$v(v) => Some(v),
                    _ => None,
                }
            }
        }
    };
}

impl_array_element!(bool, Pred, false);
impl_array_element!(i32, S32, 0);
impl_array_element!(i64, S64, 0);
impl_array_element!(u32, U32, 0);
impl_array_element!(u64, U64, 0);
impl_array_element!(f32, F32, 0.0);
impl_array_element!(f64, F64, 0.0);

/// Trait for types that can be directly converted to literals.
pub trait NativeType: ArrayElement {
    /// Create a scalar literal from this value.
    fn literal(self) -> Literal {
        Literal::scalar(self)
    }

    /// Create a 1D literal from a slice.
    fn create_r1(slice: &[Self]) -> Literal {
        Literal::vector(slice)
    }
}

impl<T: ArrayElement> NativeType for T {}
