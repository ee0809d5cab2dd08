//! Host-side values: typed element storage, arrays and tuples.
use smallvec::SmallVec;
use zerocopy::IntoBytes;

use crate::utils::{calculate_strides, ravel_index, to_usize_dims, MultiIndex};
use crate::{ArrayElement, ArrayShape, Dims, ElementType, Error, Result, Shape};

/// Element storage, one variant per supported element type.
#[derive(Clone, Debug, PartialEq)]
pub enum ArrayData {
    Pred(Vec<bool>),
    S32(Vec<i32>),
    S64(Vec<i64>),
    U32(Vec<u32>),
    U64(Vec<u64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

/// Runs `$body` with `$v` bound to the typed vector inside an [`ArrayData`].
macro_rules! with_data {
    ($data:expr, $v:ident => $body:expr) => {
        match $data {
            $crate::ArrayData::Pred($v) => $body,
            $crate::ArrayData::S32($v) => $body,
            $crate::ArrayData::S64($v) => $body,
            $crate::ArrayData::U32($v) => $body,
            $crate::ArrayData::U64($v) => $body,
            $crate::ArrayData::F32($v) => $body,
            $crate::ArrayData::F64($v) => $body,
        }
    };
}

/// Like [`with_data`], but wraps the resulting vector back into the same variant.
macro_rules! map_data {
    ($data:expr, $v:ident => $body:expr) => {
        match $data {
            $crate::ArrayData::Pred($v) => $crate::ArrayData::Pred($body),
            $crate::ArrayData::S32($v) => $crate::ArrayData::S32($body),
            $crate::ArrayData::S64($v) => $crate::ArrayData::S64($body),
            $crate::ArrayData::U32($v) => $crate::ArrayData::U32($body),
            $crate::ArrayData::U64($v) => $crate::ArrayData::U64($body),
            $crate::ArrayData::F32($v) => $crate::ArrayData::F32($body),
            $crate::ArrayData::F64($v) => $crate::ArrayData::F64($body),
        }
    };
}

impl ArrayData {
    pub fn element_type(&self) -> ElementType {
        match self {
            ArrayData::Pred(_) => ElementType::Pred,
            ArrayData::S32(_) => ElementType::S32,
            ArrayData::S64(_) => ElementType::S64,
            ArrayData::U32(_) => ElementType::U32,
            ArrayData::U64(_) => ElementType::U64,
            ArrayData::F32(_) => ElementType::F32,
            ArrayData::F64(_) => ElementType::F64,
        }
    }

    pub fn len(&self) -> usize {
        with_data!(self, v => v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn with_capacity(ty: ElementType, capacity: usize) -> Self {
        match ty {
            ElementType::Pred => ArrayData::Pred(Vec::with_capacity(capacity)),
            ElementType::S32 => ArrayData::S32(Vec::with_capacity(capacity)),
            ElementType::S64 => ArrayData::S64(Vec::with_capacity(capacity)),
            ElementType::U32 => ArrayData::U32(Vec::with_capacity(capacity)),
            ElementType::U64 => ArrayData::U64(Vec::with_capacity(capacity)),
            ElementType::F32 => ArrayData::F32(Vec::with_capacity(capacity)),
            ElementType::F64 => ArrayData::F64(Vec::with_capacity(capacity)),
        }
    }

    /// Raw little-endian view of the elements.
    pub fn as_bytes(&self) -> &[u8] {
        with_data!(self, v => v.as_slice().as_bytes())
    }

    /// Picks elements by flat offset, producing a new buffer of the same type.
    pub(crate) fn gather(&self, indices: &[usize]) -> ArrayData {
        map_data!(self, v => indices.iter().map(|&i| v[i]).collect())
    }

    pub(crate) fn extend_from(&mut self, other: &ArrayData) -> Result<()> {
        match (self, other) {
            (ArrayData::Pred(a), ArrayData::Pred(b)) => a.extend_from_slice(b),
            (ArrayData::S32(a), ArrayData::S32(b)) => a.extend_from_slice(b),
            (ArrayData::S64(a), ArrayData::S64(b)) => a.extend_from_slice(b),
            (ArrayData::U32(a), ArrayData::U32(b)) => a.extend_from_slice(b),
            (ArrayData::U64(a), ArrayData::U64(b)) => a.extend_from_slice(b),
            (ArrayData::F32(a), ArrayData::F32(b)) => a.extend_from_slice(b),
            (ArrayData::F64(a), ArrayData::F64(b)) => a.extend_from_slice(b),
            (a, b) => {
                return Err(Error::LiteralTypeMismatch {
                    expected: a.element_type(),
                    got: b.element_type(),
                });
            }
        }
        Ok(())
    }

    /// Concatenates buffers of the same element type end to end.
    pub(crate) fn concat<'a>(
        ty: ElementType,
        parts: impl IntoIterator<Item = &'a ArrayData>,
    ) -> Result<ArrayData> {
        let mut out = ArrayData::with_capacity(ty, 0);
        for part in parts {
            out.extend_from(part)?;
        }
        Ok(out)
    }

    /// Numeric conversion: bools become 0/1, non-zero numbers become true,
    /// floats truncate toward zero when cast to integers.
    pub fn convert(&self, ty: ElementType) -> ArrayData {
        fn cast_vec<S: Cast<D>, D>(v: &[S]) -> Vec<D> {
            v.iter().map(|x| x.cast()).collect()
        }
        match ty {
            ElementType::Pred => ArrayData::Pred(with_data!(self, v => cast_vec(v))),
            ElementType::S32 => ArrayData::S32(with_data!(self, v => cast_vec(v))),
            ElementType::S64 => ArrayData::S64(with_data!(self, v => cast_vec(v))),
            ElementType::U32 => ArrayData::U32(with_data!(self, v => cast_vec(v))),
            ElementType::U64 => ArrayData::U64(with_data!(self, v => cast_vec(v))),
            ElementType::F32 => ArrayData::F32(with_data!(self, v => cast_vec(v))),
            ElementType::F64 => ArrayData::F64(with_data!(self, v => cast_vec(v))),
        }
    }
}

trait Cast<T>: Copy {
    fn cast(self) -> T;
}

macro_rules! impl_numeric_cast {
    (@to $src:ty; $($dst:ty),*) => {
        $(
            impl Cast<$dst> for $src {
                fn cast(self) -> $dst {
                    self as $dst
                }
            }
        )*
        impl Cast<bool> for $src {
            fn cast(self) -> bool {
                self != (0 as $src)
            }
        }
        impl Cast<$src> for bool {
            fn cast(self) -> $src {
                self as u8 as $src
            }
        }
    };
    ($($src:ty),*) => {
        $(impl_numeric_cast!(@to $src; i32, i64, u32, u64, f32, f64);)*
    };
}

impl_numeric_cast!(i32, i64, u32, u64, f32, f64);

impl Cast<bool> for bool {
    fn cast(self) -> bool {
        self
    }
}

/// A dense array stored in row-major order.
#[derive(Clone, Debug, PartialEq)]
pub struct ArrayLiteral {
    data: ArrayData,
    dims: Dims,
}

impl ArrayLiteral {
    pub fn new(data: ArrayData, dims: &[i64]) -> Result<Self> {
        if dims.iter().any(|&d| d < 0) {
            return Err(Error::NegativeDimension {
                dims: dims.to_vec(),
            });
        }
        let element_count = dims.iter().product::<i64>() as usize;
        if element_count != data.len() {
            return Err(Error::WrongElementCount {
                dims: dims.to_vec(),
                element_count: data.len(),
            });
        }
        Ok(Self {
            data,
            dims: dims.into(),
        })
    }

    pub(crate) fn from_parts(data: ArrayData, dims: Dims) -> Self {
        debug_assert_eq!(
            data.len(),
            dims.iter().product::<i64>() as usize,
            "array data does not match dims"
        );
        Self { data, dims }
    }

    pub fn data(&self) -> &ArrayData {
        &self.data
    }

    pub fn dims(&self) -> &[i64] {
        &self.dims
    }

    pub fn element_type(&self) -> ElementType {
        self.data.element_type()
    }

    pub fn element_count(&self) -> usize {
        self.data.len()
    }

    pub fn shape(&self) -> ArrayShape {
        ArrayShape::new_with_type(self.element_type(), &self.dims)
    }
}

/// A host value: either a dense array or an ordered tuple of values.
#[derive(Clone, Debug, PartialEq)]
pub enum Literal {
    Array(ArrayLiteral),
    Tuple(Vec<Literal>),
}

impl Literal {
    /// Create a scalar literal from a single value.
    pub fn scalar<T: ArrayElement>(val: T) -> Self {
        Literal::Array(ArrayLiteral::from_parts(
            T::into_data(vec![val]),
            SmallVec::new(),
        ))
    }

    /// Create a 1D vector literal from a slice.
    pub fn vector<T: ArrayElement>(vals: &[T]) -> Self {
        Literal::Array(ArrayLiteral::from_parts(
            T::into_data(vals.to_vec()),
            smallvec::smallvec![vals.len() as i64],
        ))
    }

    /// Create an N-dimensional array literal from a row-major buffer and shape.
    pub fn array<T: ArrayElement>(vals: &[T], dims: &[i64]) -> Result<Self> {
        Self::from_data(T::into_data(vals.to_vec()), dims)
    }

    /// Create an N-dimensional array literal from a column-major buffer,
    /// i.e. one where the first axis varies fastest.
    pub fn from_column_major<T: ArrayElement>(vals: &[T], dims: &[i64]) -> Result<Self> {
        if dims.iter().any(|&d| d < 0) {
            return Err(Error::NegativeDimension {
                dims: dims.to_vec(),
            });
        }
        let udims = to_usize_dims(dims);
        let element_count = udims.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d));
        if element_count != Some(vals.len()) {
            return Err(Error::WrongElementCount {
                dims: dims.to_vec(),
                element_count: vals.len(),
            });
        }
        let reversed: SmallVec<[usize; 4]> = udims.iter().rev().copied().collect();
        let mut strides = calculate_strides(&reversed);
        strides.reverse();
        let row_major = MultiIndex::new(&udims)
            .map(|index| vals[ravel_index(&index, &strides)])
            .collect();
        Self::from_data(T::into_data(row_major), dims)
    }

    pub fn from_data(data: ArrayData, dims: &[i64]) -> Result<Self> {
        Ok(Literal::Array(ArrayLiteral::new(data, dims)?))
    }

    /// Create a tuple literal.
    pub fn tuple(elems: Vec<Literal>) -> Self {
        Literal::Tuple(elems)
    }

    pub fn shape(&self) -> Shape {
        match self {
            Literal::Array(a) => Shape::Array(a.shape()),
            Literal::Tuple(elems) => Shape::Tuple(elems.iter().map(Literal::shape).collect()),
        }
    }

    /// The element type, `None` for tuples.
    pub fn element_type(&self) -> Option<ElementType> {
        match self {
            Literal::Array(a) => Some(a.element_type()),
            Literal::Tuple(_) => None,
        }
    }

    pub fn as_array(&self) -> Result<&ArrayLiteral> {
        match self {
            Literal::Array(a) => Ok(a),
            Literal::Tuple(_) => Err(Error::NotAnArray {
                op: "literal",
                got: self.shape(),
            }),
        }
    }

    pub fn dims(&self) -> Result<&[i64]> {
        Ok(self.as_array()?.dims())
    }

    /// Borrow the elements as a typed slice.
    pub fn typed_buf<T: ArrayElement>(&self) -> Result<&[T]> {
        let array = self.as_array()?;
        T::from_data(&array.data).ok_or(Error::LiteralTypeMismatch {
            expected: T::TY,
            got: array.element_type(),
        })
    }

    pub fn to_vec<T: ArrayElement>(&self) -> Result<Vec<T>> {
        Ok(self.typed_buf::<T>()?.to_vec())
    }

    pub fn get_first_element<T: ArrayElement>(&self) -> Result<T> {
        let buf = self.typed_buf::<T>()?;
        buf.first().copied().ok_or(Error::WrongElementCount {
            dims: self.dims()?.to_vec(),
            element_count: 0,
        })
    }

    /// Get the raw byte buffer.
    pub fn raw_buf(&self) -> Result<&[u8]> {
        Ok(self.as_array()?.data.as_bytes())
    }

    pub fn to_tuple(self) -> Result<Vec<Literal>> {
        match self {
            Literal::Tuple(elems) => Ok(elems),
            Literal::Array(a) => Err(Error::NotATuple {
                got: Shape::Array(a.shape()),
            }),
        }
    }

    /// Reinterprets the row-major data with new dims of the same element count.
    pub fn reshape(&self, dims: &[i64]) -> Result<Literal> {
        let array = self.as_array()?;
        Self::from_data(array.data.clone(), dims)
    }

    pub fn convert(&self, ty: ElementType) -> Result<Literal> {
        let array = self.as_array()?;
        Ok(Literal::Array(ArrayLiteral::from_parts(
            array.data.convert(ty),
            array.dims.clone(),
        )))
    }

    /// Bytes occupied by the elements, summed over tuple elements.
    pub fn size_bytes(&self) -> usize {
        match self {
            Literal::Array(a) => a.data.as_bytes().len(),
            Literal::Tuple(elems) => elems.iter().map(Literal::size_bytes).sum(),
        }
    }
}
