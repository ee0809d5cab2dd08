use core::fmt;

use smallvec::SmallVec;

use crate::{ArrayElement, ElementType, Error, Result};

pub type Dims = SmallVec<[i64; 4]>;

/// Physical ordering of an array's axes, listed from most minor to most major.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Layout {
    minor_to_major: Dims,
}

impl Layout {
    pub fn new(minor_to_major: &[i64]) -> Self {
        Self {
            minor_to_major: minor_to_major.into(),
        }
    }

    /// The layout used for host literals: the last axis varies fastest.
    pub fn row_major(rank: usize) -> Self {
        Self {
            minor_to_major: (0..rank as i64).rev().collect(),
        }
    }

    pub fn column_major(rank: usize) -> Self {
        Self {
            minor_to_major: (0..rank as i64).collect(),
        }
    }

    pub fn minor_to_major(&self) -> &[i64] {
        &self.minor_to_major
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ArrayShape {
    ty: ElementType,
    dims: Dims,
    layout: Option<Layout>,
}

impl ArrayShape {
    /// Create a new array shape.
    pub fn new<E: ArrayElement>(dims: &[i64]) -> Self {
        Self::new_with_type(E::TY, dims)
    }

    /// Create a new array shape.
    pub fn new_with_type(ty: ElementType, dims: &[i64]) -> Self {
        Self {
            ty,
            dims: dims.into(),
            layout: None,
        }
    }

    pub fn scalar(ty: ElementType) -> Self {
        Self::new_with_type(ty, &[])
    }

    /// Attach a layout, which must be a permutation of the axes.
    pub fn with_layout(mut self, layout: Layout) -> Result<Self> {
        if !is_permutation(layout.minor_to_major(), self.rank()) {
            return Err(Error::InvalidLayout {
                minor_to_major: layout.minor_to_major().to_vec(),
                rank: self.rank(),
            });
        }
        self.layout = Some(layout);
        Ok(self)
    }

    pub fn element_type(&self) -> ElementType {
        self.ty
    }

    pub fn dims(&self) -> &[i64] {
        &self.dims
    }

    pub fn layout(&self) -> Option<&Layout> {
        self.layout.as_ref()
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    pub fn is_scalar(&self) -> bool {
        self.dims.is_empty()
    }

    pub fn element_count(&self) -> usize {
        self.dims.iter().map(|d| *d as usize).product()
    }

    /// The size of the array in bytes.
    pub fn size_bytes(&self) -> usize {
        self.element_count() * self.ty.element_size_in_bytes()
    }

    /// Same element type and dimensions; layouts are not compared.
    pub fn compatible(&self, other: &ArrayShape) -> bool {
        self.ty == other.ty && self.dims == other.dims
    }

    pub(crate) fn with_type(&self, ty: ElementType) -> Self {
        Self::new_with_type(ty, &self.dims)
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Shape {
    Tuple(Vec<Shape>),
    Array(ArrayShape),
}

impl Shape {
    /// Create a new array shape.
    pub fn array<E: ArrayElement>(dims: &[i64]) -> Self {
        Self::Array(ArrayShape::new::<E>(dims))
    }

    /// Create a new array shape.
    pub fn array_with_type(ty: ElementType, dims: &[i64]) -> Self {
        Self::Array(ArrayShape::new_with_type(ty, dims))
    }

    pub fn scalar(ty: ElementType) -> Self {
        Self::Array(ArrayShape::scalar(ty))
    }

    /// Create a new tuple shape.
    pub fn tuple(shapes: Vec<Self>) -> Self {
        Self::Tuple(shapes)
    }

    pub fn is_tuple(&self) -> bool {
        matches!(self, Self::Tuple(_))
    }

    pub fn tuple_size(&self) -> Option<usize> {
        match self {
            Self::Tuple(v) => Some(v.len()),
            Self::Array(_) => None,
        }
    }

    pub fn array_shape(&self) -> Option<&ArrayShape> {
        match self {
            Self::Array(a) => Some(a),
            Self::Tuple(_) => None,
        }
    }

    pub(crate) fn to_array(&self, op: &'static str) -> Result<&ArrayShape> {
        self.array_shape().ok_or_else(|| Error::NotAnArray {
            op,
            got: self.clone(),
        })
    }

    pub fn is_scalar_of(&self, ty: ElementType) -> bool {
        matches!(self, Self::Array(a) if a.is_scalar() && a.ty == ty)
    }

    /// Structural equality that ignores layouts.
    pub fn compatible(&self, other: &Shape) -> bool {
        match (self, other) {
            (Self::Array(a), Self::Array(b)) => a.compatible(b),
            (Self::Tuple(a), Self::Tuple(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(a, b)| a.compatible(b))
            }
            _ => false,
        }
    }

    /// The size of the shape in bytes, summing tuple elements.
    pub fn size_bytes(&self) -> usize {
        match self {
            Self::Array(a) => a.size_bytes(),
            Self::Tuple(v) => v.iter().map(Shape::size_bytes).sum(),
        }
    }
}

impl From<ArrayShape> for Shape {
    fn from(value: ArrayShape) -> Self {
        Self::Array(value)
    }
}

impl fmt::Display for ArrayShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[", self.ty)?;
        for (i, d) in self.dims.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{d}")?;
        }
        write!(f, "]")?;
        if let Some(layout) = &self.layout {
            write!(f, "{{")?;
            for (i, d) in layout.minor_to_major.iter().enumerate() {
                if i > 0 {
                    write!(f, ",")?;
                }
                write!(f, "{d}")?;
            }
            write!(f, "}}")?;
        }
        Ok(())
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Array(a) => fmt::Display::fmt(a, f),
            Self::Tuple(elems) => {
                write!(f, "(")?;
                for (i, e) in elems.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    fmt::Display::fmt(e, f)?;
                }
                write!(f, ")")
            }
        }
    }
}

pub(crate) fn is_permutation(dims: &[i64], rank: usize) -> bool {
    if dims.len() != rank {
        return false;
    }
    let mut seen: SmallVec<[bool; 8]> = smallvec::smallvec![false; rank];
    for &d in dims {
        if d < 0 || d as usize >= rank || seen[d as usize] {
            return false;
        }
        seen[d as usize] = true;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(Shape::array::<i32>(&[]).to_string(), "s32[]");
        assert_eq!(Shape::array::<f32>(&[2, 3]).to_string(), "f32[2,3]");
        let tuple = Shape::tuple(vec![
            Shape::array::<bool>(&[]),
            Shape::array::<f64>(&[4]),
        ]);
        assert_eq!(tuple.to_string(), "(pred[], f64[4])");
    }

    #[test]
    fn test_layout() {
        let shape = ArrayShape::new::<f32>(&[2, 3])
            .with_layout(Layout::column_major(2))
            .unwrap();
        assert_eq!(shape.to_string(), "f32[2,3]{0,1}");
        assert!(shape.compatible(&ArrayShape::new::<f32>(&[2, 3])));
        assert_ne!(Shape::Array(shape), Shape::array::<f32>(&[2, 3]));

        let err = ArrayShape::new::<f32>(&[2, 3])
            .with_layout(Layout::new(&[0, 0]))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidLayout { rank: 2, .. }));
    }

    #[test]
    fn test_size_bytes() {
        let shape = Shape::tuple(vec![
            Shape::array::<f64>(&[2, 2]),
            Shape::array::<i32>(&[3]),
        ]);
        assert_eq!(shape.size_bytes(), 32 + 12);
    }
}
