use smallvec::SmallVec;

pub(crate) type Index = SmallVec<[usize; 4]>;

/// Row-major strides for `shape`, in elements.
pub fn calculate_strides(shape: &[usize]) -> Index {
    let mut strides: Index = shape
        .iter()
        .rev()
        .scan(1, |acc, &x| {
            let res = *acc;
            *acc *= x;
            Some(res)
        })
        .collect();
    strides.reverse();
    strides
}

pub(crate) fn to_usize_dims(dims: &[i64]) -> Index {
    dims.iter().map(|&d| d as usize).collect()
}

/// Converts a row-major flat offset into a multi-dimensional index.
pub(crate) fn unravel_index(mut flat: usize, dims: &[usize]) -> Index {
    let mut index: Index = smallvec::smallvec![0; dims.len()];
    for (axis, &dim) in dims.iter().enumerate().rev() {
        if dim == 0 {
            continue;
        }
        index[axis] = flat % dim;
        flat /= dim;
    }
    index
}

pub(crate) fn ravel_index(index: &[usize], strides: &[usize]) -> usize {
    index.iter().zip(strides).map(|(i, s)| i * s).sum()
}

/// Iterates over every index of a shape in row-major order.
pub(crate) struct MultiIndex {
    dims: Index,
    current: Option<Index>,
}

impl MultiIndex {
    pub(crate) fn new(dims: &[usize]) -> Self {
        let current = if dims.contains(&0) {
            None
        } else {
            Some(smallvec::smallvec![0; dims.len()])
        };
        Self {
            dims: dims.into(),
            current,
        }
    }
}

impl Iterator for MultiIndex {
    type Item = Index;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.current.take()?;
        let mut next = current.clone();
        let mut axis = self.dims.len();
        loop {
            if axis == 0 {
                break;
            }
            axis -= 1;
            next[axis] += 1;
            if next[axis] < self.dims[axis] {
                self.current = Some(next);
                break;
            }
            next[axis] = 0;
        }
        Some(current)
    }
}
