use faer::Parallelism;
use smallvec::SmallVec;

use super::kernels::Accumulate;
use crate::utils::{calculate_strides, to_usize_dims, MultiIndex};
use crate::{ArrayData, ArrayLiteral, ConvWindow, Error, Result};

/// Row and column counts of a dot operand viewed as a matrix. Vectors are a
/// single row on the left and a single column on the right.
fn matrix_dims(dims: &[i64], left: bool) -> (usize, usize) {
    match (dims, left) {
        ([n], true) => (1, *n as usize),
        ([n], false) => (*n as usize, 1),
        ([r, c], _) => (*r as usize, *c as usize),
        _ => (1, 1),
    }
}

macro_rules! float_matmul {
    ($name:ident, $t:ty) => {
        fn $name(lhs: &[$t], rhs: &[$t], m: usize, k: usize, n: usize) -> Vec<$t> {
            let mut out = vec![0.0; m * n];
            let left = faer::mat::from_row_major_slice(lhs, m, k);
            let right = faer::mat::from_row_major_slice(rhs, k, n);
            let out_mat = faer::mat::from_row_major_slice_mut(out.as_mut_slice(), m, n);
            faer::linalg::matmul::matmul(out_mat, left, right, None, 1.0, Parallelism::None);
            out
        }
    };
}

float_matmul!(matmul_f32, f32);
float_matmul!(matmul_f64, f64);

fn matmul<T: Accumulate>(lhs: &[T], rhs: &[T], m: usize, k: usize, n: usize) -> Vec<T> {
    let mut out = vec![T::ZERO; m * n];
    for i in 0..m {
        for j in 0..n {
            out[i * n + j] = (0..k).fold(T::ZERO, |acc, p| {
                acc.acc_add(lhs[i * k + p].acc_mul(rhs[p * n + j]))
            });
        }
    }
    out
}

pub(crate) fn dot(lhs: &ArrayLiteral, rhs: &ArrayLiteral) -> Result<ArrayData> {
    let (m, k) = matrix_dims(lhs.dims(), true);
    let (_, n) = matrix_dims(rhs.dims(), false);
    let data = match (lhs.data(), rhs.data()) {
        (ArrayData::F32(a), ArrayData::F32(b)) => ArrayData::F32(matmul_f32(a, b, m, k, n)),
        (ArrayData::F64(a), ArrayData::F64(b)) => ArrayData::F64(matmul_f64(a, b, m, k, n)),
        (ArrayData::S32(a), ArrayData::S32(b)) => ArrayData::S32(matmul(a, b, m, k, n)),
        (ArrayData::S64(a), ArrayData::S64(b)) => ArrayData::S64(matmul(a, b, m, k, n)),
        (ArrayData::U32(a), ArrayData::U32(b)) => ArrayData::U32(matmul(a, b, m, k, n)),
        (ArrayData::U64(a), ArrayData::U64(b)) => ArrayData::U64(matmul(a, b, m, k, n)),
        (a, b) => {
            return Err(Error::ElementTypeMismatch {
                op: "dot",
                expected: a.element_type(),
                got: b.element_type(),
            });
        }
    };
    Ok(data)
}

struct ConvGeometry<'a> {
    lhs: SmallVec<[usize; 4]>,
    rhs: SmallVec<[usize; 4]>,
    out: SmallVec<[usize; 4]>,
    window: &'a ConvWindow,
}

fn conv_typed<T: Accumulate>(lhs: &[T], rhs: &[T], g: &ConvGeometry<'_>) -> Vec<T> {
    let spatial = g.lhs.len() - 2;
    let lhs_strides = calculate_strides(&g.lhs);
    let rhs_strides = calculate_strides(&g.rhs);
    let features = g.lhs[1];
    let kernel = &g.rhs[2..];
    let mut out = Vec::with_capacity(g.out.iter().product());
    for index in MultiIndex::new(&g.out) {
        let (batch, out_feature) = (index[0], index[1]);
        let mut acc = T::ZERO;
        for q in MultiIndex::new(kernel) {
            // input offset for this kernel tap, skipped when it lands in
            // padding or between dilated input elements
            let mut lhs_offset = batch * lhs_strides[0];
            let mut in_bounds = true;
            for axis in 0..spatial {
                let lhs_dilation = g.window.lhs_dilation[axis];
                let pos = (index[axis + 2] as i64) * g.window.strides[axis]
                    + (q[axis] as i64) * g.window.rhs_dilation[axis]
                    - g.window.padding[axis].0;
                let dilated = (g.lhs[axis + 2] as i64 - 1) * lhs_dilation;
                if pos < 0 || pos > dilated || pos % lhs_dilation != 0 {
                    in_bounds = false;
                    break;
                }
                lhs_offset += (pos / lhs_dilation) as usize * lhs_strides[axis + 2];
            }
            if !in_bounds {
                continue;
            }
            let rhs_offset: usize = out_feature * rhs_strides[0]
                + q.iter()
                    .enumerate()
                    .map(|(axis, &i)| i * rhs_strides[axis + 2])
                    .sum::<usize>();
            for c in 0..features {
                let x = lhs[lhs_offset + c * lhs_strides[1]];
                let w = rhs[rhs_offset + c * rhs_strides[1]];
                acc = acc.acc_add(x.acc_mul(w));
            }
        }
        out.push(acc);
    }
    out
}

/// Direct convolution producing `out_dims`, which shape inference has
/// already derived from the window.
pub(crate) fn conv(
    lhs: &ArrayLiteral,
    rhs: &ArrayLiteral,
    window: &ConvWindow,
    out_dims: &[i64],
) -> Result<ArrayData> {
    let g = ConvGeometry {
        lhs: to_usize_dims(lhs.dims()),
        rhs: to_usize_dims(rhs.dims()),
        out: to_usize_dims(out_dims),
        window,
    };
    let data = match (lhs.data(), rhs.data()) {
        (ArrayData::F32(a), ArrayData::F32(b)) => ArrayData::F32(conv_typed(a, b, &g)),
        (ArrayData::F64(a), ArrayData::F64(b)) => ArrayData::F64(conv_typed(a, b, &g)),
        (ArrayData::S32(a), ArrayData::S32(b)) => ArrayData::S32(conv_typed(a, b, &g)),
        (ArrayData::S64(a), ArrayData::S64(b)) => ArrayData::S64(conv_typed(a, b, &g)),
        (ArrayData::U32(a), ArrayData::U32(b)) => ArrayData::U32(conv_typed(a, b, &g)),
        (ArrayData::U64(a), ArrayData::U64(b)) => ArrayData::U64(conv_typed(a, b, &g)),
        (a, b) => {
            return Err(Error::ElementTypeMismatch {
                op: "conv",
                expected: a.element_type(),
                got: b.element_type(),
            });
        }
    };
    Ok(data)
}
