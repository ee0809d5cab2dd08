//! Result-shape rules, one per opcode. Every builder call runs its rule before
//! appending a record, so a computation never holds an ill-typed operation.
use smallvec::SmallVec;

use crate::shape::is_permutation;
use crate::{
    BinaryOp, Computation, ConvWindow, Dims, ElementType, Error, Padding, Result,
    RngDistribution, Shape, UnaryOp,
};

fn check_dims(dims: &[i64]) -> Result<()> {
    if dims.iter().any(|&d| d < 0) {
        return Err(Error::NegativeDimension {
            dims: dims.to_vec(),
        });
    }
    Ok(())
}

fn check_axis(op: &'static str, dimension: i64, rank: usize) -> Result<usize> {
    if dimension < 0 || dimension as usize >= rank {
        return Err(Error::InvalidDimension {
            op,
            dimension,
            rank,
        });
    }
    Ok(dimension as usize)
}

fn check_same_type(op: &'static str, expected: ElementType, got: ElementType) -> Result<()> {
    if expected != got {
        return Err(Error::ElementTypeMismatch { op, expected, got });
    }
    Ok(())
}

fn check_type_supported(op: &'static str, ty: ElementType, supported: bool) -> Result<()> {
    if !supported {
        return Err(Error::UnsupportedElementType { op, ty });
    }
    Ok(())
}

/// Elementwise binary op. `broadcast_dimensions` maps each axis of the lower
/// rank operand onto an axis of the higher rank one; a scalar needs none.
pub(crate) fn binary(
    op: BinaryOp,
    lhs: &Shape,
    rhs: &Shape,
    broadcast_dimensions: &[i64],
) -> Result<Shape> {
    let name = op.name();
    let l = lhs.to_array(name)?;
    let r = rhs.to_array(name)?;
    check_same_type(name, l.element_type(), r.element_type())?;
    check_type_supported(name, l.element_type(), op.supports(l.element_type()))?;

    let invalid = || Error::InvalidBroadcastDimensions {
        op: name,
        broadcast_dimensions: broadcast_dimensions.to_vec(),
        lhs: lhs.clone(),
        rhs: rhs.clone(),
    };

    let out = if l.rank() == r.rank() {
        let identity = broadcast_dimensions
            .iter()
            .enumerate()
            .all(|(i, &d)| d == i as i64);
        if !broadcast_dimensions.is_empty() && (broadcast_dimensions.len() != l.rank() || !identity)
        {
            return Err(invalid());
        }
        if l.dims() != r.dims() {
            return Err(Error::IncompatibleShapes {
                op: name,
                expected: lhs.clone(),
                got: rhs.clone(),
            });
        }
        l.dims()
    } else {
        let (low, high) = if l.rank() < r.rank() { (l, r) } else { (r, l) };
        if low.rank() > 0 && broadcast_dimensions.is_empty() {
            return Err(Error::BroadcastDimensionsRequired {
                op: name,
                lhs: lhs.clone(),
                rhs: rhs.clone(),
            });
        }
        if broadcast_dimensions.len() != low.rank() {
            return Err(invalid());
        }
        let mut prev = -1;
        for (i, &d) in broadcast_dimensions.iter().enumerate() {
            if d <= prev || d as usize >= high.rank() || low.dims()[i] != high.dims()[d as usize] {
                return Err(invalid());
            }
            prev = d;
        }
        high.dims()
    };

    let ty = if op.is_comparison() {
        ElementType::Pred
    } else {
        l.element_type()
    };
    Ok(Shape::array_with_type(ty, out))
}

pub(crate) fn unary(op: UnaryOp, operand: &Shape) -> Result<Shape> {
    let a = operand.to_array(op.name())?;
    check_type_supported(op.name(), a.element_type(), op.supports(a.element_type()))?;
    Ok(Shape::Array(a.with_type(a.element_type())))
}

pub(crate) fn concatenate(operands: &[&Shape], dimension: i64) -> Result<Shape> {
    let Some(first) = operands.first() else {
        return Err(Error::UnexpectedNumberOfDims {
            op: "concatenate",
            expected: 1,
            got: 0,
        });
    };
    let first = first.to_array("concatenate")?;
    let axis = check_axis("concatenate", dimension, first.rank())?;
    let mut dims: Dims = first.dims().into();
    for shape in &operands[1..] {
        let a = shape.to_array("concatenate")?;
        check_same_type("concatenate", first.element_type(), a.element_type())?;
        let matches = a.rank() == first.rank()
            && a.dims()
                .iter()
                .zip(first.dims())
                .enumerate()
                .all(|(i, (x, y))| i == axis || x == y);
        if !matches {
            return Err(Error::IncompatibleShapes {
                op: "concatenate",
                expected: Shape::Array(first.clone()),
                got: (*shape).clone(),
            });
        }
        dims[axis] += a.dims()[axis];
    }
    Ok(Shape::array_with_type(first.element_type(), &dims))
}

/// `dimensions`, when given, is the order in which the operand's axes are read
/// before the elements are regrouped into `new_sizes`.
pub(crate) fn reshape(operand: &Shape, dimensions: Option<&[i64]>, new_sizes: &[i64]) -> Result<Shape> {
    let a = operand.to_array("reshape")?;
    if let Some(dims) = dimensions {
        if !is_permutation(dims, a.rank()) {
            return Err(Error::InvalidDimensions {
                op: "reshape",
                dimensions: dims.to_vec(),
                rank: a.rank(),
            });
        }
    }
    check_dims(new_sizes)?;
    let new_count: i64 = new_sizes.iter().product();
    if new_count as usize != a.element_count() {
        return Err(Error::IncompatibleShapes {
            op: "reshape",
            expected: operand.clone(),
            got: Shape::array_with_type(a.element_type(), new_sizes),
        });
    }
    Ok(Shape::array_with_type(a.element_type(), new_sizes))
}

/// New sizes for merging a contiguous, ascending run of axes into one.
pub(crate) fn collapse(operand: &Shape, dimensions: &[i64]) -> Result<Dims> {
    let a = operand.to_array("collapse")?;
    let invalid = || Error::InvalidDimensions {
        op: "collapse",
        dimensions: dimensions.to_vec(),
        rank: a.rank(),
    };
    let Some(&start) = dimensions.first() else {
        return Err(invalid());
    };
    let contiguous = dimensions
        .iter()
        .enumerate()
        .all(|(i, &d)| d == start + i as i64);
    if start < 0 || !contiguous || (start as usize + dimensions.len()) > a.rank() {
        return Err(invalid());
    }
    let start = start as usize;
    let end = start + dimensions.len();
    let dims = a.dims();
    let mut out: Dims = dims[..start].into();
    out.push(dims[start..end].iter().product());
    out.extend_from_slice(&dims[end..]);
    Ok(out)
}

pub(crate) fn transpose(operand: &Shape, permutation: &[i64]) -> Result<Shape> {
    let a = operand.to_array("transpose")?;
    if !is_permutation(permutation, a.rank()) {
        return Err(Error::InvalidDimensions {
            op: "transpose",
            dimensions: permutation.to_vec(),
            rank: a.rank(),
        });
    }
    let dims: Dims = permutation.iter().map(|&p| a.dims()[p as usize]).collect();
    Ok(Shape::array_with_type(a.element_type(), &dims))
}

pub(crate) fn rev(operand: &Shape, dimensions: &[i64]) -> Result<Shape> {
    let a = operand.to_array("rev")?;
    let mut seen: SmallVec<[bool; 8]> = smallvec::smallvec![false; a.rank()];
    for &d in dimensions {
        let axis = check_axis("rev", d, a.rank())?;
        if seen[axis] {
            return Err(Error::InvalidDimensions {
                op: "rev",
                dimensions: dimensions.to_vec(),
                rank: a.rank(),
            });
        }
        seen[axis] = true;
    }
    Ok(operand.clone())
}

pub(crate) fn broadcast(operand: &Shape, sizes: &[i64]) -> Result<Shape> {
    let a = operand.to_array("broadcast")?;
    check_dims(sizes)?;
    let dims: Dims = sizes.iter().chain(a.dims()).copied().collect();
    Ok(Shape::array_with_type(a.element_type(), &dims))
}

pub(crate) fn slice(operand: &Shape, start: &[i64], limit: &[i64], strides: &[i64]) -> Result<Shape> {
    let a = operand.to_array("slice")?;
    let invalid = || Error::InvalidSlice {
        shape: operand.clone(),
        start: start.to_vec(),
        limit: limit.to_vec(),
        strides: strides.to_vec(),
    };
    if start.len() != a.rank() || limit.len() != a.rank() || strides.len() != a.rank() {
        return Err(invalid());
    }
    let mut dims = Dims::new();
    for i in 0..a.rank() {
        let (s, l, st) = (start[i], limit[i], strides[i]);
        if s < 0 || l < s || l > a.dims()[i] || st <= 0 {
            return Err(invalid());
        }
        dims.push((l - s + st - 1) / st);
    }
    Ok(Shape::array_with_type(a.element_type(), &dims))
}

fn check_start_indices(op: &'static str, start: &Shape, rank: usize) -> Result<()> {
    let s = start.to_array(op)?;
    check_type_supported(op, s.element_type(), s.element_type().is_integer())?;
    if s.dims() != [rank as i64] {
        return Err(Error::IncompatibleShapes {
            op,
            expected: Shape::array_with_type(s.element_type(), &[rank as i64]),
            got: start.clone(),
        });
    }
    Ok(())
}

pub(crate) fn dynamic_slice(operand: &Shape, start: &Shape, sizes: &[i64]) -> Result<Shape> {
    let a = operand.to_array("dynamic_slice")?;
    check_start_indices("dynamic_slice", start, a.rank())?;
    let fits = sizes.len() == a.rank()
        && sizes
            .iter()
            .zip(a.dims())
            .all(|(&s, &d)| s >= 0 && s <= d);
    if !fits {
        return Err(Error::IncompatibleShapes {
            op: "dynamic_slice",
            expected: operand.clone(),
            got: Shape::array_with_type(a.element_type(), sizes),
        });
    }
    Ok(Shape::array_with_type(a.element_type(), sizes))
}

pub(crate) fn dynamic_update_slice(operand: &Shape, update: &Shape, start: &Shape) -> Result<Shape> {
    let a = operand.to_array("dynamic_update_slice")?;
    let u = update.to_array("dynamic_update_slice")?;
    check_same_type("dynamic_update_slice", a.element_type(), u.element_type())?;
    check_start_indices("dynamic_update_slice", start, a.rank())?;
    let fits = u.rank() == a.rank() && u.dims().iter().zip(a.dims()).all(|(u, d)| u <= d);
    if !fits {
        return Err(Error::IncompatibleShapes {
            op: "dynamic_update_slice",
            expected: operand.clone(),
            got: update.clone(),
        });
    }
    Ok(operand.clone())
}

pub(crate) fn select(pred: &Shape, on_true: &Shape, on_false: &Shape) -> Result<Shape> {
    let p = pred.to_array("select")?;
    let t = on_true.to_array("select")?;
    check_same_type("select", ElementType::Pred, p.element_type())?;
    for (expected, got) in [(on_true, on_false), (on_true, pred)] {
        let e = expected.to_array("select")?;
        let g = got.to_array("select")?;
        if e.dims() != g.dims() {
            return Err(Error::IncompatibleShapes {
                op: "select",
                expected: expected.clone(),
                got: got.clone(),
            });
        }
    }
    check_same_type(
        "select",
        t.element_type(),
        on_false.to_array("select")?.element_type(),
    )?;
    Ok(on_true.clone())
}

pub(crate) fn get_tuple_element(operand: &Shape, index: usize) -> Result<Shape> {
    match operand {
        Shape::Tuple(elems) => elems.get(index).cloned().ok_or(Error::TupleIndexOutOfRange {
            index,
            size: elems.len(),
        }),
        Shape::Array(_) => Err(Error::NotATuple {
            got: operand.clone(),
        }),
    }
}

fn check_parameters(computation: &Computation, operands: &[Shape]) -> Result<()> {
    let params = computation.parameter_shapes();
    if params.len() != operands.len() {
        return Err(Error::ComputationArityMismatch {
            computation: computation.name().to_string(),
            expected: params.len(),
            got: operands.len(),
        });
    }
    for (index, (expected, got)) in params.iter().zip(operands).enumerate() {
        if !expected.compatible(got) {
            return Err(Error::ComputationParameterMismatch {
                computation: computation.name().to_string(),
                index,
                expected: expected.clone(),
                got: got.clone(),
            });
        }
    }
    Ok(())
}

fn check_result(computation: &Computation, expected: &Shape) -> Result<()> {
    let got = computation.result_shape();
    if !expected.compatible(got) {
        return Err(Error::ComputationResultMismatch {
            computation: computation.name().to_string(),
            expected: expected.clone(),
            got: got.clone(),
        });
    }
    Ok(())
}

pub(crate) fn call(computation: &Computation, operands: &[&Shape]) -> Result<Shape> {
    let operands: Vec<Shape> = operands.iter().map(|s| (*s).clone()).collect();
    check_parameters(computation, &operands)?;
    Ok(computation.result_shape().clone())
}

/// Map only supports applying over every axis in order.
pub(crate) fn map(computation: &Computation, operands: &[&Shape], dimensions: &[i64]) -> Result<Shape> {
    let Some(first) = operands.first() else {
        return Err(Error::ComputationArityMismatch {
            computation: computation.name().to_string(),
            expected: computation.parameter_count(),
            got: 0,
        });
    };
    let first = first.to_array("map")?;
    let in_order = dimensions.len() == first.rank()
        && dimensions.iter().enumerate().all(|(i, &d)| d == i as i64);
    if !in_order {
        return Err(Error::InvalidDimensions {
            op: "map",
            dimensions: dimensions.to_vec(),
            rank: first.rank(),
        });
    }
    let mut scalars = Vec::with_capacity(operands.len());
    for shape in operands {
        let a = shape.to_array("map")?;
        if a.dims() != first.dims() {
            return Err(Error::IncompatibleShapes {
                op: "map",
                expected: Shape::Array(first.clone()),
                got: (*shape).clone(),
            });
        }
        scalars.push(Shape::scalar(a.element_type()));
    }
    check_parameters(computation, &scalars)?;
    let out = computation.result_shape().to_array("map")?;
    if !out.is_scalar() {
        return Err(Error::ComputationResultMismatch {
            computation: computation.name().to_string(),
            expected: Shape::scalar(out.element_type()),
            got: Shape::Array(out.clone()),
        });
    }
    Ok(Shape::array_with_type(out.element_type(), first.dims()))
}

pub(crate) fn reduce(
    operand: &Shape,
    init: &Shape,
    computation: &Computation,
    dimensions: &[i64],
) -> Result<Shape> {
    let a = operand.to_array("reduce")?;
    let i = init.to_array("reduce")?;
    if !i.is_scalar() {
        return Err(Error::IncompatibleShapes {
            op: "reduce",
            expected: Shape::scalar(a.element_type()),
            got: init.clone(),
        });
    }
    check_same_type("reduce", a.element_type(), i.element_type())?;
    let scalar = Shape::scalar(a.element_type());
    check_parameters(computation, &[scalar.clone(), scalar.clone()])?;
    check_result(computation, &scalar)?;

    let mut reduced: SmallVec<[bool; 8]> = smallvec::smallvec![false; a.rank()];
    for &d in dimensions {
        let axis = check_axis("reduce", d, a.rank())?;
        if reduced[axis] {
            return Err(Error::InvalidDimensions {
                op: "reduce",
                dimensions: dimensions.to_vec(),
                rank: a.rank(),
            });
        }
        reduced[axis] = true;
    }
    let dims: Dims = a
        .dims()
        .iter()
        .zip(&reduced)
        .filter(|(_, r)| !**r)
        .map(|(d, _)| *d)
        .collect();
    Ok(Shape::array_with_type(a.element_type(), &dims))
}

pub(crate) fn while_loop(cond: &Computation, body: &Computation, init: &Shape) -> Result<Shape> {
    check_parameters(cond, std::slice::from_ref(init))?;
    check_result(cond, &Shape::scalar(ElementType::Pred))?;
    check_parameters(body, std::slice::from_ref(init))?;
    check_result(body, init)?;
    Ok(init.clone())
}

/// Rank 1 and 2 products: vector-vector, matrix-vector, vector-matrix and
/// matrix-matrix.
pub(crate) fn dot(lhs: &Shape, rhs: &Shape) -> Result<Shape> {
    let l = lhs.to_array("dot")?;
    let r = rhs.to_array("dot")?;
    check_same_type("dot", l.element_type(), r.element_type())?;
    check_type_supported("dot", l.element_type(), l.element_type() != ElementType::Pred)?;
    let invalid = || Error::InvalidDot {
        lhs: lhs.clone(),
        rhs: rhs.clone(),
    };
    let (ld, rd) = (l.dims(), r.dims());
    let (contract_l, contract_r, out): (i64, i64, Dims) = match (ld.len(), rd.len()) {
        (1, 1) => (ld[0], rd[0], Dims::new()),
        (2, 1) => (ld[1], rd[0], smallvec::smallvec![ld[0]]),
        (1, 2) => (ld[0], rd[0], smallvec::smallvec![rd[1]]),
        (2, 2) => (ld[1], rd[0], smallvec::smallvec![ld[0], rd[1]]),
        _ => return Err(invalid()),
    };
    if contract_l != contract_r {
        return Err(invalid());
    }
    Ok(Shape::array_with_type(l.element_type(), &out))
}

/// Explicit `(low, high)` padding equivalent to a symbolic policy.
pub(crate) fn padding_for(
    padding: Padding,
    input: &[i64],
    kernel: &[i64],
    strides: &[i64],
) -> Vec<(i64, i64)> {
    match padding {
        Padding::Valid => vec![(0, 0); input.len()],
        Padding::Same => input
            .iter()
            .zip(kernel)
            .zip(strides)
            .map(|((&i, &k), &s)| {
                let out = (i + s - 1) / s;
                let total = ((out - 1) * s + k - i).max(0);
                (total / 2, total - total / 2)
            })
            .collect(),
    }
}

/// lhs is `[batch, feature, spatial..]`, rhs is `[output feature, input feature, spatial..]`,
/// the result is `[batch, output feature, spatial..]`.
pub(crate) fn conv(lhs: &Shape, rhs: &Shape, window: &ConvWindow) -> Result<Shape> {
    let l = lhs.to_array("conv")?;
    let r = rhs.to_array("conv")?;
    check_same_type("conv", l.element_type(), r.element_type())?;
    check_type_supported("conv", l.element_type(), l.element_type() != ElementType::Pred)?;
    let invalid = |msg| Error::InvalidConvolution {
        lhs: lhs.clone(),
        rhs: rhs.clone(),
        msg,
    };
    if l.rank() < 2 || l.rank() != r.rank() {
        return Err(invalid("operands must have equal rank of at least 2"));
    }
    if l.dims()[1] != r.dims()[1] {
        return Err(invalid("input feature dimensions differ"));
    }
    let spatial = l.rank() - 2;
    if window.strides.len() != spatial
        || window.padding.len() != spatial
        || window.lhs_dilation.len() != spatial
        || window.rhs_dilation.len() != spatial
    {
        return Err(invalid("window parameters must have one entry per spatial dimension"));
    }
    if window.strides.iter().any(|&s| s <= 0)
        || window.lhs_dilation.iter().any(|&d| d <= 0)
        || window.rhs_dilation.iter().any(|&d| d <= 0)
    {
        return Err(invalid("strides and dilations must be positive"));
    }
    let mut dims: Dims = smallvec::smallvec![l.dims()[0], r.dims()[0]];
    for i in 0..spatial {
        let input = l.dims()[i + 2];
        let kernel = r.dims()[i + 2];
        let (lo, hi) = window.padding[i];
        let dilated_input = if input == 0 {
            0
        } else {
            (input - 1) * window.lhs_dilation[i] + 1
        };
        let padded = dilated_input + lo + hi;
        let dilated_kernel = if kernel == 0 {
            0
        } else {
            (kernel - 1) * window.rhs_dilation[i] + 1
        };
        let out = if padded < dilated_kernel {
            0
        } else {
            (padded - dilated_kernel) / window.strides[i] + 1
        };
        dims.push(out);
    }
    Ok(Shape::array_with_type(l.element_type(), &dims))
}

pub(crate) fn cross_replica_sum(operand: &Shape) -> Result<Shape> {
    operand.to_array("cross_replica_sum")?;
    Ok(operand.clone())
}

pub(crate) fn convert(operand: &Shape, ty: ElementType) -> Result<Shape> {
    let a = operand.to_array("convert")?;
    Ok(Shape::Array(a.with_type(ty)))
}

pub(crate) fn rng(distribution: RngDistribution, a: &Shape, b: &Shape, dims: &[i64]) -> Result<Shape> {
    let op = match distribution {
        RngDistribution::Normal => "rng_normal",
        RngDistribution::Uniform => "rng_uniform",
    };
    let x = a.to_array(op)?;
    let y = b.to_array(op)?;
    check_same_type(op, x.element_type(), y.element_type())?;
    for shape in [a, b] {
        if !shape.is_scalar_of(x.element_type()) {
            return Err(Error::IncompatibleShapes {
                op,
                expected: Shape::scalar(x.element_type()),
                got: shape.clone(),
            });
        }
    }
    let supported = match distribution {
        RngDistribution::Normal => x.element_type().is_float(),
        RngDistribution::Uniform => x.element_type() != ElementType::Pred,
    };
    check_type_supported(op, x.element_type(), supported)?;
    check_dims(dims)?;
    Ok(Shape::array_with_type(x.element_type(), dims))
}

/// Validates a caller supplied shape for parameters and infeed.
pub(crate) fn declared(shape: &Shape) -> Result<Shape> {
    match shape {
        Shape::Array(a) => {
            check_dims(a.dims())?;
            Ok(shape.clone())
        }
        Shape::Tuple(elems) => {
            elems.iter().try_for_each(|e| declared(e).map(|_| ()))?;
            Ok(shape.clone())
        }
    }
}
