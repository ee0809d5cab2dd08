//! Reference interpreter for computations. Ops run in arena order, so every
//! operand is evaluated before the op that reads it.
use std::borrow::Cow;

use smallvec::SmallVec;
use tracing::trace_span;

use crate::op::{OpKind, OpRecord};
use crate::utils::{to_usize_dims, Index, MultiIndex};
use crate::{
    ArrayData, ArrayElement, ArrayLiteral, Computation, ElementType, Error, InfeedChannel, Literal,
    OpId, Result,
};

mod index;
mod kernels;
mod linalg;
mod random;

/// Per-execution state shared by a computation and everything it calls.
pub(crate) struct EvalContext<'a> {
    pub(crate) rng: &'a mut fastrand::Rng,
    pub(crate) infeed: &'a InfeedChannel,
}

pub(crate) fn evaluate(
    computation: &Computation,
    arguments: &[&Literal],
    ctx: &mut EvalContext<'_>,
) -> Result<Literal> {
    let _span = trace_span!("evaluate", computation = computation.name()).entered();
    let mut values: Vec<Literal> = Vec::with_capacity(computation.op_count());
    for record in computation.ops() {
        let value = eval_op(computation, record, &values, arguments, ctx)?;
        values.push(value);
    }
    Ok(values.swap_remove(computation.root().index()))
}

fn array_literal(data: ArrayData, dims: &[i64]) -> Literal {
    Literal::Array(ArrayLiteral::from_parts(data, dims.into()))
}

fn operand(values: &[Literal], id: OpId) -> Result<&ArrayLiteral> {
    values[id.index()].as_array()
}

fn gather(operand: &ArrayLiteral, indices: &[usize], dims: &[i64]) -> Literal {
    array_literal(operand.data().gather(indices), dims)
}

/// Expands an operand to `out`; operands already of that size are borrowed.
fn broadcast_operand<'a>(
    operand: &'a ArrayLiteral,
    out: &[usize],
    broadcast_dimensions: &[i64],
) -> Cow<'a, ArrayData> {
    let dims = to_usize_dims(operand.dims());
    if dims.as_slice() == out {
        return Cow::Borrowed(operand.data());
    }
    let mapping: Index = broadcast_dimensions.iter().map(|&d| d as usize).collect();
    let indices = index::broadcast_in_dims(&dims, out, &mapping);
    Cow::Owned(operand.data().gather(&indices))
}

/// Start offsets clamped so a window of `sizes` stays inside `dims`.
fn clamped_starts(
    op: &'static str,
    start_indices: &ArrayLiteral,
    dims: &[i64],
    sizes: &[i64],
) -> Result<Index> {
    let starts: SmallVec<[i64; 4]> = match start_indices.data() {
        ArrayData::S32(v) => v.iter().map(|&x| i64::from(x)).collect(),
        ArrayData::S64(v) => v.iter().copied().collect(),
        ArrayData::U32(v) => v.iter().map(|&x| i64::from(x)).collect(),
        ArrayData::U64(v) => v
            .iter()
            .map(|&x| i64::try_from(x).unwrap_or(i64::MAX))
            .collect(),
        _ => {
            return Err(Error::UnsupportedElementType {
                op,
                ty: start_indices.element_type(),
            });
        }
    };
    Ok(starts
        .iter()
        .zip(dims.iter().zip(sizes))
        .map(|(&s, (&d, &size))| s.max(0).min(d - size) as usize)
        .collect())
}

fn eval_op(
    computation: &Computation,
    record: &OpRecord,
    values: &[Literal],
    arguments: &[&Literal],
    ctx: &mut EvalContext<'_>,
) -> Result<Literal> {
    let name = record.kind.name();
    let literal = match &record.kind {
        OpKind::Parameter { number, .. } => arguments
            .get(*number as usize)
            .map(|arg| (*arg).clone())
            .ok_or(Error::ArgumentCountMismatch {
                expected: computation.parameter_count(),
                got: arguments.len(),
            })?,
        OpKind::Constant(literal) => literal.clone(),
        OpKind::Binary {
            op,
            lhs,
            rhs,
            broadcast_dimensions,
        } => {
            let out_dims = record.shape.to_array(name)?.dims();
            let out = to_usize_dims(out_dims);
            let l = broadcast_operand(operand(values, *lhs)?, &out, broadcast_dimensions);
            let r = broadcast_operand(operand(values, *rhs)?, &out, broadcast_dimensions);
            array_literal(kernels::binary(*op, &l, &r)?, out_dims)
        }
        OpKind::Unary { op, operand: id } => {
            let a = operand(values, *id)?;
            array_literal(kernels::unary(*op, a.data())?, a.dims())
        }
        OpKind::Concatenate {
            operands,
            dimension,
        } => {
            let arrays = operands
                .iter()
                .map(|id| operand(values, *id))
                .collect::<Result<Vec<_>>>()?;
            let dims: Vec<Index> = arrays.iter().map(|a| to_usize_dims(a.dims())).collect();
            let dims: Vec<&[usize]> = dims.iter().map(|d| d.as_slice()).collect();
            let out = record.shape.to_array(name)?;
            let joined = ArrayData::concat(out.element_type(), arrays.iter().map(|a| a.data()))?;
            let indices = index::concatenate(&dims, *dimension);
            array_literal(joined.gather(&indices), out.dims())
        }
        OpKind::Reshape {
            operand: id,
            dimensions,
        } => {
            let a = operand(values, *id)?;
            let data = match dimensions {
                Some(permutation) => {
                    let permutation = to_usize_dims(permutation);
                    a.data()
                        .gather(&index::transpose(&to_usize_dims(a.dims()), &permutation))
                }
                None => a.data().clone(),
            };
            array_literal(data, record.shape.to_array(name)?.dims())
        }
        OpKind::Transpose {
            operand: id,
            permutation,
        } => {
            let a = operand(values, *id)?;
            let indices = index::transpose(&to_usize_dims(a.dims()), &to_usize_dims(permutation));
            gather(a, &indices, record.shape.to_array(name)?.dims())
        }
        OpKind::Rev {
            operand: id,
            dimensions,
        } => {
            let a = operand(values, *id)?;
            let indices = index::rev(&to_usize_dims(a.dims()), &to_usize_dims(dimensions));
            gather(a, &indices, a.dims())
        }
        OpKind::Broadcast { operand: id } => {
            let a = operand(values, *id)?;
            let out = record.shape.to_array(name)?;
            let count = a.element_count();
            let indices: Vec<usize> = (0..out.element_count()).map(|i| i % count).collect();
            gather(a, &indices, out.dims())
        }
        OpKind::Slice {
            operand: id,
            start,
            strides,
        } => {
            let a = operand(values, *id)?;
            let out = record.shape.to_array(name)?.dims();
            let indices = index::strided_window(
                &to_usize_dims(a.dims()),
                &to_usize_dims(out),
                &to_usize_dims(start),
                &to_usize_dims(strides),
            );
            gather(a, &indices, out)
        }
        OpKind::DynamicSlice {
            operand: id,
            start_indices,
        } => {
            let a = operand(values, *id)?;
            let out = record.shape.to_array(name)?.dims();
            let start = clamped_starts(name, operand(values, *start_indices)?, a.dims(), out)?;
            let ones: Index = smallvec::smallvec![1; out.len()];
            let indices = index::strided_window(
                &to_usize_dims(a.dims()),
                &to_usize_dims(out),
                &start,
                &ones,
            );
            gather(a, &indices, out)
        }
        OpKind::DynamicUpdateSlice {
            operand: id,
            update,
            start_indices,
        } => {
            let a = operand(values, *id)?;
            let u = operand(values, *update)?;
            let start = clamped_starts(name, operand(values, *start_indices)?, a.dims(), u.dims())?;
            let joined = ArrayData::concat(a.element_type(), [a.data(), u.data()])?;
            let indices = index::update_slice(
                &to_usize_dims(a.dims()),
                &to_usize_dims(u.dims()),
                &start,
            );
            array_literal(joined.gather(&indices), a.dims())
        }
        OpKind::Select {
            pred,
            on_true,
            on_false,
        } => {
            let p = operand(values, *pred)?;
            let mask = bool::from_data(p.data()).ok_or(Error::ElementTypeMismatch {
                op: name,
                expected: ElementType::Pred,
                got: p.element_type(),
            })?;
            let t = operand(values, *on_true)?;
            let f = operand(values, *on_false)?;
            let n = t.element_count();
            let joined = ArrayData::concat(t.element_type(), [t.data(), f.data()])?;
            let indices: Vec<usize> = mask
                .iter()
                .enumerate()
                .map(|(i, &take)| if take { i } else { n + i })
                .collect();
            array_literal(joined.gather(&indices), t.dims())
        }
        OpKind::Tuple(elems) => {
            Literal::Tuple(elems.iter().map(|id| values[id.index()].clone()).collect())
        }
        OpKind::GetTupleElement { operand: id, index } => match &values[id.index()] {
            Literal::Tuple(elems) => elems.get(*index).cloned().ok_or(Error::TupleIndexOutOfRange {
                index: *index,
                size: elems.len(),
            })?,
            array => return Err(Error::NotATuple { got: array.shape() }),
        },
        OpKind::Call {
            computation: callee,
            operands,
        } => {
            let args: Vec<&Literal> = operands.iter().map(|id| &values[id.index()]).collect();
            evaluate(callee, &args, ctx)?
        }
        OpKind::Map {
            computation: callee,
            operands,
        } => {
            let arrays = operands
                .iter()
                .map(|id| operand(values, *id))
                .collect::<Result<Vec<_>>>()?;
            let out = record.shape.to_array(name)?;
            let count = arrays.first().map_or(0, |a| a.element_count());
            let mut results = Vec::with_capacity(count);
            for i in 0..count {
                let scalars: Vec<Literal> = arrays
                    .iter()
                    .map(|a| array_literal(a.data().gather(&[i]), &[]))
                    .collect();
                let args: Vec<&Literal> = scalars.iter().collect();
                results.push(evaluate(callee, &args, ctx)?);
            }
            let parts = results
                .iter()
                .map(|r| r.as_array().map(|a| a.data()))
                .collect::<Result<Vec<_>>>()?;
            array_literal(ArrayData::concat(out.element_type(), parts)?, out.dims())
        }
        OpKind::Reduce {
            operand: id,
            init,
            computation: callee,
            dimensions,
        } => {
            let a = operand(values, *id)?;
            let init = &values[init.index()];
            let out = record.shape.to_array(name)?;
            reduce(a, init, callee, dimensions, out.dims(), ctx)?
        }
        OpKind::While { cond, body, init } => {
            let mut state = values[init.index()].clone();
            while evaluate(cond, &[&state], ctx)?.get_first_element::<bool>()? {
                state = evaluate(body, &[&state], ctx)?;
            }
            state
        }
        OpKind::Infeed => ctx.infeed.recv(&record.shape)?,
        OpKind::Dot { lhs, rhs } => {
            let data = linalg::dot(operand(values, *lhs)?, operand(values, *rhs)?)?;
            array_literal(data, record.shape.to_array(name)?.dims())
        }
        OpKind::Conv { lhs, rhs, window } => {
            let out = record.shape.to_array(name)?.dims();
            let data = linalg::conv(operand(values, *lhs)?, operand(values, *rhs)?, window, out)?;
            array_literal(data, out)
        }
        // single replica: the sum over replicas is the operand itself
        OpKind::CrossReplicaSum(id) => values[id.index()].clone(),
        OpKind::Convert(id) => {
            let ty = record.shape.to_array(name)?.element_type();
            values[id.index()].convert(ty)?
        }
        OpKind::Rng { distribution, a, b } => {
            let out = record.shape.to_array(name)?;
            let data = random::sample(
                ctx.rng,
                *distribution,
                operand(values, *a)?.data(),
                operand(values, *b)?.data(),
                out.element_count(),
            )?;
            array_literal(data, out.dims())
        }
    };
    Ok(literal)
}

/// Folds `computation` over the reduced axes of `a`, visiting the reduced
/// elements of each output position in row-major order.
fn reduce(
    a: &ArrayLiteral,
    init: &Literal,
    computation: &Computation,
    dimensions: &[i64],
    out_dims: &[i64],
    ctx: &mut EvalContext<'_>,
) -> Result<Literal> {
    let dims = to_usize_dims(a.dims());
    let strides = crate::utils::calculate_strides(&dims);
    let (reduced, kept): (Vec<usize>, Vec<usize>) =
        (0..dims.len()).partition(|axis| dimensions.contains(&(*axis as i64)));
    let reduced_sizes: Index = reduced.iter().map(|&axis| dims[axis]).collect();
    let kept_sizes: Index = kept.iter().map(|&axis| dims[axis]).collect();

    let mut results = Vec::with_capacity(kept_sizes.iter().product());
    let mut full: Index = smallvec::smallvec![0; dims.len()];
    for outer in MultiIndex::new(&kept_sizes) {
        for (&axis, &i) in kept.iter().zip(&outer) {
            full[axis] = i;
        }
        let mut acc = init.clone();
        for inner in MultiIndex::new(&reduced_sizes) {
            for (&axis, &i) in reduced.iter().zip(&inner) {
                full[axis] = i;
            }
            let flat = crate::utils::ravel_index(&full, &strides);
            let x = array_literal(a.data().gather(&[flat]), &[]);
            acc = evaluate(computation, &[&acc, &x], ctx)?;
        }
        results.push(acc);
    }
    let parts = results
        .iter()
        .map(|r| r.as_array().map(|a| a.data()))
        .collect::<Result<Vec<_>>>()?;
    let data = ArrayData::concat(a.element_type(), parts)?;
    Ok(array_literal(data, out_dims))
}
