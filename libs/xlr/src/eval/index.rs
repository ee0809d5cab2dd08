//! Structural ops as gathers: each function returns, for every output element
//! in row-major order, the flat offset of the source element it copies.
use crate::utils::{calculate_strides, ravel_index, MultiIndex};

/// `mapping[i]` is the output axis that input axis `i` lines up with.
pub(crate) fn broadcast_in_dims(input: &[usize], output: &[usize], mapping: &[usize]) -> Vec<usize> {
    let strides = calculate_strides(input);
    MultiIndex::new(output)
        .map(|index| {
            mapping
                .iter()
                .zip(&strides)
                .map(|(&axis, &stride)| index[axis] * stride)
                .sum::<usize>()
        })
        .collect()
}

/// Output axis `j` reads input axis `permutation[j]`.
pub(crate) fn transpose(input: &[usize], permutation: &[usize]) -> Vec<usize> {
    let strides = calculate_strides(input);
    let out: Vec<usize> = permutation.iter().map(|&p| input[p]).collect();
    MultiIndex::new(&out)
        .map(|index| {
            index
                .iter()
                .zip(permutation)
                .map(|(&i, &p)| i * strides[p])
                .sum::<usize>()
        })
        .collect()
}

pub(crate) fn rev(dims: &[usize], axes: &[usize]) -> Vec<usize> {
    let strides = calculate_strides(dims);
    MultiIndex::new(dims)
        .map(|mut index| {
            for &axis in axes {
                index[axis] = dims[axis] - 1 - index[axis];
            }
            ravel_index(&index, &strides)
        })
        .collect()
}

/// Window of `output` elements starting at `start` and stepping by `strides`.
pub(crate) fn strided_window(
    input: &[usize],
    output: &[usize],
    start: &[usize],
    strides: &[usize],
) -> Vec<usize> {
    let input_strides = calculate_strides(input);
    MultiIndex::new(output)
        .map(|index| {
            index
                .iter()
                .enumerate()
                .map(|(axis, &i)| (start[axis] + i * strides[axis]) * input_strides[axis])
                .sum::<usize>()
        })
        .collect()
}

/// Offsets into the operands' buffers laid end to end.
pub(crate) fn concatenate(inputs: &[&[usize]], axis: usize) -> Vec<usize> {
    let Some(first) = inputs.first() else {
        return vec![];
    };
    let mut output: Vec<usize> = first.to_vec();
    output[axis] = inputs.iter().map(|dims| dims[axis]).sum();
    // (axis offset, buffer base, strides) per input
    let mut parts = Vec::with_capacity(inputs.len());
    let (mut offset, mut base) = (0, 0);
    for dims in inputs {
        parts.push((offset, base, calculate_strides(dims)));
        offset += dims[axis];
        base += dims.iter().product::<usize>();
    }
    MultiIndex::new(&output)
        .map(|mut index| {
            let (offset, base, strides) = parts
                .iter()
                .rev()
                .find(|(offset, _, _)| index[axis] >= *offset)
                .unwrap_or(&parts[0]);
            index[axis] -= offset;
            base + ravel_index(&index, strides)
        })
        .collect()
}

/// Offsets into `operand ++ update`, where the update overwrites the region
/// starting at `start`.
pub(crate) fn update_slice(operand: &[usize], update: &[usize], start: &[usize]) -> Vec<usize> {
    let operand_strides = calculate_strides(operand);
    let update_strides = calculate_strides(update);
    let base: usize = operand.iter().product();
    MultiIndex::new(operand)
        .map(|index| {
            let inside = index
                .iter()
                .zip(start)
                .zip(update)
                .all(|((&i, &s), &u)| i >= s && i < s + u);
            if inside {
                base + index
                    .iter()
                    .zip(start)
                    .zip(&update_strides)
                    .map(|((&i, &s), &stride)| (i - s) * stride)
                    .sum::<usize>()
            } else {
                ravel_index(&index, &operand_strides)
            }
        })
        .collect()
}
