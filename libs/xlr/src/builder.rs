use std::collections::BTreeMap;

use tracing::debug;

use crate::computation::Parameter;
use crate::op::{BuilderId, OpKind, OpRecord};
use crate::shape_inference as infer;
use crate::{
    BinaryOp, Computation, ConvWindow, Dims, ElementType, Error, Literal, NativeType, OpId,
    Padding, Result, RngDistribution, Shape, UnaryOp, XlaOp,
};

/// Append-only construction of a [`Computation`].
///
/// Each method validates its operands, infers the result shape and returns a
/// handle to the new operation. Handles are only valid for the builder that
/// produced them.
pub struct ComputationBuilder {
    id: BuilderId,
    name: String,
    ops: Vec<OpRecord>,
    parameters: BTreeMap<i64, OpId>,
}

macro_rules! binary_ops {
    ($($name:ident => $kind:ident),* $(,)?) => {
        paste::paste! {
            $(
                pub fn $name(&mut self, lhs: XlaOp, rhs: XlaOp) -> Result<XlaOp> {
                    self.binary(BinaryOp::$kind, lhs, rhs, &[])
                }

                pub fn [<$name _with_broadcast>](
                    &mut self,
                    lhs: XlaOp,
                    rhs: XlaOp,
                    broadcast_dimensions: &[i64],
                ) -> Result<XlaOp> {
                    self.binary(BinaryOp::$kind, lhs, rhs, broadcast_dimensions)
                }
            )*
        }
    };
}

macro_rules! unary_ops {
    ($($name:ident => $kind:ident),* $(,)?) => {
        $(
            pub fn $name(&mut self, operand: XlaOp) -> Result<XlaOp> {
                self.unary(UnaryOp::$kind, operand)
            }
        )*
    };
}

impl ComputationBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: BuilderId::next(),
            name: name.into(),
            ops: Vec::new(),
            parameters: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Shape of an operation created by this builder.
    pub fn shape(&self, op: XlaOp) -> Result<&Shape> {
        self.check(op)?;
        Ok(&self.ops[op.id.0].shape)
    }

    fn check(&self, op: XlaOp) -> Result<OpId> {
        if op.builder != self.id || op.id.0 >= self.ops.len() {
            return Err(Error::ForeignOperand {
                computation: self.name.clone(),
                op: op.id.0,
            });
        }
        Ok(op.id)
    }

    fn push(&mut self, kind: OpKind, shape: Shape) -> XlaOp {
        let id = OpId(self.ops.len());
        self.ops.push(OpRecord { kind, shape });
        XlaOp {
            id,
            builder: self.id,
        }
    }

    pub fn constant(&mut self, literal: &Literal) -> Result<XlaOp> {
        let shape = literal.shape();
        Ok(self.push(OpKind::Constant(literal.clone()), shape))
    }

    pub fn constant_r0<T: NativeType>(&mut self, value: T) -> Result<XlaOp> {
        self.constant(&value.literal())
    }

    pub fn constant_r1<T: NativeType>(&mut self, values: &[T]) -> Result<XlaOp> {
        self.constant(&T::create_r1(values))
    }

    /// Declares a parameter. Without an explicit number the smallest unused
    /// number is taken.
    pub fn parameter(
        &mut self,
        shape: Shape,
        number: Option<i64>,
        name: impl Into<String>,
    ) -> Result<XlaOp> {
        let number = match number {
            Some(n) if n < 0 => return Err(Error::InvalidParameterNumber { number: n }),
            Some(n) if self.parameters.contains_key(&n) => {
                return Err(Error::DuplicateParameterNumber {
                    computation: self.name.clone(),
                    number: n,
                });
            }
            Some(n) => n,
            None => (0..)
                .find(|n| !self.parameters.contains_key(n))
                .unwrap_or_default(),
        };
        infer::declared(&shape)?;
        let op = self.push(
            OpKind::Parameter {
                number,
                name: name.into(),
            },
            shape,
        );
        self.parameters.insert(number, op.id);
        Ok(op)
    }

    /// Declares a parameter shaped like `template`; its contents are ignored.
    pub fn parameter_from_literal(
        &mut self,
        template: &Literal,
        number: Option<i64>,
    ) -> Result<XlaOp> {
        let name = format!("p{}", self.parameters.len());
        self.parameter(template.shape(), number, name)
    }

    fn binary(
        &mut self,
        op: BinaryOp,
        lhs: XlaOp,
        rhs: XlaOp,
        broadcast_dimensions: &[i64],
    ) -> Result<XlaOp> {
        let shape = infer::binary(op, self.shape(lhs)?, self.shape(rhs)?, broadcast_dimensions)?;
        Ok(self.push(
            OpKind::Binary {
                op,
                lhs: lhs.id,
                rhs: rhs.id,
                broadcast_dimensions: broadcast_dimensions.into(),
            },
            shape,
        ))
    }

    binary_ops! {
        add => Add,
        sub => Sub,
        mul => Mul,
        div => Div,
        pow => Pow,
        and => And,
        or => Or,
        max => Max,
        min => Min,
        eq => Eq,
        ne => Ne,
        gt => Gt,
        ge => Ge,
        lt => Lt,
        le => Le,
    }

    fn unary(&mut self, op: UnaryOp, operand: XlaOp) -> Result<XlaOp> {
        let shape = infer::unary(op, self.shape(operand)?)?;
        Ok(self.push(
            OpKind::Unary {
                op,
                operand: operand.id,
            },
            shape,
        ))
    }

    unary_ops! {
        not => Not,
        exp => Exp,
        log => Log,
        neg => Neg,
        floor => Floor,
        ceil => Ceil,
        abs => Abs,
        tanh => Tanh,
        sqrt => Sqrt,
        sin => Sin,
        cos => Cos,
    }

    pub fn concatenate(&mut self, operands: &[XlaOp], dimension: i64) -> Result<XlaOp> {
        let shapes = operands
            .iter()
            .map(|op| self.shape(*op))
            .collect::<Result<Vec<_>>>()?;
        let shape = infer::concatenate(&shapes, dimension)?;
        let operands = operands.iter().map(|op| op.id).collect();
        Ok(self.push(
            OpKind::Concatenate {
                operands,
                dimension: dimension as usize,
            },
            shape,
        ))
    }

    /// Reads the operand's axes in the order given by `dimensions`, then
    /// regroups the elements into `new_sizes`.
    pub fn reshape(
        &mut self,
        operand: XlaOp,
        dimensions: Option<&[i64]>,
        new_sizes: &[i64],
    ) -> Result<XlaOp> {
        let shape = infer::reshape(self.shape(operand)?, dimensions, new_sizes)?;
        let identity = dimensions
            .is_none_or(|dims| dims.iter().enumerate().all(|(i, &d)| d == i as i64));
        Ok(self.push(
            OpKind::Reshape {
                operand: operand.id,
                dimensions: dimensions.filter(|_| !identity).map(Dims::from),
            },
            shape,
        ))
    }

    /// Merges a contiguous run of axes into one.
    pub fn collapse(&mut self, operand: XlaOp, dimensions: &[i64]) -> Result<XlaOp> {
        let new_sizes = infer::collapse(self.shape(operand)?, dimensions)?;
        self.reshape(operand, None, &new_sizes)
    }

    pub fn transpose(&mut self, operand: XlaOp, permutation: &[i64]) -> Result<XlaOp> {
        let shape = infer::transpose(self.shape(operand)?, permutation)?;
        Ok(self.push(
            OpKind::Transpose {
                operand: operand.id,
                permutation: permutation.into(),
            },
            shape,
        ))
    }

    /// Reverses the order of all axes.
    pub fn trans(&mut self, operand: XlaOp) -> Result<XlaOp> {
        let rank = self.shape(operand)?.to_array("trans")?.rank() as i64;
        let permutation: Dims = (0..rank).rev().collect();
        self.transpose(operand, &permutation)
    }

    pub fn rev(&mut self, operand: XlaOp, dimensions: &[i64]) -> Result<XlaOp> {
        let shape = infer::rev(self.shape(operand)?, dimensions)?;
        Ok(self.push(
            OpKind::Rev {
                operand: operand.id,
                dimensions: dimensions.into(),
            },
            shape,
        ))
    }

    /// Prepends axes of the given sizes.
    pub fn broadcast(&mut self, operand: XlaOp, sizes: &[i64]) -> Result<XlaOp> {
        let shape = infer::broadcast(self.shape(operand)?, sizes)?;
        Ok(self.push(
            OpKind::Broadcast {
                operand: operand.id,
            },
            shape,
        ))
    }

    pub fn slice(&mut self, operand: XlaOp, start: &[i64], limit: &[i64]) -> Result<XlaOp> {
        let strides: Dims = start.iter().map(|_| 1).collect();
        self.slice_with_strides(operand, start, limit, &strides)
    }

    pub fn slice_with_strides(
        &mut self,
        operand: XlaOp,
        start: &[i64],
        limit: &[i64],
        strides: &[i64],
    ) -> Result<XlaOp> {
        let shape = infer::slice(self.shape(operand)?, start, limit, strides)?;
        Ok(self.push(
            OpKind::Slice {
                operand: operand.id,
                start: start.into(),
                strides: strides.into(),
            },
            shape,
        ))
    }

    /// Slice with a start computed at run time; starts are clamped so the
    /// slice stays in bounds.
    pub fn dynamic_slice(
        &mut self,
        operand: XlaOp,
        start_indices: XlaOp,
        sizes: &[i64],
    ) -> Result<XlaOp> {
        let shape = infer::dynamic_slice(self.shape(operand)?, self.shape(start_indices)?, sizes)?;
        Ok(self.push(
            OpKind::DynamicSlice {
                operand: operand.id,
                start_indices: start_indices.id,
            },
            shape,
        ))
    }

    pub fn dynamic_update_slice(
        &mut self,
        operand: XlaOp,
        update: XlaOp,
        start_indices: XlaOp,
    ) -> Result<XlaOp> {
        let shape = infer::dynamic_update_slice(
            self.shape(operand)?,
            self.shape(update)?,
            self.shape(start_indices)?,
        )?;
        Ok(self.push(
            OpKind::DynamicUpdateSlice {
                operand: operand.id,
                update: update.id,
                start_indices: start_indices.id,
            },
            shape,
        ))
    }

    pub fn select(&mut self, pred: XlaOp, on_true: XlaOp, on_false: XlaOp) -> Result<XlaOp> {
        let shape = infer::select(
            self.shape(pred)?,
            self.shape(on_true)?,
            self.shape(on_false)?,
        )?;
        Ok(self.push(
            OpKind::Select {
                pred: pred.id,
                on_true: on_true.id,
                on_false: on_false.id,
            },
            shape,
        ))
    }

    pub fn tuple(&mut self, elems: &[XlaOp]) -> Result<XlaOp> {
        let shapes = elems
            .iter()
            .map(|op| self.shape(*op).cloned())
            .collect::<Result<Vec<_>>>()?;
        let ids = elems.iter().map(|op| op.id).collect();
        Ok(self.push(OpKind::Tuple(ids), Shape::tuple(shapes)))
    }

    pub fn get_tuple_element(&mut self, tuple: XlaOp, index: usize) -> Result<XlaOp> {
        let shape = infer::get_tuple_element(self.shape(tuple)?, index)?;
        Ok(self.push(
            OpKind::GetTupleElement {
                operand: tuple.id,
                index,
            },
            shape,
        ))
    }

    pub fn call(&mut self, computation: &Computation, operands: &[XlaOp]) -> Result<XlaOp> {
        let shapes = operands
            .iter()
            .map(|op| self.shape(*op))
            .collect::<Result<Vec<_>>>()?;
        let shape = infer::call(computation, &shapes)?;
        Ok(self.push(
            OpKind::Call {
                computation: computation.clone(),
                operands: operands.iter().map(|op| op.id).collect(),
            },
            shape,
        ))
    }

    /// Applies a scalar computation to every element of the operands.
    /// `dimensions` must list every axis in order.
    pub fn map(
        &mut self,
        operands: &[XlaOp],
        computation: &Computation,
        dimensions: &[i64],
    ) -> Result<XlaOp> {
        let shapes = operands
            .iter()
            .map(|op| self.shape(*op))
            .collect::<Result<Vec<_>>>()?;
        let shape = infer::map(computation, &shapes, dimensions)?;
        Ok(self.push(
            OpKind::Map {
                computation: computation.clone(),
                operands: operands.iter().map(|op| op.id).collect(),
            },
            shape,
        ))
    }

    pub fn reduce(
        &mut self,
        operand: XlaOp,
        init: XlaOp,
        computation: &Computation,
        dimensions: &[i64],
    ) -> Result<XlaOp> {
        let shape = infer::reduce(
            self.shape(operand)?,
            self.shape(init)?,
            computation,
            dimensions,
        )?;
        Ok(self.push(
            OpKind::Reduce {
                operand: operand.id,
                init: init.id,
                computation: computation.clone(),
                dimensions: dimensions.into(),
            },
            shape,
        ))
    }

    pub fn while_loop(
        &mut self,
        cond: &Computation,
        body: &Computation,
        init: XlaOp,
    ) -> Result<XlaOp> {
        let shape = infer::while_loop(cond, body, self.shape(init)?)?;
        Ok(self.push(
            OpKind::While {
                cond: cond.clone(),
                body: body.clone(),
                init: init.id,
            },
            shape,
        ))
    }

    /// Yields the next value from the client's infeed channel when executed.
    pub fn infeed(&mut self, shape: Shape) -> Result<XlaOp> {
        let shape = infer::declared(&shape)?;
        Ok(self.push(OpKind::Infeed, shape))
    }

    pub fn dot(&mut self, lhs: XlaOp, rhs: XlaOp) -> Result<XlaOp> {
        let shape = infer::dot(self.shape(lhs)?, self.shape(rhs)?)?;
        Ok(self.push(
            OpKind::Dot {
                lhs: lhs.id,
                rhs: rhs.id,
            },
            shape,
        ))
    }

    pub fn conv(
        &mut self,
        lhs: XlaOp,
        rhs: XlaOp,
        strides: &[i64],
        padding: Padding,
    ) -> Result<XlaOp> {
        let l = self.shape(lhs)?.to_array("conv")?;
        let r = self.shape(rhs)?.to_array("conv")?;
        let spatial = |dims: &[i64]| -> Dims { dims.iter().skip(2).copied().collect() };
        let (input, kernel) = (spatial(l.dims()), spatial(r.dims()));
        if input.len() != strides.len()
            || kernel.len() != strides.len()
            || strides.iter().any(|&s| s <= 0)
        {
            return Err(Error::InvalidConvolution {
                lhs: Shape::Array(l.clone()),
                rhs: Shape::Array(r.clone()),
                msg: "strides must be positive with one entry per spatial dimension",
            });
        }
        let pads = infer::padding_for(padding, &input, &kernel, strides);
        let ones: Dims = strides.iter().map(|_| 1).collect();
        self.conv_with_general_padding(lhs, rhs, strides, &pads, &ones, &ones)
    }

    pub fn conv_with_general_padding(
        &mut self,
        lhs: XlaOp,
        rhs: XlaOp,
        strides: &[i64],
        padding: &[(i64, i64)],
        lhs_dilation: &[i64],
        rhs_dilation: &[i64],
    ) -> Result<XlaOp> {
        let window = ConvWindow {
            strides: strides.into(),
            padding: padding.to_vec(),
            lhs_dilation: lhs_dilation.into(),
            rhs_dilation: rhs_dilation.into(),
        };
        let shape = infer::conv(self.shape(lhs)?, self.shape(rhs)?, &window)?;
        Ok(self.push(
            OpKind::Conv {
                lhs: lhs.id,
                rhs: rhs.id,
                window,
            },
            shape,
        ))
    }

    /// Sum across replicas, which with a single replica is the identity.
    pub fn cross_replica_sum(&mut self, operand: XlaOp) -> Result<XlaOp> {
        let shape = infer::cross_replica_sum(self.shape(operand)?)?;
        Ok(self.push(OpKind::CrossReplicaSum(operand.id), shape))
    }

    pub fn convert_element_type(&mut self, operand: XlaOp, ty: ElementType) -> Result<XlaOp> {
        let shape = infer::convert(self.shape(operand)?, ty)?;
        Ok(self.push(OpKind::Convert(operand.id), shape))
    }

    pub fn rng_normal(&mut self, mu: XlaOp, sigma: XlaOp, dims: &[i64]) -> Result<XlaOp> {
        self.rng(RngDistribution::Normal, mu, sigma, dims)
    }

    /// Draws from `[lo, hi)`.
    pub fn rng_uniform(&mut self, lo: XlaOp, hi: XlaOp, dims: &[i64]) -> Result<XlaOp> {
        self.rng(RngDistribution::Uniform, lo, hi, dims)
    }

    fn rng(
        &mut self,
        distribution: RngDistribution,
        a: XlaOp,
        b: XlaOp,
        dims: &[i64],
    ) -> Result<XlaOp> {
        let shape = infer::rng(distribution, self.shape(a)?, self.shape(b)?, dims)?;
        Ok(self.push(
            OpKind::Rng {
                distribution,
                a: a.id,
                b: b.id,
            },
            shape,
        ))
    }

    /// Finalizes the graph with the most recently added operation as its root.
    pub fn build(self) -> Result<Computation> {
        let Some(last) = self.ops.len().checked_sub(1) else {
            return Err(Error::EmptyComputation {
                computation: self.name,
            });
        };
        self.finish(OpId(last))
    }

    /// Finalizes the graph with `root` as its result.
    pub fn build_with_root(self, root: XlaOp) -> Result<Computation> {
        let root = self.check(root)?;
        self.finish(root)
    }

    fn finish(self, root: OpId) -> Result<Computation> {
        let count = self.parameters.len();
        let mut parameters = Vec::with_capacity(count);
        for (expected, (&number, &op)) in self.parameters.iter().enumerate() {
            if number != expected as i64 {
                return Err(Error::ParameterNumbersNotContiguous {
                    computation: self.name,
                    count,
                    missing: expected as i64,
                });
            }
            parameters.push(Parameter {
                op,
                shape: self.ops[op.0].shape.clone(),
            });
        }
        debug!(
            name = %self.name,
            ops = self.ops.len(),
            parameters = count,
            "built computation"
        );
        Ok(Computation::new(self.name, self.ops, root, parameters))
    }
}
