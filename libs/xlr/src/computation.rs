use std::fmt::{self, Write};
use std::sync::Arc;

use itertools::Itertools;

use crate::op::{OpKind, OpRecord};
use crate::{Client, Executable, Literal, OpId, Result, Shape};

#[derive(Clone, Debug)]
pub(crate) struct Parameter {
    pub(crate) op: OpId,
    pub(crate) shape: Shape,
}

#[derive(Debug)]
struct ComputationInner {
    name: String,
    ops: Vec<OpRecord>,
    root: OpId,
    /// Indexed by parameter number.
    parameters: Vec<Parameter>,
}

/// An immutable, finalized graph of operations.
///
/// Cloning is cheap and shares the underlying graph, which is how embedded
/// computations are referenced by `call`, `map`, `reduce` and `while_loop`.
#[derive(Clone)]
pub struct Computation {
    inner: Arc<ComputationInner>,
}

impl Computation {
    pub(crate) fn new(
        name: String,
        ops: Vec<OpRecord>,
        root: OpId,
        parameters: Vec<Parameter>,
    ) -> Self {
        Self {
            inner: Arc::new(ComputationInner {
                name,
                ops,
                root,
                parameters,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn result_shape(&self) -> &Shape {
        &self.inner.ops[self.inner.root.0].shape
    }

    /// Parameter shapes ordered by parameter number.
    pub fn parameter_shapes(&self) -> Vec<Shape> {
        self.inner
            .parameters
            .iter()
            .map(|p| p.shape.clone())
            .collect()
    }

    pub fn parameter_count(&self) -> usize {
        self.inner.parameters.len()
    }

    pub fn op_count(&self) -> usize {
        self.inner.ops.len()
    }

    pub fn root(&self) -> OpId {
        self.inner.root
    }

    /// Whether both handles refer to the same finalized graph.
    pub fn ptr_eq(&self, other: &Computation) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn ops(&self) -> &[OpRecord] {
        &self.inner.ops
    }

    pub(crate) fn parameters(&self) -> &[Parameter] {
        &self.inner.parameters
    }

    /// Compile against the computation's own parameter shapes.
    pub fn compile(&self, client: &Client) -> Result<Executable> {
        client.compile(self)
    }

    pub fn compile_with_shapes(&self, client: &Client, shapes: &[Shape]) -> Result<Executable> {
        client.compile_with_shapes(self, shapes)
    }

    pub fn compile_with_example_arguments(
        &self,
        client: &Client,
        arguments: &[Literal],
    ) -> Result<Executable> {
        client.compile_with_example_arguments(self, arguments)
    }

    /// Pretty prints the computation, nesting embedded computations.
    pub fn pretty_print(&self, mut writer: &mut dyn fmt::Write) -> fmt::Result {
        write!(writer, "fn {}(", self.name())?;
        for (i, p) in self.parameters().iter().enumerate() {
            if i != 0 {
                write!(writer, ", ")?;
            }
            write!(writer, "var_{}: {}", p.op.0, p.shape)?;
        }
        writeln!(writer, ") -> {} {{", self.result_shape())?;
        let mut indent_writer =
            indent_write::fmt::IndentWriter::new("  ", &mut writer as &mut dyn fmt::Write);
        for (id, record) in self.ops().iter().enumerate() {
            print_op(id, record, &mut indent_writer)?;
        }
        writeln!(indent_writer, "return var_{}", self.root().0)?;
        write!(writer, "}}")
    }
}

fn var_list(ids: &[OpId]) -> String {
    ids.iter().map(|id| format!("var_{}", id.0)).join(", ")
}

fn print_op(id: usize, record: &OpRecord, writer: &mut dyn fmt::Write) -> fmt::Result {
    write!(writer, "let var_{id} = ")?;
    match &record.kind {
        OpKind::Parameter { number, name } => {
            write!(writer, "param(num = {number}, name = {name})")?;
        }
        OpKind::Constant(_) => write!(writer, "constant()")?,
        OpKind::Binary {
            op,
            lhs,
            rhs,
            broadcast_dimensions,
        } => {
            match op.symbol() {
                Some(symbol) => write!(writer, "var_{} {} var_{}", lhs.0, symbol, rhs.0)?,
                None => write!(writer, "{}(var_{}, var_{})", op.name(), lhs.0, rhs.0)?,
            }
            if !broadcast_dimensions.is_empty() {
                write!(writer, " in {:?}", broadcast_dimensions.as_slice())?;
            }
        }
        OpKind::Unary { op, operand } => write!(writer, "{}(var_{})", op.name(), operand.0)?,
        OpKind::Concatenate {
            operands,
            dimension,
        } => write!(writer, "concat({}, dim = {dimension})", var_list(operands))?,
        OpKind::Reshape {
            operand,
            dimensions,
        } => match dimensions {
            Some(dims) => write!(
                writer,
                "reshape(var_{}, dims = {:?})",
                operand.0,
                dims.as_slice()
            )?,
            None => write!(writer, "reshape(var_{})", operand.0)?,
        },
        OpKind::Transpose {
            operand,
            permutation,
        } => write!(
            writer,
            "transpose(var_{}, {:?})",
            operand.0,
            permutation.as_slice()
        )?,
        OpKind::Rev {
            operand,
            dimensions,
        } => write!(writer, "rev(var_{}, {:?})", operand.0, dimensions.as_slice())?,
        OpKind::Broadcast { operand } => write!(writer, "broadcast(var_{})", operand.0)?,
        OpKind::Slice {
            operand,
            start,
            strides,
        } => write!(
            writer,
            "slice(var_{}, start = {:?}, strides = {:?})",
            operand.0,
            start.as_slice(),
            strides.as_slice()
        )?,
        OpKind::DynamicSlice {
            operand,
            start_indices,
        } => write!(
            writer,
            "dynamic_slice(var_{}, start = var_{})",
            operand.0, start_indices.0
        )?,
        OpKind::DynamicUpdateSlice {
            operand,
            update,
            start_indices,
        } => write!(
            writer,
            "dynamic_update_slice(var_{}, update = var_{}, start = var_{})",
            operand.0, update.0, start_indices.0
        )?,
        OpKind::Select {
            pred,
            on_true,
            on_false,
        } => write!(
            writer,
            "select(cond = var_{}, on_true = var_{}, on_false = var_{})",
            pred.0, on_true.0, on_false.0
        )?,
        OpKind::Tuple(elems) => write!(writer, "({})", var_list(elems))?,
        OpKind::GetTupleElement { operand, index } => {
            write!(writer, "var_{}.{index}", operand.0)?
        }
        OpKind::Call {
            computation,
            operands,
        } => {
            write!(writer, "call({}, fn = ", var_list(operands))?;
            computation.pretty_print(writer)?;
            write!(writer, ")")?;
        }
        OpKind::Map {
            computation,
            operands,
        } => {
            write!(writer, "map({}, fn = ", var_list(operands))?;
            computation.pretty_print(writer)?;
            write!(writer, ")")?;
        }
        OpKind::Reduce {
            operand,
            init,
            computation,
            dimensions,
        } => {
            write!(
                writer,
                "reduce(var_{}, init = var_{}, dims = {:?}, fn = ",
                operand.0,
                init.0,
                dimensions.as_slice()
            )?;
            computation.pretty_print(writer)?;
            write!(writer, ")")?;
        }
        OpKind::While { cond, body, init } => {
            write!(writer, "while(var_{}, cond = ", init.0)?;
            cond.pretty_print(writer)?;
            write!(writer, ", body = ")?;
            body.pretty_print(writer)?;
            write!(writer, ")")?;
        }
        OpKind::Infeed => write!(writer, "infeed()")?,
        OpKind::Dot { lhs, rhs } => write!(writer, "var_{} . var_{}", lhs.0, rhs.0)?,
        OpKind::Conv { lhs, rhs, window } => write!(
            writer,
            "conv(var_{}, var_{}, strides = {:?}, padding = {:?})",
            lhs.0,
            rhs.0,
            window.strides.as_slice(),
            window.padding
        )?,
        OpKind::CrossReplicaSum(operand) => {
            write!(writer, "cross_replica_sum(var_{})", operand.0)?
        }
        OpKind::Convert(operand) => write!(writer, "convert(var_{})", operand.0)?,
        OpKind::Rng { a, b, .. } => {
            write!(writer, "{}(var_{}, var_{})", record.kind.name(), a.0, b.0)?
        }
    }
    writeln!(writer, ": {}", record.shape)
}

impl fmt::Display for Computation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.pretty_print(f)
    }
}

impl fmt::Debug for Computation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computation")
            .field("name", &self.inner.name)
            .field("ops", &self.inner.ops.len())
            .field("parameters", &self.inner.parameters.len())
            .finish()
    }
}
