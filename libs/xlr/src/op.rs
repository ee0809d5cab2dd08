use std::sync::atomic::{AtomicU64, Ordering};

use crate::{Computation, Dims, ElementType, Literal, Shape};

/// Identifies the builder that created an [`XlaOp`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BuilderId(u64);

impl BuilderId {
    pub(crate) fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        BuilderId(COUNTER.fetch_add(1, Ordering::SeqCst))
    }
}

/// Position of an operation inside its computation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OpId(pub(crate) usize);

impl OpId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Handle to the result of an operation appended to a [`crate::ComputationBuilder`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct XlaOp {
    pub(crate) id: OpId,
    pub(crate) builder: BuilderId,
}

impl XlaOp {
    pub fn id(&self) -> OpId {
        self.id
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    And,
    Or,
    Max,
    Min,
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl BinaryOp {
    pub fn name(&self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
            BinaryOp::Div => "div",
            BinaryOp::Pow => "pow",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::Max => "max",
            BinaryOp::Min => "min",
            BinaryOp::Eq => "eq",
            BinaryOp::Ne => "ne",
            BinaryOp::Gt => "gt",
            BinaryOp::Ge => "ge",
            BinaryOp::Lt => "lt",
            BinaryOp::Le => "le",
        }
    }

    /// Infix symbol used by the pretty printer, if the op has one.
    pub(crate) fn symbol(&self) -> Option<&'static str> {
        Some(match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Pow | BinaryOp::Max | BinaryOp::Min => return None,
        })
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Gt | BinaryOp::Ge | BinaryOp::Lt | BinaryOp::Le
        )
    }

    pub(crate) fn supports(&self, ty: ElementType) -> bool {
        match self {
            BinaryOp::And | BinaryOp::Or => !ty.is_float(),
            _ => true,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Not,
    Exp,
    Log,
    Neg,
    Floor,
    Ceil,
    Abs,
    Tanh,
    Sqrt,
    Sin,
    Cos,
}

impl UnaryOp {
    pub fn name(&self) -> &'static str {
        match self {
            UnaryOp::Not => "not",
            UnaryOp::Exp => "exp",
            UnaryOp::Log => "log",
            UnaryOp::Neg => "neg",
            UnaryOp::Floor => "floor",
            UnaryOp::Ceil => "ceil",
            UnaryOp::Abs => "abs",
            UnaryOp::Tanh => "tanh",
            UnaryOp::Sqrt => "sqrt",
            UnaryOp::Sin => "sin",
            UnaryOp::Cos => "cos",
        }
    }

    pub(crate) fn supports(&self, ty: ElementType) -> bool {
        match self {
            UnaryOp::Not => !ty.is_float(),
            UnaryOp::Neg | UnaryOp::Abs => ty != ElementType::Pred,
            _ => ty.is_float(),
        }
    }
}

/// Symbolic padding policy for [`crate::ComputationBuilder::conv`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Padding {
    /// Output spatial size is `ceil(input / stride)`.
    Same,
    /// No padding; only windows fully inside the input are produced.
    Valid,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RngDistribution {
    Normal,
    Uniform,
}

/// Resolved window parameters of a convolution, one entry per spatial axis.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConvWindow {
    pub strides: Dims,
    pub padding: Vec<(i64, i64)>,
    pub lhs_dilation: Dims,
    pub rhs_dilation: Dims,
}

#[derive(Clone, Debug)]
pub(crate) enum OpKind {
    Parameter {
        number: i64,
        name: String,
    },
    Constant(Literal),
    Binary {
        op: BinaryOp,
        lhs: OpId,
        rhs: OpId,
        broadcast_dimensions: Dims,
    },
    Unary {
        op: UnaryOp,
        operand: OpId,
    },
    Concatenate {
        operands: Vec<OpId>,
        dimension: usize,
    },
    Reshape {
        operand: OpId,
        dimensions: Option<Dims>,
    },
    Transpose {
        operand: OpId,
        permutation: Dims,
    },
    Rev {
        operand: OpId,
        dimensions: Dims,
    },
    Broadcast {
        operand: OpId,
    },
    Slice {
        operand: OpId,
        start: Dims,
        strides: Dims,
    },
    DynamicSlice {
        operand: OpId,
        start_indices: OpId,
    },
    DynamicUpdateSlice {
        operand: OpId,
        update: OpId,
        start_indices: OpId,
    },
    Select {
        pred: OpId,
        on_true: OpId,
        on_false: OpId,
    },
    Tuple(Vec<OpId>),
    GetTupleElement {
        operand: OpId,
        index: usize,
    },
    Call {
        computation: Computation,
        operands: Vec<OpId>,
    },
    Map {
        computation: Computation,
        operands: Vec<OpId>,
    },
    Reduce {
        operand: OpId,
        init: OpId,
        computation: Computation,
        dimensions: Dims,
    },
    While {
        cond: Computation,
        body: Computation,
        init: OpId,
    },
    Infeed,
    Dot {
        lhs: OpId,
        rhs: OpId,
    },
    Conv {
        lhs: OpId,
        rhs: OpId,
        window: ConvWindow,
    },
    CrossReplicaSum(OpId),
    Convert(OpId),
    Rng {
        distribution: RngDistribution,
        a: OpId,
        b: OpId,
    },
}

impl OpKind {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            OpKind::Parameter { .. } => "parameter",
            OpKind::Constant(_) => "constant",
            OpKind::Binary { op, .. } => op.name(),
            OpKind::Unary { op, .. } => op.name(),
            OpKind::Concatenate { .. } => "concatenate",
            OpKind::Reshape { .. } => "reshape",
            OpKind::Transpose { .. } => "transpose",
            OpKind::Rev { .. } => "rev",
            OpKind::Broadcast { .. } => "broadcast",
            OpKind::Slice { .. } => "slice",
            OpKind::DynamicSlice { .. } => "dynamic_slice",
            OpKind::DynamicUpdateSlice { .. } => "dynamic_update_slice",
            OpKind::Select { .. } => "select",
            OpKind::Tuple(_) => "tuple",
            OpKind::GetTupleElement { .. } => "get_tuple_element",
            OpKind::Call { .. } => "call",
            OpKind::Map { .. } => "map",
            OpKind::Reduce { .. } => "reduce",
            OpKind::While { .. } => "while",
            OpKind::Infeed => "infeed",
            OpKind::Dot { .. } => "dot",
            OpKind::Conv { .. } => "conv",
            OpKind::CrossReplicaSum(_) => "cross_replica_sum",
            OpKind::Convert(_) => "convert",
            OpKind::Rng {
                distribution: RngDistribution::Normal,
                ..
            } => "rng_normal",
            OpKind::Rng {
                distribution: RngDistribution::Uniform,
                ..
            } => "rng_uniform",
        }
    }

    /// Operand ids in evaluation order.
    pub(crate) fn operands(&self) -> Vec<OpId> {
        match self {
            OpKind::Parameter { .. } | OpKind::Constant(_) | OpKind::Infeed => vec![],
            OpKind::Binary { lhs, rhs, .. }
            | OpKind::Dot { lhs, rhs }
            | OpKind::Conv { lhs, rhs, .. } => vec![*lhs, *rhs],
            OpKind::Unary { operand, .. }
            | OpKind::Reshape { operand, .. }
            | OpKind::Transpose { operand, .. }
            | OpKind::Rev { operand, .. }
            | OpKind::Broadcast { operand }
            | OpKind::Slice { operand, .. }
            | OpKind::GetTupleElement { operand, .. }
            | OpKind::CrossReplicaSum(operand)
            | OpKind::Convert(operand) => vec![*operand],
            OpKind::DynamicSlice {
                operand,
                start_indices,
            } => vec![*operand, *start_indices],
            OpKind::DynamicUpdateSlice {
                operand,
                update,
                start_indices,
            } => vec![*operand, *update, *start_indices],
            OpKind::Select {
                pred,
                on_true,
                on_false,
            } => vec![*pred, *on_true, *on_false],
            OpKind::Concatenate { operands, .. }
            | OpKind::Tuple(operands)
            | OpKind::Call { operands, .. }
            | OpKind::Map { operands, .. } => operands.clone(),
            OpKind::Reduce { operand, init, .. } => vec![*operand, *init],
            OpKind::While { init, .. } => vec![*init],
            OpKind::Rng { a, b, .. } => vec![*a, *b],
        }
    }

    /// Embedded computations referenced by this op.
    pub(crate) fn computations(&self) -> Vec<&Computation> {
        match self {
            OpKind::Call { computation, .. }
            | OpKind::Map { computation, .. }
            | OpKind::Reduce { computation, .. } => vec![computation],
            OpKind::While { cond, body, .. } => vec![cond, body],
            _ => vec![],
        }
    }
}

/// One entry in a computation's op arena.
#[derive(Clone, Debug)]
pub(crate) struct OpRecord {
    pub(crate) kind: OpKind,
    pub(crate) shape: Shape,
}
