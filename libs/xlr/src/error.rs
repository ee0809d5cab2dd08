//! Provides error definitions.
use thiserror::Error;

use crate::{ElementType, Shape};

/// Broad category of an [`Error`], for callers that branch on the kind of failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// The graph being constructed is malformed.
    Build,
    /// An argument passed at execution time was rejected.
    InvalidArgument,
    /// A running computation failed.
    Execution,
    /// A host literal was malformed or accessed as the wrong type.
    Literal,
}

/// Main library error type.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("parameter number {number} is already used in computation {computation}")]
    DuplicateParameterNumber { computation: String, number: i64 },

    #[error("parameter number {number} is negative")]
    InvalidParameterNumber { number: i64 },

    #[error("parameter numbers of computation {computation} must be 0..{count}, missing {missing}")]
    ParameterNumbersNotContiguous {
        computation: String,
        count: usize,
        missing: i64,
    },

    #[error("operand {op} does not belong to builder {computation}")]
    ForeignOperand { computation: String, op: usize },

    #[error("computation {computation} has no operations")]
    EmptyComputation { computation: String },

    #[error("element type mismatch in {op}, expected: {expected}, got: {got}")]
    ElementTypeMismatch {
        op: &'static str,
        expected: ElementType,
        got: ElementType,
    },

    #[error("unsupported element type for {op}: {ty}")]
    UnsupportedElementType { op: &'static str, ty: ElementType },

    #[error("{op} requires broadcast dimensions for operands {lhs} and {rhs}")]
    BroadcastDimensionsRequired {
        op: &'static str,
        lhs: Shape,
        rhs: Shape,
    },

    #[error("invalid broadcast dimensions {broadcast_dimensions:?} for {op} of {lhs} and {rhs}")]
    InvalidBroadcastDimensions {
        op: &'static str,
        broadcast_dimensions: Vec<i64>,
        lhs: Shape,
        rhs: Shape,
    },

    #[error("incompatible shapes in {op}, expected: {expected}, got: {got}")]
    IncompatibleShapes {
        op: &'static str,
        expected: Shape,
        got: Shape,
    },

    #[error("not an array, expected an array in {op}, got: {got}")]
    NotAnArray { op: &'static str, got: Shape },

    #[error("not a tuple, got: {got}")]
    NotATuple { got: Shape },

    #[error("tuple index {index} out of range for tuple of size {size}")]
    TupleIndexOutOfRange { index: usize, size: usize },

    #[error("dimension {dimension} out of range for rank {rank} in {op}")]
    InvalidDimension {
        op: &'static str,
        dimension: i64,
        rank: usize,
    },

    #[error("invalid dimensions {dimensions:?} for rank {rank} in {op}")]
    InvalidDimensions {
        op: &'static str,
        dimensions: Vec<i64>,
        rank: usize,
    },

    #[error("unexpected number of dimensions in {op}, expected: {expected}, got: {got}")]
    UnexpectedNumberOfDims {
        op: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("wrong element count {element_count} for dims {dims:?}")]
    WrongElementCount { dims: Vec<i64>, element_count: usize },

    #[error("negative dimension size in {dims:?}")]
    NegativeDimension { dims: Vec<i64> },

    #[error("invalid slice of {shape}, start: {start:?}, limit: {limit:?}, strides: {strides:?}")]
    InvalidSlice {
        shape: Shape,
        start: Vec<i64>,
        limit: Vec<i64>,
        strides: Vec<i64>,
    },

    #[error("invalid convolution of {lhs} with {rhs}: {msg}")]
    InvalidConvolution {
        lhs: Shape,
        rhs: Shape,
        msg: &'static str,
    },

    #[error("dot is only valid for args of rank 1 or 2, lhs: {lhs}, rhs: {rhs}")]
    InvalidDot { lhs: Shape, rhs: Shape },

    #[error("computation {computation} takes {expected} parameters, got: {got}")]
    ComputationArityMismatch {
        computation: String,
        expected: usize,
        got: usize,
    },

    #[error("parameter {index} of computation {computation}, expected: {expected}, got: {got}")]
    ComputationParameterMismatch {
        computation: String,
        index: usize,
        expected: Shape,
        got: Shape,
    },

    #[error("result of computation {computation}, expected: {expected}, got: {got}")]
    ComputationResultMismatch {
        computation: String,
        expected: Shape,
        got: Shape,
    },

    #[error("invalid layout {minor_to_major:?} for rank {rank}")]
    InvalidLayout { minor_to_major: Vec<i64>, rank: usize },

    #[error("unknown element type {0}")]
    UnknownElementType(String),

    #[error("argument count mismatch, expected: {expected}, got: {got}")]
    ArgumentCountMismatch { expected: usize, got: usize },

    #[error("invalid argument shape for parameter {parameter}: expected {expected}, got {got}")]
    InvalidArgumentShape {
        parameter: usize,
        expected: Shape,
        got: Shape,
    },

    #[error("buffer has been deleted")]
    DeletedBuffer,

    #[error("buffer belongs to a different client")]
    ForeignBuffer,

    #[error("infeed value does not match, expected: {expected}, got: {got}")]
    InfeedShapeMismatch { expected: Shape, got: Shape },

    #[error("infeed channel disconnected")]
    InfeedDisconnected,

    #[error("invalid rng range [{lo}, {hi})")]
    InvalidRngRange { lo: f64, hi: f64 },

    #[error("element type mismatch, expected: {expected}, got: {got}")]
    LiteralTypeMismatch {
        expected: ElementType,
        got: ElementType,
    },
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::ArgumentCountMismatch { .. }
            | Error::InvalidArgumentShape { .. }
            | Error::DeletedBuffer
            | Error::ForeignBuffer => ErrorKind::InvalidArgument,
            Error::InfeedShapeMismatch { .. }
            | Error::InfeedDisconnected
            | Error::InvalidRngRange { .. } => ErrorKind::Execution,
            Error::WrongElementCount { .. }
            | Error::LiteralTypeMismatch { .. }
            | Error::UnknownElementType(_) => ErrorKind::Literal,
            _ => ErrorKind::Build,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
