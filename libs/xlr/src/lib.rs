//! Build tensor computations as graphs, compile them against an argument
//! signature and execute them on the local CPU device.

mod buffer;
mod builder;
mod client;
mod computation;
mod element_type;
mod error;
mod eval;
mod executable;
mod infeed;
mod literal;
mod op;
mod shape;
mod shape_inference;
mod utils;

#[cfg(test)]
mod tests;

pub use buffer::*;
pub use builder::*;
pub use client::*;
pub use computation::*;
pub use element_type::*;
pub use error::*;
pub use executable::*;
pub use infeed::*;
pub use literal::*;
pub use op::*;
pub use shape::*;
pub use utils::calculate_strides;
