//! Neural network building blocks for the norm-threshold activation.
//!
//! The module is organized around the [`Module`] trait:
//!
//! - [`NormThreshold`]: the parameter-owning activation module
//! - [`Block`] / [`BlockSpec`]: channel-axis partitioning
//! - [`functional`]: the pure forward/backward operator pair
//! - [`init`]: parameter initialization helpers
//!
//! # Example
//!
//! ```ignore
//! use umbral::nn::{Block, BlockSpec, Module, NormThreshold};
//! use umbral::autograd::Tensor;
//!
//! let spec = BlockSpec::new(vec![Block::thresholded(3), Block::passthrough(1)]);
//! let act = NormThreshold::new(spec)?;
//!
//! let x = Tensor::ones(&[8, 4, 16, 16, 16]);
//! let y = act.forward(&x); // same shape, 3-vector block thresholded
//! ```

mod block;
pub mod functional;
pub mod init;
mod module;
mod threshold;

pub use block::{Block, BlockSpec};
pub use functional::{ThresholdContext, ThresholdOp};
pub use module::Module;
pub use threshold::NormThreshold;
