//! Convenience re-exports for common usage.
//!
//! # Usage
//!
//! ```
//! use umbral::prelude::*;
//! ```

pub use crate::autograd::Tensor;
pub use crate::error::{Result, UmbralError};
pub use crate::nn::{Block, BlockSpec, Module, NormThreshold};
