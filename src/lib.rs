//! Umbral: norm-threshold activations for equivariant 3D networks.
//!
//! Umbral provides a differentiable nonlinearity for multi-channel 3D
//! feature volumes `[batch, channel, x, y, z]` whose channels are
//! partitioned into blocks. Vector-like blocks are thresholded by their
//! Euclidean norm, shrinking the magnitude by a learned bias while
//! preserving the direction; scalar-like blocks pass through untouched.
//! Operating on norms of channel groups (rather than per channel) keeps
//! the nonlinearity compatible with rotation-equivariant feature maps.
//!
//! # Quick Start
//!
//! ```
//! use umbral::prelude::*;
//!
//! // 5 channels: a 2-channel pass-through block and a thresholded
//! // 3-vector block.
//! let spec = BlockSpec::new(vec![Block::passthrough(2), Block::thresholded(3)]);
//! let act = NormThreshold::new(spec).unwrap();
//!
//! let x = Tensor::ones(&[1, 5, 2, 2, 2]);
//! let y = act.forward(&x);
//!
//! assert_eq!(y.shape(), x.shape());
//! // One learned bias scalar for the single thresholded block.
//! assert_eq!(act.num_parameters(), 1);
//! ```
//!
//! # Modules
//!
//! - [`autograd`]: Tensor type and tape-based reverse-mode differentiation
//! - [`nn`]: The activation module, block partitioning, and initializers
//! - [`error`]: Error types
//!
//! # References
//!
//! - Weiler, M., et al. (2018). 3D steerable CNNs: Learning rotationally
//!   equivariant features in volumetric data. NeurIPS.
//! - Thomas, N., et al. (2018). Tensor field networks: Rotation- and
//!   translation-equivariant neural networks for 3D point clouds.
//!   arXiv:1802.08219.

pub mod autograd;
pub mod error;
pub mod nn;
pub mod prelude;

pub use error::{Result, UmbralError};
pub use nn::{Block, BlockSpec, Module, NormThreshold};
