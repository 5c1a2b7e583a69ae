//! Channel-axis block partitioning.
//!
//! A feature volume's channel axis is an ordered sequence of blocks,
//! each a contiguous run of channels sharing one representation type.
//! Scalar-like blocks pass through the activation untouched; vector-like
//! blocks are thresholded by their norm. Partitioning and reassembly are
//! pure functions of the spec and the tensor, independent of any learned
//! parameters.

use serde::{Deserialize, Serialize};

use crate::autograd::Tensor;
use crate::error::{Result, UmbralError};

/// One contiguous run of channels with a fixed representation dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Number of channels in the block
    dim: usize,
    /// Whether the block is routed through the norm threshold
    thresholded: bool,
}

impl Block {
    /// A block that passes through the activation unchanged.
    #[must_use]
    pub fn passthrough(dim: usize) -> Self {
        Self {
            dim,
            thresholded: false,
        }
    }

    /// A block thresholded by its channel-group norm.
    #[must_use]
    pub fn thresholded(dim: usize) -> Self {
        Self {
            dim,
            thresholded: true,
        }
    }

    /// Number of channels in the block.
    #[must_use]
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Whether the block is thresholded.
    #[must_use]
    pub fn is_thresholded(&self) -> bool {
        self.thresholded
    }
}

/// Ordered sequence of blocks covering a tensor's channel axis.
///
/// The sum of block dimensions must equal the channel count of every
/// tensor the spec partitions; this is checked at every [`partition`]
/// call.
///
/// [`partition`]: BlockSpec::partition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSpec {
    blocks: Vec<Block>,
}

impl BlockSpec {
    /// Create a spec from an ordered list of blocks.
    #[must_use]
    pub fn new(blocks: Vec<Block>) -> Self {
        Self { blocks }
    }

    /// The blocks, in channel order.
    #[must_use]
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Number of blocks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Whether the spec has no blocks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Total channel count covered by the spec.
    #[must_use]
    pub fn channels(&self) -> usize {
        self.blocks.iter().map(Block::dim).sum()
    }

    /// Number of thresholded blocks (one bias scalar each).
    #[must_use]
    pub fn num_thresholded(&self) -> usize {
        self.blocks.iter().filter(|b| b.is_thresholded()).count()
    }

    /// Check that every block has a positive dimension.
    ///
    /// # Errors
    ///
    /// Returns [`UmbralError::InvalidSpec`] for the first zero-dimension
    /// block.
    pub fn validate(&self) -> Result<()> {
        for (index, block) in self.blocks.iter().enumerate() {
            if block.dim() == 0 {
                return Err(UmbralError::InvalidSpec {
                    block: index,
                    dim: block.dim(),
                });
            }
        }
        Ok(())
    }

    /// Split a `[batch, channel, ...]` tensor into per-block slices, in
    /// block order.
    ///
    /// # Errors
    ///
    /// Returns [`UmbralError::ShapeMismatch`] if the tensor's channel
    /// count differs from [`channels`](BlockSpec::channels).
    pub fn partition(&self, input: &Tensor) -> Result<Vec<Tensor>> {
        if input.ndim() < 2 {
            return Err(UmbralError::shape_mismatch(
                "[batch, channel, ...] tensor",
                format!("{}D tensor", input.ndim()),
            ));
        }
        let channels = input.shape()[1];
        if channels != self.channels() {
            return Err(UmbralError::shape_mismatch(
                format!("{} channels", self.channels()),
                format!("{channels} channels"),
            ));
        }

        let mut parts = Vec::with_capacity(self.blocks.len());
        let mut offset = 0;
        for block in &self.blocks {
            parts.push(input.slice_channels(offset, block.dim()));
            offset += block.dim();
        }
        Ok(parts)
    }

    /// Reassemble per-block slices into one tensor, in block order.
    #[must_use]
    pub fn compose(parts: &[Tensor]) -> Tensor {
        Tensor::cat_channels(parts)
    }
}

impl From<Vec<Block>> for BlockSpec {
    fn from(blocks: Vec<Block>) -> Self {
        Self::new(blocks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mixed_spec() -> BlockSpec {
        BlockSpec::new(vec![
            Block::passthrough(2),
            Block::thresholded(3),
            Block::passthrough(1),
        ])
    }

    #[test]
    fn test_spec_counts() {
        let spec = mixed_spec();
        assert_eq!(spec.len(), 3);
        assert_eq!(spec.channels(), 6);
        assert_eq!(spec.num_thresholded(), 1);
    }

    #[test]
    fn test_validate_rejects_zero_dim() {
        let spec = BlockSpec::new(vec![Block::passthrough(2), Block::thresholded(0)]);
        let err = spec.validate().unwrap_err();
        assert!(matches!(err, UmbralError::InvalidSpec { block: 1, dim: 0 }));
    }

    #[test]
    fn test_validate_accepts_positive_dims() {
        assert!(mixed_spec().validate().is_ok());
        assert!(BlockSpec::new(vec![]).validate().is_ok());
    }

    #[test]
    fn test_partition_shapes() {
        let spec = mixed_spec();
        let x = Tensor::ones(&[2, 6, 2, 2, 2]);

        let parts = spec.partition(&x).unwrap();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].shape(), &[2, 2, 2, 2, 2]);
        assert_eq!(parts[1].shape(), &[2, 3, 2, 2, 2]);
        assert_eq!(parts[2].shape(), &[2, 1, 2, 2, 2]);
    }

    #[test]
    fn test_partition_compose_roundtrip() {
        let spec = mixed_spec();
        let data: Vec<f32> = (0..2 * 6 * 8).map(|i| i as f32 * 0.25 - 3.0).collect();
        let x = Tensor::new(&data, &[2, 6, 2, 2, 2]);

        let parts = spec.partition(&x).unwrap();
        let roundtrip = BlockSpec::compose(&parts);

        assert_eq!(roundtrip.shape(), x.shape());
        assert_eq!(roundtrip.data(), x.data());
    }

    #[test]
    fn test_partition_channel_mismatch() {
        let spec = mixed_spec();
        let x = Tensor::ones(&[2, 4, 2, 2, 2]);

        let err = spec.partition(&x).unwrap_err();
        assert!(matches!(err, UmbralError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_partition_rejects_1d() {
        let spec = mixed_spec();
        let x = Tensor::from_slice(&[1.0; 6]);

        let err = spec.partition(&x).unwrap_err();
        assert!(matches!(err, UmbralError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_spec_serde_roundtrip() {
        let spec = mixed_spec();
        let json = serde_json::to_string(&spec).unwrap();
        let back: BlockSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(back, spec);
    }
}
