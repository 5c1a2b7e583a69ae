//! Norm-threshold activation module.
//!
//! Owns one learned bias scalar per thresholded block and routes each
//! block of the channel axis through the norm-threshold rule (or
//! through untouched, for scalar-like blocks).

use std::sync::Arc;

use crate::autograd::{is_grad_enabled, with_graph, GradFn, Tensor};
use crate::error::{Result, UmbralError};
use crate::nn::functional::{norm_threshold, norm_threshold_backward, ThresholdContext};
use crate::nn::init::constant;
use crate::nn::module::Module;
use crate::nn::BlockSpec;

/// Initial value for every bias entry.
const BIAS_INIT: f32 = 0.1;

/// Norm-threshold activation over a block-partitioned channel axis.
///
/// Input is a 5-D feature volume `[batch, channel, x, y, z]` whose
/// channel count equals the block spec's total. Thresholded blocks are
/// shrunk by their Euclidean norm with a learned per-block bias;
/// pass-through blocks are returned bit-identical.
///
/// # Example
///
/// ```ignore
/// use umbral::nn::{Block, BlockSpec, Module, NormThreshold};
/// use umbral::autograd::Tensor;
///
/// let spec = BlockSpec::new(vec![Block::passthrough(1), Block::thresholded(3)]);
/// let act = NormThreshold::new(spec)?;
///
/// let x = Tensor::ones(&[4, 4, 8, 8, 8]);
/// let y = act.forward(&x); // channel 0 untouched, channels 1..4 thresholded
/// ```
#[derive(Debug)]
pub struct NormThreshold {
    /// Ordered channel-axis partition
    spec: BlockSpec,

    /// One learned scalar per thresholded block, or None when the spec
    /// has no thresholded blocks
    bias: Option<Tensor>,
}

impl NormThreshold {
    /// Create the activation for a block spec.
    ///
    /// Allocates a bias of length [`BlockSpec::num_thresholded`]
    /// initialized to 0.1, or no bias at all when no block is
    /// thresholded.
    ///
    /// # Errors
    ///
    /// Returns [`UmbralError::InvalidSpec`] if any block dimension is
    /// zero.
    pub fn new(spec: BlockSpec) -> Result<Self> {
        spec.validate()?;

        let n = spec.num_thresholded();
        let bias = (n > 0).then(|| constant(&[n], BIAS_INIT).requires_grad());

        Ok(Self { spec, bias })
    }

    /// Reset every bias entry to its initial value (0.1).
    pub fn reset_parameters(&mut self) {
        if let Some(bias) = &mut self.bias {
            for b in bias.data_mut() {
                *b = BIAS_INIT;
            }
        }
    }

    /// The block spec this activation was built for.
    #[must_use]
    pub fn spec(&self) -> &BlockSpec {
        &self.spec
    }

    /// The bias tensor, if any block is thresholded.
    #[must_use]
    pub fn bias(&self) -> Option<&Tensor> {
        self.bias.as_ref()
    }

    /// Replace the bias tensor from external data.
    ///
    /// Used for loading trained parameters.
    ///
    /// # Errors
    ///
    /// Returns [`UmbralError::ShapeMismatch`] if the length differs from
    /// the number of thresholded blocks.
    pub fn set_bias(&mut self, bias: Tensor) -> Result<()> {
        let expected = self.spec.num_thresholded();
        if bias.numel() != expected {
            return Err(UmbralError::shape_mismatch(
                format!("bias of length {expected}"),
                format!("length {}", bias.numel()),
            ));
        }
        self.bias = (expected > 0).then_some(bias);
        Ok(())
    }

    /// Apply the activation, surfacing shape errors as values.
    ///
    /// Partitions the channel axis per the spec, routes thresholded
    /// blocks through the norm-threshold rule with the matching bias
    /// entry, and reassembles in original block order. The bias walk
    /// must consume exactly the bias length; anything else is a
    /// configuration mismatch between the activation and its caller.
    ///
    /// # Errors
    ///
    /// Returns [`UmbralError::ShapeMismatch`] if the input is not 5-D or
    /// its channel count doesn't match the spec.
    pub fn try_forward(&self, input: &Tensor) -> Result<Tensor> {
        let Some(bias) = &self.bias else {
            // No thresholded blocks: the activation is the identity.
            return Ok(input.clone());
        };

        if input.ndim() != 5 {
            return Err(UmbralError::shape_mismatch(
                "5-D [batch, channel, x, y, z] tensor",
                format!("{}D tensor", input.ndim()),
            ));
        }

        let parts = self.spec.partition(input)?;

        let mut outputs = Vec::with_capacity(parts.len());
        let mut bias_offset = 0;

        for (block, slice) in self.spec.blocks().iter().zip(parts) {
            let part = if block.is_thresholded() {
                let out = self.threshold_block(&slice, bias, bias_offset);
                bias_offset += 1;
                out
            } else {
                slice
            };
            outputs.push(part);
        }

        if bias_offset != bias.numel() {
            return Err(UmbralError::shape_mismatch(
                format!("{} bias entries", bias.numel()),
                format!("{bias_offset} consumed"),
            ));
        }

        Ok(BlockSpec::compose(&outputs))
    }

    /// Threshold one block's slice and record the backward rule.
    ///
    /// The per-invocation context captured here is owned by the recorded
    /// gradient function; concurrent forward passes (on other threads,
    /// with their own tapes) never share it.
    fn threshold_block(&self, slice: &Tensor, bias: &Tensor, bias_index: usize) -> Tensor {
        let bias_value = bias.data()[bias_index];
        let (mut out, context) = norm_threshold(slice, bias_value);

        if is_grad_enabled() && (slice.requires_grad_enabled() || bias.requires_grad_enabled()) {
            out.requires_grad_(true);
            let grad_fn = Arc::new(NormThresholdBackward {
                context,
                bias_index,
                bias_len: bias.numel(),
            });
            out.set_grad_fn(grad_fn.clone());

            with_graph(|graph| {
                graph.register_tensor(slice.clone());
                graph.register_tensor(bias.clone());
                graph.record(out.id(), grad_fn, vec![slice.id(), bias.id()]);
            });
        }

        out
    }
}

impl Module for NormThreshold {
    /// Apply the activation.
    ///
    /// # Panics
    ///
    /// Panics on a shape mismatch between the input and the block spec;
    /// use [`NormThreshold::try_forward`] to handle the error as a
    /// value.
    fn forward(&self, input: &Tensor) -> Tensor {
        match self.try_forward(input) {
            Ok(out) => out,
            Err(err) => panic!("norm threshold forward failed: {err}"),
        }
    }

    fn parameters(&self) -> Vec<&Tensor> {
        self.bias.as_ref().into_iter().collect()
    }

    fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        self.bias.as_mut().into_iter().collect()
    }
}

/// Backward rule for one thresholded block.
///
/// The input gradient flows back to the block's slice; the bias
/// gradient is scattered into a bias-shaped tensor at this block's
/// index, so tape accumulation across blocks (and across repeated
/// backward calls) is plain addition into the same parameter storage.
struct NormThresholdBackward {
    context: ThresholdContext,
    bias_index: usize,
    bias_len: usize,
}

impl GradFn for NormThresholdBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        let (grad_x, grad_b) = norm_threshold_backward(&self.context, grad_output);

        let mut bias_grad = vec![0.0; self.bias_len];
        bias_grad[self.bias_index] = grad_b;

        vec![grad_x, Tensor::new(&bias_grad, &[self.bias_len])]
    }

    fn name(&self) -> &'static str {
        "NormThresholdBackward"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autograd::{clear_graph, get_grad};
    use crate::nn::init::uniform;
    use crate::nn::Block;

    fn mixed_spec() -> BlockSpec {
        BlockSpec::new(vec![
            Block::passthrough(2),
            Block::thresholded(3),
            Block::passthrough(1),
        ])
    }

    #[test]
    fn test_construction_allocates_bias() {
        let act = NormThreshold::new(mixed_spec()).unwrap();

        let bias = act.bias().expect("one thresholded block");
        assert_eq!(bias.shape(), &[1]);
        assert!((bias.data()[0] - 0.1).abs() < 1e-7);
        assert!(bias.requires_grad_enabled());
        assert_eq!(act.num_parameters(), 1);
    }

    #[test]
    fn test_construction_without_thresholded_blocks() {
        let spec = BlockSpec::new(vec![Block::passthrough(2), Block::passthrough(4)]);
        let act = NormThreshold::new(spec).unwrap();

        assert!(act.bias().is_none());
        assert!(act.parameters().is_empty());
        assert_eq!(act.num_parameters(), 0);
    }

    #[test]
    fn test_construction_rejects_zero_dim() {
        let spec = BlockSpec::new(vec![Block::thresholded(0)]);
        let err = NormThreshold::new(spec).unwrap_err();
        assert!(matches!(err, UmbralError::InvalidSpec { block: 0, dim: 0 }));
    }

    #[test]
    fn test_identity_when_nothing_thresholded() {
        let spec = BlockSpec::new(vec![Block::passthrough(2), Block::passthrough(1)]);
        let act = NormThreshold::new(spec).unwrap();

        // Works for any rank: the identity path never slices.
        let x = uniform(&[2, 3, 2, 2, 2], -1.0, 1.0, Some(3));
        let y = act.forward(&x);

        assert_eq!(y.shape(), x.shape());
        assert_eq!(y.data(), x.data());
    }

    #[test]
    fn test_passthrough_blocks_bit_identical() {
        let act = NormThreshold::new(mixed_spec()).unwrap();
        let x = uniform(&[2, 6, 2, 2, 2], -2.0, 2.0, Some(7));

        let y = act.forward(&x);
        assert_eq!(y.shape(), x.shape());

        let spatial = 8;
        let channels = 6;
        for n in 0..2 {
            for c in [0, 1, 5] {
                let base = (n * channels + c) * spatial;
                assert_eq!(
                    &y.data()[base..base + spatial],
                    &x.data()[base..base + spatial],
                    "pass-through channel {c} must be bit-identical"
                );
            }
        }
    }

    #[test]
    fn test_thresholded_block_matches_functional() {
        let act = NormThreshold::new(mixed_spec()).unwrap();
        let x = uniform(&[2, 6, 2, 2, 2], -2.0, 2.0, Some(7));

        let y = act.forward(&x);

        let slice = x.slice_channels(2, 3);
        let (expected, _) = norm_threshold(&slice, 0.1);
        let actual = y.slice_channels(2, 3);
        assert_eq!(actual.data(), expected.data());
    }

    #[test]
    fn test_channel_mismatch_is_error() {
        let act = NormThreshold::new(mixed_spec()).unwrap();
        let x = Tensor::ones(&[2, 4, 2, 2, 2]);

        let err = act.try_forward(&x).unwrap_err();
        assert!(matches!(err, UmbralError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_non_5d_input_is_error() {
        let act = NormThreshold::new(mixed_spec()).unwrap();
        let x = Tensor::ones(&[2, 6, 4]);

        let err = act.try_forward(&x).unwrap_err();
        assert!(matches!(err, UmbralError::ShapeMismatch { .. }));
    }

    #[test]
    #[should_panic(expected = "norm threshold forward failed")]
    fn test_module_forward_panics_on_mismatch() {
        let act = NormThreshold::new(mixed_spec()).unwrap();
        let x = Tensor::ones(&[2, 4, 2, 2, 2]);
        let _ = act.forward(&x);
    }

    #[test]
    fn test_not_idempotent() {
        let act = NormThreshold::new(BlockSpec::new(vec![Block::thresholded(3)])).unwrap();
        let x = uniform(&[1, 3, 2, 2, 2], 0.5, 1.5, Some(11));

        let once = act.forward(&x);
        let twice = act.forward(&once);

        // Each application shrinks the norm again; the results differ.
        let diff: f32 = once
            .data()
            .iter()
            .zip(twice.data().iter())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f32::max);
        assert!(diff > 1e-4, "applying twice must differ from applying once");
    }

    #[test]
    fn test_reset_parameters() {
        let mut act = NormThreshold::new(mixed_spec()).unwrap();

        act.parameters_mut()[0].data_mut()[0] = 0.9;
        act.reset_parameters();

        assert!((act.bias().unwrap().data()[0] - 0.1).abs() < 1e-7);
    }

    #[test]
    fn test_set_bias_validates_length() {
        let mut act = NormThreshold::new(mixed_spec()).unwrap();

        assert!(act.set_bias(Tensor::from_slice(&[0.2])).is_ok());
        assert!((act.bias().unwrap().data()[0] - 0.2).abs() < 1e-7);

        let err = act.set_bias(Tensor::from_slice(&[0.2, 0.3])).unwrap_err();
        assert!(matches!(err, UmbralError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_bias_gradient_through_tape() {
        clear_graph();

        let act = NormThreshold::new(BlockSpec::new(vec![Block::thresholded(1)])).unwrap();
        let bias_id = act.bias().unwrap().id();

        // Single scalar location v=0.5, b=0.1: d loss/d b = -1.
        let x = Tensor::new(&[0.5], &[1, 1, 1, 1, 1]);
        let y = act.forward(&x);
        y.sum().backward();

        let grad = get_grad(bias_id).expect("bias gradient");
        assert_eq!(grad.shape(), &[1]);
        assert!((grad.data()[0] + 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_bias_gradient_scattered_per_block() {
        clear_graph();

        // Two thresholded blocks; gradient lands at each block's index.
        let spec = BlockSpec::new(vec![Block::thresholded(1), Block::thresholded(1)]);
        let act = NormThreshold::new(spec).unwrap();
        let bias_id = act.bias().unwrap().id();

        let x = Tensor::new(&[0.5, 0.3], &[1, 2, 1, 1, 1]);
        let y = act.forward(&x);
        y.sum().backward();

        let grad = get_grad(bias_id).expect("bias gradient");
        assert_eq!(grad.shape(), &[2]);
        // Both locations are above threshold, each contributes -1.
        assert!((grad.data()[0] + 1.0).abs() < 1e-4);
        assert!((grad.data()[1] + 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_input_gradient_through_passthrough_blocks() {
        clear_graph();

        let spec = BlockSpec::new(vec![Block::passthrough(1), Block::thresholded(1)]);
        let act = NormThreshold::new(spec).unwrap();

        let x = Tensor::new(&[2.0, 0.5], &[1, 2, 1, 1, 1]).requires_grad();
        let x_id = x.id();

        let y = act.forward(&x);
        y.sum().backward();

        let grad = get_grad(x_id).expect("input gradient");
        // Pass-through channel: gradient 1. Thresholded scalar above
        // threshold: gradient ~1 as well.
        assert!((grad.data()[0] - 1.0).abs() < 1e-6);
        assert!((grad.data()[1] - 1.0).abs() < 1e-4);
    }
}
