//! The norm-threshold operator as a pure forward/backward pair.
//!
//! The forward rule shrinks each spatial location's channel-group vector
//! toward zero by a bias scalar, clipping at zero:
//!
//! ```text
//! norm    = sqrt(sum_c x_c^2) + eps
//! shifted = max(0, norm - b)
//! out_c   = x_c * shifted / norm
//! ```
//!
//! The vector keeps its direction, so features that transform under a
//! rotation group stay equivariant; only the magnitude is rectified.
//!
//! The backward rule is the analytic gradient of the forward rule away
//! from the clip boundary, with a documented approximation at the
//! boundary itself: input gradients are zeroed wherever the vector was
//! fully clipped (`shifted / norm <= 0`), and the bias gradient is
//! zeroed wherever `norm < b`. Models trained against this operator
//! depend on that exact behavior, so the formula is not a place for
//! subgradient refinements.
//!
//! Forward and backward share state only through an explicit
//! [`ThresholdContext`], so concurrent invocations are independent by
//! construction. [`ThresholdOp`] adds the one-shot pairing contract on
//! top for callers that drive backward by hand.

use crate::autograd::Tensor;
use crate::error::{Result, UmbralError};

/// Added to every norm before division; guards the zero-norm point and
/// keeps gradients finite near it.
pub const NORM_EPS: f32 = 1e-8;

/// Cached pairing between one forward call and its backward call.
///
/// Holds the detached input slice and the bias scalar used by the
/// forward pass; nothing else is retained, intermediates are recomputed
/// in backward.
#[derive(Debug, Clone)]
pub struct ThresholdContext {
    input: Tensor,
    bias: f32,
}

impl ThresholdContext {
    /// The bias scalar captured at forward time.
    #[must_use]
    pub fn bias(&self) -> f32 {
        self.bias
    }
}

/// Decompose a `[batch, channel, spatial...]` shape.
fn feature_dims(shape: &[usize]) -> (usize, usize, usize) {
    assert!(
        shape.len() >= 2,
        "norm threshold expects [batch, channel, ...] input, got {}D",
        shape.len()
    );
    (shape[0], shape[1], shape[2..].iter().product())
}

/// Apply the norm threshold to one block's slice.
///
/// Returns the activated tensor and the context for the paired backward
/// call. The context holds a detached copy of the input, so the caller
/// may drop or mutate the original freely.
#[must_use]
pub fn norm_threshold(x: &Tensor, bias: f32) -> (Tensor, ThresholdContext) {
    let (batch, channels, spatial) = feature_dims(x.shape());
    let data = x.data();
    let mut out = vec![0.0; data.len()];

    for n in 0..batch {
        for s in 0..spatial {
            let mut sq = 0.0f32;
            for c in 0..channels {
                let v = data[(n * channels + c) * spatial + s];
                sq += v * v;
            }
            let norm = sq.sqrt() + NORM_EPS;
            let shifted = (norm - bias).max(0.0);
            let ratio = shifted / norm;

            for c in 0..channels {
                let i = (n * channels + c) * spatial + s;
                out[i] = data[i] * ratio;
            }
        }
    }

    let context = ThresholdContext {
        input: x.detach(),
        bias,
    };
    (Tensor::new(&out, x.shape()), context)
}

/// Gradient of the norm threshold with respect to its input and bias.
///
/// Recomputes `norm`, `shifted`, and `ratio` from the context, then per
/// location:
///
/// ```text
/// grad_x_c = g_c * ratio + (sum_c g_c * x_c) * x_c / norm^2 * (1 - ratio)
/// grad_b   = -(sum_c g_c * x_c) / norm, summed over batch and space
/// ```
///
/// Locations with `ratio <= 0` contribute no input gradient; locations
/// with `norm < b` (strictly) contribute no bias gradient. Both masks
/// are applied while filling fresh buffers, never by mutating shared
/// storage.
///
/// # Panics
///
/// Panics if `grad_output`'s shape differs from the cached input's.
#[must_use]
pub fn norm_threshold_backward(context: &ThresholdContext, grad_output: &Tensor) -> (Tensor, f32) {
    let x = &context.input;
    assert_eq!(
        grad_output.shape(),
        x.shape(),
        "grad_output shape {:?} doesn't match cached input shape {:?}",
        grad_output.shape(),
        x.shape()
    );

    let (batch, channels, spatial) = feature_dims(x.shape());
    let xd = x.data();
    let gd = grad_output.data();

    let mut grad_x = vec![0.0; xd.len()];
    let mut grad_b = 0.0f32;

    for n in 0..batch {
        for s in 0..spatial {
            let mut sq = 0.0f32;
            let mut dot = 0.0f32;
            for c in 0..channels {
                let i = (n * channels + c) * spatial + s;
                sq += xd[i] * xd[i];
                dot += gd[i] * xd[i];
            }
            let norm = sq.sqrt() + NORM_EPS;
            let shifted = (norm - context.bias).max(0.0);
            let ratio = shifted / norm;

            // Fully clipped locations keep grad_x at zero.
            if ratio > 0.0 {
                let correction = dot / (norm * norm) * (1.0 - ratio);
                for c in 0..channels {
                    let i = (n * channels + c) * spatial + s;
                    grad_x[i] = gd[i] * ratio + correction * xd[i];
                }
            }

            // The bias mask is strict: norm < b contributes nothing.
            if norm >= context.bias {
                grad_b -= dot / norm;
            }
        }
    }

    (Tensor::new(&grad_x, x.shape()), grad_b)
}

/// One forward/backward exchange for a single thresholded block.
///
/// The operator is `Idle` until [`forward`](ThresholdOp::forward)
/// installs a fresh context, then awaiting backward until
/// [`backward`](ThresholdOp::backward) consumes it. A context serves
/// exactly one backward call; each forward replaces any stale context
/// with a new one.
#[derive(Debug, Default)]
pub struct ThresholdOp {
    pending: Option<ThresholdContext>,
}

impl ThresholdOp {
    /// Create an idle operator.
    #[must_use]
    pub fn new() -> Self {
        Self { pending: None }
    }

    /// Whether a forward context is waiting for its backward call.
    #[must_use]
    pub fn awaiting_backward(&self) -> bool {
        self.pending.is_some()
    }

    /// Run the forward rule and cache the context for backward.
    pub fn forward(&mut self, x: &Tensor, bias: f32) -> Tensor {
        let (out, context) = norm_threshold(x, bias);
        self.pending = Some(context);
        out
    }

    /// Consume the cached context and compute `(grad_input, grad_bias)`.
    ///
    /// # Errors
    ///
    /// Returns [`UmbralError::InvalidState`] when no forward context is
    /// pending (backward before forward, or called twice).
    pub fn backward(&mut self, grad_output: &Tensor) -> Result<(Tensor, f32)> {
        let context = self.pending.take().ok_or_else(|| UmbralError::InvalidState {
            reason: "backward called without a pending forward context".to_string(),
        })?;
        Ok(norm_threshold_backward(&context, grad_output))
    }
}
