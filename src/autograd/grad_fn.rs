//! Gradient function trait and implementations.
//!
//! Each differentiable operation implements [`GradFn`] to define how
//! gradients flow backward through the operation. Custom operators
//! outside this module (the norm-threshold rule in [`crate::nn`])
//! implement the same trait and capture their own forward-time context.

use super::tensor::Tensor;

/// Trait for functions that compute gradients during the backward pass.
///
/// Each differentiable operation creates a `GradFn` implementation that
/// captures the context needed for gradient computation. The context is
/// tied to one forward invocation; the tape discards it when the graph
/// is cleared.
pub trait GradFn: Send + Sync {
    /// Compute gradients with respect to inputs.
    ///
    /// # Arguments
    ///
    /// * `grad_output` - Gradient flowing back from downstream operations
    ///
    /// # Returns
    ///
    /// One gradient per input tensor, in the input order used during the
    /// forward pass.
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor>;

    /// Human-readable name for debugging.
    fn name(&self) -> &'static str;
}

/// Gradient function for elementwise multiplication: z = x * y
pub(crate) struct MulBackward {
    pub(crate) x: Tensor,
    pub(crate) y: Tensor,
}

impl GradFn for MulBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        // ∂(x*y)/∂x = y, ∂(x*y)/∂y = x
        let grad_x: Vec<f32> = grad_output
            .data()
            .iter()
            .zip(self.y.data().iter())
            .map(|(&g, &y)| g * y)
            .collect();
        let grad_y: Vec<f32> = grad_output
            .data()
            .iter()
            .zip(self.x.data().iter())
            .map(|(&g, &x)| g * x)
            .collect();

        vec![
            Tensor::new(&grad_x, grad_output.shape()),
            Tensor::new(&grad_y, grad_output.shape()),
        ]
    }

    fn name(&self) -> &'static str {
        "MulBackward"
    }
}

/// Gradient function for full reduction: z = sum(x)
pub(crate) struct SumBackward {
    pub(crate) input_shape: Vec<usize>,
}

impl GradFn for SumBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        // ∂sum(x)/∂x_i = 1 for all i
        let g = grad_output.item();
        let numel: usize = self.input_shape.iter().product();
        vec![Tensor::new(&vec![g; numel], &self.input_shape)]
    }

    fn name(&self) -> &'static str {
        "SumBackward"
    }
}

/// Gradient function for channel slicing on `[batch, channel, ...]`
/// tensors.
///
/// The slice gradient scatters back into a zero tensor of the input
/// shape at the original channel offset; channels outside the slice
/// receive no contribution.
pub(crate) struct SliceChannelsBackward {
    pub(crate) input_shape: Vec<usize>,
    pub(crate) start: usize,
}

impl GradFn for SliceChannelsBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        let batch = self.input_shape[0];
        let channels = self.input_shape[1];
        let spatial: usize = self.input_shape[2..].iter().product();
        let len = grad_output.shape()[1];

        let numel: usize = self.input_shape.iter().product();
        let mut grad_input = vec![0.0; numel];
        let grad_data = grad_output.data();

        for n in 0..batch {
            for c in 0..len {
                let src = (n * len + c) * spatial;
                let dst = (n * channels + self.start + c) * spatial;
                grad_input[dst..dst + spatial].copy_from_slice(&grad_data[src..src + spatial]);
            }
        }

        vec![Tensor::new(&grad_input, &self.input_shape)]
    }

    fn name(&self) -> &'static str {
        "SliceChannelsBackward"
    }
}

/// Gradient function for channel concatenation on
/// `[batch, channel, ...]` tensors.
///
/// Splits the output gradient back into per-part gradients along the
/// channel axis, in the original part order.
pub(crate) struct CatChannelsBackward {
    pub(crate) part_shapes: Vec<Vec<usize>>,
}

impl GradFn for CatChannelsBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        let out_shape = grad_output.shape();
        let batch = out_shape[0];
        let channels = out_shape[1];
        let spatial: usize = out_shape[2..].iter().product();
        let grad_data = grad_output.data();

        let mut grads = Vec::with_capacity(self.part_shapes.len());
        let mut offset = 0;

        for shape in &self.part_shapes {
            let len = shape[1];
            let numel: usize = shape.iter().product();
            let mut part = vec![0.0; numel];

            for n in 0..batch {
                for c in 0..len {
                    let src = (n * channels + offset + c) * spatial;
                    let dst = (n * len + c) * spatial;
                    part[dst..dst + spatial].copy_from_slice(&grad_data[src..src + spatial]);
                }
            }

            grads.push(Tensor::new(&part, shape));
            offset += len;
        }

        grads
    }

    fn name(&self) -> &'static str {
        "CatChannelsBackward"
    }
}
