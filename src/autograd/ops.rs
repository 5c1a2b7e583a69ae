//! Differentiable tensor operations.
//!
//! Each operation computes its forward result, then records a `GradFn`
//! to the computation graph when gradient tracking is enabled.

use std::sync::Arc;

use super::grad_fn::{CatChannelsBackward, MulBackward, SliceChannelsBackward, SumBackward};
use super::tensor::Tensor;
use super::{is_grad_enabled, with_graph};

impl Tensor {
    /// Elementwise multiplication: z = self * other
    ///
    /// # Panics
    ///
    /// Panics if the shapes differ.
    #[must_use]
    pub fn mul(&self, other: &Tensor) -> Tensor {
        assert_eq!(
            self.shape(),
            other.shape(),
            "mul requires matching shapes, got {:?} and {:?}",
            self.shape(),
            other.shape()
        );

        let data: Vec<f32> = self
            .data()
            .iter()
            .zip(other.data().iter())
            .map(|(&a, &b)| a * b)
            .collect();

        let mut result = Tensor::new(&data, self.shape());

        if is_grad_enabled() && (self.requires_grad_enabled() || other.requires_grad_enabled()) {
            result.requires_grad_(true);
            let grad_fn = Arc::new(MulBackward {
                x: self.clone(),
                y: other.clone(),
            });
            result.set_grad_fn(grad_fn.clone());

            with_graph(|graph| {
                graph.register_tensor(self.clone());
                graph.register_tensor(other.clone());
                graph.record(result.id(), grad_fn, vec![self.id(), other.id()]);
            });
        }

        result
    }

    /// Sum over all elements: z = sum(self), a 1-element tensor.
    #[must_use]
    pub fn sum(&self) -> Tensor {
        let total: f32 = self.data().iter().sum();
        let mut result = Tensor::new(&[total], &[1]);

        if is_grad_enabled() && self.requires_grad_enabled() {
            result.requires_grad_(true);
            let grad_fn = Arc::new(SumBackward {
                input_shape: self.shape().to_vec(),
            });
            result.set_grad_fn(grad_fn.clone());

            with_graph(|graph| {
                graph.register_tensor(self.clone());
                graph.record(result.id(), grad_fn, vec![self.id()]);
            });
        }

        result
    }

    /// Contiguous slice along the channel axis of a
    /// `[batch, channel, ...]` tensor: channels `start..start + len`.
    ///
    /// # Panics
    ///
    /// Panics if the tensor has fewer than 2 dimensions or the slice
    /// overruns the channel axis.
    #[must_use]
    pub fn slice_channels(&self, start: usize, len: usize) -> Tensor {
        let shape = self.shape();
        assert!(
            shape.len() >= 2,
            "slice_channels expects [batch, channel, ...] input, got {}D",
            shape.len()
        );

        let (batch, channels) = (shape[0], shape[1]);
        let spatial: usize = shape[2..].iter().product();
        assert!(
            start + len <= channels,
            "channel slice {start}..{} out of bounds for {channels} channels",
            start + len
        );

        let mut out_shape = shape.to_vec();
        out_shape[1] = len;

        let mut data = vec![0.0; batch * len * spatial];
        for n in 0..batch {
            for c in 0..len {
                let src = (n * channels + start + c) * spatial;
                let dst = (n * len + c) * spatial;
                data[dst..dst + spatial].copy_from_slice(&self.data()[src..src + spatial]);
            }
        }

        let mut result = Tensor::new(&data, &out_shape);

        if is_grad_enabled() && self.requires_grad_enabled() {
            result.requires_grad_(true);
            let grad_fn = Arc::new(SliceChannelsBackward {
                input_shape: shape.to_vec(),
                start,
            });
            result.set_grad_fn(grad_fn.clone());

            with_graph(|graph| {
                graph.register_tensor(self.clone());
                graph.record(result.id(), grad_fn, vec![self.id()]);
            });
        }

        result
    }

    /// Concatenate tensors along the channel axis, in order.
    ///
    /// All parts must agree on batch size and spatial dimensions.
    ///
    /// # Panics
    ///
    /// Panics if `parts` is empty or the shapes are incompatible.
    #[must_use]
    pub fn cat_channels(parts: &[Tensor]) -> Tensor {
        assert!(!parts.is_empty(), "cat_channels requires at least one tensor");

        let first = parts[0].shape();
        assert!(
            first.len() >= 2,
            "cat_channels expects [batch, channel, ...] inputs, got {}D",
            first.len()
        );
        let batch = first[0];
        let spatial_dims = &first[2..];
        let spatial: usize = spatial_dims.iter().product();

        let mut channels = 0;
        for part in parts {
            let s = part.shape();
            assert_eq!(s[0], batch, "cat_channels batch size mismatch");
            assert_eq!(&s[2..], spatial_dims, "cat_channels spatial shape mismatch");
            channels += s[1];
        }

        let mut data = vec![0.0; batch * channels * spatial];
        let mut offset = 0;
        for part in parts {
            let len = part.shape()[1];
            for n in 0..batch {
                for c in 0..len {
                    let src = (n * len + c) * spatial;
                    let dst = (n * channels + offset + c) * spatial;
                    data[dst..dst + spatial].copy_from_slice(&part.data()[src..src + spatial]);
                }
            }
            offset += len;
        }

        let mut out_shape = first.to_vec();
        out_shape[1] = channels;
        let mut result = Tensor::new(&data, &out_shape);

        if is_grad_enabled() && parts.iter().any(Tensor::requires_grad_enabled) {
            result.requires_grad_(true);
            let grad_fn = Arc::new(CatChannelsBackward {
                part_shapes: parts.iter().map(|p| p.shape().to_vec()).collect(),
            });
            result.set_grad_fn(grad_fn.clone());

            with_graph(|graph| {
                for part in parts {
                    graph.register_tensor(part.clone());
                }
                graph.record(result.id(), grad_fn, parts.iter().map(Tensor::id).collect());
            });
        }

        result
    }
}
