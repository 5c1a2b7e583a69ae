//! The `Module` trait.

use crate::autograd::Tensor;

/// Interface for neural network layers.
///
/// A module transforms an input tensor and exposes its learnable
/// parameters for the optimizer. Parameter tensors keep a stable
/// identity (their [`crate::autograd::TensorId`]) across training
/// iterations, which is how accumulated gradients find their storage.
pub trait Module {
    /// Apply the module to an input tensor.
    fn forward(&self, input: &Tensor) -> Tensor;

    /// Learnable parameters, in a stable order.
    fn parameters(&self) -> Vec<&Tensor> {
        Vec::new()
    }

    /// Mutable access to learnable parameters.
    fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        Vec::new()
    }

    /// Total number of scalar parameters.
    fn num_parameters(&self) -> usize {
        self.parameters().iter().map(|p| p.numel()).sum()
    }

    /// Switch to training mode (no-op for stateless modules).
    fn train(&mut self) {}

    /// Switch to evaluation mode (no-op for stateless modules).
    fn eval(&mut self) {}

    /// Whether the module is in training mode.
    fn training(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Identity;

    impl Module for Identity {
        fn forward(&self, input: &Tensor) -> Tensor {
            input.clone()
        }
    }

    #[test]
    fn test_default_trait_methods() {
        let mut id = Identity;

        assert!(id.parameters().is_empty());
        assert!(id.parameters_mut().is_empty());
        assert_eq!(id.num_parameters(), 0);
        assert!(id.training());

        id.eval();
        id.train();
    }
}
