//! Reverse-mode automatic differentiation for the activation stack.
//!
//! The engine uses a define-by-run tape: forward operations record a
//! gradient function to a thread-local graph, and `backward` replays the
//! tape in reverse, accumulating gradients for tensors used multiple
//! times. Custom operators (such as the norm-threshold rule in
//! [`crate::nn`]) participate by recording their own [`GradFn`] with a
//! per-invocation context captured at forward time.
//!
//! # Example
//!
//! ```
//! use umbral::autograd::{clear_graph, get_grad, Tensor};
//!
//! clear_graph();
//! let x = Tensor::from_slice(&[1.0, 2.0, 3.0]).requires_grad();
//! let x_id = x.id();
//!
//! let y = x.mul(&x).sum();
//! y.backward();
//!
//! let grad = get_grad(x_id).unwrap();
//! assert_eq!(grad.data(), &[2.0, 4.0, 6.0]);
//! ```

pub(crate) mod grad_fn;
mod graph;
mod ops;
mod tensor;

pub use grad_fn::GradFn;
pub use graph::ComputationGraph;
pub use tensor::{Tensor, TensorId};

use std::cell::RefCell;

thread_local! {
    /// Computation graph for the current thread.
    static GRAPH: RefCell<ComputationGraph> = RefCell::new(ComputationGraph::new());

    /// Flag to disable gradient tracking (for inference).
    static GRAD_ENABLED: RefCell<bool> = const { RefCell::new(true) };
}

/// Execute a closure without gradient tracking.
///
/// Useful for inference or for numerical gradient checks that must not
/// pollute the tape.
pub fn no_grad<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    GRAD_ENABLED.with(|enabled| {
        let prev = *enabled.borrow();
        *enabled.borrow_mut() = false;
        let result = f();
        *enabled.borrow_mut() = prev;
        result
    })
}

/// Check if gradient tracking is currently enabled.
#[must_use]
pub fn is_grad_enabled() -> bool {
    GRAD_ENABLED.with(|enabled| *enabled.borrow())
}

/// Get a reference to the thread-local computation graph.
pub(crate) fn with_graph<F, R>(f: F) -> R
where
    F: FnOnce(&mut ComputationGraph) -> R,
{
    GRAPH.with(|graph| f(&mut graph.borrow_mut()))
}

/// Clear the computation graph (called between training steps).
pub fn clear_graph() {
    GRAPH.with(|graph| graph.borrow_mut().clear());
}

/// Get the accumulated gradient for a tensor by ID.
#[must_use]
pub fn get_grad(id: TensorId) -> Option<Tensor> {
    with_graph(|graph| graph.get_grad(id))
}

/// Clear the gradient for a specific tensor by ID.
pub fn clear_grad(id: TensorId) {
    with_graph(|graph| graph.clear_grad(id));
}
