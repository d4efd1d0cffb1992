pub mod adam;
pub mod adamax;
pub mod sgd;

use std::fmt::Debug;

use ndarray::{ArrayD, IxDyn};

use crate::error::Result;
use crate::utils::resize_zero_filled;

/// Stateful parameter update rule.
///
/// Gradients point in the descent direction: every optimizer *adds* its step
/// to the parameters. Each instance keeps its own moment state, keyed to the
/// shape of the parameters it was last called with.
pub trait Optimizer: Debug {
    /// Updates `weights` and `biases` in place.
    ///
    /// # Arguments
    ///
    /// * `weight_gradients` - Gradient for the weights, broadcastable to their shape
    /// * `bias_gradients` - Gradient for the biases, broadcastable to their shape
    /// * `weights` - Weights to update
    /// * `biases` - Biases to update
    fn apply_gradients(
        &mut self,
        weight_gradients: &ArrayD<f64>,
        bias_gradients: &ArrayD<f64>,
        weights: &mut ArrayD<f64>,
        biases: &mut ArrayD<f64>,
    ) -> Result<()>;

    fn clone_box(&self) -> Box<dyn Optimizer>;
}

impl Clone for Box<dyn Optimizer> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// First and second moment accumulators for one parameter tensor
#[derive(Debug, Clone, PartialEq)]
pub struct Moments {
    pub first: ArrayD<f64>,
    pub second: ArrayD<f64>,
}

impl Moments {
    pub fn empty() -> Self {
        Moments {
            first: ArrayD::zeros(IxDyn(&[0])),
            second: ArrayD::zeros(IxDyn(&[0])),
        }
    }

    /// Zero-extends or truncates both accumulators to `shape`
    pub fn fit_to(&mut self, shape: &[usize]) {
        if self.first.shape() == shape && self.second.shape() == shape {
            return;
        }
        log::trace!("resizing moments from {:?} to {:?}", self.first.shape(), shape);
        self.first = resize_zero_filled(&self.first, shape);
        self.second = resize_zero_filled(&self.second, shape);
    }
}

impl Default for Moments {
    fn default() -> Self {
        Self::empty()
    }
}

pub use adam::Adam;
pub use adamax::AdaMax;
pub use sgd::Sgd;
