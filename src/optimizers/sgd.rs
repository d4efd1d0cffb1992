use ndarray::{ArrayD, Zip};

use super::Optimizer;
use crate::error::Result;
use crate::utils::broadcast_to;

/// Plain gradient step, no state
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sgd {
    pub learning_rate: f64,
}

impl Sgd {
    pub fn new(learning_rate: f64) -> Self {
        Self { learning_rate }
    }
}

impl Optimizer for Sgd {
    fn apply_gradients(
        &mut self,
        weight_gradients: &ArrayD<f64>,
        bias_gradients: &ArrayD<f64>,
        weights: &mut ArrayD<f64>,
        biases: &mut ArrayD<f64>,
    ) -> Result<()> {
        let weight_gradients = broadcast_to(weight_gradients, weights.shape(), "weight gradient")?;
        let bias_gradients = broadcast_to(bias_gradients, biases.shape(), "bias gradient")?;

        let lr = self.learning_rate;
        Zip::from(weights).and(&weight_gradients).for_each(|w, &g| *w += lr * g);
        Zip::from(biases).and(&bias_gradients).for_each(|b, &g| *b += lr * g);
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn Optimizer> {
        Box::new(*self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_sgd_step() {
        let mut optimizer = Sgd::new(0.5);
        let mut weights = array![[1.0, 2.0]].into_dyn();
        let mut biases = array![0.0, 0.0].into_dyn();

        optimizer
            .apply_gradients(
                &array![[2.0, -2.0]].into_dyn(),
                &ndarray::arr0(1.0).into_dyn(),
                &mut weights,
                &mut biases,
            )
            .unwrap();

        assert_eq!(weights, array![[2.0, 1.0]].into_dyn());
        assert_eq!(biases, array![0.5, 0.5].into_dyn());
    }
}
