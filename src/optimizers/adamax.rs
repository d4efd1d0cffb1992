use ndarray::{ArrayD, ArrayViewD, Zip};

use super::{Moments, Optimizer};
use crate::error::Result;
use crate::hyperparameters::OptimizerHyperparameters;
use crate::utils::broadcast_to;

/// AdaMax: Adam with the second moment replaced by an exponentially weighted infinity norm
#[derive(Debug, Clone)]
pub struct AdaMax {
    pub hyperparameters: OptimizerHyperparameters,
    weights: Moments,
    biases: Moments,
    t: u32,
}

impl AdaMax {
    pub fn new(learning_rate: f64) -> Self {
        Self::with_hyperparameters(OptimizerHyperparameters {
            learning_rate,
            ..OptimizerHyperparameters::default()
        })
    }

    pub fn with_hyperparameters(hyperparameters: OptimizerHyperparameters) -> Self {
        AdaMax {
            hyperparameters,
            weights: Moments::empty(),
            biases: Moments::empty(),
            t: 0,
        }
    }

    /// Number of updates applied so far
    pub fn step(&self) -> u32 {
        self.t
    }

    /// `(m_w, u_w)`
    pub fn weight_moments(&self) -> &Moments {
        &self.weights
    }

    /// `(m_b, u_b)`
    pub fn bias_moments(&self) -> &Moments {
        &self.biases
    }

    fn update(
        &self,
        moments: &mut Moments,
        gradient: &ArrayViewD<f64>,
        params: &mut ArrayD<f64>,
        step_size: f64,
    ) {
        let OptimizerHyperparameters { beta1, beta2, epsilon, .. } = self.hyperparameters;

        moments.fit_to(params.shape());
        moments.first = &moments.first * beta1 + gradient * (1.0 - beta1);
        moments.second = Zip::from(&moments.second)
            .and(gradient)
            .map_collect(|&u, &g| (beta2 * u).max(g.abs()));

        Zip::from(params)
            .and(&moments.first)
            .and(&moments.second)
            .for_each(|p, &m, &u| *p += step_size * (m / (u + epsilon)));
    }
}

impl Default for AdaMax {
    fn default() -> Self {
        Self::with_hyperparameters(OptimizerHyperparameters::default())
    }
}

impl Optimizer for AdaMax {
    fn apply_gradients(
        &mut self,
        weight_gradients: &ArrayD<f64>,
        bias_gradients: &ArrayD<f64>,
        weights: &mut ArrayD<f64>,
        biases: &mut ArrayD<f64>,
    ) -> Result<()> {
        let weight_gradients = broadcast_to(weight_gradients, weights.shape(), "weight gradient")?;
        let bias_gradients = broadcast_to(bias_gradients, biases.shape(), "bias gradient")?;

        self.t += 1;
        let beta1_t = self.hyperparameters.beta1.powi(self.t as i32);
        let step_size = self.hyperparameters.learning_rate / (1.0 - beta1_t);

        let mut weight_moments = std::mem::take(&mut self.weights);
        let mut bias_moments = std::mem::take(&mut self.biases);
        self.update(&mut weight_moments, &weight_gradients, weights, step_size);
        self.update(&mut bias_moments, &bias_gradients, biases, step_size);
        self.weights = weight_moments;
        self.biases = bias_moments;

        Ok(())
    }

    fn clone_box(&self) -> Box<dyn Optimizer> {
        Box::new(self.clone())
    }
}
