use ndarray::{ArrayD, ArrayViewD, Zip};

use super::{Moments, Optimizer};
use crate::error::Result;
use crate::hyperparameters::OptimizerHyperparameters;
use crate::utils::broadcast_to;

/// Adaptive moment estimation with bias-corrected first and second moments
#[derive(Debug, Clone)]
pub struct Adam {
    pub hyperparameters: OptimizerHyperparameters,
    weights: Moments,
    biases: Moments,
    t: u32,
}

impl Adam {
    pub fn new(learning_rate: f64) -> Self {
        Self::with_hyperparameters(OptimizerHyperparameters {
            learning_rate,
            ..OptimizerHyperparameters::default()
        })
    }

    pub fn with_hyperparameters(hyperparameters: OptimizerHyperparameters) -> Self {
        Adam {
            hyperparameters,
            weights: Moments::empty(),
            biases: Moments::empty(),
            t: 0,
        }
    }

    pub fn step(&self) -> u32 {
        self.t
    }

    pub fn weight_moments(&self) -> &Moments {
        &self.weights
    }

    pub fn bias_moments(&self) -> &Moments {
        &self.biases
    }

    fn update(&self, moments: &mut Moments, gradient: &ArrayViewD<f64>, params: &mut ArrayD<f64>) {
        let OptimizerHyperparameters { learning_rate, beta1, beta2, epsilon } = self.hyperparameters;
        let first_correction = 1.0 - beta1.powi(self.t as i32);
        let second_correction = 1.0 - beta2.powi(self.t as i32);

        moments.fit_to(params.shape());
        moments.first = &moments.first * beta1 + gradient * (1.0 - beta1);
        moments.second = &moments.second * beta2 + gradient.mapv(|g| g * g) * (1.0 - beta2);

        Zip::from(params)
            .and(&moments.first)
            .and(&moments.second)
            .for_each(|p, &m, &v| {
                let m_hat = m / first_correction;
                let v_hat = v / second_correction;
                *p += learning_rate * m_hat / (v_hat.sqrt() + epsilon);
            });
    }
}

impl Default for Adam {
    fn default() -> Self {
        Self::with_hyperparameters(OptimizerHyperparameters::default())
    }
}

impl Optimizer for Adam {
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

        let mut weight_moments = std::mem::take(&mut self.weights);
        let mut bias_moments = std::mem::take(&mut self.biases);
        self.update(&mut weight_moments, &weight_gradients, weights);
        self.update(&mut bias_moments, &bias_gradients, biases);
        self.weights = weight_moments;
        self.biases = bias_moments;

        Ok(())
    }

    fn clone_box(&self) -> Box<dyn Optimizer> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_first_step_is_sign_times_learning_rate() {
        let mut optimizer = Adam::new(0.01);
        let mut weights = array![1.0, 1.0].into_dyn();
        let mut biases = array![0.0].into_dyn();

        optimizer
            .apply_gradients(
                &array![3.0, -0.5].into_dyn(),
                &array![0.0].into_dyn(),
                &mut weights,
                &mut biases,
            )
            .unwrap();

        assert!((weights[0] - 1.01).abs() < 1e-6);
        assert!((weights[1] - 0.99).abs() < 1e-6);
        assert_eq!(biases[0], 0.0);
    }
}
