use std::fmt::Debug;

use ndarray::ArrayD;

/// Penalty applied to a layer's incoming gradient before its delta is computed
pub trait Regularizer: Debug {
    fn penalize(
        &self,
        gradient: &ArrayD<f64>,
        weights: &ArrayD<f64>,
        biases: &ArrayD<f64>,
    ) -> ArrayD<f64>;
}

/// Combined L1 and L2 penalty over every weight and bias
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct L1L2 {
    pub l1: f64,
    pub l2: f64,
}

impl L1L2 {
    pub fn new(l1: f64, l2: f64) -> Self {
        Self { l1, l2 }
    }
}

impl Regularizer for L1L2 {
    fn penalize(
        &self,
        gradient: &ArrayD<f64>,
        weights: &ArrayD<f64>,
        biases: &ArrayD<f64>,
    ) -> ArrayD<f64> {
        let l1 = weights.iter().chain(biases.iter()).map(|x| x.abs()).sum::<f64>();
        let l2 = weights.iter().chain(biases.iter()).map(|x| x * x).sum::<f64>();
        gradient + (self.l1 * l1 + self.l2 * l2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_l1l2_adds_scalar_penalty() {
        let regularizer = L1L2::new(0.1, 0.01);
        let gradient = array![1.0, -1.0].into_dyn();
        let weights = array![[1.0, -2.0]].into_dyn();
        let biases = array![3.0].into_dyn();

        // l1: 0.1 * 6, l2: 0.01 * 14
        let penalized = regularizer.penalize(&gradient, &weights, &biases);
        let penalty = 0.6 + 0.14;
        assert!((penalized[0] - (1.0 + penalty)).abs() < 1e-12);
        assert!((penalized[1] - (-1.0 + penalty)).abs() < 1e-12);
    }
}
