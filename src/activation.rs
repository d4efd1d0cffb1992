use std::str::FromStr;

use ndarray::{Array, ArrayBase, Data, Dimension};

use crate::error::NetworkError;

/// Enum representing different activation function types
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ActivationType {
    Sigmoid,
    ReLU,
    Tanh,
    Linear,
}

impl ActivationType {
    /// Applies the activation function to a given input
    pub fn apply(&self, x: f64) -> f64 {
        match self {
            ActivationType::Sigmoid => 1.0 / (1.0 + (-x).exp()),
            ActivationType::ReLU => x.max(0.0),
            ActivationType::Tanh => x.tanh(),
            ActivationType::Linear => x,
        }
    }

    /// Computes the derivative of the activation function
    pub fn derivative(&self, x: f64) -> f64 {
        match self {
            ActivationType::Sigmoid => {
                let sigmoid = 1.0 / (1.0 + (-x).exp());
                sigmoid * (1.0 - sigmoid)
            },
            ActivationType::ReLU => if x > 0.0 { 1.0 } else { 0.0 },
            ActivationType::Tanh => 1.0 - x.tanh().powi(2),
            ActivationType::Linear => 1.0,
        }
    }

    /// Elementwise `apply` over a whole tensor
    pub fn forward<S, D>(&self, x: &ArrayBase<S, D>) -> Array<f64, D>
    where
        S: Data<Elem = f64>,
        D: Dimension,
    {
        x.mapv(|v| self.apply(v))
    }

    /// Elementwise `derivative` over a whole tensor
    pub fn gradient<S, D>(&self, x: &ArrayBase<S, D>) -> Array<f64, D>
    where
        S: Data<Elem = f64>,
        D: Dimension,
    {
        x.mapv(|v| self.derivative(v))
    }

    pub fn name(&self) -> &'static str {
        match self {
            ActivationType::Sigmoid => "sigmoid",
            ActivationType::ReLU => "relu",
            ActivationType::Tanh => "tanh",
            ActivationType::Linear => "linear",
        }
    }
}

impl FromStr for ActivationType {
    type Err = NetworkError;

    fn from_str(key: &str) -> Result<Self, Self::Err> {
        match key {
            "sigmoid" => Ok(ActivationType::Sigmoid),
            "relu" => Ok(ActivationType::ReLU),
            "tanh" => Ok(ActivationType::Tanh),
            "linear" => Ok(ActivationType::Linear),
            other => Err(NetworkError::Configuration(format!(
                "unknown activation `{other}`, expected one of sigmoid, relu, tanh, linear"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    const EPSILON: f64 = 1e-12;

    #[test]
    fn test_activation_functions() {
        // Sigmoid tests
        assert!((ActivationType::Sigmoid.apply(0.0) - 0.5).abs() < EPSILON);

        // ReLU tests
        assert_eq!(ActivationType::ReLU.apply(-1.0), 0.0);
        assert_eq!(ActivationType::ReLU.apply(2.0), 2.0);

        // Tanh tests
        assert!((ActivationType::Tanh.apply(0.0)).abs() < EPSILON);

        // Linear tests
        assert_eq!(ActivationType::Linear.apply(5.0), 5.0);
    }

    #[test]
    fn test_activation_derivatives() {
        assert!((ActivationType::Sigmoid.derivative(0.0) - 0.25).abs() < EPSILON);

        assert_eq!(ActivationType::ReLU.derivative(-1.0), 0.0);
        assert_eq!(ActivationType::ReLU.derivative(2.0), 1.0);

        assert!((ActivationType::Tanh.derivative(0.0) - 1.0).abs() < EPSILON);

        assert_eq!(ActivationType::Linear.derivative(5.0), 1.0);
    }

    #[test]
    fn test_array_forms_match_scalar_forms() {
        let x = array![[-2.0, 0.5], [3.0, -0.1]];
        let y = ActivationType::ReLU.forward(&x);
        assert_eq!(y, array![[0.0, 0.5], [3.0, 0.0]]);

        let dy = ActivationType::ReLU.gradient(&x);
        assert_eq!(dy, array![[0.0, 1.0], [1.0, 0.0]]);
    }

    #[test]
    fn test_parse_keys() {
        assert_eq!("relu".parse::<ActivationType>().unwrap(), ActivationType::ReLU);
        assert_eq!("tanh".parse::<ActivationType>().unwrap(), ActivationType::Tanh);
        assert!(matches!(
            "softplus".parse::<ActivationType>(),
            Err(NetworkError::Configuration(_))
        ));
    }
}
