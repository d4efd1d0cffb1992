/// Hyperparameters shared by the moment-based optimizers
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OptimizerHyperparameters {
    /// Step size applied to every update
    pub learning_rate: f64,

    /// Decay of the first moment (running mean of gradients)
    pub beta1: f64,

    /// Decay of the second moment (AdaMax: infinity norm, Adam: squared mean)
    pub beta2: f64,

    /// Keeps the update finite when a moment is zero
    pub epsilon: f64,
}

impl Default for OptimizerHyperparameters {
    fn default() -> Self {
        OptimizerHyperparameters {
            learning_rate: 0.001,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-7,
        }
    }
}

/// Settings consumed by `Network::compile`
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkConfig {
    /// Number of examples recorded per batch before backpropagation
    pub batch_size: usize,

    /// Weight initialization key: "random", "xavier" or "he"
    pub weight_init: String,

    /// Element type key: "float32" or "float64"
    pub dtype: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            batch_size: 1,
            weight_init: "random".to_string(),
            dtype: "float64".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_hyperparameters() {
        let hp = OptimizerHyperparameters::default();

        assert_eq!(hp.learning_rate, 0.001);
        assert_eq!(hp.beta1, 0.9);
        assert_eq!(hp.beta2, 0.999);
        assert_eq!(hp.epsilon, 1e-7);
    }

    #[test]
    fn test_default_network_config() {
        let config = NetworkConfig::default();

        assert_eq!(config.batch_size, 1);
        assert_eq!(config.weight_init, "random");
        assert_eq!(config.dtype, "float64");
    }
}
