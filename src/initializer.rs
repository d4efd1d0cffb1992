use std::str::FromStr;

use ndarray::{ArrayD, IxDyn};
use rand::RngCore;
use rand_distr::{Distribution, Normal, StandardNormal};

use crate::error::{NetworkError, Result};

/// Element type the generated parameters are rounded to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataType {
    Float32,
    #[default]
    Float64,
}

impl DataType {
    pub fn cast(self, x: f64) -> f64 {
        match self {
            DataType::Float32 => x as f32 as f64,
            DataType::Float64 => x,
        }
    }
}

impl FromStr for DataType {
    type Err = NetworkError;

    fn from_str(key: &str) -> std::result::Result<Self, Self::Err> {
        match key {
            "float32" | "f32" => Ok(DataType::Float32),
            "float64" | "f64" => Ok(DataType::Float64),
            other => Err(NetworkError::Configuration(format!(
                "unknown data type `{other}`, expected float32 or float64"
            ))),
        }
    }
}

/// Weight initialization strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeightInitStrategy {
    /// Standard normal weights and biases
    Random,

    /// Xavier/Glorot initialization
    Xavier,

    /// He initialization (good for ReLU networks)
    He,
}

impl FromStr for WeightInitStrategy {
    type Err = NetworkError;

    fn from_str(key: &str) -> std::result::Result<Self, Self::Err> {
        match key {
            "random" => Ok(WeightInitStrategy::Random),
            "xavier" => Ok(WeightInitStrategy::Xavier),
            "he" => Ok(WeightInitStrategy::He),
            other => Err(NetworkError::Configuration(format!(
                "unknown weight initialization `{other}`, expected one of random, xavier, he"
            ))),
        }
    }
}

impl WeightInitStrategy {
    /// Samples a fresh weight tensor and bias vector.
    ///
    /// # Arguments
    ///
    /// * `weight_shape` - Shape of the weight tensor, e.g. `[fan_in, fan_out]` for dense layers
    /// * `bias_len` - Number of biases
    /// * `fan_in` - Inputs feeding each unit, used by the Xavier and He scales
    /// * `fan_out` - Units (or filters) produced, used by the Xavier scale
    /// * `dtype` - Element type the samples are rounded to
    /// * `rng` - Source of randomness
    pub fn initialize(
        self,
        weight_shape: &[usize],
        bias_len: usize,
        fan_in: usize,
        fan_out: usize,
        dtype: DataType,
        rng: &mut dyn RngCore,
    ) -> Result<(ArrayD<f64>, ArrayD<f64>)> {
        let (weights, biases) = match self {
            WeightInitStrategy::Random => {
                let weights = sample(weight_shape, StandardNormal, rng);
                let biases = sample(&[bias_len], StandardNormal, rng);
                (weights, biases)
            }
            WeightInitStrategy::Xavier => {
                // Unshifted normal, so the sampled std is exactly sqrt(6 / (fan_in + fan_out))
                let scale = (6.0 / (fan_in + fan_out) as f64).sqrt();
                let weights = sample(weight_shape, scaled_normal(scale)?, rng);
                (weights, ArrayD::zeros(IxDyn(&[bias_len])))
            }
            WeightInitStrategy::He => {
                let scale = (2.0 / fan_in as f64).sqrt();
                let weights = sample(weight_shape, scaled_normal(scale)?, rng);
                (weights, ArrayD::zeros(IxDyn(&[bias_len])))
            }
        };

        Ok((weights.mapv(|x| dtype.cast(x)), biases.mapv(|x| dtype.cast(x))))
    }
}

fn scaled_normal(std_dev: f64) -> Result<Normal<f64>> {
    if !std_dev.is_finite() {
        return Err(NetworkError::Configuration(format!(
            "initializer scale {std_dev} is not finite, is the fan-in zero?"
        )));
    }
    Normal::new(0.0, std_dev).map_err(|err| {
        NetworkError::Configuration(format!("invalid initializer scale {std_dev}: {err}"))
    })
}

fn sample<D: Distribution<f64>>(shape: &[usize], dist: D, rng: &mut dyn RngCore) -> ArrayD<f64> {
    ArrayD::from_shape_fn(IxDyn(shape), |_| dist.sample(&mut *rng))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn std_dev(values: &ArrayD<f64>) -> f64 {
        let mean = values.mean().unwrap();
        let variance = values.mapv(|x| (x - mean).powi(2)).mean().unwrap();
        variance.sqrt()
    }

    #[test]
    fn test_strategy_keys() {
        assert_eq!("random".parse::<WeightInitStrategy>().unwrap(), WeightInitStrategy::Random);
        assert_eq!("xavier".parse::<WeightInitStrategy>().unwrap(), WeightInitStrategy::Xavier);
        assert_eq!("he".parse::<WeightInitStrategy>().unwrap(), WeightInitStrategy::He);
        assert!(matches!(
            "glorot".parse::<WeightInitStrategy>(),
            Err(NetworkError::Configuration(_))
        ));
    }

    #[test]
    fn test_xavier_scale() {
        let mut rng = StdRng::seed_from_u64(7);
        let n = 400;
        let (weights, biases) = WeightInitStrategy::Xavier
            .initialize(&[n, n], n, n, n, DataType::Float64, &mut rng)
            .unwrap();

        let expected = (6.0 / (2 * n) as f64).sqrt();
        assert!((std_dev(&weights) - expected).abs() < 0.05 * expected);
        assert!(biases.iter().all(|&b| b == 0.0));
    }

    #[test]
    fn test_he_scale() {
        let mut rng = StdRng::seed_from_u64(11);
        let n = 400;
        let (weights, biases) = WeightInitStrategy::He
            .initialize(&[n, n], n, n, n, DataType::Float64, &mut rng)
            .unwrap();

        let expected = (2.0 / n as f64).sqrt();
        assert!((std_dev(&weights) - expected).abs() < 0.05 * expected);
        assert!(biases.iter().all(|&b| b == 0.0));
    }

    #[test]
    fn test_random_biases_are_sampled() {
        let mut rng = StdRng::seed_from_u64(3);
        let (weights, biases) = WeightInitStrategy::Random
            .initialize(&[3, 4], 4, 3, 4, DataType::Float64, &mut rng)
            .unwrap();

        assert_eq!(weights.shape(), &[3, 4]);
        assert_eq!(biases.shape(), &[4]);
        assert!(biases.iter().any(|&b| b != 0.0));
    }

    #[test]
    fn test_float32_rounding() {
        let mut rng = StdRng::seed_from_u64(5);
        let (weights, _) = WeightInitStrategy::Random
            .initialize(&[8], 1, 1, 8, DataType::Float32, &mut rng)
            .unwrap();

        assert!(weights.iter().all(|&w| w == w as f32 as f64));
    }

    #[test]
    fn test_zero_fan_in_is_rejected() {
        let mut rng = StdRng::seed_from_u64(5);
        let result = WeightInitStrategy::He.initialize(&[0, 4], 4, 0, 4, DataType::Float64, &mut rng);
        assert!(matches!(result, Err(NetworkError::Configuration(_))));
    }
}
