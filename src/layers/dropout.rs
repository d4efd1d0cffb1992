use ndarray::ArrayD;
use rand::RngCore;

use super::{BatchCache, Dense, LayerOps, LayerParams, Shape};
use crate::activation::ActivationType;
use crate::error::{NetworkError, Result};
use crate::initializer::{DataType, WeightInitStrategy};
use crate::optimizers::Optimizer;
use crate::regularizer::Regularizer;
use crate::sequence::Neighbors;

/// Dense layer whose weighted sum is rescaled by `1 / (1 - rate)` while training
#[derive(Debug)]
pub struct Dropout {
    inner: Dense,
    dropout_rate: f64,
}

impl Dropout {
    pub const DEFAULT_RATE: f64 = 0.2;

    pub fn new(units: usize, activation: ActivationType, dropout_rate: f64) -> Result<Self> {
        if !(0.0..1.0).contains(&dropout_rate) {
            return Err(NetworkError::Configuration(format!(
                "dropout rate must be in [0, 1), got {dropout_rate}"
            )));
        }

        Ok(Dropout {
            inner: Dense::new(units, activation).with_name("Dropout"),
            dropout_rate,
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.inner.name = name.into();
        self
    }

    pub fn with_regularizer(mut self, regularizer: Box<dyn Regularizer>) -> Self {
        self.inner.params.regularizer = Some(regularizer);
        self
    }

    pub fn trainable(mut self, trainable: bool) -> Self {
        self.inner.params.trainable = trainable;
        self
    }

    pub fn dropout_rate(&self) -> f64 {
        self.dropout_rate
    }

    fn scale(&self) -> f64 {
        1.0 / (1.0 - self.dropout_rate)
    }
}

impl LayerOps for Dropout {
    fn name(&self) -> &str {
        &self.inner.name
    }

    fn kind(&self) -> &'static str {
        "Dropout"
    }

    fn output_shape(&self, neighbors: &Neighbors<'_>) -> Result<Shape> {
        self.inner.output_shape(neighbors)
    }

    fn generate_weights(
        &mut self,
        input_shape: &[usize],
        strategy: WeightInitStrategy,
        dtype: DataType,
        rng: &mut dyn RngCore,
    ) -> Result<()> {
        self.inner.generate(input_shape, strategy, dtype, rng)
    }

    fn set_batch_size(&mut self, batch_size: usize, input_shape: &[usize], output_shape: &[usize]) {
        self.inner.set_batch_size(batch_size, input_shape, output_shape);
    }

    fn start_batch(&mut self) {
        self.inner.start_batch();
    }

    fn forward(&mut self, x: &ArrayD<f64>, is_training: bool) -> Result<ArrayD<f64>> {
        // Inverted dropout: inference runs unscaled
        let scale = if is_training { self.scale() } else { 1.0 };
        self.inner.forward_scaled(x, is_training, scale)
    }

    fn backpropagate(&mut self, gradient: &ArrayD<f64>, optimizer: &mut dyn Optimizer) -> Result<ArrayD<f64>> {
        let delta_scale = 1.0 / self.scale();
        self.inner.backpropagate_scaled(gradient, optimizer, delta_scale)
    }

    fn params(&self) -> Option<&LayerParams> {
        Some(&self.inner.params)
    }

    fn params_mut(&mut self) -> Option<&mut LayerParams> {
        Some(&mut self.inner.params)
    }

    fn batch_cache(&self) -> Option<&BatchCache> {
        Some(&self.inner.cache)
    }
}
