use ndarray::{ArrayD, Axis, Ix1, Ix2};
use rand::RngCore;

use super::{BatchCache, LayerOps, LayerParams, Shape};
use crate::activation::ActivationType;
use crate::error::{NetworkError, Result};
use crate::initializer::{DataType, WeightInitStrategy};
use crate::optimizers::Optimizer;
use crate::regularizer::Regularizer;
use crate::sequence::Neighbors;
use crate::utils::{broadcast_to, size_of};

/// Fully connected layer: `activation(x · W + b)` with `W` shaped `[fan_in, units]`
#[derive(Debug)]
pub struct Dense {
    pub name: String,
    pub params: LayerParams,
    pub cache: BatchCache,
}

impl Dense {
    /// Constructs a new dense layer
    ///
    /// # Arguments
    ///
    /// * `units` - Number of neurons in this layer
    /// * `activation` - Activation function type for the layer
    pub fn new(units: usize, activation: ActivationType) -> Self {
        Dense {
            name: "Dense".to_string(),
            params: LayerParams::new(units, activation),
            cache: BatchCache::default(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_regularizer(mut self, regularizer: Box<dyn Regularizer>) -> Self {
        self.params.regularizer = Some(regularizer);
        self
    }

    pub fn trainable(mut self, trainable: bool) -> Self {
        self.params.trainable = trainable;
        self
    }

    pub(crate) fn generate(
        &mut self,
        input_shape: &[usize],
        strategy: WeightInitStrategy,
        dtype: DataType,
        rng: &mut dyn RngCore,
    ) -> Result<()> {
        let fan_in = size_of(input_shape);
        let units = self.params.units;
        let (weights, biases) = strategy.initialize(&[fan_in, units], units, fan_in, units, dtype, rng)?;
        self.params.weights = weights;
        self.params.biases = biases;
        Ok(())
    }

    /// Forward pass with the weighted sum multiplied by `scale` before activation
    pub(crate) fn forward_scaled(&mut self, x: &ArrayD<f64>, is_training: bool, scale: f64) -> Result<ArrayD<f64>> {
        self.params.require_weights(&self.name)?;
        let weights = self.params.weights.view().into_dimensionality::<Ix2>()?;
        let biases = self.params.biases.view().into_dimensionality::<Ix1>()?;

        let input = x.view().into_dimensionality::<Ix1>().map_err(|_| {
            NetworkError::Shape(format!("{} expects a 1-D input, got shape {:?}", self.name, x.shape()))
        })?;
        if input.len() != weights.nrows() {
            return Err(NetworkError::Shape(format!(
                "{} expects {} inputs, got {}",
                self.name,
                weights.nrows(),
                input.len()
            )));
        }

        let weighted_sum = (input.dot(&weights) + &biases) * scale;
        let output = self.params.activation.forward(&weighted_sum);

        if is_training {
            self.cache.record(x.view(), output.view().into_dyn(), weighted_sum.view().into_dyn())?;
        }

        Ok(output.into_dyn())
    }

    /// Backward pass with every example's delta multiplied by `delta_scale`
    pub(crate) fn backpropagate_scaled(
        &mut self,
        gradient: &ArrayD<f64>,
        optimizer: &mut dyn Optimizer,
        delta_scale: f64,
    ) -> Result<ArrayD<f64>> {
        let examples = self.cache.require_examples(&self.name)?;
        let gradient = self.params.regularized(gradient);

        let weighted_sums = self.cache.weighted_sums().into_dimensionality::<Ix2>()?;
        let gradient = broadcast_to(&gradient, weighted_sums.shape(), "dense gradient")?
            .into_dimensionality::<Ix2>()?;

        // One delta row per recorded example
        let deltas = &gradient * &self.params.activation.gradient(&weighted_sums) * delta_scale;
        let delta = deltas
            .mean_axis(Axis(0))
            .ok_or_else(|| NetworkError::Shape(format!("{} has an empty batch", self.name)))?;

        let inputs = self.cache.inputs().into_dimensionality::<Ix2>()?;
        let weight_gradients = inputs.t().dot(&deltas) / examples as f64;

        let previous = {
            let weights = self.params.weights.view().into_dimensionality::<Ix2>()?;
            delta.dot(&weights.t())
        };

        self.params
            .apply_gradients(&weight_gradients.into_dyn(), &delta.into_dyn(), optimizer)?;

        Ok(previous.into_dyn())
    }
}

impl LayerOps for Dense {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "Dense"
    }

    fn output_shape(&self, neighbors: &Neighbors<'_>) -> Result<Shape> {
        let input_shape = neighbors.previous_shape()?;
        if input_shape.len() != 1 {
            return Err(NetworkError::Shape(format!(
                "{} takes 1-D inputs but follows a layer producing {:?}, add a Flatten in between",
                self.name, input_shape
            )));
        }
        Ok(vec![self.params.units])
    }

    fn generate_weights(
        &mut self,
        input_shape: &[usize],
        strategy: WeightInitStrategy,
        dtype: DataType,
        rng: &mut dyn RngCore,
    ) -> Result<()> {
        self.generate(input_shape, strategy, dtype, rng)
    }

    fn set_batch_size(&mut self, batch_size: usize, input_shape: &[usize], output_shape: &[usize]) {
        self.cache.allocate(batch_size, input_shape, output_shape);
    }

    fn start_batch(&mut self) {
        self.cache.reset();
    }

    fn forward(&mut self, x: &ArrayD<f64>, is_training: bool) -> Result<ArrayD<f64>> {
        self.forward_scaled(x, is_training, 1.0)
    }

    fn backpropagate(&mut self, gradient: &ArrayD<f64>, optimizer: &mut dyn Optimizer) -> Result<ArrayD<f64>> {
        self.backpropagate_scaled(gradient, optimizer, 1.0)
    }

    fn params(&self) -> Option<&LayerParams> {
        Some(&self.params)
    }

    fn params_mut(&mut self) -> Option<&mut LayerParams> {
        Some(&mut self.params)
    }

    fn batch_cache(&self) -> Option<&BatchCache> {
        Some(&self.cache)
    }
}
