use ndarray::{Array1, Array2, ArrayD, ArrayView2, Axis, Ix1, Ix2};
use rand::RngCore;

use super::max_pool::pooled_len;
use super::{BatchCache, LayerOps, LayerParams, Shape};
use crate::activation::ActivationType;
use crate::error::{NetworkError, Result};
use crate::initializer::{DataType, WeightInitStrategy};
use crate::optimizers::Optimizer;
use crate::regularizer::Regularizer;
use crate::sequence::Neighbors;
use crate::utils::broadcast_to;

/// 1-D convolution over `[length]` or `[length, channels]` inputs.
///
/// Weights are `[filters, kernel_size]`, shared across input channels.
/// Output is `[floor((length - kernel_size) / strides) + 1, filters]`.
#[derive(Debug)]
pub struct Conv1D {
    pub name: String,
    pub params: LayerParams,
    pub kernel_size: usize,
    pub strides: usize,
    pub cache: BatchCache,
}

impl Conv1D {
    pub fn new(filters: usize, kernel_size: usize, strides: usize, activation: ActivationType) -> Self {
        Conv1D {
            name: "Conv1D".to_string(),
            params: LayerParams::new(filters, activation),
            kernel_size,
            strides,
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

    pub fn filters(&self) -> usize {
        self.params.units
    }

    /// `(length, channels)` of an input shape
    fn signal_dims(&self, shape: &[usize]) -> Result<(usize, usize)> {
        match *shape {
            [length] => Ok((length, 1)),
            [length, channels] => Ok((length, channels)),
            _ => Err(NetworkError::Shape(format!(
                "{} expects a [length] or [length, channels] input, got {:?}",
                self.name, shape
            ))),
        }
    }

    fn as_signal<'a>(&self, x: &'a ArrayD<f64>) -> Result<ArrayView2<'a, f64>> {
        let (length, channels) = self.signal_dims(x.shape())?;
        Ok(x.view().into_shape_with_order((length, channels))?)
    }
}

impl Default for Conv1D {
    fn default() -> Self {
        Self::new(1, 2, 1, ActivationType::ReLU)
    }
}

impl LayerOps for Conv1D {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "Conv1D"
    }

    fn output_shape(&self, neighbors: &Neighbors<'_>) -> Result<Shape> {
        let (length, _) = self.signal_dims(&neighbors.previous_shape()?)?;
        Ok(vec![pooled_len(length, self.kernel_size, self.strides)?, self.filters()])
    }

    fn generate_weights(
        &mut self,
        input_shape: &[usize],
        strategy: WeightInitStrategy,
        dtype: DataType,
        rng: &mut dyn RngCore,
    ) -> Result<()> {
        let (_, channels) = self.signal_dims(input_shape)?;
        let filters = self.filters();
        let fan_in = channels * self.kernel_size;
        let (weights, biases) =
            strategy.initialize(&[filters, self.kernel_size], filters, fan_in, filters, dtype, rng)?;
        self.params.weights = weights;
        self.params.biases = biases;
        Ok(())
    }

    fn set_batch_size(&mut self, batch_size: usize, input_shape: &[usize], output_shape: &[usize]) {
        self.cache.allocate(batch_size, input_shape, output_shape);
    }

    fn start_batch(&mut self) {
        self.cache.reset();
    }

    fn forward(&mut self, x: &ArrayD<f64>, is_training: bool) -> Result<ArrayD<f64>> {
        self.params.require_weights(&self.name)?;
        let signal = self.as_signal(x)?;
        let weights = self.params.weights.view().into_dimensionality::<Ix2>()?;
        let biases = self.params.biases.view().into_dimensionality::<Ix1>()?;

        let (length, _) = signal.dim();
        let out_len = pooled_len(length, self.kernel_size, self.strides)?;

        let mut weighted_sum = Array2::zeros((out_len, self.filters()));
        for (position, mut row) in weighted_sum.axis_iter_mut(Axis(0)).enumerate() {
            let start = position * self.strides;
            let window = signal.slice(ndarray::s![start..start + self.kernel_size, ..]);
            // Sum over channels first, the kernel is shared between them
            let taps = window.sum_axis(Axis(1));
            for (filter, value) in row.iter_mut().enumerate() {
                *value = taps.dot(&weights.row(filter)) + biases[filter];
            }
        }

        let output = self.params.activation.forward(&weighted_sum);
        if is_training {
            self.cache.record(x.view(), output.view().into_dyn(), weighted_sum.view().into_dyn())?;
        }
        Ok(output.into_dyn())
    }

    /// Simplified gradient: one scalar delta, averaged over the batch, every
    /// position and every filter, stands in for the per-position deltas.
    fn backpropagate(&mut self, gradient: &ArrayD<f64>, optimizer: &mut dyn Optimizer) -> Result<ArrayD<f64>> {
        let examples = self.cache.require_examples(&self.name)?;
        let gradient = self.params.regularized(gradient);

        let weighted_sums = self.cache.weighted_sums();
        let gradient = broadcast_to(&gradient, weighted_sums.shape(), "conv1d gradient")?;
        let delta = (&gradient * &self.params.activation.gradient(&weighted_sums))
            .mean()
            .unwrap_or(0.0);

        let mean_input = self
            .cache
            .inputs()
            .mean_axis(Axis(0))
            .ok_or_else(|| NetworkError::Shape(format!("{} has an empty batch", self.name)))?;
        let signal = self.as_signal(&mean_input)?;
        let (length, channels) = signal.dim();
        let out_len = pooled_len(length, self.kernel_size, self.strides)?;

        let weights = self.params.weights.view().into_dimensionality::<Ix2>()?;
        let tap_weights = weights.sum_axis(Axis(0));

        let mut tap_inputs = Array1::<f64>::zeros(self.kernel_size);
        let mut previous = Array2::<f64>::zeros((length, channels));
        for position in 0..out_len {
            let start = position * self.strides;
            for tap in 0..self.kernel_size {
                let row = signal.row(start + tap);
                tap_inputs[tap] += row.sum();
                previous.row_mut(start + tap).mapv_inplace(|g| g + delta * tap_weights[tap]);
            }
        }

        let filters = self.filters();
        let weight_gradients = Array2::from_shape_fn((filters, self.kernel_size), |(_, tap)| delta * tap_inputs[tap]);
        let bias_gradients = Array1::from_elem(filters, delta);
        let previous = previous.into_shape_with_order(mean_input.shape())?;
        log::trace!("{}: delta {delta} over {examples} examples", self.name);

        self.params
            .apply_gradients(&weight_gradients.into_dyn(), &bias_gradients.into_dyn(), optimizer)?;
        Ok(previous)
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizers::Sgd;
    use ndarray::{array, IxDyn};

    #[test]
    fn test_backpropagate_simplified_gradient() {
        let mut conv = Conv1D::new(2, 2, 1, ActivationType::Linear);
        conv.params.weights = array![[1.0, 2.0], [0.0, 1.0]].into_dyn();
        conv.params.biases = array![0.0, 0.0].into_dyn();
        conv.set_batch_size(1, &[4], &[3, 2]);
        conv.forward(&array![1.0, 2.0, 3.0, 4.0].into_dyn(), true).unwrap();

        // delta = mean(0.5 * 1) = 0.5
        let gradient = ArrayD::from_elem(IxDyn(&[3, 2]), 0.5);
        let previous = conv.backpropagate(&gradient, &mut Sgd::new(1.0)).unwrap();

        // Tap sums over the three windows are [6, 9]; every filter gets delta * [6, 9]
        assert_eq!(conv.params.weights, array![[4.0, 6.5], [3.0, 5.5]].into_dyn());
        assert_eq!(conv.params.biases, array![0.5, 0.5].into_dyn());
        // delta * [1, 3] (filter-summed taps) scattered over windows 0..2, 1..3, 2..4
        assert_eq!(previous, array![0.5, 2.0, 2.0, 1.5].into_dyn());
    }
}
