use ndarray::{Array1, Array2, Array3, Array4, ArrayD, ArrayView3, Axis, Ix1, Ix4};
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

/// 2-D convolution over `[height, width]` or `[height, width, channels]` inputs.
///
/// Weights are `[kernel_h, kernel_w, channels, filters]`; the output is
/// `[out_h, out_w, filters]` with `out = floor((in - kernel) / stride) + 1`.
/// The forward pass is lowered to a single matrix product through `im2col`.
#[derive(Debug)]
pub struct Conv2D {
    pub name: String,
    pub params: LayerParams,
    pub kernel_size: (usize, usize),
    pub strides: (usize, usize),
    pub cache: BatchCache,
}

impl Conv2D {
    pub fn new(
        filters: usize,
        kernel_size: (usize, usize),
        strides: (usize, usize),
        activation: ActivationType,
    ) -> Self {
        Conv2D {
            name: "Conv2D".to_string(),
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

    /// `(height, width, channels)` of an input shape
    fn image_dims(&self, shape: &[usize]) -> Result<(usize, usize, usize)> {
        match *shape {
            [height, width] => Ok((height, width, 1)),
            [height, width, channels] => Ok((height, width, channels)),
            _ => Err(NetworkError::Shape(format!(
                "{} expects a [height, width] or [height, width, channels] input, got {:?}",
                self.name, shape
            ))),
        }
    }

    fn as_image<'a>(&self, x: &'a ArrayD<f64>) -> Result<ArrayView3<'a, f64>> {
        let dims = self.image_dims(x.shape())?;
        Ok(x.view().into_shape_with_order(dims)?)
    }

    fn spatial_output(&self, height: usize, width: usize) -> Result<(usize, usize)> {
        Ok((
            pooled_len(height, self.kernel_size.0, self.strides.0)?,
            pooled_len(width, self.kernel_size.1, self.strides.1)?,
        ))
    }

    /// Gathers every kernel-sized patch of `image` into a column.
    ///
    /// Row `channel * kh * kw + a * kw + b` holds kernel tap `(a, b)` of
    /// `channel`; column `i * out_w + j` is output position `(i, j)`.
    pub fn im2col(&self, image: &ArrayView3<f64>) -> Result<Array2<f64>> {
        let (height, width, channels) = image.dim();
        let (out_h, out_w) = self.spatial_output(height, width)?;
        let (kernel_h, kernel_w) = self.kernel_size;
        let (stride_h, stride_w) = self.strides;

        let mut cols = Array2::zeros((kernel_h * kernel_w * channels, out_h * out_w));
        for channel in 0..channels {
            for a in 0..kernel_h {
                for b in 0..kernel_w {
                    let row = channel * kernel_h * kernel_w + a * kernel_w + b;
                    for i in 0..out_h {
                        for j in 0..out_w {
                            cols[[row, i * out_w + j]] = image[[i * stride_h + a, j * stride_w + b, channel]];
                        }
                    }
                }
            }
        }
        Ok(cols)
    }

    /// Filter bank as `[filters, kh * kw * channels]`, rows ordered like `im2col`
    fn filter_matrix(&self) -> Result<Array2<f64>> {
        let weights = self.params.weights.view().into_dimensionality::<Ix4>()?;
        let (kernel_h, kernel_w, channels, filters) = weights.dim();
        let taps = kernel_h * kernel_w;

        Ok(Array2::from_shape_fn((filters, taps * channels), |(filter, row)| {
            let channel = row / taps;
            let a = (row % taps) / kernel_w;
            let b = row % kernel_w;
            weights[[a, b, channel, filter]]
        }))
    }
}

impl Default for Conv2D {
    fn default() -> Self {
        Self::new(1, (2, 2), (1, 1), ActivationType::ReLU)
    }
}

impl LayerOps for Conv2D {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "Conv2D"
    }

    fn output_shape(&self, neighbors: &Neighbors<'_>) -> Result<Shape> {
        let (height, width, _) = self.image_dims(&neighbors.previous_shape()?)?;
        let (out_h, out_w) = self.spatial_output(height, width)?;
        Ok(vec![out_h, out_w, self.filters()])
    }

    fn generate_weights(
        &mut self,
        input_shape: &[usize],
        strategy: WeightInitStrategy,
        dtype: DataType,
        rng: &mut dyn RngCore,
    ) -> Result<()> {
        let (_, _, channels) = self.image_dims(input_shape)?;
        let (kernel_h, kernel_w) = self.kernel_size;
        let filters = self.filters();
        let fan_in = channels * kernel_h * kernel_w;
        let (weights, biases) = strategy.initialize(
            &[kernel_h, kernel_w, channels, filters],
            filters,
            fan_in,
            filters,
            dtype,
            rng,
        )?;
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
        let image = self.as_image(x)?;
        let (height, width, channels) = image.dim();
        let (out_h, out_w) = self.spatial_output(height, width)?;

        let filters = self.filter_matrix()?;
        if filters.ncols() != self.kernel_size.0 * self.kernel_size.1 * channels {
            return Err(NetworkError::Shape(format!(
                "{} weights were generated for a different channel count than {channels}",
                self.name
            )));
        }
        let biases = self.params.biases.view().into_dimensionality::<Ix1>()?;

        // [filters, positions]
        let products = filters.dot(&self.im2col(&image)?);
        let weighted_sum = Array3::from_shape_fn((out_h, out_w, self.filters()), |(i, j, filter)| {
            products[[filter, i * out_w + j]] + biases[filter]
        });

        let output = self.params.activation.forward(&weighted_sum);
        if is_training {
            self.cache.record(x.view(), output.view().into_dyn(), weighted_sum.view().into_dyn())?;
        }
        Ok(output.into_dyn())
    }

    /// Simplified gradient: one scalar delta, averaged over the batch, every
    /// position and every filter, is broadcast across the kernel footprint in
    /// place of a full transposed convolution.
    fn backpropagate(&mut self, gradient: &ArrayD<f64>, optimizer: &mut dyn Optimizer) -> Result<ArrayD<f64>> {
        let examples = self.cache.require_examples(&self.name)?;
        let gradient = self.params.regularized(gradient);

        let weighted_sums = self.cache.weighted_sums();
        let gradient = broadcast_to(&gradient, weighted_sums.shape(), "conv2d gradient")?;
        let delta = (&gradient * &self.params.activation.gradient(&weighted_sums))
            .mean()
            .unwrap_or(0.0);

        let mean_input = self
            .cache
            .inputs()
            .mean_axis(Axis(0))
            .ok_or_else(|| NetworkError::Shape(format!("{} has an empty batch", self.name)))?;
        let image = self.as_image(&mean_input)?;
        let (height, width, channels) = image.dim();
        let (out_h, out_w) = self.spatial_output(height, width)?;
        let (kernel_h, kernel_w) = self.kernel_size;
        let (stride_h, stride_w) = self.strides;

        let weights = self.params.weights.view().into_dimensionality::<Ix4>()?;
        // Σ over filters for every (a, b, channel) tap
        let tap_weights = weights.sum_axis(Axis(3));

        let mut tap_inputs = Array3::<f64>::zeros((kernel_h, kernel_w, channels));
        let mut previous = Array3::<f64>::zeros((height, width, channels));
        for i in 0..out_h {
            for j in 0..out_w {
                let (top, left) = (i * stride_h, j * stride_w);
                for a in 0..kernel_h {
                    for b in 0..kernel_w {
                        for channel in 0..channels {
                            tap_inputs[[a, b, channel]] += image[[top + a, left + b, channel]];
                            previous[[top + a, left + b, channel]] += delta * tap_weights[[a, b, channel]];
                        }
                    }
                }
            }
        }

        let filters = self.filters();
        let weight_gradients = Array4::from_shape_fn((kernel_h, kernel_w, channels, filters), |(a, b, channel, _)| {
            delta * tap_inputs[[a, b, channel]]
        });
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
