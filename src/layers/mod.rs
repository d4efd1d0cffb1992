pub mod conv1d;
pub mod conv2d;
pub mod dense;
pub mod dropout;
pub mod input;
pub mod max_pool;
pub mod reshape;

use std::fmt::Debug;

use ndarray::{ArrayD, ArrayViewD, Axis, IxDyn, Slice};
use rand::RngCore;

use crate::activation::ActivationType;
use crate::error::{NetworkError, Result};
use crate::initializer::{DataType, WeightInitStrategy};
use crate::optimizers::Optimizer;
use crate::regularizer::Regularizer;
use crate::sequence::Neighbors;

/// Output geometry of a layer for a single example (no batch axis)
pub type Shape = Vec<usize>;

/// Trainable state shared by every parametric layer
#[derive(Debug)]
pub struct LayerParams {
    /// Units for dense layers, filters for convolutions
    pub units: usize,
    pub weights: ArrayD<f64>,
    pub biases: ArrayD<f64>,
    pub activation: ActivationType,
    pub regularizer: Option<Box<dyn Regularizer>>,
    pub trainable: bool,
}

impl LayerParams {
    pub fn new(units: usize, activation: ActivationType) -> Self {
        LayerParams {
            units,
            weights: ArrayD::zeros(IxDyn(&[0])),
            biases: ArrayD::zeros(IxDyn(&[0])),
            activation,
            regularizer: None,
            trainable: true,
        }
    }

    pub fn parameter_count(&self) -> usize {
        self.weights.len() + self.biases.len()
    }

    pub fn has_weights(&self) -> bool {
        !self.weights.is_empty()
    }

    pub(crate) fn require_weights(&self, layer: &str) -> Result<()> {
        if self.has_weights() {
            Ok(())
        } else {
            Err(NetworkError::Configuration(format!(
                "{layer} has no weights, generate them before running it"
            )))
        }
    }

    /// Runs the gradient through the regularizer, if any
    pub(crate) fn regularized(&self, gradient: &ArrayD<f64>) -> ArrayD<f64> {
        match &self.regularizer {
            Some(regularizer) => regularizer.penalize(gradient, &self.weights, &self.biases),
            None => gradient.clone(),
        }
    }

    /// Hands the gradients to the optimizer unless the layer is frozen
    pub(crate) fn apply_gradients(
        &mut self,
        weight_gradients: &ArrayD<f64>,
        bias_gradients: &ArrayD<f64>,
        optimizer: &mut dyn Optimizer,
    ) -> Result<()> {
        if !self.trainable {
            return Ok(());
        }
        optimizer.apply_gradients(weight_gradients, bias_gradients, &mut self.weights, &mut self.biases)
    }
}

/// Per-batch record of every example's forward pass, consumed by backpropagation.
///
/// Buffers are `[batch_size, *shape]`; `current_batch` counts the rows filled
/// since the last `reset`.
#[derive(Debug, Clone)]
pub struct BatchCache {
    pub batch_size: usize,
    pub current_batch: usize,
    pub inputs: ArrayD<f64>,
    pub outputs: ArrayD<f64>,
    pub weighted_sums: ArrayD<f64>,
}

impl Default for BatchCache {
    fn default() -> Self {
        BatchCache {
            batch_size: 0,
            current_batch: 0,
            inputs: ArrayD::zeros(IxDyn(&[0])),
            outputs: ArrayD::zeros(IxDyn(&[0])),
            weighted_sums: ArrayD::zeros(IxDyn(&[0])),
        }
    }
}

impl BatchCache {
    pub fn allocate(&mut self, batch_size: usize, input_shape: &[usize], output_shape: &[usize]) {
        let with_batch = |shape: &[usize]| {
            let mut full = Vec::with_capacity(shape.len() + 1);
            full.push(batch_size);
            full.extend_from_slice(shape);
            full
        };

        self.batch_size = batch_size;
        self.current_batch = 0;
        self.inputs = ArrayD::zeros(IxDyn(&with_batch(input_shape)));
        self.outputs = ArrayD::zeros(IxDyn(&with_batch(output_shape)));
        self.weighted_sums = ArrayD::zeros(IxDyn(&with_batch(output_shape)));
    }

    pub fn reset(&mut self) {
        self.current_batch = 0;
    }

    /// Stores one example's forward pass and advances the cursor
    pub fn record(
        &mut self,
        input: ArrayViewD<f64>,
        output: ArrayViewD<f64>,
        weighted_sum: ArrayViewD<f64>,
    ) -> Result<()> {
        if self.batch_size == 0 {
            return Err(NetworkError::Configuration(
                "batch buffers are not allocated, call set_batch_size first".to_string(),
            ));
        }
        if self.current_batch >= self.batch_size {
            return Err(NetworkError::Configuration(format!(
                "batch of {} examples is full, start a new batch before recording more",
                self.batch_size
            )));
        }
        if input.shape() != &self.inputs.shape()[1..] {
            return Err(NetworkError::Shape(format!(
                "input shape {:?} does not match the allocated {:?}",
                input.shape(),
                &self.inputs.shape()[1..]
            )));
        }
        if output.shape() != &self.outputs.shape()[1..] {
            return Err(NetworkError::Shape(format!(
                "output shape {:?} does not match the allocated {:?}",
                output.shape(),
                &self.outputs.shape()[1..]
            )));
        }

        let row = self.current_batch;
        self.inputs.index_axis_mut(Axis(0), row).assign(&input);
        self.outputs.index_axis_mut(Axis(0), row).assign(&output);
        self.weighted_sums.index_axis_mut(Axis(0), row).assign(&weighted_sum);
        self.current_batch += 1;
        Ok(())
    }

    pub fn inputs(&self) -> ArrayViewD<'_, f64> {
        self.inputs.slice_axis(Axis(0), Slice::from(..self.current_batch))
    }

    pub fn outputs(&self) -> ArrayViewD<'_, f64> {
        self.outputs.slice_axis(Axis(0), Slice::from(..self.current_batch))
    }

    pub fn weighted_sums(&self) -> ArrayViewD<'_, f64> {
        self.weighted_sums.slice_axis(Axis(0), Slice::from(..self.current_batch))
    }

    /// Number of recorded examples, failing when there is nothing to learn from
    pub(crate) fn require_examples(&self, layer: &str) -> Result<usize> {
        match self.current_batch {
            0 => Err(NetworkError::Configuration(format!(
                "{layer} has no recorded examples, run a training forward pass before backpropagating"
            ))),
            n => Ok(n),
        }
    }
}

/// Capability every layer kind provides.
///
/// The defaults describe a layer without parameters: nothing to generate,
/// nothing to record, and a backward pass that hands the gradient through.
pub trait LayerOps: Debug {
    fn name(&self) -> &str;

    fn kind(&self) -> &'static str;

    /// Output geometry, resolved by looking at the neighbouring layers
    fn output_shape(&self, neighbors: &Neighbors<'_>) -> Result<Shape>;

    fn generate_weights(
        &mut self,
        _input_shape: &[usize],
        _strategy: WeightInitStrategy,
        _dtype: DataType,
        _rng: &mut dyn RngCore,
    ) -> Result<()> {
        Ok(())
    }

    fn set_batch_size(&mut self, _batch_size: usize, _input_shape: &[usize], _output_shape: &[usize]) {}

    /// Rewinds the batch cursor
    fn start_batch(&mut self) {}

    fn forward(&mut self, x: &ArrayD<f64>, is_training: bool) -> Result<ArrayD<f64>>;

    /// Propagates `gradient` to the previous layer, updating this layer's parameters on the way
    fn backpropagate(&mut self, gradient: &ArrayD<f64>, _optimizer: &mut dyn Optimizer) -> Result<ArrayD<f64>> {
        Ok(gradient.clone())
    }

    fn params(&self) -> Option<&LayerParams> {
        None
    }

    fn params_mut(&mut self) -> Option<&mut LayerParams> {
        None
    }

    fn batch_cache(&self) -> Option<&BatchCache> {
        None
    }

    fn parameter_count(&self) -> usize {
        self.params().map_or(0, LayerParams::parameter_count)
    }

    /// Whether `backpropagate` can produce a gradient at all
    fn supports_backprop(&self) -> bool {
        true
    }
}

/// Every layer kind a sequence can hold
#[derive(Debug)]
pub enum Layer {
    Input(Input),
    Dense(Dense),
    Dropout(Dropout),
    Flatten(Flatten),
    Reshape(Reshape),
    MaxPool1D(MaxPool1D),
    MaxPool2D(MaxPool2D),
    Conv1D(Conv1D),
    Conv2D(Conv2D),
}

macro_rules! layer_variants {
    ($($variant:ident),*) => {
        impl Layer {
            pub fn ops(&self) -> &dyn LayerOps {
                match self {
                    $(Layer::$variant(layer) => layer,)*
                }
            }

            pub fn ops_mut(&mut self) -> &mut dyn LayerOps {
                match self {
                    $(Layer::$variant(layer) => layer,)*
                }
            }
        }

        $(
            impl From<$variant> for Layer {
                fn from(layer: $variant) -> Self {
                    Layer::$variant(layer)
                }
            }
        )*
    };
}

layer_variants!(Input, Dense, Dropout, Flatten, Reshape, MaxPool1D, MaxPool2D, Conv1D, Conv2D);

impl Layer {
    pub fn name(&self) -> &str {
        self.ops().name()
    }

    pub fn kind(&self) -> &'static str {
        self.ops().kind()
    }

    pub fn forward(&mut self, x: &ArrayD<f64>, is_training: bool) -> Result<ArrayD<f64>> {
        self.ops_mut().forward(x, is_training)
    }

    pub fn backpropagate(&mut self, gradient: &ArrayD<f64>, optimizer: &mut dyn Optimizer) -> Result<ArrayD<f64>> {
        self.ops_mut().backpropagate(gradient, optimizer)
    }

    pub fn start_batch(&mut self) {
        self.ops_mut().start_batch()
    }

    pub fn params(&self) -> Option<&LayerParams> {
        self.ops().params()
    }

    pub fn params_mut(&mut self) -> Option<&mut LayerParams> {
        self.ops_mut().params_mut()
    }

    pub fn batch_cache(&self) -> Option<&BatchCache> {
        self.ops().batch_cache()
    }

    pub fn parameter_count(&self) -> usize {
        self.ops().parameter_count()
    }

    pub fn supports_backprop(&self) -> bool {
        self.ops().supports_backprop()
    }

    /// Whether backpropagation updates this layer's parameters
    pub fn is_trainable(&self) -> bool {
        self.params().is_some_and(|params| params.trainable)
    }
}

pub use conv1d::Conv1D;
pub use conv2d::Conv2D;
pub use dense::Dense;
pub use dropout::Dropout;
pub use input::Input;
pub use max_pool::{MaxPool1D, MaxPool2D};
pub use reshape::{Flatten, GradientReshape, Reshape};
