use std::fmt::Write as _;

use ndarray::{ArrayD, ArrayViewD, Axis};
use rand::RngCore;

use crate::error::{NetworkError, Result};
use crate::hyperparameters::NetworkConfig;
use crate::initializer::{DataType, WeightInitStrategy};
use crate::layers::Layer;
use crate::loss::Loss;
use crate::optimizers::Optimizer;
use crate::sequence::Sequence;

/// Ordered stack of layers, each trained by its own optimizer instance
#[derive(Debug)]
pub struct Network {
    pub name: String,
    pub loss: Loss,
    sequence: Sequence,
    optimizers: Vec<Box<dyn Optimizer>>,
    batch_size: usize,
}

impl Network {
    pub fn new(loss: Loss) -> Self {
        Network {
            name: "Network".to_string(),
            loss,
            sequence: Sequence::new(),
            optimizers: Vec::new(),
            batch_size: 0,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Appends a layer. The network has to be compiled again before it runs.
    pub fn add(&mut self, layer: impl Into<Layer>) -> &mut Self {
        self.sequence.push(layer);
        self.optimizers.clear();
        self
    }

    pub fn sequence(&self) -> &Sequence {
        &self.sequence
    }

    pub fn sequence_mut(&mut self) -> &mut Sequence {
        &mut self.sequence
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn is_compiled(&self) -> bool {
        !self.sequence.is_empty() && self.optimizers.len() == self.sequence.len()
    }

    /// Compiles with weights drawn from the thread-local generator
    pub fn compile(&mut self, config: &NetworkConfig, optimizer: &dyn Optimizer) -> Result<()> {
        self.compile_with_rng(config, optimizer, &mut rand::rng())
    }

    /// Resolves every layer's shape, generates weights, allocates the batch
    /// buffers and hands each layer its own copy of `optimizer`.
    pub fn compile_with_rng(
        &mut self,
        config: &NetworkConfig,
        optimizer: &dyn Optimizer,
        rng: &mut dyn RngCore,
    ) -> Result<()> {
        if self.sequence.is_empty() {
            return Err(NetworkError::Configuration(format!("{} has no layers to compile", self.name)));
        }
        let strategy: WeightInitStrategy = config.weight_init.parse()?;
        let dtype: DataType = config.dtype.parse()?;

        for index in 0..self.sequence.len() {
            self.sequence.output_shape(index)?;
        }
        for index in 0..self.sequence.len() {
            self.sequence.generate_weights(index, strategy, dtype, rng)?;
        }
        self.set_batch_size(config.batch_size)?;

        self.optimizers = (0..self.sequence.len()).map(|_| optimizer.clone_box()).collect();

        let (trainable, non_trainable) = self.parameter_count();
        log::info!(
            "compiled {} with {} layers, {trainable} trainable and {non_trainable} frozen parameters",
            self.name,
            self.sequence.len()
        );
        Ok(())
    }

    /// Reallocates every layer's batch buffers, discarding recorded examples
    pub fn set_batch_size(&mut self, batch_size: usize) -> Result<()> {
        if batch_size == 0 {
            return Err(NetworkError::Configuration("batch size must be positive".to_string()));
        }
        for index in 0..self.sequence.len() {
            self.sequence.set_batch_size(batch_size, index)?;
        }
        self.batch_size = batch_size;
        log::debug!("{}: batch size set to {batch_size}", self.name);
        Ok(())
    }

    pub fn start_batch(&mut self) {
        for layer in self.sequence.iter_mut() {
            layer.start_batch();
        }
    }

    /// Runs one example through every layer in order
    pub fn forward(&mut self, x: &ArrayD<f64>, is_training: bool) -> Result<ArrayD<f64>> {
        let mut layers = self.sequence.iter_mut();
        let mut output = match layers.next() {
            Some(first) => first.forward(x, is_training)?,
            None => return Err(NetworkError::Configuration(format!("{} has no layers", self.name))),
        };
        for layer in layers {
            output = layer.forward(&output, is_training)?;
        }
        Ok(output)
    }

    pub fn predict(&mut self, x: &ArrayD<f64>) -> Result<ArrayD<f64>> {
        self.forward(x, false)
    }

    /// Feeds `gradient` to the last layer and walks the sequence backwards,
    /// each layer updating its parameters with its own optimizer.
    ///
    /// Returns the gradient with respect to the network input.
    pub fn backpropagate(&mut self, gradient: &ArrayD<f64>) -> Result<ArrayD<f64>> {
        if !self.is_compiled() {
            return Err(NetworkError::Configuration(format!(
                "{} must be compiled before backpropagating",
                self.name
            )));
        }

        // Fail before any layer has been updated
        if let Some(layer) = self.sequence.iter().find(|layer| !layer.supports_backprop()) {
            return Err(NetworkError::NotImplemented(format!(
                "{} ({}) can't backpropagate, so {} can't be trained",
                layer.name(),
                layer.kind(),
                self.name
            )));
        }

        let mut gradient = gradient.clone();
        for (layer, optimizer) in self.sequence.iter_mut().zip(self.optimizers.iter_mut()).rev() {
            gradient = layer.backpropagate(&gradient, optimizer.as_mut())?;
        }
        Ok(gradient)
    }

    /// Runs one batch: a training forward pass per example, then a single
    /// backward pass with the per-example loss gradients stacked along the
    /// batch axis. Returns the mean loss over the batch.
    pub fn train_batch(&mut self, inputs: &[ArrayD<f64>], targets: &[ArrayD<f64>]) -> Result<f64> {
        if inputs.len() != targets.len() || inputs.is_empty() {
            return Err(NetworkError::Configuration(format!(
                "a batch needs matching, non-empty inputs and targets, got {} and {}",
                inputs.len(),
                targets.len()
            )));
        }

        self.start_batch();
        let mut total_loss = 0.0;
        let mut gradients = Vec::with_capacity(inputs.len());
        for (input, target) in inputs.iter().zip(targets) {
            let prediction = self.forward(input, true)?;
            total_loss += self.loss.calculate(&prediction, target)?;
            gradients.push(self.loss.gradient(&prediction, target)?);
        }

        let views: Vec<ArrayViewD<f64>> = gradients.iter().map(|g| g.view()).collect();
        let stacked = ndarray::stack(Axis(0), &views)?;
        self.backpropagate(&stacked)?;

        let loss = total_loss / inputs.len() as f64;
        log::debug!("{}: batch of {} examples, loss {loss}", self.name, inputs.len());
        Ok(loss)
    }

    /// `(trainable, non_trainable)` parameter counts
    pub fn parameter_count(&self) -> (usize, usize) {
        self.sequence.iter().fold((0, 0), |(trainable, frozen), layer| {
            let count = layer.parameter_count();
            if layer.is_trainable() {
                (trainable + count, frozen)
            } else {
                (trainable, frozen + count)
            }
        })
    }

    /// Table of every layer's name, kind, activation, output shape and parameter count
    pub fn summary(&self) -> String {
        let rule = "-".repeat(84);
        let mut out = String::new();
        let _ = writeln!(out, "{}", self.name);
        let _ = writeln!(out, "{rule}");
        let _ = writeln!(
            out,
            "{:<20} {:<12} {:<11} {:<24} {:>12}",
            "Layer", "Kind", "Activation", "Output shape", "Params"
        );
        let _ = writeln!(out, "{rule}");

        for (index, layer) in self.sequence.iter().enumerate() {
            let shape = match self.sequence.output_shape(index) {
                Ok(shape) => format!("{shape:?}"),
                Err(_) => "?".to_string(),
            };
            let _ = writeln!(
                out,
                "{:<20} {:<12} {:<11} {:<24} {:>12}",
                layer.name(),
                layer.kind(),
                layer.params().map_or("-", |params| params.activation.name()),
                shape,
                layer.parameter_count()
            );
        }

        let (trainable, non_trainable) = self.parameter_count();
        let _ = writeln!(out, "{rule}");
        let _ = writeln!(out, "Total params: {}", trainable + non_trainable);
        let _ = writeln!(out, "Trainable params: {trainable}");
        let _ = writeln!(out, "Non-trainable params: {non_trainable}");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::ActivationType;
    use crate::layers::{Dense, Input};
    use crate::optimizers::Sgd;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn small_network() -> Network {
        let mut network = Network::new(Loss::MeanSquaredError);
        network
            .add(Input::new(vec![3]))
            .add(Dense::new(4, ActivationType::ReLU))
            .add(Dense::new(2, ActivationType::Linear).trainable(false));
        network
    }

    #[test]
    fn test_backpropagate_requires_compile() {
        let mut network = small_network();
        let gradient = ArrayD::zeros(vec![2]);
        assert!(matches!(network.backpropagate(&gradient), Err(NetworkError::Configuration(_))));
    }

    #[test]
    fn test_summary_lists_every_layer() {
        let mut network = small_network();
        let mut rng = StdRng::seed_from_u64(7);
        network
            .compile_with_rng(&NetworkConfig::default(), &Sgd::new(0.1), &mut rng)
            .unwrap();

        let summary = network.summary();
        assert!(summary.contains("Input"));
        assert!(summary.contains("[4]"));
        assert!(summary.contains("relu"));
        assert!(summary.contains("linear"));
        assert!(summary.contains("Trainable params: 16"));
        assert!(summary.contains("Non-trainable params: 10"));
    }

    #[test]
    fn test_add_invalidates_compilation() {
        let mut network = small_network();
        let mut rng = StdRng::seed_from_u64(7);
        network
            .compile_with_rng(&NetworkConfig::default(), &Sgd::new(0.1), &mut rng)
            .unwrap();
        assert!(network.is_compiled());

        network.add(Dense::new(1, ActivationType::Linear));
        assert!(!network.is_compiled());
    }
}
