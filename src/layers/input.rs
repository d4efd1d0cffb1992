use ndarray::ArrayD;

use super::{LayerOps, Shape};
use crate::error::{NetworkError, Result};
use crate::sequence::Neighbors;

/// Declares the shape of the examples fed to the network
#[derive(Debug, Clone)]
pub struct Input {
    pub name: String,
    pub input_shape: Shape,
}

impl Input {
    pub fn new(input_shape: impl Into<Shape>) -> Self {
        Input {
            name: "Input".to_string(),
            input_shape: input_shape.into(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl LayerOps for Input {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "Input"
    }

    fn output_shape(&self, _neighbors: &Neighbors<'_>) -> Result<Shape> {
        Ok(self.input_shape.clone())
    }

    fn forward(&mut self, x: &ArrayD<f64>, _is_training: bool) -> Result<ArrayD<f64>> {
        if x.shape() != self.input_shape.as_slice() {
            return Err(NetworkError::Shape(format!(
                "{} expects examples of shape {:?}, got {:?}",
                self.name,
                self.input_shape,
                x.shape()
            )));
        }
        Ok(x.clone())
    }
}
