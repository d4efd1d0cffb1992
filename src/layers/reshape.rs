use ndarray::{ArrayD, IxDyn};

use super::{LayerOps, Shape};
use crate::error::{NetworkError, Result};
use crate::optimizers::Optimizer;
use crate::sequence::Neighbors;
use crate::utils::size_of;

/// Outcome of restoring a gradient to the shape seen on the forward pass
#[derive(Debug, Clone, PartialEq)]
pub enum GradientReshape {
    Reshaped(ArrayD<f64>),
    /// The gradient couldn't take the recorded shape and is passed on as it came in.
    /// Layers below may then receive a gradient of the wrong geometry.
    PassthroughUnreshaped(ArrayD<f64>),
}

impl GradientReshape {
    pub fn into_inner(self) -> ArrayD<f64> {
        match self {
            GradientReshape::Reshaped(gradient) | GradientReshape::PassthroughUnreshaped(gradient) => gradient,
        }
    }
}

/// Restores `gradient` to `original_shape` when the element counts agree
fn restore_shape(gradient: &ArrayD<f64>, original_shape: Option<&[usize]>) -> GradientReshape {
    match original_shape {
        Some(shape) if size_of(shape) == gradient.len() => {
            let flat: Vec<f64> = gradient.iter().copied().collect();
            match ArrayD::from_shape_vec(IxDyn(shape), flat) {
                Ok(reshaped) => GradientReshape::Reshaped(reshaped),
                Err(_) => GradientReshape::PassthroughUnreshaped(gradient.clone()),
            }
        }
        _ => GradientReshape::PassthroughUnreshaped(gradient.clone()),
    }
}

fn log_passthrough(name: &str, gradient: &ArrayD<f64>, original_shape: Option<&[usize]>) {
    log::warn!(
        "{name}: gradient of shape {:?} can't be restored to {:?}, passing it through unreshaped",
        gradient.shape(),
        original_shape
    );
}

/// Flattens each example into a vector
#[derive(Debug, Clone)]
pub struct Flatten {
    pub name: String,
    original_shape: Option<Shape>,
}

impl Flatten {
    pub fn new() -> Self {
        Flatten {
            name: "Flatten".to_string(),
            original_shape: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Undoes the flattening of the last forward pass
    pub fn unflatten(&self, gradient: &ArrayD<f64>) -> GradientReshape {
        restore_shape(gradient, self.original_shape.as_deref())
    }
}

impl Default for Flatten {
    fn default() -> Self {
        Self::new()
    }
}

impl LayerOps for Flatten {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "Flatten"
    }

    fn output_shape(&self, neighbors: &Neighbors<'_>) -> Result<Shape> {
        neighbors.require_successor(self.kind())?;
        let input_shape = neighbors.previous_shape()?;
        Ok(vec![size_of(&input_shape)])
    }

    fn forward(&mut self, x: &ArrayD<f64>, _is_training: bool) -> Result<ArrayD<f64>> {
        self.original_shape = Some(x.shape().to_vec());
        let flat: Vec<f64> = x.iter().copied().collect();
        Ok(ArrayD::from_shape_vec(IxDyn(&[flat.len()]), flat)?)
    }

    fn backpropagate(&mut self, gradient: &ArrayD<f64>, _optimizer: &mut dyn Optimizer) -> Result<ArrayD<f64>> {
        let restored = self.unflatten(gradient);
        if let GradientReshape::PassthroughUnreshaped(_) = restored {
            log_passthrough(&self.name, gradient, self.original_shape.as_deref());
        }
        Ok(restored.into_inner())
    }
}

/// Reinterprets each example as `target_shape`
#[derive(Debug, Clone)]
pub struct Reshape {
    pub name: String,
    pub target_shape: Shape,
    original_shape: Option<Shape>,
}

impl Reshape {
    pub fn new(target_shape: impl Into<Shape>) -> Self {
        Reshape {
            name: "Reshape".to_string(),
            target_shape: target_shape.into(),
            original_shape: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Undoes the reshaping of the last forward pass
    pub fn restore(&self, gradient: &ArrayD<f64>) -> GradientReshape {
        restore_shape(gradient, self.original_shape.as_deref())
    }
}

impl LayerOps for Reshape {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "Reshape"
    }

    fn output_shape(&self, neighbors: &Neighbors<'_>) -> Result<Shape> {
        neighbors.require_successor(self.kind())?;
        let input_shape = neighbors.previous_shape()?;
        if size_of(&input_shape) != size_of(&self.target_shape) {
            return Err(NetworkError::Shape(format!(
                "{} can't reshape {:?} into {:?}",
                self.name, input_shape, self.target_shape
            )));
        }
        Ok(self.target_shape.clone())
    }

    fn forward(&mut self, x: &ArrayD<f64>, _is_training: bool) -> Result<ArrayD<f64>> {
        if x.len() != size_of(&self.target_shape) {
            return Err(NetworkError::Shape(format!(
                "{} can't reshape {:?} into {:?}",
                self.name,
                x.shape(),
                self.target_shape
            )));
        }
        self.original_shape = Some(x.shape().to_vec());
        let flat: Vec<f64> = x.iter().copied().collect();
        Ok(ArrayD::from_shape_vec(IxDyn(&self.target_shape), flat)?)
    }

    fn backpropagate(&mut self, gradient: &ArrayD<f64>, _optimizer: &mut dyn Optimizer) -> Result<ArrayD<f64>> {
        let restored = self.restore(gradient);
        if let GradientReshape::PassthroughUnreshaped(_) = restored {
            log_passthrough(&self.name, gradient, self.original_shape.as_deref());
        }
        Ok(restored.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_unflatten_restores_forward_shape() {
        let mut flatten = Flatten::new();
        let x = array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]].into_dyn();
        let flat = flatten.forward(&x, true).unwrap();
        assert_eq!(flat, array![1.0, 2.0, 3.0, 4.0, 5.0, 6.0].into_dyn());

        let restored = flatten.unflatten(&flat);
        assert_eq!(restored, GradientReshape::Reshaped(x));
    }

    #[test]
    fn test_incompatible_gradient_passes_through() {
        let mut flatten = Flatten::new();
        flatten.forward(&array![[1.0, 2.0], [3.0, 4.0]].into_dyn(), true).unwrap();

        let gradient = array![1.0, 2.0, 3.0].into_dyn();
        assert_eq!(
            flatten.unflatten(&gradient),
            GradientReshape::PassthroughUnreshaped(gradient.clone())
        );
    }

    #[test]
    fn test_reshape_forward_and_restore() {
        let mut reshape = Reshape::new(vec![2, 2]);
        let x = array![1.0, 2.0, 3.0, 4.0].into_dyn();
        let y = reshape.forward(&x, false).unwrap();
        assert_eq!(y, array![[1.0, 2.0], [3.0, 4.0]].into_dyn());
        assert_eq!(reshape.restore(&y), GradientReshape::Reshaped(x));

        assert!(reshape.forward(&array![1.0, 2.0, 3.0].into_dyn(), false).is_err());
    }
}
