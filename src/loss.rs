use ndarray::ArrayD;

use crate::error::{NetworkError, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Loss {
    MeanSquaredError,
}

impl Loss {
    pub fn calculate(&self, prediction: &ArrayD<f64>, target: &ArrayD<f64>) -> Result<f64> {
        check_shapes(prediction, target)?;
        match self {
            Loss::MeanSquaredError => {
                let squared = (target - prediction).mapv(|x| x * x);
                Ok(squared.mean().unwrap_or(0.0))
            }
        }
    }

    /// Gradient handed to the last layer's `backpropagate`.
    ///
    /// Optimizers add their step to the parameters, so this points downhill:
    /// `target - prediction`.
    pub fn gradient(&self, prediction: &ArrayD<f64>, target: &ArrayD<f64>) -> Result<ArrayD<f64>> {
        check_shapes(prediction, target)?;
        match self {
            Loss::MeanSquaredError => Ok(target - prediction),
        }
    }
}

fn check_shapes(prediction: &ArrayD<f64>, target: &ArrayD<f64>) -> Result<()> {
    if prediction.shape() != target.shape() {
        return Err(NetworkError::Shape(format!(
            "prediction shape {:?} does not match target shape {:?}",
            prediction.shape(),
            target.shape()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_mean_squared_error() {
        let prediction = array![1.0, 2.0].into_dyn();
        let target = array![2.0, 4.0].into_dyn();

        let loss = Loss::MeanSquaredError.calculate(&prediction, &target).unwrap();
        assert_eq!(loss, 2.5);

        let gradient = Loss::MeanSquaredError.gradient(&prediction, &target).unwrap();
        assert_eq!(gradient, array![1.0, 2.0].into_dyn());
    }

    #[test]
    fn test_shape_mismatch() {
        let prediction = array![1.0, 2.0].into_dyn();
        let target = array![2.0].into_dyn();
        assert!(Loss::MeanSquaredError.calculate(&prediction, &target).is_err());
    }
}
