use ndarray::{s, Array3, ArrayD, Axis, Ix3};

use super::{LayerOps, Shape};
use crate::error::{NetworkError, Result};
use crate::optimizers::Optimizer;
use crate::sequence::Neighbors;

/// Number of full windows of `kernel` taken every `stride` steps over `len` elements
pub fn pooled_len(len: usize, kernel: usize, stride: usize) -> Result<usize> {
    if kernel == 0 || stride == 0 {
        return Err(NetworkError::Configuration(format!(
            "kernel ({kernel}) and stride ({stride}) must be positive"
        )));
    }
    if kernel > len {
        return Err(NetworkError::Shape(format!(
            "window of {kernel} doesn't fit an input of length {len}"
        )));
    }
    Ok((len - kernel) / stride + 1)
}

/// 1-D max pooling along the first axis
#[derive(Debug, Clone)]
pub struct MaxPool1D {
    pub name: String,
    pub kernel_size: usize,
    pub strides: usize,
}

impl MaxPool1D {
    pub fn new(kernel_size: usize, strides: usize) -> Self {
        MaxPool1D {
            name: "MaxPool1D".to_string(),
            kernel_size,
            strides,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// `ceil((len - kernel + 1) / stride)`
    fn output_len(&self, len: usize) -> Result<usize> {
        pooled_len(len, self.kernel_size, self.strides)?;
        Ok((len - self.kernel_size + 1).div_ceil(self.strides))
    }
}

impl Default for MaxPool1D {
    fn default() -> Self {
        Self::new(2, 2)
    }
}

impl LayerOps for MaxPool1D {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "MaxPool1D"
    }

    fn output_shape(&self, neighbors: &Neighbors<'_>) -> Result<Shape> {
        let mut shape = neighbors.previous_shape()?;
        let len = *shape.first().ok_or_else(|| {
            NetworkError::Shape(format!("{} needs an input with at least one axis", self.name))
        })?;
        shape[0] = self.output_len(len)?;
        Ok(shape)
    }

    fn forward(&mut self, x: &ArrayD<f64>, _is_training: bool) -> Result<ArrayD<f64>> {
        if x.ndim() == 0 {
            return Err(NetworkError::Shape(format!("{} needs an input with at least one axis", self.name)));
        }
        let len = x.len_of(Axis(0));
        let out_len = self.output_len(len)?;

        let mut shape = x.shape().to_vec();
        shape[0] = out_len;
        let mut output = ArrayD::from_elem(shape, f64::NEG_INFINITY);

        for (i, mut row) in output.axis_iter_mut(Axis(0)).enumerate() {
            let start = i * self.strides;
            for window_row in x.slice_axis(Axis(0), (start..start + self.kernel_size).into()).axis_iter(Axis(0)) {
                row.zip_mut_with(&window_row, |max, &v| *max = max.max(v));
            }
        }

        Ok(output)
    }

    // Identity: the gradient is not routed back to the window maxima
}

/// 2-D max pooling over `[height, width]` or `[height, width, channels]`, each channel on its own
#[derive(Debug, Clone)]
pub struct MaxPool2D {
    pub name: String,
    pub pool_size: (usize, usize),
    pub strides: (usize, usize),
}

impl MaxPool2D {
    pub fn new(pool_size: (usize, usize), strides: (usize, usize)) -> Self {
        MaxPool2D {
            name: "MaxPool2D".to_string(),
            pool_size,
            strides,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    fn spatial_output(&self, height: usize, width: usize) -> Result<(usize, usize)> {
        Ok((
            pooled_len(height, self.pool_size.0, self.strides.0)?,
            pooled_len(width, self.pool_size.1, self.strides.1)?,
        ))
    }
}

impl Default for MaxPool2D {
    fn default() -> Self {
        Self::new((2, 2), (2, 2))
    }
}

impl LayerOps for MaxPool2D {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "MaxPool2D"
    }

    fn output_shape(&self, neighbors: &Neighbors<'_>) -> Result<Shape> {
        let input_shape = neighbors.previous_shape()?;
        match input_shape.as_slice() {
            &[height, width] => {
                let (h, w) = self.spatial_output(height, width)?;
                Ok(vec![h, w])
            }
            &[height, width, channels] => {
                let (h, w) = self.spatial_output(height, width)?;
                Ok(vec![h, w, channels])
            }
            other => Err(NetworkError::Shape(format!(
                "{} expects a [height, width] or [height, width, channels] input, got {:?}",
                self.name, other
            ))),
        }
    }

    fn forward(&mut self, x: &ArrayD<f64>, _is_training: bool) -> Result<ArrayD<f64>> {
        let image = match x.ndim() {
            2 => x.view().insert_axis(Axis(2)).into_dimensionality::<Ix3>()?,
            3 => x.view().into_dimensionality::<Ix3>()?,
            _ => {
                return Err(NetworkError::Shape(format!(
                    "{} expects a [height, width] or [height, width, channels] input, got {:?}",
                    self.name,
                    x.shape()
                )))
            }
        };

        let (height, width, channels) = image.dim();
        let (out_h, out_w) = self.spatial_output(height, width)?;
        let (pool_h, pool_w) = self.pool_size;
        let (stride_h, stride_w) = self.strides;

        let output = Array3::from_shape_fn((out_h, out_w, channels), |(i, j, c)| {
            let (top, left) = (i * stride_h, j * stride_w);
            image
                .slice(s![top..top + pool_h, left..left + pool_w, c])
                .fold(f64::NEG_INFINITY, |max, &v| max.max(v))
        });

        if x.ndim() == 2 {
            Ok(output.index_axis_move(Axis(2), 0).into_dyn())
        } else {
            Ok(output.into_dyn())
        }
    }

    fn supports_backprop(&self) -> bool {
        false
    }

    fn backpropagate(&mut self, _gradient: &ArrayD<f64>, _optimizer: &mut dyn Optimizer) -> Result<ArrayD<f64>> {
        Err(NetworkError::NotImplemented(format!(
            "{} backpropagation; keep MaxPool2D out of the gradient path or use strides on the convolution instead",
            self.name
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pooled_len() {
        assert_eq!(pooled_len(6, 2, 2).unwrap(), 3);
        assert_eq!(pooled_len(5, 2, 2).unwrap(), 2);
        assert_eq!(pooled_len(4, 4, 1).unwrap(), 1);
        assert!(pooled_len(1, 2, 1).is_err());
        assert!(matches!(pooled_len(4, 2, 0), Err(NetworkError::Configuration(_))));
    }

    #[test]
    fn test_ceil_and_floor_forms_agree() {
        let pool = MaxPool1D::new(3, 2);
        for len in 3..20 {
            assert_eq!(pool.output_len(len).unwrap(), pooled_len(len, 3, 2).unwrap());
        }
    }
}
