use ndarray::{ArrayD, ArrayViewD, IxDyn, Slice};

use crate::error::{NetworkError, Result};

/// Returns `array` zero-extended or truncated to `shape`, keeping the overlapping region.
///
/// Arrays of a different rank can't share a region, so they are replaced with zeros.
pub fn resize_zero_filled(array: &ArrayD<f64>, shape: &[usize]) -> ArrayD<f64> {
    if array.shape() == shape {
        return array.clone();
    }

    let mut resized = ArrayD::zeros(IxDyn(shape));
    if array.ndim() != shape.len() {
        return resized;
    }

    let overlap: Vec<usize> = array
        .shape()
        .iter()
        .zip(shape)
        .map(|(&old, &new)| old.min(new))
        .collect();
    resized
        .slice_each_axis_mut(|ax| Slice::from(0..overlap[ax.axis.index()]))
        .assign(&array.slice_each_axis(|ax| Slice::from(0..overlap[ax.axis.index()])));
    resized
}

/// Broadcasts `gradient` onto `shape`, failing with a shape error when that isn't possible
pub fn broadcast_to<'a>(gradient: &'a ArrayD<f64>, shape: &[usize], what: &str) -> Result<ArrayViewD<'a, f64>> {
    gradient.broadcast(IxDyn(shape)).ok_or_else(|| {
        NetworkError::Shape(format!(
            "{what} of shape {:?} can't be broadcast to {:?}",
            gradient.shape(),
            shape
        ))
    })
}

/// Row-major shape product
pub fn size_of(shape: &[usize]) -> usize {
    shape.iter().product()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_resize_grows_and_keeps_overlap() {
        let original = array![[1.0, 2.0], [3.0, 4.0]].into_dyn();
        let resized = resize_zero_filled(&original, &[2, 3]);
        assert_eq!(resized, array![[1.0, 2.0, 0.0], [3.0, 4.0, 0.0]].into_dyn());
    }

    #[test]
    fn test_resize_truncates() {
        let original = array![1.0, 2.0, 3.0].into_dyn();
        let resized = resize_zero_filled(&original, &[2]);
        assert_eq!(resized, array![1.0, 2.0].into_dyn());
    }

    #[test]
    fn test_resize_rank_change_zeroes() {
        let original = array![1.0, 2.0].into_dyn();
        let resized = resize_zero_filled(&original, &[2, 2]);
        assert!(resized.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_broadcast_scalar_gradient() {
        let gradient = ndarray::arr0(0.5).into_dyn();
        let view = broadcast_to(&gradient, &[3], "bias gradient").unwrap();
        assert_eq!(view.to_owned(), array![0.5, 0.5, 0.5].into_dyn());

        let wrong = array![1.0, 2.0].into_dyn();
        assert!(broadcast_to(&wrong, &[3], "bias gradient").is_err());
    }
}
