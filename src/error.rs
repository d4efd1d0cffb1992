use thiserror::Error;

/// Errors raised while building, shaping or running a network
#[derive(Debug, Error)]
pub enum NetworkError {
    /// Unknown keys and structurally invalid layer sequences
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Tensor ranks or sizes that don't fit the layer
    #[error("shape error: {0}")]
    Shape(String),

    #[error("not implemented: {0}")]
    NotImplemented(String),
}

impl From<ndarray::ShapeError> for NetworkError {
    fn from(err: ndarray::ShapeError) -> Self {
        NetworkError::Shape(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, NetworkError>;
