pub mod activation;
pub mod error;
pub mod hyperparameters;
pub mod initializer;
pub mod layers;
pub mod loss;
pub mod model;
pub mod optimizers;
pub mod regularizer;
pub mod sequence;
pub mod utils;

pub use activation::ActivationType;
pub use error::{NetworkError, Result};
pub use hyperparameters::{NetworkConfig, OptimizerHyperparameters};
pub use initializer::{DataType, WeightInitStrategy};
pub use layers::{
    BatchCache, Conv1D, Conv2D, Dense, Dropout, Flatten, GradientReshape, Input, Layer, LayerOps, LayerParams,
    MaxPool1D, MaxPool2D, Reshape, Shape,
};
pub use loss::Loss;
pub use model::Network;
pub use optimizers::{AdaMax, Adam, Moments, Optimizer, Sgd};
pub use regularizer::{Regularizer, L1L2};
pub use sequence::{Neighbors, Sequence};
