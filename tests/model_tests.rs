use ndarray::{array, ArrayD, IxDyn};
use rand::rngs::StdRng;
use rand::SeedableRng;

use nanonet::{
    ActivationType, AdaMax, Conv1D, Conv2D, Dense, Flatten, Input, L1L2, Loss, MaxPool2D, Network, NetworkConfig,
    NetworkError, OptimizerHyperparameters, Sgd,
};

fn linear_network() -> Network {
    let mut network = Network::new(Loss::MeanSquaredError);
    network
        .add(Input::new(vec![2]))
        .add(Dense::new(1, ActivationType::Linear));
    network
}

fn compile(network: &mut Network, config: &NetworkConfig, optimizer: &AdaMax) {
    let mut rng = StdRng::seed_from_u64(1);
    network.compile_with_rng(config, optimizer, &mut rng).unwrap();
}

/// Zeroes the dense layer so every run starts from the same point
fn zero_dense(network: &mut Network) {
    let params = network.sequence_mut().get_mut(1).unwrap().params_mut().unwrap();
    params.weights.fill(0.0);
    params.biases.fill(0.0);
}

#[test]
fn test_dense_error_decreases_monotonically() {
    let mut network = linear_network();
    let optimizer = AdaMax::with_hyperparameters(OptimizerHyperparameters {
        learning_rate: 0.01,
        beta1: 0.0,
        ..OptimizerHyperparameters::default()
    });
    compile(&mut network, &NetworkConfig::default(), &optimizer);
    zero_dense(&mut network);

    let input = array![1.0, 2.0].into_dyn();
    let target = array![3.0].into_dyn();

    let mut previous = f64::INFINITY;
    for step in 0..50 {
        let loss = network
            .train_batch(std::slice::from_ref(&input), std::slice::from_ref(&target))
            .unwrap();
        assert!(loss < previous, "loss went up at step {step}: {loss} >= {previous}");
        previous = loss;
    }
}

#[test]
fn test_dense_converges_with_default_adamax() {
    let mut network = linear_network();
    compile(&mut network, &NetworkConfig::default(), &AdaMax::new(0.01));
    zero_dense(&mut network);

    let input = array![1.0, 2.0].into_dyn();
    let target = array![3.0].into_dyn();
    let initial = Loss::MeanSquaredError
        .calculate(&network.predict(&input).unwrap(), &target)
        .unwrap();

    for _ in 0..300 {
        network
            .train_batch(std::slice::from_ref(&input), std::slice::from_ref(&target))
            .unwrap();
    }

    let last = Loss::MeanSquaredError
        .calculate(&network.predict(&input).unwrap(), &target)
        .unwrap();
    assert!(last < 0.05 * initial, "loss {last} did not drop from {initial}");
}

#[test]
fn test_parameter_count_splits_frozen_layers() {
    let mut network = Network::new(Loss::MeanSquaredError);
    network
        .add(Input::new(vec![8, 8, 1]))
        .add(Conv2D::new(4, (3, 3), (1, 1), ActivationType::ReLU))
        .add(MaxPool2D::default())
        .add(Flatten::new())
        .add(Dense::new(10, ActivationType::ReLU))
        .add(Dense::new(2, ActivationType::Linear).trainable(false));
    compile(&mut network, &NetworkConfig::default(), &AdaMax::default());

    // Conv2D: 3*3*1*4 + 4, Dense: 36*10 + 10, frozen Dense: 10*2 + 2
    assert_eq!(network.parameter_count(), (410, 22));
}

#[test]
fn test_unknown_config_keys_are_rejected() {
    let mut network = linear_network();
    let mut rng = StdRng::seed_from_u64(1);

    let config = NetworkConfig {
        weight_init: "glorot".to_string(),
        ..NetworkConfig::default()
    };
    let result = network.compile_with_rng(&config, &AdaMax::default(), &mut rng);
    assert!(matches!(result, Err(NetworkError::Configuration(_))));

    let config = NetworkConfig {
        dtype: "float16".to_string(),
        ..NetworkConfig::default()
    };
    let result = network.compile_with_rng(&config, &AdaMax::default(), &mut rng);
    assert!(matches!(result, Err(NetworkError::Configuration(_))));
    assert!(!network.is_compiled());
}

#[test]
fn test_flatten_last_fails_to_compile() {
    let mut network = Network::new(Loss::MeanSquaredError);
    network.add(Input::new(vec![2, 2])).add(Flatten::new());

    let result = network.compile(&NetworkConfig::default(), &Sgd::new(0.1));
    assert!(matches!(result, Err(NetworkError::Configuration(_))));
}

#[test]
fn test_conv_networks_train() {
    let mut rng = StdRng::seed_from_u64(5);
    let config = NetworkConfig {
        batch_size: 2,
        weight_init: "xavier".to_string(),
        dtype: "float32".to_string(),
    };

    let mut conv2d = Network::new(Loss::MeanSquaredError);
    conv2d
        .add(Input::new(vec![6, 6]))
        .add(Conv2D::new(2, (3, 3), (1, 1), ActivationType::Tanh))
        .add(Flatten::new())
        .add(Dense::new(1, ActivationType::Linear));
    conv2d.compile_with_rng(&config, &AdaMax::default(), &mut rng).unwrap();

    let inputs = vec![
        ArrayD::from_shape_fn(IxDyn(&[6, 6]), |idx| (idx[0] + idx[1]) as f64 / 10.0),
        ArrayD::from_shape_fn(IxDyn(&[6, 6]), |idx| (idx[0] * idx[1]) as f64 / 25.0),
    ];
    let targets = vec![array![1.0].into_dyn(), array![-1.0].into_dyn()];
    let loss = conv2d.train_batch(&inputs, &targets).unwrap();
    assert!(loss.is_finite());

    let mut conv1d = Network::new(Loss::MeanSquaredError);
    conv1d
        .add(Input::new(vec![8, 2]))
        .add(Conv1D::new(3, 3, 1, ActivationType::ReLU).with_regularizer(Box::new(L1L2::new(0.0, 1e-4))))
        .add(Flatten::new())
        .add(Dense::new(1, ActivationType::Linear));
    conv1d.compile_with_rng(&config, &AdaMax::default(), &mut rng).unwrap();

    let inputs = vec![
        ArrayD::from_shape_fn(IxDyn(&[8, 2]), |idx| idx[0] as f64 - idx[1] as f64),
        ArrayD::from_elem(IxDyn(&[8, 2]), 0.5),
    ];
    let loss = conv1d.train_batch(&inputs, &targets).unwrap();
    assert!(loss.is_finite());
}

#[test]
fn test_max_pool_2d_blocks_training() {
    let mut network = Network::new(Loss::MeanSquaredError);
    network
        .add(Input::new(vec![4, 4]))
        .add(MaxPool2D::default())
        .add(Flatten::new())
        .add(Dense::new(1, ActivationType::Linear));
    compile(&mut network, &NetworkConfig::default(), &AdaMax::default());

    let dense_weights = |network: &Network| network.sequence().get(3).unwrap().params().unwrap().weights.clone();
    let before = dense_weights(&network);

    let result = network.train_batch(&[ArrayD::zeros(IxDyn(&[4, 4]))], &[array![1.0].into_dyn()]);
    assert!(matches!(result, Err(NetworkError::NotImplemented(_))));

    // Layers after the pool are left untouched too
    assert_eq!(dense_weights(&network), before);
}

#[test]
fn test_batch_larger_than_configured_fails() {
    let mut network = linear_network();
    compile(&mut network, &NetworkConfig::default(), &AdaMax::default());

    let inputs = vec![array![1.0, 2.0].into_dyn(), array![3.0, 4.0].into_dyn()];
    let targets = vec![array![1.0].into_dyn(), array![2.0].into_dyn()];
    assert!(matches!(network.train_batch(&inputs, &targets), Err(NetworkError::Configuration(_))));

    network.set_batch_size(2).unwrap();
    assert!(network.train_batch(&inputs, &targets).is_ok());
}

#[test]
fn test_predict_rejects_wrong_input_shape() {
    let mut network = linear_network();
    compile(&mut network, &NetworkConfig::default(), &AdaMax::default());

    assert!(matches!(
        network.predict(&array![1.0, 2.0, 3.0].into_dyn()),
        Err(NetworkError::Shape(_))
    ));
}
