//! Integration tests for neural network training.
//!
//! Tests network construction, gradient correctness, training loops and
//! snapshot restore.

use std::sync::{Arc, Mutex};

use nnlib::finite_diff::{finite_diff_grad, max_grad_error};
use nnlib::prelude::*;
use nnlib::{
    read_records, write_records, DefaultLayerFactory, EpochReport, EvaluationReport,
    TrainingReporter,
};

// ============================================================================
// Test Utilities
// ============================================================================

/// Two well separated 2D clusters, one-hot labels of length 2.
fn clusters(n: usize, offset: f64) -> Vec<(Vec<f64>, Vec<f64>)> {
    (0..n)
        .map(|i| {
            let jitter = ((i * 7 + 3) % 11) as f64 / 11.0 - 0.5 + offset;
            let wobble = ((i * 5 + 1) % 13) as f64 / 13.0 - 0.5;
            if i % 2 == 0 {
                (vec![-1.5 + jitter, -1.0 + wobble], vec![1.0, 0.0])
            } else {
                (vec![1.5 + wobble, 1.0 + jitter], vec![0.0, 1.0])
            }
        })
        .collect()
}

fn classifier(seed: u64) -> NnResult<Network> {
    let mut net = Network::with_config(NetworkConfig::seeded(seed));
    net.add(Dense::with_input(2, 16)?.with_activation(ActivationKind::Relu))?
        .add(Dense::new(2)?.with_activation(ActivationKind::Softmax))?;
    net.compile(SparseCategoricalCrossEntropy::new(), Sgd::new(0.1))?;
    Ok(net)
}

#[derive(Clone, Default)]
struct Recorder {
    epochs: Arc<Mutex<Vec<EpochReport>>>,
    evaluations: Arc<Mutex<Vec<EvaluationReport>>>,
}

impl TrainingReporter for Recorder {
    fn epoch_end(&mut self, report: &EpochReport) {
        self.epochs.lock().unwrap().push(*report);
    }

    fn evaluation(&mut self, report: &EvaluationReport) {
        self.evaluations.lock().unwrap().push(*report);
    }
}

// ============================================================================
// Test: Dense Gradient Check
// ============================================================================

#[test]
fn test_dense_gradient_check() {
    eprintln!("\n=== Dense Gradient Check ===");

    let mut net = Network::with_config(NetworkConfig::seeded(7));
    net.add(
        Dense::with_input(3, 4)
            .unwrap()
            .with_activation(ActivationKind::Relu),
    )
    .unwrap()
    .add(Dense::new(2).unwrap())
    .unwrap();
    // lr 1 and a single backward pass: the update equals the gradient
    net.compile(MseLoss::new(), Sgd::new(1.0)).unwrap();

    let x = Tensor::from_batches(1, 3, 1, &[vec![0.5, -1.2, 2.0], vec![1.5, 0.3, -0.7]]).unwrap();
    let y = Tensor::from_batches(1, 2, 1, &[vec![1.0, -1.0], vec![0.0, 2.0]]).unwrap();

    for index in 0..2 {
        let (w0, b0) = {
            let (w, b) = net.layers()[index].parameters().unwrap();
            (w.clone(), b.clone())
        };

        let numeric = finite_diff_grad(
            |w: &[f64]| {
                let weights = Tensor::from_vec(w0.dims(), w.to_vec())?;
                net.layers_mut()[index].set_parameters(weights, b0.clone())?;
                net.forward(&x, &y)
            },
            w0.as_slice(),
            1e-6,
        )
        .unwrap();

        net.layers_mut()[index]
            .set_parameters(w0.clone(), b0.clone())
            .unwrap();
        net.forward(&x, &y).unwrap();
        net.backward().unwrap();
        net.update_weights().unwrap();

        let w1 = net.layers()[index].parameters().unwrap().0.clone();
        let analytic: Vec<f64> = w0
            .as_slice()
            .iter()
            .zip(w1.as_slice())
            .map(|(before, after)| before - after)
            .collect();

        let error = max_grad_error(&numeric, &analytic).unwrap();
        eprintln!("  layer {index}: max gradient error = {error:.2e}");
        assert!(error < 1e-5, "layer {index} gradient error {error}");

        // restore for the next layer
        net.layers_mut()[index].set_parameters(w0, b0).unwrap();
    }
}

#[test]
fn test_bias_gradient_check() {
    let mut net = Network::with_config(NetworkConfig::seeded(3));
    net.add(Dense::with_input(2, 3).unwrap().with_bias_init(Initializer::Constant(0.1)))
        .unwrap();
    net.compile(MseLoss::new(), Sgd::new(1.0)).unwrap();

    let x = Tensor::from_batches(1, 2, 1, &[vec![1.0, 2.0], vec![-1.0, 0.5], vec![0.0, 3.0]])
        .unwrap();
    let y = Tensor::from_batches(1, 3, 1, &[vec![0.0; 3], vec![1.0; 3], vec![-1.0; 3]]).unwrap();

    let (w0, b0) = {
        let (w, b) = net.layers()[0].parameters().unwrap();
        (w.clone(), b.clone())
    };
    let numeric = finite_diff_grad(
        |b: &[f64]| {
            let bias = Tensor::from_vec(b0.dims(), b.to_vec())?;
            net.layers_mut()[0].set_parameters(w0.clone(), bias)?;
            net.forward(&x, &y)
        },
        b0.as_slice(),
        1e-6,
    )
    .unwrap();

    net.layers_mut()[0].set_parameters(w0, b0.clone()).unwrap();
    net.forward(&x, &y).unwrap();
    net.backward().unwrap();
    net.update_weights().unwrap();
    let b1 = net.layers()[0].parameters().unwrap().1.clone();
    let analytic: Vec<f64> = b0
        .as_slice()
        .iter()
        .zip(b1.as_slice())
        .map(|(before, after)| before - after)
        .collect();

    assert!(max_grad_error(&numeric, &analytic).unwrap() < 1e-5);
}

// ============================================================================
// Test: Network Construction
// ============================================================================

#[test]
fn test_add_infers_shapes() {
    let mut net = Network::new();
    net.add(Input::new(Shape::new(2, 3, 3)))
        .unwrap()
        .add(Flatten::new())
        .unwrap()
        .add(Dense::new(4).unwrap())
        .unwrap();

    let layers = net.layers();
    assert_eq!(layers[1].output_shape().unwrap(), Shape::column(18));
    assert_eq!(layers[2].input_shape().resolved(), Some(Shape::column(18)));
    assert_eq!(layers[2].output_shape().unwrap(), Shape::column(4));
}

#[test]
fn test_add_rejects_conflicting_shape() {
    let mut net = Network::new();
    net.add(Dense::with_input(3, 4).unwrap()).unwrap();

    let err = net.add(Dense::with_input(5, 2).unwrap()).unwrap_err();
    assert!(matches!(err, NnError::ShapeMismatch { .. }));
    assert_eq!(err.kind(), ErrorKind::Format);

    let weights = Tensor::zeros(Dims::matrix(2, 5)).unwrap();
    let err = net.add(Dense::from_parameters(weights, None).unwrap()).unwrap_err();
    assert!(matches!(err, NnError::ShapeMismatch { .. }));

    // the rejected layers left the stack untouched
    assert_eq!(net.layers().len(), 1);
    net.add(Dense::with_input(4, 2).unwrap()).unwrap();
}

#[test]
fn test_first_layer_needs_input_shape() {
    let mut net = Network::new();
    assert!(matches!(
        net.add(Dense::new(3).unwrap()),
        Err(NnError::MissingInputShape)
    ));
    assert!(matches!(
        net.add(Flatten::new()),
        Err(NnError::MissingInputShape)
    ));
}

#[test]
fn test_nothing_after_softmax() {
    let mut net = Network::new();
    net.add(Dense::with_input(2, 3).unwrap().with_activation(ActivationKind::Softmax))
        .unwrap();
    let err = net.add(Dense::new(2).unwrap()).unwrap_err();
    assert!(matches!(err, NnError::LayerAfterSoftmax));
    assert_eq!(err.kind(), ErrorKind::InvalidOperation);
}

#[test]
fn test_softmax_loss_pairing() {
    let mut softmax = Network::new();
    softmax
        .add(Dense::with_input(2, 3).unwrap().with_activation(ActivationKind::Softmax))
        .unwrap();
    assert!(matches!(
        softmax.compile(MseLoss::new(), Sgd::new(0.1)),
        Err(NnError::SoftmaxLossPairing)
    ));
    softmax
        .compile(SparseCategoricalCrossEntropy::new(), Sgd::new(0.1))
        .unwrap();

    let mut linear = Network::new();
    linear.add(Dense::with_input(2, 3).unwrap()).unwrap();
    assert!(matches!(
        linear.compile(SparseCategoricalCrossEntropy::new(), Sgd::new(0.1)),
        Err(NnError::SoftmaxLossPairing)
    ));
}

#[test]
fn test_empty_network() {
    let mut net = Network::new();
    assert!(matches!(
        net.compile(MseLoss::new(), Sgd::new(0.1)),
        Err(NnError::EmptyNetwork)
    ));
}

// ============================================================================
// Test: Call Ordering
// ============================================================================

#[test]
fn test_call_ordering_errors() {
    let mut net = Network::with_config(NetworkConfig::seeded(1));
    net.add(Dense::with_input(2, 1).unwrap()).unwrap();

    let x = Tensor::column(&[1.0, 2.0]).unwrap();
    let y = Tensor::column(&[1.0]).unwrap();
    assert!(matches!(net.predict(&x), Err(NnError::NotCompiled { .. })));

    net.compile(MseLoss::new(), Sgd::new(0.1)).unwrap();
    assert!(matches!(net.backward(), Err(NnError::BackwardBeforeForward { .. })));
    assert!(matches!(net.update_weights(), Err(NnError::NoAccumulatedGradients)));

    let wrong = Tensor::column(&[1.0, 2.0, 3.0]).unwrap();
    assert!(matches!(net.forward(&wrong, &y), Err(NnError::ShapeMismatch { .. })));

    net.forward(&x, &y).unwrap();
    net.backward().unwrap();
    assert!(net.backward().is_err());
    net.update_weights().unwrap();
    assert!(net.update_weights().is_err());

    // adding a layer requires compiling again
    net.add(Dense::new(1).unwrap()).unwrap();
    assert!(!net.is_compiled());
    assert!(net.predict(&x).is_err());
}

#[test]
fn test_predict_discards_pending_backward() {
    let mut net = Network::with_config(NetworkConfig::seeded(4));
    net.add(Dense::with_input(2, 1).unwrap()).unwrap();
    net.compile(MseLoss::new(), Sgd::new(0.1)).unwrap();

    let x = Tensor::column(&[1.0, 2.0]).unwrap();
    let y = Tensor::column(&[3.0]).unwrap();
    let other = Tensor::column(&[40.0, -20.0]).unwrap();

    net.forward(&x, &y).unwrap();
    net.predict(&other).unwrap();
    assert!(matches!(
        net.backward(),
        Err(NnError::BackwardBeforeForward { .. })
    ));
    assert!(matches!(net.update_weights(), Err(NnError::NoAccumulatedGradients)));

    // a fresh forward restores the normal cycle
    net.forward(&x, &y).unwrap();
    net.backward().unwrap();
    net.update_weights().unwrap();
}

#[test]
fn test_failed_backward_accumulates_nothing() {
    let build = || {
        let mut net = Network::with_config(NetworkConfig::seeded(21));
        net.add(Dense::with_input(2, 3).unwrap().with_activation(ActivationKind::Relu))
            .unwrap()
            .add(Dense::new(1).unwrap())
            .unwrap();
        net.compile(MseLoss::new(), Sgd::new(0.1)).unwrap();
        net
    };
    let x = Tensor::column(&[0.5, 1.0]).unwrap();
    let y = Tensor::column(&[2.0]).unwrap();
    let batch3 =
        Tensor::from_batches(1, 2, 1, &[vec![1.0, 0.0], vec![0.0, 1.0], vec![1.0, 1.0]]).unwrap();

    let mut failed = build();
    failed.forward(&x, &y).unwrap();
    // the first layer now caches a batch of three; the second still holds x
    failed.layers_mut()[0].forward(&batch3).unwrap();
    assert!(failed.backward().is_err());
    failed.forward(&x, &y).unwrap();
    failed.backward().unwrap();
    failed.update_weights().unwrap();

    let mut clean = build();
    clean.forward(&x, &y).unwrap();
    clean.backward().unwrap();
    clean.update_weights().unwrap();

    for index in 0..2 {
        let (fw, fb) = failed.layers()[index].parameters().unwrap();
        let (cw, cb) = clean.layers()[index].parameters().unwrap();
        for (p, q) in fw.as_slice().iter().zip(cw.as_slice()) {
            assert!((p - q).abs() < 1e-12, "layer {index} weights {p} != {q}");
        }
        for (p, q) in fb.as_slice().iter().zip(cb.as_slice()) {
            assert!((p - q).abs() < 1e-12, "layer {index} bias {p} != {q}");
        }
    }
}

#[test]
fn test_mini_batch_averaging() {
    // Two backward passes on the same sample move the weights exactly as one.
    let build = || {
        let mut net = Network::with_config(NetworkConfig::seeded(9));
        net.add(Dense::with_input(2, 2).unwrap()).unwrap();
        net.compile(MseLoss::new(), Sgd::new(0.1)).unwrap();
        net
    };
    let x = Tensor::column(&[0.5, -0.5]).unwrap();
    let y = Tensor::column(&[1.0, 0.0]).unwrap();

    let mut once = build();
    once.forward(&x, &y).unwrap();
    once.backward().unwrap();
    once.update_weights().unwrap();

    let mut twice = build();
    for _ in 0..2 {
        twice.forward(&x, &y).unwrap();
        twice.backward().unwrap();
    }
    twice.update_weights().unwrap();

    let a = once.layers()[0].parameters().unwrap().0.clone();
    let b = twice.layers()[0].parameters().unwrap().0.clone();
    for (p, q) in a.as_slice().iter().zip(b.as_slice()) {
        assert!((p - q).abs() < 1e-12);
    }
}

// ============================================================================
// Test: Training Loops
// ============================================================================

#[test]
fn test_fit_classifier() {
    eprintln!("\n=== Fit: Two Cluster Classification ===");

    let recorder = Recorder::default();
    let mut net = classifier(42).unwrap().with_reporter(recorder.clone());

    let mut dataset = InMemoryDataset::new(Shape::column(2), Shape::column(2))
        .with_training(clusters(40, 0.0))
        .unwrap()
        .with_validation(clusters(10, 0.1))
        .unwrap()
        .with_test(clusters(10, -0.1))
        .unwrap();

    let reports = net.fit(&mut dataset, 30, 4).unwrap();
    for r in reports.iter().step_by(10) {
        eprintln!("  Epoch {:3}: loss = {:.6}, accuracy = {:.2}", r.epoch, r.loss, r.accuracy);
    }

    assert_eq!(reports.len(), 30);
    assert_eq!(reports[0].epoch, 1);
    assert_eq!(*recorder.epochs.lock().unwrap(), reports);

    let (first, last) = (reports[0], reports[29]);
    assert!(last.loss < first.loss);
    assert!(last.accuracy >= 0.9);

    let evaluation = net.evaluate(&mut dataset).unwrap();
    eprintln!("  Test: loss = {:.6}, accuracy = {:.2}", evaluation.loss, evaluation.accuracy);
    assert!(evaluation.accuracy >= 0.9);
    assert_eq!(recorder.evaluations.lock().unwrap().len(), 1);

    // a dataset that has started batching is locked
    assert!(net.fit(&mut dataset, 1, 4).is_err());
}

#[test]
fn test_evaluate_without_test_split() {
    let mut net = classifier(1).unwrap();
    let mut dataset = InMemoryDataset::new(Shape::column(2), Shape::column(2));
    assert!(matches!(net.evaluate(&mut dataset), Err(NnError::Dataset(_))));
}

#[test]
fn test_xor_with_momentum() {
    eprintln!("\n=== XOR (MSE, SGD with momentum) ===");

    let mut net = Network::with_config(NetworkConfig::seeded(2024));
    net.add(Dense::with_input(2, 16).unwrap().with_activation(ActivationKind::Relu))
        .unwrap()
        .add(Dense::new(1).unwrap())
        .unwrap();
    net.compile(MseLoss::new(), Sgd::with_momentum(0.02, 0.9)).unwrap();

    let x = Tensor::from_batches(
        1,
        2,
        1,
        &[vec![0.0, 0.0], vec![0.0, 1.0], vec![1.0, 0.0], vec![1.0, 1.0]],
    )
    .unwrap();
    let y = Tensor::from_batches(1, 1, 1, &[vec![0.0], vec![1.0], vec![1.0], vec![0.0]]).unwrap();

    let initial = net.forward(&x, &y).unwrap();
    let mut loss = initial;
    for epoch in 0..500 {
        loss = net.forward(&x, &y).unwrap();
        net.backward().unwrap();
        net.update_weights().unwrap();
        if epoch % 100 == 0 {
            eprintln!("  Epoch {epoch:4}: loss = {loss:.6}");
        }
    }
    eprintln!("  initial = {initial:.6}, final = {loss:.6}");
    assert!(loss < initial);
}

// ============================================================================
// Test: Snapshot Restore
// ============================================================================

#[test]
fn test_records_roundtrip() {
    let mut net = Network::with_config(NetworkConfig::seeded(5));
    net.add(Input::new(Shape::new(1, 2, 2)))
        .unwrap()
        .add(Flatten::new())
        .unwrap()
        .add(Dense::new(3).unwrap().with_activation(ActivationKind::Relu))
        .unwrap()
        .add(Dense::new(2).unwrap().with_activation(ActivationKind::Softmax))
        .unwrap();
    net.compile(SparseCategoricalCrossEntropy::new(), Sgd::new(0.1))
        .unwrap();

    let x = Tensor::from_batches(1, 2, 2, &[vec![0.1, 0.2, 0.3, 0.4], vec![-1.0, 0.5, 2.0, 0.0]])
        .unwrap();
    let expected = net.predict(&x).unwrap();

    let records = net.records().unwrap();
    assert_eq!(records.len(), 4);
    assert!(records[0].parameters.is_none());
    assert!(records[2].parameters.is_some());

    let text = write_records(&records);
    assert_eq!(text.lines().count(), 4);
    assert_eq!(read_records(&text).unwrap(), records);

    let mut restored = Network::from_records(
        &read_records(&text).unwrap(),
        &DefaultLayerFactory,
        NetworkConfig::default(),
    )
    .unwrap();
    assert!(restored.is_compiled());
    let actual = restored.predict(&x).unwrap();
    assert_eq!(actual, expected);

    // restored networks train once compiled with a loss
    let y = Tensor::from_batches(1, 2, 1, &[vec![1.0, 0.0], vec![0.0, 1.0]]).unwrap();
    assert!(restored.forward(&x, &y).is_err());
    restored
        .compile(SparseCategoricalCrossEntropy::new(), Sgd::new(0.1))
        .unwrap();
    restored.forward(&x, &y).unwrap();
    restored.backward().unwrap();
    restored.update_weights().unwrap();
}

#[test]
fn test_multi_depth_input_trains_last_slice() {
    let mut net = Network::with_config(NetworkConfig::seeded(11));
    net.add(Input::new(Shape::new(3, 2, 1)))
        .unwrap()
        .add(Dense::new(1).unwrap())
        .unwrap();
    net.compile(MseLoss::new(), Sgd::new(0.1)).unwrap();

    let x = Tensor::from_batches(3, 2, 1, &[vec![9.0, 9.0, 9.0, 9.0, 1.0, -1.0]]).unwrap();
    let y = Tensor::column(&[0.5]).unwrap();
    let before = net.predict(&x).unwrap();

    // changing the earlier slices does not change the output
    let other = Tensor::from_batches(3, 2, 1, &[vec![0.0, 0.0, 0.0, 0.0, 1.0, -1.0]]).unwrap();
    assert_eq!(net.predict(&other).unwrap(), before);

    let (w0, b0) = {
        let (w, b) = net.layers()[1].parameters().unwrap();
        (w.as_slice().to_vec(), b.as_slice()[0])
    };
    let output = w0[0] * 1.0 + w0[1] * -1.0 + b0;
    assert!((before.as_slice()[0] - output).abs() < 1e-12);

    net.forward(&x, &y).unwrap();
    net.backward().unwrap();
    net.update_weights().unwrap();

    // d(loss)/d(output) = 2 (output - target); only the last slice [1, -1] feeds dW
    let g = 2.0 * (output - 0.5);
    let (w1, b1) = net.layers()[1].parameters().unwrap();
    assert!((w1.as_slice()[0] - (w0[0] - 0.1 * g)).abs() < 1e-12);
    assert!((w1.as_slice()[1] - (w0[1] + 0.1 * g)).abs() < 1e-12);
    assert!((b1.as_slice()[0] - (b0 - 0.1 * g)).abs() < 1e-12);
}
