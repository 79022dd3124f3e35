//! Sequential network: layer stack, loss, optimizer and training loop.

use log::{debug, trace, warn};
use nnlib_tensor::Tensor;

use crate::activations::ActivationKind;
use crate::dataset::Dataset;
use crate::error::{NnError, NnResult};
use crate::init::InitRng;
use crate::layers::{InputShape, Layer, LayerGradients};
use crate::loss::{Loss, LossKind};
use crate::metrics;
use crate::optim::Optimizer;
use crate::persist::{LayerFactory, LayerRecord};
use crate::report::{EpochReport, EvaluationReport, LogReporter, TrainingReporter};

/// Construction options of a [`Network`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetworkConfig {
    /// Seed for parameter initialization; `None` draws from OS entropy.
    pub seed: Option<u64>,
}

impl NetworkConfig {
    pub fn seeded(seed: u64) -> Self {
        NetworkConfig { seed: Some(seed) }
    }

    fn rng(&self) -> InitRng {
        match self.seed {
            Some(seed) => InitRng::seeded(seed),
            None => InitRng::from_entropy(),
        }
    }
}

/// A strictly sequential stack of layers trained with one loss and one
/// optimizer.
///
/// Layers are added with [`Network::add`], which infers or checks each
/// layer's input shape against the previous layer's output. After
/// [`Network::compile`] the network can predict and train; adding another
/// layer returns it to the uncompiled state.
pub struct Network {
    layers: Vec<Box<dyn Layer>>,
    loss: Option<Box<dyn Loss>>,
    optimizer: Option<Box<dyn Optimizer>>,
    rng: InitRng,
    compiled: bool,
    forward_performed: bool,
    mini_batch: Option<usize>,
    last_prediction: Option<Tensor>,
    reporter: Box<dyn TrainingReporter>,
}

impl std::fmt::Debug for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Network")
            .field("layers", &self.layers)
            .field("loss", &self.loss)
            .field("optimizer", &self.optimizer)
            .field("compiled", &self.compiled)
            .field("mini_batch", &self.mini_batch)
            .finish()
    }
}

impl Default for Network {
    fn default() -> Self {
        Self::new()
    }
}

impl Network {
    pub fn new() -> Self {
        Self::with_config(NetworkConfig::default())
    }

    pub fn with_config(config: NetworkConfig) -> Self {
        Network {
            layers: Vec::new(),
            loss: None,
            optimizer: None,
            rng: config.rng(),
            compiled: false,
            forward_performed: false,
            mini_batch: None,
            last_prediction: None,
            reporter: Box::new(LogReporter),
        }
    }

    /// Replace the progress sink used by [`Network::fit`] and [`Network::evaluate`].
    pub fn with_reporter(mut self, reporter: impl TrainingReporter + 'static) -> Self {
        self.reporter = Box::new(reporter);
        self
    }

    pub fn layers(&self) -> &[Box<dyn Layer>] {
        &self.layers
    }

    /// Mutable access to the layers, e.g. to overwrite parameters. Shapes of
    /// compiled layers stay locked.
    pub fn layers_mut(&mut self) -> &mut [Box<dyn Layer>] {
        &mut self.layers
    }

    pub fn is_compiled(&self) -> bool {
        self.compiled
    }

    /// Output of the most recent [`Network::forward`].
    pub fn last_prediction(&self) -> Option<&Tensor> {
        self.last_prediction.as_ref()
    }

    // === Building ===

    /// Append a layer.
    ///
    /// The first layer must declare its full input shape. Later layers must
    /// agree with the previous output on every declared component; missing
    /// components are inferred. Nothing may follow a softmax layer.
    pub fn add(&mut self, layer: impl Layer + 'static) -> NnResult<&mut Self> {
        self.push(Box::new(layer))
    }

    fn push(&mut self, mut layer: Box<dyn Layer>) -> NnResult<&mut Self> {
        let declared = layer.input_shape();
        match self.layers.last() {
            None => {
                if declared.resolved().is_none() {
                    return Err(NnError::MissingInputShape);
                }
            }
            Some(prev) => {
                if prev.activation() == Some(ActivationKind::Softmax) {
                    return Err(NnError::LayerAfterSoftmax);
                }
                let expected = prev.output_shape()?;
                if !declared.accepts(expected) {
                    return Err(NnError::ShapeMismatch {
                        expected: declared.to_string(),
                        actual: expected,
                    });
                }
                if declared.resolved() != Some(expected) {
                    layer.set_input_shape(InputShape::known(expected))?;
                }
            }
        }

        let output = layer.output_shape()?;
        debug!(
            "layer {} added: {} {} -> {output}",
            self.layers.len(),
            layer.kind(),
            layer.input_shape()
        );
        self.layers.push(layer);
        self.compiled = false;
        Ok(self)
    }

    /// Compile every layer and register it with `optimizer`.
    ///
    /// A softmax output layer and the sparse categorical cross-entropy loss
    /// require each other.
    pub fn compile(
        &mut self,
        loss: impl Loss + 'static,
        optimizer: impl Optimizer + 'static,
    ) -> NnResult<()> {
        let last = self.layers.last().ok_or(NnError::EmptyNetwork)?;
        let softmax_last = last.activation() == Some(ActivationKind::Softmax);
        let cross_entropy = loss.kind() == LossKind::SparseCategoricalCrossEntropy;
        if softmax_last != cross_entropy {
            return Err(NnError::SoftmaxLossPairing);
        }

        let mut optimizer: Box<dyn Optimizer> = Box::new(optimizer);
        optimizer.reset();
        for layer in &mut self.layers {
            layer.compile(&mut self.rng)?;
            optimizer.register(layer.as_ref())?;
        }
        debug!(
            "network compiled: {} layers, {} optimizer slots, {} loss",
            self.layers.len(),
            optimizer.registered(),
            loss.kind()
        );

        self.loss = Some(Box::new(loss));
        self.optimizer = Some(optimizer);
        self.compiled = true;
        self.forward_performed = false;
        self.mini_batch = None;
        Ok(())
    }

    // === Running ===

    fn check_compiled(&self) -> NnResult<()> {
        if !self.compiled {
            return Err(NnError::NotCompiled { component: "network" });
        }
        Ok(())
    }

    fn run_layers(&mut self, input: &Tensor) -> NnResult<Tensor> {
        self.check_compiled()?;
        let expected = self
            .layers
            .first()
            .and_then(|l| l.input_shape().resolved())
            .ok_or(NnError::MissingInputShape)?;
        if input.item_shape() != expected {
            return Err(NnError::ShapeMismatch {
                expected: expected.to_string(),
                actual: input.item_shape(),
            });
        }

        let mut current = input.clone();
        for layer in &mut self.layers {
            current = layer.forward(&current)?;
        }
        Ok(current)
    }

    /// Run every layer on `input` without touching loss or gradients.
    ///
    /// The layers now cache `input`, so a pending [`Network::backward`] is
    /// discarded and fails until the next [`Network::forward`].
    pub fn predict(&mut self, input: &Tensor) -> NnResult<Tensor> {
        self.forward_performed = false;
        self.run_layers(input)
    }

    /// Forward pass followed by the loss; returns the batch-averaged loss.
    pub fn forward(&mut self, input: &Tensor, target: &Tensor) -> NnResult<f64> {
        // a failed pass leaves partially overwritten layer caches
        self.forward_performed = false;
        let prediction = self.run_layers(input)?;
        let loss = self
            .loss
            .as_mut()
            .ok_or(NnError::NotCompiled { component: "network loss" })?
            .forward(&prediction, target)?;
        trace!("forward: batch {} loss {loss:.6}", input.batch_size());
        self.last_prediction = Some(prediction);
        self.forward_performed = true;
        Ok(loss)
    }

    /// Backpropagate the last forward pass and accumulate parameter gradients.
    ///
    /// Gradients reach the optimizer only once every layer has completed its
    /// backward pass; a failing layer leaves the accumulators untouched.
    pub fn backward(&mut self) -> NnResult<()> {
        self.check_compiled()?;
        if !std::mem::take(&mut self.forward_performed) {
            return Err(NnError::BackwardBeforeForward { component: "network" });
        }
        let (Some(loss), Some(optimizer)) = (self.loss.as_mut(), self.optimizer.as_mut()) else {
            return Err(NnError::NotCompiled { component: "network loss" });
        };

        let seed = loss.backward()?;
        // collected in reverse layer order
        let mut collected: Vec<LayerGradients> = Vec::with_capacity(self.layers.len());
        for layer in self.layers.iter_mut().rev() {
            let upstream = collected.last().map_or(&seed, |g| &g.input);
            let grads = layer.backward(upstream)?;
            collected.push(grads);
        }

        let len = self.layers.len();
        for (offset, grads) in collected.iter().enumerate() {
            optimizer.accumulate(len - 1 - offset, grads)?;
        }

        let count = self.mini_batch.map_or(1, |n| n + 1);
        trace!("backward: {count} passes accumulated");
        self.mini_batch = Some(count);
        Ok(())
    }

    /// Apply the gradients accumulated since the last update, averaged over
    /// the number of backward passes.
    pub fn update_weights(&mut self) -> NnResult<()> {
        self.check_compiled()?;
        let batches = self.mini_batch.ok_or(NnError::NoAccumulatedGradients)?;
        let optimizer = self
            .optimizer
            .as_mut()
            .ok_or(NnError::NotCompiled { component: "network optimizer" })?;
        optimizer.apply(batches, &mut self.layers)?;
        self.mini_batch = None;
        Ok(())
    }

    // === Training loops ===

    /// Train on `dataset` for `epochs` epochs of `batch_size` batches.
    ///
    /// Every training batch runs forward, backward and a weight update. At
    /// each epoch boundary the validation split is scored and reported.
    pub fn fit(
        &mut self,
        dataset: &mut dyn Dataset,
        epochs: usize,
        batch_size: usize,
    ) -> NnResult<Vec<EpochReport>> {
        self.check_compiled()?;
        dataset.set_epochs(epochs)?;
        dataset.set_batch_size(batch_size)?;

        let mut reports = Vec::with_capacity(epochs);
        while !dataset.end_training() {
            if let Some((input, target)) = dataset.next_batch()? {
                self.forward(&input, &target)?;
                self.backward()?;
                self.update_weights()?;
            }

            if dataset.end_epoch() {
                let epoch = reports.len() + 1;
                match dataset.validation()? {
                    Some((input, target)) => {
                        let (loss, accuracy) = self.score(&input, &target)?;
                        let report = EpochReport {
                            epoch,
                            loss,
                            accuracy,
                        };
                        self.reporter.epoch_end(&report);
                        reports.push(report);
                    }
                    None => warn!("epoch {epoch} ended without validation data"),
                }
            }
        }
        Ok(reports)
    }

    /// Score the network on the dataset's test split.
    pub fn evaluate(&mut self, dataset: &mut dyn Dataset) -> NnResult<EvaluationReport> {
        let (input, target) = dataset
            .test_set()?
            .ok_or_else(|| NnError::Dataset("no test data".to_string()))?;
        let (loss, accuracy) = self.score(&input, &target)?;
        let report = EvaluationReport { loss, accuracy };
        self.reporter.evaluation(&report);
        Ok(report)
    }

    fn score(&mut self, input: &Tensor, target: &Tensor) -> NnResult<(f64, f64)> {
        let loss = self.forward(input, target)?;
        // scoring does not feed a backward pass
        self.forward_performed = false;
        let accuracy = match &self.last_prediction {
            Some(prediction) => metrics::accuracy(target, prediction)?,
            None => 0.0,
        };
        Ok((loss, accuracy))
    }

    // === Persistence ===

    /// Snapshot of every layer, in order.
    pub fn records(&self) -> NnResult<Vec<LayerRecord>> {
        self.layers.iter().map(|l| LayerRecord::of(l.as_ref())).collect()
    }

    /// Rebuild a network from layer records. The result can predict
    /// immediately; call [`Network::compile`] before training it.
    pub fn from_records(
        records: &[LayerRecord],
        factory: &dyn LayerFactory,
        config: NetworkConfig,
    ) -> NnResult<Self> {
        if records.is_empty() {
            return Err(NnError::EmptyNetwork);
        }
        let mut network = Network::with_config(config);
        for record in records {
            network.push(factory.build(record)?)?;
        }
        for layer in &mut network.layers {
            layer.compile(&mut network.rng)?;
        }
        network.compiled = true;
        debug!("network restored from {} layer records", records.len());
        Ok(network)
    }
}
