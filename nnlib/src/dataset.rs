//! Dataset interface consumed by [`crate::Network::fit`] and
//! [`crate::Network::evaluate`].

use std::ops::Range;

use nnlib_tensor::{Shape, Tensor};

use crate::error::{NnError, NnResult};

/// An `(input, label)` pair of batched tensors.
pub type Batch = (Tensor, Tensor);

/// Source of training, validation and test batches.
///
/// Epoch count and batch size may only change before the first training
/// batch is pulled.
pub trait Dataset {
    fn epochs(&self) -> usize;

    fn set_epochs(&mut self, epochs: usize) -> NnResult<()>;

    fn batch_size(&self) -> usize;

    fn set_batch_size(&mut self, batch_size: usize) -> NnResult<()>;

    /// Set once the last epoch has been served.
    fn end_training(&self) -> bool;

    /// Set when an epoch ends; cleared by [`Dataset::validation`].
    fn end_epoch(&self) -> bool;

    /// Next training batch. `None` marks an epoch boundary (or the end of
    /// training) with no further training data.
    fn next_batch(&mut self) -> NnResult<Option<Batch>>;

    /// The whole validation split as one batch.
    fn validation(&mut self) -> NnResult<Option<Batch>>;

    /// The whole test split as one batch.
    fn test_set(&mut self) -> NnResult<Option<Batch>>;
}

#[derive(Debug, Clone, Default)]
struct Split {
    inputs: Vec<Vec<f64>>,
    labels: Vec<Vec<f64>>,
}

impl Split {
    fn len(&self) -> usize {
        self.inputs.len()
    }

    fn batch(&self, range: Range<usize>, input: Shape, label: Shape) -> NnResult<Batch> {
        let x = Tensor::from_batches(input.depth, input.rows, input.columns, &self.inputs[range.clone()])?;
        let y = Tensor::from_batches(label.depth, label.rows, label.columns, &self.labels[range])?;
        Ok((x, y))
    }

    fn whole(&self, input: Shape, label: Shape) -> NnResult<Option<Batch>> {
        if self.len() == 0 {
            return Ok(None);
        }
        self.batch(0..self.len(), input, label).map(Some)
    }
}

/// Dataset over in-memory samples, served in insertion order.
#[derive(Debug, Clone)]
pub struct InMemoryDataset {
    input_shape: Shape,
    label_shape: Shape,
    train: Split,
    validation: Split,
    test: Split,
    epochs: usize,
    batch_size: usize,
    cursor: usize,
    completed_epochs: usize,
    started: bool,
    end_epoch: bool,
}

impl InMemoryDataset {
    /// Empty dataset whose samples have the given input and label shapes.
    /// Defaults to one epoch with batches of 32.
    pub fn new(input_shape: Shape, label_shape: Shape) -> Self {
        InMemoryDataset {
            input_shape,
            label_shape,
            train: Split::default(),
            validation: Split::default(),
            test: Split::default(),
            epochs: 1,
            batch_size: 32,
            cursor: 0,
            completed_epochs: 0,
            started: false,
            end_epoch: false,
        }
    }

    pub fn with_training(mut self, samples: Vec<(Vec<f64>, Vec<f64>)>) -> NnResult<Self> {
        self.train = self.split(samples)?;
        Ok(self)
    }

    pub fn with_validation(mut self, samples: Vec<(Vec<f64>, Vec<f64>)>) -> NnResult<Self> {
        self.validation = self.split(samples)?;
        Ok(self)
    }

    pub fn with_test(mut self, samples: Vec<(Vec<f64>, Vec<f64>)>) -> NnResult<Self> {
        self.test = self.split(samples)?;
        Ok(self)
    }

    fn split(&self, samples: Vec<(Vec<f64>, Vec<f64>)>) -> NnResult<Split> {
        let (input_len, label_len) = (self.input_shape.numel(), self.label_shape.numel());
        let mut split = Split::default();
        for (i, (x, y)) in samples.into_iter().enumerate() {
            if x.len() != input_len || y.len() != label_len {
                return Err(NnError::Dataset(format!(
                    "sample {i} has {} inputs and {} labels, expected {input_len} and {label_len}",
                    x.len(),
                    y.len()
                )));
            }
            split.inputs.push(x);
            split.labels.push(y);
        }
        Ok(split)
    }

    fn check_not_started(&self) -> NnResult<()> {
        if self.started {
            return Err(NnError::Dataset(
                "epochs and batch size are fixed once batching has started".to_string(),
            ));
        }
        Ok(())
    }

    fn finish_epoch(&mut self) {
        self.cursor = 0;
        self.completed_epochs += 1;
        self.end_epoch = true;
    }
}

impl Dataset for InMemoryDataset {
    fn epochs(&self) -> usize {
        self.epochs
    }

    fn set_epochs(&mut self, epochs: usize) -> NnResult<()> {
        self.check_not_started()?;
        self.epochs = epochs;
        Ok(())
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn set_batch_size(&mut self, batch_size: usize) -> NnResult<()> {
        self.check_not_started()?;
        if batch_size == 0 {
            return Err(NnError::InvalidArgument(
                "batch size must be positive".to_string(),
            ));
        }
        self.batch_size = batch_size;
        Ok(())
    }

    fn end_training(&self) -> bool {
        self.completed_epochs >= self.epochs
    }

    fn end_epoch(&self) -> bool {
        self.end_epoch
    }

    fn next_batch(&mut self) -> NnResult<Option<Batch>> {
        if self.end_training() {
            return Ok(None);
        }
        self.started = true;

        let len = self.train.len();
        if len == 0 {
            self.finish_epoch();
            return Ok(None);
        }

        let to = (self.cursor + self.batch_size).min(len);
        let batch = self
            .train
            .batch(self.cursor..to, self.input_shape, self.label_shape)?;
        self.cursor = to;
        if to == len {
            self.finish_epoch();
        }
        Ok(Some(batch))
    }

    fn validation(&mut self) -> NnResult<Option<Batch>> {
        self.end_epoch = false;
        self.validation.whole(self.input_shape, self.label_shape)
    }

    fn test_set(&mut self) -> NnResult<Option<Batch>> {
        self.test.whole(self.input_shape, self.label_shape)
    }
}
