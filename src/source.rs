use ndarray::{Array2, Array4, Axis, Ix4};
use rand::{seq::SliceRandom, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::{
    dataset::{Partition, Targets},
    error::{CropError, Result},
    Float,
};

/// One training step's worth of crops.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// (batch, 1, channels, window)
    pub x: Array4<Float>,
    /// (batch, n_classes) one-hot rows
    pub y: Array2<Float>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.y.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// What an external training loop pulls batches from.
///
/// `len` batches make one epoch. The trainer calls `on_epoch_end` once per
/// traversal so the source can reshuffle.
pub trait BatchSource {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get_batch(&mut self, index: usize) -> Result<Batch>;

    fn on_epoch_end(&mut self);
}

/// Batches over an already materialized partition (cropped, channel axis
/// inserted, labels one-hot encoded). The last batch of an epoch may be short.
pub struct EagerBatcher {
    x: Array4<Float>,
    y: Array2<Float>,
    batch_size: usize,
    shuffle: bool,
    rng: ChaCha8Rng,
    order: Vec<usize>,
}

impl EagerBatcher {
    pub fn new(
        partition: Partition,
        batch_size: usize,
        shuffle: bool,
        seed: Option<u64>,
    ) -> Result<Self> {
        if batch_size == 0 {
            return Err(CropError::invalid_config("batch size must be positive"));
        }
        let (x, y) = partition.into_parts();
        let y = match y {
            Targets::OneHot(rows) => rows,
            Targets::Labels(_) => {
                return Err(CropError::dimension_mismatch(
                    "labels are not one-hot encoded yet",
                ))
            }
        };
        let shape = x.shape().to_vec();
        let x = x.into_dimensionality::<Ix4>().map_err(|_| {
            CropError::dimension_mismatch(format!(
                "expected (crops, 1, channels, window), got shape {shape:?}"
            ))
        })?;

        let rng = seed.map_or_else(ChaCha8Rng::from_entropy, ChaCha8Rng::seed_from_u64);
        let mut batcher = Self {
            order: (0..y.nrows()).collect(),
            x,
            y,
            batch_size,
            shuffle,
            rng,
        };
        batcher.reorder();

        Ok(batcher)
    }

    fn reorder(&mut self) {
        self.order = (0..self.y.nrows()).collect();
        if self.shuffle {
            self.order.shuffle(&mut self.rng);
        }
    }
}

impl BatchSource for EagerBatcher {
    fn len(&self) -> usize {
        self.y.nrows().div_ceil(self.batch_size)
    }

    fn get_batch(&mut self, index: usize) -> Result<Batch> {
        if index >= self.len() {
            return Err(CropError::dimension_mismatch(format!(
                "batch {index} requested, epoch has {}",
                self.len()
            )));
        }

        let init = index * self.batch_size;
        let stop = (init + self.batch_size).min(self.order.len());
        let indices = &self.order[init..stop];

        Ok(Batch {
            x: self.x.select(Axis(0), indices),
            y: self.y.select(Axis(0), indices),
        })
    }

    fn on_epoch_end(&mut self) {
        self.reorder();
    }
}
