use std::collections::VecDeque;

use ndarray::{s, Array1, Array2, Array3, Array4, Axis};
use rand::{seq::SliceRandom, Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use crate::{
    crop::{crop_trial, replicate_label, CropGeometry},
    error::{CropError, Result},
    source::{Batch, BatchSource},
    utils::{count_distinct, to_categorical},
    Float,
};

// a single window waiting in the queue, with its trial's label
struct Crop {
    data: Array2<Float>,
    label: usize,
}

/// Bounded-memory alternative to cropping a whole partition up front.
///
/// Trials are cropped one at a time, in a per-epoch order, into a FIFO queue
/// that always holds fewer than `batch_size + crops_per_trial` crops. Every
/// batch has exactly `batch_size` crops; the crops left over at the end of an
/// epoch are dropped.
///
/// The batcher is sequential: `get_batch` ignores its index except to detect
/// that a new traversal started (`index == 0` after at least one batch).
pub struct StreamingCropBatcher<R = ChaCha8Rng> {
    x: Array3<Float>,
    y: Array1<usize>,

    batch_size: usize,
    n_classes: usize,
    geometry: CropGeometry,
    shuffle: bool,

    crops_per_trial: usize,
    total_crops: usize,

    rng: R,
    trial_order: Vec<usize>,
    // next position of trial_order to crop
    cursor: usize,
    queue: VecDeque<Crop>,

    // batches handed out in the current traversal
    emitted: usize,
    epoch: usize,
}

impl StreamingCropBatcher {
    pub fn builder(x: Array3<Float>, y: Array1<usize>) -> CropBatcherBuilder {
        CropBatcherBuilder::new(x, y)
    }
}

impl<R: Rng> StreamingCropBatcher<R> {
    /// Restores the identity trial order, shuffled if asked, and rewinds the cursor.
    pub fn epoch_reset(&mut self, shuffle: bool) {
        self.trial_order = (0..self.y.len()).collect();
        if shuffle {
            self.trial_order.shuffle(&mut self.rng);
        }
        self.cursor = 0;
    }

    fn begin_epoch(&mut self) {
        self.epoch_reset(self.shuffle);
        self.queue.clear();
        self.emitted = 0;
        self.epoch += 1;
        debug!(epoch = self.epoch, "new traversal");
    }

    fn unpack_trial(&mut self) -> Result<()> {
        let Some(&trial) = self.trial_order.get(self.cursor) else {
            return Err(CropError::ExhaustedTrials {
                queued: self.queue.len(),
                batch_size: self.batch_size,
            });
        };

        let crops = crop_trial(
            self.x.index_axis(Axis(0), trial),
            self.crops_per_trial,
            self.geometry,
        )?;
        let labels = replicate_label(self.y[trial], self.crops_per_trial);
        self.queue.extend(
            crops
                .outer_iter()
                .zip(labels.iter())
                .map(|(data, &label)| Crop {
                    data: data.to_owned(),
                    label,
                }),
        );
        self.cursor += 1;

        debug!(
            trial,
            cursor = self.cursor,
            queued = self.queue.len(),
            "unpacked trial"
        );
        Ok(())
    }

    fn pop_batch(&mut self) -> Result<Batch> {
        let batch_size = self.batch_size;
        let (_, n_channels, _) = self.x.dim();

        let mut x = Array4::zeros((batch_size, 1, n_channels, self.geometry.window()));
        let mut labels = Array1::zeros(batch_size);
        for (i, crop) in self.queue.drain(..batch_size).enumerate() {
            x.slice_mut(s![i, 0, .., ..]).assign(&crop.data);
            labels[i] = crop.label;
        }

        Ok(Batch {
            x,
            y: to_categorical(labels.view(), self.n_classes)?,
        })
    }

    /// Batches per epoch, `floor(total_crops / batch_size)`.
    pub fn len(&self) -> usize {
        self.total_crops / self.batch_size
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get_batch(&mut self, index: usize) -> Result<Batch> {
        if index == 0 && self.emitted > 0 {
            self.begin_epoch();
        }

        while self.queue.len() < self.batch_size {
            self.unpack_trial()?;
        }

        let batch = self.pop_batch()?;
        self.emitted += 1;
        Ok(batch)
    }

    /// Epoch boundary hook. Resets only if the current traversal handed out a batch,
    /// so calling it before `get_batch(0)` does not reshuffle twice.
    pub fn on_epoch_end(&mut self) {
        if self.emitted > 0 {
            self.begin_epoch();
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    pub fn geometry(&self) -> CropGeometry {
        self.geometry
    }

    pub fn crops_per_trial(&self) -> usize {
        self.crops_per_trial
    }

    pub fn total_crops(&self) -> usize {
        self.total_crops
    }

    pub fn trial_order(&self) -> &[usize] {
        &self.trial_order
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Number of completed resets since construction.
    pub fn epoch(&self) -> usize {
        self.epoch
    }
}

impl<R: Rng> BatchSource for StreamingCropBatcher<R> {
    fn len(&self) -> usize {
        StreamingCropBatcher::len(self)
    }

    fn get_batch(&mut self, index: usize) -> Result<Batch> {
        StreamingCropBatcher::get_batch(self, index)
    }

    fn on_epoch_end(&mut self) {
        StreamingCropBatcher::on_epoch_end(self)
    }
}

pub struct CropBatcherBuilder {
    x: Array3<Float>,
    y: Array1<usize>,

    batch_size: usize,
    n_classes: Option<usize>,
    geometry: Option<CropGeometry>,
    shuffle: bool,
    seed: Option<u64>,
}

impl CropBatcherBuilder {
    fn new(x: Array3<Float>, y: Array1<usize>) -> Self {
        Self {
            x,
            y,

            batch_size: 512,
            n_classes: None,
            geometry: None,
            shuffle: true,
            seed: None,
        }
    }

    pub fn batch_size(mut self, value: usize) -> Self {
        self.batch_size = value;
        self
    }

    /// One-hot width. Defaults to the number of distinct labels.
    pub fn n_classes(mut self, value: usize) -> Self {
        self.n_classes = Some(value);
        self
    }

    /// Crop geometry. Defaults to one crop spanning the whole trial.
    pub fn geometry(mut self, value: CropGeometry) -> Self {
        self.geometry = Some(value);
        self
    }

    pub fn shuffle(mut self, value: bool) -> Self {
        self.shuffle = value;
        self
    }

    /// Seed of the shuffling rng; without one the rng is seeded from OS entropy.
    pub fn seed(mut self, value: u64) -> Self {
        self.seed = Some(value);
        self
    }

    pub fn build(self) -> Result<StreamingCropBatcher<ChaCha8Rng>> {
        let rng = self
            .seed
            .map_or_else(ChaCha8Rng::from_entropy, ChaCha8Rng::seed_from_u64);
        self.build_with_rng(rng)
    }

    pub fn build_with_rng<R: Rng>(self, rng: R) -> Result<StreamingCropBatcher<R>> {
        if self.batch_size == 0 {
            return Err(CropError::invalid_config("batch size must be positive"));
        }

        let (n_trials, _, n_samples) = self.x.dim();
        if n_trials != self.y.len() {
            return Err(CropError::dimension_mismatch(format!(
                "{n_trials} trials but {} labels",
                self.y.len()
            )));
        }
        if n_trials == 0 {
            return Err(CropError::dimension_mismatch("no trials to crop"));
        }

        let geometry = match self.geometry {
            Some(geometry) => geometry,
            None => CropGeometry::whole_trial(n_samples)?,
        };
        let crops_per_trial = geometry.crops_for(n_samples)?;

        let n_classes = self
            .n_classes
            .unwrap_or_else(|| count_distinct(self.y.view()));
        if let Some(&label) = self.y.iter().find(|&&label| label >= n_classes) {
            return Err(CropError::LabelOutOfRange { label, n_classes });
        }

        let mut batcher = StreamingCropBatcher {
            x: self.x,
            y: self.y,
            batch_size: self.batch_size,
            n_classes,
            geometry,
            shuffle: self.shuffle,
            crops_per_trial,
            total_crops: crops_per_trial * n_trials,
            rng,
            trial_order: Vec::new(),
            cursor: 0,
            queue: VecDeque::new(),
            emitted: 0,
            epoch: 0,
        };
        batcher.epoch_reset(batcher.shuffle);
        batcher.unpack_trial()?;

        debug!(
            trials = n_trials,
            crops_per_trial,
            total_crops = batcher.total_crops,
            batches = batcher.len(),
            "streaming batcher ready"
        );
        Ok(batcher)
    }
}
