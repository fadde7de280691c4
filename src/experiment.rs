use ndarray::{ArrayView1, ArrayView3};
use tracing::{debug, info};

use crate::{
    batcher::StreamingCropBatcher,
    config::ExperimentConfig,
    crop::CropGeometry,
    dataset::{Partition, TrialDataset},
    error::{CropError, Result},
    registry::{ModelBlueprint, ModelInputs},
    source::{Batch, BatchSource, EagerBatcher},
    Float,
};

/// A split dataset paired with the configuration that decides how it is cropped
/// and batched.
pub struct Experiment {
    dataset: TrialDataset,
    config: ExperimentConfig,
    geometry: CropGeometry,
    blueprint: ModelBlueprint,
}

/// Batch sources ready for an external training loop.
pub struct PreparedSources {
    pub train: Box<dyn BatchSource>,
    /// `None` when the validation partition is empty.
    pub valid: Option<Box<dyn BatchSource>>,
    /// Cropped and one-hot encoded on the eager path, raw trials when streaming.
    pub test: Partition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpochSummary {
    pub epoch: usize,
    pub batches: usize,
    pub crops: usize,
}

impl Experiment {
    pub fn new(dataset: TrialDataset, config: ExperimentConfig) -> Result<Self> {
        config.validate()?;
        if dataset.is_cropped() {
            return Err(CropError::AlreadyCropped);
        }
        // raw trials only
        dataset.train().trials()?;

        let n_samples = dataset.n_samples();
        let geometry = match config.crop {
            Some(geometry) => geometry,
            None => CropGeometry::whole_trial(n_samples)?,
        };
        let crops_per_trial = geometry.crops_for(n_samples)?;

        let blueprint = config.model.blueprint(&ModelInputs {
            n_classes: config.n_classes(),
            n_channels: dataset.n_channels(),
            crop_samples: geometry.window(),
            dropout_rate: config.dropout_rate,
            learning_rate: config.learning_rate,
        })?;

        info!(
            model = %config.model,
            window = geometry.window(),
            stride = geometry.stride(),
            crops_per_trial,
            streaming = config.data_generator,
            "experiment on {dataset}"
        );

        Ok(Self {
            dataset,
            config,
            geometry,
            blueprint,
        })
    }

    /// Splits a raw trial stream with the configured counts, then builds the experiment.
    pub fn from_raw(
        raw_x: ArrayView3<Float>,
        raw_y: ArrayView1<usize>,
        config: ExperimentConfig,
    ) -> Result<Self> {
        let dataset = TrialDataset::split_from_raw(
            raw_x,
            raw_y,
            config.train_count,
            config.test_count,
            config.validation_frac,
        )?;
        Self::new(dataset, config)
    }

    pub fn dataset(&self) -> &TrialDataset {
        &self.dataset
    }

    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    pub fn geometry(&self) -> CropGeometry {
        self.geometry
    }

    pub fn blueprint(&self) -> &ModelBlueprint {
        &self.blueprint
    }

    pub fn prepare(self) -> Result<PreparedSources> {
        if self.config.data_generator {
            self.prepare_streaming()
        } else {
            self.prepare_eager()
        }
    }

    fn prepare_eager(mut self) -> Result<PreparedSources> {
        let config = &self.config;
        self.dataset.make_crops(self.geometry)?;
        self.dataset.add_channel_axis();
        self.dataset.to_categorical(Some(config.n_classes()))?;

        let (train, valid, test) = self.dataset.into_partitions();
        let train = EagerBatcher::new(train, config.batch_size, config.shuffle, config.seed)?;
        let valid: Option<Box<dyn BatchSource>> = if valid.is_empty() {
            None
        } else {
            Some(Box::new(EagerBatcher::new(
                valid,
                config.batch_size,
                false,
                config.seed,
            )?))
        };

        Ok(PreparedSources {
            train: Box::new(train),
            valid,
            test,
        })
    }

    fn prepare_streaming(self) -> Result<PreparedSources> {
        let config = &self.config;
        let (train, valid, test) = self.dataset.into_partitions();

        let geometry = self.geometry;
        let streamer = |partition: Partition,
                        shuffle: bool,
                        seed: Option<u64>|
         -> Result<StreamingCropBatcher> {
            let (x, y) = partition.into_trials()?;
            let mut builder = StreamingCropBatcher::builder(x, y)
                .batch_size(config.batch_size)
                .n_classes(config.n_classes())
                .geometry(geometry)
                .shuffle(shuffle);
            if let Some(seed) = seed {
                builder = builder.seed(seed);
            }
            builder.build()
        };

        let train = streamer(train, config.shuffle, config.seed)?;
        let valid: Option<Box<dyn BatchSource>> = if valid.is_empty() {
            None
        } else {
            let seed = config.seed.map(|seed| seed.wrapping_add(1));
            Some(Box::new(streamer(valid, false, seed)?))
        };

        Ok(PreparedSources {
            train: Box::new(train),
            valid,
            test,
        })
    }
}

/// Pulls every batch of `source` for `epochs` traversals, handing each to `step`.
pub fn run_epochs<S, F>(source: &mut S, epochs: usize, mut step: F) -> Result<Vec<EpochSummary>>
where
    S: BatchSource + ?Sized,
    F: FnMut(usize, usize, &Batch) -> Result<()>,
{
    let mut summaries = Vec::with_capacity(epochs);
    for epoch in 0..epochs {
        let batches = source.len();
        let mut crops = 0;
        for index in 0..batches {
            let batch = source.get_batch(index)?;
            step(epoch, index, &batch)?;
            crops += batch.len();
        }
        source.on_epoch_end();

        debug!(epoch, batches, crops, "epoch done");
        summaries.push(EpochSummary {
            epoch,
            batches,
            crops,
        });
    }

    Ok(summaries)
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::{registry::ModelKind, utils::synthetic_trials};

    // 40 trials of 2 channels x 20 samples; 24 train, 6 valid, 10 test
    fn experiment(data_generator: bool) -> Experiment {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let (x, y) = synthetic_trials(&mut rng, 40, 2, 20, 4).unwrap();
        let config = ExperimentConfig {
            model: ModelKind::ShallowNet,
            train_count: 30,
            test_count: 10,
            validation_frac: 0.2,
            batch_size: 10,
            epochs: 2,
            seed: Some(5),
            crop: Some(CropGeometry::new(16, 2).unwrap()),
            data_generator,
            ..ExperimentConfig::default()
        };
        Experiment::from_raw(x.view(), y.view(), config).unwrap()
    }

    #[test]
    fn resolves_blueprint_from_crop_window() {
        let experiment = experiment(false);
        assert_eq!(experiment.blueprint().input_shape, [1, 2, 16]);
        assert_eq!(experiment.blueprint().n_classes, 4);
        assert_eq!(experiment.blueprint().learning_rate, 0.001);
        assert_eq!(experiment.dataset().train().len(), 24);
        assert_eq!(experiment.dataset().valid().len(), 6);
    }

    #[test]
    fn eager_keeps_every_crop() {
        // 3 crops per trial: 72 train crops, 18 valid crops
        let mut sources = experiment(false).prepare().unwrap();
        assert_eq!(sources.train.len(), 8);

        let summaries = run_epochs(sources.train.as_mut(), 2, |_, _, batch| {
            assert_eq!(&batch.x.shape()[1..], &[1, 2, 16]);
            assert_eq!(batch.y.ncols(), 4);
            Ok(())
        })
        .unwrap();
        assert_eq!(summaries.len(), 2);
        assert!(summaries.iter().all(|s| s.batches == 8 && s.crops == 72));

        let valid = sources.valid.as_mut().unwrap();
        assert_eq!(valid.len(), 2);
        assert_eq!(sources.test.x().shape(), &[30, 1, 2, 16]);
        assert_eq!(sources.test.one_hot().unwrap().dim(), (30, 4));
    }

    #[test]
    fn streaming_drops_the_remainder() {
        let mut sources = experiment(true).prepare().unwrap();
        assert_eq!(sources.train.len(), 7);

        let summaries = run_epochs(sources.train.as_mut(), 2, |_, _, batch| {
            assert_eq!(batch.len(), 10);
            Ok(())
        })
        .unwrap();
        assert!(summaries.iter().all(|s| s.batches == 7 && s.crops == 70));

        // validation streams the valid partition, not train
        let valid = sources.valid.as_mut().unwrap();
        assert_eq!(valid.len(), 1);
        assert_eq!(sources.test.trials().unwrap().dim(), (10, 2, 20));
    }

    #[test]
    fn empty_valid_partition_has_no_source() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let (x, y) = synthetic_trials(&mut rng, 12, 2, 8, 2).unwrap();
        let config = ExperimentConfig {
            class_names: vec!["a".into(), "b".into()],
            train_count: 8,
            test_count: 4,
            validation_frac: 0.0,
            data_generator: true,
            seed: Some(1),
            ..ExperimentConfig::default()
        };
        let sources = Experiment::from_raw(x.view(), y.view(), config)
            .unwrap()
            .prepare()
            .unwrap();
        assert!(sources.valid.is_none());
    }

    #[test]
    fn window_longer_than_trial_fails_early() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let (x, y) = synthetic_trials(&mut rng, 12, 2, 8, 4).unwrap();
        let config = ExperimentConfig {
            train_count: 8,
            test_count: 4,
            crop: Some(CropGeometry::new(9, 1).unwrap()),
            ..ExperimentConfig::default()
        };
        assert!(matches!(
            Experiment::from_raw(x.view(), y.view(), config),
            Err(CropError::InvalidGeometry(_))
        ));
    }

    #[test]
    fn step_errors_stop_the_loop() {
        let mut sources = experiment(false).prepare().unwrap();
        let mut calls = 0;
        let result = run_epochs(sources.train.as_mut(), 2, |_, index, _| {
            calls += 1;
            match index {
                2 => Err(CropError::invalid_config("stop")),
                _ => Ok(()),
            }
        });
        assert!(result.is_err());
        assert_eq!(calls, 3);
    }
}
