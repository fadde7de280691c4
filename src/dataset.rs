use std::fmt;

use ndarray::{s, Array1, Array2, Array3, ArrayD, ArrayView1, ArrayView2, ArrayView3, Axis, Ix3};
use tracing::{info, warn};

use crate::{
    crop::{crop_partition, CropGeometry},
    error::{CropError, Result},
    utils::{count_distinct, to_categorical},
    Float,
};

/// Targets of a partition: integer labels until one-hot encoded.
#[derive(Debug, Clone, PartialEq)]
pub enum Targets {
    Labels(Array1<usize>),
    OneHot(Array2<Float>),
}

impl Targets {
    pub fn len(&self) -> usize {
        match self {
            Targets::Labels(labels) => labels.len(),
            Targets::OneHot(rows) => rows.nrows(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Trials (or crops) of one split, with their targets.
///
/// `x` is (N, channels, samples), or (N, 1, channels, samples) once a channel
/// axis has been inserted.
#[derive(Debug, Clone)]
pub struct Partition {
    x: ArrayD<Float>,
    y: Targets,
}

impl Partition {
    pub fn new(x: Array3<Float>, y: Array1<usize>) -> Result<Self> {
        if x.len_of(Axis(0)) != y.len() {
            return Err(CropError::dimension_mismatch(format!(
                "{} trials but {} labels",
                x.len_of(Axis(0)),
                y.len()
            )));
        }
        Ok(Self {
            x: x.into_dyn(),
            y: Targets::Labels(y),
        })
    }

    pub fn len(&self) -> usize {
        self.y.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn x(&self) -> &ArrayD<Float> {
        &self.x
    }

    pub fn targets(&self) -> &Targets {
        &self.y
    }

    /// The (N, channels, samples) view, before a channel axis is inserted.
    pub fn trials(&self) -> Result<ArrayView3<'_, Float>> {
        self.x.view().into_dimensionality::<Ix3>().map_err(|_| {
            CropError::dimension_mismatch(format!(
                "expected (trials, channels, samples), got shape {:?}",
                self.x.shape()
            ))
        })
    }

    pub fn labels(&self) -> Result<ArrayView1<'_, usize>> {
        match &self.y {
            Targets::Labels(labels) => Ok(labels.view()),
            Targets::OneHot(_) => Err(CropError::dimension_mismatch(
                "labels are already one-hot encoded",
            )),
        }
    }

    pub fn one_hot(&self) -> Result<ArrayView2<'_, Float>> {
        match &self.y {
            Targets::OneHot(rows) => Ok(rows.view()),
            Targets::Labels(_) => Err(CropError::dimension_mismatch(
                "labels are not one-hot encoded yet",
            )),
        }
    }

    /// Consumes the partition without copying its arrays.
    pub fn into_parts(self) -> (ArrayD<Float>, Targets) {
        (self.x, self.y)
    }

    /// Owned (N, channels, samples) trials and their integer labels.
    pub fn into_trials(self) -> Result<(Array3<Float>, Array1<usize>)> {
        let shape = self.x.shape().to_vec();
        let x = self.x.into_dimensionality::<Ix3>().map_err(|_| {
            CropError::dimension_mismatch(format!(
                "expected (trials, channels, samples), got shape {shape:?}"
            ))
        })?;
        match self.y {
            Targets::Labels(labels) => Ok((x, labels)),
            Targets::OneHot(_) => Err(CropError::dimension_mismatch(
                "labels are already one-hot encoded",
            )),
        }
    }

    fn n_channels(&self) -> usize {
        let shape = self.x.shape();
        shape[shape.len() - 2]
    }
}

/// Train, validation and test partitions of one subject's trials.
#[derive(Debug, Clone)]
pub struct TrialDataset {
    train: Partition,
    valid: Partition,
    test: Partition,
    cropped: bool,
}

impl TrialDataset {
    pub fn new(
        train_x: Array3<Float>,
        train_y: Array1<usize>,
        valid_x: Array3<Float>,
        valid_y: Array1<usize>,
        test_x: Array3<Float>,
        test_y: Array1<usize>,
    ) -> Result<Self> {
        Self::from_partitions(
            Partition::new(train_x, train_y)?,
            Partition::new(valid_x, valid_y)?,
            Partition::new(test_x, test_y)?,
        )
    }

    pub fn from_partitions(train: Partition, valid: Partition, test: Partition) -> Result<Self> {
        let n_channels = train.n_channels();
        for (name, partition) in [("valid", &valid), ("test", &test)] {
            if !partition.is_empty() && partition.n_channels() != n_channels {
                return Err(CropError::dimension_mismatch(format!(
                    "{name} has {} channels, train has {n_channels}",
                    partition.n_channels()
                )));
            }
        }

        Ok(Self {
            train,
            valid,
            test,
            cropped: false,
        })
    }

    /// Temporal split of a raw trial stream; no shuffling.
    ///
    /// `floor(train_count * valid_frac)` trials are taken from the end of the
    /// `train_count` head for validation; the test partition is the last
    /// `test_count` trials of the stream.
    pub fn split_from_raw(
        raw_x: ArrayView3<Float>,
        raw_y: ArrayView1<usize>,
        train_count: usize,
        test_count: usize,
        valid_frac: f64,
    ) -> Result<Self> {
        let total = raw_y.len();
        if raw_x.len_of(Axis(0)) != total {
            return Err(CropError::dimension_mismatch(format!(
                "{} trials but {total} labels",
                raw_x.len_of(Axis(0))
            )));
        }
        if !(0.0..1.0).contains(&valid_frac) {
            return Err(CropError::invalid_split(format!(
                "validation fraction {valid_frac} must be in [0, 1)"
            )));
        }
        if train_count > total || test_count > total {
            return Err(CropError::invalid_split(format!(
                "{train_count} train and {test_count} test trials requested from {total}"
            )));
        }

        let valid_count = (train_count as f64 * valid_frac).floor() as usize;
        let head_end = train_count;
        let train_end = train_count - valid_count;
        let test_start = total - test_count;
        if head_end > test_start {
            return Err(CropError::invalid_split(format!(
                "train/valid trials [0, {head_end}) overlap test trials [{test_start}, {total})"
            )));
        }

        info!(
            train = train_end,
            valid = valid_count,
            test = test_count,
            "splitting {total} trials"
        );

        Self::new(
            raw_x.slice(s![..train_end, .., ..]).to_owned(),
            raw_y.slice(s![..train_end]).to_owned(),
            raw_x.slice(s![train_end..head_end, .., ..]).to_owned(),
            raw_y.slice(s![train_end..head_end]).to_owned(),
            raw_x.slice(s![test_start.., .., ..]).to_owned(),
            raw_y.slice(s![test_start..]).to_owned(),
        )
    }

    /// Replaces every partition with its crops. Can only be done once.
    pub fn make_crops(&mut self, geometry: CropGeometry) -> Result<()> {
        if self.cropped {
            return Err(CropError::AlreadyCropped);
        }

        // all three partitions are cropped before any is replaced
        let train = crop_named("train", &self.train, geometry)?;
        let valid = crop_named("valid", &self.valid, geometry)?;
        let test = crop_named("test", &self.test, geometry)?;
        self.train = train;
        self.valid = valid;
        self.test = test;
        self.cropped = true;

        Ok(())
    }

    /// (N, channels, samples) -> (N, 1, channels, samples). A second call is a no-op.
    pub fn add_channel_axis(&mut self) {
        if self.train.x.ndim() != 3 {
            warn!("channel axis already present, shape {:?}", self.train.x.shape());
            return;
        }
        for partition in [&mut self.train, &mut self.valid, &mut self.test] {
            let x = std::mem::take(&mut partition.x);
            partition.x = x.insert_axis(Axis(1));
        }
    }

    /// One-hot encodes the labels of every partition.
    ///
    /// Without `n_classes` the width is the number of distinct train labels;
    /// a valid or test label outside that range fails with `LabelOutOfRange`.
    pub fn to_categorical(&mut self, n_classes: Option<usize>) -> Result<()> {
        if matches!(self.train.y, Targets::OneHot(_)) {
            warn!("labels are already one-hot encoded");
            return Ok(());
        }

        let n_classes = match n_classes {
            Some(n_classes) => n_classes,
            None => count_distinct(self.train.labels()?),
        };

        let train = to_categorical(self.train.labels()?, n_classes)?;
        let valid = to_categorical(self.valid.labels()?, n_classes)?;
        let test = to_categorical(self.test.labels()?, n_classes)?;
        self.train.y = Targets::OneHot(train);
        self.valid.y = Targets::OneHot(valid);
        self.test.y = Targets::OneHot(test);

        Ok(())
    }

    pub fn train(&self) -> &Partition {
        &self.train
    }

    pub fn valid(&self) -> &Partition {
        &self.valid
    }

    pub fn test(&self) -> &Partition {
        &self.test
    }

    pub fn into_partitions(self) -> (Partition, Partition, Partition) {
        (self.train, self.valid, self.test)
    }

    pub fn is_cropped(&self) -> bool {
        self.cropped
    }

    pub fn len(&self) -> usize {
        self.train.len() + self.valid.len() + self.test.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Shape of one trial (or crop).
    pub fn shape(&self) -> &[usize] {
        &self.train.x.shape()[1..]
    }

    pub fn n_channels(&self) -> usize {
        self.train.n_channels()
    }

    pub fn n_samples(&self) -> usize {
        let shape = self.train.x.shape();
        shape[shape.len() - 1]
    }

    pub fn train_frac(&self) -> f64 {
        self.fraction(self.train.len())
    }

    pub fn valid_frac(&self) -> f64 {
        self.fraction(self.valid.len())
    }

    pub fn test_frac(&self) -> f64 {
        self.fraction(self.test.len())
    }

    fn fraction(&self, count: usize) -> f64 {
        match self.len() {
            0 => 0.0,
            total => count as f64 / total as f64,
        }
    }
}

fn crop_named(name: &str, partition: &Partition, geometry: CropGeometry) -> Result<Partition> {
    info!(
        window = geometry.window(),
        stride = geometry.stride(),
        "cropping {name}"
    );
    let (x, y) = crop_partition(partition.trials()?, partition.labels()?, geometry)?;
    info!(trials = partition.len(), crops = y.len(), "cropped {name}");
    Partition::new(x, y)
}

impl fmt::Display for TrialDataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<TrialDataset with train:{}, valid:{}, test:{}>",
            self.train.len(),
            self.valid.len(),
            self.test.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{array, Array};

    use super::*;

    // trial n holds the value n everywhere, label = n % 4
    fn raw_stream(
        n_trials: usize,
        n_channels: usize,
        n_samples: usize,
    ) -> (Array3<Float>, Array1<usize>) {
        let x = Array::from_shape_fn((n_trials, n_channels, n_samples), |(n, _, _)| n as Float);
        let y = Array1::from_shape_fn(n_trials, |n| n % 4);
        (x, y)
    }

    fn small_dataset() -> TrialDataset {
        let (x, y) = raw_stream(10, 2, 100);
        TrialDataset::split_from_raw(x.view(), y.view(), 6, 3, 0.5).unwrap()
    }

    #[test]
    fn new_rejects_length_mismatch() {
        let result = TrialDataset::new(
            Array3::zeros((3, 2, 10)),
            array![0, 1],
            Array3::zeros((0, 2, 10)),
            Array1::zeros(0),
            Array3::zeros((0, 2, 10)),
            Array1::zeros(0),
        );
        assert!(matches!(result, Err(CropError::DimensionMismatch(_))));
    }

    #[test]
    fn new_rejects_channel_mismatch() {
        let result = TrialDataset::new(
            Array3::zeros((2, 2, 10)),
            array![0, 1],
            Array3::zeros((1, 3, 10)),
            array![0],
            Array3::zeros((0, 2, 10)),
            Array1::zeros(0),
        );
        assert!(matches!(result, Err(CropError::DimensionMismatch(_))));
    }

    #[test]
    fn scenario_b_temporal_split() {
        let (x, y) = raw_stream(130, 1, 4);
        let dataset = TrialDataset::split_from_raw(x.view(), y.view(), 100, 20, 0.1).unwrap();

        assert_eq!(dataset.train().len(), 90);
        assert_eq!(dataset.valid().len(), 10);
        assert_eq!(dataset.test().len(), 20);

        let train = dataset.train().trials().unwrap();
        let valid = dataset.valid().trials().unwrap();
        let test = dataset.test().trials().unwrap();
        assert_eq!(train[[0, 0, 0]], 0.0);
        assert_eq!(train[[89, 0, 0]], 89.0);
        assert_eq!(valid[[0, 0, 0]], 90.0);
        assert_eq!(valid[[9, 0, 0]], 99.0);
        // test comes from the tail of the stream
        assert_eq!(test[[0, 0, 0]], 110.0);
        assert_eq!(test[[19, 0, 0]], 129.0);
    }

    #[test]
    fn split_rejects_overlap() {
        let (x, y) = raw_stream(10, 1, 4);
        let result = TrialDataset::split_from_raw(x.view(), y.view(), 8, 3, 0.0);
        assert!(matches!(result, Err(CropError::InvalidSplit(_))));
    }

    #[test]
    fn split_rejects_bad_fraction_and_counts() {
        let (x, y) = raw_stream(10, 1, 4);
        assert!(matches!(
            TrialDataset::split_from_raw(x.view(), y.view(), 5, 5, 1.0),
            Err(CropError::InvalidSplit(_))
        ));
        assert!(matches!(
            TrialDataset::split_from_raw(x.view(), y.view(), 11, 0, 0.1),
            Err(CropError::InvalidSplit(_))
        ));
    }

    #[test]
    fn split_with_adjacent_windows_is_allowed() {
        let (x, y) = raw_stream(10, 1, 4);
        let dataset = TrialDataset::split_from_raw(x.view(), y.view(), 7, 3, 0.0).unwrap();
        assert_eq!(dataset.len(), 10);
        assert_eq!(dataset.to_string(), "<TrialDataset with train:7, valid:0, test:3>");
    }

    #[test]
    fn make_crops_replicates_labels_per_trial() {
        let mut dataset = small_dataset();
        dataset.make_crops(CropGeometry::new(50, 25).unwrap()).unwrap();

        // 3 crops per trial of 100 samples
        assert_eq!(dataset.train().len(), 9);
        assert_eq!(dataset.valid().len(), 9);
        assert_eq!(dataset.test().len(), 9);
        assert_eq!(dataset.shape(), &[2, 50]);

        let x = dataset.test().trials().unwrap();
        let y = dataset.test().labels().unwrap();
        // test trials are 7, 8, 9
        for i in 0..9 {
            let trial = 7 + i / 3;
            assert_eq!(x[[i, 1, 10]], trial as Float);
            assert_eq!(y[i], trial % 4);
        }
    }

    #[test]
    fn make_crops_twice_fails() {
        let mut dataset = small_dataset();
        let geometry = CropGeometry::new(50, 25).unwrap();
        dataset.make_crops(geometry).unwrap();
        assert!(matches!(
            dataset.make_crops(geometry),
            Err(CropError::AlreadyCropped)
        ));
    }

    #[test]
    fn make_crops_failure_leaves_dataset_untouched() {
        let mut dataset = small_dataset();
        assert!(matches!(
            dataset.make_crops(CropGeometry::new(101, 1).unwrap()),
            Err(CropError::InvalidGeometry(_))
        ));
        assert!(!dataset.is_cropped());
        assert_eq!(dataset.train().len(), 3);
    }

    #[test]
    fn channel_axis_is_inserted_once() {
        let mut dataset = small_dataset();
        dataset.add_channel_axis();
        assert_eq!(dataset.train().x().shape(), &[3, 1, 2, 100]);
        dataset.add_channel_axis();
        assert_eq!(dataset.valid().x().shape(), &[3, 1, 2, 100]);
        assert_eq!(dataset.n_channels(), 2);
        assert_eq!(dataset.n_samples(), 100);
    }

    #[test]
    fn categorical_infers_width_from_train() {
        let (x, y) = raw_stream(10, 1, 4);
        let mut dataset = TrialDataset::split_from_raw(x.view(), y.view(), 8, 2, 0.5).unwrap();
        // train labels are 0, 1, 2, 3
        dataset.to_categorical(None).unwrap();
        assert_eq!(dataset.train().one_hot().unwrap().dim(), (4, 4));
        assert_eq!(dataset.test().one_hot().unwrap().row(1).to_vec(), vec![0.0, 1.0, 0.0, 0.0]);
        assert!(matches!(dataset.train().targets(), Targets::OneHot(_)));
    }

    #[test]
    fn categorical_inference_rejects_unseen_test_class() {
        let (x, y) = raw_stream(10, 1, 4);
        // train holds labels 0, 1 only, valid holds labels 2, 3
        let mut dataset = TrialDataset::split_from_raw(x.view(), y.view(), 4, 2, 0.5).unwrap();
        assert!(matches!(
            dataset.to_categorical(None),
            Err(CropError::LabelOutOfRange { n_classes: 2, .. })
        ));
        dataset.to_categorical(Some(4)).unwrap();
        assert_eq!(dataset.valid().one_hot().unwrap().dim(), (2, 4));
    }

    #[test]
    fn fractions() {
        let dataset = small_dataset();
        // 3 + 3 + 3 of the 10 raw trials are kept
        assert_eq!(dataset.len(), 9);
        assert!((dataset.train_frac() - 1.0 / 3.0).abs() < 1e-9);
        assert!((dataset.valid_frac() - 1.0 / 3.0).abs() < 1e-9);
        assert!((dataset.test_frac() - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn into_trials_moves_the_buffer() {
        let (x, y) = raw_stream(5, 2, 6);
        let partition = Partition::new(x, y).unwrap();
        let ptr = partition.x().as_ptr();

        let (x, y) = partition.into_trials().unwrap();
        assert_eq!(x.as_ptr(), ptr);
        assert_eq!(x.dim(), (5, 2, 6));
        assert_eq!(y.to_vec(), vec![0, 1, 2, 3, 0]);
    }

    #[test]
    fn into_trials_rejects_prepared_partition() {
        let (x, y) = raw_stream(8, 1, 4);
        let mut dataset = TrialDataset::new(
            x,
            y,
            Array3::zeros((0, 1, 4)),
            Array1::zeros(0),
            Array3::zeros((0, 1, 4)),
            Array1::zeros(0),
        )
        .unwrap();
        dataset.add_channel_axis();
        let (train, _, _) = dataset.into_partitions();
        assert!(matches!(
            train.into_trials(),
            Err(CropError::DimensionMismatch(_))
        ));

        let mut dataset = TrialDataset::new(
            Array3::zeros((2, 1, 4)),
            array![0, 1],
            Array3::zeros((0, 1, 4)),
            Array1::zeros(0),
            Array3::zeros((0, 1, 4)),
            Array1::zeros(0),
        )
        .unwrap();
        dataset.to_categorical(Some(2)).unwrap();
        let (train, _, _) = dataset.into_partitions();
        assert!(matches!(
            train.into_trials(),
            Err(CropError::DimensionMismatch(_))
        ));
    }
}
