mod serde;

use ndarray::{s, Array1, Array3, ArrayView1, ArrayView2, ArrayView3, Axis};

use crate::{
    error::{CropError, Result},
    Float,
};

// CropGeometry describes how a trial is cut into fixed-size windows:
// a window of `window` samples is taken every `stride` samples, starting
// at sample 0. Both values are strictly positive, which is checked at
// construction (and at deserialization, see crop/serde.rs).
#[derive(Debug, Clone, Copy, PartialEq, Eq, ::serde::Serialize)]
pub struct CropGeometry {
    window: usize,
    stride: usize,
}

impl CropGeometry {
    pub fn new(window: usize, stride: usize) -> Result<Self> {
        if window == 0 {
            return Err(CropError::invalid_geometry("window size must be positive"));
        }
        if stride == 0 {
            return Err(CropError::invalid_geometry("stride must be positive"));
        }
        Ok(Self { window, stride })
    }

    /// One crop covering the whole trial.
    pub fn whole_trial(n_samples: usize) -> Result<Self> {
        Self::new(n_samples, 1)
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Number of crops a trial of `n_samples` yields under this geometry.
    pub fn crops_for(&self, n_samples: usize) -> Result<usize> {
        crop_count(n_samples, self.window, self.stride)
    }
}

/// `ceil((n_samples - window + 1) / stride)`.
///
/// The last window always ends inside the trial: `(n - 1) * stride <= n_samples - window`.
pub fn crop_count(n_samples: usize, window: usize, stride: usize) -> Result<usize> {
    if window == 0 || stride == 0 {
        return Err(CropError::invalid_geometry(format!(
            "window ({window}) and stride ({stride}) must be positive"
        )));
    }
    if window > n_samples {
        return Err(CropError::invalid_geometry(format!(
            "window {window} exceeds trial length of {n_samples} samples"
        )));
    }
    Ok((n_samples - window + 1).div_ceil(stride))
}

/// Cuts `n_crops` windows out of one (channels, samples) trial.
///
/// Window `i` spans samples `[i * stride, i * stride + window)`. A count that
/// would read past the end of the trial is rejected rather than padded.
pub fn crop_trial(
    trial: ArrayView2<Float>,
    n_crops: usize,
    geometry: CropGeometry,
) -> Result<Array3<Float>> {
    let (n_channels, n_samples) = trial.dim();
    let window = geometry.window();
    let stride = geometry.stride();

    if n_crops > 0 {
        let end = (n_crops - 1)
            .checked_mul(stride)
            .and_then(|start| start.checked_add(window));
        if end.map_or(true, |end| end > n_samples) {
            return Err(CropError::invalid_geometry(format!(
                "{n_crops} crops of {window} samples every {stride} overrun a trial of {n_samples} samples"
            )));
        }
    }

    let mut crops = Array3::zeros((n_crops, n_channels, window));
    for (i, mut crop) in crops.outer_iter_mut().enumerate() {
        let init = i * stride;
        crop.assign(&trial.slice(s![.., init..init + window]));
    }

    Ok(crops)
}

/// `n` copies of `label`.
pub fn replicate_label(label: usize, n: usize) -> Array1<usize> {
    Array1::from_elem(n, label)
}

/// Crops every trial of a (trials, channels, samples) stack and concatenates
/// the results in trial order, replicating each trial's label per crop.
pub fn crop_partition(
    x: ArrayView3<Float>,
    y: ArrayView1<usize>,
    geometry: CropGeometry,
) -> Result<(Array3<Float>, Array1<usize>)> {
    let (n_trials, n_channels, n_samples) = x.dim();
    if n_trials != y.len() {
        return Err(CropError::dimension_mismatch(format!(
            "{n_trials} trials but {} labels",
            y.len()
        )));
    }

    let n_crops = geometry.crops_for(n_samples)?;
    let mut new_x = Array3::zeros((n_crops * n_trials, n_channels, geometry.window()));
    let mut new_y = Array1::zeros(n_crops * n_trials);

    for (i, (trial, &label)) in x.axis_iter(Axis(0)).zip(y.iter()).enumerate() {
        let init = i * n_crops;
        let stop = init + n_crops;
        new_x
            .slice_mut(s![init..stop, .., ..])
            .assign(&crop_trial(trial, n_crops, geometry)?);
        new_y
            .slice_mut(s![init..stop])
            .assign(&replicate_label(label, n_crops));
    }

    Ok((new_x, new_y))
}
