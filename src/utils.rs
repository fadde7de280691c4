use std::collections::BTreeSet;

use ndarray::{Array1, Array2, Array3, ArrayView1};
use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::{
    error::{CropError, Result},
    Float,
};

/// One-hot rows for integer labels.
pub fn to_categorical(labels: ArrayView1<usize>, n_classes: usize) -> Result<Array2<Float>> {
    let mut one_hot = Array2::zeros((labels.len(), n_classes));
    for (mut row, &label) in one_hot.outer_iter_mut().zip(labels.iter()) {
        if label >= n_classes {
            return Err(CropError::LabelOutOfRange { label, n_classes });
        }
        row[label] = 1.0;
    }
    Ok(one_hot)
}

pub fn count_distinct(labels: ArrayView1<usize>) -> usize {
    labels.iter().collect::<BTreeSet<_>>().len()
}

pub fn gauss_random<R: Rng + ?Sized>(rng: &mut R, mean: Float, std: Float) -> Result<Float> {
    let normal = Normal::new(mean, std)
        .map_err(|err| CropError::invalid_config(format!("gaussian std {std}: {err}")))?;

    Ok(normal.sample(rng))
}

// Synthetic labelled trials: unit gaussian noise plus a class-dependent mean on
// channel `label % n_channels`, so each class is separable by construction.
// Labels cycle 0, 1, .., n_classes - 1 in trial order.
pub fn synthetic_trials<R: Rng + ?Sized>(
    rng: &mut R,
    n_trials: usize,
    n_channels: usize,
    n_samples: usize,
    n_classes: usize,
) -> Result<(Array3<Float>, Array1<usize>)> {
    if n_channels == 0 || n_classes == 0 {
        return Err(CropError::dimension_mismatch(
            "synthetic trials need at least one channel and one class",
        ));
    }

    let y = Array1::from_shape_fn(n_trials, |i| i % n_classes);

    let mut x = Array3::zeros((n_trials, n_channels, n_samples));
    for ((n, c, _t), value) in x.indexed_iter_mut() {
        let mean = if c == y[n] % n_channels { 2.0 } else { 0.0 };
        *value = gauss_random(rng, mean, 1.0)?;
    }

    Ok((x, y))
}
