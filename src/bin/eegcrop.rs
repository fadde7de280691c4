//! Crop and batch synthetic EEG trials the way an experiment would.
//!
//! ```bash
//! # eager cropping with the built-in defaults
//! eegcrop
//!
//! # streaming batches for a configured experiment
//! RUST_LOG=debug eegcrop --config experiment.json --samples 1500 --seed 7
//! ```

use std::path::PathBuf;

use anyhow::{ensure, Context};
use clap::Parser;
use eeg_crops::{run_epochs, Experiment, ExperimentConfig};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "eegcrop", version, about = "Crop EEG trials into training batches")]
struct Cli {
    /// Experiment configuration (JSON); built-in defaults otherwise
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of synthetic trials to generate
    #[arg(long, default_value = "100")]
    trials: usize,

    /// Channels per trial
    #[arg(long, default_value = "22")]
    channels: usize,

    /// Samples per trial
    #[arg(long, default_value = "500")]
    samples: usize,

    /// Seed for trial synthesis; overrides the configured seed when given
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => ExperimentConfig::from_path(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ExperimentConfig::default(),
    };
    if cli.seed.is_some() {
        config.seed = cli.seed;
    }
    ensure!(
        config.train_count + config.test_count <= cli.trials,
        "{} train and {} test trials do not fit in {} generated trials",
        config.train_count,
        config.test_count,
        cli.trials
    );

    let mut rng = config
        .seed
        .map_or_else(ChaCha8Rng::from_entropy, ChaCha8Rng::seed_from_u64);
    let (x, y) = eeg_crops::synthetic_trials(
        &mut rng,
        cli.trials,
        cli.channels,
        cli.samples,
        config.n_classes(),
    )?;
    info!(
        trials = cli.trials,
        channels = cli.channels,
        samples = cli.samples,
        "generated synthetic trials"
    );

    let epochs = config.epochs;
    let experiment = Experiment::from_raw(x.view(), y.view(), config)?;
    info!(blueprint = ?experiment.blueprint(), "model input resolved");

    let mut sources = experiment.prepare()?;
    let summaries = run_epochs(sources.train.as_mut(), epochs, |epoch, index, batch| {
        if index == 0 {
            info!(epoch, x = ?batch.x.shape(), y = ?batch.y.shape(), "first batch");
        }
        Ok(())
    })?;
    for summary in &summaries {
        info!(
            epoch = summary.epoch,
            batches = summary.batches,
            crops = summary.crops,
            "train epoch"
        );
    }

    if let Some(valid) = sources.valid.as_mut() {
        let summaries = run_epochs(valid.as_mut(), 1, |_, _, _| Ok(()))?;
        for summary in &summaries {
            info!(
                batches = summary.batches,
                crops = summary.crops,
                "validation pass"
            );
        }
    }
    info!(crops = sources.test.len(), "test partition held out");

    Ok(())
}
