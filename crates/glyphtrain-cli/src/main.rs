//! glyphtrain CLI
//!
//! Command-line interface for training and validating glyph models.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use glyphtrain::checkpoint::{CheckpointManager, CheckpointState};
use glyphtrain::data::GlyphLoader;
use glyphtrain::log::{CompositeLogger, ConsoleLogger, JsonlTracker, ValRecord};
use glyphtrain::training::{
    new_run_id, AdamW, AdamWState, ExperimentLayout, ResumeEpoch, TrainConfig, Trainer,
    TrainingMode,
};
use glyphtrain::validation::ValidationRunner;
use glyphtrain_synth::{LinearGlyphModel, Split, SyntheticGlyphs};

#[derive(Parser)]
#[command(name = "glyphtrain")]
#[command(version, about = "glyphtrain - joint raster/vector glyph model training", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train the reference model on synthetic glyphs
    Train {
        #[command(flatten)]
        run: ConfigArgs,

        /// Training mode
        #[arg(long)]
        mode: Option<String>,

        /// First epoch
        #[arg(long)]
        init_epoch: Option<u64>,

        /// Epoch count (exclusive upper bound)
        #[arg(long)]
        n_epochs: Option<u64>,

        /// Learning rate
        #[arg(long)]
        lr: Option<f64>,

        #[arg(long)]
        log_every: Option<u64>,

        #[arg(long)]
        sample_every: Option<u64>,

        #[arg(long)]
        val_every: Option<u64>,

        /// Checkpoint every N epochs (0 disables)
        #[arg(long)]
        ckpt_every: Option<u64>,

        /// Resume from this checkpoint
        #[arg(long)]
        resume: Option<PathBuf>,

        /// Which epoch a resumed run starts at (configured, checkpoint)
        #[arg(long)]
        resume_epoch: Option<String>,

        /// Write tracker events under the experiment's tracker/ directory
        #[arg(long)]
        tracker: bool,

        /// Echo tracker metrics to the console
        #[arg(long)]
        echo_metrics: bool,

        /// Show a progress bar instead of per-step console lines
        #[arg(long)]
        progress: bool,

        /// Replicate the model across all worker threads
        #[arg(long)]
        multi_gpu: bool,

        /// Training batches per epoch
        #[arg(long, default_value = "50")]
        train_batches: usize,
    },

    /// Run one validation pass with a saved checkpoint
    Validate {
        #[command(flatten)]
        run: ConfigArgs,

        /// Checkpoint file
        #[arg(long)]
        checkpoint: PathBuf,
    },

    /// List checkpoints of an experiment
    Checkpoints {
        /// Experiment directory or its checkpoints/ directory
        dir: PathBuf,
    },
}

/// Options shared by every command that builds a run configuration.
#[derive(Args)]
struct ConfigArgs {
    /// TOML configuration file; flags override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Root under which experiments/ is created
    #[arg(long)]
    exp_path: Option<PathBuf>,

    /// Experiment name
    #[arg(long)]
    name_exp: Option<String>,

    #[arg(long)]
    seed: Option<u64>,

    /// Validation batches per pass
    #[arg(long, default_value = "5")]
    val_batches: usize,
}

impl ConfigArgs {
    fn load(&self) -> Result<TrainConfig> {
        let mut config = match &self.config {
            Some(path) => TrainConfig::from_toml_file(path)
                .with_context(|| format!("reading config {}", path.display()))?,
            None => TrainConfig::default(),
        };
        if let Some(exp_path) = &self.exp_path {
            config.exp_path = exp_path.clone();
        }
        if let Some(name) = &self.name_exp {
            config.name_exp = name.clone();
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        Ok(config)
    }
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Train {
            run,
            mode,
            init_epoch,
            n_epochs,
            lr,
            log_every,
            sample_every,
            val_every,
            ckpt_every,
            resume,
            resume_epoch,
            tracker,
            echo_metrics,
            progress,
            multi_gpu,
            train_batches,
        } => {
            let val_batches = run.val_batches;
            let mut cfg = run.load()?;
            if let Some(mode) = mode {
                cfg.mode = mode.parse::<TrainingMode>()?;
            }
            if let Some(e) = init_epoch {
                cfg.init_epoch = e;
            }
            if let Some(n) = n_epochs {
                cfg.n_epochs = n;
            }
            if let Some(lr) = lr {
                cfg.lr = lr;
            }
            if let Some(n) = log_every {
                cfg.cadence.log_every = n;
            }
            if let Some(n) = sample_every {
                cfg.cadence.sample_every = n;
            }
            if let Some(n) = val_every {
                cfg.cadence.val_every = n;
            }
            if let Some(n) = ckpt_every {
                cfg.cadence.ckpt_every = n;
            }
            if let Some(path) = resume {
                let policy = match resume_epoch {
                    Some(p) => p.parse::<ResumeEpoch>()?,
                    None => cfg.resume_epoch,
                };
                cfg = cfg.with_resume(path, policy);
            }
            cfg.tracker |= tracker;
            cfg.progress_bar |= progress;
            cfg.multi_gpu |= multi_gpu;

            train(cfg, echo_metrics, train_batches, val_batches)?;
        }
        Commands::Validate { run, checkpoint } => {
            validate(run.load()?, &checkpoint, run.val_batches)?;
        }
        Commands::Checkpoints { dir } => {
            list_checkpoints(&dir)?;
        }
    }

    Ok(())
}

fn train(
    config: TrainConfig,
    echo_metrics: bool,
    train_batches: usize,
    val_batches: usize,
) -> Result<()> {
    config.validate()?;
    let layout = ExperimentLayout::from_config(&config);
    layout.ensure_dirs()?;
    let run_id = new_run_id();
    layout.write_manifest(&config, &run_id)?;

    tracing::info!(
        run = %config.run_name(),
        run_id = %run_id,
        epochs = config.n_epochs,
        train_batches,
        val_batches,
        "Starting training"
    );

    let mut tracker = CompositeLogger::new(Vec::new());
    if config.tracker {
        let config_json = serde_json::to_value(&config)?;
        tracker.add(Box::new(JsonlTracker::new(
            layout.tracker_dir(),
            &config.tracker_project,
            &run_id,
            &config_json,
        )?));
    }
    if echo_metrics {
        tracker.add(Box::new(ConsoleLogger::new()));
    }

    let train_data = SyntheticGlyphs::from_config(&config, Split::Train, train_batches);
    let val_data = SyntheticGlyphs::from_config(&config, Split::Val, val_batches);
    let model = LinearGlyphModel::from_config(&config);
    tracing::info!(replicas = model.replicas(), "Created linear glyph model");
    let optimizer = AdamW::from_config(&config);

    let mut trainer = Trainer::new(config, layout, model, optimizer, Box::new(tracker))?
        .with_run_id(run_id);
    let summary = trainer.train(&train_data, &val_data)?;

    println!(
        "Completed {} epochs, global step {}, {} checkpoints, final lr {:.6}",
        summary.epochs_completed,
        summary.global_step,
        summary.checkpoints.len(),
        summary.final_lr
    );
    Ok(())
}

fn validate(config: TrainConfig, checkpoint: &Path, val_batches: usize) -> Result<()> {
    let state: CheckpointState<AdamWState> = CheckpointManager::load(checkpoint)?;
    let epoch = state.epoch;

    let mut model = LinearGlyphModel::from_config(&config);
    let mut optimizer = AdamW::from_config(&config);
    let progress = state.restore(&mut model, &mut optimizer)?;

    let val_data = SyntheticGlyphs::from_config(&config, Split::Val, val_batches);
    tracing::info!(
        checkpoint = %checkpoint.display(),
        batches = val_data.len(),
        "Starting validation"
    );
    let report = ValidationRunner::run(&mut model, &val_data)?;

    let record = ValRecord {
        epoch,
        n_epochs: config.n_epochs,
        batch: report.batches,
        n_batches: report.batches,
        global_step: progress.global_step,
        losses: report.losses,
    };
    println!("{record}");
    Ok(())
}

fn list_checkpoints(dir: &Path) -> Result<()> {
    let nested = dir.join("checkpoints");
    let dir = if nested.is_dir() { nested } else { dir.to_path_buf() };
    if !dir.is_dir() {
        bail!("no checkpoint directory at {}", dir.display());
    }

    let manager = CheckpointManager::new(&dir)?;
    let checkpoints = manager.list()?;
    if checkpoints.is_empty() {
        println!("No checkpoints in {}", dir.display());
        return Ok(());
    }
    println!("Checkpoints in {}:", dir.display());
    for (key, path) in checkpoints {
        println!("  {key}\t{}", path.display());
    }
    Ok(())
}
