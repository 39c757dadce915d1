//! Epoch/batch training loop.

use super::config::{ResumeEpoch, TrainConfig, TrainingMode};
use super::layout::ExperimentLayout;
use super::optimizer::GlyphOptimizer;
use super::schedule::ExponentialDecay;
use crate::checkpoint::{CheckpointManager, CheckpointState, Checkpointable};
use crate::data::{Batch, GlyphLoader};
use crate::log::{MetricLogger, RunLogs, TrainRecord, ValRecord};
use crate::loss::{AggregatedLoss, LossAggregator, LossBreakdown};
use crate::model::{ForwardOutput, GlyphModel, ImagePair, Phase};
use crate::sample::{to_gray, SampleWriter};
use crate::validation::{ValidationReport, ValidationRunner};
use crate::{ConfigError, Result};
use indicatif::{ProgressBar, ProgressStyle};
use ndarray::Axis;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Position of the run: last epoch entered and batches processed so far.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingProgress {
    pub epoch: u64,
    pub global_step: u64,
}

/// What a call to [`Trainer::train`] did.
#[derive(Clone, Debug, Default)]
pub struct TrainSummary {
    pub start_epoch: u64,
    pub epochs_completed: u64,
    pub global_step: u64,
    pub log_records: u64,
    pub samples: Vec<PathBuf>,
    /// Averaged losses of every validation pass, in order
    pub validations: Vec<LossBreakdown>,
    pub checkpoints: Vec<PathBuf>,
    pub final_lr: f64,
}

/// New random run identifier.
pub fn new_run_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// First epoch of a resumed run.
pub fn resolve_start_epoch(policy: ResumeEpoch, init_epoch: u64, checkpoint_epoch: u64) -> u64 {
    match policy {
        ResumeEpoch::Configured => {
            if init_epoch != checkpoint_epoch + 1 {
                tracing::warn!(
                    init_epoch,
                    checkpoint_epoch,
                    "Resuming at configured init_epoch, which does not follow the checkpoint's epoch"
                );
            }
            init_epoch
        }
        ResumeEpoch::Checkpoint => checkpoint_epoch + 1,
    }
}

/// Drives optimisation of a [`GlyphModel`] over epochs of batches.
pub struct Trainer<M, O>
where
    M: GlyphModel,
    O: GlyphOptimizer + Checkpointable,
{
    config: TrainConfig,
    layout: ExperimentLayout,
    model: M,
    optimizer: O,
    decay: ExponentialDecay,
    aggregator: LossAggregator,
    checkpoints: CheckpointManager,
    samples: SampleWriter,
    logs: RunLogs,
    tracker: Box<dyn MetricLogger>,
    run_id: String,
    progress: TrainingProgress,
    start_epoch: u64,
    progress_bar: Option<ProgressBar>,
}

impl<M, O> Trainer<M, O>
where
    M: GlyphModel,
    O: GlyphOptimizer + Checkpointable,
{
    /// Open the run's log sinks and establish the training state, either
    /// fresh or restored from `config.continue_ckpt`.
    pub fn new(
        config: TrainConfig,
        layout: ExperimentLayout,
        mut model: M,
        mut optimizer: O,
        tracker: Box<dyn MetricLogger>,
    ) -> Result<Self> {
        config.validate()?;

        layout.ensure_dirs()?;
        let checkpoints = CheckpointManager::new(layout.checkpoints_dir())?;
        let samples = SampleWriter::new(layout.samples_dir());
        let logs = RunLogs::open(&layout.logs_dir())?;

        model.set_phase(Phase::Train);
        let progress = if config.continue_training {
            Self::resume(&config, &mut model, &mut optimizer)?
        } else {
            TrainingProgress {
                epoch: config.init_epoch,
                global_step: 0,
            }
        };
        let start_epoch = progress.epoch;

        let decay = ExponentialDecay::new(config.lr_decay);
        let aggregator = LossAggregator::new(config.loss);
        let run_id = new_run_id();

        tracing::info!(
            run_id = %run_id,
            mode = %config.mode,
            params = model.num_parameters(),
            start_epoch,
            global_step = progress.global_step,
            lr = optimizer.learning_rate(),
            "Trainer initialised"
        );

        Ok(Self {
            config,
            layout,
            model,
            optimizer,
            decay,
            aggregator,
            checkpoints,
            samples,
            logs,
            tracker,
            run_id,
            progress,
            start_epoch,
            progress_bar: None,
        })
    }

    fn resume(config: &TrainConfig, model: &mut M, optimizer: &mut O) -> Result<TrainingProgress> {
        let path = config
            .continue_ckpt
            .as_ref()
            .ok_or(ConfigError::MissingResumePath)?;
        tracing::info!(path = %path.display(), "Loading checkpoint");

        let state: CheckpointState<O::State> = CheckpointManager::load(path)?;
        let saved = state.restore(model, optimizer)?;
        let epoch = resolve_start_epoch(config.resume_epoch, config.init_epoch, saved.epoch);

        tracing::info!(
            checkpoint_epoch = saved.epoch,
            global_step = saved.global_step,
            start_epoch = epoch,
            "Checkpoint restored"
        );
        Ok(TrainingProgress {
            epoch,
            global_step: saved.global_step,
        })
    }

    /// Use an externally chosen run identifier (e.g. the one in the manifest).
    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }

    /// Run every remaining epoch.
    pub fn train(&mut self, train: &dyn GlyphLoader, val: &dyn GlyphLoader) -> Result<TrainSummary> {
        match self.config.mode {
            TrainingMode::MainModel => self.train_main_model(train, val),
        }
    }

    fn train_main_model(
        &mut self,
        train: &dyn GlyphLoader,
        val: &dyn GlyphLoader,
    ) -> Result<TrainSummary> {
        if train.is_empty() {
            return Err(ConfigError::EmptyTrainingStream.into());
        }
        let n_batches = train.len();
        let n_epochs = self.config.n_epochs;
        let mut summary = TrainSummary {
            start_epoch: self.start_epoch,
            ..Default::default()
        };

        if self.config.progress_bar {
            let total = n_epochs.saturating_sub(self.start_epoch) * n_batches as u64;
            self.progress_bar = Some(progress_bar(total));
        }

        for epoch in self.start_epoch..n_epochs {
            self.progress.epoch = epoch;
            let epoch_start = Instant::now();

            for (idx, batch) in train.iter().enumerate() {
                let batch = batch?;
                let (output, loss) = self.train_step(&batch)?;
                let step = self.progress.global_step;

                let actions = self.config.cadence.due(step, epoch);
                if actions.log {
                    self.log_step(idx, n_batches, epoch_start.elapsed(), &output, &loss)?;
                    summary.log_records += 1;
                }
                if actions.sample {
                    summary
                        .samples
                        .push(self.samples.write(&output.images, epoch, step)?);
                }
                if actions.validate {
                    let report = self.validate(val, idx, n_batches)?;
                    summary.validations.push(report.losses);
                }

                if let Some(pb) = &self.progress_bar {
                    pb.inc(1);
                    pb.set_message(format!(
                        "Epoch: {epoch} Loss: {:.4} lr: {:.6}",
                        loss.total,
                        self.optimizer.learning_rate()
                    ));
                }
            }

            self.decay.step(&mut self.optimizer);
            summary.epochs_completed += 1;

            if self.config.cadence.checkpoint_due(epoch) {
                summary.checkpoints.push(self.save_checkpoint()?);
            }
        }

        if let Some(pb) = self.progress_bar.take() {
            pb.finish_with_message("Training complete");
        }
        self.logs.flush()?;
        self.tracker.close();

        summary.global_step = self.progress.global_step;
        summary.final_lr = self.optimizer.learning_rate();
        tracing::info!(
            epochs = summary.epochs_completed,
            global_step = summary.global_step,
            checkpoints = summary.checkpoints.len(),
            "Training finished"
        );
        Ok(summary)
    }

    /// Forward, aggregate, zero grads, backward, update, count.
    fn train_step(&mut self, batch: &Batch) -> Result<(ForwardOutput, AggregatedLoss)> {
        let output = self.model.forward(batch)?;
        let loss = self.aggregator.aggregate(&output.losses);

        self.optimizer.zero_grad(self.model.parameters_mut());
        self.model.backward(batch, &loss.objective)?;
        self.optimizer.step(self.model.parameters_mut())?;

        self.progress.global_step += 1;
        Ok((output, loss))
    }

    fn log_step(
        &mut self,
        batch_idx: usize,
        n_batches: usize,
        elapsed: Duration,
        output: &ForwardOutput,
        loss: &AggregatedLoss,
    ) -> Result<()> {
        let step = self.progress.global_step;
        let record = TrainRecord {
            elapsed,
            epoch: self.progress.epoch,
            n_epochs: self.config.n_epochs,
            batch: batch_idx,
            n_batches,
            loss: loss.total,
            terms: loss.report,
            lr: self.optimizer.learning_rate(),
            global_step: step,
        };
        let line = record.to_string();
        self.logs.train.write_line(&line)?;
        self.echo(&line);

        let b = &output.losses;
        let mut metrics = HashMap::new();
        metrics.insert("Loss/img_l1".to_string(), b.img.l1);
        metrics.insert("Loss/img_vggpt".to_string(), b.img.vggpt);
        for (category, seq) in [("svg", &b.svg), ("svg_para", &b.svg_para)] {
            for (term, value) in seq.named() {
                metrics.insert(format!("Loss/{category}_{term}"), value);
            }
        }
        metrics.insert("Loss/img_kl_loss".to_string(), loss.report.kl);
        metrics.insert("Loss/total".to_string(), loss.total);
        metrics.insert("lr".to_string(), record.lr);
        self.tracker.log_metrics(&metrics, step);
        self.log_pair("Images/trg_img", "Images/img_output", &output.images, step);
        Ok(())
    }

    fn validate(
        &mut self,
        val: &dyn GlyphLoader,
        batch_idx: usize,
        n_batches: usize,
    ) -> Result<ValidationReport> {
        let report = ValidationRunner::run(&mut self.model, val)?;
        let step = self.progress.global_step;

        let record = ValRecord {
            epoch: self.progress.epoch,
            n_epochs: self.config.n_epochs,
            batch: batch_idx,
            n_batches,
            global_step: step,
            losses: report.losses,
        };
        let line = record.to_string();
        self.logs.val.write_line(&line)?;
        self.echo(&line);

        let metrics: HashMap<String, f64> = report
            .losses
            .terms()
            .into_iter()
            .map(|(category, term, value)| (val_metric_key(category, term), value))
            .collect();
        self.tracker.log_metrics(&metrics, step);
        if let Some(pair) = &report.sample {
            self.log_pair("VAL_Images/val_trg_img", "VAL_Images/val_img_output", pair, step);
        }
        Ok(report)
    }

    /// Console copy of a log line, printed above the progress bar when one is shown.
    fn echo(&self, line: &str) {
        match &self.progress_bar {
            Some(pb) => pb.println(line),
            None => tracing::info!("{}", line),
        }
    }

    fn log_pair(&self, target_key: &str, output_key: &str, pair: &ImagePair, step: u64) {
        if pair.target.shape()[0] == 0 {
            return;
        }
        let target = to_gray(pair.target.index_axis(Axis(0), 0));
        let output = to_gray(pair.output.index_axis(Axis(0), 0));
        self.tracker.log_image(target_key, target.view(), "Target", step);
        self.tracker.log_image(output_key, output.view(), "Output", step);
    }

    /// Save a checkpoint for the current epoch, then publish it best-effort.
    pub fn save_checkpoint(&self) -> Result<PathBuf> {
        let start = Instant::now();
        let state =
            CheckpointState::capture(&self.run_id, self.progress, &self.model, &self.optimizer);
        let path = self.checkpoints.save(&state)?;
        tracing::info!(
            epoch = self.progress.epoch,
            global_step = self.progress.global_step,
            elapsed = ?start.elapsed(),
            "Checkpoint saved"
        );

        if let Err(e) = self.checkpoints.publish(&path, self.tracker.as_ref()) {
            tracing::warn!(path = %path.display(), "Failed to publish checkpoint: {}", e);
        }
        Ok(path)
    }

    pub fn progress(&self) -> TrainingProgress {
        self.progress
    }

    pub fn global_step(&self) -> u64 {
        self.progress.global_step
    }

    pub fn start_epoch(&self) -> u64 {
        self.start_epoch
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    pub fn layout(&self) -> &ExperimentLayout {
        &self.layout
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn optimizer(&self) -> &O {
        &self.optimizer
    }

    pub fn decay(&self) -> &ExponentialDecay {
        &self.decay
    }

    pub fn into_parts(self) -> (M, O) {
        (self.model, self.optimizer)
    }
}

/// Tracker key of one averaged validation term.
pub fn val_metric_key(category: &str, term: &str) -> String {
    if category == term {
        format!("VAL/loss_{category}")
    } else {
        format!("VAL/loss_{category}_{term}")
    }
}

fn progress_bar(total: u64) -> ProgressBar {
    let pb = ProgressBar::new(total);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cadence::CadenceConfig;
    use crate::checkpoint::ARTIFACT_NAME;
    use crate::data::VecLoader;
    use crate::log::{NoOpLogger, TRAIN_LOG, VAL_LOG};
    use crate::loss::{ImageLosses, Objective, SequenceLosses};
    use crate::model::ParamStore;
    use crate::training::AdamW;
    use crate::GlyphError;
    use ndarray::{Array3, Array4, ArrayD, IxDyn};
    use std::fs;
    use std::path::Path;
    use std::sync::{Arc, Mutex};
    use tempfile::tempdir;

    /// img.l1 = w^2, everything else constant.
    struct MockModel {
        phase: Phase,
        params: ParamStore,
    }

    impl MockModel {
        fn new() -> Self {
            let mut params = ParamStore::new();
            params.insert("w", ArrayD::from_elem(IxDyn(&[1]), 1.0));
            Self {
                phase: Phase::Eval,
                params,
            }
        }

        fn w(&self) -> f64 {
            self.params.get("w").unwrap()[[0]]
        }
    }

    impl GlyphModel for MockModel {
        fn forward(&self, batch: &Batch) -> Result<ForwardOutput> {
            let w = self.w();
            Ok(ForwardOutput {
                images: ImagePair {
                    target: batch.images.clone(),
                    output: batch.images.mapv(|v| v * w as f32),
                },
                losses: LossBreakdown {
                    img: ImageLosses { l1: w * w, vggpt: 1.0 },
                    svg: SequenceLosses {
                        total: 0.5,
                        ..Default::default()
                    },
                    svg_para: SequenceLosses::default(),
                    kl: 0.1,
                },
            })
        }

        fn backward(&mut self, _batch: &Batch, objective: &Objective) -> Result<()> {
            let g = ArrayD::from_elem(IxDyn(&[1]), 2.0 * self.w() * objective.img_l1);
            self.params.accumulate_grad("w", &g)
        }

        fn phase(&self) -> Phase {
            self.phase
        }

        fn set_phase(&mut self, phase: Phase) {
            self.phase = phase;
        }

        fn parameters(&self) -> &ParamStore {
            &self.params
        }

        fn parameters_mut(&mut self) -> &mut ParamStore {
            &mut self.params
        }
    }

    #[derive(Clone, Default)]
    struct RecordingTracker {
        steps: Arc<Mutex<Vec<(String, u64)>>>,
        fail_publish: bool,
    }

    impl MetricLogger for RecordingTracker {
        fn log_scalar(&self, name: &str, _value: f64, step: u64) {
            self.steps.lock().unwrap().push((name.to_string(), step));
        }

        fn log_metrics(&self, metrics: &HashMap<String, f64>, step: u64) {
            let mut steps = self.steps.lock().unwrap();
            for name in metrics.keys() {
                steps.push((name.clone(), step));
            }
        }

        fn publish_artifact(&self, name: &str, _kind: &str, _path: &Path) -> Result<()> {
            if self.fail_publish {
                return Err(GlyphError::Tracker("offline".into()));
            }
            self.steps.lock().unwrap().push((name.to_string(), 0));
            Ok(())
        }
    }

    fn batch() -> Batch {
        Batch::new(Array4::from_elem((2, 1, 4, 4), 0.5), Array3::zeros((2, 3, 4)), vec![0, 1])
            .unwrap()
    }

    fn loader(n: usize) -> VecLoader {
        VecLoader::new(vec![batch(); n])
    }

    fn cadence(log: u64, val: u64, ckpt: u64) -> CadenceConfig {
        CadenceConfig {
            log_every: log,
            sample_every: 0,
            val_every: val,
            ckpt_every: ckpt,
            ckpt_start_epoch: 0,
        }
    }

    fn config(root: &Path, epochs: u64, cadence: CadenceConfig) -> TrainConfig {
        TrainConfig::default()
            .with_experiment(root, "test")
            .with_epochs(0, epochs)
            .with_lr(0.01)
            .with_cadence(cadence)
    }

    fn trainer(cfg: TrainConfig, tracker: Box<dyn MetricLogger>) -> Trainer<MockModel, AdamW> {
        let layout = ExperimentLayout::from_config(&cfg);
        let opt = AdamW::from_config(&cfg);
        Trainer::new(cfg, layout, MockModel::new(), opt, tracker).unwrap()
    }

    fn lines(path: PathBuf) -> Vec<String> {
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_one_log_record_per_step() {
        let dir = tempdir().unwrap();
        let mut t = trainer(config(dir.path(), 1, cadence(1, 0, 0)), Box::new(NoOpLogger));

        let summary = t.train(&loader(3), &VecLoader::default()).unwrap();
        assert_eq!(summary.log_records, 3);
        assert_eq!(summary.global_step, 3);
        assert!(summary.validations.is_empty());
        assert!(summary.checkpoints.is_empty());

        let train = lines(t.layout().logs_dir().join(TRAIN_LOG));
        assert_eq!(train.len(), 3);
        for (line, step) in train.iter().zip(1..) {
            assert!(line.ends_with(&format!("Step: {step}")), "{line}");
        }
        assert!(lines(t.layout().logs_dir().join(VAL_LOG)).is_empty());
        assert!(t.layout().checkpoints_dir().read_dir().unwrap().next().is_none());
    }

    #[test]
    fn test_progress_bar_keeps_log_streams() {
        let dir = tempdir().unwrap();
        let cfg = TrainConfig {
            progress_bar: true,
            ..config(dir.path(), 1, cadence(1, 2, 0))
        };
        let mut t = trainer(cfg, Box::new(NoOpLogger));

        let summary = t.train(&loader(2), &loader(1)).unwrap();
        assert_eq!(summary.log_records, 2);
        assert_eq!(lines(t.layout().logs_dir().join(TRAIN_LOG)).len(), 2);
        assert_eq!(lines(t.layout().logs_dir().join(VAL_LOG)).len(), 1);
        assert!(t.progress_bar.is_none());
    }

    #[test]
    fn test_decay_once_per_epoch() {
        let dir = tempdir().unwrap();
        let mut t = trainer(config(dir.path(), 1, cadence(0, 0, 0)), Box::new(NoOpLogger));
        let summary = t.train(&loader(10), &VecLoader::default()).unwrap();

        assert_eq!(summary.global_step, 10);
        assert_eq!(t.decay().applied(), 1);
        assert!((summary.final_lr - 0.01 * 0.997).abs() < 1e-15);
    }

    #[test]
    fn test_validation_leaves_training_state_alone() {
        let dir = tempdir().unwrap();
        let tracker = RecordingTracker::default();
        let steps = tracker.steps.clone();
        let mut t = trainer(config(dir.path(), 1, cadence(0, 2, 0)), Box::new(tracker));

        let summary = t.train(&loader(4), &loader(3)).unwrap();
        assert_eq!(summary.validations.len(), 2);
        assert_eq!(summary.global_step, 4);
        assert_eq!(t.model().phase(), Phase::Train);

        let val = lines(t.layout().logs_dir().join(VAL_LOG));
        assert_eq!(val.len(), 2);
        assert!(val[0].contains("Step: 2"));
        assert!(val[1].contains("Step: 4"));

        let recorded = steps.lock().unwrap();
        assert!(recorded.contains(&("VAL/loss_img_l1".to_string(), 2)));
        assert!(recorded.contains(&("VAL/loss_kl".to_string(), 4)));
    }

    #[test]
    fn test_empty_validation_stream_is_fatal() {
        let dir = tempdir().unwrap();
        let mut t = trainer(config(dir.path(), 1, cadence(0, 1, 0)), Box::new(NoOpLogger));
        let err = t.train(&loader(2), &VecLoader::default()).unwrap_err();
        assert!(matches!(
            err,
            GlyphError::Config(ConfigError::EmptyValidationStream)
        ));
    }

    #[test]
    fn test_empty_training_stream_is_fatal() {
        let dir = tempdir().unwrap();
        let mut t = trainer(config(dir.path(), 1, cadence(1, 0, 0)), Box::new(NoOpLogger));
        assert!(matches!(
            t.train(&VecLoader::default(), &VecLoader::default()),
            Err(GlyphError::Config(ConfigError::EmptyTrainingStream))
        ));
    }

    #[test]
    fn test_checkpoints_and_publication() {
        let dir = tempdir().unwrap();
        let tracker = RecordingTracker::default();
        let steps = tracker.steps.clone();
        let mut t = trainer(config(dir.path(), 4, cadence(0, 0, 2)), Box::new(tracker));

        let summary = t.train(&loader(3), &VecLoader::default()).unwrap();
        let names: Vec<_> = summary
            .checkpoints
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["0_3.ckpt", "2_9.ckpt"]);

        let published = steps
            .lock()
            .unwrap()
            .iter()
            .filter(|(n, _)| n == ARTIFACT_NAME)
            .count();
        assert_eq!(published, 2);
    }

    #[test]
    fn test_failed_publication_does_not_abort() {
        let dir = tempdir().unwrap();
        let tracker = RecordingTracker {
            fail_publish: true,
            ..Default::default()
        };
        let mut t = trainer(config(dir.path(), 2, cadence(0, 0, 1)), Box::new(tracker));
        let summary = t.train(&loader(1), &VecLoader::default()).unwrap();
        assert_eq!(summary.checkpoints.len(), 2);
        assert!(summary.checkpoints.iter().all(|p| p.exists()));
    }

    #[test]
    fn test_resume_continues_global_step() {
        let dir = tempdir().unwrap();
        let mut first = trainer(config(dir.path(), 2, cadence(0, 0, 1)), Box::new(NoOpLogger));
        let summary = first.train(&loader(2), &VecLoader::default()).unwrap();
        let ckpt = summary.checkpoints[0].clone(); // epoch 0, step 2

        let cfg = config(dir.path(), 3, cadence(1, 0, 0)).with_resume(&ckpt, ResumeEpoch::Checkpoint);
        let mut resumed = trainer(cfg, Box::new(NoOpLogger));
        assert_eq!(resumed.start_epoch(), 1);
        assert_eq!(resumed.global_step(), 2);

        let summary = resumed.train(&loader(2), &VecLoader::default()).unwrap();
        assert_eq!(summary.epochs_completed, 2);
        assert_eq!(summary.global_step, 6);
    }

    #[test]
    fn test_resume_without_path_is_fatal() {
        let dir = tempdir().unwrap();
        let cfg = TrainConfig {
            continue_training: true,
            ..config(dir.path(), 1, cadence(0, 0, 0))
        };
        let layout = ExperimentLayout::from_config(&cfg);
        let opt = AdamW::from_config(&cfg);
        let err = Trainer::new(cfg, layout, MockModel::new(), opt, Box::new(NoOpLogger))
            .err()
            .unwrap();
        assert!(matches!(err, GlyphError::Config(ConfigError::MissingResumePath)));
    }

    #[test]
    fn test_resolve_start_epoch() {
        assert_eq!(resolve_start_epoch(ResumeEpoch::Configured, 0, 9), 0);
        assert_eq!(resolve_start_epoch(ResumeEpoch::Configured, 10, 9), 10);
        assert_eq!(resolve_start_epoch(ResumeEpoch::Checkpoint, 0, 9), 10);
    }

    #[test]
    fn test_val_metric_keys() {
        assert_eq!(val_metric_key("img", "l1"), "VAL/loss_img_l1");
        assert_eq!(val_metric_key("svg_para", "total"), "VAL/loss_svg_para_total");
        assert_eq!(val_metric_key("kl", "kl"), "VAL/loss_kl");
    }
}
