//! Held-out evaluation.

use crate::data::GlyphLoader;
use crate::loss::LossBreakdown;
use crate::model::{EvalGuard, GlyphModel, ImagePair};
use crate::{ConfigError, Result};

/// Averaged losses of one pass over the validation stream.
#[derive(Clone, Debug)]
pub struct ValidationReport {
    /// Per-category, per-term mean over batches
    pub losses: LossBreakdown,
    pub batches: usize,
    /// First target/output pair of the last batch, for display
    pub sample: Option<ImagePair>,
}

/// Runs the model over a validation stream without updating anything.
pub struct ValidationRunner;

impl ValidationRunner {
    /// Average every loss term over all batches of `loader`.
    ///
    /// The model is held in eval mode for the duration of the pass and
    /// returned to its previous phase afterwards, including on error.
    pub fn run<M: GlyphModel + ?Sized>(
        model: &mut M,
        loader: &dyn GlyphLoader,
    ) -> Result<ValidationReport> {
        if loader.is_empty() {
            return Err(ConfigError::EmptyValidationStream.into());
        }

        let guard = EvalGuard::new(model);
        let mut sum = LossBreakdown::default();
        let mut batches = 0usize;
        let mut last = None;
        for batch in loader.iter() {
            let output = guard.forward(&batch?)?;
            sum += &output.losses;
            batches += 1;
            last = Some(output.images);
        }
        drop(guard);

        if batches == 0 {
            return Err(ConfigError::EmptyValidationStream.into());
        }
        sum /= batches as f64;
        tracing::debug!(batches, img_l1 = sum.img.l1, "Validation pass complete");

        Ok(ValidationReport {
            losses: sum,
            batches,
            sample: last.as_ref().and_then(ImagePair::first),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Batch, VecLoader};
    use crate::loss::{ImageLosses, Objective};
    use crate::model::{ForwardOutput, ParamStore, Phase};
    use crate::GlyphError;
    use ndarray::{Array3, Array4};
    use std::cell::Cell;

    /// Reports `img.l1` equal to the batch's first char id.
    struct StubModel {
        phase: Phase,
        params: ParamStore,
        seen_phase: Cell<Option<Phase>>,
        fail_on: Option<usize>,
    }

    impl StubModel {
        fn new() -> Self {
            Self {
                phase: Phase::Train,
                params: ParamStore::new(),
                seen_phase: Cell::new(None),
                fail_on: None,
            }
        }
    }

    impl GlyphModel for StubModel {
        fn forward(&self, batch: &Batch) -> Result<ForwardOutput> {
            self.seen_phase.set(Some(self.phase));
            let id = batch.char_ids.first().copied().unwrap_or_default();
            if self.fail_on == Some(id) {
                return Err(GlyphError::Model("boom".into()));
            }
            Ok(ForwardOutput {
                images: crate::model::ImagePair {
                    target: batch.images.clone(),
                    output: batch.images.clone(),
                },
                losses: LossBreakdown {
                    img: ImageLosses {
                        l1: id as f64,
                        vggpt: 2.0 * id as f64,
                    },
                    kl: 0.5,
                    ..Default::default()
                },
            })
        }

        fn backward(&mut self, _batch: &Batch, _objective: &Objective) -> Result<()> {
            panic!("validation must not backpropagate");
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

    fn loader(ids: &[usize]) -> VecLoader {
        VecLoader::new(
            ids.iter()
                .map(|&id| {
                    Batch::new(Array4::zeros((2, 1, 2, 2)), Array3::zeros((2, 3, 4)), vec![id, id])
                        .unwrap()
                })
                .collect(),
        )
    }

    #[test]
    fn test_averages_over_batches() {
        let mut model = StubModel::new();
        let report = ValidationRunner::run(&mut model, &loader(&[1, 2, 3])).unwrap();

        assert_eq!(report.batches, 3);
        assert_eq!(report.losses.img.l1, 2.0);
        assert_eq!(report.losses.img.vggpt, 4.0);
        assert_eq!(report.losses.kl, 0.5);
        assert_eq!(report.sample.unwrap().target.shape(), &[1, 1, 2, 2]);
    }

    #[test]
    fn test_runs_in_eval_and_restores_train() {
        let mut model = StubModel::new();
        ValidationRunner::run(&mut model, &loader(&[1])).unwrap();
        assert_eq!(model.seen_phase.get(), Some(Phase::Eval));
        assert_eq!(model.phase, Phase::Train);
    }

    #[test]
    fn test_idempotent() {
        let mut model = StubModel::new();
        let val = loader(&[4, 7, 1]);
        let a = ValidationRunner::run(&mut model, &val).unwrap();
        let b = ValidationRunner::run(&mut model, &val).unwrap();
        assert_eq!(a.losses, b.losses);
    }

    #[test]
    fn test_empty_stream_is_config_error() {
        let mut model = StubModel::new();
        let err = ValidationRunner::run(&mut model, &VecLoader::default()).unwrap_err();
        assert!(matches!(
            err,
            GlyphError::Config(ConfigError::EmptyValidationStream)
        ));
    }

    #[test]
    fn test_empty_last_batch_has_no_sample() {
        let empty =
            Batch::new(Array4::zeros((0, 1, 2, 2)), Array3::zeros((0, 3, 4)), vec![]).unwrap();
        let mut model = StubModel::new();
        let report = ValidationRunner::run(&mut model, &VecLoader::new(vec![empty])).unwrap();
        assert_eq!(report.batches, 1);
        assert!(report.sample.is_none());
        assert_eq!(model.phase, Phase::Train);
    }

    #[test]
    fn test_phase_restored_on_error() {
        let mut model = StubModel {
            fail_on: Some(2),
            ..StubModel::new()
        };
        assert!(ValidationRunner::run(&mut model, &loader(&[1, 2, 3])).is_err());
        assert_eq!(model.phase, Phase::Train);
    }
}
