//! Line formats of the training and validation log streams.
//!
//! Field order is fixed; downstream tooling parses these lines.

use crate::loss::{LossBreakdown, WeightedTerms};
use std::fmt;
use std::time::Duration;

/// One training log line.
#[derive(Clone, Debug)]
pub struct TrainRecord {
    /// Time since the current epoch started
    pub elapsed: Duration,
    pub epoch: u64,
    pub n_epochs: u64,
    /// Zero-based index of the batch within the epoch
    pub batch: usize,
    pub n_batches: usize,
    /// Aggregated optimisation target
    pub loss: f64,
    pub terms: WeightedTerms,
    pub lr: f64,
    pub global_step: u64,
}

impl fmt::Display for TrainRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Time: {:.3} seconds, Epoch: {}/{}, Batch: {}/{}, Loss: {:.6}, \
             img_l1_loss: {:.6}, img_pt_c_loss: {:.6}, \
             svg_total_loss: {:.6}, svg_cmd_loss: {:.6}, svg_args_loss: {:.6}, \
             svg_smooth_loss: {:.6}, svg_aux_loss: {:.6}, lr: {:.6}, Step: {}",
            self.elapsed.as_secs_f64(),
            self.epoch,
            self.n_epochs,
            self.batch,
            self.n_batches,
            self.loss,
            self.terms.img_l1,
            self.terms.img_pt_c,
            self.terms.svg_total,
            self.terms.svg_cmd,
            self.terms.svg_args,
            self.terms.svg_smt,
            self.terms.svg_aux,
            self.lr,
            self.global_step,
        )
    }
}

/// One validation log line with per-category averaged losses.
#[derive(Clone, Debug)]
pub struct ValRecord {
    pub epoch: u64,
    pub n_epochs: u64,
    pub batch: usize,
    pub n_batches: usize,
    pub global_step: u64,
    pub losses: LossBreakdown,
}

impl fmt::Display for ValRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let l = &self.losses;
        write!(
            f,
            "Epoch: {}/{}, Batch: {}/{}, Step: {}, \
             Val loss img l1: {:.6}, Val loss img pt: {:.6}, Val loss kl: {:.6}, \
             Val loss total: {:.6}, Val loss cmd: {:.6}, Val loss args: {:.6}, \
             Val loss smt: {:.6}, Val loss aux: {:.6}, Val loss para total: {:.6}",
            self.epoch,
            self.n_epochs,
            self.batch,
            self.n_batches,
            self.global_step,
            l.img.l1,
            l.img.vggpt,
            l.kl,
            l.svg.total,
            l.svg.cmd,
            l.svg.args,
            l.svg.smt,
            l.svg.aux,
            l.svg_para.total,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_train_record_field_order() {
        let record = TrainRecord {
            elapsed: Duration::from_millis(1500),
            epoch: 2,
            n_epochs: 10,
            batch: 4,
            n_batches: 8,
            loss: 7.05,
            terms: WeightedTerms {
                img_l1: 2.0,
                svg_cmd: 0.25,
                ..Default::default()
            },
            lr: 0.0002,
            global_step: 21,
        };
        let line = record.to_string();
        assert!(line.starts_with("Time: 1.500 seconds, Epoch: 2/10, Batch: 4/8, Loss: 7.050000"));
        assert!(line.contains("img_l1_loss: 2.000000"));
        assert!(line.contains("svg_cmd_loss: 0.250000"));
        assert!(line.ends_with("lr: 0.000200, Step: 21"));

        let l1 = line.find("img_l1_loss").unwrap();
        let svg = line.find("svg_total_loss").unwrap();
        let lr = line.find("lr:").unwrap();
        assert!(l1 < svg && svg < lr);
    }

    #[test]
    fn test_val_record_contains_categories() {
        let mut losses = LossBreakdown::default();
        losses.img.l1 = 2.0;
        losses.svg.total = 1.25;
        let line = ValRecord {
            epoch: 0,
            n_epochs: 3,
            batch: 9,
            n_batches: 10,
            global_step: 10,
            losses,
        }
        .to_string();
        assert!(line.starts_with("Epoch: 0/3, Batch: 9/10, Step: 10"));
        assert!(line.contains("Val loss img l1: 2.000000"));
        assert!(line.contains("Val loss total: 1.250000"));
    }
}
