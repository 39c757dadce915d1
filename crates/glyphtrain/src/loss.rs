//! Loss breakdown records and weighted aggregation.
//!
//! The model reports its losses as a closed [`LossBreakdown`]. The
//! [`LossAggregator`] turns that into the scalar optimisation target:
//!
//! ```text
//! total = w_l1 * img.l1 + w_pt_c * img.vggpt + kl_beta * kl + svg.total + svg_para.total
//! ```
//!
//! `svg.total` and `svg_para.total` are already combined by the model from
//! their sub-terms. The sub-terms are re-weighted with the configured weights
//! for reporting only and never re-enter `total`.

use crate::AggregationError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::{AddAssign, DivAssign};

/// Raster image loss terms.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageLosses {
    pub l1: f64,
    pub vggpt: f64,
}

/// Vector sequence loss terms. `total` is pre-combined by the model.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SequenceLosses {
    pub total: f64,
    pub cmd: f64,
    pub args: f64,
    pub smt: f64,
    pub aux: f64,
}

impl SequenceLosses {
    pub const TERMS: [&'static str; 5] = ["total", "cmd", "args", "smt", "aux"];

    /// `(term, value)` pairs in [`TERMS`](Self::TERMS) order.
    pub fn named(&self) -> [(&'static str, f64); 5] {
        [
            ("total", self.total),
            ("cmd", self.cmd),
            ("args", self.args),
            ("smt", self.smt),
            ("aux", self.aux),
        ]
    }

    fn get(&self, term: &str) -> Option<f64> {
        match term {
            "total" => Some(self.total),
            "cmd" => Some(self.cmd),
            "args" => Some(self.args),
            "smt" => Some(self.smt),
            "aux" => Some(self.aux),
            _ => None,
        }
    }
}

/// Per-category losses from one model invocation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LossBreakdown {
    pub img: ImageLosses,
    pub svg: SequenceLosses,
    pub svg_para: SequenceLosses,
    pub kl: f64,
}

impl LossBreakdown {
    pub const CATEGORIES: [&'static str; 4] = ["img", "svg", "svg_para", "kl"];

    /// Every term as a `(category, term, value)` triple in a stable order.
    ///
    /// The divergence category has a single term, also named `kl`.
    pub fn terms(&self) -> Vec<(&'static str, &'static str, f64)> {
        let mut out = vec![("img", "l1", self.img.l1), ("img", "vggpt", self.img.vggpt)];
        for term in SequenceLosses::TERMS {
            out.push(("svg", term, self.svg.get(term).unwrap_or_default()));
        }
        for term in SequenceLosses::TERMS {
            out.push(("svg_para", term, self.svg_para.get(term).unwrap_or_default()));
        }
        out.push(("kl", "kl", self.kl));
        out
    }

    /// Build a breakdown from an open `category -> term -> value` mapping,
    /// as emitted by collaborators that report losses dynamically.
    ///
    /// Only the terms that enter the aggregated total are required.
    pub fn from_raw(raw: &RawBreakdown) -> Result<Self, AggregationError> {
        let category = |name: &str| {
            raw.get(name)
                .ok_or_else(|| AggregationError::MissingCategory(name.to_string()))
        };
        let term = |cat: &str, name: &str| -> Result<f64, AggregationError> {
            match category(cat)? {
                RawCategory::Terms(terms) => {
                    terms
                        .get(name)
                        .copied()
                        .ok_or_else(|| AggregationError::MissingTerm {
                            category: cat.to_string(),
                            term: name.to_string(),
                        })
                }
                RawCategory::Scalar(_) => Err(AggregationError::MissingTerm {
                    category: cat.to_string(),
                    term: name.to_string(),
                }),
            }
        };
        // Sub-terms are report-only; absent ones read as zero.
        let sequence = |cat: &str| -> Result<SequenceLosses, AggregationError> {
            let total = term(cat, "total")?;
            let sub = |name: &str| match category(cat) {
                Ok(RawCategory::Terms(terms)) => terms.get(name).copied().unwrap_or_default(),
                _ => 0.0,
            };
            Ok(SequenceLosses {
                total,
                cmd: sub("cmd"),
                args: sub("args"),
                smt: sub("smt"),
                aux: sub("aux"),
            })
        };

        let kl = match category("kl")? {
            RawCategory::Scalar(v) => *v,
            RawCategory::Terms(_) => term("kl", "kl")?,
        };

        Ok(Self {
            img: ImageLosses {
                l1: term("img", "l1")?,
                vggpt: term("img", "vggpt")?,
            },
            svg: sequence("svg")?,
            svg_para: sequence("svg_para")?,
            kl,
        })
    }
}

impl AddAssign<&LossBreakdown> for LossBreakdown {
    fn add_assign(&mut self, rhs: &LossBreakdown) {
        self.img.l1 += rhs.img.l1;
        self.img.vggpt += rhs.img.vggpt;
        for (lhs, rhs) in [(&mut self.svg, &rhs.svg), (&mut self.svg_para, &rhs.svg_para)] {
            lhs.total += rhs.total;
            lhs.cmd += rhs.cmd;
            lhs.args += rhs.args;
            lhs.smt += rhs.smt;
            lhs.aux += rhs.aux;
        }
        self.kl += rhs.kl;
    }
}

impl DivAssign<f64> for LossBreakdown {
    fn div_assign(&mut self, rhs: f64) {
        self.img.l1 /= rhs;
        self.img.vggpt /= rhs;
        for seq in [&mut self.svg, &mut self.svg_para] {
            seq.total /= rhs;
            seq.cmd /= rhs;
            seq.args /= rhs;
            seq.smt /= rhs;
            seq.aux /= rhs;
        }
        self.kl /= rhs;
    }
}

/// One category of an open loss mapping: either named terms or a bare scalar.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawCategory {
    Scalar(f64),
    Terms(BTreeMap<String, f64>),
}

/// Open `category -> terms` mapping.
pub type RawBreakdown = BTreeMap<String, RawCategory>;

/// Externally configured loss weights.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LossWeights {
    /// Image L1 reconstruction weight
    pub loss_w_l1: f64,
    /// Image perceptual (VGG) weight
    pub loss_w_pt_c: f64,
    /// KL divergence weight
    pub kl_beta: f64,
    /// Command classification weight (reporting only)
    pub loss_w_cmd: f64,
    /// Argument regression weight (reporting only)
    pub loss_w_args: f64,
    /// Smoothness weight (reporting only)
    pub loss_w_smt: f64,
    /// Auxiliary weight (reporting only)
    pub loss_w_aux: f64,
}

impl Default for LossWeights {
    fn default() -> Self {
        Self {
            loss_w_l1: 1.0,
            loss_w_pt_c: 0.001,
            kl_beta: 0.01,
            loss_w_cmd: 1.0,
            loss_w_args: 1.0,
            loss_w_smt: 10.0,
            loss_w_aux: 0.01,
        }
    }
}

/// Coefficients of the optimisation target, one per optimised term.
///
/// Handed to the model's backward pass so gradients and `total` agree.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Objective {
    pub img_l1: f64,
    pub img_vggpt: f64,
    pub kl: f64,
    pub svg: f64,
    pub svg_para: f64,
}

impl Objective {
    /// Weighted sum of the optimised terms.
    pub fn apply(&self, b: &LossBreakdown) -> f64 {
        self.img_l1 * b.img.l1
            + self.img_vggpt * b.img.vggpt
            + self.kl * b.kl
            + self.svg * b.svg.total
            + self.svg_para * b.svg_para.total
    }
}

/// Weighted terms for display. Never summed back into the target.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct WeightedTerms {
    pub img_l1: f64,
    pub img_pt_c: f64,
    pub kl: f64,
    pub svg_total: f64,
    pub svg_cmd: f64,
    pub svg_args: f64,
    pub svg_smt: f64,
    pub svg_aux: f64,
    pub svg_para_total: f64,
}

/// Result of aggregating one breakdown.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AggregatedLoss {
    pub total: f64,
    pub report: WeightedTerms,
    pub objective: Objective,
}

/// Combines loss breakdowns with fixed configured weights.
#[derive(Clone, Debug)]
pub struct LossAggregator {
    weights: LossWeights,
}

impl LossAggregator {
    pub fn new(weights: LossWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &LossWeights {
        &self.weights
    }

    /// Optimisation coefficients. Pre-combined sequence totals enter with weight 1.
    pub fn objective(&self) -> Objective {
        Objective {
            img_l1: self.weights.loss_w_l1,
            img_vggpt: self.weights.loss_w_pt_c,
            kl: self.weights.kl_beta,
            svg: 1.0,
            svg_para: 1.0,
        }
    }

    /// Scalar optimisation target.
    pub fn total(&self, breakdown: &LossBreakdown) -> f64 {
        self.objective().apply(breakdown)
    }

    /// Sub-terms scaled by their configured weights, for reporting.
    pub fn report(&self, b: &LossBreakdown) -> WeightedTerms {
        let w = &self.weights;
        WeightedTerms {
            img_l1: w.loss_w_l1 * b.img.l1,
            img_pt_c: w.loss_w_pt_c * b.img.vggpt,
            kl: w.kl_beta * b.kl,
            svg_total: b.svg.total,
            svg_cmd: w.loss_w_cmd * b.svg.cmd,
            svg_args: w.loss_w_args * b.svg.args,
            svg_smt: w.loss_w_smt * b.svg.smt,
            svg_aux: w.loss_w_aux * b.svg.aux,
            svg_para_total: b.svg_para.total,
        }
    }

    pub fn aggregate(&self, breakdown: &LossBreakdown) -> AggregatedLoss {
        AggregatedLoss {
            total: self.total(breakdown),
            report: self.report(breakdown),
            objective: self.objective(),
        }
    }

    /// Aggregate an open mapping, failing if a weighted category is absent.
    pub fn aggregate_raw(&self, raw: &RawBreakdown) -> Result<AggregatedLoss, AggregationError> {
        let breakdown = LossBreakdown::from_raw(raw)?;
        Ok(self.aggregate(&breakdown))
    }
}
