//! Linear reference glyph model.
//!
//! Every character owns one row in each decoder: the image decoder row is the
//! predicted raster, the sequence decoder rows are the predicted command
//! sequences, and the latent row is the posterior mean whose KL against a unit
//! Gaussian is reported. Losses and their gradients are analytic.

use glyphtrain::data::Batch;
use glyphtrain::loss::{ImageLosses, LossBreakdown, LossWeights, Objective, SequenceLosses};
use glyphtrain::model::{ForwardOutput, GlyphModel, ImagePair, ParamStore, Phase};
use glyphtrain::training::TrainConfig;
use glyphtrain::{GlyphError, Result};
use ndarray::{Array4, ArrayD, ArrayView2, Axis, IxDyn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

pub const IMG_DECODER: &str = "img_decoder.weight";
pub const LATENT_MU: &str = "latent.mu";
pub const SEQ_DECODER: &str = "seq_decoder.weight";
pub const SEQ_PARA: &str = "seq_para.weight";

/// Leading columns of a sequence row holding the command one-hot.
pub const N_COMMANDS: usize = 4;

const INIT_SCALE: f64 = 0.1;

/// Sizes shared by the model and the synthetic data.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ModelDims {
    pub n_chars: usize,
    pub img_size: usize,
    pub max_seq_len: usize,
    pub dim_seq: usize,
    pub latent_dim: usize,
}

impl ModelDims {
    pub fn from_config(config: &TrainConfig) -> Self {
        Self {
            n_chars: config.char_num,
            img_size: config.img_size,
            max_seq_len: config.max_seq_len,
            dim_seq: config.dim_seq,
            latent_dim: 8,
        }
    }

    pub fn n_cmd(&self) -> usize {
        N_COMMANDS.min(self.dim_seq)
    }
}

/// Model-internal weights combining sequence sub-terms into their total.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SequenceWeights {
    pub cmd: f64,
    pub args: f64,
    pub smt: f64,
    pub aux: f64,
}

impl From<&LossWeights> for SequenceWeights {
    fn from(w: &LossWeights) -> Self {
        Self {
            cmd: w.loss_w_cmd,
            args: w.loss_w_args,
            smt: w.loss_w_smt,
            aux: w.loss_w_aux,
        }
    }
}

/// Element counts each mean is taken over.
struct Counts {
    img: f64,
    cmd: f64,
    args: f64,
    smt: f64,
    aux: f64,
    kl: f64,
}

impl Counts {
    fn new(dims: &ModelDims, batch: &Batch) -> Self {
        let (b, c, h, w) = batch.images.dim();
        let l = dims.max_seq_len;
        let nc = dims.n_cmd();
        let na = dims.dim_seq - nc;
        Self {
            img: (b * c * h * w) as f64,
            cmd: (b * l * nc) as f64,
            args: (b * l * na) as f64,
            smt: (b * l.saturating_sub(1) * na) as f64,
            aux: (b * l * dims.dim_seq) as f64,
            kl: (b * dims.latent_dim) as f64,
        }
    }
}

fn mean(sum: f64, n: f64) -> f64 {
    if n > 0.0 {
        sum / n
    } else {
        0.0
    }
}

fn per(n: f64) -> f64 {
    mean(1.0, n)
}

// signum() maps 0.0 to 1.0; the L1 subgradient at 0 is 0.
fn sign(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct SeqSums {
    cmd: f64,
    args: f64,
    smt: f64,
    aux: f64,
}

impl SeqSums {
    fn add(&mut self, other: &Self) {
        self.cmd += other.cmd;
        self.args += other.args;
        self.smt += other.smt;
        self.aux += other.aux;
    }

    fn losses(&self, counts: &Counts, w: &SequenceWeights) -> SequenceLosses {
        let cmd = mean(self.cmd, counts.cmd);
        let args = mean(self.args, counts.args);
        let smt = mean(self.smt, counts.smt);
        let aux = mean(self.aux, counts.aux);
        SequenceLosses {
            total: w.cmd * cmd + w.args * args + w.smt * smt + w.aux * aux,
            cmd,
            args,
            smt,
            aux,
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct TermSums {
    l1: f64,
    sq: f64,
    kl: f64,
    seq: SeqSums,
    para: SeqSums,
}

impl TermSums {
    fn add(&mut self, other: &Self) {
        self.l1 += other.l1;
        self.sq += other.sq;
        self.kl += other.kl;
        self.seq.add(&other.seq);
        self.para.add(&other.para);
    }
}

/// Gradient rows contributed by one sample.
struct SampleGrads {
    char_id: usize,
    img: Vec<f64>,
    mu: Vec<f64>,
    seq: Vec<f64>,
    para: Vec<f64>,
}

struct SampleEval {
    sums: TermSums,
    grads: Option<SampleGrads>,
}

fn row(weight: &ArrayD<f64>, c: usize) -> Vec<f64> {
    weight.index_axis(Axis(0), c).iter().copied().collect()
}

fn add_row(dst: &mut ArrayD<f64>, c: usize, src: &[f64]) {
    for (d, s) in dst.index_axis_mut(Axis(0), c).iter_mut().zip(src) {
        *d += s;
    }
}

/// Sequence sums for one sample and, when `coef` is set, the gradient of
/// `coef * total` with respect to the predicted row.
fn sequence_terms(
    pred: &[f64],
    target: ArrayView2<'_, f32>,
    dims: &ModelDims,
    counts: &Counts,
    w: &SequenceWeights,
    coef: Option<f64>,
) -> (SeqSums, Option<Vec<f64>>) {
    let (l, d, nc) = (dims.max_seq_len, dims.dim_seq, dims.n_cmd());
    let s = coef.unwrap_or(0.0);
    let mut sums = SeqSums::default();
    let mut grad = coef.map(|_| vec![0.0; l * d]);

    for t in 0..l {
        for j in 0..d {
            let k = t * d + j;
            let p = pred[k];
            let e = p - target[[t, j]] as f64;

            sums.aux += p * p;
            let mut g = s * w.aux * 2.0 * p * per(counts.aux);
            if j < nc {
                sums.cmd += e * e;
                g += s * w.cmd * 2.0 * e * per(counts.cmd);
            } else {
                sums.args += e.abs();
                g += s * w.args * sign(e) * per(counts.args);
                if t >= 1 {
                    let delta = p - pred[k - d];
                    sums.smt += delta * delta;
                    g += s * w.smt * 2.0 * delta * per(counts.smt);
                }
                if t + 1 < l {
                    let delta = pred[k + d] - p;
                    g -= s * w.smt * 2.0 * delta * per(counts.smt);
                }
            }
            if let Some(grad) = grad.as_mut() {
                grad[k] = g;
            }
        }
    }
    (sums, grad)
}

/// Per-character linear decoders with analytic gradients.
///
/// With more than one replica the batch is sharded across the rayon pool;
/// per-sample results are reduced in batch order, so losses and gradients
/// are identical to a single-replica run.
#[derive(Clone, Debug)]
pub struct LinearGlyphModel {
    dims: ModelDims,
    seq_weights: SequenceWeights,
    params: ParamStore,
    phase: Phase,
    replicas: usize,
}

impl LinearGlyphModel {
    /// Initialise every decoder uniformly in `[-0.1, 0.1)` from `seed`.
    pub fn new(dims: ModelDims, weights: &LossWeights, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let seq_len = dims.max_seq_len * dims.dim_seq;
        let mut params = ParamStore::new();
        for (name, width) in [
            (IMG_DECODER, dims.img_size * dims.img_size),
            (LATENT_MU, dims.latent_dim),
            (SEQ_DECODER, seq_len),
            (SEQ_PARA, seq_len),
        ] {
            let value = ArrayD::from_shape_fn(IxDyn(&[dims.n_chars, width]), |_| {
                rng.gen_range(-INIT_SCALE..INIT_SCALE)
            });
            params.insert(name, value);
        }

        Self {
            dims,
            seq_weights: SequenceWeights::from(weights),
            params,
            phase: Phase::Train,
            replicas: 1,
        }
    }

    /// Build from run options; `multi_gpu` replicates over every rayon thread.
    pub fn from_config(config: &TrainConfig) -> Self {
        let replicas = if config.multi_gpu {
            rayon::current_num_threads()
        } else {
            1
        };
        tracing::debug!(replicas, n_chars = config.char_num, "Building linear glyph model");
        Self::new(ModelDims::from_config(config), &config.loss, config.seed).with_replicas(replicas)
    }

    pub fn with_replicas(mut self, replicas: usize) -> Self {
        self.replicas = replicas.max(1);
        self
    }

    pub fn dims(&self) -> &ModelDims {
        &self.dims
    }

    pub fn replicas(&self) -> usize {
        self.replicas
    }

    fn check_batch(&self, batch: &Batch) -> Result<()> {
        let (_, _, h, w) = batch.images.dim();
        if (h, w) != (self.dims.img_size, self.dims.img_size) {
            return Err(GlyphError::ShapeMismatch {
                name: "images".into(),
                expected: vec![self.dims.img_size, self.dims.img_size],
                actual: vec![h, w],
            });
        }
        let (_, l, d) = batch.sequences.dim();
        if (l, d) != (self.dims.max_seq_len, self.dims.dim_seq) {
            return Err(GlyphError::ShapeMismatch {
                name: "sequences".into(),
                expected: vec![self.dims.max_seq_len, self.dims.dim_seq],
                actual: vec![l, d],
            });
        }
        if let Some(id) = batch.char_ids.iter().find(|&&id| id >= self.dims.n_chars) {
            return Err(GlyphError::Model(format!(
                "char id {id} out of range for {} characters",
                self.dims.n_chars
            )));
        }
        Ok(())
    }

    /// Evaluate `f` for every sample, sharded across replicas, in batch order.
    fn per_sample<T, F>(&self, n: usize, f: F) -> Result<Vec<T>>
    where
        T: Send,
        F: Fn(usize) -> Result<T> + Send + Sync,
    {
        if self.replicas > 1 {
            let shard = n.div_ceil(self.replicas).max(1);
            (0..n).into_par_iter().with_min_len(shard).map(f).collect()
        } else {
            (0..n).map(f).collect()
        }
    }

    fn evaluate(
        &self,
        batch: &Batch,
        b: usize,
        counts: &Counts,
        objective: Option<&Objective>,
    ) -> Result<SampleEval> {
        let c = batch.char_ids[b];
        let mut sums = TermSums::default();

        let img_pred = row(self.params.get(IMG_DECODER)?, c);
        let mut img_grad = objective.map(|_| vec![0.0; img_pred.len()]);
        for plane in batch.images.index_axis(Axis(0), b).outer_iter() {
            for ((k, &y), &p) in plane.iter().enumerate().zip(&img_pred) {
                let e = p - y as f64;
                sums.l1 += e.abs();
                sums.sq += e * e;
                if let (Some(g), Some(o)) = (img_grad.as_mut(), objective) {
                    g[k] += (o.img_l1 * sign(e) + o.img_vggpt * 2.0 * e) * per(counts.img);
                }
            }
        }

        let mu = row(self.params.get(LATENT_MU)?, c);
        sums.kl = mu.iter().map(|m| 0.5 * m * m).sum();
        let mu_grad = objective.map(|o| {
            mu.iter()
                .map(|m| o.kl * m * per(counts.kl))
                .collect::<Vec<_>>()
        });

        let target = batch.sequences.index_axis(Axis(0), b);
        let w = &self.seq_weights;
        let (seq, seq_grad) = sequence_terms(
            &row(self.params.get(SEQ_DECODER)?, c),
            target,
            &self.dims,
            counts,
            w,
            objective.map(|o| o.svg),
        );
        let (para, para_grad) = sequence_terms(
            &row(self.params.get(SEQ_PARA)?, c),
            target,
            &self.dims,
            counts,
            w,
            objective.map(|o| o.svg_para),
        );
        sums.seq = seq;
        sums.para = para;

        let grads = match (img_grad, mu_grad, seq_grad, para_grad) {
            (Some(img), Some(mu), Some(seq), Some(para)) => Some(SampleGrads {
                char_id: c,
                img,
                mu,
                seq,
                para,
            }),
            _ => None,
        };
        Ok(SampleEval { sums, grads })
    }

    fn render(&self, batch: &Batch) -> Result<Array4<f32>> {
        let (n, channels, h, w) = batch.images.dim();
        let weight = self.params.get(IMG_DECODER)?;
        let mut out = Array4::<f32>::zeros((n, channels, h, w));
        for (b, &c) in batch.char_ids.iter().enumerate() {
            for (k, &v) in weight.index_axis(Axis(0), c).iter().enumerate() {
                for ch in 0..channels {
                    out[[b, ch, k / w, k % w]] = v as f32;
                }
            }
        }
        Ok(out)
    }
}

impl GlyphModel for LinearGlyphModel {
    fn forward(&self, batch: &Batch) -> Result<ForwardOutput> {
        self.check_batch(batch)?;
        let counts = Counts::new(&self.dims, batch);
        let evals = self.per_sample(batch.len(), |b| self.evaluate(batch, b, &counts, None))?;

        let mut sums = TermSums::default();
        for e in &evals {
            sums.add(&e.sums);
        }
        let losses = LossBreakdown {
            img: ImageLosses {
                l1: mean(sums.l1, counts.img),
                vggpt: mean(sums.sq, counts.img),
            },
            svg: sums.seq.losses(&counts, &self.seq_weights),
            svg_para: sums.para.losses(&counts, &self.seq_weights),
            kl: mean(sums.kl, counts.kl),
        };

        Ok(ForwardOutput {
            images: ImagePair {
                target: batch.images.clone(),
                output: self.render(batch)?,
            },
            losses,
        })
    }

    fn backward(&mut self, batch: &Batch, objective: &Objective) -> Result<()> {
        self.check_batch(batch)?;
        let counts = Counts::new(&self.dims, batch);
        let evals = self.per_sample(batch.len(), |b| {
            self.evaluate(batch, b, &counts, Some(objective))
        })?;

        let zeros = |name: &str| -> Result<ArrayD<f64>> {
            Ok(ArrayD::zeros(self.params.get(name)?.raw_dim()))
        };
        let mut img = zeros(IMG_DECODER)?;
        let mut mu = zeros(LATENT_MU)?;
        let mut seq = zeros(SEQ_DECODER)?;
        let mut para = zeros(SEQ_PARA)?;
        for g in evals.into_iter().filter_map(|e| e.grads) {
            add_row(&mut img, g.char_id, &g.img);
            add_row(&mut mu, g.char_id, &g.mu);
            add_row(&mut seq, g.char_id, &g.seq);
            add_row(&mut para, g.char_id, &g.para);
        }

        self.params.accumulate_grad(IMG_DECODER, &img)?;
        self.params.accumulate_grad(LATENT_MU, &mu)?;
        self.params.accumulate_grad(SEQ_DECODER, &seq)?;
        self.params.accumulate_grad(SEQ_PARA, &para)?;
        Ok(())
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
