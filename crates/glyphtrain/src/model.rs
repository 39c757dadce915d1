//! Model collaborator interface.
//!
//! The generative model itself (encoders, fusion, sequence decoders) lives
//! outside this crate. The trainer only needs a forward pass that reports a
//! [`LossBreakdown`], a backward pass for a given [`Objective`], a train/eval
//! switch and access to named parameters. Multi-device replication is an
//! internal concern of the implementation.

use crate::checkpoint::Checkpointable;
use crate::data::Batch;
use crate::loss::{LossBreakdown, Objective};
use crate::{ConfigError, GlyphError, Result};
use ndarray::{s, Array4, ArrayD};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Deref;

/// Whether the model is updating parameters or only being evaluated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Train,
    Eval,
}

/// Target and predicted glyph images, `[batch, channels, height, width]`.
#[derive(Clone, Debug)]
pub struct ImagePair {
    pub target: Array4<f32>,
    pub output: Array4<f32>,
}

impl ImagePair {
    /// The first sample of the batch, kept as a batch of one. `None` for an
    /// empty batch.
    pub fn first(&self) -> Option<Self> {
        if self.target.shape()[0] == 0 || self.output.shape()[0] == 0 {
            return None;
        }
        Some(Self {
            target: self.target.slice(s![0..1, .., .., ..]).to_owned(),
            output: self.output.slice(s![0..1, .., .., ..]).to_owned(),
        })
    }
}

/// Outputs of one forward pass.
#[derive(Clone, Debug)]
pub struct ForwardOutput {
    pub images: ImagePair,
    pub losses: LossBreakdown,
}

/// Named parameter tensors with their accumulated gradients.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ParamStore {
    values: BTreeMap<String, ArrayD<f64>>,
    #[serde(skip)]
    grads: BTreeMap<String, ArrayD<f64>>,
}

impl ParamStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a parameter tensor.
    pub fn insert(&mut self, name: impl Into<String>, value: ArrayD<f64>) {
        let name = name.into();
        self.grads.remove(&name);
        self.values.insert(name, value);
    }

    pub fn get(&self, name: &str) -> Result<&ArrayD<f64>> {
        self.values
            .get(name)
            .ok_or_else(|| GlyphError::Model(format!("unknown parameter '{name}'")))
    }

    pub fn grad(&self, name: &str) -> Option<&ArrayD<f64>> {
        self.grads.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Total number of scalar parameters.
    pub fn num_parameters(&self) -> usize {
        self.values.values().map(ArrayD::len).sum()
    }

    /// Reset every gradient to zero.
    pub fn zero_grad(&mut self) {
        for (name, value) in &self.values {
            match self.grads.get_mut(name) {
                Some(g) => g.fill(0.0),
                None => {
                    self.grads
                        .insert(name.clone(), ArrayD::zeros(value.raw_dim()));
                }
            }
        }
    }

    /// Add `grad` into the accumulated gradient of `name`.
    pub fn accumulate_grad(&mut self, name: &str, grad: &ArrayD<f64>) -> Result<()> {
        let value = self.get(name)?;
        if value.shape() != grad.shape() {
            return Err(GlyphError::ShapeMismatch {
                name: name.to_string(),
                expected: value.shape().to_vec(),
                actual: grad.shape().to_vec(),
            });
        }
        match self.grads.get_mut(name) {
            Some(g) => *g += grad,
            None => {
                self.grads.insert(name.to_string(), grad.clone());
            }
        }
        Ok(())
    }

    /// Every parameter paired with its gradient, for optimizer updates.
    pub fn entries_mut(
        &mut self,
    ) -> impl Iterator<Item = (&String, &mut ArrayD<f64>, Option<&ArrayD<f64>>)> {
        let grads = &self.grads;
        self.values
            .iter_mut()
            .map(move |(name, value)| (name, value, grads.get(name)))
    }
}

impl Checkpointable for ParamStore {
    type State = BTreeMap<String, ArrayD<f64>>;

    fn save_state(&self) -> Self::State {
        self.values.clone()
    }

    /// Strict restore: names and shapes must match exactly.
    fn load_state(&mut self, mut state: Self::State) -> Result<()> {
        for (name, value) in &self.values {
            let saved = state
                .get(name)
                .ok_or_else(|| ConfigError::MissingCheckpointKey(format!("model.{name}")))?;
            if saved.shape() != value.shape() {
                return Err(GlyphError::ShapeMismatch {
                    name: name.clone(),
                    expected: value.shape().to_vec(),
                    actual: saved.shape().to_vec(),
                });
            }
        }
        if let Some(extra) = state.keys().find(|k| !self.values.contains_key(*k)) {
            return Err(GlyphError::Checkpoint(format!(
                "unexpected parameter '{extra}' in checkpoint"
            )));
        }
        for (name, value) in self.values.iter_mut() {
            if let Some(saved) = state.remove(name) {
                *value = saved;
            }
        }
        self.grads.clear();
        Ok(())
    }
}

/// The generative model as seen by the trainer.
pub trait GlyphModel {
    /// Run the model on a batch, returning outputs and the loss breakdown.
    fn forward(&self, batch: &Batch) -> Result<ForwardOutput>;

    /// Accumulate gradients of `objective` applied to this batch's losses.
    fn backward(&mut self, batch: &Batch, objective: &Objective) -> Result<()>;

    fn phase(&self) -> Phase;

    fn set_phase(&mut self, phase: Phase);

    fn parameters(&self) -> &ParamStore;

    fn parameters_mut(&mut self) -> &mut ParamStore;

    fn num_parameters(&self) -> usize {
        self.parameters().num_parameters()
    }
}

/// Holds a model in [`Phase::Eval`] with read-only access.
///
/// The previous phase is restored when the guard drops, on every exit path.
pub struct EvalGuard<'a, M: GlyphModel + ?Sized> {
    model: &'a mut M,
    previous: Phase,
}

impl<'a, M: GlyphModel + ?Sized> EvalGuard<'a, M> {
    pub fn new(model: &'a mut M) -> Self {
        let previous = model.phase();
        model.set_phase(Phase::Eval);
        Self { model, previous }
    }
}

impl<M: GlyphModel + ?Sized> Deref for EvalGuard<'_, M> {
    type Target = M;

    fn deref(&self) -> &M {
        self.model
    }
}

impl<M: GlyphModel + ?Sized> Drop for EvalGuard<'_, M> {
    fn drop(&mut self) {
        self.model.set_phase(self.previous);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::IxDyn;

    fn store() -> ParamStore {
        let mut p = ParamStore::new();
        p.insert("w", ArrayD::from_elem(IxDyn(&[2, 3]), 1.0));
        p.insert("b", ArrayD::zeros(IxDyn(&[3])));
        p
    }

    #[test]
    fn test_accumulate_and_zero_grad() {
        let mut p = store();
        let g = ArrayD::from_elem(IxDyn(&[3]), 0.5);
        p.accumulate_grad("b", &g).unwrap();
        p.accumulate_grad("b", &g).unwrap();
        assert_eq!(p.grad("b").unwrap()[[0]], 1.0);

        p.zero_grad();
        assert!(p.grad("b").unwrap().iter().all(|&x| x == 0.0));
        assert_eq!(p.grad("w").unwrap().shape(), &[2, 3]);
    }

    #[test]
    fn test_accumulate_rejects_wrong_shape() {
        let mut p = store();
        let g = ArrayD::zeros(IxDyn(&[4]));
        assert!(matches!(
            p.accumulate_grad("b", &g),
            Err(GlyphError::ShapeMismatch { .. })
        ));
        assert!(p.accumulate_grad("missing", &g).is_err());
    }

    #[test]
    fn test_load_state_is_strict() {
        let mut p = store();
        assert_eq!(p.num_parameters(), 9);

        let mut state = p.save_state();
        state.get_mut("w").unwrap().fill(3.0);
        p.load_state(state.clone()).unwrap();
        assert_eq!(p.get("w").unwrap()[[1, 2]], 3.0);

        let mut missing = state.clone();
        missing.remove("b");
        assert!(matches!(
            p.load_state(missing),
            Err(GlyphError::Config(ConfigError::MissingCheckpointKey(k))) if k == "model.b"
        ));

        let mut extra = state;
        extra.insert("z".into(), ArrayD::zeros(IxDyn(&[1])));
        assert!(matches!(p.load_state(extra), Err(GlyphError::Checkpoint(_))));
    }

    #[test]
    fn test_first_sample_of_pair() {
        let pair = ImagePair {
            target: Array4::from_elem((3, 1, 2, 2), 1.0),
            output: Array4::zeros((3, 1, 2, 2)),
        };
        let first = pair.first().unwrap();
        assert_eq!(first.target.shape(), &[1, 1, 2, 2]);
        assert_eq!(first.output.shape(), &[1, 1, 2, 2]);

        let empty = ImagePair {
            target: Array4::zeros((0, 1, 2, 2)),
            output: Array4::zeros((0, 1, 2, 2)),
        };
        assert!(empty.first().is_none());
    }

    struct Dummy {
        phase: Phase,
        params: ParamStore,
    }

    impl GlyphModel for Dummy {
        fn forward(&self, _batch: &Batch) -> Result<ForwardOutput> {
            Err(GlyphError::Model("not used".into()))
        }
        fn backward(&mut self, _batch: &Batch, _objective: &Objective) -> Result<()> {
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

    #[test]
    fn test_eval_guard_restores_phase() {
        let mut m = Dummy {
            phase: Phase::Train,
            params: store(),
        };
        {
            let guard = EvalGuard::new(&mut m);
            assert_eq!(guard.phase(), Phase::Eval);
            assert_eq!(guard.num_parameters(), 9);
        }
        assert_eq!(m.phase, Phase::Train);
    }
}
