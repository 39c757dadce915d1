//! Batches and batch streams.

use crate::{GlyphError, Result};
use ndarray::{Array3, Array4, ArrayD};
use std::collections::BTreeMap;

/// One paired image + vector-command batch.
///
/// - `images`: `[batch, channels, height, width]`
/// - `sequences`: `[batch, max_seq_len, dim_seq]`
#[derive(Clone, Debug)]
pub struct Batch {
    pub images: Array4<f32>,
    pub sequences: Array3<f32>,
    /// Character index of every sample within the target script's char set
    pub char_ids: Vec<usize>,
    /// Extra named tensors a model may require (reference glyphs, masks, ...)
    pub aux: BTreeMap<String, ArrayD<f32>>,
}

impl Batch {
    /// Create a batch, checking that every field agrees on the batch size.
    pub fn new(images: Array4<f32>, sequences: Array3<f32>, char_ids: Vec<usize>) -> Result<Self> {
        let n = images.shape()[0];
        if sequences.shape()[0] != n || char_ids.len() != n {
            return Err(GlyphError::ShapeMismatch {
                name: "batch".into(),
                expected: vec![n],
                actual: vec![sequences.shape()[0], char_ids.len()],
            });
        }
        Ok(Self {
            images,
            sequences,
            char_ids,
            aux: BTreeMap::new(),
        })
    }

    /// Attach an auxiliary tensor.
    pub fn with_aux(mut self, name: impl Into<String>, tensor: ArrayD<f32>) -> Self {
        self.aux.insert(name.into(), tensor);
        self
    }

    pub fn len(&self) -> usize {
        self.char_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.char_ids.is_empty()
    }
}

/// A re-iterable stream of batches (one pass per call to `iter`).
pub trait GlyphLoader {
    /// Number of batches in one pass.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Start a new pass over the stream.
    fn iter(&self) -> Box<dyn Iterator<Item = Result<Batch>> + '_>;
}

/// In-memory loader over pre-built batches.
#[derive(Clone, Debug, Default)]
pub struct VecLoader {
    batches: Vec<Batch>,
}

impl VecLoader {
    pub fn new(batches: Vec<Batch>) -> Self {
        Self { batches }
    }
}

impl GlyphLoader for VecLoader {
    fn len(&self) -> usize {
        self.batches.len()
    }

    fn iter(&self) -> Box<dyn Iterator<Item = Result<Batch>> + '_> {
        Box::new(self.batches.iter().cloned().map(Ok))
    }
}
