//! Deterministic synthetic glyph batches.

use crate::model::ModelDims;
use glyphtrain::data::{Batch, GlyphLoader};
use glyphtrain::training::TrainConfig;
use glyphtrain::Result;
use ndarray::{Array3, Array4};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f32::consts::PI;

const NOISE: f32 = 0.05;

/// Which half of the synthetic dataset a loader serves.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Split {
    Train,
    Val,
}

/// Re-iterable stream of seeded synthetic batches.
///
/// Batch `i` depends only on the seed and `i`, so every pass yields the same
/// batches in the same order.
#[derive(Clone, Debug)]
pub struct SyntheticGlyphs {
    dims: ModelDims,
    batch_size: usize,
    n_batches: usize,
    channels: usize,
    seed: u64,
}

impl SyntheticGlyphs {
    pub fn new(dims: ModelDims, batch_size: usize, n_batches: usize, seed: u64) -> Self {
        Self {
            dims,
            batch_size,
            n_batches,
            channels: 1,
            seed,
        }
    }

    pub fn from_config(config: &TrainConfig, split: Split, n_batches: usize) -> Self {
        let dims = ModelDims::from_config(config);
        match split {
            Split::Train => Self::new(dims, config.batch_size, n_batches, config.seed),
            Split::Val => Self::new(
                dims,
                config.batch_size_val,
                n_batches,
                config.seed.wrapping_add(0x5eed),
            ),
        }
    }

    pub fn with_channels(mut self, channels: usize) -> Self {
        self.channels = channels.max(1);
        self
    }

    /// Build batch `index` of a pass.
    pub fn batch(&self, index: usize) -> Result<Batch> {
        let mut rng = StdRng::seed_from_u64(self.seed ^ ((index as u64) << 20));
        let n_chars = self.dims.n_chars.max(1);
        let char_ids: Vec<usize> = (0..self.batch_size)
            .map(|_| rng.gen_range(0..n_chars))
            .collect();

        let s = self.dims.img_size;
        let images = Array4::from_shape_fn((self.batch_size, self.channels, s, s), |(b, _, y, x)| {
            glyph_pixel(char_ids[b], y, x, s) + rng.gen_range(-NOISE..NOISE)
        });

        let nc = self.dims.n_cmd();
        let sequences = Array3::from_shape_fn(
            (self.batch_size, self.dims.max_seq_len, self.dims.dim_seq),
            |(b, t, j)| command_value(char_ids[b], t, j, nc),
        );

        Batch::new(images, sequences, char_ids)
    }
}

/// Smooth per-character stroke pattern in `[0, 1]`.
fn glyph_pixel(c: usize, y: usize, x: usize, size: usize) -> f32 {
    let fx = (1 + c % 5) as f32 * PI * x as f32 / size as f32;
    let fy = (1 + c % 3) as f32 * PI * y as f32 / size as f32;
    0.5 + 0.5 * (fx + c as f32 * 0.37).sin() * fy.cos()
}

/// Command one-hot in the leading columns, bounded arguments after them.
fn command_value(c: usize, t: usize, j: usize, n_cmd: usize) -> f32 {
    if j < n_cmd {
        if (c + t) % n_cmd == j {
            1.0
        } else {
            0.0
        }
    } else {
        ((c * 31 + t * 7 + j) % 17) as f32 / 17.0
    }
}

impl GlyphLoader for SyntheticGlyphs {
    fn len(&self) -> usize {
        self.n_batches
    }

    fn iter(&self) -> Box<dyn Iterator<Item = Result<Batch>> + '_> {
        Box::new((0..self.n_batches).map(move |i| self.batch(i)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dims() -> ModelDims {
        ModelDims {
            n_chars: 4,
            img_size: 6,
            max_seq_len: 3,
            dim_seq: 6,
            latent_dim: 2,
        }
    }

    #[test]
    fn test_passes_are_deterministic() {
        let loader = SyntheticGlyphs::new(dims(), 2, 3, 11).with_channels(3);
        let a: Vec<_> = loader.iter().map(|b| b.unwrap()).collect();
        let b: Vec<_> = loader.iter().map(|b| b.unwrap()).collect();
        assert_eq!(a.len(), 3);
        for (x, y) in a.iter().zip(&b) {
            assert_eq!(x.images, y.images);
            assert_eq!(x.char_ids, y.char_ids);
        }
        assert_eq!(a[0].images.shape(), &[2, 3, 6, 6]);
        assert_eq!(a[0].sequences.shape(), &[2, 3, 6]);
    }

    #[test]
    fn test_command_rows_are_one_hot() {
        let batch = SyntheticGlyphs::new(dims(), 2, 1, 0).batch(0).unwrap();
        for seq in batch.sequences.outer_iter() {
            for row in seq.outer_iter() {
                let ones = row.iter().take(4).filter(|&&v| v == 1.0).count();
                assert_eq!(ones, 1);
            }
        }
    }

    #[test]
    fn test_splits_differ() {
        let cfg = TrainConfig {
            char_num: 4,
            img_size: 6,
            max_seq_len: 3,
            dim_seq: 6,
            batch_size: 2,
            batch_size_val: 3,
            ..Default::default()
        };
        let train = SyntheticGlyphs::from_config(&cfg, Split::Train, 2);
        let val = SyntheticGlyphs::from_config(&cfg, Split::Val, 1);
        assert_eq!(train.batch(0).unwrap().len(), 2);
        assert_eq!(val.batch(0).unwrap().len(), 3);
        assert_eq!(val.len(), 1);
    }
}
