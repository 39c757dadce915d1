//! Side-by-side target/output sample grids.
//!
//! Each tile is the target glyph stacked above the model output; tiles are
//! laid out `nrow` per row with a 2-pixel border. The whole grid is min-max
//! normalised to 8-bit and written as binary PGM.

use crate::model::ImagePair;
use crate::Result;
use ndarray::{s, Array2, ArrayView2, ArrayView3, Axis};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

const PADDING: usize = 2;

/// Collapse a `[channels, height, width]` image to one channel by averaging.
pub fn to_gray(image: ArrayView3<'_, f32>) -> Array2<f32> {
    match image.shape()[0] {
        1 => image.index_axis(Axis(0), 0).to_owned(),
        _ => image
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array2::zeros((image.shape()[1], image.shape()[2]))),
    }
}

/// Min-max normalise to the full 8-bit range. Constant images map to zero.
pub fn normalize_to_u8(image: ArrayView2<'_, f32>) -> Array2<u8> {
    let (lo, hi) = image
        .iter()
        .filter(|v| v.is_finite())
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let range = hi - lo;
    if !range.is_finite() || range <= 0.0 {
        return Array2::zeros(image.raw_dim());
    }
    image.mapv(|v| {
        let v = if v.is_finite() { v } else { lo };
        (((v - lo) / range) * 255.0).round().clamp(0.0, 255.0) as u8
    })
}

/// Arrange target-over-output tiles into one grayscale grid.
pub fn compose_grid(pair: &ImagePair, nrow: usize) -> Array2<f32> {
    let (n, _, h, w) = pair.target.dim();
    let cols = nrow.max(1).min(n.max(1));
    let rows = n.div_ceil(cols).max(1);
    let tile_h = 2 * h;

    let mut grid = Array2::<f32>::zeros((
        rows * (tile_h + PADDING) + PADDING,
        cols * (w + PADDING) + PADDING,
    ));
    for i in 0..n {
        let y = PADDING + (i / cols) * (tile_h + PADDING);
        let x = PADDING + (i % cols) * (w + PADDING);
        let target = to_gray(pair.target.index_axis(Axis(0), i));
        let output = to_gray(pair.output.index_axis(Axis(0), i));
        grid.slice_mut(s![y..y + h, x..x + w]).assign(&target);
        grid.slice_mut(s![y + h..y + tile_h, x..x + w]).assign(&output);
    }
    grid
}

/// Write an 8-bit grayscale image as binary PGM (P5).
pub fn write_pgm(path: &Path, image: ArrayView2<'_, u8>) -> Result<()> {
    let (h, w) = image.dim();
    let mut writer = BufWriter::new(File::create(path)?);
    write!(writer, "P5\n{w} {h}\n255\n")?;
    for row in image.rows() {
        let bytes: Vec<u8> = row.iter().copied().collect();
        writer.write_all(&bytes)?;
    }
    writer.flush()?;
    Ok(())
}

/// Persists sample grids into the experiment's samples directory.
#[derive(Clone, Debug)]
pub struct SampleWriter {
    dir: PathBuf,
    nrow: usize,
}

impl SampleWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            nrow: 8,
        }
    }

    pub fn with_nrow(mut self, nrow: usize) -> Self {
        self.nrow = nrow.max(1);
        self
    }

    /// Write `train_epoch_<epoch>_batch_<step>.pgm`.
    pub fn write(&self, pair: &ImagePair, epoch: u64, global_step: u64) -> Result<PathBuf> {
        let path = self
            .dir
            .join(format!("train_epoch_{epoch}_batch_{global_step}.pgm"));
        let grid = compose_grid(pair, self.nrow);
        write_pgm(&path, normalize_to_u8(grid.view()).view())?;
        tracing::debug!(path = %path.display(), "Saved sample grid");
        Ok(path)
    }
}
