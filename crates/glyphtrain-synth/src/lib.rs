//! Synthetic glyph data and a linear reference model.
//!
//! Lets the glyphtrain driver run end-to-end without a dataset or a deep
//! learning backend: [`SyntheticGlyphs`] yields seeded image + command-sequence
//! batches and [`LinearGlyphModel`] reports the full loss breakdown with
//! analytic gradients.

mod data;
mod model;

pub use data::{Split, SyntheticGlyphs};
pub use model::{
    LinearGlyphModel, ModelDims, SequenceWeights, IMG_DECODER, LATENT_MU, N_COMMANDS, SEQ_DECODER,
    SEQ_PARA,
};
