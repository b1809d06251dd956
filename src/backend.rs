//! The compute seam: weight loading and the forward pass.
//!
//! confab owns session lifecycle, prompt assembly, sampling, and cache
//! accounting; it does not own the model's mathematics. Backends plug in
//! here, the narrow waist everything else depends on: [`Backend`] loads an
//! artifact, [`Weights`] opens per-session decode state, [`DecodeState`]
//! runs one forward pass per batch. Implementations can sit on top of any
//! compute stack without changing session code, and the whole session layer
//! is testable against mocks.

use std::path::Path;
use std::sync::Arc;

use crate::error::Result;
use crate::vocab::Vocab;
use crate::TokenId;

/// Parameters for loading a model.
#[derive(Debug, Clone)]
pub struct ModelParams {
    /// Context capacity in cache cells (token positions) for each session
    /// opened against the model. Must be greater than zero.
    pub context_capacity: usize,

    /// Number of layers to offload to an accelerator device. Zero keeps
    /// everything on the host.
    pub gpu_layers: usize,
}

impl Default for ModelParams {
    fn default() -> Self {
        ModelParams {
            context_capacity: 4096,
            gpu_layers: 0,
        }
    }
}

/// What a backend hands back from a successful load.
pub struct LoadedModel {
    /// Vocabulary derived from the model artifact.
    pub vocab: Vocab,

    /// Chat template embedded in the artifact, if any.
    pub chat_template: Option<String>,

    /// The loaded weights, shared read-only across sessions.
    pub weights: Arc<dyn Weights>,
}

/// Loads model artifacts.
///
/// The artifact format is owned by the backend; confab only hands over the
/// path. Load failures should be reported as
/// [`ConfabError::Load`](crate::ConfabError::Load).
pub trait Backend: Send + Sync {
    fn load(&self, path: &Path, params: &ModelParams) -> Result<LoadedModel>;
}

/// Immutable loaded weights.
///
/// Safe to share across sessions and threads; all mutable inference state
/// lives in the [`DecodeState`] values opened from here.
pub trait Weights: Send + Sync {
    /// Open fresh decode state for one session, sized to hold
    /// `context_capacity` cells.
    fn open_state(&self, context_capacity: usize) -> Result<Box<dyn DecodeState>>;
}

/// Mutable per-session forward-pass state.
///
/// A successful `forward` call appends one key/value cell per batch token.
/// confab tracks cell consumption on its side and never asks the state for
/// it; after a failed call the state's cache contents are unreliable.
pub trait DecodeState: Send {
    /// Run one forward pass over `batch`, whose first token occupies
    /// absolute position `pos`. Returns logits for the final batch
    /// position, one entry per vocabulary token.
    fn forward(&mut self, batch: &[TokenId], pos: usize) -> Result<Vec<f32>>;
}
