//! Model handle: loaded weights plus the derived vocabulary.
//!
//! A [`Model`] is created once from a weight artifact and is read-only
//! afterwards. Cloning is cheap and shares the same loaded model; the
//! handle is safe to share across threads and sessions. Disposal is
//! `Drop`: the last handle to go releases the weights, and the
//! vocabulary lives exactly as long as the model that derived it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, error};

use crate::backend::{Backend, ModelParams, Weights};
use crate::cache::KvContext;
use crate::error::{ConfabError, Result};
use crate::vocab::Vocab;

struct ModelInner {
    vocab: Vocab,
    chat_template: Option<String>,
    weights: Arc<dyn Weights>,
    params: ModelParams,
    path: PathBuf,
}

/// Shared handle to a loaded model.
#[derive(Clone)]
pub struct Model {
    inner: Arc<ModelInner>,
}

impl Model {
    /// Load a model artifact through `backend`.
    ///
    /// Validates `params`, then delegates weight loading and vocabulary
    /// derivation. Any construction failure is a [`ConfabError::Load`];
    /// the would-be handle is unusable and nothing needs releasing.
    pub fn load(
        backend: &dyn Backend,
        path: impl AsRef<Path>,
        params: ModelParams,
    ) -> Result<Model> {
        let path = path.as_ref();

        if params.context_capacity == 0 {
            return Err(ConfabError::Load(
                "context capacity must be greater than zero".into(),
            ));
        }

        let loaded = backend.load(path, &params).map_err(|e| {
            error!(path = %path.display(), "model load failed: {e}");
            match e {
                e @ ConfabError::Load(_) => e,
                other => ConfabError::Load(other.to_string()),
            }
        })?;

        debug!(
            path = %path.display(),
            n_vocab = loaded.vocab.n_tokens(),
            context_capacity = params.context_capacity,
            gpu_layers = params.gpu_layers,
            "model loaded"
        );

        Ok(Model {
            inner: Arc::new(ModelInner {
                vocab: loaded.vocab,
                chat_template: loaded.chat_template,
                weights: loaded.weights,
                params,
                path: path.to_path_buf(),
            }),
        })
    }

    /// The vocabulary derived from this model.
    pub fn vocab(&self) -> &Vocab {
        &self.inner.vocab
    }

    /// The chat template embedded in the artifact, if any.
    pub fn chat_template(&self) -> Option<&str> {
        self.inner.chat_template.as_deref()
    }

    /// Context capacity each session opened on this model receives.
    pub fn context_capacity(&self) -> usize {
        self.inner.params.context_capacity
    }

    /// Where the artifact was loaded from.
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Open a fresh decode context against these weights.
    pub(crate) fn open_context(&self) -> Result<KvContext> {
        let capacity = self.inner.params.context_capacity;
        let state = self.inner.weights.open_state(capacity)?;
        Ok(KvContext::new(state, capacity))
    }
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model")
            .field("path", &self.inner.path)
            .field("n_vocab", &self.inner.vocab.n_tokens())
            .field("context_capacity", &self.inner.params.context_capacity)
            .finish()
    }
}
