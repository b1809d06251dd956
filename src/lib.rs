//! Streaming chat-inference sessions over a pluggable decode backend.
//!
//! confab manages the stateful side of LLM inference: shared model
//! handles, per-session key/value cache accounting, chat-template prompt
//! assembly, the min-p/temperature/seeded-draw sampler chain, and the
//! autoregressive decode-sample-emit loop with synchronous streaming.
//! The forward pass itself lives behind the [`backend`] seam.
//!
//! A turn flows caller messages → [`template`] render into the session's
//! reusable buffer → tokenize against cache state → decode/sample/emit,
//! pushing each fragment to a [`StreamSink`] → complete response string.

pub mod backend;
pub mod cache;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod model;
pub mod sampling;
pub mod session;
pub mod stream;
pub mod template;
pub mod vocab;

pub use backend::{Backend, DecodeState, LoadedModel, ModelParams, Weights};
pub use engine::TurnStats;
pub use error::{ConfabError, Result};
pub use model::Model;
pub use sampling::{SamplerChain, SamplerConfig, DEFAULT_SEED};
pub use session::{Session, SessionConfig};
pub use stream::{NullSink, StreamSink};
pub use template::{ChatMessage, ChatTemplate};
pub use vocab::Vocab;

/// Token identifier (i32 for FFI compatibility; logically non-negative).
pub type TokenId = i32;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
