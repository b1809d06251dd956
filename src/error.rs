//! Error types for the confab crate.

use thiserror::Error;

use crate::TokenId;

/// Top-level error type for confab operations.
///
/// Every failure aborts the in-flight operation; nothing is retried. A
/// generate call either returns the complete final string or exactly one
/// of these — there is no partial-success value. Fragments already
/// delivered to a stream sink before a later failure are not retracted.
#[derive(Error, Debug)]
pub enum ConfabError {
    /// Model, context, or sampler construction failed. The handle is
    /// unusable and must be dropped.
    #[error("model loading failed: {0}")]
    Load(String),

    /// Missing or unrecognized chat template, or formatting failed.
    /// Fatal for the call only; the session stays usable.
    #[error("chat template error: {0}")]
    Template(String),

    /// Malformed message list or tokenization failure, detected before
    /// any model work begins.
    #[error("invalid input: {0}")]
    Input(String),

    /// The decode context cannot hold the incoming batch. Fatal for the
    /// call; the session remains valid and can be reused once the caller
    /// trims its history.
    #[error("context capacity exceeded: {used} cells used + {incoming} incoming > {capacity}")]
    ContextOverflow {
        used: usize,
        incoming: usize,
        capacity: usize,
    },

    /// Forward pass failed. The session's cache state is unreliable
    /// afterwards and reusing it is at the caller's risk.
    #[error("decode failed: {0}")]
    Decode(String),

    /// A sampled token has no text rendering in the vocabulary.
    #[error("token {token} could not be converted to text")]
    PieceConversion { token: TokenId },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ConfabError>;
