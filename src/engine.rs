//! The autoregressive generation loop.
//!
//! One turn walks the state machine
//! `TOKENIZE → CAPACITY_CHECK → DECODE → SAMPLE → (STOP | EMIT → DECODE)`:
//! the formatted prompt is tokenized against the session's cache state,
//! checked against remaining capacity, then decoded as one batch; from
//! there the loop decodes a single sampled token at a time, emitting each
//! text fragment to the sink and the accumulator, until the sampler draws
//! an end-of-generation token or the turn's token limit runs out.
//!
//! The algorithm is inherently sequential (every step's input is the
//! previous step's output) and runs synchronously on the caller's thread.

use std::time::Instant;

use tracing::debug;

use crate::cache::KvContext;
use crate::error::{ConfabError, Result};
use crate::sampling::SamplerChain;
use crate::stream::StreamSink;
use crate::vocab::Vocab;

/// Timing and volume figures from one completed turn.
#[derive(Debug, Clone)]
pub struct TurnStats {
    /// Tokens in the rendered prompt (including any BOS).
    pub prompt_tokens: usize,

    /// Tokens emitted this turn.
    pub generated_tokens: usize,

    /// Prompt (prefill) pass time in milliseconds.
    pub prefill_ms: f64,

    /// Decode-loop time in milliseconds.
    pub decode_ms: f64,

    /// Decode throughput, tokens per second.
    pub tokens_per_second: f64,
}

/// Run one conversational turn over an already-rendered prompt.
///
/// Returns the accumulated response text together with turn statistics.
/// The sink observes every fragment before it is appended; on failure,
/// fragments already delivered stand, and no partial result is returned.
pub(crate) fn run_turn(
    vocab: &Vocab,
    ctx: &mut KvContext,
    sampler: &mut SamplerChain,
    prompt: &str,
    max_tokens: usize,
    sink: &mut dyn StreamSink,
) -> Result<(String, TurnStats)> {
    // TOKENIZE: the first prompt against an empty cache carries BOS;
    // every later turn continues the sequence and omits it.
    let prompt_tokens = vocab.encode(prompt, ctx.is_empty())?;
    if prompt_tokens.is_empty() {
        return Err(ConfabError::Input("prompt produced no tokens".into()));
    }

    // CAPACITY_CHECK: fail before any cache mutation or sink invocation.
    let (used, capacity) = (ctx.used_cells(), ctx.capacity());
    if used + prompt_tokens.len() > capacity {
        return Err(ConfabError::ContextOverflow {
            used,
            incoming: prompt_tokens.len(),
            capacity,
        });
    }

    let n_prompt = prompt_tokens.len();
    let prefill_start = Instant::now();

    // DECODE the full prompt batch; the returned logits seed the loop.
    let mut logits = ctx.decode(&prompt_tokens)?;

    let prefill_ms = prefill_start.elapsed().as_secs_f64() * 1000.0;
    let decode_start = Instant::now();

    let mut response = String::new();
    let mut generated = 0usize;

    loop {
        if logits.len() != vocab.n_tokens() {
            return Err(ConfabError::Decode(format!(
                "backend returned {} logits for a vocabulary of {}",
                logits.len(),
                vocab.n_tokens()
            )));
        }

        // SAMPLE the next token from the chain.
        let token = sampler.sample(&logits);

        // STOP on end-of-generation, without emitting the token.
        if vocab.is_eog(token) {
            break;
        }

        // EMIT: fragment goes to the sink first, then the accumulator.
        let piece = vocab.piece(token)?;
        sink.on_fragment(piece);
        response.push_str(piece);
        generated += 1;

        if generated >= max_tokens {
            break;
        }

        // DECODE the sampled token as a single-token batch.
        logits = ctx.decode(&[token])?;
    }

    let decode_ms = decode_start.elapsed().as_secs_f64() * 1000.0;
    let tokens_per_second = if decode_ms > 0.0 && generated > 0 {
        generated as f64 / (decode_ms / 1000.0)
    } else {
        0.0
    };

    let stats = TurnStats {
        prompt_tokens: n_prompt,
        generated_tokens: generated,
        prefill_ms,
        decode_ms,
        tokens_per_second,
    };

    debug!(
        prompt_tokens = n_prompt,
        generated,
        used_cells = ctx.used_cells(),
        "turn complete"
    );

    Ok((response, stats))
}
