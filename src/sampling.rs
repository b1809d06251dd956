//! Token sampling: the min-p → temperature → seeded-draw chain.
//!
//! After each forward pass the chain turns the model's logits into the next
//! token id. Stages run in fixed order:
//!
//! 1. Minimum-probability filter: discard tokens whose probability falls
//!    below `min_p` times the top token's probability, always keeping at
//!    least `min_keep` candidates.
//! 2. Temperature scaling of the surviving logits.
//! 3. A stochastic draw from the resulting distribution, using a seeded
//!    RNG — output is reproducible for a fixed seed and fixed inputs.

use serde::Deserialize;

use crate::TokenId;

/// Default sampling seed, used unless the caller overrides it.
pub const DEFAULT_SEED: u64 = 0xFFFF_FFFF;

/// Sampler chain configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SamplerConfig {
    /// Minimum probability relative to the most likely token. Tokens below
    /// `min_p * p_max` are discarded before the draw.
    #[serde(default = "default_min_p")]
    pub min_p: f32,

    /// Floor on the number of candidates the min-p filter retains.
    #[serde(default = "default_min_keep")]
    pub min_keep: usize,

    /// Logit scale applied after filtering. Values at or below zero
    /// degenerate to greedy argmax.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Seed for the stochastic draw.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_min_p() -> f32 {
    0.05
}
fn default_min_keep() -> usize {
    1
}
fn default_temperature() -> f32 {
    0.8
}
fn default_seed() -> u64 {
    DEFAULT_SEED
}

impl Default for SamplerConfig {
    fn default() -> Self {
        SamplerConfig {
            min_p: default_min_p(),
            min_keep: default_min_keep(),
            temperature: default_temperature(),
            seed: default_seed(),
        }
    }
}

/// Deterministic RNG for reproducible sampling (xorshift64).
#[derive(Debug, Clone)]
pub struct SeededRng {
    state: u64,
}

impl SeededRng {
    pub fn new(seed: u64) -> Self {
        // Zero state would produce all zeros.
        Self {
            state: if seed == 0 { 1 } else { seed },
        }
    }

    /// Next random float in [0, 1).
    pub fn next_f32(&mut self) -> f32 {
        self.state ^= self.state << 13;
        self.state ^= self.state >> 7;
        self.state ^= self.state << 17;
        (self.state >> 40) as f32 / (1u64 << 24) as f32
    }
}

/// The ordered sampling pipeline owned by one session.
///
/// The RNG state advances on every draw, so the chain is `&mut` through
/// sampling; a fresh chain with the same config replays the same sequence.
#[derive(Debug, Clone)]
pub struct SamplerChain {
    config: SamplerConfig,
    rng: SeededRng,
}

impl SamplerChain {
    pub fn new(config: SamplerConfig) -> Self {
        let rng = SeededRng::new(config.seed);
        SamplerChain { config, rng }
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    /// Draw the next token id from `logits`.
    ///
    /// # Panics
    /// If `logits` is empty; the generation loop validates logits shape
    /// against the vocabulary before sampling.
    pub fn sample(&mut self, logits: &[f32]) -> TokenId {
        assert!(!logits.is_empty(), "sampler requires non-empty logits");

        let probs = softmax(logits);
        let keep = self.min_p_mask(&probs);

        if self.config.temperature <= 0.0 {
            return argmax_kept(logits, &keep) as TokenId;
        }

        // Temperature scales the surviving logits; the draw happens over
        // the re-normalized distribution.
        let scaled: Vec<f32> = logits
            .iter()
            .zip(&keep)
            .map(|(&l, &k)| {
                if k {
                    l / self.config.temperature
                } else {
                    f32::NEG_INFINITY
                }
            })
            .collect();
        let dist = softmax(&scaled);

        self.draw(&dist) as TokenId
    }

    /// Mask of candidates surviving the min-p filter.
    fn min_p_mask(&self, probs: &[f32]) -> Vec<bool> {
        let p_max = probs.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        let threshold = self.config.min_p * p_max;

        let mut keep: Vec<bool> = probs.iter().map(|&p| p >= threshold).collect();

        // Floor: retain the top `min_keep` candidates even when the
        // threshold would discard them.
        let kept = keep.iter().filter(|&&k| k).count();
        if kept < self.config.min_keep {
            let mut order: Vec<usize> = (0..probs.len()).collect();
            order.sort_by(|&a, &b| {
                probs[b]
                    .partial_cmp(&probs[a])
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            for &idx in order.iter().take(self.config.min_keep.min(probs.len())) {
                keep[idx] = true;
            }
        }

        keep
    }

    /// Cumulative draw over a normalized distribution.
    fn draw(&mut self, dist: &[f32]) -> usize {
        let r = self.rng.next_f32();
        let mut cumsum = 0.0;
        for (i, &p) in dist.iter().enumerate() {
            cumsum += p;
            if r < cumsum {
                return i;
            }
        }
        // Rounding can leave cumsum fractionally below 1; fall back to the
        // last candidate with any mass.
        dist.iter()
            .rposition(|&p| p > 0.0)
            .unwrap_or(dist.len() - 1)
    }
}

fn softmax(logits: &[f32]) -> Vec<f32> {
    let max_logit = logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&l| (l - max_logit).exp()).collect();
    let sum: f32 = exps.iter().sum();

    if sum > 0.0 {
        exps.iter().map(|&e| e / sum).collect()
    } else {
        vec![1.0 / logits.len() as f32; logits.len()]
    }
}

fn argmax_kept(logits: &[f32], keep: &[bool]) -> usize {
    logits
        .iter()
        .enumerate()
        .filter(|&(i, _)| keep[i])
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(i, _)| i)
        .unwrap_or(0)
}
