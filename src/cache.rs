//! Decode context: capacity-bounded cell accounting over backend state.
//!
//! The backend's [`DecodeState`] holds the actual key/value tensors; the
//! session layer tracks cell consumption here so the capacity invariants
//! hold regardless of what the backend reports. Cells only grow, with no
//! eviction or compaction within a session's lifetime, and every
//! successful decode consumes exactly one cell per batch token.

use crate::backend::DecodeState;
use crate::error::{ConfabError, Result};
use crate::TokenId;

/// One session's decode context.
pub struct KvContext {
    state: Box<dyn DecodeState>,
    used: usize,
    capacity: usize,
}

impl KvContext {
    pub(crate) fn new(state: Box<dyn DecodeState>, capacity: usize) -> Self {
        KvContext {
            state,
            used: 0,
            capacity,
        }
    }

    /// Number of cache cells consumed so far.
    pub fn used_cells(&self) -> usize {
        self.used
    }

    /// Total cell capacity, fixed at creation.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Remaining cell capacity.
    pub fn remaining(&self) -> usize {
        self.capacity - self.used
    }

    /// Whether any cells have been consumed.
    pub fn is_empty(&self) -> bool {
        self.used == 0
    }

    /// Run one forward pass over `batch`, consuming one cell per token.
    ///
    /// The capacity check runs before the backend is touched, so an
    /// oversized batch never mutates cache state. On a backend failure the
    /// cell count is not advanced, but the backend's own cache contents
    /// are unreliable from then on.
    pub(crate) fn decode(&mut self, batch: &[TokenId]) -> Result<Vec<f32>> {
        if batch.is_empty() {
            return Err(ConfabError::Decode("empty batch".into()));
        }
        if self.used + batch.len() > self.capacity {
            return Err(ConfabError::ContextOverflow {
                used: self.used,
                incoming: batch.len(),
                capacity: self.capacity,
            });
        }

        let logits = self.state.forward(batch, self.used)?;
        self.used += batch.len();
        Ok(logits)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    /// Counts forward calls; fails on demand.
    struct CountingState {
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    impl DecodeState for CountingState {
        fn forward(&mut self, batch: &[TokenId], _pos: usize) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ConfabError::Decode("backend exploded".into()));
            }
            Ok(vec![0.0; batch.len()])
        }
    }

    fn ctx(capacity: usize, fail: bool) -> (KvContext, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let state = CountingState {
            calls: Arc::clone(&calls),
            fail,
        };
        (KvContext::new(Box::new(state), capacity), calls)
    }

    #[test]
    fn cells_grow_with_each_decode() {
        let (mut ctx, _) = ctx(10, false);
        assert!(ctx.is_empty());

        ctx.decode(&[1, 2, 3]).unwrap();
        assert_eq!(ctx.used_cells(), 3);
        assert_eq!(ctx.remaining(), 7);

        ctx.decode(&[4]).unwrap();
        assert_eq!(ctx.used_cells(), 4);
    }

    #[test]
    fn overflow_rejected_before_backend_runs() {
        let (mut ctx, calls) = ctx(2, false);
        let err = ctx.decode(&[1, 2, 3]).unwrap_err();
        assert!(matches!(
            err,
            ConfabError::ContextOverflow {
                used: 0,
                incoming: 3,
                capacity: 2
            }
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(ctx.used_cells(), 0);
    }

    #[test]
    fn overflow_at_exact_boundary() {
        let (mut ctx, _) = ctx(3, false);
        ctx.decode(&[1, 2, 3]).unwrap();
        assert_eq!(ctx.remaining(), 0);
        assert!(matches!(
            ctx.decode(&[4]),
            Err(ConfabError::ContextOverflow { .. })
        ));
    }

    #[test]
    fn backend_failure_does_not_advance_cells() {
        let (mut ctx, calls) = ctx(10, true);
        assert!(matches!(ctx.decode(&[1]), Err(ConfabError::Decode(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(ctx.used_cells(), 0);
    }

    #[test]
    fn empty_batch_is_a_decode_error() {
        let (mut ctx, calls) = ctx(10, false);
        assert!(matches!(ctx.decode(&[]), Err(ConfabError::Decode(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
