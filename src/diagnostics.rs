//! Process-wide diagnostic sink.
//!
//! Compute backends can be noisy during loading and decoding; the only
//! messages worth surfacing by default are error-severity ones. [`init`]
//! installs a process-wide `tracing` subscriber filtered to ERROR. Call it
//! once during startup, before loading models; it is safe to call from any
//! thread and any number of times. If the host application has already
//! installed its own subscriber, that one wins and this call does nothing.

use std::sync::Once;

use tracing::Level;

static INIT: Once = Once::new();

/// Install the process-wide error-only diagnostic sink. Idempotent.
pub fn init() {
    INIT.call_once(|| {
        // try_init: a subscriber installed by the host takes precedence.
        let _ = tracing_subscriber::fmt()
            .with_max_level(Level::ERROR)
            .with_target(false)
            .try_init();
    });
}

#[cfg(test)]
mod tests {
    use super::init;

    #[test]
    fn init_is_idempotent() {
        init();
        init();
        init();
    }
}
