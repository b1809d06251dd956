//! Streaming output capability.
//!
//! Generated text is observable incrementally through a [`StreamSink`],
//! invoked by the generation loop as each fragment is produced. The
//! boundary layer adapts this to whatever callback idiom the host offers.

/// Receives generated text fragments, in generation order, synchronously
/// on the thread driving the loop.
///
/// A sink is invoked zero or more times per turn, once per emitted
/// fragment. It has no return value and no way to cancel the in-flight
/// generation; fragments already delivered are never retracted, even when
/// the turn later fails.
pub trait StreamSink {
    fn on_fragment(&mut self, fragment: &str);
}

/// Discards every fragment — the no-callback path.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl StreamSink for NullSink {
    fn on_fragment(&mut self, _fragment: &str) {}
}

/// Any `FnMut(&str)` closure is a sink.
impl<F: FnMut(&str)> StreamSink for F {
    fn on_fragment(&mut self, fragment: &str) {
        self(fragment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closure_sink_collects_fragments() {
        let mut pieces: Vec<String> = Vec::new();
        {
            let mut sink = |piece: &str| pieces.push(piece.to_string());
            let sink: &mut dyn StreamSink = &mut sink;
            sink.on_fragment("Hel");
            sink.on_fragment("lo");
        }
        assert_eq!(pieces, vec!["Hel", "lo"]);
    }

    #[test]
    fn null_sink_accepts_fragments() {
        let mut sink = NullSink;
        sink.on_fragment("ignored");
    }
}
