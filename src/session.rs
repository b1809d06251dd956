//! High-level inference session management.
//!
//! A [`Session`] binds one loaded [`Model`] to its own decode context,
//! sampler chain, and prompt buffer, and serves sequential conversational
//! turns. Cache state accumulates across turns for the life of the session
//! and is never evicted; dropping the session is the only way to discard
//! it. Exclusive access is enforced by the borrow checker — `generate`
//! takes `&mut self`, so two overlapping calls on one session cannot be
//! written.

use std::path::Path;

use serde::Deserialize;
use tracing::debug;
use uuid::Uuid;

use crate::cache::KvContext;
use crate::engine::{self, TurnStats};
use crate::error::{ConfabError, Result};
use crate::model::Model;
use crate::sampling::{SamplerChain, SamplerConfig};
use crate::stream::{NullSink, StreamSink};
use crate::template::{self, ChatMessage, ChatTemplate};

/// Configuration for creating a session.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Hard cap on tokens generated per turn. The cache capacity bounds
    /// the loop implicitly; this bound is the explicit one.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    /// Sampler chain settings.
    #[serde(default)]
    pub sampler: SamplerConfig,
}

fn default_max_tokens() -> usize {
    512
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            max_tokens: default_max_tokens(),
            sampler: SamplerConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Load a session configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&data)?)
    }
}

/// An interactive inference session.
///
/// Sessions are intentionally not `Clone` — cloning would imply
/// duplicating cache state, which is neither cheap nor well-defined.
pub struct Session {
    // Field order fixes drop order: sampler chain, then the decode
    // context, and only then the shared model handle.
    sampler: SamplerChain,
    ctx: KvContext,
    model: Model,

    /// Reusable template render buffer, initially sized to the context
    /// capacity and regrown at most once per call.
    fmt_buf: String,

    /// Conversation history for the convenience chat API.
    history: Vec<ChatMessage>,

    config: SessionConfig,
    last_stats: Option<TurnStats>,

    /// Session id for log correlation.
    id: Uuid,
}

impl Session {
    /// Open a session against a loaded model.
    pub fn new(model: &Model, config: SessionConfig) -> Result<Self> {
        let ctx = model.open_context()?;
        let sampler = SamplerChain::new(config.sampler.clone());
        let fmt_buf = String::with_capacity(model.context_capacity());
        let id = Uuid::new_v4();

        debug!(session = %id, capacity = ctx.capacity(), "session opened");

        Ok(Session {
            sampler,
            ctx,
            model: model.clone(),
            fmt_buf,
            history: Vec::new(),
            config,
            last_stats: None,
            id,
        })
    }

    /// Run one conversational turn over `messages`, discarding fragments.
    pub fn generate(&mut self, messages: &[ChatMessage]) -> Result<String> {
        self.generate_with_sink(messages, &mut NullSink)
    }

    /// Run one conversational turn over `messages`, streaming each
    /// fragment to `sink` as it is produced.
    ///
    /// Returns the complete response text; the same text, fragment by
    /// fragment, was delivered to the sink. On failure nothing is
    /// returned, but fragments the sink already observed are not
    /// retracted.
    pub fn generate_with_sink(
        &mut self,
        messages: &[ChatMessage],
        sink: &mut dyn StreamSink,
    ) -> Result<String> {
        template::validate(messages)?;

        let raw = self.model.chat_template().ok_or_else(|| {
            ConfabError::Template("model has no chat template".into())
        })?;
        let tpl = ChatTemplate::parse(raw)?;
        tpl.render(messages, &mut self.fmt_buf);

        let (text, stats) = engine::run_turn(
            self.model.vocab(),
            &mut self.ctx,
            &mut self.sampler,
            &self.fmt_buf,
            self.config.max_tokens,
            sink,
        )?;

        self.last_stats = Some(stats);
        Ok(text)
    }

    /// Append a user turn to the history, generate over the whole
    /// conversation, and record the assistant reply.
    pub fn chat(&mut self, content: &str) -> Result<String> {
        self.chat_with_sink(content, &mut NullSink)
    }

    /// Streaming variant of [`chat`](Session::chat).
    ///
    /// On failure the user message stays in the history; trimming it (or
    /// clearing the history) is the caller's recovery path, for instance
    /// after a context overflow.
    pub fn chat_with_sink(
        &mut self,
        content: &str,
        sink: &mut dyn StreamSink,
    ) -> Result<String> {
        self.history.push(ChatMessage::user(content));

        let history = std::mem::take(&mut self.history);
        let result = self.generate_with_sink(&history, sink);
        self.history = history;

        let text = result?;
        self.history.push(ChatMessage::assistant(text.clone()));
        Ok(text)
    }

    /// Add a system message at the start of the conversation, replacing
    /// any existing one.
    pub fn set_system_prompt(&mut self, prompt: impl Into<String>) {
        self.history.retain(|m| m.role != "system");
        self.history.insert(0, ChatMessage::system(prompt));
    }

    /// Append a user message to the history without generating.
    pub fn push_user(&mut self, content: impl Into<String>) {
        self.history.push(ChatMessage::user(content));
    }

    /// Append an assistant message to the history without generating.
    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.history.push(ChatMessage::assistant(content));
    }

    /// The conversation history.
    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    /// Clear the conversation history.
    ///
    /// This touches the history only: cache cells are never reclaimed
    /// within a session's lifetime, so earlier turns keep occupying the
    /// context until the session is dropped.
    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    /// Cache cells consumed so far.
    pub fn used_cells(&self) -> usize {
        self.ctx.used_cells()
    }

    /// Context capacity in cells.
    pub fn context_capacity(&self) -> usize {
        self.ctx.capacity()
    }

    /// Statistics from the most recent successful turn.
    pub fn last_turn_stats(&self) -> Option<&TurnStats> {
        self.last_stats.as_ref()
    }

    /// Replace the sampler chain. Takes effect from the next turn; the
    /// RNG is reseeded from the new configuration.
    pub fn set_sampler(&mut self, config: SamplerConfig) {
        self.sampler = SamplerChain::new(config);
    }

    /// This session's id.
    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("used_cells", &self.ctx.used_cells())
            .field("capacity", &self.ctx.capacity())
            .field("history_len", &self.history.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.max_tokens, 512);
        assert_eq!(config.sampler.temperature, 0.8);
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let config: SessionConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.max_tokens, 512);

        let config: SessionConfig = serde_json::from_str(
            r#"{"max_tokens": 64, "sampler": {"seed": 3}}"#,
        )
        .unwrap();
        assert_eq!(config.max_tokens, 64);
        assert_eq!(config.sampler.seed, 3);
        assert_eq!(config.sampler.min_p, 0.05);
    }

    #[test]
    fn config_from_json_file() {
        let dir = std::env::temp_dir();
        let path = dir.join("confab_session_config_test.json");
        std::fs::write(&path, r#"{"max_tokens": 32}"#).unwrap();

        let config = SessionConfig::from_json_file(&path).unwrap();
        assert_eq!(config.max_tokens, 32);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn config_from_missing_file_errors() {
        let err = SessionConfig::from_json_file("/nonexistent/config.json").unwrap_err();
        assert!(matches!(err, ConfabError::Io(_)));
    }
}
