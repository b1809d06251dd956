//! Chat prompt assembly.
//!
//! Models embed a chat template describing how role/content turns serialize
//! into one prompt string. The template is recognized from the artifact's
//! template text by its marker tokens and rendered into the session's
//! reusable buffer, always ending with an open assistant turn so decoding
//! continues with a new model response.
//!
//! The rendered prompt never contains the beginning-of-sequence piece;
//! that token is added (or not) by tokenization, depending on whether the
//! session's cache is empty.

use serde::{Deserialize, Serialize};

use crate::error::{ConfabError, Result};

/// A chat message with role and content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        ChatMessage {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        ChatMessage {
            role: "user".into(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        ChatMessage {
            role: "assistant".into(),
            content: content.into(),
        }
    }
}

/// Check a caller-supplied message list before any model work.
/// Every message must carry a non-empty role and content.
pub fn validate(messages: &[ChatMessage]) -> Result<()> {
    for (i, msg) in messages.iter().enumerate() {
        if msg.role.is_empty() {
            return Err(ConfabError::Input(format!("message {i} has an empty role")));
        }
        if msg.content.is_empty() {
            return Err(ConfabError::Input(format!(
                "message {i} has empty content"
            )));
        }
    }
    Ok(())
}

/// A recognized chat template dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatTemplate {
    /// Llama 3 header format:
    /// `<|start_header_id|>{role}<|end_header_id|>\n\n{content}<|eot_id|>`.
    Llama3,

    /// ChatML: `<|im_start|>{role}\n{content}<|im_end|>\n`.
    ChatMl,
}

impl ChatTemplate {
    /// Recognize the dialect of a model-embedded template string by its
    /// marker tokens. An unrecognized template is a fatal template error.
    pub fn parse(template: &str) -> Result<ChatTemplate> {
        if template.contains("<|start_header_id|>") {
            Ok(ChatTemplate::Llama3)
        } else if template.contains("<|im_start|>") {
            Ok(ChatTemplate::ChatMl)
        } else {
            Err(ConfabError::Template(format!(
                "unrecognized chat template: {:?}",
                truncate(template, 48)
            )))
        }
    }

    /// Render `messages` into `buf`, ending with an open assistant turn.
    ///
    /// `buf` is cleared but keeps its capacity across calls; when the
    /// rendered length exceeds the current capacity the buffer is grown
    /// once, to exactly the required size, before writing.
    pub fn render(&self, messages: &[ChatMessage], buf: &mut String) {
        buf.clear();
        let needed = self.rendered_len(messages);
        if needed > buf.capacity() {
            buf.reserve_exact(needed);
        }

        match self {
            ChatTemplate::Llama3 => {
                for msg in messages {
                    buf.push_str("<|start_header_id|>");
                    buf.push_str(&msg.role);
                    buf.push_str("<|end_header_id|>\n\n");
                    buf.push_str(&msg.content);
                    buf.push_str("<|eot_id|>");
                }
                buf.push_str("<|start_header_id|>assistant<|end_header_id|>\n\n");
            }
            ChatTemplate::ChatMl => {
                for msg in messages {
                    buf.push_str("<|im_start|>");
                    buf.push_str(&msg.role);
                    buf.push('\n');
                    buf.push_str(&msg.content);
                    buf.push_str("<|im_end|>\n");
                }
                buf.push_str("<|im_start|>assistant\n");
            }
        }
    }

    /// Exact rendered length in bytes for the grow-once reservation.
    fn rendered_len(&self, messages: &[ChatMessage]) -> usize {
        let (per_msg, tail) = match self {
            // "<|start_header_id|>" + "<|end_header_id|>\n\n" + "<|eot_id|>"
            ChatTemplate::Llama3 => (19 + 19 + 10, 19 + 9 + 19),
            // "<|im_start|>" + "\n" + "<|im_end|>\n"
            ChatTemplate::ChatMl => (12 + 1 + 11, 12 + 9 + 1),
        };
        messages
            .iter()
            .map(|m| per_msg + m.role.len() + m.content.len())
            .sum::<usize>()
            + tail
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_recognizes_llama3_markers() {
        let tpl = "{% for m in messages %}<|start_header_id|>...";
        assert_eq!(ChatTemplate::parse(tpl).unwrap(), ChatTemplate::Llama3);
    }

    #[test]
    fn parse_recognizes_chatml_markers() {
        let tpl = "{% for m in messages %}<|im_start|>...";
        assert_eq!(ChatTemplate::parse(tpl).unwrap(), ChatTemplate::ChatMl);
    }

    #[test]
    fn parse_rejects_unknown_template() {
        let err = ChatTemplate::parse("{{ bespoke }}").unwrap_err();
        assert!(matches!(err, ConfabError::Template(_)));
    }

    #[test]
    fn llama3_render_format() {
        let messages = vec![ChatMessage::user("Hi")];
        let mut buf = String::new();
        ChatTemplate::Llama3.render(&messages, &mut buf);
        assert_eq!(
            buf,
            "<|start_header_id|>user<|end_header_id|>\n\nHi<|eot_id|>\
             <|start_header_id|>assistant<|end_header_id|>\n\n"
        );
    }

    #[test]
    fn chatml_render_format() {
        let messages = vec![
            ChatMessage::system("Be brief."),
            ChatMessage::user("Hi"),
        ];
        let mut buf = String::new();
        ChatTemplate::ChatMl.render(&messages, &mut buf);
        assert_eq!(
            buf,
            "<|im_start|>system\nBe brief.<|im_end|>\n\
             <|im_start|>user\nHi<|im_end|>\n\
             <|im_start|>assistant\n"
        );
    }

    #[test]
    fn render_always_appends_assistant_turn() {
        let mut buf = String::new();
        ChatTemplate::Llama3.render(&[], &mut buf);
        assert_eq!(buf, "<|start_header_id|>assistant<|end_header_id|>\n\n");
    }

    #[test]
    fn rendered_len_is_exact() {
        let messages = vec![
            ChatMessage::system("You are terse."),
            ChatMessage::user("Hello there"),
            ChatMessage::assistant("Hi."),
            ChatMessage::user("Bye"),
        ];
        for tpl in [ChatTemplate::Llama3, ChatTemplate::ChatMl] {
            let mut buf = String::new();
            tpl.render(&messages, &mut buf);
            assert_eq!(buf.len(), tpl.rendered_len(&messages));
        }
    }

    #[test]
    fn render_reuses_buffer_capacity() {
        let messages = vec![ChatMessage::user("a long-ish user message here")];
        let mut buf = String::new();
        ChatTemplate::Llama3.render(&messages, &mut buf);
        let cap = buf.capacity();

        ChatTemplate::Llama3.render(&[ChatMessage::user("x")], &mut buf);
        assert!(buf.capacity() >= cap, "shrinking the buffer defeats reuse");
    }

    #[test]
    fn validate_accepts_well_formed_messages() {
        let messages = vec![ChatMessage::system("s"), ChatMessage::user("u")];
        assert!(validate(&messages).is_ok());
    }

    #[test]
    fn validate_rejects_empty_role() {
        let messages = vec![ChatMessage {
            role: String::new(),
            content: "hi".into(),
        }];
        assert!(matches!(
            validate(&messages),
            Err(ConfabError::Input(_))
        ));
    }

    #[test]
    fn validate_rejects_empty_content() {
        let messages = vec![ChatMessage::user("")];
        assert!(matches!(
            validate(&messages),
            Err(ConfabError::Input(_))
        ));
    }
}
