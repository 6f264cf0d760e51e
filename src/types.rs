//! Identifiers and message shapes shared by every component
//!
//! These are the only chat-level types the synchronization core knows about.
//! Transport adapters translate their wire formats into and out of them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Chat user identifier (stable across chats)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Chat identifier (private chat, group, channel)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(pub i64);

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque handle to a message visible in a chat
///
/// Enough to delete or edit the message later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageHandle {
    pub chat_id: ChatId,
    pub message_id: i64,
}

impl MessageHandle {
    pub fn new(chat_id: ChatId, message_id: i64) -> Self {
        Self {
            chat_id,
            message_id,
        }
    }
}

/// What an inbound update carries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UpdateKind {
    Text {
        text: String,
    },
    Media {
        file_id: String,
        caption: Option<String>,
    },
    Callback {
        callback_id: String,
        data: String,
    },
}

/// One inbound event from the chat transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Update {
    pub user_id: UserId,
    pub chat_id: ChatId,
    /// Message the update arrived in, if the user produced a visible message
    pub message: Option<MessageHandle>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub language_code: Option<String>,
    pub kind: UpdateKind,
}

impl Update {
    pub fn text(&self) -> Option<&str> {
        match &self.kind {
            UpdateKind::Text { text } => Some(text),
            _ => None,
        }
    }

    pub fn callback_data(&self) -> Option<&str> {
        match &self.kind {
            UpdateKind::Callback { data, .. } => Some(data),
            _ => None,
        }
    }

    /// Leading `/command` of a text update, without arguments or `@botname`
    pub fn command(&self) -> Option<&str> {
        let text = self.text()?.trim();
        let word = text.strip_prefix('/')?.split_whitespace().next()?;
        Some(word.split('@').next().unwrap_or(word))
    }
}

/// Inline button attached to an outgoing message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Button {
    pub text: String,
    pub callback_data: String,
}

/// UI descriptor rendered by the transport (rows of inline buttons)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Markup {
    pub rows: Vec<Vec<Button>>,
}

impl Markup {
    pub fn single(text: impl Into<String>, callback_data: impl Into<String>) -> Self {
        Self {
            rows: vec![vec![Button {
                text: text.into(),
                callback_data: callback_data.into(),
            }]],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.iter().all(Vec::is_empty)
    }
}

/// Text formatting understood by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParseMode {
    #[serde(rename = "HTML")]
    Html,
    MarkdownV2,
}

/// Per-send options
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendOptions {
    pub markup: Option<Markup>,
    pub parse_mode: Option<ParseMode>,
}

impl SendOptions {
    pub fn with_markup(markup: Option<Markup>) -> Self {
        Self {
            markup,
            parse_mode: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_update(text: &str) -> Update {
        Update {
            user_id: UserId(1),
            chat_id: ChatId(1),
            message: Some(MessageHandle::new(ChatId(1), 10)),
            username: None,
            language_code: None,
            kind: UpdateKind::Text {
                text: text.to_string(),
            },
        }
    }

    #[test]
    fn test_command_parsing() {
        assert_eq!(text_update("/email").command(), Some("email"));
        assert_eq!(text_update("  /event now").command(), Some("event"));
        assert_eq!(text_update("/start@parley_bot").command(), Some("start"));
        assert_eq!(text_update("hello").command(), None);
        assert_eq!(text_update("/").command(), None);
    }

    #[test]
    fn test_update_kind_serde_tag() {
        let kind: UpdateKind =
            serde_json::from_str(r#"{"type":"callback","callback_id":"c1","data":"cancel"}"#)
                .unwrap();
        assert_eq!(
            kind,
            UpdateKind::Callback {
                callback_id: "c1".to_string(),
                data: "cancel".to_string()
            }
        );
    }

    #[test]
    fn test_markup_is_empty() {
        assert!(Markup::default().is_empty());
        assert!(!Markup::single("Back", "cancel").is_empty());
    }
}
