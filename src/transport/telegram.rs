//! Telegram Bot API transport
//!
//! Outbound calls (`sendMessage`, `deleteMessage`, `editMessageText`) plus the
//! webhook update format, translated into [`crate::types::Update`].

use super::{Transport, TransportError};
use crate::types::{ChatId, Markup, MessageHandle, SendOptions, Update, UpdateKind, UserId};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Telegram Bot API client
pub struct TelegramTransport {
    client: Client,
    base_url: String,
}

impl TelegramTransport {
    pub fn new(api_base: &str, token: &str) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| TransportError::network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: format!("{}/bot{}", api_base.trim_end_matches('/'), token),
        })
    }

    async fn call<B, R>(&self, method: &str, body: &B) -> Result<R, TransportError>
    where
        B: Serialize + Sync + ?Sized,
        R: for<'de> Deserialize<'de>,
    {
        let response = self
            .client
            .post(format!("{}/{}", self.base_url, method))
            .json(body)
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| {
                TransportError::network(format!("Failed to read response: {}", e.without_url()))
            })?;

        let envelope: ApiResponse<R> = serde_json::from_str(&body).map_err(|e| {
            TransportError::decode(format!("Failed to parse {method} response ({status}): {e}"))
        })?;

        match envelope {
            ApiResponse {
                ok: true,
                result: Some(result),
                ..
            } => Ok(result),
            ApiResponse { description, .. } => Err(classify_error(
                method,
                description.as_deref().unwrap_or("no description"),
            )),
        }
    }
}

/// The request URL carries the bot token, so it never reaches the message
fn request_error(e: reqwest::Error) -> TransportError {
    let kind = if e.is_timeout() {
        "Request timeout"
    } else if e.is_connect() {
        "Connection failed"
    } else {
        "Request failed"
    };
    TransportError::network(format!("{kind}: {}", e.without_url()))
}

fn classify_error(method: &str, description: &str) -> TransportError {
    let lowered = description.to_lowercase();
    if lowered.contains("not found") || lowered.contains("can't be deleted") {
        TransportError::not_found(format!("{method}: {description}"))
    } else {
        TransportError::api(format!("{method}: {description}"))
    }
}

#[async_trait]
impl Transport for TelegramTransport {
    async fn send(
        &self,
        chat: ChatId,
        text: &str,
        options: &SendOptions,
    ) -> Result<MessageHandle, TransportError> {
        let sent: TgMessage = self
            .call(
                "sendMessage",
                &SendMessageRequest {
                    chat_id: chat.0,
                    text,
                    parse_mode: options.parse_mode,
                    reply_markup: options.markup.as_ref().map(ReplyMarkup::from),
                },
            )
            .await?;
        Ok(MessageHandle::new(ChatId(sent.chat.id), sent.message_id))
    }

    async fn delete(&self, message: MessageHandle) -> Result<(), TransportError> {
        let _: bool = self
            .call(
                "deleteMessage",
                &MessageRef {
                    chat_id: message.chat_id.0,
                    message_id: message.message_id,
                },
            )
            .await?;
        Ok(())
    }

    async fn edit(
        &self,
        message: MessageHandle,
        text: &str,
        options: &SendOptions,
    ) -> Result<(), TransportError> {
        // Returns the edited message (or `true` for inline messages); only success matters
        let _: serde_json::Value = self
            .call(
                "editMessageText",
                &EditMessageRequest {
                    chat_id: message.chat_id.0,
                    message_id: message.message_id,
                    text,
                    parse_mode: options.parse_mode,
                    reply_markup: options.markup.as_ref().map(ReplyMarkup::from),
                },
            )
            .await?;
        Ok(())
    }

    async fn acknowledge(&self, callback_id: &str) -> Result<(), TransportError> {
        let _: bool = self
            .call(
                "answerCallbackQuery",
                &AnswerCallbackRequest {
                    callback_query_id: callback_id,
                },
            )
            .await?;
        Ok(())
    }
}

// ============================================================================
// Bot API request types
// ============================================================================

#[derive(Debug, Deserialize)]
struct ApiResponse<R> {
    ok: bool,
    result: Option<R>,
    description: Option<String>,
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: i64,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<crate::types::ParseMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<ReplyMarkup>,
}

#[derive(Debug, Serialize)]
struct EditMessageRequest<'a> {
    chat_id: i64,
    message_id: i64,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<crate::types::ParseMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<ReplyMarkup>,
}

#[derive(Debug, Serialize)]
struct MessageRef {
    chat_id: i64,
    message_id: i64,
}

#[derive(Debug, Serialize)]
struct AnswerCallbackRequest<'a> {
    callback_query_id: &'a str,
}

#[derive(Debug, Serialize)]
struct ReplyMarkup {
    inline_keyboard: Vec<Vec<InlineButton>>,
}

#[derive(Debug, Serialize)]
struct InlineButton {
    text: String,
    callback_data: String,
}

impl From<&Markup> for ReplyMarkup {
    fn from(markup: &Markup) -> Self {
        Self {
            inline_keyboard: markup
                .rows
                .iter()
                .map(|row| {
                    row.iter()
                        .map(|button| InlineButton {
                            text: button.text.clone(),
                            callback_data: button.callback_data.clone(),
                        })
                        .collect()
                })
                .collect(),
        }
    }
}

// ============================================================================
// Webhook update types
// ============================================================================

/// Update as posted by Telegram to the webhook
#[derive(Debug, Clone, Deserialize)]
pub struct TgUpdate {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<TgMessage>,
    #[serde(default)]
    pub callback_query: Option<TgCallbackQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TgMessage {
    pub message_id: i64,
    pub chat: TgChat,
    #[serde(default)]
    pub from: Option<TgUser>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub photo: Option<Vec<TgFile>>,
    #[serde(default)]
    pub document: Option<TgFile>,
    #[serde(default)]
    pub video: Option<TgFile>,
    #[serde(default)]
    pub voice: Option<TgFile>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TgChat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TgUser {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub language_code: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TgFile {
    pub file_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TgCallbackQuery {
    pub id: String,
    pub from: TgUser,
    #[serde(default)]
    pub message: Option<TgMessage>,
    #[serde(default)]
    pub data: Option<String>,
}

impl TgMessage {
    fn media_file(&self) -> Option<&TgFile> {
        // Photos come in several sizes, largest last
        self.photo
            .as_ref()
            .and_then(|sizes| sizes.last())
            .or(self.document.as_ref())
            .or(self.video.as_ref())
            .or(self.voice.as_ref())
    }
}

impl TgUpdate {
    /// Translate into the transport-neutral update, if it is one we handle
    pub fn into_update(self) -> Option<Update> {
        if let Some(message) = self.message {
            let from = message.from.clone()?;
            let kind = if let Some(text) = message.text.clone() {
                UpdateKind::Text { text }
            } else {
                let file = message.media_file()?;
                UpdateKind::Media {
                    file_id: file.file_id.clone(),
                    caption: message.caption.clone(),
                }
            };
            return Some(Update {
                user_id: UserId(from.id),
                chat_id: ChatId(message.chat.id),
                message: Some(MessageHandle::new(ChatId(message.chat.id), message.message_id)),
                username: from.username,
                language_code: from.language_code,
                kind,
            });
        }

        let query = self.callback_query?;
        // Callbacks without an originating message fall back to the private chat
        let chat_id = query
            .message
            .as_ref()
            .map_or(ChatId(query.from.id), |m| ChatId(m.chat.id));
        Some(Update {
            user_id: UserId(query.from.id),
            chat_id,
            message: None,
            username: query.from.username,
            language_code: query.from.language_code,
            kind: UpdateKind::Callback {
                callback_id: query.id,
                data: query.data.unwrap_or_default(),
            },
        })
    }
}
