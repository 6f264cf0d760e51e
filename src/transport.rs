//! Outbound chat transport
//!
//! The synchronization core sends, edits and deletes messages only through
//! [`Transport`]; the Telegram Bot API client lives in [`telegram`].

pub mod telegram;

use crate::types::{ChatId, MessageHandle, SendOptions};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Transport error with classification
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Network, message)
    }

    pub fn api(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Api, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::NotFound, message)
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Decode, message)
    }
}

/// Error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Connection failures and timeouts
    Network,
    /// The chat API rejected the request
    Api,
    /// The message no longer exists (already deleted, too old)
    NotFound,
    /// Response could not be parsed
    Decode,
}

/// Sends, edits and deletes chat messages
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        chat: ChatId,
        text: &str,
        options: &SendOptions,
    ) -> Result<MessageHandle, TransportError>;

    async fn delete(&self, message: MessageHandle) -> Result<(), TransportError>;

    async fn edit(
        &self,
        message: MessageHandle,
        text: &str,
        options: &SendOptions,
    ) -> Result<(), TransportError>;

    /// Acknowledge a button press so the client stops its loading indicator
    async fn acknowledge(&self, _callback_id: &str) -> Result<(), TransportError> {
        Ok(())
    }
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send(
        &self,
        chat: ChatId,
        text: &str,
        options: &SendOptions,
    ) -> Result<MessageHandle, TransportError> {
        (**self).send(chat, text, options).await
    }

    async fn delete(&self, message: MessageHandle) -> Result<(), TransportError> {
        (**self).delete(message).await
    }

    async fn edit(
        &self,
        message: MessageHandle,
        text: &str,
        options: &SendOptions,
    ) -> Result<(), TransportError> {
        (**self).edit(message, text, options).await
    }

    async fn acknowledge(&self, callback_id: &str) -> Result<(), TransportError> {
        (**self).acknowledge(callback_id).await
    }
}
