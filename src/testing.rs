//! Mock implementations for testing
//!
//! These mocks stand in for the chat transport and the durable stores so the
//! correlator, collector and flows can be exercised without real I/O.

use crate::store::{SessionEntry, SessionNamespace, SessionStore, StoreError, StoreResult, WaitStateStore};
use crate::transport::{Transport, TransportError};
use crate::types::{ChatId, MessageHandle, SendOptions, Update, UpdateKind, UserId};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

// ============================================================================
// Update builders
// ============================================================================

/// Text update in the user's private chat, without a visible message
pub fn text_update(user: UserId, text: &str) -> Update {
    Update {
        user_id: user,
        chat_id: ChatId(user.0),
        message: None,
        username: None,
        language_code: None,
        kind: UpdateKind::Text {
            text: text.to_string(),
        },
    }
}

/// Inline button press in the user's private chat
pub fn callback_update(user: UserId, data: &str) -> Update {
    Update {
        user_id: user,
        chat_id: ChatId(user.0),
        message: None,
        username: None,
        language_code: None,
        kind: UpdateKind::Callback {
            callback_id: format!("cb-{}", user.0),
            data: data.to_string(),
        },
    }
}

// ============================================================================
// Mock Transport
// ============================================================================

/// Message as seen by the mock chat
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub handle: MessageHandle,
    pub text: String,
    pub options: SendOptions,
    pub from_user: bool,
}

/// In-memory chat that tracks what is currently visible
pub struct MockTransport {
    next_message_id: AtomicI64,
    visible: Mutex<Vec<ChatMessage>>,
    sent: Mutex<Vec<ChatMessage>>,
    deleted: Mutex<Vec<MessageHandle>>,
    failing_deletes: Mutex<HashSet<MessageHandle>>,
    fail_sends: AtomicBool,
    acknowledged: Mutex<Vec<String>>,
}

#[allow(dead_code)]
impl MockTransport {
    pub fn new() -> Self {
        Self {
            next_message_id: AtomicI64::new(1),
            visible: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            deleted: Mutex::new(Vec::new()),
            failing_deletes: Mutex::new(HashSet::new()),
            fail_sends: AtomicBool::new(false),
            acknowledged: Mutex::new(Vec::new()),
        }
    }

    fn next_handle(&self, chat: ChatId) -> MessageHandle {
        MessageHandle::new(chat, self.next_message_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Simulate the user posting a message in `chat`
    pub fn post_user_message(&self, chat: ChatId, text: &str) -> MessageHandle {
        let handle = self.next_handle(chat);
        self.visible.lock().unwrap().push(ChatMessage {
            handle,
            text: text.to_string(),
            options: SendOptions::default(),
            from_user: true,
        });
        handle
    }

    /// Simulate the user posting text; returns the matching update
    pub fn user_says(&self, user: UserId, text: &str) -> Update {
        let chat = ChatId(user.0);
        let handle = self.post_user_message(chat, text);
        Update {
            message: Some(handle),
            ..text_update(user, text)
        }
    }

    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn fail_delete(&self, message: MessageHandle) {
        self.failing_deletes.lock().unwrap().insert(message);
    }

    /// Texts currently visible in `chat`, oldest first
    pub fn visible_texts(&self, chat: ChatId) -> Vec<String> {
        self.visible
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.handle.chat_id == chat)
            .map(|m| m.text.clone())
            .collect()
    }

    /// Every message the bot sent, including deleted ones
    pub fn sent(&self) -> Vec<ChatMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_texts(&self) -> Vec<String> {
        self.sent().into_iter().map(|m| m.text).collect()
    }

    pub fn deleted(&self) -> Vec<MessageHandle> {
        self.deleted.lock().unwrap().clone()
    }

    pub fn acknowledged(&self) -> Vec<String> {
        self.acknowledged.lock().unwrap().clone()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(
        &self,
        chat: ChatId,
        text: &str,
        options: &SendOptions,
    ) -> Result<MessageHandle, TransportError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::network("mock send failure"));
        }
        let message = ChatMessage {
            handle: self.next_handle(chat),
            text: text.to_string(),
            options: options.clone(),
            from_user: false,
        };
        self.sent.lock().unwrap().push(message.clone());
        self.visible.lock().unwrap().push(message.clone());
        Ok(message.handle)
    }

    async fn delete(&self, message: MessageHandle) -> Result<(), TransportError> {
        if self.failing_deletes.lock().unwrap().contains(&message) {
            return Err(TransportError::api("mock delete failure"));
        }
        let mut visible = self.visible.lock().unwrap();
        let Some(index) = visible.iter().position(|m| m.handle == message) else {
            return Err(TransportError::not_found("message to delete not found"));
        };
        visible.remove(index);
        self.deleted.lock().unwrap().push(message);
        Ok(())
    }

    async fn edit(
        &self,
        message: MessageHandle,
        text: &str,
        options: &SendOptions,
    ) -> Result<(), TransportError> {
        let mut visible = self.visible.lock().unwrap();
        let Some(existing) = visible.iter_mut().find(|m| m.handle == message) else {
            return Err(TransportError::not_found("message to edit not found"));
        };
        existing.text = text.to_string();
        existing.options = options.clone();
        Ok(())
    }

    async fn acknowledge(&self, callback_id: &str) -> Result<(), TransportError> {
        self.acknowledged.lock().unwrap().push(callback_id.to_string());
        Ok(())
    }
}

// ============================================================================
// In-Memory Wait Store
// ============================================================================

/// Wait markers in a map; can be switched to fail every call
pub struct InMemoryWaitStore {
    markers: Mutex<HashMap<UserId, (String, Instant)>>,
    unavailable: AtomicBool,
    write_delay: Mutex<Duration>,
}

#[allow(dead_code)]
impl InMemoryWaitStore {
    pub fn new() -> Self {
        Self {
            markers: Mutex::new(HashMap::new()),
            unavailable: AtomicBool::new(false),
            write_delay: Mutex::new(Duration::ZERO),
        }
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make every `set_marker` take at least `delay`, like a slow database
    pub fn set_write_delay(&self, delay: Duration) {
        *self.write_delay.lock().unwrap() = delay;
    }

    /// Token of the unexpired marker for `user`
    pub fn token(&self, user: UserId) -> Option<String> {
        self.markers
            .lock()
            .unwrap()
            .get(&user)
            .filter(|(_, expires_at)| *expires_at > Instant::now())
            .map(|(token, _)| token.clone())
    }

    pub fn is_marked(&self, user: UserId) -> bool {
        self.token(user).is_some()
    }

    fn check(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("mock store offline".to_string()))
        } else {
            Ok(())
        }
    }
}

impl Default for InMemoryWaitStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WaitStateStore for InMemoryWaitStore {
    async fn set_marker(&self, user: UserId, token: &str, ttl: Duration) -> StoreResult<()> {
        self.check()?;
        let delay = *self.write_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.markers
            .lock()
            .unwrap()
            .insert(user, (token.to_string(), Instant::now() + ttl));
        Ok(())
    }

    async fn has_marker(&self, user: UserId) -> StoreResult<bool> {
        self.check()?;
        Ok(self.is_marked(user))
    }

    async fn release_marker(&self, user: UserId, token: &str) -> StoreResult<()> {
        self.check()?;
        let mut markers = self.markers.lock().unwrap();
        if markers.get(&user).is_some_and(|(current, _)| current == token) {
            markers.remove(&user);
        }
        Ok(())
    }
}

// ============================================================================
// In-Memory Session Store
// ============================================================================

/// Session entries in a map, honoring namespace TTLs
#[derive(Default)]
pub struct InMemorySessionStore {
    entries: Mutex<HashMap<(&'static str, UserId), (SessionEntry, Instant)>>,
}

#[allow(dead_code)]
impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn put(
        &self,
        namespace: SessionNamespace,
        user: UserId,
        entry: SessionEntry,
    ) -> StoreResult<()> {
        self.entries
            .lock()
            .unwrap()
            .insert((namespace.name, user), (entry, Instant::now() + namespace.ttl));
        Ok(())
    }

    async fn get(
        &self,
        namespace: SessionNamespace,
        user: UserId,
    ) -> StoreResult<Option<SessionEntry>> {
        Ok(self
            .entries
            .lock()
            .unwrap()
            .get(&(namespace.name, user))
            .filter(|(_, expires_at)| *expires_at > Instant::now())
            .map(|(entry, _)| entry.clone()))
    }

    async fn remove(&self, namespace: SessionNamespace, user: UserId) -> StoreResult<bool> {
        Ok(self
            .entries
            .lock()
            .unwrap()
            .remove(&(namespace.name, user))
            .is_some())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_transport_transcript() {
        let transport = MockTransport::new();
        let chat = ChatId(1);

        let user_msg = transport.post_user_message(chat, "hi");
        let bot_msg = transport
            .send(chat, "hello", &SendOptions::default())
            .await
            .unwrap();
        assert_eq!(transport.visible_texts(chat), vec!["hi", "hello"]);

        transport
            .edit(bot_msg, "hello again", &SendOptions::default())
            .await
            .unwrap();
        transport.delete(user_msg).await.unwrap();
        assert_eq!(transport.visible_texts(chat), vec!["hello again"]);

        // Deleting twice reports the message as gone
        let err = transport.delete(user_msg).await.unwrap_err();
        assert_eq!(err.kind, crate::transport::TransportErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_in_memory_wait_store_token_match() {
        let store = InMemoryWaitStore::new();
        store
            .set_marker(UserId(1), "a", Duration::from_secs(10))
            .await
            .unwrap();
        store.release_marker(UserId(1), "b").await.unwrap();
        assert_eq!(store.token(UserId(1)).as_deref(), Some("a"));
        store.release_marker(UserId(1), "a").await.unwrap();
        assert!(!store.is_marked(UserId(1)));
    }

    #[tokio::test]
    async fn test_in_memory_session_store() {
        let store = InMemorySessionStore::new();
        store
            .put(
                SessionNamespace::EVENT_DRAFT,
                UserId(1),
                SessionEntry::new("draft"),
            )
            .await
            .unwrap();
        assert!(store
            .get(SessionNamespace::EMAIL_CONFIRMATION, UserId(1))
            .await
            .unwrap()
            .is_none());
        let taken = store
            .take(SessionNamespace::EVENT_DRAFT, UserId(1))
            .await
            .unwrap();
        assert_eq!(taken, Some(SessionEntry::new("draft")));
    }
}
