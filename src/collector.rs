//! Message collector
//!
//! Records the scratch messages of one conversation (prompts, warnings, the
//! user's own replies) so they can be removed together when the conversation
//! ends, leaving only its outcome in the chat.

use crate::transport::{Transport, TransportError};
use crate::types::{ChatId, MessageHandle, SendOptions};
use std::sync::Arc;

/// How [`MessageCollector::clear`] treats the ledger
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClearOptions {
    /// Keep deleting past failures instead of stopping at the first one
    pub ignore_errors: bool,
    /// Leave the most recent message visible
    pub exclude_last: bool,
}

/// Ledger of messages produced during one conversation, oldest first
pub struct MessageCollector {
    transport: Arc<dyn Transport>,
    ledger: Vec<MessageHandle>,
}

impl MessageCollector {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            ledger: Vec::new(),
        }
    }

    pub fn collect(&mut self, message: MessageHandle) {
        self.ledger.push(message);
    }

    /// Send a message and record it; a failed send records nothing
    pub async fn send_collected(
        &mut self,
        chat: ChatId,
        text: &str,
        options: &SendOptions,
    ) -> Result<MessageHandle, TransportError> {
        let handle = self.transport.send(chat, text, options).await?;
        self.ledger.push(handle);
        Ok(handle)
    }

    /// Delete collected messages in the order they appeared
    ///
    /// The ledger is empty afterwards regardless of the outcome. Without
    /// `ignore_errors`, the first failed deletion stops the pass and is
    /// returned; the remaining messages stay visible.
    pub async fn clear(&mut self, options: ClearOptions) -> Result<(), TransportError> {
        let mut pending = std::mem::take(&mut self.ledger);
        if options.exclude_last {
            pending.pop();
        }

        for message in pending {
            if let Err(e) = self.transport.delete(message).await {
                if !options.ignore_errors {
                    return Err(e);
                }
                tracing::warn!(
                    chat_id = %message.chat_id,
                    message_id = message.message_id,
                    error = %e,
                    "Failed to delete collected message"
                );
            }
        }

        Ok(())
    }

    pub fn messages(&self) -> &[MessageHandle] {
        &self.ledger
    }

    pub fn len(&self) -> usize {
        self.ledger.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ledger.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockTransport;
    use proptest::prelude::*;

    const CHAT: ChatId = ChatId(1);

    #[tokio::test]
    async fn test_clear_excluding_last() {
        let transport = Arc::new(MockTransport::new());
        let mut collector = MessageCollector::new(transport.clone());

        let m1 = transport.post_user_message(CHAT, "one");
        let m2 = transport.post_user_message(CHAT, "two");
        collector.collect(m1);
        collector.collect(m2);

        collector
            .clear(ClearOptions {
                ignore_errors: false,
                exclude_last: true,
            })
            .await
            .unwrap();

        assert_eq!(transport.deleted(), vec![m1]);
        assert_eq!(transport.visible_texts(CHAT), vec!["two"]);
        assert!(collector.is_empty());
    }

    #[tokio::test]
    async fn test_send_collected_records_on_success_only() {
        let transport = Arc::new(MockTransport::new());
        let mut collector = MessageCollector::new(transport.clone());

        let handle = collector
            .send_collected(CHAT, "prompt", &SendOptions::default())
            .await
            .unwrap();
        assert_eq!(collector.messages(), &[handle]);

        transport.set_fail_sends(true);
        let result = collector
            .send_collected(CHAT, "lost", &SendOptions::default())
            .await;
        assert!(result.is_err());
        assert_eq!(collector.len(), 1);
    }

    #[tokio::test]
    async fn test_first_failure_aborts_clear() {
        let transport = Arc::new(MockTransport::new());
        let mut collector = MessageCollector::new(transport.clone());

        let m1 = transport.post_user_message(CHAT, "one");
        let m2 = transport.post_user_message(CHAT, "two");
        let m3 = transport.post_user_message(CHAT, "three");
        for m in [m1, m2, m3] {
            collector.collect(m);
        }
        transport.fail_delete(m2);

        let result = collector.clear(ClearOptions::default()).await;

        assert!(result.is_err());
        assert_eq!(transport.deleted(), vec![m1]);
        assert_eq!(transport.visible_texts(CHAT), vec!["two", "three"]);
        assert!(collector.is_empty());
    }

    #[tokio::test]
    async fn test_ignore_errors_deletes_the_rest() {
        let transport = Arc::new(MockTransport::new());
        let mut collector = MessageCollector::new(transport.clone());

        let m1 = transport.post_user_message(CHAT, "one");
        let m2 = transport.post_user_message(CHAT, "two");
        let m3 = transport.post_user_message(CHAT, "three");
        for m in [m1, m2, m3] {
            collector.collect(m);
        }
        transport.fail_delete(m2);

        collector
            .clear(ClearOptions {
                ignore_errors: true,
                exclude_last: false,
            })
            .await
            .unwrap();

        assert_eq!(transport.deleted(), vec![m1, m3]);
        assert_eq!(transport.visible_texts(CHAT), vec!["two"]);
    }

    #[tokio::test]
    async fn test_clear_empty_ledger() {
        let transport = Arc::new(MockTransport::new());
        let mut collector = MessageCollector::new(transport.clone());

        collector
            .clear(ClearOptions {
                ignore_errors: false,
                exclude_last: true,
            })
            .await
            .unwrap();
        assert!(transport.deleted().is_empty());
    }

    proptest! {
        #[test]
        fn test_clear_deletes_in_order(count in 0usize..20, exclude_last: bool) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();

            runtime.block_on(async {
                let transport = Arc::new(MockTransport::new());
                let mut collector = MessageCollector::new(transport.clone());
                let handles: Vec<_> = (0..count)
                    .map(|i| transport.post_user_message(CHAT, &format!("m{i}")))
                    .collect();
                for handle in &handles {
                    collector.collect(*handle);
                }

                collector
                    .clear(ClearOptions { ignore_errors: false, exclude_last })
                    .await
                    .unwrap();

                let kept = usize::from(exclude_last && count > 0);
                let expected: Vec<_> = handles[..count - kept].to_vec();
                assert_eq!(transport.deleted(), expected);
                assert_eq!(transport.visible_texts(CHAT).len(), kept);
                assert!(collector.is_empty());
            });
        }
    }
}
