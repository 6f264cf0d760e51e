//! Wait-state gate consulted by the dispatcher

use crate::store::WaitStateStore;
use crate::types::UserId;
use std::sync::Arc;

/// Answers "should this user's next update go to a waiting flow?"
///
/// Reads the durable wait marker rather than in-process state, so the answer
/// survives restarts and self-expires with the marker TTL. Any storage error
/// reads as "not awaiting": an unreachable store disables conversational
/// routing instead of swallowing every message.
#[derive(Clone)]
pub struct WaitGate {
    markers: Arc<dyn WaitStateStore>,
}

impl WaitGate {
    pub fn new(markers: Arc<dyn WaitStateStore>) -> Self {
        Self { markers }
    }

    pub async fn is_awaiting(&self, user: UserId) -> bool {
        match self.markers.has_marker(user).await {
            Ok(marked) => marked,
            Err(e) => {
                tracing::warn!(user_id = %user, error = %e, "Wait marker lookup failed, treating user as not awaited");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::InMemoryWaitStore;
    use std::time::Duration;

    #[tokio::test]
    async fn test_reports_marker_presence() {
        let markers = Arc::new(InMemoryWaitStore::new());
        let gate = WaitGate::new(markers.clone());

        assert!(!gate.is_awaiting(UserId(1)).await);
        markers
            .set_marker(UserId(1), "t", Duration::from_secs(60))
            .await
            .unwrap();
        assert!(gate.is_awaiting(UserId(1)).await);
        assert!(!gate.is_awaiting(UserId(2)).await);
    }

    #[tokio::test]
    async fn test_expired_marker_is_not_awaiting() {
        let markers = Arc::new(InMemoryWaitStore::new());
        let gate = WaitGate::new(markers.clone());

        markers
            .set_marker(UserId(1), "t", Duration::from_millis(10))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!gate.is_awaiting(UserId(1)).await);
    }

    #[tokio::test]
    async fn test_fails_open_when_store_is_down() {
        let markers = Arc::new(InMemoryWaitStore::new());
        let gate = WaitGate::new(markers.clone());

        markers
            .set_marker(UserId(1), "t", Duration::from_secs(60))
            .await
            .unwrap();
        markers.set_unavailable(true);
        assert!(!gate.is_awaiting(UserId(1)).await);
    }
}
