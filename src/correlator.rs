//! Input correlator
//!
//! Pairs updates arriving on the dispatcher side with the flow that is
//! blocked waiting for them. A flow first [registers](InputCorrelator::register)
//! for a user, which claims an admission slot, adds a per-user table entry
//! and writes the durable wait marker. Only then does it show the user a
//! prompt. The registration stays in place across every round of the
//! conversation, so a reply can never arrive while the user looks unawaited.
//!
//! Each round is a one-shot channel. Whoever takes the round's sender owns
//! its resolution, so every round resolves exactly once. A reply that
//! lands before the flow starts waiting is held in the channel.
//!
//! A second registration for a user with a live one cancels the first and
//! takes over its slot.

mod admission;

pub use admission::{AdmissionController, AdmissionPermit};

use crate::store::{StoreError, WaitStateStore};
use crate::types::{Update, UserId};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// How a wait ended when it did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputOutcome {
    /// The user replied
    Delivered(Update),
    /// The user backed out, or a newer request replaced this one
    Canceled,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InputError {
    #[error("too many conversations are waiting for input")]
    TooManyConcurrent,
    #[error("no reply within {0:?}")]
    Timeout(Duration),
    #[error("wait aborted by caller")]
    Aborted,
    #[error(transparent)]
    StorageUnavailable(#[from] StoreError),
}

/// Correlator settings
#[derive(Debug, Clone)]
pub struct CorrelatorConfig {
    /// Upper bound on simultaneously outstanding waits
    pub max_concurrent: usize,
    /// How long a marker outlives a wait that was never released
    pub marker_ttl: Duration,
}

impl Default for CorrelatorConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 1024,
            marker_ttl: Duration::from_secs(15 * 60),
        }
    }
}

enum Resolution {
    Delivered(Update),
    Canceled,
}

impl From<Resolution> for InputOutcome {
    fn from(resolution: Resolution) -> Self {
        match resolution {
            Resolution::Delivered(update) => InputOutcome::Delivered(update),
            Resolution::Canceled => InputOutcome::Canceled,
        }
    }
}

struct PendingWait {
    token: String,
    /// Sender of the open round; `None` once the round is resolved
    resolve: Option<oneshot::Sender<Resolution>>,
    slot: AdmissionPermit,
}

type WaitTable = DashMap<UserId, PendingWait>;

/// Registry of blocked flows keyed by the user they wait on
pub struct InputCorrelator {
    waits: Arc<WaitTable>,
    admission: AdmissionController,
    markers: Arc<dyn WaitStateStore>,
    marker_ttl: Duration,
}

impl InputCorrelator {
    pub fn new(config: &CorrelatorConfig, markers: Arc<dyn WaitStateStore>) -> Self {
        Self {
            waits: Arc::new(DashMap::new()),
            admission: AdmissionController::new(config.max_concurrent),
            markers,
            marker_ttl: config.marker_ttl,
        }
    }

    /// Start awaiting `user` and open the first round
    ///
    /// Returns once the wait marker is written, so the caller may prompt the
    /// user right away. `timeout` is the longest single round the caller
    /// intends to wait; it sizes the marker lifetime.
    pub async fn register(
        &self,
        user: UserId,
        timeout: Duration,
    ) -> Result<PendingInput, InputError> {
        // A replaced wait hands its slot over, so re-asking never needs a new one
        let slot = match self.waits.remove(&user) {
            Some((_, previous)) => {
                tracing::debug!(user_id = %user, "Replacing live wait, previous wait canceled");
                if let Some(resolve) = previous.resolve {
                    let _ = resolve.send(Resolution::Canceled);
                }
                previous.slot
            }
            None => {
                let Some(slot) = self.admission.try_admit() else {
                    tracing::warn!(
                        user_id = %user,
                        capacity = self.admission.capacity(),
                        "Rejecting wait, admission limit reached"
                    );
                    return Err(InputError::TooManyConcurrent);
                };
                slot
            }
        };

        let token = uuid::Uuid::new_v4().to_string();
        let (resolve, round) = oneshot::channel();

        // Lost a same-user registration race: the other one is replaced
        if let Some(PendingWait {
            resolve: Some(previous),
            ..
        }) = self.waits.insert(
            user,
            PendingWait {
                token: token.clone(),
                resolve: Some(resolve),
                slot,
            },
        ) {
            let _ = previous.send(Resolution::Canceled);
        }

        let mut pending = PendingInput {
            waits: self.waits.clone(),
            markers: self.markers.clone(),
            user,
            token,
            marker_lifetime: self.marker_lifetime(timeout),
            round: Some(round),
            armed: true,
        };

        if let Err(e) = pending.write_marker().await {
            pending.unregister();
            pending.armed = false;
            return Err(e);
        }

        tracing::debug!(user_id = %user, timeout_ms = timeout.as_millis(), "Registered wait");
        Ok(pending)
    }

    /// Block the calling task until `user` replies, cancels, or the wait ends
    ///
    /// A single-round [`register`](Self::register), wait and release.
    /// `timeout` of zero waits indefinitely. Cancelling `cancel` ends the
    /// wait with [`InputError::Aborted`].
    pub async fn request_input(
        &self,
        user: UserId,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<InputOutcome, InputError> {
        let mut pending = self.register(user, timeout).await?;
        let result = pending.wait(timeout, cancel).await;
        pending.release().await;
        result
    }

    /// Hand an update to the flow waiting on `user`
    ///
    /// Returns `false` when no round is open (never requested, already
    /// resolved, or abandoned); the update is then left to the caller.
    pub fn deliver(&self, user: UserId, update: Update) -> bool {
        match self.take_round(user) {
            Some(resolve) => resolve.send(Resolution::Delivered(update)).is_ok(),
            None => {
                tracing::debug!(user_id = %user, "No open round, delivery discarded");
                false
            }
        }
    }

    /// Resolve the open round for `user` as canceled
    pub fn cancel(&self, user: UserId) -> bool {
        self.take_round(user)
            .is_some_and(|resolve| resolve.send(Resolution::Canceled).is_ok())
    }

    fn take_round(&self, user: UserId) -> Option<oneshot::Sender<Resolution>> {
        self.waits.get_mut(&user)?.resolve.take()
    }

    /// Whether a flow has an open round for `user`
    pub fn is_pending(&self, user: UserId) -> bool {
        self.waits
            .get(&user)
            .is_some_and(|wait| wait.resolve.is_some())
    }

    /// Number of registered waits
    pub fn pending_count(&self) -> usize {
        self.waits.len()
    }

    pub fn admission(&self) -> &AdmissionController {
        &self.admission
    }

    /// A bounded wait keeps its marker for its whole duration plus the
    /// marker TTL; an unbounded one relies on the TTL alone.
    fn marker_lifetime(&self, timeout: Duration) -> Duration {
        if timeout.is_zero() {
            self.marker_ttl
        } else {
            timeout.saturating_add(self.marker_ttl)
        }
    }
}

async fn sleep_unless_zero(timeout: Duration) {
    if timeout.is_zero() {
        std::future::pending::<()>().await;
    } else {
        tokio::time::sleep(timeout).await;
    }
}

/// A registered wait: table entry, marker and admission slot
///
/// Dropping it without [`release`](Self::release) (the waiting future was
/// dropped) still removes the table entry and releases the marker in the
/// background.
pub struct PendingInput {
    waits: Arc<WaitTable>,
    markers: Arc<dyn WaitStateStore>,
    user: UserId,
    token: String,
    marker_lifetime: Duration,
    round: Option<oneshot::Receiver<Resolution>>,
    armed: bool,
}

impl PendingInput {
    pub fn user(&self) -> UserId {
        self.user
    }

    /// Open the next round before showing the user another prompt
    ///
    /// A round that is still open (possibly holding an early reply) is kept.
    /// The marker is refreshed while still in place, so the user never
    /// looks unawaited.
    pub async fn rearm(&mut self) -> Result<(), InputError> {
        if self.round.is_some() {
            return Ok(());
        }

        let (resolve, round) = oneshot::channel();
        self.round = Some(round);
        match self.waits.get_mut(&self.user) {
            Some(mut wait) if wait.token == self.token => wait.resolve = Some(resolve),
            // Replaced by a newer registration; the next wait reports it
            _ => {
                let _ = resolve.send(Resolution::Canceled);
                return Ok(());
            }
        }

        self.write_marker().await
    }

    /// Wait for the open round to resolve, opening one if needed
    pub async fn wait(
        &mut self,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<InputOutcome, InputError> {
        self.rearm().await?;
        let Some(mut round) = self.round.take() else {
            return Ok(InputOutcome::Canceled);
        };

        let result = tokio::select! {
            biased;
            resolution = &mut round => Ok(resolution.map_or(InputOutcome::Canceled, InputOutcome::from)),
            () = cancel.cancelled() => Err(InputError::Aborted),
            () = sleep_unless_zero(timeout) => Err(InputError::Timeout(timeout)),
        };

        let result = match result {
            Err(_) if !self.close_round() => {
                // A resolver already claimed this round; its value is in flight.
                Ok(round
                    .await
                    .map_or(InputOutcome::Canceled, InputOutcome::from))
            }
            other => other,
        };

        match &result {
            Ok(InputOutcome::Delivered(_)) => {
                tracing::debug!(user_id = %self.user, "Wait resolved with input");
            }
            Ok(InputOutcome::Canceled) => tracing::debug!(user_id = %self.user, "Wait canceled"),
            Err(e) => tracing::debug!(user_id = %self.user, error = %e, "Wait ended without input"),
        }

        result
    }

    /// Drop the table entry, the admission slot and the marker
    pub async fn release(mut self) {
        self.armed = false;
        self.unregister();
        if let Err(e) = self.markers.release_marker(self.user, &self.token).await {
            tracing::warn!(user_id = %self.user, error = %e, "Failed to release wait marker, leaving it to expire");
        }
    }

    async fn write_marker(&self) -> Result<(), InputError> {
        self.markers
            .set_marker(self.user, &self.token, self.marker_lifetime)
            .await
            .map_err(|e| {
                tracing::error!(user_id = %self.user, error = %e, "Failed to write wait marker");
                InputError::StorageUnavailable(e)
            })
    }

    /// Take our own round's sender; `false` if someone else already took it
    fn close_round(&self) -> bool {
        match self.waits.get_mut(&self.user) {
            Some(mut wait) if wait.token == self.token => wait.resolve.take().is_some(),
            _ => false,
        }
    }

    /// Remove our own table entry
    fn unregister(&self) -> bool {
        self.waits
            .remove_if(&self.user, |_, wait| wait.token == self.token)
            .is_some()
    }
}

impl Drop for PendingInput {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.unregister();
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let markers = self.markers.clone();
            let user = self.user;
            let token = std::mem::take(&mut self.token);
            handle.spawn(async move {
                if let Err(e) = markers.release_marker(user, &token).await {
                    tracing::warn!(user_id = %user, error = %e, "Failed to release abandoned wait marker");
                }
            });
        }
    }
}
