//! Routing of inbound updates to waiting flows

use crate::correlator::InputCorrelator;
use crate::gate::WaitGate;
use crate::i18n::CANCEL_ACTION;
use crate::types::Update;
use std::sync::Arc;

/// Where an update ended up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Handed to the flow waiting on this user
    Delivered,
    /// The user pressed the cancel button of a waiting flow
    Canceled,
    /// Nobody is waiting; the caller handles the update normally
    Unhandled(Update),
}

/// Gate and correlator glue, consulted before normal command handling
#[derive(Clone)]
pub struct UpdateRouter {
    gate: WaitGate,
    correlator: Arc<InputCorrelator>,
}

impl UpdateRouter {
    pub fn new(gate: WaitGate, correlator: Arc<InputCorrelator>) -> Self {
        Self { gate, correlator }
    }

    pub async fn route(&self, update: Update) -> RouteOutcome {
        let user = update.user_id;
        if !self.gate.is_awaiting(user).await {
            return RouteOutcome::Unhandled(update);
        }

        if update.callback_data() == Some(CANCEL_ACTION) {
            if self.correlator.cancel(user) {
                tracing::debug!(user_id = %user, "Wait canceled from button");
                return RouteOutcome::Canceled;
            }
        } else if self.correlator.deliver(user, update.clone()) {
            tracing::debug!(user_id = %user, "Update delivered to waiting flow");
            return RouteOutcome::Delivered;
        }

        // Marker without an open round: left by a crash or another instance,
        // or the flow is still handling the previous reply
        tracing::debug!(user_id = %user, "No open round behind wait marker, falling through");
        RouteOutcome::Unhandled(update)
    }
}
