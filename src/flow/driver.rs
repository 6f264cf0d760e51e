//! Field-agnostic flow driver
//!
//! Every field runs the same small state machine:
//!
//! ```text
//! Prompting -> Awaiting -> Accepted
//!                 |  ^ \-> Canceled
//!                 v  |
//!                Retry (unreadable reply / invalid value)
//! ```
//!
//! The user stays registered with the correlator from before the first prompt
//! until the flow ends, so a reply is never mistaken for a new command.
//! Hard failures (timeout, storage, transport) abort the whole flow.

use super::field::{FieldSpec, FieldValues, Validation};
use crate::collector::{ClearOptions, MessageCollector};
use crate::correlator::{InputCorrelator, InputError, InputOutcome, PendingInput};
use crate::i18n::{Localizer, CANCEL_ACTION};
use crate::store::StoreError;
use crate::transport::{Transport, TransportError};
use crate::types::{ChatId, SendOptions, Update, UserId};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Flow settings shared by every call site
#[derive(Debug, Clone)]
pub struct FlowConfig {
    /// Per-field reply timeout; zero waits indefinitely
    pub input_timeout: Duration,
    /// Markup attached to prompts and warnings so the user can back out
    pub cancel_markup_key: String,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            input_timeout: Duration::from_secs(300),
            cancel_markup_key: "cancel".to_string(),
        }
    }
}

/// Who the flow talks to
#[derive(Debug, Clone)]
pub struct FlowSession {
    pub user: UserId,
    pub chat: ChatId,
    pub locale: String,
    /// Aborts the flow from outside (shutdown)
    pub cancel: CancellationToken,
    /// Keep the most recent scratch message visible after a cancel
    pub exclude_last_on_cancel: bool,
}

impl FlowSession {
    pub fn new(user: UserId, chat: ChatId, locale: impl Into<String>) -> Self {
        Self {
            user,
            chat,
            locale: locale.into(),
            cancel: CancellationToken::new(),
            exclude_last_on_cancel: false,
        }
    }

    /// Session for whoever sent `update`, falling back to `default_locale`
    pub fn for_update(update: &Update, default_locale: &str) -> Self {
        let locale = update
            .language_code
            .as_deref()
            .unwrap_or(default_locale);
        Self::new(update.user_id, update.chat_id, locale)
    }

    #[must_use]
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    #[must_use]
    pub fn exclude_last_on_cancel(mut self, exclude_last: bool) -> Self {
        self.exclude_last_on_cancel = exclude_last;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowOutcome {
    Completed(FieldValues),
    Canceled,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FlowError {
    #[error("too many conversations in progress")]
    Busy,
    #[error("no reply within {0:?}")]
    Timeout(Duration),
    #[error("wait state unavailable: {0}")]
    StorageUnavailable(StoreError),
    #[error("flow aborted")]
    Aborted,
    #[error("transport failed: {0}")]
    Transport(#[from] TransportError),
}

impl From<InputError> for FlowError {
    fn from(e: InputError) -> Self {
        match e {
            InputError::TooManyConcurrent => FlowError::Busy,
            InputError::Timeout(after) => FlowError::Timeout(after),
            InputError::Aborted => FlowError::Aborted,
            InputError::StorageUnavailable(inner) => FlowError::StorageUnavailable(inner),
        }
    }
}

#[derive(Debug)]
enum FieldState {
    Prompting,
    Awaiting,
    Retry(RetryReason),
    Accepted(String),
    Canceled,
}

#[derive(Debug)]
enum RetryReason {
    /// Reply was not text (media, a foreign button)
    Unreadable,
    Invalid { key: String, args: Vec<String> },
}

enum FieldResult {
    Accepted(String),
    Canceled,
}

/// Runs multi-field flows against the correlator
pub struct FlowDriver {
    correlator: Arc<InputCorrelator>,
    transport: Arc<dyn Transport>,
    localizer: Arc<dyn Localizer>,
    config: FlowConfig,
}

impl FlowDriver {
    pub fn new(
        correlator: Arc<InputCorrelator>,
        transport: Arc<dyn Transport>,
        localizer: Arc<dyn Localizer>,
        config: FlowConfig,
    ) -> Self {
        Self {
            correlator,
            transport,
            localizer,
            config,
        }
    }

    /// Ask for every field in order
    ///
    /// On a hard failure the user has already been told; the caller only
    /// needs the error for its own bookkeeping.
    pub async fn run(
        &self,
        session: &FlowSession,
        fields: &[FieldSpec],
    ) -> Result<FlowOutcome, FlowError> {
        let Some(first) = fields.first() else {
            return Ok(FlowOutcome::Completed(FieldValues::new()));
        };

        let mut pending = match self
            .correlator
            .register(session.user, self.config.input_timeout)
            .await
        {
            Ok(pending) => pending,
            Err(e) => {
                let e = FlowError::from(e);
                self.report_failure(session, &first.name, &e).await;
                return Err(e);
            }
        };

        let result = self.ask_all(session, fields, &mut pending).await;
        pending.release().await;
        result
    }

    async fn ask_all(
        &self,
        session: &FlowSession,
        fields: &[FieldSpec],
        pending: &mut PendingInput,
    ) -> Result<FlowOutcome, FlowError> {
        let mut values = FieldValues::new();

        for field in fields {
            let mut ledger = MessageCollector::new(self.transport.clone());
            let result = self.ask(session, field, &values, pending, &mut ledger).await;

            match result {
                Ok(FieldResult::Accepted(value)) => {
                    rollback(&mut ledger, false).await;
                    tracing::debug!(user_id = %session.user, field = %field.name, "Field accepted");
                    values.insert(field.name.clone(), value);
                }
                Ok(FieldResult::Canceled) => {
                    rollback(&mut ledger, session.exclude_last_on_cancel).await;
                    tracing::debug!(user_id = %session.user, field = %field.name, "Flow canceled by user");
                    return Ok(FlowOutcome::Canceled);
                }
                Err(e) => {
                    rollback(&mut ledger, false).await;
                    self.report_failure(session, &field.name, &e).await;
                    return Err(e);
                }
            }
        }

        Ok(FlowOutcome::Completed(values))
    }

    async fn ask(
        &self,
        session: &FlowSession,
        field: &FieldSpec,
        values: &FieldValues,
        pending: &mut PendingInput,
        ledger: &mut MessageCollector,
    ) -> Result<FieldResult, FlowError> {
        let locale = session.locale.as_str();
        let options = SendOptions::with_markup(self.localizer.markup_for(
            locale,
            &self.config.cancel_markup_key,
            &[],
        ));
        let mut state = FieldState::Prompting;

        loop {
            state = match state {
                FieldState::Prompting => {
                    let args: Vec<&str> = field.prompt_args.iter().map(String::as_str).collect();
                    let prompt = self.localizer.text_for(locale, &field.prompt_key, &args);
                    pending.rearm().await?;
                    ledger.send_collected(session.chat, &prompt, &options).await?;
                    FieldState::Awaiting
                }
                FieldState::Awaiting => {
                    let outcome = pending
                        .wait(self.config.input_timeout, &session.cancel)
                        .await?;
                    match outcome {
                        InputOutcome::Canceled => FieldState::Canceled,
                        InputOutcome::Delivered(update) => {
                            if let Some(message) = update.message {
                                ledger.collect(message);
                            }
                            classify_reply(field, values, &update)
                        }
                    }
                }
                FieldState::Retry(reason) => {
                    let text = match reason {
                        RetryReason::Unreadable => {
                            self.localizer.text_for(locale, "input_error", &[])
                        }
                        RetryReason::Invalid { key, args } => {
                            let args: Vec<&str> = args.iter().map(String::as_str).collect();
                            self.localizer.text_for(locale, &key, &args)
                        }
                    };
                    pending.rearm().await?;
                    ledger.send_collected(session.chat, &text, &options).await?;
                    FieldState::Awaiting
                }
                FieldState::Accepted(value) => return Ok(FieldResult::Accepted(value)),
                FieldState::Canceled => return Ok(FieldResult::Canceled),
            };
        }
    }

    async fn report_failure(&self, session: &FlowSession, field: &str, error: &FlowError) {
        let key = match error {
            FlowError::Aborted => {
                tracing::debug!(user_id = %session.user, field, "Flow aborted by caller");
                return;
            }
            FlowError::Busy => {
                tracing::warn!(user_id = %session.user, field, "Flow rejected, too many waits");
                "try_later"
            }
            FlowError::Timeout(_) | FlowError::StorageUnavailable(_) | FlowError::Transport(_) => {
                tracing::error!(user_id = %session.user, field, error = %error, "Flow failed");
                "technical_issue"
            }
        };

        let text = self.localizer.text_for(&session.locale, key, &[]);
        if let Err(e) = self
            .transport
            .send(session.chat, &text, &SendOptions::default())
            .await
        {
            tracing::warn!(user_id = %session.user, error = %e, "Failed to report flow failure");
        }
    }
}

fn classify_reply(field: &FieldSpec, values: &FieldValues, update: &Update) -> FieldState {
    if is_cancel_signal(update) {
        return FieldState::Canceled;
    }
    let Some(text) = update.text() else {
        return FieldState::Retry(RetryReason::Unreadable);
    };

    match field.check(text, values) {
        Ok(value) => FieldState::Accepted(value),
        Err(Validation::Invalid { reason_key, args }) => FieldState::Retry(RetryReason::Invalid {
            key: reason_key.unwrap_or_else(|| field.invalid_key.clone()),
            args,
        }),
        Err(Validation::Valid) => FieldState::Retry(RetryReason::Unreadable),
    }
}

/// Remove a field's scratch messages, best effort
async fn rollback(ledger: &mut MessageCollector, exclude_last: bool) {
    let options = ClearOptions {
        ignore_errors: true,
        exclude_last,
    };
    if let Err(e) = ledger.clear(options).await {
        tracing::warn!(error = %e, "Failed to roll back flow messages");
    }
}

/// A reply that backs out of the flow rather than answering it
fn is_cancel_signal(update: &Update) -> bool {
    update.callback_data() == Some(CANCEL_ACTION) || update.command() == Some("cancel")
}
