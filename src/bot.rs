//! Bot wiring and command handling
//!
//! Every update is first offered to waiting flows through the
//! [`UpdateRouter`]. Whatever nobody waits for is handled as a command on its
//! own task, so a flow blocking on the user's next reply never holds up the
//! webhook.

use crate::config::Config;
use crate::correlator::InputCorrelator;
use crate::dispatch::{RouteOutcome, UpdateRouter};
use crate::flow::{FieldSpec, FieldValues, FlowDriver, FlowOutcome, FlowSession, Validation};
use crate::gate::WaitGate;
use crate::i18n::Localizer;
use crate::store::{SessionEntry, SessionNamespace, SessionStore, WaitStateStore};
use crate::transport::Transport;
use crate::types::{SendOptions, Update, UpdateKind};
use chrono::{NaiveDateTime, Utc};
use regex::Regex;
use std::sync::{Arc, LazyLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

static EMAIL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[A-Za-z]{2,}$").unwrap());

const EVENT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Storage and I/O the bot is built on
pub struct BotDeps {
    pub transport: Arc<dyn Transport>,
    pub markers: Arc<dyn WaitStateStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub localizer: Arc<dyn Localizer>,
}

pub struct Bot {
    router: UpdateRouter,
    correlator: Arc<InputCorrelator>,
    driver: FlowDriver,
    transport: Arc<dyn Transport>,
    sessions: Arc<dyn SessionStore>,
    localizer: Arc<dyn Localizer>,
    default_locale: String,
    shutdown: CancellationToken,
}

impl Bot {
    pub fn new(config: &Config, deps: BotDeps) -> Self {
        let correlator = Arc::new(InputCorrelator::new(&config.correlator, deps.markers.clone()));
        let router = UpdateRouter::new(WaitGate::new(deps.markers), correlator.clone());
        let driver = FlowDriver::new(
            correlator.clone(),
            deps.transport.clone(),
            deps.localizer.clone(),
            config.flow.clone(),
        );

        Self {
            router,
            correlator,
            driver,
            transport: deps.transport,
            sessions: deps.sessions,
            localizer: deps.localizer,
            default_locale: config.locale.clone(),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn correlator(&self) -> &InputCorrelator {
        &self.correlator
    }

    /// Abort every running flow
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Route an update; returns the command task when one was started
    pub async fn handle_update(self: &Arc<Self>, update: Update) -> Option<JoinHandle<()>> {
        if let UpdateKind::Callback { callback_id, .. } = &update.kind {
            if let Err(e) = self.transport.acknowledge(callback_id).await {
                tracing::warn!(user_id = %update.user_id, error = %e, "Failed to acknowledge button press");
            }
        }

        match self.router.route(update).await {
            RouteOutcome::Delivered | RouteOutcome::Canceled => None,
            RouteOutcome::Unhandled(update) => {
                let bot = Arc::clone(self);
                Some(tokio::spawn(async move { bot.handle_command(update).await }))
            }
        }
    }

    /// Handle an update no flow was waiting for
    pub async fn handle_command(&self, update: Update) {
        let Some(command) = update.command() else {
            tracing::debug!(user_id = %update.user_id, "Ignoring update outside a conversation");
            return;
        };

        let session = FlowSession::for_update(&update, &self.default_locale)
            .with_cancel(self.shutdown.child_token());
        tracing::info!(user_id = %update.user_id, command, "Handling command");

        match command {
            "start" => {
                let name = update.username.as_deref().unwrap_or("there");
                self.reply(&session, "start", &[name]).await;
            }
            "email" => self.run_email_flow(&session, &update).await,
            "event" => self.run_event_flow(&session).await,
            "cancel" => self.reply(&session, "nothing_to_cancel", &[]).await,
            _ => self.reply(&session, "unknown_command", &[]).await,
        }
    }

    async fn run_email_flow(&self, session: &FlowSession, update: &Update) {
        let fields = [email_field()];
        let flow = session.clone().exclude_last_on_cancel(false);
        let Some(values) = self.run_flow(&flow, &fields).await else {
            return;
        };
        let Some(email) = values.get("email") else {
            return;
        };

        let mut entry = SessionEntry::new(email);
        if let Some(username) = &update.username {
            entry = entry.with_context(username.clone());
        }
        if let Err(e) = self
            .sessions
            .put(SessionNamespace::EMAIL_CONFIRMATION, session.user, entry)
            .await
        {
            tracing::error!(user_id = %session.user, error = %e, "Failed to store email confirmation");
            self.reply(session, "technical_issue", &[]).await;
            return;
        }

        self.reply(session, "email_saved", &[email]).await;
    }

    async fn run_event_flow(&self, session: &FlowSession) {
        let fields = event_fields();
        // The last prompt stays so the user sees where they stopped
        let flow = session.clone().exclude_last_on_cancel(true);
        let Some(values) = self.run_flow(&flow, &fields).await else {
            return;
        };

        let draft = match serde_json::to_string(&values) {
            Ok(draft) => draft,
            Err(e) => {
                tracing::error!(user_id = %session.user, error = %e, "Failed to encode event draft");
                self.reply(session, "technical_issue", &[]).await;
                return;
            }
        };
        if let Err(e) = self
            .sessions
            .put(SessionNamespace::EVENT_DRAFT, session.user, SessionEntry::new(draft))
            .await
        {
            tracing::error!(user_id = %session.user, error = %e, "Failed to store event draft");
            self.reply(session, "technical_issue", &[]).await;
            return;
        }

        let args = ["title", "start", "end"].map(|field| values.get(field).unwrap_or_default());
        self.reply(session, "event_saved", &args).await;
    }

    /// Run a flow; `None` when it did not complete (the user was already told)
    async fn run_flow(&self, session: &FlowSession, fields: &[FieldSpec]) -> Option<FieldValues> {
        match self.driver.run(session, fields).await {
            Ok(FlowOutcome::Completed(values)) => Some(values),
            Ok(FlowOutcome::Canceled) => {
                self.reply(session, "canceled", &[]).await;
                None
            }
            Err(_) => None,
        }
    }

    async fn reply(&self, session: &FlowSession, key: &str, args: &[&str]) {
        let text = self.localizer.text_for(&session.locale, key, args);
        if let Err(e) = self
            .transport
            .send(session.chat, &text, &SendOptions::default())
            .await
        {
            tracing::warn!(user_id = %session.user, key, error = %e, "Failed to send reply");
        }
    }
}

fn email_field() -> FieldSpec {
    FieldSpec::new("email", "enter_email")
        .invalid_key("invalid_email")
        .validator(crate::flow::predicate(|input: &str, _: &FieldValues| {
            EMAIL_PATTERN.is_match(input)
        }))
}

fn parse_event_time(input: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(input, EVENT_TIME_FORMAT).ok()
}

fn event_fields() -> Vec<FieldSpec> {
    vec![
        FieldSpec::new("title", "enter_event_title")
            .invalid_key("invalid_event_title")
            .validator(crate::flow::predicate(|input: &str, _: &FieldValues| {
                (3..=100).contains(&input.chars().count())
            })),
        FieldSpec::new("start", "enter_event_start")
            .invalid_key("invalid_event_start")
            .validator(crate::flow::predicate(|input: &str, _: &FieldValues| {
                parse_event_time(input).is_some_and(|start| start > Utc::now().naive_utc())
            })),
        FieldSpec::new("end", "enter_event_end").validator(
            |input: &str, context: &FieldValues| {
                let start = context.get("start").unwrap_or_default();
                match (parse_event_time(start), parse_event_time(input)) {
                    (Some(start_at), Some(end_at)) if end_at > start_at => Validation::Valid,
                    _ => Validation::invalid_because("invalid_event_end", vec![start.to_string()]),
                }
            },
        ),
    ]
}
