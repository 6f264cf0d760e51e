//! Webhook HTTP surface
//!
//! The chat platform posts updates to `POST /webhook`; `GET /health` reports
//! liveness and how many flows are waiting.

mod handlers;

pub use handlers::create_router;

use crate::bot::Bot;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub bot: Arc<Bot>,
}

impl AppState {
    pub fn new(bot: Arc<Bot>) -> Self {
        Self { bot }
    }
}
