//! parley - conversational input synchronization for chat bots
//!
//! A flow that needs the user's next message blocks on the
//! [`InputCorrelator`](correlator::InputCorrelator) while the webhook keeps
//! dispatching updates; the reply is handed to the waiting flow instead of
//! normal command handling. Prompts, warnings and the user's replies are
//! collected and removed once each question is settled.

pub mod api;
pub mod bot;
pub mod collector;
pub mod config;
pub mod correlator;
pub mod db;
pub mod dispatch;
pub mod flow;
pub mod gate;
pub mod i18n;
pub mod store;
pub mod transport;
pub mod types;

#[cfg(test)]
mod testing;
