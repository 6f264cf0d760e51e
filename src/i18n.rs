//! Localized texts and button layouts
//!
//! Flows refer to texts and markups by key; a [`Localizer`] resolves them
//! for the user's locale. [`Catalog`] is the JSON-backed implementation.

use crate::types::{Button, Markup};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

/// Resolves text and markup keys for a locale
pub trait Localizer: Send + Sync {
    /// Text for `key` with `{0}`, `{1}`, ... replaced by `args`
    fn text_for(&self, locale: &str, key: &str, args: &[&str]) -> String;

    /// Button layout for `key`, if one is defined
    fn markup_for(&self, locale: &str, key: &str, args: &[&str]) -> Option<Markup>;
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Failed to read catalog: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid catalog: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Button template: the label is itself a text key
#[derive(Debug, Clone, Deserialize)]
pub struct ButtonTemplate {
    pub text_key: String,
    pub data: String,
}

/// Locale → key → template, plus markup layouts
#[derive(Debug, Clone, Deserialize)]
pub struct Catalog {
    default_locale: String,
    texts: HashMap<String, HashMap<String, String>>,
    #[serde(default)]
    markups: HashMap<String, Vec<Vec<ButtonTemplate>>>,
}

/// Callback data carried by the built-in cancel button
pub const CANCEL_ACTION: &str = "cancel";

const BUILTIN_EN: &[(&str, &str)] = &[
    ("cancel_button", "« Back"),
    ("input_error", "I couldn't read that. Please send a text message."),
    ("invalid_value", "That doesn't look right. Please try again."),
    ("technical_issue", "Something went wrong on our side. Please try again later."),
    ("try_later", "The bot is busy right now. Please try again in a minute."),
    ("canceled", "Canceled."),
    ("nothing_to_cancel", "There is nothing to cancel."),
    ("unknown_command", "Unknown command. Try /email or /event."),
    ("start", "Hi {0}! Use /email to register your address or /event to draft an event."),
    ("enter_email", "Please enter your email address."),
    ("invalid_email", "That is not a valid email address."),
    ("email_saved", "Thanks! We will send a confirmation to {0}."),
    ("enter_event_title", "What is the event called?"),
    ("invalid_event_title", "The title must be between 3 and 100 characters."),
    ("enter_event_start", "When does it start? (YYYY-MM-DD HH:MM)"),
    ("invalid_event_start", "Use the format YYYY-MM-DD HH:MM, in the future."),
    ("enter_event_end", "When does it end? (YYYY-MM-DD HH:MM)"),
    ("invalid_event_end", "The end must be after the start ({0})."),
    ("event_saved", "Draft saved: {0}, {1} to {2}."),
];

impl Catalog {
    /// Catalog holding the built-in English texts
    pub fn builtin() -> Self {
        let texts = BUILTIN_EN
            .iter()
            .map(|(key, text)| ((*key).to_string(), (*text).to_string()))
            .collect();

        let mut markups = HashMap::new();
        markups.insert(
            "cancel".to_string(),
            vec![vec![ButtonTemplate {
                text_key: "cancel_button".to_string(),
                data: CANCEL_ACTION.to_string(),
            }]],
        );

        Self {
            default_locale: "en".to_string(),
            texts: HashMap::from([("en".to_string(), texts)]),
            markups,
        }
    }

    /// Load a JSON catalog; built-in texts fill any gaps
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, CatalogError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, CatalogError> {
        let loaded: Catalog = serde_json::from_str(raw)?;
        Ok(Self::builtin().merged_with(loaded))
    }

    pub fn with_default_locale(mut self, locale: impl Into<String>) -> Self {
        self.default_locale = locale.into();
        self
    }

    fn merged_with(mut self, other: Catalog) -> Self {
        for (locale, texts) in other.texts {
            self.texts.entry(locale).or_default().extend(texts);
        }
        self.markups.extend(other.markups);
        self.default_locale = other.default_locale;
        self
    }

    fn template(&self, locale: &str, key: &str) -> Option<&str> {
        self.texts
            .get(locale)
            .and_then(|texts| texts.get(key))
            .or_else(|| {
                self.texts
                    .get(&self.default_locale)
                    .and_then(|texts| texts.get(key))
            })
            .map(String::as_str)
    }
}

/// Replace `{n}` placeholders; unknown indexes are left as written
pub fn render(template: &str, args: &[&str]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some((before, after)) = rest.split_once('{') {
        out.push_str(before);
        let substituted = after.split_once('}').and_then(|(inner, tail)| {
            let index: usize = inner.parse().ok()?;
            Some((*args.get(index)?, tail))
        });
        match substituted {
            Some((arg, tail)) => {
                out.push_str(arg);
                rest = tail;
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

impl Localizer for Catalog {
    fn text_for(&self, locale: &str, key: &str, args: &[&str]) -> String {
        match self.template(locale, key) {
            Some(template) => render(template, args),
            None => {
                tracing::warn!(locale, key, "Missing text key");
                key.to_string()
            }
        }
    }

    fn markup_for(&self, locale: &str, key: &str, args: &[&str]) -> Option<Markup> {
        let rows = self.markups.get(key)?;
        Some(Markup {
            rows: rows
                .iter()
                .map(|row| {
                    row.iter()
                        .map(|button| Button {
                            text: self.text_for(locale, &button.text_key, args),
                            callback_data: button.data.clone(),
                        })
                        .collect()
                })
                .collect(),
        })
    }
}
