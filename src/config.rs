//! Process configuration read from `PARLEY_*` environment variables

use crate::correlator::CorrelatorConfig;
use crate::flow::FlowConfig;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

#[derive(Debug, Clone)]
pub struct Config {
    /// Bot API token; without it no transport can be built
    pub bot_token: Option<String>,
    pub api_base: String,
    pub db_path: PathBuf,
    pub port: u16,
    pub locale: String,
    pub catalog_path: Option<PathBuf>,
    pub correlator: CorrelatorConfig,
    pub flow: FlowConfig,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset or unparsable values use defaults
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let parsed = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());
        let correlator_defaults = CorrelatorConfig::default();
        let flow_defaults = FlowConfig::default();

        let db_path = lookup("PARLEY_DB_PATH").map_or_else(
            || {
                let home = lookup("HOME").unwrap_or_else(|| "/tmp".to_string());
                PathBuf::from(format!("{home}/.parley/parley.db"))
            },
            PathBuf::from,
        );

        Self {
            bot_token: lookup("PARLEY_BOT_TOKEN").filter(|t| !t.is_empty()),
            api_base: lookup("PARLEY_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            db_path,
            port: lookup("PARLEY_PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            locale: lookup("PARLEY_LOCALE").unwrap_or_else(|| "en".to_string()),
            catalog_path: lookup("PARLEY_CATALOG_PATH").map(PathBuf::from),
            correlator: CorrelatorConfig {
                max_concurrent: parsed("PARLEY_MAX_CONCURRENT_WAITS")
                    .and_then(|n| usize::try_from(n).ok())
                    .unwrap_or(correlator_defaults.max_concurrent),
                marker_ttl: parsed("PARLEY_WAIT_MARKER_TTL_SECS")
                    .map_or(correlator_defaults.marker_ttl, Duration::from_secs),
            },
            flow: FlowConfig {
                input_timeout: parsed("PARLEY_INPUT_TIMEOUT_SECS")
                    .map_or(flow_defaults.input_timeout, Duration::from_secs),
                ..flow_defaults
            },
        }
    }
}
