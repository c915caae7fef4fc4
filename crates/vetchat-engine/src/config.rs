//! Poll timing loaded from environment variables.
//!
//! Defaults match what the screens need without any configuration.

use std::time::Duration;

use tracing::warn;

use vetchat_shared::constants::{
    CHAT_POLL_INTERVAL_MS, FETCH_TIMEOUT_MS, LIST_POLL_INTERVAL_MS, MIN_POLL_INTERVAL_MS,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Period of conversation-list and badge loops.
    /// Env: `VETCHAT_LIST_POLL_MS`
    /// Default: 2000 ms
    pub list_interval: Duration,

    /// Period of the loop behind an open chat.
    /// Env: `VETCHAT_CHAT_POLL_MS`
    /// Default: 1000 ms
    pub chat_interval: Duration,

    /// Bound on one fetch; elapsing fails the cycle.
    /// Env: `VETCHAT_FETCH_TIMEOUT_MS`
    /// Default: 5000 ms
    pub fetch_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            list_interval: Duration::from_millis(LIST_POLL_INTERVAL_MS),
            chat_interval: Duration::from_millis(CHAT_POLL_INTERVAL_MS),
            fetch_timeout: Duration::from_millis(FETCH_TIMEOUT_MS),
        }
    }
}

impl SyncConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(d) = read_interval("VETCHAT_LIST_POLL_MS") {
            config.list_interval = d;
        }
        if let Some(d) = read_interval("VETCHAT_CHAT_POLL_MS") {
            config.chat_interval = d;
        }
        if let Ok(val) = std::env::var("VETCHAT_FETCH_TIMEOUT_MS") {
            match val.parse::<u64>() {
                Ok(ms) if ms > 0 => config.fetch_timeout = Duration::from_millis(ms),
                _ => warn!(value = %val, "Invalid VETCHAT_FETCH_TIMEOUT_MS, using default"),
            }
        }

        config
    }
}

fn read_interval(var: &str) -> Option<Duration> {
    let val = std::env::var(var).ok()?;
    match val.parse::<u64>() {
        Ok(ms) => Some(clamp_interval(ms, var)),
        Err(_) => {
            warn!(var, value = %val, "Invalid poll interval, using default");
            None
        }
    }
}

fn clamp_interval(ms: u64, var: &str) -> Duration {
    if ms < MIN_POLL_INTERVAL_MS {
        warn!(
            var,
            requested_ms = ms,
            floor_ms = MIN_POLL_INTERVAL_MS,
            "Poll interval below floor, clamping"
        );
        return Duration::from_millis(MIN_POLL_INTERVAL_MS);
    }
    Duration::from_millis(ms)
}
