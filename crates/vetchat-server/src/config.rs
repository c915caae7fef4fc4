//! Server configuration loaded from environment variables.
//!
//! Every setting has a default so a local store can start with no
//! configuration at all.

use std::net::SocketAddr;
use std::path::PathBuf;

use vetchat_shared::constants::DEFAULT_HTTP_PORT;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address of the HTTP API.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// SQLite file backing the store.
    /// Env: `DATABASE_PATH`
    /// Default: the platform data directory.
    pub database_path: Option<PathBuf>,

    /// Bearer token for participant writes and block/unblock.
    /// Env: `ADMIN_TOKEN`
    /// Default: unset (admin routes answer 403).
    pub admin_token: Option<String>,

    /// Env: `INSTANCE_NAME`
    /// Default: `"vetchat"`
    pub instance_name: String,

    /// Sustained requests per second per client IP.
    /// Env: `RATE_LIMIT_PER_SEC`
    /// Default: `20`
    pub rate_limit_per_sec: f64,

    /// Requests a client IP may burst above the sustained rate.
    /// Env: `RATE_LIMIT_BURST`
    /// Default: `60`
    pub rate_limit_burst: f64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            database_path: None,
            admin_token: None,
            instance_name: vetchat_shared::constants::APP_NAME.to_string(),
            rate_limit_per_sec: 20.0,
            rate_limit_burst: 60.0,
        }
    }
}

impl ServerConfig {
    /// Load configuration from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = var("HTTP_ADDR") {
            match addr.parse::<SocketAddr>() {
                Ok(parsed) => config.http_addr = parsed,
                Err(_) => tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default"),
            }
        }

        if let Some(path) = var("DATABASE_PATH").filter(|p| !p.is_empty()) {
            config.database_path = Some(PathBuf::from(path));
        }

        config.admin_token = var("ADMIN_TOKEN").filter(|t| !t.is_empty());

        if let Some(name) = var("INSTANCE_NAME") {
            config.instance_name = name;
        }

        if let Some(rate) = positive(&var, "RATE_LIMIT_PER_SEC") {
            config.rate_limit_per_sec = rate;
        }
        if let Some(burst) = positive(&var, "RATE_LIMIT_BURST") {
            config.rate_limit_burst = burst;
        }

        config
    }
}

fn positive(var: &impl Fn(&str) -> Option<String>, name: &str) -> Option<f64> {
    let raw = var(name)?;
    match raw.parse::<f64>() {
        Ok(v) if v > 0.0 && v.is_finite() => Some(v),
        _ => {
            tracing::warn!(var = name, value = %raw, "Invalid setting, using default");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = ServerConfig::from_lookup(lookup(&[]));
        assert_eq!(config.http_addr, ([0, 0, 0, 0], 8080).into());
        assert!(config.admin_token.is_none());
        assert!(config.database_path.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("HTTP_ADDR", "127.0.0.1:9000"),
            ("ADMIN_TOKEN", "secret"),
            ("DATABASE_PATH", "/tmp/vc.db"),
            ("RATE_LIMIT_BURST", "5"),
        ]));
        assert_eq!(config.http_addr, ([127, 0, 0, 1], 9000).into());
        assert_eq!(config.admin_token.as_deref(), Some("secret"));
        assert_eq!(config.database_path, Some(PathBuf::from("/tmp/vc.db")));
        assert_eq!(config.rate_limit_burst, 5.0);
    }

    #[test]
    fn test_invalid_values_keep_defaults() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("HTTP_ADDR", "nowhere"),
            ("ADMIN_TOKEN", ""),
            ("RATE_LIMIT_PER_SEC", "-3"),
        ]));
        assert_eq!(config.http_addr, ([0, 0, 0, 0], 8080).into());
        assert!(config.admin_token.is_none());
        assert_eq!(config.rate_limit_per_sec, 20.0);
    }
}
