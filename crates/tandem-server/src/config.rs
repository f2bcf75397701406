//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration for local development.

use std::net::SocketAddr;
use std::path::PathBuf;

use tandem_shared::constants::{
    DEFAULT_HTTP_PORT, DEFAULT_TOKEN_TTL_HOURS, MAX_BODY_BYTES, SEARCH_RESULT_LIMIT,
};

/// Server configuration.
#[derive(Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP (axum) API and WebSocket endpoint.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:5000`
    pub http_addr: SocketAddr,

    /// SQLite database file.
    /// Env: `DATABASE_PATH`
    /// Default: platform data directory (see `Database::default_path`).
    pub database_path: Option<PathBuf>,

    /// HMAC secret used to sign bearer tokens.
    /// Env: `JWT_SECRET`
    /// Default: a random per-process secret (tokens die with the process).
    pub jwt_secret: String,

    /// Bearer token lifetime in hours.
    /// Env: `TOKEN_TTL_HOURS`
    /// Default: `168`
    pub token_ttl_hours: i64,

    /// Maximum JSON request body in bytes.
    /// Env: `MAX_BODY_BYTES`
    /// Default: 4 MiB
    pub max_body_bytes: usize,

    /// Maximum number of users returned by a candidate search.
    /// Env: `SEARCH_LIMIT`
    /// Default: `10`
    pub search_limit: usize,

    /// Seconds between relationship repair passes (0 = startup only).
    /// Env: `REPAIR_INTERVAL_SECS`
    /// Default: `600`
    pub repair_interval_secs: u64,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("http_addr", &self.http_addr)
            .field("database_path", &self.database_path)
            .field("jwt_secret", &"<redacted>")
            .field("token_ttl_hours", &self.token_ttl_hours)
            .field("max_body_bytes", &self.max_body_bytes)
            .field("search_limit", &self.search_limit)
            .field("repair_interval_secs", &self.repair_interval_secs)
            .finish()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            database_path: None,
            jwt_secret: random_secret(),
            token_ttl_hours: DEFAULT_TOKEN_TTL_HOURS,
            max_body_bytes: MAX_BODY_BYTES,
            search_limit: SEARCH_RESULT_LIMIT,
            repair_interval_secs: 600,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ServerConfig::from_env`] but reading from an arbitrary source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = lookup("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default");
            }
        }

        if let Some(path) = lookup("DATABASE_PATH") {
            if !path.is_empty() {
                config.database_path = Some(PathBuf::from(path));
            }
        }

        match lookup("JWT_SECRET") {
            Some(secret) if !secret.is_empty() => config.jwt_secret = secret,
            _ => tracing::warn!(
                "JWT_SECRET not set, using a random secret (tokens will not survive a restart)"
            ),
        }

        if let Some(val) = lookup("TOKEN_TTL_HOURS") {
            match val.parse::<i64>() {
                Ok(n) if n > 0 => config.token_ttl_hours = n,
                _ => tracing::warn!(value = %val, "Invalid TOKEN_TTL_HOURS, using default"),
            }
        }

        if let Some(val) = lookup("MAX_BODY_BYTES") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.max_body_bytes = n,
                _ => tracing::warn!(value = %val, "Invalid MAX_BODY_BYTES, using default"),
            }
        }

        if let Some(val) = lookup("SEARCH_LIMIT") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.search_limit = n,
                _ => tracing::warn!(value = %val, "Invalid SEARCH_LIMIT, using default"),
            }
        }

        if let Some(val) = lookup("REPAIR_INTERVAL_SECS") {
            if let Ok(n) = val.parse::<u64>() {
                config.repair_interval_secs = n;
            }
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }
}

fn random_secret() -> String {
    use rand::RngCore;

    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.http_addr, ([0, 0, 0, 0], 5000).into());
        assert_eq!(config.search_limit, 10);
        assert_eq!(config.jwt_secret.len(), 64);
    }

    #[test]
    fn test_env_overrides() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("HTTP_ADDR", "127.0.0.1:9000"),
            ("JWT_SECRET", "s3cret"),
            ("SEARCH_LIMIT", "3"),
            ("DATABASE_PATH", "/tmp/tandem.db"),
        ]));
        assert_eq!(config.http_addr, ([127, 0, 0, 1], 9000).into());
        assert_eq!(config.jwt_secret, "s3cret");
        assert_eq!(config.search_limit, 3);
        assert_eq!(config.database_path, Some(PathBuf::from("/tmp/tandem.db")));
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("HTTP_ADDR", "nope"),
            ("TOKEN_TTL_HOURS", "-1"),
            ("SEARCH_LIMIT", "0"),
        ]));
        assert_eq!(config.http_addr, ([0, 0, 0, 0], 5000).into());
        assert_eq!(config.token_ttl_hours, 168);
        assert_eq!(config.search_limit, 10);
    }

    #[test]
    fn test_debug_redacts_secret() {
        let config = ServerConfig::from_lookup(lookup(&[("JWT_SECRET", "hunter2")]));
        assert!(!format!("{config:?}").contains("hunter2"));
    }
}
