use std::time::Duration;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 3333;
pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const DEFAULT_INPUT_CAPACITY: usize = 10; // hub input queue, matches the legacy buflen
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 8;
pub const DEFAULT_SEND_TIMEOUT_MS: u64 = 5_000; // evict a listener that blocks fan-out this long
pub const DEFAULT_KEEPALIVE_SECS: u64 = 15;

/// Top-level config (paystream.toml + PAYSTREAM_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaystreamConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub broadcast: BroadcastConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Live payment feed settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastConfig {
    /// Capacity of the hub's input queue. Submissions beyond it are dropped.
    #[serde(default = "default_input_capacity")]
    pub input_capacity: usize,
    /// Per-listener channel capacity (clamped to at least 1).
    #[serde(default = "default_subscriber_capacity")]
    pub subscriber_capacity: usize,
    /// How long fan-out may wait on one listener before evicting it.
    /// `0` waits forever.
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,
    /// Interval between SSE keep-alive comments.
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: u64,
}

impl BroadcastConfig {
    pub fn send_timeout(&self) -> Option<Duration> {
        (self.send_timeout_ms > 0).then(|| Duration::from_millis(self.send_timeout_ms))
    }

    pub fn keepalive(&self) -> Duration {
        Duration::from_secs(self.keepalive_secs.max(1))
    }
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            input_capacity: DEFAULT_INPUT_CAPACITY,
            subscriber_capacity: DEFAULT_SUBSCRIBER_CAPACITY,
            send_timeout_ms: DEFAULT_SEND_TIMEOUT_MS,
            keepalive_secs: DEFAULT_KEEPALIVE_SECS,
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_input_capacity() -> usize {
    DEFAULT_INPUT_CAPACITY
}
fn default_subscriber_capacity() -> usize {
    DEFAULT_SUBSCRIBER_CAPACITY
}
fn default_send_timeout_ms() -> u64 {
    DEFAULT_SEND_TIMEOUT_MS
}
fn default_keepalive_secs() -> u64 {
    DEFAULT_KEEPALIVE_SECS
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.paystream/paystream.db", home)
}

impl PaystreamConfig {
    /// Load config from a TOML file with PAYSTREAM_* env var overrides.
    ///
    /// The file is `config_path` when given, otherwise `~/.paystream/paystream.toml`.
    /// A missing file is not an error; every field has a default.
    /// Nested keys use a double underscore: `PAYSTREAM_BROADCAST__INPUT_CAPACITY=32`.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: PaystreamConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("PAYSTREAM_").split("__"))
            .extract()
            .map_err(|e| crate::error::PaystreamError::Config(e.to_string()))?;

        Ok(config)
    }
}

/// Create the parent directory of the database file if it does not exist yet.
pub fn ensure_parent_dir(path: &str) -> crate::error::Result<()> {
    if let Some(parent) = std::path::Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.paystream/paystream.toml", home)
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn missing_file_yields_defaults() {
        Jail::expect_with(|_jail| {
            let config = PaystreamConfig::load(Some("does-not-exist.toml")).expect("load");
            assert_eq!(config.gateway.port, DEFAULT_PORT);
            assert_eq!(config.broadcast.input_capacity, DEFAULT_INPUT_CAPACITY);
            assert_eq!(
                config.broadcast.send_timeout(),
                Some(Duration::from_millis(DEFAULT_SEND_TIMEOUT_MS))
            );
            Ok(())
        });
    }

    #[test]
    fn file_and_env_are_merged() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "paystream.toml",
                r#"
                [gateway]
                port = 8080

                [broadcast]
                input_capacity = 64
                send_timeout_ms = 0
                "#,
            )?;
            jail.set_env("PAYSTREAM_BROADCAST__SUBSCRIBER_CAPACITY", "2");

            let config = PaystreamConfig::load(Some("paystream.toml")).expect("load");
            assert_eq!(config.gateway.port, 8080);
            assert_eq!(config.gateway.bind, DEFAULT_BIND);
            assert_eq!(config.broadcast.input_capacity, 64);
            assert_eq!(config.broadcast.subscriber_capacity, 2);
            assert_eq!(config.broadcast.send_timeout(), None);
            Ok(())
        });
    }

    #[test]
    fn keepalive_never_zero() {
        let cfg = BroadcastConfig {
            keepalive_secs: 0,
            ..BroadcastConfig::default()
        };
        assert_eq!(cfg.keepalive(), Duration::from_secs(1));
    }
}
