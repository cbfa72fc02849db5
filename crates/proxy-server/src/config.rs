//! Runtime configuration, resolved once at startup from the environment.

use serde::{Deserialize, Serialize};
use std::env;
use std::net::SocketAddr;

pub const ENV_LISTEN_ADDR: &str = "REDIS_PROXY_ADDR";
pub const ENV_BACKEND_ADDR: &str = "REDIS_BACKEND_ADDR";
pub const ENV_DEFAULT_PREFIX: &str = "REDIS_DEFAULT_PREFIX";
pub const ENV_METRICS_ADDR: &str = "REDIS_METRICS_ADDR";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Address the proxy listens on. A bare `:port` binds every interface.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Redis backend the proxy dials, one connection per client.
    #[serde(default = "default_backend_addr")]
    pub backend_addr: String,
    /// Tenant prefix for connections that never AUTH, `:`-terminated.
    /// Empty selects a per-connection `default:<client-addr>:` prefix.
    #[serde(default)]
    pub default_prefix: String,
    /// Admin/metrics HTTP address. Empty disables the endpoint.
    #[serde(default = "default_metrics_addr")]
    pub metrics_addr: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            backend_addr: default_backend_addr(),
            default_prefix: String::new(),
            metrics_addr: default_metrics_addr(),
        }
    }
}

impl Config {
    /// Resolve configuration from the environment.
    ///
    /// Set variables are overlaid on the per-field serde defaults. An
    /// empty listen or backend address is treated as unset; an empty
    /// prefix or metrics address is meaningful (auto-generated prefixes,
    /// metrics disabled).
    pub fn from_env() -> Self {
        let mut raw = serde_json::Map::new();
        if let Ok(addr) = env::var(ENV_LISTEN_ADDR) {
            if !addr.is_empty() {
                raw.insert("listen_addr".to_string(), addr.into());
            }
        }
        if let Ok(addr) = env::var(ENV_BACKEND_ADDR) {
            if !addr.is_empty() {
                raw.insert("backend_addr".to_string(), addr.into());
            }
        }
        if let Ok(prefix) = env::var(ENV_DEFAULT_PREFIX) {
            raw.insert("default_prefix".to_string(), prefix.into());
        }
        if let Ok(addr) = env::var(ENV_METRICS_ADDR) {
            raw.insert("metrics_addr".to_string(), addr.into());
        }

        // Every field is a defaulted string, so this cannot fail.
        let mut config: Config = serde_json::from_value(serde_json::Value::Object(raw))
            .unwrap_or_else(|_| Config::default());
        config.normalize();
        config
    }

    /// Enforce the prefix invariant: non-empty prefixes end in one `:`.
    pub fn normalize(&mut self) {
        if !self.default_prefix.is_empty() && !self.default_prefix.ends_with(':') {
            self.default_prefix.push(':');
        }
    }

    /// The address to bind, expanding the Go-style bare `:port` form.
    pub fn bind_addr(&self) -> String {
        if self.listen_addr.starts_with(':') {
            format!("0.0.0.0{}", self.listen_addr)
        } else {
            self.listen_addr.clone()
        }
    }

    /// Initial prefix for a new session.
    pub fn session_prefix(&self, peer: &SocketAddr) -> String {
        if self.default_prefix.is_empty() {
            format!("default:{peer}:")
        } else {
            self.default_prefix.clone()
        }
    }
}

fn default_listen_addr() -> String {
    ":6378".to_string()
}

fn default_backend_addr() -> String {
    "127.0.0.1:6379".to_string()
}

fn default_metrics_addr() -> String {
    "127.0.0.1:9653".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer() -> SocketAddr {
        "10.0.0.7:51234".parse().unwrap()
    }

    #[test]
    fn deserializes_with_per_field_defaults() {
        let config: Config = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(config.listen_addr, ":6378");
        assert_eq!(config.backend_addr, "127.0.0.1:6379");
        assert_eq!(config.default_prefix, "");
        assert_eq!(config.metrics_addr, "127.0.0.1:9653");
    }

    #[test]
    fn partial_input_overrides_only_named_fields() {
        let config: Config = serde_json::from_value(serde_json::json!({
            "listen_addr": "127.0.0.1:7000",
            "default_prefix": "acme",
        }))
        .unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:7000");
        assert_eq!(config.backend_addr, "127.0.0.1:6379");
        assert_eq!(config.default_prefix, "acme");
        assert_eq!(config.metrics_addr, "127.0.0.1:9653");
    }

    #[test]
    fn normalize_appends_missing_colon() {
        let mut config = Config {
            default_prefix: "tenant".to_string(),
            ..Config::default()
        };
        config.normalize();
        assert_eq!(config.default_prefix, "tenant:");
    }

    #[test]
    fn normalize_keeps_existing_colon() {
        let mut config = Config {
            default_prefix: "tenant:".to_string(),
            ..Config::default()
        };
        config.normalize();
        assert_eq!(config.default_prefix, "tenant:");
    }

    #[test]
    fn empty_prefix_autogenerates_per_connection() {
        let config = Config::default();
        assert_eq!(config.session_prefix(&peer()), "default:10.0.0.7:51234:");
    }

    #[test]
    fn configured_prefix_is_shared_by_sessions() {
        let mut config = Config {
            default_prefix: "acme".to_string(),
            ..Config::default()
        };
        config.normalize();
        assert_eq!(config.session_prefix(&peer()), "acme:");
    }

    #[test]
    fn bind_addr_expands_bare_port() {
        let config = Config::default();
        assert_eq!(config.bind_addr(), "0.0.0.0:6378");

        let config = Config {
            listen_addr: "127.0.0.1:7000".to_string(),
            ..Config::default()
        };
        assert_eq!(config.bind_addr(), "127.0.0.1:7000");
    }
}
