//! Configuration for the urd registration run.

use std::{collections::HashMap, path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use url::Url;

use urd_core::EndpointUrl;
use urd_delivery::{ClientConfig, ClientCredentials, EngineConfig, RoutingConfig};

const CONFIG_FILE: &str = "urd.toml";

/// Complete run configuration with defaults, file, and environment
/// overrides.
///
/// Loaded in priority order: environment variables (prefixed `URD_`,
/// highest), configuration file (`urd.toml`), built-in defaults (lowest).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Storage
    /// Directory holding active records awaiting delivery.
    #[serde(default = "default_spool_dir")]
    pub spool_dir: PathBuf,
    /// Directory fully delivered records are moved into.
    #[serde(default = "default_archive_dir")]
    pub archive_dir: PathBuf,
    /// Directory holding per-record delivery state entries.
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    // Credentials
    /// PEM-encoded private key for mutual TLS.
    #[serde(default = "default_key_path")]
    pub key_path: PathBuf,
    /// PEM-encoded client certificate.
    #[serde(default = "default_cert_path")]
    pub cert_path: PathBuf,
    /// PEM-encoded trust anchor bundle.
    #[serde(default = "default_ca_path")]
    pub ca_path: PathBuf,

    // Routing
    /// Endpoints every record is delivered to.
    #[serde(default)]
    pub endpoints: Vec<String>,
    /// Group tag → endpoint for conditional routing.
    #[serde(default)]
    pub group_endpoints: HashMap<String, String>,

    // Delivery
    /// Records per registration call.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// HTTP timeout per call, in seconds.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    // Retention
    /// Days an archived record is kept before deletion.
    #[serde(default = "default_ttl_days")]
    pub archive_ttl_days: u64,

    // Logging
    /// Log filter, `RUST_LOG` syntax.
    #[serde(default = "default_log_filter")]
    pub log: String,

    // Record format
    /// Element whose text content carries a record's group tag.
    #[serde(default = "default_group_element")]
    pub group_element: String,
}

impl Config {
    /// Loads configuration from defaults, `urd.toml`, and `URD_`-prefixed
    /// environment variables.
    pub fn load() -> Result<Self> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::prefixed("URD_"));

        let config: Self = figment.extract().context("failed to load configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Converts to the delivery crate's engine configuration.
    pub fn to_engine_config(&self) -> EngineConfig {
        EngineConfig { batch_size: self.batch_size, routing: self.to_routing_config() }
    }

    /// Converts to the routing configuration.
    pub fn to_routing_config(&self) -> RoutingConfig {
        RoutingConfig {
            global: self.endpoints.iter().map(|e| EndpointUrl::from(e.as_str())).collect(),
            group_map: self
                .group_endpoints
                .iter()
                .map(|(group, endpoint)| (group.clone(), EndpointUrl::from(endpoint.as_str())))
                .collect(),
        }
    }

    /// Converts to the HTTP client configuration.
    pub fn to_client_config(&self) -> ClientConfig {
        ClientConfig {
            timeout: Duration::from_secs(self.timeout_seconds),
            ..ClientConfig::default()
        }
    }

    /// Converts to the TLS credential locations.
    pub fn to_credentials(&self) -> ClientCredentials {
        ClientCredentials {
            key_path: self.key_path.clone(),
            cert_path: self.cert_path.clone(),
            ca_path: self.ca_path.clone(),
        }
    }

    /// Validates configuration values.
    fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            anyhow::bail!("batch_size must be greater than 0");
        }

        if self.timeout_seconds == 0 {
            anyhow::bail!("timeout_seconds must be greater than 0");
        }

        if self.endpoints.is_empty() && self.group_endpoints.is_empty() {
            anyhow::bail!("no endpoints configured: set endpoints or group_endpoints");
        }

        for endpoint in self.endpoints.iter().chain(self.group_endpoints.values()) {
            Url::parse(endpoint)
                .with_context(|| format!("invalid endpoint address: {endpoint}"))?;
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            spool_dir: default_spool_dir(),
            archive_dir: default_archive_dir(),
            state_dir: default_state_dir(),
            key_path: default_key_path(),
            cert_path: default_cert_path(),
            ca_path: default_ca_path(),
            endpoints: Vec::new(),
            group_endpoints: HashMap::new(),
            batch_size: default_batch_size(),
            timeout_seconds: default_timeout_seconds(),
            archive_ttl_days: default_ttl_days(),
            log: default_log_filter(),
            group_element: default_group_element(),
        }
    }
}

fn default_spool_dir() -> PathBuf {
    PathBuf::from("/var/spool/urd/records")
}

fn default_archive_dir() -> PathBuf {
    PathBuf::from("/var/spool/urd/archive")
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("/var/spool/urd/state")
}

fn default_key_path() -> PathBuf {
    PathBuf::from("/etc/grid-security/hostkey.pem")
}

fn default_cert_path() -> PathBuf {
    PathBuf::from("/etc/grid-security/hostcert.pem")
}

fn default_ca_path() -> PathBuf {
    PathBuf::from("/etc/grid-security/certificates/ca-bundle.pem")
}

fn default_batch_size() -> usize {
    urd_delivery::DEFAULT_BATCH_SIZE
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_ttl_days() -> u64 {
    30
}

fn default_log_filter() -> String {
    "info".to_string()
}

fn default_group_element() -> String {
    "group".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_endpoint() -> Config {
        Config {
            endpoints: vec!["https://collector.example.org:6143".to_string()],
            ..Config::default()
        }
    }

    #[test]
    fn default_config_has_sane_values() {
        let config = Config::default();
        assert_eq!(config.batch_size, 1);
        assert_eq!(config.timeout_seconds, 30);
        assert_eq!(config.archive_ttl_days, 30);
        assert!(config.endpoints.is_empty());
    }

    #[test]
    fn validation_requires_at_least_one_endpoint() {
        let config = Config::default();
        assert!(config.validate().is_err());

        assert!(config_with_endpoint().validate().is_ok());
    }

    #[test]
    fn validation_rejects_zero_batch_size() {
        let config = Config { batch_size: 0, ..config_with_endpoint() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn validation_rejects_malformed_endpoint_urls() {
        let config = Config {
            endpoints: vec!["not a url".to_string()],
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            group_endpoints: HashMap::from([("x".to_string(), "::bad::".to_string())]),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn routing_config_carries_global_and_conditional_endpoints() {
        let config = Config {
            endpoints: vec!["https://e1.example.org".to_string()],
            group_endpoints: HashMap::from([(
                "atlas".to_string(),
                "https://e2.example.org".to_string(),
            )]),
            ..Config::default()
        };

        let routing = config.to_routing_config();
        assert_eq!(routing.global, vec![EndpointUrl::from("https://e1.example.org")]);
        assert_eq!(
            routing.group_map.get("atlas"),
            Some(&EndpointUrl::from("https://e2.example.org"))
        );
    }

    #[test]
    fn client_config_uses_configured_timeout() {
        let config = Config { timeout_seconds: 45, ..config_with_endpoint() };
        assert_eq!(config.to_client_config().timeout, Duration::from_secs(45));
    }
}
