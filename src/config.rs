use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::fleet::options::{DEFAULT_RETRY_COUNT, DEFAULT_RETRY_DELAY_MS};
use crate::fleet::{FleetOptions, Properties};

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub remote: RemoteConfig,
    pub retry: RetryConfig,
    /// Properties pushed to every configured engine
    #[serde(default)]
    pub properties: Properties,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
    /// Engine addresses (host:port)
    #[serde(default)]
    pub hosts: Vec<String>,
    /// URL scheme of the engine control API
    #[serde(default = "default_scheme")]
    pub scheme: String,
    /// Per-request HTTP timeout in milliseconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
}

fn default_scheme() -> String {
    "http".to_string()
}

fn default_request_timeout() -> u64 {
    30_000
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            hosts: Vec::new(),
            scheme: default_scheme(),
            request_timeout_ms: default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Number of configuration rounds
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    /// Delay between rounds in milliseconds
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,
    /// Keep going with the engines that configured
    #[serde(default)]
    pub continue_on_fail: bool,
    /// Bound on each remote call in milliseconds
    #[serde(default)]
    pub call_timeout_ms: Option<u64>,
}

fn default_retry_count() -> u32 {
    DEFAULT_RETRY_COUNT
}

fn default_retry_delay() -> u64 {
    DEFAULT_RETRY_DELAY_MS
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            retry_count: DEFAULT_RETRY_COUNT,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            continue_on_fail: false,
            call_timeout_ms: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        Self::load_with_env(config_dir.as_ref(), Self::environment())
    }

    /// `FLEETCTL_` prefix, `__` between nested keys, comma-separated host list
    /// (FLEETCTL_REMOTE__HOSTS=a:1099,b:1099, FLEETCTL_RETRY__RETRY_COUNT=3)
    fn environment() -> Environment {
        Environment::with_prefix("FLEETCTL")
            .prefix_separator("_")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("remote.hosts")
            .try_parsing(true)
    }

    fn load_with_env(config_dir: &Path, environment: Environment) -> Result<Self, ConfigError> {

        let builder = Config::builder()
            // Start with default values
            .set_default("remote.scheme", "http")?
            .set_default("remote.request_timeout_ms", 30_000)?
            .set_default("retry.retry_count", DEFAULT_RETRY_COUNT)?
            .set_default("retry.retry_delay_ms", DEFAULT_RETRY_DELAY_MS)?
            .set_default("retry.continue_on_fail", false)?
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("FLEETCTL_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables
            .add_source(environment);

        builder.build()?.try_deserialize()
    }

    /// Configuration with built-in defaults and the given hosts
    pub fn default_config(hosts: Vec<String>) -> Self {
        Self {
            remote: RemoteConfig {
                hosts,
                ..RemoteConfig::default()
            },
            retry: RetryConfig::default(),
            properties: Properties::new(),
            logging: LoggingConfig::default(),
        }
    }

    /// Coordinator options derived from the retry section and properties
    pub fn fleet_options(&self) -> FleetOptions {
        FleetOptions::default()
            .with_retry_count(self.retry.retry_count)
            .with_retry_delay(Duration::from_millis(self.retry.retry_delay_ms))
            .with_continue_on_fail(self.retry.continue_on_fail)
            .with_properties(self.properties.clone())
            .with_call_timeout(self.retry.call_timeout_ms.map(Duration::from_millis))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.remote.request_timeout_ms)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.remote.hosts.is_empty() {
            errors.push("remote.hosts must list at least one engine address".to_string());
        }

        if self.remote.hosts.iter().any(|h| h.trim().is_empty()) {
            errors.push("remote.hosts contains an empty address".to_string());
        }

        if !matches!(self.remote.scheme.as_str(), "http" | "https") {
            errors.push(format!(
                "remote.scheme must be http or https, got '{}'",
                self.remote.scheme
            ));
        }

        if self.remote.request_timeout_ms == 0 {
            errors.push("remote.request_timeout_ms must be positive".to_string());
        }

        if self.retry.retry_count == 0 {
            errors.push("retry.retry_count must be at least 1".to_string());
        }

        if self.retry.call_timeout_ms == Some(0) {
            errors.push("retry.call_timeout_ms must be positive when set".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
