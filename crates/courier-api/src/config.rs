//! Configuration management for the courier relay.

use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use anyhow::{Context, Result};
use courier_delivery::{
    client::ClientConfig, retry::RetryPolicy, DeliveryConfig, StorageErrorPolicy,
};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use reqwest::Url;
use serde::{Deserialize, Serialize};

const CONFIG_FILE: &str = "courier.toml";
const ENV_PREFIX: &str = "COURIER_";

/// Complete relay configuration.
///
/// Loaded in priority order (highest first):
/// 1. Command-line flags
/// 2. Environment variables with the `COURIER_` prefix
/// 3. Configuration file (`courier.toml`)
/// 4. Built-in defaults
///
/// # Example
///
/// ```no_run
/// use courier_api::Config;
///
/// let config = Config::load().expect("Failed to load configuration");
/// println!("relaying to {}", config.target_url);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Server
    /// Ingress bind address.
    ///
    /// Environment variable: `COURIER_HOST`
    #[serde(default = "default_host")]
    pub host: String,
    /// Ingress bind port.
    ///
    /// Environment variable: `COURIER_PORT`
    #[serde(default = "default_port")]
    pub port: u16,
    /// Ingress request timeout in seconds.
    ///
    /// Environment variable: `COURIER_REQUEST_TIMEOUT_SECONDS`
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,

    // Relay
    /// Downstream base URL every stored path is appended to.
    ///
    /// Environment variable: `COURIER_TARGET_URL`
    #[serde(default = "default_target_url")]
    pub target_url: String,
    /// Request store location.
    ///
    /// Environment variable: `COURIER_STORAGE_PATH`
    #[serde(default = "default_storage_path")]
    pub storage_path: PathBuf,
    /// Number of concurrent delivery workers.
    ///
    /// Environment variable: `COURIER_MAX_CONCURRENT_REQUESTS`
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,
    /// Entries read per scheduler pass.
    ///
    /// Environment variable: `COURIER_BATCH_SIZE`
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Scheduler wait after an idle pass, in milliseconds.
    ///
    /// Environment variable: `COURIER_IDLE_INTERVAL_MS`
    #[serde(default = "default_idle_interval_ms")]
    pub idle_interval_ms: u64,

    // Retry
    /// Fixed delay added to an entry's delivery time after each failure.
    ///
    /// Environment variable: `COURIER_RETRY_BACKOFF_MS`
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    /// Retry budget of newly ingested requests.
    ///
    /// Environment variable: `COURIER_DEFAULT_TTL`
    #[serde(default = "default_ttl")]
    pub default_ttl: u32,

    // Client
    /// Timeout for a single downstream attempt in seconds.
    ///
    /// Environment variable: `COURIER_DELIVERY_TIMEOUT_SECONDS`
    #[serde(default = "default_delivery_timeout")]
    pub delivery_timeout_seconds: u64,

    // Failure handling
    /// `continue` or `halt` on store failures.
    ///
    /// Environment variable: `COURIER_STORAGE_ERROR_POLICY`
    #[serde(default)]
    pub storage_error_policy: StorageErrorPolicy,
    /// Clear claims left by a previous process at startup.
    ///
    /// Environment variable: `COURIER_RELEASE_CLAIMS_ON_STARTUP`
    #[serde(default)]
    pub release_claims_on_startup: bool,

    // Logging
    /// Log filter, used when `RUST_LOG` is unset.
    ///
    /// Environment variable: `COURIER_RUST_LOG`
    #[serde(default = "default_log_level")]
    pub rust_log: String,
}

/// Command-line values layered over every other source.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CliOverrides {
    /// `--hostname`
    #[serde(rename = "target_url", skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    /// `--max-concurrent-requests`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_concurrent_requests: Option<usize>,
}

impl Config {
    /// Load configuration from defaults, `courier.toml` and the environment.
    ///
    /// # Errors
    ///
    /// Returns error if a source cannot be parsed or validation fails.
    pub fn load() -> Result<Self> {
        Self::figment(Toml::file(CONFIG_FILE), &CliOverrides::default())
    }

    /// Load configuration with an explicit file and command-line overrides.
    ///
    /// Without `path`, `courier.toml` is read if present. An explicit path
    /// must exist.
    ///
    /// # Errors
    ///
    /// Returns error if the explicit file is missing, a source cannot be
    /// parsed, or validation fails.
    pub fn load_with(path: Option<&Path>, overrides: &CliOverrides) -> Result<Self> {
        let file = match path {
            Some(path) => {
                anyhow::ensure!(path.exists(), "config file {} not found", path.display());
                Toml::file(path)
            },
            None => Toml::file(CONFIG_FILE),
        };
        Self::figment(file, overrides)
    }

    fn figment(file: figment::providers::Data<Toml>, overrides: &CliOverrides) -> Result<Self> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(file)
            .merge(Env::prefixed(ENV_PREFIX))
            .merge(Serialized::defaults(overrides));

        let config: Self = figment.extract().context("Failed to load configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Convert to the delivery engine's configuration.
    pub fn to_delivery_config(&self) -> DeliveryConfig {
        DeliveryConfig {
            worker_count: self.max_concurrent_requests,
            batch_size: self.batch_size,
            idle_interval: Duration::from_millis(self.idle_interval_ms),
            target_url: self.target_url.clone(),
            client_config: self.to_client_config(),
            retry_policy: self.to_retry_policy(),
            storage_error_policy: self.storage_error_policy,
            release_claims_on_startup: self.release_claims_on_startup,
        }
    }

    /// Convert to client configuration.
    pub fn to_client_config(&self) -> ClientConfig {
        ClientConfig {
            timeout: Duration::from_secs(self.delivery_timeout_seconds),
            ..ClientConfig::default()
        }
    }

    /// Convert to retry policy.
    pub fn to_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(Duration::from_millis(self.retry_backoff_ms))
    }

    /// Ingress request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /// Parse server socket address from host and port configuration.
    ///
    /// # Errors
    ///
    /// Returns error if host and port do not form a socket address.
    pub fn parse_server_addr(&self) -> Result<SocketAddr> {
        let addr_str = format!("{}:{}", self.host, self.port);
        SocketAddr::from_str(&addr_str).context("Invalid server address")
    }

    /// Validate configuration values.
    fn validate(&self) -> Result<()> {
        if self.port == 0 {
            anyhow::bail!("port must be greater than 0");
        }

        if self.max_concurrent_requests == 0 {
            anyhow::bail!("max_concurrent_requests must be greater than 0");
        }

        if self.batch_size == 0 {
            anyhow::bail!("batch_size must be greater than 0");
        }

        if self.default_ttl == 0 {
            anyhow::bail!("default_ttl must be greater than 0");
        }

        if self.retry_backoff_ms == 0 {
            anyhow::bail!("retry_backoff_ms must be greater than 0");
        }

        if self.delivery_timeout_seconds == 0 {
            anyhow::bail!("delivery_timeout_seconds must be greater than 0");
        }

        Url::parse(&self.target_url)
            .with_context(|| format!("invalid target_url {:?}", self.target_url))?;

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_seconds: default_request_timeout(),
            target_url: default_target_url(),
            storage_path: default_storage_path(),
            max_concurrent_requests: default_max_concurrent_requests(),
            batch_size: default_batch_size(),
            idle_interval_ms: default_idle_interval_ms(),
            retry_backoff_ms: default_retry_backoff_ms(),
            default_ttl: default_ttl(),
            delivery_timeout_seconds: default_delivery_timeout(),
            storage_error_policy: StorageErrorPolicy::default(),
            release_claims_on_startup: false,
            rust_log: default_log_level(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_request_timeout() -> u64 {
    10
}

fn default_target_url() -> String {
    "http://google.com".to_string()
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("requests.db")
}

fn default_max_concurrent_requests() -> usize {
    courier_delivery::DEFAULT_WORKER_COUNT
}

fn default_batch_size() -> usize {
    courier_delivery::DEFAULT_BATCH_SIZE
}

fn default_idle_interval_ms() -> u64 {
    courier_delivery::DEFAULT_IDLE_INTERVAL_MS
}

fn default_retry_backoff_ms() -> u64 {
    courier_delivery::DEFAULT_RETRY_BACKOFF_MS
}

fn default_ttl() -> u32 {
    courier_core::DEFAULT_TTL
}

fn default_delivery_timeout() -> u64 {
    courier_delivery::DEFAULT_TIMEOUT_SECONDS
}

fn default_log_level() -> String {
    "info,courier=debug".to_string()
}
