//! Configuration management for the Herald service.

use std::{net::SocketAddr, str::FromStr, time::Duration};

use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use herald_delivery::{
    client::{ClientConfig, DEFAULT_USER_AGENT},
    dispatcher::DEFAULT_EVENT_HANDLER_TIMEOUT,
    retry::{BackoffStrategy, RetryPolicy},
    DispatcherConfig,
};
use serde::{Deserialize, Serialize};

const CONFIG_FILE: &str = "herald.toml";
const ENV_PREFIX: &str = "HERALD_";

/// Service configuration with defaults, file, and environment overrides.
///
/// Loaded in priority order:
/// 1. `HERALD_*` environment variables (highest priority)
/// 2. Configuration file (`herald.toml`)
/// 3. Built-in defaults (lowest priority)
///
/// # Example
///
/// ```no_run
/// use herald_api::Config;
///
/// let config = Config::load().expect("Failed to load configuration");
/// println!("Server will bind to {}:{}", config.host, config.port);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    // Server
    /// Server bind address.
    ///
    /// Environment variable: `HERALD_HOST`
    #[serde(default = "default_host")]
    pub host: String,
    /// Server bind port.
    ///
    /// Environment variable: `HERALD_PORT`
    #[serde(default = "default_port")]
    pub port: u16,
    /// Timeout for API requests in seconds.
    ///
    /// Environment variable: `HERALD_REQUEST_TIMEOUT_SECONDS`
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,

    // Queue
    /// Events held before publishes are rejected.
    ///
    /// Environment variable: `HERALD_QUEUE_CAPACITY`
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    // Retry
    /// Attempts per delivery, the first included.
    ///
    /// Environment variable: `HERALD_MAX_ATTEMPTS`
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Backoff after the first failed attempt in milliseconds.
    ///
    /// Environment variable: `HERALD_RETRY_BASE_DELAY_MS`
    #[serde(default = "default_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    /// Upper bound for any single backoff in milliseconds.
    ///
    /// Environment variable: `HERALD_RETRY_MAX_DELAY_MS`
    #[serde(default = "default_max_delay_ms")]
    pub retry_max_delay_ms: u64,
    /// Jitter factor for retry timing (0.0 to 1.0).
    ///
    /// Environment variable: `HERALD_RETRY_JITTER_FACTOR`
    #[serde(default)]
    pub retry_jitter_factor: f64,

    // Client
    /// Per-attempt HTTP timeout for webhook delivery in seconds.
    ///
    /// Environment variable: `HERALD_DELIVERY_TIMEOUT_SECONDS`
    #[serde(default = "default_delivery_timeout")]
    pub delivery_timeout_seconds: u64,
    /// `User-Agent` sent with deliveries.
    ///
    /// Environment variable: `HERALD_USER_AGENT`
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    // Retention
    /// Dead letters kept in memory.
    ///
    /// Environment variable: `HERALD_DEAD_LETTER_CAPACITY`
    #[serde(default = "default_retention_capacity")]
    pub dead_letter_capacity: usize,
    /// Finished delivery records kept in memory.
    ///
    /// Environment variable: `HERALD_HISTORY_CAPACITY`
    #[serde(default = "default_retention_capacity")]
    pub history_capacity: usize,

    // Shutdown
    /// Time allowed for running deliveries at shutdown, in seconds.
    ///
    /// Environment variable: `HERALD_SHUTDOWN_TIMEOUT_SECONDS`
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_seconds: u64,

    // Logging
    /// Log filter used when `RUST_LOG` is unset.
    ///
    /// Environment variable: `HERALD_RUST_LOG`
    #[serde(default = "default_log_level")]
    pub rust_log: String,
}

impl Config {
    /// Loads configuration from defaults, `herald.toml`, and `HERALD_*`
    /// environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error when a source cannot be parsed or a value fails
    /// validation.
    pub fn load() -> Result<Self> {
        Self::from_figment(
            Figment::new()
                .merge(Serialized::defaults(Self::default()))
                .merge(Toml::file(CONFIG_FILE))
                .merge(Env::prefixed(ENV_PREFIX)),
        )
    }

    /// Extracts and validates configuration from an arbitrary figment.
    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: Self = figment.extract().context("Failed to load configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Converts to the dispatcher configuration.
    pub fn to_dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            queue_capacity: self.queue_capacity,
            retry_policy: self.to_retry_policy(),
            client_config: self.to_client_config(),
            shutdown_timeout: Duration::from_secs(self.shutdown_timeout_seconds),
            dead_letter_capacity: self.dead_letter_capacity,
            history_capacity: self.history_capacity,
            event_handler_timeout: DEFAULT_EVENT_HANDLER_TIMEOUT,
        }
    }

    /// Converts to client configuration.
    pub fn to_client_config(&self) -> ClientConfig {
        ClientConfig {
            timeout: Duration::from_secs(self.delivery_timeout_seconds),
            user_agent: self.user_agent.clone(),
            max_redirects: 0,
            verify_tls: true,
        }
    }

    /// Converts to retry policy.
    pub fn to_retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
            jitter_factor: self.retry_jitter_factor,
            backoff_strategy: BackoffStrategy::Exponential,
        }
    }

    /// API request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /// Parses the server socket address from host and port.
    pub fn parse_server_addr(&self) -> Result<SocketAddr> {
        let addr_str = format!("{}:{}", self.host, self.port);
        SocketAddr::from_str(&addr_str).context("Invalid server address")
    }

    /// Validates configuration values.
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            anyhow::bail!("port must be greater than 0");
        }

        if self.request_timeout_seconds == 0 {
            anyhow::bail!("request_timeout_seconds must be greater than 0");
        }

        if self.queue_capacity == 0 {
            anyhow::bail!("queue_capacity must be greater than 0");
        }

        if self.max_attempts == 0 {
            anyhow::bail!("max_attempts must be greater than 0");
        }

        if self.retry_base_delay_ms > self.retry_max_delay_ms {
            anyhow::bail!("retry_base_delay_ms cannot exceed retry_max_delay_ms");
        }

        if !(0.0..=1.0).contains(&self.retry_jitter_factor) {
            anyhow::bail!("retry_jitter_factor must be between 0.0 and 1.0");
        }

        if self.delivery_timeout_seconds == 0 {
            anyhow::bail!("delivery_timeout_seconds must be greater than 0");
        }

        if self.dead_letter_capacity == 0 {
            anyhow::bail!("dead_letter_capacity must be greater than 0");
        }

        if self.history_capacity == 0 {
            anyhow::bail!("history_capacity must be greater than 0");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_seconds: default_request_timeout(),
            queue_capacity: default_queue_capacity(),
            max_attempts: default_max_attempts(),
            retry_base_delay_ms: default_base_delay_ms(),
            retry_max_delay_ms: default_max_delay_ms(),
            retry_jitter_factor: 0.0,
            delivery_timeout_seconds: default_delivery_timeout(),
            user_agent: default_user_agent(),
            dead_letter_capacity: default_retention_capacity(),
            history_capacity: default_retention_capacity(),
            shutdown_timeout_seconds: default_shutdown_timeout(),
            rust_log: default_log_level(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_request_timeout() -> u64 {
    30
}

fn default_queue_capacity() -> usize {
    herald_delivery::queue::DEFAULT_QUEUE_CAPACITY
}

fn default_max_attempts() -> u32 {
    4
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    60000
}

fn default_delivery_timeout() -> u64 {
    herald_delivery::DEFAULT_TIMEOUT_SECONDS
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

fn default_retention_capacity() -> usize {
    1024
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_log_level() -> String {
    "info,herald=debug,tower_http=debug".to_string()
}
