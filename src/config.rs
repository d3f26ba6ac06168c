//! Bridge configuration.
//!
//! The endpoint is derived from a host-provided address (`host:port`), the
//! same value the overlay page receives from the companion at injection
//! time.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use overlay_bridge::BridgeConfig;
//!
//! # fn example() -> overlay_bridge::Result<()> {
//! let config = BridgeConfig::builder()
//!     .host("127.0.0.1:41021")
//!     .ping_timeout(Duration::from_secs(2))
//!     .build()?;
//!
//! assert_eq!(config.endpoint().as_str(), "ws://127.0.0.1:41021/");
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::env;
use std::time::Duration;

use url::Url;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Environment variable holding the companion address (`host:port`).
pub const HOST_ENV: &str = "BRIDGE_HOST";

/// Environment variable overriding the ping timeout, in milliseconds.
pub const PING_TIMEOUT_ENV: &str = "BRIDGE_PING_TIMEOUT_MS";

/// Environment variable overriding the connect timeout, in milliseconds.
pub const CONNECT_TIMEOUT_ENV: &str = "BRIDGE_CONNECT_TIMEOUT_MS";

/// Default window for a liveness handshake response.
pub const DEFAULT_PING_TIMEOUT: Duration = Duration::from_millis(5000);

/// Default window for the socket to open.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(10_000);

// ============================================================================
// BridgeConfig
// ============================================================================

/// Validated bridge configuration.
///
/// Use [`BridgeConfig::builder()`] or [`BridgeConfig::from_env()`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// WebSocket endpoint, always `ws://<host>`.
    endpoint: Url,
    /// Response window for request/response exchanges.
    ping_timeout: Duration,
    /// Window for the socket to open.
    connect_timeout: Duration,
}

impl BridgeConfig {
    /// Creates a new configuration builder.
    #[inline]
    #[must_use]
    pub fn builder() -> BridgeConfigBuilder {
        BridgeConfigBuilder::new()
    }

    /// Creates a configuration for `host` with default timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `host` does not form a valid endpoint.
    pub fn new(host: impl Into<String>) -> Result<Self> {
        Self::builder().host(host).build()
    }

    /// Reads configuration from the environment.
    ///
    /// `BRIDGE_HOST` is required; `BRIDGE_PING_TIMEOUT_MS` and
    /// `BRIDGE_CONNECT_TIMEOUT_MS` are optional.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the host is missing or any value is
    /// invalid.
    pub fn from_env() -> Result<Self> {
        let host = env::var(HOST_ENV)
            .map_err(|_| Error::config(format!("{HOST_ENV} is not set")))?;

        let mut builder = Self::builder().host(host);

        if let Some(ms) = read_millis(PING_TIMEOUT_ENV)? {
            builder = builder.ping_timeout(ms);
        }
        if let Some(ms) = read_millis(CONNECT_TIMEOUT_ENV)? {
            builder = builder.connect_timeout(ms);
        }

        builder.build()
    }

    /// Returns the WebSocket endpoint.
    #[inline]
    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Returns the request/response timeout.
    #[inline]
    #[must_use]
    pub const fn ping_timeout(&self) -> Duration {
        self.ping_timeout
    }

    /// Returns the connect timeout.
    #[inline]
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }
}

/// Parses an optional millisecond duration from the environment.
fn read_millis(key: &str) -> Result<Option<Duration>> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(|ms| Some(Duration::from_millis(ms)))
            .map_err(|e| Error::config(format!("{key}={raw:?}: {e}"))),
        Err(_) => Ok(None),
    }
}

// ============================================================================
// BridgeConfigBuilder
// ============================================================================

/// Builder for [`BridgeConfig`].
#[derive(Debug, Default, Clone)]
pub struct BridgeConfigBuilder {
    host: Option<String>,
    ping_timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
}

impl BridgeConfigBuilder {
    /// Creates a builder with no configuration.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the companion address, e.g. `127.0.0.1:41021`.
    ///
    /// A leading `ws://` is accepted and stripped.
    #[inline]
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Sets the request/response timeout.
    #[inline]
    #[must_use]
    pub fn ping_timeout(mut self, timeout: Duration) -> Self {
        self.ping_timeout = Some(timeout);
        self
    }

    /// Sets the connect timeout.
    #[inline]
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Builds the configuration with validation.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if no host was set
    /// - [`Error::Config`] if the host does not parse as a `ws://` URL
    /// - [`Error::Config`] if a timeout is zero
    pub fn build(self) -> Result<BridgeConfig> {
        let host = self
            .host
            .ok_or_else(|| Error::config("Companion host is required"))?;
        let endpoint = Self::parse_endpoint(&host)?;

        let ping_timeout = self.ping_timeout.unwrap_or(DEFAULT_PING_TIMEOUT);
        let connect_timeout = self.connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT);

        if ping_timeout.is_zero() || connect_timeout.is_zero() {
            return Err(Error::config("Timeouts must be greater than zero"));
        }

        Ok(BridgeConfig {
            endpoint,
            ping_timeout,
            connect_timeout,
        })
    }

    fn parse_endpoint(host: &str) -> Result<Url> {
        let host = host.trim();
        let host = host.strip_prefix("ws://").unwrap_or(host);

        if host.is_empty() {
            return Err(Error::config("Companion host is empty"));
        }

        let url = Url::parse(&format!("ws://{host}"))
            .map_err(|e| Error::config(format!("Invalid companion host {host:?}: {e}")))?;

        if url.host_str().is_none_or(str::is_empty) {
            return Err(Error::config(format!("Companion host {host:?} has no host name")));
        }

        Ok(url)
    }
}

// ============================================================================
// Tests
// ============================================================================
