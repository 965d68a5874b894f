//! Client configuration.
//!
//! Groups the parameters of the HTTP fetch layer: user agent, timeout,
//! TLS verification and an optional upstream proxy. Defaults match what
//! a bare instance would have used historically: a `{name}/{version}
//! ({os})` user agent, a 30 second timeout and no certificate
//! verification (self-signed WMS endpoints are common on intranets).

use serde::{Deserialize, Serialize};

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Configuration of the HTTP fetch layer.
///
/// # Example
///
/// ```
/// use wmstiler::config::ClientConfig;
///
/// let config = ClientConfig::default()
///     .with_timeout_secs(60)
///     .with_verify_tls(true);
/// assert_eq!(config.timeout_secs, 60);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// User agent sent with every GetMap request.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Verify TLS certificates. Defaults to `false`.
    #[serde(default)]
    pub verify_tls: bool,
    /// Optional upstream HTTP proxy.
    #[serde(default)]
    pub proxy: Option<ProxyConfig>,
}

impl ClientConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the user agent.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Sets the request timeout in seconds.
    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Enables or disables TLS certificate verification.
    pub fn with_verify_tls(mut self, verify_tls: bool) -> Self {
        self.verify_tls = verify_tls;
        self
    }

    /// Sets the upstream proxy.
    pub fn with_proxy(mut self, proxy: ProxyConfig) -> Self {
        self.proxy = Some(proxy);
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            verify_tls: false,
            proxy: None,
        }
    }
}

/// Upstream HTTP proxy configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Proxy host name or address.
    pub host: String,
    /// Proxy port.
    pub port: u16,
    /// Optional proxy user.
    #[serde(default)]
    pub user: Option<String>,
    /// Optional proxy password.
    #[serde(default)]
    pub password: Option<String>,
    /// URLs containing any of these substrings bypass the proxy.
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl ProxyConfig {
    /// True if requests to `url` should go through the proxy.
    pub fn applies_to(&self, url: &str) -> bool {
        !self.exclude.iter().any(|pattern| url.contains(pattern))
    }
}

fn default_user_agent() -> String {
    format!(
        "{}/{} ({})",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS
    )
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}
