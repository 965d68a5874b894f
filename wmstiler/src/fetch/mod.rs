//! HTTP fetch layer for GetMap requests.
//!
//! The tile pipeline only needs one capability from the network: fetch a
//! URL, return the body. The [`FetchClient`] trait keeps that boundary
//! injectable so tests can run against a mock client, and
//! [`ReqwestFetcher`] is the real implementation with user agent,
//! timeout, TLS toggle and proxy handling.

use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::config::ClientConfig;

/// Errors raised by the fetch layer.
///
/// Any transport failure or non-success response collapses into one of
/// these; the tile pipeline treats them all as fatal for the unit.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// The HTTP client could not be constructed.
    #[error("failed to create HTTP client: {0}")]
    ClientBuild(String),

    /// The request failed before a response arrived.
    #[error("request failed: {0}")]
    Request(String),

    /// The server answered with a non-success status.
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    /// The response body could not be read.
    #[error("failed to read response body: {0}")]
    Body(String),
}

/// Trait for asynchronous tile fetching.
///
/// This abstraction allows for dependency injection and easier testing
/// by enabling mock clients in tests.
pub trait FetchClient: Send + Sync {
    /// Performs an HTTP GET request and returns the response body.
    ///
    /// # Arguments
    ///
    /// * `url` - The URL to request
    ///
    /// # Returns
    ///
    /// The response body as bytes or an error.
    fn fetch(&self, url: &str) -> impl Future<Output = Result<Bytes, FetchError>> + Send;
}

/// Real fetch client implementation using reqwest.
///
/// Holds two underlying clients: a direct one and, when a proxy is
/// configured, a proxied one. The proxy's exclusion substrings decide
/// per URL which client handles the request.
#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    direct: reqwest::Client,
    proxied: Option<reqwest::Client>,
    exclude: Vec<String>,
}

impl ReqwestFetcher {
    /// Creates a fetcher from a client configuration.
    pub fn new(config: &ClientConfig) -> Result<Self, FetchError> {
        let direct = builder(config)
            .build()
            .map_err(|e| FetchError::ClientBuild(e.to_string()))?;

        let (proxied, exclude) = match &config.proxy {
            Some(proxy_config) => {
                let mut proxy =
                    reqwest::Proxy::all(format!("http://{}:{}", proxy_config.host, proxy_config.port))
                        .map_err(|e| FetchError::ClientBuild(e.to_string()))?;
                if let (Some(user), Some(password)) = (&proxy_config.user, &proxy_config.password) {
                    proxy = proxy.basic_auth(user, password);
                }
                let client = builder(config)
                    .proxy(proxy)
                    .build()
                    .map_err(|e| FetchError::ClientBuild(e.to_string()))?;
                (Some(client), proxy_config.exclude.clone())
            }
            None => (None, Vec::new()),
        };

        Ok(Self {
            direct,
            proxied,
            exclude,
        })
    }

    /// Picks the client for a URL, honoring the proxy exclusion list.
    fn client_for(&self, url: &str) -> &reqwest::Client {
        match &self.proxied {
            Some(proxied) if !self.exclude.iter().any(|pattern| url.contains(pattern)) => proxied,
            _ => &self.direct,
        }
    }
}

fn builder(config: &ClientConfig) -> reqwest::ClientBuilder {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .user_agent(config.user_agent.clone())
        .danger_accept_invalid_certs(!config.verify_tls)
}

impl FetchClient for ReqwestFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError> {
        trace!(url = url, "GetMap request starting");

        let response = match self.client_for(url).get(url).send().await {
            Ok(response) => {
                debug!(
                    url = url,
                    status = response.status().as_u16(),
                    "GetMap response received"
                );
                response
            }
            Err(e) => {
                warn!(url = url, error = %e, "GetMap request failed");
                return Err(FetchError::Request(e.to_string()));
            }
        };

        let status = response.status();
        if !status.is_success() {
            warn!(url = url, status = status.as_u16(), "GetMap error status");
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        response
            .bytes()
            .await
            .map_err(|e| FetchError::Body(e.to_string()))
    }
}
