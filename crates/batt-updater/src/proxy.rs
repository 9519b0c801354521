//! Proxy-aware HTTP client construction.
//!
//! Proxy discovery itself belongs to the host application (on macOS it reads
//! the System Configuration framework). The updater only needs the resolved
//! settings, supplied through [`ProxyResolver`], and applies them per request.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::{Result, UpdateError};

/// A single proxy host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyEndpoint {
    /// Proxy host name or address.
    pub host: String,
    /// Proxy port.
    pub port: u16,
}

impl ProxyEndpoint {
    /// Creates a new endpoint.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    fn url(&self, scheme: &str) -> String {
        format!("{scheme}://{}:{}", self.host, self.port)
    }
}

/// Operating-system proxy settings. A `None` entry means that proxy is disabled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemProxy {
    /// Web proxy, used for both `http` and `https` requests.
    pub http: Option<ProxyEndpoint>,
    /// Secure web proxy, used for `https` requests when no web proxy is set.
    pub https: Option<ProxyEndpoint>,
    /// SOCKS proxy, used when neither web proxy applies.
    pub socks: Option<ProxyEndpoint>,
}

impl SystemProxy {
    /// Picks the proxy URL for a request URL.
    ///
    /// Precedence: HTTP proxy for `http`/`https`, then HTTPS proxy for
    /// `https`, then SOCKS for anything. `None` means connect directly.
    #[must_use]
    pub fn proxy_for(&self, url: &Url) -> Option<String> {
        let scheme = url.scheme();

        if let Some(http) = &self.http
            && (scheme == "http" || scheme == "https")
        {
            return Some(http.url("http"));
        }

        if let Some(https) = &self.https
            && scheme == "https"
        {
            return Some(https.url("https"));
        }

        self.socks.as_ref().map(|socks| socks.url("socks5"))
    }

    /// Returns `true` if no proxy is enabled.
    #[must_use]
    pub fn is_direct(&self) -> bool {
        self.http.is_none() && self.https.is_none() && self.socks.is_none()
    }
}

/// Supplies the current proxy settings.
///
/// Consulted on every request, so changes to the system settings apply
/// without rebuilding the client.
pub trait ProxyResolver: Send + Sync {
    /// Returns the proxy settings, or `None` if they cannot be determined.
    fn system_proxy(&self) -> Option<SystemProxy>;
}

/// Resolver that always connects directly.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProxy;

impl ProxyResolver for NoProxy {
    fn system_proxy(&self) -> Option<SystemProxy> {
        None
    }
}

/// Fixed settings act as their own resolver.
impl ProxyResolver for SystemProxy {
    fn system_proxy(&self) -> Option<SystemProxy> {
        Some(self.clone())
    }
}

/// Builds an HTTP client that routes through the resolver's proxy.
pub fn build_http_client(
    timeout: Duration,
    user_agent: &str,
    resolver: Arc<dyn ProxyResolver>,
) -> Result<reqwest::Client> {
    let proxy = reqwest::Proxy::custom(move |url| {
        resolver
            .system_proxy()
            .and_then(|settings| settings.proxy_for(url))
    });

    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(user_agent)
        .proxy(proxy)
        .build()
        .map_err(|e| UpdateError::Config(format!("failed to create HTTP client: {e}")))
}
