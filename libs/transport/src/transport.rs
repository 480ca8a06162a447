//! The retrying transport.

use std::borrow::Cow;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::error::TransportError;
use crate::policy::RetryPolicy;
use crate::sleep::{Sleeper, TokioSleeper};

/// Per-client connection settings.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Accept any server certificate. Never use outside of test setups.
    pub skip_tls_validation: bool,

    /// Send traffic for the inventory host to this address instead of DNS.
    pub host_alias_ip: Option<IpAddr>,

    /// TCP connect timeout.
    pub connect_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            skip_tls_validation: false,
            host_alias_ip: None,
            connect_timeout: Duration::from_secs(30),
        }
    }
}

/// A fully buffered response.
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: StatusCode,
    pub body: Bytes,
}

impl Reply {
    /// Whether the status is in [200, 300).
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Body as text, lossily decoded.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// Decode the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// Extract the host name from an absolute URL such as `https://host:8443/`.
pub fn host_from_url(url: &str) -> Result<String, TransportError> {
    Url::parse(url)
        .ok()
        .and_then(|parsed| parsed.host_str().map(str::to_string))
        .ok_or_else(|| TransportError::InvalidHost(url.to_string()))
}

/// Issues one logical request as a bounded series of attempts.
#[derive(Clone)]
pub struct RetryingTransport {
    client: reqwest::Client,
    sleeper: Arc<dyn Sleeper>,
}

impl std::fmt::Debug for RetryingTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryingTransport").finish_non_exhaustive()
    }
}

impl RetryingTransport {
    /// Build a transport for talking to `host_url`.
    pub fn new(host_url: &str, config: &TransportConfig) -> Result<Self, TransportError> {
        let mut builder = reqwest::Client::builder().connect_timeout(config.connect_timeout);

        if config.skip_tls_validation {
            warn!(
                host = %host_url,
                skip_tls_validation = true,
                "TLS validation disabled! Not for use in production!"
            );
            builder = builder.danger_accept_invalid_certs(true);
        }

        if let Some(ip) = config.host_alias_ip {
            let host = host_from_url(host_url)?;
            info!(host = %host, host_alias_ip = %ip, "Using the host alias IP");
            // Port 0 keeps the port from the request URL.
            builder = builder.resolve(&host, SocketAddr::new(ip, 0));
        }

        let client = builder.build().map_err(TransportError::Client)?;

        Ok(Self {
            client,
            sleeper: Arc::new(TokioSleeper),
        })
    }

    /// Replace the sleeper used between attempts.
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Execute a request under `policy`.
    ///
    /// Returns the first 2xx reply. Once attempts are exhausted, returns the
    /// last reply received (whatever its status) or, if the last attempt got
    /// no response at all, its network error.
    pub async fn execute(
        &self,
        method: Method,
        url: &str,
        body: Option<Bytes>,
        headers: &HeaderMap,
        policy: &RetryPolicy,
    ) -> Result<Reply, TransportError> {
        let attempts = policy.attempts();
        let mut outcome = self
            .attempt(&method, url, body.as_ref(), headers, policy)
            .await;

        for attempt in 1..attempts {
            match &outcome {
                Ok(reply) if reply.is_success() => break,
                Ok(reply) => warn!(
                    method = %method,
                    url = %url,
                    status = %reply.status,
                    attempt,
                    "Request returned unexpected status"
                ),
                Err(e) => warn!(
                    method = %method,
                    url = %url,
                    error = %e,
                    attempt,
                    "Request failed"
                ),
            }

            let delay = policy.backoff.delay(attempt - 1);
            debug!(attempt, delay_ms = delay.as_millis() as u64, "Waiting before next retry");
            self.sleeper.sleep(delay).await;

            outcome = self
                .attempt(&method, url, body.as_ref(), headers, policy)
                .await;
        }

        match outcome {
            Ok(reply) => {
                debug!(method = %method, url = %url, status = %reply.status, "Request complete");
                Ok(reply)
            }
            Err(source) => Err(TransportError::Request {
                url: url.to_string(),
                attempts,
                source,
            }),
        }
    }

    async fn attempt(
        &self,
        method: &Method,
        url: &str,
        body: Option<&Bytes>,
        headers: &HeaderMap,
        policy: &RetryPolicy,
    ) -> Result<Reply, reqwest::Error> {
        let mut request = self
            .client
            .request(method.clone(), url)
            .headers(headers.clone())
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .timeout(policy.attempt_timeout);

        if let Some(body) = body {
            request = request.body(body.clone());
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        Ok(Reply { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_from_url() {
        assert_eq!(
            host_from_url("https://astra.netapp.io").unwrap(),
            "astra.netapp.io"
        );
        assert_eq!(
            host_from_url("https://inventory.example.com:8443/base").unwrap(),
            "inventory.example.com"
        );
    }

    #[test]
    fn test_host_from_url_requires_scheme() {
        let err = host_from_url("astra.netapp.io").unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid host URL provided: astra.netapp.io, format - https://hostname"
        );
    }

    #[test]
    fn test_host_alias_requires_valid_host() {
        let config = TransportConfig {
            host_alias_ip: Some("10.0.0.1".parse().unwrap()),
            ..Default::default()
        };
        assert!(matches!(
            RetryingTransport::new("not a url", &config),
            Err(TransportError::InvalidHost(_))
        ));
        assert!(RetryingTransport::new("https://astra.netapp.io", &config).is_ok());
    }

    #[test]
    fn test_reply_helpers() {
        let reply = Reply {
            status: StatusCode::CREATED,
            body: Bytes::from_static(br#"{"id":"abc"}"#),
        };
        assert!(reply.is_success());
        assert_eq!(reply.text(), r#"{"id":"abc"}"#);
        let value: serde_json::Value = reply.json().unwrap();
        assert_eq!(value["id"], "abc");
    }
}
