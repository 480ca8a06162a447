//! Transport errors.

use std::time::Duration;

use thiserror::Error;

/// Errors produced by the transport itself.
///
/// A non-2xx response is not an error at this layer; it comes back as a
/// [`crate::Reply`] so the caller can classify it.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Every attempt failed without a usable response.
    #[error("request to {url} failed after {attempts} attempt(s): {source}")]
    Request {
        url: String,
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },

    /// The configured inventory host is not an absolute URL.
    #[error("invalid host URL provided: {0}, format - https://hostname")]
    InvalidHost(String),

    /// The underlying HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

/// A [`crate::PollPolicy`] ran out of time before the operation succeeded.
#[derive(Debug, Error)]
#[error("timeout after {elapsed:?} waiting for {operation}")]
pub struct PollTimeout {
    pub operation: String,
    pub elapsed: Duration,
}
