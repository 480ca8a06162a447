//! Retrying HTTP transport for talking to the topology inventory.
//!
//! Two kinds of waiting live here and they share no type:
//!
//! - [`RetryPolicy`]: retry one flaky request with exponential backoff, each
//!   attempt bounded by its own deadline.
//! - [`PollPolicy`]: re-run a whole operation on a fixed interval until it
//!   succeeds or a wall-clock budget runs out, used when waiting for a
//!   just-written record to become visible.
//!
//! # Invariants
//!
//! - A transient failure is never turned into a "not found"; callers see
//!   either the last response received or the last network error.
//! - No process-wide state is touched. TLS and host pinning live on the
//!   [`TransportConfig`] passed to each transport.

mod error;
mod policy;
mod sleep;
mod transport;

pub use error::{PollTimeout, TransportError};
pub use policy::{
    Backoff, PollPolicy, RetryPolicy, DEFAULT_ATTEMPT_TIMEOUT, DEFAULT_POLL_INTERVAL,
    DEFAULT_POLL_TIMEOUT,
};
pub use sleep::{RecordingSleeper, Sleeper, TokioSleeper};
pub use transport::{host_from_url, Reply, RetryingTransport, TransportConfig};

/// Re-exported so callers can build requests without a direct reqwest dependency.
pub use reqwest::{header, Method, StatusCode};
