use thiserror::Error;

/// Failures from the mail source. The poll loop decides retry behaviour by
/// matching on the variant.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Token rejected or expired. Re-authentication is an external step, so
    /// the loop halts and the process exits non-zero.
    #[error("authentication rejected: {0}")]
    Auth(String),

    /// Network, TLS or rate-limit trouble. Retried with backoff.
    #[error("transient fetch failure: {0}")]
    Transient(String),

    /// A response we could not interpret.
    #[error("malformed server response: {0}")]
    Fatal(String),
}

/// Failures from the notifier. Logged per message; never stops the loop.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("invalid destination: {0}")]
    InvalidDestination(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("api error: {0}")]
    Api(String),
}
