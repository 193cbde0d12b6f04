//! Error types for credential issuance

/// Errors from a single issuance attempt.
///
/// The variant decides retry behavior: transport failures, throttling and
/// upstream faults may succeed on a later attempt; rejected keys, requests the
/// issuer refuses, malformed responses and bad configuration will not.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("issuer rejected credentials: {0}")]
    Unauthorized(String),

    #[error("issuer throttled the request: {0}")]
    Throttled(String),

    #[error("issuer refused the request: {0}")]
    Rejected(String),

    #[error("issuer returned an error: {0}")]
    Upstream(String),

    #[error("invalid issuer response: {0}")]
    Response(String),

    #[error("invalid issuer configuration: {0}")]
    Config(String),
}

impl Error {
    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Http(_) | Error::Throttled(_) | Error::Upstream(_)
        )
    }

    /// Short label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Error::Http(_) => "network",
            Error::Unauthorized(_) => "unauthorized",
            Error::Throttled(_) => "throttled",
            Error::Rejected(_) => "rejected",
            Error::Upstream(_) => "upstream",
            Error::Response(_) => "response",
            Error::Config(_) => "config",
        }
    }
}

/// Result alias for issuance operations.
pub type Result<T> = std::result::Result<T, Error>;
