//! Error types for engine operations

/// Errors from engine lifecycle and manual rotation.
///
/// Background tasks never return these: their failures are logged and the
/// next cycle proceeds.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid engine configuration: {0}")]
    Config(String),

    #[error("engine failed to start: {0}")]
    Startup(#[source] sts_auth::Error),

    #[error("credential issuance failed: {0}")]
    Issuer(#[from] sts_auth::Error),

    #[error("engine is shut down")]
    Shutdown,
}

/// Result alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
