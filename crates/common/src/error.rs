//! Configuration error types

use thiserror::Error;

/// Error raised while loading or validating configuration.
///
/// Every variant is fatal: it is reported before any background task starts.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Shorthand for a missing required setting.
    pub fn missing(field: &str) -> Self {
        Error::Config(format!("missing required setting `{field}`"))
    }
}

/// Result alias using common Error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_names_the_field() {
        let err = Error::missing("aws.role_arn");
        assert_eq!(
            err.to_string(),
            "Configuration error: missing required setting `aws.role_arn`"
        );
    }

    #[test]
    fn io_error_converts() {
        let err: Error =
            std::io::Error::new(std::io::ErrorKind::NotFound, "no such file").into();
        assert!(err.to_string().starts_with("I/O error:"), "got: {err}");
    }

    #[test]
    fn error_debug_includes_variant() {
        let err = Error::Config("bad value".into());
        let debug = format!("{err:?}");
        assert!(
            debug.contains("Config"),
            "Debug should include variant name, got: {debug}"
        );
    }
}
