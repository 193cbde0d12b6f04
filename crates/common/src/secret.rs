//! Secret wrapper for long-lived keys and issued session material

use std::fmt;
use zeroize::Zeroize;

/// Sensitive value - redacted in Debug/Display/logs, zeroed on drop
pub struct Secret<T: Zeroize>(T);

impl<T: Zeroize> Secret<T> {
    /// Wrap a sensitive value
    pub fn new(value: T) -> Self {
        Self(value)
    }

    /// Expose the inner value (signing, link building; never logging)
    pub fn expose(&self) -> &T {
        &self.0
    }
}

impl Secret<String> {
    /// True when the wrapped string is empty or whitespace only.
    ///
    /// Used by configuration validation so a blank env var or key file
    /// is reported as missing rather than sent to the issuer.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl From<String> for Secret<String> {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for Secret<String> {
    fn from(value: &str) -> Self {
        Self::new(value.to_owned())
    }
}

impl<T: Zeroize> fmt::Debug for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl<T: Zeroize> fmt::Display for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl<T: Zeroize> Drop for Secret<T> {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl<T: Zeroize + Clone> Clone for Secret<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_key_is_redacted_in_debug_and_display() {
        let secret = Secret::new(String::from("wJalrXUtnFEMI/K7MDENG"));
        assert_eq!(format!("{secret:?}"), "[REDACTED]");
        assert_eq!(format!("{secret}"), "[REDACTED]");
    }

    #[test]
    fn expose_returns_wrapped_value() {
        let secret: Secret<String> = "session-token".into();
        assert_eq!(secret.expose(), "session-token");
    }

    #[test]
    fn blank_detection_ignores_whitespace() {
        assert!(Secret::from("  \n").is_blank());
        assert!(Secret::from("").is_blank());
        assert!(!Secret::from(" key ").is_blank());
    }

    #[test]
    fn clone_keeps_value() {
        let secret = Secret::from("abc");
        let copy = secret.clone();
        drop(secret);
        assert_eq!(copy.expose(), "abc");
    }
}
