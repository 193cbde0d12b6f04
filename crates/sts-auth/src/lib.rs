//! Short-lived credential issuance via AWS STS
//!
//! Exchanges a long-lived access key pair plus a target role for one
//! short-lived credential with a fixed validity window. This crate is the
//! leaf of the rotation engine: it performs exactly one outbound exchange per
//! call and never retries. Retry policy belongs to the caller.
//!
//! Issuance flow:
//! 1. Caller builds an `StsConfig` (identity, role, region, duration)
//! 2. `StsIssuer::new()` validates it and builds an SDK client once at startup
//! 3. Each `CredentialIssuer::issue()` sends one `AssumeRole` call
//! 4. The response becomes a `Credential` expiring `duration` after the
//!    request was sent
//! 5. Failures are classified into `Error` variants so callers can tell
//!    throttling and outages apart from revoked keys and bad requests

pub mod classify;
pub mod constants;
pub mod credential;
pub mod error;
pub mod sts;

pub use classify::classify_code;
pub use constants::*;
pub use credential::{Credential, CredentialIssuer, IssueFuture};
pub use error::{Error, Result};
pub use sts::{StsConfig, StsIssuer};
