//! AWS STS constants
//!
//! Values fixed by the STS `AssumeRole` API and by the viewer deployment this
//! service was built for. None of them are secrets.

use std::time::Duration;

/// Region used when configuration does not name one
pub const DEFAULT_REGION: &str = "us-west-2";

/// Validity requested for every issued credential.
pub const DEFAULT_DURATION: Duration = Duration::from_secs(900);

/// Shortest session STS will grant for `AssumeRole`
pub const MIN_DURATION: Duration = Duration::from_secs(900);

/// Longest session STS will grant for `AssumeRole` (role maximum permitting)
pub const MAX_DURATION: Duration = Duration::from_secs(43_200);

/// Prefix of the `RoleSessionName`; the issuance time in unix millis is appended.
pub const DEFAULT_SESSION_NAME_PREFIX: &str = "kvs-webrtc";

/// STS rejects session names longer than this
pub const MAX_SESSION_NAME_LEN: usize = 64;

/// Upper bound on one `AssumeRole` attempt, connect through response body.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Provider name attached to the long-lived static credentials.
pub const STATIC_PROVIDER_NAME: &str = "kvs-viewer-link";
