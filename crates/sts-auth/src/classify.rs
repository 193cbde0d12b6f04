//! Classification of STS failures
//!
//! The SDK surfaces every failed `AssumeRole` as an `SdkError`. Transport
//! failures map straight to `Error::Http`; service errors are classified by
//! their error code first, because STS answers throttling with 400
//! `Throttling`, and by HTTP status only when the code is unknown.

use aws_sdk_sts::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_sts::operation::assume_role::AssumeRoleError;

use crate::error::Error;

/// Error codes meaning the long-lived identity or its permissions are bad.
const UNAUTHORIZED_CODES: &[&str] = &[
    "AccessDenied",
    "InvalidClientTokenId",
    "InvalidAccessKeyId",
    "SignatureDoesNotMatch",
    "ExpiredToken",
    "ExpiredTokenException",
    "MissingAuthenticationToken",
    "UnrecognizedClientException",
];

/// Error codes meaning the caller is being rate limited.
const THROTTLE_CODES: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "RequestLimitExceeded",
    "TooManyRequestsException",
];

/// Error codes for STS-side faults reported with a 4xx status.
const UPSTREAM_CODES: &[&str] = &["IDPCommunicationError", "ServiceUnavailable", "InternalFailure"];

/// Classify a failed `AssumeRole` call.
pub(crate) fn classify_sdk_error(err: &SdkError<AssumeRoleError>) -> Error {
    match err {
        SdkError::ConstructionFailure(_) => Error::Config(context(err)),
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) => Error::Http(context(err)),
        SdkError::ResponseError(response) => {
            if response.raw().status().as_u16() >= 500 {
                Error::Upstream(context(err))
            } else {
                Error::Response(context(err))
            }
        }
        SdkError::ServiceError(service) => classify_code(
            service.raw().status().as_u16(),
            service.err().code(),
            service.err().message(),
        ),
        _ => Error::Upstream(context(err)),
    }
}

/// Classify an STS error response by status and error code.
///
/// Known codes take precedence. Otherwise 401/403 are `Unauthorized`, 429 is
/// `Throttled`, any other 4xx is `Rejected` and 5xx is `Upstream`. A failure
/// carrying a success status means the body could not be used: `Response`.
pub fn classify_code(status: u16, code: Option<&str>, message: Option<&str>) -> Error {
    let code = code.filter(|code| !code.is_empty());
    let message = message.map(|message| truncate(message, 200)).unwrap_or_default();
    let detail = match code {
        Some(code) if message.is_empty() => format!("{status} {code}"),
        Some(code) => format!("{status} {code}: {message}"),
        None if message.is_empty() => format!("HTTP {status}"),
        None => format!("{status}: {message}"),
    };

    if let Some(code) = code {
        if UNAUTHORIZED_CODES.contains(&code) {
            return Error::Unauthorized(detail);
        }
        if THROTTLE_CODES.contains(&code) {
            return Error::Throttled(detail);
        }
        if UPSTREAM_CODES.contains(&code) {
            return Error::Upstream(detail);
        }
    }

    match status {
        401 | 403 => Error::Unauthorized(detail),
        429 => Error::Throttled(detail),
        400..=499 => Error::Rejected(detail),
        500..=599 => Error::Upstream(detail),
        _ => Error::Response(detail),
    }
}

fn context(err: &SdkError<AssumeRoleError>) -> String {
    DisplayErrorContext(err).to_string()
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
