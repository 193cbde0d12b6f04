//! `AssumeRole` issuer
//!
//! One `AssumeRole` call per credential through the AWS SDK. The client is
//! built once from the static long-lived key, the region and an optional
//! endpoint override. SDK retries are disabled: the rotation engine owns
//! retry policy and must see every failure.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use aws_config::retry::RetryConfig;
use aws_config::timeout::TimeoutConfig;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_sts::config::Credentials as StaticCredentials;
use common::Secret;
use tokio::time::Instant;
use tracing::debug;

use crate::classify::classify_sdk_error;
use crate::constants::{
    DEFAULT_DURATION, DEFAULT_REQUEST_TIMEOUT, DEFAULT_SESSION_NAME_PREFIX, MAX_DURATION,
    MAX_SESSION_NAME_LEN, MIN_DURATION, STATIC_PROVIDER_NAME,
};
use crate::credential::{Credential, CredentialIssuer, IssueFuture};
use crate::error::{Error, Result};

/// Fixed identity/role configuration, set once at startup.
#[derive(Debug, Clone)]
pub struct StsConfig {
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: Secret<String>,
    pub role_arn: String,
    pub session_name_prefix: String,
    pub duration: Duration,
    /// Bound on a single `AssumeRole` attempt
    pub timeout: Duration,
    /// Override of the regional endpoint (tests, VPC endpoints)
    pub endpoint: Option<String>,
}

impl StsConfig {
    /// Configuration with the default session name prefix and 900 s duration.
    pub fn new(
        region: impl Into<String>,
        access_key_id: impl Into<String>,
        secret_access_key: Secret<String>,
        role_arn: impl Into<String>,
    ) -> Self {
        Self {
            region: region.into(),
            access_key_id: access_key_id.into(),
            secret_access_key,
            role_arn: role_arn.into(),
            session_name_prefix: DEFAULT_SESSION_NAME_PREFIX.to_string(),
            duration: DEFAULT_DURATION,
            timeout: DEFAULT_REQUEST_TIMEOUT,
            endpoint: None,
        }
    }
}

/// Issues credentials by assuming a role with a long-lived access key.
pub struct StsIssuer {
    client: aws_sdk_sts::Client,
    config: StsConfig,
    duration_seconds: i32,
}

impl StsIssuer {
    /// Validate `config` and build the SDK client.
    ///
    /// Missing identity, role or region, durations outside what STS grants and
    /// a malformed endpoint override are configuration errors. Nothing is sent
    /// on the network here.
    pub async fn new(config: StsConfig) -> Result<Self> {
        if config.region.trim().is_empty() {
            return Err(Error::Config("region must not be empty".into()));
        }
        if config.access_key_id.trim().is_empty() {
            return Err(Error::Config("access key id must not be empty".into()));
        }
        if config.secret_access_key.is_blank() {
            return Err(Error::Config("secret access key must not be empty".into()));
        }
        if config.role_arn.trim().is_empty() {
            return Err(Error::Config("role ARN must not be empty".into()));
        }
        if config.duration < MIN_DURATION || config.duration > MAX_DURATION {
            return Err(Error::Config(format!(
                "duration must be between {}s and {}s, got {}s",
                MIN_DURATION.as_secs(),
                MAX_DURATION.as_secs(),
                config.duration.as_secs()
            )));
        }
        let duration_seconds = i32::try_from(config.duration.as_secs())
            .map_err(|_| Error::Config("duration does not fit DurationSeconds".into()))?;
        if let Some(endpoint) = &config.endpoint
            && !endpoint.starts_with("http://")
            && !endpoint.starts_with("https://")
        {
            return Err(Error::Config(format!(
                "STS endpoint {endpoint} must be an http(s) URL"
            )));
        }

        let credentials = StaticCredentials::new(
            config.access_key_id.clone(),
            config.secret_access_key.expose().clone(),
            None,
            None,
            STATIC_PROVIDER_NAME,
        );
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials)
            .retry_config(RetryConfig::disabled())
            .timeout_config(
                TimeoutConfig::builder()
                    .operation_timeout(config.timeout)
                    .build(),
            );
        if let Some(endpoint) = &config.endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let client = aws_sdk_sts::Client::new(&loader.load().await);

        Ok(Self {
            client,
            config,
            duration_seconds,
        })
    }

    /// Role this issuer assumes.
    pub fn role_arn(&self) -> &str {
        &self.config.role_arn
    }

    /// Perform one `AssumeRole` exchange.
    ///
    /// Expiry is `issued_at + duration` (the requested duration), never the
    /// server's `Expiration`, so local clock skew cannot extend it.
    pub async fn assume_role(&self) -> Result<Credential> {
        let issued_at = Instant::now();
        let session_name = session_name(&self.config.session_name_prefix, unix_millis());

        let output = self
            .client
            .assume_role()
            .role_arn(&self.config.role_arn)
            .role_session_name(&session_name)
            .duration_seconds(self.duration_seconds)
            .send()
            .await
            .map_err(|e| classify_sdk_error(&e))?;

        let credentials = output
            .credentials()
            .ok_or_else(|| Error::Response("AssumeRole response missing Credentials".into()))?;
        let field = |name: &str, value: &str| {
            if value.is_empty() {
                Err(Error::Response(format!("AssumeRole response missing {name}")))
            } else {
                Ok(value.to_string())
            }
        };

        let credential = Credential::issued(
            field("AccessKeyId", credentials.access_key_id())?,
            field("SecretAccessKey", credentials.secret_access_key())?,
            field("SessionToken", credentials.session_token())?,
            issued_at,
            self.config.duration,
        );
        debug!(
            access_key_id = credential.access_key_id(),
            session_name,
            "assumed role"
        );
        Ok(credential)
    }
}

impl CredentialIssuer for StsIssuer {
    fn issue(&self) -> IssueFuture<'_> {
        Box::pin(self.assume_role())
    }

    fn validity(&self) -> Duration {
        self.config.duration
    }
}

fn unix_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
}

/// `RoleSessionName` for a request sent at `unix_millis`.
fn session_name(prefix: &str, unix_millis: u128) -> String {
    let mut name = format!("{prefix}-{unix_millis}");
    name.truncate(MAX_SESSION_NAME_LEN);
    name
}
