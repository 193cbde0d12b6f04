//! Configuration types and loading
//!
//! Config precedence: env vars > config file > defaults.
//! The AWS secret key is loaded from AWS_SECRET_ACCESS_KEY or
//! secret_access_key_file, never stored in the TOML directly.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use common::Secret;
use credential_pool::{EngineConfig, ReplenishPolicy, RetryPolicy};
use reqwest::Url;
use serde::Deserialize;
use sts_auth::StsConfig;

use crate::link::DEFAULT_VIEWER_URL;

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub aws: AwsConfig,
    pub channel: ChannelConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub rotation: RotationConfig,
}

/// Long-lived identity and the role it assumes
#[derive(Debug, Deserialize)]
pub struct AwsConfig {
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default)]
    pub role_arn: String,
    /// Overridden by AWS_ACCESS_KEY_ID
    #[serde(default)]
    pub access_key_id: String,
    #[serde(skip)]
    pub secret_access_key: Option<Secret<String>>,
    /// Path to a file containing the secret key (alternative to AWS_SECRET_ACCESS_KEY)
    #[serde(default)]
    pub secret_access_key_file: Option<PathBuf>,
    #[serde(default = "default_session_name_prefix")]
    pub session_name_prefix: String,
    #[serde(default = "default_duration_secs")]
    pub duration_secs: u64,
    /// STS endpoint override, e.g. a FIPS or VPC endpoint
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// Signaling channel the join link points at
#[derive(Debug, Deserialize)]
pub struct ChannelConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_viewer_url")]
    pub viewer_url: String,
}

/// HTTP listener settings
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplenishMode {
    Bounded,
    Continuous,
}

/// Engine timing, mapped onto `credential_pool::EngineConfig`
#[derive(Debug, Deserialize)]
pub struct RotationConfig {
    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,
    #[serde(default = "default_rotation_margin_secs")]
    pub rotation_margin_secs: u64,
    #[serde(default = "default_prefetch_interval_secs")]
    pub prefetch_interval_secs: u64,
    #[serde(default = "default_max_pool_size")]
    pub max_pool_size: usize,
    #[serde(default = "default_replenish")]
    pub replenish: ReplenishMode,
    #[serde(default = "default_max_background_fetches")]
    pub max_background_fetches: u32,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            max_connections: default_max_connections(),
        }
    }
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: default_check_interval_secs(),
            rotation_margin_secs: default_rotation_margin_secs(),
            prefetch_interval_secs: default_prefetch_interval_secs(),
            max_pool_size: default_max_pool_size(),
            replenish: default_replenish(),
            max_background_fetches: default_max_background_fetches(),
            retry_attempts: default_retry_attempts(),
        }
    }
}

fn default_region() -> String {
    sts_auth::DEFAULT_REGION.to_string()
}

fn default_session_name_prefix() -> String {
    sts_auth::DEFAULT_SESSION_NAME_PREFIX.to_string()
}

fn default_duration_secs() -> u64 {
    sts_auth::DEFAULT_DURATION.as_secs()
}

fn default_request_timeout_secs() -> u64 {
    sts_auth::DEFAULT_REQUEST_TIMEOUT.as_secs()
}

fn default_viewer_url() -> String {
    DEFAULT_VIEWER_URL.to_string()
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

fn default_max_connections() -> usize {
    64
}

fn default_check_interval_secs() -> u64 {
    credential_pool::config::DEFAULT_CHECK_INTERVAL.as_secs()
}

fn default_rotation_margin_secs() -> u64 {
    credential_pool::config::DEFAULT_ROTATION_MARGIN.as_secs()
}

fn default_prefetch_interval_secs() -> u64 {
    credential_pool::config::DEFAULT_PREFETCH_INTERVAL.as_secs()
}

fn default_max_pool_size() -> usize {
    credential_pool::config::DEFAULT_MAX_POOL_SIZE
}

fn default_replenish() -> ReplenishMode {
    ReplenishMode::Bounded
}

fn default_max_background_fetches() -> u32 {
    credential_pool::config::DEFAULT_MAX_BACKGROUND_FETCHES
}

fn default_retry_attempts() -> u32 {
    RetryPolicy::default().max_attempts
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// Secret key resolution order:
    /// 1. AWS_SECRET_ACCESS_KEY env var, unless blank
    /// 2. secret_access_key_file path from config
    ///
    /// Fails if the identity, role or channel is missing.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        if let Ok(id) = std::env::var("AWS_ACCESS_KEY_ID")
            && !id.trim().is_empty()
        {
            config.aws.access_key_id = id.trim().to_owned();
        }

        if let Ok(key) = std::env::var("AWS_SECRET_ACCESS_KEY")
            && !key.trim().is_empty()
        {
            config.aws.secret_access_key = Some(Secret::new(key.trim().to_owned()));
        } else if let Some(ref key_file) = config.aws.secret_access_key_file {
            let key = std::fs::read_to_string(key_file).map_err(|e| {
                common::Error::Config(format!(
                    "failed to read secret_access_key_file {}: {e}",
                    key_file.display()
                ))
            })?;
            let key = key.trim().to_owned();
            if !key.is_empty() {
                config.aws.secret_access_key = Some(Secret::new(key));
            }
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> common::Result<()> {
        if self.aws.access_key_id.trim().is_empty() {
            return Err(common::Error::missing("aws.access_key_id"));
        }
        match &self.aws.secret_access_key {
            Some(secret) if !secret.is_blank() => {}
            _ => return Err(common::Error::missing("aws.secret_access_key")),
        }
        if self.aws.role_arn.trim().is_empty() {
            return Err(common::Error::missing("aws.role_arn"));
        }
        if self.channel.name.trim().is_empty() {
            return Err(common::Error::missing("channel.name"));
        }
        if self.aws.request_timeout_secs == 0 {
            return Err(common::Error::Config(
                "request_timeout_secs must be greater than 0".into(),
            ));
        }
        self.viewer_url()?;

        if self.server.max_connections == 0 {
            return Err(common::Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// Parsed base URL of the viewer page.
    pub fn viewer_url(&self) -> common::Result<Url> {
        let url = Url::parse(&self.channel.viewer_url).map_err(|e| {
            common::Error::Config(format!(
                "viewer_url is not a valid URL ({e}): {}",
                self.channel.viewer_url
            ))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(common::Error::Config(format!(
                "viewer_url must start with http:// or https://, got: {}",
                self.channel.viewer_url
            )));
        }
        Ok(url)
    }

    /// Settings for the STS issuer.
    pub fn sts_config(&self) -> StsConfig {
        let secret = self
            .aws
            .secret_access_key
            .clone()
            .unwrap_or_else(|| Secret::new(String::new()));
        let mut sts = StsConfig::new(
            &self.aws.region,
            &self.aws.access_key_id,
            secret,
            &self.aws.role_arn,
        );
        sts.session_name_prefix = self.aws.session_name_prefix.clone();
        sts.duration = Duration::from_secs(self.aws.duration_secs);
        sts.endpoint = self.aws.endpoint.clone();
        sts.timeout = Duration::from_secs(self.aws.request_timeout_secs);
        sts
    }

    /// Settings for the credential engine.
    pub fn engine_config(&self) -> EngineConfig {
        let r = &self.rotation;
        EngineConfig {
            check_interval: Duration::from_secs(r.check_interval_secs),
            rotation_margin: Duration::from_secs(r.rotation_margin_secs),
            prefetch_interval: Duration::from_secs(r.prefetch_interval_secs),
            max_pool_size: r.max_pool_size,
            replenish: match r.replenish {
                ReplenishMode::Bounded => ReplenishPolicy::Bounded {
                    max_fetches: r.max_background_fetches,
                },
                ReplenishMode::Continuous => ReplenishPolicy::Continuous,
            },
            retry: RetryPolicy {
                max_attempts: r.retry_attempts,
                ..RetryPolicy::default()
            },
        }
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("kvs-viewer-link.toml")
    }
}
