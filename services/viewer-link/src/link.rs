//! Viewer join links
//!
//! A join link is the viewer page URL with the signaling channel and the
//! active temporary credential embedded as query parameters. The link is
//! rebuilt every time the engine swaps credentials.

use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::SystemTime;

use reqwest::Url;
use sts_auth::Credential;
use tracing::info;

/// Hosted KVS WebRTC test page, opened in viewer mode.
pub const DEFAULT_VIEWER_URL: &str =
    "https://sirknightj.github.io/amazon-kinesis-video-streams-webrtc-sdk-js/examples/index.html";

/// Fixed viewer flags: receive-only, media ingestion on, no data channel.
const VIEWER_FLAGS: [(&str, &str); 6] = [
    ("sendVideo", "false"),
    ("sendAudio", "false"),
    ("ingest-media", "true"),
    ("ingest-media-manual-on", "false"),
    ("openDataChannel", "false"),
    ("view", "viewer"),
];

/// Build the join URL for `channel` using `credential`.
///
/// Existing query parameters on `base` are kept.
pub fn build_join_url(base: &Url, channel: &str, region: &str, credential: &Credential) -> Url {
    let mut url = base.clone();
    url.query_pairs_mut()
        .append_pair("channelName", channel)
        .append_pair("region", region)
        .append_pair("accessKeyId", credential.access_key_id())
        .append_pair("secretAccessKey", credential.secret_access_key().expose())
        .append_pair("sessionToken", credential.session_token().expose())
        .extend_pairs(VIEWER_FLAGS);
    url
}

/// The most recently published link.
///
/// `Debug` omits the query string, which carries the secret key and token.
#[derive(Clone)]
pub struct JoinLink {
    pub url: Url,
    pub access_key_id: String,
    pub expires_at: SystemTime,
    pub published_at: SystemTime,
}

impl fmt::Debug for JoinLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut url = self.url.clone();
        if url.query().is_some() {
            url.set_query(Some("[REDACTED]"));
        }
        url.set_fragment(None);
        f.debug_struct("JoinLink")
            .field("url", &url.as_str())
            .field("access_key_id", &self.access_key_id)
            .field("expires_at", &self.expires_at)
            .field("published_at", &self.published_at)
            .finish()
    }
}

/// Rebuilds and stores the join link on every credential change.
#[derive(Clone)]
pub struct LinkPublisher {
    base: Url,
    channel: String,
    region: String,
    current: Arc<RwLock<Option<JoinLink>>>,
}

impl LinkPublisher {
    pub fn new(base: Url, channel: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            base,
            channel: channel.into(),
            region: region.into(),
            current: Arc::new(RwLock::new(None)),
        }
    }

    /// Publish a link for `credential`, replacing the previous one.
    pub fn publish(&self, credential: &Credential) {
        let link = JoinLink {
            url: build_join_url(&self.base, &self.channel, &self.region, credential),
            access_key_id: credential.access_key_id().to_string(),
            expires_at: credential.expires_at_wall(),
            published_at: SystemTime::now(),
        };
        crate::metrics::record_link_published(link.expires_at);
        info!(
            channel = %self.channel,
            access_key_id = %link.access_key_id,
            "published viewer join link"
        );

        let mut current = self.current.write().unwrap_or_else(|e| e.into_inner());
        *current = Some(link);
    }

    pub fn current(&self) -> Option<JoinLink> {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Change hook for `Engine::start`.
    pub fn hook(&self) -> impl Fn(&Credential) + Send + Sync + 'static {
        let publisher = self.clone();
        move |credential: &Credential| publisher.publish(credential)
    }
}
