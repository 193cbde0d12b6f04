//! KVS viewer link service
//!
//! Single-binary Rust service that:
//! 1. Assumes an IAM role through STS to get short-lived credentials
//! 2. Keeps a credential continuously valid with a prefetch pool
//! 3. Publishes a viewer join link for the signaling channel on every swap
//! 4. Serves the link, health, metrics and a manual rotation endpoint

mod config;
mod link;
mod metrics;

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use credential_pool::{CredentialIssuer, Engine};
use metrics_exporter_prometheus::PrometheusHandle;
use sts_auth::StsIssuer;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::link::LinkPublisher;

/// Time allowed for in-flight requests after a shutdown signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared application state accessible from all handlers
#[derive(Clone)]
struct AppState {
    engine: Arc<Engine>,
    links: LinkPublisher,
    prometheus: PrometheusHandle,
    started_at: Instant,
}

/// Build the axum router with all routes and shared state.
fn build_router(state: AppState, max_connections: usize) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/link", get(link_handler))
        .route("/rotate", post(rotate_handler))
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting kvs-viewer-link");

    // Install before the engine starts so the startup rotation is recorded
    let prometheus_handle =
        metrics::install_recorder().context("failed to install Prometheus recorder")?;

    // CLI: simple --config flag parsing
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        listen_addr = %config.server.listen_addr,
        region = %config.aws.region,
        channel = %config.channel.name,
        replenish = ?config.rotation.replenish,
        "configuration loaded"
    );

    let sts = StsIssuer::new(config.sts_config())
        .await
        .context("invalid STS configuration")?;
    info!(
        role_arn = sts.role_arn(),
        duration_secs = sts.validity().as_secs(),
        "STS issuer ready"
    );
    let issuer: Arc<dyn CredentialIssuer> = Arc::new(sts);

    let links = LinkPublisher::new(
        config.viewer_url()?,
        config.channel.name.clone(),
        config.aws.region.clone(),
    );

    let engine = Engine::start(config.engine_config(), issuer, links.hook())
        .await
        .context("credential engine failed to start")?;
    let engine = Arc::new(engine);

    let app_state = AppState {
        engine: engine.clone(),
        links,
        prometheus: prometheus_handle,
        started_at: Instant::now(),
    };
    let app = build_router(app_state, config.server.max_connections);

    let listen_addr = config.server.listen_addr;
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind to {listen_addr}"))?;
    info!(addr = %listen_addr, "accepting requests");

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    shutdown_signal().await;

    // Stop rotating first so no credential swaps happen while draining
    engine.shutdown().await;
    let _ = shutdown_tx.send(());

    // The drain timer starts at signal receipt
    match tokio::time::timeout(DRAIN_TIMEOUT, server_handle).await {
        Ok(Ok(Ok(()))) => info!("all in-flight requests drained"),
        Ok(Ok(Err(e))) => error!(error = %e, "server error during shutdown"),
        Ok(Err(e)) => error!(error = %e, "server task panicked"),
        Err(_) => warn!(
            drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
            "drain timeout exceeded, forcing shutdown"
        ),
    }

    info!("shutdown complete");
    Ok(())
}

fn json_response(status: StatusCode, body: serde_json::Value) -> Response {
    (
        status,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
        .into_response()
}

fn error_response(status: StatusCode, error_type: &str, message: &str) -> Response {
    json_response(
        status,
        serde_json::json!({
            "error": {
                "type": error_type,
                "message": message,
            }
        }),
    )
}

/// Seconds from now until `at`, zero if already past.
fn secs_until(at: SystemTime) -> u64 {
    at.duration_since(SystemTime::now())
        .unwrap_or_default()
        .as_secs()
}

/// Engine health plus service uptime.
/// Returns 200 when the published credential clears the rotation margin, 503 otherwise.
async fn health_handler(State(state): State<AppState>) -> Response {
    let started = Instant::now();
    let mut body = state.engine.health().await;
    let healthy = body["status"] == "healthy";
    body["uptime_seconds"] = state.started_at.elapsed().as_secs().into();
    body["link_published"] = state.links.current().is_some().into();

    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    metrics::record_request("/health", status.as_u16(), started.elapsed().as_secs_f64());
    json_response(status, body)
}

/// Prometheus metrics endpoint, text exposition format.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}

/// Current join link with its remaining validity.
async fn link_handler(State(state): State<AppState>) -> Response {
    let started = Instant::now();
    let response = match state.links.current() {
        Some(link) => {
            let expires_in = secs_until(link.expires_at);
            let margin = state.engine.config().rotation_margin.as_secs();
            json_response(
                StatusCode::OK,
                serde_json::json!({
                    "url": link.url.as_str(),
                    "channel": state.links.channel(),
                    "access_key_id": link.access_key_id,
                    "expires_in_secs": expires_in,
                    "rotates_in_secs": expires_in.saturating_sub(margin),
                    "published_secs_ago": link
                        .published_at
                        .elapsed()
                        .unwrap_or_default()
                        .as_secs(),
                }),
            )
        }
        None => error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "not_ready",
            "no join link has been published yet",
        ),
    };
    metrics::record_request("/link", response.status().as_u16(), started.elapsed().as_secs_f64());
    response
}

/// Manual rotation override.
async fn rotate_handler(State(state): State<AppState>) -> Response {
    let started = Instant::now();
    let response = match state.engine.manual_rotate().await {
        Ok(rotation) => {
            info!(
                source = rotation.source.label(),
                access_key_id = %rotation.access_key_id,
                "manual rotation requested over HTTP"
            );
            json_response(
                StatusCode::OK,
                serde_json::json!({
                    "source": rotation.source.label(),
                    "access_key_id": rotation.access_key_id,
                    "expires_in_secs": secs_until(rotation.expires_at),
                }),
            )
        }
        Err(credential_pool::Error::Shutdown) => error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "shutting_down",
            "credential engine is shut down",
        ),
        Err(e) => {
            warn!(error = %e, "manual rotation failed");
            error_response(StatusCode::BAD_GATEWAY, "rotation_failed", &e.to_string())
        }
    };
    metrics::record_request("/rotate", response.status().as_u16(), started.elapsed().as_secs_f64());
    response
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
