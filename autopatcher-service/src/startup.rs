//! Application startup and lifecycle management.

use crate::config::{AutopatcherConfig, StoreBackend};
use crate::handlers::{assist, events, health, pages, webhooks};
use crate::services::providers::{build_text_provider, TextProvider};
use crate::services::{
    metrics, Assistant, EventStore, GitHubClient, MemoryEventStore, RedisEventStore,
    WebhookProcessor,
};
use axum::{
    extract::DefaultBodyLimit,
    http::{header, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::{
    metrics::metrics_middleware,
    rate_limit::{ip_rate_limit_middleware, IpRateLimit},
    security_headers::security_headers_middleware,
    tracing::{http_trace_layer, request_id_middleware, REQUEST_ID_HEADER},
};
use std::future::Future;
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};

/// GitHub caps webhook payloads at 25 MB.
const WEBHOOK_BODY_LIMIT: usize = 25 * 1024 * 1024;

const RATE_LIMIT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// Room for multipart boundaries and headers around the uploaded file.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AutopatcherConfig>,
    pub assistant: Assistant,
    pub github: GitHubClient,
    pub store: Arc<dyn EventStore>,
    pub webhooks: WebhookProcessor,
}

impl AppState {
    /// Wire services together around an already-built provider and store.
    pub fn new(
        config: AutopatcherConfig,
        provider: Arc<dyn TextProvider>,
        store: Arc<dyn EventStore>,
    ) -> Result<Self, AppError> {
        let assistant = Assistant::new(
            provider,
            config.llm.max_output_tokens,
            config.limits.max_diff_chars,
        )
        .with_temperature(config.llm.temperature);

        let github = GitHubClient::new(&config.github).map_err(|e| {
            AppError::ConfigError(anyhow::anyhow!("Failed to create GitHub client: {}", e))
        })?;

        let webhooks = WebhookProcessor::new(
            github.clone(),
            assistant.clone(),
            store.clone(),
            config.webhook.concurrency,
            config.webhook.max_files_per_event,
            config.webhook.max_inflight_jobs,
        );

        Ok(Self {
            config: Arc::new(config),
            assistant,
            github,
            store,
            webhooks,
        })
    }
}

pub fn build_router(state: AppState) -> Router {
    let max_upload = state.config.limits.max_upload_bytes;

    let mut assist_routes = Router::new()
        .route(
            "/api/analyze-yml",
            post(assist::analyze_yml).layer(DefaultBodyLimit::max(max_upload + MULTIPART_OVERHEAD)),
        )
        .route("/api/generate-yml", post(assist::generate_yml))
        .route("/api/explain-code", post(assist::explain_code))
        .route("/api/summarize-diff", post(assist::summarize_diff));

    match NonZeroU32::new(state.config.limits.rate_limit_per_minute) {
        Some(per_minute) => {
            let trust_forwarded_for = state.config.limits.trust_forwarded_for;
            tracing::info!(
                per_minute,
                trust_forwarded_for,
                "IP rate limiting enabled on assist endpoints"
            );
            let limit = IpRateLimit::new(per_minute, trust_forwarded_for);
            limit.spawn_cleanup(RATE_LIMIT_CLEANUP_INTERVAL);
            assist_routes =
                assist_routes.route_layer(from_fn_with_state(limit, ip_rate_limit_middleware));
        }
        None => tracing::info!("IP rate limiting disabled"),
    }

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::HeaderName::from_static(REQUEST_ID_HEADER)]);

    let api_routes = assist_routes
        .route(
            "/api/webhooks/github",
            post(webhooks::github_webhook).layer(DefaultBodyLimit::max(WEBHOOK_BODY_LIMIT)),
        )
        .route("/api/webhook-events", get(events::list_events))
        .route("/api/webhook-events/:id", get(events::get_event))
        .layer(cors);

    Router::new()
        .route("/", get(pages::index))
        .route("/monitor", get(pages::monitor))
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .route("/metrics", get(health::metrics))
        .merge(api_routes)
        .layer(from_fn(metrics_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(http_trace_layer())
        .layer(from_fn(request_id_middleware))
        .with_state(state)
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: AutopatcherConfig) -> Result<Self, AppError> {
        let provider = build_text_provider(&config.llm).map_err(|e| {
            tracing::error!("Failed to initialize text provider: {}", e);
            AppError::ConfigError(anyhow::anyhow!(e))
        })?;

        Self::build_with_provider(config, provider).await
    }

    /// Build with a caller-supplied provider (scripted mocks in tests).
    pub async fn build_with_provider(
        config: AutopatcherConfig,
        provider: Arc<dyn TextProvider>,
    ) -> Result<Self, AppError> {
        metrics::init_metrics();

        // A failing vendor should not keep the webhook receiver down
        if let Err(e) = provider.health_check().await {
            tracing::warn!(
                provider = provider.name(),
                error = %e,
                "Text provider health check failed; assist requests may fail"
            );
        }

        let store = connect_store(&config).await?;
        let state = AppState::new(config, provider, store)?;

        // Port 0 picks a free port
        let address = state.config.common.bind_address();
        let listener = TcpListener::bind(&address).await.map_err(|e| {
            tracing::error!("Failed to bind listener to {}: {}", address, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(port, "AutoPatcher service listening");

        Ok(Self {
            port,
            listener,
            state,
        })
    }

    /// Get the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Run the application until a shutdown signal arrives.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        self.run_until(shutdown_signal()).await
    }

    /// Serve until `shutdown` resolves, then let accepted webhook jobs finish
    /// before returning.
    pub async fn run_until<F>(self, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let webhooks = self.state.webhooks.clone();
        let router = build_router(self.state);

        let served = axum::serve(
            self.listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await;

        webhooks.drain().await;
        tracing::info!("AutoPatcher service stopped");
        served
    }
}

async fn connect_store(config: &AutopatcherConfig) -> Result<Arc<dyn EventStore>, AppError> {
    match config.store.backend {
        StoreBackend::Memory => {
            tracing::info!(capacity = config.store.capacity, "Using in-memory event store");
            Ok(Arc::new(MemoryEventStore::new(config.store.capacity)))
        }
        StoreBackend::Redis => {
            let store = RedisEventStore::connect(&config.store)
                .await
                .map_err(|e| AppError::StorageError(anyhow::anyhow!(e)))?;
            Ok(Arc::new(store))
        }
    }
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
