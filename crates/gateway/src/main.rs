//! Counsel API Gateway
//!
//! The main entry point for all external API requests.
//! Handles:
//! - Query answering and fragment ingestion
//! - Summaries, document analysis and drafting
//! - Rate limiting
//! - Request routing
//! - Observability (logging, metrics, request ids)

mod handlers;
mod middleware;

use anyhow::Context;
use axum::{
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use counsel_common::{
    config::{AppConfig, ObservabilityConfig},
    context::{AssemblerConfig, ContextAssembler},
    embeddings::create_embedder,
    index::{Ingestor, VectorIndex, VectorRetriever},
    llm::{ModelRegistry, ModelRouter},
    metrics,
    pipeline::{OrchestratorConfig, QueryOrchestrator},
};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use middleware::rate_limit::{rate_limit_middleware, RateLimitState};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub orchestrator: Arc<QueryOrchestrator>,
    pub ingestor: Arc<Ingestor>,
    pub index: Arc<VectorIndex>,
    pub registry: Arc<ModelRegistry>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Wire every component from configuration
    pub fn from_config(config: AppConfig) -> counsel_common::Result<Self> {
        let embedder = create_embedder(&config.embedding)?;

        let index = Arc::new(VectorIndex::new(
            config.embedding.model.clone(),
            config.embedding.dimension,
            config.index.metric,
            config.index.max_fragment_chars,
        ));

        let retriever = Arc::new(VectorRetriever::new(Arc::clone(&embedder), Arc::clone(&index))?);
        let ingestor = Arc::new(Ingestor::new(embedder, Arc::clone(&index)));

        let registry = Arc::new(ModelRegistry::from_config(&config.models)?);
        let router = Arc::new(ModelRouter::new(
            Arc::clone(&registry),
            config.models.timeout_retries,
        ));

        let orchestrator = Arc::new(QueryOrchestrator::new(
            retriever,
            ContextAssembler::new(AssemblerConfig::from(&config.retrieval)),
            router,
            OrchestratorConfig::from(&config),
        )?);

        Ok(Self {
            config: Arc::new(config),
            orchestrator,
            ingestor,
            index,
            registry,
            started_at: Utc::now(),
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load().context("Failed to load configuration")?;

    // Initialize tracing
    init_tracing(&config.observability);

    info!("Starting Counsel API Gateway v{}", counsel_common::VERSION);

    config.validate().context("Invalid configuration")?;

    // Initialize metrics
    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], config.observability.metrics_port))
        .set_buckets(metrics::LATENCY_BUCKETS)?
        .set_buckets_for_metric(
            Matcher::Full(format!("{}_embedding_duration_seconds", metrics::METRICS_PREFIX)),
            metrics::EMBEDDING_BUCKETS,
        )?
        .install()
        .context("Failed to install Prometheus exporter")?;
    metrics::register_metrics();

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server.host / server.port")?;
    let shutdown_timeout = config.shutdown_timeout();

    // Create app state
    let state = AppState::from_config(config).context("Failed to initialise query pipeline")?;
    let routing = state.orchestrator.config();
    let deadline = match routing.deadline {
        Some(deadline) => deadline,
        None => state
            .orchestrator
            .router()
            .overall_deadline(&routing.preference)
            .await
            .context("Invalid model preference order")?,
    };
    info!(
        embedding_model = %state.index.model(),
        dimension = state.index.dimension(),
        metric = ?state.index.metric(),
        models = ?routing.preference,
        deadline_ms = deadline.as_millis() as u64,
        "Query pipeline ready"
    );

    let registry = Arc::clone(&state.registry);

    // Build the router
    let app = create_router(state);

    // Start the server
    info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Release model clients
    if tokio::time::timeout(shutdown_timeout, registry.shutdown()).await.is_err() {
        tracing::warn!("Model registry shutdown timed out");
    }

    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    if config.json_logging {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let rate_limit = RateLimitState::from_config(&state.config.rate_limit);

    // API routes
    let api_routes = Router::new()
        // Health endpoints
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        // Query endpoints
        .route("/query", post(handlers::query::query))
        .route("/query/batch", post(handlers::query::batch_query))
        // Summaries, analysis and drafting
        .route("/summaries", post(handlers::tasks::summarize))
        .route("/analyses", post(handlers::tasks::analyze))
        .route("/documents", post(handlers::tasks::draft))
        // Ingestion
        .route("/fragments", post(handlers::fragments::upsert_fragments))
        // Metrics wrap the limiter so rejected requests are counted too
        .route_layer(axum::middleware::from_fn_with_state(rate_limit, rate_limit_middleware))
        .route_layer(axum::middleware::from_fn(middleware::request_metrics::track_requests));

    // Compose the app
    Router::new()
        .nest("/v1", api_routes)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(cors),
        )
        .with_state(state)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
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
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn test_state() -> AppState {
        let mut config = AppConfig::default();
        config.rate_limit.enabled = false;
        AppState::from_config(config).unwrap()
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, body)
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_and_request_id() {
        let app = create_router(test_state());
        let response = app
            .oneshot(Request::builder().uri("/v1/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn test_ingest_then_query() {
        let state = test_state();
        let app = create_router(state.clone());

        let (status, body) = send(
            app.clone(),
            post_json(
                "/v1/fragments",
                serde_json::json!({
                    "fragments": [{
                        "source_title": "Companies Act, 2015",
                        "source_url": "https://kenyalaw.org/act/2015/17",
                        "jurisdiction": "kenya",
                        "document_type": "legislation",
                        "text": "A private company is registered by lodging an application for registration with the registrar."
                    }]
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["inserted"], 1);
        assert_eq!(state.index.len().await, 1);

        let (status, body) = send(
            app,
            post_json(
                "/v1/query",
                serde_json::json!({ "query": "registration of a private company", "context": { "jurisdiction": "kenya" } }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["status"], "completed");
        assert_eq!(body["model_used"], "counsel-mock");
        assert_eq!(body["sources"][0]["title"], "Companies Act, 2015");
    }

    #[tokio::test]
    async fn test_empty_query_is_bad_request() {
        let app = create_router(test_state());
        let (status, body) = send(app, post_json("/v1/query", serde_json::json!({ "query": "   " }))).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "INVALID_INPUT");
    }

    #[tokio::test]
    async fn test_task_endpoints() {
        let app = create_router(test_state());

        let (status, body) = send(
            app.clone(),
            post_json("/v1/summaries", serde_json::json!({ "text": "The lessee shall pay rent monthly." })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["task"], "summary");
        assert_eq!(body["status"], "completed");
        assert_eq!(body["model_used"], "counsel-mock");

        let (status, body) = send(
            app.clone(),
            post_json("/v1/analyses", serde_json::json!({ "content": "DEED OF ASSIGNMENT made this day..." })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["task"], "analysis");

        let (status, body) = send(
            app.clone(),
            post_json(
                "/v1/documents",
                serde_json::json!({ "document_type": "Rental Agreement", "parameters": { "rent_kes": 25000 } }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["task"], "drafting");

        let (status, body) = send(
            app.clone(),
            post_json("/v1/documents", serde_json::json!({ "document_type": "prenup" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["field"], "document_type");

        let oversized = "x".repeat(60_000);
        let (status, body) = send(app, post_json("/v1/summaries", serde_json::json!({ "text": oversized }))).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body["error"]["code"], "PAYLOAD_TOO_LARGE");
    }

    #[tokio::test]
    async fn test_batch_limit_and_mixed_results() {
        let app = create_router(test_state());

        let too_many: Vec<String> = (0..11).map(|i| format!("question {}", i)).collect();
        let (status, _) = send(app.clone(), post_json("/v1/query/batch", serde_json::json!({ "queries": too_many }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(
            app,
            post_json("/v1/query/batch", serde_json::json!({ "queries": ["land tenure", ""] })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["results"][0]["status"], "completed");
        assert_eq!(body["results"][1]["error"]["code"], "INVALID_INPUT");
    }

    #[tokio::test]
    async fn test_rate_limit_rejects_excess() {
        let mut config = AppConfig::default();
        config.embedding.dimension = 32;
        config.rate_limit.requests_per_second = 1;
        config.rate_limit.burst = 1;
        let app = create_router(AppState::from_config(config).unwrap());

        let health = || Request::builder().uri("/v1/health").body(Body::empty()).unwrap();
        let first = app.clone().oneshot(health()).await.unwrap();
        let second = app.oneshot(health()).await.unwrap();

        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_rate_limited_requests_are_counted() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let _guard = ::metrics::set_default_local_recorder(&recorder);

        let mut config = AppConfig::default();
        config.rate_limit.requests_per_second = 1;
        config.rate_limit.burst = 1;
        let app = create_router(AppState::from_config(config).unwrap());

        let health = || Request::builder().uri("/v1/health").body(Body::empty()).unwrap();
        app.clone().oneshot(health()).await.unwrap();
        let rejected = app.oneshot(health()).await.unwrap();
        assert_eq!(rejected.status(), StatusCode::TOO_MANY_REQUESTS);

        let rendered = handle.render();
        let requests: Vec<&str> = rendered
            .lines()
            .filter(|line| line.starts_with("counsel_requests_total{"))
            .collect();
        assert!(requests.iter().any(|line| line.contains("status=\"200\"")), "{}", rendered);
        assert!(requests.iter().any(|line| line.contains("status=\"429\"")), "{}", rendered);
    }
}
