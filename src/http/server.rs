//! HTTP server setup.
//!
//! # Responsibilities
//! - Create the axum Router and wire up tower layers (request ID, tracing)
//! - Hand every request to the current pipeline generation
//! - Turn escaping pipeline errors into status codes
//! - Apply pipeline reloads while serving
//!
//! # Design Decisions
//! - A request loads the pipeline once and keeps that generation to the end
//! - Reload failures keep the running generation
//! - The listener itself is never rebound on reload

use std::io;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::config::schema::ServerConfig;
use crate::http::request::{propagate_request_id_layer, set_request_id_layer};
use crate::observability::metrics;
use crate::pipeline::{BuildError, FilterRegistry, HttpContext, PipelineError, SharedPipeline};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: SharedPipeline,
}

/// HTTP server hosting one filter pipeline.
pub struct HttpServer {
    router: Router,
    pipeline: SharedPipeline,
    config: ServerConfig,
}

impl HttpServer {
    /// Build the first pipeline generation and the router around it.
    pub fn new(config: ServerConfig, registry: FilterRegistry) -> Result<Self, BuildError> {
        let pipeline = SharedPipeline::new(&config.pipeline, Arc::new(registry))?;
        let router = Self::build_router(AppState {
            pipeline: pipeline.clone(),
        });
        Ok(Self {
            router,
            pipeline,
            config,
        })
    }

    fn build_router(state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(pipeline_handler))
            .route("/", any(pipeline_handler))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(set_request_id_layer())
                    .layer(TraceLayer::new_for_http())
                    .layer(propagate_request_id_layer()),
            )
    }

    /// Serve until `shutdown` fires, applying configs from `config_updates`.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<ServerConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> io::Result<()> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            pipeline = %self.config.pipeline.name,
            filters = self.config.pipeline.filters.len(),
            "HTTP server starting"
        );

        let pipeline = self.pipeline.clone();
        let bind_address = self.config.listener.bind_address.clone();
        let reloader = tokio::spawn(async move {
            while let Some(config) = config_updates.recv().await {
                if config.listener.bind_address != bind_address {
                    tracing::warn!(
                        current = %bind_address,
                        requested = %config.listener.bind_address,
                        "Listener changes need a restart, ignoring"
                    );
                }
                if let Err(e) = pipeline.reload(&config.pipeline) {
                    tracing::error!(error = %e, "Pipeline reload failed, keeping current generation");
                }
            }
        });

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        reloader.abort();
        self.pipeline.close();
        tracing::info!("HTTP server stopped");
        Ok(())
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// The router with all layers, for driving the server without a socket.
    pub fn router(&self) -> Router {
        self.router.clone()
    }
}

fn error_status(error: &PipelineError) -> StatusCode {
    match error {
        PipelineError::Cancelled(_) => StatusCode::SERVICE_UNAVAILABLE,
        PipelineError::Upstream(_) => StatusCode::BAD_GATEWAY,
        PipelineError::Filter { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Runs the request through the current pipeline generation.
async fn pipeline_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let pipeline = state.pipeline.load();

    let mut ctx = HttpContext::new(request);
    let response = match pipeline.handle(&mut ctx).await {
        Ok(label) => {
            tracing::debug!(
                request_id = %ctx.request_id(),
                pipeline = %pipeline.name(),
                path = %path,
                result = %label,
                tags = ?ctx.tags(),
                "Pipeline finished"
            );
            metrics::record_pipeline_result(pipeline.name(), &label);
            ctx.into_response()
        }
        Err(e) => {
            let status = error_status(&e);
            tracing::warn!(
                request_id = %ctx.request_id(),
                pipeline = %pipeline.name(),
                path = %path,
                status = status.as_u16(),
                error = %e,
                "Pipeline failed"
            );
            (status, e.to_string()).into_response()
        }
    };

    metrics::record_request(&method, response.status().as_u16(), start);
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::CancelReason;
    use tower::ServiceExt;

    fn server(toml: &str) -> HttpServer {
        let config: ServerConfig = toml::from_str(toml).unwrap();
        HttpServer::new(config, FilterRegistry::with_builtin()).unwrap()
    }

    fn get(path: &str) -> Request<Body> {
        Request::builder().uri(path).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_empty_pipeline_answers_ok() {
        let response = server("").router().oneshot(get("/anything")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn test_client_request_id_is_kept() {
        let response = server("")
            .router()
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header("x-request-id", "abc-123")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.headers()["x-request-id"], "abc-123");
    }

    #[tokio::test]
    async fn test_time_limiter_in_front_of_slow_mock() {
        let server = server(
            r#"
            [[pipeline.filters]]
            name = "limiter"
            kind = "TimeLimiter"
            [[pipeline.filters.urls]]
            timeoutDuration = "30ms"
            matchRule = { path = "/slow" }

            [[pipeline.filters]]
            name = "backend"
            kind = "Mock"
            [[pipeline.filters.rules]]
            delay = "2s"
            body = "late"
            "#,
        );

        let start = Instant::now();
        let response = server.router().oneshot(get("/slow")).await.unwrap();
        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
        assert_eq!(response.headers()["x-time-limiter"], "timed-out");
        assert!(start.elapsed() < std::time::Duration::from_secs(1));
    }

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(
            error_status(&PipelineError::Cancelled(CancelReason::Timeout)),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            error_status(&PipelineError::Upstream("refused".into())),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            error_status(&PipelineError::Filter {
                filter: "f".into(),
                message: "m".into()
            }),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
