//! Web server module: liveness endpoint and target management API.

mod handlers;

pub use handlers::*;

use crate::db::Store;
use crate::monitor::Monitor;

use axum::{
    extract::{DefaultBodyLimit, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::{get, put},
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub monitor: Arc<Monitor>,
}

/// Web server for healthwatch.
pub struct Server {
    port: u16,
    api_key: Option<Arc<str>>,
    state: AppState,
}

impl Server {
    /// Create a new server with the given dependencies.
    ///
    /// Without an `api_key` every `/api` request is refused.
    pub fn new(
        port: u16,
        api_key: Option<String>,
        store: Arc<Store>,
        monitor: Arc<Monitor>,
    ) -> Self {
        Self {
            port,
            api_key: api_key.map(Arc::from),
            state: AppState { store, monitor },
        }
    }

    /// Build the router with all routes.
    pub(crate) fn routes(&self) -> Router {
        let api = Router::new()
            .route(
                "/api/targets",
                get(handlers::handle_get_targets)
                    .post(handlers::handle_create_target)
                    .delete(handlers::handle_delete_all_targets),
            )
            .route(
                "/api/targets/{name}",
                get(handlers::handle_get_target).delete(handlers::handle_delete_target),
            )
            .route(
                "/api/targets/{name}/response-time",
                put(handlers::handle_set_response_time),
            )
            .route("/api/targets/{name}/content", put(handlers::handle_set_content))
            .route(
                "/api/targets/{name}/ssl-threshold",
                put(handlers::handle_set_ssl_threshold),
            )
            .route(
                "/api/settings/ssl-threshold",
                put(handlers::handle_set_global_ssl_threshold),
            )
            .route_layer(middleware::from_fn_with_state(
                self.api_key.clone(),
                require_api_key,
            ));

        Router::new()
            .route("/health", get(handlers::handle_health))
            .merge(api)
            .layer(TraceLayer::new_for_http())
            .layer(DefaultBodyLimit::max(64 * 1024))
            .with_state(self.state.clone())
    }

    /// Serve on the configured port until `shutdown` resolves.
    pub async fn start<F>(&self, shutdown: F) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let router = self.routes();

        tracing::info!("Health check server listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("Health check server stopped");
        Ok(())
    }
}

/// Reject requests whose `X-API-Key` header does not match the configured key.
async fn require_api_key(
    State(expected): State<Option<Arc<str>>>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let Some(expected) = expected else {
        tracing::debug!("Management API disabled, rejecting {}", request.uri().path());
        return Err(StatusCode::UNAUTHORIZED);
    };

    match headers.get("X-API-Key").and_then(|v| v.to_str().ok()) {
        Some(key) if key == &*expected => Ok(next.run(request).await),
        Some(_) => {
            tracing::warn!("Invalid API key for {}", request.uri().path());
            Err(StatusCode::UNAUTHORIZED)
        }
        None => Err(StatusCode::UNAUTHORIZED),
    }
}
