// Read-only HTTP status API over the latest published snapshot

mod http;

use std::future::Future;

use axum::{Router, routing::get};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

use crate::worker::SummaryRx;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) summary_rx: SummaryRx,
}

pub fn app(summary_rx: SummaryRx) -> Router {
    let state = AppState { summary_rx };
    Router::new()
        .route("/", get(|| async { "trafficmon: router traffic accounting" })) // GET /
        .route("/version", get(http::version_handler)) // GET /version
        .route("/api/summary", get(http::summary_handler)) // GET /api/summary
        .route("/api/top", get(http::top_handler)) // GET /api/top
        .layer(CorsLayer::new().allow_origin(Any))
        .with_state(state)
}

/// Serve `app` on `listener` until `shutdown` resolves or the server fails. Failures are
/// logged, not returned: either way the caller goes on to stop the worker.
pub async fn serve_until<F>(listener: TcpListener, app: Router, shutdown: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
    {
        tracing::error!(error = %e, "Status API stopped");
    }
}
