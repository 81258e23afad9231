use axum::{
    Router,
    routing::{get, post},
};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::handlers::{self, scan};
use crate::infra::app_state::AppState;

/// Scan endpoints. Unsupported methods on these paths answer with a JSON 405.
pub fn create_scan_router() -> Router<AppState> {
    Router::new()
        .route(
            "/init_scan",
            post(scan::start_scan_handler).fallback(handlers::method_not_allowed),
        )
        .route(
            "/results",
            get(scan::results_handler).fallback(handlers::method_not_allowed),
        )
        .route(
            "/scan/status",
            get(scan::scan_status_handler).fallback(handlers::method_not_allowed),
        )
}

/// Complete application: scan routes, JSON 404 fallback and request tracing.
pub fn create_app(state: AppState) -> Router {
    create_scan_router()
        .fallback(handlers::not_found)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}
