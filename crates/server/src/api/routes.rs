use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::{cleanup, conversions, files, handlers, logs, middleware::metrics_middleware, options};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // API routes
    let api_routes = Router::new()
        // Health, status and config
        .route("/health", get(handlers::health))
        .route("/status", get(handlers::get_status))
        .route("/config", get(handlers::get_config))
        // Runtime options
        .route("/options", get(options::get_options))
        .route("/options", post(options::update_options))
        // Conversions
        .route("/conversions/stats", get(conversions::get_stats))
        .route("/conversions/recent", get(conversions::get_recent))
        .route("/conversions/start", post(conversions::start_conversion))
        .route("/conversions/bulk", post(conversions::start_bulk))
        .route("/conversions/bulk", get(conversions::get_bulk_status))
        .route("/conversions/bulk/cancel", post(conversions::cancel_bulk))
        // Converted files
        .route(
            "/files/delete/{attachment_id}/{format}",
            delete(files::delete_file),
        )
        // Activity log
        .route("/logs", get(logs::query_logs))
        // Maintenance
        .route("/cleanup/temp-files", post(cleanup::cleanup_temp_files))
        .route("/cleanup/old-records", post(cleanup::cleanup_old_records))
        // Prometheus
        .route("/metrics", get(handlers::metrics))
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_routes)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
