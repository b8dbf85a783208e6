/// HTTP server setup and routing
use crate::{
    auth::{AuthContext, OptionalAuthContext},
    context::AppContext,
    error::{GateError, GateResult},
    metrics,
};
use axum::{
    extract::{MatchedPath, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde_json::json;
use std::time::Instant;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Build the main application router
pub fn build_router(ctx: AppContext) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        .route("/session", get(current_session))
        .route("/session/optional", get(optional_session))
        .with_state(ctx)
        .layer(middleware::from_fn(track_request))
        .layer(TraceLayer::new_for_http())
        .fallback(not_found)
}

/// Record request latency by route
async fn track_request(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(request).await;
    metrics::record_http_request(
        &method,
        &path,
        response.status().as_u16(),
        start.elapsed().as_secs_f64(),
    );
    response
}

/// Health check handler
async fn health_check(State(ctx): State<AppContext>) -> (StatusCode, Json<serde_json::Value>) {
    let database = match crate::db::test_connection(&ctx.db).await {
        Ok(()) => "ok",
        Err(e) => {
            error!("Health check: database unreachable: {}", e);
            "error"
        }
    };
    let cache = match &ctx.redis {
        Some(redis) => match redis.ping().await {
            Ok(()) => "ok",
            Err(e) => {
                warn!("Health check: cache unreachable: {}", e);
                "degraded"
            }
        },
        None => "disabled",
    };

    // A degraded cache only costs latency; the store is required
    let status = if database == "ok" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(json!({
            "status": if status == StatusCode::OK { "ok" } else { "unhealthy" },
            "version": env!("CARGO_PKG_VERSION"),
            "database": database,
            "cache": cache,
        })),
    )
}

/// Prometheus exposition
async fn metrics_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::render_metrics(),
    )
}

/// The principal behind the presented credential
async fn current_session(auth: AuthContext) -> Json<serde_json::Value> {
    Json(json!({ "principal": auth.principal }))
}

/// Like `/session`, but anonymous callers get `null`
async fn optional_session(auth: OptionalAuthContext) -> Json<serde_json::Value> {
    Json(json!({
        "authenticated": auth.principal.is_some(),
        "principal": auth.principal,
    }))
}

/// 404 handler
async fn not_found() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": "NotFound",
            "message": "Endpoint not found"
        })),
    )
}

/// Start the HTTP server
pub async fn serve(ctx: AppContext) -> GateResult<()> {
    let addr = ctx.service_addr();

    info!("Aurora authgate listening on {}", addr);
    info!(
        "   Session cache: {}",
        if ctx.authenticator.has_cache() { "enabled" } else { "store-only" }
    );

    let app = build_router(ctx);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| GateError::Internal(format!("Failed to bind to {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .await
        .map_err(|e| GateError::Internal(format!("Server error: {}", e)))?;

    Ok(())
}
