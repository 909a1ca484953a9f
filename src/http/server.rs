use std::time::Duration;

use axum::{
    Router, middleware,
    response::Json,
    routing::{delete, get, post},
};
use http::{
    HeaderValue, Method,
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tower_http::{
    classify::ServerErrorsFailureClass,
    cors::{AllowOrigin, CorsLayer},
    timeout::TimeoutLayer,
};
use tracing::Span;

use crate::http::{
    context::AppContext,
    handle_admin::{handle_admin_fidmap, handle_admin_log, handle_admin_send},
    handle_cron::handle_fence_expiry,
    handle_eligible::handle_eligible,
    handle_keys::{handle_delete_keys, handle_list_keys, handle_reset},
    handle_notify::handle_notify,
    middleware_auth::{require_admin, restrict_admin_origin},
};

pub fn build_router(context: AppContext) -> Router {
    // Key-gated admin surface
    let admin_routes = Router::new()
        .route("/eligible", get(handle_eligible))
        .route(
            "/notifications/keys",
            get(handle_list_keys).delete(handle_delete_keys),
        )
        .route("/notifications/reset", delete(handle_reset))
        .route("/admin/notifications/send", post(handle_admin_send))
        .route("/admin/notifications/log", get(handle_admin_log))
        .route("/admin/fidmap", post(handle_admin_fidmap))
        .layer(middleware::from_fn_with_state(
            context.clone(),
            require_admin,
        ))
        // Outermost on this subtree: a disallowed browser origin is refused
        // before the key is even looked at
        .layer(middleware::from_fn_with_state(
            context.clone(),
            restrict_admin_origin,
        ));

    let version = context.config.version.clone();
    let router = Router::new()
        .route(
            "/healthz",
            get(move || {
                let version = version.clone();
                async move { Json(json!({"status": "ok", "version": version})) }
            }),
        )
        .route("/notify", post(handle_notify))
        .route(
            "/cron/fence-expiry",
            get(handle_fence_expiry).post(handle_fence_expiry),
        )
        .merge(admin_routes);

    let origins: Vec<HeaderValue> = context
        .config
        .admin_allowed_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|request: &http::Request<_>| {
            let trace_id = request
                .headers()
                .get("x-trace-id")
                .and_then(|h| h.to_str().ok())
                .map(String::from)
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

            tracing::info_span!(
                "http_request",
                method = %request.method(),
                uri = %request.uri(),
                trace_id = %trace_id,
                request_id = %uuid::Uuid::new_v4(),
            )
        })
        .on_request(|request: &http::Request<_>, _span: &Span| {
            tracing::info!(
                "started processing request {} {}",
                request.method(),
                request.uri().path()
            );
        })
        .on_response(
            |response: &http::Response<_>, latency: Duration, _span: &Span| {
                tracing::info!(
                    status = response.status().as_u16(),
                    latency_ms = latency.as_millis(),
                    "finished processing request"
                );
            },
        )
        .on_failure(
            |err: ServerErrorsFailureClass, latency: Duration, _span: &Span| {
                tracing::error!(
                    error = ?err,
                    latency_ms = latency.as_millis(),
                    "request failed"
                );
            },
        );

    router
        .layer((trace_layer, TimeoutLayer::new(Duration::from_secs(30))))
        .layer(
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods([Method::GET, Method::POST, Method::DELETE])
                .allow_headers([ACCEPT, AUTHORIZATION, CONTENT_TYPE]),
        )
        .with_state(context)
}
