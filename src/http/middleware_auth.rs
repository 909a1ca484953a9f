use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::{
    errors::HttpError,
    http::{context::AppContext, errors::WebError},
};

/// Middleware requiring the admin bearer key.
///
/// With no `ADMIN_API_KEY` configured the admin surface is disabled outright
/// and answers 503 with a hint; a wrong key is a plain 401.
pub(super) async fn require_admin(
    State(context): State<AppContext>,
    request: Request,
    next: Next,
) -> Result<Response, WebError> {
    let Some(expected) = context.config.admin_api_key.as_deref() else {
        return Err(WebError::Http(HttpError::NotConfigured {
            hint: "ADMIN_API_KEY is not set".to_string(),
        }));
    };

    let presented = request
        .headers()
        .get(http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "));

    match presented {
        Some(key) if key == expected => Ok(next.run(request).await),
        _ => Err(WebError::Http(HttpError::Unauthorized {
            details: "invalid admin key".to_string(),
        })),
    }
}

/// Origin gate for admin-prefixed paths.
///
/// When an allow-list is configured, a browser request whose `Origin` is not
/// on it gets 403 before any key check. Requests without an `Origin` header
/// (cron, server-side tools) pass through to the key check.
pub(super) async fn restrict_admin_origin(
    State(context): State<AppContext>,
    request: Request,
    next: Next,
) -> Result<Response, WebError> {
    let allowed = &context.config.admin_allowed_origins;
    if !allowed.is_empty() {
        if let Some(origin) = request
            .headers()
            .get(http::header::ORIGIN)
            .and_then(|h| h.to_str().ok())
        {
            if !allowed.contains(origin) {
                return Err(WebError::Http(HttpError::Forbidden {
                    details: "origin not allowed".to_string(),
                }));
            }
        }
    }
    Ok(next.run(request).await)
}
