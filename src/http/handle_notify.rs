use axum::{
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Json},
};
use serde::Deserialize;
use serde_json::json;

use crate::{
    errors::HttpError,
    gateway::NotificationPayload,
    http::{context::AppContext, errors::WebError},
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct NotifyRequest {
    pub fid: u64,
    pub title: String,
    pub body: String,
    pub target_url: Option<String>,
}

/// Public single-recipient notify path, guarded by a shared secret and the
/// two-scope rate limiter. Responses stay deliberately generic so callers
/// learn nothing about internal delivery state.
pub(super) async fn handle_notify(
    State(context): State<AppContext>,
    headers: HeaderMap,
    Json(request): Json<NotifyRequest>,
) -> Result<impl IntoResponse, WebError> {
    let Some(expected) = context.config.notification_secret.as_deref() else {
        return Err(WebError::Http(HttpError::NotConfigured {
            hint: "NOTIFICATION_SECRET is not set".to_string(),
        }));
    };
    let presented = headers
        .get("x-notification-secret")
        .and_then(|h| h.to_str().ok());
    if presented != Some(expected) {
        return Err(WebError::Http(HttpError::Unauthorized {
            details: "invalid notification secret".to_string(),
        }));
    }

    if request.fid == 0 {
        return Err(WebError::Http(HttpError::RequestValidation {
            details: "fid must be positive".to_string(),
        }));
    }
    if request.title.trim().is_empty() || request.title.len() > 32 {
        return Err(WebError::Http(HttpError::RequestValidation {
            details: "title must be 1-32 characters".to_string(),
        }));
    }
    if request.body.trim().is_empty() || request.body.len() > 128 {
        return Err(WebError::Http(HttpError::RequestValidation {
            details: "body must be 1-128 characters".to_string(),
        }));
    }

    let allowed = context
        .rate_limiter
        .allow_notify(
            request.fid,
            &context.config.rate_limit_global,
            &context.config.rate_limit_fid,
        )
        .await;
    if !allowed {
        return Err(WebError::Http(HttpError::RateLimited {
            details: "notify rate limit exceeded".to_string(),
        }));
    }

    let payload = NotificationPayload {
        title: request.title,
        body: request.body,
        target_url: request
            .target_url
            .unwrap_or_else(|| context.config.external_base.clone()),
    };
    let report = context
        .sender()
        .send_to_fids(&[request.fid], &payload, "manual")
        .await;

    Ok(Json(json!({"ok": report.ok})))
}
