use axum::{
    extract::{Query, State},
    response::{IntoResponse, Json},
};
use serde::Deserialize;
use serde_json::json;

use crate::{
    errors::HttpError,
    gateway::NotificationPayload,
    http::{context::AppContext, errors::WebError},
    storage::keys,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct AdminSendRequest {
    /// Explicit recipients; absent means every fid previously notified.
    pub fids: Option<Vec<u64>>,
    pub title: String,
    pub body: String,
    pub target_url: Option<String>,
    #[serde(default = "default_notification_type")]
    pub notification_type: String,
}

fn default_notification_type() -> String {
    "manual".to_string()
}

/// Broadcast a notification to an explicit fid list, or to the accumulated
/// eligible-fid set when none is given.
pub(super) async fn handle_admin_send(
    State(context): State<AppContext>,
    Json(request): Json<AdminSendRequest>,
) -> Result<impl IntoResponse, WebError> {
    if request.title.trim().is_empty() || request.body.trim().is_empty() {
        return Err(WebError::Http(HttpError::RequestValidation {
            details: "title and body are required".to_string(),
        }));
    }

    let fids = match request.fids {
        Some(fids) if !fids.is_empty() => fids,
        _ => {
            let members = context
                .store()
                .smembers(keys::ELIGIBLE_FIDS)
                .await
                .unwrap_or_default();
            let mut fids: Vec<u64> = members.iter().filter_map(|m| m.parse().ok()).collect();
            fids.sort_unstable();
            fids
        }
    };

    let payload = NotificationPayload {
        title: request.title,
        body: request.body,
        target_url: request
            .target_url
            .unwrap_or_else(|| context.config.external_base.clone()),
    };
    let report = context
        .sender()
        .send_to_fids(&fids, &payload, &request.notification_type)
        .await;

    Ok(Json(json!({
        "ok": report.ok,
        "targeted": fids.len(),
        "sent": report.sent,
        "failed": report.failed,
        "errors": report.errors,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct LogQuery {
    /// Logical notification type; absent means the global scope.
    pub r#type: Option<String>,
    pub limit: Option<usize>,
}

/// Delivery bookkeeping for one scope: recent log entries, the last-sent
/// map, and the monotonic sent counter.
pub(super) async fn handle_admin_log(
    State(context): State<AppContext>,
    Query(params): Query<LogQuery>,
) -> impl IntoResponse {
    let scope = match &params.r#type {
        Some(t) => keys::type_scope(t),
        None => "global".to_string(),
    };
    let limit = params.limit.unwrap_or(50).min(crate::constants::DELIVERY_LOG_MAX_ENTRIES);

    let raw_log = context
        .store()
        .lrange(&keys::delivery_log(&scope), limit)
        .await
        .unwrap_or_default();
    let log: Vec<serde_json::Value> = raw_log
        .iter()
        .filter_map(|entry| serde_json::from_str(entry).ok())
        .collect();
    let last = context
        .store()
        .hgetall(&keys::delivery_last(&scope))
        .await
        .unwrap_or_default();
    let sent_count = context
        .store()
        .get(&keys::delivery_sent_count(&scope))
        .await
        .ok()
        .flatten()
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(0);

    Json(json!({
        "scope": scope,
        "sentCount": sent_count,
        "log": log,
        "last": last,
    }))
}

#[derive(Debug, Deserialize)]
pub(super) struct FidmapRequest {
    pub fid: u64,
    pub address: String,
}

/// Manually pin a fid-to-address mapping, bypassing the identity API.
pub(super) async fn handle_admin_fidmap(
    State(context): State<AppContext>,
    Json(request): Json<FidmapRequest>,
) -> Result<impl IntoResponse, WebError> {
    if request.fid == 0 {
        return Err(WebError::Http(HttpError::RequestValidation {
            details: "fid must be positive".to_string(),
        }));
    }
    let address = request.address.trim();
    if !address.starts_with("0x") || address.len() != 42 {
        return Err(WebError::Http(HttpError::RequestValidation {
            details: "address must be a 0x-prefixed 40-hex-char string".to_string(),
        }));
    }

    context
        .resolver
        .set_mapping(request.fid, address)
        .await
        .map_err(|e| {
            WebError::Http(HttpError::Unhandled {
                details: e.to_string(),
            })
        })?;

    Ok(Json(json!({
        "fid": request.fid,
        "address": address.to_lowercase(),
    })))
}
