use axum::{
    extract::{Query, State},
    response::{IntoResponse, Json},
};
use serde::Deserialize;
use serde_json::json;

use crate::{
    constants::KEY_SCAN_LIMIT,
    errors::HttpError,
    http::{context::AppContext, errors::WebError},
    storage::keys,
};

#[derive(Debug, Deserialize)]
pub(super) struct KeysQuery {
    pub pattern: Option<String>,
}

/// List keys matching a pattern (default `notif:*`) with their TTLs.
pub(super) async fn handle_list_keys(
    State(context): State<AppContext>,
    Query(params): Query<KeysQuery>,
) -> Result<impl IntoResponse, WebError> {
    let pattern = params.pattern.unwrap_or_else(|| "notif:*".to_string());

    let found = context
        .store()
        .scan_keys(&pattern, KEY_SCAN_LIMIT)
        .await
        .map_err(|e| {
            WebError::Http(HttpError::Unhandled {
                details: e.to_string(),
            })
        })?;

    let mut entries = Vec::with_capacity(found.len());
    for key in found {
        let ttl = context.store().ttl(&key).await.unwrap_or(None);
        entries.push(json!({"key": key, "ttl": ttl}));
    }

    Ok(Json(json!({
        "pattern": pattern,
        "count": entries.len(),
        "keys": entries,
    })))
}

#[derive(Debug, Deserialize)]
pub(super) struct DeleteKeysQuery {
    pub key: Option<String>,
    pub pattern: Option<String>,
    pub confirm: Option<bool>,
}

/// Delete one key, or every key under an allow-listed prefix.
///
/// Pattern deletes require `confirm=true` and a pattern beginning with one
/// of the deletable prefixes; anything else is refused outright.
pub(super) async fn handle_delete_keys(
    State(context): State<AppContext>,
    Query(params): Query<DeleteKeysQuery>,
) -> Result<impl IntoResponse, WebError> {
    if let Some(key) = params.key {
        let deleted = context.store().delete(&key).await.map_err(|e| {
            WebError::Http(HttpError::Unhandled {
                details: e.to_string(),
            })
        })?;
        return Ok(Json(json!({"deleted": deleted})));
    }

    let Some(pattern) = params.pattern else {
        return Err(WebError::Http(HttpError::RequestValidation {
            details: "key or pattern is required".to_string(),
        }));
    };

    if params.confirm != Some(true) {
        return Err(WebError::Http(HttpError::RequestValidation {
            details: "pattern deletes require confirm=true".to_string(),
        }));
    }
    if !keys::DELETABLE_PREFIXES
        .iter()
        .any(|prefix| pattern.starts_with(prefix))
    {
        return Err(WebError::Http(HttpError::RequestValidation {
            details: format!("pattern must start with one of {:?}", keys::DELETABLE_PREFIXES),
        }));
    }

    let found = context
        .store()
        .scan_keys(&pattern, KEY_SCAN_LIMIT)
        .await
        .map_err(|e| {
            WebError::Http(HttpError::Unhandled {
                details: e.to_string(),
            })
        })?;

    let mut deleted = 0u64;
    for key in &found {
        deleted += context.store().delete(key).await.unwrap_or(0);
    }

    Ok(Json(json!({"pattern": pattern, "matched": found.len(), "deleted": deleted})))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct ResetQuery {
    pub scope: String,
    pub fid: Option<u64>,
    pub plant_id: Option<u64>,
}

/// Reset throttle state so the next job run fires again.
///
/// Scopes: `all` clears every throttle and rate key, `fid` clears one
/// recipient's wilt and fence markers, `plant` clears one (fid, plant)
/// pair, `fence` clears only fence markers.
pub(super) async fn handle_reset(
    State(context): State<AppContext>,
    Query(params): Query<ResetQuery>,
) -> Result<impl IntoResponse, WebError> {
    let patterns: Vec<String> = match params.scope.as_str() {
        "all" => keys::DELETABLE_PREFIXES
            .iter()
            .map(|prefix| format!("{}*", prefix))
            .collect(),
        "fid" => {
            let fid = require_fid(params.fid)?;
            vec![
                keys::wilt_fid(fid),
                format!("{}:fid:{}:plant:*", keys::WILT_PREFIX, fid),
                format!("{}:*:fid:{}:plant:*", keys::FENCE_PREFIX, fid),
                keys::rate_fid(fid),
            ]
        }
        "plant" => {
            let fid = require_fid(params.fid)?;
            let Some(plant_id) = params.plant_id else {
                return Err(WebError::Http(HttpError::RequestValidation {
                    details: "plantId is required for scope=plant".to_string(),
                }));
            };
            vec![
                keys::wilt_plant(fid, plant_id),
                keys::fence_warned(fid, plant_id),
                keys::fence_expired(fid, plant_id),
                keys::fence_pending(fid, plant_id),
            ]
        }
        "fence" => vec![format!("{}:*", keys::FENCE_PREFIX)],
        other => {
            return Err(WebError::Http(HttpError::RequestValidation {
                details: format!("unknown scope: {}", other),
            }));
        }
    };

    let mut deleted = 0u64;
    for pattern in &patterns {
        if pattern.contains('*') {
            let found = context
                .store()
                .scan_keys(pattern, KEY_SCAN_LIMIT)
                .await
                .unwrap_or_default();
            for key in found {
                deleted += context.store().delete(&key).await.unwrap_or(0);
            }
        } else {
            deleted += context.store().delete(pattern).await.unwrap_or(0);
        }
    }

    Ok(Json(json!({"scope": params.scope, "deleted": deleted})))
}

fn require_fid(fid: Option<u64>) -> Result<u64, WebError> {
    fid.ok_or_else(|| {
        WebError::Http(HttpError::RequestValidation {
            details: "fid is required for this scope".to_string(),
        })
    })
}
