use axum::{
    extract::{Query, State},
    response::{IntoResponse, Json},
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::{
    batch::{WiltScanner, apply_page},
    gateway::fetch_enabled_fids,
    http::context::AppContext,
    recorder::LiveMarkerRecorder,
};

#[derive(Debug, Deserialize)]
pub(super) struct EligibleQuery {
    pub fid: Option<u64>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// Admin wilt-eligibility scan: which recipients have plants inside the wilt
/// threshold, and what a send pass would do. Reads throttle markers, writes
/// nothing.
pub(super) async fn handle_eligible(
    State(context): State<AppContext>,
    Query(params): Query<EligibleQuery>,
) -> impl IntoResponse {
    let fids = match params.fid {
        Some(fid) => vec![fid],
        None => {
            let all = fetch_enabled_fids(context.gateway.as_ref(), context.store()).await;
            apply_page(&all, params.offset, params.limit)
        }
    };

    let scanner = WiltScanner::new(
        context.resolver.clone(),
        context.plant_reader.clone(),
        Arc::new(LiveMarkerRecorder::new(context.store().clone())),
        context.config.windows.wilt_threshold_seconds,
        context.config.batch_concurrency,
    );

    let now = Utc::now().timestamp();
    let (stats, recipients) = scanner.scan(&fids, now).await;

    Json(json!({
        "now": now,
        "threshold_seconds": context.config.windows.wilt_threshold_seconds,
        "stats": stats,
        "recipients": recipients,
    }))
}
