use axum::{
    extract::{Query, State},
    response::{IntoResponse, Json},
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::{
    fence::FenceExpiryJob,
    gateway::fetch_enabled_fids,
    http::context::AppContext,
    recorder::{DryRunRecorder, LiveMarkerRecorder},
};

#[derive(Debug, Deserialize)]
pub(super) struct CronQuery {
    /// `debug=1` evaluates without sending or writing markers and returns
    /// the mutations the run would have performed.
    pub debug: Option<String>,
    pub fid: Option<u64>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

pub(super) async fn handle_fence_expiry(
    State(context): State<AppContext>,
    Query(params): Query<CronQuery>,
) -> impl IntoResponse {
    let fids = match params.fid {
        Some(fid) => vec![fid],
        None => {
            let all = fetch_enabled_fids(context.gateway.as_ref(), context.store()).await;
            crate::batch::apply_page(&all, params.offset, params.limit)
        }
    };

    let dry_run = params.debug.as_deref() == Some("1");
    let now = Utc::now().timestamp();
    let windows = context.config.windows.clone();
    let app_url = context.config.external_base.clone();

    if dry_run {
        let recorder = Arc::new(DryRunRecorder::new());
        let job = FenceExpiryJob::new(
            context.resolver.clone(),
            context.plant_reader.clone(),
            recorder.clone(),
            None,
            windows,
            context.config.batch_concurrency,
            app_url,
        );
        let (stats, outcomes) = job.run(&fids, now).await;
        Json(json!({
            "dryRun": true,
            "now": now,
            "stats": stats,
            "outcomes": outcomes,
            "intents": recorder.intents(),
        }))
    } else {
        let job = FenceExpiryJob::new(
            context.resolver.clone(),
            context.plant_reader.clone(),
            Arc::new(LiveMarkerRecorder::new(context.store().clone())),
            Some(context.sender().clone()),
            windows,
            context.config.batch_concurrency,
            app_url,
        );
        let (stats, outcomes) = job.run(&fids, now).await;
        Json(json!({
            "dryRun": false,
            "now": now,
            "stats": stats,
            "outcomes": outcomes,
        }))
    }
}
