//! The fence warn/expire batch job behind the fence-expiry cron endpoint.
//!
//! Two-sided condition per (fid, plant): an advance warning while the fence
//! is still up, and an expiry push once it lapses, each guarded by its own
//! throttle marker. A pending marker written for every observed active fence
//! lets a later run detect an expiry that happened between scans; pending
//! markers whose grace window passed uncaught are garbage-collected so stale
//! state never accumulates.

use crate::chain::PlantReader;
use crate::config::WindowConfig;
use crate::eligibility::{FenceWindow, fence_window, pending_is_stale};
use crate::gateway::NotificationPayload;
use crate::identity::FidResolver;
use crate::recorder::MarkerRecorder;
use crate::sender::NotificationSender;
use crate::storage::keys;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

/// One plant that crossed a fence window.
#[derive(Debug, Clone, Serialize)]
pub struct PlantAlert {
    pub plant_id: u64,
    pub seconds_left: i64,
}

/// Per-recipient result of one fence evaluation pass.
#[derive(Debug, Clone, Serialize)]
pub struct FenceOutcome {
    pub fid: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<crate::batch::SkipReason>,
    pub warn: Vec<PlantAlert>,
    pub expire: Vec<PlantAlert>,
    /// Expiries detected through reconciliation: the fence was active in a
    /// previous scan but is no longer observed, and its recorded expiry now
    /// falls inside the grace window.
    pub pending_expired: Vec<PlantAlert>,
}

impl FenceOutcome {
    fn skipped(fid: u64, reason: crate::batch::SkipReason) -> Self {
        Self {
            fid,
            skipped: Some(reason),
            warn: Vec::new(),
            expire: Vec::new(),
            pending_expired: Vec::new(),
        }
    }

    fn empty(fid: u64) -> Self {
        Self {
            fid,
            skipped: None,
            warn: Vec::new(),
            expire: Vec::new(),
            pending_expired: Vec::new(),
        }
    }
}

/// Exact aggregate statistics for one job run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FenceStats {
    pub checked: usize,
    pub no_address: usize,
    pub fetch_failed: usize,
    pub warned: usize,
    pub expired: usize,
    pub reconciled: usize,
    pub collected: usize,
    pub sent_warn: usize,
    pub sent_expire: usize,
    pub send_failed: usize,
}

pub struct FenceExpiryJob {
    resolver: Arc<FidResolver>,
    reader: Arc<dyn PlantReader>,
    recorder: Arc<dyn MarkerRecorder>,
    /// Absent in dry runs: no pushes, no delivery bookkeeping.
    sender: Option<Arc<NotificationSender>>,
    windows: WindowConfig,
    concurrency: usize,
    app_url: String,
}

impl FenceExpiryJob {
    pub fn new(
        resolver: Arc<FidResolver>,
        reader: Arc<dyn PlantReader>,
        recorder: Arc<dyn MarkerRecorder>,
        sender: Option<Arc<NotificationSender>>,
        windows: WindowConfig,
        concurrency: usize,
        app_url: String,
    ) -> Self {
        Self {
            resolver,
            reader,
            recorder,
            sender,
            windows,
            concurrency,
            app_url,
        }
    }

    /// Run the job over `fids` at time `now`, returning exact stats and the
    /// per-recipient outcomes.
    pub async fn run(&self, fids: &[u64], now: i64) -> (FenceStats, Vec<FenceOutcome>) {
        let outcomes = crate::batch::run_windowed(fids, self.concurrency, |fid| {
            self.process_recipient(fid, now)
        })
        .await;

        let mut stats = FenceStats {
            checked: outcomes.len(),
            ..Default::default()
        };
        for (outcome, send) in &outcomes {
            match outcome.skipped {
                Some(crate::batch::SkipReason::NoAddress) => stats.no_address += 1,
                Some(crate::batch::SkipReason::FetchFailed) => stats.fetch_failed += 1,
                None => {}
            }
            stats.warned += outcome.warn.len();
            stats.expired += outcome.expire.len();
            stats.reconciled += outcome.pending_expired.len();
            stats.collected += send.collected;
            stats.sent_warn += send.sent_warn;
            stats.sent_expire += send.sent_expire;
            stats.send_failed += send.send_failed;
        }

        info!(
            checked = stats.checked,
            warned = stats.warned,
            expired = stats.expired,
            reconciled = stats.reconciled,
            collected = stats.collected,
            "Fence-expiry job finished"
        );

        (stats, outcomes.into_iter().map(|(o, _)| o).collect())
    }

    async fn process_recipient(&self, fid: u64, now: i64) -> (FenceOutcome, RecipientSendStats) {
        let mut send_stats = RecipientSendStats::default();

        let Some(address) = self.resolver.resolve(fid).await else {
            return (
                FenceOutcome::skipped(fid, crate::batch::SkipReason::NoAddress),
                send_stats,
            );
        };

        let plants = match self.reader.plants_by_owner(&address).await {
            Ok(plants) => plants,
            Err(e) => {
                tracing::debug!(error = %e, fid = fid, "Plant fetch failed in fence job");
                return (
                    FenceOutcome::skipped(fid, crate::batch::SkipReason::FetchFailed),
                    send_stats,
                );
            }
        };

        let mut outcome = FenceOutcome::empty(fid);
        let mut observed: HashSet<u64> = HashSet::new();

        for plant in &plants {
            let Some(until) = plant.fence_until() else {
                continue;
            };
            observed.insert(plant.id);
            let seconds_left = until - now;
            match fence_window(
                seconds_left,
                self.windows.fence_warn_window_seconds,
                self.windows.fence_grace_seconds,
            ) {
                FenceWindow::Warn => {
                    if self
                        .recorder
                        .claim_marker(
                            &keys::fence_warned(fid, plant.id),
                            self.windows.fence_warn_window_seconds as u64,
                        )
                        .await
                    {
                        outcome.warn.push(PlantAlert {
                            plant_id: plant.id,
                            seconds_left,
                        });
                    }
                    self.write_pending(fid, plant.id, until).await;
                }
                FenceWindow::Expire => {
                    if self
                        .recorder
                        .claim_marker(
                            &keys::fence_expired(fid, plant.id),
                            self.windows.fence_expired_marker_ttl_seconds,
                        )
                        .await
                    {
                        outcome.expire.push(PlantAlert {
                            plant_id: plant.id,
                            seconds_left,
                        });
                    }
                    self.recorder
                        .delete_marker(&keys::fence_pending(fid, plant.id))
                        .await;
                }
                FenceWindow::None => {
                    if seconds_left > 0 {
                        // Active but outside the warn window: keep the
                        // pending record fresh for reconciliation
                        self.write_pending(fid, plant.id, until).await;
                    } else {
                        // Lapsed beyond grace while still reported: too
                        // late to fire, drop the stale pending record
                        self.recorder
                            .delete_marker(&keys::fence_pending(fid, plant.id))
                            .await;
                        send_stats.collected += 1;
                    }
                }
            }
        }

        // Reconciliation: pending markers for fences no longer observed
        // active cover expiries that happened between two scans
        for (plant_id, until) in self.recorder.scan_pending(fid).await {
            if observed.contains(&plant_id) {
                continue;
            }
            let seconds_left = until - now;
            if fence_window(
                seconds_left,
                self.windows.fence_warn_window_seconds,
                self.windows.fence_grace_seconds,
            ) == FenceWindow::Expire
            {
                if self
                    .recorder
                    .claim_marker(
                        &keys::fence_expired(fid, plant_id),
                        self.windows.fence_expired_marker_ttl_seconds,
                    )
                    .await
                {
                    outcome.pending_expired.push(PlantAlert {
                        plant_id,
                        seconds_left,
                    });
                }
                self.recorder
                    .delete_marker(&keys::fence_pending(fid, plant_id))
                    .await;
            } else if pending_is_stale(seconds_left, self.windows.fence_grace_seconds) {
                self.recorder
                    .delete_marker(&keys::fence_pending(fid, plant_id))
                    .await;
                send_stats.collected += 1;
            }
        }

        if let Some(sender) = &self.sender {
            if !outcome.warn.is_empty() {
                let report = sender
                    .send_to_fids(&[fid], &self.warn_payload(&outcome.warn), "fence-warn")
                    .await;
                send_stats.sent_warn += report.sent;
                send_stats.send_failed += report.failed;
            }
            let expired_count = outcome.expire.len() + outcome.pending_expired.len();
            if expired_count > 0 {
                let report = sender
                    .send_to_fids(&[fid], &self.expire_payload(expired_count), "fence-expired")
                    .await;
                send_stats.sent_expire += report.sent;
                send_stats.send_failed += report.failed;
            }
        }

        (outcome, send_stats)
    }

    async fn write_pending(&self, fid: u64, plant_id: u64, until: i64) {
        self.recorder
            .write_pending(
                &keys::fence_pending(fid, plant_id),
                until,
                self.windows.fence_pending_ttl_seconds,
            )
            .await;
    }

    fn warn_payload(&self, alerts: &[PlantAlert]) -> NotificationPayload {
        let body = if alerts.len() == 1 {
            "A fence around one of your plants expires soon. Renew it to stay protected!"
                .to_string()
        } else {
            format!(
                "Fences around {} of your plants expire soon. Renew them to stay protected!",
                alerts.len()
            )
        };
        NotificationPayload {
            title: "Fence expiring soon".to_string(),
            body,
            target_url: self.app_url.clone(),
        }
    }

    fn expire_payload(&self, count: usize) -> NotificationPayload {
        let body = if count == 1 {
            "A fence around one of your plants has expired. Your plant is unprotected!".to_string()
        } else {
            format!(
                "Fences around {} of your plants have expired. Your plants are unprotected!",
                count
            )
        };
        NotificationPayload {
            title: "Fence expired".to_string(),
            body,
            target_url: self.app_url.clone(),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct RecipientSendStats {
    collected: usize,
    sent_warn: usize,
    sent_expire: usize,
    send_failed: usize,
}
