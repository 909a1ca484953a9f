//! Batch orchestration over the recipient set.
//!
//! Recipients are processed in fixed-size concurrency windows: every task in
//! a window runs concurrently and the orchestrator joins the whole window
//! before advancing, bounding peak concurrent outbound calls to the window
//! size. One recipient's failure never aborts its siblings; aggregate
//! counters are summed only from fully settled windows so the statistics are
//! exact, not per-window estimates.

use crate::chain::PlantReader;
use crate::eligibility::wilt_eligible;
use crate::identity::FidResolver;
use crate::recorder::MarkerRecorder;
use crate::storage::keys;
use futures::future::join_all;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;

/// Run `task` for every fid, `window` at a time, joining each window before
/// starting the next. Results come back in input order.
pub async fn run_windowed<T, F, Fut>(fids: &[u64], window: usize, task: F) -> Vec<T>
where
    F: Fn(u64) -> Fut,
    Fut: Future<Output = T>,
{
    let mut results = Vec::with_capacity(fids.len());
    for chunk in fids.chunks(window.max(1)) {
        let tasks: Vec<_> = chunk.iter().map(|fid| task(*fid)).collect();
        results.extend(join_all(tasks).await);
    }
    results
}

/// Slice a recipient list for an incremental partial scan.
pub fn apply_page(fids: &[u64], offset: Option<usize>, limit: Option<usize>) -> Vec<u64> {
    let start = offset.unwrap_or(0).min(fids.len());
    let end = match limit {
        Some(limit) => (start + limit).min(fids.len()),
        None => fids.len(),
    };
    fids[start..end].to_vec()
}

/// Why a recipient was skipped without evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NoAddress,
    FetchFailed,
}

/// One plant's wilt status within a scan.
#[derive(Debug, Clone, Serialize)]
pub struct PlantStatus {
    pub id: u64,
    pub seconds_left: i64,
    pub eligible: bool,
    pub throttled: bool,
}

/// Per-recipient scan detail.
#[derive(Debug, Clone, Serialize)]
pub struct RecipientDetail {
    pub fid: u64,
    pub address: String,
    pub plants: Vec<PlantStatus>,
    pub eligible_count: usize,
    pub throttled_count: usize,
    /// Recipient-level throttle marker present. Authoritative: suppresses
    /// the send entirely, not just the statistic.
    pub fid_throttled: bool,
    pub would_notify: usize,
}

/// Outcome for one recipient in the scan.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum RecipientOutcome {
    Skipped { fid: u64, skipped: SkipReason },
    Evaluated(RecipientDetail),
}

/// Exact aggregate statistics across every concurrency window.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanStats {
    pub checked: usize,
    pub no_address: usize,
    pub fetch_failed: usize,
    pub with_address: usize,
    pub with_plants: usize,
    pub with_eligible: usize,
    pub total_eligible: usize,
    pub total_throttled: usize,
    pub would_notify: usize,
}

/// The wilt-threshold eligibility scan behind the admin `/eligible` surface.
///
/// Read-only with respect to markers: it consults throttle state to report
/// what a send pass would do, but claims nothing.
pub struct WiltScanner {
    resolver: Arc<FidResolver>,
    reader: Arc<dyn PlantReader>,
    recorder: Arc<dyn MarkerRecorder>,
    threshold_seconds: i64,
    concurrency: usize,
}

impl WiltScanner {
    pub fn new(
        resolver: Arc<FidResolver>,
        reader: Arc<dyn PlantReader>,
        recorder: Arc<dyn MarkerRecorder>,
        threshold_seconds: i64,
        concurrency: usize,
    ) -> Self {
        Self {
            resolver,
            reader,
            recorder,
            threshold_seconds,
            concurrency,
        }
    }

    pub async fn scan(&self, fids: &[u64], now: i64) -> (ScanStats, Vec<RecipientOutcome>) {
        let outcomes =
            run_windowed(fids, self.concurrency, |fid| self.scan_recipient(fid, now)).await;

        let mut stats = ScanStats {
            checked: outcomes.len(),
            ..Default::default()
        };
        for outcome in &outcomes {
            match outcome {
                RecipientOutcome::Skipped { skipped, .. } => match skipped {
                    SkipReason::NoAddress => stats.no_address += 1,
                    SkipReason::FetchFailed => {
                        stats.with_address += 1;
                        stats.fetch_failed += 1;
                    }
                },
                RecipientOutcome::Evaluated(detail) => {
                    stats.with_address += 1;
                    if !detail.plants.is_empty() {
                        stats.with_plants += 1;
                    }
                    if detail.eligible_count > 0 {
                        stats.with_eligible += 1;
                    }
                    stats.total_eligible += detail.eligible_count;
                    stats.total_throttled += detail.throttled_count;
                    stats.would_notify += detail.would_notify;
                }
            }
        }
        (stats, outcomes)
    }

    async fn scan_recipient(&self, fid: u64, now: i64) -> RecipientOutcome {
        let Some(address) = self.resolver.resolve(fid).await else {
            return RecipientOutcome::Skipped {
                fid,
                skipped: SkipReason::NoAddress,
            };
        };

        let plants = match self.reader.plants_by_owner(&address).await {
            Ok(plants) => plants,
            Err(e) => {
                tracing::debug!(error = %e, fid = fid, "Plant fetch failed during scan");
                return RecipientOutcome::Skipped {
                    fid,
                    skipped: SkipReason::FetchFailed,
                };
            }
        };

        let mut statuses = Vec::with_capacity(plants.len());
        let mut eligible_count = 0;
        let mut throttled_count = 0;
        for plant in &plants {
            let seconds_left = plant.wilt_seconds_left(now);
            let eligible = wilt_eligible(seconds_left, self.threshold_seconds);
            let throttled = eligible
                && self
                    .recorder
                    .marker_exists(&keys::wilt_plant(fid, plant.id))
                    .await;
            if eligible {
                eligible_count += 1;
                if throttled {
                    throttled_count += 1;
                }
            }
            statuses.push(PlantStatus {
                id: plant.id,
                seconds_left,
                eligible,
                throttled,
            });
        }

        let fid_throttled = self.recorder.marker_exists(&keys::wilt_fid(fid)).await;
        let would_notify = if fid_throttled {
            0
        } else {
            eligible_count - throttled_count
        };

        RecipientOutcome::Evaluated(RecipientDetail {
            fid,
            address,
            plants: statuses,
            eligible_count,
            throttled_count,
            fid_throttled,
            would_notify,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{FenceEffect, PlantSnapshot};
    use crate::recorder::LiveMarkerRecorder;
    use crate::storage::{MemoryNotificationStore, NotificationStore};
    use anyhow::Result;
    use async_trait::async_trait;
    use std::collections::HashMap;

    const NOW: i64 = 1_700_000_000;
    const THRESHOLD: i64 = 12 * 3600;

    struct FixtureReader {
        by_address: HashMap<String, Vec<PlantSnapshot>>,
        fail_addresses: Vec<String>,
    }

    #[async_trait]
    impl PlantReader for FixtureReader {
        async fn plants_by_owner(&self, address: &str) -> Result<Vec<PlantSnapshot>> {
            if self.fail_addresses.iter().any(|a| a == address) {
                anyhow::bail!("rpc unavailable");
            }
            Ok(self.by_address.get(address).cloned().unwrap_or_default())
        }
    }

    fn plant(id: u64, seconds_left: i64) -> PlantSnapshot {
        PlantSnapshot {
            id,
            wilts_at: NOW + seconds_left,
            fences: Vec::<FenceEffect>::new(),
        }
    }

    async fn fixture(
        store: Arc<MemoryNotificationStore>,
        by_fid: Vec<(u64, &str, Vec<PlantSnapshot>)>,
        fail_addresses: Vec<String>,
    ) -> WiltScanner {
        let mut by_address = HashMap::new();
        for (fid, address, plants) in by_fid {
            store
                .set(&keys::fidmap(fid), address, None)
                .await
                .unwrap();
            by_address.insert(address.to_string(), plants);
        }
        let store: Arc<dyn NotificationStore> = store;
        let resolver = Arc::new(FidResolver::new(
            reqwest::Client::new(),
            "http://127.0.0.1:1".to_string(),
            store.clone(),
            16,
        ));
        WiltScanner::new(
            resolver,
            Arc::new(FixtureReader {
                by_address,
                fail_addresses,
            }),
            Arc::new(LiveMarkerRecorder::new(store)),
            THRESHOLD,
            30,
        )
    }

    #[test]
    fn test_apply_page() {
        let fids = vec![1, 2, 3, 4, 5];
        assert_eq!(apply_page(&fids, None, None), vec![1, 2, 3, 4, 5]);
        assert_eq!(apply_page(&fids, Some(2), Some(2)), vec![3, 4]);
        assert_eq!(apply_page(&fids, Some(4), Some(10)), vec![5]);
        assert_eq!(apply_page(&fids, Some(9), None), Vec::<u64>::new());
    }

    #[tokio::test]
    async fn test_run_windowed_preserves_order() {
        let fids: Vec<u64> = (0..100).collect();
        let results = run_windowed(&fids, 7, |fid| async move { fid * 2 }).await;
        assert_eq!(results.len(), 100);
        assert_eq!(results[0], 0);
        assert_eq!(results[99], 198);
    }

    #[tokio::test]
    async fn test_scan_counts_eligible_and_skips() {
        let store = Arc::new(MemoryNotificationStore::new());
        let scanner = fixture(
            store.clone(),
            vec![
                (1, "0xaaa", vec![plant(10, 3600), plant(11, THRESHOLD + 1)]),
                (2, "0xbbb", vec![plant(20, -5)]),
                (3, "0xccc", vec![]),
            ],
            vec!["0xccc".to_string()],
        )
        .await;

        // fid 4 has no cached address and no reachable identity API
        let (stats, outcomes) = scanner.scan(&[1, 2, 3, 4], NOW).await;
        assert_eq!(stats.checked, 4);
        assert_eq!(stats.no_address, 1);
        assert_eq!(stats.fetch_failed, 1);
        assert_eq!(stats.with_address, 3);
        assert_eq!(stats.total_eligible, 1);
        assert_eq!(stats.would_notify, 1);
        assert_eq!(outcomes.len(), 4);
    }

    #[tokio::test]
    async fn test_plant_throttle_counted_not_notified() {
        let store = Arc::new(MemoryNotificationStore::new());
        store
            .set_nx(&keys::wilt_plant(1, 10), "1", 3600)
            .await
            .unwrap();
        let scanner = fixture(
            store,
            vec![(1, "0xaaa", vec![plant(10, 3600), plant(12, 100)])],
            vec![],
        )
        .await;

        let (stats, _) = scanner.scan(&[1], NOW).await;
        assert_eq!(stats.total_eligible, 2);
        assert_eq!(stats.total_throttled, 1);
        assert_eq!(stats.would_notify, 1);
    }

    #[tokio::test]
    async fn test_fid_throttle_is_authoritative() {
        let store = Arc::new(MemoryNotificationStore::new());
        store.set_nx(&keys::wilt_fid(1), "1", 3600).await.unwrap();
        let scanner = fixture(store, vec![(1, "0xaaa", vec![plant(10, 3600)])], vec![]).await;

        let (stats, outcomes) = scanner.scan(&[1], NOW).await;
        assert_eq!(stats.total_eligible, 1);
        assert_eq!(stats.would_notify, 0);
        match &outcomes[0] {
            RecipientOutcome::Evaluated(detail) => assert!(detail.fid_throttled),
            other => panic!("unexpected outcome {other:?}"),
        }
    }
}
