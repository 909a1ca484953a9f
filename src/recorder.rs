//! Marker write strategies for eligibility evaluation.
//!
//! The evaluators never talk to the store directly for throttle and pending
//! markers; they go through a [`MarkerRecorder`]. The live recorder performs
//! real reads and writes, the dry-run recorder answers as if no marker
//! existed and records every write it would have made, so diagnostic scans
//! can run without mutating state.

use crate::storage::{NotificationStore, keys};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

/// A marker mutation the dry-run recorder captured instead of performing.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MarkerIntent {
    pub op: &'static str,
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl_seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// Store access policy for eligibility evaluation.
#[async_trait]
pub trait MarkerRecorder: Send + Sync {
    /// Check a throttle marker without claiming it.
    async fn marker_exists(&self, key: &str) -> bool;

    /// Atomically claim a marker with a TTL.
    ///
    /// Returns `true` when the caller owns the fire. Store failures fail
    /// open: a lost marker risks a duplicate push, never a lost one.
    async fn claim_marker(&self, key: &str, ttl_seconds: u64) -> bool;

    /// (Re)write a pending-fence record holding the fence expiry timestamp.
    async fn write_pending(&self, key: &str, until: i64, ttl_seconds: u64);

    /// Read every pending-fence marker for a fid as (plant_id, until).
    async fn scan_pending(&self, fid: u64) -> Vec<(u64, i64)>;

    async fn delete_marker(&self, key: &str);
}

/// Recorder that performs real store reads and writes.
pub struct LiveMarkerRecorder {
    store: Arc<dyn NotificationStore>,
}

impl LiveMarkerRecorder {
    pub fn new(store: Arc<dyn NotificationStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl MarkerRecorder for LiveMarkerRecorder {
    async fn marker_exists(&self, key: &str) -> bool {
        match self.store.exists(key).await {
            Ok(exists) => exists,
            Err(e) => {
                warn!(error = %e, key = %key, "Marker existence check failed, treating as absent");
                false
            }
        }
    }

    async fn claim_marker(&self, key: &str, ttl_seconds: u64) -> bool {
        match self.store.set_nx(key, "1", ttl_seconds).await {
            Ok(claimed) => claimed,
            Err(e) => {
                warn!(error = %e, key = %key, "Marker claim failed, failing open");
                true
            }
        }
    }

    async fn write_pending(&self, key: &str, until: i64, ttl_seconds: u64) {
        if let Err(e) = self
            .store
            .set(key, &until.to_string(), Some(ttl_seconds))
            .await
        {
            warn!(error = %e, key = %key, "Pending marker write failed");
        }
    }

    async fn scan_pending(&self, fid: u64) -> Vec<(u64, i64)> {
        let pattern = keys::fence_pending_pattern(fid);
        let found = match self
            .store
            .scan_keys(&pattern, crate::constants::KEY_SCAN_LIMIT)
            .await
        {
            Ok(found) => found,
            Err(e) => {
                warn!(error = %e, fid = fid, "Pending marker scan failed");
                return Vec::new();
            }
        };
        let mut out = Vec::new();
        for key in found {
            let Some(plant_id) = keys::plant_id_from_pending(&key) else {
                continue;
            };
            match self.store.get(&key).await {
                Ok(Some(raw)) => {
                    if let Ok(until) = raw.parse::<i64>() {
                        out.push((plant_id, until));
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(error = %e, key = %key, "Pending marker read failed");
                }
            }
        }
        out
    }

    async fn delete_marker(&self, key: &str) {
        if let Err(e) = self.store.delete(key).await {
            warn!(error = %e, key = %key, "Marker delete failed");
        }
    }
}

/// Recorder for diagnostic runs: reads as if no marker existed, records
/// intended writes instead of performing them.
#[derive(Default)]
pub struct DryRunRecorder {
    intents: Mutex<Vec<MarkerIntent>>,
}

impl DryRunRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mutations the evaluation would have performed.
    pub fn intents(&self) -> Vec<MarkerIntent> {
        self.intents.lock().clone()
    }

    fn record(&self, intent: MarkerIntent) {
        self.intents.lock().push(intent);
    }
}

#[async_trait]
impl MarkerRecorder for DryRunRecorder {
    async fn marker_exists(&self, _key: &str) -> bool {
        false
    }

    async fn claim_marker(&self, key: &str, ttl_seconds: u64) -> bool {
        self.record(MarkerIntent {
            op: "claim",
            key: key.to_string(),
            ttl_seconds: Some(ttl_seconds),
            value: None,
        });
        true
    }

    async fn write_pending(&self, key: &str, until: i64, ttl_seconds: u64) {
        self.record(MarkerIntent {
            op: "write_pending",
            key: key.to_string(),
            ttl_seconds: Some(ttl_seconds),
            value: Some(until.to_string()),
        });
    }

    async fn scan_pending(&self, _fid: u64) -> Vec<(u64, i64)> {
        Vec::new()
    }

    async fn delete_marker(&self, key: &str) {
        self.record(MarkerIntent {
            op: "delete",
            key: key.to_string(),
            ttl_seconds: None,
            value: None,
        });
    }
}
