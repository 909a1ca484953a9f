//! End-to-end fence pipeline runs against in-memory collaborators: a plant
//! fixture standing in for the chain indexer and a recording gateway standing
//! in for the push service.

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use plantpush::chain::{FenceEffect, PlantReader, PlantSnapshot};
use plantpush::config::WindowConfig;
use plantpush::fence::FenceExpiryJob;
use plantpush::gateway::{EnabledFidsPage, NotificationPayload, PushGateway};
use plantpush::identity::FidResolver;
use plantpush::recorder::LiveMarkerRecorder;
use plantpush::sender::NotificationSender;
use plantpush::storage::{MemoryNotificationStore, NotificationStore, keys};

const NOW: i64 = 1_750_000_000;
const WARN: i64 = 2 * 3600;

struct ScriptedReader {
    by_address: Mutex<HashMap<String, Vec<PlantSnapshot>>>,
}

impl ScriptedReader {
    fn set_plants(&self, address: &str, plants: Vec<PlantSnapshot>) {
        self.by_address.lock().insert(address.to_string(), plants);
    }
}

#[async_trait]
impl PlantReader for ScriptedReader {
    async fn plants_by_owner(&self, address: &str) -> Result<Vec<PlantSnapshot>> {
        Ok(self
            .by_address
            .lock()
            .get(address)
            .cloned()
            .unwrap_or_default())
    }
}

#[derive(Default)]
struct RecordingGateway {
    sends: Mutex<Vec<(Vec<u64>, String)>>,
}

#[async_trait]
impl PushGateway for RecordingGateway {
    async fn list_enabled_fids(&self, _cursor: Option<&str>) -> Result<EnabledFidsPage> {
        Ok(EnabledFidsPage::default())
    }

    async fn send(&self, fids: &[u64], notification: &NotificationPayload) -> Result<()> {
        self.sends
            .lock()
            .push((fids.to_vec(), notification.title.clone()));
        Ok(())
    }
}

struct Pipeline {
    store: Arc<MemoryNotificationStore>,
    reader: Arc<ScriptedReader>,
    gateway: Arc<RecordingGateway>,
    job: FenceExpiryJob,
}

async fn pipeline(fids: &[(u64, &str)]) -> Pipeline {
    let store = Arc::new(MemoryNotificationStore::new());
    let dyn_store: Arc<dyn NotificationStore> = store.clone();
    let reader = Arc::new(ScriptedReader {
        by_address: Mutex::new(HashMap::new()),
    });
    let gateway = Arc::new(RecordingGateway::default());

    let resolver = Arc::new(FidResolver::new(
        reqwest::Client::new(),
        // Unroutable: every resolution must come from the seeded fidmap
        "http://127.0.0.1:1".to_string(),
        dyn_store.clone(),
        64,
    ));
    let sender = Arc::new(NotificationSender::new(
        gateway.clone(),
        dyn_store.clone(),
        500,
    ));
    let job = FenceExpiryJob::new(
        resolver,
        reader.clone(),
        Arc::new(LiveMarkerRecorder::new(dyn_store)),
        Some(sender),
        WindowConfig::default(),
        30,
        "https://garden.example/app".to_string(),
    );

    let pipeline = Pipeline {
        store,
        reader,
        gateway,
        job,
    };
    for (fid, address) in fids {
        pipeline
            .store
            .set(&keys::fidmap(*fid), address, None)
            .await
            .unwrap();
    }
    pipeline
}

fn fenced(id: u64, until: i64, wilts_at: i64) -> PlantSnapshot {
    PlantSnapshot {
        id,
        wilts_at,
        fences: vec![FenceEffect { until }],
    }
}

#[tokio::test]
async fn test_warn_then_expire_lifecycle() {
    let px = pipeline(&[(42, "0xaaa")]).await;
    // Fence lapses 30 minutes from the first run
    px.reader
        .set_plants("0xaaa", vec![fenced(7, NOW + 1800, NOW + 86400)]);

    // First run: inside the warn window, one warning goes out
    let (stats, _) = px.job.run(&[42], NOW).await;
    assert_eq!(stats.warned, 1);
    assert_eq!(stats.expired, 0);
    assert_eq!(stats.sent_warn, 1);

    // Second run an hour later: the fence has lapsed within grace, one
    // expiry push, pending record cleaned up
    px.reader
        .set_plants("0xaaa", vec![fenced(7, NOW + 1800, NOW + 86400)]);
    let (stats, _) = px.job.run(&[42], NOW + 3600).await;
    assert_eq!(stats.warned, 0);
    assert_eq!(stats.expired, 1);
    assert_eq!(stats.sent_expire, 1);
    assert!(!px.store.exists(&keys::fence_pending(42, 7)).await.unwrap());

    // Third run: both markers hold, nothing more goes out
    let (stats, _) = px.job.run(&[42], NOW + 3700).await;
    assert_eq!(stats.warned + stats.expired + stats.reconciled, 0);

    let sends = px.gateway.sends.lock().clone();
    assert_eq!(sends.len(), 2);
    assert_eq!(sends[0].1, "Fence expiring soon");
    assert_eq!(sends[1].1, "Fence expired");
}

#[tokio::test]
async fn test_reconciliation_catches_vanished_fence() {
    let px = pipeline(&[(42, "0xaaa")]).await;
    // Fence active and outside the warn window on the first run
    px.reader
        .set_plants("0xaaa", vec![fenced(7, NOW + 4 * 3600, NOW + 86400)]);
    let (stats, _) = px.job.run(&[42], NOW).await;
    assert_eq!(stats.warned, 0);
    assert!(px.store.exists(&keys::fence_pending(42, 7)).await.unwrap());

    // The indexer stops reporting the fence entirely; the recorded expiry
    // is now 10 minutes in the past, well inside grace
    px.reader
        .set_plants("0xaaa", vec![PlantSnapshot {
            id: 7,
            wilts_at: NOW + 86400,
            fences: Vec::new(),
        }]);
    let (stats, outcomes) = px.job.run(&[42], NOW + 4 * 3600 + 600).await;
    assert_eq!(stats.reconciled, 1);
    assert_eq!(outcomes[0].pending_expired[0].plant_id, 7);
    assert_eq!(stats.sent_expire, 1);
    assert!(!px.store.exists(&keys::fence_pending(42, 7)).await.unwrap());
}

#[tokio::test]
async fn test_delivery_bookkeeping_after_run() {
    let px = pipeline(&[(42, "0xaaa"), (43, "0xbbb")]).await;
    px.reader
        .set_plants("0xaaa", vec![fenced(7, NOW + 600, NOW + 86400)]);
    px.reader
        .set_plants("0xbbb", vec![fenced(8, NOW - 300, NOW + 86400)]);

    let (stats, _) = px.job.run(&[42, 43], NOW).await;
    assert_eq!(stats.warned, 1);
    assert_eq!(stats.expired, 1);

    let global_log = px.store.lrange(&keys::delivery_log("global"), 10).await.unwrap();
    assert_eq!(global_log.len(), 2);
    let warn_log = px
        .store
        .lrange(&keys::delivery_log(&keys::type_scope("fence-warn")), 10)
        .await
        .unwrap();
    assert_eq!(warn_log.len(), 1);
    let eligible = px.store.smembers(keys::ELIGIBLE_FIDS).await.unwrap();
    assert_eq!(eligible.len(), 2);
}

#[tokio::test]
async fn test_recipients_isolated_from_each_other() {
    // fid 44 has no seeded address; fid 42 still gets its warning
    let px = pipeline(&[(42, "0xaaa")]).await;
    px.reader
        .set_plants("0xaaa", vec![fenced(7, NOW + WARN / 2, NOW + 86400)]);

    let (stats, outcomes) = px.job.run(&[44, 42], NOW).await;
    assert_eq!(stats.checked, 2);
    assert_eq!(stats.no_address, 1);
    assert_eq!(stats.warned, 1);
    assert_eq!(outcomes[1].warn.len(), 1);
}
