//! Chunked notification fan-out with best-effort delivery bookkeeping.
//!
//! Recipients are split into fixed-size chunks to respect the upstream
//! payload limit; one chunk's failure marks its recipients failed but never
//! blocks later chunks. Every successful delivery feeds the delivery log,
//! the last-sent map, the sent counters (global and per-type), and the
//! eligible-fid set, each wrapped so a bookkeeping failure can never fail
//! the send itself.

use crate::constants::DELIVERY_LOG_MAX_ENTRIES;
use crate::gateway::{NotificationPayload, PushGateway};
use crate::storage::{NotificationStore, keys};
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::warn;

/// Per-recipient failure detail from a send.
#[derive(Debug, Clone, Serialize)]
pub struct SendFailure {
    pub fid: u64,
    pub error: String,
}

/// Outcome of a fan-out.
#[derive(Debug, Clone, Serialize, Default)]
pub struct SendReport {
    pub ok: bool,
    pub sent: usize,
    pub failed: usize,
    pub errors: Vec<SendFailure>,
}

pub struct NotificationSender {
    gateway: Arc<dyn PushGateway>,
    store: Arc<dyn NotificationStore>,
    chunk_size: usize,
}

impl NotificationSender {
    pub fn new(
        gateway: Arc<dyn PushGateway>,
        store: Arc<dyn NotificationStore>,
        chunk_size: usize,
    ) -> Self {
        Self {
            gateway,
            store,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Deliver one notification to `fids`, chunked, recording delivery
    /// bookkeeping under the global scope and the given logical type.
    pub async fn send_to_fids(
        &self,
        fids: &[u64],
        notification: &NotificationPayload,
        notification_type: &str,
    ) -> SendReport {
        if fids.is_empty() {
            return SendReport {
                ok: true,
                ..Default::default()
            };
        }

        let mut report = SendReport::default();
        for chunk in fids.chunks(self.chunk_size) {
            match self.gateway.send(chunk, notification).await {
                Ok(()) => {
                    report.sent += chunk.len();
                    self.record_deliveries(chunk, notification, notification_type)
                        .await;
                }
                Err(e) => {
                    let message = e.to_string();
                    warn!(error = %message, chunk_len = chunk.len(), "Notification chunk failed");
                    report.failed += chunk.len();
                    for fid in chunk {
                        report.errors.push(SendFailure {
                            fid: *fid,
                            error: message.clone(),
                        });
                    }
                }
            }
        }
        report.ok = report.failed == 0;
        report
    }

    async fn record_deliveries(
        &self,
        fids: &[u64],
        notification: &NotificationPayload,
        notification_type: &str,
    ) {
        let now = Utc::now().timestamp();
        let type_scope = keys::type_scope(notification_type);
        for fid in fids {
            let entry = json!({
                "fid": fid,
                "type": notification_type,
                "title": notification.title,
                "ts": now,
            })
            .to_string();

            self.record_scope("global", *fid, &entry, now).await;
            self.record_scope(&type_scope, *fid, &entry, now).await;

            if let Err(e) = self.store.sadd(keys::ELIGIBLE_FIDS, &fid.to_string()).await {
                warn!(error = %e, fid = fid, "Eligible-set add failed");
            }
        }
    }

    async fn record_scope(&self, scope: &str, fid: u64, entry: &str, now: i64) {
        if let Err(e) = self
            .store
            .lpush_trim(&keys::delivery_log(scope), entry, DELIVERY_LOG_MAX_ENTRIES)
            .await
        {
            warn!(error = %e, scope = %scope, "Delivery log write failed");
        }
        if let Err(e) = self
            .store
            .hset(&keys::delivery_last(scope), &fid.to_string(), &now.to_string())
            .await
        {
            warn!(error = %e, scope = %scope, "Last-sent map write failed");
        }
        if let Err(e) = self.store.incr(&keys::delivery_sent_count(scope)).await {
            warn!(error = %e, scope = %scope, "Sent counter increment failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::GatewayError;
    use crate::gateway::EnabledFidsPage;
    use crate::storage::MemoryNotificationStore;
    use anyhow::Result;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    /// Gateway that records each send call and fails the chunks whose index
    /// appears in `fail_calls`.
    struct RecordingGateway {
        calls: Mutex<Vec<usize>>,
        fail_calls: Vec<usize>,
    }

    impl RecordingGateway {
        fn new(fail_calls: Vec<usize>) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail_calls,
            }
        }
    }

    #[async_trait]
    impl PushGateway for RecordingGateway {
        async fn list_enabled_fids(&self, _cursor: Option<&str>) -> Result<EnabledFidsPage> {
            Ok(EnabledFidsPage::default())
        }

        async fn send(&self, fids: &[u64], _n: &NotificationPayload) -> Result<()> {
            let mut calls = self.calls.lock();
            let index = calls.len();
            calls.push(fids.len());
            if self.fail_calls.contains(&index) {
                return Err(GatewayError::UnexpectedResponse {
                    status: 502,
                    details: "upstream unavailable".to_string(),
                }
                .into());
            }
            Ok(())
        }
    }

    fn payload() -> NotificationPayload {
        NotificationPayload {
            title: "Your plant needs you".to_string(),
            body: "Water it before it wilts".to_string(),
            target_url: "https://example.com/app".to_string(),
        }
    }

    #[tokio::test]
    async fn test_chunking_1200_into_three_calls() {
        let gateway = Arc::new(RecordingGateway::new(vec![]));
        let store = Arc::new(MemoryNotificationStore::new());
        let sender = NotificationSender::new(gateway.clone(), store, 500);

        let fids: Vec<u64> = (0..1200).collect();
        let report = sender.send_to_fids(&fids, &payload(), "manual").await;

        assert_eq!(*gateway.calls.lock(), vec![500, 500, 200]);
        assert!(report.ok);
        assert_eq!(report.sent, 1200);
    }

    #[tokio::test]
    async fn test_middle_chunk_failure_does_not_block_rest() {
        let gateway = Arc::new(RecordingGateway::new(vec![1]));
        let store = Arc::new(MemoryNotificationStore::new());
        let sender = NotificationSender::new(gateway.clone(), store, 500);

        let fids: Vec<u64> = (0..1200).collect();
        let report = sender.send_to_fids(&fids, &payload(), "manual").await;

        // The third chunk was still attempted after the second failed
        assert_eq!(*gateway.calls.lock(), vec![500, 500, 200]);
        assert!(!report.ok);
        assert_eq!(report.sent, 700);
        assert_eq!(report.failed, 500);
        assert_eq!(report.errors.len(), 500);
        assert!(report.errors[0].error.contains("502"));
    }

    #[tokio::test]
    async fn test_empty_list_is_noop_success() {
        let gateway = Arc::new(RecordingGateway::new(vec![]));
        let store = Arc::new(MemoryNotificationStore::new());
        let sender = NotificationSender::new(gateway.clone(), store, 500);

        let report = sender.send_to_fids(&[], &payload(), "manual").await;
        assert!(report.ok);
        assert_eq!(report.sent, 0);
        assert!(gateway.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_delivery_bookkeeping_written() {
        let gateway = Arc::new(RecordingGateway::new(vec![]));
        let store = Arc::new(MemoryNotificationStore::new());
        let sender = NotificationSender::new(gateway, store.clone(), 500);

        sender.send_to_fids(&[42, 43], &payload(), "fence-warn").await;

        let log = store
            .lrange(&keys::delivery_log("global"), 10)
            .await
            .unwrap();
        assert_eq!(log.len(), 2);
        let typed = store
            .lrange(&keys::delivery_log("type:fence-warn"), 10)
            .await
            .unwrap();
        assert_eq!(typed.len(), 2);
        let eligible = store.smembers(keys::ELIGIBLE_FIDS).await.unwrap();
        assert_eq!(eligible.len(), 2);
        let last = store.hgetall(&keys::delivery_last("global")).await.unwrap();
        assert!(last.contains_key("42"));
        let count = store
            .get(&keys::delivery_sent_count("type:fence-warn"))
            .await
            .unwrap();
        assert_eq!(count.as_deref(), Some("2"));
    }
}
