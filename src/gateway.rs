//! Push-gateway client: paginated enabled-recipient listing and batched
//! sends against the third-party notification service.

use crate::constants::{ENABLED_FIDS_CACHE_TTL_SECONDS, ENABLED_FIDS_PAGE_CAP};
use crate::errors::GatewayError;
use crate::storage::{NotificationStore, keys};
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Notification content delivered to the gateway.
#[derive(Debug, Clone, Serialize)]
pub struct NotificationPayload {
    pub title: String,
    pub body: String,
    pub target_url: String,
}

/// One page of the enabled-notification-tokens listing.
#[derive(Debug, Clone, Default)]
pub struct EnabledFidsPage {
    pub fids: Vec<u64>,
    pub next_cursor: Option<String>,
}

/// The upstream push service, seen as two operations.
#[async_trait]
pub trait PushGateway: Send + Sync {
    /// Fetch one page of fids with notifications enabled.
    async fn list_enabled_fids(&self, cursor: Option<&str>) -> Result<EnabledFidsPage>;

    /// Deliver one notification to a batch of fids. The caller is
    /// responsible for chunking to the upstream payload limit.
    async fn send(&self, fids: &[u64], notification: &NotificationPayload) -> Result<()>;
}

#[derive(Debug, Deserialize)]
struct TokensEnvelope {
    #[serde(default)]
    notification_tokens: Vec<TokenEntry>,
    next: Option<CursorEnvelope>,
}

#[derive(Debug, Deserialize)]
struct TokenEntry {
    fid: u64,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CursorEnvelope {
    cursor: Option<String>,
}

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    target_fids: &'a [u64],
    notification: &'a NotificationPayload,
}

/// HTTP implementation of [`PushGateway`].
pub struct HttpPushGateway {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpPushGateway {
    pub fn new(client: reqwest::Client, base_url: String, api_key: Option<String>) -> Self {
        Self {
            client,
            base_url,
            api_key,
        }
    }

    fn api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| GatewayError::MissingApiKey.into())
    }
}

#[async_trait]
impl PushGateway for HttpPushGateway {
    async fn list_enabled_fids(&self, cursor: Option<&str>) -> Result<EnabledFidsPage> {
        let api_key = self.api_key()?;
        let mut url = format!(
            "{}/farcaster/frame/notification_tokens?limit=100",
            self.base_url.trim_end_matches('/')
        );
        if let Some(cursor) = cursor {
            url.push_str("&cursor=");
            url.push_str(cursor);
        }

        let response = self
            .client
            .get(&url)
            .header("x-api-key", api_key)
            .send()
            .await
            .map_err(|e| GatewayError::RequestFailed {
                details: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let details = response.text().await.unwrap_or_default();
            return Err(GatewayError::UnexpectedResponse {
                status: status.as_u16(),
                details,
            }
            .into());
        }

        let envelope: TokensEnvelope =
            response.json().await.map_err(|e| GatewayError::RequestFailed {
                details: format!("decode: {}", e),
            })?;

        let fids = envelope
            .notification_tokens
            .into_iter()
            .filter(|t| t.status.as_deref() != Some("disabled"))
            .map(|t| t.fid)
            .collect();
        let next_cursor = envelope.next.and_then(|n| n.cursor).filter(|c| !c.is_empty());
        Ok(EnabledFidsPage { fids, next_cursor })
    }

    async fn send(&self, fids: &[u64], notification: &NotificationPayload) -> Result<()> {
        let api_key = self.api_key()?;
        let url = format!(
            "{}/farcaster/frame/notifications",
            self.base_url.trim_end_matches('/')
        );

        let response = self
            .client
            .post(&url)
            .header("x-api-key", api_key)
            .json(&SendRequest {
                target_fids: fids,
                notification,
            })
            .send()
            .await
            .map_err(|e| GatewayError::RequestFailed {
                details: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let details = response.text().await.unwrap_or_default();
            return Err(GatewayError::UnexpectedResponse {
                status: status.as_u16(),
                details,
            }
            .into());
        }
        Ok(())
    }
}

/// Discover every fid with notifications enabled.
///
/// Paginates the gateway listing with a hard page cap, de-duplicates ids
/// across pages, and caches the full list under a short TTL so repeated
/// scans within the window skip the pagination entirely. Fails open to an
/// empty list: a missing API key or an all-pages failure is a legitimate
/// "no eligible recipients" state, never an abort.
pub async fn fetch_enabled_fids(
    gateway: &dyn PushGateway,
    store: &Arc<dyn NotificationStore>,
) -> Vec<u64> {
    match store.get(keys::ENABLED_FIDS_CACHE).await {
        Ok(Some(cached)) => {
            if let Ok(fids) = serde_json::from_str::<Vec<u64>>(&cached) {
                debug!(count = fids.len(), "Enabled-fid list served from cache");
                return fids;
            }
        }
        Ok(None) => {}
        Err(e) => {
            warn!(error = %e, "Enabled-fid cache read failed, paginating");
        }
    }

    let mut seen = HashSet::new();
    let mut fids = Vec::new();
    let mut cursor: Option<String> = None;

    for page_index in 0..ENABLED_FIDS_PAGE_CAP {
        let page = match gateway.list_enabled_fids(cursor.as_deref()).await {
            Ok(page) => page,
            Err(e) => {
                warn!(error = %e, page = page_index, "Enabled-fid page fetch failed");
                break;
            }
        };
        for fid in page.fids {
            if seen.insert(fid) {
                fids.push(fid);
            }
        }
        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    if !fids.is_empty() {
        match serde_json::to_string(&fids) {
            Ok(serialized) => {
                if let Err(e) = store
                    .set(
                        keys::ENABLED_FIDS_CACHE,
                        &serialized,
                        Some(ENABLED_FIDS_CACHE_TTL_SECONDS),
                    )
                    .await
                {
                    warn!(error = %e, "Enabled-fid cache write failed");
                }
            }
            Err(e) => {
                warn!(error = %e, "Enabled-fid list serialization failed");
            }
        }
    }

    fids
}
