//! Resolution of opaque recipient ids (fids) to wallet addresses.
//!
//! Layered like the identity cache: an in-process LRU in front of the
//! persistent `fidmap:{fid}` cache, falling through to the external identity
//! API. The fid-to-address mapping is treated as stable, so the persistent
//! entry carries no TTL; failed lookups are never cached so a later pass can
//! retry.

use crate::storage::{NotificationStore, keys};
use lru::LruCache;
use serde::Deserialize;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct IdentityEnvelope {
    result: Option<IdentityResult>,
}

#[derive(Debug, Deserialize)]
struct IdentityResult {
    address: Option<IdentityAddress>,
}

#[derive(Debug, Deserialize)]
struct IdentityAddress {
    address: Option<String>,
}

/// Resolves a fid to a lower-cased wallet address, or `None`.
///
/// Never returns an error: every failure mode (network, non-2xx, missing
/// field, store trouble) degrades to `None` so batch callers can simply
/// count the recipient as address-less.
pub struct FidResolver {
    client: reqwest::Client,
    base_url: String,
    store: Arc<dyn NotificationStore>,
    memory: Mutex<LruCache<u64, String>>,
}

impl FidResolver {
    pub fn new(
        client: reqwest::Client,
        base_url: String,
        store: Arc<dyn NotificationStore>,
        memory_cache_size: usize,
    ) -> Self {
        let cache_size = NonZeroUsize::new(memory_cache_size).unwrap_or(NonZeroUsize::MIN);
        Self {
            client,
            base_url,
            store,
            memory: Mutex::new(LruCache::new(cache_size)),
        }
    }

    pub async fn resolve(&self, fid: u64) -> Option<String> {
        {
            let mut memory = self.memory.lock().await;
            if let Some(address) = memory.get(&fid) {
                return Some(address.clone());
            }
        }

        match self.store.get(&keys::fidmap(fid)).await {
            Ok(Some(cached)) => {
                let address = cached.to_lowercase();
                self.memory.lock().await.put(fid, address.clone());
                return Some(address);
            }
            Ok(None) => {}
            Err(e) => {
                warn!(error = %e, fid = fid, "fidmap cache read failed, falling through");
            }
        }

        let address = self.fetch(fid).await?;

        // Write-through with no expiry: identity mapping is stable
        if let Err(e) = self.store.set(&keys::fidmap(fid), &address, None).await {
            warn!(error = %e, fid = fid, "fidmap cache write failed");
        }
        self.memory.lock().await.put(fid, address.clone());
        Some(address)
    }

    /// Explicitly overwrite the cached mapping for a fid.
    pub async fn set_mapping(&self, fid: u64, address: &str) -> anyhow::Result<()> {
        let normalized = address.to_lowercase();
        self.store.set(&keys::fidmap(fid), &normalized, None).await?;
        self.memory.lock().await.put(fid, normalized);
        Ok(())
    }

    async fn fetch(&self, fid: u64) -> Option<String> {
        let url = format!("{}/user?fid={}", self.base_url.trim_end_matches('/'), fid);
        let response = match self.client.get(&url).send().await {
            Ok(response) => response,
            Err(e) => {
                debug!(error = %e, fid = fid, "Identity API request failed");
                return None;
            }
        };
        if !response.status().is_success() {
            debug!(status = response.status().as_u16(), fid = fid, "Identity API non-success");
            return None;
        }
        let envelope: IdentityEnvelope = match response.json().await {
            Ok(envelope) => envelope,
            Err(e) => {
                debug!(error = %e, fid = fid, "Identity API decode failed");
                return None;
            }
        };
        envelope
            .result
            .and_then(|r| r.address)
            .and_then(|a| a.address)
            .map(|address| address.to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryNotificationStore;

    fn resolver(store: Arc<dyn NotificationStore>) -> FidResolver {
        FidResolver::new(
            reqwest::Client::new(),
            // Unroutable base: any fallthrough to the network yields None
            "http://127.0.0.1:1".to_string(),
            store,
            16,
        )
    }

    #[tokio::test]
    async fn test_cache_hit_skips_network() {
        let store = Arc::new(MemoryNotificationStore::new());
        store
            .set(&keys::fidmap(42), "0xABCDEF0123", None)
            .await
            .unwrap();
        let resolver = resolver(store);
        assert_eq!(resolver.resolve(42).await.as_deref(), Some("0xabcdef0123"));
        // Second hit served from the memory layer
        assert_eq!(resolver.resolve(42).await.as_deref(), Some("0xabcdef0123"));
    }

    #[tokio::test]
    async fn test_miss_and_network_failure_yields_none() {
        let store = Arc::new(MemoryNotificationStore::new());
        let resolver = resolver(store.clone());
        assert_eq!(resolver.resolve(99).await, None);
        // Negative results are not cached
        assert_eq!(store.get(&keys::fidmap(99)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_admin_override() {
        let store = Arc::new(MemoryNotificationStore::new());
        let resolver = resolver(store.clone());
        resolver.set_mapping(7, "0xFEED").await.unwrap();
        assert_eq!(resolver.resolve(7).await.as_deref(), Some("0xfeed"));
        assert_eq!(
            store.get(&keys::fidmap(7)).await.unwrap().as_deref(),
            Some("0xfeed")
        );
    }
}
