//! Chain-read collaborator: point-in-time plant snapshots by owner address.
//!
//! The pipeline only consumes the time-sensitive attributes of a plant; the
//! contract semantics behind them live elsewhere. The HTTP implementation
//! reads a JSON indexer endpoint; tests substitute the trait.

use crate::errors::ChainError;
use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;

/// A timed protective effect on a plant, with its own expiry.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct FenceEffect {
    /// Unix timestamp at which the fence lapses.
    pub until: i64,
}

/// Point-in-time read of one plant's time-sensitive state.
///
/// Never persisted; only throttle/pending markers derived from it are.
#[derive(Debug, Clone, Deserialize)]
pub struct PlantSnapshot {
    pub id: u64,
    /// Unix timestamp at which the plant wilts.
    #[serde(rename = "wiltsAt")]
    pub wilts_at: i64,
    /// Active timed fences, possibly empty.
    #[serde(default)]
    pub fences: Vec<FenceEffect>,
}

impl PlantSnapshot {
    /// Seconds until the plant wilts; negative once wilted.
    pub fn wilt_seconds_left(&self, now: i64) -> i64 {
        self.wilts_at - now
    }

    /// The governing fence horizon: markers are keyed per plant, so when a
    /// plant carries several fences the latest expiry drives the windows.
    pub fn fence_until(&self) -> Option<i64> {
        self.fences.iter().map(|f| f.until).max()
    }
}

/// Read access to a wallet's plants.
#[async_trait]
pub trait PlantReader: Send + Sync {
    async fn plants_by_owner(&self, address: &str) -> Result<Vec<PlantSnapshot>>;
}

/// Plant reader backed by an HTTP indexer endpoint returning a JSON array of
/// snapshots for an owner address.
pub struct HttpPlantReader {
    client: reqwest::Client,
    base_url: Option<String>,
}

impl HttpPlantReader {
    pub fn new(client: reqwest::Client, base_url: Option<String>) -> Self {
        Self { client, base_url }
    }
}

#[async_trait]
impl PlantReader for HttpPlantReader {
    async fn plants_by_owner(&self, address: &str) -> Result<Vec<PlantSnapshot>> {
        let base = self.base_url.as_ref().ok_or_else(|| ChainError::FetchFailed {
            address: address.to_string(),
            details: "PLANT_INDEXER_URL not configured".to_string(),
        })?;

        let url = format!("{}/plants?owner={}", base.trim_end_matches('/'), address);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ChainError::FetchFailed {
                address: address.to_string(),
                details: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(ChainError::FetchFailed {
                address: address.to_string(),
                details: format!("status {}", response.status().as_u16()),
            }
            .into());
        }

        response
            .json::<Vec<PlantSnapshot>>()
            .await
            .map_err(|e| {
                ChainError::FetchFailed {
                    address: address.to_string(),
                    details: format!("decode: {}", e),
                }
                .into()
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_decodes_wire_shape() {
        let raw = r#"{"id": 7, "wiltsAt": 1700003600, "fences": [{"until": 1700000000}]}"#;
        let plant: PlantSnapshot = serde_json::from_str(raw).unwrap();
        assert_eq!(plant.id, 7);
        assert_eq!(plant.wilt_seconds_left(1_700_000_000), 3600);
        assert_eq!(plant.fence_until(), Some(1_700_000_000));
    }

    #[test]
    fn test_snapshot_without_fences() {
        let raw = r#"{"id": 3, "wiltsAt": 1700000000}"#;
        let plant: PlantSnapshot = serde_json::from_str(raw).unwrap();
        assert!(plant.fences.is_empty());
        assert_eq!(plant.fence_until(), None);
    }

    #[test]
    fn test_latest_fence_governs() {
        let plant = PlantSnapshot {
            id: 1,
            wilts_at: 0,
            fences: vec![FenceEffect { until: 100 }, FenceEffect { until: 300 }],
        };
        assert_eq!(plant.fence_until(), Some(300));
    }

    #[tokio::test]
    async fn test_unconfigured_reader_errors() {
        let reader = HttpPlantReader::new(reqwest::Client::new(), None);
        assert!(reader.plants_by_owner("0xabc").await.is_err());
    }
}
