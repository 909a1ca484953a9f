//! # plantpush
//!
//! plantpush is the notification service for an onchain virtual-plant game.
//! It decides which players should be nudged about their plants and delivers
//! those nudges through a third-party push gateway.
//!
//! ## Architecture Overview
//!
//! Two eligibility conditions drive the pipeline:
//!
//! - **Wilt**: a plant inside the 12-hour wilt threshold makes its owner
//!   eligible, reported through the admin `/eligible` scan.
//! - **Fence**: a two-sided window around each fence expiry fires an advance
//!   warning while the fence is still up and an expiry push once it lapses,
//!   with a pending-marker reconciliation pass catching expiries that happen
//!   between scans. Runs from `/cron/fence-expiry`.
//!
//! Recipients are discovered by paginating the gateway's enabled-token
//! listing, resolved to wallet addresses through a layered fid cache, and
//! processed in fixed-size concurrency windows. All throttle state lives in
//! Redis as TTL'd markers claimed with `SET NX EX`; without Redis the service
//! runs on a no-op store and nothing throttles.
//!
//! ## Configuration
//!
//! The service is configured via environment variables. Key variables:
//! - `REDIS_URL`: throttle/marker store (optional)
//! - `GATEWAY_API_KEY`: push gateway credential (optional, discovery fails
//!   open to empty without it)
//! - `PLANT_INDEXER_URL`: plant snapshot endpoint
//! - `ADMIN_API_KEY`: enables the admin surface
//! - `NOTIFICATION_SECRET`: enables the public `/notify` path
//!
//! ## Error Handling
//!
//! All error strings use the format: `error-plantpush-<domain>-<number>
//! <message>: <details>`

/// Batch orchestration and the wilt-eligibility scan.
pub mod batch;

/// Plant snapshot reads from the chain indexer.
pub mod chain;

/// Configuration management, loaded from environment variables.
pub mod config;

pub(crate) mod constants;

/// Pure eligibility predicates for the wilt and fence windows.
pub mod eligibility;

/// Error types for all service domains.
pub mod errors;

/// The fence warn/expire batch job.
pub mod fence;

/// Push-gateway client and enabled-recipient discovery.
pub mod gateway;

/// HTTP server and API endpoints.
pub mod http;

/// Fid-to-address resolution with layered caching.
pub mod identity;

/// Fixed-window rate limiting for the public notify path.
pub mod rate_limit;

/// Marker read/write strategies (live and dry-run).
pub mod recorder;

/// Notification fan-out and delivery bookkeeping.
pub mod sender;

/// Store abstraction and key layout.
pub mod storage;
