//! HTTP surface for the notification pipeline.
//!
//! Three groups of routes share one [`context::AppContext`]:
//! - public: `/healthz` and the secret-gated `/notify` single-send path
//! - cron: `/cron/fence-expiry`, the batch fence warn/expire job, with a
//!   `debug=1` dry-run mode that mutates nothing
//! - admin: eligibility scans, delivery logs, manual sends, throttle-key
//!   introspection and resets, all behind a bearer key and an optional
//!   origin allow-list

/// HTTP context and application state management.
pub mod context;

pub(crate) mod errors;
pub(crate) mod handle_admin;
pub(crate) mod handle_cron;
pub(crate) mod handle_eligible;
pub(crate) mod handle_keys;
pub(crate) mod handle_notify;
pub(crate) mod middleware_auth;

/// HTTP server configuration and setup.
pub mod server;

pub use context::*;
pub use server::*;
