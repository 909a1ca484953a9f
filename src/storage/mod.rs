//! Persistent state for the notification pipeline.

pub mod cache;
pub mod store;

pub use cache::{create_cache_pool, keys};
pub use store::{
    MemoryNotificationStore, NoopNotificationStore, NotificationStore, RedisNotificationStore,
};
