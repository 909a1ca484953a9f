use std::{ops::Deref, sync::Arc};

use crate::{
    chain::PlantReader,
    config::Config,
    gateway::PushGateway,
    identity::FidResolver,
    rate_limit::RateLimiter,
    sender::NotificationSender,
    storage::NotificationStore,
};

pub struct InnerAppContext {
    pub(crate) config: Config,
    pub(crate) store: Arc<dyn NotificationStore>,
    pub(crate) gateway: Arc<dyn PushGateway>,
    pub(crate) plant_reader: Arc<dyn PlantReader>,
    pub(crate) resolver: Arc<FidResolver>,
    pub(crate) sender: Arc<NotificationSender>,
    pub(crate) rate_limiter: RateLimiter,
}

/// Shared handler state: one explicitly constructed context owning every
/// long-lived client and cache, injected through axum state rather than
/// referenced as ambient globals.
#[derive(Clone)]
pub struct AppContext(pub(crate) Arc<InnerAppContext>);

impl Deref for AppContext {
    type Target = InnerAppContext;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AppContext {
    pub fn new(
        config: Config,
        http_client: reqwest::Client,
        store: Arc<dyn NotificationStore>,
        gateway: Arc<dyn PushGateway>,
        plant_reader: Arc<dyn PlantReader>,
    ) -> Self {
        let resolver = Arc::new(FidResolver::new(
            http_client,
            config.identity_base_url.clone(),
            store.clone(),
            config.fidmap_cache_size,
        ));
        let sender = Arc::new(NotificationSender::new(
            gateway.clone(),
            store.clone(),
            config.send_chunk_size,
        ));
        let rate_limiter = RateLimiter::new(store.clone());

        Self(Arc::new(InnerAppContext {
            config,
            store,
            gateway,
            plant_reader,
            resolver,
            sender,
            rate_limiter,
        }))
    }

    pub fn store(&self) -> &Arc<dyn NotificationStore> {
        &self.0.store
    }

    pub fn sender(&self) -> &Arc<NotificationSender> {
        &self.0.sender
    }

    pub fn config(&self) -> &Config {
        &self.0.config
    }
}
