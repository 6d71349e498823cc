use std::sync::Arc;

use auth::{Notifier, OtpEngine, TokenSigner};
use cache::{CacheAside, VolatileStore};
use config::Config;
use store::DurableStore;

pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub mod middleware;
pub mod result;
pub mod router;
pub mod routes;
pub mod store;
pub mod utils;

/// 所有依赖都在这里显式注入，不使用全局单例
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn DurableStore>,
    pub cache: CacheAside,
    pub otp: OtpEngine,
    pub sessions: TokenSigner,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<dyn DurableStore>,
        volatile: Arc<dyn VolatileStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let sessions = TokenSigner::from_config(&config);
        let cache = CacheAside::new(Arc::clone(&volatile), config.store_timeout());
        let otp = OtpEngine::new(
            volatile,
            Arc::clone(&store),
            sessions.clone(),
            config.otp_ttl(),
            config.store_timeout(),
        )
        .with_notifier(notifier);

        Self {
            config: Arc::new(config),
            store,
            cache,
            otp,
            sessions,
        }
    }
}
