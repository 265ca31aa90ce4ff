pub mod api;
pub mod config;
pub mod error;
pub mod oauth;
pub mod powens;
pub mod store;
pub mod sync;
pub mod webhooks;

pub use config::Config;
pub use error::BridgeError;

use std::sync::Arc;

/// Shared application state passed to all API handlers.
pub struct AppState {
    pub config: Config,
    pub store: store::Store,
    pub powens: powens::PowensClient,
    pub broker: oauth::TokenBroker,
    pub sync: sync::SyncEngine,
}

pub type SharedState = Arc<AppState>;
