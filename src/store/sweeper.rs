//! Background cleanup of expired OAuth state rows.
//!
//! States are only implicitly invalidated by their expiry timestamp; without
//! this task abandoned authorization attempts would accumulate forever.

use std::sync::Arc;
use tracing::{debug, error, info};

const SWEEP_INTERVAL_SECS: u64 = 10 * 60;

/// Start the sweeper loop. Spawned once at startup.
pub async fn state_sweeper(state: Arc<crate::AppState>) {
    let interval = tokio::time::Duration::from_secs(SWEEP_INTERVAL_SECS);
    info!("OAuth state sweeper started (interval: 10m)");

    loop {
        tokio::time::sleep(interval).await;
        match state.store.sweep_expired_states().await {
            Ok(0) => debug!("Sweep cycle: nothing to remove"),
            Ok(n) => info!("Swept {n} expired OAuth states"),
            Err(e) => error!("Sweep cycle error: {e}"),
        }
    }
}
