//! Background expiry sweep

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use super::LinkStore;

/// Periodically purges expired links
pub struct Sweeper;

impl Sweeper {
    /// Start sweeping `store` every `interval`
    ///
    /// A zero interval disables sweeping and returns `None`. The task runs
    /// until the returned handle is aborted; a failed sweep is logged and
    /// retried on the next tick.
    pub fn spawn(store: Arc<dyn LinkStore>, interval: Duration) -> Option<JoinHandle<()>> {
        if interval.is_zero() {
            tracing::info!("Link sweeping disabled");
            return None;
        }

        Some(tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;

                match store.cleanup().await {
                    Ok(0) => {}
                    Ok(removed) => tracing::info!(removed, "Swept expired links"),
                    Err(e) => tracing::warn!("Link sweep failed: {}", e),
                }
            }
        }))
    }
}
