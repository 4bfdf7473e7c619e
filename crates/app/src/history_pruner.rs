//! Periodic pruning of device value histories.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use homebus_domain::error::HubError;
use homebus_domain::time::now;

use crate::ports::DeviceStore;
use crate::services::device_registry::DeviceRegistry;

/// Deletes value changes older than the retention window, keeping each
/// value's current change.
pub struct HistoryPruner<S> {
    registry: Arc<DeviceRegistry<S>>,
    retention: chrono::Duration,
    interval: Duration,
}

impl<S: DeviceStore + Send + Sync + 'static> HistoryPruner<S> {
    pub fn new(registry: Arc<DeviceRegistry<S>>, retention: chrono::Duration, interval: Duration) -> Self {
        Self {
            registry,
            retention,
            interval,
        }
    }

    /// Prune every value of every device once. Returns the number of
    /// deleted changes.
    ///
    /// # Errors
    ///
    /// Returns the first storage error; devices pruned before it keep their
    /// pruned state.
    #[tracing::instrument(skip(self))]
    pub async fn prune_once(&self) -> Result<usize, HubError> {
        let cutoff = now() - self.retention;
        let mut deleted = 0;
        for device in self.registry.devices() {
            for value_name in device.values.keys() {
                deleted += self
                    .registry
                    .delete_history(device.protocol, &device.channel, value_name, cutoff)
                    .await?;
            }
        }
        tracing::info!(deleted, %cutoff, "value history pruned");
        Ok(deleted)
    }

    /// Run [`prune_once`](Self::prune_once) every interval until the task is aborted.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            // the first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(err) = self.prune_once().await {
                    tracing::error!(error = %err, "history pruning failed");
                }
            }
        })
    }
}
