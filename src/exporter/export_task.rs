//! Background delivery of the output document
//!
//! The export task sits off the scheduler's loop: it waits for the
//! aggregator to publish a new snapshot and hands it to an [`Exporter`] on
//! the blocking pool. Exporter failures are logged here and never reach the
//! scheduler.

use crate::aggregator::{DocumentSnapshot, SnapshotReceiver};
use crate::error::ExportError;
use log::{debug, error, info};
use std::sync::Arc;
use tokio::sync::watch;

/// Destination of the output document
#[cfg_attr(test, mockall::automock)]
pub trait Exporter: Send + Sync {
    /// Human-readable destination, for logs
    fn target(&self) -> String;

    /// Deliver one snapshot
    ///
    /// # Errors
    ///
    /// Returns an `ExportError` if the document could not be delivered. The
    /// next snapshot is still offered.
    fn publish(&self, snapshot: &DocumentSnapshot) -> Result<(), ExportError>;
}

/// Publish every new snapshot until shutdown
///
/// Snapshots arriving while a publish is in flight are coalesced; only the
/// latest is delivered. On shutdown the latest snapshot is flushed if it has
/// not been delivered yet.
///
/// # Arguments
///
/// * `exporter` - Where documents are delivered
/// * `updates` - Snapshot stream from the aggregator
/// * `shutdown` - Stops the task once it turns true or its sender is dropped
pub async fn run_exporter(
    exporter: Arc<dyn Exporter>,
    mut updates: SnapshotReceiver,
    mut shutdown: watch::Receiver<bool>,
) {
    info!("Exporting documents to {}", exporter.target());
    let mut delivered = 0;

    while !*shutdown.borrow() {
        tokio::select! {
            biased;
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let latest = updates.borrow_and_update().clone();
                if let Some(snapshot) = latest {
                    let generation = snapshot.generation();
                    if publish(&exporter, snapshot).await {
                        delivered = generation;
                    }
                }
            }
        }
    }

    let pending = updates
        .borrow()
        .clone()
        .filter(|snapshot| snapshot.generation() > delivered);
    if let Some(snapshot) = pending {
        debug!("Flushing document generation {}", snapshot.generation());
        publish(&exporter, snapshot).await;
    }
    info!("Exporter for {} stopped", exporter.target());
}

async fn publish(exporter: &Arc<dyn Exporter>, snapshot: Arc<DocumentSnapshot>) -> bool {
    let generation = snapshot.generation();
    let worker = Arc::clone(exporter);

    match tokio::task::spawn_blocking(move || worker.publish(&snapshot)).await {
        Ok(Ok(())) => {
            debug!("Published document generation {}", generation);
            true
        }
        Ok(Err(e)) => {
            error!(
                "Failed to publish document generation {} to {}: {}",
                generation,
                exporter.target(),
                e
            );
            false
        }
        Err(e) => {
            error!("Export worker failed: {}", e);
            false
        }
    }
}
