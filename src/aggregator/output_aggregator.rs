//! Output aggregator holding the process-wide document
//!
//! This module provides the OutputAggregator which keeps the latest successful
//! fragment of every module and streams a fresh snapshot to the exporter on
//! every merge.

use crate::aggregator::document::{
    DocumentMeta, DocumentSnapshot, Fragment, HostIdentity, Timestamp, DOCUMENT_VERSION,
};
use chrono::Utc;
use log::debug;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

/// Receiving side of the snapshot stream
pub type SnapshotReceiver = watch::Receiver<Option<Arc<DocumentSnapshot>>>;

/// Mutable document state guarded by the aggregator's lock
struct OutputDocument {
    fragments: BTreeMap<String, Fragment>,
    generation: u64,
    updated_at: Timestamp,
}

/// Accumulates module fragments into one versioned document
///
/// `merge` is the only writer. Readers only ever see whole snapshots taken
/// under the same lock, so no reader observes a half-updated fragment map.
pub struct OutputAggregator {
    document: Mutex<OutputDocument>,
    identity: HostIdentity,
    publisher: watch::Sender<Option<Arc<DocumentSnapshot>>>,
}

impl OutputAggregator {
    /// Create an empty document for the given host
    ///
    /// # Examples
    ///
    /// ```
    /// use nodewatch::aggregator::{HostIdentity, OutputAggregator};
    ///
    /// let aggregator = OutputAggregator::new(HostIdentity::new("node-1"));
    /// assert_eq!(aggregator.generation(), 0);
    /// ```
    pub fn new(identity: HostIdentity) -> Self {
        let (publisher, _) = watch::channel(None);
        Self {
            document: Mutex::new(OutputDocument {
                fragments: BTreeMap::new(),
                generation: 0,
                updated_at: Utc::now(),
            }),
            identity,
            publisher,
        }
    }

    /// Replace a module's fragment and publish the new document
    ///
    /// # Arguments
    ///
    /// * `module` - Name of the module the fragment belongs to
    /// * `fragment` - The module's latest successful result
    ///
    /// # Returns
    ///
    /// The generation of the document after the merge
    pub fn merge(&self, module: &str, fragment: Fragment) -> u64 {
        let snapshot = {
            let mut document = self.lock();
            document.fragments.insert(module.to_string(), fragment);
            document.generation += 1;
            document.updated_at = Utc::now();
            Arc::new(self.snapshot_of(&document))
        };

        let generation = snapshot.generation();
        debug!(
            "Merged fragment from '{}', document generation {}",
            module, generation
        );
        self.publisher.send_replace(Some(snapshot));
        generation
    }

    /// Take an immutable copy of the current document
    pub fn snapshot(&self) -> DocumentSnapshot {
        let document = self.lock();
        self.snapshot_of(&document)
    }

    /// Last successful fragment of a module, if any
    pub fn fragment(&self, module: &str) -> Option<Fragment> {
        self.lock().fragments.get(module).cloned()
    }

    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// Subscribe to published snapshots
    ///
    /// The channel only holds the latest snapshot, so a slow consumer skips
    /// intermediate generations instead of building a backlog.
    pub fn subscribe(&self) -> SnapshotReceiver {
        self.publisher.subscribe()
    }

    fn snapshot_of(&self, document: &OutputDocument) -> DocumentSnapshot {
        DocumentSnapshot {
            meta: DocumentMeta {
                version: DOCUMENT_VERSION,
                agent: env!("CARGO_PKG_VERSION").to_string(),
                generation: document.generation,
                host: self.identity.clone(),
                timestamp: document.updated_at,
            },
            fragments: document.fragments.clone(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, OutputDocument> {
        self.document
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for OutputAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputAggregator")
            .field("generation", &self.generation())
            .field("host", &self.identity.hostname)
            .finish_non_exhaustive()
    }
}
