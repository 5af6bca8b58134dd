/// Output document types and host identity
pub mod document;

/// Process-wide output aggregator
pub mod output_aggregator;

pub use document::{
    DocumentMeta, DocumentSnapshot, Fragment, HostIdentity, Timestamp, DOCUMENT_VERSION, META_KEY,
};
pub use output_aggregator::{OutputAggregator, SnapshotReceiver};
