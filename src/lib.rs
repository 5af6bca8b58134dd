/// Error types for the agent
pub mod error;

/// Configuration file and lookup store
pub mod config;

/// Control-plane connection handed to module hooks
pub mod connection;

/// Module descriptor and hook protocol
pub mod module;

/// Registry of compiled-in modules
pub mod registry;

/// Per-cycle state tracking and completion handling
pub mod pipeline;

/// Timer-driven cycle scheduler
pub mod scheduler;

/// Output document and aggregator
pub mod aggregator;

/// Output document delivery
pub mod exporter;

/// Built-in data-acquisition modules
pub mod collectors;

// Re-export commonly used types
pub use error::{ConfigurationError, CycleError, ExportError, ModuleError};
pub use module::{Descriptor, Module};
pub use pipeline::{AcquisitionPipeline, Completion, CycleState};
pub use registry::ModuleRegistry;
pub use scheduler::{Scheduler, SchedulerSettings};
