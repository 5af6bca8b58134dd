/// Exporter trait and background export task
pub mod export_task;

/// Atomic JSON file exporter
pub mod file_exporter;

pub use export_task::{run_exporter, Exporter};
pub use file_exporter::FileExporter;

#[cfg(test)]
pub use export_task::MockExporter;
