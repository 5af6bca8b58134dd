//! Module descriptor and hook protocol
//!
//! A module is a self-contained collector of one category of system data. It
//! declares its identity and cadence through a [`Descriptor`] and implements
//! the [`Module`] hooks that the registry and scheduler invoke.

use crate::config::ConfigStore;
use crate::connection::Connection;
use crate::error::ModuleError;
use crate::pipeline::Completion;
use std::time::Duration;

/// Scheduling parameters declared by a module
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    /// Nominal period between acquisition cycles
    pub refresh_interval: Duration,
}

/// Static declaration of a collector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    /// Unique namespaced identifier, e.g. `core.general`
    pub name: String,
    /// Diagnostics only, never enforced
    pub version: u32,
    pub author: String,
    pub schedule: Schedule,
}

impl Descriptor {
    /// Create a descriptor with no author
    ///
    /// # Example
    ///
    /// ```
    /// use nodewatch::module::Descriptor;
    /// use std::time::Duration;
    ///
    /// let descriptor = Descriptor::new("core.general", 4, Duration::from_secs(30))
    ///     .with_author("ops team");
    /// assert_eq!(descriptor.schedule.refresh_interval, Duration::from_secs(30));
    /// ```
    pub fn new(name: impl Into<String>, version: u32, refresh_interval: Duration) -> Self {
        Self {
            name: name.into(),
            version,
            author: String::new(),
            schedule: Schedule { refresh_interval },
        }
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }
}

/// Hooks every data-acquisition module implements
///
/// All hooks run on the agent's event loop thread and must return quickly.
/// Long-running work belongs in a task or thread owned by the module, which
/// reports back through the [`Completion`] it was handed.
pub trait Module: Send + Sync {
    fn descriptor(&self) -> &Descriptor;

    fn name(&self) -> &str {
        &self.descriptor().name
    }

    /// One-time initialization, run before any cycle is scheduled
    ///
    /// # Errors
    ///
    /// Any error aborts agent start-up.
    fn init(&self, _connection: &Connection, _config: &dyn ConfigStore) -> Result<(), ModuleError> {
        Ok(())
    }

    /// Begin one acquisition cycle
    ///
    /// The module must eventually call [`Completion::finish`], either before
    /// returning or later from its own task. The return value only says
    /// whether the cycle could be dispatched at all; an error fails the cycle
    /// immediately.
    fn start_acquire_data(
        &self,
        connection: &Connection,
        config: &dyn ConfigStore,
        completion: Completion,
    ) -> Result<(), ModuleError>;
}
