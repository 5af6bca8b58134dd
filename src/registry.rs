//! Module registry
//!
//! Holds every compiled-in module in registration order, runs their one-time
//! initialization and resolves modules by name.

use crate::aggregator::META_KEY;
use crate::config::ConfigStore;
use crate::connection::Connection;
use crate::error::ConfigurationError;
use crate::module::Module;
use log::{debug, error, info};
use std::collections::HashMap;
use std::sync::Arc;

/// Registry of data-acquisition modules
///
/// Modules are registered explicitly at start-up and live until the process
/// exits. Registration is closed once [`ModuleRegistry::init_all`] runs,
/// whether or not it succeeds.
#[derive(Default)]
pub struct ModuleRegistry {
    modules: Vec<Arc<dyn Module>>,
    index: HashMap<String, usize>,
    init_started: bool,
    initialized: bool,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a module to the registry
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError::DuplicateModule` if a module with the same
    /// name is already registered, and `ConfigurationError::ValidationError`
    /// if the name is empty or reserved, or if modules were already
    /// initialized.
    pub fn register(&mut self, module: Arc<dyn Module>) -> Result<(), ConfigurationError> {
        let name = module.name().to_string();

        if name.is_empty() {
            return Err(ConfigurationError::ValidationError(
                "module name must not be empty".to_string(),
            ));
        }
        if name == META_KEY {
            return Err(ConfigurationError::ValidationError(format!(
                "module name '{}' is reserved",
                name
            )));
        }
        if self.init_started {
            return Err(ConfigurationError::ValidationError(format!(
                "cannot register module '{}' after modules were initialized",
                name
            )));
        }
        if self.index.contains_key(&name) {
            return Err(ConfigurationError::DuplicateModule(name));
        }

        debug!(
            "Registered module '{}' (version {})",
            name,
            module.descriptor().version
        );
        self.index.insert(name, self.modules.len());
        self.modules.push(module);
        Ok(())
    }

    /// Run every module's `init` hook exactly once, in registration order
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError::InitFailed` for the first module whose
    /// hook fails. Modules after it are not initialized and the agent must
    /// not start. Returns `ConfigurationError::ValidationError` on any later
    /// call, including after a failed one.
    pub fn init_all(
        &mut self,
        connection: &Connection,
        config: &dyn ConfigStore,
    ) -> Result<(), ConfigurationError> {
        if self.init_started {
            return Err(ConfigurationError::ValidationError(
                "module initialization already ran".to_string(),
            ));
        }
        self.init_started = true;

        for module in &self.modules {
            let descriptor = module.descriptor();
            debug!(
                "Initializing module '{}' (version {})",
                descriptor.name, descriptor.version
            );

            module.init(connection, config).map_err(|source| {
                error!("Module '{}' failed to initialize: {}", descriptor.name, source);
                ConfigurationError::InitFailed {
                    module: descriptor.name.clone(),
                    source,
                }
            })?;
        }

        self.initialized = true;
        info!("Initialized {} modules", self.modules.len());
        Ok(())
    }

    /// Resolve a module by name
    pub fn lookup(&self, name: &str) -> Result<Arc<dyn Module>, ConfigurationError> {
        self.index
            .get(name)
            .map(|&i| Arc::clone(&self.modules[i]))
            .ok_or_else(|| ConfigurationError::ModuleNotFound(name.to_string()))
    }

    /// Modules in registration order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Module>> {
        self.modules.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.modules.iter().map(|m| m.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }
}

impl std::fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("modules", &self.names())
            .field("initialized", &self.initialized)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmptyStore;
    use crate::error::ModuleError;
    use crate::module::Descriptor;
    use crate::pipeline::Completion;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Module that records init calls into a shared journal
    struct RecordingModule {
        descriptor: Descriptor,
        journal: Arc<Mutex<Vec<String>>>,
        fail_init: bool,
    }

    impl RecordingModule {
        fn new(name: &str, journal: &Arc<Mutex<Vec<String>>>) -> Self {
            Self {
                descriptor: Descriptor::new(name, 1, Duration::from_secs(1)),
                journal: Arc::clone(journal),
                fail_init: false,
            }
        }

        fn failing(name: &str, journal: &Arc<Mutex<Vec<String>>>) -> Self {
            Self {
                fail_init: true,
                ..Self::new(name, journal)
            }
        }
    }

    impl Module for RecordingModule {
        fn descriptor(&self) -> &Descriptor {
            &self.descriptor
        }

        fn init(&self, _connection: &Connection, _config: &dyn ConfigStore) -> Result<(), ModuleError> {
            self.journal.lock().unwrap().push(self.descriptor.name.clone());
            if self.fail_init {
                Err(ModuleError::Failed("device missing".to_string()))
            } else {
                Ok(())
            }
        }

        fn start_acquire_data(
            &self,
            _connection: &Connection,
            _config: &dyn ConfigStore,
            _completion: Completion,
        ) -> Result<(), ModuleError> {
            Ok(())
        }
    }

    fn journal() -> Arc<Mutex<Vec<String>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    #[test]
    fn test_register_and_lookup() {
        let journal = journal();
        let mut registry = ModuleRegistry::new();
        registry
            .register(Arc::new(RecordingModule::new("core.general", &journal)))
            .unwrap();

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.lookup("core.general").unwrap().name(), "core.general");
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let journal = journal();
        let mut registry = ModuleRegistry::new();
        registry
            .register(Arc::new(RecordingModule::new("core.general", &journal)))
            .unwrap();

        let result = registry.register(Arc::new(RecordingModule::new("core.general", &journal)));
        match result {
            Err(ConfigurationError::DuplicateModule(name)) => assert_eq!(name, "core.general"),
            other => panic!("expected DuplicateModule, got {:?}", other),
        }
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_invalid_names_rejected() {
        let journal = journal();
        let mut registry = ModuleRegistry::new();

        assert!(matches!(
            registry.register(Arc::new(RecordingModule::new("", &journal))),
            Err(ConfigurationError::ValidationError(_))
        ));
        assert!(matches!(
            registry.register(Arc::new(RecordingModule::new(META_KEY, &journal))),
            Err(ConfigurationError::ValidationError(_))
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_lookup_missing_module() {
        let registry = ModuleRegistry::new();
        assert!(matches!(
            registry.lookup("core.missing"),
            Err(ConfigurationError::ModuleNotFound(name)) if name == "core.missing"
        ));
    }

    #[test]
    fn test_init_all_runs_in_registration_order() {
        let journal = journal();
        let mut registry = ModuleRegistry::new();
        for name in ["b.second", "a.first", "c.third"] {
            registry
                .register(Arc::new(RecordingModule::new(name, &journal)))
                .unwrap();
        }

        registry
            .init_all(&Connection::detached(), &EmptyStore)
            .unwrap();

        assert!(registry.is_initialized());
        assert_eq!(
            *journal.lock().unwrap(),
            vec!["b.second", "a.first", "c.third"]
        );
        assert_eq!(registry.names(), vec!["b.second", "a.first", "c.third"]);
    }

    #[test]
    fn test_init_failure_is_fatal_and_stops_initialization() {
        let journal = journal();
        let mut registry = ModuleRegistry::new();
        registry
            .register(Arc::new(RecordingModule::new("a.ok", &journal)))
            .unwrap();
        registry
            .register(Arc::new(RecordingModule::failing("b.broken", &journal)))
            .unwrap();
        registry
            .register(Arc::new(RecordingModule::new("c.never", &journal)))
            .unwrap();

        let result = registry.init_all(&Connection::detached(), &EmptyStore);

        match result {
            Err(ConfigurationError::InitFailed { module, .. }) => assert_eq!(module, "b.broken"),
            other => panic!("expected InitFailed, got {:?}", other),
        }
        assert!(!registry.is_initialized());
        assert_eq!(*journal.lock().unwrap(), vec!["a.ok", "b.broken"]);
    }

    #[test]
    fn test_init_not_retried_after_failure() {
        let journal = journal();
        let mut registry = ModuleRegistry::new();
        registry
            .register(Arc::new(RecordingModule::new("a.ok", &journal)))
            .unwrap();
        registry
            .register(Arc::new(RecordingModule::failing("b.broken", &journal)))
            .unwrap();

        assert!(registry
            .init_all(&Connection::detached(), &EmptyStore)
            .is_err());
        assert!(matches!(
            registry.init_all(&Connection::detached(), &EmptyStore),
            Err(ConfigurationError::ValidationError(_))
        ));
        assert!(registry
            .register(Arc::new(RecordingModule::new("c.late", &journal)))
            .is_err());

        assert!(!registry.is_initialized());
        assert_eq!(*journal.lock().unwrap(), vec!["a.ok", "b.broken"]);
    }

    #[test]
    fn test_init_runs_exactly_once() {
        let journal = journal();
        let mut registry = ModuleRegistry::new();
        registry
            .register(Arc::new(RecordingModule::new("core.general", &journal)))
            .unwrap();

        registry.init_all(&Connection::detached(), &EmptyStore).unwrap();
        assert!(registry.init_all(&Connection::detached(), &EmptyStore).is_err());
        assert_eq!(journal.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_register_after_init_rejected() {
        let journal = journal();
        let mut registry = ModuleRegistry::new();
        registry.init_all(&Connection::detached(), &EmptyStore).unwrap();

        assert!(matches!(
            registry.register(Arc::new(RecordingModule::new("late.module", &journal))),
            Err(ConfigurationError::ValidationError(_))
        ));
    }
}
