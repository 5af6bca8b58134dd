/// Node identity, firmware version, clock and uptime
pub mod general;

pub use general::GeneralModule;

use crate::error::ConfigurationError;
use crate::registry::ModuleRegistry;
use std::sync::Arc;

/// Register every module compiled into the agent
///
/// # Errors
///
/// Returns a `ConfigurationError` if a module cannot be registered.
pub fn register_builtin(registry: &mut ModuleRegistry) -> Result<(), ConfigurationError> {
    registry.register(Arc::new(GeneralModule::new()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_builtin() {
        let mut registry = ModuleRegistry::new();
        register_builtin(&mut registry).unwrap();

        assert_eq!(registry.names(), vec![general::NAME]);
        assert!(register_builtin(&mut registry).is_err());
    }
}
