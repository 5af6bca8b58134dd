//! Control-plane connection handed to every module hook
//!
//! The agent never talks to the control plane itself. It only carries the
//! handle so modules can query the host, and so tests can substitute a mock.

use crate::error::ModuleError;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Request/response access to the host's control plane
#[cfg_attr(test, mockall::automock)]
pub trait ControlPlane: Send + Sync {
    /// Invoke `method` on `object` with JSON arguments
    fn call(&self, object: &str, method: &str, args: &Value) -> Result<Value, ModuleError>;
}

/// Control plane used when the agent runs without one
#[derive(Debug, Clone, Copy, Default)]
pub struct Detached;

impl ControlPlane for Detached {
    fn call(&self, object: &str, method: &str, _args: &Value) -> Result<Value, ModuleError> {
        Err(ModuleError::Connection(format!(
            "no control plane available for {}.{}",
            object, method
        )))
    }
}

/// Cheaply cloneable capability token wrapping a [`ControlPlane`]
#[derive(Clone)]
pub struct Connection {
    plane: Arc<dyn ControlPlane>,
}

impl Connection {
    pub fn new(plane: impl ControlPlane + 'static) -> Self {
        Self {
            plane: Arc::new(plane),
        }
    }

    /// A connection whose every call fails
    pub fn detached() -> Self {
        Self::new(Detached)
    }

    pub fn call(&self, object: &str, method: &str, args: &Value) -> Result<Value, ModuleError> {
        self.plane.call(object, method, args)
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection").finish_non_exhaustive()
    }
}
