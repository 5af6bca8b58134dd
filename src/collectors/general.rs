//! `core.general` module
//!
//! Reports the node's identity, firmware version, clock and uptime. All
//! sources are local, so the cycle completes inline.

use crate::aggregator::document::system_hostname;
use crate::aggregator::Fragment;
use crate::config::{get_string, ConfigStore};
use crate::connection::Connection;
use crate::error::ModuleError;
use crate::module::{Descriptor, Module};
use crate::pipeline::Completion;
use chrono::Utc;
use log::debug;
use serde_json::{json, Map};
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const NAME: &str = "core.general";

const DEFAULT_VERSION_FILE: &str = "/etc/version";
const DEFAULT_UPTIME_FILE: &str = "/proc/uptime";

/// General node information collector
#[derive(Debug)]
pub struct GeneralModule {
    descriptor: Descriptor,
}

impl Default for GeneralModule {
    fn default() -> Self {
        Self::new()
    }
}

impl GeneralModule {
    pub fn new() -> Self {
        Self {
            descriptor: Descriptor::new(NAME, 4, Duration::from_secs(30))
                .with_author("nodewatch developers"),
        }
    }

    /// Build the fragment from config and local files
    ///
    /// Missing or unreadable sources are left out of the fragment.
    pub fn collect(config: &dyn ConfigStore) -> Fragment {
        let mut fragment = Map::new();

        if let Some(uuid) = get_string(config, "system.uuid") {
            fragment.insert("uuid".to_string(), json!(uuid));
        }
        if let Some(hostname) = get_string(config, "system.hostname").or_else(system_hostname) {
            fragment.insert("hostname".to_string(), json!(hostname));
        }

        let version_file = get_string(config, "modules.core.general.version_file")
            .unwrap_or_else(|| DEFAULT_VERSION_FILE.to_string());
        match read_version(Path::new(&version_file)) {
            Ok(version) => {
                fragment.insert("version".to_string(), json!(version));
            }
            Err(e) => debug!("No firmware version from {}: {}", version_file, e),
        }

        fragment.insert("local_time".to_string(), json!(Utc::now().timestamp()));

        let uptime_file = get_string(config, "modules.core.general.uptime_file")
            .unwrap_or_else(|| DEFAULT_UPTIME_FILE.to_string());
        match read_uptime(Path::new(&uptime_file)) {
            Ok(uptime) => {
                fragment.insert("uptime".to_string(), json!(uptime));
            }
            Err(e) => debug!("No uptime from {}: {}", uptime_file, e),
        }

        Fragment::Object(fragment)
    }
}

impl Module for GeneralModule {
    fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    fn start_acquire_data(
        &self,
        _connection: &Connection,
        config: &dyn ConfigStore,
        completion: Completion,
    ) -> Result<(), ModuleError> {
        completion.finish(Ok(Self::collect(config)));
        Ok(())
    }
}

/// First line of the firmware version file
fn read_version(path: &Path) -> Result<String, ModuleError> {
    let contents = fs::read_to_string(path)?;
    contents
        .lines()
        .next()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ModuleError::Malformed(format!("{} is empty", path.display())))
}

/// Whole seconds since boot, from the first field of `/proc/uptime`
fn read_uptime(path: &Path) -> Result<u64, ModuleError> {
    let contents = fs::read_to_string(path)?;
    let field = contents
        .split_whitespace()
        .next()
        .ok_or_else(|| ModuleError::Malformed(format!("{} is empty", path.display())))?;

    let seconds: f64 = field
        .parse()
        .map_err(|e| ModuleError::Malformed(format!("bad uptime '{}': {}", field, e)))?;
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(ModuleError::Malformed(format!("bad uptime '{}'", field)));
    }
    Ok(seconds.floor() as u64)
}
