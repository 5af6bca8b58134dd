//! Output document types
//!
//! The published document is a JSON object keyed by module name, with a
//! single `_meta` entry carrying process identity and the generation counter.

use crate::config::{get_string, ConfigStore};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Timestamp type for consistent time handling across the application
pub type Timestamp = DateTime<Utc>;

/// Structured data a single module contributes to the document
pub type Fragment = serde_json::Value;

/// Version of the document layout
pub const DOCUMENT_VERSION: u32 = 1;

/// Key reserved for document metadata
pub const META_KEY: &str = "_meta";

/// Identity of the host the agent runs on
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostIdentity {
    pub hostname: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
}

impl HostIdentity {
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            uuid: None,
        }
    }

    /// Build the identity from `system.hostname` / `system.uuid`, falling
    /// back to the operating system's hostname
    pub fn detect(config: &dyn ConfigStore) -> Self {
        let hostname = get_string(config, "system.hostname")
            .or_else(system_hostname)
            .unwrap_or_else(|| "unknown".to_string());

        Self {
            hostname,
            uuid: get_string(config, "system.uuid"),
        }
    }
}

/// Hostname as reported by the operating system
pub fn system_hostname() -> Option<String> {
    hostname::get().ok().and_then(|name| name.into_string().ok())
}

/// Document-level metadata
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentMeta {
    /// Layout version of the document
    pub version: u32,
    /// Version of the agent that produced it
    pub agent: String,
    /// Number of merges since start-up
    pub generation: u64,
    #[serde(flatten)]
    pub host: HostIdentity,
    /// When the document last changed
    pub timestamp: Timestamp,
}

/// Immutable copy of the output document
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentSnapshot {
    #[serde(rename = "_meta")]
    pub meta: DocumentMeta,
    #[serde(flatten)]
    pub fragments: BTreeMap<String, Fragment>,
}

impl DocumentSnapshot {
    pub fn generation(&self) -> u64 {
        self.meta.generation
    }

    pub fn fragment(&self, module: &str) -> Option<&Fragment> {
        self.fragments.get(module)
    }

    pub fn to_json(&self, pretty: bool) -> Result<String, serde_json::Error> {
        if pretty {
            serde_json::to_string_pretty(self)
        } else {
            serde_json::to_string(self)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MockConfigStore;
    use serde_json::json;

    #[test]
    fn test_snapshot_serialization_shape() {
        let mut fragments = BTreeMap::new();
        fragments.insert("core.general".to_string(), json!({ "hostname": "node-1" }));

        let snapshot = DocumentSnapshot {
            meta: DocumentMeta {
                version: DOCUMENT_VERSION,
                agent: "0.1.0".to_string(),
                generation: 3,
                host: HostIdentity::new("node-1"),
                timestamp: Utc::now(),
            },
            fragments,
        };

        let value: serde_json::Value = serde_json::from_str(&snapshot.to_json(false).unwrap()).unwrap();
        assert_eq!(value["_meta"]["generation"], 3);
        assert_eq!(value["_meta"]["hostname"], "node-1");
        assert!(value["_meta"].get("uuid").is_none());
        assert_eq!(value["core.general"]["hostname"], "node-1");
    }

    #[test]
    fn test_identity_from_config() {
        let mut config = MockConfigStore::new();
        config.expect_get().returning(|path| match path {
            "system.hostname" => Some(toml::Value::String("edge-3".to_string())),
            "system.uuid" => Some(toml::Value::String("b0b1".to_string())),
            _ => None,
        });

        let identity = HostIdentity::detect(&config);
        assert_eq!(identity.hostname, "edge-3");
        assert_eq!(identity.uuid.as_deref(), Some("b0b1"));
    }

    #[test]
    fn test_identity_falls_back_to_system_hostname() {
        let mut config = MockConfigStore::new();
        config.expect_get().returning(|_| None);

        let identity = HostIdentity::detect(&config);
        assert!(!identity.hostname.is_empty());
        assert!(identity.uuid.is_none());
    }
}
