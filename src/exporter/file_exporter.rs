use crate::aggregator::DocumentSnapshot;
use crate::config::OutputConfig;
use crate::error::ExportError;
use crate::exporter::Exporter;
use log::info;
use std::ffi::OsString;
use std::fs::{self, DirBuilder, File};
use std::io::Write;
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};

/// Writes the document to a JSON file
///
/// Every publish writes a sibling temporary file and renames it over the
/// target, so readers see either the previous or the new document in full.
#[derive(Debug, Clone)]
pub struct FileExporter {
    path: PathBuf,
    pretty: bool,
}

impl FileExporter {
    pub fn new(path: impl Into<PathBuf>, pretty: bool) -> Self {
        Self {
            path: path.into(),
            pretty,
        }
    }

    pub fn from_config(config: &OutputConfig) -> Self {
        Self::new(config.path.clone(), config.pretty)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the output directory, readable by the owner only
    ///
    /// # Errors
    ///
    /// Returns `ExportError::IoError` if the directory cannot be created.
    pub fn prepare(&self) -> Result<(), ExportError> {
        let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) else {
            return Ok(());
        };

        if !parent.is_dir() {
            DirBuilder::new()
                .recursive(true)
                .mode(0o700)
                .create(parent)?;
            info!("Created output directory {}", parent.display());
        }
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(OsString::from)
            .unwrap_or_else(|| OsString::from("output"));
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl Exporter for FileExporter {
    fn target(&self) -> String {
        self.path.display().to_string()
    }

    fn publish(&self, snapshot: &DocumentSnapshot) -> Result<(), ExportError> {
        let mut contents = snapshot.to_json(self.pretty)?;
        contents.push('\n');

        let temp = self.temp_path();
        let mut file = File::create(&temp)?;
        file.write_all(contents.as_bytes())?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::{HostIdentity, OutputAggregator};
    use serde_json::{json, Value};
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn snapshot() -> DocumentSnapshot {
        let mut identity = HostIdentity::new("node-7");
        identity.uuid = Some("0000-1111".to_string());
        let aggregator = OutputAggregator::new(identity);
        aggregator.merge("core.general", json!({ "uptime": 42 }));
        aggregator.snapshot()
    }

    #[test]
    fn test_publish_writes_document() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("output.json");
        let exporter = FileExporter::new(&path, true);

        exporter.publish(&snapshot()).unwrap();

        let written: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["core.general"], json!({ "uptime": 42 }));
        assert_eq!(written["_meta"]["generation"], json!(1));
        assert_eq!(written["_meta"]["hostname"], json!("node-7"));
        assert_eq!(written["_meta"]["uuid"], json!("0000-1111"));
        assert!(!dir.path().join("output.json.tmp").exists());
    }

    #[test]
    fn test_compact_output_is_single_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("output.json");
        let exporter = FileExporter::new(&path, false);

        exporter.publish(&snapshot()).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 1);
    }

    #[test]
    fn test_publish_replaces_previous_document() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("output.json");
        fs::write(&path, "stale").unwrap();
        let exporter = FileExporter::new(&path, true);

        exporter.publish(&snapshot()).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        assert!(serde_json::from_str::<Value>(&contents).is_ok());
    }

    #[test]
    fn test_prepare_creates_private_directory() {
        let dir = TempDir::new().unwrap();
        let output_dir = dir.path().join("run").join("nodewatch");
        let exporter = FileExporter::new(output_dir.join("output.json"), true);

        exporter.prepare().unwrap();

        let mode = fs::metadata(&output_dir).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o700);
        exporter.publish(&snapshot()).unwrap();
    }

    #[test]
    fn test_publish_into_missing_directory_fails() {
        let dir = TempDir::new().unwrap();
        let exporter = FileExporter::new(dir.path().join("missing").join("output.json"), true);

        assert!(matches!(
            exporter.publish(&snapshot()),
            Err(ExportError::IoError(_))
        ));
    }

    #[test]
    fn test_from_config() {
        let config = OutputConfig {
            path: PathBuf::from("/tmp/doc.json"),
            pretty: false,
        };
        let exporter = FileExporter::from_config(&config);
        assert_eq!(exporter.path(), Path::new("/tmp/doc.json"));
        assert_eq!(exporter.target(), "/tmp/doc.json");
    }
}
