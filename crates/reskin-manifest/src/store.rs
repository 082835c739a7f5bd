//! Durable manifest storage.
//!
//! The manifest is pretty-printed JSON at `<project>/manifest.json`, replaced
//! atomically on every save so a crash leaves the previous checkpoint intact.

use camino::Utf8PathBuf;
use tracing::debug;

use reskin_utils::atomic_write::write_file_atomic;
use reskin_utils::error::ManifestError;
use reskin_utils::paths::{ProjectPaths, ensure_dir_all};

use crate::model::Manifest;

#[derive(Debug, Clone)]
pub struct ManifestStore {
    paths: ProjectPaths,
}

impl ManifestStore {
    #[must_use]
    pub fn new(paths: ProjectPaths) -> Self {
        Self { paths }
    }

    #[must_use]
    pub fn paths(&self) -> &ProjectPaths {
        &self.paths
    }

    #[must_use]
    pub fn manifest_path(&self) -> Utf8PathBuf {
        self.paths.manifest()
    }

    #[must_use]
    pub fn exists(&self) -> bool {
        self.manifest_path().is_file()
    }

    /// Write a fresh manifest, refusing to overwrite an existing project.
    pub fn init(&self, manifest: &Manifest) -> Result<(), ManifestError> {
        if self.exists() {
            return Err(ManifestError::AlreadyExists {
                path: self.manifest_path().to_string(),
            });
        }
        ensure_dir_all(self.paths.root()).map_err(|e| ManifestError::WriteFailed {
            path: self.paths.root().to_string(),
            reason: e.to_string(),
        })?;
        self.save(manifest)
    }

    pub fn load(&self) -> Result<Manifest, ManifestError> {
        let path = self.manifest_path();
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ManifestError::NotFound {
                    path: path.to_string(),
                });
            }
            Err(e) => {
                return Err(ManifestError::Corrupted {
                    path: path.to_string(),
                    reason: e.to_string(),
                });
            }
        };
        serde_json::from_str(&content).map_err(|e| ManifestError::Corrupted {
            path: path.to_string(),
            reason: e.to_string(),
        })
    }

    /// Snapshot `manifest` to disk.
    pub fn save(&self, manifest: &Manifest) -> Result<(), ManifestError> {
        let path = self.manifest_path();
        let write_failed = |reason: String| ManifestError::WriteFailed {
            path: path.to_string(),
            reason,
        };
        let mut json =
            serde_json::to_string_pretty(manifest).map_err(|e| write_failed(e.to_string()))?;
        json.push('\n');
        write_file_atomic(&path, &json).map_err(|e| write_failed(format!("{e:#}")))?;
        debug!(path = %path, updated_at = %manifest.updated_at, "Manifest saved");
        Ok(())
    }
}
