use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::Builder;

use super::entry::{GenerationRecord, RecordEntry};
use crate::error::{BatchError, Result};

/// JSON file holding the `GenerationRecord` of one batch.
///
/// A single sequential writer is assumed. Writes go to a sibling temp file and
/// are renamed over the target, so the file on disk is always a complete record.
#[derive(Debug, Clone)]
pub struct GenerationRecordStore {
    path: PathBuf,
}

impl GenerationRecordStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing file is a first run and yields an empty record.
    pub fn load(&self) -> Result<GenerationRecord> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(GenerationRecord::new());
            }
            Err(err) => return Err(BatchError::corrupt(&self.path, err)),
        };
        serde_json::from_str::<GenerationRecord>(&raw)
            .map_err(|err| BatchError::corrupt(&self.path, err))
    }

    pub fn save(&self, record: &GenerationRecord) -> Result<()> {
        self.write_atomic(record)
            .map_err(|err| BatchError::storage_write(&self.path, format!("{err:#}")))
    }

    /// Merges one entry into `record` and persists the whole mapping.
    pub fn record(
        &self,
        record: &mut GenerationRecord,
        identifier: &str,
        entry: RecordEntry,
    ) -> Result<()> {
        record.insert(identifier.to_string(), entry);
        self.save(record)
    }

    fn write_atomic(&self, record: &GenerationRecord) -> anyhow::Result<()> {
        let parent = self
            .path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent)?;

        let mut file = temp_file_builder().tempfile_in(parent)?;
        file.write_all(serde_json::to_string_pretty(record)?.as_bytes())?;
        if let Ok(existing) = std::fs::metadata(&self.path) {
            if existing.is_file() {
                file.as_file().set_permissions(existing.permissions())?;
            }
        }
        file.as_file().sync_all()?;
        file.persist(&self.path)?;
        Ok(())
    }
}

/// New record files get the usual umask-derived mode, not the 0600 of a temp file.
#[cfg(unix)]
fn temp_file_builder() -> Builder<'static, 'static> {
    use std::os::unix::fs::PermissionsExt;

    let mut builder = Builder::new();
    builder.permissions(std::fs::Permissions::from_mode(0o666));
    builder
}

#[cfg(not(unix))]
fn temp_file_builder() -> Builder<'static, 'static> {
    Builder::new()
}
