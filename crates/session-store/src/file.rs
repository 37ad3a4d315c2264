//! File-backed session store.

use crate::{SessionStore, StoreError, StoreResult};
use session_model::SessionRecord;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::UNIX_EPOCH;

/// Store persisting the record as one JSON document on disk.
///
/// Writes go to a temporary file in the same directory followed by a
/// rename, so the document is replaced atomically: after a crash the file
/// holds either the previous record or the new one, never a torn write.
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn atomic_write(&self, content: &str) -> StoreResult<()> {
        let dir = self
            .path
            .parent()
            .ok_or_else(|| StoreError::Encoding("session path has no parent".to_string()))?;
        let file_name = self
            .path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| StoreError::Encoding("session path has no file name".to_string()))?;

        fs::create_dir_all(dir)?;

        let tmp_name = format!(
            ".{}.knugget.tmp.{}",
            file_name,
            std::time::SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos()
        );
        let tmp_path = dir.join(tmp_name);

        let write_result = (|| -> Result<(), io::Error> {
            let mut file = fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&tmp_path)?;
            file.write_all(content.as_bytes())?;
            file.sync_all()?;

            // The document carries token material: owner-only on unix.
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                fs::set_permissions(&tmp_path, fs::Permissions::from_mode(0o600))?;
            }

            fs::rename(&tmp_path, &self.path)?;

            if let Ok(parent_dir) = fs::File::open(dir) {
                let _ = parent_dir.sync_all();
            }

            Ok(())
        })();

        if let Err(err) = write_result {
            let _ = fs::remove_file(&tmp_path);
            return Err(err.into());
        }

        Ok(())
    }
}

impl SessionStore for FileSessionStore {
    fn put(&self, record: &SessionRecord) -> StoreResult<()> {
        let content = serde_json::to_string_pretty(record)
            .map_err(|e| StoreError::Encoding(e.to_string()))?;
        self.atomic_write(&content)
    }

    fn get(&self) -> StoreResult<Option<SessionRecord>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let record: SessionRecord = serde_json::from_str(&content)
            .map_err(|e| StoreError::Corrupted(e.to_string()))?;
        record
            .validate()
            .map_err(|e| StoreError::Corrupted(e.to_string()))?;

        Ok(Some(record))
    }

    fn clear(&self) -> StoreResult<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
