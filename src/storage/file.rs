//! Store persisted as a JSON object on disk.
//!
//! The file is the only copy: every read goes back to disk, so several
//! processes pointed at the same path (a running `monitor` and a one-shot
//! `clear`) see each other's writes. Updates are written to a sibling temp
//! file and renamed over the original, so a crash never leaves a half-written
//! state file behind.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tempfile::NamedTempFile;

use super::{DurableStore, StoreError};

type Entries = BTreeMap<String, String>;

#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
    /// Serializes read-modify-write cycles between clones in this process.
    write_lock: Arc<Mutex<()>>,
}

impl FileStore {
    /// Open the store at `path`. A missing file is an empty store; an
    /// unreadable one is an error.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let store = Self::unchecked(path);
        let entries = store.read()?;
        tracing::debug!(path = %store.path.display(), entries = entries.len(), "Opened durable store");
        Ok(store)
    }

    /// Like [`open`](Self::open), but a corrupt file is treated as empty and
    /// replaced on the next write.
    pub fn open_or_discard_corrupt(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        match Self::open(&path) {
            Err(err @ StoreError::Corrupt { .. }) => {
                tracing::warn!(error = %err, "Discarding corrupt state file, starting empty");
                Ok(Self::unchecked(path))
            }
            other => other,
        }
    }

    fn unchecked(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }

    fn read(&self) -> Result<Entries, StoreError> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Entries::new()),
            Err(e) => return Err(self.io_error(e)),
        };
        serde_json::from_reader(BufReader::new(file)).map_err(|source| StoreError::Corrupt {
            path: self.path.display().to_string(),
            source,
        })
    }

    /// Current entries for an update, plus whether the file must be rewritten
    /// even if the update changes nothing.
    fn read_for_update(&self) -> Result<(Entries, bool), StoreError> {
        match self.read() {
            Ok(entries) => Ok((entries, false)),
            Err(err @ StoreError::Corrupt { .. }) => {
                tracing::warn!(error = %err, "Overwriting corrupt state file");
                Ok((Entries::new(), true))
            }
            Err(err) => Err(err),
        }
    }

    fn write(&self, entries: &Entries) -> Result<(), StoreError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut tmp = NamedTempFile::new_in(dir).map_err(|source| self.io_error(source))?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            serde_json::to_writer_pretty(&mut writer, entries)
                .map_err(|source| self.io_error(source.into()))?;
            writer.flush().map_err(|source| self.io_error(source))?;
        }
        tmp.as_file().sync_all().map_err(|source| self.io_error(source))?;
        tmp.persist(&self.path).map_err(|e| self.io_error(e.error))?;
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl DurableStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        match self.read() {
            Ok(mut entries) => entries.remove(key),
            Err(e) => {
                tracing::warn!(key, error = %e, "Failed to read durable store");
                None
            }
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let _guard = self.lock();
        let (mut entries, _) = self.read_for_update()?;
        entries.insert(key.to_string(), value.to_string());
        self.write(&entries)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let _guard = self.lock();
        let (mut entries, rewrite) = self.read_for_update()?;
        if entries.remove(key).is_some() || rewrite {
            self.write(&entries)?;
        }
        Ok(())
    }
}
