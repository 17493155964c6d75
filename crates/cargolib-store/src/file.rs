use crate::fsync_dir;
use crate::lock::FileLock;
use crate::lss::{LocalSecureStorage, LssError, LssResult};
use crate::StoreError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

const FILE_FORMAT_VERSION: u32 = 1;

/// LSS persisted as a single JSON document with hex-encoded values.
///
/// Every mutation holds an exclusive lock on `<file>.lock` across the
/// read-modify-write, and replaces the document atomically, so several
/// processes can share one file.
#[derive(Debug, Clone)]
pub struct FileLss {
    path: PathBuf,
    lock_path: PathBuf,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Document {
    format_version: u32,
    entries: BTreeMap<String, String>,
}

type Entries = BTreeMap<String, Vec<u8>>;

impl FileLss {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let file_name = path.file_name().ok_or_else(|| {
            StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("LSS path has no file name: {}", path.display()),
            ))
        })?;
        let mut lock_name = file_name.to_os_string();
        lock_name.push(".lock");
        let lock_path = path.with_file_name(lock_name);

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        debug!("opened file LSS at {}", path.display());
        Ok(Self { path, lock_path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_entries(&self) -> Result<Entries, StoreError> {
        if !self.path.exists() {
            return Ok(Entries::new());
        }
        let content = fs::read(&self.path)?;
        let doc: Document = serde_json::from_slice(&content)?;
        if doc.format_version != FILE_FORMAT_VERSION {
            return Err(StoreError::VersionMismatch {
                expected: FILE_FORMAT_VERSION,
                found: doc.format_version,
            });
        }
        doc.entries
            .into_iter()
            .map(|(k, v)| {
                let bytes = hex::decode(&v).map_err(|e| {
                    StoreError::Io(std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        format!("corrupt value for key '{k}': {e}"),
                    ))
                })?;
                Ok((k, bytes))
            })
            .collect()
    }

    fn write_entries(&self, entries: &Entries) -> Result<(), StoreError> {
        let doc = Document {
            format_version: FILE_FORMAT_VERSION,
            entries: entries
                .iter()
                .map(|(k, v)| (k.clone(), hex::encode(v)))
                .collect(),
        };
        let content = serde_json::to_string_pretty(&doc)?;

        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)
            .map_err(|e| StoreError::Io(e.error))?;
        fsync_dir(&dir)?;
        Ok(())
    }

    fn read<T>(&self, f: impl FnOnce(&Entries) -> T) -> LssResult<T> {
        let _lock = FileLock::shared(&self.lock_path).map_err(backend_failure)?;
        let entries = self.read_entries().map_err(backend_failure)?;
        Ok(f(&entries))
    }

    fn modify<T>(&self, f: impl FnOnce(&mut Entries) -> (T, bool)) -> LssResult<T> {
        let _lock = FileLock::exclusive(&self.lock_path).map_err(backend_failure)?;
        let mut entries = self.read_entries().map_err(backend_failure)?;
        let (out, changed) = f(&mut entries);
        if changed {
            self.write_entries(&entries).map_err(backend_failure)?;
        }
        Ok(out)
    }
}

#[allow(clippy::needless_pass_by_value)]
fn backend_failure(e: StoreError) -> LssError {
    LssError::BackendFailure(e.to_string())
}

impl LocalSecureStorage for FileLss {
    fn insert(&self, key: &str, value: Vec<u8>) -> LssResult<Option<Vec<u8>>> {
        self.modify(|entries| (entries.insert(key.to_owned(), value), true))
    }

    fn get(&self, key: &str) -> LssResult<Option<Vec<u8>>> {
        self.read(|entries| entries.get(key).cloned())
    }

    fn contains_key(&self, key: &str) -> LssResult<bool> {
        self.read(|entries| entries.contains_key(key))
    }

    fn keys(&self) -> LssResult<Vec<String>> {
        self.read(|entries| entries.keys().cloned().collect())
    }

    fn keys_starting_with(&self, prefix: &str) -> LssResult<Vec<String>> {
        self.read(|entries| {
            entries
                .keys()
                .filter(|k| k.starts_with(prefix))
                .cloned()
                .collect()
        })
    }

    fn remove(&self, key: &str) -> LssResult<Option<Vec<u8>>> {
        self.modify(|entries| {
            let previous = entries.remove(key);
            let changed = previous.is_some();
            (previous, changed)
        })
    }

    fn len(&self) -> LssResult<usize> {
        self.read(BTreeMap::len)
    }

    fn is_empty(&self) -> LssResult<bool> {
        self.read(BTreeMap::is_empty)
    }
}
