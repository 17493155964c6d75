//! Local secure storage (LSS) for cargolib.
//!
//! The host supplies a [`LocalSecureStorage`] implementation; the core only
//! talks to it through this trait. [`MemoryLss`] and [`FileLss`] are
//! reference backends. [`LssService`] layers typed, checksummed JSON records
//! on top, and [`KeyLayout`] owns every key name the core writes.

pub mod file;
pub mod layout;
pub mod lock;
pub mod lss;
pub mod memory;
pub mod service;

pub use file::FileLss;
pub use layout::{KeyLayout, DEFAULT_NAMESPACE, KEY_FORMAT_VERSION};
pub use lock::FileLock;
pub use lss::{LocalSecureStorage, LssError, LssResult};
pub use memory::MemoryLss;
pub use service::{LssService, StoredRecord};

use std::path::Path;
use thiserror::Error;

/// Fsync a directory so that a preceding `rename()` is durable.
pub(crate) fn fsync_dir(dir: &Path) -> Result<(), std::io::Error> {
    let f = std::fs::File::open(dir)?;
    f.sync_all()
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Lss(#[from] LssError),
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("integrity check failed for '{key}': expected {expected}, got {actual}")]
    IntegrityFailure {
        key: String,
        expected: String,
        actual: String,
    },
    #[error("key layout version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
    #[error("lock acquisition failed: {0}")]
    LockFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_wraps_lss_error_transparently() {
        let e = StoreError::from(LssError::BackendFailure("disk full".to_owned()));
        assert!(e.to_string().contains("disk full"));
        assert!(matches!(e, StoreError::Lss(LssError::BackendFailure(_))));
    }

    #[test]
    fn store_error_display_version_mismatch() {
        let e = StoreError::VersionMismatch {
            expected: 2,
            found: 1,
        };
        let msg = e.to_string();
        assert!(msg.contains('2'));
        assert!(msg.contains('1'));
    }

    #[test]
    fn store_error_display_integrity_failure() {
        let e = StoreError::IntegrityFailure {
            key: "k".to_owned(),
            expected: "exp".to_owned(),
            actual: "act".to_owned(),
        };
        let msg = e.to_string();
        assert!(msg.contains("exp"));
        assert!(msg.contains("act"));
    }
}
