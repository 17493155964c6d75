use crate::lss::LocalSecureStorage;
use crate::StoreError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Envelope around every value the core writes to the LSS.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredRecord {
    /// blake3 of the canonical JSON encoding of `data`.
    pub checksum: String,
    pub updated_at: String,
    pub data: Value,
}

impl StoredRecord {
    fn seal(data: Value) -> Result<Self, StoreError> {
        Ok(Self {
            checksum: checksum_of(&data)?,
            updated_at: chrono::Utc::now().to_rfc3339(),
            data,
        })
    }

    fn verify(&self, key: &str) -> Result<(), StoreError> {
        let actual = checksum_of(&self.data)?;
        if actual != self.checksum {
            return Err(StoreError::IntegrityFailure {
                key: key.to_owned(),
                expected: self.checksum.clone(),
                actual,
            });
        }
        Ok(())
    }
}

fn checksum_of(data: &Value) -> Result<String, StoreError> {
    let bytes = serde_json::to_vec(data)?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}

/// Typed, checksummed JSON access to a host LSS.
#[derive(Clone)]
pub struct LssService {
    lss: Arc<dyn LocalSecureStorage>,
}

impl LssService {
    pub fn new(lss: Arc<dyn LocalSecureStorage>) -> Self {
        Self { lss }
    }

    pub fn lss(&self) -> &Arc<dyn LocalSecureStorage> {
        &self.lss
    }

    pub fn put<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let record = StoredRecord::seal(serde_json::to_value(value)?)?;
        let bytes = serde_json::to_vec(&record)?;
        self.lss.insert(key, bytes)?;
        debug!("stored record {key}");
        Ok(())
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        let Some(bytes) = self.lss.get(key)? else {
            return Ok(None);
        };
        let record: StoredRecord = serde_json::from_slice(&bytes)?;
        if let Err(e) = record.verify(key) {
            warn!("integrity check failed for {key}");
            return Err(e);
        }
        Ok(Some(serde_json::from_value(record.data)?))
    }

    /// Remove a record. Returns whether it existed.
    pub fn remove(&self, key: &str) -> Result<bool, StoreError> {
        let existed = self.lss.remove(key)?.is_some();
        if existed {
            debug!("removed record {key}");
        }
        Ok(existed)
    }

    pub fn contains(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.lss.contains_key(key)?)
    }

    /// Every record under `prefix`, sorted by key.
    pub fn list_prefixed<T: DeserializeOwned>(
        &self,
        prefix: &str,
    ) -> Result<Vec<(String, T)>, StoreError> {
        let mut keys = self.lss.keys_starting_with(prefix)?;
        keys.sort_unstable();
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            // A key can vanish between listing and reading.
            if let Some(value) = self.get(&key)? {
                out.push((key, value));
            }
        }
        Ok(out)
    }
}
