//! Forest and device identities and their persistence.

use cargolib_crypto::{
    derive_device, derive_forest, KeyError, MnemonicError, Seed, SigningKeypair, PUBLIC_KEY_LEN,
    SIGNATURE_LEN,
};
use cargolib_schema::{Fingerprint, ShortFingerprint};
use cargolib_store::{KeyLayout, LssService, StoreError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};
use thiserror::Error;
use tracing::{debug, info, warn};

const MAX_NAME_LEN: usize = 128;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("an identity is already stored; remove it or request an overwrite")]
    AlreadyExists,
    #[error("identity not found: {0}")]
    NotFound(String),
    #[error("identity storage failure: {0}")]
    StorageFailure(#[from] StoreError),
    #[error(transparent)]
    Mnemonic(#[from] MnemonicError),
    #[error("invalid identity name: {0}")]
    InvalidName(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdentityKind {
    Forest,
    Device,
}

impl fmt::Display for IdentityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Forest => f.write_str("forest"),
            Self::Device => f.write_str("device"),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
struct IdentityRecord {
    fingerprint: Fingerprint,
    kind: IdentityKind,
    name: String,
    keypair: SigningKeypair,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    forest: Option<Fingerprint>,
    created_at: String,
}

/// Shared handle to one identity record.
///
/// Clones point at the same record, so a rename through any handle is seen
/// through all of them.
#[derive(Clone)]
pub struct Identity {
    inner: Arc<RwLock<IdentityRecord>>,
}

impl Identity {
    fn from_record(record: IdentityRecord) -> Self {
        Self {
            inner: Arc::new(RwLock::new(record)),
        }
    }

    pub fn forest(keypair: SigningKeypair, name: impl Into<String>) -> Self {
        Self::from_record(IdentityRecord {
            fingerprint: keypair.fingerprint(),
            kind: IdentityKind::Forest,
            name: name.into(),
            keypair,
            forest: None,
            created_at: chrono::Utc::now().to_rfc3339(),
        })
    }

    pub fn device(keypair: SigningKeypair, name: impl Into<String>, forest: &Identity) -> Self {
        Self::from_record(IdentityRecord {
            fingerprint: keypair.fingerprint(),
            kind: IdentityKind::Device,
            name: name.into(),
            keypair,
            forest: Some(forest.fingerprint()),
            created_at: chrono::Utc::now().to_rfc3339(),
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, IdentityRecord> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn snapshot(&self) -> IdentityRecord {
        self.read().clone()
    }

    fn set_name(&self, name: &str) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .name = name.to_owned();
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.read().fingerprint.clone()
    }

    pub fn short_fingerprint(&self) -> ShortFingerprint {
        self.read().fingerprint.short()
    }

    pub fn kind(&self) -> IdentityKind {
        self.read().kind
    }

    pub fn name(&self) -> String {
        self.read().name.clone()
    }

    /// Fingerprint of the owning forest. `None` for forest identities.
    pub fn forest_fingerprint(&self) -> Option<Fingerprint> {
        self.read().forest.clone()
    }

    pub fn created_at(&self) -> String {
        self.read().created_at.clone()
    }

    pub fn public_key(&self) -> [u8; PUBLIC_KEY_LEN] {
        self.read().keypair.public_key()
    }

    pub fn sign(&self, message: &[u8]) -> [u8; SIGNATURE_LEN] {
        self.read().keypair.sign(message)
    }

    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<(), KeyError> {
        self.read().keypair.verify(message, signature)
    }

    /// Same identity, regardless of display name.
    pub fn is_same(&self, other: &Identity) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner) || self.fingerprint() == other.fingerprint()
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let record = self.read();
        f.debug_struct("Identity")
            .field("fingerprint", &record.fingerprint.short())
            .field("kind", &record.kind)
            .field("name", &record.name)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct IdentityPair {
    pub forest: Identity,
    pub device: Identity,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityOptions {
    /// Replace a stored identity instead of failing with `AlreadyExists`.
    pub overwrite: bool,
}

pub fn validate_identity_name(name: &str) -> Result<(), IdentityError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(IdentityError::InvalidName(
            "name must not be empty".to_owned(),
        ));
    }
    if trimmed.chars().count() > MAX_NAME_LEN {
        return Err(IdentityError::InvalidName(format!(
            "name must be at most {MAX_NAME_LEN} characters"
        )));
    }
    if trimmed.chars().any(char::is_control) {
        return Err(IdentityError::InvalidName(
            "name must not contain control characters".to_owned(),
        ));
    }
    Ok(())
}

/// Owns the current forest/device identity pair.
///
/// The LSS is the source of truth. The only in-memory state is the live pair
/// of handles, which is written back on every mutation and re-checked
/// against storage on every query.
pub struct IdentityManager {
    store: LssService,
    layout: KeyLayout,
    current: Option<IdentityPair>,
}

impl IdentityManager {
    pub fn new(store: LssService, layout: KeyLayout) -> Self {
        Self {
            store,
            layout,
            current: None,
        }
    }

    pub fn create_from_seed(
        &mut self,
        seed: &Seed,
        device_name: &str,
    ) -> Result<IdentityPair, IdentityError> {
        self.create_from_seed_with(seed, device_name, IdentityOptions::default())
    }

    pub fn create_from_seed_with(
        &mut self,
        seed: &Seed,
        device_name: &str,
        options: IdentityOptions,
    ) -> Result<IdentityPair, IdentityError> {
        validate_identity_name(device_name)?;
        let device_name = device_name.trim();

        let forest_key = self.layout.forest_identity_key();
        let device_key = self.layout.device_identity_key();
        if self.store.contains(&forest_key)? || self.store.contains(&device_key)? {
            if !options.overwrite {
                return Err(IdentityError::AlreadyExists);
            }
            self.remove_current_identity()?;
        }

        let forest = Identity::forest(derive_forest(seed), "");
        let device = Identity::device(derive_device(seed, device_name), device_name, &forest);

        self.store.put(&forest_key, &forest.snapshot())?;
        if let Err(e) = self.store.put(&device_key, &device.snapshot()) {
            if let Err(cleanup) = self.store.remove(&forest_key) {
                warn!("failed to remove orphaned forest record: {cleanup}");
            }
            return Err(e.into());
        }

        info!(
            "created identity pair: forest {}, device {}",
            forest.short_fingerprint(),
            device.short_fingerprint()
        );
        let pair = IdentityPair { forest, device };
        self.current = Some(pair.clone());
        Ok(pair)
    }

    /// Current identity pair, or `None` if none has been created.
    ///
    /// Repeated calls return the same live handles as long as storage still
    /// holds the same identities.
    pub fn get_current_identity(&mut self) -> Result<Option<IdentityPair>, IdentityError> {
        let forest_key = self.layout.forest_identity_key();
        let device_key = self.layout.device_identity_key();
        let forest = self.load_record(&forest_key)?;
        let device = self.load_record(&device_key)?;

        let (forest, device) = match (forest, device) {
            (None, None) => {
                self.current = None;
                return Ok(None);
            }
            (Some(forest), Some(device)) => (forest, device),
            (Some(_), None) => {
                return Err(IdentityError::NotFound(format!(
                    "device identity missing from {device_key}"
                )))
            }
            (None, Some(_)) => {
                return Err(IdentityError::NotFound(format!(
                    "forest identity missing from {forest_key}"
                )))
            }
        };

        if device.forest.as_ref() != Some(&forest.fingerprint) {
            return Err(StoreError::IntegrityFailure {
                key: device_key,
                expected: forest.fingerprint.to_string(),
                actual: device
                    .forest
                    .map(Fingerprint::into_inner)
                    .unwrap_or_default(),
            }
            .into());
        }

        if let Some(pair) = &self.current {
            if pair.forest.fingerprint() == forest.fingerprint
                && pair.device.fingerprint() == device.fingerprint
            {
                // Names may have been changed by another handle on the same LSS.
                pair.forest.set_name(&forest.name);
                pair.device.set_name(&device.name);
                return Ok(Some(pair.clone()));
            }
        }

        debug!("loaded identity pair for forest {}", forest.fingerprint.short());
        let pair = IdentityPair {
            forest: Identity::from_record(forest),
            device: Identity::from_record(device),
        };
        self.current = Some(pair.clone());
        Ok(Some(pair))
    }

    /// Rename an identity and persist the change.
    pub fn rename(&mut self, identity: &Identity, new_name: &str) -> Result<(), IdentityError> {
        validate_identity_name(new_name)?;
        let live = self.live_handle(identity)?;
        let new_name = new_name.trim();
        let old_name = live.name();

        live.set_name(new_name);
        if let Err(e) = self.persist(&live) {
            live.set_name(&old_name);
            return Err(e);
        }
        if !Arc::ptr_eq(&live.inner, &identity.inner) {
            identity.set_name(new_name);
        }
        info!("renamed {} identity {}", live.kind(), live.short_fingerprint());
        Ok(())
    }

    /// Persist an identity explicitly.
    pub fn save(&mut self, identity: &Identity) -> Result<(), IdentityError> {
        let live = self.live_handle(identity)?;
        if !Arc::ptr_eq(&live.inner, &identity.inner) {
            live.set_name(&identity.name());
        }
        self.persist(&live)?;
        debug!("saved {} identity {}", live.kind(), live.short_fingerprint());
        Ok(())
    }

    /// Delete both stored identity records. Returns whether anything was removed.
    pub fn remove_current_identity(&mut self) -> Result<bool, IdentityError> {
        let device = self.store.remove(&self.layout.device_identity_key())?;
        let forest = self.store.remove(&self.layout.forest_identity_key())?;
        self.current = None;
        if forest || device {
            info!("removed stored identity pair");
        }
        Ok(forest || device)
    }

    fn live_handle(&mut self, identity: &Identity) -> Result<Identity, IdentityError> {
        let fingerprint = identity.fingerprint();
        let not_current = || {
            IdentityError::NotFound(format!(
                "{} is not the current forest or device identity",
                fingerprint.short()
            ))
        };
        let pair = self.get_current_identity()?.ok_or_else(not_current)?;
        [pair.forest, pair.device]
            .into_iter()
            .find(|live| live.fingerprint() == fingerprint)
            .ok_or_else(not_current)
    }

    fn persist(&self, identity: &Identity) -> Result<(), IdentityError> {
        let key = match identity.kind() {
            IdentityKind::Forest => self.layout.forest_identity_key(),
            IdentityKind::Device => self.layout.device_identity_key(),
        };
        self.store.put(&key, &identity.snapshot())?;
        Ok(())
    }

    fn load_record(&self, key: &str) -> Result<Option<IdentityRecord>, IdentityError> {
        let Some(record) = self.store.get::<IdentityRecord>(key)? else {
            return Ok(None);
        };
        let actual = record.keypair.fingerprint();
        if actual != record.fingerprint {
            warn!("stored key material does not match fingerprint under {key}");
            return Err(StoreError::IntegrityFailure {
                key: key.to_owned(),
                expected: record.fingerprint.into_inner(),
                actual: actual.into_inner(),
            }
            .into());
        }
        Ok(Some(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cargolib_crypto::Mnemonic;
    use cargolib_store::{LocalSecureStorage, LssError, MemoryLss};

    const PHRASE: &str =
        "update inherit giant spray expire enforce animal ship congress weather camp endless";

    fn seed() -> Seed {
        Mnemonic::from_phrase(PHRASE).unwrap().to_seed()
    }

    fn manager() -> (Arc<MemoryLss>, IdentityManager) {
        let lss = Arc::new(MemoryLss::new());
        let mgr = IdentityManager::new(LssService::new(lss.clone()), KeyLayout::default());
        (lss, mgr)
    }

    #[test]
    fn create_then_get_returns_same_handles() {
        let (_, mut mgr) = manager();
        let pair = mgr.create_from_seed(&seed(), "My Mac").unwrap();
        assert_eq!(pair.device.name(), "My Mac");
        assert_eq!(pair.device.kind(), IdentityKind::Device);
        assert_eq!(pair.forest.kind(), IdentityKind::Forest);
        assert_eq!(
            pair.device.forest_fingerprint(),
            Some(pair.forest.fingerprint())
        );

        let current = mgr.get_current_identity().unwrap().unwrap();
        assert!(Arc::ptr_eq(&current.device.inner, &pair.device.inner));
        assert!(current.forest.is_same(&pair.forest));
    }

    #[test]
    fn second_create_requires_overwrite() {
        let (_, mut mgr) = manager();
        mgr.create_from_seed(&seed(), "My Mac").unwrap();
        assert!(matches!(
            mgr.create_from_seed(&seed(), "Other").unwrap_err(),
            IdentityError::AlreadyExists
        ));

        let pair = mgr
            .create_from_seed_with(&seed(), "Other", IdentityOptions { overwrite: true })
            .unwrap();
        assert_eq!(pair.device.name(), "Other");
        let current = mgr.get_current_identity().unwrap().unwrap();
        assert_eq!(current.device.name(), "Other");
    }

    #[test]
    fn recreation_yields_identical_fingerprints() {
        let (_, mut first) = manager();
        let (_, mut second) = manager();
        let a = first.create_from_seed(&seed(), "My Mac").unwrap();
        let b = second.create_from_seed(&seed(), "My Mac").unwrap();
        assert_eq!(a.forest.fingerprint(), b.forest.fingerprint());
        assert_eq!(a.device.fingerprint(), b.device.fingerprint());
        assert!(a.device.is_same(&b.device));
    }

    #[test]
    fn rename_is_visible_through_every_handle_and_after_reload() {
        let (lss, mut mgr) = manager();
        let pair = mgr.create_from_seed(&seed(), "My Mac").unwrap();
        let second_ref = pair.device.clone();

        mgr.rename(&pair.device, "Work Laptop").unwrap();
        assert_eq!(second_ref.name(), "Work Laptop");

        let mut reloaded =
            IdentityManager::new(LssService::new(lss.clone()), KeyLayout::default());
        let fresh = reloaded.get_current_identity().unwrap().unwrap();
        assert_eq!(fresh.device.name(), "Work Laptop");
        assert!(fresh.device.is_same(&pair.device));
    }

    #[test]
    fn rename_of_stale_handle_updates_live_one() {
        let (lss, mut mgr) = manager();
        let pair = mgr.create_from_seed(&seed(), "My Mac").unwrap();

        let mut other = IdentityManager::new(LssService::new(lss.clone()), KeyLayout::default());
        let foreign = other.get_current_identity().unwrap().unwrap();
        assert!(!Arc::ptr_eq(&foreign.device.inner, &pair.device.inner));

        mgr.rename(&foreign.device, "Renamed").unwrap();
        assert_eq!(pair.device.name(), "Renamed");
        assert_eq!(foreign.device.name(), "Renamed");
    }

    #[test]
    fn rename_rejects_bad_names_without_change() {
        let (_, mut mgr) = manager();
        let pair = mgr.create_from_seed(&seed(), "My Mac").unwrap();
        assert!(matches!(
            mgr.rename(&pair.device, "   ").unwrap_err(),
            IdentityError::InvalidName(_)
        ));
        assert!(matches!(
            mgr.rename(&pair.device, "bad\nname").unwrap_err(),
            IdentityError::InvalidName(_)
        ));
        assert_eq!(pair.device.name(), "My Mac");
    }

    #[test]
    fn failed_persist_reverts_rename() {
        let (lss, mut mgr) = manager();
        let pair = mgr.create_from_seed(&seed(), "My Mac").unwrap();
        lss.fail_with("offline");
        assert!(matches!(
            mgr.rename(&pair.device, "New").unwrap_err(),
            IdentityError::StorageFailure(StoreError::Lss(LssError::BackendFailure(_)))
        ));
        lss.recover();
        assert_eq!(pair.device.name(), "My Mac");
    }

    #[test]
    fn save_of_unknown_identity_is_not_found() {
        let (_, mut mgr) = manager();
        let stray = Identity::forest(derive_forest(&seed()), "stray");
        assert!(matches!(
            mgr.save(&stray).unwrap_err(),
            IdentityError::NotFound(_)
        ));

        mgr.create_from_seed(&seed(), "My Mac").unwrap();
        let unrelated = Identity::forest(
            derive_forest(&Mnemonic::from_entropy(&[3u8; 16]).unwrap().to_seed()),
            "x",
        );
        assert!(matches!(
            mgr.save(&unrelated).unwrap_err(),
            IdentityError::NotFound(_)
        ));
    }

    #[test]
    fn save_persists_handle_state() {
        let (lss, mut mgr) = manager();
        let pair = mgr.create_from_seed(&seed(), "My Mac").unwrap();
        mgr.save(&pair.forest).unwrap();
        let mut reloaded = IdentityManager::new(LssService::new(lss), KeyLayout::default());
        let fresh = reloaded.get_current_identity().unwrap().unwrap();
        assert_eq!(fresh.forest.fingerprint(), pair.forest.fingerprint());
    }

    #[test]
    fn no_identity_reads_as_none() {
        let (_, mut mgr) = manager();
        assert!(mgr.get_current_identity().unwrap().is_none());
        assert!(!mgr.remove_current_identity().unwrap());
    }

    #[test]
    fn storage_failure_is_wrapped() {
        let (lss, mut mgr) = manager();
        lss.fail_with("disk on fire");
        assert!(matches!(
            mgr.create_from_seed(&seed(), "My Mac").unwrap_err(),
            IdentityError::StorageFailure(StoreError::Lss(_))
        ));
        assert!(matches!(
            mgr.get_current_identity().unwrap_err(),
            IdentityError::StorageFailure(_)
        ));
    }

    #[test]
    fn swapped_key_material_fails_integrity() {
        let (lss, mut mgr) = manager();
        mgr.create_from_seed(&seed(), "My Mac").unwrap();

        let svc = LssService::new(lss.clone());
        let key = KeyLayout::default().device_identity_key();
        let mut record: serde_json::Value = svc.get(&key).unwrap().unwrap();
        record["keypair"] =
            serde_json::to_value(derive_device(&seed(), "Someone Else")).unwrap();
        svc.put(&key, &record).unwrap();

        assert!(matches!(
            mgr.get_current_identity().unwrap_err(),
            IdentityError::StorageFailure(StoreError::IntegrityFailure { .. })
        ));
    }

    #[test]
    fn half_written_pair_is_reported() {
        let (lss, mut mgr) = manager();
        mgr.create_from_seed(&seed(), "My Mac").unwrap();
        lss.remove(&KeyLayout::default().device_identity_key())
            .unwrap();
        assert!(matches!(
            mgr.get_current_identity().unwrap_err(),
            IdentityError::NotFound(_)
        ));
    }

    #[test]
    fn identities_sign_and_verify() {
        let (_, mut mgr) = manager();
        let pair = mgr.create_from_seed(&seed(), "My Mac").unwrap();
        let sig = pair.device.sign(b"payload");
        pair.device.verify(b"payload", &sig).unwrap();
        assert!(pair.forest.verify(b"payload", &sig).is_err());
    }

    #[test]
    fn debug_does_not_leak_secret() {
        let (_, mut mgr) = manager();
        let pair = mgr.create_from_seed(&seed(), "My Mac").unwrap();
        let printed = format!("{:?}", pair.device);
        assert!(printed.contains("My Mac"));
        assert!(!printed.contains("secret"));
    }
}
