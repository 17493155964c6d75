//! Host-facing operations on a started [`CargoLib`](crate::CargoLib).

use crate::containers::{ContainerError, ContainerManager};
use crate::identity::{Identity, IdentityError, IdentityManager, IdentityOptions, IdentityPair};
use crate::templates::{TemplateManager, TemplateStoreError};
use cargolib_crypto::{Mnemonic, MnemonicError};
use cargolib_schema::{ContainerFilter, ContainerRecord, MountState, StorageTemplate, TemplateError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

/// Managers for one facade instance, all bound to the same LSS.
pub(crate) struct CoreState {
    pub(crate) identities: IdentityManager,
    pub(crate) templates: TemplateManager,
    pub(crate) containers: ContainerManager,
}

/// Cloneable handle onto the managers of one facade.
///
/// Every clone shares a single mutex, so operations from different threads
/// are applied one at a time in some total order.
#[derive(Clone)]
pub struct UserApi {
    core: Arc<Mutex<CoreState>>,
}

impl UserApi {
    pub(crate) fn new(core: Arc<Mutex<CoreState>>) -> Self {
        Self { core }
    }

    // Managers re-read the LSS on every query, so a poisoned guard is still usable.
    fn lock(&self) -> MutexGuard<'_, CoreState> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn generate_mnemonic(&self) -> Mnemonic {
        Mnemonic::generate()
    }

    pub fn mnemonic_from_words<S: AsRef<str>>(
        &self,
        words: &[S],
    ) -> Result<Mnemonic, MnemonicError> {
        Mnemonic::from_words(words)
    }

    pub fn mnemonic_from_phrase(&self, phrase: &str) -> Result<Mnemonic, MnemonicError> {
        Mnemonic::from_phrase(phrase)
    }

    pub fn create_identity_from_mnemonic(
        &self,
        mnemonic: &Mnemonic,
        device_name: &str,
    ) -> Result<IdentityPair, IdentityError> {
        self.create_identity_from_mnemonic_with(mnemonic, device_name, IdentityOptions::default())
    }

    pub fn create_identity_from_mnemonic_with(
        &self,
        mnemonic: &Mnemonic,
        device_name: &str,
        options: IdentityOptions,
    ) -> Result<IdentityPair, IdentityError> {
        let seed = mnemonic.to_seed();
        self.lock()
            .identities
            .create_from_seed_with(&seed, device_name, options)
    }

    /// Create an identity from host-supplied entropy. The returned mnemonic
    /// recovers the same identity later.
    pub fn create_identity_from_entropy(
        &self,
        entropy: &[u8],
        device_name: &str,
    ) -> Result<(Mnemonic, IdentityPair), IdentityError> {
        let mnemonic = Mnemonic::from_entropy(entropy)?;
        let pair = self.create_identity_from_mnemonic(&mnemonic, device_name)?;
        Ok((mnemonic, pair))
    }

    pub fn get_current_identity(&self) -> Result<Option<IdentityPair>, IdentityError> {
        self.lock().identities.get_current_identity()
    }

    pub fn rename_identity(
        &self,
        identity: &Identity,
        new_name: &str,
    ) -> Result<(), IdentityError> {
        self.lock().identities.rename(identity, new_name)
    }

    pub fn save_identity(&self, identity: &Identity) -> Result<(), IdentityError> {
        self.lock().identities.save(identity)
    }

    /// Forget the stored identity pair. Returns `false` if there was none.
    pub fn remove_identity(&self) -> Result<bool, IdentityError> {
        self.lock().identities.remove_current_identity()
    }

    pub fn template_from_json(&self, document: &[u8]) -> Result<StorageTemplate, TemplateError> {
        StorageTemplate::from_json(document)
    }

    pub fn template_from_yaml(&self, document: &[u8]) -> Result<StorageTemplate, TemplateError> {
        StorageTemplate::from_yaml(document)
    }

    pub fn save_template(
        &self,
        template: &mut StorageTemplate,
    ) -> Result<Uuid, TemplateStoreError> {
        self.lock().templates.save(template)
    }

    pub fn get_template(&self, uuid: &Uuid) -> Result<StorageTemplate, TemplateStoreError> {
        self.lock().templates.get(uuid)
    }

    pub fn list_templates(&self) -> Result<Vec<StorageTemplate>, TemplateStoreError> {
        self.lock().templates.list()
    }

    pub fn remove_template(&self, uuid: &Uuid) -> Result<(), TemplateStoreError> {
        self.lock().templates.remove(uuid)
    }

    /// Create a container owned by the current forest identity, optionally
    /// rendering a saved template into its first storage.
    pub fn create_container<S: AsRef<str>>(
        &self,
        name: &str,
        paths: &[S],
        template: Option<&Uuid>,
    ) -> Result<ContainerRecord, ContainerError> {
        let mut core = self.lock();
        let owner = core
            .identities
            .get_current_identity()?
            .ok_or(ContainerError::NoIdentity)?
            .forest
            .fingerprint();
        let template = template.map(|uuid| core.templates.get(uuid)).transpose()?;
        core.containers
            .create(name, paths, template.as_ref(), &owner)
    }

    pub fn get_container(&self, uuid: &Uuid) -> Result<ContainerRecord, ContainerError> {
        self.lock().containers.get(uuid)
    }

    pub fn add_container_path(&self, uuid: &Uuid, path: &str) -> Result<bool, ContainerError> {
        self.lock().containers.add_path(uuid, path)
    }

    pub fn remove_container_path(&self, uuid: &Uuid, path: &str) -> Result<bool, ContainerError> {
        self.lock().containers.remove_path(uuid, path)
    }

    pub fn set_container_mounted(&self, uuid: &Uuid, mounted: bool) -> Result<(), ContainerError> {
        self.lock().containers.set_mounted(uuid, mounted)
    }

    pub fn delete_container(&self, uuid: &Uuid) -> Result<(), ContainerError> {
        self.lock().containers.delete(uuid)
    }

    pub fn find_containers(
        &self,
        filter: Option<&ContainerFilter>,
        mount_state: MountState,
    ) -> Result<Vec<ContainerRecord>, ContainerError> {
        self.lock().containers.find(filter, mount_state)
    }
}
