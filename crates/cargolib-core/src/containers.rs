use crate::identity::IdentityError;
use crate::templates::TemplateStoreError;
use cargolib_schema::{
    is_valid_container_path, AccessMode, ContainerFilter, ContainerRecord, Fingerprint,
    MountState, StorageTemplate, TemplateContext,
};
use cargolib_store::{KeyLayout, LssService, StoreError};
use std::collections::BTreeSet;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("invalid container name: {0}")]
    InvalidName(String),
    #[error("invalid container path: '{0}'")]
    InvalidPath(String),
    #[error("container not found: {0}")]
    NotFound(Uuid),
    #[error("no identity exists to own the container")]
    NoIdentity,
    #[error(transparent)]
    Identity(#[from] IdentityError),
    #[error(transparent)]
    Template(#[from] TemplateStoreError),
    #[error("container storage failure: {0}")]
    StorageFailure(#[from] StoreError),
}

fn validate_paths<S: AsRef<str>>(paths: &[S]) -> Result<BTreeSet<String>, ContainerError> {
    paths
        .iter()
        .map(|p| {
            let p = p.as_ref();
            if is_valid_container_path(p) {
                Ok(p.to_owned())
            } else {
                Err(ContainerError::InvalidPath(p.to_owned()))
            }
        })
        .collect()
}

/// Container records under `<namespace>.container.<uuid>` and the lookup
/// over them.
pub struct ContainerManager {
    store: LssService,
    layout: KeyLayout,
}

impl ContainerManager {
    pub fn new(store: LssService, layout: KeyLayout) -> Self {
        Self { store, layout }
    }

    /// Create a container, rendering `template` into its first storage.
    pub fn create<S: AsRef<str>>(
        &self,
        name: &str,
        paths: &[S],
        template: Option<&StorageTemplate>,
        owner: &Fingerprint,
    ) -> Result<ContainerRecord, ContainerError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ContainerError::InvalidName(
                "name must not be empty".to_owned(),
            ));
        }
        let paths = validate_paths(paths)?;
        let uuid = Uuid::new_v4();

        let storages = match template {
            None => Vec::new(),
            Some(template) => {
                let ctx = TemplateContext {
                    container_name: name.to_owned(),
                    container_uuid: uuid,
                    owner: owner.to_string(),
                    access_mode: if template.template.read_only {
                        AccessMode::ReadOnly
                    } else {
                        AccessMode::ReadWrite
                    },
                    paths: paths.iter().cloned().collect(),
                };
                vec![template.render(&ctx).map_err(TemplateStoreError::from)?]
            }
        };

        let record = ContainerRecord {
            uuid,
            name: name.to_owned(),
            paths,
            mounted: false,
            storages,
        };
        self.put(&record)?;
        info!("created container '{}' ({uuid})", record.name);
        Ok(record)
    }

    pub fn get(&self, uuid: &Uuid) -> Result<ContainerRecord, ContainerError> {
        self.store
            .get(&self.layout.container_key(uuid))?
            .ok_or(ContainerError::NotFound(*uuid))
    }

    /// Add a path. Returns `false` if the container already had it.
    pub fn add_path(&self, uuid: &Uuid, path: &str) -> Result<bool, ContainerError> {
        if !is_valid_container_path(path) {
            return Err(ContainerError::InvalidPath(path.to_owned()));
        }
        let mut record = self.get(uuid)?;
        if !record.paths.insert(path.to_owned()) {
            return Ok(false);
        }
        self.put(&record)?;
        debug!("added path {path} to container {uuid}");
        Ok(true)
    }

    /// Remove a path. Returns `false` if the container did not have it.
    pub fn remove_path(&self, uuid: &Uuid, path: &str) -> Result<bool, ContainerError> {
        let mut record = self.get(uuid)?;
        if !record.paths.remove(path) {
            return Ok(false);
        }
        self.put(&record)?;
        debug!("removed path {path} from container {uuid}");
        Ok(true)
    }

    pub fn set_mounted(&self, uuid: &Uuid, mounted: bool) -> Result<(), ContainerError> {
        let mut record = self.get(uuid)?;
        if record.mounted != mounted {
            record.mounted = mounted;
            self.put(&record)?;
        }
        debug!("container {uuid} mounted={mounted}");
        Ok(())
    }

    pub fn delete(&self, uuid: &Uuid) -> Result<(), ContainerError> {
        if !self.store.remove(&self.layout.container_key(uuid))? {
            return Err(ContainerError::NotFound(*uuid));
        }
        info!("deleted container {uuid}");
        Ok(())
    }

    /// Containers admitted by `mount_state` whose paths satisfy `filter`.
    /// No filter admits every path set. Sorted by name, then UUID.
    pub fn find(
        &self,
        filter: Option<&ContainerFilter>,
        mount_state: MountState,
    ) -> Result<Vec<ContainerRecord>, ContainerError> {
        let mut found: Vec<ContainerRecord> = self
            .store
            .list_prefixed::<ContainerRecord>(&self.layout.container_prefix())?
            .into_iter()
            .map(|(_, record)| record)
            .filter(|record| mount_state.admits(record.mounted))
            .filter(|record| filter.is_none_or(|f| f.matches(&record.paths)))
            .collect();
        found.sort_by(|a, b| (&a.name, a.uuid).cmp(&(&b.name, b.uuid)));
        debug!("container lookup matched {}", found.len());
        Ok(found)
    }

    fn put(&self, record: &ContainerRecord) -> Result<(), ContainerError> {
        self.store
            .put(&self.layout.container_key(&record.uuid), record)?;
        Ok(())
    }
}
