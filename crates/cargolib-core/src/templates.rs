use cargolib_schema::{StorageTemplate, TemplateError};
use cargolib_store::{KeyLayout, LssService, StoreError};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum TemplateStoreError {
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error("template storage failure: {0}")]
    StorageFailure(#[from] StoreError),
    #[error("storage template not found: {0}")]
    NotFound(Uuid),
}

/// Persists storage templates under `<namespace>.template.<uuid>`.
pub struct TemplateManager {
    store: LssService,
    layout: KeyLayout,
}

impl TemplateManager {
    pub fn new(store: LssService, layout: KeyLayout) -> Self {
        Self { store, layout }
    }

    /// Validate and persist a template, assigning a UUID if it has none.
    pub fn save(&self, template: &mut StorageTemplate) -> Result<Uuid, TemplateStoreError> {
        template.validate()?;
        let uuid = template.uuid.unwrap_or_else(Uuid::new_v4);
        let mut stored = template.clone();
        stored.uuid = Some(uuid);
        self.store.put(&self.layout.template_key(&uuid), &stored)?;
        template.uuid = Some(uuid);
        info!("saved {} storage template {uuid}", template.backend_type);
        Ok(uuid)
    }

    pub fn get(&self, uuid: &Uuid) -> Result<StorageTemplate, TemplateStoreError> {
        self.store
            .get(&self.layout.template_key(uuid))?
            .ok_or(TemplateStoreError::NotFound(*uuid))
    }

    /// All stored templates, ordered by name then UUID.
    pub fn list(&self) -> Result<Vec<StorageTemplate>, TemplateStoreError> {
        let mut templates: Vec<StorageTemplate> = self
            .store
            .list_prefixed(&self.layout.template_prefix())?
            .into_iter()
            .map(|(_, t)| t)
            .collect();
        templates.sort_by(|a, b| (&a.name, a.uuid).cmp(&(&b.name, b.uuid)));
        debug!("listed {} storage templates", templates.len());
        Ok(templates)
    }

    pub fn remove(&self, uuid: &Uuid) -> Result<(), TemplateStoreError> {
        if !self.store.remove(&self.layout.template_key(uuid))? {
            return Err(TemplateStoreError::NotFound(*uuid));
        }
        info!("removed storage template {uuid}");
        Ok(())
    }
}
