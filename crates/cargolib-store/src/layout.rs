use crate::service::LssService;
use crate::StoreError;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

/// Current key layout version. Incremented on incompatible record changes.
pub const KEY_FORMAT_VERSION: u32 = 1;
pub const DEFAULT_NAMESPACE: &str = "cargolib";

/// Names of every LSS key the core owns.
///
/// All keys live under one namespace so they never collide with host data
/// stored in the same backend. The format version marker is written on
/// [`initialize`](Self::initialize).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyLayout {
    namespace: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct LayoutVersion {
    format_version: u32,
}

impl Default for KeyLayout {
    fn default() -> Self {
        Self::new(DEFAULT_NAMESPACE)
    }
}

impl KeyLayout {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    #[inline]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    #[inline]
    pub fn forest_identity_key(&self) -> String {
        format!("{}.identity.forest", self.namespace)
    }

    #[inline]
    pub fn device_identity_key(&self) -> String {
        format!("{}.identity.device", self.namespace)
    }

    #[inline]
    pub fn template_prefix(&self) -> String {
        format!("{}.template.", self.namespace)
    }

    #[inline]
    pub fn template_key(&self, uuid: &Uuid) -> String {
        format!("{}{uuid}", self.template_prefix())
    }

    #[inline]
    pub fn container_prefix(&self) -> String {
        format!("{}.container.", self.namespace)
    }

    #[inline]
    pub fn container_key(&self, uuid: &Uuid) -> String {
        format!("{}{uuid}", self.container_prefix())
    }

    #[inline]
    pub fn format_version_key(&self) -> String {
        format!("{}.format_version", self.namespace)
    }

    /// Write the version marker on first use, verify it afterwards.
    pub fn initialize(&self, service: &LssService) -> Result<(), StoreError> {
        if service.contains(&self.format_version_key())? {
            return self.verify_version(service);
        }
        service.put(
            &self.format_version_key(),
            &LayoutVersion {
                format_version: KEY_FORMAT_VERSION,
            },
        )?;
        info!(
            "initialized key layout '{}' at version {KEY_FORMAT_VERSION}",
            self.namespace
        );
        Ok(())
    }

    pub fn verify_version(&self, service: &LssService) -> Result<(), StoreError> {
        let found = service
            .get::<LayoutVersion>(&self.format_version_key())?
            .map_or(0, |v| v.format_version);
        if found != KEY_FORMAT_VERSION {
            return Err(StoreError::VersionMismatch {
                expected: KEY_FORMAT_VERSION,
                found,
            });
        }
        Ok(())
    }
}
