//! Schema layer for cargolib.
//!
//! Identifiers (`Fingerprint`), configuration collection and validation
//! (`CargoConfig`), storage-template documents (`StorageTemplate`) and
//! container records with their selection predicates (`ContainerFilter`).

pub mod config;
pub mod container;
pub mod template;
pub mod types;

pub use config::{
    collect_config, parse_config, parse_config_file, CargoConfig, CatalogBackend, ConfigError,
    ConfigFormat, ConfigProvider, EnvironmentMode, LoggerConfig, RawConfig,
};
pub use container::{is_valid_container_path, ContainerFilter, ContainerRecord, MountState};
pub use template::{
    AccessMode, AccessRule, ManifestPattern, Storage, StorageTemplate, TemplateBody,
    TemplateContext, TemplateError,
};
pub use types::{Fingerprint, ShortFingerprint, SHORT_FINGERPRINT_LEN};
