//! Core of the cargolib SDK.
//!
//! Ties the schema, crypto and store crates together behind the `CargoLib`
//! facade: forest/device identity management from BIP-39 mnemonics, storage
//! template persistence and rendering, container lookup by path predicates,
//! and the `Uninitialized -> Constructed -> Ready` lifecycle that gates the
//! host-facing [`UserApi`].

pub mod cargo_lib;
pub mod containers;
pub mod identity;
pub mod lifecycle;
pub mod logging;
pub mod templates;
pub mod user_api;

pub use cargo_lib::{create_cargo_lib, CargoLib, CargoLibBuilder};
pub use containers::{ContainerError, ContainerManager};
pub use identity::{
    validate_identity_name, Identity, IdentityError, IdentityKind, IdentityManager,
    IdentityOptions, IdentityPair,
};
pub use lifecycle::{validate_transition, FacadeState};
pub use logging::{init_subscriber, LoggingError, LOG_ENV_VAR};
pub use templates::{TemplateManager, TemplateStoreError};
pub use user_api::UserApi;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FacadeError {
    #[error("invalid configuration: {0}")]
    ConfigurationInvalid(#[from] cargolib_schema::ConfigError),
    #[error("no local secure storage backend was provided")]
    MissingStorageBackend,
    #[error("cargolib is not started; call start() first")]
    NotInitialized,
    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition {
        from: FacadeState,
        to: FacadeState,
    },
    #[error("storage error: {0}")]
    Storage(#[from] cargolib_store::StoreError),
    #[error("logging setup failed: {0}")]
    Logging(#[from] LoggingError),
}
