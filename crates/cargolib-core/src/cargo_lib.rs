//! The `CargoLib` facade: construction, start-up and access to [`UserApi`].

use crate::containers::ContainerManager;
use crate::identity::IdentityManager;
use crate::lifecycle::{validate_transition, FacadeState};
use crate::logging::init_subscriber;
use crate::templates::TemplateManager;
use crate::user_api::{CoreState, UserApi};
use crate::FacadeError;
use cargolib_schema::{
    collect_config, parse_config, CargoConfig, ConfigError, ConfigFormat, ConfigProvider,
};
use cargolib_store::{KeyLayout, LocalSecureStorage, LssService, DEFAULT_NAMESPACE};
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Collects the storage backend and configuration for a [`CargoLib`].
///
/// This is the `Uninitialized` state; [`build`](Self::build) moves to
/// `Constructed`.
pub struct CargoLibBuilder {
    lss: Option<Arc<dyn LocalSecureStorage>>,
    config: Option<Result<CargoConfig, ConfigError>>,
    namespace: String,
}

impl Default for CargoLibBuilder {
    fn default() -> Self {
        Self {
            lss: None,
            config: None,
            namespace: DEFAULT_NAMESPACE.to_owned(),
        }
    }
}

impl CargoLibBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn lss(mut self, lss: Arc<dyn LocalSecureStorage>) -> Self {
        self.lss = Some(lss);
        self
    }

    #[must_use]
    pub fn config(mut self, config: CargoConfig) -> Self {
        self.config = Some(Ok(config));
        self
    }

    /// Collect configuration from a host provider. Errors surface at
    /// [`build`](Self::build).
    #[must_use]
    pub fn config_from_provider(mut self, provider: &dyn ConfigProvider) -> Self {
        self.config = Some(collect_config(provider));
        self
    }

    #[must_use]
    pub fn config_document(mut self, document: &[u8], format: ConfigFormat) -> Self {
        self.config = Some(parse_config(document, format));
        self
    }

    /// Key namespace inside the LSS. Defaults to `cargolib`.
    #[must_use]
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn build(self) -> Result<CargoLib, FacadeError> {
        validate_transition(FacadeState::Uninitialized, FacadeState::Constructed)?;

        let config = self.config.unwrap_or_else(|| {
            Err(ConfigError::MissingRequiredOption(
                "configuration".to_owned(),
            ))
        })?;
        let lss = self.lss.ok_or(FacadeError::MissingStorageBackend)?;

        let store = LssService::new(lss);
        let layout = KeyLayout::new(self.namespace);
        layout.initialize(&store)?;

        let core = CoreState {
            identities: IdentityManager::new(store.clone(), layout.clone()),
            templates: TemplateManager::new(store.clone(), layout.clone()),
            containers: ContainerManager::new(store, layout),
        };
        debug!(
            "facade constructed: mode={} catalog={}",
            config.environment_mode, config.catalog_backend
        );
        Ok(CargoLib {
            config,
            state: FacadeState::Constructed,
            core: Arc::new(Mutex::new(core)),
        })
    }
}

/// Entry point of the SDK, one per host process.
pub struct CargoLib {
    config: CargoConfig,
    state: FacadeState,
    core: Arc<Mutex<CoreState>>,
}

impl fmt::Debug for CargoLib {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CargoLib")
            .field("state", &self.state)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl CargoLib {
    pub fn builder() -> CargoLibBuilder {
        CargoLibBuilder::new()
    }

    pub fn state(&self) -> FacadeState {
        self.state
    }

    pub fn config(&self) -> &CargoConfig {
        &self.config
    }

    /// Install logging and move to `Ready`.
    pub fn start(&mut self) -> Result<(), FacadeError> {
        validate_transition(self.state, FacadeState::Ready)?;
        init_subscriber(&self.config.logger)?;
        self.state = FacadeState::Ready;
        info!("cargolib ready ({} mode)", self.config.environment_mode);
        Ok(())
    }

    pub fn user_api(&self) -> Result<UserApi, FacadeError> {
        if self.state != FacadeState::Ready {
            return Err(FacadeError::NotInitialized);
        }
        Ok(UserApi::new(Arc::clone(&self.core)))
    }
}

/// Build and start a facade in one step.
pub fn create_cargo_lib(
    lss: Arc<dyn LocalSecureStorage>,
    config: CargoConfig,
) -> Result<CargoLib, FacadeError> {
    let mut lib = CargoLib::builder().lss(lss).config(config).build()?;
    lib.start()?;
    Ok(lib)
}
