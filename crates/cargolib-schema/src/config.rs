//! Configuration collection and validation.
//!
//! Configuration arrives either from a host-implemented [`ConfigProvider`] or
//! from a serialized JSON/TOML document. Both entry points fill the same
//! [`RawConfig`] and share [`RawConfig::validate`], so they cannot diverge.

use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::Level;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed config document: {0}")]
    MalformedDocument(String),
    #[error("missing required option: {0}")]
    MissingRequiredOption(String),
    #[error("invalid value '{value}' for option '{option}', expected {expected}")]
    InvalidEnumValue {
        option: String,
        value: String,
        expected: &'static str,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Toml,
}

impl ConfigFormat {
    /// Pick the document format from a file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()?.to_ascii_lowercase().as_str() {
            "json" => Some(Self::Json),
            "toml" => Some(Self::Toml),
            _ => None,
        }
    }
}

/// Host-side capability exposing the recognized options.
///
/// Every getter returns `None` when the host has no value for the option,
/// in which case the documented default applies.
pub trait ConfigProvider {
    fn use_logger(&self) -> Option<bool> {
        None
    }
    fn log_level(&self) -> Option<String> {
        None
    }
    fn log_use_ansi(&self) -> Option<bool> {
        None
    }
    fn log_file_enabled(&self) -> Option<bool> {
        None
    }
    fn log_file_path(&self) -> Option<String> {
        None
    }
    fn log_file_rotate_directory(&self) -> Option<String> {
        None
    }
    fn oslog_category(&self) -> Option<String> {
        None
    }
    fn oslog_subsystem(&self) -> Option<String> {
        None
    }
    fn environment_mode(&self) -> Option<String> {
        None
    }
    fn catalog_backend(&self) -> Option<String> {
        None
    }
    fn backend_connection_string(&self) -> Option<String> {
        None
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EnvironmentMode {
    #[default]
    Dev,
    Prod,
}

impl FromStr for EnvironmentMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dev" => Ok(Self::Dev),
            "prod" => Ok(Self::Prod),
            _ => Err(ConfigError::InvalidEnumValue {
                option: "environment_mode".to_owned(),
                value: s.to_owned(),
                expected: "dev | prod",
            }),
        }
    }
}

impl fmt::Display for EnvironmentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dev => f.write_str("dev"),
            Self::Prod => f.write_str("prod"),
        }
    }
}

/// Where container catalog metadata lives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CatalogBackend {
    #[default]
    Local,
    Redis,
}

impl CatalogBackend {
    /// Networked backends need a connection string.
    pub fn is_networked(self) -> bool {
        matches!(self, Self::Redis)
    }
}

impl FromStr for CatalogBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "redis" => Ok(Self::Redis),
            _ => Err(ConfigError::InvalidEnumValue {
                option: "catalog_backend".to_owned(),
                value: s.to_owned(),
                expected: "local | redis",
            }),
        }
    }
}

impl fmt::Display for CatalogBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("local"),
            Self::Redis => f.write_str("redis"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggerConfig {
    pub use_logger: bool,
    pub level: Level,
    pub use_ansi: bool,
    pub file_enabled: bool,
    pub file_path: Option<PathBuf>,
    pub rotate_directory: Option<PathBuf>,
    pub oslog_category: Option<String>,
    pub oslog_subsystem: Option<String>,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            use_logger: false,
            level: Level::INFO,
            use_ansi: true,
            file_enabled: false,
            file_path: None,
            rotate_directory: None,
            oslog_category: None,
            oslog_subsystem: None,
        }
    }
}

/// Validated, immutable configuration for one facade instance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CargoConfig {
    pub logger: LoggerConfig,
    pub environment_mode: EnvironmentMode,
    pub catalog_backend: CatalogBackend,
    pub backend_connection_string: Option<String>,
}

/// Unvalidated options as read from a provider or a document.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RawConfig {
    pub use_logger: Option<bool>,
    pub log_level: Option<String>,
    pub log_use_ansi: Option<bool>,
    pub log_file_enabled: Option<bool>,
    pub log_file_path: Option<String>,
    pub log_file_rotate_directory: Option<String>,
    pub oslog_category: Option<String>,
    pub oslog_subsystem: Option<String>,
    pub environment_mode: Option<String>,
    pub catalog_backend: Option<String>,
    #[serde(alias = "redis_connection_string")]
    pub backend_connection_string: Option<String>,
}

impl RawConfig {
    pub fn from_provider(provider: &dyn ConfigProvider) -> Self {
        Self {
            use_logger: provider.use_logger(),
            log_level: provider.log_level(),
            log_use_ansi: provider.log_use_ansi(),
            log_file_enabled: provider.log_file_enabled(),
            log_file_path: provider.log_file_path(),
            log_file_rotate_directory: provider.log_file_rotate_directory(),
            oslog_category: provider.oslog_category(),
            oslog_subsystem: provider.oslog_subsystem(),
            environment_mode: provider.environment_mode(),
            catalog_backend: provider.catalog_backend(),
            backend_connection_string: provider.backend_connection_string(),
        }
    }

    pub fn validate(&self) -> Result<CargoConfig, ConfigError> {
        let level = match non_blank(self.log_level.as_deref()) {
            None => Level::INFO,
            Some(raw) => Level::from_str(raw).map_err(|_| ConfigError::InvalidEnumValue {
                option: "log_level".to_owned(),
                value: raw.to_owned(),
                expected: "error | warn | info | debug | trace | 1-5",
            })?,
        };

        let file_enabled = self.log_file_enabled.unwrap_or(false);
        let file_path = non_blank(self.log_file_path.as_deref()).map(PathBuf::from);
        if file_enabled && file_path.is_none() {
            return Err(ConfigError::MissingRequiredOption(
                "log_file_path".to_owned(),
            ));
        }

        let environment_mode = match non_blank(self.environment_mode.as_deref()) {
            None => EnvironmentMode::default(),
            Some(raw) => raw.parse()?,
        };
        let catalog_backend = match non_blank(self.catalog_backend.as_deref()) {
            None => CatalogBackend::default(),
            Some(raw) => raw.parse()?,
        };

        let backend_connection_string =
            non_blank(self.backend_connection_string.as_deref()).map(str::to_owned);
        if catalog_backend.is_networked() && backend_connection_string.is_none() {
            return Err(ConfigError::MissingRequiredOption(
                "backend_connection_string".to_owned(),
            ));
        }

        Ok(CargoConfig {
            logger: LoggerConfig {
                use_logger: self.use_logger.unwrap_or(false),
                level,
                use_ansi: self.log_use_ansi.unwrap_or(true),
                file_enabled,
                file_path,
                rotate_directory: non_blank(self.log_file_rotate_directory.as_deref())
                    .map(PathBuf::from),
                oslog_category: non_blank(self.oslog_category.as_deref()).map(str::to_owned),
                oslog_subsystem: non_blank(self.oslog_subsystem.as_deref()).map(str::to_owned),
            },
            environment_mode,
            catalog_backend,
            backend_connection_string,
        })
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

/// Collect and validate configuration from a host provider.
pub fn collect_config(provider: &dyn ConfigProvider) -> Result<CargoConfig, ConfigError> {
    RawConfig::from_provider(provider).validate()
}

/// Parse and validate a serialized configuration document.
pub fn parse_config(document: &[u8], format: ConfigFormat) -> Result<CargoConfig, ConfigError> {
    let raw: RawConfig = match format {
        ConfigFormat::Json => serde_json::from_slice(document)
            .map_err(|e| ConfigError::MalformedDocument(e.to_string()))?,
        ConfigFormat::Toml => {
            let text = std::str::from_utf8(document)
                .map_err(|e| ConfigError::MalformedDocument(e.to_string()))?;
            toml::from_str(text).map_err(|e| ConfigError::MalformedDocument(e.to_string()))?
        }
    };
    raw.validate()
}

pub fn parse_config_file(path: impl AsRef<Path>) -> Result<CargoConfig, ConfigError> {
    let path = path.as_ref();
    let format = ConfigFormat::from_path(path).ok_or_else(|| {
        ConfigError::MalformedDocument(format!(
            "unsupported config file extension: {}",
            path.display()
        ))
    })?;
    let content = fs::read(path)?;
    parse_config(&content, format)
}
