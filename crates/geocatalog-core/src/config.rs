//! Catalog load configuration.
//!
//! The configuration is a YAML document naming the database server and, for
//! each catalog collection, the output table and the storage locations its
//! items are discovered in:
//!
//! ```yaml
//! server:
//!   host: localhost
//!   database: gis
//!   user: loader
//! catalog:
//!   - collection:
//!       out: { schema: imagery, table: scenes }
//!       items:
//!         - bucket: gs://imagery-bucket
//!           prefix: spot/2019
//!           pattern: '\.tif$'
//!           key: /secrets/gcs.json
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::database::ConnectionDescriptor;
use crate::error::ConfigError;

/// Pattern used when an item source does not set one.
pub const DEFAULT_PATTERN: &str = r"(?i)\.tiff?$";

/// Root configuration document.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CatalogConfig {
    /// Database server
    pub server: ServerConfig,
    /// Collections to load, in order
    pub catalog: Vec<CatalogEntry>,
}

/// Database server settings.
#[derive(Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Host name or address
    pub host: String,
    /// Database name
    pub database: String,
    /// Port; 5432 when absent
    pub port: Option<u16>,
    /// User name
    pub user: Option<String>,
    /// Password
    pub password: Option<String>,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(&self.descriptor(), f)
    }
}

impl ServerConfig {
    /// Builds the connection descriptor, applying the default port.
    #[must_use]
    pub fn descriptor(&self) -> ConnectionDescriptor {
        let mut descriptor = ConnectionDescriptor::new(&self.host, &self.database)
            .with_port(self.port.unwrap_or(ConnectionDescriptor::DEFAULT_PORT));
        if let Some(user) = &self.user {
            descriptor = descriptor.with_user(user);
        }
        if let Some(password) = &self.password {
            descriptor = descriptor.with_password(password);
        }
        descriptor
    }
}

/// One entry of the `catalog` list.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CatalogEntry {
    /// The collection to load
    pub collection: CollectionConfig,
}

/// A collection: where its items live and which table receives them.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CollectionConfig {
    /// Optional display name; defaults to `schema.table`
    #[serde(default)]
    pub name: Option<String>,
    /// Destination table
    pub out: OutputConfig,
    /// Item sources, loaded in order
    pub items: Vec<ItemSource>,
}

impl CollectionConfig {
    /// Name used in logs and reports.
    #[must_use]
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("{}.{}", self.out.schema, self.out.table))
    }
}

/// Destination schema and table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    /// Schema name
    pub schema: String,
    /// Table name
    pub table: String,
}

/// A storage location holding item images.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ItemSource {
    /// Bucket URI, e.g. `gs://imagery-bucket`
    pub bucket: String,
    /// Object prefix under the bucket
    #[serde(default)]
    pub prefix: String,
    /// Regular expression matched against object file names
    #[serde(default = "default_pattern")]
    pub pattern: String,
    /// Credential reference passed to the storage client
    #[serde(default)]
    pub key: Option<String>,
}

fn default_pattern() -> String {
    DEFAULT_PATTERN.to_string()
}

impl CatalogConfig {
    /// Parses a configuration document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed YAML or a document that
    /// does not match the expected shape, and [`ConfigError::InvalidOption`]
    /// for a collection without item sources.
    pub fn from_yaml(yaml: &str, origin: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let origin = origin.into();
        let config: Self = serde_yaml::from_str(yaml).map_err(|source| ConfigError::Parse {
            path: origin.clone(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] if the file cannot be read, otherwise as
    /// [`CatalogConfig::from_yaml`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&yaml, path)
    }

    /// Collections in configuration order.
    pub fn collections(&self) -> impl Iterator<Item = &CollectionConfig> {
        self.catalog.iter().map(|entry| &entry.collection)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for collection in self.collections() {
            if collection.items.is_empty() {
                return Err(ConfigError::InvalidOption {
                    option: format!("{}.items", collection.display_name()),
                    message: "at least one item source is required".to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Directory containing a configuration file, used as the local sidecar
/// directory during resolution.
#[must_use]
pub fn config_dir(path: &Path) -> PathBuf {
    path.parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
}
