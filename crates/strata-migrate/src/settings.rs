//! Settings file handling.
//!
//! Settings are read from a TOML file:
//!
//! ```toml
//! [database]
//! url = "sqlite:strata.db"
//!
//! [cache]
//! backend = "database"
//!
//! [[collections]]
//! key = "page"
//!
//! [[collections.fields]]
//! key = "title"
//! type = "text"
//! required = true
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use strata_core::config::{CollectionConfig, ContentConfig};
use tracing::{debug, info};

use crate::error::{MigrateError, Result};

fn default_database_url() -> String {
    "sqlite:strata.db?mode=rwc".to_string()
}

const fn default_max_connections() -> u32 {
    5
}

/// Top-level settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub cache: CacheSettings,

    /// Configured collections, in order.
    #[serde(default)]
    pub collections: Vec<CollectionConfig>,
}

/// Database connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// Connection URL; the scheme selects the backend.
    #[serde(default = "default_database_url")]
    pub url: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
        }
    }
}

/// Where the second cache tier lives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KvBackend {
    /// Process-local map.
    #[default]
    Memory,
    /// The `strata__kv` table, shared between processes.
    Database,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheSettings {
    #[serde(default)]
    pub backend: KvBackend,
}

impl Settings {
    /// Loads settings from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if
    /// collection keys repeat.
    pub fn load(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "Loading settings");
        let contents = std::fs::read_to_string(path)?;
        let settings = Self::from_toml_str(&contents)?;
        info!(
            path = %path.display(),
            collections = settings.collections.len(),
            "Loaded settings"
        );
        Ok(settings)
    }

    /// Parses settings from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::Settings`] for malformed TOML and
    /// [`MigrateError::Schema`] for duplicate collection keys.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let settings: Self = toml::from_str(contents)?;
        settings.content().validate()?;
        Ok(settings)
    }

    /// Overrides the database URL (from the command line or environment).
    #[must_use]
    pub fn with_database_url(mut self, url: Option<String>) -> Self {
        if let Some(url) = url {
            self.database.url = url;
        }
        self
    }

    /// The content model.
    #[must_use]
    pub fn content(&self) -> ContentConfig {
        ContentConfig::new(self.collections.clone())
    }
}

impl std::str::FromStr for KvBackend {
    type Err = MigrateError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "memory" => Ok(Self::Memory),
            "database" => Ok(Self::Database),
            other => Err(MigrateError::Settings(format!(
                "unknown cache backend '{other}'"
            ))),
        }
    }
}
