//! Configuration management for the LumaDB NoSQL query bridge

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Query defaults shared by every entity
    #[serde(default)]
    pub query: QueryConfig,

    /// Entity definitions
    #[serde(default)]
    pub entities: Vec<EntitySettings>,
}

impl Config {
    /// Load configuration from a TOML/JSON file
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = tokio::fs::read_to_string(path.as_ref())
            .await
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = if path.as_ref().extension().map_or(false, |ext| ext == "toml") {
            toml::from_str(&content)
                .map_err(|e| Error::Config(format!("Failed to parse TOML config: {}", e)))?
        } else {
            serde_json::from_str(&content)
                .map_err(|e| Error::Config(format!("Failed to parse JSON config: {}", e)))?
        };

        config.validate()?;
        Ok(config)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Look up an entity by name
    #[must_use]
    pub fn entity(&self, name: &str) -> Option<&EntitySettings> {
        self.entities.iter().find(|e| e.name == name)
    }

    /// Check cross-field constraints serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.query.default_page_size == 0 {
            return Err(Error::Config("query.default_page_size must be positive".into()));
        }
        if self.query.default_page_size > self.query.max_page_size {
            return Err(Error::Config(format!(
                "query.default_page_size ({}) exceeds query.max_page_size ({})",
                self.query.default_page_size, self.query.max_page_size
            )));
        }

        let mut seen = HashSet::new();
        for entity in &self.entities {
            if entity.name.trim().is_empty() {
                return Err(Error::Config("entity name must not be empty".into()));
            }
            if !seen.insert(entity.name.as_str()) {
                return Err(Error::Config(format!("duplicate entity: {}", entity.name)));
            }
            entity.store.validate(&entity.name)?;
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Page size used by `find_many` when `take` is absent
    #[serde(default = "default_page_size")]
    pub default_page_size: u32,
    /// Largest accepted `take`
    #[serde(default = "default_max_page_size")]
    pub max_page_size: u32,
    /// Timeout applied to operations that do not carry their own
    #[serde(default)]
    pub operation_timeout_ms: Option<u64>,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
            operation_timeout_ms: None,
        }
    }
}

fn default_page_size() -> u32 {
    100
}

fn default_max_page_size() -> u32 {
    1000
}

/// One entity bound to a table or container
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntitySettings {
    /// Logical entity name
    pub name: String,
    /// Backing store
    pub store: StoreSettings,
    #[serde(default)]
    pub auto_fields: AutoFields,
    #[serde(default)]
    pub write_policy: WritePolicy,
}

/// Backend-specific location of an entity's records
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StoreSettings {
    /// Partition/sort-key table
    Dynamodb {
        table: String,
        partition_key: String,
        #[serde(default)]
        sort_key: Option<String>,
    },
    /// SQL-queryable document container
    Cosmos {
        database: String,
        container: String,
        #[serde(default = "default_cosmos_partition_key")]
        partition_key: String,
    },
}

fn default_cosmos_partition_key() -> String {
    "id".to_string()
}

impl StoreSettings {
    fn validate(&self, entity: &str) -> Result<()> {
        let required: Vec<(&str, &str)> = match self {
            StoreSettings::Dynamodb {
                table,
                partition_key,
                sort_key,
            } => {
                let mut fields = vec![("table", table.as_str()), ("partition_key", partition_key.as_str())];
                if let Some(sk) = sort_key {
                    fields.push(("sort_key", sk.as_str()));
                }
                fields
            }
            StoreSettings::Cosmos {
                database,
                container,
                partition_key,
            } => vec![
                ("database", database.as_str()),
                ("container", container.as_str()),
                ("partition_key", partition_key.as_str()),
            ],
        };

        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(Error::Config(format!(
                    "entity {}: {} must not be empty",
                    entity, field
                )));
            }
        }
        Ok(())
    }
}

/// Auto-generated fields on create/update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoFields {
    /// Generate an id when the payload has none
    #[serde(default = "enabled")]
    pub id: bool,
    /// Stamp `createdAt`/`updatedAt`
    #[serde(default = "enabled")]
    pub timestamp: bool,
}

impl Default for AutoFields {
    fn default() -> Self {
        Self {
            id: true,
            timestamp: true,
        }
    }
}

fn enabled() -> bool {
    true
}

/// How identifier-keyed writes treat records that may not exist
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WritePolicy {
    /// update/delete require the record, create refuses to overwrite
    #[default]
    ExistenceChecked,
    /// Writes go straight to the store (update may create, delete of a
    /// missing record succeeds, create overwrites)
    Unchecked,
}
