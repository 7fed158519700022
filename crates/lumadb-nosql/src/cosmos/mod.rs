//! Cosmos-style SQL document backend
//!
//! Reads are parameterized SQL queries over the `c` alias. Identifier-keyed
//! writes check existence with a read first when the entity uses
//! [`WritePolicy::ExistenceChecked`]; the read and the write are two
//! separate round trips, so a record deleted in between surfaces as
//! `NotFound` from the write.

pub mod query;

use std::sync::Arc;

use async_trait::async_trait;
use lumadb_common::WritePolicy;
use serde_json::Value as JsonValue;
use tracing::{debug, instrument, warn};

use crate::adapter::{normalize_items, FindManyRequest, RawPage, StoreAdapter};
use crate::core::{Backend, Document, NoSqlError, Result, StoreError};
use crate::filter::SelectSpec;

pub use query::{
    compile_find_by_id, compile_find_many, construct_field_selection, CompiledQuery, SqlParameter,
    SqlQuerySpec,
};

/// Properties the service adds to every stored document
const SYSTEM_PROPERTIES: &[&str] = &["_rid", "_self", "_etag", "_attachments", "_ts"];

/// Database, container and partition-key path of one entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerRef {
    pub database: String,
    pub container: String,
    pub partition_key: String,
}

impl ContainerRef {
    pub fn new(database: impl Into<String>, container: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            container: container.into(),
            partition_key: "id".to_string(),
        }
    }

    #[must_use]
    pub fn with_partition_key(mut self, partition_key: impl Into<String>) -> Self {
        self.partition_key = partition_key.into();
        self
    }
}

/// Paging options of a query
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedOptions {
    pub max_item_count: Option<u32>,
    pub continuation: Option<String>,
}

/// One page of a query feed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedPage {
    /// Returned documents; any shape other than a list is rejected
    pub resources: Option<JsonValue>,
    pub continuation: Option<String>,
}

/// Handle to a Cosmos-compatible store
#[async_trait]
pub trait CosmosClient: Send + Sync {
    async fn query_items(
        &self,
        container: &ContainerRef,
        query: &SqlQuerySpec,
        options: &FeedOptions,
    ) -> std::result::Result<FeedPage, StoreError>;

    /// Insert; `Conflict` when the id already exists
    async fn create_item(
        &self,
        container: &ContainerRef,
        document: &Document,
    ) -> std::result::Result<Document, StoreError>;

    async fn upsert_item(
        &self,
        container: &ContainerRef,
        document: &Document,
    ) -> std::result::Result<Document, StoreError>;

    /// Replace; `NotFound` when the id is absent
    async fn replace_item(
        &self,
        container: &ContainerRef,
        id: &str,
        partition_key: &JsonValue,
        document: &Document,
    ) -> std::result::Result<Document, StoreError>;

    /// Delete; `NotFound` when the id is absent
    async fn delete_item(
        &self,
        container: &ContainerRef,
        id: &str,
        partition_key: &JsonValue,
    ) -> std::result::Result<(), StoreError>;
}

fn store_failure(operation: &'static str, error: StoreError) -> NoSqlError {
    warn!(operation, error = %error, "Cosmos call failed");
    NoSqlError::BackendFailure(error)
}

fn strip_system_properties(mut document: Document) -> Document {
    document.retain(|key, _| !SYSTEM_PROPERTIES.contains(&key.as_str()));
    document
}

/// SQL document backend adapter
pub struct CosmosAdapter {
    client: Arc<dyn CosmosClient>,
    container: ContainerRef,
}

impl CosmosAdapter {
    pub fn new(client: Arc<dyn CosmosClient>, container: ContainerRef) -> Self {
        Self { client, container }
    }

    #[must_use]
    pub fn container(&self) -> &ContainerRef {
        &self.container
    }

    fn partition_value(&self, document: &Document) -> Result<JsonValue> {
        document
            .get(&self.container.partition_key)
            .cloned()
            .ok_or_else(|| {
                NoSqlError::InvalidArgument(format!(
                    "record has no partition key {}",
                    self.container.partition_key
                ))
            })
    }

    async fn query(&self, compiled: &CompiledQuery, options: &FeedOptions) -> Result<FeedPage> {
        debug!(query = %compiled.explain, "issuing query");
        self.client
            .query_items(&self.container, &compiled.spec, options)
            .await
            .map_err(|e| store_failure("query_items", e))
    }

    async fn replace(&self, id: &str, existing: &Document, changes: Document) -> Result<Document> {
        let partition_key = self.partition_value(existing)?;
        if let Some(requested) = changes.get(&self.container.partition_key) {
            if *requested != partition_key && self.container.partition_key != "id" {
                return Err(NoSqlError::InvalidArgument(format!(
                    "partition key {} cannot be changed",
                    self.container.partition_key
                )));
            }
        }

        let mut merged = existing.clone();
        merged.extend(changes);
        merged.insert("id".to_string(), JsonValue::String(id.to_string()));

        self.client
            .replace_item(&self.container, id, &partition_key, &merged)
            .await
            .map(strip_system_properties)
            .map_err(|e| match e {
                StoreError::NotFound(_) => NoSqlError::NotFound(id.to_string()),
                other => store_failure("replace_item", other),
            })
    }
}

#[async_trait]
impl StoreAdapter for CosmosAdapter {
    fn backend(&self) -> Backend {
        Backend::Cosmos
    }

    fn id_field(&self) -> &str {
        "id"
    }

    #[instrument(skip(self, request), fields(container = %self.container.container))]
    async fn find_many(&self, request: &FindManyRequest) -> Result<RawPage> {
        let compiled = compile_find_many(&request.filter, &request.select, &request.order_by)?;
        let options = FeedOptions {
            max_item_count: u32::try_from(request.take).ok(),
            continuation: request.continuation.clone(),
        };

        let page = self.query(&compiled, &options).await?;
        let items = normalize_items(page.resources)?
            .into_iter()
            .map(strip_system_properties)
            .collect();

        Ok(RawPage {
            items,
            continuation: page.continuation,
        })
    }

    #[instrument(skip(self, select), fields(container = %self.container.container))]
    async fn find_by_id(&self, id: &str, select: &SelectSpec) -> Result<Option<Document>> {
        let compiled = compile_find_by_id(id, select)?;
        let options = FeedOptions {
            max_item_count: Some(1),
            continuation: None,
        };

        let page = self.query(&compiled, &options).await?;
        Ok(normalize_items(page.resources)?
            .into_iter()
            .next()
            .map(strip_system_properties))
    }

    #[instrument(skip(self, document), fields(container = %self.container.container))]
    async fn insert(&self, document: Document, policy: WritePolicy) -> Result<Document> {
        let id = match document.get("id") {
            Some(JsonValue::String(id)) => id.clone(),
            _ => return Err(NoSqlError::InvalidArgument("record has no string id".into())),
        };
        self.partition_value(&document)?;

        let stored = match policy {
            WritePolicy::ExistenceChecked => self
                .client
                .create_item(&self.container, &document)
                .await
                .map_err(|e| match e {
                    StoreError::Conflict(_) => NoSqlError::AlreadyExists(id),
                    other => store_failure("create_item", other),
                })?,
            WritePolicy::Unchecked => self
                .client
                .upsert_item(&self.container, &document)
                .await
                .map_err(|e| store_failure("upsert_item", e))?,
        };

        Ok(strip_system_properties(stored))
    }

    #[instrument(skip(self, changes), fields(container = %self.container.container))]
    async fn update(&self, id: &str, changes: Document, policy: WritePolicy) -> Result<Document> {
        let existing = self.find_by_id(id, &SelectSpec::all()).await?;

        match (existing, policy) {
            (Some(existing), _) => self.replace(id, &existing, changes).await,
            (None, WritePolicy::ExistenceChecked) => Err(NoSqlError::NotFound(id.to_string())),
            (None, WritePolicy::Unchecked) => {
                let mut document = Document::new();
                document.insert("id".to_string(), JsonValue::String(id.to_string()));
                document.extend(changes);
                document.insert("id".to_string(), JsonValue::String(id.to_string()));
                self.partition_value(&document)?;

                self.client
                    .upsert_item(&self.container, &document)
                    .await
                    .map(strip_system_properties)
                    .map_err(|e| store_failure("upsert_item", e))
            }
        }
    }

    #[instrument(skip(self), fields(container = %self.container.container))]
    async fn delete(&self, id: &str, policy: WritePolicy) -> Result<()> {
        let Some(existing) = self.find_by_id(id, &SelectSpec::all()).await? else {
            return match policy {
                WritePolicy::ExistenceChecked => Err(NoSqlError::NotFound(id.to_string())),
                WritePolicy::Unchecked => Ok(()),
            };
        };
        let partition_key = self.partition_value(&existing)?;

        match self
            .client
            .delete_item(&self.container, id, &partition_key)
            .await
        {
            Ok(()) => Ok(()),
            Err(StoreError::NotFound(_)) if policy == WritePolicy::Unchecked => Ok(()),
            Err(StoreError::NotFound(_)) => Err(NoSqlError::NotFound(id.to_string())),
            Err(other) => Err(store_failure("delete_item", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_system_properties_are_stripped() {
        let document = json!({"id": "a", "name": "x", "_rid": "r", "_etag": "e", "_ts": 1});
        let stripped = strip_system_properties(document.as_object().unwrap().clone());
        assert_eq!(JsonValue::Object(stripped), json!({"id": "a", "name": "x"}));
    }

    #[test]
    fn test_container_defaults() {
        let container = ContainerRef::new("app", "users");
        assert_eq!(container.partition_key, "id");
        let container = container.with_partition_key("tenantId");
        assert_eq!(container.partition_key, "tenantId");
    }
}
