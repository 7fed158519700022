//! Store adapter contract.
//!
//! Both backends implement [`StoreAdapter`] with the same semantics: the
//! entity facade never branches on the backend. Existence checks follow the
//! entity's [`WritePolicy`].

use std::sync::Arc;

use async_trait::async_trait;
use lumadb_common::{StoreSettings, WritePolicy};
use serde_json::Value as JsonValue;

use crate::core::{Backend, Document, NoSqlError, Result};
use crate::cosmos::{CosmosAdapter, CosmosClient, ContainerRef};
use crate::dynamodb::{DynamoAdapter, DynamoClient, TableRef};
use crate::filter::{OrderSpec, SelectSpec, WhereClause};

/// One validated `findMany` call as seen by an adapter
#[derive(Debug, Clone, Default)]
pub struct FindManyRequest {
    pub filter: WhereClause,
    pub select: SelectSpec,
    pub order_by: OrderSpec,
    /// Page size, already range checked
    pub take: usize,
    /// Decoded native continuation token
    pub continuation: Option<String>,
}

/// One page of records with the store's native continuation token
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawPage {
    pub items: Vec<Document>,
    pub continuation: Option<String>,
}

/// Uniform data-access contract over one entity's table or container
#[async_trait]
pub trait StoreAdapter: Send + Sync {
    /// Store family
    fn backend(&self) -> Backend;

    /// Attribute holding the record identifier
    fn id_field(&self) -> &str;

    /// Filtered, projected, paginated read
    async fn find_many(&self, request: &FindManyRequest) -> Result<RawPage>;

    /// Point read; `None` when no record has this id
    async fn find_by_id(&self, id: &str, select: &SelectSpec) -> Result<Option<Document>>;

    /// Persist a new record
    async fn insert(&self, document: Document, policy: WritePolicy) -> Result<Document>;

    /// Apply a partial update, returning the stored record
    async fn update(&self, id: &str, changes: Document, policy: WritePolicy) -> Result<Document>;

    /// Remove a record
    async fn delete(&self, id: &str, policy: WritePolicy) -> Result<()>;
}

/// Normalize a store result set.
///
/// A missing result set is an empty page; anything other than an array of
/// objects is a contract violation.
pub fn normalize_items(resources: Option<JsonValue>) -> Result<Vec<Document>> {
    match resources {
        None => Ok(Vec::new()),
        Some(JsonValue::Array(items)) => items
            .into_iter()
            .enumerate()
            .map(|(i, item)| match item {
                JsonValue::Object(document) => Ok(document),
                other => Err(NoSqlError::BackendContractViolation(format!(
                    "result item {} is not an object: {}",
                    i, other
                ))),
            })
            .collect(),
        Some(other) => Err(NoSqlError::BackendContractViolation(format!(
            "result set is not a list: {}",
            other
        ))),
    }
}

/// Client handles supplied by the application
#[derive(Clone, Default)]
pub struct StoreClients {
    pub dynamodb: Option<Arc<dyn DynamoClient>>,
    pub cosmos: Option<Arc<dyn CosmosClient>>,
}

impl StoreClients {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_dynamodb(mut self, client: Arc<dyn DynamoClient>) -> Self {
        self.dynamodb = Some(client);
        self
    }

    #[must_use]
    pub fn with_cosmos(mut self, client: Arc<dyn CosmosClient>) -> Self {
        self.cosmos = Some(client);
        self
    }

    /// Build the adapter described by `settings`
    pub fn build_adapter(&self, settings: &StoreSettings) -> Result<Arc<dyn StoreAdapter>> {
        match settings {
            StoreSettings::Dynamodb {
                table,
                partition_key,
                sort_key,
            } => {
                let client = self.dynamodb.clone().ok_or_else(|| {
                    NoSqlError::InvalidArgument("no DynamoDB client configured".into())
                })?;
                let mut target = TableRef::new(table, partition_key);
                if let Some(sort_key) = sort_key {
                    target = target.with_sort_key(sort_key);
                }
                Ok(Arc::new(DynamoAdapter::new(client, target)))
            }
            StoreSettings::Cosmos {
                database,
                container,
                partition_key,
            } => {
                let client = self.cosmos.clone().ok_or_else(|| {
                    NoSqlError::InvalidArgument("no Cosmos client configured".into())
                })?;
                let target = ContainerRef::new(database, container).with_partition_key(partition_key);
                Ok(Arc::new(CosmosAdapter::new(client, target)))
            }
        }
    }
}
