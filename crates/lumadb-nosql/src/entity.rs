//! Entity access facade
//!
//! [`EntityRepository`] is the public CRUD surface over one entity. It
//! validates requests, injects auto fields, delegates to a [`StoreAdapter`]
//! and turns raw store pages into typed results with opaque cursors.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use lumadb_nosql::dynamodb::{DynamoAdapter, TableRef};
//! use lumadb_nosql::entity::{EntityConfig, EntityRepository, FindManyArgs};
//! use lumadb_nosql::filter::{FieldFilter, WhereClause};
//! use lumadb_nosql::memory::MemoryDynamoClient;
//!
//! # async fn run() -> lumadb_nosql::core::Result<()> {
//! let client = Arc::new(MemoryDynamoClient::new().with_table("users", "id", None));
//! let adapter = Arc::new(DynamoAdapter::new(client, TableRef::new("users", "id")));
//! let users: EntityRepository = EntityRepository::new(EntityConfig::new("users"), adapter);
//!
//! let page = users
//!     .find_many(
//!         FindManyArgs::new()
//!             .filter(WhereClause::new().field("age", FieldFilter::new().gte(21)))
//!             .take(10),
//!     )
//!     .await?;
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use lumadb_common::{metrics, AutoFields, EntitySettings, QueryConfig, WritePolicy};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::adapter::{FindManyRequest, StoreAdapter, StoreClients};
use crate::core::{format_timestamp, validate_identifier, Document, NoSqlError, Result};
use crate::cursor;
use crate::filter::{OrderSpec, SelectSpec, WhereClause};

/// Field stamped with the creation instant
pub const CREATED_AT: &str = "createdAt";
/// Field stamped with the last write instant
pub const UPDATED_AT: &str = "updatedAt";

// ===== Injected capabilities =====

/// Source of the current instant
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Source of record identifiers
pub trait IdGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// Random v4 UUIDs
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn generate(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

// ===== Configuration =====

/// Immutable per-entity settings
#[derive(Debug, Clone, PartialEq)]
pub struct EntityConfig {
    pub name: String,
    pub auto_fields: AutoFields,
    pub write_policy: WritePolicy,
    pub default_page_size: usize,
    pub max_page_size: usize,
    /// Applied when an operation carries no timeout of its own
    pub default_timeout: Option<Duration>,
}

impl EntityConfig {
    /// Defaults: auto id and timestamps, existence-checked writes, pages of 100
    pub fn new(name: impl Into<String>) -> Self {
        Self::from_query_config(
            name,
            AutoFields::default(),
            WritePolicy::default(),
            &QueryConfig::default(),
        )
    }

    pub fn from_settings(settings: &EntitySettings, query: &QueryConfig) -> Self {
        Self::from_query_config(
            settings.name.clone(),
            settings.auto_fields,
            settings.write_policy,
            query,
        )
    }

    fn from_query_config(
        name: impl Into<String>,
        auto_fields: AutoFields,
        write_policy: WritePolicy,
        query: &QueryConfig,
    ) -> Self {
        Self {
            name: name.into(),
            auto_fields,
            write_policy,
            default_page_size: query.default_page_size as usize,
            max_page_size: query.max_page_size as usize,
            default_timeout: query.operation_timeout_ms.map(Duration::from_millis),
        }
    }

    #[must_use]
    pub fn with_auto_fields(mut self, id: bool, timestamp: bool) -> Self {
        self.auto_fields = AutoFields { id, timestamp };
        self
    }

    #[must_use]
    pub fn with_write_policy(mut self, policy: WritePolicy) -> Self {
        self.write_policy = policy;
        self
    }

    #[must_use]
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = Some(timeout);
        self
    }
}

// ===== Requests and results =====

/// Arguments of [`EntityRepository::find_many`]
#[derive(Debug, Clone, Default)]
pub struct FindManyArgs {
    pub filter: WhereClause,
    /// Page size; the entity default when absent
    pub take: Option<i64>,
    /// Cursor from a previous page
    pub cursor: Option<String>,
    pub select: SelectSpec,
    pub order_by: OrderSpec,
}

impl FindManyArgs {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn filter(mut self, filter: WhereClause) -> Self {
        self.filter = filter;
        self
    }

    #[must_use]
    pub fn take(mut self, take: i64) -> Self {
        self.take = Some(take);
        self
    }

    #[must_use]
    pub fn cursor(mut self, cursor: impl Into<String>) -> Self {
        self.cursor = Some(cursor.into());
        self
    }

    #[must_use]
    pub fn select(mut self, select: SelectSpec) -> Self {
        self.select = select;
        self
    }

    #[must_use]
    pub fn order_by(mut self, order_by: OrderSpec) -> Self {
        self.order_by = order_by;
        self
    }

    /// Parse `{where, take, nextCursor, select, orderBy}`
    pub fn from_json(value: &JsonValue) -> Result<Self> {
        let JsonValue::Object(fields) = value else {
            return Err(NoSqlError::InvalidArgument(
                "findMany arguments must be an object".into(),
            ));
        };

        let mut args = Self::new();
        for (key, value) in fields {
            match key.as_str() {
                "where" => args.filter = WhereClause::from_json(value)?,
                "select" => args.select = SelectSpec::from_json(value)?,
                "orderBy" => args.order_by = OrderSpec::from_json(value)?,
                "take" => {
                    args.take = match value {
                        JsonValue::Null => None,
                        other => Some(other.as_i64().ok_or_else(|| {
                            NoSqlError::InvalidArgument(format!(
                                "take must be an integer, got {}",
                                other
                            ))
                        })?),
                    }
                }
                "nextCursor" => {
                    args.cursor = match value {
                        JsonValue::Null => None,
                        JsonValue::String(cursor) => Some(cursor.clone()),
                        other => {
                            return Err(NoSqlError::InvalidCursor(format!(
                                "cursor must be a string, got {}",
                                other
                            )))
                        }
                    }
                }
                other => {
                    return Err(NoSqlError::InvalidArgument(format!(
                        "unknown findMany argument {}",
                        other
                    )))
                }
            }
        }
        Ok(args)
    }
}

/// One page of typed records
#[derive(Debug, Clone, PartialEq)]
pub struct Page<E> {
    pub items: Vec<E>,
    /// Present when the store may hold more matching records
    pub next_cursor: Option<String>,
}

/// Per-call timeout and cancellation
#[derive(Debug, Clone, Default)]
pub struct OperationOptions {
    pub timeout: Option<Duration>,
    pub cancellation: Option<CancellationToken>,
}

impl OperationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }
}

// ===== Repository =====

/// CRUD access to one entity, typed as `E`
pub struct EntityRepository<E = Document> {
    config: EntityConfig,
    adapter: Arc<dyn StoreAdapter>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    _entity: PhantomData<fn() -> E>,
}

impl<E> Clone for EntityRepository<E> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            adapter: Arc::clone(&self.adapter),
            clock: Arc::clone(&self.clock),
            ids: Arc::clone(&self.ids),
            _entity: PhantomData,
        }
    }
}

fn payload_object<P: Serialize + ?Sized>(payload: &P, operation: &str) -> Result<Document> {
    let value = serde_json::to_value(payload)
        .map_err(|e| NoSqlError::InvalidArgument(format!("{} payload: {}", operation, e)))?;
    match value {
        JsonValue::Object(document) if !document.is_empty() => Ok(document),
        JsonValue::Object(_) => Err(NoSqlError::InvalidArgument(format!(
            "{} payload must not be empty",
            operation
        ))),
        other => Err(NoSqlError::InvalidArgument(format!(
            "{} payload must be an object, got {}",
            operation, other
        ))),
    }
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

impl<E: DeserializeOwned> EntityRepository<E> {
    pub fn new(config: EntityConfig, adapter: Arc<dyn StoreAdapter>) -> Self {
        Self {
            config,
            adapter,
            clock: Arc::new(SystemClock),
            ids: Arc::new(UuidGenerator),
            _entity: PhantomData,
        }
    }

    /// Build from configuration, picking the client the settings name
    pub fn from_settings(
        settings: &EntitySettings,
        query: &QueryConfig,
        clients: &StoreClients,
    ) -> Result<Self> {
        let adapter = clients.build_adapter(&settings.store)?;
        Ok(Self::new(EntityConfig::from_settings(settings, query), adapter))
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    #[must_use]
    pub fn config(&self) -> &EntityConfig {
        &self.config
    }

    #[must_use]
    pub fn adapter(&self) -> &Arc<dyn StoreAdapter> {
        &self.adapter
    }

    pub async fn find_many(&self, args: FindManyArgs) -> Result<Page<E>> {
        self.find_many_with(args, &OperationOptions::default()).await
    }

    pub async fn find_one(&self, id: &str, select: &SelectSpec) -> Result<E> {
        self.find_one_with(id, select, &OperationOptions::default())
            .await
    }

    pub async fn create<P: Serialize + ?Sized>(&self, data: &P) -> Result<E> {
        self.create_with(data, &OperationOptions::default()).await
    }

    pub async fn update<P: Serialize + ?Sized>(&self, id: &str, data: &P) -> Result<E> {
        self.update_with(id, data, &OperationOptions::default())
            .await
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        self.delete_with(id, &OperationOptions::default()).await
    }

    /// Filtered, projected, paginated read
    #[instrument(skip(self, args, options), fields(entity = %self.config.name, backend = %self.adapter.backend()))]
    pub async fn find_many_with(
        &self,
        args: FindManyArgs,
        options: &OperationOptions,
    ) -> Result<Page<E>> {
        self.run("find_many", options, async {
            let take = self.page_size(args.take)?;
            let continuation = args.cursor.as_deref().map(cursor::decode).transpose()?;
            args.filter.validate()?;

            let request = FindManyRequest {
                filter: args.filter,
                select: args.select,
                order_by: args.order_by,
                take,
                continuation,
            };
            let page = self.adapter.find_many(&request).await?;

            metrics::record_items_returned(
                self.adapter.backend().as_str(),
                page.items.len() as u64,
            );
            debug!(items = page.items.len(), more = page.continuation.is_some(), "page fetched");

            let items = page
                .items
                .into_iter()
                .map(|document| self.materialize(request.select.project(document)))
                .collect::<Result<Vec<E>>>()?;

            Ok::<_, NoSqlError>(Page {
                items,
                next_cursor: cursor::encode(page.continuation.as_deref()),
            })
        })
        .await
    }

    /// Single record by id; `NotFound` when absent
    #[instrument(skip(self, select, options), fields(entity = %self.config.name, backend = %self.adapter.backend()))]
    pub async fn find_one_with(
        &self,
        id: &str,
        select: &SelectSpec,
        options: &OperationOptions,
    ) -> Result<E> {
        self.run("find_one", options, async {
            validate_identifier(id)?;
            let document = self
                .adapter
                .find_by_id(id, select)
                .await?
                .ok_or_else(|| NoSqlError::NotFound(id.to_string()))?;
            self.materialize(select.project(document))
        })
        .await
    }

    /// Insert a record, filling auto fields
    #[instrument(skip(self, data, options), fields(entity = %self.config.name, backend = %self.adapter.backend()))]
    pub async fn create_with<P: Serialize + ?Sized>(
        &self,
        data: &P,
        options: &OperationOptions,
    ) -> Result<E> {
        let document = payload_object(data, "create");
        self.run("create", options, async {
            let mut document = document?;
            let id_field = self.adapter.id_field().to_string();

            match document.get(&id_field) {
                Some(JsonValue::String(id)) => validate_identifier(id)?,
                Some(other) => {
                    return Err(NoSqlError::InvalidArgument(format!(
                        "{} must be a string, got {}",
                        id_field, other
                    )))
                }
                None if self.config.auto_fields.id => {
                    let id = self.ids.generate();
                    validate_identifier(&id)?;
                    document.insert(id_field.clone(), JsonValue::String(id));
                }
                None => {
                    return Err(NoSqlError::InvalidArgument(format!(
                        "{} is required",
                        id_field
                    )))
                }
            }

            if self.config.auto_fields.timestamp {
                let now = JsonValue::String(format_timestamp(&self.clock.now()));
                document.insert(CREATED_AT.to_string(), now.clone());
                document.insert(UPDATED_AT.to_string(), now);
            }

            let stored = self
                .adapter
                .insert(document, self.config.write_policy)
                .await?;
            self.materialize(stored)
        })
        .await
    }

    /// Apply a partial update and return the stored record
    #[instrument(skip(self, data, options), fields(entity = %self.config.name, backend = %self.adapter.backend()))]
    pub async fn update_with<P: Serialize + ?Sized>(
        &self,
        id: &str,
        data: &P,
        options: &OperationOptions,
    ) -> Result<E> {
        let changes = payload_object(data, "update");
        self.run("update", options, async {
            validate_identifier(id)?;
            let mut changes = changes?;
            let id_field = self.adapter.id_field();

            if let Some(requested) = changes.get(id_field) {
                if requested.as_str() != Some(id) {
                    return Err(NoSqlError::InvalidArgument(format!(
                        "{} cannot be changed by update",
                        id_field
                    )));
                }
                changes.retain(|key, _| key != id_field);
            }

            if self.config.auto_fields.timestamp {
                changes.retain(|key, _| key != CREATED_AT);
                changes.insert(
                    UPDATED_AT.to_string(),
                    JsonValue::String(format_timestamp(&self.clock.now())),
                );
            }
            if changes.is_empty() {
                return Err(NoSqlError::InvalidArgument(
                    "update payload has no fields to change".into(),
                ));
            }

            let stored = self
                .adapter
                .update(id, changes, self.config.write_policy)
                .await?;
            self.materialize(stored)
        })
        .await
    }

    /// Remove a record
    #[instrument(skip(self, options), fields(entity = %self.config.name, backend = %self.adapter.backend()))]
    pub async fn delete_with(&self, id: &str, options: &OperationOptions) -> Result<()> {
        self.run("delete", options, async {
            validate_identifier(id)?;
            self.adapter.delete(id, self.config.write_policy).await
        })
        .await
    }

    fn page_size(&self, take: Option<i64>) -> Result<usize> {
        let Some(take) = take else {
            return Ok(self.config.default_page_size);
        };
        match usize::try_from(take) {
            Ok(size) if (1..=self.config.max_page_size).contains(&size) => Ok(size),
            _ => Err(NoSqlError::InvalidArgument(format!(
                "take must be between 1 and {}, got {}",
                self.config.max_page_size, take
            ))),
        }
    }

    fn materialize(&self, document: Document) -> Result<E> {
        serde_json::from_value(JsonValue::Object(document)).map_err(|e| {
            NoSqlError::BackendContractViolation(format!(
                "record does not fit {}: {}",
                self.config.name, e
            ))
        })
    }

    /// Drive one operation under its timeout and cancellation token
    async fn run<T>(
        &self,
        operation: &'static str,
        options: &OperationOptions,
        work: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        let started = Instant::now();
        let timeout = options.timeout.or(self.config.default_timeout);

        let bounded = async {
            match timeout {
                Some(limit) => match tokio::time::timeout(limit, work).await {
                    Ok(result) => result,
                    Err(_) => Err(NoSqlError::Timeout(limit)),
                },
                None => work.await,
            }
        };

        let result = match &options.cancellation {
            Some(token) => {
                tokio::select! {
                    biased;
                    () = token.cancelled() => Err(NoSqlError::Cancelled),
                    result = bounded => result,
                }
            }
            None => bounded.await,
        };

        let backend = self.adapter.backend().as_str();
        metrics::record_operation(backend, operation, result.is_ok());
        metrics::record_operation_latency(backend, operation, elapsed_ms(started));
        result
    }
}
