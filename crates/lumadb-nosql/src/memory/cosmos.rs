//! In-memory Cosmos client
//!
//! Runs the SQL it receives over documents kept per container. Continuation
//! tokens are result offsets.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::Value as JsonValue;
use tracing::debug;

use super::eval::{parse_select, sort_order, Scope};
use crate::core::{Document, StoreError};
use crate::cosmos::{ContainerRef, CosmosClient, FeedOptions, FeedPage, SqlQuerySpec};

type StoreResult<T> = std::result::Result<T, StoreError>;

/// A request as received, for assertions
#[derive(Debug, Clone, PartialEq)]
pub enum CosmosRequest {
    Query(SqlQuerySpec, FeedOptions),
    Create(Document),
    Upsert(Document),
    Replace(String, Document),
    Delete(String),
}

#[derive(Default)]
struct MemoryContainer {
    partition_key: String,
    /// Documents in insertion order
    documents: Vec<Document>,
}

impl MemoryContainer {
    fn position(&self, id: &str) -> Option<usize> {
        self.documents
            .iter()
            .position(|document| document.get("id").and_then(JsonValue::as_str) == Some(id))
    }

    fn position_in_partition(&self, id: &str, partition_key: &JsonValue) -> Option<usize> {
        self.position(id).filter(|&index| {
            self.documents[index].get(&self.partition_key) == Some(partition_key)
        })
    }
}

fn document_id(document: &Document) -> StoreResult<String> {
    document
        .get("id")
        .and_then(JsonValue::as_str)
        .map(str::to_string)
        .ok_or_else(|| StoreError::Service("BadRequest: document has no string id".into()))
}

/// Cosmos client backed by process memory
#[derive(Default)]
pub struct MemoryCosmosClient {
    containers: RwLock<HashMap<(String, String), MemoryContainer>>,
    requests: Mutex<Vec<CosmosRequest>>,
    failure: Mutex<Option<StoreError>>,
    latency: Option<Duration>,
}

impl MemoryCosmosClient {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a container
    #[must_use]
    pub fn with_container(self, database: &str, container: &str, partition_key: &str) -> Self {
        self.containers.write().insert(
            (database.to_string(), container.to_string()),
            MemoryContainer {
                partition_key: partition_key.to_string(),
                documents: Vec::new(),
            },
        );
        self
    }

    /// Delay every call
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Store documents directly, bypassing request recording
    pub fn seed(
        &self,
        database: &str,
        container: &str,
        documents: impl IntoIterator<Item = Document>,
    ) -> StoreResult<()> {
        let target = ContainerRef::new(database, container);
        self.with_container_ref(&target, |state| {
            for document in documents {
                document_id(&document)?;
                state.documents.push(document);
            }
            Ok(())
        })
    }

    /// Fail the next call with `error`
    pub fn fail_next(&self, error: StoreError) {
        *self.failure.lock() = Some(error);
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<CosmosRequest> {
        self.requests.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn clear_requests(&self) {
        self.requests.lock().clear();
    }

    /// Stored document count of a container
    pub fn item_count(&self, database: &str, container: &str) -> usize {
        self.containers
            .read()
            .get(&(database.to_string(), container.to_string()))
            .map_or(0, |c| c.documents.len())
    }

    async fn begin(&self, request: CosmosRequest) -> StoreResult<()> {
        debug!(request = ?request, "memory cosmos request");
        self.requests.lock().push(request);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let failure = self.failure.lock().take();
        match failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn with_container_ref<T>(
        &self,
        target: &ContainerRef,
        f: impl FnOnce(&mut MemoryContainer) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let mut containers = self.containers.write();
        let state = containers
            .get_mut(&(target.database.clone(), target.container.clone()))
            .ok_or_else(|| {
                StoreError::NotFound(format!(
                    "Resource Not Found: {}/{}",
                    target.database, target.container
                ))
            })?;
        f(state)
    }
}

#[async_trait]
impl CosmosClient for MemoryCosmosClient {
    async fn query_items(
        &self,
        container: &ContainerRef,
        query: &SqlQuerySpec,
        options: &FeedOptions,
    ) -> StoreResult<FeedPage> {
        self.begin(CosmosRequest::Query(query.clone(), options.clone()))
            .await?;

        let parsed = parse_select(&query.query)?;
        let params: HashMap<String, JsonValue> = query
            .parameters
            .iter()
            .map(|p| (p.name.clone(), p.value.clone()))
            .collect();
        let offset = match &options.continuation {
            Some(token) => token.parse::<usize>().map_err(|_| {
                StoreError::Service(format!("BadRequest: invalid continuation token {}", token))
            })?,
            None => 0,
        };

        self.with_container_ref(container, |state| {
            let mut matched = Vec::new();
            for document in &state.documents {
                let scope = Scope {
                    document,
                    params: &params,
                };
                let keep = match &parsed.filter {
                    Some(filter) => scope.eval(filter)?,
                    None => true,
                };
                if keep {
                    matched.push(document);
                }
            }

            if !parsed.order.is_empty() {
                matched.sort_by(|a, b| {
                    parsed
                        .order
                        .iter()
                        .map(|(field, ascending)| {
                            let ordering = sort_order(a.get(field), b.get(field));
                            if *ascending {
                                ordering
                            } else {
                                ordering.reverse()
                            }
                        })
                        .find(|ordering| ordering.is_ne())
                        .unwrap_or(std::cmp::Ordering::Equal)
                });
            }

            let page_size = options.max_item_count.map_or(usize::MAX, |n| n as usize);
            let end = offset.saturating_add(page_size).min(matched.len());
            let resources: Vec<JsonValue> = matched
                .get(offset..end)
                .unwrap_or_default()
                .iter()
                .map(|document| {
                    let projected = match &parsed.projection {
                        None => (*document).clone(),
                        Some(fields) => fields
                            .iter()
                            .filter_map(|field| {
                                document.get(field).map(|v| (field.clone(), v.clone()))
                            })
                            .collect(),
                    };
                    JsonValue::Object(projected)
                })
                .collect();

            Ok(FeedPage {
                resources: Some(JsonValue::Array(resources)),
                continuation: (end < matched.len()).then(|| end.to_string()),
            })
        })
    }

    async fn create_item(
        &self,
        container: &ContainerRef,
        document: &Document,
    ) -> StoreResult<Document> {
        self.begin(CosmosRequest::Create(document.clone())).await?;
        let id = document_id(document)?;

        self.with_container_ref(container, |state| {
            if state.position(&id).is_some() {
                return Err(StoreError::Conflict(format!(
                    "Entity with the specified id already exists: {}",
                    id
                )));
            }
            state.documents.push(document.clone());
            Ok(document.clone())
        })
    }

    async fn upsert_item(
        &self,
        container: &ContainerRef,
        document: &Document,
    ) -> StoreResult<Document> {
        self.begin(CosmosRequest::Upsert(document.clone())).await?;
        let id = document_id(document)?;

        self.with_container_ref(container, |state| {
            match state.position(&id) {
                Some(index) => state.documents[index] = document.clone(),
                None => state.documents.push(document.clone()),
            }
            Ok(document.clone())
        })
    }

    async fn replace_item(
        &self,
        container: &ContainerRef,
        id: &str,
        partition_key: &JsonValue,
        document: &Document,
    ) -> StoreResult<Document> {
        self.begin(CosmosRequest::Replace(id.to_string(), document.clone()))
            .await?;

        self.with_container_ref(container, |state| {
            let index = state
                .position_in_partition(id, partition_key)
                .ok_or_else(|| StoreError::NotFound(format!("Resource Not Found: {}", id)))?;
            state.documents[index] = document.clone();
            Ok(document.clone())
        })
    }

    async fn delete_item(
        &self,
        container: &ContainerRef,
        id: &str,
        partition_key: &JsonValue,
    ) -> StoreResult<()> {
        self.begin(CosmosRequest::Delete(id.to_string())).await?;

        self.with_container_ref(container, |state| {
            let index = state
                .position_in_partition(id, partition_key)
                .ok_or_else(|| StoreError::NotFound(format!("Resource Not Found: {}", id)))?;
            state.documents.remove(index);
            Ok(())
        })
    }
}
