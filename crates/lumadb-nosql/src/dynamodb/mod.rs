//! DynamoDB-style key-value backend
//!
//! [`DynamoAdapter`] compiles requests into expression-attribute commands
//! and issues them through a [`DynamoClient`]. The client is the
//! application's handle to the store; its request and response shapes
//! mirror the DynamoDB API with items in DynamoDB JSON.

pub mod expression;
pub mod translator;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use lumadb_common::WritePolicy;
use serde_json::{Map, Value as JsonValue};
use tracing::{debug, instrument, warn};

use crate::adapter::{normalize_items, FindManyRequest, RawPage, StoreAdapter};
use crate::compiler::{Fragment, QueryCompiler};
use crate::core::{Backend, Document, NoSqlError, Result, StoreError, Value};
use crate::filter::{Condition, FieldFilter, QueryMode, SelectSpec, SortOrder, WhereClause};

use expression::{DynamoDialect, ExpressionAttributes};
use translator::{document_to_item, item_to_document, json_to_attribute, Item};

/// `Scan` request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanInput {
    pub table_name: String,
    pub filter_expression: Option<String>,
    pub projection_expression: Option<String>,
    pub expression_attribute_names: Option<HashMap<String, String>>,
    pub expression_attribute_values: Option<HashMap<String, JsonValue>>,
    pub limit: Option<u32>,
    pub exclusive_start_key: Option<Item>,
}

/// `Query` request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryInput {
    pub table_name: String,
    pub key_condition_expression: String,
    pub filter_expression: Option<String>,
    pub projection_expression: Option<String>,
    pub expression_attribute_names: Option<HashMap<String, String>>,
    pub expression_attribute_values: Option<HashMap<String, JsonValue>>,
    pub scan_index_forward: Option<bool>,
    pub limit: Option<u32>,
    pub exclusive_start_key: Option<Item>,
}

/// Result page of `Scan` and `Query`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageOutput {
    /// Matched items; any shape other than a list of items is rejected
    pub items: Option<JsonValue>,
    pub last_evaluated_key: Option<Item>,
}

/// `GetItem` request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GetItemInput {
    pub table_name: String,
    pub key: Item,
    pub projection_expression: Option<String>,
    pub expression_attribute_names: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GetItemOutput {
    pub item: Option<Item>,
}

/// `PutItem` request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PutItemInput {
    pub table_name: String,
    pub item: Item,
    pub condition_expression: Option<String>,
    pub expression_attribute_names: Option<HashMap<String, String>>,
    pub expression_attribute_values: Option<HashMap<String, JsonValue>>,
}

/// `UpdateItem` request. Responses always carry the new item image.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateItemInput {
    pub table_name: String,
    pub key: Item,
    pub update_expression: String,
    pub condition_expression: Option<String>,
    pub expression_attribute_names: Option<HashMap<String, String>>,
    pub expression_attribute_values: Option<HashMap<String, JsonValue>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateItemOutput {
    pub attributes: Option<Item>,
}

/// `DeleteItem` request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeleteItemInput {
    pub table_name: String,
    pub key: Item,
    pub condition_expression: Option<String>,
    pub expression_attribute_names: Option<HashMap<String, String>>,
}

/// Handle to a DynamoDB-compatible store
#[async_trait]
pub trait DynamoClient: Send + Sync {
    async fn scan(&self, input: ScanInput) -> std::result::Result<PageOutput, StoreError>;

    async fn query(&self, input: QueryInput) -> std::result::Result<PageOutput, StoreError>;

    async fn get_item(&self, input: GetItemInput)
        -> std::result::Result<GetItemOutput, StoreError>;

    async fn put_item(&self, input: PutItemInput) -> std::result::Result<(), StoreError>;

    async fn update_item(
        &self,
        input: UpdateItemInput,
    ) -> std::result::Result<UpdateItemOutput, StoreError>;

    async fn delete_item(&self, input: DeleteItemInput) -> std::result::Result<(), StoreError>;
}

/// Table name and key schema of one entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub name: String,
    pub partition_key: String,
    pub sort_key: Option<String>,
}

impl TableRef {
    pub fn new(name: impl Into<String>, partition_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            partition_key: partition_key.into(),
            sort_key: None,
        }
    }

    #[must_use]
    pub fn with_sort_key(mut self, sort_key: impl Into<String>) -> Self {
        self.sort_key = Some(sort_key.into());
        self
    }

    fn is_key(&self, field: &str) -> bool {
        field == self.partition_key || self.sort_key.as_deref() == Some(field)
    }
}

/// Condition on one key attribute inside a `KeyConditionExpression`
#[derive(Debug, Clone)]
enum KeyCondition {
    Single(Condition),
    Between(Value, Value),
}

/// Sort-key conditions a key condition expression can carry
fn key_compatible(condition: &Condition, mode: QueryMode) -> bool {
    match condition {
        Condition::Equals(_)
        | Condition::Lt(_)
        | Condition::Lte(_)
        | Condition::Gt(_)
        | Condition::Gte(_) => true,
        Condition::StartsWith(_) => mode == QueryMode::Sensitive,
        _ => false,
    }
}

/// The whole sort-key filter as one key condition, if it fits
fn sort_key_condition(filter: &FieldFilter) -> Option<KeyCondition> {
    match filter.conditions() {
        [condition] if key_compatible(condition, filter.query_mode()) => {
            Some(KeyCondition::Single(condition.clone()))
        }
        [Condition::Gte(low), Condition::Lte(high)] | [Condition::Lte(high), Condition::Gte(low)] => {
            Some(KeyCondition::Between(low.clone(), high.clone()))
        }
        _ => None,
    }
}

fn parse_start_key(token: &str) -> Result<Item> {
    match serde_json::from_str::<JsonValue>(token) {
        Ok(JsonValue::Object(key)) => Ok(key),
        Ok(other) => Err(NoSqlError::InvalidCursor(format!(
            "pagination key must be an object, got {}",
            other
        ))),
        Err(e) => Err(NoSqlError::InvalidCursor(format!(
            "pagination key is not JSON: {}",
            e
        ))),
    }
}

fn store_failure(operation: &'static str, error: StoreError) -> NoSqlError {
    warn!(operation, error = %error, "DynamoDB call failed");
    NoSqlError::BackendFailure(error)
}

/// Key-value backend adapter
pub struct DynamoAdapter {
    client: Arc<dyn DynamoClient>,
    table: TableRef,
}

impl DynamoAdapter {
    pub fn new(client: Arc<dyn DynamoClient>, table: TableRef) -> Self {
        Self { client, table }
    }

    #[must_use]
    pub fn table(&self) -> &TableRef {
        &self.table
    }

    fn partition_key_item(&self, id: &str) -> Item {
        let mut key = Map::new();
        key.insert(
            self.table.partition_key.clone(),
            serde_json::json!({ "S": id }),
        );
        key
    }

    fn items_to_documents(items: Option<JsonValue>) -> Result<Vec<Document>> {
        normalize_items(items)?
            .iter()
            .map(item_to_document)
            .collect()
    }

    /// Query on the partition key alone, first matching item
    async fn first_by_partition(&self, id: &str, select: &SelectSpec) -> Result<Option<Document>> {
        let mut compiler = QueryCompiler::new(DynamoDialect::new());
        let projection = compiler.dialect_mut().projection(select);
        let key = compiler.compile_condition(
            &self.table.partition_key,
            &Condition::Equals(Value::from(id)),
            QueryMode::Sensitive,
        )?;
        let key_condition = compiler.render(&key);
        let attributes = ExpressionAttributes::from_compiler(compiler);

        let output = self
            .client
            .query(QueryInput {
                table_name: self.table.name.clone(),
                key_condition_expression: key_condition,
                projection_expression: projection,
                expression_attribute_names: attributes.names(),
                expression_attribute_values: attributes.values(),
                limit: Some(1),
                ..QueryInput::default()
            })
            .await
            .map_err(|e| store_failure("query", e))?;

        Ok(Self::items_to_documents(output.items)?.into_iter().next())
    }

    /// Full primary key of the record with this id, if it exists or can be
    /// addressed without a lookup
    async fn resolve_key(&self, id: &str) -> Result<Option<Item>> {
        let Some(sort_key) = &self.table.sort_key else {
            return Ok(Some(self.partition_key_item(id)));
        };

        let select = SelectSpec::fields([self.table.partition_key.as_str(), sort_key.as_str()]);
        let Some(record) = self.first_by_partition(id, &select).await? else {
            return Ok(None);
        };

        let sort_value = record.get(sort_key).ok_or_else(|| {
            NoSqlError::BackendContractViolation(format!(
                "item {} has no sort key attribute {}",
                id, sort_key
            ))
        })?;
        let mut key = self.partition_key_item(id);
        key.insert(sort_key.clone(), json_to_attribute(sort_value));
        Ok(Some(key))
    }

    /// Split a validated filter into key conditions and the remaining
    /// filter for a `Query`.
    ///
    /// `None` means the request must be a scan: the partition key is not
    /// pinned by a single equality, or part of the sort-key filter cannot
    /// move into the key condition. A query rejects key attributes in its
    /// `FilterExpression`; a scan accepts them.
    fn key_plan(&self, filter: &WhereClause) -> Option<(Vec<(String, KeyCondition)>, WhereClause)> {
        let partition_key = &self.table.partition_key;
        let [condition @ Condition::Equals(_)] = filter.get(partition_key)?.conditions() else {
            return None;
        };

        let mut remaining = filter.clone();
        remaining.remove(partition_key);
        let mut keys = vec![(partition_key.clone(), KeyCondition::Single(condition.clone()))];

        if let Some(sort_key) = &self.table.sort_key {
            if let Some(sk_filter) = filter.get(sort_key) {
                keys.push((sort_key.clone(), sort_key_condition(sk_filter)?));
                remaining.remove(sort_key);
            }
        }
        Some((keys, remaining))
    }

    fn existence_condition(
        &self,
        attributes: &mut ExpressionAttributes,
        policy: WritePolicy,
        function: &str,
    ) -> Option<String> {
        match policy {
            WritePolicy::ExistenceChecked => {
                let alias = attributes.alias(&self.table.partition_key);
                Some(format!("{}({})", function, alias))
            }
            WritePolicy::Unchecked => None,
        }
    }
}

#[async_trait]
impl StoreAdapter for DynamoAdapter {
    fn backend(&self) -> Backend {
        Backend::Dynamodb
    }

    fn id_field(&self) -> &str {
        &self.table.partition_key
    }

    #[instrument(skip(self, request), fields(table = %self.table.name))]
    async fn find_many(&self, request: &FindManyRequest) -> Result<RawPage> {
        request.filter.validate()?;

        let (key_conditions, remaining) = self
            .key_plan(&request.filter)
            .unwrap_or_else(|| (Vec::new(), request.filter.clone()));
        let is_query = !key_conditions.is_empty();

        let order: Vec<(&str, SortOrder)> = request.order_by.iter().collect();
        let scan_index_forward = match order.as_slice() {
            [] => None,
            [(field, direction)] if is_query && self.table.sort_key.as_deref() == Some(*field) => {
                Some(*direction == SortOrder::Asc)
            }
            _ => {
                return Err(NoSqlError::InvalidArgument(
                    "DynamoDB can only order by the sort key of a partition-key query".into(),
                ))
            }
        };

        let exclusive_start_key = request
            .continuation
            .as_deref()
            .map(parse_start_key)
            .transpose()?;

        let mut compiler = QueryCompiler::new(DynamoDialect::new());
        let projection = compiler.dialect_mut().projection(&request.select);
        let mut key_fragments = Vec::new();
        for (field, condition) in &key_conditions {
            let fragment = match condition {
                KeyCondition::Single(condition) => {
                    compiler.compile_condition(field, condition, QueryMode::Sensitive)?
                }
                KeyCondition::Between(low, high) => {
                    let attribute = compiler.dialect_mut().alias(field);
                    let mut fragment = Fragment::text(format!("{} BETWEEN ", attribute));
                    fragment.push_param(compiler.bind(low.clone()));
                    fragment.push_text(" AND ");
                    fragment.push_param(compiler.bind(high.clone()));
                    fragment
                }
            };
            key_fragments.push(fragment);
        }
        let key_condition = compiler.render(&Fragment::join(key_fragments, " AND "));
        let filter = compiler.compile_where(&remaining)?;
        let filter_expression = filter.as_ref().map(|f| compiler.render(f));
        if let Some(filter) = &filter {
            debug!(filter = %compiler.explain(filter), "compiled filter expression");
        }
        let attributes = ExpressionAttributes::from_compiler(compiler);
        let limit = u32::try_from(request.take).ok();

        let output = if is_query {
            debug!(key_condition = %key_condition, "issuing query");
            self.client
                .query(QueryInput {
                    table_name: self.table.name.clone(),
                    key_condition_expression: key_condition,
                    filter_expression,
                    projection_expression: projection,
                    expression_attribute_names: attributes.names(),
                    expression_attribute_values: attributes.values(),
                    scan_index_forward,
                    limit,
                    exclusive_start_key,
                })
                .await
                .map_err(|e| store_failure("query", e))?
        } else {
            debug!("issuing scan");
            self.client
                .scan(ScanInput {
                    table_name: self.table.name.clone(),
                    filter_expression,
                    projection_expression: projection,
                    expression_attribute_names: attributes.names(),
                    expression_attribute_values: attributes.values(),
                    limit,
                    exclusive_start_key,
                })
                .await
                .map_err(|e| store_failure("scan", e))?
        };

        let items = Self::items_to_documents(output.items)?;
        let continuation = output
            .last_evaluated_key
            .map(|key| serde_json::to_string(&JsonValue::Object(key)))
            .transpose()
            .map_err(|e| NoSqlError::BackendContractViolation(e.to_string()))?;

        Ok(RawPage {
            items,
            continuation,
        })
    }

    #[instrument(skip(self, select), fields(table = %self.table.name))]
    async fn find_by_id(&self, id: &str, select: &SelectSpec) -> Result<Option<Document>> {
        if self.table.sort_key.is_some() {
            return self.first_by_partition(id, select).await;
        }

        let mut dialect = DynamoDialect::new();
        let projection = dialect.projection(select);
        let attributes = ExpressionAttributes::from_compiler(QueryCompiler::new(dialect));

        let output = self
            .client
            .get_item(GetItemInput {
                table_name: self.table.name.clone(),
                key: self.partition_key_item(id),
                projection_expression: projection,
                expression_attribute_names: attributes.names(),
            })
            .await
            .map_err(|e| store_failure("get_item", e))?;

        output.item.as_ref().map(item_to_document).transpose()
    }

    #[instrument(skip(self, document), fields(table = %self.table.name))]
    async fn insert(&self, document: Document, policy: WritePolicy) -> Result<Document> {
        let id = match document.get(&self.table.partition_key) {
            Some(JsonValue::String(id)) => id.clone(),
            Some(other) => other.to_string(),
            None => {
                return Err(NoSqlError::InvalidArgument(format!(
                    "record has no partition key {}",
                    self.table.partition_key
                )))
            }
        };
        if let Some(sort_key) = &self.table.sort_key {
            if !document.contains_key(sort_key) {
                return Err(NoSqlError::InvalidArgument(format!(
                    "record has no sort key {}",
                    sort_key
                )));
            }
        }

        let mut attributes = ExpressionAttributes::default();
        let condition = self.existence_condition(&mut attributes, policy, "attribute_not_exists");

        self.client
            .put_item(PutItemInput {
                table_name: self.table.name.clone(),
                item: document_to_item(&document),
                condition_expression: condition,
                expression_attribute_names: attributes.names(),
                expression_attribute_values: None,
            })
            .await
            .map_err(|e| match e {
                StoreError::ConditionalCheckFailed(_) => NoSqlError::AlreadyExists(id),
                other => store_failure("put_item", other),
            })?;

        Ok(document)
    }

    #[instrument(skip(self, changes), fields(table = %self.table.name))]
    async fn update(&self, id: &str, changes: Document, policy: WritePolicy) -> Result<Document> {
        let changes: Document = changes
            .into_iter()
            .filter(|(field, _)| !self.table.is_key(field))
            .collect();
        if changes.is_empty() {
            return Err(NoSqlError::InvalidArgument(
                "update changes no attributes besides the key".into(),
            ));
        }

        let Some(key) = self.resolve_key(id).await? else {
            return Err(NoSqlError::NotFound(id.to_string()));
        };

        let mut attributes = ExpressionAttributes::default();
        let mut assignments = Vec::with_capacity(changes.len());
        for (field, value) in &changes {
            let name = attributes.alias(field);
            let value = attributes.bind(json_to_attribute(value));
            assignments.push(format!("{} = {}", name, value));
        }
        let update_expression = format!("SET {}", assignments.join(", "));
        let condition = self.existence_condition(&mut attributes, policy, "attribute_exists");
        debug!(update = %update_expression, "issuing update");

        let output = self
            .client
            .update_item(UpdateItemInput {
                table_name: self.table.name.clone(),
                key,
                update_expression,
                condition_expression: condition,
                expression_attribute_names: attributes.names(),
                expression_attribute_values: attributes.values(),
            })
            .await
            .map_err(|e| match e {
                StoreError::ConditionalCheckFailed(_) => NoSqlError::NotFound(id.to_string()),
                other => store_failure("update_item", other),
            })?;

        let attributes = output.attributes.ok_or_else(|| {
            NoSqlError::BackendContractViolation("update returned no attributes".into())
        })?;
        item_to_document(&attributes)
    }

    #[instrument(skip(self), fields(table = %self.table.name))]
    async fn delete(&self, id: &str, policy: WritePolicy) -> Result<()> {
        let Some(key) = self.resolve_key(id).await? else {
            return match policy {
                WritePolicy::ExistenceChecked => Err(NoSqlError::NotFound(id.to_string())),
                WritePolicy::Unchecked => Ok(()),
            };
        };

        let mut attributes = ExpressionAttributes::default();
        let condition = self.existence_condition(&mut attributes, policy, "attribute_exists");

        self.client
            .delete_item(DeleteItemInput {
                table_name: self.table.name.clone(),
                key,
                condition_expression: condition,
                expression_attribute_names: attributes.names(),
            })
            .await
            .map_err(|e| match e {
                StoreError::ConditionalCheckFailed(_) => NoSqlError::NotFound(id.to_string()),
                other => store_failure("delete_item", other),
            })
    }
}
