//! In-memory DynamoDB client
//!
//! Evaluates the expressions it receives against items held in ordered
//! maps. `Limit` counts evaluated items, not matches, as the real service
//! does.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value as JsonValue};
use tracing::debug;

use super::eval::{parse_condition, parse_paths, parse_set, sort_order, Expr, Operand, Scope};
use crate::core::{Document, StoreError};
use crate::dynamodb::translator::{attribute_to_json, item_to_document, json_to_attribute, Item};
use crate::dynamodb::{
    DeleteItemInput, DynamoClient, GetItemInput, GetItemOutput, PageOutput, PutItemInput,
    QueryInput, ScanInput, UpdateItemInput, UpdateItemOutput,
};

type StoreResult<T> = std::result::Result<T, StoreError>;

/// A request as received, for assertions
#[derive(Debug, Clone, PartialEq)]
pub enum DynamoRequest {
    Scan(ScanInput),
    Query(QueryInput),
    GetItem(GetItemInput),
    PutItem(PutItemInput),
    UpdateItem(UpdateItemInput),
    DeleteItem(DeleteItemInput),
}

struct MemoryTable {
    partition_key: String,
    sort_key: Option<String>,
    items: BTreeMap<String, Item>,
}

impl MemoryTable {
    fn key_string(&self, item: &Item) -> StoreResult<String> {
        let pk = item.get(&self.partition_key).ok_or_else(|| {
            invalid(format!("missing partition key {}", self.partition_key))
        })?;
        let mut key = pk.to_string();
        if let Some(sort_key) = &self.sort_key {
            let sk = item
                .get(sort_key)
                .ok_or_else(|| invalid(format!("missing sort key {}", sort_key)))?;
            key.push('\u{1f}');
            key.push_str(&sk.to_string());
        }
        Ok(key)
    }

    fn key_of(&self, item: &Item) -> Item {
        let mut key = Map::new();
        for field in std::iter::once(&self.partition_key).chain(self.sort_key.as_ref()) {
            if let Some(value) = item.get(field) {
                key.insert(field.clone(), value.clone());
            }
        }
        key
    }

    fn is_key(&self, field: &str) -> bool {
        field == self.partition_key || self.sort_key.as_deref() == Some(field)
    }

    /// Position used for ordering and `ExclusiveStartKey`
    fn order_key(&self, item: &Item, by_sort_key: bool) -> StoreResult<(Option<JsonValue>, String)> {
        let sort_value = match (&self.sort_key, by_sort_key) {
            (Some(sort_key), true) => item.get(sort_key).map(to_plain).transpose()?,
            _ => None,
        };
        Ok((sort_value, self.key_string(item)?))
    }
}

fn invalid(reason: impl Into<String>) -> StoreError {
    StoreError::Service(format!("ValidationException: {}", reason.into()))
}

fn to_plain(attribute: &JsonValue) -> StoreResult<JsonValue> {
    attribute_to_json(attribute).map_err(|e| invalid(e.to_string()))
}

fn to_document(item: &Item) -> StoreResult<Document> {
    item_to_document(item).map_err(|e| invalid(e.to_string()))
}

fn plain_values(values: Option<&HashMap<String, JsonValue>>) -> StoreResult<HashMap<String, JsonValue>> {
    values
        .into_iter()
        .flatten()
        .map(|(name, value)| Ok((name.clone(), to_plain(value)?)))
        .collect()
}

fn compare_order(a: &(Option<JsonValue>, String), b: &(Option<JsonValue>, String)) -> Ordering {
    sort_order(a.0.as_ref(), b.0.as_ref()).then_with(|| a.1.cmp(&b.1))
}

fn project(item: &Item, projection: Option<&Vec<String>>) -> Item {
    match projection {
        None => item.clone(),
        Some(fields) => fields
            .iter()
            .filter_map(|field| item.get(field).map(|v| (field.clone(), v.clone())))
            .collect(),
    }
}

fn check_condition(
    condition: Option<&str>,
    names: Option<&HashMap<String, String>>,
    values: &HashMap<String, JsonValue>,
    existing: Option<&Item>,
) -> StoreResult<()> {
    let Some(condition) = condition else {
        return Ok(());
    };
    let expr = parse_condition(condition, names)?;
    let document = existing.map(to_document).transpose()?.unwrap_or_default();
    let scope = Scope {
        document: &document,
        params: values,
    };
    if scope.eval(&expr)? {
        Ok(())
    } else {
        Err(StoreError::ConditionalCheckFailed(
            "The conditional request failed".into(),
        ))
    }
}

/// Read plan shared by `Scan` and `Query`
struct ReadPlan<'a> {
    key_condition: Option<Expr>,
    filter: Option<Expr>,
    projection: Option<Vec<String>>,
    values: HashMap<String, JsonValue>,
    by_sort_key: bool,
    forward: bool,
    limit: Option<u32>,
    start: Option<&'a Item>,
}

/// DynamoDB client backed by process memory
#[derive(Default)]
pub struct MemoryDynamoClient {
    tables: RwLock<HashMap<String, MemoryTable>>,
    requests: Mutex<Vec<DynamoRequest>>,
    failure: Mutex<Option<StoreError>>,
    latency: Option<Duration>,
}

impl MemoryDynamoClient {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a table
    #[must_use]
    pub fn with_table(self, name: &str, partition_key: &str, sort_key: Option<&str>) -> Self {
        self.tables.write().insert(
            name.to_string(),
            MemoryTable {
                partition_key: partition_key.to_string(),
                sort_key: sort_key.map(str::to_string),
                items: BTreeMap::new(),
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

    /// Store plain documents directly, bypassing request recording
    pub fn seed(
        &self,
        table: &str,
        documents: impl IntoIterator<Item = Document>,
    ) -> StoreResult<()> {
        let mut tables = self.tables.write();
        let table = tables
            .get_mut(table)
            .ok_or_else(|| StoreError::NotFound(format!("table {}", table)))?;
        for document in documents {
            let item = crate::dynamodb::translator::document_to_item(&document);
            let key = table.key_string(&item)?;
            table.items.insert(key, item);
        }
        Ok(())
    }

    /// Fail the next call with `error`
    pub fn fail_next(&self, error: StoreError) {
        *self.failure.lock() = Some(error);
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<DynamoRequest> {
        self.requests.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn clear_requests(&self) {
        self.requests.lock().clear();
    }

    /// Stored item count of a table
    pub fn item_count(&self, table: &str) -> usize {
        self.tables.read().get(table).map_or(0, |t| t.items.len())
    }

    async fn begin(&self, request: DynamoRequest) -> StoreResult<()> {
        debug!(request = ?request, "memory dynamodb request");
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

    fn with_table_ref<T>(
        &self,
        name: &str,
        f: impl FnOnce(&mut MemoryTable) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let mut tables = self.tables.write();
        let table = tables
            .get_mut(name)
            .ok_or_else(|| StoreError::NotFound(format!("Requested resource not found: table {}", name)))?;
        f(table)
    }

    fn read(&self, table_name: &str, plan: &ReadPlan<'_>) -> StoreResult<PageOutput> {
        self.with_table_ref(table_name, |table| {
            if let (Some(_), Some(filter)) = (&plan.key_condition, &plan.filter) {
                if let Some(key) = filter.paths().into_iter().find(|path| table.is_key(path)) {
                    return Err(invalid(format!(
                        "Filter Expression can only contain non-primary key attributes: \
                         Primary key attribute: {}",
                        key
                    )));
                }
            }

            let mut candidates = Vec::with_capacity(table.items.len());
            for item in table.items.values() {
                let document = to_document(item)?;
                let scope = Scope {
                    document: &document,
                    params: &plan.values,
                };
                if let Some(key_condition) = &plan.key_condition {
                    if !scope.eval(key_condition)? {
                        continue;
                    }
                }
                candidates.push((table.order_key(item, plan.by_sort_key)?, item, document));
            }

            candidates.sort_by(|a, b| compare_order(&a.0, &b.0));
            if !plan.forward {
                candidates.reverse();
            }

            if let Some(start) = plan.start {
                let start = table.order_key(start, plan.by_sort_key)?;
                let wanted = if plan.forward {
                    Ordering::Greater
                } else {
                    Ordering::Less
                };
                candidates.retain(|candidate| compare_order(&candidate.0, &start) == wanted);
            }

            let limit = plan.limit.map_or(usize::MAX, |l| l as usize);
            let mut items = Vec::new();
            let mut last_evaluated_key = None;
            for (evaluated, (_, item, document)) in candidates.iter().enumerate() {
                let scope = Scope {
                    document,
                    params: &plan.values,
                };
                let matched = match &plan.filter {
                    Some(filter) => scope.eval(filter)?,
                    None => true,
                };
                if matched {
                    items.push(JsonValue::Object(project(item, plan.projection.as_ref())));
                }
                if evaluated + 1 == limit {
                    if evaluated + 1 < candidates.len() {
                        last_evaluated_key = Some(table.key_of(item));
                    }
                    break;
                }
            }

            Ok(PageOutput {
                items: Some(JsonValue::Array(items)),
                last_evaluated_key,
            })
        })
    }
}

#[async_trait]
impl DynamoClient for MemoryDynamoClient {
    async fn scan(&self, input: ScanInput) -> StoreResult<PageOutput> {
        self.begin(DynamoRequest::Scan(input.clone())).await?;
        let names = input.expression_attribute_names.as_ref();
        let plan = ReadPlan {
            key_condition: None,
            filter: input
                .filter_expression
                .as_deref()
                .map(|f| parse_condition(f, names))
                .transpose()?,
            projection: input
                .projection_expression
                .as_deref()
                .map(|p| parse_paths(p, names))
                .transpose()?,
            values: plain_values(input.expression_attribute_values.as_ref())?,
            by_sort_key: false,
            forward: true,
            limit: input.limit,
            start: input.exclusive_start_key.as_ref(),
        };
        self.read(&input.table_name, &plan)
    }

    async fn query(&self, input: QueryInput) -> StoreResult<PageOutput> {
        self.begin(DynamoRequest::Query(input.clone())).await?;
        let names = input.expression_attribute_names.as_ref();
        let plan = ReadPlan {
            key_condition: Some(parse_condition(&input.key_condition_expression, names)?),
            filter: input
                .filter_expression
                .as_deref()
                .map(|f| parse_condition(f, names))
                .transpose()?,
            projection: input
                .projection_expression
                .as_deref()
                .map(|p| parse_paths(p, names))
                .transpose()?,
            values: plain_values(input.expression_attribute_values.as_ref())?,
            by_sort_key: true,
            forward: input.scan_index_forward.unwrap_or(true),
            limit: input.limit,
            start: input.exclusive_start_key.as_ref(),
        };
        self.read(&input.table_name, &plan)
    }

    async fn get_item(&self, input: GetItemInput) -> StoreResult<GetItemOutput> {
        self.begin(DynamoRequest::GetItem(input.clone())).await?;
        let projection = input
            .projection_expression
            .as_deref()
            .map(|p| parse_paths(p, input.expression_attribute_names.as_ref()))
            .transpose()?;

        self.with_table_ref(&input.table_name, |table| {
            let key = table.key_string(&input.key)?;
            Ok(GetItemOutput {
                item: table.items.get(&key).map(|item| project(item, projection.as_ref())),
            })
        })
    }

    async fn put_item(&self, input: PutItemInput) -> StoreResult<()> {
        self.begin(DynamoRequest::PutItem(input.clone())).await?;
        let values = plain_values(input.expression_attribute_values.as_ref())?;

        self.with_table_ref(&input.table_name, |table| {
            let key = table.key_string(&input.item)?;
            check_condition(
                input.condition_expression.as_deref(),
                input.expression_attribute_names.as_ref(),
                &values,
                table.items.get(&key),
            )?;
            table.items.insert(key, input.item.clone());
            Ok(())
        })
    }

    async fn update_item(&self, input: UpdateItemInput) -> StoreResult<UpdateItemOutput> {
        self.begin(DynamoRequest::UpdateItem(input.clone())).await?;
        let names = input.expression_attribute_names.as_ref();
        let values = plain_values(input.expression_attribute_values.as_ref())?;
        let assignments = parse_set(&input.update_expression, names)?;

        self.with_table_ref(&input.table_name, |table| {
            let key = table.key_string(&input.key)?;
            let existing = table.items.get(&key);
            check_condition(input.condition_expression.as_deref(), names, &values, existing)?;

            let mut item = existing.cloned().unwrap_or_else(|| input.key.clone());
            for (field, operand) in assignments {
                if table.is_key(&field) {
                    return Err(invalid(format!("cannot update key attribute {}", field)));
                }
                let attribute = match operand {
                    Operand::Param(name) => input
                        .expression_attribute_values
                        .as_ref()
                        .and_then(|v| v.get(&name))
                        .cloned()
                        .ok_or_else(|| invalid(format!("undefined value {}", name)))?,
                    Operand::Literal(value) => json_to_attribute(&value),
                    other => return Err(invalid(format!("unsupported SET operand {:?}", other))),
                };
                item.insert(field, attribute);
            }

            table.items.insert(key, item.clone());
            Ok(UpdateItemOutput {
                attributes: Some(item),
            })
        })
    }

    async fn delete_item(&self, input: DeleteItemInput) -> StoreResult<()> {
        self.begin(DynamoRequest::DeleteItem(input.clone())).await?;

        self.with_table_ref(&input.table_name, |table| {
            let key = table.key_string(&input.key)?;
            check_condition(
                input.condition_expression.as_deref(),
                input.expression_attribute_names.as_ref(),
                &HashMap::new(),
                table.items.get(&key),
            )?;
            table.items.remove(&key);
            Ok(())
        })
    }
}
