//! Integration tests for LumaDB
//!
//! These tests load a configuration file from disk, wire repositories for
//! every configured entity against in-memory store clients, and drive the
//! full CRUD surface end to end.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use lumadb_common::config::Config;
use lumadb_nosql::entity::{EntityRepository, FindManyArgs, OperationOptions};
use lumadb_nosql::filter::{FieldFilter, OrderSpec, SelectSpec, WhereClause};
use lumadb_nosql::memory::{MemoryCosmosClient, MemoryDynamoClient};
use lumadb_nosql::{ErrorKind, StoreClients};
use serde::Deserialize;
use serde_json::json;
use tempfile::NamedTempFile;

const CONFIG: &str = r#"
[logging]
level = "warn"

[query]
default_page_size = 2
max_page_size = 50
operation_timeout_ms = 1000

[[entities]]
name = "users"
[entities.store]
backend = "dynamodb"
table = "Users"
partition_key = "id"

[[entities]]
name = "orders"
write_policy = "unchecked"
[entities.auto_fields]
timestamp = false
[entities.store]
backend = "cosmos"
database = "shop"
container = "orders"
partition_key = "customerId"
"#;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct User {
    id: String,
    email: String,
    age: i64,
    created_at: String,
    updated_at: String,
}

/// Everything a test needs: loaded config, store clients, the temp file
struct Harness {
    config: Config,
    dynamo: Arc<MemoryDynamoClient>,
    cosmos: Arc<MemoryCosmosClient>,
    _file: NamedTempFile,
}

impl Harness {
    async fn load() -> anyhow::Result<Self> {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile()?;
        file.write_all(CONFIG.as_bytes())?;
        let config = Config::load(file.path()).await?;

        Ok(Self {
            config,
            dynamo: Arc::new(MemoryDynamoClient::new().with_table("Users", "id", None)),
            cosmos: Arc::new(MemoryCosmosClient::new().with_container("shop", "orders", "customerId")),
            _file: file,
        })
    }

    fn clients(&self) -> StoreClients {
        StoreClients::new()
            .with_dynamodb(self.dynamo.clone())
            .with_cosmos(self.cosmos.clone())
    }

    fn repository<E: serde::de::DeserializeOwned>(&self, name: &str) -> anyhow::Result<EntityRepository<E>> {
        let settings = self
            .config
            .entity(name)
            .ok_or_else(|| anyhow::anyhow!("entity {name} not configured"))?;
        Ok(EntityRepository::from_settings(settings, &self.config.query, &self.clients())?)
    }
}

// ============================================================================
// Configuration Wiring
// ============================================================================

#[tokio::test]
async fn test_config_drives_repositories() -> anyhow::Result<()> {
    let harness = Harness::load().await?;

    let users: EntityRepository = harness.repository("users")?;
    assert_eq!(users.config().default_page_size, 2);
    assert_eq!(users.config().max_page_size, 50);
    assert_eq!(users.config().default_timeout, Some(Duration::from_millis(1000)));
    assert_eq!(users.adapter().backend().as_str(), "dynamodb");

    let orders: EntityRepository = harness.repository("orders")?;
    assert!(!orders.config().auto_fields.timestamp);
    assert_eq!(orders.adapter().backend().as_str(), "cosmos");
    assert_eq!(orders.adapter().id_field(), "id");
    Ok(())
}

#[tokio::test]
async fn test_missing_client_is_rejected() -> anyhow::Result<()> {
    let harness = Harness::load().await?;
    let settings = harness.config.entity("orders").unwrap();

    let clients = StoreClients::new().with_dynamodb(harness.dynamo.clone());
    let result = EntityRepository::<serde_json::Value>::from_settings(settings, &harness.config.query, &clients);
    assert_eq!(result.err().map(|e| e.kind()), Some(ErrorKind::InvalidArgument));
    Ok(())
}

// ============================================================================
// DynamoDB-backed Entity
// ============================================================================

#[tokio::test]
async fn test_user_lifecycle() -> anyhow::Result<()> {
    let harness = Harness::load().await?;
    let users: EntityRepository<User> = harness.repository("users")?;

    let created = users
        .create(&json!({"id": "ada", "email": "ada@example.com", "age": 36}))
        .await?;
    assert_eq!(created.id, "ada");
    assert_eq!(created.created_at, created.updated_at);
    assert_eq!(harness.dynamo.item_count("Users"), 1);

    let duplicate = users
        .create(&json!({"id": "ada", "email": "other@example.com", "age": 1}))
        .await
        .unwrap_err();
    assert_eq!(duplicate.kind(), ErrorKind::AlreadyExists);

    let updated = users.update("ada", &json!({"age": 37})).await?;
    assert_eq!(updated.age, 37);
    assert_eq!(updated.email, "ada@example.com");
    assert_eq!(updated.created_at, created.created_at);

    let fetched = users.find_one("ada", &SelectSpec::all()).await?;
    assert_eq!(fetched.age, 37);

    users.delete("ada").await?;
    let gone = users.find_one("ada", &SelectSpec::all()).await.unwrap_err();
    assert_eq!(gone.kind(), ErrorKind::NotFound);
    assert_eq!(harness.dynamo.item_count("Users"), 0);
    Ok(())
}

#[tokio::test]
async fn test_user_paging_uses_configured_default() -> anyhow::Result<()> {
    let harness = Harness::load().await?;
    let users: EntityRepository = harness.repository("users")?;

    for (i, age) in [18, 25, 31, 44, 52].into_iter().enumerate() {
        users
            .create(&json!({"id": format!("u{i}"), "email": format!("u{i}@example.com"), "age": age}))
            .await?;
    }

    let adults = WhereClause::new().field("age", FieldFilter::new().gte(21));
    let mut seen = Vec::new();
    let mut cursor: Option<String> = None;
    loop {
        let mut args = FindManyArgs::new()
            .filter(adults.clone())
            .select(SelectSpec::fields(["id"]));
        if let Some(token) = cursor.take() {
            args = args.cursor(token);
        }
        let page = users.find_many(args).await?;
        assert!(page.items.len() <= 2);
        seen.extend(
            page.items
                .iter()
                .filter_map(|item| item.get("id").and_then(|v| v.as_str()).map(str::to_string)),
        );
        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    seen.sort();
    assert_eq!(seen, vec!["u1", "u2", "u3", "u4"]);
    Ok(())
}

#[tokio::test]
async fn test_take_above_configured_max() -> anyhow::Result<()> {
    let harness = Harness::load().await?;
    let users: EntityRepository = harness.repository("users")?;

    let err = users.find_many(FindManyArgs::new().take(51)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert_eq!(harness.dynamo.call_count(), 0);
    Ok(())
}

// ============================================================================
// Cosmos-backed Entity
// ============================================================================

#[tokio::test]
async fn test_orders_follow_entity_settings() -> anyhow::Result<()> {
    let harness = Harness::load().await?;
    let orders: EntityRepository = harness.repository("orders")?;

    let created = orders
        .create(&json!({"customerId": "c1", "total": 40, "status": "open"}))
        .await?;
    let id = created["id"].as_str().unwrap().to_string();
    assert!(created.get("createdAt").is_none());
    assert!(created.get("updatedAt").is_none());

    // unchecked policy: create overwrites instead of conflicting
    let replaced = orders
        .create(&json!({"id": id, "customerId": "c1", "total": 45, "status": "open"}))
        .await?;
    assert_eq!(replaced["total"], json!(45));
    assert_eq!(harness.cosmos.item_count("shop", "orders"), 1);

    orders
        .create(&json!({"id": "o-2", "customerId": "c2", "total": 10, "status": "shipped"}))
        .await?;
    orders
        .create(&json!({"id": "o-3", "customerId": "c1", "total": 99, "status": "Open"}))
        .await?;

    let page = orders
        .find_many(
            FindManyArgs::new()
                .filter(
                    WhereClause::new()
                        .field("status", FieldFilter::new().starts_with("OP").insensitive())
                        .field("customerId", FieldFilter::new().equals("c1")),
                )
                .order_by(OrderSpec::new().desc("total"))
                .select(SelectSpec::fields(["id", "total"]))
                .take(10),
        )
        .await?;
    let totals: Vec<_> = page.items.iter().map(|item| item["total"].clone()).collect();
    assert_eq!(totals, vec![json!(99), json!(45)]);
    assert!(page.items.iter().all(|item| item.get("status").is_none()));
    assert!(page.next_cursor.is_none());

    // unchecked delete of a missing record succeeds
    orders.delete("never-existed").await?;
    Ok(())
}

#[tokio::test]
async fn test_per_call_timeout_overrides_config() -> anyhow::Result<()> {
    let mut harness = Harness::load().await?;
    harness.cosmos = Arc::new(
        MemoryCosmosClient::new()
            .with_container("shop", "orders", "customerId")
            .with_latency(Duration::from_millis(200)),
    );
    let orders: EntityRepository = harness.repository("orders")?;

    let err = orders
        .find_many_with(
            FindManyArgs::new(),
            &OperationOptions::new().timeout(Duration::from_millis(20)),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);

    // the configured one-second default is long enough
    let page = orders.find_many(FindManyArgs::new()).await?;
    assert!(page.items.is_empty());
    Ok(())
}
