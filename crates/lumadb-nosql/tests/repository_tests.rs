//! Entity repository tests
//!
//! Every behavior that must hold on both backends runs against a DynamoDB
//! and a Cosmos fixture.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use lumadb_common::WritePolicy;
use lumadb_nosql::cosmos::{ContainerRef, CosmosAdapter};
use lumadb_nosql::core::validate_identifier;
use lumadb_nosql::dynamodb::{DynamoAdapter, TableRef};
use lumadb_nosql::entity::{Clock, EntityConfig, EntityRepository, FindManyArgs, OperationOptions};
use lumadb_nosql::memory::{MemoryCosmosClient, MemoryDynamoClient};
use lumadb_nosql::{Document, ErrorKind, FieldFilter, SelectSpec, WhereClause};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct User {
    id: String,
    first_name: String,
    age: Option<i64>,
    created_at: Option<String>,
    updated_at: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NewUser<'a> {
    first_name: &'a str,
}

/// One second later on every call
struct StepClock(AtomicI64);

impl StepClock {
    fn new() -> Arc<Self> {
        Arc::new(Self(AtomicI64::new(0)))
    }
}

impl Clock for StepClock {
    fn now(&self) -> DateTime<Utc> {
        let step = self.0.fetch_add(1, Ordering::SeqCst);
        Utc.timestamp_opt(1_700_000_000 + step, 0).unwrap()
    }
}

/// A repository and the request counter of the client behind it
struct Fixture<E = Document> {
    name: &'static str,
    repo: EntityRepository<E>,
    calls: Box<dyn Fn() -> usize>,
}

fn user_documents(count: usize) -> Vec<Document> {
    (1..=count)
        .map(|i| {
            json!({"id": format!("u{:02}", i), "firstName": format!("User {}", i), "age": 20 + i})
                .as_object()
                .cloned()
                .unwrap()
        })
        .collect()
}

fn dynamo_fixture<E>(config: EntityConfig, seed: Vec<Document>, latency: Option<Duration>) -> Fixture<E>
where
    E: serde::de::DeserializeOwned,
{
    let mut client = MemoryDynamoClient::new().with_table("users", "id", None);
    if let Some(latency) = latency {
        client = client.with_latency(latency);
    }
    let client = Arc::new(client);
    client.seed("users", seed).unwrap();

    let adapter = Arc::new(DynamoAdapter::new(client.clone(), TableRef::new("users", "id")));
    Fixture {
        name: "dynamodb",
        repo: EntityRepository::new(config, adapter),
        calls: Box::new(move || client.call_count()),
    }
}

fn cosmos_fixture<E>(config: EntityConfig, seed: Vec<Document>, latency: Option<Duration>) -> Fixture<E>
where
    E: serde::de::DeserializeOwned,
{
    let mut client = MemoryCosmosClient::new().with_container("app", "users", "id");
    if let Some(latency) = latency {
        client = client.with_latency(latency);
    }
    let client = Arc::new(client);
    client.seed("app", "users", seed).unwrap();

    let adapter = Arc::new(CosmosAdapter::new(client.clone(), ContainerRef::new("app", "users")));
    Fixture {
        name: "cosmos",
        repo: EntityRepository::new(config, adapter),
        calls: Box::new(move || client.call_count()),
    }
}

fn fixtures<E: serde::de::DeserializeOwned>(config: EntityConfig, seed: Vec<Document>) -> Vec<Fixture<E>> {
    vec![
        dynamo_fixture(config.clone(), seed.clone(), None),
        cosmos_fixture(config, seed, None),
    ]
}

fn slow_fixtures(config: EntityConfig) -> Vec<Fixture> {
    let latency = Some(Duration::from_millis(300));
    vec![
        dynamo_fixture(config.clone(), user_documents(3), latency),
        cosmos_fixture(config, user_documents(3), latency),
    ]
}

// ===== findMany =====

mod find_many {
    use super::*;

    #[tokio::test]
    async fn test_take_ten_of_twenty_five() {
        for fixture in fixtures::<User>(EntityConfig::new("users"), user_documents(25)) {
            let page = fixture
                .repo
                .find_many(FindManyArgs::new().take(10))
                .await
                .unwrap();
            assert_eq!(page.items.len(), 10, "{}", fixture.name);
            assert!(page.next_cursor.is_some(), "{}", fixture.name);
        }
    }

    #[tokio::test]
    async fn test_cursor_walks_every_record_once() {
        for fixture in fixtures::<User>(EntityConfig::new("users"), user_documents(25)) {
            let mut cursor: Option<String> = None;
            let mut seen = Vec::new();
            let mut pages = 0;

            loop {
                let mut args = FindManyArgs::new().take(10);
                if let Some(cursor) = cursor.take() {
                    args = args.cursor(cursor);
                }
                let page = fixture.repo.find_many(args).await.unwrap();
                pages += 1;
                seen.extend(page.items.into_iter().map(|user| user.id));
                match page.next_cursor {
                    Some(next) => cursor = Some(next),
                    None => break,
                }
            }

            assert_eq!(pages, 3, "{}", fixture.name);
            let expected: Vec<String> = (1..=25).map(|i| format!("u{:02}", i)).collect();
            assert_eq!(seen, expected, "{}", fixture.name);
        }
    }

    #[tokio::test]
    async fn test_dynamodb_filtered_pages_can_come_back_short() {
        let fixture = dynamo_fixture::<User>(EntityConfig::new("users"), user_documents(25), None);
        let filter = WhereClause::new().field("age", FieldFilter::new().gt(30));

        // `Limit` counts evaluated items: u01..u10 are read and none matches
        let first = fixture
            .repo
            .find_many(FindManyArgs::new().filter(filter.clone()).take(10))
            .await
            .unwrap();
        assert!(first.items.is_empty());
        let cursor = first.next_cursor.expect("short page still carries a cursor");

        let second = fixture
            .repo
            .find_many(FindManyArgs::new().filter(filter.clone()).take(10).cursor(cursor))
            .await
            .unwrap();
        let ids: Vec<String> = second.items.into_iter().map(|user| user.id).collect();
        let expected: Vec<String> = (11..=20).map(|i| format!("u{:02}", i)).collect();
        assert_eq!(ids, expected);

        let third = fixture
            .repo
            .find_many(
                FindManyArgs::new()
                    .filter(filter)
                    .take(10)
                    .cursor(second.next_cursor.unwrap()),
            )
            .await
            .unwrap();
        assert_eq!(third.items.len(), 5);
        assert!(third.next_cursor.is_none());
        assert_eq!((fixture.calls)(), 3);
    }

    #[tokio::test]
    async fn test_cosmos_filtered_pages_are_full() {
        let fixture = cosmos_fixture::<User>(EntityConfig::new("users"), user_documents(25), None);
        let page = fixture
            .repo
            .find_many(
                FindManyArgs::new()
                    .filter(WhereClause::new().field("age", FieldFilter::new().gt(30)))
                    .take(10),
            )
            .await
            .unwrap();

        assert_eq!(page.items.len(), 10);
        assert_eq!(page.items[0].id, "u11");
        assert!(page.next_cursor.is_some());
    }

    #[tokio::test]
    async fn test_default_page_size() {
        for fixture in fixtures::<User>(EntityConfig::new("users"), user_documents(120)) {
            let page = fixture.repo.find_many(FindManyArgs::new()).await.unwrap();
            assert_eq!(page.items.len(), 100, "{}", fixture.name);
        }
    }

    #[tokio::test]
    async fn test_invalid_take_makes_no_call() {
        for fixture in fixtures::<User>(EntityConfig::new("users"), user_documents(3)) {
            for take in [0, -1] {
                let err = fixture
                    .repo
                    .find_many(FindManyArgs::new().take(take))
                    .await
                    .unwrap_err();
                assert_eq!(err.kind(), ErrorKind::InvalidArgument, "{}", fixture.name);
            }
            assert_eq!((fixture.calls)(), 0, "{}", fixture.name);
        }
    }

    #[tokio::test]
    async fn test_invalid_cursor() {
        for fixture in fixtures::<User>(EntityConfig::new("users"), user_documents(3)) {
            let err = fixture
                .repo
                .find_many(FindManyArgs::new().cursor("not a cursor!"))
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidCursor, "{}", fixture.name);
            assert_eq!((fixture.calls)(), 0, "{}", fixture.name);
        }
    }

    #[tokio::test]
    async fn test_filter_and_projection() {
        for fixture in fixtures::<Document>(EntityConfig::new("users"), user_documents(10)) {
            let page = fixture
                .repo
                .find_many(
                    FindManyArgs::new()
                        .filter(WhereClause::new().field("age", FieldFilter::new().gt(27)))
                        .select(SelectSpec::fields(["age", "id"])),
                )
                .await
                .unwrap();

            let items: Vec<JsonValue> = page.items.into_iter().map(JsonValue::Object).collect();
            assert_eq!(
                JsonValue::Array(items),
                json!([
                    {"age": 28, "id": "u08"},
                    {"age": 29, "id": "u09"},
                    {"age": 30, "id": "u10"}
                ]),
                "{}",
                fixture.name
            );
        }
    }

    #[tokio::test]
    async fn test_from_json_arguments() {
        for fixture in fixtures::<Document>(EntityConfig::new("users"), user_documents(10)) {
            let args = FindManyArgs::from_json(&json!({
                "where": {"firstName": {"endsWith": "7"}, "age": {"lte": 30}},
                "take": 20,
                "select": {"firstName": true, "age": false}
            }))
            .unwrap();

            let page = fixture.repo.find_many(args).await.unwrap();
            let items: Vec<JsonValue> = page.items.into_iter().map(JsonValue::Object).collect();
            assert_eq!(items, vec![json!({"firstName": "User 7"})], "{}", fixture.name);
        }
    }

    #[tokio::test]
    async fn test_unknown_operator() {
        for fixture in fixtures::<Document>(EntityConfig::new("users"), user_documents(3)) {
            let err = FindManyArgs::from_json(&json!({"where": {"age": {"between": [1, 2]}}}))
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::UnsupportedOperator);

            let args = FindManyArgs::new().filter(
                WhereClause::new().field("active", FieldFilter::new().equals(true).contains("x")),
            );
            let err = fixture.repo.find_many(args).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::UnsupportedOperator, "{}", fixture.name);
            assert_eq!((fixture.calls)(), 0, "{}", fixture.name);
        }
    }
}

// ===== findOne =====

mod find_one {
    use super::*;

    #[tokio::test]
    async fn test_found_and_projected() {
        for fixture in fixtures::<Document>(EntityConfig::new("users"), user_documents(3)) {
            let user = fixture
                .repo
                .find_one("u02", &SelectSpec::fields(["firstName"]))
                .await
                .unwrap();
            assert_eq!(JsonValue::Object(user), json!({"firstName": "User 2"}), "{}", fixture.name);
        }
    }

    #[tokio::test]
    async fn test_id_with_space_makes_no_call() {
        for fixture in fixtures::<User>(EntityConfig::new("users"), user_documents(3)) {
            let err = fixture
                .repo
                .find_one("u 02", &SelectSpec::all())
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidArgument, "{}", fixture.name);
            assert_eq!((fixture.calls)(), 0, "{}", fixture.name);
        }
    }

    #[tokio::test]
    async fn test_missing() {
        for fixture in fixtures::<User>(EntityConfig::new("users"), user_documents(3)) {
            let err = fixture
                .repo
                .find_one("u99", &SelectSpec::all())
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::NotFound, "{}", fixture.name);
        }
    }

    #[tokio::test]
    async fn test_record_that_does_not_fit_type() {
        let seed = vec![json!({"id": "bad", "firstName": 42}).as_object().cloned().unwrap()];
        for fixture in fixtures::<User>(EntityConfig::new("users"), seed) {
            let err = fixture
                .repo
                .find_one("bad", &SelectSpec::all())
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::BackendContractViolation, "{}", fixture.name);
        }
    }
}

// ===== create / update / delete =====

mod writes {
    use super::*;

    #[tokio::test]
    async fn test_create_generates_id_and_timestamps() {
        for fixture in fixtures::<User>(EntityConfig::new("users"), Vec::new()) {
            let user = fixture
                .repo
                .create(&NewUser { first_name: "Bob" })
                .await
                .unwrap();

            assert!(!user.id.is_empty());
            assert!(validate_identifier(&user.id).is_ok());
            assert!(user.created_at.is_some());
            assert_eq!(user.created_at, user.updated_at, "{}", fixture.name);

            let stored = fixture.repo.find_one(&user.id, &SelectSpec::all()).await.unwrap();
            assert_eq!(stored, user, "{}", fixture.name);
        }
    }

    #[tokio::test]
    async fn test_create_keeps_caller_id() {
        for fixture in fixtures::<User>(EntityConfig::new("users"), Vec::new()) {
            let user = fixture
                .repo
                .create(&json!({"id": "chosen", "firstName": "Ann"}))
                .await
                .unwrap();
            assert_eq!(user.id, "chosen", "{}", fixture.name);

            let err = fixture
                .repo
                .create(&json!({"id": "chosen", "firstName": "Again"}))
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::AlreadyExists, "{}", fixture.name);

            let err = fixture
                .repo
                .create(&json!({"id": "has space", "firstName": "X"}))
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidArgument, "{}", fixture.name);
        }
    }

    #[tokio::test]
    async fn test_create_rejects_bad_payloads() {
        for fixture in fixtures::<Document>(EntityConfig::new("users"), Vec::new()) {
            for payload in [json!({}), json!([1, 2]), json!("text"), JsonValue::Null] {
                let err = fixture.repo.create(&payload).await.unwrap_err();
                assert_eq!(err.kind(), ErrorKind::InvalidArgument, "{} {}", fixture.name, payload);
            }
            assert_eq!((fixture.calls)(), 0, "{}", fixture.name);
        }
    }

    #[tokio::test]
    async fn test_auto_fields_disabled() {
        let config = EntityConfig::new("users").with_auto_fields(false, false);
        for fixture in fixtures::<Document>(config, Vec::new()) {
            let err = fixture
                .repo
                .create(&json!({"firstName": "NoId"}))
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidArgument, "{}", fixture.name);

            let created = fixture
                .repo
                .create(&json!({"id": "plain", "firstName": "Plain"}))
                .await
                .unwrap();
            assert_eq!(
                JsonValue::Object(created),
                json!({"id": "plain", "firstName": "Plain"}),
                "{}",
                fixture.name
            );
        }
    }

    #[tokio::test]
    async fn test_update_stamps_and_keeps_created_at() {
        for mut fixture in fixtures::<User>(EntityConfig::new("users"), Vec::new()) {
            fixture.repo = fixture.repo.clone().with_clock(StepClock::new());
            let created = fixture
                .repo
                .create(&json!({"id": "u1", "firstName": "Amy", "age": 30}))
                .await
                .unwrap();

            let updated = fixture
                .repo
                .update("u1", &json!({"age": 31, "createdAt": "1999-01-01T00:00:00.000Z"}))
                .await
                .unwrap();

            assert_eq!(updated.age, Some(31), "{}", fixture.name);
            assert_eq!(updated.first_name, "Amy", "{}", fixture.name);
            assert_eq!(updated.created_at, created.created_at, "{}", fixture.name);
            assert_eq!(
                updated.updated_at.as_deref(),
                Some("2023-11-14T22:13:21.000Z"),
                "{}",
                fixture.name
            );
        }
    }

    #[tokio::test]
    async fn test_update_validation() {
        for fixture in fixtures::<User>(EntityConfig::new("users"), user_documents(2)) {
            let err = fixture.repo.update("u01", &json!({})).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidArgument, "{}", fixture.name);

            let err = fixture
                .repo
                .update("u01", &json!({"id": "u02"}))
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidArgument, "{}", fixture.name);

            let err = fixture
                .repo
                .update("u 01", &json!({"age": 1}))
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidArgument, "{}", fixture.name);
            assert_eq!((fixture.calls)(), 0, "{}", fixture.name);

            let err = fixture
                .repo
                .update("u99", &json!({"age": 1}))
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::NotFound, "{}", fixture.name);
        }
    }

    #[tokio::test]
    async fn test_unchecked_update_upserts() {
        let config = EntityConfig::new("users").with_write_policy(WritePolicy::Unchecked);
        for fixture in fixtures::<Document>(config, Vec::new()) {
            let created = fixture
                .repo
                .update("fresh", &json!({"firstName": "New"}))
                .await
                .unwrap();
            assert_eq!(created["id"], json!("fresh"), "{}", fixture.name);
            assert_eq!(created["firstName"], json!("New"), "{}", fixture.name);
        }
    }

    #[tokio::test]
    async fn test_delete() {
        for fixture in fixtures::<User>(EntityConfig::new("users"), user_documents(2)) {
            fixture.repo.delete("u01").await.unwrap();

            let err = fixture
                .repo
                .find_one("u01", &SelectSpec::all())
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::NotFound, "{}", fixture.name);

            let err = fixture.repo.delete("u01").await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::NotFound, "{}", fixture.name);
        }

        let config = EntityConfig::new("users").with_write_policy(WritePolicy::Unchecked);
        for fixture in fixtures::<User>(config, Vec::new()) {
            fixture.repo.delete("absent").await.unwrap();
        }
    }
}

// ===== Timeouts and cancellation =====

mod controls {
    use super::*;

    #[tokio::test]
    async fn test_operation_timeout() {
        for fixture in slow_fixtures(EntityConfig::new("users")) {
            let options = OperationOptions::new().timeout(Duration::from_millis(20));
            let err = fixture
                .repo
                .find_one_with("u01", &SelectSpec::all(), &options)
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Timeout, "{}", fixture.name);
        }
    }

    #[tokio::test]
    async fn test_configured_default_timeout() {
        let config = EntityConfig::new("users").with_default_timeout(Duration::from_millis(20));
        for fixture in slow_fixtures(config) {
            let err = fixture
                .repo
                .find_many(FindManyArgs::new())
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Timeout, "{}", fixture.name);
        }
    }

    #[tokio::test]
    async fn test_cancellation_in_flight() {
        for fixture in slow_fixtures(EntityConfig::new("users")) {
            let token = CancellationToken::new();
            let canceller = token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                canceller.cancel();
            });

            let options = OperationOptions::new().cancellation(token);
            let err = fixture
                .repo
                .delete_with("u01", &options)
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Cancelled, "{}", fixture.name);
        }
    }

    #[tokio::test]
    async fn test_generous_timeout_succeeds() {
        for fixture in slow_fixtures(EntityConfig::new("users")) {
            let options = OperationOptions::new().timeout(Duration::from_secs(5));
            let user = fixture
                .repo
                .find_one_with("u03", &SelectSpec::all(), &options)
                .await
                .unwrap();
            assert_eq!(user["age"], json!(23), "{}", fixture.name);
        }
    }
}
