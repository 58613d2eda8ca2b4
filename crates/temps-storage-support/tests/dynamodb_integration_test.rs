//! DynamoDB repository tests against DynamoDB Local
//!
//! Requires Docker. Run with: cargo test --test dynamodb_integration_test -- --ignored

use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use temps_storage::{
    BackendManager, BackendsConfig, DbInfo, Filter, GsiCapacity, ListOptions, Repository,
    RepositoryDefinition, RepositoryExt, SortDirection,
};
use temps_storage_dynamodb::CLIENT_CONTEXT_KEY;
use temps_storage_support::new_backend_support;
use testcontainers::{
    core::{ContainerPort, WaitFor},
    runners::AsyncRunner,
    ContainerAsync, GenericImage,
};

const DYNAMODB_PORT: u16 = 8000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct User {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    email: String,
    name: String,
    age: i64,
}

impl User {
    fn new(email: &str, name: &str, age: i64) -> Self {
        Self {
            id: None,
            email: email.to_string(),
            name: name.to_string(),
            age,
        }
    }
}

async fn start_dynamodb() -> (ContainerAsync<GenericImage>, BackendManager) {
    let container = GenericImage::new("amazon/dynamodb-local", "latest")
        .with_exposed_port(ContainerPort::Tcp(DYNAMODB_PORT))
        .with_wait_for(WaitFor::message_on_stdout("Initializing DynamoDB Local"))
        .start()
        .await
        .expect("Failed to start DynamoDB Local container");

    let port = container
        .get_host_port_ipv4(DYNAMODB_PORT)
        .await
        .expect("Failed to get DynamoDB Local port");

    let config = DbInfo::default()
        .with_aws_region("us-east-1")
        .with_aws_endpoint(format!("http://localhost:{}", port))
        .with_aws_keys("local", "local");
    let manager = new_backend_support(
        BackendsConfig::default()
            .with_backend("dynamodb", &config)
            .unwrap(),
    )
    .await
    .unwrap();

    (container, manager)
}

async fn users(manager: &BackendManager) -> Arc<dyn Repository> {
    manager
        .get_backend("dynamodb")
        .await
        .unwrap()
        .define_repository(
            "users",
            &RepositoryDefinition::new("users").with_hash_key("email"),
        )
        .await
        .unwrap()
}

#[tokio::test]
#[ignore] // Run with: cargo test --test dynamodb_integration_test -- --ignored
async fn test_create_and_read_back() {
    let (_container, manager) = start_dynamodb().await;
    let users = users(&manager).await;

    let created = users
        .save_as(&User::new("jane@example.com", "Jane", 31), None)
        .await
        .unwrap();
    assert!(created.id.is_some());

    let found: User = users
        .get_one_as(&Filter::new().match_value("email", "jane@example.com"))
        .await
        .unwrap();
    assert_eq!(found, created);

    let err = users
        .save_as(&User::new("jane@example.com", "Impostor", 40), None)
        .await
        .unwrap_err();
    assert!(err.is_already_exists(), "unexpected error: {}", err);

    let mut keyless = serde_json::Map::new();
    keyless.insert("name".to_string(), json!("Nobody"));
    let err = users.save(keyless, None).await.unwrap_err();
    assert!(err.is_invalid_input());

    manager.shutdown().await;
}

#[tokio::test]
#[ignore] // Run with: cargo test --test dynamodb_integration_test -- --ignored
async fn test_update_and_delete() {
    let (_container, manager) = start_dynamodb().await;
    let users = users(&manager).await;

    users
        .save_as(&User::new("bob@example.com", "Bob", 25), None)
        .await
        .unwrap();

    let filter = Filter::new().match_value("email", "bob@example.com");
    let mut patch = serde_json::Map::new();
    patch.insert("name".to_string(), json!("Robert"));
    // Key attributes are never rewritten
    patch.insert("email".to_string(), json!("robert@example.com"));

    let updated = users.save(patch.clone(), Some(&filter)).await.unwrap();
    assert_eq!(updated["name"], json!("Robert"));
    assert_eq!(updated["email"], json!("bob@example.com"));
    assert_eq!(updated["age"], json!(25));

    let missing = Filter::new().match_value("email", "nobody@example.com");
    assert!(users
        .save(patch, Some(&missing))
        .await
        .unwrap_err()
        .is_not_found());

    users.delete_one(&filter).await.unwrap();
    assert!(users.get_one(&filter).await.unwrap_err().is_not_found());
    assert!(users.delete_one(&filter).await.unwrap_err().is_not_found());

    manager.shutdown().await;
}

#[tokio::test]
#[ignore] // Run with: cargo test --test dynamodb_integration_test -- --ignored
async fn test_patterns_ordering_and_delete_all() {
    let (_container, manager) = start_dynamodb().await;
    let users = users(&manager).await;

    for (email, name, age) in [
        ("ann@example.com", "Ann", 20),
        ("andy@example.com", "Andy", 35),
        ("bea@corp.test", "Bea", 28),
        ("carl@example.com", "Carl", 42),
    ] {
        users.save_as(&User::new(email, name, age), None).await.unwrap();
    }

    let example = Filter::new().match_pattern("email", "%@example.com");
    let found: Vec<User> = users
        .get_all_as(
            &example,
            &ListOptions::new().order_by("age", SortDirection::Descending),
        )
        .await
        .unwrap();
    let names: Vec<&str> = found.iter().map(|u| u.name.as_str()).collect();
    assert_eq!(names, vec!["Carl", "Andy", "Ann"]);

    let prefixed: Vec<User> = users
        .get_all_as(
            &Filter::new().match_pattern("email", "an%"),
            &ListOptions::new().order_by("name", SortDirection::Ascending),
        )
        .await
        .unwrap();
    let names: Vec<&str> = prefixed.iter().map(|u| u.name.as_str()).collect();
    assert_eq!(names, vec!["Andy", "Ann"]);

    let page: Vec<User> = users
        .get_all_as(
            &Filter::new(),
            &ListOptions::new()
                .order_by("age", SortDirection::Ascending)
                .offset(1)
                .limit(2),
        )
        .await
        .unwrap();
    let names: Vec<&str> = page.iter().map(|u| u.name.as_str()).collect();
    assert_eq!(names, vec!["Bea", "Andy"]);

    // Bulk deletes must be scoped by an exact hash key
    let err = users
        .delete_all(&Filter::new().match_value("name", "Ann"))
        .await
        .unwrap_err();
    assert!(err.is_invalid_input());
    let err = users.delete_all(&example).await.unwrap_err();
    assert!(err.is_invalid_input());

    for email in ["ann@example.com", "andy@example.com", "carl@example.com"] {
        users
            .delete_all(&Filter::new().match_value("email", email))
            .await
            .unwrap();
    }
    let remaining: Vec<User> = users
        .get_all_as(&Filter::new(), &ListOptions::new())
        .await
        .unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].name, "Bea");

    manager.shutdown().await;
}

#[tokio::test]
#[ignore] // Run with: cargo test --test dynamodb_integration_test -- --ignored
async fn test_provisioning_with_range_key_gsi_and_ttl() {
    let (_container, manager) = start_dynamodb().await;
    let backend = manager.get_backend("dynamodb").await.unwrap();

    let definition = RepositoryDefinition::new("sessions")
        .with_hash_key("owner")
        .with_range_key("started_at")
        .with_range_key_type("N")
        .with_capacity(5, 5)
        .with_gsi(
            "started_at",
            GsiCapacity {
                read_capacity: 1,
                write_capacity: 1,
            },
        )
        .with_ttl("expires_at", 3600);

    let sessions = backend
        .define_repository("sessions", &definition)
        .await
        .unwrap();

    for started_at in [100, 200] {
        let mut record = serde_json::Map::new();
        record.insert("owner".to_string(), json!("jane"));
        record.insert("started_at".to_string(), json!(started_at));
        let created = sessions.save(record, None).await.unwrap();
        assert!(created["expires_at"].as_i64().unwrap() > unix_now());
    }

    let all = sessions
        .get_all(
            &Filter::new().match_value("owner", "jane"),
            &ListOptions::new().order_by("started_at", SortDirection::Descending),
        )
        .await
        .unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0]["started_at"], json!(200));

    sessions
        .delete_all(&Filter::new().match_value("owner", "jane"))
        .await
        .unwrap();
    assert!(sessions
        .get_one(&Filter::new().match_value("owner", "jane"))
        .await
        .unwrap_err()
        .is_not_found());

    // Provisioning an existing table is a no-op
    manager.shutdown().await;
    manager
        .get_backend("dynamodb")
        .await
        .unwrap()
        .define_repository("sessions", &definition)
        .await
        .unwrap();

    manager.shutdown().await;
}

#[tokio::test]
#[ignore] // Run with: cargo test --test dynamodb_integration_test -- --ignored
async fn test_expired_records_are_hidden() {
    let (_container, manager) = start_dynamodb().await;
    let backend = manager.get_backend("dynamodb").await.unwrap();

    let tokens = backend
        .define_repository(
            "tokens",
            &RepositoryDefinition::new("tokens")
                .with_hash_key("token")
                .with_ttl("expires_at", 3600),
        )
        .await
        .unwrap();

    let mut live = serde_json::Map::new();
    live.insert("token".to_string(), json!("live"));
    tokens.save(live, None).await.unwrap();

    // Expired an hour ago; native TTL deletes expired items only eventually
    let client = backend
        .get_from_context::<Client>(CLIENT_CONTEXT_KEY)
        .await
        .unwrap();
    client
        .put_item()
        .table_name("tokens")
        .item("token", AttributeValue::S("stale".to_string()))
        .item("expires_at", AttributeValue::N((unix_now() - 3600).to_string()))
        .send()
        .await
        .unwrap();

    let expired = Filter::new().match_value("token", "stale");
    assert!(tokens.get_one(&expired).await.unwrap_err().is_not_found());
    assert!(tokens.delete_one(&expired).await.unwrap_err().is_not_found());

    let visible = tokens
        .get_all(&Filter::new(), &ListOptions::new())
        .await
        .unwrap();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0]["token"], json!("live"));

    manager.shutdown().await;
}

fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}
