//! PostgreSQL outbox store integration tests.
//!
//! These tests share one PostgreSQL container. Run with:
//!
//! ```bash
//! cargo test -p outbox --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;

use outbox::{OutboxEvent, OutboxStore, PostgresOutboxStore};
use serial_test::serial;
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests.
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();
            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_outbox_table.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

async fn get_test_store() -> PostgresOutboxStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE outbox_events")
        .execute(&pool)
        .await
        .unwrap();

    PostgresOutboxStore::new(pool)
}

fn sample_event(aggregate_id: &str) -> OutboxEvent {
    OutboxEvent::new(
        "order.created",
        "Order",
        aggregate_id,
        &serde_json::json!({ "net_cents": 1500 }),
    )
    .unwrap()
}

#[tokio::test]
#[serial]
async fn append_and_fetch_roundtrip() {
    let store = get_test_store().await;

    let event = sample_event("order-1");
    let id = event.id;
    store.append(event).await.unwrap();

    let batch = store.fetch_unprocessed(10, 3).await.unwrap();
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].id, id);
    assert_eq!(batch[0].event_type, "order.created");
    assert_eq!(batch[0].aggregate_id, "order-1");
    assert!(!batch[0].processed);
}

#[tokio::test]
#[serial]
async fn mark_processed_is_persistent() {
    let store = get_test_store().await;

    let event = sample_event("order-2");
    let id = event.id;
    store.append(event).await.unwrap();
    store.mark_processed(id).await.unwrap();

    assert!(store.fetch_unprocessed(10, 3).await.unwrap().is_empty());
    let stored = store.get(id).await.unwrap().unwrap();
    assert!(stored.processed);
    assert!(stored.processed_at.is_some());
}

#[tokio::test]
#[serial]
async fn failures_accumulate_into_dead_letters() {
    let store = get_test_store().await;

    let event = sample_event("order-3");
    let id = event.id;
    store.append(event).await.unwrap();

    for _ in 0..3 {
        store.record_failure(id, "downstream 503").await.unwrap();
    }

    assert!(store.fetch_unprocessed(10, 3).await.unwrap().is_empty());
    assert_eq!(store.dead_letter_count(3).await.unwrap(), 1);

    let stored = store.get(id).await.unwrap().unwrap();
    assert_eq!(stored.retry_count, 3);
    assert_eq!(stored.error_message.as_deref(), Some("downstream 503"));
}

#[tokio::test]
#[serial]
async fn append_in_tx_rolls_back_with_the_business_change() {
    let store = get_test_store().await;

    let mut tx = store.pool().begin().await.unwrap();
    store
        .append_in_tx(&mut *tx, &sample_event("order-4"))
        .await
        .unwrap();
    tx.rollback().await.unwrap();

    // The event vanished along with the transaction it was part of.
    assert!(store.fetch_unprocessed(10, 3).await.unwrap().is_empty());

    let mut tx = store.pool().begin().await.unwrap();
    store
        .append_in_tx(&mut *tx, &sample_event("order-5"))
        .await
        .unwrap();
    tx.commit().await.unwrap();

    assert_eq!(store.fetch_unprocessed(10, 3).await.unwrap().len(), 1);
}

#[tokio::test]
#[serial]
async fn fetch_orders_by_creation_time() {
    let store = get_test_store().await;

    for i in 0..3 {
        store.append(sample_event(&format!("order-{i}"))).await.unwrap();
    }

    let batch = store.fetch_unprocessed(10, 3).await.unwrap();
    let ids: Vec<_> = batch.iter().map(|e| e.aggregate_id.clone()).collect();
    assert_eq!(ids, vec!["order-0", "order-1", "order-2"]);
}
