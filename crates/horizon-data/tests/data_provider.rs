//! Integration tests for data providers: page fetching, request coalescing
//! and the in-memory provider.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::FutureExt;
use horizon_data::prelude::*;
use serde_json::{Value as JsonValue, json};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn articles() -> Collection {
    let schema = ModelSchema::builder("Article")
        .attributes(["id", "title"])
        .primary_key(["id"])
        .build()
        .unwrap();
    Collection::new(CollectionConfig::with_schema(schema))
}

fn page_of(params: &FetchParams, total: usize) -> JsonValue {
    let end = params.limit().map_or(total, |l| (params.offset() + l).min(total));
    let models: Vec<JsonValue> = (params.offset()..end)
        .map(|i| json!({"id": format!("id{i}"), "title": format!("test{i}")}))
        .collect();
    json!({"totalCount": total, "models": models})
}

#[tokio::test]
async fn test_fetch_pages() {
    init_tracing();
    let collection = articles();
    let provider = collection
        .create_data_provider(DataProviderConfig::default().with_pagination(Some(Pagination::with_page_size(10))))
        .with_query(|params| {
            let page = page_of(&params, 14);
            async move { Ok(page) }.boxed()
        });

    assert!(!provider.is_fetched());
    let response = provider.fetch(json!({}), false).await.unwrap().unwrap();
    assert_eq!(response.total_count, 14);
    assert_eq!(response.models.len(), 10);
    assert_eq!(collection.len(), 10);
    assert!(provider.is_fetched());
    assert_eq!(provider.total_count(), 14);

    provider.set_page(1);
    assert!(!provider.is_fetched());
    provider.fetch(json!({}), false).await.unwrap();
    assert!(provider.is_fetched());
    assert_eq!(collection.len(), 14);
    assert_eq!(
        collection.model_at(13).and_then(|m| m.get_json("title")),
        Some(json!("test13"))
    );
}

#[tokio::test]
async fn test_concurrent_fetches_share_one_query() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let provider = articles()
        .create_data_provider(DataProviderConfig::default())
        .with_query(move |params| {
            counter.fetch_add(1, Ordering::SeqCst);
            let page = page_of(&params, 3);
            async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok(page)
            }
            .boxed()
        });

    let (first, second) = tokio::join!(provider.fetch(json!({}), false), provider.fetch(json!({}), false));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(first.unwrap(), second.unwrap());
    assert_eq!(provider.len(), 3);
    assert!(!provider.is_fetching());
}

#[tokio::test]
async fn test_malformed_response_rejects_every_waiter() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let provider = articles()
        .create_data_provider(DataProviderConfig::default())
        .with_query(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok(json!({"totalCount": "x", "models": []}))
            }
            .boxed()
        });

    let (first, second) = tokio::join!(provider.fetch(json!({}), false), provider.fetch(json!({}), false));
    assert!(matches!(first, Err(Error::InvalidParam(_))));
    assert!(matches!(second, Err(Error::InvalidParam(_))));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(!provider.is_fetched());
    assert!(!provider.is_fetching());
    assert!(provider.is_empty());
}

#[tokio::test]
async fn test_dropped_fetch_interrupts_waiters() {
    let provider = articles()
        .create_data_provider(DataProviderConfig::default())
        .with_query(|_| futures_util::future::pending().boxed());

    let mut first = Box::pin(provider.fetch(json!({}), false));
    assert!(futures_util::poll!(first.as_mut()).is_pending());
    assert!(provider.is_fetching());

    let mut second = Box::pin(provider.fetch(json!({}), false));
    assert!(futures_util::poll!(second.as_mut()).is_pending());

    drop(first);
    assert_eq!(second.await, Err(Error::FetchInterrupted));
    assert!(!provider.is_fetching());
    assert!(!provider.is_fetched());
}

#[tokio::test]
async fn test_set_mode_keeps_only_the_latest_page() {
    let provider = articles()
        .create_data_provider(
            DataProviderConfig::default()
                .with_fetch_mode(FetchMode::Set)
                .with_pagination(Some(Pagination::with_page_size(2))),
        )
        .with_query(|params| {
            let page = page_of(&params, 5);
            async move { Ok(page) }.boxed()
        });

    provider.fetch(json!({}), false).await.unwrap();
    provider.set_page(2);
    provider.fetch(json!({}), false).await.unwrap();
    assert_eq!(provider.pluck("id"), vec![json!("id4")]);
    assert_eq!(provider.page_count(), 3);
}

#[tokio::test]
async fn test_sort_is_forwarded_to_the_query() {
    let seen = Arc::new(parking_lot::Mutex::new(None));
    let sink = seen.clone();
    let provider = articles()
        .create_data_provider(DataProviderConfig::default().with_sort(Sort::desc("title")))
        .with_query(move |params| {
            *sink.lock() = params.sort.clone();
            async move { Ok(json!({"totalCount": 0, "models": []})) }.boxed()
        });

    provider.fetch(json!({"search": "x"}), false).await.unwrap();
    assert_eq!(*seen.lock(), Some(Sort::desc("title")));

    provider.set_sort_order(Some(Sort::asc("id")));
    assert!(!provider.is_fetched());
    provider.fetch(json!({}), false).await.unwrap();
    assert_eq!(*seen.lock(), Some(Sort::asc("id")));
}

#[tokio::test]
async fn test_array_provider_serves_pages() {
    let all: Vec<JsonValue> = (0..5).map(|i| json!({"id": i, "title": format!("t{i}")})).collect();
    let provider = ArrayDataProvider::new(
        articles(),
        all,
        DataProviderConfig::default()
            .with_fetch_mode(FetchMode::Reset)
            .with_pagination(Some(Pagination::with_page_size(2)))
            .with_sort(Sort::desc("id")),
    );

    provider.fetch(json!({}), false).await.unwrap();
    assert_eq!(provider.pluck("id"), vec![json!(4), json!(3)]);
    assert_eq!(provider.total_count(), 5);
    assert_eq!(provider.page_count(), 3);
}
