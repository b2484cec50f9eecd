//! Canonical store accessor tests
//!
//! Uniqueness-sensitive lookups, merge semantics and lazy index creation
//! against the in-memory backend.

use am_store::{
    canonical_indexes, AttributeStore, Backend, Client, Document, Filter, MemoryBackend,
    MergeMode, MergeOp, Modifier, Namespace, Projection, StoreError, UserId, ATTRIBUTES_COLLECTION,
};
use futures::TryStreamExt;
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use serde_json::{json, Value};
use std::sync::Arc;

fn doc(value: Value) -> Document {
    match value {
        Value::Object(map) => map,
        _ => panic!("not an object"),
    }
}

fn setup() -> (MemoryBackend, AttributeStore) {
    let backend = MemoryBackend::new();
    let client = Client::with_backend(Arc::new(backend.clone()));
    let store = AttributeStore::new(&client.database("am"));
    (backend, store)
}

fn ns() -> Namespace {
    Namespace::new("am", ATTRIBUTES_COLLECTION)
}

async fn seed(backend: &MemoryBackend, record: Value) {
    backend.insert_one(&ns(), doc(record)).await.unwrap();
}

#[tokio::test]
async fn test_lookup_missing_user() {
    let (_backend, store) = setup();
    let id = UserId::new();

    assert_eq!(store.lookup_by_id(&id).await.unwrap(), None);
    assert!(!store
        .exists_by_field("email", json!("a@example.com"))
        .await
        .unwrap());
}

#[tokio::test]
async fn test_lookup_single_record_unmodified() {
    let (backend, store) = setup();
    let id = UserId::new();
    let record = json!({
        "_id": id.to_hex(),
        "email": "a@example.com",
        "mobile": [{"mobile": "+46700000000", "verified": true}]
    });
    seed(&backend, record.clone()).await;

    assert_eq!(store.lookup_by_id(&id).await.unwrap(), Some(doc(record.clone())));
    assert_eq!(
        store
            .lookup_by_field("mobile.mobile", json!("+46700000000"))
            .await
            .unwrap(),
        Some(doc(record))
    );
    assert!(store
        .exists_by_field("email", json!("a@example.com"))
        .await
        .unwrap());
}

#[tokio::test]
async fn test_duplicate_verified_email_is_ambiguous() {
    let (backend, store) = setup();
    for _ in 0..2 {
        seed(
            &backend,
            json!({"_id": UserId::new().to_hex(), "email": "dup@example.com", "verified": true}),
        )
        .await;
    }

    let err = store
        .lookup_by_field("email", json!("dup@example.com"))
        .await
        .unwrap_err();
    assert!(err.is_ambiguous());
    assert!(matches!(err, StoreError::AmbiguousRecord { field, .. } if field == "email"));

    // Existence and bulk reads do not check uniqueness
    assert!(store
        .exists_by_field("email", json!("dup@example.com"))
        .await
        .unwrap());
    let all: Vec<Document> = store
        .query(&Filter::eq("email", "dup@example.com"), None)
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert_eq!(all.len(), 2);
}

#[tokio::test]
async fn test_require_distinguishes_missing() {
    let (_backend, store) = setup();
    let err = store.require_by_id(&UserId::new()).await.unwrap_err();
    assert!(matches!(err, StoreError::RecordNotFound { field, .. } if field == "_id"));
}

#[tokio::test]
async fn test_query_with_projection() {
    let (backend, store) = setup();
    let id = UserId::new();
    seed(
        &backend,
        json!({"_id": id.to_hex(), "email": "a@example.com", "eppn": "hubba-bubba"}),
    )
    .await;

    let docs: Vec<Document> = store
        .query(&Filter::new(), Some(Projection::include(["eppn"])))
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert_eq!(docs, vec![doc(json!({"_id": id.to_hex(), "eppn": "hubba-bubba"}))]);
}

#[tokio::test]
async fn test_partial_merges_compose() {
    let (backend, store) = setup();
    let id = UserId::new();
    seed(&backend, json!({"_id": id.to_hex(), "eppn": "hubba-bubba"})).await;

    let first = store
        .merge(&id, MergeOp::partial([Modifier::set("email", "a@example.com")]))
        .await
        .unwrap();
    assert_eq!(first.mode, MergeMode::Partial);
    assert!(first.matched && first.modified && !first.created);

    store
        .merge(&id, MergeOp::partial([Modifier::set("mobile", "+46700000000")]))
        .await
        .unwrap();

    assert_eq!(
        store.require_by_id(&id).await.unwrap(),
        doc(json!({
            "_id": id.to_hex(),
            "eppn": "hubba-bubba",
            "email": "a@example.com",
            "mobile": "+46700000000"
        }))
    );
}

#[tokio::test]
async fn test_partial_merge_never_creates() {
    let (backend, store) = setup();
    let id = UserId::new();

    let report = store
        .merge(&id, MergeOp::partial([Modifier::set("email", "a@example.com")]))
        .await
        .unwrap();
    assert!(!report.matched && !report.created);
    assert!(backend.snapshot(&ns()).is_empty());
}

#[tokio::test]
async fn test_partial_merge_is_atomic() {
    let (backend, store) = setup();
    let id = UserId::new();
    let record = json!({"_id": id.to_hex(), "email": "a@example.com", "count": "x"});
    seed(&backend, record.clone()).await;

    let err = store
        .merge(
            &id,
            MergeOp::partial([
                Modifier::set("email", "b@example.com"),
                Modifier::inc("count", 1),
            ]),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::TypeMismatch { .. }));
    assert_eq!(backend.snapshot(&ns()), vec![doc(record)]);
}

#[tokio::test]
async fn test_empty_partial_is_noop() {
    let (backend, store) = setup();
    let id = UserId::new();
    seed(&backend, json!({"_id": id.to_hex()})).await;

    let report = store.merge(&id, MergeOp::Partial(Vec::new())).await.unwrap();
    assert!(!report.modified);
    assert_eq!(backend.snapshot(&ns()), vec![doc(json!({"_id": id.to_hex()}))]);
}

#[tokio::test]
async fn test_replace_creates_then_overwrites() {
    let (backend, store) = setup();
    let id = UserId::new();

    let created = store
        .merge(&id, MergeOp::replace(doc(json!({"email": "a@example.com"}))))
        .await
        .unwrap();
    assert_eq!(created.mode, MergeMode::Replace);
    assert!(created.created);

    let replaced = store
        .merge(&id, MergeOp::replace(doc(json!({"mobile": "+46700000000"}))))
        .await
        .unwrap();
    assert!(replaced.matched && !replaced.created);

    assert_eq!(
        backend.snapshot(&ns()),
        vec![doc(json!({"_id": id.to_hex(), "mobile": "+46700000000"}))]
    );
}

#[tokio::test]
async fn test_uppercase_seeded_id_matches_its_job() {
    let (backend, store) = setup();
    let id = UserId::new();
    seed(&backend, json!({"_id": id.to_hex().to_uppercase(), "surname": "Smith"})).await;

    assert!(store.lookup_by_id(&id).await.unwrap().is_some());
    let report = store
        .merge(&id, MergeOp::replace(doc(json!({"email": "a@example.com"}))))
        .await
        .unwrap();
    assert!(report.matched && !report.created);

    assert_eq!(
        backend.snapshot(&ns()),
        vec![doc(json!({"_id": id.to_hex(), "email": "a@example.com"}))]
    );
}

#[tokio::test]
async fn test_replace_ignores_fetcher_supplied_id() {
    let (backend, store) = setup();
    let id = UserId::new();
    let other = UserId::new();

    store
        .merge(
            &id,
            MergeOp::replace(doc(json!({"_id": other.to_hex(), "email": "a@example.com"}))),
        )
        .await
        .unwrap();

    assert_eq!(
        backend.snapshot(&ns()),
        vec![doc(json!({"_id": id.to_hex(), "email": "a@example.com"}))]
    );
}

#[tokio::test]
async fn test_indexes_created_on_first_use() {
    let (backend, store) = setup();
    assert!(backend.list_indexes(&ns()).await.unwrap().is_empty());

    store.lookup_by_id(&UserId::new()).await.unwrap();
    assert_eq!(backend.list_indexes(&ns()).await.unwrap(), canonical_indexes());

    // Asserting again is harmless
    store.ensure_indexes().await.unwrap();
    assert_eq!(backend.list_indexes(&ns()).await.unwrap().len(), 3);
}

proptest! {
    #[test]
    fn prop_replace_is_idempotent(
        email in "[a-z]{1,8}@example\\.com",
        logins in 0i64..1000,
        verified in any::<bool>(),
    ) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let (backend, store) = setup();
            let id = UserId::new();
            let body = doc(json!({
                "email": email,
                "logins": logins,
                "mobile": [{"mobile": "+46700000000", "verified": verified}]
            }));

            store.merge(&id, MergeOp::replace(body.clone())).await.unwrap();
            let once = backend.snapshot(&ns());
            let second = store.merge(&id, MergeOp::replace(body)).await.unwrap();
            let twice = backend.snapshot(&ns());

            prop_assert!(!second.modified);
            prop_assert_eq!(once, twice);
            Ok(())
        })?;
    }
}
