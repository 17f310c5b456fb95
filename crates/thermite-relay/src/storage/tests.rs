//! Storage layer tests for the pipe table.

use super::db::RelayDatabase;
use super::store::{PipeStore, StoreError};
use thermite_core::db::unix_timestamp;

async fn test_db() -> RelayDatabase {
    RelayDatabase::open_in_memory().await.unwrap()
}

// === Pipe queries ===

#[tokio::test]
async fn add_and_get_pipe() {
    let db = test_db().await;
    let pipe = db
        .add_pipe("#rust", "#thermite-a1b2", "watching")
        .await
        .unwrap();

    assert_eq!(pipe.source, "#rust");
    assert_eq!(pipe.target, "#thermite-a1b2");
    assert_eq!(pipe.reason, "watching");
    assert!(pipe.created_at <= unix_timestamp());

    assert!(db.get_pipe("#python").await.unwrap().is_none());
}

#[tokio::test]
async fn duplicate_source_is_rejected() {
    let db = test_db().await;
    db.add_pipe("#rust", "#t1", "one").await.unwrap();

    assert!(db.add_pipe("#rust", "#t2", "two").await.is_err());
    assert_eq!(db.get_pipe("#rust").await.unwrap().unwrap().target, "#t1");
}

#[tokio::test]
async fn duplicate_target_is_rejected() {
    let db = test_db().await;
    db.add_pipe("#rust", "#t1", "one").await.unwrap();

    assert!(db.add_pipe("#go", "#t1", "two").await.is_err());
    assert!(db.get_pipe("#go").await.unwrap().is_none());
}

#[tokio::test]
async fn remove_pipe_reports_whether_it_existed() {
    let db = test_db().await;
    db.add_pipe("#rust", "#t1", "one").await.unwrap();

    assert!(db.remove_pipe("#rust").await.unwrap());
    assert!(!db.remove_pipe("#rust").await.unwrap());
    assert!(db.list_pipes().await.unwrap().is_empty());
}

#[tokio::test]
async fn list_pipes_is_ordered_by_source() {
    let db = test_db().await;
    db.add_pipe("#zig", "#t3", "z").await.unwrap();
    db.add_pipe("#ada", "#t1", "a").await.unwrap();
    db.add_pipe("#go", "#t2", "g").await.unwrap();

    let sources: Vec<String> = db
        .list_pipes()
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.source)
        .collect();
    assert_eq!(sources, vec!["#ada", "#go", "#zig"]);
}

// === PipeStore contract ===

#[tokio::test]
async fn store_round_trip() {
    let db = test_db().await;
    let store: &dyn PipeStore = &db;

    store.add("#rust", "#t1", "why not").await.unwrap();
    store.add("#go", "#t2", "because").await.unwrap();
    assert_eq!(
        store.list().await.unwrap(),
        vec![
            ("#go".to_string(), "#t2".to_string()),
            ("#rust".to_string(), "#t1".to_string()),
        ]
    );

    store.remove("#rust").await.unwrap();
    assert_eq!(store.list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn store_maps_constraint_failures_to_unavailable() {
    let db = test_db().await;
    let store: &dyn PipeStore = &db;

    store.add("#rust", "#t1", "one").await.unwrap();
    let err = store.add("#rust", "#t9", "again").await.unwrap_err();
    assert!(matches!(err, StoreError::Unavailable(_)));
}

#[tokio::test]
async fn file_database_persists_across_opens() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("thermite.db");

    {
        let db = RelayDatabase::open(&path).await.unwrap();
        db.add_pipe("#rust", "#t1", "kept").await.unwrap();
    }

    let reopened = RelayDatabase::open(&path).await.unwrap();
    let pipe = reopened.get_pipe("#rust").await.unwrap().unwrap();
    assert_eq!(pipe.reason, "kept");
}
