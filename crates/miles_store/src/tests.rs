use crate::collections::{GOALS, MOTIVATIONS, RITUALS};
use crate::{DocumentStore, SqliteStore, Store};
use chrono::{TimeZone, Utc};
use miles_core::{Goal, GoalPatch, Milestone, Motivation, Page, RitualCompletion, RitualKind};
use serde_json::json;
use sqlx::Row;

fn sample_goal() -> Goal {
    let created = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
    Goal {
        id: "goal-1".to_string(),
        owner_id: "user-1".to_string(),
        title: "Run a half marathon".to_string(),
        description: Some("Spring race".to_string()),
        milestones: vec![Milestone {
            id: "ms-1".to_string(),
            title: "Run 5k".to_string(),
            completed: true,
            progress: 100,
            created_at: Some(created),
            updated_at: Some(created),
        }],
        progress: 100,
        created_at: created,
        updated_at: created,
    }
}

#[tokio::test]
async fn test_document_shape_is_camel_case_epoch_millis() {
    let store = DocumentStore::new();
    let goal = sample_goal();
    store.create_goal(&goal).await.unwrap();

    let raw = store.raw(GOALS, "goal-1").await.expect("document stored");
    assert_eq!(raw["userId"], json!("user-1"));
    assert_eq!(raw["createdAt"], json!(goal.created_at.timestamp_millis()));
    assert_eq!(raw["milestones"][0]["updatedAt"], json!(goal.created_at.timestamp_millis()));
    assert!(raw.get("owner_id").is_none());
    assert!(raw.get("user_id").is_none());
}

#[tokio::test]
async fn test_sqlite_shape_is_snake_case_iso8601() {
    let store = SqliteStore::new(":memory:").await.unwrap();
    store.create_goal(&sample_goal()).await.unwrap();

    let row = sqlx::query("SELECT user_id, created_at, milestones FROM goals WHERE id = ?")
        .bind("goal-1")
        .fetch_one(store.pool())
        .await
        .unwrap();
    let owner: String = row.get("user_id");
    let created: String = row.get("created_at");
    let milestones: String = row.get("milestones");
    assert_eq!(owner, "user-1");
    assert_eq!(created, "2024-03-01T12:00:00.000Z");
    assert!(milestones.contains("\"updated_at\":\"2024-03-01T12:00:00.000Z\""));
}

#[tokio::test]
async fn test_document_list_skips_invalid_documents() {
    let store = DocumentStore::new();
    store.create_goal(&sample_goal()).await.unwrap();
    store
        .insert_raw(
            GOALS,
            "broken",
            json!({
                "id": "broken",
                "userId": "user-1",
                "title": "Bad progress",
                "milestones": [],
                "progress": 250,
                "createdAt": 0,
                "updatedAt": 1
            }),
        )
        .await;

    let goals = store.list_goals("user-1", Page::all()).await.unwrap();
    assert_eq!(goals.len(), 1);
    assert_eq!(goals[0].id, "goal-1");

    // A direct read of the invalid record is an error, not a silent None.
    assert!(store.get_goal("broken").await.is_err());
}

#[tokio::test]
async fn test_sqlite_list_skips_invalid_rows() {
    let store = SqliteStore::new(":memory:").await.unwrap();
    store.create_goal(&sample_goal()).await.unwrap();
    sqlx::query(
        "INSERT INTO goals (id, user_id, title, milestones, progress, created_at, updated_at) \
         VALUES ('broken', 'user-1', 'Bad', '[]', 7, 'not-a-date', '2024-01-01T00:00:00.000Z')",
    )
    .execute(store.pool())
    .await
    .unwrap();

    let goals = store.list_goals("user-1", Page::all()).await.unwrap();
    assert_eq!(goals.len(), 1);
    assert_eq!(goals[0].id, "goal-1");
}

#[tokio::test]
async fn test_document_accepts_missing_optional_fields() {
    // Older documents were written without milestone timestamps or progress.
    let store = DocumentStore::new();
    store
        .insert_raw(
            GOALS,
            "legacy",
            json!({
                "id": "legacy",
                "userId": "user-9",
                "title": "Legacy",
                "milestones": [{ "id": "m", "title": "Old step" }],
                "createdAt": 1_700_000_000_000i64,
                "updatedAt": 1_700_000_000_000i64
            }),
        )
        .await;
    let goal = store.get_goal("legacy").await.unwrap().unwrap();
    assert_eq!(goal.progress, 0);
    assert_eq!(goal.milestones[0].progress, 0);
    assert!(!goal.milestones[0].completed);
    assert!(goal.milestones[0].updated_at.is_none());
}

#[tokio::test]
async fn test_sqlite_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("miles.db");
    {
        let store = SqliteStore::new(&path).await.unwrap();
        store
            .create_motivation(&Motivation {
                id: "mot-1".into(),
                owner_id: "user-1".into(),
                text: "Be there for my kids".into(),
                category: None,
                created_at: Utc::now(),
            })
            .await
            .unwrap();
    }
    let reopened = SqliteStore::new(&path).await.unwrap();
    let found = reopened.get_motivation("mot-1").await.unwrap().unwrap();
    assert_eq!(found.text, "Be there for my kids");
}

#[tokio::test]
async fn test_document_raw_motivation_has_user_id() {
    let store = DocumentStore::new();
    store
        .create_motivation(&Motivation {
            id: "mot-1".into(),
            owner_id: "user-1".into(),
            text: "Feel stronger".into(),
            category: Some("health".into()),
            created_at: Utc::now(),
        })
        .await
        .unwrap();
    let raw = store.raw(MOTIVATIONS, "mot-1").await.unwrap();
    assert_eq!(raw["userId"], json!("user-1"));
    assert_eq!(raw["category"], json!("health"));
}

fn broken_goal_doc(updated_at: i64) -> serde_json::Value {
    json!({
        "id": "broken",
        "userId": "user-1",
        "title": "Bad progress",
        "milestones": [],
        "progress": 250,
        "createdAt": 0,
        "updatedAt": updated_at
    })
}

#[tokio::test]
async fn test_document_limit_counts_valid_documents() {
    let store = DocumentStore::new();
    store.create_goal(&sample_goal()).await.unwrap();
    // Newest, so it sorts ahead of the valid goal.
    let newer = sample_goal().updated_at.timestamp_millis() + 1000;
    store.insert_raw(GOALS, "broken", broken_goal_doc(newer)).await;

    let goals = store.list_goals("user-1", Page::first(1)).await.unwrap();
    assert_eq!(goals.len(), 1);
    assert_eq!(goals[0].id, "goal-1");
}

#[tokio::test]
async fn test_sqlite_limit_counts_valid_rows() {
    let store = SqliteStore::new(":memory:").await.unwrap();
    store.create_goal(&sample_goal()).await.unwrap();
    sqlx::query(
        "INSERT INTO goals (id, user_id, title, milestones, progress, created_at, updated_at) \
         VALUES ('broken', 'user-1', 'Bad', '[]', 7, 'not-a-date', '2025-01-01T00:00:00.000Z')",
    )
    .execute(store.pool())
    .await
    .unwrap();

    let goals = store.list_goals("user-1", Page::first(1)).await.unwrap();
    assert_eq!(goals.len(), 1);
    assert_eq!(goals[0].id, "goal-1");
}

#[tokio::test]
async fn test_document_failed_merge_keeps_stored_document() {
    let store = DocumentStore::new();
    store.create_goal(&sample_goal()).await.unwrap();
    let before = store.raw(GOALS, "goal-1").await.unwrap();

    // u8 progress above 100 encodes fine but fails validation on decode.
    let result = store
        .update_goal(
            "goal-1",
            &GoalPatch {
                title: Some("Renamed".into()),
                progress: Some(200),
                ..Default::default()
            },
        )
        .await;
    assert!(result.is_err());
    assert_eq!(store.raw(GOALS, "goal-1").await.unwrap(), before);
    assert_eq!(store.get_goal("goal-1").await.unwrap().unwrap(), sample_goal());
}

#[tokio::test]
async fn test_sqlite_schema_is_idempotent_and_has_rituals() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("miles.db");
    drop(SqliteStore::new(&path).await.unwrap());
    let store = SqliteStore::new(&path).await.unwrap();

    let tables: Vec<String> = sqlx::query(
        "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
    )
    .fetch_all(store.pool())
    .await
    .unwrap()
    .iter()
    .map(|row| row.get("name"))
    .collect();
    assert_eq!(
        tables,
        vec!["conversations", "goals", "ritual_completions", "user_motivations", "users"]
    );
}

#[tokio::test]
async fn test_ritual_shapes_per_backend() {
    let completed_at = Utc.with_ymd_and_hms(2024, 3, 1, 7, 30, 0).unwrap();
    let ritual = RitualCompletion {
        id: "rit-1".into(),
        owner_id: "user-1".into(),
        kind: RitualKind::Morning,
        completed_at,
        reflection: Some("Ship the report".into()),
    };

    let doc = DocumentStore::new();
    doc.record_ritual(&ritual).await.unwrap();
    let raw = doc.raw(RITUALS, "rit-1").await.unwrap();
    assert_eq!(raw["userId"], json!("user-1"));
    assert_eq!(raw["ritualType"], json!("morning"));
    assert_eq!(raw["completedAt"], json!(completed_at.timestamp_millis()));

    let sql = SqliteStore::new(":memory:").await.unwrap();
    sql.record_ritual(&ritual).await.unwrap();
    let row = sqlx::query("SELECT ritual_type, completed_at FROM ritual_completions WHERE id = ?")
        .bind("rit-1")
        .fetch_one(sql.pool())
        .await
        .unwrap();
    let kind: String = row.get("ritual_type");
    let at: String = row.get("completed_at");
    assert_eq!(kind, "morning");
    assert_eq!(at, "2024-03-01T07:30:00.000Z");
}

#[tokio::test]
async fn test_unknown_ritual_type_is_skipped() {
    let store = DocumentStore::new();
    store
        .insert_raw(
            RITUALS,
            "odd",
            json!({ "id": "odd", "userId": "user-1", "ritualType": "noon", "completedAt": 5 }),
        )
        .await;
    let found = store
        .list_rituals_since("user-1", Utc.timestamp_millis_opt(0).unwrap())
        .await
        .unwrap();
    assert!(found.is_empty());
}
