use std::sync::Arc;

use course_core::model::{CourseId, CourseState, LectureId};
use storage::progress::open_course_state;
use storage::repository::KeyValueRepository;
use storage::sqlite::SqliteRepository;

async fn connect(name: &str) -> SqliteRepository {
    let url = format!("sqlite:file:{name}?mode=memory&cache=shared");
    let repo = SqliteRepository::connect(&url).await.expect("connect");
    repo.migrate().await.expect("migrate");
    repo
}

#[tokio::test]
async fn sqlite_kv_round_trip_and_overwrite() {
    let repo = connect("memdb_kv_roundtrip").await;

    assert_eq!(repo.get("missing").await.unwrap(), None);
    repo.put("course_state", "{}").await.unwrap();
    repo.put("course_state", r#"{"bookmarkedCourses":["A"]}"#)
        .await
        .unwrap();
    assert_eq!(
        repo.get("course_state").await.unwrap().as_deref(),
        Some(r#"{"bookmarkedCourses":["A"]}"#)
    );

    repo.remove("course_state").await.unwrap();
    assert_eq!(repo.get("course_state").await.unwrap(), None);
}

#[tokio::test]
async fn sqlite_lists_keys_by_prefix() {
    let repo = connect("memdb_kv_prefix").await;
    repo.put("course_progress_B", "{}").await.unwrap();
    repo.put("course_progress_A", "{}").await.unwrap();
    repo.put("course_state", "{}").await.unwrap();
    repo.put("course_progress%", "{}").await.unwrap();

    let keys = repo.keys_with_prefix("course_progress_").await.unwrap();
    assert_eq!(keys, ["course_progress_A", "course_progress_B"]);
}

#[tokio::test]
async fn migrations_are_idempotent() {
    let repo = connect("memdb_kv_migrate").await;
    repo.migrate().await.expect("second migrate");
}

#[tokio::test]
async fn course_state_survives_reopen() {
    let repo = connect("memdb_kv_reopen").await;
    let kv: Arc<dyn KeyValueRepository> = Arc::new(repo.clone());
    let course = CourseId::new("CS101").unwrap();
    let lecture = LectureId::new("L3").unwrap();

    let store = open_course_state(Arc::clone(&kv)).await;
    store
        .mutate(|state: &mut CourseState| {
            state.set_last_viewed(&course, lecture.clone());
            state.record_mut(&course).mark_completed(lecture.clone());
        })
        .await;
    assert!(store.is_durable());

    let reopened = open_course_state(kv).await;
    let record = reopened.read(|s| s.record(&course).cloned()).unwrap();
    assert_eq!(record.last_viewed_lecture_id(), Some(&lecture));
    assert!(record.is_completed(&lecture));
}
