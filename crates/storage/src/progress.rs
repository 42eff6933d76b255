use std::sync::Arc;

use course_core::model::{
    COURSE_STATE_KEY, CourseId, CourseProgressSnapshot, CourseState, snapshot_key,
};

use crate::persistent::{PersistentStore, load_json, save_json};
use crate::repository::KeyValueRepository;

/// Open the shared cross-course state stored under `course_state`.
pub async fn open_course_state(repo: Arc<dyn KeyValueRepository>) -> PersistentStore<CourseState> {
    PersistentStore::load(repo, COURSE_STATE_KEY, CourseState::new()).await
}

/// Single-course snapshot for `course`, if one was saved and is readable.
///
/// A snapshot whose embedded id disagrees with its key is ignored.
pub async fn load_snapshot(
    repo: &dyn KeyValueRepository,
    course: &CourseId,
) -> Option<CourseProgressSnapshot> {
    let snapshot: CourseProgressSnapshot = load_json(repo, &snapshot_key(course)).await?;
    if &snapshot.course_id == course {
        Some(snapshot)
    } else {
        tracing::warn!(
            course = %course,
            stored = %snapshot.course_id,
            "ignoring snapshot stored under another course key"
        );
        None
    }
}

/// Persist a single-course snapshot. Returns whether it reached storage.
pub async fn save_snapshot(repo: &dyn KeyValueRepository, snapshot: &CourseProgressSnapshot) -> bool {
    save_json(repo, &snapshot_key(&snapshot.course_id), snapshot).await
}
