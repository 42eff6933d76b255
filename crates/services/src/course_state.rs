use std::sync::Arc;

use tokio::sync::{Mutex, watch};

use course_core::model::{
    CourseId, CourseProgressRecord, CourseProgressSnapshot, CourseState, LectureId,
    LectureSequence, progress_percent,
};
use storage::PersistentStore;
use storage::progress::{load_snapshot, open_course_state, save_snapshot};
use storage::repository::KeyValueRepository;

use crate::Clock;

/// Typed operations over every course's progress record.
///
/// Construct once at startup and hand clones to consumers; all clones share
/// the same live state. No operation fails: missing records are created on
/// first write and storage problems are absorbed by the underlying
/// [`PersistentStore`].
#[derive(Clone)]
pub struct CourseStateManager {
    clock: Clock,
    repo: Arc<dyn KeyValueRepository>,
    state: PersistentStore<CourseState>,
    // Held across the aggregate write and the snapshot write so both keys
    // see mutations in the same order.
    writes: Arc<Mutex<()>>,
}

impl CourseStateManager {
    pub async fn load(repo: Arc<dyn KeyValueRepository>, clock: Clock) -> Self {
        let state = open_course_state(Arc::clone(&repo)).await;
        Self {
            clock,
            repo,
            state,
            writes: Arc::new(Mutex::new(())),
        }
    }

    /// Revision counter bumped after every mutation.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.state.subscribe()
    }

    /// False while progress is only held in memory.
    #[must_use]
    pub fn is_durable(&self) -> bool {
        self.state.is_durable()
    }

    //
    // ─── MUTATIONS ─────────────────────────────────────────────────────────────
    //

    pub async fn update_last_viewed(&self, course: &CourseId, lecture: &LectureId) {
        tracing::debug!(course = %course, lecture = %lecture, "update last viewed");
        self.mutate_course(course, |state| {
            state.set_last_viewed(course, lecture.clone());
        })
        .await;
    }

    /// Flips completion and returns the new membership.
    pub async fn toggle_lecture_completion(&self, course: &CourseId, lecture: &LectureId) -> bool {
        let completed = self
            .mutate_course(course, |state| {
                state.record_mut(course).toggle_completion(lecture.clone())
            })
            .await;
        tracing::debug!(course = %course, lecture = %lecture, completed, "toggled completion");
        completed
    }

    /// Marks a lecture complete; returns `true` if it was not complete before.
    pub async fn mark_lecture_complete(&self, course: &CourseId, lecture: &LectureId) -> bool {
        if self.read_record(course, |r| r.is_completed(lecture)) {
            return false;
        }
        self.mutate_course(course, |state| {
            state.record_mut(course).mark_completed(lecture.clone())
        })
        .await
    }

    /// Adds completions reported elsewhere; returns how many were new.
    pub async fn merge_completed(
        &self,
        course: &CourseId,
        lectures: impl IntoIterator<Item = LectureId>,
    ) -> usize {
        let missing: Vec<LectureId> = self.read_record(course, |r| {
            lectures
                .into_iter()
                .filter(|id| !r.is_completed(id))
                .collect()
        });
        if missing.is_empty() {
            return 0;
        }
        self.mutate_course(course, |state| state.record_mut(course).merge_completed(missing))
            .await
    }

    pub async fn toggle_bookmark(&self, course: &CourseId) -> bool {
        self.mutate_course(course, |state| state.record_mut(course).toggle_bookmark())
            .await
    }

    pub async fn save_note(&self, course: &CourseId, lecture: &LectureId, text: &str) {
        self.mutate_course(course, |state| {
            state.record_mut(course).set_note(lecture.clone(), text);
        })
        .await;
    }

    /// Stores the playback position clamped to `[0, max]`; returns the stored value.
    pub async fn save_video_progress(
        &self,
        course: &CourseId,
        lecture: &LectureId,
        seconds: f64,
        max: Option<f64>,
    ) -> f64 {
        self.mutate_course(course, |state| {
            state
                .record_mut(course)
                .set_video_progress(lecture.clone(), seconds, max)
        })
        .await
    }

    /// Hydrates a course from its single-course snapshot when the aggregate
    /// has no record for it. Returns whether anything was imported.
    pub async fn import_snapshot_if_missing(&self, course: &CourseId) -> bool {
        if self.state.read(|s| s.record(course).is_some()) {
            return false;
        }
        let Some(snapshot) = load_snapshot(self.repo.as_ref(), course).await else {
            return false;
        };
        let record = snapshot.into_record();
        if record.is_empty() {
            return false;
        }
        tracing::info!(course = %course, "imported progress from course snapshot");
        let _order = self.writes.lock().await;
        self.state
            .mutate(|state| {
                if state.record(course).is_none() {
                    state.insert_record(course.clone(), record);
                }
            })
            .await;
        true
    }

    //
    // ─── QUERIES ───────────────────────────────────────────────────────────────
    //

    /// The course's record; a fresh default one when none exists yet.
    #[must_use]
    pub fn record(&self, course: &CourseId) -> CourseProgressRecord {
        self.read_record(course, Clone::clone)
    }

    #[must_use]
    pub fn is_completed(&self, course: &CourseId, lecture: &LectureId) -> bool {
        self.read_record(course, |r| r.is_completed(lecture))
    }

    #[must_use]
    pub fn is_bookmarked(&self, course: &CourseId) -> bool {
        self.read_record(course, CourseProgressRecord::is_bookmarked)
    }

    #[must_use]
    pub fn bookmarked_courses(&self) -> Vec<CourseId> {
        self.state
            .read(|s| s.bookmarked_courses().cloned().collect())
    }

    /// Note text, or an empty string when none was saved.
    #[must_use]
    pub fn get_note(&self, course: &CourseId, lecture: &LectureId) -> String {
        self.read_record(course, |r| r.note(lecture).to_string())
    }

    /// Saved playback position in seconds, 0 when none was saved.
    #[must_use]
    pub fn get_video_progress(&self, course: &CourseId, lecture: &LectureId) -> f64 {
        self.read_record(course, |r| r.video_progress(lecture))
    }

    /// `round(100 * completed / total)`, 0 when `total` is 0, never above 100.
    #[must_use]
    pub fn get_course_progress_percent(&self, course: &CourseId, total_lectures: usize) -> u8 {
        let completed = self.read_record(course, |r| r.completed_lecture_ids().len());
        progress_percent(completed, total_lectures)
    }

    /// Like [`Self::get_course_progress_percent`] but only counts lectures
    /// still present in `lectures`.
    #[must_use]
    pub fn course_progress_percent_within(&self, course: &CourseId, lectures: &LectureSequence) -> u8 {
        let completed = self.read_record(course, |r| r.completed_count_within(lectures));
        progress_percent(completed, lectures.len())
    }

    /// Most recently viewed course and its last lecture.
    #[must_use]
    pub fn last_viewed(&self) -> Option<(CourseId, Option<LectureId>)> {
        self.state.read(|s| {
            s.last_viewed_course_id()
                .map(|course| (course.clone(), s.last_viewed_lecture_id().cloned()))
        })
    }

    /// A copy of the whole aggregate, as persisted.
    #[must_use]
    pub fn snapshot(&self) -> CourseState {
        self.state.snapshot()
    }

    fn read_record<R>(&self, course: &CourseId, f: impl FnOnce(&CourseProgressRecord) -> R) -> R {
        self.state.read(|s| match s.record(course) {
            Some(record) => f(record),
            None => f(&CourseProgressRecord::default()),
        })
    }

    // Writes the aggregate, then refreshes the course's snapshot key, under one lock.
    async fn mutate_course<R>(
        &self,
        course: &CourseId,
        f: impl FnOnce(&mut CourseState) -> R,
    ) -> R {
        let _order = self.writes.lock().await;
        let timestamp = self.clock.now_millis();
        let (result, snapshot) = self
            .state
            .mutate(|state| {
                let result = f(state);
                let snapshot =
                    CourseProgressSnapshot::from_record(course, state.record_mut(course), timestamp);
                (result, snapshot)
            })
            .await;
        save_snapshot(self.repo.as_ref(), &snapshot).await;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use course_core::time::fixed_clock;
    use std::time::Duration;
    use storage::StorageError;
    use storage::repository::InMemoryKeyValueRepository;

    /// Delays snapshot writes whose payload mentions `slow_marker`.
    struct SlowSnapshots {
        inner: InMemoryKeyValueRepository,
        slow_marker: &'static str,
    }

    #[async_trait]
    impl KeyValueRepository for SlowSnapshots {
        async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
            self.inner.get(key).await
        }

        async fn put(&self, key: &str, value: &str) -> Result<(), StorageError> {
            if key.starts_with("course_progress_") && value.contains(self.slow_marker) {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            self.inner.put(key, value).await
        }

        async fn remove(&self, key: &str) -> Result<(), StorageError> {
            self.inner.remove(key).await
        }

        async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
            self.inner.keys_with_prefix(prefix).await
        }
    }

    fn cid(id: &str) -> CourseId {
        CourseId::new(id).unwrap()
    }

    fn lid(id: &str) -> LectureId {
        LectureId::new(id).unwrap()
    }

    async fn manager() -> (InMemoryKeyValueRepository, CourseStateManager) {
        let repo = InMemoryKeyValueRepository::new();
        let mgr = CourseStateManager::load(Arc::new(repo.clone()), fixed_clock()).await;
        (repo, mgr)
    }

    #[tokio::test]
    async fn toggle_completion_is_self_inverse() {
        let (_, mgr) = manager().await;
        let (c, l) = (cid("CS101"), lid("L1"));
        let before = mgr.is_completed(&c, &l);
        let first = mgr.toggle_lecture_completion(&c, &l).await;
        let second = mgr.toggle_lecture_completion(&c, &l).await;
        assert_ne!(first, second);
        assert_eq!(mgr.is_completed(&c, &l), before);
    }

    #[tokio::test]
    async fn zero_total_gives_zero_percent() {
        let (_, mgr) = manager().await;
        mgr.mark_lecture_complete(&cid("CS101"), &lid("L1")).await;
        assert_eq!(mgr.get_course_progress_percent(&cid("CS101"), 0), 0);
        assert_eq!(mgr.get_course_progress_percent(&cid("EMPTY"), 0), 0);
    }

    #[tokio::test]
    async fn two_of_ten_lectures_is_twenty_percent() {
        let (_, mgr) = manager().await;
        let course = cid("CS101");
        mgr.toggle_lecture_completion(&course, &lid("L3")).await;
        mgr.toggle_lecture_completion(&course, &lid("L7")).await;
        assert_eq!(mgr.get_course_progress_percent(&course, 10), 20);
    }

    #[tokio::test]
    async fn notes_round_trip_including_empty_string() {
        let (_, mgr) = manager().await;
        let (c, l) = (cid("CS101"), lid("L1"));
        assert_eq!(mgr.get_note(&c, &l), "");
        mgr.save_note(&c, &l, "ownership ≠ borrowing").await;
        assert_eq!(mgr.get_note(&c, &l), "ownership ≠ borrowing");
        mgr.save_note(&c, &l, "").await;
        assert_eq!(mgr.get_note(&c, &l), "");
    }

    #[tokio::test]
    async fn video_progress_clamps_at_both_ends() {
        let (_, mgr) = manager().await;
        let (c, l) = (cid("CS101"), lid("L1"));
        assert_eq!(mgr.get_video_progress(&c, &l), 0.0);
        mgr.save_video_progress(&c, &l, -5.0, None).await;
        assert_eq!(mgr.get_video_progress(&c, &l), 0.0);
        mgr.save_video_progress(&c, &l, 600.0 + 100.0, Some(600.0)).await;
        assert_eq!(mgr.get_video_progress(&c, &l), 600.0);
    }

    #[tokio::test]
    async fn bookmark_toggle_returns_new_state() {
        let (_, mgr) = manager().await;
        let c = cid("ART");
        assert!(mgr.toggle_bookmark(&c).await);
        assert_eq!(mgr.bookmarked_courses(), vec![c.clone()]);
        assert!(!mgr.toggle_bookmark(&c).await);
        assert!(!mgr.is_bookmarked(&c));
    }

    #[tokio::test]
    async fn mutations_persist_aggregate_and_snapshot() {
        let (repo, mgr) = manager().await;
        let (c, l) = (cid("CS101"), lid("L2"));
        mgr.update_last_viewed(&c, &l).await;
        mgr.update_last_viewed(&c, &l).await;

        let reloaded = CourseStateManager::load(Arc::new(repo.clone()), fixed_clock()).await;
        assert_eq!(reloaded.last_viewed(), Some((c.clone(), Some(l.clone()))));
        assert_eq!(reloaded.record(&c).last_viewed_lecture_id(), Some(&l));

        let snapshot = load_snapshot(&repo, &c).await.unwrap();
        assert_eq!(snapshot.last_lecture_id, Some(l));
        assert_eq!(snapshot.timestamp, fixed_clock().now_millis());
    }

    #[tokio::test]
    async fn mark_complete_is_idempotent() {
        let (_, mgr) = manager().await;
        let (c, l) = (cid("CS101"), lid("L1"));
        assert!(mgr.mark_lecture_complete(&c, &l).await);
        assert!(!mgr.mark_lecture_complete(&c, &l).await);
        assert!(mgr.is_completed(&c, &l));
    }

    #[tokio::test]
    async fn merge_counts_only_new_lectures() {
        let (_, mgr) = manager().await;
        let c = cid("CS101");
        mgr.mark_lecture_complete(&c, &lid("L1")).await;
        let added = mgr.merge_completed(&c, [lid("L1"), lid("L2")]).await;
        assert_eq!(added, 1);
        assert_eq!(mgr.record(&c).completed_lecture_ids().len(), 2);
    }

    #[tokio::test]
    async fn imports_legacy_snapshot_once() {
        let repo = InMemoryKeyValueRepository::new();
        repo.put(
            "course_progress_CS101",
            r#"{"courseId":"CS101","completedLectures":["L1"],"lastLectureId":"L1","notes":"legacy","timestamp":1}"#,
        )
        .await
        .unwrap();
        let mgr = CourseStateManager::load(Arc::new(repo.clone()), fixed_clock()).await;
        let c = cid("CS101");

        assert!(mgr.import_snapshot_if_missing(&c).await);
        assert!(!mgr.import_snapshot_if_missing(&c).await);
        assert_eq!(mgr.get_note(&c, &lid("L1")), "legacy");
        assert!(mgr.is_completed(&c, &lid("L1")));
    }

    #[tokio::test]
    async fn unavailable_storage_does_not_break_operations() {
        let repo = InMemoryKeyValueRepository::new();
        repo.set_disabled(true);
        let mgr = CourseStateManager::load(Arc::new(repo), fixed_clock()).await;
        let c = cid("CS101");

        assert!(mgr.toggle_bookmark(&c).await);
        mgr.save_note(&c, &lid("L1"), "kept in memory").await;
        assert_eq!(mgr.get_note(&c, &lid("L1")), "kept in memory");
        assert!(!mgr.is_durable());
    }

    #[tokio::test(start_paused = true)]
    async fn snapshot_writes_follow_mutation_order() {
        let inner = InMemoryKeyValueRepository::new();
        let repo = Arc::new(SlowSnapshots {
            inner: inner.clone(),
            slow_marker: "\"L1\"",
        });
        let first = CourseStateManager::load(repo, fixed_clock()).await;
        let second = first.clone();
        let c = cid("CS101");

        let l1 = lid("L1");
        tokio::join!(first.update_last_viewed(&c, &l1), async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            second.update_last_viewed(&c, &lid("L2")).await;
        });

        let snapshot = load_snapshot(&inner, &c).await.unwrap();
        assert_eq!(snapshot.last_lecture_id, Some(lid("L2")));
        let reloaded = CourseStateManager::load(Arc::new(inner), fixed_clock()).await;
        assert_eq!(reloaded.record(&c).last_viewed_lecture_id(), Some(&lid("L2")));
    }

    #[tokio::test]
    async fn subscribers_observe_each_mutation() {
        let (_, mgr) = manager().await;
        let mut revisions = mgr.subscribe();
        let c = cid("CS101");

        mgr.toggle_bookmark(&c).await;
        mgr.save_note(&c, &lid("L1"), "n").await;

        assert!(revisions.has_changed().unwrap());
        assert_eq!(*revisions.borrow_and_update(), 2);
    }

    #[tokio::test]
    async fn one_bad_stored_id_keeps_the_rest_of_the_progress() {
        let repo = InMemoryKeyValueRepository::new();
        repo.put(
            "course_state",
            r#"{"lastViewedCourseId":"CS101","completedLectures":{"CS101":["L1","L2"],"ART":[""]},"bookmarkedCourses":["CS101"]}"#,
        )
        .await
        .unwrap();
        let mgr = CourseStateManager::load(Arc::new(repo), fixed_clock()).await;
        let c = cid("CS101");

        assert_eq!(mgr.get_course_progress_percent(&c, 2), 100);
        assert!(mgr.is_bookmarked(&c));
        assert_eq!(mgr.bookmarked_courses(), vec![c]);
    }
}
