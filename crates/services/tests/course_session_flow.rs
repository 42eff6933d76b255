use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use course_core::model::{
    Course, CourseId, LectureDetail, LectureId, LectureSummary, Week, WeekId,
};
use course_core::time::fixed_clock;
use services::{
    AppServices, ContentError, ContentSource, CourseSessionController, CourseStateManager,
    Direction, NotificationBridge, NotificationConfig, NotificationKind, PlayerEvent,
    ProgressSync, SessionPhase, StaticContentSource,
};
use storage::repository::KeyValueRepository;
use storage::InMemoryKeyValueRepository;

fn course_id() -> CourseId {
    CourseId::new("rust-101").unwrap()
}

fn lecture(id: &str) -> LectureId {
    LectureId::new(id).unwrap()
}

fn sample_course() -> Course {
    let summary = |id: &str, secs: f64| LectureSummary::new(lecture(id), id.to_uppercase(), Some(secs));
    Course::new(
        course_id(),
        "Rust 101",
        vec![
            Week::new(
                WeekId::new("w1").unwrap(),
                "Basics",
                vec![summary("l1", 600.0), summary("l2", 420.0)],
            ),
            Week::new(
                WeekId::new("w2").unwrap(),
                "Ownership",
                vec![summary("l3", 900.0)],
            ),
        ],
    )
}

/// Fails the first `failures` course fetches, then serves from the catalog.
struct FlakyContent {
    inner: StaticContentSource,
    failures: AtomicUsize,
}

impl FlakyContent {
    fn new(failures: usize) -> Self {
        let inner = StaticContentSource::new();
        inner.insert_course(sample_course());
        Self {
            inner,
            failures: AtomicUsize::new(failures),
        }
    }
}

#[async_trait]
impl ContentSource for FlakyContent {
    async fn fetch_course(&self, course: &CourseId) -> Result<Course, ContentError> {
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(ContentError::Unavailable("connection reset".into()));
        }
        self.inner.fetch_course(course).await
    }

    async fn fetch_lecture(
        &self,
        course: &CourseId,
        lecture: &LectureId,
    ) -> Result<LectureDetail, ContentError> {
        self.inner.fetch_lecture(course, lecture).await
    }
}

/// Never answers the first course fetch.
struct StallsOnce {
    inner: StaticContentSource,
    stalled: AtomicBool,
}

impl StallsOnce {
    fn new() -> Self {
        let inner = StaticContentSource::new();
        inner.insert_course(sample_course());
        Self {
            inner,
            stalled: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl ContentSource for StallsOnce {
    async fn fetch_course(&self, course: &CourseId) -> Result<Course, ContentError> {
        if !self.stalled.swap(true, Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.inner.fetch_course(course).await
    }

    async fn fetch_lecture(
        &self,
        course: &CourseId,
        lecture: &LectureId,
    ) -> Result<LectureDetail, ContentError> {
        self.inner.fetch_lecture(course, lecture).await
    }
}

#[derive(Default)]
struct RecordingSync {
    remote: Vec<LectureId>,
    posted: Mutex<Vec<(LectureId, bool)>>,
}

#[async_trait]
impl ProgressSync for RecordingSync {
    async fn fetch_completed(&self, _course: &CourseId) -> Result<Vec<LectureId>, ContentError> {
        Ok(self.remote.clone())
    }

    async fn post_completion(
        &self,
        _course: &CourseId,
        lecture: &LectureId,
        completed: bool,
    ) -> Result<(), ContentError> {
        self.posted
            .lock()
            .unwrap()
            .push((lecture.clone(), completed));
        Ok(())
    }
}

async fn manager(repo: &InMemoryKeyValueRepository) -> CourseStateManager {
    CourseStateManager::load(Arc::new(repo.clone()), fixed_clock()).await
}

#[tokio::test]
async fn failed_load_recovers_on_retry_and_resumes_last_viewed() {
    let repo = InMemoryKeyValueRepository::new();
    let progress = manager(&repo).await;
    progress.update_last_viewed(&course_id(), &lecture("l2")).await;

    let notifications = NotificationBridge::new(NotificationConfig::default());
    let mut session = CourseSessionController::new(
        course_id(),
        Arc::new(FlakyContent::new(1)),
        progress,
    )
    .with_notifications(notifications.clone());

    assert_eq!(session.phase(), SessionPhase::Loading);
    assert_eq!(session.open().await, SessionPhase::Errored);
    assert!(session.error_message().is_some());
    assert_eq!(notifications.visible()[0].kind, NotificationKind::Error);

    assert!(session.retry().await);
    assert_eq!(session.phase(), SessionPhase::Ready);
    assert_eq!(session.current_lecture().map(|l| l.id().as_str()), Some("l2"));
    assert!(!session.retry().await);
}

#[tokio::test(start_paused = true)]
async fn stuck_fetch_times_out_and_retry_recovers() {
    let repo = InMemoryKeyValueRepository::new();
    let notifications = NotificationBridge::new(NotificationConfig::default());
    let mut session =
        CourseSessionController::new(course_id(), Arc::new(StallsOnce::new()), manager(&repo).await)
            .with_notifications(notifications.clone())
            .with_fetch_timeout(Some(Duration::from_secs(10)));

    assert_eq!(session.open().await, SessionPhase::Errored);
    assert!(session.error_message().unwrap().contains("timed out"));
    assert!(
        notifications
            .visible()
            .iter()
            .any(|n| n.kind == NotificationKind::Error)
    );

    assert!(session.retry().await);
    assert_eq!(session.phase(), SessionPhase::Ready);
    assert_eq!(session.current_index(), Some(0));
}

#[tokio::test]
async fn stale_last_viewed_falls_back_without_persisting() {
    let repo = InMemoryKeyValueRepository::new();
    let progress = manager(&repo).await;
    progress.update_last_viewed(&course_id(), &lecture("removed")).await;

    let mut session =
        CourseSessionController::new(course_id(), Arc::new(FlakyContent::new(0)), progress.clone());
    session.open().await;

    assert_eq!(session.current_index(), Some(0));
    assert_eq!(
        progress.record(&course_id()).last_viewed_lecture_id().map(LectureId::as_str),
        Some("removed")
    );
}

#[tokio::test]
async fn walkthrough_persists_across_reload() {
    let repo = InMemoryKeyValueRepository::new();
    let content: Arc<dyn ContentSource> = Arc::new(FlakyContent::new(0));

    {
        let mut session =
            CourseSessionController::new(course_id(), Arc::clone(&content), manager(&repo).await);
        session.open().await;
        assert!(!session.has_previous());

        session.on_player_event(PlayerEvent::TimeUpdate { seconds: 120.0 }).await;
        session.on_player_event(PlayerEvent::VideoComplete).await;
        assert!(session.navigate_relative(Direction::Next).await);
        assert!(session.save_note("borrowing rules").await);
        assert!(session.navigate_relative(Direction::Next).await);
        assert!(!session.navigate_relative(Direction::Next).await);
        assert!(session.toggle_bookmark().await);

        assert_eq!(session.week_progress_percent(&WeekId::new("w1").unwrap()), 50);
        assert_eq!(session.course_progress_percent(), 33);
    }

    let progress = manager(&repo).await;
    let course = course_id();
    assert!(progress.is_completed(&course, &lecture("l1")));
    assert!(progress.is_bookmarked(&course));
    assert_eq!(progress.get_note(&course, &lecture("l2")), "borrowing rules");
    assert!((progress.get_video_progress(&course, &lecture("l1")) - 120.0).abs() < f64::EPSILON);

    let mut session = CourseSessionController::new(course, content, progress);
    session.open().await;
    assert_eq!(session.current_lecture().map(|l| l.id().as_str()), Some("l3"));

    let keys = repo.keys_with_prefix("course_progress_").await.unwrap();
    assert_eq!(keys, vec!["course_progress_rust-101".to_string()]);
}

#[tokio::test]
async fn server_completions_merge_and_changes_are_posted() {
    let repo = InMemoryKeyValueRepository::new();
    let sync = Arc::new(RecordingSync {
        remote: vec![lecture("l2"), lecture("gone")],
        ..RecordingSync::default()
    });

    let mut session = CourseSessionController::new(
        course_id(),
        Arc::new(FlakyContent::new(0)),
        manager(&repo).await,
    )
    .with_sync(sync.clone());
    session.open().await;

    assert!(session.is_completed(&lecture("l2")));
    assert_eq!(session.progress().completed, 1);

    assert_eq!(session.toggle_lecture_completion(&lecture("l2")).await, Some(false));
    assert_eq!(session.toggle_lecture_completion(&lecture("nope")).await, None);
    assert!(session.mark_current_complete().await);
    assert!(!session.mark_current_complete().await);

    let posted = sync.posted.lock().unwrap().clone();
    assert_eq!(posted, vec![(lecture("l2"), false), (lecture("l1"), true)]);
}

#[tokio::test]
async fn app_services_share_one_state_across_sessions() {
    let services = AppServices::in_memory(Arc::new(FlakyContent::new(0)), fixed_clock()).await;
    assert!(services.resume_last_course().await.is_none());

    let mut first = services.open_course(course_id()).await;
    assert!(first.select_lecture(&lecture("l3")).await);
    assert!(!first.select_lecture(&lecture("missing")).await);

    let resumed = services.resume_last_course().await.unwrap();
    assert_eq!(resumed.phase(), SessionPhase::Ready);
    assert_eq!(resumed.current_lecture().map(|l| l.id().as_str()), Some("l3"));

    let detail = resumed.current_lecture_detail().await.unwrap();
    assert_eq!(detail.title(), "L3");
}
