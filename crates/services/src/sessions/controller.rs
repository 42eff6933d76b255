use std::sync::Arc;
use std::time::Duration;

use course_core::model::{
    Course, CourseId, LectureDetail, LectureId, LectureSequence, LectureSummary, WeekId,
    progress_percent,
};

use super::progress::SessionProgress;
use super::state::{Direction, PlayerEvent, ReadySession, SessionPhase, SessionState};
use crate::content::ContentSource;
use crate::course_state::CourseStateManager;
use crate::error::{ContentError, SessionError};
use crate::notifications::NotificationBridge;
use crate::progress_sync::ProgressSync;

/// One learner's viewing session of one course.
///
/// Starts in `Loading`; [`open`](Self::open) fetches the content tree and
/// reconciles it with stored progress, ending in `Ready` or `Errored`.
/// `Errored` is left only through [`retry`](Self::retry). Stale lecture ids
/// are ignored rather than reported.
pub struct CourseSessionController {
    course_id: CourseId,
    content: Arc<dyn ContentSource>,
    progress: CourseStateManager,
    sync: Option<Arc<dyn ProgressSync>>,
    notifications: Option<NotificationBridge>,
    fetch_timeout: Option<Duration>,
    state: SessionState,
}

impl CourseSessionController {
    #[must_use]
    pub fn new(
        course_id: CourseId,
        content: Arc<dyn ContentSource>,
        progress: CourseStateManager,
    ) -> Self {
        Self {
            course_id,
            content,
            progress,
            sync: None,
            notifications: None,
            fetch_timeout: None,
            state: SessionState::Loading,
        }
    }

    #[must_use]
    pub fn with_sync(mut self, sync: Arc<dyn ProgressSync>) -> Self {
        self.sync = Some(sync);
        self
    }

    #[must_use]
    pub fn with_notifications(mut self, notifications: NotificationBridge) -> Self {
        self.notifications = Some(notifications);
        self
    }

    /// Bound the content-tree fetch. Without one a stuck fetch keeps the
    /// session in `Loading`.
    #[must_use]
    pub fn with_fetch_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    #[must_use]
    pub fn course_id(&self) -> &CourseId {
        &self.course_id
    }

    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        self.state.phase()
    }

    /// Failure message while `Errored`.
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        match &self.state {
            SessionState::Errored { message } => Some(message),
            _ => None,
        }
    }

    //
    // ─── LIFECYCLE ─────────────────────────────────────────────────────────────
    //

    /// Fetch the course and move to `Ready` or `Errored`.
    pub async fn open(&mut self) -> SessionPhase {
        self.state = SessionState::Loading;
        tracing::info!(course = %self.course_id, "loading course");

        match self.fetch_course().await {
            Ok(course) => {
                let ready = self.reconcile(course).await;
                tracing::info!(
                    course = %self.course_id,
                    lectures = ready.lectures.len(),
                    current = ?ready.current_lecture().map(LectureSummary::id),
                    "course ready"
                );
                self.state = SessionState::Ready(ready);
            }
            Err(err) => {
                tracing::warn!(course = %self.course_id, error = %err, "failed to load course");
                self.notify_error("Failed to load course");
                self.state = SessionState::Errored {
                    message: err.to_string(),
                };
            }
        }
        self.phase()
    }

    /// Re-enter `Loading` from `Errored`. Returns `false` (doing nothing) in
    /// any other phase.
    pub async fn retry(&mut self) -> bool {
        if self.phase() != SessionPhase::Errored {
            return false;
        }
        self.open().await;
        true
    }

    async fn fetch_course(&self) -> Result<Course, ContentError> {
        let fetch = self.content.fetch_course(&self.course_id);
        let course = match self.fetch_timeout {
            Some(limit) => tokio::time::timeout(limit, fetch)
                .await
                .map_err(|_| ContentError::Timeout(limit))??,
            None => fetch.await?,
        };
        course.ensure_id(&self.course_id)?;
        Ok(course)
    }

    async fn reconcile(&self, course: Course) -> ReadySession {
        self.progress
            .import_snapshot_if_missing(&self.course_id)
            .await;

        if let Some(sync) = &self.sync {
            match sync.fetch_completed(&self.course_id).await {
                Ok(remote) => {
                    let added = self.progress.merge_completed(&self.course_id, remote).await;
                    if added > 0 {
                        tracing::info!(course = %self.course_id, added, "merged server completions");
                    }
                }
                Err(err) => {
                    tracing::warn!(course = %self.course_id, error = %err, "progress sync unavailable");
                }
            }
        }

        let lectures = LectureSequence::from_course(&course);
        let record = self.progress.record(&self.course_id);
        let current = record
            .last_viewed_lecture_id()
            .and_then(|id| lectures.index_of(id))
            .or_else(|| (!lectures.is_empty()).then_some(0));

        ReadySession {
            course,
            lectures,
            current,
        }
    }

    //
    // ─── NAVIGATION ────────────────────────────────────────────────────────────
    //

    /// Make `lecture` current. Returns `false` without side effects when the
    /// session is not ready or the id is not in the course.
    pub async fn select_lecture(&mut self, lecture: &LectureId) -> bool {
        let Some(idx) = self.ready().and_then(|r| r.lectures.index_of(lecture)) else {
            tracing::debug!(course = %self.course_id, lecture = %lecture, "ignoring unknown lecture");
            return false;
        };
        self.move_to(idx).await;
        true
    }

    /// Step to the adjacent lecture. Returns `false` at either boundary.
    pub async fn navigate_relative(&mut self, direction: Direction) -> bool {
        let Some(idx) = self.ready().and_then(|r| r.step(direction)) else {
            return false;
        };
        self.move_to(idx).await;
        true
    }

    async fn move_to(&mut self, idx: usize) {
        let SessionState::Ready(ready) = &mut self.state else {
            return;
        };
        ready.current = Some(idx);
        let Some(lecture) = ready.lectures.get(idx).map(|l| l.id().clone()) else {
            return;
        };
        self.progress
            .update_last_viewed(&self.course_id, &lecture)
            .await;
    }

    //
    // ─── COMPLETION ────────────────────────────────────────────────────────────
    //

    /// Mark the current lecture complete. Never un-marks; returns `true` only
    /// when the lecture was not complete before.
    pub async fn mark_current_complete(&mut self) -> bool {
        let Some(lecture) = self.current_lecture().map(|l| l.id().clone()) else {
            return false;
        };
        let newly = self
            .progress
            .mark_lecture_complete(&self.course_id, &lecture)
            .await;
        if newly {
            self.notify_success("Lecture marked as complete");
            self.push_completion(&lecture, true).await;
        }
        newly
    }

    /// Flip completion of a lecture in this course. Ids that are not in the
    /// course are ignored and yield `None`.
    pub async fn toggle_lecture_completion(&mut self, lecture: &LectureId) -> Option<bool> {
        if !self.ready()?.lectures.contains(lecture) {
            tracing::debug!(course = %self.course_id, lecture = %lecture, "ignoring unknown lecture");
            return None;
        }
        let completed = self
            .progress
            .toggle_lecture_completion(&self.course_id, lecture)
            .await;
        if completed {
            self.notify_success("Lecture marked as complete");
        } else {
            self.notify_info("Lecture marked as incomplete");
        }
        self.push_completion(lecture, completed).await;
        Some(completed)
    }

    /// Apply a video player signal to the current lecture.
    pub async fn on_player_event(&mut self, event: PlayerEvent) {
        match event {
            PlayerEvent::VideoComplete => {
                self.mark_current_complete().await;
            }
            PlayerEvent::TimeUpdate { seconds } => {
                let Some(lecture) = self.current_lecture().cloned() else {
                    return;
                };
                self.progress
                    .save_video_progress(&self.course_id, lecture.id(), seconds, lecture.duration_secs())
                    .await;
            }
        }
    }

    async fn push_completion(&self, lecture: &LectureId, completed: bool) {
        let Some(sync) = &self.sync else {
            return;
        };
        if let Err(err) = sync
            .post_completion(&self.course_id, lecture, completed)
            .await
        {
            tracing::warn!(
                course = %self.course_id,
                lecture = %lecture,
                error = %err,
                "failed to sync completion"
            );
        }
    }

    //
    // ─── NOTES & BOOKMARKS ─────────────────────────────────────────────────────
    //

    /// Save a note for the current lecture. Returns `false` when there is none.
    pub async fn save_note(&mut self, text: &str) -> bool {
        let Some(lecture) = self.current_lecture().map(|l| l.id().clone()) else {
            return false;
        };
        self.progress
            .save_note(&self.course_id, &lecture, text)
            .await;
        self.notify_success("Note saved");
        true
    }

    /// Note of the current lecture; empty when none.
    #[must_use]
    pub fn note(&self) -> String {
        self.current_lecture()
            .map(|l| self.progress.get_note(&self.course_id, l.id()))
            .unwrap_or_default()
    }

    pub async fn toggle_bookmark(&mut self) -> bool {
        let bookmarked = self.progress.toggle_bookmark(&self.course_id).await;
        if bookmarked {
            self.notify_info("Course bookmarked");
        } else {
            self.notify_info("Bookmark removed");
        }
        bookmarked
    }

    //
    // ─── QUERIES ───────────────────────────────────────────────────────────────
    //

    #[must_use]
    pub fn course(&self) -> Option<&Course> {
        self.ready().map(|r| &r.course)
    }

    #[must_use]
    pub fn lectures(&self) -> Option<&LectureSequence> {
        self.ready().map(|r| &r.lectures)
    }

    #[must_use]
    pub fn current_lecture(&self) -> Option<&LectureSummary> {
        self.ready().and_then(ReadySession::current_lecture)
    }

    #[must_use]
    pub fn current_index(&self) -> Option<usize> {
        self.ready().and_then(|r| r.current)
    }

    #[must_use]
    pub fn has_previous(&self) -> bool {
        self.ready().is_some_and(ReadySession::has_previous)
    }

    #[must_use]
    pub fn has_next(&self) -> bool {
        self.ready().is_some_and(ReadySession::has_next)
    }

    #[must_use]
    pub fn is_completed(&self, lecture: &LectureId) -> bool {
        self.progress.is_completed(&self.course_id, lecture)
    }

    #[must_use]
    pub fn is_bookmarked(&self) -> bool {
        self.progress.is_bookmarked(&self.course_id)
    }

    /// Completion percentage of one week; 0 for unknown or empty weeks.
    #[must_use]
    pub fn week_progress_percent(&self, week: &WeekId) -> u8 {
        let Some(ready) = self.ready() else {
            return 0;
        };
        let (total, completed) = ready
            .lectures
            .week_lecture_ids(week)
            .fold((0, 0), |(total, done), id| {
                (total + 1, done + usize::from(self.is_completed(id)))
            });
        progress_percent(completed, total)
    }

    /// Completion percentage over lectures still present in the course.
    #[must_use]
    pub fn course_progress_percent(&self) -> u8 {
        self.ready().map_or(0, |r| {
            self.progress
                .course_progress_percent_within(&self.course_id, &r.lectures)
        })
    }

    #[must_use]
    pub fn progress(&self) -> SessionProgress {
        match self.ready() {
            Some(ready) => {
                let completed = self
                    .progress
                    .record(&self.course_id)
                    .completed_count_within(&ready.lectures);
                SessionProgress {
                    total: ready.lectures.len(),
                    completed,
                    percent: progress_percent(completed, ready.lectures.len()),
                    current_index: ready.current,
                }
            }
            None => SessionProgress {
                total: 0,
                completed: 0,
                percent: 0,
                current_index: None,
            },
        }
    }

    /// Fetch the full payload of the current lecture.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotReady` before the course is loaded,
    /// `SessionError::NoCurrentLecture` for an empty course, or the content
    /// error from the fetch. The session phase is not affected.
    pub async fn current_lecture_detail(&self) -> Result<LectureDetail, SessionError> {
        let ready = self.ready().ok_or(SessionError::NotReady)?;
        let lecture = ready
            .current_lecture()
            .ok_or(SessionError::NoCurrentLecture)?;
        let detail = self
            .content
            .fetch_lecture(&self.course_id, lecture.id())
            .await?;
        Ok(detail)
    }

    fn ready(&self) -> Option<&ReadySession> {
        match &self.state {
            SessionState::Ready(ready) => Some(ready),
            _ => None,
        }
    }

    fn notify_success(&self, message: &str) {
        if let Some(bridge) = &self.notifications {
            bridge.success(message);
        }
    }

    fn notify_info(&self, message: &str) {
        if let Some(bridge) = &self.notifications {
            bridge.info(message);
        }
    }

    fn notify_error(&self, message: &str) {
        if let Some(bridge) = &self.notifications {
            bridge.error(message);
        }
    }
}
