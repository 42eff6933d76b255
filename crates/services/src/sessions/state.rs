use course_core::model::{Course, LectureSequence, LectureSummary};

/// Observable phase of a course session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Loading,
    Ready,
    Errored,
}

/// Relative move through the flattened lecture list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Previous,
    Next,
}

/// Signals from the video player collaborator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlayerEvent {
    /// Playback reached the end of the current lecture.
    VideoComplete,
    /// Periodic playback position of the current lecture.
    TimeUpdate { seconds: f64 },
}

pub(super) enum SessionState {
    Loading,
    Ready(ReadySession),
    Errored { message: String },
}

impl SessionState {
    pub(super) fn phase(&self) -> SessionPhase {
        match self {
            SessionState::Loading => SessionPhase::Loading,
            SessionState::Ready(_) => SessionPhase::Ready,
            SessionState::Errored { .. } => SessionPhase::Errored,
        }
    }
}

/// Loaded course plus the position within its flattened lectures.
///
/// `current` is `None` only when the course has no lectures.
pub(super) struct ReadySession {
    pub(super) course: Course,
    pub(super) lectures: LectureSequence,
    pub(super) current: Option<usize>,
}

impl ReadySession {
    pub(super) fn current_lecture(&self) -> Option<&LectureSummary> {
        self.current.and_then(|idx| self.lectures.get(idx))
    }

    pub(super) fn has_previous(&self) -> bool {
        self.current.is_some_and(|idx| idx > 0)
    }

    pub(super) fn has_next(&self) -> bool {
        self.current
            .is_some_and(|idx| idx + 1 < self.lectures.len())
    }

    /// Index reached by moving one step, or `None` at a boundary.
    pub(super) fn step(&self, direction: Direction) -> Option<usize> {
        let idx = self.current?;
        match direction {
            Direction::Previous => idx.checked_sub(1),
            Direction::Next => Some(idx + 1).filter(|next| *next < self.lectures.len()),
        }
    }
}
