mod course;
mod ids;
mod progress;
mod sequence;
mod state;

pub use course::{Course, CourseError, LectureDetail, LectureSummary, Week};
pub use ids::{CourseId, LectureId, ParseIdError, WeekId};
pub use progress::{CourseProgressRecord, progress_percent};
pub use sequence::LectureSequence;
pub use state::{
    COURSE_STATE_KEY, CourseProgressSnapshot, CourseState, CourseStateDocument, SnapshotNotes,
    snapshot_key,
};
