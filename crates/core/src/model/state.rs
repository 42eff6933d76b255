use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::ids::{CourseId, LectureId, ParseIdError};
use crate::model::progress::CourseProgressRecord;

/// Storage key of the cross-course aggregate.
pub const COURSE_STATE_KEY: &str = "course_state";

const SNAPSHOT_KEY_PREFIX: &str = "course_progress_";

/// Storage key of the single-course snapshot for `course`.
#[must_use]
pub fn snapshot_key(course: &CourseId) -> String {
    format!("{SNAPSHOT_KEY_PREFIX}{course}")
}

//
// ─── IN-MEMORY ROOT ────────────────────────────────────────────────────────────
//

/// Every learner-side progress record on this device, keyed by course.
///
/// Persists through [`CourseStateDocument`], the JSON shape stored under
/// [`COURSE_STATE_KEY`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "CourseStateDocument", into = "CourseStateDocument")]
pub struct CourseState {
    last_viewed_course_id: Option<CourseId>,
    last_viewed_lecture_id: Option<LectureId>,
    courses: BTreeMap<CourseId, CourseProgressRecord>,
}

impl CourseState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn last_viewed_course_id(&self) -> Option<&CourseId> {
        self.last_viewed_course_id.as_ref()
    }

    #[must_use]
    pub fn last_viewed_lecture_id(&self) -> Option<&LectureId> {
        self.last_viewed_lecture_id.as_ref()
    }

    #[must_use]
    pub fn record(&self, course: &CourseId) -> Option<&CourseProgressRecord> {
        self.courses.get(course)
    }

    /// Returns the record for `course`, creating an empty one on first use.
    pub fn record_mut(&mut self, course: &CourseId) -> &mut CourseProgressRecord {
        self.courses.entry(course.clone()).or_default()
    }

    pub fn insert_record(&mut self, course: CourseId, record: CourseProgressRecord) {
        self.courses.insert(course, record);
    }

    /// Points both the aggregate and the course record at `lecture`.
    pub fn set_last_viewed(&mut self, course: &CourseId, lecture: LectureId) {
        self.record_mut(course).set_last_viewed(lecture.clone());
        self.last_viewed_course_id = Some(course.clone());
        self.last_viewed_lecture_id = Some(lecture);
    }

    pub fn courses(&self) -> impl Iterator<Item = (&CourseId, &CourseProgressRecord)> {
        self.courses.iter()
    }

    pub fn bookmarked_courses(&self) -> impl Iterator<Item = &CourseId> {
        self.courses
            .iter()
            .filter(|(_, record)| record.is_bookmarked())
            .map(|(id, _)| id)
    }
}

//
// ─── PERSISTED SHAPES ──────────────────────────────────────────────────────────
//

/// JSON layout of the `course_state` key.
///
/// Ids stay plain strings at this layer so one unusable entry cannot discard
/// every other course; conversion into [`CourseState`] skips and logs them.
/// `lastViewedLectures` keeps a per-course pointer; documents written before it
/// existed fall back to the global `lastViewedLectureId` for the last course.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CourseStateDocument {
    pub last_viewed_course_id: Option<String>,
    pub last_viewed_lecture_id: Option<String>,
    pub last_viewed_lectures: BTreeMap<String, String>,
    pub completed_lectures: BTreeMap<String, Vec<String>>,
    pub bookmarked_courses: Vec<String>,
    pub notes: BTreeMap<String, BTreeMap<String, String>>,
    pub video_progress: BTreeMap<String, BTreeMap<String, f64>>,
}

fn stored_id<I>(raw: String, field: &'static str) -> Option<I>
where
    I: TryFrom<String, Error = ParseIdError>,
{
    I::try_from(raw)
        .map_err(|err| tracing::warn!(field, error = %err, "skipping invalid id in stored progress"))
        .ok()
}

fn stored_record<'a>(
    courses: &'a mut BTreeMap<CourseId, CourseProgressRecord>,
    raw: String,
    field: &'static str,
) -> Option<&'a mut CourseProgressRecord> {
    let course = stored_id::<CourseId>(raw, field)?;
    Some(courses.entry(course).or_default())
}

impl From<CourseStateDocument> for CourseState {
    fn from(doc: CourseStateDocument) -> Self {
        let last_viewed_course_id = doc
            .last_viewed_course_id
            .and_then(|raw| stored_id::<CourseId>(raw, "lastViewedCourseId"));
        let last_viewed_lecture_id = doc
            .last_viewed_lecture_id
            .and_then(|raw| stored_id::<LectureId>(raw, "lastViewedLectureId"));

        let mut courses = BTreeMap::new();
        for (course, lecture) in doc.last_viewed_lectures {
            let Some(lecture) = stored_id::<LectureId>(lecture, "lastViewedLectures") else {
                continue;
            };
            if let Some(record) = stored_record(&mut courses, course, "lastViewedLectures") {
                record.set_last_viewed(lecture);
            }
        }
        if let (Some(course), Some(lecture)) = (&last_viewed_course_id, &last_viewed_lecture_id) {
            let record = courses.entry(course.clone()).or_default();
            if record.last_viewed_lecture_id().is_none() {
                record.set_last_viewed(lecture.clone());
            }
        }
        for (course, lectures) in doc.completed_lectures {
            if let Some(record) = stored_record(&mut courses, course, "completedLectures") {
                for lecture in lectures {
                    if let Some(lecture) = stored_id(lecture, "completedLectures") {
                        record.mark_completed(lecture);
                    }
                }
            }
        }
        for course in doc.bookmarked_courses {
            if let Some(record) = stored_record(&mut courses, course, "bookmarkedCourses") {
                record.set_bookmarked(true);
            }
        }
        for (course, notes) in doc.notes {
            if let Some(record) = stored_record(&mut courses, course, "notes") {
                for (lecture, text) in notes {
                    if let Some(lecture) = stored_id(lecture, "notes") {
                        record.set_note(lecture, text);
                    }
                }
            }
        }
        for (course, positions) in doc.video_progress {
            if let Some(record) = stored_record(&mut courses, course, "videoProgress") {
                for (lecture, seconds) in positions {
                    if let Some(lecture) = stored_id(lecture, "videoProgress") {
                        record.set_video_progress(lecture, seconds, None);
                    }
                }
            }
        }

        Self {
            last_viewed_course_id,
            last_viewed_lecture_id,
            courses,
        }
    }
}

fn lecture_map<V: Clone>(map: &BTreeMap<LectureId, V>) -> BTreeMap<String, V> {
    map.iter()
        .map(|(id, value)| (id.to_string(), value.clone()))
        .collect()
}

impl From<CourseState> for CourseStateDocument {
    fn from(state: CourseState) -> Self {
        let mut doc = CourseStateDocument {
            last_viewed_course_id: state.last_viewed_course_id.map(String::from),
            last_viewed_lecture_id: state.last_viewed_lecture_id.map(String::from),
            ..CourseStateDocument::default()
        };
        for (course, record) in state.courses {
            let course = String::from(course);
            if let Some(lecture) = record.last_viewed_lecture_id() {
                doc.last_viewed_lectures
                    .insert(course.clone(), lecture.to_string());
            }
            if !record.completed_lecture_ids().is_empty() {
                doc.completed_lectures.insert(
                    course.clone(),
                    record
                        .completed_lecture_ids()
                        .iter()
                        .map(ToString::to_string)
                        .collect(),
                );
            }
            if record.is_bookmarked() {
                doc.bookmarked_courses.push(course.clone());
            }
            if !record.notes().is_empty() {
                doc.notes.insert(course.clone(), lecture_map(record.notes()));
            }
            if !record.video_progress_map().is_empty() {
                doc.video_progress
                    .insert(course, lecture_map(record.video_progress_map()));
            }
        }
        doc
    }
}

/// Notes as stored in a single-course snapshot.
///
/// Older snapshots kept one free-text blob per course; the per-lecture mapping
/// is the only shape written now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SnapshotNotes {
    PerLecture(BTreeMap<LectureId, String>),
    Legacy(String),
}

impl Default for SnapshotNotes {
    fn default() -> Self {
        Self::PerLecture(BTreeMap::new())
    }
}

/// JSON layout of a `course_progress_<courseId>` key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseProgressSnapshot {
    pub course_id: CourseId,
    #[serde(default)]
    pub completed_lectures: Vec<LectureId>,
    #[serde(default)]
    pub last_lecture_id: Option<LectureId>,
    #[serde(default)]
    pub notes: SnapshotNotes,
    #[serde(default)]
    pub timestamp: i64,
}

impl CourseProgressSnapshot {
    #[must_use]
    pub fn from_record(course: &CourseId, record: &CourseProgressRecord, timestamp: i64) -> Self {
        Self {
            course_id: course.clone(),
            completed_lectures: record.completed_lecture_ids().iter().cloned().collect(),
            last_lecture_id: record.last_viewed_lecture_id().cloned(),
            notes: SnapshotNotes::PerLecture(record.notes().clone()),
            timestamp,
        }
    }

    /// Converts the snapshot into a record.
    ///
    /// A legacy note blob is attached to the last lecture; without one it is
    /// dropped.
    #[must_use]
    pub fn into_record(self) -> CourseProgressRecord {
        let notes = match self.notes {
            SnapshotNotes::PerLecture(notes) => notes,
            SnapshotNotes::Legacy(text) => match (&self.last_lecture_id, text.is_empty()) {
                (Some(lecture), false) => BTreeMap::from([(lecture.clone(), text)]),
                _ => BTreeMap::new(),
            },
        };
        CourseProgressRecord::from_parts(
            self.last_lecture_id,
            self.completed_lectures.into_iter().collect(),
            false,
            notes,
            BTreeMap::new(),
        )
    }
}
