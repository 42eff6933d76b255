use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{CourseId, LectureId, WeekId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CourseError {
    #[error("requested course {requested} but received {received}")]
    CourseMismatch {
        requested: CourseId,
        received: CourseId,
    },

    #[error("requested lecture {requested} but received {received}")]
    LectureMismatch {
        requested: LectureId,
        received: LectureId,
    },
}

//
// ─── CONTENT TREE ──────────────────────────────────────────────────────────────
//

/// A course as returned by the content API: ordered weeks of ordered lectures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    id: CourseId,
    #[serde(default)]
    title: String,
    #[serde(default)]
    weeks: Vec<Week>,
}

impl Course {
    #[must_use]
    pub fn new(id: CourseId, title: impl Into<String>, weeks: Vec<Week>) -> Self {
        Self {
            id,
            title: title.into(),
            weeks,
        }
    }

    #[must_use]
    pub fn id(&self) -> &CourseId {
        &self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn weeks(&self) -> &[Week] {
        &self.weeks
    }

    /// Checks that the payload describes the course that was asked for.
    ///
    /// # Errors
    ///
    /// Returns `CourseError::CourseMismatch` when the ids differ.
    pub fn ensure_id(&self, requested: &CourseId) -> Result<(), CourseError> {
        if &self.id == requested {
            Ok(())
        } else {
            Err(CourseError::CourseMismatch {
                requested: requested.clone(),
                received: self.id.clone(),
            })
        }
    }
}

/// A week (module) groups lectures in display order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Week {
    id: WeekId,
    #[serde(default)]
    title: String,
    #[serde(default)]
    lectures: Vec<LectureSummary>,
}

impl Week {
    #[must_use]
    pub fn new(id: WeekId, title: impl Into<String>, lectures: Vec<LectureSummary>) -> Self {
        Self {
            id,
            title: title.into(),
            lectures,
        }
    }

    #[must_use]
    pub fn id(&self) -> &WeekId {
        &self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn lectures(&self) -> &[LectureSummary] {
        &self.lectures
    }
}

/// Lecture entry inside the content tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LectureSummary {
    id: LectureId,
    #[serde(default)]
    title: String,
    #[serde(default, alias = "duration")]
    duration_secs: Option<f64>,
}

impl LectureSummary {
    #[must_use]
    pub fn new(id: LectureId, title: impl Into<String>, duration_secs: Option<f64>) -> Self {
        Self {
            id,
            title: title.into(),
            duration_secs,
        }
    }

    #[must_use]
    pub fn id(&self) -> &LectureId {
        &self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Known duration in seconds. Negative or non-finite values count as unknown.
    #[must_use]
    pub fn duration_secs(&self) -> Option<f64> {
        known_duration(self.duration_secs)
    }
}

/// Full lecture payload from the lecture-detail endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LectureDetail {
    id: LectureId,
    #[serde(default)]
    title: String,
    #[serde(default)]
    video_url: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default, alias = "duration")]
    duration_secs: Option<f64>,
}

impl LectureDetail {
    #[must_use]
    pub fn new(
        id: LectureId,
        title: impl Into<String>,
        video_url: Option<String>,
        content: Option<String>,
        duration_secs: Option<f64>,
    ) -> Self {
        Self {
            id,
            title: title.into(),
            video_url,
            content,
            duration_secs,
        }
    }

    #[must_use]
    pub fn id(&self) -> &LectureId {
        &self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn video_url(&self) -> Option<&str> {
        self.video_url.as_deref()
    }

    #[must_use]
    pub fn content(&self) -> Option<&str> {
        self.content.as_deref()
    }

    #[must_use]
    pub fn duration_secs(&self) -> Option<f64> {
        known_duration(self.duration_secs)
    }

    /// Checks that the payload describes the lecture that was asked for.
    ///
    /// # Errors
    ///
    /// Returns `CourseError::LectureMismatch` when the ids differ.
    pub fn ensure_id(&self, requested: &LectureId) -> Result<(), CourseError> {
        if &self.id == requested {
            Ok(())
        } else {
            Err(CourseError::LectureMismatch {
                requested: requested.clone(),
                received: self.id.clone(),
            })
        }
    }
}

fn known_duration(raw: Option<f64>) -> Option<f64> {
    raw.filter(|secs| secs.is_finite() && *secs >= 0.0)
}
