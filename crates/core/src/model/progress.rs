use std::collections::{BTreeMap, BTreeSet};

use crate::model::ids::LectureId;
use crate::model::sequence::LectureSequence;

/// Durable per-course learner state.
///
/// Always fully populated: an absent record and `CourseProgressRecord::new()`
/// are indistinguishable to callers, so nothing downstream needs to default
/// missing fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CourseProgressRecord {
    last_viewed_lecture_id: Option<LectureId>,
    completed_lecture_ids: BTreeSet<LectureId>,
    is_bookmarked: bool,
    notes: BTreeMap<LectureId, String>,
    video_progress: BTreeMap<LectureId, f64>,
}

impl CourseProgressRecord {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a record from persisted parts, dropping invalid video positions.
    #[must_use]
    pub fn from_parts(
        last_viewed_lecture_id: Option<LectureId>,
        completed_lecture_ids: BTreeSet<LectureId>,
        is_bookmarked: bool,
        notes: BTreeMap<LectureId, String>,
        video_progress: BTreeMap<LectureId, f64>,
    ) -> Self {
        let video_progress = video_progress
            .into_iter()
            .map(|(id, secs)| (id, clamp_seconds(secs, None)))
            .collect();
        Self {
            last_viewed_lecture_id,
            completed_lecture_ids,
            is_bookmarked,
            notes,
            video_progress,
        }
    }

    #[must_use]
    pub fn last_viewed_lecture_id(&self) -> Option<&LectureId> {
        self.last_viewed_lecture_id.as_ref()
    }

    pub fn set_last_viewed(&mut self, lecture: LectureId) {
        self.last_viewed_lecture_id = Some(lecture);
    }

    #[must_use]
    pub fn completed_lecture_ids(&self) -> &BTreeSet<LectureId> {
        &self.completed_lecture_ids
    }

    #[must_use]
    pub fn is_completed(&self, lecture: &LectureId) -> bool {
        self.completed_lecture_ids.contains(lecture)
    }

    /// Flips membership and returns the new state.
    pub fn toggle_completion(&mut self, lecture: LectureId) -> bool {
        if self.completed_lecture_ids.remove(&lecture) {
            false
        } else {
            self.completed_lecture_ids.insert(lecture);
            true
        }
    }

    /// Marks a lecture complete. Returns `true` only if it was not complete yet.
    pub fn mark_completed(&mut self, lecture: LectureId) -> bool {
        self.completed_lecture_ids.insert(lecture)
    }

    /// Adds every id not already present; returns how many were added.
    pub fn merge_completed(&mut self, lectures: impl IntoIterator<Item = LectureId>) -> usize {
        lectures
            .into_iter()
            .filter(|id| self.completed_lecture_ids.insert(id.clone()))
            .count()
    }

    /// Completed lectures that still exist in `sequence`.
    #[must_use]
    pub fn completed_count_within(&self, sequence: &LectureSequence) -> usize {
        self.completed_lecture_ids
            .iter()
            .filter(|id| sequence.contains(id))
            .count()
    }

    #[must_use]
    pub fn is_bookmarked(&self) -> bool {
        self.is_bookmarked
    }

    pub fn toggle_bookmark(&mut self) -> bool {
        self.is_bookmarked = !self.is_bookmarked;
        self.is_bookmarked
    }

    pub fn set_bookmarked(&mut self, bookmarked: bool) {
        self.is_bookmarked = bookmarked;
    }

    #[must_use]
    pub fn notes(&self) -> &BTreeMap<LectureId, String> {
        &self.notes
    }

    /// Note text for a lecture; empty when none was saved.
    #[must_use]
    pub fn note(&self, lecture: &LectureId) -> &str {
        self.notes.get(lecture).map_or("", String::as_str)
    }

    pub fn set_note(&mut self, lecture: LectureId, text: impl Into<String>) {
        let text = text.into();
        if text.is_empty() {
            self.notes.remove(&lecture);
        } else {
            self.notes.insert(lecture, text);
        }
    }

    #[must_use]
    pub fn video_progress_map(&self) -> &BTreeMap<LectureId, f64> {
        &self.video_progress
    }

    /// Elapsed seconds for a lecture; 0 when none was saved.
    #[must_use]
    pub fn video_progress(&self, lecture: &LectureId) -> f64 {
        self.video_progress
            .get(lecture)
            .map_or(0.0, |secs| clamp_seconds(*secs, None))
    }

    /// Stores elapsed seconds clamped to `[0, max]` and returns the stored value.
    pub fn set_video_progress(&mut self, lecture: LectureId, seconds: f64, max: Option<f64>) -> f64 {
        let clamped = clamp_seconds(seconds, max);
        self.video_progress.insert(lecture, clamped);
        clamped
    }

    /// True when the record carries nothing worth persisting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

fn clamp_seconds(seconds: f64, max: Option<f64>) -> f64 {
    if !seconds.is_finite() {
        return 0.0;
    }
    let floor = seconds.max(0.0);
    match max.filter(|m| m.is_finite() && *m >= 0.0) {
        Some(max) => floor.min(max),
        None => floor,
    }
}

/// `round(100 * completed / total)` capped at 100; 0 when `total` is 0.
#[must_use]
pub fn progress_percent(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    let completed = completed.min(total);
    #[allow(clippy::cast_precision_loss)]
    let ratio = completed as f64 / total as f64;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let percent = (ratio * 100.0).round() as u8;
    percent
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lid(id: &str) -> LectureId {
        LectureId::new(id).unwrap()
    }

    #[test]
    fn toggle_twice_restores_membership() {
        let mut record = CourseProgressRecord::new();
        assert!(record.toggle_completion(lid("L1")));
        assert!(!record.toggle_completion(lid("L1")));
        assert!(!record.is_completed(&lid("L1")));
    }

    #[test]
    fn mark_completed_never_unmarks() {
        let mut record = CourseProgressRecord::new();
        assert!(record.mark_completed(lid("L1")));
        assert!(!record.mark_completed(lid("L1")));
        assert!(record.is_completed(&lid("L1")));
    }

    #[test]
    fn video_progress_is_clamped() {
        let mut record = CourseProgressRecord::new();
        assert_eq!(record.set_video_progress(lid("L1"), -5.0, None), 0.0);
        assert_eq!(record.set_video_progress(lid("L1"), 700.0, Some(600.0)), 600.0);
        assert_eq!(record.set_video_progress(lid("L1"), f64::INFINITY, None), 0.0);
        assert_eq!(record.video_progress(&lid("missing")), 0.0);
    }

    #[test]
    fn percent_rounds_and_caps() {
        assert_eq!(progress_percent(2, 10), 20);
        assert_eq!(progress_percent(1, 3), 33);
        assert_eq!(progress_percent(2, 3), 67);
        assert_eq!(progress_percent(5, 0), 0);
        assert_eq!(progress_percent(12, 10), 100);
    }

    #[test]
    fn empty_note_clears_entry() {
        let mut record = CourseProgressRecord::new();
        record.set_note(lid("L1"), "hello");
        assert_eq!(record.note(&lid("L1")), "hello");
        record.set_note(lid("L1"), "");
        assert_eq!(record.note(&lid("L1")), "");
        assert!(record.is_empty());
    }

    #[test]
    fn completed_count_ignores_stale_ids() {
        use crate::model::{Course, CourseId, LectureSummary, Week, WeekId};

        let course = Course::new(
            CourseId::new("C").unwrap(),
            "",
            vec![Week::new(
                WeekId::new("W").unwrap(),
                "",
                vec![LectureSummary::new(lid("L1"), "", None)],
            )],
        );
        let seq = LectureSequence::from_course(&course);
        let mut record = CourseProgressRecord::new();
        record.mark_completed(lid("L1"));
        record.mark_completed(lid("gone"));
        assert_eq!(record.completed_count_within(&seq), 1);
    }
}
