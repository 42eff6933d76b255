use std::collections::HashMap;

use crate::model::course::{Course, LectureSummary};
use crate::model::ids::{LectureId, WeekId};

/// Flattened, ordered view of a course's lectures.
///
/// Order is the tree traversal order (weeks in order, lectures in order within
/// each week) and is the canonical sequence for previous/next navigation and
/// index-based progress. A lecture id that appears more than once keeps its
/// first position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LectureSequence {
    lectures: Vec<SequencedLecture>,
    index: HashMap<LectureId, usize>,
}

#[derive(Debug, Clone, PartialEq)]
struct SequencedLecture {
    week_id: WeekId,
    lecture: LectureSummary,
}

impl LectureSequence {
    #[must_use]
    pub fn from_course(course: &Course) -> Self {
        let mut lectures = Vec::new();
        let mut index = HashMap::new();
        for week in course.weeks() {
            for lecture in week.lectures() {
                if index.contains_key(lecture.id()) {
                    continue;
                }
                index.insert(lecture.id().clone(), lectures.len());
                lectures.push(SequencedLecture {
                    week_id: week.id().clone(),
                    lecture: lecture.clone(),
                });
            }
        }
        Self { lectures, index }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lectures.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lectures.is_empty()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&LectureSummary> {
        self.lectures.get(index).map(|entry| &entry.lecture)
    }

    #[must_use]
    pub fn first(&self) -> Option<&LectureSummary> {
        self.get(0)
    }

    #[must_use]
    pub fn index_of(&self, id: &LectureId) -> Option<usize> {
        self.index.get(id).copied()
    }

    #[must_use]
    pub fn contains(&self, id: &LectureId) -> bool {
        self.index.contains_key(id)
    }

    /// Week that owns the lecture at `index`.
    #[must_use]
    pub fn week_of(&self, index: usize) -> Option<&WeekId> {
        self.lectures.get(index).map(|entry| &entry.week_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &LectureSummary> {
        self.lectures.iter().map(|entry| &entry.lecture)
    }

    pub fn ids(&self) -> impl Iterator<Item = &LectureId> {
        self.iter().map(LectureSummary::id)
    }

    /// Lecture ids that belong to `week`, in sequence order.
    pub fn week_lecture_ids<'a>(&'a self, week: &'a WeekId) -> impl Iterator<Item = &'a LectureId> {
        self.lectures
            .iter()
            .filter(move |entry| &entry.week_id == week)
            .map(|entry| entry.lecture.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::course::Week;
    use crate::model::ids::CourseId;

    fn lecture(id: &str) -> LectureSummary {
        LectureSummary::new(LectureId::new(id).unwrap(), id, Some(60.0))
    }

    fn course() -> Course {
        Course::new(
            CourseId::new("C").unwrap(),
            "Course",
            vec![
                Week::new(WeekId::new("W1").unwrap(), "", vec![lecture("a"), lecture("b")]),
                Week::new(WeekId::new("W2").unwrap(), "", vec![lecture("c"), lecture("a")]),
            ],
        )
    }

    #[test]
    fn flattens_in_tree_order_and_skips_duplicates() {
        let seq = LectureSequence::from_course(&course());
        let ids: Vec<&str> = seq.ids().map(LectureId::as_str).collect();
        assert_eq!(ids, ["a", "b", "c"]);
        assert_eq!(seq.index_of(&LectureId::new("c").unwrap()), Some(2));
        assert_eq!(seq.week_of(2).map(WeekId::as_str), Some("W2"));
    }

    #[test]
    fn week_lecture_ids_follow_first_occurrence() {
        let seq = LectureSequence::from_course(&course());
        let w2 = WeekId::new("W2").unwrap();
        let ids: Vec<&str> = seq.week_lecture_ids(&w2).map(LectureId::as_str).collect();
        assert_eq!(ids, ["c"]);
    }

    #[test]
    fn empty_course_has_no_first_lecture() {
        let seq = LectureSequence::from_course(&Course::new(
            CourseId::new("C").unwrap(),
            "",
            Vec::new(),
        ));
        assert!(seq.is_empty());
        assert!(seq.first().is_none());
    }
}
