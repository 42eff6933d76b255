use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use url::Url;

use course_core::model::{Course, CourseId, LectureDetail, LectureId, LectureSequence};

use crate::error::ContentError;
use crate::http::{endpoint, get_json};

/// Source of authoritative course content.
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Fetch the content tree of a course.
    ///
    /// # Errors
    ///
    /// Returns `ContentError` when the course cannot be fetched or decoded.
    async fn fetch_course(&self, course: &CourseId) -> Result<Course, ContentError>;

    /// Fetch the full payload of one lecture.
    ///
    /// # Errors
    ///
    /// Returns `ContentError` when the lecture cannot be fetched or decoded.
    async fn fetch_lecture(
        &self,
        course: &CourseId,
        lecture: &LectureId,
    ) -> Result<LectureDetail, ContentError>;
}

/// Content API client: `GET {base}/courses/{id}` and
/// `GET {base}/courses/{id}/lectures/{id}`.
#[derive(Clone)]
pub struct HttpContentSource {
    client: Client,
    base_url: Url,
}

impl HttpContentSource {
    #[must_use]
    pub fn new(base_url: Url) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    #[must_use]
    pub fn with_client(client: Client, base_url: Url) -> Self {
        Self { client, base_url }
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }
}

#[async_trait]
impl ContentSource for HttpContentSource {
    async fn fetch_course(&self, course: &CourseId) -> Result<Course, ContentError> {
        let url = endpoint(&self.base_url, &["courses", course.as_str()])?;
        let body: Course = get_json(&self.client, url).await?;
        body.ensure_id(course)?;
        Ok(body)
    }

    async fn fetch_lecture(
        &self,
        course: &CourseId,
        lecture: &LectureId,
    ) -> Result<LectureDetail, ContentError> {
        let url = endpoint(
            &self.base_url,
            &["courses", course.as_str(), "lectures", lecture.as_str()],
        )?;
        let body: LectureDetail = get_json(&self.client, url).await?;
        body.ensure_id(lecture)?;
        Ok(body)
    }
}

/// Content held in memory, loaded from a JSON catalog or inserted directly.
///
/// Lecture details that were not supplied are derived from the lecture's
/// entry in the content tree.
#[derive(Clone, Default)]
pub struct StaticContentSource {
    inner: Arc<Mutex<Catalog>>,
}

#[derive(Default)]
struct Catalog {
    courses: HashMap<CourseId, Course>,
    lectures: HashMap<(CourseId, LectureId), LectureDetail>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CatalogFile {
    Many(Vec<Course>),
    One(Course),
}

impl StaticContentSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a catalog holding either one course or an array of courses.
    ///
    /// # Errors
    ///
    /// Returns `ContentError::Unavailable` when the JSON does not describe courses.
    pub fn from_json_str(json: &str) -> Result<Self, ContentError> {
        let file: CatalogFile =
            serde_json::from_str(json).map_err(|err| ContentError::Unavailable(err.to_string()))?;
        let courses = match file {
            CatalogFile::Many(courses) => courses,
            CatalogFile::One(course) => vec![course],
        };
        let source = Self::new();
        for course in courses {
            source.insert_course(course);
        }
        Ok(source)
    }

    /// Read a catalog file from disk.
    ///
    /// # Errors
    ///
    /// Returns `ContentError::Unavailable` when the file cannot be read or parsed.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ContentError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|err| ContentError::Unavailable(format!("{}: {err}", path.display())))?;
        Self::from_json_str(&json)
    }

    pub fn insert_course(&self, course: Course) {
        self.lock().courses.insert(course.id().clone(), course);
    }

    pub fn insert_lecture(&self, course: CourseId, detail: LectureDetail) {
        self.lock()
            .lectures
            .insert((course, detail.id().clone()), detail);
    }

    /// Drop a course, so later fetches fail with `NotFound`.
    pub fn remove_course(&self, course: &CourseId) {
        self.lock().courses.remove(course);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Catalog> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ContentSource for StaticContentSource {
    async fn fetch_course(&self, course: &CourseId) -> Result<Course, ContentError> {
        self.lock()
            .courses
            .get(course)
            .cloned()
            .ok_or(ContentError::NotFound)
    }

    async fn fetch_lecture(
        &self,
        course: &CourseId,
        lecture: &LectureId,
    ) -> Result<LectureDetail, ContentError> {
        let catalog = self.lock();
        if let Some(detail) = catalog.lectures.get(&(course.clone(), lecture.clone())) {
            return Ok(detail.clone());
        }
        let tree = catalog.courses.get(course).ok_or(ContentError::NotFound)?;
        let sequence = LectureSequence::from_course(tree);
        let summary = sequence
            .index_of(lecture)
            .and_then(|idx| sequence.get(idx))
            .ok_or(ContentError::NotFound)?;
        Ok(LectureDetail::new(
            summary.id().clone(),
            summary.title(),
            None,
            None,
            summary.duration_secs(),
        ))
    }
}
