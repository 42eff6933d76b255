use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

use course_core::model::{CourseId, LectureId};

use crate::error::ContentError;
use crate::http::{check_status, endpoint, get_json};

/// Server-side completion record for a course.
///
/// Local state stays authoritative; the server copy is merged in on load and
/// told about completion changes on a best-effort basis.
#[async_trait]
pub trait ProgressSync: Send + Sync {
    /// Lectures the server has recorded as complete.
    ///
    /// # Errors
    ///
    /// Returns `ContentError` when the server cannot be reached or answers badly.
    async fn fetch_completed(&self, course: &CourseId) -> Result<Vec<LectureId>, ContentError>;

    /// Report a completion change.
    ///
    /// # Errors
    ///
    /// Returns `ContentError` when the server rejects or cannot receive the update.
    async fn post_completion(
        &self,
        course: &CourseId,
        lecture: &LectureId,
        completed: bool,
    ) -> Result<(), ContentError>;
}

/// `GET` / `POST {base}/courses/{id}/progress`.
#[derive(Clone)]
pub struct HttpProgressSync {
    client: Client,
    base_url: Url,
}

impl HttpProgressSync {
    #[must_use]
    pub fn new(base_url: Url) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    #[must_use]
    pub fn with_client(client: Client, base_url: Url) -> Self {
        Self { client, base_url }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProgressResponse {
    #[serde(default)]
    completed_lectures: Vec<LectureId>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CompletionUpdate<'a> {
    lecture_id: &'a LectureId,
    completed: bool,
}

#[async_trait]
impl ProgressSync for HttpProgressSync {
    async fn fetch_completed(&self, course: &CourseId) -> Result<Vec<LectureId>, ContentError> {
        let url = endpoint(&self.base_url, &["courses", course.as_str(), "progress"])?;
        let body: ProgressResponse = get_json(&self.client, url).await?;
        Ok(body.completed_lectures)
    }

    async fn post_completion(
        &self,
        course: &CourseId,
        lecture: &LectureId,
        completed: bool,
    ) -> Result<(), ContentError> {
        let url = endpoint(&self.base_url, &["courses", course.as_str(), "progress"])?;
        tracing::debug!(%url, lecture = %lecture, completed, "POST");
        let response = self
            .client
            .post(url)
            .json(&CompletionUpdate {
                lecture_id: lecture,
                completed,
            })
            .send()
            .await?;
        check_status(response)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_update_uses_camel_case() {
        let lecture = LectureId::new("L3").unwrap();
        let json = serde_json::to_value(CompletionUpdate {
            lecture_id: &lecture,
            completed: true,
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({ "lectureId": "L3", "completed": true }));
    }

    #[test]
    fn progress_response_defaults_to_empty() {
        let body: ProgressResponse = serde_json::from_str("{}").unwrap();
        assert!(body.completed_lectures.is_empty());
    }
}
