use std::sync::Arc;
use std::time::Duration;

use course_core::model::CourseId;
use storage::repository::Storage;

use crate::config::AppConfig;
use crate::content::{ContentSource, HttpContentSource};
use crate::course_state::CourseStateManager;
use crate::error::{AppServicesError, ConfigError};
use crate::notifications::{NotificationBridge, NotificationConfig};
use crate::progress_sync::{HttpProgressSync, ProgressSync};
use crate::sessions::CourseSessionController;
use crate::Clock;

/// Composition root: one state manager and one notification bridge per
/// process, shared by every course session it opens.
#[derive(Clone)]
pub struct AppServices {
    progress: CourseStateManager,
    content: Arc<dyn ContentSource>,
    sync: Option<Arc<dyn ProgressSync>>,
    notifications: NotificationBridge,
    fetch_timeout: Option<Duration>,
}

impl AppServices {
    /// Build services from configuration, backed by `SQLite` storage.
    ///
    /// `content` overrides the HTTP content API from `config`; progress sync
    /// is enabled whenever `config` names an API base URL.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage cannot be opened or no content
    /// source is available.
    pub async fn from_config(
        config: &AppConfig,
        content: Option<Arc<dyn ContentSource>>,
        clock: Clock,
    ) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(&config.db_url).await?;
        Self::with_storage(config, &storage, content, clock).await
    }

    /// Build services over an existing storage handle.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingContentSource` when neither `content` nor
    /// an API base URL is given.
    pub async fn with_storage(
        config: &AppConfig,
        storage: &Storage,
        content: Option<Arc<dyn ContentSource>>,
        clock: Clock,
    ) -> Result<Self, AppServicesError> {
        let content = match (content, &config.api_base_url) {
            (Some(content), _) => content,
            (None, Some(base)) => Arc::new(HttpContentSource::new(base.clone())),
            (None, None) => return Err(ConfigError::MissingContentSource.into()),
        };
        let sync = config
            .api_base_url
            .clone()
            .map(|base| Arc::new(HttpProgressSync::new(base)) as Arc<dyn ProgressSync>);

        let progress = CourseStateManager::load(Arc::clone(&storage.kv), clock).await;
        Ok(Self {
            progress,
            content,
            sync,
            notifications: NotificationBridge::new(config.notifications),
            fetch_timeout: config.fetch_timeout,
        })
    }

    /// In-memory services for tests and throwaway sessions.
    pub async fn in_memory(content: Arc<dyn ContentSource>, clock: Clock) -> Self {
        let storage = Storage::in_memory();
        Self {
            progress: CourseStateManager::load(storage.kv, clock).await,
            content,
            sync: None,
            notifications: NotificationBridge::new(NotificationConfig::default()),
            fetch_timeout: None,
        }
    }

    #[must_use]
    pub fn progress(&self) -> &CourseStateManager {
        &self.progress
    }

    #[must_use]
    pub fn notifications(&self) -> &NotificationBridge {
        &self.notifications
    }

    /// A session for `course` in the `Loading` phase; call `open` to load it.
    #[must_use]
    pub fn session(&self, course: CourseId) -> CourseSessionController {
        let session = CourseSessionController::new(
            course,
            Arc::clone(&self.content),
            self.progress.clone(),
        )
        .with_notifications(self.notifications.clone())
        .with_fetch_timeout(self.fetch_timeout);
        match &self.sync {
            Some(sync) => session.with_sync(Arc::clone(sync)),
            None => session,
        }
    }

    /// Open a session for `course`, landing in `Ready` or `Errored`.
    pub async fn open_course(&self, course: CourseId) -> CourseSessionController {
        let mut session = self.session(course);
        session.open().await;
        session
    }

    /// Reopen the most recently viewed course, if any.
    pub async fn resume_last_course(&self) -> Option<CourseSessionController> {
        let (course, _) = self.progress.last_viewed()?;
        Some(self.open_course(course).await)
    }
}
