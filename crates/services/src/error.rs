//! Shared error types for the services crate.

use std::time::Duration;

use thiserror::Error;

use course_core::model::CourseError;
use storage::sqlite::SqliteInitError;

/// Errors from the remote content and progress endpoints.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ContentError {
    #[error("course content not found")]
    NotFound,
    #[error("content request failed with status {0}")]
    HttpStatus(reqwest::StatusCode),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("content request timed out after {0:?}")]
    Timeout(Duration),
    #[error("base URL cannot carry a path: {0}")]
    InvalidBaseUrl(String),
    #[error(transparent)]
    Course(#[from] CourseError),
    #[error("content source unavailable: {0}")]
    Unavailable(String),
}

/// Errors emitted by `CourseSessionController` operations that need a loaded course.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error("course session is not ready")]
    NotReady,
    #[error("course has no lectures")]
    NoCurrentLecture,
    #[error(transparent)]
    Content(#[from] ContentError),
}

/// Errors raised while reading configuration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("{var} must be a positive integer, got {raw:?}")]
    InvalidNumber { var: &'static str, raw: String },
    #[error("{var} is not a valid URL: {raw:?}")]
    InvalidUrl { var: &'static str, raw: String },
    #[error("no content source configured")]
    MissingContentSource,
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}
