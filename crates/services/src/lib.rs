#![forbid(unsafe_code)]

pub mod app_services;
pub mod config;
pub mod content;
pub mod course_state;
pub mod error;
mod http;
pub mod notifications;
pub mod progress_sync;
pub mod sessions;

pub use course_core::Clock;

pub use app_services::AppServices;
pub use config::AppConfig;
pub use content::{ContentSource, HttpContentSource, StaticContentSource};
pub use course_state::CourseStateManager;
pub use error::{AppServicesError, ConfigError, ContentError, SessionError};
pub use notifications::{
    Notification, NotificationBridge, NotificationConfig, NotificationId, NotificationKind,
};
pub use progress_sync::{HttpProgressSync, ProgressSync};
pub use sessions::{CourseSessionController, Direction, PlayerEvent, SessionPhase, SessionProgress};
