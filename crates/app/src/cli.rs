//! Command-line front end over the course session services.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};

use course_core::model::{CourseId, LectureId};
use services::config::parse_url;
use services::{
    AppConfig, AppServices, Clock, ContentSource, CourseSessionController, Direction,
    Notification, NotificationBridge, PlayerEvent, SessionPhase, StaticContentSource,
};
use storage::Storage;

use crate::db;

#[derive(Parser)]
#[command(name = "course-progress")]
#[command(about = "Track lecture progress, notes and bookmarks for online courses", long_about = None)]
#[command(version)]
struct Cli {
    /// Content API base URL (also enables server progress sync)
    #[arg(long, global = true, conflicts_with = "content")]
    api: Option<String>,

    /// Read course content from a JSON catalog instead of the API
    #[arg(long, global = true, value_name = "FILE")]
    content: Option<PathBuf>,

    /// SQLite database holding progress
    #[arg(long, global = true, conflicts_with = "memory")]
    db: Option<String>,

    /// Keep progress in memory for this run only
    #[arg(long, global = true)]
    memory: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open a course at its last viewed lecture
    Open { course: CourseId },
    /// Jump to a lecture
    Select { course: CourseId, lecture: LectureId },
    /// Move to the next lecture
    Next { course: CourseId },
    /// Move to the previous lecture
    Prev { course: CourseId },
    /// Mark the current lecture complete
    Complete { course: CourseId },
    /// Flip completion of a lecture
    Toggle { course: CourseId, lecture: LectureId },
    /// Bookmark or un-bookmark a course
    Bookmark { course: CourseId },
    /// Show the current lecture's note, or replace it with TEXT
    Note {
        course: CourseId,
        /// New note text; an empty string deletes the note
        text: Option<String>,
    },
    /// Record the playback position of the current lecture
    Video { course: CourseId, seconds: f64 },
    /// Show course and per-week completion
    Progress { course: CourseId },
    /// Print the stored progress of every course as JSON
    State,
}

impl Commands {
    fn course(&self) -> Option<&CourseId> {
        match self {
            Self::Open { course }
            | Self::Select { course, .. }
            | Self::Next { course }
            | Self::Prev { course }
            | Self::Complete { course }
            | Self::Toggle { course, .. }
            | Self::Bookmark { course }
            | Self::Note { course, .. }
            | Self::Video { course, .. }
            | Self::Progress { course } => Some(course),
            Self::State => None,
        }
    }
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let services = build_services(&cli).await?;

    if !services.progress().is_durable() {
        eprintln!("warning: progress storage is unavailable; changes will not be kept");
    }

    let Some(course) = cli.command.course().cloned() else {
        let state = services.progress().snapshot();
        println!("{}", serde_json::to_string_pretty(&state)?);
        return Ok(());
    };

    let mut session = services.open_course(course).await;
    if session.phase() == SessionPhase::Errored {
        print_notifications(services.notifications());
        bail!(
            "could not load course: {}",
            session.error_message().unwrap_or("unknown error")
        );
    }

    let result = apply(&mut session, cli.command).await;
    print_session(&session);
    print_notifications(services.notifications());
    result
}

async fn build_services(cli: &Cli) -> Result<AppServices> {
    let mut config = AppConfig::from_env()?;
    if let Some(api) = &cli.api {
        config.api_base_url = Some(parse_url("--api", api.clone())?);
    }

    let content = match &cli.content {
        Some(path) => Some(Arc::new(
            StaticContentSource::from_path(path)
                .with_context(|| format!("loading content from {}", path.display()))?,
        ) as Arc<dyn ContentSource>),
        None => None,
    };

    let clock = Clock::default();
    if cli.memory {
        return Ok(AppServices::with_storage(&config, &Storage::in_memory(), content, clock).await?);
    }

    if let Some(db_url) = &cli.db {
        config.db_url.clone_from(db_url);
    }
    config.db_url = db::normalize_sqlite_url(&config.db_url);
    db::ensure_parent_dir(&config.db_url)?;
    tracing::info!(db = %config.db_url, "opening progress store");
    Ok(AppServices::from_config(&config, content, clock).await?)
}

async fn apply(session: &mut CourseSessionController, command: Commands) -> Result<()> {
    match command {
        Commands::Open { .. } | Commands::Progress { .. } | Commands::State => {}
        Commands::Select { lecture, .. } => {
            if !session.select_lecture(&lecture).await {
                bail!("lecture {lecture} is not part of this course");
            }
        }
        Commands::Next { .. } => {
            if !session.navigate_relative(Direction::Next).await {
                println!("already at the last lecture");
            }
        }
        Commands::Prev { .. } => {
            if !session.navigate_relative(Direction::Previous).await {
                println!("already at the first lecture");
            }
        }
        Commands::Complete { .. } => {
            if session.current_lecture().is_none() {
                bail!("this course has no lectures");
            }
            if !session.mark_current_complete().await {
                println!("lecture was already complete");
            }
        }
        Commands::Toggle { lecture, .. } => {
            if session.toggle_lecture_completion(&lecture).await.is_none() {
                bail!("lecture {lecture} is not part of this course");
            }
        }
        Commands::Bookmark { .. } => {
            session.toggle_bookmark().await;
        }
        Commands::Note { text, .. } => match text {
            Some(text) => {
                if !session.save_note(&text).await {
                    bail!("this course has no lectures");
                }
            }
            None => {
                let note = session.note();
                if note.is_empty() {
                    println!("(no note)");
                } else {
                    println!("{note}");
                }
            }
        },
        Commands::Video { seconds, .. } => {
            session
                .on_player_event(PlayerEvent::TimeUpdate { seconds })
                .await;
        }
    }
    Ok(())
}

fn print_session(session: &CourseSessionController) {
    let Some(course) = session.course() else {
        return;
    };
    let current = session.current_lecture().map(|l| l.id().clone());
    let progress = session.progress();

    println!(
        "{} [{}/{} lectures, {}%]{}",
        course.title(),
        progress.completed,
        progress.total,
        progress.percent,
        if session.is_bookmarked() { " *" } else { "" }
    );
    for week in course.weeks() {
        println!(
            "  {} ({}%)",
            week.title(),
            session.week_progress_percent(week.id())
        );
        for lecture in week.lectures() {
            let marker = if current.as_ref() == Some(lecture.id()) {
                '>'
            } else {
                ' '
            };
            let done = if session.is_completed(lecture.id()) {
                'x'
            } else {
                ' '
            };
            println!("   {marker} [{done}] {} {}", lecture.id(), lecture.title());
        }
    }
}

fn print_notifications(notifications: &NotificationBridge) {
    for notification in notifications.visible() {
        eprintln!("{}", notification_line(&notification));
    }
}

fn notification_line(notification: &Notification) -> String {
    format!("[{}] {}", notification.kind, notification.message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use services::NotificationConfig;

    #[tokio::test]
    async fn notification_lines_use_lowercase_kind() {
        let bridge = NotificationBridge::new(NotificationConfig::default());
        bridge.error("Failed to load course");
        bridge.success("Note saved");

        let lines: Vec<String> = bridge.visible().iter().map(notification_line).collect();
        assert_eq!(lines, vec!["[error] Failed to load course", "[success] Note saved"]);
    }
}
