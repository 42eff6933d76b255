mod controller;
mod progress;
mod state;

// Public API of the course session subsystem.
pub use crate::error::SessionError;
pub use controller::CourseSessionController;
pub use progress::SessionProgress;
pub use state::{Direction, PlayerEvent, SessionPhase};
