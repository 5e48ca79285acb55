pub mod controller;
pub mod events;
pub mod state;
mod tracking;

pub use controller::{RestoreOutcome, RunController};
pub use events::RunEvent;
pub use state::{RunStatus, SessionState};
