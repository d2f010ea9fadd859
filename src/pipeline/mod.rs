//! Pipeline entry points for the devart commands.
//!
//! - `MessageChecker` / `SentNotesChecker`: monitor cycles driven by `run_monitor`
//! - `run_deviations`: mirror the gallery into SQLite
//! - `run_notes`: mirror note folders and notes into SQLite
//! - `run_validate`: check configuration and credentials

pub mod check;
pub mod deviations;
pub mod diff;
pub mod monitor;
pub mod notes;
pub mod notify;
pub mod sent_notes;
pub mod validate;

pub use check::MessageChecker;
pub use deviations::run_deviations;
pub use diff::{Diff, DiffCalculator};
pub use monitor::{PollCycle, Schedule, run_monitor};
pub use notes::{NotesOptions, run_notes};
pub use notify::{CommandNotifier, Dispatcher, Notifier};
pub use sent_notes::SentNotesChecker;
pub use validate::run_validate;
