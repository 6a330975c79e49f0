// Streaming pipeline module
// Per-stream sessions, their channel driver and the event journal

pub mod driver;
pub mod journal;
pub mod session;

pub use driver::{run_session, spawn_session, SessionHandle};
pub use journal::{read_journal, EventJournal, JournalEntry, JournalError};
pub use session::{SessionError, SessionStats, SessionSummary, StreamSession};
