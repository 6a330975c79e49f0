// Notestream - Streaming note-event detector
// Module declarations

pub mod audio;
pub mod config;
pub mod events;
pub mod export;
pub mod pipeline;

pub use config::{ConfigError, DetectorConfig};
pub use events::{build_classifier, ClassifierBackend, NoteClassifier, StreamEvent};
pub use pipeline::{run_session, spawn_session, SessionSummary, StreamSession};
