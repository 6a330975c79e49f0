// Note event detection module
// Event model, classifier contract, harmonic suppression and the note state machine

pub mod backend;
pub mod clock;
pub mod hysteresis;
pub mod spectral;
pub mod suppression;
pub mod types;

pub use backend::{
    build_classifier, ActivationModel, ActivationRows, ClassifierBackend, ClassifierError,
    FocusedModel, NoteClassifier,
};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use hysteresis::{ActiveNote, NoteThresholds, NoteTracker};
pub use spectral::{SpectralClassifier, SpectralConfig};
pub use suppression::suppress_harmonics;
pub use types::{
    AttackKind, FrameError, NoteEvent, NoteEventKind, NoteRecord, PitchIndex, ProbabilityFrame,
    StreamEvent, PITCH_COUNT,
};
