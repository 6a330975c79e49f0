// Classifier backend abstraction
// The pitch/onset model is injected behind a trait; a spectral backend ships built in

use std::sync::Arc;
use thiserror::Error;

use crate::config::DetectorConfig;
use crate::events::spectral::{SpectralClassifier, SpectralConfig};
use crate::events::types::{FrameError, ProbabilityFrame};

/// Classification backend type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifierBackend {
    /// Model-free spectral peak classifier shipped with the crate
    Spectral,

    /// External polyphonic pitch model, supplied by the host
    Model,
}

/// Errors that can occur during classification
#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("Classifier produced no output")]
    EmptyOutput,

    #[error("Malformed classifier output: {0}")]
    Frame(#[from] FrameError),

    #[error("Backend is not built in: {0:?}")]
    BackendNotBuiltIn(ClassifierBackend),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Classifier task failed: {0}")]
    TaskFailed(String),
}

/// A stateless function from an analysis window to pitch probabilities
///
/// Implementations must not keep temporal state between calls; all history
/// lives in the window and the note tracker. Calls may run on any thread.
pub trait NoteClassifier: Send + Sync {
    fn classify(&self, window: &[f32]) -> Result<ProbabilityFrame, ClassifierError>;
}

impl<F> NoteClassifier for F
where
    F: Fn(&[f32]) -> Result<ProbabilityFrame, ClassifierError> + Send + Sync,
{
    fn classify(&self, window: &[f32]) -> Result<ProbabilityFrame, ClassifierError> {
        self(window)
    }
}

/// Per-time-frame output of a frame-based pitch model
#[derive(Debug, Clone, Default)]
pub struct ActivationRows {
    /// T rows of 88 note activations, oldest first
    pub note: Vec<Vec<f32>>,

    /// T rows of 88 onset activations, oldest first
    pub onset: Vec<Vec<f32>>,
}

/// Models that emit a T x 88 activation matrix per window
pub trait ActivationModel: Send + Sync {
    fn infer(&self, window: &[f32]) -> Result<ActivationRows, ClassifierError>;
}

/// Adapts an [`ActivationModel`] to [`NoteClassifier`] by keeping only the
/// trailing `focus` rows, i.e. the audio added since the previous hop
pub struct FocusedModel<M> {
    model: M,
    focus: usize,
}

impl<M: ActivationModel> FocusedModel<M> {
    pub fn new(model: M, focus: usize) -> Self {
        FocusedModel { model, focus }
    }

    pub fn from_config(model: M, config: &DetectorConfig) -> Self {
        Self::new(model, config.focus_frames)
    }
}

impl<M: ActivationModel> NoteClassifier for FocusedModel<M> {
    fn classify(&self, window: &[f32]) -> Result<ProbabilityFrame, ClassifierError> {
        let rows = self.model.infer(window)?;
        if rows.note.is_empty() || rows.onset.is_empty() {
            return Err(ClassifierError::EmptyOutput);
        }
        Ok(ProbabilityFrame::from_activation_rows(
            &rows.note,
            &rows.onset,
            self.focus,
        )?)
    }
}

/// Build one of the built-in classifiers
pub fn build_classifier(
    backend: ClassifierBackend,
    config: &DetectorConfig,
) -> Result<Arc<dyn NoteClassifier>, ClassifierError> {
    match backend {
        ClassifierBackend::Spectral => {
            let classifier = SpectralClassifier::new(SpectralConfig::from_detector(config));
            Ok(Arc::new(classifier))
        }
        // Models are supplied by the host through NoteClassifier
        ClassifierBackend::Model => Err(ClassifierError::BackendNotBuiltIn(backend)),
    }
}
