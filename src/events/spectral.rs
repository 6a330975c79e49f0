// Spectral (model-free) note classifier
// Derives per-key note and onset probabilities from band energies of the window tail
// Stands in for a trained polyphonic model when the host supplies none

use crate::audio::spectrum::{pitch_band_energies, SpectrumAnalyzer};
use crate::config::DetectorConfig;
use crate::events::backend::{ClassifierError, NoteClassifier};
use crate::events::types::{ProbabilityFrame, PITCH_COUNT};

/// Configuration for the spectral classifier
#[derive(Debug, Clone)]
pub struct SpectralConfig {
    /// FFT length applied to the tail of the window
    pub fft_size: usize,

    /// Hop size; the previous segment ends this many samples earlier
    pub hop_size: usize,

    /// Sample rate of the window in Hz
    pub sample_rate: u32,

    /// Scale applied to the normalized energy rise before clamping
    pub onset_gain: f32,
}

impl Default for SpectralConfig {
    fn default() -> Self {
        SpectralConfig {
            fft_size: 4096,
            hop_size: 768,
            sample_rate: 22050,
            onset_gain: 2.0,
        }
    }
}

impl SpectralConfig {
    pub fn from_detector(config: &DetectorConfig) -> Self {
        let defaults = SpectralConfig::default();
        SpectralConfig {
            fft_size: defaults.fft_size.min(config.window_length.max(config.hop_size)),
            hop_size: config.hop_size,
            sample_rate: config.sample_rate,
            ..defaults
        }
    }
}

/// Band-energy classifier
///
/// Note probability is the square-rooted band energy relative to the
/// loudest band. Onset probability is the rise of that amplitude against
/// the segment one hop earlier.
pub struct SpectralClassifier {
    config: SpectralConfig,
    analyzer: SpectrumAnalyzer,
}

impl SpectralClassifier {
    pub fn new(config: SpectralConfig) -> Self {
        let analyzer = SpectrumAnalyzer::new(config.fft_size.max(2));
        SpectralClassifier { config, analyzer }
    }

    pub fn config(&self) -> &SpectralConfig {
        &self.config
    }

    fn band_energies(&self, segment: &[f32]) -> Result<[f32; PITCH_COUNT], ClassifierError> {
        let spectrum = self
            .analyzer
            .magnitudes(segment)
            .map_err(|e| ClassifierError::Inference(e.to_string()))?;
        Ok(pitch_band_energies(
            &spectrum,
            self.config.sample_rate,
            self.analyzer.size(),
        ))
    }
}

impl NoteClassifier for SpectralClassifier {
    fn classify(&self, window: &[f32]) -> Result<ProbabilityFrame, ClassifierError> {
        if window.is_empty() {
            return Err(ClassifierError::EmptyOutput);
        }

        let current = self.band_energies(window)?;
        let peak = current.iter().copied().fold(0.0f32, f32::max);
        if peak <= f32::EPSILON {
            return Ok(ProbabilityFrame::silent());
        }

        let previous = if window.len() > self.config.hop_size {
            self.band_energies(&window[..window.len() - self.config.hop_size])?
        } else {
            [0.0; PITCH_COUNT]
        };

        let peak_amplitude = peak.sqrt();
        let mut frame = ProbabilityFrame::silent();
        for i in 0..PITCH_COUNT {
            let amplitude = current[i].sqrt();
            let rise = (amplitude - previous[i].sqrt()) / peak_amplitude;

            frame.note[i] = (amplitude / peak_amplitude).clamp(0.0, 1.0);
            frame.onset[i] = (rise * self.config.onset_gain).clamp(0.0, 1.0);
        }

        Ok(frame)
    }
}
