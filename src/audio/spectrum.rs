// Spectral analysis
// Hann-windowed magnitude spectra and per-key band energies for the built-in classifier

use realfft::{FftError, RealFftPlanner, RealToComplex};
use std::sync::Arc;

use crate::events::types::{MIDI_OFFSET, PITCH_COUNT};

/// Frequency of a MIDI note in equal temperament (A4 = 440 Hz)
pub fn midi_to_hz(midi: f32) -> f32 {
    440.0 * 2f32.powf((midi - 69.0) / 12.0)
}

/// Apply Hann window function to reduce spectral leakage
pub fn apply_hann_window(samples: &mut [f32]) {
    let n = samples.len();
    if n == 0 {
        return;
    }

    for (i, sample) in samples.iter_mut().enumerate() {
        let window_val = 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / n as f32).cos());
        *sample *= window_val;
    }
}

/// Magnitude spectra of fixed-size frames, FFT planned once
pub struct SpectrumAnalyzer {
    fft: Arc<dyn RealToComplex<f32>>,
    size: usize,
}

impl SpectrumAnalyzer {
    pub fn new(size: usize) -> Self {
        let mut planner = RealFftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(size);
        SpectrumAnalyzer { fft, size }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Hann-windowed magnitude spectrum of `frame`
    /// Shorter frames are zero-padded at the front, longer ones use their tail
    pub fn magnitudes(&self, frame: &[f32]) -> Result<Vec<f32>, FftError> {
        let mut input = self.fft.make_input_vec();
        let copy_len = frame.len().min(self.size);
        input[self.size - copy_len..].copy_from_slice(&frame[frame.len() - copy_len..]);
        apply_hann_window(&mut input);

        let mut spectrum = self.fft.make_output_vec();
        self.fft.process(&mut input, &mut spectrum)?;

        Ok(spectrum.iter().map(|c| c.norm()).collect())
    }
}

/// Energy in a half-semitone band around each piano key
///
/// Keys whose band falls between two bins (the low register at small FFT
/// sizes) take the energy of the nearest bin instead.
pub fn pitch_band_energies(spectrum: &[f32], sample_rate: u32, fft_size: usize) -> [f32; PITCH_COUNT] {
    let mut energies = [0.0; PITCH_COUNT];
    if fft_size == 0 || sample_rate == 0 || spectrum.is_empty() {
        return energies;
    }

    let bin_width = sample_rate as f32 / fft_size as f32;
    let half_step = 2f32.powf(1.0 / 24.0);

    for (index, energy) in energies.iter_mut().enumerate() {
        let center = midi_to_hz((index as u8 + MIDI_OFFSET) as f32);
        let low_bin = (center / half_step / bin_width).ceil() as usize;
        let high_bin = (center * half_step / bin_width).floor() as usize;

        let bins = if low_bin <= high_bin {
            low_bin..high_bin + 1
        } else {
            let nearest = (center / bin_width).round() as usize;
            nearest..nearest + 1
        };

        *energy = bins
            .filter_map(|bin| spectrum.get(bin))
            .map(|magnitude| magnitude * magnitude)
            .sum();
    }

    energies
}
