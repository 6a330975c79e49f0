// Volume gate
// RMS level of the newest hop decides whether the classifier runs at all

use crate::config::DetectorConfig;

/// Root-mean-square amplitude, 0 for an empty slice
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    // Accumulated in f64 so loud finite input cannot overflow to inf
    let sum_squares: f64 = samples.iter().map(|&s| s as f64 * s as f64).sum();
    (sum_squares / samples.len() as f64).sqrt() as f32
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    /// Loud enough to classify
    Active,
    /// Below the floor; sounding notes get flushed
    Silent,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GateReading {
    pub volume: f32,
    pub state: GateState,
}

pub struct VolumeGate {
    min_volume: f32,
}

impl VolumeGate {
    pub fn new(min_volume: f32) -> Self {
        VolumeGate { min_volume }
    }

    pub fn from_config(config: &DetectorConfig) -> Self {
        Self::new(config.min_volume)
    }

    pub fn evaluate(&self, hop: &[f32]) -> GateReading {
        let volume = rms(hop);
        let state = if volume < self.min_volume {
            GateState::Silent
        } else {
            GateState::Active
        };
        GateReading { volume, state }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rms_values() {
        assert_eq!(rms(&[]), 0.0);
        assert_eq!(rms(&[0.0; 16]), 0.0);
        assert!((rms(&[0.5, -0.5, 0.5, -0.5]) - 0.5).abs() < 1e-6);
        assert!((rms(&[3.0, 4.0]) - (12.5f32).sqrt()).abs() < 1e-6);
    }

    #[test]
    fn test_rms_of_huge_samples_is_finite() {
        let level = rms(&[1e30, -1e30, f32::MAX, f32::MIN]);
        assert!(level.is_finite());
        assert!(level > 1e30);

        let reading = VolumeGate::new(0.001).evaluate(&[f32::MAX; 8]);
        assert_eq!(reading.volume, f32::MAX);
        assert_eq!(reading.state, GateState::Active);
    }

    #[test]
    fn test_gate_states() {
        let gate = VolumeGate::new(0.01);

        let quiet = gate.evaluate(&[0.001; 32]);
        assert_eq!(quiet.state, GateState::Silent);

        let loud = gate.evaluate(&[0.2, -0.2, 0.2, -0.2]);
        assert_eq!(loud.state, GateState::Active);
        assert!((loud.volume - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_threshold_itself_is_active() {
        let gate = VolumeGate::new(0.25);
        assert_eq!(gate.evaluate(&[0.25, -0.25]).state, GateState::Active);
    }
}
