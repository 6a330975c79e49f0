// Detector configuration
// Thresholds and buffer sizes, loaded from defaults, the environment, or JSON

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {value:?}")]
    Parse { var: &'static str, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to parse configuration JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// All tunables of the note detector, validated as a unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Sample rate the classifier expects (Hz)
    pub sample_rate: u32,

    /// Samples consumed per processing step
    pub hop_size: usize,

    /// Samples of audio context handed to the classifier
    pub window_length: usize,

    /// RMS below which a hop counts as silence
    pub min_volume: f32,

    /// Note activation needed to start a note
    pub note_start_threshold: f32,

    /// Note activation needed to keep a sounding note alive
    /// Must be below `note_start_threshold`
    pub note_keep_threshold: f32,

    /// Onset activation needed for a new attack
    pub onset_threshold: f32,

    /// Onset activation needed to re-strike a sounding note
    /// Must be above `onset_threshold`
    pub retrigger_onset_threshold: f32,

    /// Minimum seconds between the start of a note and its retrigger
    pub retrigger_cooldown: f64,

    /// Upper bound on samples waiting in the framer
    pub max_buffered_samples: usize,

    /// Trailing model time-frames collapsed into one probability frame
    pub focus_frames: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        DetectorConfig {
            sample_rate: 22050,
            hop_size: 768,
            window_length: 43844, // ~2 seconds of context
            min_volume: 0.001,
            note_start_threshold: 0.5,
            note_keep_threshold: 0.25,
            onset_threshold: 0.6,
            retrigger_onset_threshold: 0.85,
            retrigger_cooldown: 0.12,
            max_buffered_samples: 768 * 16,
            focus_frames: 8,
        }
    }
}

impl DetectorConfig {
    /// Load configuration from process environment variables
    /// Unset variables keep their defaults
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = DetectorConfig::default();

        override_from(&lookup, "SAMPLE_RATE", &mut config.sample_rate)?;
        override_from(&lookup, "HOP_SIZE", &mut config.hop_size)?;
        override_from(&lookup, "WINDOW_LENGTH", &mut config.window_length)?;
        override_from(&lookup, "MIN_VOLUME", &mut config.min_volume)?;
        override_from(&lookup, "NOTE_START_THRESHOLD", &mut config.note_start_threshold)?;
        override_from(&lookup, "NOTE_KEEP_THRESHOLD", &mut config.note_keep_threshold)?;
        override_from(&lookup, "ONSET_THRESHOLD", &mut config.onset_threshold)?;
        override_from(
            &lookup,
            "RETRIGGER_ONSET_THRESHOLD",
            &mut config.retrigger_onset_threshold,
        )?;
        override_from(&lookup, "RETRIGGER_COOLDOWN", &mut config.retrigger_cooldown)?;
        override_from(&lookup, "MAX_BUFFERED_SAMPLES", &mut config.max_buffered_samples)?;
        override_from(&lookup, "FOCUS_FRAMES", &mut config.focus_frames)?;

        config.validate()?;
        Ok(config)
    }

    /// Parse a (possibly partial) JSON document on top of the defaults
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: DetectorConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges and the hysteresis ordering invariants
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate == 0 {
            return Err(invalid("sample_rate must be positive"));
        }
        if self.hop_size == 0 {
            return Err(invalid("hop_size must be positive"));
        }
        if self.window_length < self.hop_size {
            return Err(invalid(format!(
                "window_length ({}) must be at least hop_size ({})",
                self.window_length, self.hop_size
            )));
        }
        if self.max_buffered_samples < self.hop_size {
            return Err(invalid(format!(
                "max_buffered_samples ({}) must be at least hop_size ({})",
                self.max_buffered_samples, self.hop_size
            )));
        }
        if self.focus_frames == 0 {
            return Err(invalid("focus_frames must be positive"));
        }
        if !(self.min_volume > 0.0 && self.min_volume.is_finite()) {
            return Err(invalid("min_volume must be positive"));
        }
        if !(self.retrigger_cooldown > 0.0 && self.retrigger_cooldown.is_finite()) {
            return Err(invalid("retrigger_cooldown must be positive"));
        }

        let probabilities = [
            ("note_start_threshold", self.note_start_threshold),
            ("note_keep_threshold", self.note_keep_threshold),
            ("onset_threshold", self.onset_threshold),
            ("retrigger_onset_threshold", self.retrigger_onset_threshold),
        ];
        for (name, value) in probabilities {
            if !(value > 0.0 && value <= 1.0) {
                return Err(invalid(format!("{} must be in (0, 1], got {}", name, value)));
            }
        }

        if self.note_keep_threshold >= self.note_start_threshold {
            return Err(invalid(format!(
                "note_keep_threshold ({}) must be below note_start_threshold ({})",
                self.note_keep_threshold, self.note_start_threshold
            )));
        }
        if self.onset_threshold >= self.retrigger_onset_threshold {
            return Err(invalid(format!(
                "onset_threshold ({}) must be below retrigger_onset_threshold ({})",
                self.onset_threshold, self.retrigger_onset_threshold
            )));
        }

        Ok(())
    }

    /// Duration of one hop in seconds
    pub fn hop_duration_secs(&self) -> f64 {
        self.hop_size as f64 / self.sample_rate as f64
    }
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(message.into())
}

fn override_from<F, T>(lookup: &F, var: &'static str, target: &mut T) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    if let Some(raw) = lookup(var) {
        *target = raw.trim().parse().map_err(|_| ConfigError::Parse {
            var,
            value: raw.clone(),
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_is_valid() {
        let config = DetectorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.hop_size, 768);
        assert_eq!(config.max_buffered_samples, 12288);
    }

    #[test]
    fn test_lookup_overrides() {
        let config = DetectorConfig::from_lookup(lookup_from(&[
            ("HOP_SIZE", "512"),
            ("MIN_VOLUME", "0.01"),
            ("RETRIGGER_COOLDOWN", " 0.2 "),
        ]))
        .unwrap();

        assert_eq!(config.hop_size, 512);
        assert_eq!(config.min_volume, 0.01);
        assert_eq!(config.retrigger_cooldown, 0.2);
        // Untouched values keep defaults
        assert_eq!(config.window_length, 43844);
    }

    #[test]
    fn test_lookup_parse_error() {
        let result = DetectorConfig::from_lookup(lookup_from(&[("HOP_SIZE", "lots")]));
        match result {
            Err(ConfigError::Parse { var, value }) => {
                assert_eq!(var, "HOP_SIZE");
                assert_eq!(value, "lots");
            }
            other => panic!("Expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_keep_threshold_must_be_below_start() {
        let result = DetectorConfig::from_lookup(lookup_from(&[("NOTE_KEEP_THRESHOLD", "0.5")]));
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_onset_threshold_must_be_below_retrigger() {
        let config = DetectorConfig {
            onset_threshold: 0.9,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_rejects_non_positive_values() {
        let zero_hop = DetectorConfig {
            hop_size: 0,
            ..Default::default()
        };
        assert!(zero_hop.validate().is_err());

        let negative_volume = DetectorConfig {
            min_volume: -0.1,
            ..Default::default()
        };
        assert!(negative_volume.validate().is_err());

        let short_window = DetectorConfig {
            window_length: 100,
            ..Default::default()
        };
        assert!(short_window.validate().is_err());
    }

    #[test]
    fn test_partial_json() {
        let config = DetectorConfig::from_json_str(r#"{"hop_size": 1024, "focus_frames": 4}"#).unwrap();
        assert_eq!(config.hop_size, 1024);
        assert_eq!(config.focus_frames, 4);
        assert_eq!(config.onset_threshold, 0.6);
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            DetectorConfig::from_json_str("{not json"),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn test_hop_duration() {
        let config = DetectorConfig {
            sample_rate: 1000,
            hop_size: 250,
            window_length: 1000,
            max_buffered_samples: 1000,
            ..Default::default()
        };
        assert!((config.hop_duration_secs() - 0.25).abs() < 1e-9);
    }
}
