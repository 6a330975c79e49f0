// Sliding analysis window
// Rolling, zero-initialized audio context handed to the classifier

use thiserror::Error;

use crate::config::DetectorConfig;

#[derive(Debug, Error, PartialEq)]
pub enum WindowError {
    #[error("Hop has {actual} samples, expected {expected}")]
    HopLength { expected: usize, actual: usize },
}

/// Fixed-length window: each hop shifts out the oldest samples
/// and lands at the tail
pub struct AnalysisWindow {
    samples: Vec<f32>,
    hop_size: usize,
}

impl AnalysisWindow {
    /// `window_length` is raised to `hop_size` if smaller
    pub fn new(window_length: usize, hop_size: usize) -> Self {
        AnalysisWindow {
            samples: vec![0.0; window_length.max(hop_size)],
            hop_size,
        }
    }

    pub fn from_config(config: &DetectorConfig) -> Self {
        Self::new(config.window_length, config.hop_size)
    }

    pub fn push_hop(&mut self, hop: &[f32]) -> Result<(), WindowError> {
        if hop.len() != self.hop_size {
            return Err(WindowError::HopLength {
                expected: self.hop_size,
                actual: hop.len(),
            });
        }

        let len = self.samples.len();
        self.samples.copy_within(self.hop_size.., 0);
        self.samples[len - self.hop_size..].copy_from_slice(hop);
        Ok(())
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.samples
    }

    /// Owned copy for handing to a worker thread
    pub fn snapshot(&self) -> Vec<f32> {
        self.samples.clone()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_zeroed() {
        let window = AnalysisWindow::new(8, 2);
        assert_eq!(window.len(), 8);
        assert!(window.as_slice().iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_hops_shift_left() {
        let mut window = AnalysisWindow::new(6, 2);

        window.push_hop(&[1.0, 2.0]).unwrap();
        assert_eq!(window.as_slice(), &[0.0, 0.0, 0.0, 0.0, 1.0, 2.0]);

        window.push_hop(&[3.0, 4.0]).unwrap();
        window.push_hop(&[5.0, 6.0]).unwrap();
        window.push_hop(&[7.0, 8.0]).unwrap();
        assert_eq!(window.as_slice(), &[3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
        assert_eq!(window.len(), 6);
    }

    #[test]
    fn test_window_equal_to_hop() {
        let mut window = AnalysisWindow::new(2, 2);
        window.push_hop(&[1.0, 2.0]).unwrap();
        window.push_hop(&[3.0, 4.0]).unwrap();
        assert_eq!(window.as_slice(), &[3.0, 4.0]);
    }

    #[test]
    fn test_wrong_hop_length() {
        let mut window = AnalysisWindow::new(6, 2);
        assert_eq!(
            window.push_hop(&[1.0]),
            Err(WindowError::HopLength {
                expected: 2,
                actual: 1
            })
        );
    }
}
