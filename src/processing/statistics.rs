//! Brightness statistics over corrected frames.
//!
//! Mean, variance and median are published with every frame for external
//! monitoring; the mean additionally drives the exposure controller.

/// Per-frame brightness statistics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameStatistics {
    /// Arithmetic mean of all samples.
    pub mean: f64,
    /// Population variance of all samples.
    pub variance: f64,
    /// Median sample value.
    pub median: f64,
}

impl FrameStatistics {
    /// Computes statistics over a sample buffer.
    ///
    /// An empty buffer yields all-zero statistics rather than NaN so a
    /// degenerate crop cannot poison downstream consumers.
    pub fn analyze(samples: &[u16]) -> Self {
        if samples.is_empty() {
            return Self {
                mean: 0.0,
                variance: 0.0,
                median: 0.0,
            };
        }

        let n = samples.len() as f64;
        let mean: f64 = samples.iter().map(|&s| s as f64).sum::<f64>() / n;
        let variance: f64 = samples
            .iter()
            .map(|&s| (s as f64 - mean).powi(2))
            .sum::<f64>()
            / n;

        let mut sorted: Vec<u16> = samples.to_vec();
        sorted.sort_unstable();
        let mid = sorted.len() / 2;
        let median = if sorted.len() % 2 == 0 {
            (sorted[mid - 1] as f64 + sorted[mid] as f64) / 2.0
        } else {
            sorted[mid] as f64
        };

        Self {
            mean,
            variance,
            median,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_samples() {
        let stats = FrameStatistics::analyze(&[100u16; 50]);
        assert_eq!(stats.mean, 100.0);
        assert_eq!(stats.variance, 0.0);
        assert_eq!(stats.median, 100.0);
    }

    #[test]
    fn test_known_values() {
        let stats = FrameStatistics::analyze(&[1, 2, 3, 4, 5]);
        assert_eq!(stats.mean, 3.0);
        assert_eq!(stats.variance, 2.0);
        assert_eq!(stats.median, 3.0);
    }

    #[test]
    fn test_even_count_median_averages() {
        let stats = FrameStatistics::analyze(&[1, 2, 3, 4]);
        assert_eq!(stats.median, 2.5);
    }

    #[test]
    fn test_empty_yields_zeros() {
        let stats = FrameStatistics::analyze(&[]);
        assert_eq!(stats.mean, 0.0);
        assert_eq!(stats.variance, 0.0);
        assert_eq!(stats.median, 0.0);
    }
}
