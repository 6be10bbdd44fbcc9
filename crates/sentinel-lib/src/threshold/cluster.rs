//! Two-regime baseline separation
//!
//! One-dimensional k-means (k = 2) with centroids seeded at the sample
//! extremes, so identical input always yields the identical partition.

use crate::error::ThresholdError;

/// Maximum Lloyd iterations before accepting the current partition
const MAX_ITERATIONS: usize = 100;

/// Sample partitioned into a normal and an elevated regime
#[derive(Debug, Clone, PartialEq)]
pub struct RegimeSplit {
    /// Members of the lower-centroid cluster
    pub normal: Vec<f64>,
    /// Members of the higher-centroid cluster
    pub elevated: Vec<f64>,
    pub normal_centroid: f64,
    pub elevated_centroid: f64,
    pub iterations: usize,
}

/// Splits a scalar series into normal and elevated behaviour
#[derive(Debug, Clone)]
pub struct BaselineClusterSplitter {
    max_iterations: usize,
}

impl BaselineClusterSplitter {
    pub fn new() -> Self {
        Self {
            max_iterations: MAX_ITERATIONS,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    /// Partition `values` into two clusters, lower centroid first
    ///
    /// NaN values are ignored. Constant input lands entirely in the normal
    /// regime with both centroids equal.
    pub fn split(&self, values: &[f64]) -> Result<RegimeSplit, ThresholdError> {
        let values: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
        if values.is_empty() {
            return Err(ThresholdError::InsufficientData);
        }

        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        if (max - min).abs() < f64::EPSILON {
            return Ok(RegimeSplit {
                normal: values,
                elevated: Vec::new(),
                normal_centroid: min,
                elevated_centroid: min,
                iterations: 0,
            });
        }

        let mut low = min;
        let mut high = max;
        let mut assignment: Vec<bool> = Vec::new();
        let mut iterations = 0;

        while iterations < self.max_iterations {
            iterations += 1;

            // true = elevated; ties go to the lower centroid
            let next: Vec<bool> = values
                .iter()
                .map(|v| (v - high).abs() < (v - low).abs())
                .collect();

            let (mut low_sum, mut low_n, mut high_sum, mut high_n) = (0.0, 0usize, 0.0, 0usize);
            for (v, elevated) in values.iter().zip(&next) {
                if *elevated {
                    high_sum += v;
                    high_n += 1;
                } else {
                    low_sum += v;
                    low_n += 1;
                }
            }
            // An emptied cluster keeps its previous centroid
            if low_n > 0 {
                low = low_sum / low_n as f64;
            }
            if high_n > 0 {
                high = high_sum / high_n as f64;
            }

            let converged = next == assignment;
            assignment = next;
            if converged {
                break;
            }
        }

        let mut normal = Vec::new();
        let mut elevated = Vec::new();
        for (v, is_elevated) in values.iter().zip(&assignment) {
            if *is_elevated {
                elevated.push(*v);
            } else {
                normal.push(*v);
            }
        }

        if low > high {
            std::mem::swap(&mut low, &mut high);
            std::mem::swap(&mut normal, &mut elevated);
        }

        Ok(RegimeSplit {
            normal,
            elevated,
            normal_centroid: low,
            elevated_centroid: high,
            iterations,
        })
    }
}

impl Default for BaselineClusterSplitter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input_is_insufficient() {
        let splitter = BaselineClusterSplitter::new();
        assert_eq!(splitter.split(&[]), Err(ThresholdError::InsufficientData));
        assert_eq!(
            splitter.split(&[f64::NAN]),
            Err(ThresholdError::InsufficientData)
        );
    }

    #[test]
    fn test_separates_two_regimes() {
        let mut values: Vec<f64> = (0..50).map(|i| 10.0 + (i % 5) as f64).collect();
        values.extend((0..10).map(|i| 100.0 + i as f64));

        let split = BaselineClusterSplitter::new().split(&values).unwrap();
        assert_eq!(split.normal.len(), 50);
        assert_eq!(split.elevated.len(), 10);
        assert!(split.normal.iter().all(|v| *v < 20.0));
        assert!((split.normal_centroid - 12.0).abs() < 1e-9);
        assert!((split.elevated_centroid - 104.5).abs() < 1e-9);
    }

    #[test]
    fn test_normal_centroid_never_above_elevated() {
        let samples: Vec<Vec<f64>> = vec![
            vec![5.0],
            vec![1.0, 2.0],
            vec![3.0, 3.0, 3.0, 9.0],
            (0..40).map(|i| ((i * 37) % 11) as f64).collect(),
            vec![-4.0, 100.0, 2.5, 2.5, 7.0, -1.0],
        ];

        let splitter = BaselineClusterSplitter::new();
        for values in samples {
            let split = splitter.split(&values).unwrap();
            assert!(split.normal_centroid <= split.elevated_centroid, "{:?}", values);
            assert_eq!(split.normal.len() + split.elevated.len(), values.len());
        }
    }

    #[test]
    fn test_constant_input_is_all_normal() {
        let split = BaselineClusterSplitter::new().split(&[4.0; 12]).unwrap();
        assert_eq!(split.normal.len(), 12);
        assert!(split.elevated.is_empty());
        assert_eq!(split.normal_centroid, split.elevated_centroid);
    }

    #[test]
    fn test_split_is_deterministic() {
        let values: Vec<f64> = (0..200).map(|i| ((i * 7919) % 97) as f64).collect();
        let splitter = BaselineClusterSplitter::new();
        assert_eq!(splitter.split(&values), splitter.split(&values));
    }
}
