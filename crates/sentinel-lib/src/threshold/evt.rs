//! Peaks-over-threshold tail model
//!
//! Exceedances of the normal regime above a high baseline percentile are fit
//! with a Generalized Pareto Distribution by maximum likelihood (Nelder-Mead
//! over shape and log-scale, seeded from the method of moments).

use serde::{Deserialize, Serialize};

use crate::error::ThresholdError;
use crate::stats::{mean, percentile, std_dev};

/// Baseline percentile the exceedances are measured from
pub const DEFAULT_BASELINE_PERCENTILE: f64 = 90.0;

/// Minimum number of exceedances for a tail fit
pub const MIN_EXCEEDANCES: usize = 10;

const MAX_ITERATIONS: usize = 2_000;
const X_TOLERANCE: f64 = 1e-8;
const F_TOLERANCE: f64 = 1e-10;
const SHAPE_EPSILON: f64 = 1e-9;

/// How the requested quantile is applied to the fitted tail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TailQuantileMode {
    /// Use `q` directly as the GPD quantile
    #[default]
    Direct,
    /// Rescale `q` to the conditional tail probability given the baseline
    /// exceedance rate
    Conditional,
}

/// Fitted Generalized Pareto parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GpdFit {
    pub shape: f64,
    pub scale: f64,
    pub iterations: usize,
}

impl GpdFit {
    /// Maximum likelihood fit with location fixed at zero
    pub fn fit(exceedances: &[f64]) -> Result<Self, ThresholdError> {
        if exceedances.len() < 2 {
            return Err(ThresholdError::InsufficientData);
        }

        let m = mean(exceedances).ok_or(ThresholdError::InsufficientData)?;
        let sd = std_dev(exceedances).ok_or(ThresholdError::InsufficientData)?;
        let variance = sd * sd;
        if !variance.is_finite() || variance <= f64::EPSILON || m <= 0.0 {
            return Err(ThresholdError::DegenerateInput);
        }

        let ratio = m * m / variance;
        let mut shape0 = 0.5 * (1.0 - ratio);
        let mut scale0 = 0.5 * m * (ratio + 1.0);
        if !neg_log_likelihood(shape0, scale0, exceedances).is_finite() {
            // Exponential start is always feasible for positive data
            shape0 = 0.0;
            scale0 = m;
        }

        let objective = |p: [f64; 2]| neg_log_likelihood(p[0], p[1].exp(), exceedances);
        let (best, iterations) = nelder_mead(objective, [shape0, scale0.ln()])?;

        let fit = GpdFit {
            shape: best[0],
            scale: best[1].exp(),
            iterations,
        };
        if !fit.shape.is_finite() || !fit.scale.is_finite() || fit.scale <= 0.0 {
            return Err(ThresholdError::FitDidNotConverge { iterations });
        }
        Ok(fit)
    }

    /// Inverse CDF; non-negative for `q` in `[0, 1)`
    pub fn quantile(&self, q: f64) -> f64 {
        let tail = 1.0 - q;
        if self.shape.abs() < SHAPE_EPSILON {
            -self.scale * tail.ln()
        } else {
            self.scale / self.shape * (tail.powf(-self.shape) - 1.0)
        }
    }
}

/// Negative log-likelihood of GPD(shape, scale) for non-negative data
///
/// Infinite outside the support or for `shape <= -1`, where the likelihood
/// is unbounded.
pub fn neg_log_likelihood(shape: f64, scale: f64, data: &[f64]) -> f64 {
    if !(scale > 0.0) || !scale.is_finite() || !shape.is_finite() || shape <= -1.0 {
        return f64::INFINITY;
    }
    let n = data.len() as f64;

    if shape.abs() < SHAPE_EPSILON {
        return n * scale.ln() + data.iter().sum::<f64>() / scale;
    }

    let mut log_sum = 0.0;
    for x in data {
        let z = 1.0 + shape * x / scale;
        if z <= 0.0 {
            return f64::INFINITY;
        }
        log_sum += z.ln();
    }
    n * scale.ln() + (1.0 + 1.0 / shape) * log_sum
}

/// Minimise a two-parameter objective with the Nelder-Mead simplex
fn nelder_mead<F>(f: F, start: [f64; 2]) -> Result<([f64; 2], usize), ThresholdError>
where
    F: Fn([f64; 2]) -> f64,
{
    const REFLECT: f64 = 1.0;
    const EXPAND: f64 = 2.0;
    const CONTRACT: f64 = 0.5;
    const SHRINK: f64 = 0.5;

    let step = |v: f64| if v.abs() > 1e-3 { 0.05 * v.abs().max(1.0) } else { 0.1 };

    let mut simplex = [
        start,
        [start[0] + step(start[0]), start[1]],
        [start[0], start[1] + step(start[1])],
    ];
    let mut values = simplex.map(&f);

    for iteration in 1..=MAX_ITERATIONS {
        // Order best to worst
        let mut order = [0usize, 1, 2];
        order.sort_by(|a, b| values[*a].total_cmp(&values[*b]));
        simplex = order.map(|i| simplex[i]);
        values = order.map(|i| values[i]);

        let spread = values[2] - values[0];
        let f_done = spread.is_finite() && spread.abs() <= F_TOLERANCE * (1.0 + values[0].abs());
        let x_done = simplex[1..].iter().all(|p| {
            (p[0] - simplex[0][0]).abs() <= X_TOLERANCE && (p[1] - simplex[0][1]).abs() <= X_TOLERANCE
        });
        if values[0].is_finite() && (f_done || x_done) {
            return Ok((simplex[0], iteration));
        }

        let centroid = [
            (simplex[0][0] + simplex[1][0]) / 2.0,
            (simplex[0][1] + simplex[1][1]) / 2.0,
        ];
        let toward = |coef: f64| {
            [
                centroid[0] + coef * (simplex[2][0] - centroid[0]),
                centroid[1] + coef * (simplex[2][1] - centroid[1]),
            ]
        };

        let reflected = toward(-REFLECT);
        let f_reflected = f(reflected);

        if f_reflected < values[0] {
            let expanded = toward(-EXPAND);
            let f_expanded = f(expanded);
            if f_expanded < f_reflected {
                simplex[2] = expanded;
                values[2] = f_expanded;
            } else {
                simplex[2] = reflected;
                values[2] = f_reflected;
            }
            continue;
        }

        if f_reflected < values[1] {
            simplex[2] = reflected;
            values[2] = f_reflected;
            continue;
        }

        let (contracted, f_contracted) = if f_reflected < values[2] {
            let p = toward(-CONTRACT);
            (p, f(p))
        } else {
            let p = toward(CONTRACT);
            (p, f(p))
        };

        if f_contracted < values[2].min(f_reflected) {
            simplex[2] = contracted;
            values[2] = f_contracted;
            continue;
        }

        for i in 1..3 {
            simplex[i] = [
                simplex[0][0] + SHRINK * (simplex[i][0] - simplex[0][0]),
                simplex[0][1] + SHRINK * (simplex[i][1] - simplex[0][1]),
            ];
            values[i] = f(simplex[i]);
        }
    }

    Err(ThresholdError::FitDidNotConverge {
        iterations: MAX_ITERATIONS,
    })
}

/// Result of a successful tail estimate
#[derive(Debug, Clone, PartialEq)]
pub struct TailEstimate {
    /// Baseline `u` the exceedances were measured from
    pub baseline: f64,
    pub exceedances: usize,
    pub fit: GpdFit,
    /// `u` plus the GPD quantile; never below `u`
    pub threshold: f64,
}

/// Extreme value tail model over the normal regime
#[derive(Debug, Clone)]
pub struct EvtTailModel {
    baseline_percentile: f64,
    min_exceedances: usize,
    mode: TailQuantileMode,
}

impl EvtTailModel {
    pub fn new() -> Self {
        Self {
            baseline_percentile: DEFAULT_BASELINE_PERCENTILE,
            min_exceedances: MIN_EXCEEDANCES,
            mode: TailQuantileMode::Direct,
        }
    }

    pub fn with_baseline_percentile(mut self, percentile: f64) -> Self {
        self.baseline_percentile = percentile;
        self
    }

    pub fn with_min_exceedances(mut self, min: usize) -> Self {
        self.min_exceedances = min.max(2);
        self
    }

    pub fn with_mode(mut self, mode: TailQuantileMode) -> Self {
        self.mode = mode;
        self
    }

    /// Estimate the `q` tail threshold of the normal regime
    pub fn estimate(&self, normal: &[f64], q: f64) -> Result<TailEstimate, ThresholdError> {
        let baseline =
            percentile(normal, self.baseline_percentile).ok_or(ThresholdError::InsufficientData)?;

        let exceedances: Vec<f64> = normal
            .iter()
            .filter(|v| **v > baseline)
            .map(|v| v - baseline)
            .collect();

        if exceedances.len() < self.min_exceedances {
            return Err(ThresholdError::InsufficientTailData {
                found: exceedances.len(),
                required: self.min_exceedances,
            });
        }

        let fit = GpdFit::fit(&exceedances)?;

        let tail_q = match self.mode {
            TailQuantileMode::Direct => q,
            TailQuantileMode::Conditional => {
                let exceed_rate = exceedances.len() as f64 / normal.len() as f64;
                (1.0 - (1.0 - q) / exceed_rate).max(0.0)
            }
        };

        let threshold = baseline + fit.quantile(tail_q).max(0.0);
        if !threshold.is_finite() {
            return Err(ThresholdError::FitDidNotConverge {
                iterations: fit.iterations,
            });
        }

        Ok(TailEstimate {
            baseline,
            exceedances: exceedances.len(),
            fit,
            threshold,
        })
    }
}

impl Default for EvtTailModel {
    fn default() -> Self {
        Self::new()
    }
}
