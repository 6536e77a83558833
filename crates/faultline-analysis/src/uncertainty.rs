//! Monte-Carlo uncertainty analysis of the top-event probability.
//!
//! Each trial runs one coherent sampling cycle: every stochastic expression
//! draws once, the diagram is quantified with the sampled probabilities, and
//! the cycle is torn down so the next trial draws fresh values.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use faultline_mef::Model;

use crate::bdd::Bdd;
use crate::settings::Settings;

/// Number of bins in the reported sample histogram.
const HISTOGRAM_BINS: usize = 20;

/// One bin of the sample histogram.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistogramBin {
    pub lower: f64,
    pub upper: f64,
    pub count: u32,
}

/// Statistics of the sampled top-event probability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UncertaintyResult {
    pub mean: f64,
    pub std_dev: f64,
    pub median: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
    pub confidence_level: f64,
    pub trials: u32,
    pub histogram: Vec<HistogramBin>,
}

impl UncertaintyResult {
    /// Builds the statistics from raw samples with a percentile confidence
    /// interval.
    pub fn from_samples(samples: &[f64], confidence_level: f64) -> Self {
        let n = samples.len();
        if n == 0 {
            return Self {
                mean: 0.0,
                std_dev: 0.0,
                median: 0.0,
                ci_lower: 0.0,
                ci_upper: 0.0,
                confidence_level,
                trials: 0,
                histogram: Vec::new(),
            };
        }
        let mean = samples.iter().sum::<f64>() / n as f64;
        let variance = if n > 1 {
            samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1) as f64
        } else {
            0.0
        };
        let std_dev = variance.sqrt();

        let mut sorted = samples.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let median = if n % 2 == 0 {
            (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
        } else {
            sorted[n / 2]
        };

        let alpha = 1.0 - confidence_level;
        let lower_idx = ((alpha / 2.0) * n as f64).floor() as usize;
        let upper_idx = ((1.0 - alpha / 2.0) * n as f64).ceil() as usize;
        let ci_lower = sorted[lower_idx.min(n - 1)];
        let ci_upper = sorted[upper_idx.saturating_sub(1).min(n - 1)];

        let histogram = build_histogram(&sorted);

        Self {
            mean,
            std_dev,
            median,
            ci_lower,
            ci_upper,
            confidence_level,
            trials: n as u32,
            histogram,
        }
    }
}

fn build_histogram(sorted: &[f64]) -> Vec<HistogramBin> {
    let (first, last) = match (sorted.first(), sorted.last()) {
        (Some(&first), Some(&last)) if last > first => (first, last),
        _ => return Vec::new(),
    };
    let width = (last - first) / HISTOGRAM_BINS as f64;
    let mut bins: Vec<HistogramBin> = (0..HISTOGRAM_BINS)
        .map(|i| HistogramBin {
            lower: first + i as f64 * width,
            upper: first + (i + 1) as f64 * width,
            count: 0,
        })
        .collect();
    for &sample in sorted {
        let index = (((sample - first) / width) as usize).min(HISTOGRAM_BINS - 1);
        bins[index].count += 1;
    }
    bins
}

/// Runs the Monte-Carlo trials over the model's sampling cycles.
pub fn analyze(model: &Model, bdd: &Bdd, settings: &Settings) -> UncertaintyResult {
    let mut rng: StdRng = match settings.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_rng(rand::thread_rng()).unwrap_or_else(|_| StdRng::seed_from_u64(0)),
    };
    let samples = sample_trials(model, bdd, settings.num_trials, &mut rng);
    UncertaintyResult::from_samples(&samples, 0.95)
}

fn sample_trials<R: Rng>(model: &Model, bdd: &Bdd, trials: u32, rng: &mut R) -> Vec<f64> {
    let mut samples = Vec::with_capacity(trials as usize);
    for _ in 0..trials {
        let q: Vec<f64> = bdd
            .variables()
            .iter()
            .map(|event| event.sample_probability(rng).clamp(0.0, 1.0))
            .collect();
        samples.push(bdd.probability_with(&q).clamp(0.0, 1.0));
        model.reset_expressions();
    }
    samples
}
