//! Random deviates: stochastic expressions with analytic mean and support.
//!
//! Sampling goes through `rand_distr`; argument values are taken from the
//! arguments' own (memoised) draws so that one sampling cycle stays coherent.

use rand::Rng;
use rand_distr::Distribution;

use crate::error::{Error, ErrorKind, Result};
use crate::expression::{Expression, ExpressionRef, Interval};

/// Number of standard deviations taken as the practical support bound for
/// unbounded distributions.
const SUPPORT_SIGMAS: f64 = 6.0;

/// A stochastic distribution node.
#[derive(Debug)]
pub enum Deviate {
    /// Uniform on [min, max).
    Uniform {
        min: ExpressionRef,
        max: ExpressionRef,
    },
    /// Normal with the given mean and standard deviation.
    Normal {
        mean: ExpressionRef,
        sigma: ExpressionRef,
    },
    /// Log-normal parametrised by its mean, an error factor, and the
    /// one-sided confidence level the error factor refers to.
    LogNormalEf {
        mean: ExpressionRef,
        error_factor: ExpressionRef,
        level: ExpressionRef,
    },
    /// Log-normal parametrised directly by the underlying normal (mu, sigma).
    LogNormal {
        mu: ExpressionRef,
        sigma: ExpressionRef,
    },
    /// Gamma with shape k and scale theta.
    Gamma {
        shape: ExpressionRef,
        scale: ExpressionRef,
    },
    /// Beta with shape parameters alpha and beta.
    Beta {
        alpha: ExpressionRef,
        beta: ExpressionRef,
    },
    /// Piecewise-uniform histogram: `boundaries` has one more entry than
    /// `weights`; bin i spans [boundaries[i], boundaries[i+1]).
    Histogram {
        boundaries: Vec<ExpressionRef>,
        weights: Vec<ExpressionRef>,
    },
}

impl Deviate {
    /// Checks distribution parameters against the argument means and domains.
    pub fn validate(&self) -> Result<()> {
        match self {
            Deviate::Uniform { min, max } => {
                if min.mean() >= max.mean() {
                    return Err(invalid("uniform deviate requires min < max"));
                }
            }
            Deviate::Normal { sigma, .. } => {
                ensure_positive(sigma, "normal deviate standard deviation")?;
            }
            Deviate::LogNormalEf {
                mean,
                error_factor,
                level,
            } => {
                ensure_positive(mean, "log-normal deviate mean")?;
                if error_factor.mean() <= 1.0 {
                    return Err(invalid("log-normal error factor must exceed 1"));
                }
                let level = level.mean();
                if level <= 0.0 || level >= 1.0 {
                    return Err(invalid("log-normal confidence level must be in (0, 1)"));
                }
            }
            Deviate::LogNormal { sigma, .. } => {
                ensure_positive(sigma, "log-normal deviate sigma")?;
            }
            Deviate::Gamma { shape, scale } => {
                ensure_positive(shape, "gamma deviate shape")?;
                ensure_positive(scale, "gamma deviate scale")?;
            }
            Deviate::Beta { alpha, beta } => {
                ensure_positive(alpha, "beta deviate alpha")?;
                ensure_positive(beta, "beta deviate beta")?;
            }
            Deviate::Histogram {
                boundaries,
                weights,
            } => {
                if boundaries.len() != weights.len() + 1 {
                    return Err(invalid(
                        "histogram requires one more boundary than weights",
                    ));
                }
                let values: Vec<f64> = boundaries.iter().map(|b| b.mean()).collect();
                if values.windows(2).any(|w| w[0] >= w[1]) {
                    return Err(invalid("histogram boundaries must be strictly increasing"));
                }
                let total: f64 = weights.iter().map(|w| w.mean()).sum();
                if weights.iter().any(|w| w.mean() < 0.0) || total <= 0.0 {
                    return Err(invalid(
                        "histogram weights must be non-negative with a positive sum",
                    ));
                }
            }
        }
        Ok(())
    }

    /// The analytic mean, computed from argument values supplied by `eval`.
    /// The mean path always substitutes argument means, never draws.
    pub fn mean_with(&self, eval: &mut dyn FnMut(&Expression) -> f64) -> f64 {
        match self {
            Deviate::Uniform { min, max } => (eval(min) + eval(max)) / 2.0,
            Deviate::Normal { mean, .. } => eval(mean),
            Deviate::LogNormalEf { mean, .. } => eval(mean),
            Deviate::LogNormal { mu, sigma } => {
                let sigma = eval(sigma);
                (eval(mu) + sigma * sigma / 2.0).exp()
            }
            Deviate::Gamma { shape, scale } => eval(shape) * eval(scale),
            Deviate::Beta { alpha, beta } => {
                let a = eval(alpha);
                a / (a + eval(beta))
            }
            Deviate::Histogram {
                boundaries,
                weights,
            } => {
                let bounds: Vec<f64> = boundaries.iter().map(|b| eval(b)).collect();
                let mut weighted = 0.0;
                let mut total = 0.0;
                for (i, w) in weights.iter().enumerate() {
                    let w = eval(w);
                    weighted += w * (bounds[i] + bounds[i + 1]) / 2.0;
                    total += w;
                }
                weighted / total
            }
        }
    }

    /// Draws one value; argument values come from the arguments' draws.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> f64 {
        match self {
            Deviate::Uniform { min, max } => {
                let (min, max) = (min.sample(rng), max.sample(rng));
                rng.gen_range(min..max)
            }
            Deviate::Normal { mean, sigma } => {
                match rand_distr::Normal::new(mean.sample(rng), sigma.sample(rng)) {
                    Ok(dist) => dist.sample(rng),
                    Err(_) => mean.sample(rng),
                }
            }
            Deviate::LogNormalEf {
                mean,
                error_factor,
                level,
            } => {
                let (mu, sigma) = lognormal_params(
                    mean.sample(rng),
                    error_factor.sample(rng),
                    level.sample(rng),
                );
                match rand_distr::LogNormal::new(mu, sigma) {
                    Ok(dist) => dist.sample(rng),
                    Err(_) => mean.sample(rng),
                }
            }
            Deviate::LogNormal { mu, sigma } => {
                match rand_distr::LogNormal::new(mu.sample(rng), sigma.sample(rng)) {
                    Ok(dist) => dist.sample(rng),
                    Err(_) => mu.sample(rng).exp(),
                }
            }
            Deviate::Gamma { shape, scale } => {
                match rand_distr::Gamma::new(shape.sample(rng), scale.sample(rng)) {
                    Ok(dist) => dist.sample(rng),
                    Err(_) => shape.sample(rng) * scale.sample(rng),
                }
            }
            Deviate::Beta { alpha, beta } => {
                match rand_distr::Beta::new(alpha.sample(rng), beta.sample(rng)) {
                    Ok(dist) => dist.sample(rng),
                    Err(_) => 0.5,
                }
            }
            Deviate::Histogram {
                boundaries,
                weights,
            } => {
                let bounds: Vec<f64> = boundaries.iter().map(|b| b.sample(rng)).collect();
                let values: Vec<f64> = weights.iter().map(|w| w.sample(rng)).collect();
                let total: f64 = values.iter().sum();
                let mut pick = rng.gen::<f64>() * total;
                for (i, &w) in values.iter().enumerate() {
                    if pick < w || i == values.len() - 1 {
                        return rng.gen_range(bounds[i]..bounds[i + 1]);
                    }
                    pick -= w;
                }
                unreachable!("histogram weights sum to a positive total")
            }
        }
    }

    /// The practical support bounds, from argument means.
    pub fn interval(&self) -> Interval {
        match self {
            Deviate::Uniform { min, max } => {
                Interval::closed(min.interval().lower(), max.interval().upper())
            }
            Deviate::Normal { mean, sigma } => {
                let (m, s) = (mean.mean(), sigma.mean());
                Interval::closed(m - SUPPORT_SIGMAS * s, m + SUPPORT_SIGMAS * s)
            }
            Deviate::LogNormalEf {
                mean,
                error_factor,
                level,
            } => {
                let (mu, sigma) = lognormal_params(mean.mean(), error_factor.mean(), level.mean());
                Interval::closed(0.0, (mu + SUPPORT_SIGMAS * sigma).exp())
            }
            Deviate::LogNormal { mu, sigma } => {
                Interval::closed(0.0, (mu.mean() + SUPPORT_SIGMAS * sigma.mean()).exp())
            }
            Deviate::Gamma { shape, scale } => {
                let (k, theta) = (shape.mean(), scale.mean());
                Interval::closed(0.0, k * theta + SUPPORT_SIGMAS * theta * k.sqrt())
            }
            Deviate::Beta { .. } => Interval::closed(0.0, 1.0),
            Deviate::Histogram { boundaries, .. } => Interval::closed(
                boundaries.first().map(|b| b.mean()).unwrap_or(0.0),
                boundaries.last().map(|b| b.mean()).unwrap_or(0.0),
            ),
        }
    }

    /// Visits every argument expression once.
    pub fn for_each_arg(&self, visit: &mut dyn FnMut(&Expression)) {
        match self {
            Deviate::Uniform { min, max } => {
                visit(min);
                visit(max);
            }
            Deviate::Normal { mean, sigma } => {
                visit(mean);
                visit(sigma);
            }
            Deviate::LogNormalEf {
                mean,
                error_factor,
                level,
            } => {
                visit(mean);
                visit(error_factor);
                visit(level);
            }
            Deviate::LogNormal { mu, sigma } => {
                visit(mu);
                visit(sigma);
            }
            Deviate::Gamma { shape, scale } => {
                visit(shape);
                visit(scale);
            }
            Deviate::Beta { alpha, beta } => {
                visit(alpha);
                visit(beta);
            }
            Deviate::Histogram {
                boundaries,
                weights,
            } => {
                for b in boundaries {
                    visit(b);
                }
                for w in weights {
                    visit(w);
                }
            }
        }
    }
}

/// Underlying normal parameters for the mean / error-factor parametrisation:
/// sigma = ln(EF) / z(level), mu = ln(mean) - sigma^2 / 2.
fn lognormal_params(mean: f64, error_factor: f64, level: f64) -> (f64, f64) {
    let sigma = error_factor.ln() / normal_quantile(level);
    let mu = mean.ln() - sigma * sigma / 2.0;
    (mu, sigma)
}

/// Inverse standard-normal CDF (Acklam's rational approximation, relative
/// error below 1.2e-9 on (0, 1)).
pub(crate) fn normal_quantile(p: f64) -> f64 {
    const A: [f64; 6] = [
        -3.969683028665376e+01,
        2.209460984245205e+02,
        -2.759285104469687e+02,
        1.383577518672690e+02,
        -3.066479806614716e+01,
        2.506628277459239e+00,
    ];
    const B: [f64; 5] = [
        -5.447609879822406e+01,
        1.615858368580409e+02,
        -1.556989798598866e+02,
        6.680131188771972e+01,
        -1.328068155288572e+01,
    ];
    const C: [f64; 6] = [
        -7.784894002430293e-03,
        -3.223964580411365e-01,
        -2.400758277161838e+00,
        -2.549732539343734e+00,
        4.374664141464968e+00,
        2.938163982698783e+00,
    ];
    const D: [f64; 4] = [
        7.784695709041462e-03,
        3.224671290700398e-01,
        2.445134137142996e+00,
        3.754408661907416e+00,
    ];
    const P_LOW: f64 = 0.02425;

    debug_assert!(p > 0.0 && p < 1.0);
    if p < P_LOW {
        let q = (-2.0 * p.ln()).sqrt();
        (((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    } else if p <= 1.0 - P_LOW {
        let q = p - 0.5;
        let r = q * q;
        (((((A[0] * r + A[1]) * r + A[2]) * r + A[3]) * r + A[4]) * r + A[5]) * q
            / (((((B[0] * r + B[1]) * r + B[2]) * r + B[3]) * r + B[4]) * r + 1.0)
    } else {
        -normal_quantile(1.0 - p)
    }
}

fn invalid(message: &str) -> Error {
    Error::new(ErrorKind::InvalidArgument(message.into()))
}

fn ensure_positive(expr: &ExpressionRef, what: &str) -> Result<()> {
    if expr.mean() <= 0.0 {
        return Err(invalid(&format!("{what} must be positive")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn c(v: f64) -> ExpressionRef {
        Expression::constant(v)
    }

    #[test]
    fn uniform_mean_and_support() {
        let d = Expression::deviate(Deviate::Uniform {
            min: c(0.2),
            max: c(0.4),
        })
        .unwrap();
        assert!((d.mean() - 0.3).abs() < 1e-12);
        assert!(d.interval().is_probability());
        assert!(!d.is_constant());
    }

    #[test]
    fn lognormal_mean_matches_closed_form() {
        let d = Expression::deviate(Deviate::LogNormal {
            mu: c(-2.0),
            sigma: c(0.5),
        })
        .unwrap();
        assert!((d.mean() - (-2.0f64 + 0.125).exp()).abs() < 1e-12);
    }

    #[test]
    fn invalid_sigma_is_rejected() {
        let err = Expression::deviate(Deviate::Normal {
            mean: c(0.5),
            sigma: c(0.0),
        })
        .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::InvalidArgument(_)));
    }

    #[test]
    fn sample_is_memoised_until_reset() {
        let d = Expression::deviate(Deviate::Uniform {
            min: c(0.0),
            max: c(1.0),
        })
        .unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let first = d.sample(&mut rng);
        assert_eq!(d.sample(&mut rng), first);
        d.reset();
        // A fresh draw is overwhelmingly unlikely to repeat exactly.
        assert_ne!(d.sample(&mut rng), first);
    }

    #[test]
    fn normal_quantile_reference_points() {
        assert!((normal_quantile(0.5)).abs() < 1e-9);
        assert!((normal_quantile(0.95) - 1.6448536).abs() < 1e-6);
        assert!((normal_quantile(0.975) - 1.9599640).abs() < 1e-6);
    }

    #[test]
    fn histogram_mean_is_weighted_midpoints() {
        let d = Expression::deviate(Deviate::Histogram {
            boundaries: vec![c(0.0), c(0.2), c(0.6)],
            weights: vec![c(1.0), c(3.0)],
        })
        .unwrap();
        // (0.1 * 1 + 0.4 * 3) / 4 = 0.325
        assert!((d.mean() - 0.325).abs() < 1e-12);
    }

    #[test]
    fn sample_mean_converges_to_analytic_mean() {
        let d = Deviate::Gamma {
            shape: c(2.0),
            scale: c(0.05),
        };
        let mut rng = StdRng::seed_from_u64(42);
        let n = 20_000;
        let total: f64 = (0..n).map(|_| d.sample(&mut rng)).sum();
        let analytic = 0.1;
        assert!((total / n as f64 - analytic).abs() / analytic < 0.05);
    }
}
