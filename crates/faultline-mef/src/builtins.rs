//! Reliability built-ins: failure models evaluated over mission time.
//!
//! All four families yield probabilities; their supports are [0, 1] by
//! construction and their parameters are checked when the node is built and
//! again during model validation once late-bound parameters are resolved.

use crate::error::{Error, ErrorKind, Result};
use crate::expression::{Expression, ExpressionRef, Interval};

/// A built-in failure model.
#[derive(Debug)]
pub enum Builtin {
    /// `1 - exp(-lambda * t)`.
    Exponential {
        lambda: ExpressionRef,
        time: ExpressionRef,
    },
    /// Generalised repairable component:
    /// `Q(t) = lambda / (lambda + mu) + (gamma - lambda / (lambda + mu)) * exp(-(lambda + mu) * t)`.
    Glm {
        gamma: ExpressionRef,
        lambda: ExpressionRef,
        mu: ExpressionRef,
        time: ExpressionRef,
    },
    /// `1 - exp(-((t - t0) / alpha)^beta)` for `t > t0`, else 0.
    Weibull {
        scale: ExpressionRef,
        shape: ExpressionRef,
        shift: ExpressionRef,
        time: ExpressionRef,
    },
    /// Failure-on-demand curve of a periodically tested component; the value
    /// is piecewise over time and jumps at each test boundary.
    PeriodicTest(PeriodicTest),
}

/// The three accepted periodic-test signatures.
#[derive(Debug)]
pub enum PeriodicTest {
    /// `(lambda, tau, theta, t)`: failure rate, test period, time to the
    /// first test, mission time. Tests are instantaneous and perfect.
    Four {
        lambda: ExpressionRef,
        tau: ExpressionRef,
        theta: ExpressionRef,
        time: ExpressionRef,
    },
    /// Adds the test duration; the component is unavailable while under test
    /// and renewed when the test completes.
    Five {
        lambda: ExpressionRef,
        tau: ExpressionRef,
        theta: ExpressionRef,
        test_duration: ExpressionRef,
        time: ExpressionRef,
    },
    /// Full model: standby/test failure-rate split, repair rate for detected
    /// failures, test-caused failure probability, availability during test,
    /// detection probability, and replacement fraction.
    Eleven {
        lambda: ExpressionRef,
        lambda_test: ExpressionRef,
        mu: ExpressionRef,
        tau: ExpressionRef,
        theta: ExpressionRef,
        gamma: ExpressionRef,
        test_duration: ExpressionRef,
        available_at_test: ExpressionRef,
        sigma: ExpressionRef,
        omega: ExpressionRef,
        time: ExpressionRef,
    },
}

impl Builtin {
    pub fn validate(&self) -> Result<()> {
        match self {
            Builtin::Exponential { lambda, time } => {
                ensure_non_negative(lambda, "failure rate")?;
                ensure_non_negative(time, "time")?;
            }
            Builtin::Glm {
                gamma,
                lambda,
                mu,
                time,
            } => {
                ensure_probability(gamma, "initial unavailability")?;
                ensure_positive(lambda, "failure rate")?;
                ensure_non_negative(mu, "repair rate")?;
                ensure_non_negative(time, "time")?;
            }
            Builtin::Weibull {
                scale,
                shape,
                shift,
                time,
            } => {
                ensure_positive(scale, "Weibull scale")?;
                ensure_positive(shape, "Weibull shape")?;
                ensure_non_negative(shift, "Weibull time shift")?;
                ensure_non_negative(time, "time")?;
            }
            Builtin::PeriodicTest(pt) => pt.validate()?,
        }
        Ok(())
    }

    /// Evaluates the failure model with argument values supplied by `eval`.
    pub fn compute(&self, eval: &mut dyn FnMut(&Expression) -> f64) -> f64 {
        match self {
            Builtin::Exponential { lambda, time } => p_exponential(eval(lambda), eval(time)),
            Builtin::Glm {
                gamma,
                lambda,
                mu,
                time,
            } => {
                let (gamma, lambda, mu, t) = (eval(gamma), eval(lambda), eval(mu), eval(time));
                let rate = lambda + mu;
                let limit = lambda / rate;
                limit + (gamma - limit) * (-rate * t).exp()
            }
            Builtin::Weibull {
                scale,
                shape,
                shift,
                time,
            } => {
                let (alpha, beta, t0, t) = (eval(scale), eval(shape), eval(shift), eval(time));
                if t <= t0 {
                    0.0
                } else {
                    1.0 - (-((t - t0) / alpha).powf(beta)).exp()
                }
            }
            Builtin::PeriodicTest(pt) => pt.compute(eval),
        }
    }

    pub fn interval(&self) -> Interval {
        // Every built-in is a probability by construction.
        Interval::closed(0.0, 1.0)
    }

    pub fn for_each_arg(&self, visit: &mut dyn FnMut(&Expression)) {
        match self {
            Builtin::Exponential { lambda, time } => {
                visit(lambda);
                visit(time);
            }
            Builtin::Glm {
                gamma,
                lambda,
                mu,
                time,
            } => {
                visit(gamma);
                visit(lambda);
                visit(mu);
                visit(time);
            }
            Builtin::Weibull {
                scale,
                shape,
                shift,
                time,
            } => {
                visit(scale);
                visit(shape);
                visit(shift);
                visit(time);
            }
            Builtin::PeriodicTest(pt) => pt.for_each_arg(visit),
        }
    }
}

impl PeriodicTest {
    fn validate(&self) -> Result<()> {
        match self {
            PeriodicTest::Four {
                lambda,
                tau,
                theta,
                time,
            } => {
                ensure_positive(lambda, "failure rate")?;
                ensure_positive(tau, "test period")?;
                ensure_non_negative(theta, "time to first test")?;
                ensure_non_negative(time, "time")?;
            }
            PeriodicTest::Five {
                lambda,
                tau,
                theta,
                test_duration,
                time,
            } => {
                ensure_positive(lambda, "failure rate")?;
                ensure_positive(tau, "test period")?;
                ensure_non_negative(theta, "time to first test")?;
                ensure_non_negative(test_duration, "test duration")?;
                ensure_non_negative(time, "time")?;
                if test_duration.mean() >= tau.mean() {
                    return Err(invalid("test duration must be shorter than the test period"));
                }
            }
            PeriodicTest::Eleven {
                lambda,
                lambda_test,
                mu,
                tau,
                theta,
                gamma,
                test_duration,
                sigma,
                omega,
                time,
                ..
            } => {
                ensure_positive(lambda, "standby failure rate")?;
                ensure_non_negative(lambda_test, "failure rate under test")?;
                ensure_positive(mu, "repair rate")?;
                ensure_positive(tau, "test period")?;
                ensure_non_negative(theta, "time to first test")?;
                ensure_probability(gamma, "test-caused failure probability")?;
                ensure_non_negative(test_duration, "test duration")?;
                ensure_probability(sigma, "detection probability")?;
                ensure_probability(omega, "replacement fraction")?;
                ensure_non_negative(time, "time")?;
                if test_duration.mean() >= tau.mean() {
                    return Err(invalid("test duration must be shorter than the test period"));
                }
            }
        }
        Ok(())
    }

    fn compute(&self, eval: &mut dyn FnMut(&Expression) -> f64) -> f64 {
        match self {
            PeriodicTest::Four {
                lambda,
                tau,
                theta,
                time,
            } => {
                let (lambda, tau, theta, t) = (eval(lambda), eval(tau), eval(theta), eval(time));
                if t < theta {
                    p_exponential(lambda, t)
                } else {
                    p_exponential(lambda, (t - theta) % tau)
                }
            }
            PeriodicTest::Five {
                lambda,
                tau,
                theta,
                test_duration,
                time,
            } => {
                let (lambda, tau, theta, duration, t) = (
                    eval(lambda),
                    eval(tau),
                    eval(theta),
                    eval(test_duration),
                    eval(time),
                );
                if t < theta {
                    return p_exponential(lambda, t);
                }
                let since_test = (t - theta) % tau;
                if since_test < duration {
                    1.0 // under test: unavailable until the test completes
                } else {
                    p_exponential(lambda, since_test - duration)
                }
            }
            PeriodicTest::Eleven {
                lambda,
                lambda_test,
                mu,
                tau,
                theta,
                gamma,
                test_duration,
                available_at_test,
                sigma,
                omega,
                time,
            } => periodic_test_full(
                eval(lambda),
                eval(lambda_test),
                eval(mu),
                eval(tau),
                eval(theta),
                eval(gamma),
                eval(test_duration),
                eval(available_at_test) != 0.0,
                eval(sigma),
                eval(omega),
                eval(time),
            ),
        }
    }

    fn for_each_arg(&self, visit: &mut dyn FnMut(&Expression)) {
        match self {
            PeriodicTest::Four {
                lambda,
                tau,
                theta,
                time,
            } => {
                visit(lambda);
                visit(tau);
                visit(theta);
                visit(time);
            }
            PeriodicTest::Five {
                lambda,
                tau,
                theta,
                test_duration,
                time,
            } => {
                visit(lambda);
                visit(tau);
                visit(theta);
                visit(test_duration);
                visit(time);
            }
            PeriodicTest::Eleven {
                lambda,
                lambda_test,
                mu,
                tau,
                theta,
                gamma,
                test_duration,
                available_at_test,
                sigma,
                omega,
                time,
            } => {
                visit(lambda);
                visit(lambda_test);
                visit(mu);
                visit(tau);
                visit(theta);
                visit(gamma);
                visit(test_duration);
                visit(available_at_test);
                visit(sigma);
                visit(omega);
                visit(time);
            }
        }
    }
}

fn p_exponential(lambda: f64, t: f64) -> f64 {
    1.0 - (-lambda * t).exp()
}

/// Component state for the full periodic-test model: the undetected-failure
/// fraction plus the detected mass still under repair.
#[derive(Clone, Copy)]
struct TestedState {
    undetected: f64,
    repairing: f64,
}

impl TestedState {
    fn advance(self, lambda: f64, mu: f64, dt: f64) -> TestedState {
        // Units repaired during the segment rejoin the good pool; repair is
        // fast relative to a test interval, so count them good for the whole
        // segment.
        let returned = self.repairing * p_exponential(mu, dt);
        let good = 1.0 - self.undetected - self.repairing + returned;
        TestedState {
            undetected: self.undetected + good * p_exponential(lambda, dt),
            repairing: self.repairing - returned,
        }
    }

    fn unavailability(self) -> f64 {
        self.undetected + self.repairing
    }
}

/// Eleven-argument periodic test. Between tests the component accumulates
/// failure at `lambda`; during a test it accumulates at `lambda_test` and is
/// unavailable unless `available`; at each test end the test itself fails the
/// component with probability `gamma`, a fraction `sigma` of accumulated
/// failure is detected and repaired at rate `mu`, and a fraction `omega` of
/// the failed population is replaced as-good-as-new.
#[allow(clippy::too_many_arguments)]
fn periodic_test_full(
    lambda: f64,
    lambda_test: f64,
    mu: f64,
    tau: f64,
    theta: f64,
    gamma: f64,
    test_duration: f64,
    available: bool,
    sigma: f64,
    omega: f64,
    t: f64,
) -> f64 {
    let mut state = TestedState {
        undetected: 0.0,
        repairing: 0.0,
    };
    let mut test_start = theta;
    let mut segment_start = 0.0;
    loop {
        if t < test_start {
            return state
                .advance(lambda, mu, t - segment_start)
                .unavailability();
        }
        state = state.advance(lambda, mu, test_start - segment_start);
        let test_end = test_start + test_duration;
        if t < test_end {
            if !available {
                return 1.0;
            }
            return state
                .advance(lambda_test, mu, t - test_start)
                .unavailability();
        }
        state = state.advance(lambda_test, mu, test_duration);
        // Test outcome: the test fails gamma of the healthy units, detects
        // sigma of the undetected failures, and omega of all failed units
        // are replaced outright.
        let good = 1.0 - state.undetected - state.repairing;
        state.undetected += good * gamma;
        let detected = sigma * state.undetected;
        state.undetected -= detected;
        state.repairing += detected;
        state.undetected *= 1.0 - omega;
        state.repairing *= 1.0 - omega;
        segment_start = test_end;
        test_start += tau;
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

fn ensure_non_negative(expr: &ExpressionRef, what: &str) -> Result<()> {
    if expr.mean() < 0.0 {
        return Err(invalid(&format!("{what} cannot be negative")));
    }
    Ok(())
}

fn ensure_probability(expr: &ExpressionRef, what: &str) -> Result<()> {
    let value = expr.mean();
    if value < 0.0 || value > 1.0 {
        return Err(invalid(&format!("{what} must lie in [0, 1]")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::Expression;

    fn c(v: f64) -> ExpressionRef {
        Expression::constant(v)
    }

    #[test]
    fn exponential_at_zero_and_infinity() {
        let e = Expression::builtin(Builtin::Exponential {
            lambda: c(1e-3),
            time: c(0.0),
        })
        .unwrap();
        assert_eq!(e.mean(), 0.0);
        let e = Expression::builtin(Builtin::Exponential {
            lambda: c(1e-3),
            time: c(1e9),
        })
        .unwrap();
        assert!((e.mean() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn glm_limits() {
        // At t = 0 the value is gamma; at large t it approaches the
        // steady-state unavailability lambda / (lambda + mu).
        let glm = |t: f64| {
            Expression::builtin(Builtin::Glm {
                gamma: c(0.2),
                lambda: c(1e-3),
                mu: c(1e-2),
                time: c(t),
            })
            .unwrap()
            .mean()
        };
        assert!((glm(0.0) - 0.2).abs() < 1e-12);
        assert!((glm(1e7) - 1e-3 / 1.1e-2).abs() < 1e-9);
    }

    #[test]
    fn weibull_is_zero_before_shift() {
        let w = Expression::builtin(Builtin::Weibull {
            scale: c(1000.0),
            shape: c(1.5),
            shift: c(100.0),
            time: c(50.0),
        })
        .unwrap();
        assert_eq!(w.mean(), 0.0);
    }

    #[test]
    fn periodic_test_four_arg_reference_point() {
        // Tests at 360 h then every 720 h; at t = 1000 h the last test was
        // at 360 h, so 640 h have elapsed: 1 - exp(-0.64).
        let p = Expression::builtin(Builtin::PeriodicTest(PeriodicTest::Four {
            lambda: c(1e-3),
            tau: c(720.0),
            theta: c(360.0),
            time: c(1000.0),
        }))
        .unwrap();
        assert!((p.mean() - (1.0 - (-0.64f64).exp())).abs() < 1e-9);
        assert!((p.mean() - 0.4727).abs() < 1e-4);
    }

    #[test]
    fn periodic_test_jumps_at_test_boundary() {
        let at = |t: f64| {
            Expression::builtin(Builtin::PeriodicTest(PeriodicTest::Four {
                lambda: c(1e-3),
                tau: c(720.0),
                theta: c(360.0),
                time: c(t),
            }))
            .unwrap()
            .mean()
        };
        assert!(at(359.9) > 0.3);
        assert!(at(360.0) < 1e-9);
    }

    #[test]
    fn periodic_test_five_arg_unavailable_during_test() {
        let at = |t: f64| {
            Expression::builtin(Builtin::PeriodicTest(PeriodicTest::Five {
                lambda: c(1e-3),
                tau: c(720.0),
                theta: c(360.0),
                test_duration: c(4.0),
                time: c(t),
            }))
            .unwrap()
            .mean()
        };
        assert_eq!(at(361.0), 1.0);
        // Renewal counts from the end of the test.
        assert!(at(364.0).abs() < 1e-9);
        assert!((at(464.0) - p_exponential(1e-3, 100.0)).abs() < 1e-9);
    }

    #[test]
    fn periodic_test_full_reduces_toward_simple_form() {
        // With perfect instant detection and repair and no test-caused
        // failures, the full model follows the four-argument curve between
        // tests.
        let full = periodic_test_full(
            1e-3, 1e-3, 1e6, 720.0, 360.0, 0.0, 0.0, true, 1.0, 0.0, 1000.0,
        );
        let simple = p_exponential(1e-3, 640.0);
        assert!((full - simple).abs() < 1e-6);
    }

    #[test]
    fn periodic_test_full_unavailable_during_test() {
        let v = periodic_test_full(
            1e-3, 1e-3, 0.1, 720.0, 360.0, 0.0, 4.0, false, 0.9, 0.0, 362.0,
        );
        assert_eq!(v, 1.0);
    }

    #[test]
    fn invalid_test_duration_is_rejected() {
        let err = Expression::builtin(Builtin::PeriodicTest(PeriodicTest::Five {
            lambda: c(1e-3),
            tau: c(24.0),
            theta: c(0.0),
            test_duration: c(24.0),
            time: c(100.0),
        }))
        .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::InvalidArgument(_)));
    }
}
