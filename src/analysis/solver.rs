//! Bounded nonlinear least squares.
//!
//! Levenberg-Marquardt with Marquardt's diagonal scaling and a forward
//! difference Jacobian. Parameters held at a bound by the gradient are left
//! out of the damped system, so the remaining ones take full steps. Every
//! trial point is projected onto the box `[lower, upper]`, and the damping
//! follows the ratio of actual to predicted cost reduction.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const INITIAL_DAMPING: f64 = 1e-3;
const MIN_DAMPING: f64 = 1e-12;
const MAX_DAMPING: f64 = 1e16;
/// Floor for the damping diagonal, keeps flat directions invertible.
const MIN_DIAGONAL: f64 = 1e-12;

/// A model that can report its residuals for a parameter vector.
pub trait Residuals {
    /// `model(params) - observed`, one entry per data point.
    fn residuals(&self, params: &DVector<f64>) -> DVector<f64>;
}

impl<F> Residuals for F
where
    F: Fn(&DVector<f64>) -> DVector<f64>,
{
    fn residuals(&self, params: &DVector<f64>) -> DVector<f64> {
        self(params)
    }
}

/// Stopping rules for [`minimize`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverSettings {
    /// Residual evaluations allowed, Jacobian columns included.
    pub max_evaluations: usize,
    /// Relative reduction of the cost below which the fit has converged.
    pub ftol: f64,
    /// Relative step size below which the fit has converged.
    pub xtol: f64,
    /// Max-norm of the gradient over the free parameters below which the fit
    /// has converged.
    pub gtol: f64,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            max_evaluations: 10_000,
            ftol: 1e-12,
            xtol: 1e-12,
            gtol: 1e-12,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolverError {
    #[error("no convergence after {evaluations} evaluations")]
    NotConverged { evaluations: usize },
    #[error("model produced non-finite residuals")]
    NonFinite,
    #[error("{params} parameters but {lower} lower and {upper} upper bounds")]
    BoundsMismatch {
        params: usize,
        lower: usize,
        upper: usize,
    },
}

/// Box constraints, one pair per parameter. Infinite values are allowed.
#[derive(Debug, Clone, PartialEq)]
pub struct Bounds {
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

impl Bounds {
    pub fn project(&self, p: &DVector<f64>) -> DVector<f64> {
        DVector::from_iterator(
            p.len(),
            p.iter()
                .enumerate()
                .map(|(i, &v)| v.max(self.lower[i]).min(self.upper[i])),
        )
    }

    /// True when moving parameter `i` along `direction` would leave the box.
    fn blocks(&self, p: &DVector<f64>, i: usize, direction: f64) -> bool {
        (p[i] <= self.lower[i] && direction < 0.0) || (p[i] >= self.upper[i] && direction > 0.0)
    }

    /// Parameters the solver may move: not fixed, and not pressed against a
    /// bound by the descent direction `-g`.
    fn free_set(&self, p: &DVector<f64>, g: &DVector<f64>) -> Vec<usize> {
        (0..p.len())
            .filter(|&i| self.lower[i] < self.upper[i] && !self.blocks(p, i, -g[i]))
            .collect()
    }
}

/// Converged parameters and bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    pub params: Vec<f64>,
    /// Half the sum of squared residuals.
    pub cost: f64,
    pub evaluations: usize,
    pub iterations: usize,
}

struct Counter {
    used: usize,
    limit: usize,
}

impl Counter {
    fn eval<P: Residuals>(&mut self, problem: &P, p: &DVector<f64>) -> Result<DVector<f64>, SolverError> {
        if self.used >= self.limit {
            return Err(SolverError::NotConverged {
                evaluations: self.used,
            });
        }
        self.used += 1;
        Ok(problem.residuals(p))
    }
}

fn half_squared_norm(r: &DVector<f64>) -> Option<f64> {
    let cost = 0.5 * r.norm_squared();
    cost.is_finite().then_some(cost)
}

/// Solve the damped normal equations over `free`. Parameters whose step
/// would run into the bound they sit on are pinned and the system is solved
/// again without them. Returns the full-length step, or `None` when the
/// system is singular or nothing is left to move.
fn damped_step(
    normal: &DMatrix<f64>,
    gradient: &DVector<f64>,
    free: &[usize],
    p: &DVector<f64>,
    bounds: &Bounds,
    lambda: f64,
) -> Option<DVector<f64>> {
    let mut free = free.to_vec();
    loop {
        if free.is_empty() {
            return None;
        }
        let m = free.len();
        let damped = DMatrix::from_fn(m, m, |a, b| {
            let (i, j) = (free[a], free[b]);
            if a == b {
                normal[(i, i)] + lambda * normal[(i, i)].max(MIN_DIAGONAL)
            } else {
                normal[(i, j)]
            }
        });
        let rhs = DVector::from_iterator(m, free.iter().map(|&i| -gradient[i]));
        let reduced = damped.cholesky()?.solve(&rhs);

        let before = free.len();
        let kept: Vec<(usize, f64)> = free
            .iter()
            .zip(reduced.iter())
            .map(|(&i, &s)| (i, s))
            .filter(|&(i, s)| !bounds.blocks(p, i, s))
            .collect();
        if kept.len() == before {
            let mut step = DVector::zeros(p.len());
            for (i, s) in kept {
                step[i] = s;
            }
            return Some(step);
        }
        free = kept.into_iter().map(|(i, _)| i).collect();
    }
}

/// Minimise `½‖residuals(p)‖²` subject to `bounds`, starting from `initial`.
pub fn minimize<P: Residuals>(
    problem: &P,
    initial: &[f64],
    bounds: &Bounds,
    settings: &SolverSettings,
) -> Result<Solution, SolverError> {
    let n = initial.len();
    if bounds.lower.len() != n || bounds.upper.len() != n {
        return Err(SolverError::BoundsMismatch {
            params: n,
            lower: bounds.lower.len(),
            upper: bounds.upper.len(),
        });
    }

    let mut counter = Counter {
        used: 0,
        limit: settings.max_evaluations,
    };
    let mut p = bounds.project(&DVector::from_column_slice(initial));
    let mut r = counter.eval(problem, &p)?;
    let mut cost = half_squared_norm(&r).ok_or(SolverError::NonFinite)?;
    let mut lambda = INITIAL_DAMPING;
    let mut growth = 2.0;
    let mut iterations = 0;

    let done = |p: &DVector<f64>, cost: f64, used: usize, iterations: usize| -> Result<Solution, SolverError> {
        log::debug!("solver stopped: cost={cost:.6e} evaluations={used} iterations={iterations}");
        Ok(Solution {
            params: p.iter().cloned().collect(),
            cost,
            evaluations: used,
            iterations,
        })
    };

    loop {
        if cost == 0.0 {
            return done(&p, cost, counter.used, iterations);
        }

        let jac = jacobian(problem, &p, &r, bounds, &mut counter)?;
        let gradient = jac.transpose() * &r;
        let normal = jac.transpose() * &jac;

        let free = bounds.free_set(&p, &gradient);
        let free_gradient = free.iter().map(|&i| gradient[i].abs()).fold(0.0, f64::max);
        if free.is_empty() || free_gradient <= settings.gtol {
            return done(&p, cost, counter.used, iterations);
        }

        loop {
            let mut accepted = None;
            if let Some(step) = damped_step(&normal, &gradient, &free, &p, bounds, lambda) {
                let trial = bounds.project(&(&p + step));
                let r_trial = counter.eval(problem, &trial)?;
                if let Some(c) = half_squared_norm(&r_trial).filter(|&c| c < cost) {
                    // gain ratio against the quadratic model of the projected step
                    let d = &trial - &p;
                    let predicted = -(gradient.dot(&d) + 0.5 * d.dot(&(&normal * &d)));
                    let gain = if predicted > 0.0 { (cost - c) / predicted } else { 0.0 };
                    accepted = Some((trial, r_trial, c, gain));
                }
            }

            if let Some((trial, r_trial, trial_cost, gain)) = accepted {
                let reduction = (cost - trial_cost) / cost;
                let step_norm = (&trial - &p).norm();
                p = trial;
                r = r_trial;
                cost = trial_cost;
                iterations += 1;
                if gain > 0.0 {
                    let scale = (1.0 - (2.0 * gain - 1.0).powi(3)).max(1.0 / 3.0);
                    lambda = (lambda * scale).max(MIN_DAMPING);
                }
                growth = 2.0;

                if reduction <= settings.ftol || step_norm <= settings.xtol * (p.norm() + settings.xtol) {
                    return done(&p, cost, counter.used, iterations);
                }
                break;
            }

            lambda *= growth;
            growth *= 2.0;
            if lambda > MAX_DAMPING {
                // No downhill step left at any damping: a local minimum.
                return done(&p, cost, counter.used, iterations);
            }
        }
    }
}

/// Forward differences, stepping backwards at an upper bound.
fn jacobian<P: Residuals>(
    problem: &P,
    p: &DVector<f64>,
    r: &DVector<f64>,
    bounds: &Bounds,
    counter: &mut Counter,
) -> Result<DMatrix<f64>, SolverError> {
    let eps = f64::EPSILON.sqrt();
    let mut jac = DMatrix::<f64>::zeros(r.len(), p.len());

    for j in 0..p.len() {
        if bounds.lower[j] >= bounds.upper[j] {
            continue;
        }
        let mut h = eps * p[j].abs().max(1.0);
        if p[j] + h > bounds.upper[j] {
            h = -h;
        }
        let mut shifted = p.clone();
        shifted[j] += h;

        let r_shifted = counter.eval(problem, &shifted)?;
        if r_shifted.iter().any(|v| !v.is_finite()) {
            return Err(SolverError::NonFinite);
        }
        jac.set_column(j, &((r_shifted - r) / h));
    }

    Ok(jac)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn exponential_data() -> (Vec<f64>, Vec<f64>) {
        let x: Vec<f64> = (0..30).map(|i| i as f64 * 0.2).collect();
        let y = x.iter().map(|&xi| 4.0 * (-0.7 * xi).exp() + 1.0).collect();
        (x, y)
    }

    #[test]
    fn fits_an_exponential_decay() {
        let (x, y) = exponential_data();
        let problem = |p: &DVector<f64>| {
            DVector::from_iterator(
                x.len(),
                x.iter().zip(&y).map(|(&xi, &yi)| p[0] * (-p[1] * xi).exp() + p[2] - yi),
            )
        };
        let bounds = Bounds {
            lower: vec![0.0, 0.0, f64::NEG_INFINITY],
            upper: vec![f64::INFINITY, 5.0, f64::INFINITY],
        };

        let sol = minimize(&problem, &[1.0, 0.2, 0.0], &bounds, &SolverSettings::default()).unwrap();
        assert_relative_eq!(sol.params[0], 4.0, max_relative = 1e-6);
        assert_relative_eq!(sol.params[1], 0.7, max_relative = 1e-6);
        assert_relative_eq!(sol.params[2], 1.0, max_relative = 1e-6);
        assert!(sol.cost < 1e-12);
    }

    #[test]
    fn respects_an_active_bound() {
        // unconstrained optimum is p = 3, bound caps it at 2
        let problem = |p: &DVector<f64>| DVector::from_vec(vec![p[0] - 3.0, 0.5 * (p[0] - 3.0)]);
        let bounds = Bounds {
            lower: vec![0.0],
            upper: vec![2.0],
        };
        let sol = minimize(&problem, &[0.5], &bounds, &SolverSettings::default()).unwrap();
        assert_relative_eq!(sol.params[0], 2.0);
    }

    #[test]
    fn bound_parameter_leaves_the_others_free() {
        // p0 + p1 = 3 is pulled hard, p0 = p1 only weakly; with p0 capped at 1
        // the optimum is p1 = (2 + k²) / (1 + k²)
        let k = 1e-2;
        let problem = |p: &DVector<f64>| DVector::from_vec(vec![p[0] + p[1] - 3.0, k * (p[0] - p[1])]);
        let bounds = Bounds {
            lower: vec![-10.0, -10.0],
            upper: vec![1.0, 10.0],
        };
        let sol = minimize(&problem, &[0.0, 0.0], &bounds, &SolverSettings::default()).unwrap();
        assert_eq!(sol.params[0], 1.0);
        assert_relative_eq!(sol.params[1], (2.0 + k * k) / (1.0 + k * k), max_relative = 1e-9);
        assert!(sol.evaluations < 100, "{} evaluations", sol.evaluations);
    }

    #[test]
    fn free_set_drops_parameters_pressed_on_a_bound() {
        let bounds = Bounds {
            lower: vec![0.0, 0.0, 0.0, 1.0],
            upper: vec![1.0, 1.0, 1.0, 1.0],
        };
        let p = DVector::from_vec(vec![0.0, 1.0, 0.0, 1.0]);
        // descends out of the box at 0 and 1, back inside at 2, fixed at 3
        let g = DVector::from_vec(vec![1.0, -1.0, -1.0, 5.0]);
        assert_eq!(bounds.free_set(&p, &g), vec![2]);
    }

    #[test]
    fn evaluation_cap_reports_non_convergence() {
        let (x, y) = exponential_data();
        let problem = |p: &DVector<f64>| {
            DVector::from_iterator(
                x.len(),
                x.iter().zip(&y).map(|(&xi, &yi)| p[0] * (-p[1] * xi).exp() - yi),
            )
        };
        let bounds = Bounds {
            lower: vec![f64::NEG_INFINITY; 2],
            upper: vec![f64::INFINITY; 2],
        };
        let settings = SolverSettings {
            max_evaluations: 3,
            ..SolverSettings::default()
        };
        assert!(matches!(
            minimize(&problem, &[1.0, 0.1], &bounds, &settings),
            Err(SolverError::NotConverged { .. })
        ));
    }

    #[test]
    fn mismatched_bounds_are_rejected() {
        let problem = |p: &DVector<f64>| p.clone();
        let bounds = Bounds {
            lower: vec![0.0],
            upper: vec![1.0, 2.0],
        };
        assert!(matches!(
            minimize(&problem, &[0.5], &bounds, &SolverSettings::default()),
            Err(SolverError::BoundsMismatch { .. })
        ));
    }
}
