//! Bounded secant-method root finder used to invert radial distortion.
//!
//! The forward distortion `d(r) = r·(1 + a·r² + b·r⁴)` has no closed-form
//! inverse, so [`SecantSolver`] searches for the root of `f(r) = target − d(r)`
//! starting from the bracket `(target / k, target · k)`. Unlike a bare secant
//! loop, the iteration count is capped and the outcome is reported as an
//! [`InverseSolution`].

use crate::lens::DistortionError;
use serde::{Deserialize, Serialize};

/// Outcome of an inverse distortion solve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InverseSolution {
    /// The step between successive iterates dropped below the tolerance
    /// (or the residual hit exactly zero).
    Converged { radius: f64, iterations: u32 },
    /// The iteration cap was reached, or the secant step became undefined.
    /// `estimate` is the iterate with the smallest residual seen so far.
    DidNotConverge { estimate: f64, iterations: u32 },
}

impl InverseSolution {
    /// The recovered radius, or the best estimate when the solve did not converge.
    pub fn value(&self) -> f64 {
        match *self {
            InverseSolution::Converged { radius, .. } => radius,
            InverseSolution::DidNotConverge { estimate, .. } => estimate,
        }
    }

    pub fn iterations(&self) -> u32 {
        match *self {
            InverseSolution::Converged { iterations, .. }
            | InverseSolution::DidNotConverge { iterations, .. } => iterations,
        }
    }

    pub fn is_converged(&self) -> bool {
        matches!(self, InverseSolution::Converged { .. })
    }
}

/// Parameters of the secant iteration.
///
/// The defaults (`tolerance = 1e-4`, `bracket_factor = 0.9`) are the values the
/// Cardboard-style distortion meshes were tuned with; `max_iterations` bounds the
/// loop so that flat or oscillating residuals cannot hang the caller.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecantSolver {
    /// Stop once `|r1 - r0|` is at or below this value.
    pub tolerance: f64,
    /// The initial iterates are `target / bracket_factor` and `target * bracket_factor`.
    pub bracket_factor: f64,
    /// Hard upper bound on secant steps.
    pub max_iterations: u32,
}

impl Default for SecantSolver {
    fn default() -> Self {
        SecantSolver {
            tolerance: 1e-4,
            bracket_factor: 0.9,
            max_iterations: 100,
        }
    }
}

impl SecantSolver {
    /// Validates the solver parameters.
    ///
    /// # Errors
    ///
    /// Returns [`DistortionError::InvalidSolver`] if the tolerance is not a
    /// positive finite number or the bracket factor is outside `(0, 1)`.
    pub fn validate(&self) -> Result<(), DistortionError> {
        if !self.tolerance.is_finite() || self.tolerance <= 0.0 {
            return Err(DistortionError::InvalidSolver(format!(
                "tolerance must be positive and finite, got {}",
                self.tolerance
            )));
        }
        if !self.bracket_factor.is_finite()
            || self.bracket_factor <= 0.0
            || self.bracket_factor >= 1.0
        {
            return Err(DistortionError::InvalidSolver(format!(
                "bracket factor must lie in (0, 1), got {}",
                self.bracket_factor
            )));
        }
        Ok(())
    }

    /// Finds `r` such that `forward(r) ≈ target`.
    ///
    /// `forward` is expected to be monotonic around the root; the solver itself
    /// makes no assumption beyond finiteness and reports failure through
    /// [`InverseSolution::DidNotConverge`].
    pub fn solve<F>(&self, target: f64, forward: F) -> InverseSolution
    where
        F: Fn(f64) -> f64,
    {
        let residual = |r: f64| target - forward(r);

        let mut r0 = target / self.bracket_factor;
        let mut r1 = target * self.bracket_factor;
        let mut f0 = residual(r0);

        let (mut best, mut best_residual) = if f0.is_finite() {
            (r0, f0.abs())
        } else {
            (r1, f64::INFINITY)
        };

        let mut iterations = 0;
        while (r1 - r0).abs() > self.tolerance {
            if iterations >= self.max_iterations {
                return InverseSolution::DidNotConverge {
                    estimate: best,
                    iterations,
                };
            }

            let f1 = residual(r1);
            if f1 == 0.0 {
                return InverseSolution::Converged {
                    radius: r1,
                    iterations,
                };
            }
            if f1.is_finite() && f1.abs() < best_residual {
                best = r1;
                best_residual = f1.abs();
            }

            let denominator = f1 - f0;
            if denominator == 0.0 || !denominator.is_finite() {
                return InverseSolution::DidNotConverge {
                    estimate: best,
                    iterations,
                };
            }

            let r2 = r1 - f1 * (r1 - r0) / denominator;
            if !r2.is_finite() {
                return InverseSolution::DidNotConverge {
                    estimate: best,
                    iterations,
                };
            }

            r0 = r1;
            r1 = r2;
            f0 = f1;
            iterations += 1;
        }

        InverseSolution::Converged {
            radius: r1,
            iterations,
        }
    }
}
