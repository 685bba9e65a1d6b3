//! Implements the two-coefficient radial distortion model.
//!
//! This module provides the [`RadialDistortion`] struct, which describes a
//! radially symmetric lens through the factor `1 + a·r² + b·r⁴`. Positive
//! coefficients produce barrel distortion, negative ones pincushion distortion.
//! The model can distort a radius directly and invert the distortion with the
//! bounded secant iteration of [`SecantSolver`].

use crate::lens::{
    validation, Coefficients, DistortionError, InverseSolution, LensModelKind, SecantSolver,
};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::{fmt, fs, io::Write};
use yaml_rust::YamlLoader;

/// Coefficients of the Cardboard viewer the distortion meshes were first tuned for.
pub const DEFAULT_COEFFICIENTS: Coefficients = [250.0, 50000.0];

/// A radially symmetric lens distortion model.
///
/// The distorted radius is `r · (1 + a·r² + b·r⁴)`, where `[a, b]` are the
/// model's coefficients. The model carries no other state.
///
/// # Examples
///
/// ```rust
/// use distortion_mesh::lens::RadialDistortion;
///
/// let lens = RadialDistortion::new([250.0, 50000.0]).unwrap();
/// let factor = lens.distortion_factor(0.01);
/// assert!((factor - 1.0255).abs() < 1e-9);
///
/// let distorted = lens.distort(0.01);
/// let recovered = lens.distort_inverse(distorted).unwrap();
/// assert!(recovered.is_converged());
/// assert!((recovered.value() - 0.01).abs() < 1e-3);
/// ```
#[derive(Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RadialDistortion {
    /// `[a, b]`: the `r²` and `r⁴` terms of the distortion factor.
    coefficients: Coefficients,
}

impl Default for RadialDistortion {
    fn default() -> Self {
        RadialDistortion {
            coefficients: DEFAULT_COEFFICIENTS,
        }
    }
}

impl fmt::Debug for RadialDistortion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RadialDistortion [a: {} b: {}]",
            self.coefficients[0], self.coefficients[1]
        )
    }
}

impl RadialDistortion {
    /// Creates a new [`RadialDistortion`] from its two coefficients.
    ///
    /// # Errors
    ///
    /// Returns [`DistortionError::NonFiniteCoefficients`] if either coefficient
    /// is NaN or infinite.
    pub fn new(coefficients: Coefficients) -> Result<Self, DistortionError> {
        let model = RadialDistortion { coefficients };
        model.validate_params()?;
        Ok(model)
    }

    pub fn coefficients(&self) -> Coefficients {
        self.coefficients
    }

    /// Replaces both coefficients. The model is left untouched on error.
    pub fn set_coefficients(&mut self, coefficients: Coefficients) -> Result<(), DistortionError> {
        validation::validate_coefficients(&coefficients)?;
        self.coefficients = coefficients;
        Ok(())
    }

    /// Returns `1 + a·r² + b·r⁴`.
    pub fn distortion_factor(&self, radius: f64) -> f64 {
        let r2 = radius * radius;
        1.0 + self.coefficients[0] * r2 + self.coefficients[1] * r2 * r2
    }

    /// Returns `r + a·r³ + b·r⁵`.
    pub fn distort(&self, radius: f64) -> f64 {
        radius * self.distortion_factor(radius)
    }

    /// Recovers the undistorted radius using the default [`SecantSolver`].
    ///
    /// # Errors
    ///
    /// Returns [`DistortionError::InvalidRadius`] for negative or non-finite input.
    /// Non-convergence is not an error; it is reported through the returned
    /// [`InverseSolution`].
    pub fn distort_inverse(&self, distorted_radius: f64) -> Result<InverseSolution, DistortionError> {
        self.distort_inverse_with(distorted_radius, &SecantSolver::default())
    }

    /// Recovers the undistorted radius with an explicit solver configuration.
    pub fn distort_inverse_with(
        &self,
        distorted_radius: f64,
        solver: &SecantSolver,
    ) -> Result<InverseSolution, DistortionError> {
        validation::validate_radius(distorted_radius)?;
        solver.validate()?;
        let solution = solver.solve(distorted_radius, |r| self.distort(r));
        debug!("distort_inverse({distorted_radius}) -> {solution:?}");
        Ok(solution)
    }

    /// Ratio `distort_inverse(r) / r` by which a point at distorted radius `r`
    /// must be pulled towards the center. Exactly `1` at the center.
    ///
    /// A non-convergent solve is logged and its best estimate used.
    pub fn shrink_ratio(&self, radius: f64) -> Result<f64, DistortionError> {
        validation::validate_radius(radius)?;
        if radius == 0.0 {
            return Ok(1.0);
        }
        let solution = self.distort_inverse(radius)?;
        if !solution.is_converged() {
            warn!(
                "Inverse distortion did not converge for radius {} after {} iterations",
                radius,
                solution.iterations()
            );
        }
        Ok(solution.value() / radius)
    }

    /// Validates the distortion coefficients.
    pub fn validate_params(&self) -> Result<(), DistortionError> {
        validation::validate_coefficients(&self.coefficients)
    }

    /// Loads the lens parameters from a YAML file.
    ///
    /// The file is expected to contain a `lens0` block:
    ///
    /// ```yaml
    /// lens0:
    ///   lens_model: radial_polynomial
    ///   coefficients: [250.0, 50000.0]
    /// ```
    ///
    /// # Errors
    ///
    /// * [`DistortionError::IOError`]: the file cannot be read.
    /// * [`DistortionError::YamlError`]: the content is not valid YAML.
    /// * [`DistortionError::InvalidParams`]: the `lens0` block is missing, names a
    ///   different lens model, or does not hold exactly two numeric coefficients.
    /// * [`DistortionError::NonFiniteCoefficients`]: a coefficient is not finite.
    pub fn load_from_yaml(path: &str) -> Result<Self, DistortionError> {
        let contents = fs::read_to_string(path)?;
        let docs = YamlLoader::load_from_str(&contents)?;

        if docs.is_empty() {
            return Err(DistortionError::InvalidParams(
                "Empty YAML document".to_string(),
            ));
        }

        let lens = &docs[0]["lens0"];
        if lens.is_badvalue() {
            return Err(DistortionError::InvalidParams(
                "Missing lens0 block".to_string(),
            ));
        }

        if let Some(kind) = lens["lens_model"].as_str() {
            if kind != LensModelKind::RadialPolynomial.as_str() {
                return Err(DistortionError::InvalidParams(format!(
                    "Unsupported lens model: {kind}"
                )));
            }
        }

        let coefficients_node = lens["coefficients"].as_vec().ok_or_else(|| {
            DistortionError::InvalidParams("Missing distortion coefficients".to_string())
        })?;

        if coefficients_node.len() != 2 {
            return Err(DistortionError::InvalidParams(format!(
                "Expected 2 distortion coefficients in YAML, found {}",
                coefficients_node.len()
            )));
        }

        let mut coefficients = [0.0; 2];
        for (i, node) in coefficients_node.iter().enumerate() {
            // Integers such as `250` are valid coefficients too.
            coefficients[i] = node
                .as_f64()
                .or_else(|| node.as_i64().map(|v| v as f64))
                .ok_or_else(|| {
                    DistortionError::InvalidParams(format!(
                        "Invalid distortion coefficient at index {i}"
                    ))
                })?;
        }

        RadialDistortion::new(coefficients)
    }

    /// Saves the lens parameters to a YAML file in the layout read by
    /// [`RadialDistortion::load_from_yaml`].
    pub fn save_to_yaml(&self, path: &str) -> Result<(), DistortionError> {
        let yaml = serde_yaml::to_value(serde_yaml::Mapping::from_iter([(
            serde_yaml::Value::String("lens0".to_string()),
            serde_yaml::to_value(serde_yaml::Mapping::from_iter([
                (
                    serde_yaml::Value::String("lens_model".to_string()),
                    serde_yaml::Value::String(LensModelKind::RadialPolynomial.as_str().to_string()),
                ),
                (
                    serde_yaml::Value::String("coefficients".to_string()),
                    serde_yaml::to_value(self.coefficients.to_vec())?,
                ),
            ]))?,
        )]))?;

        let yaml_string = serde_yaml::to_string(&yaml)?;

        let mut file = fs::File::create(path)?;
        file.write_all(yaml_string.as_bytes())?;

        Ok(())
    }
}
