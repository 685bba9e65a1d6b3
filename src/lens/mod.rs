//! The `lens` module models radially symmetric lens distortion.
//!
//! It provides the [`RadialDistortion`] model (a quartic polynomial factor
//! `1 + a·r² + b·r⁴`), the [`SecantSolver`] used to invert it, and the
//! [`DistortionError`] type shared by both.

use serde::{Deserialize, Serialize};

pub mod radial;
pub mod solver;

pub use radial::RadialDistortion;
pub use solver::{InverseSolution, SecantSolver};

/// The two polynomial coefficients `[a, b]` of a radial distortion model.
pub type Coefficients = [f64; 2];

/// Identifies the lens model stored in a YAML file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LensModelKind {
    RadialPolynomial,
}

impl LensModelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LensModelKind::RadialPolynomial => "radial_polynomial",
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum DistortionError {
    #[error("Distortion coefficients must be finite, got {0:?}")]
    NonFiniteCoefficients(Coefficients),
    #[error("Radius must be finite and non-negative, got {0}")]
    InvalidRadius(f64),
    #[error("Invalid solver parameters: {0}")]
    InvalidSolver(String),
    #[error("Invalid lens parameters: {0}")]
    InvalidParams(String),
    #[error("Failed to load YAML: {0}")]
    YamlError(String),
    #[error("IO Error: {0}")]
    IOError(String),
}

impl From<std::io::Error> for DistortionError {
    fn from(err: std::io::Error) -> Self {
        DistortionError::IOError(err.to_string())
    }
}

impl From<yaml_rust::ScanError> for DistortionError {
    fn from(err: yaml_rust::ScanError) -> Self {
        DistortionError::YamlError(err.to_string())
    }
}

impl From<serde_yaml::Error> for DistortionError {
    fn from(err: serde_yaml::Error) -> Self {
        DistortionError::YamlError(err.to_string())
    }
}

/// Common validation functions for lens parameters
pub mod validation {
    use super::*;

    pub fn validate_coefficients(coefficients: &Coefficients) -> Result<(), DistortionError> {
        if coefficients.iter().any(|c| !c.is_finite()) {
            return Err(DistortionError::NonFiniteCoefficients(*coefficients));
        }
        Ok(())
    }

    pub fn validate_radius(radius: f64) -> Result<(), DistortionError> {
        if !radius.is_finite() || radius < 0.0 {
            return Err(DistortionError::InvalidRadius(radius));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_coefficients() {
        assert!(validation::validate_coefficients(&[250.0, 50000.0]).is_ok());
        assert!(validation::validate_coefficients(&[-0.3, 0.0]).is_ok());
        assert!(matches!(
            validation::validate_coefficients(&[f64::NAN, 1.0]),
            Err(DistortionError::NonFiniteCoefficients(_))
        ));
        assert!(validation::validate_coefficients(&[1.0, f64::INFINITY]).is_err());
    }

    #[test]
    fn test_validate_radius() {
        assert!(validation::validate_radius(0.0).is_ok());
        assert!(validation::validate_radius(12.5).is_ok());
        assert!(validation::validate_radius(-0.1).is_err());
        assert!(validation::validate_radius(f64::NAN).is_err());
    }

    #[test]
    fn test_lens_model_kind_name() {
        assert_eq!(LensModelKind::RadialPolynomial.as_str(), "radial_polynomial");
        let yaml = serde_yaml::to_string(&LensModelKind::RadialPolynomial).unwrap();
        assert_eq!(yaml.trim(), "radial_polynomial");
    }
}
