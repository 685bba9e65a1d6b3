//! YAML configuration tying a lens, a viewport and a mesh layout together.
//!
//! ```yaml
//! lens:
//!   coefficients: [250.0, 50000.0]
//! viewport:
//!   width: 1280.0
//!   height: 960.0
//! mesh:
//!   rows: 40
//!   cols: 40
//!   display_scale: 1.0
//!   radius_space: pixels
//!   eye: mono
//!   vignette_width: null
//!   solver:
//!     tolerance: 0.0001
//!     bracket_factor: 0.9
//!     max_iterations: 100
//! ```
//!
//! Every section and field has a default, so partial files are accepted.

use crate::geometry::Viewport;
use crate::lens::radial::DEFAULT_COEFFICIENTS;
use crate::lens::{Coefficients, DistortionError, RadialDistortion};
use crate::mesh::{DistortionMesh, DistortionMeshBuilder, MeshConfig, MeshError};
use log::info;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse YAML: {0}")]
    YamlError(String),
    #[error("IO Error: {0}")]
    IOError(String),
    #[error("Invalid lens configuration: {0}")]
    Lens(DistortionError),
    #[error("Invalid mesh configuration: {0}")]
    Mesh(MeshError),
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::IOError(err.to_string())
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::YamlError(err.to_string())
    }
}

impl From<DistortionError> for ConfigError {
    fn from(err: DistortionError) -> Self {
        ConfigError::Lens(err)
    }
}

impl From<MeshError> for ConfigError {
    fn from(err: MeshError) -> Self {
        ConfigError::Mesh(err)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LensConfig {
    pub coefficients: Coefficients,
}

impl Default for LensConfig {
    fn default() -> Self {
        LensConfig {
            coefficients: DEFAULT_COEFFICIENTS,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistortionConfig {
    pub lens: LensConfig,
    pub viewport: Viewport,
    pub mesh: MeshConfig,
}

impl DistortionConfig {
    pub fn from_yaml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: DistortionConfig = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_yaml(path: &str) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config = DistortionConfig::from_yaml_str(&contents)?;
        info!("Loaded distortion configuration from {path}");
        Ok(config)
    }

    pub fn save_to_yaml(&self, path: &str) -> Result<(), ConfigError> {
        let yaml_string = serde_yaml::to_string(self)?;
        let mut file = fs::File::create(path)?;
        file.write_all(yaml_string.as_bytes())?;
        Ok(())
    }

    /// Checks the lens coefficients, the viewport and the mesh layout.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.model()?;
        if !self.viewport.is_valid() {
            return Err(ConfigError::Mesh(MeshError::InvalidViewport {
                width: self.viewport.width,
                height: self.viewport.height,
            }));
        }
        self.mesh.validate()?;
        Ok(())
    }

    pub fn model(&self) -> Result<RadialDistortion, ConfigError> {
        Ok(RadialDistortion::new(self.lens.coefficients)?)
    }

    pub fn builder(&self) -> Result<DistortionMeshBuilder, ConfigError> {
        Ok(DistortionMeshBuilder::new(self.model()?, self.mesh.clone()))
    }

    pub fn build_mesh(&self) -> Result<DistortionMesh, ConfigError> {
        Ok(self.builder()?.build(&self.viewport)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{Eye, RadiusSpace};

    #[test]
    fn test_defaults_from_empty_sections() {
        let config = DistortionConfig::from_yaml_str("lens: {}\n").unwrap();
        assert_eq!(config, DistortionConfig::default());
        assert_eq!(config.lens.coefficients, [250.0, 50000.0]);
        assert_eq!(config.mesh.rows, 40);
    }

    #[test]
    fn test_partial_mesh_section() {
        let yaml = "mesh:\n  rows: 20\n  eye: left\n  radius_space: normalized\n";
        let config = DistortionConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.mesh.rows, 20);
        assert_eq!(config.mesh.cols, 40);
        assert_eq!(config.mesh.eye, Eye::Left);
        assert_eq!(config.mesh.radius_space, RadiusSpace::Normalized);
    }

    #[test]
    fn test_rejects_degenerate_grid() {
        let result = DistortionConfig::from_yaml_str("mesh:\n  rows: 1\n");
        assert!(matches!(
            result,
            Err(ConfigError::Mesh(MeshError::InvalidGrid { .. }))
        ));
    }

    #[test]
    fn test_rejects_malformed_yaml() {
        let result = DistortionConfig::from_yaml_str("lens:\n  coefficients: [1.0]\n");
        assert!(matches!(result, Err(ConfigError::YamlError(_))));
    }

    #[test]
    fn test_load_sample_configs() {
        let mono = DistortionConfig::load_from_yaml("samples/cardboard_mono.yaml").unwrap();
        assert_eq!(mono.viewport, Viewport::new(1280.0, 960.0));
        assert_eq!(mono.mesh.eye, Eye::Mono);
        let mesh = mono.build_mesh().unwrap();
        assert_eq!(mesh.vertex_count(), 1600);

        let stereo = DistortionConfig::load_from_yaml("samples/cardboard_stereo.yaml").unwrap();
        assert_eq!(stereo.lens.coefficients, [15.0, 100.0]);
        assert_eq!(stereo.mesh.radius_space, RadiusSpace::Normalized);
        assert_eq!(stereo.mesh.vignette_width, Some(0.1));
    }

    #[test]
    fn test_save_to_yaml() {
        fs::create_dir_all("output").expect("Failed to create output directory for test.");
        let output_path = "output/distortion_config_saved.yaml";

        let mut config = DistortionConfig::default();
        config.lens.coefficients = [0.34, 0.55];
        config.mesh.eye = Eye::Right;
        config.mesh.vignette_width = Some(0.05);
        config.save_to_yaml(output_path).unwrap();

        let saved = DistortionConfig::load_from_yaml(output_path).unwrap();
        assert_eq!(config, saved);

        fs::remove_file(output_path).unwrap();
    }
}
