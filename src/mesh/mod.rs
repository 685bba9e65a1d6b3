//! The `mesh` module builds pre-warped distortion meshes.
//!
//! A distortion mesh is a dense grid whose vertex positions have been pulled
//! towards the lens center by the inverse of a [`RadialDistortion`]. Rendering
//! an undistorted texture through it and then viewing the result through the
//! lens cancels the lens distortion. The module only produces data: a vertex
//! buffer ([`MeshVertex`]) and a triangle-strip index buffer. Uploading them to
//! a GPU is left to the renderer, which can use [`VERTEX_LAYOUT`] to describe
//! the interleaved buffer returned by [`DistortionMesh::interleaved`].

use crate::geometry::{grid_uv, Viewport};
use crate::lens::{Coefficients, DistortionError, RadialDistortion, SecantSolver};
use log::{debug, info, warn};
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod eye;
pub mod strip;

pub use eye::{vignette, Eye};
pub use strip::{strip_len, triangle_strip_indices};

pub const DEFAULT_ROWS: usize = 40;
pub const DEFAULT_COLS: usize = 40;

#[derive(thiserror::Error, Debug)]
pub enum MeshError {
    #[error("Mesh grid needs at least 2 rows and 2 columns, got {rows}x{cols}")]
    InvalidGrid { rows: usize, cols: usize },
    #[error("Viewport must have positive finite size, got {width}x{height}")]
    InvalidViewport { width: f64, height: f64 },
    #[error("Mesh grid of {rows}x{cols} vertices does not fit 32-bit indices")]
    TooManyVertices { rows: usize, cols: usize },
    #[error("Invalid mesh parameters: {0}")]
    InvalidParams(String),
    #[error("Distortion error: {0}")]
    Distortion(DistortionError),
}

impl From<DistortionError> for MeshError {
    fn from(err: DistortionError) -> Self {
        MeshError::Distortion(err)
    }
}

/// Units in which the radius fed to the distortion model is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RadiusSpace {
    /// Distance from the viewport center in pixels.
    #[default]
    Pixels,
    /// Distance in normalized device units, where the viewport edges sit at ±1.
    Normalized,
}

/// Grid resolution and the per-variant knobs of a distortion mesh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshConfig {
    pub rows: usize,
    pub cols: usize,
    /// Multiplier applied to clip-space positions after normalization.
    pub display_scale: f64,
    pub radius_space: RadiusSpace,
    pub eye: Eye,
    /// Relative width of the vignette band; `None` disables vignetting.
    pub vignette_width: Option<f64>,
    pub solver: SecantSolver,
}

impl Default for MeshConfig {
    fn default() -> Self {
        MeshConfig {
            rows: DEFAULT_ROWS,
            cols: DEFAULT_COLS,
            display_scale: 1.0,
            radius_space: RadiusSpace::Pixels,
            eye: Eye::Mono,
            vignette_width: None,
            solver: SecantSolver::default(),
        }
    }
}

impl MeshConfig {
    pub fn validate(&self) -> Result<(), MeshError> {
        if self.rows < 2 || self.cols < 2 {
            return Err(MeshError::InvalidGrid {
                rows: self.rows,
                cols: self.cols,
            });
        }
        match self.rows.checked_mul(self.cols) {
            Some(count) if count <= u32::MAX as usize => {}
            _ => {
                return Err(MeshError::TooManyVertices {
                    rows: self.rows,
                    cols: self.cols,
                })
            }
        }
        if !self.display_scale.is_finite() || self.display_scale <= 0.0 {
            return Err(MeshError::InvalidParams(format!(
                "display scale must be positive and finite, got {}",
                self.display_scale
            )));
        }
        if let Some(width) = self.vignette_width {
            if !width.is_finite() || !(0.0..=0.5).contains(&width) {
                return Err(MeshError::InvalidParams(format!(
                    "vignette width must lie in [0, 0.5], got {width}"
                )));
            }
        }
        self.solver.validate()?;
        Ok(())
    }
}

/// One vertex of a distortion mesh, laid out for direct GPU upload.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeshVertex {
    /// Clip-space position; `z` is always 1.
    pub position: [f32; 3],
    /// Texture coordinate to sample the undistorted render texture at.
    pub uv: [f32; 2],
    /// Brightness multiplier, 1 when vignetting is disabled.
    pub vignette: f32,
}

/// One attribute of the interleaved vertex buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexAttribute {
    pub name: &'static str,
    pub components: usize,
    /// Offset from the start of the vertex, in `f32` units.
    pub offset: usize,
}

/// Floats per vertex in [`DistortionMesh::interleaved`].
pub const VERTEX_STRIDE: usize = 6;

pub const VERTEX_LAYOUT: [VertexAttribute; 3] = [
    VertexAttribute {
        name: "position",
        components: 3,
        offset: 0,
    },
    VertexAttribute {
        name: "textureCoordinate",
        components: 2,
        offset: 3,
    },
    VertexAttribute {
        name: "vignette",
        components: 1,
        offset: 5,
    },
];

/// Vertex and index buffers of a distortion mesh.
#[derive(Clone, Serialize, Deserialize)]
pub struct DistortionMesh {
    pub rows: usize,
    pub cols: usize,
    /// Row-major `rows × cols` vertices.
    pub vertices: Vec<MeshVertex>,
    /// Triangle-strip indices, `rows × cols × 2` of them.
    pub indices: Vec<u32>,
    /// Vertices whose inverse distortion hit the solver's iteration cap.
    pub unconverged_vertices: usize,
}

impl fmt::Debug for DistortionMesh {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DistortionMesh [grid: {}x{} vertices: {} indices: {} unconverged: {}]",
            self.rows,
            self.cols,
            self.vertices.len(),
            self.indices.len(),
            self.unconverged_vertices
        )
    }
}

impl DistortionMesh {
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn index_count(&self) -> usize {
        self.indices.len()
    }

    /// Number of leading indices that make up the strip proper.
    pub fn strip_len(&self) -> usize {
        strip_len(self.rows, self.cols)
    }

    pub fn vertex(&self, row: usize, col: usize) -> Option<&MeshVertex> {
        if row >= self.rows || col >= self.cols {
            return None;
        }
        self.vertices.get(row * self.cols + col)
    }

    pub fn is_converged(&self) -> bool {
        self.unconverged_vertices == 0
    }

    /// Flattens the vertices into `VERTEX_STRIDE` floats each, in
    /// [`VERTEX_LAYOUT`] order.
    pub fn interleaved(&self) -> Vec<f32> {
        let mut data = Vec::with_capacity(self.vertices.len() * VERTEX_STRIDE);
        for vertex in &self.vertices {
            data.extend_from_slice(&vertex.position);
            data.extend_from_slice(&vertex.uv);
            data.push(vertex.vignette);
        }
        data
    }

    /// Hands the buffers over to an upload step.
    pub fn into_parts(self) -> (Vec<MeshVertex>, Vec<u32>) {
        (self.vertices, self.indices)
    }
}

/// Builds [`DistortionMesh`]es for a lens.
///
/// # Examples
///
/// ```rust
/// use distortion_mesh::geometry::Viewport;
/// use distortion_mesh::lens::RadialDistortion;
/// use distortion_mesh::mesh::{DistortionMeshBuilder, MeshConfig};
///
/// let builder = DistortionMeshBuilder::new(RadialDistortion::default(), MeshConfig::default());
/// let mesh = builder.build(&Viewport::new(1280.0, 960.0)).unwrap();
/// assert_eq!(mesh.vertex_count(), 1600);
/// assert_eq!(mesh.index_count(), 3200);
/// ```
#[derive(Debug, Clone)]
pub struct DistortionMeshBuilder {
    model: RadialDistortion,
    config: MeshConfig,
}

impl DistortionMeshBuilder {
    pub fn new(model: RadialDistortion, config: MeshConfig) -> Self {
        DistortionMeshBuilder { model, config }
    }

    pub fn model(&self) -> &RadialDistortion {
        &self.model
    }

    pub fn config(&self) -> &MeshConfig {
        &self.config
    }

    /// Builds the mesh for `viewport`.
    ///
    /// # Errors
    ///
    /// * [`MeshError::InvalidGrid`] if the grid has fewer than 2 rows or columns.
    /// * [`MeshError::InvalidViewport`] if the viewport size is not positive and finite.
    /// * [`MeshError::InvalidParams`] for a bad display scale or vignette width.
    /// * [`MeshError::Distortion`] for invalid lens or solver parameters.
    ///
    /// Solver non-convergence is not an error: the affected vertices use the
    /// best estimate and are counted in [`DistortionMesh::unconverged_vertices`].
    pub fn build(&self, viewport: &Viewport) -> Result<DistortionMesh, MeshError> {
        self.config.validate()?;
        self.model.validate_params()?;
        if !viewport.is_valid() {
            return Err(MeshError::InvalidViewport {
                width: viewport.width,
                height: viewport.height,
            });
        }

        let MeshConfig {
            rows,
            cols,
            display_scale,
            radius_space,
            eye,
            vignette_width,
            solver,
        } = self.config.clone();

        debug!(
            "Building {}x{} distortion mesh for {:?} with {:?}",
            rows, cols, viewport, self.model
        );

        let center = viewport.center();
        let mut vertices = Vec::with_capacity(rows * cols);
        let mut unconverged_vertices = 0;

        for row in 0..rows {
            for col in 0..cols {
                let uv = grid_uv(row, col, rows, cols);
                let offset = viewport.eye_offset(&uv);

                let radius = match radius_space {
                    RadiusSpace::Pixels => offset.norm(),
                    RadiusSpace::Normalized => Vector2::new(
                        2.0 * offset.x / viewport.width,
                        2.0 * offset.y / viewport.height,
                    )
                    .norm(),
                };

                let shrink = if radius > 0.0 {
                    let solution = self.model.distort_inverse_with(radius, &solver)?;
                    if !solution.is_converged() {
                        unconverged_vertices += 1;
                        warn!(
                            "Vertex ({row}, {col}): inverse distortion of radius {radius} did not converge after {} iterations",
                            solution.iterations()
                        );
                    }
                    solution.value() / radius
                } else {
                    1.0
                };

                let screen = offset * shrink + center;
                let clip = viewport.pixel_to_clip(&screen) * display_scale;
                let texture = eye.remap_uv(&uv);
                let attenuation = vignette_width.map_or(1.0, |width| vignette(&uv, viewport, width));

                vertices.push(MeshVertex {
                    position: [clip.x as f32, clip.y as f32, 1.0],
                    uv: [texture.x as f32, texture.y as f32],
                    vignette: attenuation as f32,
                });
            }
        }

        let indices = triangle_strip_indices(rows, cols);

        let mesh = DistortionMesh {
            rows,
            cols,
            vertices,
            indices,
            unconverged_vertices,
        };
        info!("Built {:?}", mesh);
        Ok(mesh)
    }

    /// Builds the left and right eye meshes of a side-by-side stereo pair.
    ///
    /// `eye_viewport` is the viewport of a single eye. The configured eye is
    /// ignored.
    pub fn build_stereo(
        &self,
        eye_viewport: &Viewport,
    ) -> Result<(DistortionMesh, DistortionMesh), MeshError> {
        let for_eye = |eye: Eye| {
            let config = MeshConfig {
                eye,
                ..self.config.clone()
            };
            DistortionMeshBuilder::new(self.model, config).build(eye_viewport)
        };
        Ok((for_eye(Eye::Left)?, for_eye(Eye::Right)?))
    }
}

/// Builds a mesh with the default grid and solver for a viewport of
/// `viewport_width × viewport_height` pixels.
pub fn build_distortion_mesh(
    viewport_width: f64,
    viewport_height: f64,
    coefficients: Coefficients,
) -> Result<DistortionMesh, MeshError> {
    let model = RadialDistortion::new(coefficients)?;
    DistortionMeshBuilder::new(model, MeshConfig::default())
        .build(&Viewport::new(viewport_width, viewport_height))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lens::radial::DEFAULT_COEFFICIENTS;
    use approx::assert_relative_eq;

    fn builder_with(config: MeshConfig) -> DistortionMeshBuilder {
        DistortionMeshBuilder::new(RadialDistortion::default(), config)
    }

    #[test]
    fn test_default_mesh_sizes() {
        let mesh = build_distortion_mesh(1280.0, 960.0, DEFAULT_COEFFICIENTS).unwrap();
        assert_eq!(mesh.vertex_count(), 1600);
        assert_eq!(mesh.index_count(), 3200);
        assert_eq!(mesh.interleaved().len(), 1600 * VERTEX_STRIDE);
        assert!(mesh.is_converged());
    }

    #[test]
    fn test_indices_within_vertex_range() {
        let mesh = build_distortion_mesh(800.0, 600.0, [15.0, 100.0]).unwrap();
        let vertex_count = mesh.vertex_count() as u32;
        assert!(mesh.indices.iter().all(|&i| i < vertex_count));
    }

    #[test]
    fn test_center_vertex_maps_to_viewport_center() {
        let config = MeshConfig {
            rows: 41,
            cols: 41,
            ..MeshConfig::default()
        };
        let mesh = builder_with(config)
            .build(&Viewport::new(1280.0, 960.0))
            .unwrap();
        let center = mesh.vertex(20, 20).unwrap();
        assert_eq!(center.position, [0.0, 0.0, 1.0]);
        assert_eq!(center.uv, [0.5, 0.5]);
    }

    #[test]
    fn test_vertices_are_pulled_towards_center() {
        let viewport = Viewport::new(1280.0, 960.0);
        let mesh = builder_with(MeshConfig::default()).build(&viewport).unwrap();
        for vertex in &mesh.vertices {
            let grid_clip = Vector2::new(
                2.0 * vertex.uv[0] as f64 - 1.0,
                2.0 * vertex.uv[1] as f64 - 1.0,
            );
            let clip = Vector2::new(vertex.position[0] as f64, vertex.position[1] as f64);
            assert!(clip.norm() <= grid_clip.norm() + 1e-6);
            assert_eq!(vertex.position[2], 1.0);
            assert_eq!(vertex.vignette, 1.0);
        }
    }

    #[test]
    fn test_identity_lens_keeps_grid() {
        let model = RadialDistortion::new([0.0, 0.0]).unwrap();
        let mesh = DistortionMeshBuilder::new(model, MeshConfig::default())
            .build(&Viewport::new(640.0, 480.0))
            .unwrap();
        for vertex in &mesh.vertices {
            assert_relative_eq!(vertex.position[0], 2.0 * vertex.uv[0] - 1.0, epsilon = 1e-5);
            assert_relative_eq!(vertex.position[1], 2.0 * vertex.uv[1] - 1.0, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_display_scale_multiplies_positions() {
        let viewport = Viewport::new(1280.0, 960.0);
        let plain = builder_with(MeshConfig::default()).build(&viewport).unwrap();
        let scaled = builder_with(MeshConfig {
            display_scale: 500.0,
            ..MeshConfig::default()
        })
        .build(&viewport)
        .unwrap();
        let (a, b) = (plain.vertex(0, 0).unwrap(), scaled.vertex(0, 0).unwrap());
        assert_relative_eq!(b.position[0], a.position[0] * 500.0, max_relative = 1e-5);
        assert_relative_eq!(b.position[1], a.position[1] * 500.0, max_relative = 1e-5);
    }

    #[test]
    fn test_normalized_radius_space() {
        let model = RadialDistortion::new([15.0, 100.0]).unwrap();
        let config = MeshConfig {
            radius_space: RadiusSpace::Normalized,
            ..MeshConfig::default()
        };
        let mesh = DistortionMeshBuilder::new(model, config)
            .build(&Viewport::new(400.0, 300.0))
            .unwrap();

        // Corner: normalized offset (-1, -1), radius sqrt(2).
        let corner = mesh.vertex(0, 0).unwrap();
        let r = 2.0f64.sqrt();
        let expected = -model.distort_inverse(r).unwrap().value() / r;
        assert_relative_eq!(corner.position[0] as f64, expected, epsilon = 1e-5);
        assert_relative_eq!(corner.position[1] as f64, expected, epsilon = 1e-5);
    }

    #[test]
    fn test_rejects_degenerate_grid() {
        for (rows, cols) in [(1, 40), (40, 1), (0, 0)] {
            let config = MeshConfig {
                rows,
                cols,
                ..MeshConfig::default()
            };
            let result = builder_with(config).build(&Viewport::default());
            assert!(matches!(result, Err(MeshError::InvalidGrid { .. })));
        }
    }

    #[test]
    fn test_rejects_invalid_viewport() {
        let result = build_distortion_mesh(0.0, 960.0, DEFAULT_COEFFICIENTS);
        assert!(matches!(result, Err(MeshError::InvalidViewport { .. })));
    }

    #[test]
    fn test_rejects_invalid_coefficients() {
        let result = build_distortion_mesh(1280.0, 960.0, [f64::NAN, 0.0]);
        assert!(matches!(result, Err(MeshError::Distortion(_))));
    }

    #[test]
    fn test_counts_unconverged_vertices() {
        let _ = env_logger::builder().is_test(true).try_init();
        let config = MeshConfig {
            solver: SecantSolver {
                max_iterations: 1,
                ..SecantSolver::default()
            },
            ..MeshConfig::default()
        };
        let mesh = builder_with(config)
            .build(&Viewport::new(1280.0, 960.0))
            .unwrap();
        assert!(mesh.unconverged_vertices > 0);
        assert!(!mesh.is_converged());
        assert!(mesh
            .vertices
            .iter()
            .all(|v| v.position.iter().all(|c| c.is_finite())));
    }

    #[test]
    fn test_stereo_pair_remaps_uv() {
        let config = MeshConfig {
            radius_space: RadiusSpace::Normalized,
            vignette_width: Some(0.1),
            ..MeshConfig::default()
        };
        let model = RadialDistortion::new([15.0, 100.0]).unwrap();
        let (left, right) = DistortionMeshBuilder::new(model, config)
            .build_stereo(&Viewport::new(400.0, 300.0))
            .unwrap();

        assert_eq!(left.indices, right.indices);
        let last = left.vertex_count() - 1;
        assert_eq!(left.vertices[last].uv[0], 0.5);
        assert_eq!(right.vertices[0].uv[0], 0.5);
        assert_eq!(right.vertices[last].uv[0], 1.0);
        assert_eq!(left.vertices[0].position, right.vertices[0].position);
        assert_eq!(left.vertices[0].vignette, 0.0);
    }

    #[test]
    fn test_interleaved_layout() {
        let mesh = build_distortion_mesh(640.0, 480.0, DEFAULT_COEFFICIENTS).unwrap();
        let data = mesh.interleaved();
        let vertex = mesh.vertex(3, 7).unwrap();
        let base = (3 * mesh.cols + 7) * VERTEX_STRIDE;
        assert_eq!(&data[base..base + 3], &vertex.position);
        assert_eq!(&data[base + VERTEX_LAYOUT[1].offset..base + 5], &vertex.uv);
        assert_eq!(data[base + VERTEX_LAYOUT[2].offset], vertex.vignette);
    }

    #[test]
    fn test_config_validation() {
        assert!(MeshConfig::default().validate().is_ok());
        let bad_scale = MeshConfig {
            display_scale: 0.0,
            ..MeshConfig::default()
        };
        assert!(bad_scale.validate().is_err());
        let bad_vignette = MeshConfig {
            vignette_width: Some(0.9),
            ..MeshConfig::default()
        };
        assert!(bad_vignette.validate().is_err());
    }
}
