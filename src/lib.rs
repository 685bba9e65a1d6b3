//! Distortion Mesh Library
//!
//! A Rust library for building lens-distortion correction meshes for
//! stereoscopic (Cardboard-style) viewers. It provides:
//! - A two-coefficient radial distortion model (`1 + a·r² + b·r⁴`)
//! - A bounded secant-method inverse of that model
//! - Pre-warped triangle-strip meshes, mono or per eye, with optional vignetting
//! - YAML configuration, CSV/JSON export and a CPU preview rasterizer
//!
//! The crate produces plain vertex and index buffers; uploading them to a GPU
//! is left to the caller.

pub mod config;
pub mod geometry;
pub mod lens;
pub mod mesh;
pub mod util;

// Re-export commonly used types
pub use config::{ConfigError, DistortionConfig};
pub use geometry::Viewport;
pub use lens::{DistortionError, InverseSolution, RadialDistortion, SecantSolver};
pub use mesh::{
    build_distortion_mesh, DistortionMesh, DistortionMeshBuilder, Eye, MeshConfig, MeshError,
    MeshVertex, RadiusSpace,
};
