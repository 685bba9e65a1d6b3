//! Per-eye texture mapping and edge vignetting for stereo distortion meshes.
//!
//! A stereo viewer renders both eyes side by side into one texture: the left
//! eye samples the left half, the right eye the right half. Each eye gets its
//! own distortion mesh whose UVs are remapped accordingly.

use crate::geometry::Viewport;
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Eye {
    /// The mesh samples the whole texture.
    #[default]
    Mono,
    Left,
    Right,
}

impl Eye {
    /// Remaps a per-eye texture coordinate into the shared render texture.
    pub fn remap_uv(&self, uv: &Vector2<f64>) -> Vector2<f64> {
        match self {
            Eye::Mono => *uv,
            Eye::Left => Vector2::new(uv.x * 0.5, uv.y),
            Eye::Right => Vector2::new(uv.x * 0.5 + 0.5, uv.y),
        }
    }
}

impl std::str::FromStr for Eye {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mono" => Ok(Eye::Mono),
            "left" => Ok(Eye::Left),
            "right" => Ok(Eye::Right),
            other => Err(format!("unknown eye: {other}")),
        }
    }
}

/// Attenuation at texture coordinate `uv` for a vignette band of relative width
/// `width` (fraction of the viewport on each side).
///
/// Returns 1 inside the band-free interior, falling linearly to 0 at the
/// viewport corners.
pub fn vignette(uv: &Vector2<f64>, viewport: &Viewport, width: f64) -> f64 {
    let band = Vector2::new(width * viewport.width, width * viewport.height);
    let max_distance = band.norm();
    if max_distance <= 0.0 {
        return 1.0;
    }

    let pixel = viewport.texture_to_pixel(uv);
    let valid = Vector2::new(
        pixel.x.clamp(band.x, (viewport.width - band.x).max(band.x)),
        pixel.y.clamp(band.y, (viewport.height - band.y).max(band.y)),
    );
    let distance = (pixel - valid).norm();

    1.0 - (distance / max_distance).clamp(0.0, 1.0)
}
