use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

/// Size of the render target a distortion mesh is built for.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Viewport {
            width: 1280.0,
            height: 960.0,
        }
    }
}

impl Viewport {
    pub fn new(width: f64, height: f64) -> Self {
        Viewport { width, height }
    }

    pub fn is_valid(&self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
    }

    /// The optical center of the viewport, in pixels.
    pub fn center(&self) -> Vector2<f64> {
        Vector2::new(self.width / 2.0, self.height / 2.0)
    }

    /// Maps texture coordinates in `[0, 1]²` to pixel coordinates.
    pub fn texture_to_pixel(&self, uv: &Vector2<f64>) -> Vector2<f64> {
        Vector2::new(uv.x * self.width, uv.y * self.height)
    }

    /// Offset of a texture coordinate from the viewport center, in pixels.
    pub fn eye_offset(&self, uv: &Vector2<f64>) -> Vector2<f64> {
        self.texture_to_pixel(uv) - self.center()
    }

    /// Maps a pixel position to normalized device coordinates in `[-1, 1]²`.
    pub fn pixel_to_clip(&self, pixel: &Vector2<f64>) -> Vector2<f64> {
        Vector2::new(
            2.0 * pixel.x / self.width - 1.0,
            2.0 * pixel.y / self.height - 1.0,
        )
    }

    /// Maps normalized device coordinates back to a pixel position.
    pub fn clip_to_pixel(&self, clip: &Vector2<f64>) -> Vector2<f64> {
        Vector2::new(
            (clip.x + 1.0) * 0.5 * self.width,
            (clip.y + 1.0) * 0.5 * self.height,
        )
    }
}

/// Texture coordinate of grid node `(row, col)` on a `rows × cols` lattice.
///
/// Callers must ensure `rows >= 2` and `cols >= 2`.
pub fn grid_uv(row: usize, col: usize, rows: usize, cols: usize) -> Vector2<f64> {
    Vector2::new(
        col as f64 / (cols - 1) as f64,
        row as f64 / (rows - 1) as f64,
    )
}
