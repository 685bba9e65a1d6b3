use crate::mesh::DistortionMesh;
use image::{Rgb, RgbImage};
use log::info;
use nalgebra::{Vector2, Vector3};
use serde::Serialize;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;

/// Ensure the output directory exists
pub fn ensure_output_dir() -> Result<(), UtilError> {
    let output_dir = Path::new("output");
    if !output_dir.exists() {
        fs::create_dir_all(output_dir).map_err(|e| {
            UtilError::InvalidParams(format!("Failed to create output directory: {e}"))
        })?;
    }
    Ok(())
}

#[derive(thiserror::Error, Debug)]
pub enum UtilError {
    #[error("Mesh has no vertices")]
    EmptyMesh,
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),
    #[error("IO Error: {0}")]
    IOError(String),
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<std::io::Error> for UtilError {
    fn from(err: std::io::Error) -> Self {
        UtilError::IOError(err.to_string())
    }
}

impl From<csv::Error> for UtilError {
    fn from(err: csv::Error) -> Self {
        UtilError::SerializationError(err.to_string())
    }
}

impl From<serde_json::Error> for UtilError {
    fn from(err: serde_json::Error) -> Self {
        UtilError::SerializationError(err.to_string())
    }
}

/// Load an image from file
///
/// # Arguments
///
/// * `image_path` - Path to the image file
///
/// # Returns
///
/// * `Result<RgbImage, UtilError>` - Loaded RGB image
pub fn load_image(image_path: &str) -> Result<RgbImage, UtilError> {
    let img = image::open(image_path)
        .map_err(|e| UtilError::InvalidParams(format!("Failed to load image: {e}")))?;

    Ok(img.to_rgb8())
}

/// Save an image, creating parent directories as needed.
pub fn save_image(image: &RgbImage, path: &str) -> Result<(), UtilError> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    image
        .save(path)
        .map_err(|e| UtilError::InvalidParams(format!("Failed to save image: {e}")))?;
    info!("Saved image: {path}");
    Ok(())
}

/// Calculate Peak Signal-to-Noise Ratio (PSNR) between two images
///
/// Pixels that are black in both images are treated as uncovered and skipped.
///
/// # Arguments
///
/// * `img1` - First image
/// * `img2` - Second image
///
/// # Returns
///
/// * `Result<f64, UtilError>` - PSNR value in dB
pub fn calculate_psnr(img1: &RgbImage, img2: &RgbImage) -> Result<f64, UtilError> {
    if img1.dimensions() != img2.dimensions() {
        return Err(UtilError::InvalidParams(
            "Images must have the same dimensions".to_string(),
        ));
    }

    let mut mse = 0.0;
    let mut valid_samples = 0usize;

    for (pixel1, pixel2) in img1.pixels().zip(img2.pixels()) {
        if pixel1.0 == [0, 0, 0] && pixel2.0 == [0, 0, 0] {
            continue;
        }
        for c in 0..3 {
            let diff = pixel1[c] as f64 - pixel2[c] as f64;
            mse += diff * diff;
        }
        valid_samples += 3;
    }

    if valid_samples == 0 {
        return Ok(f64::INFINITY);
    }

    mse /= valid_samples as f64;

    if mse <= 1e-10 {
        Ok(f64::INFINITY)
    } else {
        Ok(10.0 * (255.0 * 255.0 / mse).log10())
    }
}

#[derive(Serialize)]
struct VertexRecord {
    row: usize,
    col: usize,
    x: f32,
    y: f32,
    z: f32,
    u: f32,
    v: f32,
    vignette: f32,
}

/// Export the mesh vertices to a CSV file, one row per vertex.
pub fn export_mesh_csv(mesh: &DistortionMesh, path: &str) -> Result<(), UtilError> {
    let mut writer = csv::Writer::from_path(path)?;
    for (i, vertex) in mesh.vertices.iter().enumerate() {
        writer.serialize(VertexRecord {
            row: i / mesh.cols,
            col: i % mesh.cols,
            x: vertex.position[0],
            y: vertex.position[1],
            z: vertex.position[2],
            u: vertex.uv[0],
            v: vertex.uv[1],
            vignette: vertex.vignette,
        })?;
    }
    writer.flush()?;
    info!("Exported {} vertices to {path}", mesh.vertex_count());
    Ok(())
}

/// Export the whole mesh (grid size, vertices and indices) as JSON.
pub fn export_mesh_json(mesh: &DistortionMesh, path: &str) -> Result<(), UtilError> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(BufWriter::new(file), mesh)?;
    info!("Exported {:?} to {path}", mesh);
    Ok(())
}

/// Maps a clip-space position to image pixel coordinates (y up in clip space,
/// y down in the image).
fn clip_to_image(position: &[f32; 3], width: u32, height: u32) -> Vector2<f64> {
    Vector2::new(
        (position[0] as f64 + 1.0) * 0.5 * width as f64,
        (1.0 - position[1] as f64) * 0.5 * height as f64,
    )
}

/// Distinct, non-degenerate triangles of the mesh's triangle strip.
fn strip_triangles(mesh: &DistortionMesh) -> impl Iterator<Item = [usize; 3]> + '_ {
    mesh.indices.windows(3).filter_map(|w| {
        let tri = [w[0] as usize, w[1] as usize, w[2] as usize];
        if tri[0] == tri[1] || tri[1] == tri[2] || tri[0] == tri[2] {
            None
        } else {
            Some(tri)
        }
    })
}

fn edge(a: &Vector2<f64>, b: &Vector2<f64>, p: &Vector2<f64>) -> f64 {
    (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x)
}

/// Renders `source` through the mesh on the CPU, the way the passthrough
/// texture shader does on the GPU.
///
/// Each strip triangle is rasterized into a `width × height` image; the
/// texture coordinate and vignette are interpolated barycentrically and the
/// source is sampled with nearest-neighbour lookup (`v = 0` is the bottom row).
/// Pixels not covered by the mesh stay black.
pub fn render_mesh_preview(
    mesh: &DistortionMesh,
    source: &RgbImage,
    width: u32,
    height: u32,
) -> Result<RgbImage, UtilError> {
    if mesh.vertices.is_empty() {
        return Err(UtilError::EmptyMesh);
    }
    if width == 0 || height == 0 || source.width() == 0 || source.height() == 0 {
        return Err(UtilError::InvalidParams(
            "Preview and source images must not be empty".to_string(),
        ));
    }

    let mut img = RgbImage::new(width, height);
    let (src_w, src_h) = source.dimensions();

    for tri in strip_triangles(mesh) {
        let verts = tri.map(|i| &mesh.vertices[i]);
        let p = verts.map(|v| clip_to_image(&v.position, width, height));

        let area = edge(&p[0], &p[1], &p[2]);
        if area.abs() < 1e-12 {
            continue;
        }

        let min_x = p.iter().map(|q| q.x).fold(f64::INFINITY, f64::min).floor().max(0.0) as u32;
        let max_x = p.iter().map(|q| q.x).fold(f64::NEG_INFINITY, f64::max).ceil().min(width as f64) as u32;
        let min_y = p.iter().map(|q| q.y).fold(f64::INFINITY, f64::min).floor().max(0.0) as u32;
        let max_y = p.iter().map(|q| q.y).fold(f64::NEG_INFINITY, f64::max).ceil().min(height as f64) as u32;

        for y in min_y..max_y {
            for x in min_x..max_x {
                let center = Vector2::new(x as f64 + 0.5, y as f64 + 0.5);
                let weights = Vector3::new(
                    edge(&p[1], &p[2], &center) / area,
                    edge(&p[2], &p[0], &center) / area,
                    edge(&p[0], &p[1], &center) / area,
                );
                if weights.iter().any(|&w| w < -1e-9) {
                    continue;
                }

                let mut u = 0.0;
                let mut v = 0.0;
                let mut attenuation = 0.0;
                for (vertex, w) in verts.iter().zip(weights.iter()) {
                    u += vertex.uv[0] as f64 * w;
                    v += vertex.uv[1] as f64 * w;
                    attenuation += vertex.vignette as f64 * w;
                }

                let sx = ((u * src_w as f64).floor().max(0.0) as u32).min(src_w - 1);
                let sy = (((1.0 - v) * src_h as f64).floor().max(0.0) as u32).min(src_h - 1);
                let texel = source.get_pixel(sx, sy);
                let attenuation = attenuation.clamp(0.0, 1.0);
                img.put_pixel(
                    x,
                    y,
                    Rgb(texel.0.map(|c| (c as f64 * attenuation).round() as u8)),
                );
            }
        }
    }

    Ok(img)
}

fn draw_line(img: &mut RgbImage, from: &Vector2<f64>, to: &Vector2<f64>, color: Rgb<u8>) {
    let (mut x0, mut y0) = (from.x.round() as i64, from.y.round() as i64);
    let (x1, y1) = (to.x.round() as i64, to.y.round() as i64);
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        if x0 >= 0 && y0 >= 0 && (x0 as u32) < img.width() && (y0 as u32) < img.height() {
            img.put_pixel(x0 as u32, y0 as u32, color);
        }
        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}

/// Draws the edges of every strip triangle on a black background.
pub fn render_wireframe(
    mesh: &DistortionMesh,
    width: u32,
    height: u32,
    color: Rgb<u8>,
) -> Result<RgbImage, UtilError> {
    if mesh.vertices.is_empty() {
        return Err(UtilError::EmptyMesh);
    }

    let mut img = RgbImage::new(width, height);
    for tri in strip_triangles(mesh) {
        let p = tri.map(|i| clip_to_image(&mesh.vertices[i].position, width, height));
        draw_line(&mut img, &p[0], &p[1], color);
        draw_line(&mut img, &p[1], &p[2], color);
        draw_line(&mut img, &p[2], &p[0], color);
    }
    Ok(img)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Viewport;
    use crate::lens::RadialDistortion;
    use crate::mesh::{build_distortion_mesh, DistortionMeshBuilder, MeshConfig};

    fn gradient_image(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            Rgb([
                (x * 255 / width) as u8 + 1,
                (y * 255 / height) as u8 + 1,
                128,
            ])
        })
    }

    fn identity_mesh(width: f64, height: f64) -> DistortionMesh {
        let model = RadialDistortion::new([0.0, 0.0]).unwrap();
        let config = MeshConfig {
            rows: 9,
            cols: 9,
            ..MeshConfig::default()
        };
        DistortionMeshBuilder::new(model, config)
            .build(&Viewport::new(width, height))
            .unwrap()
    }

    #[test]
    fn test_identity_preview_reproduces_source() {
        let source = gradient_image(64, 48);
        let mesh = identity_mesh(64.0, 48.0);
        let preview = render_mesh_preview(&mesh, &source, 64, 48).unwrap();

        let psnr = calculate_psnr(&source, &preview).unwrap();
        assert!(psnr > 40.0, "PSNR too low: {psnr}");
        assert!(preview.pixels().all(|p| p.0 != [0, 0, 0]));
    }

    #[test]
    fn test_barrel_preview_leaves_border_uncovered() {
        let source = gradient_image(64, 48);
        let mesh = build_distortion_mesh(64.0, 48.0, [0.001, 0.0]).unwrap();
        let preview = render_mesh_preview(&mesh, &source, 64, 48).unwrap();

        assert_eq!(preview.get_pixel(0, 0).0, [0, 0, 0]);
        assert_ne!(preview.get_pixel(32, 24).0, [0, 0, 0]);
    }

    #[test]
    fn test_psnr_identical_images() {
        let img = gradient_image(16, 16);
        assert_eq!(calculate_psnr(&img, &img).unwrap(), f64::INFINITY);
        let other = gradient_image(8, 16);
        assert!(calculate_psnr(&img, &other).is_err());
    }

    #[test]
    fn test_wireframe_draws_grid_nodes() {
        let mesh = identity_mesh(32.0, 32.0);
        let white = Rgb([255, 255, 255]);
        let img = render_wireframe(&mesh, 32, 32, white).unwrap();
        // Grid nodes sit every 4 pixels on a 9x9 identity mesh.
        assert_eq!(*img.get_pixel(0, 0), white);
        assert_eq!(*img.get_pixel(16, 16), white);
        assert_eq!(*img.get_pixel(1, 2), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_export_mesh_files() {
        ensure_output_dir().unwrap();
        let mesh = build_distortion_mesh(320.0, 240.0, [15.0, 100.0]).unwrap();

        let csv_path = "output/util_test_mesh.csv";
        export_mesh_csv(&mesh, csv_path).unwrap();
        let contents = fs::read_to_string(csv_path).unwrap();
        let mut lines = contents.lines();
        assert_eq!(lines.next(), Some("row,col,x,y,z,u,v,vignette"));
        assert_eq!(lines.count(), mesh.vertex_count());
        fs::remove_file(csv_path).unwrap();

        let json_path = "output/util_test_mesh.json";
        export_mesh_json(&mesh, json_path).unwrap();
        let loaded: DistortionMesh =
            serde_json::from_str(&fs::read_to_string(json_path).unwrap()).unwrap();
        assert_eq!(loaded.indices, mesh.indices);
        assert_eq!(loaded.vertices.len(), mesh.vertices.len());
        fs::remove_file(json_path).unwrap();
    }
}
