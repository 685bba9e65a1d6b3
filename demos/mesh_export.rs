//! Distortion Mesh Export Example
//!
//! This example builds a distortion mesh from a YAML configuration and writes
//! it out as CSV and JSON, together with a wireframe image. When a source image
//! is given, it is also rendered through the mesh to preview the pre-warp.
//!
//! Usage:
//! ```bash
//! cargo run --example mesh_export -- \
//!   --config samples/cardboard_stereo.yaml \
//!   --stereo \
//!   --preview-source flower.png
//! ```

use clap::Parser;
use distortion_mesh::mesh::Eye;
use distortion_mesh::{util, DistortionConfig, DistortionMesh, Viewport};
use flexi_logger::{colored_detailed_format, detailed_format, Duplicate, FileSpec, Logger};
use image::Rgb;
use log::{info, warn};
use std::path::PathBuf;

/// Distortion mesh export tool
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to a YAML configuration; defaults are used when omitted
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Override the viewport width in pixels
    #[arg(long)]
    width: Option<f64>,

    /// Override the viewport height in pixels
    #[arg(long)]
    height: Option<f64>,

    /// Override the number of grid rows
    #[arg(long)]
    rows: Option<usize>,

    /// Override the number of grid columns
    #[arg(long)]
    cols: Option<usize>,

    /// Override the eye (mono, left, right)
    #[arg(long)]
    eye: Option<Eye>,

    /// Build both eyes of a side-by-side pair instead of a single mesh
    #[arg(long)]
    stereo: bool,

    /// Prefix of the files written under the output directory
    #[arg(short = 'o', long, default_value = "distortion_mesh")]
    output: String,

    /// Image to render through the mesh
    #[arg(short = 's', long)]
    preview_source: Option<PathBuf>,
}

fn load_config(cli: &Cli) -> Result<DistortionConfig, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => DistortionConfig::load_from_yaml(&path.to_string_lossy())?,
        None => {
            info!("No configuration given, using defaults");
            DistortionConfig::default()
        }
    };

    if let Some(width) = cli.width {
        config.viewport.width = width;
    }
    if let Some(height) = cli.height {
        config.viewport.height = height;
    }
    if let Some(rows) = cli.rows {
        config.mesh.rows = rows;
    }
    if let Some(cols) = cli.cols {
        config.mesh.cols = cols;
    }
    if let Some(eye) = cli.eye {
        config.mesh.eye = eye;
    }

    config.validate()?;
    Ok(config)
}

fn export_mesh(
    mesh: &DistortionMesh,
    name: &str,
    viewport: &Viewport,
    source: Option<&image::RgbImage>,
) -> Result<(), Box<dyn std::error::Error>> {
    util::export_mesh_csv(mesh, &format!("output/{name}.csv"))?;
    util::export_mesh_json(mesh, &format!("output/{name}.json"))?;

    let width = viewport.width.round() as u32;
    let height = viewport.height.round() as u32;

    let wireframe = util::render_wireframe(mesh, width, height, Rgb([0, 255, 255]))?;
    util::save_image(&wireframe, &format!("output/{name}_wireframe.png"))?;

    if let Some(source) = source {
        let preview = util::render_mesh_preview(mesh, source, width, height)?;
        util::save_image(&preview, &format!("output/{name}_preview.png"))?;
    }

    if !mesh.is_converged() {
        warn!(
            "{} of {} vertices used a non-converged inverse distortion",
            mesh.unconverged_vertices,
            mesh.vertex_count()
        );
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    Logger::try_with_str("info")?
        .log_to_file(
            FileSpec::default()
                .directory("logs")
                .suppress_timestamp()
                .suffix("log"),
        )
        .duplicate_to_stdout(Duplicate::All)
        .format_for_files(detailed_format)
        .format_for_stdout(colored_detailed_format)
        .set_palette("196;208;76;39;178".to_string())
        .start()?;

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    info!("Lens coefficients: {:?}", config.lens.coefficients);
    info!("Viewport: {:?}", config.viewport);
    info!("Mesh: {:?}", config.mesh);

    util::ensure_output_dir()?;

    let source = match &cli.preview_source {
        Some(path) => Some(util::load_image(&path.to_string_lossy())?),
        None => None,
    };

    let builder = config.builder()?;
    if cli.stereo {
        let (left, right) = builder.build_stereo(&config.viewport)?;
        export_mesh(&left, &format!("{}_left", cli.output), &config.viewport, source.as_ref())?;
        export_mesh(&right, &format!("{}_right", cli.output), &config.viewport, source.as_ref())?;
    } else {
        let mesh = builder.build(&config.viewport)?;
        export_mesh(&mesh, &cli.output, &config.viewport, source.as_ref())?;
    }

    info!("Done. Results are in the output directory.");
    Ok(())
}
