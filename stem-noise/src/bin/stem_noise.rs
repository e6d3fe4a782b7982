//! Add STEM acquisition noise to a simulated image
//!
//! Reads a grayscale image, applies blur, scanline jitter and shot noise, and
//! writes the result as a 16-bit grayscale image of detected counts.
//!
//! Usage:
//! ```
//! cargo run --release --bin stem_noise -- INPUT OUTPUT [OPTIONS]
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use stem_noise::image_proc::io::{load_grayscale, save_counts_u16};
use stem_noise::{NoiseSynthesizer, StemNoiseParams};

/// Dose used when neither a config file nor a flag sets one
const DEFAULT_COUNTS_PER_PIXEL: f64 = 1000.0;

/// Command-line arguments for noise synthesis
#[derive(Parser, Debug)]
#[command(author, version, about = "Add realistic STEM detector noise to a simulated image")]
struct Args {
    /// Pristine input image (any grayscale or colour format)
    input: PathBuf,

    /// Output image (16-bit PNG or TIFF recommended)
    output: PathBuf,

    /// JSON parameter file; flags below override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Gaussian blur standard deviation in pixels [default: 0]
    #[arg(long)]
    sigma_blur: Option<f64>,

    /// Mean electrons per pixel at unit intensity [default: 1000]
    #[arg(long)]
    counts_per_pixel: Option<f64>,

    /// Standard deviation of per-row horizontal jitter in pixels [default: 0]
    #[arg(long)]
    scanline_horizontal: Option<f64>,

    /// Background added to the mean-normalized image [default: 0]
    #[arg(long)]
    background: Option<f64>,

    /// Standard deviation of additive dark noise [default: 0]
    #[arg(long)]
    dark_noise_sigma: Option<f64>,

    /// Run the blur on all cores
    #[arg(long)]
    parallel_blur: bool,

    /// Random seed for reproducibility (optional)
    #[arg(long)]
    seed: Option<u64>,

    /// Output counts per unit intensity [default: counts-per-pixel]
    #[arg(long)]
    output_scale: Option<f64>,

    /// Write the effective parameters to this JSON file
    #[arg(long)]
    save_config: Option<PathBuf>,
}

impl Args {
    fn params(&self) -> Result<StemNoiseParams> {
        let mut params = match &self.config {
            Some(path) => StemNoiseParams::load_from_file(path)
                .with_context(|| format!("reading config {}", path.display()))?,
            None => StemNoiseParams::new(0.0, DEFAULT_COUNTS_PER_PIXEL, 0.0, 0.0),
        };

        if let Some(v) = self.sigma_blur {
            params.sigma_blur = v;
        }
        if let Some(v) = self.counts_per_pixel {
            params.counts_per_pixel = v;
        }
        if let Some(v) = self.scanline_horizontal {
            params.scanline_horizontal = v;
        }
        if let Some(v) = self.background {
            params.background_value = v;
        }
        if let Some(v) = self.dark_noise_sigma {
            params.dark_noise_sigma = v;
        }
        if self.parallel_blur {
            params.parallel_blur = true;
        }

        Ok(params)
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let params = args.params()?;
    let synthesizer = NoiseSynthesizer::new(params).context("invalid noise parameters")?;

    if let Some(path) = &args.save_config {
        params
            .save_to_file(path)
            .with_context(|| format!("writing config {}", path.display()))?;
    }

    let image = load_grayscale(&args.input)
        .with_context(|| format!("loading {}", args.input.display()))?;
    let (rows, cols) = image.dim();
    info!("Loaded {} ({rows}x{cols})", args.input.display());

    let noisy = match args.seed {
        Some(seed) => synthesizer.synthesize_with_seed(&image.view(), seed)?,
        None => synthesizer.synthesize(&image.view())?,
    };

    let scale = args.output_scale.unwrap_or(params.counts_per_pixel);
    let saturated = save_counts_u16(&noisy.view(), scale, &args.output)
        .with_context(|| format!("writing {}", args.output.display()))?;
    if saturated > 0 {
        warn!("{saturated} pixels saturated at 65535; lower --output-scale to avoid clipping");
    }

    info!(
        "Wrote {} (mean {:.4}, scale {scale})",
        args.output.display(),
        noisy.mean().unwrap_or(0.0)
    );

    Ok(())
}
