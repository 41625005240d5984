use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::info;
use wfc_core::{Heuristic, OverlappingModel, OverlappingOptions};

/// Collapse an input image into a larger output that locally resembles it.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the sample image.
    input: PathBuf,

    /// Path to write the generated image to. Defaults to `output.png`.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Side length of the NxN patterns extracted from the sample.
    #[arg(long, default_value_t = 3)]
    pattern_size: usize,

    /// Symmetry variants per pattern: 1 (none), 2 (+ reflection) or 8 (full).
    #[arg(long, default_value_t = 8)]
    symmetry: u8,

    /// Output width in cells.
    #[arg(long, default_value_t = 48)]
    width: usize,

    /// Output height in cells.
    #[arg(long, default_value_t = 48)]
    height: usize,

    /// Wrap the output grid at its edges.
    #[arg(long)]
    periodic: bool,

    /// Treat the sample image as wrapping at its edges.
    #[arg(long)]
    periodic_input: bool,

    /// Constrain the sample's last extracted pattern to the output's bottom row.
    #[arg(long)]
    ground: bool,

    /// Cell-selection policy.
    #[arg(long, value_enum, default_value_t = HeuristicArg::Entropy)]
    heuristic: HeuristicArg,

    /// PRNG seed. Same seed + same inputs always produce the same output.
    #[arg(long, default_value_t = 0)]
    seed: u32,

    /// Upper bound on collapse/propagate steps before giving up.
    #[arg(long, default_value_t = 1_000_000)]
    max_steps: usize,
}

#[derive(Clone, Copy, ValueEnum)]
enum HeuristicArg {
    Entropy,
    Mrv,
    Scanline,
}

impl From<HeuristicArg> for Heuristic {
    fn from(value: HeuristicArg) -> Self {
        match value {
            HeuristicArg::Entropy => Heuristic::Entropy,
            HeuristicArg::Mrv => Heuristic::Mrv,
            HeuristicArg::Scanline => Heuristic::Scanline,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let sample = image::open(&cli.input)
        .with_context(|| format!("failed to open sample image {}", cli.input.display()))?
        .to_rgba8();
    let (sample_width, sample_height) = (sample.width() as usize, sample.height() as usize);
    let pixels: Vec<u32> = sample
        .pixels()
        .map(|p| {
            let [r, g, b, a] = p.0;
            r as u32 | (g as u32) << 8 | (b as u32) << 16 | (a as u32) << 24
        })
        .collect();

    let options = OverlappingOptions {
        pattern_size: cli.pattern_size,
        symmetry: cli.symmetry,
        periodic_input: cli.periodic_input,
        periodic: cli.periodic,
        ground: cli.ground,
        heuristic: cli.heuristic.into(),
        seed: cli.seed,
        width: cli.width,
        height: cli.height,
    };

    let mut model = OverlappingModel::new(&pixels, sample_width, sample_height, options)
        .context("failed to build the WFC model from the sample")?;
    info!(width = cli.width, height = cli.height, "running wave function collapse");

    if !model.run(cli.max_steps) {
        anyhow::bail!("collapse reached a contradiction after {} steps", cli.max_steps);
    }

    let mut buf = vec![0u32; cli.width * cli.height];
    model.render(&mut buf);

    let mut out = image::RgbaImage::new(cli.width as u32, cli.height as u32);
    for (i, pixel) in out.pixels_mut().enumerate() {
        let packed = buf[i];
        *pixel = image::Rgba([
            (packed & 0xFF) as u8,
            ((packed >> 8) & 0xFF) as u8,
            ((packed >> 16) & 0xFF) as u8,
            ((packed >> 24) & 0xFF) as u8,
        ]);
    }

    let output_path = cli.output.unwrap_or_else(|| PathBuf::from("output.png"));
    out.save(&output_path)
        .with_context(|| format!("failed to write output image {}", output_path.display()))?;
    info!(path = %output_path.display(), "wrote output image");

    Ok(())
}
