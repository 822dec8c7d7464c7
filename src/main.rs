use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use feature_align::config::{load_config_or_default, AlignConfig, ConfigFormat};
use feature_align::logging::{init_logging, LoggingConfig};
use feature_align::{Aligner, FeatureExtractor, SiftExtractor};
use image::GrayImage;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "align")]
#[command(about = "Feature-based partial-affine image alignment")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Directory for rolling JSON log files
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Emit console logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Estimate the transform mapping IMAGE onto BASE
    Align {
        /// Reference image
        #[arg(short, long)]
        base: PathBuf,

        /// Image to transform onto the reference
        #[arg(short, long)]
        image: PathBuf,

        /// Configuration file (TOML or JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Lowe ratio threshold
        #[arg(long)]
        ratio_threshold: Option<f32>,

        /// Minimum matches surviving the ratio test
        #[arg(long)]
        min_matches: Option<usize>,

        /// Keypoints kept per image (0 = all)
        #[arg(long)]
        max_features: Option<usize>,

        /// RANSAC inlier tolerance in pixels
        #[arg(long)]
        inlier_tolerance: Option<f64>,

        /// Write the JSON report here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Count SIFT keypoints of one image
    Features {
        #[arg(short, long)]
        image: PathBuf,

        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Write the default configuration
    Config {
        #[arg(short, long)]
        output: PathBuf,

        #[arg(short, long, value_enum, default_value = "toml")]
        format: Format,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Toml,
    Json,
}

impl From<Format> for ConfigFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Toml => ConfigFormat::Toml,
            Format::Json => ConfigFormat::Json,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let logging = LoggingConfig {
        log_directory: cli.log_dir.clone(),
        json_console: cli.json_logs,
        ..LoggingConfig::from_verbosity(cli.verbose)
    };
    let _log_guard = init_logging(&logging)?;

    match cli.command {
        Commands::Align {
            base,
            image,
            config,
            ratio_threshold,
            min_matches,
            max_features,
            inlier_tolerance,
            output,
        } => {
            let mut config = load_config_or_default(config.as_deref());
            if let Some(v) = ratio_threshold {
                config.ratio_threshold = v;
            }
            if let Some(v) = min_matches {
                config.min_matches = v;
            }
            if let Some(v) = max_features {
                config.max_features = v;
            }
            if let Some(v) = inlier_tolerance {
                config.inlier_tolerance = v;
            }
            handle_align(&base, &image, config, output.as_deref())?;
        }
        Commands::Features { image, config } => {
            handle_features(&image, load_config_or_default(config.as_deref()))?;
        }
        Commands::Config { output, format } => {
            AlignConfig::default().save_to_file(&output, format.into())?;
            println!("Default configuration written to {}", output.display());
        }
    }

    Ok(())
}

fn handle_align(
    base_path: &Path,
    image_path: &Path,
    config: AlignConfig,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    let base = load_image(base_path)?;
    let image = load_image(image_path)?;

    let aligner = Aligner::new(config)?;
    let report = aligner
        .align_with_report(&base, &image)
        .with_context(|| format!("failed to align {} onto {}", image_path.display(), base_path.display()))?;

    let json = serde_json::to_string_pretty(&report)?;
    match output {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("failed to write report to {}", path.display()))?;
            println!("Report written to {}", path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}

fn handle_features(image_path: &Path, config: AlignConfig) -> anyhow::Result<()> {
    let image = load_image(image_path)?;
    let extractor = SiftExtractor::from_config(&config);
    let features = extractor.extract(&image)?;
    println!(
        "{}: {} keypoints ({}x{})",
        extractor.name(),
        features.len(),
        image.width(),
        image.height()
    );
    Ok(())
}

fn load_image(path: &Path) -> anyhow::Result<GrayImage> {
    let img = image::open(path).with_context(|| format!("failed to open image {}", path.display()))?;
    Ok(img.to_luma8())
}
