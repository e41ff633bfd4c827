//
// cli.rs
// Dicom2Pdf-rs
//
// Defines the CLI surface with Clap and dispatches user-selected commands to the corresponding modules.
//

use std::path::PathBuf;

use anyhow::Context;
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::Level;

use crate::normalize::{self, NormalizeOptions};
use crate::pipeline::{self, ConversionConfig};
use crate::{image, metadata, web};

/// Command-line interface glue code: defines the available verbs and dispatches to modules.
#[derive(Parser)]
#[command(name = "dicom2pdf")]
#[command(about = "Convert DICOM images into a printable multi-page PDF", long_about = None)]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Convert a directory or a zip/rar/iso archive into one PDF
    Convert {
        input: PathBuf,
        #[arg(short, long, default_value = "dicom_scan.pdf")]
        output: PathBuf,
        #[command(flatten)]
        tuning: TuningArgs,
        /// Page resolution in dots per inch
        #[arg(long, default_value_t = 100)]
        dpi: u32,
        /// Worker threads (defaults to every core)
        #[arg(long)]
        workers: Option<usize>,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        footer: Option<String>,
    },
    /// Show caption fields and raw sample statistics of one file
    Info {
        file: PathBuf,
        #[command(flatten)]
        tuning: TuningArgs,
    },
    /// Write the normalized first frame of one file as a PNG
    Preview {
        input: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[command(flatten)]
        tuning: TuningArgs,
    },
    /// Start the upload web server
    Web {
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        #[arg(short, long, default_value_t = 3000)]
        port: u16,
        /// Where generated documents are kept for download
        #[arg(long, default_value = "target/documents")]
        output_dir: PathBuf,
        /// Largest accepted upload, in megabytes
        #[arg(long, default_value_t = 512)]
        max_upload_mb: usize,
        #[command(flatten)]
        tuning: TuningArgs,
        #[arg(long, default_value_t = 100)]
        dpi: u32,
    },
}

/// Normalization knobs shared by every command that renders pixels.
#[derive(Args, Debug, Clone)]
pub struct TuningArgs {
    /// Contrast exponent applied after rescaling (<1 brightens, >1 darkens)
    #[arg(long, default_value_t = normalize::DEFAULT_CONTRAST_EXPONENT)]
    pub contrast: f64,
    #[arg(long, default_value_t = normalize::DEFAULT_LOW_PERCENTILE)]
    pub low_percentile: f64,
    #[arg(long, default_value_t = normalize::DEFAULT_HIGH_PERCENTILE)]
    pub high_percentile: f64,
    #[arg(long, value_enum, default_value_t = normalize::PercentileMethod::Linear)]
    pub percentile_method: normalize::PercentileMethod,
}

impl From<&TuningArgs> for NormalizeOptions {
    fn from(args: &TuningArgs) -> Self {
        NormalizeOptions {
            low_percentile: args.low_percentile,
            high_percentile: args.high_percentile,
            contrast_exponent: args.contrast,
            method: args.percentile_method,
        }
    }
}

pub async fn run() -> anyhow::Result<()> {
    // Parse the raw CLI arguments once and dispatch to a subcommand handler.
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Convert {
            input,
            output,
            tuning,
            dpi,
            workers,
            title,
            footer,
        } => {
            let config = ConversionConfig {
                normalize: NormalizeOptions::from(&tuning),
                dpi,
                workers,
                title,
                footer,
            };
            let report = pipeline::convert_to_file(&input, &output, &config)
                .with_context(|| format!("Failed to convert {:?}", input))?;

            println!("PDF saved to: {:?} ({} page(s))", output, report.pages.len());
            for skipped in report.skipped.iter() {
                println!("  Skipped {:?}: {}", skipped.path, skipped.reason);
            }
            if !report.rejected.is_empty() {
                println!("  {} non-DICOM file(s) ignored", report.rejected.len());
            }
        }
        Commands::Info { file, tuning } => {
            let options = NormalizeOptions::from(&tuning);
            options.validate()?;
            metadata::print_info(&file, &options)?
        }
        Commands::Preview {
            input,
            output,
            tuning,
        } => {
            let options = NormalizeOptions::from(&tuning);
            options.validate()?;
            let saved = image::convert(&input, output, &options)?;
            println!("Image saved to: {:?}", saved);
        }
        Commands::Web {
            host,
            port,
            output_dir,
            max_upload_mb,
            tuning,
            dpi,
        } => {
            let config = web::ServerConfig {
                host,
                port,
                output_dir,
                max_upload_bytes: max_upload_mb.saturating_mul(1024 * 1024),
                defaults: ConversionConfig {
                    normalize: NormalizeOptions::from(&tuning),
                    dpi,
                    ..ConversionConfig::default()
                },
            };
            web::start_server(config).await?
        }
    }

    Ok(())
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}
