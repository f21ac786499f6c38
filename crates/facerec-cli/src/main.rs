use anyhow::Result;
use clap::{Parser, Subcommand};
use facerec_core::{FeatureDatabase, LabelMap};
use facerec_hw::Camera;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod engine;
mod session;

use config::Config;
use engine::Policy;

#[derive(Parser)]
#[command(name = "facerec", about = "Face enrollment and recognition from a webcam")]
struct Cli {
    /// Config file (default: ./facerec.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Camera device path or index, overriding the config
    #[arg(short, long, global = true)]
    device: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture face embeddings for a person from the camera
    Enroll {
        /// Person's name
        name: String,
        /// Number of samples to capture
        #[arg(short, long, default_value_t = 5)]
        samples: usize,
        /// Pause between samples, in milliseconds
        #[arg(long, default_value_t = 500)]
        interval_ms: u64,
    },
    /// Save grayscale face crops to dataset/<name>/ for LBPH training
    Collect {
        /// Person's name
        name: String,
        /// Number of crops to save
        #[arg(short = 'n', long, default_value_t = 20)]
        count: usize,
    },
    /// Train the LBPH model from the dataset directory
    Train,
    /// Recognize faces from the live camera until Ctrl-C
    Run {
        #[arg(short, long, value_enum, default_value_t = Policy::Lbph)]
        policy: Policy,
        /// Write the last annotated frame here on exit
        #[arg(long)]
        snapshot: Option<PathBuf>,
    },
    /// Recognize faces in a still image
    Image {
        /// Input image
        path: PathBuf,
        /// Annotated output (default: <input>.annotated.png)
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(short, long, value_enum, default_value_t = Policy::Lbph)]
        policy: Policy,
    },
    /// List enrolled people
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// List V4L2 capture devices
    Devices,
}

#[derive(Serialize)]
struct EnrolledLabel<'a> {
    label: &'a str,
    samples: usize,
}

#[derive(Serialize)]
struct Listing<'a> {
    embeddings: Vec<EnrolledLabel<'a>>,
    lbph_labels: Vec<&'a str>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(device) = cli.device {
        config.camera_device = device;
    }
    tracing::debug!(?config, "configuration");

    match cli.command {
        Commands::Enroll {
            name,
            samples,
            interval_ms,
        } => {
            let interval = Duration::from_millis(interval_ms);
            commands::enroll::run(config, &name, samples, interval).await?;
        }
        Commands::Collect { name, count } => {
            commands::collect::run(config, &name, count).await?;
        }
        Commands::Train => {
            commands::train::run(&config)?;
        }
        Commands::Run { policy, snapshot } => {
            commands::recognize::run_camera(config, policy, snapshot).await?;
        }
        Commands::Image { path, output, policy } => {
            commands::recognize::run_image(&config, policy, &path, output.as_deref())?;
        }
        Commands::List { json } => {
            let database = FeatureDatabase::load_or_empty(&config.encodings_path);
            let labels = LabelMap::load(&config.label_map_path).unwrap_or_default();
            let listing = Listing {
                embeddings: database
                    .label_counts()
                    .into_iter()
                    .map(|(label, samples)| EnrolledLabel { label, samples })
                    .collect(),
                lbph_labels: labels.iter().map(|(_, label)| label).collect(),
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&listing)?);
            } else if listing.embeddings.is_empty() && listing.lbph_labels.is_empty() {
                println!("No one enrolled");
            } else {
                for entry in &listing.embeddings {
                    println!("{:<24} {} embedding(s)", entry.label, entry.samples);
                }
                if !listing.lbph_labels.is_empty() {
                    println!("LBPH labels: {}", listing.lbph_labels.join(", "));
                }
            }
        }
        Commands::Devices => {
            let devices = Camera::list_devices();
            if devices.is_empty() {
                println!("No V4L2 capture devices found");
            }
            for device in devices {
                println!("{}  {} ({}, {})", device.path, device.name, device.driver, device.bus);
            }
        }
    }

    Ok(())
}
