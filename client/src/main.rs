//! Halot printer CLI
//!
//! Talks to a Halot resin printer over its local WebSocket interface.

mod cli;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use halot_client::ClientConfig;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{Level, debug, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Halot printer client
#[derive(Parser, Debug)]
#[command(name = "halot")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Printer address (overrides the configuration file)
    #[arg(short, long)]
    address: Option<String>,

    /// Printer password (overrides the configuration file)
    #[arg(short, long, env = "HALOT_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Printer WebSocket port
    #[arg(long)]
    port: Option<u16>,

    /// Seconds to wait for the printer's reply
    #[arg(short, long, default_value_t = 10)]
    timeout: u64,

    /// Run in verbose mode
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// Query the firmware version
    Version,

    /// Print the current printer status
    Status,

    /// Start printing a file stored on the printer
    Start {
        filename: String,
    },

    /// Stop the current job
    Stop,

    /// Pause the current job
    Pause,

    /// Resume a paused job
    Resume,

    /// Change print parameters of the current job
    SetParams {
        /// Number of bottom layers (1-10)
        #[arg(long)]
        bottom_layers: u32,

        /// Light-off delay in seconds (0-20)
        #[arg(long)]
        light_off_delay: u32,

        /// Motor speed (1-10)
        #[arg(long)]
        motor_speed: u32,

        /// Bottom layer exposure in seconds (1-70)
        #[arg(long)]
        initial_exposure: u32,

        /// Normal layer exposure in seconds (0.5-10)
        #[arg(long)]
        exposure: f64,

        /// Lift height in millimetres (8-20)
        #[arg(long)]
        rising_height: u32,
    },

    /// Upload a sliced file
    Send {
        /// Local file to upload
        path: PathBuf,

        /// Name to store the file under (defaults to the local file name)
        #[arg(long)]
        name: Option<String>,
    },

    /// Print the camera stream URI
    Camera,

    /// Poll the printer and report status changes
    Watch {
        /// Seconds between status requests
        #[arg(short, long, default_value_t = 5)]
        interval: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(args.verbose)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    debug!("Halot CLI v{}", env!("CARGO_PKG_VERSION"));

    let config = resolve_config(&args).await?;
    let timeout = Duration::from_secs(args.timeout);

    info!("Using printer at {}", config.url());
    cli::run(config, args.command, timeout).await
}

/// Merge the configuration file with command-line overrides
async fn resolve_config(args: &Args) -> Result<ClientConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let config = ClientConfig::load(path)
                .await
                .with_context(|| format!("failed to load {}", path.display()))?;
            info!("Loaded configuration from {}", path.display());
            config
        }
        None => ClientConfig::default(),
    };

    if let Some(address) = &args.address {
        config.printer.address = address.clone();
    }
    if let Some(password) = &args.password {
        config.printer.password = password.clone();
    }
    if let Some(port) = args.port {
        config.printer.port = port;
    }

    if config.printer.address.is_empty() {
        anyhow::bail!("no printer address given (use --address or a configuration file)");
    }

    Ok(config)
}
