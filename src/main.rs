//! CLI entry point for beamline-daq
//!
//! Provides command-line access to the device server:
//! - Running a scan definition and printing the record as JSON
//! - One-shot `get`, `put`, `move`, `list` and `ping` commands
//!
//! # Usage
//!
//! ```bash
//! beamline-daq scan scans/cu_kedge.toml > cu_kedge.json
//! beamline-daq get BL02:RING:CURRENT
//! beamline-daq move BL02:SAMPLE:X -- -12.5
//! beamline-daq --host bl02-ioc.local list 'BL02:DET:*'
//! ```
//!
//! Settings come from `config/beamline.toml` (or `--config`) and `BEAMLINE_DAQ_*`
//! environment variables; log output goes to stderr.

// Global allocator (Microsoft Rust Guidelines: M-MIMALLOC-APPS)
#[cfg(not(test))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::{anyhow, Context, Result};
use beamline_daq::config::{load_scan, Settings, DEFAULT_CONFIG_PATH};
use beamline_daq::experiment::ScanEngine;
use beamline_daq::hardware::Motor;
use beamline_daq::logging;
use beamline_daq::transport::{shared, TcpTransport, Transport};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "beamline-daq")]
#[command(about = "Beamline device server client and step-scan runner", long_about = None)]
struct Cli {
    /// Settings file (TOML)
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Override the device server host
    #[arg(long, global = true)]
    host: Option<String>,

    /// Override the device server port
    #[arg(long, global = true)]
    port: Option<u16>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scan definition and print the scan record as JSON
    Scan {
        /// Path to the scan definition (TOML)
        file: PathBuf,
    },

    /// Read a process variable
    Get {
        pv: String,
    },

    /// Write a process variable
    Put {
        pv: String,
        #[arg(allow_negative_numbers = true)]
        value: f64,
    },

    /// Move a motor and wait until it is idle
    Move {
        motor: String,
        #[arg(allow_negative_numbers = true)]
        position: f64,

        /// Return as soon as the move is accepted
        #[arg(long)]
        no_wait: bool,
    },

    /// List process variables, optionally filtered by a `*` pattern
    List {
        pattern: Option<String>,
    },

    /// Check that the device server answers
    Ping,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::load_from(&cli.config)
        .with_context(|| format!("Failed to load settings from {}", cli.config.display()))?;
    if let Some(host) = cli.host {
        settings.connection.host = host;
    }
    if let Some(port) = cli.port {
        settings.connection.port = port;
    }
    settings.validate().map_err(|e| anyhow!(e))?;
    logging::init_from_settings(&settings).map_err(|e| anyhow!(e))?;

    let mut transport = TcpTransport::from_settings(&settings.connection);
    transport.connect().await?;

    match cli.command {
        Commands::Scan { file } => run_scan(transport, &settings, file).await,
        Commands::Get { pv } => {
            let value = transport.get(&pv).await?;
            println!("{value}");
            close(transport).await
        }
        Commands::Put { pv, value } => {
            transport.put(&pv, value).await?;
            close(transport).await
        }
        Commands::Move {
            motor,
            position,
            no_wait,
        } => {
            let motor = Motor::new(motor, shared(transport))?
                .with_poll_interval(settings.motion.poll_interval());
            motor
                .move_to(position, !no_wait, settings.motion.timeout())
                .await?;
            if !no_wait {
                println!("{}", motor.position().await?);
            }
            Ok(())
        }
        Commands::List { pattern } => {
            for pv in transport.list_pvs(pattern.as_deref()).await? {
                println!("{pv}");
            }
            close(transport).await
        }
        Commands::Ping => {
            transport.ping().await?;
            println!("PONG from {}:{}", transport.host(), transport.port());
            close(transport).await
        }
    }
}

async fn run_scan(transport: TcpTransport, settings: &Settings, file: PathBuf) -> Result<()> {
    let config = load_scan(&file)
        .with_context(|| format!("Invalid scan definition {}", file.display()))?;
    info!(
        scan_type = config.scan_type(),
        points = config.num_points(),
        motors = ?config.movers(),
        "Loaded scan definition"
    );

    let mut engine = ScanEngine::from_settings(shared(transport), &settings.motion);
    let mut record = engine.run(&config).await?;
    record.metadata_mut().insert(
        "definition".into(),
        serde_json::Value::String(file.display().to_string()),
    );

    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

/// End the session politely; the socket itself is released on drop either way.
async fn close(mut transport: TcpTransport) -> Result<()> {
    transport.quit().await?;
    Ok(())
}
