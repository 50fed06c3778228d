//! usb-drives
//!
//! Lists removable USB storage devices with stable identifiers, watches them
//! come and go, unmounts them, and serves the same operations to a host
//! application over stdin/stdout.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use common::{EngineBridge, LogSink, create_engine_bridge, setup_logging};
use engine::{DeviceEngine, EngineConfig, HostSession, default_backend, diff_polls, spawn_engine_worker};
use protocol::{DeviceId, DeviceSnapshot};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tokio::io::BufReader;
use tokio::signal;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "usb-drives")]
#[command(
    author,
    version,
    about = "Stable identities and mount tracking for USB storage devices"
)]
#[command(long_about = "
Discovers removable USB mass-storage devices and gives each one an identifier
that stays the same across polls, even when the OS reassigns device handles.

EXAMPLES:
    # List attached drives
    usb-drives list

    # Follow arrivals, departures and mount changes
    usb-drives watch --interval 1

    # Unmount a drive by identifier
    usb-drives unmount 1921-21889-4C530001-0

    # Serve line-delimited JSON requests on stdin/stdout
    usb-drives serve --log-file ~/usb-drives.log

CONFIGURATION:
    The configuration file is looked up in the following order:
    1. Path specified with --config
    2. ~/.config/usb-drives/config.toml
    3. /etc/usb-drives/config.toml
    4. Built-in defaults
")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    /// Save default configuration to default location and exit
    #[arg(long, global = true)]
    save_config: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL", global = true)]
    log_level: Option<String>,

    /// Write diagnostics to this file instead of standard error
    #[arg(long, value_name = "PATH", global = true)]
    log_file: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Poll once and print attached drives
    List {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Poll repeatedly and print changes until Ctrl+C
    Watch {
        /// Seconds between polls (overrides configuration)
        #[arg(short, long, value_name = "SECS")]
        interval: Option<u64>,
    },
    /// Unmount a drive by identifier
    Unmount {
        /// Device identifier as printed by `list`
        id: String,
    },
    /// Serve host requests on stdin/stdout
    Serve,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // Handle --save-config flag early (before loading config)
    if args.save_config {
        let config = EngineConfig::default();
        let path = EngineConfig::default_path();
        config.save(&path).context("Failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(ExitCode::SUCCESS);
    }

    let config = if let Some(ref path) = args.config {
        let path = PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).as_ref());
        EngineConfig::load(Some(path)).context("Failed to load configuration")?
    } else {
        EngineConfig::load_or_default()
    };

    // CLI values win over the configuration file
    let log_level = args.log_level.as_deref().unwrap_or(&config.logging.level);
    EngineConfig::validate_log_level(log_level)?;
    let log_file = match args.log_file.as_deref() {
        Some(file) => Some(PathBuf::from(shellexpand::tilde(file).as_ref())),
        None => config.logging.file_path(),
    };

    let log_sink =
        setup_logging(log_level, log_file.as_deref()).context("Failed to setup logging")?;

    info!("usb-drives v{}", env!("CARGO_PKG_VERSION"));
    info!("Log level: {}", log_level);

    let engine = DeviceEngine::with_options(default_backend(), config.engine_options());
    let (bridge, worker) = create_engine_bridge();
    let worker_handle =
        spawn_engine_worker(worker, engine).context("Failed to spawn registry worker thread")?;

    let command = args.command.unwrap_or(Command::List { json: false });
    let result = match command {
        Command::List { json } => list_mode(&bridge, json).await,
        Command::Watch { interval } => {
            let interval = interval
                .map(Duration::from_secs)
                .unwrap_or_else(|| config.watch.interval())
                .max(Duration::from_secs(1));
            watch_mode(&bridge, interval).await
        }
        Command::Unmount { id } => unmount_mode(&bridge, DeviceId(id)).await,
        Command::Serve => serve_mode(bridge.clone(), log_sink).await,
    };

    // Cleanup: stop the registry worker
    if let Err(e) = bridge.shutdown().await {
        error!("Error shutting down registry worker: {}", e);
    }
    if let Err(e) = worker_handle.join() {
        error!("Registry worker thread panicked: {:?}", e);
    }

    result
}

/// Poll once and print
async fn list_mode(bridge: &EngineBridge, json: bool) -> Result<ExitCode> {
    let devices = bridge.poll().await.context("Failed to poll devices")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&devices)?);
    } else if devices.is_empty() {
        println!("No USB storage devices found.");
    } else {
        println!("Found {} USB storage device(s):\n", devices.len());
        for device in &devices {
            print_device(device);
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn print_device(device: &DeviceSnapshot) {
    println!(
        "  [{}] {:04x}:{:04x} - {} {}",
        device.id,
        device.vendor_id,
        device.product_id,
        device.vendor.as_deref().unwrap_or("Unknown Manufacturer"),
        device.product.as_deref().unwrap_or("Unknown Product")
    );
    println!("      Location: {:#010x}", device.location_id);
    if let Some(serial) = &device.serial_number {
        println!("      Serial: {}", serial);
    }
    match &device.mount_point {
        Some(mount) => println!("      Mounted at: {}", mount),
        None => println!("      Not mounted"),
    }
    println!();
}

/// Poll on an interval and print changes until Ctrl+C
async fn watch_mode(bridge: &EngineBridge, interval: Duration) -> Result<ExitCode> {
    info!("Watching every {:?}, press Ctrl+C to stop", interval);

    let mut ticker = tokio::time::interval(interval);
    let mut previous: Vec<DeviceSnapshot> = Vec::new();

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let current = bridge.poll().await.context("Failed to poll devices")?;
                for change in diff_polls(&previous, &current) {
                    println!("{}", change);
                }
                previous = current;
            }
            result = signal::ctrl_c() => {
                if let Err(e) = result {
                    error!("Error waiting for Ctrl+C: {}", e);
                }
                info!("Received Ctrl+C, stopping watch");
                break;
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Poll so the registry knows the device, then unmount it
async fn unmount_mode(bridge: &EngineBridge, id: DeviceId) -> Result<ExitCode> {
    bridge.poll().await.context("Failed to poll devices")?;

    let outcome = bridge
        .unmount(id.clone())
        .await
        .context("Failed to send unmount request")?;

    println!("{}: {}", id, outcome);

    Ok(if outcome.succeeded() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Serve host requests on stdin/stdout
async fn serve_mode(bridge: EngineBridge, log_sink: LogSink) -> Result<ExitCode> {
    let session = HostSession::new(bridge, log_sink);
    let mut stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();

    session
        .serve(&mut stdin, &mut stdout)
        .await
        .context("Host connection failed")?;

    Ok(ExitCode::SUCCESS)
}
