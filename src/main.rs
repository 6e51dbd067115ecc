//! RideLink command-line interface.
//!
//! Commands:
//! - scan: pick a nearby sensor and print it
//! - ride: connect, stream readings and optionally drive ERG from a workout
//! - target: print a workout's target power at a given time

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use ridelink::config::{load_config, AppConfig, RiderSettings};
use ridelink::sensors::{BtleBackend, ConnectionState, Measurement, SensorEvent, SensorStream};
use ridelink::workouts::{target_power_for_time, Workout, WorkoutRunner};

/// RideLink - connect cycling sensors and ride structured workouts
#[derive(Parser)]
#[command(name = "ridelink")]
#[command(version)]
#[command(about = "BLE cycling sensor stream and ERG workout runner", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan for a sensor and print the one selected
    Scan,

    /// Connect to a sensor and stream its readings
    Ride {
        /// Workout JSON to drive the trainer with
        #[arg(short, long)]
        workout: Option<PathBuf>,

        /// FTP in watts (overrides the config file)
        #[arg(long)]
        ftp: Option<u16>,

        /// Stop after this many seconds
        #[arg(long)]
        duration: Option<u64>,
    },

    /// Print the target power of a workout at a point in time
    Target {
        /// Workout JSON file
        #[arg(short, long)]
        workout: PathBuf,

        /// Elapsed time in minutes
        #[arg(long)]
        at: f64,

        /// FTP in watts (overrides the config file)
        #[arg(long)]
        ftp: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting RideLink v{}", env!("CARGO_PKG_VERSION"));

    let cli = Cli::parse();
    let config = load_config().context("Failed to load configuration")?;

    match cli.command {
        Commands::Scan => scan(&config).await,
        Commands::Ride {
            workout,
            ftp,
            duration,
        } => ride(&config, workout, ftp, duration).await,
        Commands::Target { workout, at, ftp } => target(&config, &workout, at, ftp),
    }
}

fn resolve_ftp(config: &AppConfig, ftp: Option<u16>) -> Result<u16> {
    let ftp = ftp.unwrap_or(config.rider.ftp);
    if !RiderSettings::validate_ftp(ftp) {
        bail!("FTP must be between 50 and 600 watts, got {}", ftp);
    }
    Ok(ftp)
}

async fn open_stream(config: &AppConfig) -> Result<SensorStream> {
    let backend = BtleBackend::new(
        config.sensors.scan_timeout(),
        config.sensors.name_filter.clone(),
    )
    .await
    .map_err(|e| anyhow::anyhow!(e.user_message()))?;

    let stream = SensorStream::new(Arc::new(backend), config.sensors.to_sensor_config());
    if !stream.check_support().await {
        bail!(stream
            .error()
            .await
            .unwrap_or_else(|| "Bluetooth is not available".to_string()));
    }
    Ok(stream)
}

async fn scan(config: &AppConfig) -> Result<()> {
    let stream = open_stream(config).await?;
    match stream.scan_for_devices().await {
        Some(device) => {
            println!("{}\t{}", device.id, device.name);
            Ok(())
        }
        None => bail!(stream
            .error()
            .await
            .unwrap_or_else(|| "No device selected.".to_string())),
    }
}

async fn ride(
    config: &AppConfig,
    workout: Option<PathBuf>,
    ftp: Option<u16>,
    duration: Option<u64>,
) -> Result<()> {
    let ftp = resolve_ftp(config, ftp)?;
    let mut runner = match workout {
        Some(path) => Some(WorkoutRunner::new(Workout::from_file(&path)?, ftp)?),
        None => None,
    };

    let stream = open_stream(config).await?;
    let events = stream.event_receiver();

    let Some(device) = stream.scan_for_devices().await else {
        bail!(stream
            .error()
            .await
            .unwrap_or_else(|| "No device selected.".to_string()));
    };

    let operations = stream
        .connect_to_device(&device)
        .await
        .map_err(|e| anyhow::anyhow!(e.user_message()))?;
    operations.start_notifications().await;

    if let Some(info) = stream.snapshot().await.device_info {
        println!("Connected to {} ({})", device.name, info);
    } else {
        println!("Connected to {}", device.name);
    }

    let started = Instant::now();
    if let Some(runner) = runner.as_mut() {
        if !operations.has_control() {
            tracing::warn!("{} has no trainer control, ERG disabled", device.name);
        }
        runner.clock_mut().start(started)?;
    }

    let mut interval = tokio::time::interval(Duration::from_secs(1));
    let deadline = duration.map(|secs| started + Duration::from_secs(secs));

    'ride: loop {
        interval.tick().await;

        while let Ok(event) = events.try_recv() {
            match event {
                SensorEvent::Reading(reading) => match reading.measurement {
                    Measurement::Power(w) => tracing::debug!("power {}W ({})", w, reading.source),
                    Measurement::Cadence(c) => {
                        tracing::debug!("cadence {}rpm ({})", c, reading.source)
                    }
                    Measurement::HeartRate(b) => tracing::debug!("heart rate {}bpm", b),
                },
                SensorEvent::ConnectionChanged {
                    state: ConnectionState::Disconnected,
                    ..
                } => {
                    println!("Device disconnected");
                    break 'ride;
                }
                SensorEvent::Error(message) => tracing::warn!("{}", message),
                _ => {}
            }
        }

        let now = Instant::now();
        let snapshot = stream.snapshot().await;
        let mut line = format!(
            "{:>4}W {:>3}rpm {:>3}bpm",
            snapshot.power, snapshot.cadence, snapshot.heart_rate
        );

        if let Some(runner) = runner.as_mut() {
            if operations.has_control() {
                if let Err(e) = runner.tick(&stream, now).await {
                    tracing::warn!("Failed to set target power: {}", e);
                }
            }
            if let Some(target) = runner.target_at(now) {
                line.push_str(&format!("  target {}W", target));
            }
            if runner.is_complete(now) {
                println!("{}", line);
                println!("Workout complete");
                break;
            }
        }
        println!("{}", line);

        if deadline.is_some_and(|d| now >= d) {
            break;
        }
    }

    operations.stop_notifications().await;
    stream.disconnect_device().await;
    Ok(())
}

fn target(config: &AppConfig, path: &Path, at: f64, ftp: Option<u16>) -> Result<()> {
    let ftp = resolve_ftp(config, ftp)?;
    let workout = Workout::from_file(path)?;

    match target_power_for_time(&workout.segments, at, ftp as f64) {
        Some(watts) => println!("{}", watts.round()),
        None => println!("no target"),
    }
    Ok(())
}
