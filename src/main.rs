use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use tokio_util::sync::CancellationToken;

use crescendo::audio::PlayerHandle;
use crescendo::config::MusicConfig;
use crescendo::coordinator::Coordinator;
use crescendo::relay::{UsbRelay, DEFAULT_PRODUCT_ID, DEFAULT_VENDOR_ID};
use crescendo::sensor::{RadarSensor, SensorSettings, DEFAULT_BAUD_RATE};

#[derive(Debug, Parser)]
#[command(name = "crescendo")]
#[command(about = "Presence-activated background music player", long_about = None)]
struct Cli {
    /// Serial port of the presence radar
    #[arg(long, default_value = "/dev/ttyAMA0")]
    sensor_port: String,

    /// Directory containing music files
    #[arg(long, default_value = "music")]
    music_dir: PathBuf,

    /// Playlists-and-schedules configuration file
    #[arg(long, default_value = "music_config.yaml")]
    config: PathBuf,

    /// Seconds between presence checks
    #[arg(long, default_value_t = 1.0)]
    check_interval: f64,

    /// Seconds without presence before the speaker relay powers down
    #[arg(long, default_value_t = 15.0 * 60.0)]
    relay_off_delay: f64,

    /// Playback volume, 0.0 to 1.0
    #[arg(long)]
    volume: Option<f32>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let cli = Cli::parse();
    info!("crescendo starting up");

    if !cli.music_dir.exists() {
        std::fs::create_dir_all(&cli.music_dir).with_context(|| {
            format!("failed to create music directory {}", cli.music_dir.display())
        })?;
    }

    let config = if cli.config.exists() {
        MusicConfig::load(&cli.config, &cli.music_dir)?
    } else {
        warn!(
            "config {} not found; falling back to the whole music directory",
            cli.config.display()
        );
        MusicConfig::fallback(&cli.music_dir)
    };

    let mut sensor = RadarSensor::open(
        &cli.sensor_port,
        DEFAULT_BAUD_RATE,
        Duration::from_secs(1),
    )
    .context("failed to open presence sensor")?;
    if let Err(err) = sensor.configure(&SensorSettings::default()) {
        warn!("sensor configuration failed: {err}; continuing with its defaults");
    }

    let relay = match UsbRelay::open(DEFAULT_VENDOR_ID, DEFAULT_PRODUCT_ID) {
        Ok(relay) => Some(relay),
        Err(err) => {
            warn!("USB relay not available: {err}; continuing without relay control");
            None
        }
    };

    let player = PlayerHandle::spawn().context("failed to start audio player")?;
    if let Some(volume) = cli.volume {
        player.set_volume(volume)?;
    }

    let coordinator = Coordinator::new(
        sensor,
        relay,
        player,
        config,
        Duration::from_secs_f64(cli.relay_off_delay),
    );

    let cancel = CancellationToken::new();
    let worker = tokio::spawn(coordinator.run(
        Duration::from_secs_f64(cli.check_interval),
        cancel.clone(),
    ));

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutdown signal received");
    cancel.cancel();
    worker.await.context("coordinator task failed to join")?;

    info!("crescendo shut down");
    Ok(())
}
