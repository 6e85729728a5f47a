pub mod camera;
pub mod detection;
pub mod error;
pub mod inference;
pub mod monitor;
pub mod settings;
mod utils;

use anyhow::{Context, Result};
use log::info;
use tokio::time::{Duration, MissedTickBehavior};

use camera::ImageDirectoryProvider;
use inference::HttpDetector;
use monitor::SessionController;
use settings::Settings;

const JIG_ENV: &str = "WELDCOUNT_JIG";
const PART_ENV: &str = "WELDCOUNT_PART";
const DEFAULT_PART: &str = "UNASSIGNED";
const STATUS_INTERVAL_SECS: u64 = 10;

/// Count welds on one jig until Ctrl-C, then print the final tally as JSON.
pub async fn run() -> Result<()> {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    info!("weldcount starting up...");

    let settings = Settings::from_env()?;
    let jig_number = match std::env::var(JIG_ENV) {
        Ok(raw) => raw
            .parse::<u32>()
            .with_context(|| format!("{JIG_ENV} must be a jig number, got '{raw}'"))?,
        Err(_) => settings.jig_stations[0].number,
    };
    let part_number = std::env::var(PART_ENV).unwrap_or_else(|_| DEFAULT_PART.to_string());

    let detector = HttpDetector::from_settings(&settings)?;
    let controller = SessionController::new(settings, ImageDirectoryProvider, detector);

    controller.start(part_number, jig_number).await?;

    let mut ticker = tokio::time::interval(Duration::from_secs(STATUS_INTERVAL_SECS));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let counts = controller.get_counts();
                info!(
                    "part {} jig {:?}: left={} right={} cycles={} failed={} ({:?})",
                    counts.part_number,
                    counts.jig_number,
                    counts.left_count,
                    counts.right_count,
                    counts.cycles,
                    counts.failed_queries,
                    controller.phase()
                );
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("failed to listen for Ctrl-C")?;
                info!("shutdown requested");
                break;
            }
        }
    }

    controller.stop().await?;

    let counts = controller.get_counts();
    info!(
        "final tally for part {}: left={} right={} total={}",
        counts.part_number,
        counts.left_count,
        counts.right_count,
        counts.total()
    );
    println!("{}", serde_json::to_string_pretty(&counts)?);

    Ok(())
}
