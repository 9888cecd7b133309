//! DOM Application Host
//!
//! Configuration loading, logging initialisation and the cooperative
//! polling loop around the acquisition and run-control crates.

use std::time::Duration;

use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, error, info, Level};
use tracing_subscriber::FmtSubscriber;

mod app;
mod config;
mod feeder;

pub use app::Domapp;
pub use config::{DomappConfig, LoggingConfig, PollConfig, SimulationConfig, StartupConfig};
pub use feeder::Feeder;

/// Initialize logging
pub fn init_logging(level: Level, json: bool) -> anyhow::Result<()> {
    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true);

    if json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

/// Poll until Ctrl-C, then end the run
pub async fn run(config: DomappConfig) -> anyhow::Result<()> {
    debug!("Effective configuration: {}", serde_json::to_string(&config)?);
    let period = Duration::from_millis(config.poll.period_ms);
    let mut app = Domapp::new(config)?;
    app.start()?;

    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!("Polling every {:?}", period);
    let mut last = Instant::now();
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let now = Instant::now();
                let elapsed = u32::try_from(now.duration_since(last).as_micros()).unwrap_or(u32::MAX);
                last = now;
                if let Err(e) = app.poll(elapsed) {
                    error!("Poll failed: {:#}", e);
                }
            }
            res = &mut shutdown => {
                if let Err(e) = res {
                    error!("Signal handler failed: {}", e);
                }
                info!("Shutdown requested");
                break;
            }
        }
    }

    app.shutdown();
    Ok(())
}
