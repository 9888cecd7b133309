//! Application Configuration
//!
//! Layered with the `config` crate: built-in defaults, then an optional
//! TOML file, then `DOMAPP__<SECTION>__<KEY>` environment overrides.

use std::str::FromStr;

use anyhow::{anyhow, Context};
use config::{Config, Environment, File, Source};
use data_access::{AcquisitionConfig, LbmConfig};
use exp_control::{FlasherSettings, InterlockConfig, PedestalConfig, PedestalGoals, RunConfig};
use serde::{Deserialize, Serialize};
use tracing::Level;

/// Complete DOM application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DomappConfig {
    pub lbm: LbmConfig,
    pub acquisition: AcquisitionConfig,
    pub run: RunConfig,
    pub interlock: InterlockConfig,
    pub pedestal: PedestalConfig,
    pub logging: LoggingConfig,
    pub poll: PollConfig,
    pub startup: StartupConfig,
    pub simulation: SimulationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `trace`, `debug`, `info`, `warn` or `error`
    pub level: String,
    /// One JSON object per line instead of human-readable text
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Polling loop timing
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Delay between loop iterations
    pub period_ms: u64,
    /// Monitoring / supernova interval
    pub interval_secs: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            period_ms: 10,
            interval_secs: 1,
        }
    }
}

/// Commands issued once before the loop starts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StartupConfig {
    /// Collect pedestals first
    pub pedestal_goals: Option<PedestalGoals>,
    pub begin_run: bool,
    /// Start a flasher run with these settings instead of a normal run
    pub flasher: Option<FlasherSettings>,
}

impl Default for StartupConfig {
    fn default() -> Self {
        Self {
            pedestal_goals: None,
            begin_run: true,
            flasher: None,
        }
    }
}

/// Host stand-in for the mainboard
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Forced triggers per second
    pub forced_rate_hz: u32,
    /// Mean supernova scaler counts per bin
    pub sn_counts: u32,
    /// PMT high-voltage readback
    pub hv_adc: u16,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            forced_rate_hz: 100,
            sn_counts: 3,
            hv_adc: 0,
        }
    }
}

impl DomappConfig {
    /// Load from `path` (missing file allowed) plus environment overrides
    pub fn load(path: &str) -> anyhow::Result<Self> {
        Self::from_source(File::with_name(path).required(false))
            .with_context(|| format!("loading configuration from {}", path))
    }

    /// Defaults overlaid with `source` and the environment
    pub fn from_source<S>(source: S) -> anyhow::Result<Self>
    where
        S: Source + Send + Sync + 'static,
    {
        let cfg: Self = Config::builder()
            .add_source(source)
            .add_source(
                Environment::with_prefix("DOMAPP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject values that would only fail later, mid-startup
    pub fn validate(&self) -> anyhow::Result<()> {
        self.lbm.geometry()?;
        self.log_level()?;
        if self.poll.period_ms == 0 || self.poll.interval_secs == 0 {
            return Err(anyhow!(
                "poll period and interval must be non-zero (period_ms={}, interval_secs={})",
                self.poll.period_ms,
                self.poll.interval_secs
            ));
        }
        if let Some(goals) = &self.startup.pedestal_goals {
            goals.validate()?;
        }
        if let Some(flasher) = &self.startup.flasher {
            flasher.validate()?;
        }
        Ok(())
    }

    pub fn log_level(&self) -> anyhow::Result<Level> {
        Level::from_str(&self.logging.level)
            .map_err(|_| anyhow!("unknown log level {:?}", self.logging.level))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;
    use event_codec::{Compression, DataFormat};
    use exp_control::TriggerMode;

    fn parse(toml: &str) -> anyhow::Result<DomappConfig> {
        DomappConfig::from_source(File::from_str(toml, FileFormat::Toml))
    }

    #[test]
    fn test_empty_file_gives_defaults() {
        let cfg = parse("").unwrap();
        assert_eq!(cfg.logging.level, "info");
        assert_eq!(cfg.poll.interval_secs, 1);
        assert_eq!(cfg.run, RunConfig::default());
        assert!(cfg.startup.begin_run);
    }

    #[test]
    fn test_sections_override() {
        let cfg = parse(
            r#"
            [lbm]
            capacity_bits = 22
            depth_bits = 16

            [acquisition]
            data_format = "delta"
            compression = "delta"

            [run]
            trigger_mode = "spe_disc"

            [run.supernova]
            mode = 1
            deadtime = 6400

            [startup.pedestal_goals]
            atwd_a = 100
            atwd_b = 100
            fadc = 200
            "#,
        )
        .unwrap();
        assert_eq!(cfg.lbm.geometry().unwrap().depth_mask(), 0xFFFF);
        assert_eq!(cfg.acquisition.data_format, DataFormat::Delta);
        assert_eq!(cfg.acquisition.compression, Compression::Delta);
        assert_eq!(cfg.run.trigger_mode, TriggerMode::SpeDisc);
        assert_eq!(cfg.run.supernova.map(|s| s.deadtime), Some(6400));
        assert_eq!(cfg.startup.pedestal_goals.map(|g| g.fadc), Some(200));
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(parse("[lbm]\ncapacity_bits = 22\ndepth_bits = 23").is_err());
        assert!(parse("[logging]\nlevel = \"loud\"").is_err());
        assert!(parse("[poll]\nperiod_ms = 0").is_err());
        assert!(parse("[startup.pedestal_goals]\natwd_a = 1001\natwd_b = 0\nfadc = 0").is_err());
        assert!(parse(
            "[startup.flasher]\nbrightness = 1\nwidth = 1\ndelay = 500\nmask = 1\nrate = 10"
        )
        .is_err());
    }
}
