use clap::{Parser, ValueEnum};
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::display::EmitterSettings;
use crate::mqtt::MqttConfig;
use crate::sensor::ReadingRange;

const DEFAULT_MIN_VALUE: i64 = 0;
const DEFAULT_MAX_VALUE: i64 = u16::MAX as i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SensorMode {
    Mockup,
    Real,
}

impl fmt::Display for SensorMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SensorMode::Mockup => write!(f, "mockup"),
            SensorMode::Real => write!(f, "real"),
        }
    }
}

/// Sensor parameters control
#[derive(Debug, Clone, Parser)]
#[command(name = "infrared-sensor", version, about = "Sensor parameters control")]
pub struct Cli {
    /// Type of sensor to use
    #[arg(long, value_enum, default_value_t = SensorMode::Mockup)]
    pub sensor_type: SensorMode,

    /// Seconds between two sensor readings
    #[arg(long, default_value_t = 2)]
    pub reading_frequency: u64,

    /// Minimum value generated by the mock sensor
    #[arg(long, default_value_t = DEFAULT_MIN_VALUE, allow_negative_numbers = true)]
    pub min_value: i64,

    /// Maximum value generated by the mock sensor
    #[arg(long, default_value_t = DEFAULT_MAX_VALUE, allow_negative_numbers = true)]
    pub max_value: i64,

    /// Broker configuration file (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Broker address as host[:port], overrides the configuration file
    #[arg(long)]
    pub broker: Option<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("The minimum value ({min}) cannot be greater than the maximum value ({max}).")]
    InvalidRange { min: i64, max: i64 },

    #[error("For 'real' sensor type, minimum and maximum values should not be provided.")]
    RealModeBounds,

    #[error("Failed to read configuration file {}: {source}", path.display())]
    ReadFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid configuration file {}: {source}", path.display())]
    ParseFile {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid broker address '{0}', expected host[:port] or [ipv6]:port")]
    InvalidBroker(String),

    #[error("Broker setting '{0}' must be greater than zero")]
    ZeroSetting(&'static str),
}

/// Validated, immutable runtime configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorConfig {
    pub mode: SensorMode,
    pub reading_period: Duration,
    pub range: ReadingRange,
    pub mqtt: MqttConfig,
}

impl SensorConfig {
    pub fn from_cli(cli: &Cli) -> Result<Self, ConfigError> {
        if cli.sensor_type == SensorMode::Real
            && (cli.min_value != DEFAULT_MIN_VALUE || cli.max_value != DEFAULT_MAX_VALUE)
        {
            return Err(ConfigError::RealModeBounds);
        }

        let range = clamp_range(cli.min_value, cli.max_value)?;

        let mut mqtt = MqttConfig::resolve(cli.config.as_deref())?;
        if let Some(broker) = &cli.broker {
            mqtt = mqtt.with_broker(broker)?;
        }

        Ok(Self {
            mode: cli.sensor_type,
            reading_period: Duration::from_secs(cli.reading_frequency),
            range,
            mqtt,
        })
    }

    pub fn with_mode(mut self, mode: SensorMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn emitter_settings(&self) -> EmitterSettings {
        EmitterSettings {
            range: self.range,
            period: self.reading_period,
        }
    }

    pub fn log_summary(&self) {
        info!("Sensor type: {}", self.mode);
        info!("Reading frequency: {:?}", self.reading_period);
        info!("Minimum value: {}", self.range.min());
        info!("Maximum value: {}", self.range.max());
        info!("Broker: {} (topic {})", self.mqtt.broker(), self.mqtt.topic);
    }
}

/// Floors `min` at 0 and caps `max` at 65535 before checking the order
pub fn clamp_range(min: i64, max: i64) -> Result<ReadingRange, ConfigError> {
    let min = min.max(0);
    let max = max.min(DEFAULT_MAX_VALUE);
    let invalid = || ConfigError::InvalidRange { min, max };

    let lower = u16::try_from(min).map_err(|_| invalid())?;
    let upper = u16::try_from(max).map_err(|_| invalid())?;
    ReadingRange::new(lower, upper).ok_or_else(invalid)
}
