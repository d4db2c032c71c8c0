use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::config::ConfigError;

/// Topic instructions are published on
pub const INSTRUCTION_TOPIC: &str = "sensor_instructions";

const DEFAULT_PORT: u16 = 1883;

/// Broker connection settings, loaded from `config.toml`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub topic: String,
    pub keep_alive_secs: u64,
    pub connect_timeout_secs: u64,
    pub channel_capacity: usize,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            client_id: "infrared-sensor".to_string(),
            topic: INSTRUCTION_TOPIC.to_string(),
            keep_alive_secs: 5,
            connect_timeout_secs: 10,
            channel_capacity: 100,
        }
    }
}

impl MqttConfig {
    /// `<config dir>/infrared-sensor/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("infrared-sensor").join("config.toml"))
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|source| ConfigError::ParseFile {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        info!("Loaded broker configuration from {}", path.display());
        Ok(config)
    }

    /// rumqttc needs a non-empty request queue and a non-zero timeout
    fn validate(&self) -> Result<(), ConfigError> {
        if self.channel_capacity == 0 {
            return Err(ConfigError::ZeroSetting("channel_capacity"));
        }
        if self.connect_timeout_secs == 0 {
            return Err(ConfigError::ZeroSetting("connect_timeout_secs"));
        }
        Ok(())
    }

    /// An explicit path must exist. Without one, the default location is
    /// used when present and built-in defaults otherwise.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        match Self::default_path() {
            Some(path) if path.is_file() => Self::load(&path),
            _ => {
                debug!("No broker configuration file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Overrides host and port from a `host[:port]` string. IPv6 hosts
    /// must be bracketed: `[::1]:1883`.
    pub fn with_broker(mut self, broker: &str) -> Result<Self, ConfigError> {
        let invalid = || ConfigError::InvalidBroker(broker.to_string());
        let parse_port = |port: &str| port.parse::<u16>().map_err(|_| invalid());

        let (host, port) = if let Some(rest) = broker.strip_prefix('[') {
            let (host, tail) = rest.split_once(']').ok_or_else(invalid)?;
            let port = match tail {
                "" => DEFAULT_PORT,
                _ => parse_port(tail.strip_prefix(':').ok_or_else(invalid)?)?,
            };
            (host, port)
        } else {
            match broker.rsplit_once(':') {
                Some((host, port)) => (host, parse_port(port)?),
                None => (broker, DEFAULT_PORT),
            }
        };
        let bare_v6 = !broker.starts_with('[') && host.contains(':');
        if host.is_empty() || bare_v6 {
            return Err(invalid());
        }
        self.host = host.to_string();
        self.port = port;
        Ok(self)
    }

    pub fn broker(&self) -> String {
        format!("mqtt://{}:{}", self.host, self.port)
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}
