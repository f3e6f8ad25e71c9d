// src/config.rs - serial and listener settings with sane defaults

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Server configuration. Everything has a default so a bare
/// `server <COM_PORT>` invocation needs no file at all.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Serial device of the board, e.g. `COM3` or `/dev/ttyUSB0`.
    #[serde(default)]
    pub com_port: String,

    #[serde(default = "default_baud")]
    pub baud: u32,

    /// Serial write timeout in milliseconds.
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,

    /// The block client hardcodes this port, so change it with care.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

fn default_baud() -> u32 {
    9600
}

fn default_write_timeout_ms() -> u64 {
    300
}

fn default_listen_addr() -> String {
    "0.0.0.0:45678".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            com_port: String::new(),
            baud: default_baud(),
            write_timeout_ms: default_write_timeout_ms(),
            listen_addr: default_listen_addr(),
        }
    }
}

impl Config {
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

/// Loads `path` if it exists, otherwise returns the defaults.
pub fn load_config(path: &str) -> Result<Config, ConfigError> {
    if !std::path::Path::new(path).exists() {
        return Ok(Config::default());
    }
    let contents = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&contents)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_board() {
        let config = Config::default();
        assert_eq!(config.baud, 9600);
        assert_eq!(config.write_timeout_ms, 300);
        assert_eq!(config.listen_addr, "0.0.0.0:45678");
    }

    #[test]
    fn parse_partial_toml() {
        let config: Config = toml::from_str(
            r#"
            com_port = "COM7"
            baud = 57600
            "#,
        )
        .unwrap();
        assert_eq!(config.com_port, "COM7");
        assert_eq!(config.baud, 57600);
        assert_eq!(config.write_timeout_ms, 300);
    }
}
