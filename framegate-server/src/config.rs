//! Server configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via FRAMEGATE_CONFIG)
//! 3. Environment variables

use framegate_protocol::DEFAULT_MAX_FRAME_LENGTH;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Top-level configuration; all keys live under `tcp`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub tcp: TcpConfig,
}

/// TCP endpoint configuration (`tcp.*`, kebab-case keys).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct TcpConfig {
    /// Listen port. 0 binds an OS-assigned ephemeral port.
    pub port: u16,

    /// How the inbound byte stream is carved into messages.
    pub framing: FramingMode,

    /// Bound on any single frame and on the streaming JSON accumulator.
    pub max_frame_length: usize,

    /// Close the connection after this many seconds without inbound bytes.
    /// 0 disables the idle timeout.
    pub reader_idle_seconds: u64,

    /// When false, requests are decoded and logged but never answered.
    pub respond_enabled: bool,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            port: 9000,
            framing: FramingMode::LengthField,
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
            reader_idle_seconds: 60,
            respond_enabled: true,
        }
    }
}

impl TcpConfig {
    /// Returns the idle timeout, or `None` when disabled.
    pub fn reader_idle(&self) -> Option<Duration> {
        (self.reader_idle_seconds > 0).then(|| Duration::from_secs(self.reader_idle_seconds))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(port) = std::env::var("FRAMEGATE_PORT") {
            if let Ok(n) = port.parse() {
                self.port = n;
            }
        }

        if let Ok(framing) = std::env::var("FRAMEGATE_FRAMING") {
            if let Ok(mode) = framing.parse() {
                self.framing = mode;
            }
        }

        if let Ok(len) = std::env::var("FRAMEGATE_MAX_FRAME_LENGTH") {
            if let Ok(n) = len.parse() {
                self.max_frame_length = n;
            }
        }

        if let Ok(idle) = std::env::var("FRAMEGATE_READER_IDLE_SECONDS") {
            if let Ok(secs) = idle.parse() {
                self.reader_idle_seconds = secs;
            }
        }

        if let Ok(respond) = std::env::var("FRAMEGATE_RESPOND_ENABLED") {
            self.respond_enabled = respond == "1" || respond.to_lowercase() == "true";
        }
    }
}

/// Framing regime for a connection's inbound byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FramingMode {
    /// Detect JSON or Modbus RTU per connection, best effort.
    Auto,
    /// No framing: chunks reach the binary sink as they arrive.
    Raw,
    /// 4-byte big-endian length field plus payload.
    LengthField,
    /// Concatenated JSON values, boundaries found by the stream extractor.
    JsonObject,
    /// One message per LF/CRLF-terminated line.
    Line,
    /// Modbus RTU frames validated by CRC16.
    ModbusRtu,
}

impl FromStr for FramingMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(FramingMode::Auto),
            "raw" => Ok(FramingMode::Raw),
            "length-field" => Ok(FramingMode::LengthField),
            "json-object" => Ok(FramingMode::JsonObject),
            "line" => Ok(FramingMode::Line),
            "modbus-rtu" => Ok(FramingMode::ModbusRtu),
            other => Err(ConfigError::UnknownFraming(other.to_string())),
        }
    }
}

impl Config {
    /// Loads configuration from file (when `FRAMEGATE_CONFIG` is set), then
    /// applies environment variable overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var("FRAMEGATE_CONFIG") {
            Ok(path) => Self::from_file(&path)?,
            Err(_) => Self::default(),
        };
        config.tcp.apply_env_overrides();
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::Parse(path.to_path_buf(), e.to_string()))
    }
}

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{0}': {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("failed to parse config file '{0}': {1}")]
    Parse(PathBuf, String),

    #[error("unknown framing mode: '{0}'")]
    UnknownFraming(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.tcp.port, 9000);
        assert_eq!(config.tcp.framing, FramingMode::LengthField);
        assert_eq!(config.tcp.max_frame_length, 1024 * 1024);
        assert_eq!(config.tcp.reader_idle(), Some(Duration::from_secs(60)));
        assert!(config.tcp.respond_enabled);
    }

    #[test]
    fn test_zero_idle_disables_timeout() {
        let config = TcpConfig {
            reader_idle_seconds: 0,
            ..Default::default()
        };
        assert_eq!(config.reader_idle(), None);
    }

    #[test]
    fn test_from_file_kebab_case_keys() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "tcp:\n  port: 0\n  framing: modbus-rtu\n  max-frame-length: 4096\n  reader-idle-seconds: 5\n  respond-enabled: false"
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.tcp.port, 0);
        assert_eq!(config.tcp.framing, FramingMode::ModbusRtu);
        assert_eq!(config.tcp.max_frame_length, 4096);
        assert_eq!(config.tcp.reader_idle_seconds, 5);
        assert!(!config.tcp.respond_enabled);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "tcp:\n  framing: auto").unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.tcp.framing, FramingMode::Auto);
        assert_eq!(config.tcp.port, 9000);
    }

    #[test]
    fn test_framing_from_str() {
        assert_eq!(
            "length-field".parse::<FramingMode>().unwrap(),
            FramingMode::LengthField
        );
        assert_eq!(
            "JSON-OBJECT".parse::<FramingMode>().unwrap(),
            FramingMode::JsonObject
        );
        assert!("netstring".parse::<FramingMode>().is_err());
    }

    #[test]
    fn test_yaml_roundtrip() {
        let config = Config::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        assert!(yaml.contains("length-field"));
        assert!(yaml.contains("max-frame-length"));

        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.tcp.framing, config.tcp.framing);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(matches!(
            Config::from_file("/nonexistent/framegate.yaml"),
            Err(ConfigError::Io(..))
        ));
    }
}
