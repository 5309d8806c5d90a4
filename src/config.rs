use crate::controller::DEFAULT_REFRESH_INTERVAL;
use crate::model::Variant;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub listen: String,
    #[serde(default = "default_variant")]
    pub variant: Variant,
    /// Telemetry command argv; falls back to the variant's bundled monitor.
    #[serde(default)]
    pub command: Option<Vec<String>>,
    #[serde(
        default = "default_refresh_interval",
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub refresh_interval: Duration,
    #[serde(default = "default_refresh_on_start")]
    pub refresh_on_start: bool,
    #[serde(default)]
    pub auto_refresh_on_start: bool,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse YAML in {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },
    #[error("invalid configuration: {0}")]
    Validation(String),
}

impl Config {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let path_display = path_ref.display().to_string();
        let text = fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
            path: path_display.clone(),
            source,
        })?;

        let cfg: Config = serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path_display,
            source,
        })?;

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.listen.trim().is_empty() {
            return Err(ConfigError::Validation("listen is required".to_string()));
        }
        if SocketAddr::from_str(&self.listen).is_err() {
            return Err(ConfigError::Validation(
                "listen must be a valid host:port address".to_string(),
            ));
        }
        if self.refresh_interval < Duration::from_secs(1) {
            return Err(ConfigError::Validation(
                "refresh_interval must be at least 1s".to_string(),
            ));
        }
        if let Some(command) = &self.command {
            match command.first() {
                None => {
                    return Err(ConfigError::Validation(
                        "command must not be empty".to_string(),
                    ))
                }
                Some(program) if program.trim().is_empty() => {
                    return Err(ConfigError::Validation(
                        "command[0] must name a program".to_string(),
                    ))
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    pub fn command_argv(&self) -> Vec<String> {
        match &self.command {
            Some(argv) => argv.clone(),
            None => self
                .variant
                .profile()
                .default_command
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }

    pub fn example_yaml() -> &'static str {
        include_str!("../config.yaml.example")
    }
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
}

fn serialize_duration<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&humantime::format_duration(*value).to_string())
}

const fn default_variant() -> Variant {
    Variant::Bridges
}

const fn default_refresh_interval() -> Duration {
    DEFAULT_REFRESH_INTERVAL
}

const fn default_refresh_on_start() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        Config {
            listen: "127.0.0.1:9190".to_string(),
            variant: Variant::Bridges,
            command: None,
            refresh_interval: Duration::from_secs(30),
            refresh_on_start: true,
            auto_refresh_on_start: false,
        }
    }

    #[test]
    fn minimal_yaml_takes_defaults() {
        let cfg: Config = serde_yaml::from_str("listen: \"127.0.0.1:9190\"\n").expect("parse");
        cfg.validate().expect("valid");
        assert_eq!(cfg.variant, Variant::Bridges);
        assert_eq!(cfg.refresh_interval, Duration::from_millis(30_000));
        assert!(cfg.refresh_on_start);
        assert!(!cfg.auto_refresh_on_start);
        assert_eq!(
            cfg.command_argv(),
            ["/usr/bin/python3", "/usr/local/bin/bridge_monitor.py", "--json"]
        );
    }

    #[test]
    fn vm_variant_uses_vm_monitor() {
        let cfg: Config =
            serde_yaml::from_str("listen: \"127.0.0.1:9190\"\nvariant: vms\nrefresh_interval: 1m\n")
                .expect("parse");
        assert_eq!(cfg.refresh_interval, Duration::from_secs(60));
        assert_eq!(cfg.command_argv()[1], "/usr/local/bin/nexus9000v_monitor.py");
    }

    #[test]
    fn example_config_is_valid() {
        let cfg: Config = serde_yaml::from_str(Config::example_yaml()).expect("parse example");
        cfg.validate().expect("example should validate");
    }

    #[test]
    fn example_config_follows_variant_override() {
        let mut cfg: Config = serde_yaml::from_str(Config::example_yaml()).expect("parse example");
        assert_eq!(cfg.command, None);
        assert_eq!(cfg.command_argv()[1], "/usr/local/bin/bridge_monitor.py");

        cfg.variant = Variant::Vms;
        assert_eq!(
            cfg.command_argv(),
            ["/usr/bin/python3", "/usr/local/bin/nexus9000v_monitor.py", "--json"]
        );
    }

    #[test]
    fn rejects_bad_values() {
        let mut cfg = valid_config();
        cfg.listen = "not-an-address".to_string();
        assert!(matches!(cfg.validate(), Err(ConfigError::Validation(_))));

        let mut cfg = valid_config();
        cfg.refresh_interval = Duration::from_millis(500);
        assert!(matches!(cfg.validate(), Err(ConfigError::Validation(_))));

        let mut cfg = valid_config();
        cfg.command = Some(vec![]);
        assert!(matches!(cfg.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn bad_interval_is_parse_error() {
        let res: Result<Config, _> =
            serde_yaml::from_str("listen: \"127.0.0.1:9190\"\nrefresh_interval: soon\n");
        assert!(res.is_err());
    }
}
