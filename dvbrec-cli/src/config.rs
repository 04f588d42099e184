//! Configuration file and its merge with the command line.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use dvbrec::{ConfigError, DeviceConfig};
use log::LevelFilter;

use crate::context::Cli;

/// Config file picked up from the working directory when none is given.
pub(crate) const DEFAULT_CONFIG_FILE: &str = "dvbrec.toml";
const DEFAULT_ADAPTER: &str = "/dev/dvb/adapter0";
const DEFAULT_CHANNELS: &str = "channels.conf";
const DEFAULT_LOG_DIR: &str = "logs";
const DEFAULT_RETENTION_DAYS: u64 = 7;

/// Configuration file format.
#[derive(Debug, serde::Deserialize, Default)]
pub(crate) struct ConfigFile {
    #[serde(default)]
    pub device: DeviceSection,
    #[serde(default)]
    pub recording: RecordingSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

#[derive(Debug, serde::Deserialize, Default)]
pub(crate) struct DeviceSection {
    pub adapter: Option<String>,
    pub channels: Option<String>,
    pub ring_buffer_size: Option<usize>,
    pub read_size: Option<usize>,
    pub lock_timeout_ms: Option<u64>,
    pub settle_delay_ms: Option<u64>,
}

#[derive(Debug, serde::Deserialize, Default)]
pub(crate) struct RecordingSection {
    pub max_chunk_size: Option<u64>,
    pub remux: Option<bool>,
}

#[derive(Debug, serde::Deserialize, Default)]
pub(crate) struct LoggingSection {
    pub log_dir: Option<String>,
    pub retention_days: Option<u64>,
    pub level: Option<String>,
}

pub(crate) fn load_config(path: &Path) -> Result<ConfigFile, Box<dyn std::error::Error>> {
    let contents = std::fs::read_to_string(path)?;
    let config: ConfigFile = toml::from_str(&contents)?;
    Ok(config)
}

/// Explicit path > auto-detected `dvbrec.toml` > none.
pub(crate) fn config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    explicit.map(Path::to_path_buf).or_else(|| {
        let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
        default_path.exists().then_some(default_path)
    })
}

#[derive(Debug, Clone)]
pub(crate) struct LoggingConfig {
    pub dir: PathBuf,
    pub retention_days: u64,
    pub level: LevelFilter,
}

/// Everything the commands need, after merging.
#[derive(Debug, Clone)]
pub(crate) struct Settings {
    pub adapter: PathBuf,
    pub channels: PathBuf,
    pub device: DeviceConfig,
    pub max_chunk_size: u64,
    pub remux: bool,
    pub logging: LoggingConfig,
}

impl Settings {
    /// Merge the command line over the config file over the defaults.
    pub fn resolve(cli: &Cli, file: &ConfigFile) -> Result<Self, ConfigError> {
        let adapter = cli
            .adapter
            .clone()
            .or_else(|| file.device.adapter.as_deref().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_ADAPTER));
        if adapter.as_os_str().is_empty() {
            return Err(ConfigError::MissingAdapter);
        }
        let channels = cli
            .channels
            .clone()
            .or_else(|| file.device.channels.as_deref().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CHANNELS));

        let mut device = DeviceConfig::default();
        if let Some(size) = file.device.ring_buffer_size {
            device.ring_buffer_size = size;
        }
        if let Some(size) = file.device.read_size {
            device.read_size = size;
        }
        if let Some(ms) = file.device.lock_timeout_ms {
            device.tuner.lock_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = file.device.settle_delay_ms {
            device.tuner.settle_delay = Duration::from_millis(ms);
        }

        let (mut max_chunk_size, mut remux) = (
            file.recording.max_chunk_size.unwrap_or(0),
            file.recording.remux.unwrap_or(false),
        );
        if let crate::context::Commands::Record {
            max_chunk_size: Some(size),
            ..
        } = &cli.command
        {
            max_chunk_size = *size;
        }
        if let crate::context::Commands::Record { remux: true, .. } = &cli.command {
            remux = true;
        }

        let level = if cli.verbose {
            LevelFilter::Debug
        } else {
            match file.logging.level.as_deref().map(LevelFilter::from_str) {
                Some(Ok(level)) => level,
                Some(Err(_)) => {
                    eprintln!(
                        "Unknown log level {:?}, using info",
                        file.logging.level.as_deref().unwrap_or_default()
                    );
                    LevelFilter::Info
                }
                None => LevelFilter::Info,
            }
        };
        let logging = LoggingConfig {
            dir: cli
                .log_dir
                .clone()
                .or_else(|| file.logging.log_dir.as_deref().map(PathBuf::from))
                .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_DIR)),
            retention_days: cli
                .log_retention_days
                .or(file.logging.retention_days)
                .unwrap_or(DEFAULT_RETENTION_DAYS),
            level,
        };

        Ok(Self {
            adapter,
            channels,
            device,
            max_chunk_size,
            remux,
            logging,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;

    const SAMPLE: &str = r#"
[device]
adapter = "/dev/dvb/adapter2"
channels = "/etc/dvbrec/channels.conf"
lock_timeout_ms = 3000

[recording]
max_chunk_size = 1000000
remux = true

[logging]
log_dir = "/var/log/dvbrec"
retention_days = 3
level = "warn"
"#;

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["dvbrec"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_load_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.device.adapter.as_deref(), Some("/dev/dvb/adapter2"));
        assert_eq!(config.device.lock_timeout_ms, Some(3000));
        assert_eq!(config.recording.remux, Some(true));
        assert_eq!(config.logging.level.as_deref(), Some("warn"));
    }

    #[test]
    fn test_invalid_config_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"[device]\nadapter = 3\n").unwrap();
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::resolve(&cli(&["list"]), &ConfigFile::default()).unwrap();
        assert_eq!(settings.adapter, PathBuf::from(DEFAULT_ADAPTER));
        assert_eq!(settings.channels, PathBuf::from(DEFAULT_CHANNELS));
        assert_eq!(settings.logging.level, LevelFilter::Info);
        assert_eq!(settings.logging.retention_days, DEFAULT_RETENTION_DAYS);
        assert_eq!(settings.max_chunk_size, 0);
        assert!(!settings.remux);
    }

    #[test]
    fn test_file_values_used() {
        let file: ConfigFile = toml::from_str(SAMPLE).unwrap();
        let settings = Settings::resolve(&cli(&["list"]), &file).unwrap();
        assert_eq!(settings.adapter, PathBuf::from("/dev/dvb/adapter2"));
        assert_eq!(settings.device.tuner.lock_timeout, Duration::from_secs(3));
        assert_eq!(settings.max_chunk_size, 1_000_000);
        assert!(settings.remux);
        assert_eq!(settings.logging.dir, PathBuf::from("/var/log/dvbrec"));
        assert_eq!(settings.logging.level, LevelFilter::Warn);
    }

    #[test]
    fn test_command_line_takes_precedence() {
        let file: ConfigFile = toml::from_str(SAMPLE).unwrap();
        let settings = Settings::resolve(
            &cli(&[
                "-a",
                "/dev/dvb/adapter0",
                "-v",
                "--log-retention-days",
                "30",
                "record",
                "-c",
                "BBC1",
                "-o",
                "out.ts",
                "--max-chunk-size",
                "500",
            ]),
            &file,
        )
        .unwrap();
        assert_eq!(settings.adapter, PathBuf::from("/dev/dvb/adapter0"));
        assert_eq!(settings.channels, PathBuf::from("/etc/dvbrec/channels.conf"));
        assert_eq!(settings.max_chunk_size, 500);
        assert_eq!(settings.logging.level, LevelFilter::Debug);
        assert_eq!(settings.logging.retention_days, 30);
    }

    #[test]
    fn test_empty_adapter_rejected() {
        let file: ConfigFile = toml::from_str("[device]\nadapter = \"\"\n").unwrap();
        assert!(matches!(
            Settings::resolve(&cli(&["list"]), &file),
            Err(ConfigError::MissingAdapter)
        ));
    }
}
