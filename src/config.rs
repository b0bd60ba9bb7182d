use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Deserialize;

pub const DEFAULT_HOST: &str = "http://192.168.4.1";
pub const DEFAULT_INTERVAL_MS: u64 = 300;
pub const MIN_INTERVAL_MS: u64 = 200;
pub const MAX_INTERVAL_MS: u64 = 300;
pub const DEFAULT_TIMEOUT_MS: u64 = 1000;
pub const DEFAULT_TRACKS: usize = 8;
pub const DEFAULT_LOG_FILE: &str = "red808-remote.log";

#[derive(Parser, Debug)]
#[command(
    name = "red808-remote",
    version,
    about = "Terminal control panel for the RED808 drum machine"
)]
pub struct Cli {
    /// Device address
    #[arg(long, value_name = "URL", help = "Device address [default: http://192.168.4.1]")]
    pub host: Option<String>,

    /// Status poll interval, clamped to 200-300 ms
    #[arg(long, value_name = "MS")]
    pub interval: Option<u64>,

    /// Track count of the device variant (8 or 16)
    #[arg(long, value_name = "N")]
    pub tracks: Option<usize>,

    /// Per-request timeout
    #[arg(long, value_name = "MS")]
    pub timeout: Option<u64>,

    /// Retry transient failures this many times (default: never)
    #[arg(long, value_name = "N")]
    pub retries: Option<u32>,

    /// JSON file with defaults for the options above
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[arg(long = "log-file", value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Mode>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    /// Interactive panel (default)
    Panel,
    /// Print the device status once as JSON
    Status,
    /// Query the WiFi access point, or switch it on/off
    Wifi {
        #[arg(value_enum)]
        state: Option<Switch>,
    },
    /// Set the tempo once
    Tempo { bpm: u16 },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Switch {
    On,
    Off,
}

/// Optional config file; every key may be omitted.
#[derive(Deserialize, Debug, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub host:        Option<String>,
    pub interval_ms: Option<u64>,
    pub tracks:      Option<usize>,
    pub timeout_ms:  Option<u64>,
    pub retries:     Option<u32>,
    pub log_file:    Option<PathBuf>,
}

impl FileConfig {
    pub fn read(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }
}

/// Effective settings: flags, then the config file, then defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub host:     String,
    pub interval: Duration,
    pub tracks:   usize,
    pub timeout:  Duration,
    pub retries:  u32,
    pub log_file: PathBuf,
    pub mode:     Mode,
}

impl Config {
    pub fn load(cli: Cli) -> Result<Self> {
        let file = match &cli.config {
            Some(path) => FileConfig::read(path)?,
            None => FileConfig::default(),
        };
        Self::resolve(cli, file)
    }

    pub fn resolve(cli: Cli, file: FileConfig) -> Result<Self> {
        let tracks = cli.tracks.or(file.tracks).unwrap_or(DEFAULT_TRACKS);
        if tracks != 8 && tracks != 16 {
            bail!("tracks must be 8 or 16, got {}", tracks);
        }
        let interval = cli.interval.or(file.interval_ms).unwrap_or(DEFAULT_INTERVAL_MS)
            .clamp(MIN_INTERVAL_MS, MAX_INTERVAL_MS);
        let timeout = cli.timeout.or(file.timeout_ms).unwrap_or(DEFAULT_TIMEOUT_MS);
        if timeout == 0 {
            bail!("timeout must be greater than zero");
        }

        Ok(Self {
            host:     cli.host.or(file.host).unwrap_or_else(|| DEFAULT_HOST.to_string()),
            interval: Duration::from_millis(interval),
            tracks,
            timeout:  Duration::from_millis(timeout),
            retries:  cli.retries.or(file.retries).unwrap_or(0),
            log_file: cli.log_file.or(file.log_file).unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_FILE)),
            mode:     cli.command.unwrap_or(Mode::Panel),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("red808-remote").chain(args.iter().copied()))
    }

    #[test]
    fn defaults() {
        let config = Config::resolve(cli(&[]), FileConfig::default()).unwrap();
        assert_eq!(config.host, DEFAULT_HOST);
        assert_eq!(config.interval, Duration::from_millis(300));
        assert_eq!(config.tracks, 8);
        assert_eq!(config.timeout, Duration::from_millis(1000));
        assert_eq!(config.retries, 0);
        assert_eq!(config.log_file, PathBuf::from("red808-remote.log"));
        assert_eq!(config.mode, Mode::Panel);
    }

    #[test]
    fn flags_override_the_file() {
        let file: FileConfig =
            serde_json::from_str(r#"{"host": "10.0.0.8", "tracks": 16, "retries": 2}"#).unwrap();
        let config = Config::resolve(cli(&["--host", "red808.local", "--retries", "1"]), file).unwrap();
        assert_eq!(config.host, "red808.local");
        assert_eq!(config.tracks, 16);
        assert_eq!(config.retries, 1);
    }

    #[test]
    fn interval_is_clamped() {
        let fast = Config::resolve(cli(&["--interval", "50"]), FileConfig::default()).unwrap();
        let slow = Config::resolve(cli(&["--interval", "5000"]), FileConfig::default()).unwrap();
        assert_eq!(fast.interval, Duration::from_millis(200));
        assert_eq!(slow.interval, Duration::from_millis(300));
    }

    #[test]
    fn bad_values_are_rejected() {
        assert!(Config::resolve(cli(&["--tracks", "12"]), FileConfig::default()).is_err());
        assert!(Config::resolve(cli(&["--timeout", "0"]), FileConfig::default()).is_err());
        assert!(serde_json::from_str::<FileConfig>(r#"{"colour": "red"}"#).is_err());
    }

    #[test]
    fn subcommands() {
        let wifi = Config::resolve(cli(&["wifi", "off"]), FileConfig::default()).unwrap();
        assert_eq!(wifi.mode, Mode::Wifi { state: Some(Switch::Off) });
        let query = Config::resolve(cli(&["wifi"]), FileConfig::default()).unwrap();
        assert_eq!(query.mode, Mode::Wifi { state: None });
        let tempo = Config::resolve(cli(&["--host", "x", "tempo", "132"]), FileConfig::default()).unwrap();
        assert_eq!(tempo.mode, Mode::Tempo { bpm: 132 });
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let err = Config::load(cli(&["--config", "/nonexistent/red808.json"])).unwrap_err();
        assert!(err.to_string().contains("reading config"));
    }
}
