use std::fs::OpenOptions;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser};
use log::info;

use super::types::LabelsFile;
use crate::error_handling::types::ConfigError;
use crate::network_control::labels::MemoryLabels;

/// Runtime configuration of the control panel.
///
/// Every option can be given on the command line; the network and UI
/// options also fall back to environment variables. Interface aliases and
/// the ignore list come from an optional TOML file (see [`LabelsFile`]).
///
/// # Examples
///
/// ```ignore
/// let config = Config::try_parse_from(["hyyperwan", "--port", "9000"])?;
/// assert_eq!(config.socket_addr().port(), 9000);
/// ```
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(name = "hyyperwan")]
#[command(version)]
#[command(about = "Network emulation, NAT and packet capture control panel")]
pub struct Config {
    /// Address the HTTP server binds to.
    #[arg(long, env = "HYYPERWAN_BIND", default_value = "0.0.0.0")]
    pub bind_address: IpAddr,

    /// Port the HTTP server listens on.
    #[arg(long, env = "HYYPERWAN_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Directory holding capture artifacts. Removed at shutdown.
    #[arg(long, default_value = "/tmp/hyyperwan_pcaps")]
    pub scratch_dir: PathBuf,

    /// Seconds a downloaded capture stays on disk before deletion.
    #[arg(long, default_value_t = 30)]
    pub cleanup_delay_secs: u64,

    /// Run `tc`, `tcpdump` and `iptables` without the `sudo` prefix.
    #[arg(long, action = ArgAction::SetTrue)]
    pub no_sudo: bool,

    /// Tell the dashboard to hide the tool availability column.
    #[arg(long, env = "DISABLE_TOOLS_COLUMN", action = ArgAction::SetTrue)]
    pub disable_tools_column: bool,

    /// Write logs to this file instead of stderr.
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// TOML file with interface aliases and ignored interfaces.
    #[arg(long)]
    pub labels_file: Option<PathBuf>,
}

impl Config {
    /// Parses the process arguments and validates them.
    pub fn from_args() -> Result<Self, ConfigError> {
        let config = Config::parse();
        config.validate()?;
        Ok(config)
    }

    /// The scratch directory is deleted recursively at shutdown, so it has
    /// to be an absolute path below the root.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.scratch_dir.is_absolute() {
            return Err(ConfigError::InvalidValue(format!(
                "scratch directory must be absolute: {}",
                self.scratch_dir.display()
            )));
        }
        if self.scratch_dir.parent().is_none() {
            return Err(ConfigError::InvalidValue(
                "scratch directory cannot be the filesystem root".to_string(),
            ));
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }

    pub fn cleanup_delay(&self) -> Duration {
        Duration::from_secs(self.cleanup_delay_secs)
    }

    pub fn use_sudo(&self) -> bool {
        !self.no_sudo
    }

    /// Label store seeded from `--labels-file`, or the defaults.
    pub fn labels(&self) -> Result<MemoryLabels, ConfigError> {
        match &self.labels_file {
            Some(path) => {
                info!("Loading interface labels from {}", path.display());
                Ok(LabelsFile::load(path)?.into_labels())
            }
            None => Ok(MemoryLabels::with_defaults()),
        }
    }

    /// Initializes `env_logger` at `info` unless `RUST_LOG` says otherwise.
    pub fn init_logger(&self) -> Result<(), ConfigError> {
        let mut builder = env_logger::Builder::from_env(
            env_logger::Env::default().default_filter_or("info"),
        );
        builder.format_target(false);

        if let Some(path) = &self.log_file {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| {
                    ConfigError::LoggerError(format!("cannot open {}: {}", path.display(), e))
                })?;
            builder.target(env_logger::Target::Pipe(Box::new(file)));
        }

        builder
            .try_init()
            .map_err(|e| ConfigError::LoggerError(e.to_string()))
    }
}
