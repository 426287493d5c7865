use std::fmt;
use std::path::PathBuf;

#[derive(Debug)]
pub enum ConfigError {
    IoError(std::io::Error),
    TomlError(String),
    InvalidValue(String),
    LoggerError(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {}", e),
            ConfigError::TomlError(e) => write!(f, "TOML parsing error: {}", e),
            ConfigError::InvalidValue(e) => write!(f, "Invalid configuration value: {}", e),
            ConfigError::LoggerError(e) => write!(f, "Logger setup error: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::IoError(err)
    }
}

/// Failures of the capture session lifecycle.
///
/// Every variant maps to one outcome of the boundary operations; the web
/// layer turns them into `{success: false, error}` payloads.
#[derive(Debug)]
pub enum CaptureError {
    /// Missing or malformed request input (interface name, filter logic).
    Validation(String),
    /// The scratch directory could not be created or made writable.
    Directory(std::io::Error),
    /// The capture process failed to launch.
    EngineStart(String),
    /// Unknown capture id or missing artifact file.
    NotFound(String),
    /// The request conflicts with the session's current state.
    Conflict(String),
    /// The capture process exited but left no artifact behind.
    ArtifactMissing(PathBuf),
    /// Termination needed a forced kill. Logged, never returned to callers.
    TimeoutForced,
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::Validation(e) => write!(f, "{}", e),
            CaptureError::Directory(e) => write!(f, "Cannot create capture directory: {}", e),
            CaptureError::EngineStart(e) => write!(f, "Failed to start capture: {}", e),
            CaptureError::NotFound(e) => write!(f, "{}", e),
            CaptureError::Conflict(e) => write!(f, "{}", e),
            CaptureError::ArtifactMissing(_) => write!(
                f,
                "Capture file not created. Try again or check tcpdump installation."
            ),
            CaptureError::TimeoutForced => {
                write!(f, "Capture process ignored SIGTERM and was killed")
            }
        }
    }
}

impl std::error::Error for CaptureError {}

/// Failures of the `ip`/`tc`/`iptables` glue.
#[derive(Debug)]
pub enum ControlError {
    SpawnFailed { command: String, source: std::io::Error },
    ParseError(String),
    Validation(Vec<String>),
    ToolUnavailable(String),
}

impl fmt::Display for ControlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlError::SpawnFailed { command, source } => {
                write!(f, "Failed to execute `{}`: {}", command, source)
            }
            ControlError::ParseError(e) => write!(f, "Unable to parse command output: {}", e),
            ControlError::Validation(errors) => write!(f, "{}", errors.join("; ")),
            ControlError::ToolUnavailable(e) => write!(f, "Required tool not available: {}", e),
        }
    }
}

impl std::error::Error for ControlError {}

#[derive(Debug)]
pub enum WebError {
    /// A blocking network-control task panicked or was cancelled.
    TaskFailed(String),
}

impl fmt::Display for WebError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WebError::TaskFailed(e) => write!(f, "Background task failed: {}", e),
        }
    }
}

impl std::error::Error for WebError {}
