//! Value types shared by the network control operations.

use serde::{Deserialize, Serialize};

pub const DEFAULT_LATENCY: &str = "0ms";
pub const DEFAULT_LOSS: &str = "0%";
pub const DEFAULT_JITTER: &str = "0ms";

/// Severity of a [`Notice`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Success,
    Error,
    Info,
}

/// User-facing outcome message returned by the HTTP layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.level == NoticeLevel::Error
    }
}

/// Current netem parameters of one interface, as reported by `tc`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetemSettings {
    pub latency: String,
    pub loss: String,
    pub jitter: String,
}

impl Default for NetemSettings {
    fn default() -> Self {
        Self {
            latency: DEFAULT_LATENCY.to_string(),
            loss: DEFAULT_LOSS.to_string(),
            jitter: DEFAULT_JITTER.to_string(),
        }
    }
}

/// Requested netem changes after validation. `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetemRequest {
    /// Whole number of milliseconds, without unit.
    pub latency: Option<String>,
    /// Whole percentage, without `%`.
    pub loss: Option<String>,
    /// Whole number of milliseconds, without unit.
    pub jitter: Option<String>,
}

/// One row of the dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InterfaceStatus {
    pub name: String,
    pub alias: String,
    pub ip: String,
    pub latency: String,
    pub loss: String,
    pub jitter: String,
    pub nat_enabled: bool,
}

/// Which external tools were found on `PATH`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ToolAvailability {
    pub tcpdump: bool,
    pub tc: bool,
    pub ip: bool,
    pub iptables: bool,
}

/// Exit status and captured output of one external command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the process was killed by a signal.
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}
