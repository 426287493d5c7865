use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::capture_management::CaptureManager;
use crate::network_control::{InterfaceStatus, NetworkController, Notice, ToolAvailability};

/// Shared state handed to every route.
pub struct AppState {
    pub captures: Arc<CaptureManager>,
    pub network: Arc<NetworkController>,
    pub tools_column_disabled: bool,
}

/// Form with only an interface field (`/remove`).
#[derive(Debug, Default, Deserialize)]
pub struct InterfaceForm {
    pub interface: Option<String>,
}

/// `/apply` form. Blank fields keep the current value.
#[derive(Debug, Default, Deserialize)]
pub struct ApplyForm {
    pub interface: Option<String>,
    pub latency: Option<String>,
    pub loss: Option<String>,
    pub jitter: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AliasForm {
    pub interface: Option<String>,
    pub alias: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct NatForm {
    pub action: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StartCaptureForm {
    pub interface: Option<String>,
    #[serde(default)]
    pub host_filter: String,
    pub host_filter_logic: Option<String>,
    #[serde(default)]
    pub network_filter: String,
    pub network_filter_logic: Option<String>,
    #[serde(default)]
    pub port_filter: String,
    pub port_filter_logic: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DownloadQuery {
    pub file: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct NoticeResponse {
    pub success: bool,
    pub notices: Vec<Notice>,
}

impl NoticeResponse {
    /// Successful unless one of the notices is an error.
    pub fn from_notices(notices: Vec<Notice>) -> Self {
        Self {
            success: !notices.iter().any(Notice::is_error),
            notices,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StartCaptureResponse {
    pub success: bool,
    pub capture_id: Uuid,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct StopCaptureResponse {
    pub success: bool,
    pub capture_id: Uuid,
    pub file: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    pub hostname: String,
    pub tools: ToolAvailability,
    pub interfaces: Vec<InterfaceStatus>,
    pub notices: Vec<Notice>,
    pub tools_column_disabled: bool,
}
