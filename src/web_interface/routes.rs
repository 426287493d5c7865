use std::convert::Infallible;
use std::sync::Arc;

use log::{error, info};
use serde::Serialize;
use warp::http::StatusCode;
use warp::reply::{self, Response};
use warp::{Filter, Rejection, Reply};

use super::types::{
    AliasForm, AppState, ApplyForm, DashboardResponse, DownloadQuery, ErrorResponse,
    InterfaceForm, NatForm, NoticeResponse, StartCaptureForm, StartCaptureResponse,
    StopCaptureResponse,
};
use crate::capture_management::filter::{CaptureFilter, FilterClause, FilterLogic};
use crate::capture_management::types::PCAP_MIME_TYPE;
use crate::error_handling::types::{CaptureError, WebError};
use crate::network_control::environment::hostname;
use crate::network_control::{Notice, ToolAvailability};

/// HTTP status for a failed capture operation.
pub fn capture_status(err: &CaptureError) -> StatusCode {
    match err {
        CaptureError::Validation(_) => StatusCode::BAD_REQUEST,
        CaptureError::NotFound(_) => StatusCode::NOT_FOUND,
        CaptureError::Conflict(_) => StatusCode::CONFLICT,
        CaptureError::Directory(_)
        | CaptureError::EngineStart(_)
        | CaptureError::ArtifactMissing(_)
        | CaptureError::TimeoutForced => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// The dashboard submits `"eth0 (alias)"`; only the part before the first space is the name.
pub fn interface_name(raw: Option<&str>) -> Option<String> {
    raw.and_then(|r| r.trim().split(' ').next())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}

fn json_status<T: Serialize>(body: &T, status: StatusCode) -> Response {
    reply::with_status(reply::json(body), status).into_response()
}

fn capture_error(err: CaptureError) -> Response {
    json_status(&ErrorResponse::new(err.to_string()), capture_status(&err))
}

fn missing_interface() -> Response {
    json_status(
        &NoticeResponse::from_notices(vec![Notice::error("No interface selected")]),
        StatusCode::BAD_REQUEST,
    )
}

async fn run_blocking<F, T>(task: F) -> Result<T, WebError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| WebError::TaskFailed(e.to_string()))
}

fn notices_reply(result: Result<Vec<Notice>, WebError>) -> Response {
    match result {
        Ok(notices) => json_status(&NoticeResponse::from_notices(notices), StatusCode::OK),
        Err(e) => {
            error!("Network operation failed: {}", e);
            json_status(
                &NoticeResponse::from_notices(vec![Notice::error(format!(
                    "An unexpected error occurred: {}",
                    e
                ))]),
                StatusCode::INTERNAL_SERVER_ERROR,
            )
        }
    }
}

fn with_state(
    state: Arc<AppState>,
) -> impl Filter<Extract = (Arc<AppState>,), Error = Infallible> + Clone {
    warp::any().map(move || Arc::clone(&state))
}

/// GET /
pub async fn dashboard(state: Arc<AppState>) -> Response {
    let tools_column_disabled = state.tools_column_disabled;
    let network = Arc::clone(&state.network);
    let result = run_blocking(move || {
        let tools = network.tools();
        let (interfaces, notices) = if tools.ip {
            network.list_interfaces()
        } else {
            (Vec::new(), Vec::new())
        };
        (tools, interfaces, notices)
    })
    .await;

    match result {
        Ok((tools, interfaces, notices)) => json_status(
            &DashboardResponse {
                hostname: hostname(),
                tools,
                interfaces,
                notices,
                tools_column_disabled,
            },
            StatusCode::OK,
        ),
        Err(e) => {
            error!("Error in index route: {}", e);
            json_status(
                &DashboardResponse {
                    hostname: "Unknown".to_string(),
                    tools: ToolAvailability::default(),
                    interfaces: Vec::new(),
                    notices: vec![Notice::error("An error occurred while loading the page")],
                    tools_column_disabled: false,
                },
                StatusCode::INTERNAL_SERVER_ERROR,
            )
        }
    }
}

/// POST /apply
pub async fn apply(state: Arc<AppState>, form: ApplyForm) -> Response {
    let Some(interface) = interface_name(form.interface.as_deref()) else {
        return missing_interface();
    };
    let network = Arc::clone(&state.network);
    notices_reply(
        run_blocking(move || {
            network.apply(
                &interface,
                form.latency.as_deref(),
                form.loss.as_deref(),
                form.jitter.as_deref(),
            )
        })
        .await,
    )
}

/// POST /remove
pub async fn remove(state: Arc<AppState>, form: InterfaceForm) -> Response {
    let Some(interface) = interface_name(form.interface.as_deref()) else {
        return missing_interface();
    };
    let network = Arc::clone(&state.network);
    notices_reply(run_blocking(move || network.remove(&interface)).await)
}

/// POST /reset_all
pub async fn reset_all(state: Arc<AppState>) -> Response {
    let network = Arc::clone(&state.network);
    notices_reply(run_blocking(move || network.reset_all()).await)
}

/// POST /update_alias
pub async fn update_alias(state: Arc<AppState>, form: AliasForm) -> Response {
    let (Some(interface), Some(alias)) = (form.interface, form.alias) else {
        return json_status(
            &NoticeResponse::from_notices(vec![Notice::error("Missing interface name or alias")]),
            StatusCode::BAD_REQUEST,
        );
    };
    notices_reply(Ok(state.network.update_alias(&interface, &alias)))
}

/// POST /toggle_nat/{interface}
pub async fn toggle_nat(interface: String, state: Arc<AppState>, form: NatForm) -> Response {
    let network = Arc::clone(&state.network);
    notices_reply(
        run_blocking(move || network.toggle_nat(&interface, form.action.as_deref())).await,
    )
}

fn capture_filter(form: &StartCaptureForm) -> Result<CaptureFilter, CaptureError> {
    Ok(CaptureFilter {
        hosts: FilterClause::from_csv(
            &form.host_filter,
            FilterLogic::from_form(form.host_filter_logic.as_deref())?,
        ),
        networks: FilterClause::from_csv(
            &form.network_filter,
            FilterLogic::from_form(form.network_filter_logic.as_deref())?,
        ),
        ports: FilterClause::from_csv(
            &form.port_filter,
            FilterLogic::from_form(form.port_filter_logic.as_deref())?,
        ),
    })
}

/// POST /start_capture
pub async fn start_capture(state: Arc<AppState>, form: StartCaptureForm) -> Response {
    let interface = interface_name(form.interface.as_deref()).unwrap_or_default();
    let started = capture_filter(&form)
        .and_then(|filter| state.captures.start_capture(&interface, &filter));

    match started {
        Ok(started) => json_status(
            &StartCaptureResponse {
                success: true,
                capture_id: started.capture_id,
                message: format!("Capture started on {}", started.display_name),
            },
            StatusCode::OK,
        ),
        Err(e) => {
            error!("Error starting packet capture: {}", e);
            capture_error(e)
        }
    }
}

/// POST /stop_capture/{id}
pub async fn stop_capture(capture_id: String, state: Arc<AppState>) -> Response {
    match state.captures.stop_capture(&capture_id).await {
        Ok(stopped) => json_status(
            &StopCaptureResponse {
                success: true,
                capture_id: stopped.capture_id,
                file: stopped.file_name,
                message: format!("Capture stopped on {}", stopped.display_name),
            },
            StatusCode::OK,
        ),
        Err(e) => capture_error(e),
    }
}

/// GET /download_capture/{id}?file=
pub async fn download_capture(
    capture_id: String,
    state: Arc<AppState>,
    query: DownloadQuery,
) -> Response {
    match state
        .captures
        .download_capture(&capture_id, query.file.as_deref())
        .await
    {
        Ok(capture) => {
            info!(
                "Serving {} ({} bytes)",
                capture.file_name,
                capture.contents.len()
            );
            let disposition = format!("attachment; filename=\"{}\"", capture.file_name);
            reply::with_header(
                reply::with_header(capture.contents, "Content-Type", PCAP_MIME_TYPE),
                "Content-Disposition",
                disposition,
            )
            .into_response()
        }
        Err(e) => capture_error(e),
    }
}

/// GET /captures
pub async fn list_captures(state: Arc<AppState>) -> Response {
    json_status(&state.captures.list_captures(), StatusCode::OK)
}

/// All routes of the panel.
pub fn routes(state: Arc<AppState>) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    let dashboard_route = warp::path::end()
        .and(warp::get())
        .and(with_state(state.clone()))
        .then(dashboard);

    let apply_route = warp::path!("apply")
        .and(warp::post())
        .and(with_state(state.clone()))
        .and(warp::body::form())
        .then(apply);

    let remove_route = warp::path!("remove")
        .and(warp::post())
        .and(with_state(state.clone()))
        .and(warp::body::form())
        .then(remove);

    let reset_all_route = warp::path!("reset_all")
        .and(warp::post())
        .and(with_state(state.clone()))
        .then(reset_all);

    let update_alias_route = warp::path!("update_alias")
        .and(warp::post())
        .and(with_state(state.clone()))
        .and(warp::body::form())
        .then(update_alias);

    let toggle_nat_route = warp::path!("toggle_nat" / String)
        .and(warp::post())
        .and(with_state(state.clone()))
        .and(warp::body::form())
        .then(toggle_nat);

    let start_capture_route = warp::path!("start_capture")
        .and(warp::post())
        .and(with_state(state.clone()))
        .and(warp::body::form())
        .then(start_capture);

    let stop_capture_route = warp::path!("stop_capture" / String)
        .and(warp::post())
        .and(with_state(state.clone()))
        .then(stop_capture);

    let download_capture_route = warp::path!("download_capture" / String)
        .and(warp::get())
        .and(with_state(state.clone()))
        .and(warp::query::<DownloadQuery>())
        .then(download_capture);

    let list_captures_route = warp::path!("captures")
        .and(warp::get())
        .and(with_state(state))
        .then(list_captures);

    dashboard_route
        .or(apply_route)
        .or(remove_route)
        .or(reset_all_route)
        .or(update_alias_route)
        .or(toggle_nat_route)
        .or(start_capture_route)
        .or(stop_capture_route)
        .or(download_capture_route)
        .or(list_captures_route)
}
