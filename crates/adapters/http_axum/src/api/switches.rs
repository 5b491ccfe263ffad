//! JSON handlers for switches, their ports and terminals.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};

use remoteswitch_app::ports::SwitchDevice;
use remoteswitch_domain::error::{NotFoundError, SwitchError, ValidationError};
use remoteswitch_domain::switch::{Device, Port, Terminal};

use crate::error::ApiError;
use crate::state::AppState;

/// Possible responses from the list endpoint.
pub enum ListResponse {
    Ok(Json<BTreeMap<String, Device>>),
}

impl IntoResponse for ListResponse {
    fn into_response(self) -> Response {
        match self {
            Self::Ok(json) => json.into_response(),
        }
    }
}

/// Possible responses from the switch endpoint.
pub enum SwitchResponse {
    Ok(Json<Device>),
}

impl IntoResponse for SwitchResponse {
    fn into_response(self) -> Response {
        match self {
            Self::Ok(json) => json.into_response(),
        }
    }
}

/// Possible responses from the port endpoints.
pub enum PortResponse {
    Ok(Json<Port>),
}

impl IntoResponse for PortResponse {
    fn into_response(self) -> Response {
        match self {
            Self::Ok(json) => json.into_response(),
        }
    }
}

/// Possible responses from the terminal endpoints.
pub enum TerminalResponse {
    Ok(Json<Terminal>),
}

impl IntoResponse for TerminalResponse {
    fn into_response(self) -> Response {
        match self {
            Self::Ok(json) => json.into_response(),
        }
    }
}

fn lookup<D: SwitchDevice>(state: &AppState<D>, name: &str) -> Result<Arc<D>, ApiError> {
    state
        .hub
        .switch(name)
        .ok_or_else(|| SwitchError::from(NotFoundError::switch(name)).into())
}

fn terminal_of(port: &Port, name: &str) -> Result<Terminal, ApiError> {
    port.terminal(name)
        .cloned()
        .ok_or_else(|| SwitchError::from(NotFoundError::terminal(name)).into())
}

/// `GET /api/switches`
pub async fn list<D: SwitchDevice>(State(state): State<AppState<D>>) -> ListResponse {
    let switches = state
        .hub
        .switches()
        .iter()
        .map(|device| {
            let snapshot = device.serialize();
            (snapshot.name.clone(), snapshot)
        })
        .collect();
    ListResponse::Ok(Json(switches))
}

/// `GET /api/switch/{name}`
pub async fn get<D: SwitchDevice>(
    State(state): State<AppState<D>>,
    Path(name): Path<String>,
) -> Result<SwitchResponse, ApiError> {
    let device = lookup(&state, &name)?;
    Ok(SwitchResponse::Ok(Json(device.serialize())))
}

/// `GET /api/switch/{name}/port/{port}`
pub async fn get_port<D: SwitchDevice>(
    State(state): State<AppState<D>>,
    Path((name, port)): Path<(String, String)>,
) -> Result<PortResponse, ApiError> {
    let device = lookup(&state, &name)?;
    Ok(PortResponse::Ok(Json(device.get_port(&port)?)))
}

/// `PUT /api/switch/{name}/port/{port}`
///
/// Answers with the port as the switch reports it once the request was
/// applied. Switches that learn their state by polling may still show the
/// previous terminals.
pub async fn set_port<D: SwitchDevice>(
    State(state): State<AppState<D>>,
    Path((name, port)): Path<(String, String)>,
    Json(request): Json<Port>,
) -> Result<PortResponse, ApiError> {
    request.validate_request()?;
    if request.name != port {
        return Err(ValidationError::NameMismatch {
            expected: port,
            given: request.name,
        }
        .into());
    }
    let device = lookup(&state, &name)?;
    device.set_port(request).await?;
    Ok(PortResponse::Ok(Json(device.get_port(&port)?)))
}

/// `GET /api/switch/{name}/port/{port}/terminal/{terminal}`
pub async fn get_terminal<D: SwitchDevice>(
    State(state): State<AppState<D>>,
    Path((name, port, terminal)): Path<(String, String, String)>,
) -> Result<TerminalResponse, ApiError> {
    let device = lookup(&state, &name)?;
    let port = device.get_port(&port)?;
    Ok(TerminalResponse::Ok(Json(terminal_of(&port, &terminal)?)))
}

/// `PUT /api/switch/{name}/port/{port}/terminal/{terminal}`
pub async fn set_terminal<D: SwitchDevice>(
    State(state): State<AppState<D>>,
    Path((name, port, terminal)): Path<(String, String, String)>,
    Json(request): Json<Terminal>,
) -> Result<TerminalResponse, ApiError> {
    if request.name.is_empty() {
        return Err(ValidationError::EmptyName.into());
    }
    if request.name != terminal {
        return Err(ValidationError::NameMismatch {
            expected: terminal,
            given: request.name,
        }
        .into());
    }
    let device = lookup(&state, &name)?;
    // unknown terminals are reported as missing rather than as a bad request
    terminal_of(&device.get_port(&port)?, &terminal)?;
    device
        .set_port(Port::request(
            port.clone(),
            vec![Terminal::request(terminal.clone(), request.state)],
        ))
        .await?;
    let port = device.get_port(&port)?;
    Ok(TerminalResponse::Ok(Json(terminal_of(&port, &terminal)?)))
}
