use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use serde::Deserialize;

use river_types::api::AddChannelOptionRequest;

use crate::AppState;
use crate::error::ApiError;
use crate::middleware::Viewer;
use crate::rivers::owner_gated;

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub active_only: bool,
}

pub async fn list_channels(
    State(state): State<AppState>,
    Path(river_id): Path<i64>,
    Query(params): Query<ListParams>,
    Extension(viewer): Extension<Viewer>,
) -> Result<impl IntoResponse, ApiError> {
    owner_gated(&state, river_id, &viewer)?;
    Ok(Json(state.channels.get_channels(river_id, params.active_only)?))
}

#[derive(Debug, Deserialize)]
pub struct AddChannelRequest {
    pub channel: String,
}

/// Get-or-create for a channel key: an existing filter is returned as-is, a
/// missing one is created enabled.
pub async fn get_or_create_channel(
    State(state): State<AppState>,
    Path(river_id): Path<i64>,
    Extension(viewer): Extension<Viewer>,
    Json(req): Json<AddChannelRequest>,
) -> Result<impl IntoResponse, ApiError> {
    owner_gated(&state, river_id, &viewer)?;
    let (status, filter) = match state.channels.find_channel(river_id, &req.channel)? {
        Some(existing) => (StatusCode::OK, existing),
        None => (
            StatusCode::CREATED,
            state.channels.create_channel(river_id, &req.channel)?,
        ),
    };
    Ok((status, Json(filter)))
}

#[derive(Debug, Deserialize)]
pub struct SetEnabledRequest {
    pub enabled: bool,
}

pub async fn set_channel_enabled(
    State(state): State<AppState>,
    Path((river_id, channel_id)): Path<(i64, i64)>,
    Extension(viewer): Extension<Viewer>,
    Json(req): Json<SetEnabledRequest>,
) -> Result<impl IntoResponse, ApiError> {
    owner_gated(&state, river_id, &viewer)?;
    state.channels.set_enabled(river_id, channel_id, req.enabled)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn add_channel_option(
    State(state): State<AppState>,
    Path((river_id, channel_id)): Path<(i64, i64)>,
    Extension(viewer): Extension<Viewer>,
    Json(req): Json<AddChannelOptionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    owner_gated(&state, river_id, &viewer)?;
    let option = state
        .channels
        .add_option(river_id, channel_id, &req.key, &req.value)?;
    Ok((StatusCode::CREATED, Json(option)))
}

pub async fn remove_channel_option(
    State(state): State<AppState>,
    Path((river_id, channel_id, option_id)): Path<(i64, i64, i64)>,
    Extension(viewer): Extension<Viewer>,
) -> Result<impl IntoResponse, ApiError> {
    owner_gated(&state, river_id, &viewer)?;
    state.channels.remove_option(river_id, channel_id, option_id)?;
    Ok(StatusCode::NO_CONTENT)
}
