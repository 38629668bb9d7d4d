use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use serde::Deserialize;

use crate::AppState;
use crate::error::ApiError;
use crate::middleware::Viewer;
use crate::rivers::{ensure_can_view, owner_gated};

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub active_only: bool,
}

pub async fn list_collaborators(
    State(state): State<AppState>,
    Path(river_id): Path<i64>,
    Query(params): Query<ListParams>,
    Extension(viewer): Extension<Viewer>,
) -> Result<impl IntoResponse, ApiError> {
    owner_gated(&state, river_id, &viewer)?;
    Ok(Json(state.rivers.collaborators(river_id, params.active_only)?))
}

#[derive(Debug, Default, Deserialize)]
pub struct AddCollaboratorRequest {
    #[serde(default)]
    pub read_only: bool,
}

pub async fn add_collaborator(
    State(state): State<AppState>,
    Path((river_id, user_id)): Path<(i64, i64)>,
    Extension(viewer): Extension<Viewer>,
    Json(req): Json<AddCollaboratorRequest>,
) -> Result<impl IntoResponse, ApiError> {
    owner_gated(&state, river_id, &viewer)?;
    state.rivers.add_collaborator(river_id, user_id, req.read_only)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn remove_collaborator(
    State(state): State<AppState>,
    Path((river_id, user_id)): Path<(i64, i64)>,
    Extension(viewer): Extension<Viewer>,
) -> Result<impl IntoResponse, ApiError> {
    owner_gated(&state, river_id, &viewer)?;
    state.rivers.remove_collaborator(river_id, user_id)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn subscribe(
    State(state): State<AppState>,
    Path(river_id): Path<i64>,
    Extension(viewer): Extension<Viewer>,
) -> Result<impl IntoResponse, ApiError> {
    let river = state.rivers.river(river_id)?;
    ensure_can_view(&state, &river, &viewer, None)?;
    state.rivers.subscribe(river_id, viewer.user_id)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn unsubscribe(
    State(state): State<AppState>,
    Path(river_id): Path<i64>,
    Extension(viewer): Extension<Viewer>,
) -> Result<impl IntoResponse, ApiError> {
    state.rivers.unsubscribe(river_id, viewer.user_id)?;
    Ok(StatusCode::NO_CONTENT)
}
