use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use serde::Deserialize;

use river_core::lifecycle;
use river_types::api::{
    CreateRiverRequest, ExtendResponse, TokenResponse, UpdateRiverRequest,
};
use river_types::models::River;

use crate::error::ApiError;
use crate::middleware::Viewer;
use crate::AppState;

/// Access gate for read endpoints: public river, ownership, or a valid
/// public token.
pub(crate) fn ensure_can_view(
    state: &AppState,
    river: &River,
    viewer: &Viewer,
    token: Option<&str>,
) -> Result<(), ApiError> {
    if river.public {
        return Ok(());
    }
    if state.rivers.permissions().is_owner(river, viewer.user_id)? {
        return Ok(());
    }
    if let Some(token) = token {
        if lifecycle::is_valid_token(river, token) {
            return Ok(());
        }
    }
    Err(ApiError(river_core::CoreError::Forbidden))
}

/// Loads a river and requires ownership; used by every mutating endpoint.
pub(crate) fn owner_gated(
    state: &AppState,
    river_id: i64,
    viewer: &Viewer,
) -> Result<River, ApiError> {
    let river = state.rivers.river(river_id)?;
    if !state.rivers.permissions().is_owner(&river, viewer.user_id)? {
        return Err(ApiError(river_core::CoreError::Forbidden));
    }
    Ok(river)
}

pub async fn create_river(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Json(req): Json<CreateRiverRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let account = state.rivers.account_for_user(viewer.user_id)?;
    let river = state
        .rivers
        .create_river(account.id, &req.name, req.public, req.slug.as_deref())?;
    Ok((StatusCode::CREATED, Json(river)))
}

#[derive(Deserialize)]
pub struct ViewParams {
    pub token: Option<String>,
}

pub async fn get_river(
    State(state): State<AppState>,
    Path(river_id): Path<i64>,
    Query(params): Query<ViewParams>,
    Extension(viewer): Extension<Viewer>,
) -> Result<impl IntoResponse, ApiError> {
    let river = state.rivers.river(river_id)?;
    ensure_can_view(&state, &river, &viewer, params.token.as_deref())?;
    Ok(Json(state.rivers.summary(river_id, viewer.user_id)?))
}

pub async fn update_river(
    State(state): State<AppState>,
    Path(river_id): Path<i64>,
    Extension(viewer): Extension<Viewer>,
    Json(req): Json<UpdateRiverRequest>,
) -> Result<impl IntoResponse, ApiError> {
    owner_gated(&state, river_id, &viewer)?;
    Ok(Json(state.rivers.update_river(river_id, &req)?))
}

pub async fn delete_river(
    State(state): State<AppState>,
    Path(river_id): Path<i64>,
    Extension(viewer): Extension<Viewer>,
) -> Result<impl IntoResponse, ApiError> {
    owner_gated(&state, river_id, &viewer)?;
    state.rivers.delete_river(river_id)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn extend_river(
    State(state): State<AppState>,
    Path(river_id): Path<i64>,
    Extension(viewer): Extension<Viewer>,
) -> Result<impl IntoResponse, ApiError> {
    owner_gated(&state, river_id, &viewer)?;
    let river = state.rivers.extend_lifetime(river_id)?;
    Ok(Json(ExtendResponse {
        date_expiry: river.date_expiry.to_rfc3339(),
        extension_count: river.extension_count,
        days_to_expiry: state.rivers.days_to_expiry(river_id)?,
    }))
}

pub async fn rotate_token(
    State(state): State<AppState>,
    Path(river_id): Path<i64>,
    Extension(viewer): Extension<Viewer>,
) -> Result<impl IntoResponse, ApiError> {
    owner_gated(&state, river_id, &viewer)?;
    let token = state.rivers.set_token(river_id)?;
    Ok(Json(TokenResponse { token }))
}

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: String,
}

pub async fn search_rivers(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
    Extension(viewer): Extension<Viewer>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.search.rivers_like(&params.q, viewer.user_id)?))
}

pub async fn my_rivers(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.rivers.rivers_for_user(viewer.user_id)?))
}
