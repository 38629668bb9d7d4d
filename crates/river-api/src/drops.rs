use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::{Extension, Json};
use serde::Deserialize;

use river_core::CoreError;
use river_core::feed::{DEFAULT_PAGE_SIZE, DEFAULT_SINCE_LIMIT, DropFilters};

use crate::AppState;
use crate::error::ApiError;
use crate::middleware::Viewer;
use crate::rivers::ensure_can_view;

#[derive(Debug, Default, Deserialize)]
pub struct DropsParams {
    pub page: Option<u32>,
    pub max_id: Option<i64>,
    pub since_id: Option<i64>,
    #[serde(default)]
    pub photos: bool,
    /// Comma-delimited channel keys.
    pub channel: Option<String>,
    /// Comma-delimited tag names.
    pub tags: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub token: Option<String>,
}

impl DropsParams {
    fn filters(&self) -> DropFilters {
        DropFilters {
            channels: split_list(self.channel.as_deref()),
            tags: split_list(self.tags.as_deref()),
            start_date: self.start_date.clone(),
            end_date: self.end_date.clone(),
        }
    }
}

fn split_list(raw: Option<&str>) -> Vec<String> {
    raw.map(|value| {
        value
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

pub async fn get_drops(
    State(state): State<AppState>,
    Path(river_id): Path<i64>,
    Query(params): Query<DropsParams>,
    Extension(viewer): Extension<Viewer>,
) -> Result<impl IntoResponse, ApiError> {
    let river = state.rivers.river(river_id)?;
    ensure_can_view(&state, &river, &viewer, params.token.as_deref())?;

    let filters = params.filters();
    let page = params.page.unwrap_or(1);

    let drops = match params.since_id {
        Some(since_id) if since_id > 0 => state.feed.get_droplets_since_id(
            viewer.user_id,
            river_id,
            since_id,
            &filters,
            params.photos,
            DEFAULT_SINCE_LIMIT,
        )?,
        _ => state.feed.get_droplets(
            viewer.user_id,
            river_id,
            None,
            page,
            params.max_id.unwrap_or(i64::MAX),
            params.photos,
            &filters,
            DEFAULT_PAGE_SIZE,
        )?,
    };

    // A later page that is off the end of the river is a missing resource,
    // not an empty listing.
    if page > 1 && params.since_id.is_none() && drops.is_empty() {
        return Err(ApiError(CoreError::NotFound("page")));
    }
    Ok(Json(drops))
}

pub async fn get_drop(
    State(state): State<AppState>,
    Path((river_id, drop_id)): Path<(i64, i64)>,
    Query(params): Query<DropsParams>,
    Extension(viewer): Extension<Viewer>,
) -> Result<impl IntoResponse, ApiError> {
    let river = state.rivers.river(river_id)?;
    ensure_can_view(&state, &river, &viewer, params.token.as_deref())?;

    let drops = state.feed.get_droplets(
        viewer.user_id,
        river_id,
        Some(drop_id),
        1,
        i64::MAX,
        false,
        &DropFilters::default(),
        1,
    )?;
    drops
        .into_iter()
        .next()
        .map(Json)
        .ok_or(ApiError(CoreError::NotFound("drop")))
}

pub async fn get_max_drop_id(
    State(state): State<AppState>,
    Path(river_id): Path<i64>,
    Query(params): Query<DropsParams>,
    Extension(viewer): Extension<Viewer>,
) -> Result<impl IntoResponse, ApiError> {
    let river = state.rivers.river(river_id)?;
    ensure_can_view(&state, &river, &viewer, params.token.as_deref())?;
    Ok(Json(state.feed.get_max_droplet_id(river_id)?))
}

pub async fn remove_drop(
    State(state): State<AppState>,
    Path((river_id, drop_id)): Path<(i64, i64)>,
    Extension(viewer): Extension<Viewer>,
) -> Result<impl IntoResponse, ApiError> {
    crate::rivers::owner_gated(&state, river_id, &viewer)?;
    state.rivers.remove_drop(river_id, drop_id)?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}
