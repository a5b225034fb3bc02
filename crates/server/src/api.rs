use std::sync::Arc;

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::warn;
use transitway::{model::Location, online, shared::Time};

use crate::{
    dto::{ErrorResponse, NamedLocation, OneToManyRequest, OneToPresetRequest, RouteRequest},
    state::AppState,
};

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("no feed loaded")]
    NotLoaded,
    #[error("{0:?} is not a valid HH:MM:SS departure time")]
    BadDeparture(String),
    #[error("unknown stop id in request")]
    UnknownStop,
    #[error("unknown preset {0:?}")]
    UnknownPreset(String),
    #[error("augmenting query: {0}")]
    Online(#[from] online::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::NotLoaded => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::BadDeparture(_) | ApiError::UnknownStop | ApiError::UnknownPreset(_) => StatusCode::BAD_REQUEST,
            ApiError::Online(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        warn!("request failed: {self}");
        (status, Json(ErrorResponse { error: self.to_string() })).into_response()
    }
}

fn parse_departure(departure: &str) -> Result<u32, ApiError> {
    Time::from_hms(departure).map(|t| t.as_seconds()).ok_or_else(|| ApiError::BadDeparture(departure.to_string()))
}

pub async fn healthy(State(state): State<Arc<AppState>>) -> StatusCode {
    if state.data.read().await.is_some() { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE }
}

pub async fn route(State(state): State<Arc<AppState>>, Json(body): Json<RouteRequest>) -> Result<Response, ApiError> {
    let guard = state.data.read().await;
    let data = guard.as_ref().ok_or(ApiError::NotLoaded)?;
    let dep_secs = parse_departure(&body.departure)?;
    let origin = body.origin.into_location(data.indexed, "origin").ok_or(ApiError::UnknownStop)?;
    let destination = body.destination.into_location(data.indexed, "destination").ok_or(ApiError::UnknownStop)?;

    let query = data.loading.resolve_query_options(body.query);
    let result = online::one_to_one(data.indexed, &origin, dep_secs, &destination, &query)?;
    Ok(Json(result).into_response())
}

pub async fn one_to_many(
    State(state): State<Arc<AppState>>,
    Json(body): Json<OneToManyRequest>,
) -> Result<Response, ApiError> {
    let guard = state.data.read().await;
    let data = guard.as_ref().ok_or(ApiError::NotLoaded)?;
    let dep_secs = parse_departure(&body.departure)?;
    let origin = body.origin.into_location(data.indexed, "origin").ok_or(ApiError::UnknownStop)?;
    let destinations: Vec<Location> = body.destinations.into_iter().map(NamedLocation::into).collect();

    let query = data.loading.resolve_query_options(body.query);
    let result = online::one_to_many(data.indexed, &origin, dep_secs, &destinations, &query)?;
    Ok(Json(result).into_response())
}

pub async fn one_to_preset(
    State(state): State<Arc<AppState>>,
    Json(body): Json<OneToPresetRequest>,
) -> Result<Response, ApiError> {
    let guard = state.data.read().await;
    let data = guard.as_ref().ok_or(ApiError::NotLoaded)?;
    let dep_secs = parse_departure(&body.departure)?;
    let origin = body.origin.into_location(data.indexed, "origin").ok_or(ApiError::UnknownStop)?;

    let preset = data.presets.get(&body.preset).ok_or_else(|| ApiError::UnknownPreset(body.preset.clone()))?;

    let query = data.loading.resolve_query_options(body.query);
    let result = online::one_to_many_preset(preset, &origin, dep_secs, &query)?;
    Ok(Json(result).into_response())
}
