//! Per-user Endpoints
//!
//! The signed-in user's own events, upcoming schedule and suggestions.

use axum::{
    extract::{Query, State},
    Extension, Json,
};
use serde::Deserialize;

use crate::db::Event;
use crate::error::ApiError;
use crate::routes::guard::Actor;
use crate::types::ApiResponse;
use crate::AppState;

/// 다가오는 이벤트 기본 개수
const DEFAULT_UPCOMING_LIMIT: usize = 5;

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

/// GET /me/events
pub async fn my_events(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> Result<Json<ApiResponse<Vec<Event>>>, ApiError> {
    Ok(Json(ApiResponse::success(state.events.user_events(&actor.user.uid).await?)))
}

/// GET /me/upcoming?limit
pub async fn my_upcoming(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<ApiResponse<Vec<Event>>>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_UPCOMING_LIMIT);
    let events = state
        .events
        .upcoming_for(&actor.user.uid, limit, chrono::Utc::now())
        .await?;
    Ok(Json(ApiResponse::success(events)))
}

/// GET /me/suggestions
pub async fn my_suggestions(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> Result<Json<ApiResponse<Vec<Event>>>, ApiError> {
    Ok(Json(ApiResponse::success(state.matching.suggest_for(&actor.user.uid).await?)))
}
