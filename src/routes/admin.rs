//! Admin Endpoints
//!
//! Dashboard rollups, user management and the activity feed. Every handler
//! runs behind the admin guard.

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use serde::Deserialize;

use crate::db::{Activity, Event, User, UserStats};
use crate::error::ApiError;
use crate::routes::guard::Actor;
use crate::services::admin::DEFAULT_ACTIVITY_LIMIT;
use crate::services::DashboardStats;
use crate::types::ApiResponse;
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetActiveRequest {
    pub is_active: bool,
}

#[derive(Debug, Deserialize)]
pub struct ActivityQuery {
    pub limit: Option<u32>,
}

/// GET /admin/stats
pub async fn dashboard_stats(State(state): State<AppState>) -> Result<Json<ApiResponse<DashboardStats>>, ApiError> {
    Ok(Json(ApiResponse::success(state.admin.dashboard_stats().await?)))
}

/// GET /admin/users
pub async fn list_users(State(state): State<AppState>) -> Result<Json<ApiResponse<Vec<User>>>, ApiError> {
    Ok(Json(ApiResponse::success(state.admin.users().await?)))
}

/// PUT /admin/users/:id/active
pub async fn set_user_active(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(user_id): Path<String>,
    Json(request): Json<SetActiveRequest>,
) -> Result<Json<ApiResponse<User>>, ApiError> {
    let user = state
        .admin
        .set_active(&actor.user.uid, &user_id, request.is_active)
        .await?;
    let message = if request.is_active {
        "User activated successfully!"
    } else {
        "User deactivated successfully!"
    };
    Ok(Json(ApiResponse::with_message(user, message)))
}

/// POST /admin/users/:id/reconcile
///
/// 이벤트 저장소 기준으로 사용자 통계 재계산
pub async fn reconcile_user_stats(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<ApiResponse<UserStats>>, ApiError> {
    let stats = state.events.reconcile_stats(&user_id).await?;
    Ok(Json(ApiResponse::with_message(stats, "User statistics reconciled.")))
}

/// GET /admin/events
pub async fn list_events(State(state): State<AppState>) -> Result<Json<ApiResponse<Vec<Event>>>, ApiError> {
    Ok(Json(ApiResponse::success(state.admin.events().await?)))
}

/// GET /admin/activity?limit
pub async fn recent_activity(
    State(state): State<AppState>,
    Query(query): Query<ActivityQuery>,
) -> Result<Json<ApiResponse<Vec<Activity>>>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_ACTIVITY_LIMIT);
    Ok(Json(ApiResponse::success(state.admin.recent_activity(limit).await?)))
}
