//! Diagnostics Endpoints
//!
//! Admin access to the application log: filtered queries, export, clear and
//! runtime level changes.

use axum::{
    extract::{Query, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::routes::guard::Actor;
use crate::services::{LogEntry, LogLevel};
use crate::types::ApiResponse;
use crate::AppState;

/// 조건은 모두 AND
#[derive(Debug, Default, Deserialize)]
pub struct LogQuery {
    pub level: Option<String>,
    pub category: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct SetLevelRequest {
    pub level: String,
}

fn parse_level(raw: &str) -> Result<LogLevel, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::invalid_field("level", "Level must be DEBUG, INFO, WARN or ERROR"))
}

/// GET /admin/logs?level&category&from&to
pub async fn list_logs(
    State(state): State<AppState>,
    Query(query): Query<LogQuery>,
) -> Result<Json<ApiResponse<Vec<LogEntry>>>, ApiError> {
    let level = query.level.as_deref().map(parse_level).transpose()?;
    let category = query.category.as_deref().map(str::to_uppercase);

    let mut entries = match (level, &category) {
        (Some(level), _) => state.log.by_level(level),
        (None, Some(category)) => state.log.by_category(category),
        (None, None) => state.log.all(),
    };
    let from = query.from.unwrap_or(DateTime::<Utc>::MIN_UTC);
    let to = query.to.unwrap_or(DateTime::<Utc>::MAX_UTC);
    entries.retain(|entry| {
        category.as_ref().map_or(true, |category| entry.category == *category)
            && entry.timestamp >= from
            && entry.timestamp <= to
    });

    Ok(Json(ApiResponse::success(entries)))
}

/// GET /admin/logs/export
///
/// `{ exported_at, total_logs, logs }`
pub async fn export_logs(State(state): State<AppState>, Extension(actor): Extension<Actor>) -> Json<Value> {
    let export = state.log.export();
    state.log.user_action(
        &actor.user.uid,
        "Exported logs",
        json!({ "total": export["total_logs"] }),
    );
    Json(export)
}

/// DELETE /admin/logs
pub async fn clear_logs(State(state): State<AppState>) -> Json<ApiResponse<()>> {
    state.log.clear();
    Json(ApiResponse::with_message((), "All logs cleared"))
}

/// PUT /admin/logs/level
pub async fn set_level(
    State(state): State<AppState>,
    Json(request): Json<SetLevelRequest>,
) -> Result<Json<ApiResponse<LogLevel>>, ApiError> {
    let level = parse_level(&request.level)?;
    state.log.set_level(level);
    Ok(Json(ApiResponse::with_message(level, format!("Log level set to: {level}"))))
}
