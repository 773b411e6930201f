//! Event Endpoints
//!
//! Listing, CRUD and roster changes. All handlers run behind the session
//! guard; creator/admin checks happen in [`crate::services::EventRepository`].

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use serde::Serialize;

use crate::db::{Event, EventFilters};
use crate::error::ApiError;
use crate::routes::guard::Actor;
use crate::services::EventStats;
use crate::types::ApiResponse;
use crate::validation::{EventForm, EventPatchForm};
use crate::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedEvent {
    pub event_id: String,
}

/// GET /events?sport&city&skill_level&status&limit
pub async fn list_events(
    State(state): State<AppState>,
    Query(filters): Query<EventFilters>,
) -> Result<Json<ApiResponse<Vec<Event>>>, ApiError> {
    let events = state.events.list(&filters).await?;
    Ok(Json(ApiResponse::success(events)))
}

/// POST /events
pub async fn create_event(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(form): Json<EventForm>,
) -> Result<(StatusCode, Json<ApiResponse<CreatedEvent>>), ApiError> {
    let event_id = state.events.create(&actor.user, &form).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_message(
            CreatedEvent { event_id },
            "Event created successfully!",
        )),
    ))
}

/// GET /events/stats
pub async fn event_stats(State(state): State<AppState>) -> Result<Json<ApiResponse<EventStats>>, ApiError> {
    Ok(Json(ApiResponse::success(state.events.event_stats().await?)))
}

/// GET /events/:id
pub async fn get_event(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Event>>, ApiError> {
    Ok(Json(ApiResponse::success(state.events.get(&id).await?)))
}

/// PATCH /events/:id
pub async fn update_event(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
    Json(form): Json<EventPatchForm>,
) -> Result<Json<ApiResponse<Event>>, ApiError> {
    let event = state.events.update(&actor.user, &id, &form).await?;
    Ok(Json(ApiResponse::with_message(event, "Event updated successfully!")))
}

/// DELETE /events/:id
pub async fn delete_event(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    state.events.delete(&actor.user, &id).await?;
    Ok(Json(ApiResponse::with_message((), "Event deleted successfully!")))
}

/// POST /events/:id/join
pub async fn join_event(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Event>>, ApiError> {
    let event = state.events.join(&actor.user, &id).await?;
    Ok(Json(ApiResponse::with_message(event, "Successfully joined the event!")))
}

/// POST /events/:id/leave
pub async fn leave_event(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Event>>, ApiError> {
    let event = state.events.leave(&actor.user, &id).await?;
    Ok(Json(ApiResponse::with_message(event, "Successfully left the event.")))
}
