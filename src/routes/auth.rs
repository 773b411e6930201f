//! Authentication Endpoints
//!
//! Registration, sign-in/out and the signed-in user's profile.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use serde::Serialize;

use crate::db::{ProfilePatch, User};
use crate::error::ApiError;
use crate::routes::guard::Actor;
use crate::services::{Session, SignInRequest};
use crate::types::{ApiResponse, Role};
use crate::validation::RegistrationForm;
use crate::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RememberedEmail {
    pub device_id: String,
    pub email: Option<String>,
}

/// POST /auth/register
///
/// 공개 가입은 항상 일반 사용자 역할
pub async fn register(
    State(state): State<AppState>,
    Json(form): Json<RegistrationForm>,
) -> Result<(StatusCode, Json<ApiResponse<Session>>), ApiError> {
    let session = state.sessions.register(&form, Role::User).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_message(session, "Registration successful! Welcome to Sports Buddy.")),
    ))
}

/// POST /auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<SignInRequest>,
) -> Result<Json<ApiResponse<Session>>, ApiError> {
    let session = state.sessions.sign_in(&request).await?;
    let message = format!("Welcome back, {}!", session.user.first_name);
    Ok(Json(ApiResponse::with_message(session, message)))
}

/// POST /auth/logout
pub async fn logout(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    state.sessions.sign_out(&actor.token).await?;
    Ok(Json(ApiResponse::with_message((), "Signed out successfully.")))
}

/// GET /auth/me
pub async fn me(Extension(actor): Extension<Actor>) -> Json<ApiResponse<User>> {
    Json(ApiResponse::success(actor.user))
}

/// PATCH /auth/me
pub async fn update_me(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(patch): Json<ProfilePatch>,
) -> Result<Json<ApiResponse<User>>, ApiError> {
    let user = state.sessions.update_profile(&actor.token, &patch).await?;
    Ok(Json(ApiResponse::with_message(user, "Profile updated successfully!")))
}

/// GET /auth/remembered/:device_id
pub async fn remembered_email(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> Result<Json<ApiResponse<RememberedEmail>>, ApiError> {
    let email = state.sessions.remembered_email(&device_id)?;
    Ok(Json(ApiResponse::success(RememberedEmail { device_id, email })))
}
