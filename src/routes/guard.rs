//! Session Guards
//!
//! Middleware that resolves the `Authorization: Bearer <token>` header into
//! the signed-in [`Actor`] and stores it in the request extensions, plus the
//! router-wide recorder that copies remote failures into the diagnostics log.

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use serde_json::{json, Value};

use crate::db::User;
use crate::error::{ApiError, AuthError, RemoteFailure};
use crate::types::Role;
use crate::AppState;

/// 요청을 보낸 로그인 사용자
#[derive(Clone, Debug)]
pub struct Actor {
    pub token: String,
    pub user: User,
}

/// `Authorization: Bearer <token>` 헤더에서 토큰 추출
pub fn bearer_token(request: &Request) -> Option<String> {
    request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

/// 로그인 필수 (401)
pub async fn require_session(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(&request).ok_or(AuthError::NotAuthenticated)?;
    let user = state.sessions.authenticate(&token).await?;

    log_call(&state, &request, &user);
    request.extensions_mut().insert(Actor { token, user });
    Ok(next.run(request).await)
}

/// 관리자 필수 (401 / 403)
pub async fn require_admin(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(&request).ok_or(AuthError::NotAuthenticated)?;
    let user = state.sessions.require_role(&token, Role::Admin).await?;

    log_call(&state, &request, &user);
    request.extensions_mut().insert(Actor { token, user });
    Ok(next.run(request).await)
}

fn log_call(state: &AppState, request: &Request, user: &User) {
    state.log.api(
        Some(&user.uid),
        request.method().as_str(),
        request.uri().path(),
        Value::Null,
    );
}

/// 저장소/프로바이더 장애를 진단 로그(ERROR)에 기록
pub async fn record_failures(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let user_id = bearer_token(&request)
        .and_then(|token| state.sessions.current_user(&token).ok().flatten())
        .map(|user| user.uid);

    let response = next.run(request).await;

    if let Some(RemoteFailure(detail)) = response.extensions().get::<RemoteFailure>() {
        state.log.error(
            user_id.as_deref(),
            &format!("{method} {path} failed"),
            json!({
                "method": method.as_str(),
                "path": path,
                "status": response.status().as_u16(),
                "error": detail,
            }),
        );
    }
    response
}
