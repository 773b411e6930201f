//! Error Handling Module
//!
//! Provides type-safe error handling with proper HTTP status code mapping.
//! Uses thiserror for domain errors and integrates with tracing for structured logging.

use std::collections::BTreeMap;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::services::identity::{ProviderError, ProviderErrorCode};
use crate::types::Role;

/// 필드별 검증 에러 (field → message)
pub type FieldErrors = BTreeMap<String, String>;

/// 에러 분류
///
/// 표현 계층은 이 분류만 보고 분기함
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    Validation,
    Auth,
    Authorization,
    NotFound,
    Capacity,
    StateConflict,
    Remote,
}

/// 인증 실패
///
/// Display 문자열이 곧 사용자에게 보여줄 메시지
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("This email is already registered. Please use a different email or sign in.")]
    DuplicateEmail,

    #[error("Password is too weak. Please choose a stronger password.")]
    WeakCredential,

    #[error("Invalid email or password. Please check your credentials.")]
    InvalidCredentials,

    #[error("Access denied. You must be logged in as a {expected}.")]
    RoleMismatch { expected: Role },

    #[error("This account has been disabled. Please contact support.")]
    AccountDisabled,

    #[error("User not authenticated")]
    NotAuthenticated,

    #[error("{}", .0.message())]
    Provider(ProviderErrorCode),
}

impl From<ProviderErrorCode> for AuthError {
    fn from(code: ProviderErrorCode) -> Self {
        match code {
            ProviderErrorCode::EmailAlreadyInUse => AuthError::DuplicateEmail,
            ProviderErrorCode::WeakPassword => AuthError::WeakCredential,
            ProviderErrorCode::InvalidCredential => AuthError::InvalidCredentials,
            ProviderErrorCode::UserDisabled => AuthError::AccountDisabled,
            other => AuthError::Provider(other),
        }
    }
}

impl AuthError {
    fn status(&self) -> StatusCode {
        match self {
            AuthError::DuplicateEmail => StatusCode::CONFLICT,
            AuthError::WeakCredential => StatusCode::BAD_REQUEST,
            AuthError::Provider(ProviderErrorCode::InvalidEmail) => StatusCode::BAD_REQUEST,
            AuthError::Provider(ProviderErrorCode::TooManyRequests) => StatusCode::TOO_MANY_REQUESTS,
            AuthError::Provider(ProviderErrorCode::NetworkRequestFailed) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::UNAUTHORIZED,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            AuthError::DuplicateEmail => "DUPLICATE_EMAIL",
            AuthError::WeakCredential => "WEAK_CREDENTIAL",
            AuthError::InvalidCredentials => "INVALID_CREDENTIALS",
            AuthError::RoleMismatch { .. } => "ROLE_MISMATCH",
            AuthError::AccountDisabled => "ACCOUNT_DISABLED",
            AuthError::NotAuthenticated => "NOT_AUTHENTICATED",
            AuthError::Provider(_) => "AUTH_PROVIDER_ERROR",
        }
    }
}

/// API 에러 타입
///
/// # Design Decision
///
/// 각 에러 variant는 적절한 HTTP 상태 코드에 매핑됨
/// - 클라이언트 에러: 4xx (검증, 인증, 권한, 정원 초과, 상태 충돌)
/// - 서버 에러: 5xx (저장소/프로바이더 장애)
///
/// 민감한 내부 정보는 클라이언트에 노출하지 않음
#[derive(Debug, Error)]
pub enum ApiError {
    // ============ 400 Bad Request ============
    #[error("Validation failed")]
    ValidationError(FieldErrors),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    // ============ 401 Unauthorized ============
    #[error(transparent)]
    Auth(#[from] AuthError),

    // ============ 403 Forbidden ============
    #[error("{0}")]
    Forbidden(String),

    // ============ 404 Not Found ============
    #[error("{0} not found")]
    NotFound(String),

    // ============ 409 Conflict ============
    #[error("This event is full.")]
    EventFull,

    #[error("You are already a participant in this event.")]
    AlreadyJoined,

    #[error("You are not a participant in this event.")]
    NotParticipant,

    // ============ 500 Internal Server Error ============
    #[error("Remote error: {0}")]
    RemoteError(String),
}

/// 저장소/프로바이더 장애 상세
///
/// 응답 extension으로 실려 나가며, 라우터의 장애 기록 미들웨어가 진단 로그에 남김.
/// 클라이언트 본문에는 포함되지 않음.
#[derive(Debug, Clone)]
pub struct RemoteFailure(pub String);

/// API 에러 응답 구조
#[derive(Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<FieldErrors>,
}

impl ApiError {
    /// 단일 필드 검증 에러
    pub fn invalid_field(field: &str, message: &str) -> Self {
        let mut errors = FieldErrors::new();
        errors.insert(field.to_string(), message.to_string());
        ApiError::ValidationError(errors)
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::ValidationError(_) | ApiError::BadRequest(_) => ErrorKind::Validation,
            ApiError::Auth(_) => ErrorKind::Auth,
            ApiError::Forbidden(_) => ErrorKind::Authorization,
            ApiError::NotFound(_) => ErrorKind::NotFound,
            ApiError::EventFull => ErrorKind::Capacity,
            ApiError::AlreadyJoined | ApiError::NotParticipant => ErrorKind::StateConflict,
            ApiError::RemoteError(_) => ErrorKind::Remote,
        }
    }

    /// 사용자에게 보여줄 메시지
    ///
    /// Remote 에러는 내부 정보 대신 일반 메시지로 축약
    pub fn user_message(&self) -> String {
        match self {
            ApiError::RemoteError(_) => "An unexpected error occurred. Please try again.".to_string(),
            ApiError::ValidationError(errors) if errors.len() == 1 => errors
                .values()
                .next()
                .cloned()
                .unwrap_or_else(|| self.to_string()),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = self.user_message();
        let failure = (self.kind() == ErrorKind::Remote).then(|| RemoteFailure(self.to_string()));

        let (status, code, details) = match self {
            // 4xx 클라이언트 에러
            ApiError::ValidationError(errors) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", Some(errors))
            }
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", None),
            ApiError::Auth(ref auth) => (auth.status(), auth.code(), None),
            ApiError::Forbidden(_) => (StatusCode::FORBIDDEN, "UNAUTHORIZED", None),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND", None),
            ApiError::EventFull => (StatusCode::CONFLICT, "EVENT_FULL", None),
            ApiError::AlreadyJoined => (StatusCode::CONFLICT, "ALREADY_JOINED", None),
            ApiError::NotParticipant => (StatusCode::CONFLICT, "NOT_PARTICIPANT", None),

            // 5xx 서버 에러
            ApiError::RemoteError(ref detail) => {
                // 내부 에러는 클라이언트에 상세 정보 노출 안 함
                tracing::error!("Remote error: {}", detail);
                (StatusCode::INTERNAL_SERVER_ERROR, "REMOTE_ERROR", None)
            }
        };

        let body = ErrorResponse {
            success: false,
            error: message,
            code: code.to_string(),
            details,
        };

        let mut response = (status, Json(body)).into_response();
        if let Some(failure) = failure {
            response.extensions_mut().insert(failure);
        }
        response
    }
}

/// SQLx 에러를 ApiError로 변환
impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!("SQLx error: {:?}", err);
        ApiError::RemoteError(err.to_string())
    }
}

/// anyhow 에러를 ApiError로 변환
impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        tracing::error!("Store error: {:?}", err);
        ApiError::RemoteError(format!("{:#}", err))
    }
}

impl From<ProviderError> for ApiError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Rejected(code) => ApiError::Auth(code.into()),
            ProviderError::Backend(err) => err.into(),
        }
    }
}
